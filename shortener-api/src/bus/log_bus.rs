//! `EventBus` adapter standing in for the RabbitMQ fan-out exchange
//! (spec.md §4.7, §6 `RABBITMQ_URL`). Logs every publish and forwards it
//! over a bounded `crossbeam_channel` to the in-process fraud scanner, the
//! same fire-and-forget channel idiom `router-api::module::udp_logger`
//! uses to hand messages from a fast path to a slower consumer thread.

use async_trait::async_trait;
use crossbeam_channel::Sender;

use shortener_core::collaborators::EventBus;
use shortener_core::error::CoreResult;
use shortener_core::model::FraudEvent;

pub struct LogBus {
    tx: Sender<FraudEvent>,
}

impl LogBus {
    pub fn new(tx: Sender<FraudEvent>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl EventBus for LogBus {
    async fn publish(&self, event: FraudEvent) -> CoreResult<()> {
        log::info!("publishing fraud-scan event for id={}", event.id);
        if self.tx.try_send(event).is_err() {
            // Bus unavailable (consumer backed up or gone): publish
            // failures in the create hot path are logged and swallowed
            // per spec.md §7, never surfaced to the caller.
            log::warn!("fraud event channel full or disconnected, dropping event");
        }
        Ok(())
    }
}
