//! Fraud event publisher (spec.md §4.7): fire-and-forget fan-out of
//! `{id, url}` to the bus after a successful create. A publish failure is
//! logged and swallowed — it must never fail the create that triggered it.

use std::sync::Arc;

use crate::collaborators::EventBus;
use crate::model::FraudEvent;

pub struct FraudEventPublisher {
    bus: Arc<dyn EventBus>,
}

impl FraudEventPublisher {
    pub fn new(bus: Arc<dyn EventBus>) -> Self {
        Self { bus }
    }

    /// Publish `{id, url}`; spawns so the caller (the create handler) never
    /// waits on the bus.
    pub fn publish_fire_and_forget(self: &Arc<Self>, id: String, url: String) {
        let this = self.clone();
        tokio::spawn(async move {
            if let Err(e) = this.bus.publish(FraudEvent { id: id.clone(), url }).await {
                log::warn!("fraud event publish failed for {id}, dropping (loss is tolerable): {e}");
            }
        });
    }
}
