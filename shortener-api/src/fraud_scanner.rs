//! Fraud scanner collaborator (spec.md §4.7): consumes `{id, url}` events
//! fanned out by [`crate::bus::log_bus::LogBus`], checks each against a
//! pluggable reputation check at a quota-bounded rate, and on a malicious
//! verdict marks the row.
//!
//! Runs on its own thread and drains the channel with `recv_timeout`,
//! the same shape as `router-api::module::udp_log_processor::UdpLogProcessor`
//! — a dedicated consumer thread pulling off a `crossbeam_channel`
//! receiver, rather than an async task, since the real reputation API call
//! it stands in for is itself blocking I/O in the original design.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use tokio::runtime::Handle;

use shortener_core::collaborators::DurableStore;
use shortener_core::model::{FraudEvent, ReputationVerdict};

/// Messages per minute the scanner is allowed to consult the reputation
/// API at, per spec.md §4.7.
const QUOTA_PER_MINUTE: u32 = 4;

/// A pluggable stand-in for the external reputation API (out of core
/// scope per spec.md §1). Implementations decide what "malicious" means.
pub trait ReputationCheck: Send + Sync {
    fn check(&self, url: &str) -> ReputationVerdict;
}

/// Flags a URL as malicious if it contains the literal substring
/// `"malicious"` — a deterministic stand-in for the real reputation API,
/// sufficient to drive scenario 6 in spec.md §8 end-to-end.
pub struct SubstringReputationCheck;

impl ReputationCheck for SubstringReputationCheck {
    fn check(&self, url: &str) -> ReputationVerdict {
        if url.contains("malicious") {
            ReputationVerdict::Malicious
        } else {
            ReputationVerdict::Clean
        }
    }
}

pub struct FraudScanner {
    receiver: Receiver<FraudEvent>,
    store: Arc<dyn DurableStore>,
    reputation: Arc<dyn ReputationCheck>,
    runtime: Handle,
}

impl FraudScanner {
    pub fn new(
        receiver: Receiver<FraudEvent>,
        store: Arc<dyn DurableStore>,
        reputation: Arc<dyn ReputationCheck>,
        runtime: Handle,
    ) -> Self {
        Self {
            receiver,
            store,
            reputation,
            runtime,
        }
    }

    /// Spawn the consumer thread. Returns the `JoinHandle` so the caller
    /// can decide whether to wait on it (tests) or let it run detached for
    /// the lifetime of the process (`main`).
    pub fn spawn(self) -> thread::JoinHandle<()> {
        thread::spawn(move || self.run())
    }

    fn run(self) {
        let min_interval = Duration::from_secs(60) / QUOTA_PER_MINUTE;
        let mut last_check = Instant::now() - min_interval;

        loop {
            match self.receiver.recv_timeout(Duration::from_millis(200)) {
                Ok(event) => {
                    let wait = min_interval.saturating_sub(last_check.elapsed());
                    if !wait.is_zero() {
                        thread::sleep(wait);
                    }
                    last_check = Instant::now();
                    self.process(event);
                }
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                    log::info!("fraud scanner channel disconnected, stopping");
                    break;
                }
            }
        }
    }

    fn process(&self, event: FraudEvent) {
        if let ReputationVerdict::Malicious = self.reputation.check(&event.url) {
            let store = self.store.clone();
            let id = event.id.clone();
            let result = self.runtime.block_on(store.mark_fraud(&id));
            match result {
                Ok(()) => log::warn!("marked id={id} as fraudulent"),
                Err(e) => log::error!("failed to mark id={id} as fraudulent: {e}"),
            }
        }
    }
}
