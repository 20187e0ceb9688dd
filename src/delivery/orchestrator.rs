//! Download Orchestrator: time-staggered, failure-isolated delivery.
//!
//! Delivery is deliberately not a parallel batch: item *k* is dispatched
//! after `k` stagger intervals on a single logical timeline, spreading
//! issuance so the platform's download queue is never hit all at once.
//! Each item still runs in its own task, so one item's failure or slowness
//! never cancels or delays the others, and the join point waits for all of
//! them. Scheduling rides the tokio clock, so tests run it under a paused
//! virtual clock.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::transport::TransportSelector;
use super::{Artifact, DeliveryError};

/// Default stagger interval between successive dispatches.
pub const DEFAULT_STAGGER: Duration = Duration::from_millis(200);

/// Counters for one delivery run.
#[derive(Debug, Default)]
pub struct DeliveryStats {
    delivered: AtomicUsize,
    failed: AtomicUsize,
}

impl DeliveryStats {
    /// Creates a stats tracker with zero counts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of artifacts handed to a transport successfully.
    #[must_use]
    pub fn delivered(&self) -> usize {
        self.delivered.load(Ordering::SeqCst)
    }

    /// Number of artifacts that failed on both transports.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Total artifacts processed.
    #[must_use]
    pub fn total(&self) -> usize {
        self.delivered() + self.failed()
    }

    fn increment_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::SeqCst);
    }

    fn increment_failed(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Sequences artifact delivery through the transport selector.
#[derive(Debug)]
pub struct Orchestrator {
    selector: Arc<TransportSelector>,
    stagger: Duration,
}

impl Orchestrator {
    /// Creates an orchestrator with the default stagger interval.
    #[must_use]
    pub fn new(selector: Arc<TransportSelector>) -> Self {
        Self {
            selector,
            stagger: DEFAULT_STAGGER,
        }
    }

    /// Overrides the stagger interval.
    #[must_use]
    pub fn with_stagger(mut self, stagger: Duration) -> Self {
        self.stagger = stagger;
        self
    }

    /// Returns the transport selector shared by deliveries.
    #[must_use]
    pub fn selector(&self) -> &Arc<TransportSelector> {
        &self.selector
    }

    /// Delivers every artifact, item *k* dispatched after `k × stagger`.
    ///
    /// The case folder is computed by the caller exactly once per run and
    /// shared read-only by all items. Per-item failures are counted and
    /// logged; they never abort the batch, which completes only once every
    /// item has settled.
    pub async fn deliver(&self, artifacts: Vec<Artifact>, folder: &str) -> DeliveryStats {
        let stats = Arc::new(DeliveryStats::new());
        let mut handles = Vec::with_capacity(artifacts.len());

        for (index, artifact) in artifacts.into_iter().enumerate() {
            let delay = self.stagger * u32::try_from(index).unwrap_or(u32::MAX);
            let selector = Arc::clone(&self.selector);
            let folder = folder.to_string();
            let stats = Arc::clone(&stats);

            handles.push(tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                debug!(filename = %artifact.filename, delay_ms = delay.as_millis(), "dispatching artifact");
                match selector.deliver(&artifact, &folder).await {
                    Ok(()) => stats.increment_delivered(),
                    Err(error) => {
                        log_delivery_failure(&artifact, &error);
                        stats.increment_failed();
                    }
                }
            }));
        }

        for handle in handles {
            if let Err(error) = handle.await {
                warn!(error = %error, "delivery task panicked");
            }
        }

        let delivered = stats.delivered();
        let failed = stats.failed();
        info!(delivered, failed, "delivery run complete");

        match Arc::try_unwrap(stats) {
            Ok(stats) => stats,
            Err(shared) => {
                // All tasks have joined, so this branch should be unreachable;
                // rebuild from the atomic values if it ever is.
                let stats = DeliveryStats::new();
                stats.delivered.store(shared.delivered(), Ordering::SeqCst);
                stats.failed.store(shared.failed(), Ordering::SeqCst);
                stats
            }
        }
    }
}

fn log_delivery_failure(artifact: &Artifact, error: &DeliveryError) {
    warn!(
        filename = %artifact.filename,
        error = %error,
        "artifact delivery failed on all transports"
    );
}
