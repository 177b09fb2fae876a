//! Poll loop: fetch, reconcile, diff, publish.
//!
//! The tracked set lives here and nowhere else. A failed fetch leaves it
//! untouched, so an upstream outage looks like silence to subscribers rather
//! than a burst of deletes.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::{self, Instant, MissedTickBehavior};

use transit_core::{
    diff, reconcile, BoundingBox, ChangeEvent, Comparison, IdentifiedVehicle, TrackedSet,
};

use crate::broadcast::Broadcaster;
use crate::source::{PositionSource, SourceError};

/// What one tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Fetch failed; state unchanged, nothing published.
    Skipped,
    Published { updates: usize, deletes: usize },
}

pub struct Tracker<S> {
    source: S,
    hub: Broadcaster,
    area: BoundingBox,
    lines: Vec<String>,
    interval: Duration,
    comparison: Comparison,
    vehicles: TrackedSet,
}

impl<S: PositionSource> Tracker<S> {
    pub fn new(source: S, hub: Broadcaster, area: BoundingBox, lines: Vec<String>) -> Self {
        Tracker {
            source,
            hub,
            area,
            lines,
            interval: Duration::from_secs(1),
            comparison: Comparison::default(),
            vehicles: Vec::new(),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_comparison(mut self, comparison: Comparison) -> Self {
        self.comparison = comparison;
        self
    }

    /// Vehicles as of the last successful poll.
    pub fn vehicles(&self) -> &[IdentifiedVehicle] {
        &self.vehicles
    }

    /// Initial fetch. Mints an identity for every vehicle and publishes nothing.
    pub async fn seed(&mut self) -> Result<usize, SourceError> {
        let raw = self.source.list_vehicles(&self.area, &self.lines).await?;
        self.vehicles = reconcile(&[], raw, Utc::now());
        Ok(self.vehicles.len())
    }

    /// One poll cycle.
    pub async fn tick(&mut self) -> TickOutcome {
        let now = Utc::now();
        let raw = match self.source.list_vehicles(&self.area, &self.lines).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, "failed to list vehicles");
                return TickOutcome::Skipped;
            }
        };

        let reconciled = reconcile(&self.vehicles, raw, now);
        let events = diff(&self.vehicles, &reconciled, self.comparison);
        let deletes = events.iter().filter(|e| e.is_delete()).count();
        let updates = events.len() - deletes;

        for event in &events {
            self.publish(event);
        }
        self.vehicles = reconciled;

        tracing::debug!(
            updates,
            deletes,
            tracked = self.vehicles.len(),
            subscribers = self.hub.subscriber_count(),
            "tick"
        );
        TickOutcome::Published { updates, deletes }
    }

    fn publish(&self, event: &ChangeEvent) {
        match serde_json::to_vec(event) {
            Ok(bytes) => {
                self.hub.publish(bytes);
            }
            Err(e) => tracing::error!(error = %e, id = %event.id(), "failed to serialize event"),
        }
    }

    /// Seed unless `shutdown` fires first, in which case `Ok(None)`.
    pub async fn seed_until(
        &mut self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<Option<usize>, SourceError> {
        tokio::select! {
            biased;
            _ = cancelled(shutdown) => Ok(None),
            seeded = self.seed() => seeded.map(Some),
        }
    }

    /// Poll every interval until `shutdown` flips to true. Call after a
    /// successful seed; fetch errors from here on only skip a tick.
    ///
    /// A fetch still in flight when shutdown fires is abandoned; the tracked
    /// set is only replaced once a fetch has completed.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancelled(&mut shutdown) => break,
                _ = async {
                    ticker.tick().await;
                    self.tick().await
                } => {}
            }
        }

        tracing::info!("tracker stopped");
    }
}

/// Resolves once `shutdown` is true or its sender is gone.
pub async fn cancelled(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
