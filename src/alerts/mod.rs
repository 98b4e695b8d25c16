pub mod subscriptions;

use serde::Serialize;
use tracing::{debug, info};
use utoipa::ToSchema;

use crate::models::Classification;

pub use self::subscriptions::Subscribers;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// Air became good after a bad or medium period.
    Good,
    /// Air has stayed bad for a sustained period.
    Bad,
}

/// Fires once after `threshold` consecutive ticks of `target`.
///
/// When armed, a matching tick adds to the run and any other tick resets it.
/// The watcher fires when the run exceeds `threshold`, then disarms until a
/// non-matching tick is seen again.
#[derive(Debug, Clone)]
pub struct SustainedWatcher {
    target: Classification,
    threshold: u32,
    watching: bool,
    count: u32,
}

impl SustainedWatcher {
    /// Armed from the first tick.
    pub fn new(target: Classification, threshold: u32) -> Self {
        Self {
            target,
            threshold,
            watching: true,
            count: 0,
        }
    }

    /// Arms on the first tick that does not match `target`.
    pub fn disarmed(target: Classification, threshold: u32) -> Self {
        Self {
            watching: false,
            ..Self::new(target, threshold)
        }
    }

    /// Feed one tick's classification. Returns `true` on the firing tick.
    pub fn observe(&mut self, classification: Classification) -> bool {
        let matches = classification == self.target;

        if !self.watching && !matches {
            self.watching = true;
            debug!(target_class = %self.target, "Watcher re-armed");
        }
        if !self.watching {
            return false;
        }

        self.count = if matches { self.count + 1 } else { 0 };

        if self.count > self.threshold {
            self.watching = false;
            self.count = 0;
            return true;
        }
        false
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn is_watching(&self) -> bool {
        self.watching
    }
}

/// The pair of watchers that decide when subscribers get notified.
///
/// "Became good" only means something after a period that was not good, so
/// that watcher starts disarmed. "Became bad" starts armed: bad air from
/// startup onwards still alerts.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    good: SustainedWatcher,
    bad: SustainedWatcher,
}

impl Dispatcher {
    pub fn new(good_ticks: u32, bad_ticks: u32) -> Self {
        Self {
            good: SustainedWatcher::disarmed(Classification::Good, good_ticks),
            bad: SustainedWatcher::new(Classification::Bad, bad_ticks),
        }
    }

    /// Both watchers see every tick; at most one can fire since their
    /// targets differ.
    pub fn observe(&mut self, classification: Classification) -> Option<AlertKind> {
        let good = self.good.observe(classification);
        let bad = self.bad.observe(classification);
        let kind = match (good, bad) {
            (true, _) => Some(AlertKind::Good),
            (_, true) => Some(AlertKind::Bad),
            _ => None,
        };
        if let Some(kind) = kind {
            info!(kind = ?kind, "Air quality alert fired");
        }
        kind
    }
}
