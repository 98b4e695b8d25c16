pub mod adafruit;
pub mod mqtt;

use std::future::Future;

use chrono::{DateTime, TimeDelta, Utc};
use reqwest::StatusCode;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{alerts::AlertKind, models::Snapshot, scheduler::Schedule};

use self::{adafruit::AdafruitSink, mqtt::MqttSink};

/// Outcome of one delivery attempt to an external service.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    /// Worth retrying next cycle: network errors, timeouts, 5xx, full queues.
    #[error("transient: {0}")]
    Transient(String),
    /// Retrying will not help: 4xx, bad credentials, malformed payloads.
    #[error("permanent: {0}")]
    Permanent(String),
}

impl DeliveryError {
    pub fn from_status(status: StatusCode, what: &str) -> Self {
        let msg = format!("{what} returned {status}");
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            Self::Transient(msg)
        } else {
            Self::Permanent(msg)
        }
    }

    pub fn from_reqwest(err: reqwest::Error, what: &str) -> Self {
        if let Some(status) = err.status() {
            return Self::from_status(status, what);
        }
        if err.is_decode() || err.is_builder() {
            Self::Permanent(format!("{what}: {err}"))
        } else {
            Self::Transient(format!("{what}: {err}"))
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// A destination for periodic telemetry.
pub trait TelemetrySink: Send {
    fn name(&self) -> &'static str;

    fn publish(&mut self, snapshot: &Snapshot) -> impl Future<Output = Result<(), DeliveryError>> + Send;

    /// Called once per fired alert. Most sinks ignore alerts.
    fn on_alert(
        &mut self,
        _kind: AlertKind,
        _snapshot: &Snapshot,
    ) -> impl Future<Output = Result<(), DeliveryError>> + Send {
        async { Ok(()) }
    }

    /// Called once before the process exits.
    fn shutdown(&mut self) -> impl Future<Output = Result<(), DeliveryError>> + Send {
        async { Ok(()) }
    }
}

/// The sinks available in production.
pub enum Sink {
    Adafruit(AdafruitSink),
    Mqtt(MqttSink),
}

impl TelemetrySink for Sink {
    fn name(&self) -> &'static str {
        match self {
            Sink::Adafruit(s) => s.name(),
            Sink::Mqtt(s) => s.name(),
        }
    }

    async fn publish(&mut self, snapshot: &Snapshot) -> Result<(), DeliveryError> {
        match self {
            Sink::Adafruit(s) => s.publish(snapshot).await,
            Sink::Mqtt(s) => s.publish(snapshot).await,
        }
    }

    async fn on_alert(&mut self, kind: AlertKind, snapshot: &Snapshot) -> Result<(), DeliveryError> {
        match self {
            Sink::Adafruit(s) => s.on_alert(kind, snapshot).await,
            Sink::Mqtt(s) => s.on_alert(kind, snapshot).await,
        }
    }

    async fn shutdown(&mut self) -> Result<(), DeliveryError> {
        match self {
            Sink::Adafruit(s) => s.shutdown().await,
            Sink::Mqtt(s) => s.go_offline().await,
        }
    }
}

/// Sends the snapshot to every sink once the warm-up has passed, then on a
/// fixed interval. A failed publish is logged and dropped.
pub struct Forwarder<T> {
    sinks: Vec<T>,
    schedule: Schedule,
    published: u64,
    failed: u64,
}

impl<T: TelemetrySink> Forwarder<T> {
    pub fn new(sinks: Vec<T>, now: DateTime<Utc>, warmup: TimeDelta, interval: TimeDelta) -> Self {
        info!(
            sinks = sinks.len(),
            warmup_secs = warmup.num_seconds(),
            interval_secs = interval.num_seconds(),
            "Forwarder configured"
        );
        Self {
            sinks,
            schedule: Schedule::starting_at(now + warmup, interval),
            published: 0,
            failed: 0,
        }
    }

    /// Publish if due. Returns whether a cycle ran.
    pub async fn tick(&mut self, snapshot: &Snapshot, now: DateTime<Utc>) -> bool {
        if self.sinks.is_empty() || !self.schedule.poll(now) {
            return false;
        }
        for sink in &mut self.sinks {
            let result = sink.publish(snapshot).await;
            let name = sink.name();
            match result {
                Ok(()) => {
                    self.published += 1;
                    debug!(sink = name, "Telemetry published");
                }
                Err(e) => {
                    self.failed += 1;
                    log_failure(name, "publish", &e);
                }
            }
        }
        true
    }

    pub async fn alert(&mut self, kind: AlertKind, snapshot: &Snapshot) {
        for sink in &mut self.sinks {
            let result = sink.on_alert(kind, snapshot).await;
            if let Err(e) = result {
                log_failure(sink.name(), "alert", &e);
            }
        }
    }

    pub async fn shutdown(&mut self) {
        for sink in &mut self.sinks {
            let result = sink.shutdown().await;
            if let Err(e) = result {
                log_failure(sink.name(), "shutdown", &e);
            }
        }
    }

    pub fn sinks_mut(&mut self) -> &mut [T] {
        &mut self.sinks
    }

    pub fn published(&self) -> u64 {
        self.published
    }

    pub fn failed(&self) -> u64 {
        self.failed
    }
}

fn log_failure(sink: &str, op: &str, err: &DeliveryError) {
    match err {
        DeliveryError::Transient(msg) => warn!(sink, op, error = %msg, "Delivery failed, will retry next cycle"),
        DeliveryError::Permanent(msg) => error!(sink, op, error = %msg, "Delivery rejected"),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{Classification, Reading};

    /// Fails every publish with a transient error and counts attempts.
    #[derive(Default)]
    pub struct FailingSink {
        pub attempts: u32,
    }

    impl TelemetrySink for FailingSink {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn publish(&mut self, _snapshot: &Snapshot) -> Result<(), DeliveryError> {
            self.attempts += 1;
            Err(DeliveryError::Transient("connection refused".into()))
        }
    }

    #[derive(Default)]
    struct CountingSink {
        publishes: u32,
        alerts: Vec<AlertKind>,
    }

    impl TelemetrySink for CountingSink {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn publish(&mut self, _snapshot: &Snapshot) -> Result<(), DeliveryError> {
            self.publishes += 1;
            Ok(())
        }

        async fn on_alert(&mut self, kind: AlertKind, _snapshot: &Snapshot) -> Result<(), DeliveryError> {
            self.alerts.push(kind);
            Ok(())
        }
    }

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_760_000_000, 0).unwrap()
    }

    fn snapshot() -> Snapshot {
        Snapshot {
            reading: Reading {
                co2_ppm: Some(612),
                voc_ppb: Some(33),
                ..Reading::unknown(t0())
            },
            classification: Classification::Good,
            outdoor: None,
        }
    }

    #[test]
    fn status_classes() {
        assert!(DeliveryError::from_status(StatusCode::BAD_GATEWAY, "x").is_transient());
        assert!(DeliveryError::from_status(StatusCode::TOO_MANY_REQUESTS, "x").is_transient());
        assert!(!DeliveryError::from_status(StatusCode::UNAUTHORIZED, "x").is_transient());
        assert!(!DeliveryError::from_status(StatusCode::NOT_FOUND, "x").is_transient());
    }

    #[tokio::test]
    async fn waits_for_warmup() {
        let mut f = Forwarder::new(
            vec![CountingSink::default()],
            t0(),
            TimeDelta::seconds(900),
            TimeDelta::seconds(30),
        );
        for s in 0..900 {
            assert!(!f.tick(&snapshot(), t0() + TimeDelta::seconds(s)).await);
        }
        assert!(f.tick(&snapshot(), t0() + TimeDelta::seconds(900)).await);
        assert!(!f.tick(&snapshot(), t0() + TimeDelta::seconds(929)).await);
        assert!(f.tick(&snapshot(), t0() + TimeDelta::seconds(930)).await);
        assert_eq!(f.published(), 2);
    }

    #[tokio::test]
    async fn failures_are_counted_and_retried_next_cycle() {
        let mut f = Forwarder::new(
            vec![FailingSink::default()],
            t0(),
            TimeDelta::zero(),
            TimeDelta::seconds(1),
        );
        for s in 0..3 {
            assert!(f.tick(&snapshot(), t0() + TimeDelta::seconds(s)).await);
        }
        assert_eq!(f.failed(), 3);
        assert_eq!(f.published(), 0);

        assert!(f.tick(&snapshot(), t0() + TimeDelta::seconds(3)).await);
        assert_eq!(f.sinks_mut()[0].attempts, 4);
    }

    #[tokio::test]
    async fn alerts_reach_every_sink() {
        let mut f = Forwarder::new(
            vec![CountingSink::default(), CountingSink::default()],
            t0(),
            TimeDelta::zero(),
            TimeDelta::seconds(30),
        );
        f.alert(AlertKind::Bad, &snapshot()).await;
        assert!(f.sinks_mut().iter().all(|s| s.alerts == vec![AlertKind::Bad]));
    }

    #[tokio::test]
    async fn no_sinks_never_runs() {
        let mut f: Forwarder<CountingSink> = Forwarder::new(vec![], t0(), TimeDelta::zero(), TimeDelta::seconds(1));
        assert!(!f.tick(&snapshot(), t0()).await);
    }
}
