//! The per-tick pipeline and the state it owns.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::{
    alerts::{subscriptions::Subscribers, AlertKind, Dispatcher},
    classifier::classify,
    config::Language,
    display::Display,
    forwarder::{Forwarder, TelemetrySink},
    messages,
    models::Snapshot,
    outdoor::OutdoorMonitor,
    persistence::Persistence,
    sensors::SensorSource,
    snapshot_cache::SnapshotCache,
    telegram::Notifier,
};

pub struct App<N, T> {
    sensors: Box<dyn SensorSource>,
    display: Display,
    persistence: Persistence,
    dispatcher: Dispatcher,
    forwarder: Forwarder<T>,
    outdoor: OutdoorMonitor,
    cache: SnapshotCache,
    subscribers: Subscribers,
    notifier: Option<N>,
    language: Language,
}

impl<N: Notifier, T: TelemetrySink> App<N, T> {
    pub fn new(
        sensors: Box<dyn SensorSource>,
        display: Display,
        persistence: Persistence,
        dispatcher: Dispatcher,
        forwarder: Forwarder<T>,
        outdoor: OutdoorMonitor,
    ) -> Self {
        Self {
            sensors,
            display,
            persistence,
            dispatcher,
            forwarder,
            outdoor,
            cache: SnapshotCache::new(),
            subscribers: Subscribers::new(),
            notifier: None,
            language: Language::Spanish,
        }
    }

    /// Deliver alerts through `notifier`, written in `language`.
    pub fn with_notifier(mut self, notifier: N, language: Language) -> Self {
        self.notifier = Some(notifier);
        self.language = language;
        self
    }

    pub fn cache(&self) -> SnapshotCache {
        self.cache.clone()
    }

    pub fn subscribers(&self) -> Subscribers {
        self.subscribers.clone()
    }

    pub fn forwarder(&self) -> &Forwarder<T> {
        &self.forwarder
    }

    /// One sample through every stage. A failing stage is logged and the
    /// remaining stages still run.
    pub async fn tick(&mut self, now: DateTime<Utc>) {
        let reading = self.sensors.sample(now);
        let classification = classify(&reading);
        let snapshot = Snapshot {
            reading,
            classification,
            outdoor: self.outdoor.latest().cloned(),
        };
        debug!(%classification, "{}", messages::readings_line(&snapshot));
        self.cache.update(snapshot.clone()).await;

        contain("persistence", self.persistence.tick(&snapshot.reading, now).await);
        contain("display", self.display.tick(&snapshot));
        contain("alerts", self.alerts(&snapshot).await);
        self.forwarder.tick(&snapshot, now).await;
        self.outdoor.tick(now).await;
    }

    async fn alerts(&mut self, snapshot: &Snapshot) -> Result<()> {
        let Some(kind) = self.dispatcher.observe(snapshot.classification) else {
            return Ok(());
        };
        self.forwarder.alert(kind, snapshot).await;

        let Some(notifier) = &self.notifier else {
            return Ok(());
        };
        let text = match kind {
            AlertKind::Good => messages::good_alert(snapshot, self.language),
            AlertKind::Bad => messages::bad_alert(snapshot, self.language),
        };

        let recipients = self.subscribers.list().await;
        let mut failed = 0;
        for &chat_id in &recipients {
            if let Err(e) = notifier.send(chat_id, &text).await {
                warn!(chat_id, error = %e, "Alert not delivered");
                failed += 1;
            }
        }
        info!(?kind, recipients = recipients.len(), failed, "Alert sent");

        if failed > 0 {
            bail!("{failed} of {} alert notifications failed", recipients.len());
        }
        Ok(())
    }

    /// Screen off and sinks told we are going away.
    pub async fn shutdown(&mut self) {
        contain("display", self.display.shutdown());
        self.forwarder.shutdown().await;
        info!(
            published = self.forwarder.published(),
            failed = self.forwarder.failed(),
            "Pipeline stopped"
        );
    }
}

fn contain(stage: &'static str, result: Result<()>) {
    if let Err(e) = result {
        let chain = format!("{e:#}");
        error!(stage, error = %chain, "Tick stage failed");
    }
}
