//! Adafruit IO REST client: one feed per metric, one value per publish.

use std::{collections::HashMap, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{models::Snapshot, persistence::settings::AdafruitSettings};

use super::{DeliveryError, TelemetrySink};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// `(key, display name)` of every feed this daemon writes.
pub const FEEDS: [(&str, &str); 8] = [
    ("eco2", "eCO2"),
    ("tvoc", "TVOC"),
    ("baseline-eco2", "Baseline eCO2"),
    ("baseline-tvoc", "Baseline TVOC"),
    ("aqi", "AQI"),
    ("temperature", "Temperature"),
    ("humidity", "Humidity"),
    ("pressure", "Pressure"),
];

#[derive(Debug, Deserialize)]
pub struct Feed {
    pub key: String,
    pub name: String,
}

#[derive(Debug, Serialize)]
struct NewFeed<'a> {
    feed: NewFeedBody<'a>,
}

#[derive(Debug, Serialize)]
struct NewFeedBody<'a> {
    name: &'a str,
    key: &'a str,
}

#[derive(Debug, Serialize)]
struct DataPoint {
    value: String,
}

#[derive(Debug, Clone)]
pub struct AdafruitClient {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    http: Client,
    base_url: String,
    username: String,
    key: String,
}

impl AdafruitClient {
    pub fn new(base_url: &str, settings: &AdafruitSettings) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build Adafruit IO HTTP client")?;
        Ok(Self {
            inner: Arc::new(Inner {
                http,
                base_url: base_url.trim_end_matches('/').to_owned(),
                username: settings.username.clone(),
                key: settings.key.clone(),
            }),
        })
    }

    fn feeds_url(&self) -> String {
        format!("{}/api/v2/{}/feeds", self.inner.base_url, self.inner.username)
    }

    /// Fetch the feed, creating it when Adafruit IO answers 404.
    pub async fn ensure_feed(&self, key: &str, name: &str) -> Result<Feed, DeliveryError> {
        let url = format!("{}/{key}", self.feeds_url());
        debug!(url = %url, "Fetching Adafruit IO feed");

        let resp = self
            .inner
            .http
            .get(&url)
            .header("X-AIO-Key", &self.inner.key)
            .send()
            .await
            .map_err(|e| DeliveryError::from_reqwest(e, "Adafruit IO get feed"))?;

        if resp.status() == StatusCode::NOT_FOUND {
            return self.create_feed(key, name).await;
        }
        let resp = check_status(resp, "Adafruit IO get feed")?;
        resp.json::<Feed>()
            .await
            .map_err(|e| DeliveryError::from_reqwest(e, "Adafruit IO get feed"))
    }

    async fn create_feed(&self, key: &str, name: &str) -> Result<Feed, DeliveryError> {
        info!(feed = key, "Creating Adafruit IO feed");
        let body = NewFeed {
            feed: NewFeedBody { name, key },
        };
        let resp = self
            .inner
            .http
            .post(self.feeds_url())
            .header("X-AIO-Key", &self.inner.key)
            .json(&body)
            .send()
            .await
            .map_err(|e| DeliveryError::from_reqwest(e, "Adafruit IO create feed"))?;
        let resp = check_status(resp, "Adafruit IO create feed")?;
        resp.json::<Feed>()
            .await
            .map_err(|e| DeliveryError::from_reqwest(e, "Adafruit IO create feed"))
    }

    pub async fn send_value(&self, feed_key: &str, value: f64) -> Result<(), DeliveryError> {
        let url = format!("{}/{feed_key}/data", self.feeds_url());
        let resp = self
            .inner
            .http
            .post(&url)
            .header("X-AIO-Key", &self.inner.key)
            .json(&DataPoint {
                value: value.to_string(),
            })
            .send()
            .await
            .map_err(|e| DeliveryError::from_reqwest(e, "Adafruit IO send data"))?;
        check_status(resp, "Adafruit IO send data")?;
        Ok(())
    }
}

fn check_status(resp: reqwest::Response, what: &str) -> Result<reqwest::Response, DeliveryError> {
    let status = resp.status();
    if status.is_success() {
        Ok(resp)
    } else {
        Err(DeliveryError::from_status(status, what))
    }
}

/// Scalar value per feed key. Metrics without a value are left out.
pub fn feed_values(snapshot: &Snapshot) -> Vec<(&'static str, f64)> {
    let r = &snapshot.reading;
    let candidates = [
        ("eco2", r.co2_ppm.map(f64::from)),
        ("tvoc", r.voc_ppb.map(f64::from)),
        ("baseline-eco2", r.baseline.map(|b| f64::from(b.eco2))),
        ("baseline-tvoc", r.baseline.map(|b| f64::from(b.tvoc))),
        ("aqi", snapshot.aqi().map(f64::from)),
        ("temperature", r.temperature_c.map(f64::from)),
        ("humidity", r.humidity_pct.map(f64::from)),
        ("pressure", r.pressure_hpa.map(f64::from)),
    ];
    candidates
        .into_iter()
        .filter_map(|(key, value)| value.map(|v| (key, v)))
        .collect()
}

pub struct AdafruitSink {
    client: AdafruitClient,
    /// Our feed key to the key Adafruit IO reported for it.
    feeds: HashMap<&'static str, String>,
}

impl AdafruitSink {
    pub fn new(client: AdafruitClient) -> Self {
        Self {
            client,
            feeds: HashMap::new(),
        }
    }

    async fn resolve(&mut self, key: &'static str) -> Result<String, DeliveryError> {
        if let Some(resolved) = self.feeds.get(key) {
            return Ok(resolved.clone());
        }
        let name = FEEDS
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, name)| *name)
            .unwrap_or(key);
        let feed = self.client.ensure_feed(key, name).await?;
        debug!(feed = key, resolved = %feed.key, name = %feed.name, "Adafruit IO feed resolved");
        self.feeds.insert(key, feed.key.clone());
        Ok(feed.key)
    }
}

impl TelemetrySink for AdafruitSink {
    fn name(&self) -> &'static str {
        "adafruit"
    }

    async fn publish(&mut self, snapshot: &Snapshot) -> Result<(), DeliveryError> {
        for (key, value) in feed_values(snapshot) {
            let feed = self.resolve(key).await?;
            self.client.send_value(&feed, value).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashSet,
        sync::{Arc, Mutex},
    };

    use axum::{
        extract::{Path, State},
        http::{HeaderMap, StatusCode},
        routing::{get, post},
        Json, Router,
    };
    use chrono::DateTime;
    use serde_json::{json, Value};
    use tokio::net::TcpListener;

    use super::*;
    use crate::models::{BaselineWords, Classification, Reading};

    #[derive(Clone, Default)]
    struct FakeAio {
        feeds: Arc<Mutex<HashSet<String>>>,
        requests: Arc<Mutex<Vec<String>>>,
    }

    fn authorized(headers: &HeaderMap) -> bool {
        headers.get("X-AIO-Key").and_then(|v| v.to_str().ok()) == Some("aio_test")
    }

    async fn get_feed(
        State(aio): State<FakeAio>,
        headers: HeaderMap,
        Path((_user, key)): Path<(String, String)>,
    ) -> (StatusCode, Json<Value>) {
        aio.requests.lock().unwrap().push(format!("GET {key}"));
        if !authorized(&headers) {
            return (StatusCode::UNAUTHORIZED, Json(json!({"error": "invalid key"})));
        }
        if aio.feeds.lock().unwrap().contains(&key) {
            (StatusCode::OK, Json(json!({"key": key, "name": key})))
        } else {
            (StatusCode::NOT_FOUND, Json(json!({"error": "not found"})))
        }
    }

    async fn create_feed(State(aio): State<FakeAio>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
        let key = body["feed"]["key"].as_str().unwrap_or_default().to_owned();
        aio.requests.lock().unwrap().push(format!("CREATE {key}"));
        aio.feeds.lock().unwrap().insert(key.clone());
        (StatusCode::CREATED, Json(json!({"key": key, "name": body["feed"]["name"]})))
    }

    async fn add_data(
        State(aio): State<FakeAio>,
        Path((_user, key)): Path<(String, String)>,
        Json(body): Json<Value>,
    ) -> StatusCode {
        let value = body["value"].as_str().unwrap_or_default();
        aio.requests.lock().unwrap().push(format!("DATA {key}={value}"));
        StatusCode::OK
    }

    async fn serve(aio: FakeAio) -> String {
        let app = Router::new()
            .route("/api/v2/{user}/feeds", post(create_feed))
            .route("/api/v2/{user}/feeds/{key}", get(get_feed))
            .route("/api/v2/{user}/feeds/{key}/data", post(add_data))
            .with_state(aio);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}")
    }

    fn settings(key: &str) -> AdafruitSettings {
        AdafruitSettings {
            username: "calcifer".into(),
            key: key.into(),
        }
    }

    fn snapshot() -> Snapshot {
        let ts = DateTime::from_timestamp(1_760_000_000, 0).unwrap();
        Snapshot {
            reading: Reading {
                co2_ppm: Some(612),
                voc_ppb: Some(33),
                baseline: Some(BaselineWords { eco2: 37934, tvoc: 38164 }),
                ..Reading::unknown(ts)
            },
            classification: Classification::Good,
            outdoor: None,
        }
    }

    #[test]
    fn feed_values_skip_missing_metrics() {
        let values = feed_values(&snapshot());
        let keys: Vec<_> = values.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec!["eco2", "tvoc", "baseline-eco2", "baseline-tvoc"]);
        assert_eq!(values[0].1, 612.0);
    }

    #[tokio::test]
    async fn publish_creates_missing_feeds_once() {
        let aio = FakeAio::default();
        aio.feeds.lock().unwrap().insert("eco2".into());
        let base = serve(aio.clone()).await;

        let mut sink = AdafruitSink::new(AdafruitClient::new(&base, &settings("aio_test")).unwrap());
        sink.publish(&snapshot()).await.unwrap();
        sink.publish(&snapshot()).await.unwrap();

        let requests = aio.requests.lock().unwrap().clone();
        assert_eq!(requests.iter().filter(|r| r.starts_with("GET ")).count(), 4);
        assert_eq!(
            requests.iter().filter(|r| r.starts_with("CREATE ")).cloned().collect::<Vec<_>>(),
            vec!["CREATE tvoc", "CREATE baseline-eco2", "CREATE baseline-tvoc"]
        );
        assert_eq!(requests.iter().filter(|r| *r == "DATA eco2=612").count(), 2);
        assert!(requests.contains(&"DATA baseline-tvoc=38164".to_owned()));
    }

    #[tokio::test]
    async fn bad_key_is_permanent() {
        let base = serve(FakeAio::default()).await;
        let mut sink = AdafruitSink::new(AdafruitClient::new(&base, &settings("wrong")).unwrap());
        let err = sink.publish(&snapshot()).await.unwrap_err();
        assert!(!err.is_transient(), "{err}");
    }

    #[tokio::test]
    async fn unreachable_host_is_transient() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = AdafruitClient::new(&format!("http://{addr}"), &settings("aio_test")).unwrap();
        let err = client.send_value("eco2", 1.0).await.unwrap_err();
        assert!(err.is_transient(), "{err}");
    }
}
