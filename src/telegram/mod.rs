pub mod commands;
pub mod models;

use std::{future::Future, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use crate::forwarder::DeliveryError;

use self::models::{GetUpdatesRequest, Message, SendMessageRequest, TelegramResponse, Update};

/// Seconds the server holds a `getUpdates` call open when there is nothing
/// new.
pub const LONG_POLL_SECS: u64 = 30;
/// Must exceed the long-poll window.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(LONG_POLL_SECS + 10);

/// Anything that can deliver a text message to a chat.
pub trait Notifier: Send + Sync {
    fn send(&self, chat_id: i64, text: &str) -> impl Future<Output = Result<(), DeliveryError>> + Send;
}

#[derive(Debug, Clone)]
pub struct TelegramClient {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    http: Client,
    /// `{base}/bot{token}`
    api_url: String,
}

impl TelegramClient {
    pub fn new(base_url: &str, token: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build Telegram HTTP client")?;
        Ok(Self {
            inner: Arc::new(Inner {
                http,
                api_url: format!("{}/bot{token}", base_url.trim_end_matches('/')),
            }),
        })
    }

    async fn call<B, T>(&self, method: &str, body: &B) -> Result<T, DeliveryError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}/{method}", self.inner.api_url);
        let what = format!("Telegram {method}");

        let resp = self
            .inner
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| DeliveryError::from_reqwest(e, &what))?;
        let status = resp.status();
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| DeliveryError::from_reqwest(e, &what))?;

        match serde_json::from_slice::<TelegramResponse<T>>(&bytes) {
            Ok(envelope) => envelope.into_result(),
            Err(_) if !status.is_success() => Err(DeliveryError::from_status(status, &what)),
            Err(e) => Err(DeliveryError::Permanent(format!("{what}: {e}"))),
        }
    }

    /// Long-poll for updates with id ≥ `offset`.
    pub async fn get_updates(&self, offset: i64) -> Result<Vec<Update>, DeliveryError> {
        let req = GetUpdatesRequest {
            offset,
            timeout: LONG_POLL_SECS,
            allowed_updates: &["message"],
        };
        let updates: Vec<Update> = self.call("getUpdates", &req).await?;
        debug!(offset, count = updates.len(), "Telegram updates received");
        Ok(updates)
    }

    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<Message, DeliveryError> {
        self.call("sendMessage", &SendMessageRequest { chat_id, text }).await
    }
}

impl Notifier for TelegramClient {
    async fn send(&self, chat_id: i64, text: &str) -> Result<(), DeliveryError> {
        self.send_message(chat_id, text).await.map(|_| ())
    }
}
