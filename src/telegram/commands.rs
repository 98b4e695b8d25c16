//! Chat commands: `start`, `alerts` and `disable_alerts`.

use std::{collections::HashSet, time::Duration};

use tokio::time;
use tracing::{debug, error, info, warn};

use crate::{
    alerts::Subscribers,
    config::Language,
    forwarder::DeliveryError,
    messages,
    snapshot_cache::SnapshotCache,
};

use super::{models::Update, TelegramClient};

const ERROR_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Alerts,
    DisableAlerts,
}

/// Parse `/name`, `/name@bot` or `/name args`. Anything else is `None`.
pub fn parse(text: &str) -> Option<Command> {
    let word = text.split_whitespace().next()?;
    let name = word.strip_prefix('/')?;
    let name = name.split('@').next().unwrap_or(name);
    match name {
        "start" => Some(Command::Start),
        "alerts" => Some(Command::Alerts),
        "disable_alerts" => Some(Command::DisableAlerts),
        _ => None,
    }
}

/// Turns commands into replies. Only users in the allow-list get an answer.
#[derive(Clone)]
pub struct CommandHandler {
    authorized: HashSet<i64>,
    subscribers: Subscribers,
    cache: SnapshotCache,
    language: Language,
}

impl CommandHandler {
    pub fn new(
        authorized: impl IntoIterator<Item = i64>,
        subscribers: Subscribers,
        cache: SnapshotCache,
        language: Language,
    ) -> Self {
        Self {
            authorized: authorized.into_iter().collect(),
            subscribers,
            cache,
            language,
        }
    }

    pub fn is_authorized(&self, user_id: i64) -> bool {
        self.authorized.contains(&user_id)
    }

    /// The reply for `text` sent by `user_id` in `chat_id`, or `None` when
    /// the sender is not allowed or the text is not a command.
    pub async fn handle(&self, user_id: i64, chat_id: i64, text: &str) -> Option<String> {
        let command = parse(text)?;
        if !self.is_authorized(user_id) {
            warn!(user_id, chat_id, command = ?command, "Unauthorized access denied");
            return None;
        }
        info!(user_id, chat_id, command = ?command, "Chat command");

        let lang = self.language;
        let reply = match command {
            Command::Start => {
                let snapshot = self.cache.latest().await;
                messages::status_reply(snapshot.as_ref(), lang)
            }
            Command::Alerts => {
                if self.subscribers.subscribe(chat_id).await {
                    messages::alerts_enabled(lang).to_owned()
                } else {
                    messages::alerts_already_enabled(lang).to_owned()
                }
            }
            Command::DisableAlerts => {
                if self.subscribers.unsubscribe(chat_id).await {
                    messages::alerts_disabled(lang).to_owned()
                } else {
                    messages::alerts_not_enabled(lang).to_owned()
                }
            }
        };
        Some(reply)
    }
}

/// Long-polls the Bot API and answers commands.
pub struct CommandService {
    client: TelegramClient,
    handler: CommandHandler,
    offset: i64,
}

impl CommandService {
    pub fn new(client: TelegramClient, handler: CommandHandler) -> Self {
        Self {
            client,
            handler,
            offset: 0,
        }
    }

    /// Runs the poll loop indefinitely.
    /// Spawn this via `tokio::spawn`.
    pub async fn run(mut self) {
        info!("Telegram command loop started");
        loop {
            if let Err(e) = self.poll_once().await {
                match e {
                    DeliveryError::Transient(_) => warn!(error = %e, "Telegram poll failed"),
                    DeliveryError::Permanent(_) => error!(error = %e, "Telegram poll rejected"),
                }
                time::sleep(ERROR_BACKOFF).await;
            }
        }
    }

    /// One `getUpdates` round trip. Returns the number of updates seen.
    pub async fn poll_once(&mut self) -> Result<usize, DeliveryError> {
        let updates = self.client.get_updates(self.offset).await?;
        for update in &updates {
            self.offset = self.offset.max(update.update_id + 1);
            self.dispatch(update).await;
        }
        Ok(updates.len())
    }

    async fn dispatch(&self, update: &Update) {
        let Some(message) = &update.message else {
            return;
        };
        let (Some(from), Some(text)) = (&message.from, &message.text) else {
            return;
        };
        let Some(reply) = self.handler.handle(from.id, message.chat.id, text).await else {
            debug!(user_id = from.id, username = ?from.username, "Ignoring message");
            return;
        };
        match self.client.send_message(message.chat.id, &reply).await {
            Ok(sent) => debug!(chat_id = message.chat.id, message_id = sent.message_id, "Reply sent"),
            Err(e) => warn!(chat_id = message.chat.id, error = %e, "Failed to send reply"),
        }
    }
}
