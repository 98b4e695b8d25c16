use serde::{Deserialize, Serialize};

use crate::forwarder::DeliveryError;

// ---------------------------------------------------------------------------
// Bot API envelope
//
// Success:
//   { "ok": true, "result": <T> }
//
// Failure:
//   { "ok": false, "error_code": 401, "description": "Unauthorized" }
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct TelegramResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub error_code: Option<u16>,
    pub description: Option<String>,
}

impl<T> TelegramResponse<T> {
    /// Rate limits and server errors are transient; everything else the API
    /// rejects is permanent.
    pub fn into_result(self) -> Result<T, DeliveryError> {
        if self.ok {
            return self.result.ok_or_else(|| {
                DeliveryError::Permanent("Telegram response: ok=true but result is missing".into())
            });
        }
        let code = self.error_code.unwrap_or(0);
        let msg = format!(
            "Telegram API error: code={code}, description={}",
            self.description.as_deref().unwrap_or("(no description)")
        );
        if code == 429 || code >= 500 {
            Err(DeliveryError::Transient(msg))
        } else {
            Err(DeliveryError::Permanent(msg))
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub from: Option<User>,
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Serialize)]
pub struct GetUpdatesRequest {
    pub offset: i64,
    pub timeout: u64,
    pub allowed_updates: &'static [&'static str],
}

#[derive(Debug, Serialize)]
pub struct SendMessageRequest<'a> {
    pub chat_id: i64,
    pub text: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_update_batch() {
        let raw = r#"{"ok": true, "result": [
            {"update_id": 10, "message": {"message_id": 1, "from": {"id": 42, "is_bot": false, "first_name": "A"},
             "chat": {"id": 42, "type": "private"}, "date": 0, "text": "/start"}},
            {"update_id": 11, "edited_message": {}}
        ]}"#;
        let updates = serde_json::from_str::<TelegramResponse<Vec<Update>>>(raw)
            .unwrap()
            .into_result()
            .unwrap();
        assert_eq!(updates.len(), 2);
        let msg = updates[0].message.as_ref().unwrap();
        assert_eq!(msg.from.as_ref().unwrap().id, 42);
        assert_eq!(msg.text.as_deref(), Some("/start"));
        assert!(updates[1].message.is_none());
    }

    #[test]
    fn error_codes_map_to_delivery_errors() {
        let unauthorized: TelegramResponse<()> =
            serde_json::from_str(r#"{"ok": false, "error_code": 401, "description": "Unauthorized"}"#).unwrap();
        assert!(!unauthorized.into_result().unwrap_err().is_transient());

        let limited: TelegramResponse<()> =
            serde_json::from_str(r#"{"ok": false, "error_code": 429, "description": "Too Many Requests"}"#).unwrap();
        assert!(limited.into_result().unwrap_err().is_transient());
    }
}
