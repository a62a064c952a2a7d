//! OpenAI chat-completion wire types
//!
//! Inbound request body, streaming chunks, the aggregated completion object,
//! and the model list. Unknown request fields (`temperature`, `max_tokens`,
//! ...) are accepted and ignored; sampling is fixed upstream.

use freeplay_client::{ChatMessage, ModelConfig};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Terminal sentinel frame of a streaming response
pub const DONE_FRAME: &str = "data: [DONE]\n\n";

/// `POST /v1/chat/completions` body.
#[derive(Debug, Deserialize)]
pub struct ChatCompletionRequest {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub stream: bool,
}

/// Per-response identity shared by every chunk of one completion.
#[derive(Debug, Clone)]
pub struct ChunkFactory {
    id: String,
    created: u64,
    model: String,
}

impl ChunkFactory {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            id: completion_id(),
            created: unix_now(),
            model: model.into(),
        }
    }

    fn chunk(&self, delta: Value, finish_reason: Option<&str>) -> Value {
        json!({
            "id": self.id,
            "object": "chat.completion.chunk",
            "created": self.created,
            "model": self.model,
            "choices": [{
                "index": 0,
                "delta": delta,
                "finish_reason": finish_reason,
            }],
        })
    }

    /// Opening chunk assigning the assistant role.
    pub fn role(&self) -> String {
        frame(&self.chunk(json!({"role": "assistant", "content": ""}), None))
    }

    pub fn content(&self, text: &str) -> String {
        frame(&self.chunk(json!({"content": text}), None))
    }

    pub fn stop(&self) -> String {
        frame(&self.chunk(json!({}), Some("stop")))
    }

    /// Aggregated non-streaming result. Upstream reports no token counts.
    pub fn completion(&self, content: String) -> Value {
        json!({
            "id": self.id,
            "object": "chat.completion",
            "created": self.created,
            "model": self.model,
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": content},
                "finish_reason": "stop",
            }],
            "usage": {"prompt_tokens": 0, "completion_tokens": 0, "total_tokens": 0},
        })
    }
}

/// Error chunk; carries no id, it replaces the rest of the stream.
pub fn error_frame(message: &str, error_type: &str) -> String {
    frame(&json!({"error": {"message": message, "type": error_type}}))
}

/// One `data: <json>` record.
pub fn frame(value: &Value) -> String {
    format!("data: {value}\n\n")
}

/// `chatcmpl-` followed by 29 hex characters.
pub fn completion_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("chatcmpl-{}", &hex[..29])
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// `GET /v1/models` entry.
#[derive(Debug, Serialize)]
pub struct ModelEntry {
    pub id: &'static str,
    pub object: &'static str,
    pub created: u64,
    pub owned_by: &'static str,
    pub max_tokens: u32,
    pub model_id: &'static str,
}

impl From<&ModelConfig> for ModelEntry {
    fn from(model: &ModelConfig) -> Self {
        Self {
            id: model.name,
            object: "model",
            created: unix_now(),
            owned_by: "freeplay",
            max_tokens: model.max_tokens,
            model_id: model.upstream_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(frame: &str) -> Value {
        let json = frame
            .strip_prefix("data: ")
            .and_then(|s| s.strip_suffix("\n\n"))
            .unwrap();
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn completion_id_shape() {
        let id = completion_id();
        let suffix = id.strip_prefix("chatcmpl-").unwrap();
        assert_eq!(suffix.len(), 29);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn chunks_share_identity() {
        let factory = ChunkFactory::new("claude-4-sonnet");
        let role = parse(&factory.role());
        let content = parse(&factory.content("hi"));
        let stop = parse(&factory.stop());

        assert_eq!(role["id"], content["id"]);
        assert_eq!(content["id"], stop["id"]);
        assert_eq!(role["model"], "claude-4-sonnet");
        assert_eq!(role["object"], "chat.completion.chunk");
        assert_eq!(role["choices"][0]["delta"]["role"], "assistant");
        assert_eq!(role["choices"][0]["delta"]["content"], "");
        assert_eq!(role["choices"][0]["finish_reason"], Value::Null);
        assert_eq!(content["choices"][0]["delta"]["content"], "hi");
        assert_eq!(stop["choices"][0]["delta"], json!({}));
        assert_eq!(stop["choices"][0]["finish_reason"], "stop");
    }

    #[test]
    fn completion_object_shape() {
        let value = ChunkFactory::new("m").completion("hello".into());
        assert_eq!(value["object"], "chat.completion");
        assert_eq!(value["choices"][0]["message"]["role"], "assistant");
        assert_eq!(value["choices"][0]["message"]["content"], "hello");
        assert_eq!(value["usage"]["total_tokens"], 0);
    }

    #[test]
    fn error_frame_shape() {
        let value = parse(&error_frame("boom", "api_error"));
        assert_eq!(value, json!({"error": {"message": "boom", "type": "api_error"}}));
    }

    #[test]
    fn request_defaults_and_ignores_unknown_fields() {
        let req: ChatCompletionRequest = serde_json::from_str(
            r#"{"messages":[{"role":"user","content":"hi"}],"temperature":0.7}"#,
        )
        .unwrap();
        assert!(req.model.is_none());
        assert!(!req.stream);
        assert_eq!(req.messages.len(), 1);

        let req: ChatCompletionRequest = serde_json::from_str(r#"{"stream":true}"#).unwrap();
        assert!(req.messages.is_empty());
    }

    #[test]
    fn model_entry_from_config() {
        let model = freeplay_client::models::lookup("claude-4-opus-20250514").unwrap();
        let entry = serde_json::to_value(ModelEntry::from(model)).unwrap();
        assert_eq!(entry["id"], "claude-4-opus-20250514");
        assert_eq!(entry["owned_by"], "freeplay");
        assert_eq!(entry["max_tokens"], 32000);
        assert_eq!(entry["object"], "model");
    }
}
