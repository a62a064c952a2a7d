//! Completion call against a project's llm-completions endpoint
//!
//! The request is a multipart form with a single `json_data` field. The
//! response body is a line-delimited event stream; interpreting it is the
//! gateway's job, this module only issues the call.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::accounts::Account;
use crate::constants::{
    FREEPLAY_BASE_URL, JSON_DATA_FIELD, TEMPERATURE, TOP_K, TOP_P, USER_AGENT, completions_path,
    session_cookie,
};
use crate::error::{Error, Result};
use crate::models::ModelConfig;

/// One conversation message, passed upstream verbatim.
///
/// `content` may be a string, an array of content parts, or null. Fields
/// other than `role` and `content` (`name`, `tool_calls`, ...) ride along
/// in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatMessage {
    /// Plain text message.
    pub fn text(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: Value::String(content.into()),
            extra: Map::new(),
        }
    }
}

/// Body of the `json_data` form field.
#[derive(Debug, Serialize)]
pub struct CompletionRequest<'a> {
    pub messages: &'a [ChatMessage],
    pub params: Vec<Value>,
    pub model_id: &'a str,
    pub variables: Value,
    pub history: Option<Value>,
    pub asset_references: Value,
}

impl<'a> CompletionRequest<'a> {
    pub fn new(messages: &'a [ChatMessage], model: &'a ModelConfig) -> Self {
        Self {
            messages,
            params: sampling_params(model.max_tokens),
            model_id: model.upstream_id,
            variables: json!({}),
            history: None,
            asset_references: json!({}),
        }
    }
}

/// Fixed sampling parameters. Only `max_tokens` varies, by model.
fn sampling_params(max_tokens: u32) -> Vec<Value> {
    vec![
        json!({
            "initial_value": max_tokens,
            "is_advanced": false,
            "name": "max_tokens",
            "nested_fields": null,
            "range": null,
            "str_options": null,
            "tooltipText": null,
            "type": "integer",
            "value": max_tokens,
        }),
        json!({"name": "temperature", "value": TEMPERATURE, "type": "float"}),
        json!({"name": "top_p", "value": TOP_P, "type": "float"}),
        json!({"name": "top_k", "value": TOP_K, "type": "integer"}),
    ]
}

/// Issues completion calls. Cheap to clone (shares the connection pool).
#[derive(Debug, Clone)]
pub struct CompletionClient {
    client: reqwest::Client,
    base_url: String,
}

impl CompletionClient {
    pub fn with_base_url(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Send one completion attempt with the given account.
    ///
    /// Returns the raw response whatever its status; only transport failures
    /// are errors. The caller classifies non-200 outcomes.
    pub async fn send(
        &self,
        account: &Account,
        messages: &[ChatMessage],
        model: &ModelConfig,
    ) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, completions_path(&account.project_id));
        let payload = serde_json::to_string(&CompletionRequest::new(messages, model))
            .map_err(|e| Error::Request(format!("serializing completion request: {e}")))?;
        let form = reqwest::multipart::Form::new().text(JSON_DATA_FIELD, payload);

        debug!(
            account = %account.email,
            model = model.name,
            messages = messages.len(),
            "sending completion request"
        );

        self.client
            .post(&url)
            .header("accept", "*/*")
            .header("origin", FREEPLAY_BASE_URL)
            .header("user-agent", USER_AGENT)
            .header("cookie", session_cookie(account.session_id.expose()))
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::Http(format!("completion request failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models;
    use axum::Router;
    use axum::extract::{Multipart, Path};
    use axum::http::HeaderMap;
    use axum::routing::post;
    use common::Secret;

    fn account() -> Account {
        Account {
            email: "a@x".into(),
            password: Secret::default(),
            session_id: Secret::new("sess-1".into()),
            project_id: "proj-1".into(),
            balance: 5.0,
        }
    }

    #[test]
    fn request_carries_fixed_sampling_params() {
        let messages = vec![ChatMessage::text("user", "hi")];
        let model = models::lookup("claude-4-opus-20250514").unwrap();
        let value = serde_json::to_value(CompletionRequest::new(&messages, model)).unwrap();

        assert_eq!(value["model_id"], "bebc7dd5-a24d-4147-85b0-8f62902ea1a3");
        assert_eq!(value["history"], Value::Null);
        assert_eq!(value["variables"], json!({}));
        assert_eq!(value["messages"][0]["content"], "hi");

        let params = value["params"].as_array().unwrap();
        assert_eq!(params[0]["name"], "max_tokens");
        assert_eq!(params[0]["value"], 32000);
        assert_eq!(params[0]["initial_value"], 32000);
        assert_eq!(params[1]["value"], 0.08);
        assert_eq!(params[2]["value"], 0.14);
        assert_eq!(params[3]["value"], 1);
    }

    #[test]
    fn message_shapes_pass_through_unchanged() {
        let raw = json!([
            {"role": "system", "content": "be brief"},
            {"role": "user", "content": [{"type": "text", "text": "hi"}]},
            {"role": "assistant", "content": null, "tool_calls": [{"id": "c1"}]},
            {"role": "user", "name": "bob"},
        ]);
        let messages: Vec<ChatMessage> = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(messages[1].content[0]["text"], "hi");
        assert!(messages[2].content.is_null());
        assert_eq!(messages[3].extra["name"], "bob");

        let model = models::lookup(models::DEFAULT_MODEL).unwrap();
        let value = serde_json::to_value(CompletionRequest::new(&messages, model)).unwrap();
        assert_eq!(value["messages"][0], raw[0]);
        assert_eq!(value["messages"][1], raw[1]);
        assert_eq!(value["messages"][2], raw[2]);
        assert_eq!(value["messages"][3]["name"], "bob");
    }

    #[tokio::test]
    async fn send_posts_multipart_with_session_cookie() {
        // Echo back what the endpoint saw so the test can inspect it
        let app = Router::new().route(
            "/app_data/projects/{project}/llm-completions",
            post(
                |Path(project): Path<String>, headers: HeaderMap, mut form: Multipart| async move {
                    let mut json_data = String::new();
                    while let Some(field) = form.next_field().await.unwrap() {
                        if field.name() == Some(JSON_DATA_FIELD) {
                            json_data = field.text().await.unwrap();
                        }
                    }
                    let cookie = headers
                        .get("cookie")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    axum::Json(json!({"project": project, "cookie": cookie, "json_data": json_data}))
                },
            ),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = CompletionClient::with_base_url(reqwest::Client::new(), format!("http://{addr}"));
        let messages = vec![ChatMessage::text("user", "hello")];
        let model = models::lookup(models::DEFAULT_MODEL).unwrap();
        let response = client.send(&account(), &messages, model).await.unwrap();
        assert_eq!(response.status(), 200);

        let echoed: Value = response.json().await.unwrap();
        assert_eq!(echoed["project"], "proj-1");
        assert_eq!(echoed["cookie"], "session=sess-1");
        let sent: Value = serde_json::from_str(echoed["json_data"].as_str().unwrap()).unwrap();
        assert_eq!(sent["model_id"], model.upstream_id);
        assert_eq!(sent["messages"][0]["content"], "hello");
    }

    #[tokio::test]
    async fn unreachable_upstream_is_http_error() {
        let client = CompletionClient::with_base_url(reqwest::Client::new(), "http://127.0.0.1:1");
        let model = models::lookup(models::DEFAULT_MODEL).unwrap();
        assert!(matches!(
            client.send(&account(), &[], model).await,
            Err(Error::Http(_))
        ));
    }
}
