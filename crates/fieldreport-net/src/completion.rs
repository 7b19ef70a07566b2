//! OpenAI-compatible chat-completion client.

use serde::{Deserialize, Serialize};
use tracing::debug;

use fieldreport_shared::constants::{DEFAULT_COMPLETION_MODEL, DEFAULT_COMPLETION_URL};

use crate::error::{NetError, Result};
use crate::rest::send;

#[derive(Clone)]
pub struct CompletionClient {
    http: reqwest::Client,
    url: String,
    model: String,
    api_key: Option<String>,
}

impl CompletionClient {
    pub fn new(url: impl Into<String>, model: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
            model: model.into(),
            api_key: api_key.filter(|k| !k.is_empty()),
        }
    }

    pub fn openrouter(api_key: Option<String>) -> Self {
        Self::new(DEFAULT_COMPLETION_URL, DEFAULT_COMPLETION_MODEL, api_key)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send one user-role message and return the first choice's text.
    pub async fn complete(&self, prompt: &str) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| NetError::Config("completion API key not configured".into()))?;

        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: [Msg<'a>; 1],
        }

        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }

        let req = Req {
            model: &self.model,
            messages: [Msg {
                role: "user",
                content: prompt,
            }],
        };

        debug!(model = %self.model, url = %self.url, "requesting completion");
        let resp = send(self.http.post(&self.url).bearer_auth(api_key).json(&req)).await?;
        let body = resp.text().await?;

        let parsed: CompletionResp = serde_json::from_str(&body)?;
        parsed
            .first_text()
            .ok_or_else(|| NetError::Decode("completion returned no content".into()))
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResp {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: MsgOut,
}

#[derive(Debug, Deserialize)]
struct MsgOut {
    #[serde(default)]
    content: Option<String>,
}

impl CompletionResp {
    fn first_text(self) -> Option<String> {
        self.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|text| !text.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderMap;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    use super::*;
    use crate::test_server::spawn;

    #[tokio::test]
    async fn returns_first_choice() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                assert_eq!(headers.get("authorization").unwrap(), "Bearer sk-test");
                assert_eq!(body["model"], "test-model");
                assert_eq!(body["messages"][0]["role"], "user");
                assert_eq!(body["messages"][0]["content"], "hello");
                Json(json!({
                    "choices": [
                        {"message": {"role": "assistant", "content": "first"}},
                        {"message": {"role": "assistant", "content": "second"}}
                    ]
                }))
            }),
        );
        let base = spawn(router).await;
        let client = CompletionClient::new(
            format!("{base}/v1/chat/completions"),
            "test-model",
            Some("sk-test".into()),
        );

        assert_eq!(client.complete("hello").await.unwrap(), "first");
    }

    #[tokio::test]
    async fn missing_choices_is_decode_error() {
        let router = Router::new().route(
            "/c",
            post(|| async { Json(json!({"error": {"message": "rate limited"}})) }),
        );
        let base = spawn(router).await;
        let client = CompletionClient::new(format!("{base}/c"), "m", Some("k".into()));

        assert!(matches!(
            client.complete("x").await,
            Err(NetError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn null_content_is_decode_error() {
        let router = Router::new().route(
            "/c",
            post(|| async { Json(json!({"choices": [{"message": {"content": null}}]})) }),
        );
        let base = spawn(router).await;
        let client = CompletionClient::new(format!("{base}/c"), "m", Some("k".into()));

        assert!(matches!(
            client.complete("x").await,
            Err(NetError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn missing_key_fails_before_request() {
        let client = CompletionClient::new("http://127.0.0.1:9/never", "m", Some(String::new()));
        assert!(matches!(
            client.complete("x").await,
            Err(NetError::Config(_))
        ));
    }

    #[test]
    fn openrouter_defaults() {
        let client = CompletionClient::openrouter(None);
        assert_eq!(client.model(), DEFAULT_COMPLETION_MODEL);
        assert_eq!(client.url, DEFAULT_COMPLETION_URL);
    }
}
