//! Safety instructions for a report, generated by a chat-completion model.
//!
//! [`fetch_instructions`] never fails: any problem with the completion call
//! degrades to a fixed fallback text naming the report's category.

use async_trait::async_trait;
use tracing::{debug, warn};

use fieldreport_net::{CompletionClient, NetError};

#[async_trait]
pub trait Completer: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, NetError>;
}

#[async_trait]
impl Completer for CompletionClient {
    async fn complete(&self, prompt: &str) -> Result<String, NetError> {
        CompletionClient::complete(self, prompt).await
    }
}

pub fn instruction_prompt(description: &str) -> String {
    format!(
        "Check if this description is an accident or in danger and if so give me \
         instructions on how to respond to it as a normal person in the scene: {description}"
    )
}

pub fn fallback_instructions(category: Option<&str>) -> String {
    let category = category
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or("report");
    format!("Instructions for {category}:\n- Please stay safe.\n- Await response from authorities.")
}

/// Ask the model how a bystander should respond to the described situation.
pub async fn fetch_instructions(
    completer: &dyn Completer,
    category: Option<&str>,
    description: &str,
) -> String {
    match completer.complete(&instruction_prompt(description)).await {
        Ok(text) => {
            debug!(len = text.len(), "instructions received");
            text
        }
        Err(e) => {
            warn!(error = %e, "instruction fetch failed, using fallback");
            fallback_instructions(category)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::json;
    use tokio::net::TcpListener;

    use super::*;

    async fn serve(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/chat")
    }

    struct Recording {
        prompts: Mutex<Vec<String>>,
        reply: Result<String, String>,
    }

    #[async_trait]
    impl Completer for Recording {
        async fn complete(&self, prompt: &str) -> Result<String, NetError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.reply.clone().map_err(NetError::Decode)
        }
    }

    #[test]
    fn fallback_names_category() {
        assert_eq!(
            fallback_instructions(Some("accident")),
            "Instructions for accident:\n- Please stay safe.\n- Await response from authorities."
        );
        assert!(fallback_instructions(None).starts_with("Instructions for report:"));
        assert!(fallback_instructions(Some("  ")).starts_with("Instructions for report:"));
    }

    #[tokio::test]
    async fn passes_description_in_prompt() {
        let fake = Recording {
            prompts: Mutex::new(Vec::new()),
            reply: Ok("Call emergency services.".into()),
        };
        let text = fetch_instructions(&fake, Some("incident"), "smoke from a window").await;
        assert_eq!(text, "Call emergency services.");

        let prompts = fake.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].ends_with("as a normal person in the scene: smoke from a window"));
    }

    #[tokio::test]
    async fn network_error_falls_back() {
        // Nothing listens on the discard port.
        let client = CompletionClient::new("http://127.0.0.1:9/chat", "m", Some("k".into()));
        let text = fetch_instructions(&client, Some("accident"), "car crash").await;
        assert_eq!(text, fallback_instructions(Some("accident")));
    }

    #[tokio::test]
    async fn malformed_json_falls_back() {
        let url = serve(Router::new().route("/chat", post(|| async { "not json" }))).await;
        let client = CompletionClient::new(url, "m", Some("k".into()));
        let text = fetch_instructions(&client, Some("maintenance"), "leak").await;
        assert!(text.contains("maintenance"));
    }

    #[tokio::test]
    async fn missing_choices_falls_back() {
        let url = serve(Router::new().route(
            "/chat",
            post(|| async { Json(json!({"id": "gen-1", "object": "chat.completion"})) }),
        ))
        .await;
        let client = CompletionClient::new(url, "m", Some("k".into()));
        let text = fetch_instructions(&client, Some("general"), "x").await;
        assert_eq!(text, fallback_instructions(Some("general")));
    }

    #[tokio::test]
    async fn server_error_falls_back() {
        let url = serve(Router::new().route(
            "/chat",
            post(|| async { (axum::http::StatusCode::TOO_MANY_REQUESTS, "slow down") }),
        ))
        .await;
        let client = CompletionClient::new(url, "m", Some("k".into()));
        let text = fetch_instructions(&client, None, "x").await;
        assert_eq!(text, fallback_instructions(None));
    }

    #[tokio::test]
    async fn missing_api_key_falls_back() {
        let client = CompletionClient::openrouter(None);
        let text = fetch_instructions(&client, Some("incident"), "x").await;
        assert_eq!(text, fallback_instructions(Some("incident")));
    }
}
