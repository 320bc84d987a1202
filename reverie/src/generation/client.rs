//! OpenAI-compatible chat completion client.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::GenerateError;
use super::conversation::{ChatMessage, Conversation};
use crate::core::logging::debug;

/// Anything that can turn a conversation plus a new prompt into reply text.
/// Implementations are called from the generation worker thread.
pub trait ModelClient: Send + Sync {
    fn complete(
        &self,
        conversation: &Conversation,
        prompt: &str,
    ) -> Result<String, GenerateError>;

    fn describe(&self) -> String;
}

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: String,
    pub timeout: Duration,
}

pub struct ChatCompletionsClient {
    http: reqwest::blocking::Client,
    endpoint: String,
    model: String,
    api_key: String,
    openrouter: bool,
}

impl ChatCompletionsClient {
    pub fn new(config: ClientConfig) -> Result<Self, GenerateError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .build()?;
        let base_url = config.base_url.trim_end_matches('/');

        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", base_url),
            openrouter: base_url.contains("openrouter.ai"),
            model: config.model,
            api_key: config.api_key,
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

impl ModelClient for ChatCompletionsClient {
    fn complete(
        &self,
        conversation: &Conversation,
        prompt: &str,
    ) -> Result<String, GenerateError> {
        let body = ChatRequest {
            model: &self.model,
            messages: conversation.messages_for(prompt),
        };

        let mut request = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body);

        if self.openrouter {
            request = request
                .header("HTTP-Referer", "http://localhost")
                .header("X-Title", "reverie");
        }

        debug!(
            "Requesting {} ({} prior turns)",
            self.model,
            conversation.turns().len()
        );

        let response = request.send()?;
        let status = response.status();
        let text = response.text()?;

        if !status.is_success() {
            return Err(GenerateError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        parse_reply(&text)
    }

    fn describe(&self) -> String {
        format!("{} via {}", self.model, self.endpoint)
    }
}

fn parse_reply(body: &str) -> Result<String, GenerateError> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|err| GenerateError::Malformed(err.to_string()))?;

    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
        .ok_or_else(|| {
            GenerateError::Malformed("reply has no assistant content".into())
        })
}

/// Used when no API key is configured. Every request fails, so every prompt
/// falls back to the default program.
pub struct OfflineClient {
    reason: String,
}

impl OfflineClient {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl ModelClient for OfflineClient {
    fn complete(
        &self,
        _conversation: &Conversation,
        _prompt: &str,
    ) -> Result<String, GenerateError> {
        Err(GenerateError::Offline(self.reason.clone()))
    }

    fn describe(&self) -> String {
        format!("offline ({})", self.reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn parses_first_choice_content() {
        let body = r#"{"choices":[{"message":{
            "role": "assistant",
            "content": "  fn draw() {}\n"
        }}]}"#;
        assert_eq!(parse_reply(body).unwrap(), "fn draw() {}");
    }

    #[test]
    fn empty_or_missing_content_is_malformed() {
        for body in [
            r#"{"choices":[]}"#,
            r#"{"choices":[{"message":{"content":null}}]}"#,
            r#"{"choices":[{"message":{"content":"   "}}]}"#,
            "not json",
        ] {
            assert!(matches!(
                parse_reply(body),
                Err(GenerateError::Malformed(_))
            ));
        }
    }

    #[test]
    fn request_body_uses_chat_shape() {
        let conversation = Conversation::new(Arc::from("sys"));
        let body = ChatRequest {
            model: "m",
            messages: conversation.messages_for("hello"),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "m");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hello");
    }

    #[test]
    fn offline_client_always_fails() {
        let client = OfflineClient::new("no key");
        let conversation = Conversation::new(Arc::from(""));
        assert!(matches!(
            client.complete(&conversation, "anything"),
            Err(GenerateError::Offline(_))
        ));
    }

    #[test]
    fn endpoint_is_derived_from_base_url() {
        let client = ChatCompletionsClient::new(ClientConfig {
            base_url: "https://openrouter.ai/api/v1/".into(),
            model: "some/model".into(),
            api_key: "k".into(),
            timeout: Duration::from_secs(1),
        })
        .unwrap();
        assert_eq!(
            client.endpoint,
            "https://openrouter.ai/api/v1/chat/completions"
        );
        assert!(client.openrouter);
    }
}
