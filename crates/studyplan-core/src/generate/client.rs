//! Chat-completion backends.
//!
//! [`ChatClient`] is the seam the generator talks through; [`OpenAiClient`]
//! implements it against any OpenAI-compatible `/chat/completions` endpoint.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL: &str = "gpt-4-turbo-preview";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

const TEMPERATURE: f32 = 0.7;
/// Bytes of an error body kept in [`ChatError::Status`].
const ERROR_BODY_LIMIT: usize = 512;

/// Errors from a single chat-completion call.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("service responded with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("response contained no choices")]
    EmptyChoices,

    #[error("first choice carried no message content")]
    MissingContent,
}

/// The useful part of a completion response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatCompletion {
    /// Raw message text; expected to be a JSON object.
    pub content: String,
    pub total_tokens: Option<u64>,
}

/// A backend able to answer one system+user exchange with a JSON object.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Model identifier recorded on generated plans.
    fn model(&self) -> &str;

    async fn complete_json(&self, system: &str, user: &str) -> Result<ChatCompletion, ChatError>;
}

/// Connection settings for [`OpenAiClient`].
#[derive(Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_owned(),
            base_url: DEFAULT_BASE_URL.to_owned(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

impl std::fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

pub struct OpenAiClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(config: &OpenAiConfig) -> Result<Self, ChatError> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http,
            endpoint: config.endpoint(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: [Message<'a>; 2],
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    total_tokens: u64,
}

#[async_trait]
impl ChatClient for OpenAiClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete_json(&self, system: &str, user: &str) -> Result<ChatCompletion, ChatError> {
        let body = CompletionRequest {
            model: &self.model,
            messages: [
                Message {
                    role: "system",
                    content: system,
                },
                Message {
                    role: "user",
                    content: user,
                },
            ],
            temperature: TEMPERATURE,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > ERROR_BODY_LIMIT {
                let mut cut = ERROR_BODY_LIMIT;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            return Err(ChatError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: CompletionResponse = response.json().await?;
        parse_completion(parsed)
    }
}

fn parse_completion(response: CompletionResponse) -> Result<ChatCompletion, ChatError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or(ChatError::EmptyChoices)?;
    let content = choice.message.content.ok_or(ChatError::MissingContent)?;

    Ok(ChatCompletion {
        content,
        total_tokens: response.usage.map(|u| u.total_tokens),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<ChatCompletion, ChatError> {
        parse_completion(serde_json::from_str(json).unwrap())
    }

    #[test]
    fn parses_first_choice_and_usage() {
        let completion = parse(
            r#"{"choices": [{"message": {"role": "assistant", "content": "{}"}}],
                "usage": {"prompt_tokens": 3, "completion_tokens": 4, "total_tokens": 7}}"#,
        )
        .unwrap();
        assert_eq!(completion.content, "{}");
        assert_eq!(completion.total_tokens, Some(7));
    }

    #[test]
    fn empty_choices_is_an_error() {
        assert!(matches!(
            parse(r#"{"choices": []}"#),
            Err(ChatError::EmptyChoices)
        ));
        assert!(matches!(parse("{}"), Err(ChatError::EmptyChoices)));
    }

    #[test]
    fn null_content_is_an_error() {
        assert!(matches!(
            parse(r#"{"choices": [{"message": {"content": null}}]}"#),
            Err(ChatError::MissingContent)
        ));
    }

    #[test]
    fn request_body_shape() {
        let body = CompletionRequest {
            model: "m",
            messages: [
                Message {
                    role: "system",
                    content: "s",
                },
                Message {
                    role: "user",
                    content: "u",
                },
            ],
            temperature: TEMPERATURE,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["response_format"]["type"], "json_object");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "u");
        assert!((json["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
    }

    #[test]
    fn endpoint_joins_base_url() {
        let mut config = OpenAiConfig::new("key");
        assert_eq!(config.endpoint(), "https://api.openai.com/v1/chat/completions");
        config.base_url = "http://localhost:8080/v1/".into();
        assert_eq!(config.endpoint(), "http://localhost:8080/v1/chat/completions");
    }

    #[test]
    fn debug_hides_api_key() {
        let client = OpenAiClient::new(&OpenAiConfig::new("sk-secret")).unwrap();
        let debug = format!("{client:?}");
        assert!(!debug.contains("sk-secret"));
        assert_eq!(client.model(), DEFAULT_MODEL);
    }
}
