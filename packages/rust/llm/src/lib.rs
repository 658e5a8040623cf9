//! OpenRouter chat-completions client.
//!
//! [`OpenRouterClient`] is the [`GenerationModel`] used for both question
//! synthesis and open-text grading. Timeouts are enforced by the HTTP client;
//! every failure surfaces as [`QuizError::Generation`].

use std::time::Duration;

use async_trait::async_trait;
use chapterquiz_shared::{AppConfig, GenerationModel, Prompt, QuizError, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

/// User-Agent string for model requests.
const USER_AGENT: &str = concat!("chapterquiz/", env!("CARGO_PKG_VERSION"));

/// Longest error body echoed back in an error message.
const MAX_ERROR_BODY_CHARS: usize = 300;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Connection settings for [`OpenRouterClient`].
#[derive(Debug, Clone)]
pub struct OpenRouterOptions {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl OpenRouterOptions {
    /// Take everything but the key from the `[openrouter]` config section.
    pub fn from_config(config: &AppConfig, api_key: impl Into<String>) -> Self {
        Self {
            base_url: config.openrouter.base_url.clone(),
            api_key: api_key.into(),
            model: config.openrouter.default_model.clone(),
            temperature: config.openrouter.temperature,
            timeout_secs: config.openrouter.timeout_secs,
        }
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Chat-completions client for OpenRouter (or any compatible endpoint).
pub struct OpenRouterClient {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl OpenRouterClient {
    pub fn new(opts: OpenRouterOptions) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(opts.timeout_secs))
            .build()
            .map_err(|e| QuizError::Generation(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", opts.base_url.trim_end_matches('/')),
            api_key: opts.api_key,
            model: opts.model,
            temperature: opts.temperature,
        })
    }

    /// Model identifier sent with every request.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send one prompt and return the trimmed reply text.
    ///
    /// A reply with no content is returned as an empty string.
    #[instrument(skip_all, fields(model = %self.model))]
    pub async fn chat(&self, prompt: &Prompt) -> Result<String> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = prompt.system.as_deref() {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &prompt.user,
        });

        let request = ChatRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
        };

        debug!(prompt_chars = prompt.user.len(), "calling model");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .header("X-Title", "chapterquiz")
            .json(&request)
            .send()
            .await
            .map_err(|e| QuizError::Generation(format!("model request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
            warn!(%status, "model returned an error status");
            return Err(QuizError::Generation(format!(
                "model returned HTTP {status}: {snippet}"
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| QuizError::Generation(format!("invalid model response: {e}")))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| QuizError::Generation("model response has no choices".into()))?;

        Ok(choice.message.content.unwrap_or_default().trim().to_string())
    }
}

#[async_trait]
impl GenerationModel for OpenRouterClient {
    async fn complete(&self, prompt: &Prompt) -> Result<String> {
        self.chat(prompt).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn options(base_url: &str) -> OpenRouterOptions {
        OpenRouterOptions {
            base_url: base_url.to_string(),
            api_key: "test-key".into(),
            model: "test/model".into(),
            temperature: 0.3,
            timeout_secs: 5,
        }
    }

    fn reply(content: &str) -> serde_json::Value {
        serde_json::json!({
            "id": "gen-1",
            "choices": [{ "index": 0, "message": { "role": "assistant", "content": content } }]
        })
    }

    #[test]
    fn options_from_config() {
        let opts = OpenRouterOptions::from_config(&AppConfig::default(), "k");
        assert_eq!(opts.base_url, "https://openrouter.ai/api/v1");
        assert_eq!(opts.api_key, "k");
        assert_eq!(opts.timeout_secs, 60);
    }

    #[tokio::test]
    async fn sends_system_and_user_messages() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(serde_json::json!({
                "model": "test/model",
                "messages": [
                    { "role": "system", "content": "grade it" },
                    { "role": "user", "content": "{\"question\":\"q\"}" }
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply("  {\"score\": 7}  \n")))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenRouterClient::new(options(&server.uri())).unwrap();
        let out = client
            .complete(&Prompt::with_system("grade it", "{\"question\":\"q\"}"))
            .await
            .expect("completion");
        assert_eq!(out, "{\"score\": 7}");
    }

    #[tokio::test]
    async fn trailing_slash_in_base_url_is_ignored() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply("ok")))
            .mount(&server)
            .await;

        let client = OpenRouterClient::new(options(&format!("{}/", server.uri()))).unwrap();
        assert_eq!(client.complete(&Prompt::user("hi")).await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn missing_content_is_empty_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{ "message": { "role": "assistant", "content": null } }]
            })))
            .mount(&server)
            .await;

        let client = OpenRouterClient::new(options(&server.uri())).unwrap();
        assert_eq!(client.complete(&Prompt::user("hi")).await.unwrap(), "");
    }

    #[tokio::test]
    async fn http_error_is_generation_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let client = OpenRouterClient::new(options(&server.uri())).unwrap();
        let err = client.complete(&Prompt::user("hi")).await.unwrap_err();
        assert!(matches!(err, QuizError::Generation(_)));
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("rate limited"));
    }

    #[tokio::test]
    async fn empty_choices_is_generation_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "choices": [] })))
            .mount(&server)
            .await;

        let client = OpenRouterClient::new(options(&server.uri())).unwrap();
        let err = client.complete(&Prompt::user("hi")).await.unwrap_err();
        assert!(err.to_string().contains("no choices"));
    }

    #[tokio::test]
    async fn timeout_is_generation_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(reply("late"))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let mut opts = options(&server.uri());
        opts.timeout_secs = 1;
        let client = OpenRouterClient::new(opts).unwrap();
        let err = client.complete(&Prompt::user("hi")).await.unwrap_err();
        assert!(matches!(err, QuizError::Generation(_)));
    }
}
