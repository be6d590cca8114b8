//! OpenAI-compatible chat completion classifier

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{Classifier, ClassifierError};

/// Connection settings for an OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiSettings {
    /// Base URL up to and including `/v1`.
    pub base_url: String,
    pub model: String,
    pub api_key: String,
    pub temperature: f32,
    pub timeout: Duration,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Classifier backed by an OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiClassifier {
    http: reqwest::Client,
    settings: OpenAiSettings,
}

impl OpenAiClassifier {
    pub fn new(settings: OpenAiSettings) -> Result<Self, ClassifierError> {
        if settings.api_key.trim().is_empty() {
            return Err(ClassifierError::NotConfigured("classifier API key is empty".into()));
        }
        let http = reqwest::Client::builder().timeout(settings.timeout).build()?;
        Ok(Self { http, settings })
    }

    fn completions_url(&self) -> String {
        let base = self.settings.base_url.trim_end_matches('/');
        format!("{base}/chat/completions")
    }
}

#[async_trait]
impl Classifier for OpenAiClassifier {
    async fn propose_classification(&self, prompt: &str) -> Result<String, ClassifierError> {
        let request = ChatRequest {
            model: &self.settings.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.settings.temperature,
        };

        debug!(model = %self.settings.model, prompt_chars = prompt.len(), "Sending chat completion request");

        let response = self
            .http
            .post(self.completions_url())
            .bearer_auth(&self.settings.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ClassifierError::Timeout(self.settings.timeout)
                } else {
                    ClassifierError::Http(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Chat completion request failed");
            return Err(match status.as_u16() {
                401 | 403 => ClassifierError::Auth(body),
                429 => ClassifierError::RateLimited,
                code => ClassifierError::Status { status: code, body },
            });
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(ClassifierError::EmptyResponse)
    }

    fn model_name(&self) -> &str {
        &self.settings.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(key: &str) -> OpenAiSettings {
        OpenAiSettings {
            base_url: "https://api.openai.com/v1/".into(),
            model: "gpt-3.5-turbo".into(),
            api_key: key.into(),
            temperature: 0.0,
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_completions_url_trims_trailing_slash() {
        let client = OpenAiClassifier::new(settings("sk-test")).unwrap();
        assert_eq!(client.completions_url(), "https://api.openai.com/v1/chat/completions");
    }

    #[test]
    fn test_empty_key_is_not_configured() {
        assert!(matches!(
            OpenAiClassifier::new(settings("  ")),
            Err(ClassifierError::NotConfigured(_))
        ));
    }
}
