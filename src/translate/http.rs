//! HTTP client for chat-completion translation endpoints.
//!
//! Posts a JSON chat request to `{endpoint}/chat/completions` with a fixed
//! translator system prompt and temperature 0, and reads the first choice.

use crate::config::TranslationConfig;
use crate::error::{Result, TransliveError};
use crate::translate::service::{TranslationOutcome, TranslationService};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

/// Chat-completion-backed translation service.
pub struct HttpTranslationService {
    client: reqwest::Client,
    url: String,
    model: String,
}

impl HttpTranslationService {
    pub fn new(config: &TranslationConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if !config.api_key.is_empty() {
            let value = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
                .map_err(|e| TransliveError::ConfigInvalidValue {
                    key: "translation.api_key".to_string(),
                    message: e.to_string(),
                })?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TransliveError::Translation {
                message: format!("failed to build HTTP client: {}", e),
            })?;

        let url = format!("{}/chat/completions", config.endpoint.trim_end_matches('/'));

        Ok(Self {
            client,
            url,
            model: config.model.clone(),
        })
    }

    fn system_prompt(source: &str, target: &str) -> String {
        let source_clause = if source == "auto" {
            "the source language"
        } else {
            source
        };
        format!(
            "You are a translator. Translate the user's text from {} to {}. \
             Output only the translation, nothing else.",
            source_clause, target
        )
    }
}

#[async_trait]
impl TranslationService for HttpTranslationService {
    async fn translate(&self, text: &str, source: &str, target: &str) -> TranslationOutcome {
        let body = json!({
            "model": self.model,
            "temperature": 0,
            "messages": [
                {"role": "system", "content": Self::system_prompt(source, target)},
                {"role": "user", "content": text},
            ],
        });

        let response = match self.client.post(&self.url).json(&body).send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => return TranslationOutcome::Timeout,
            Err(e) => {
                return TranslationOutcome::Rejected {
                    status: 0,
                    message: format!("transport error: {}", e),
                };
            }
        };

        let status = response.status();
        if status.as_u16() == 429 {
            return TranslationOutcome::RateLimited;
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return TranslationOutcome::Rejected {
                status: status.as_u16(),
                message,
            };
        }

        match response.json::<ChatResponse>().await {
            Ok(body) => match body.choices.into_iter().next() {
                Some(choice) => TranslationOutcome::Success {
                    text: choice.message.content.trim().to_string(),
                },
                None => TranslationOutcome::Rejected {
                    status: status.as_u16(),
                    message: "response contained no choices".to_string(),
                },
            },
            Err(e) => TranslationOutcome::Rejected {
                status: status.as_u16(),
                message: format!("unparseable response body: {}", e),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_builds_url_from_endpoint() {
        let config = TranslationConfig {
            endpoint: "https://api.example.com/v1".to_string(),
            ..Default::default()
        };
        let service = HttpTranslationService::new(&config).unwrap();
        assert_eq!(service.url, "https://api.example.com/v1/chat/completions");
    }

    #[test]
    fn system_prompt_names_languages() {
        let prompt = HttpTranslationService::system_prompt("de", "en");
        assert!(prompt.contains("from de to en"));

        let auto = HttpTranslationService::system_prompt("auto", "en");
        assert!(auto.contains("the source language"));
    }

    #[test]
    fn chat_response_parses_first_choice() {
        let json = r#"{"choices": [{"message": {"content": " Hallo Welt "}}]}"#;
        let body: ChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(body.choices[0].message.content, " Hallo Welt ");
    }
}
