//! HTTP client for whisper-style transcription endpoints.
//!
//! Posts a multipart form (`file`, `model`, `temperature`, optional
//! `language`/`prompt`) to `{endpoint}/audio/transcriptions` and parses the
//! `verbose_json` response for per-segment log-probabilities. Temperature is
//! pinned to 0 to minimize run-to-run variance on identical audio.

use crate::config::RecognitionConfig;
use crate::error::{Result, TransliveError};
use crate::recognize::service::{RecognitionOutcome, RecognitionService, RecognizedText};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct VerboseSegment {
    avg_logprob: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct VerboseResponse {
    text: String,
    language: Option<String>,
    #[serde(default)]
    segments: Vec<VerboseSegment>,
}

/// Whisper-API-compatible recognition service.
pub struct HttpRecognitionService {
    client: reqwest::Client,
    url: String,
    model: String,
}

impl HttpRecognitionService {
    pub fn new(config: &RecognitionConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if !config.api_key.is_empty() {
            let value = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
                .map_err(|e| TransliveError::ConfigInvalidValue {
                    key: "recognition.api_key".to_string(),
                    message: e.to_string(),
                })?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TransliveError::Recognition {
                message: format!("failed to build HTTP client: {}", e),
            })?;

        let url = format!(
            "{}/audio/transcriptions",
            config.endpoint.trim_end_matches('/')
        );

        Ok(Self {
            client,
            url,
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl RecognitionService for HttpRecognitionService {
    async fn recognize(
        &self,
        audio: &[u8],
        language: Option<&str>,
        prompt: Option<&str>,
    ) -> RecognitionOutcome {
        let audio_part = match Part::bytes(audio.to_vec())
            .file_name("chunk.wav")
            .mime_str("audio/wav")
        {
            Ok(part) => part,
            Err(e) => {
                return RecognitionOutcome::Rejected {
                    status: 0,
                    message: format!("failed to build audio part: {}", e),
                };
            }
        };

        let mut form = Form::new()
            .part("file", audio_part)
            .text("model", self.model.clone())
            .text("response_format", "verbose_json")
            .text("temperature", "0");

        if let Some(lang) = language
            && !lang.is_empty()
            && lang != "auto"
        {
            form = form.text("language", lang.to_string());
        }
        if let Some(prompt) = prompt
            && !prompt.is_empty()
        {
            form = form.text("prompt", prompt.to_string());
        }

        let response = match self.client.post(&self.url).multipart(form).send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => return RecognitionOutcome::Timeout,
            Err(e) => {
                return RecognitionOutcome::Rejected {
                    status: 0,
                    message: format!("transport error: {}", e),
                };
            }
        };

        let status = response.status();
        if status.as_u16() == 429 {
            return RecognitionOutcome::RateLimited;
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return RecognitionOutcome::Rejected {
                status: status.as_u16(),
                message,
            };
        }

        match response.json::<VerboseResponse>().await {
            Ok(body) => {
                let logprobs: Vec<f32> = body
                    .segments
                    .iter()
                    .filter_map(|s| s.avg_logprob)
                    .collect();
                let avg_logprob = if logprobs.is_empty() {
                    None
                } else {
                    Some(logprobs.iter().sum::<f32>() / logprobs.len() as f32)
                };
                RecognitionOutcome::Success(RecognizedText {
                    text: body.text,
                    avg_logprob,
                    language: body.language,
                })
            }
            Err(e) => RecognitionOutcome::Rejected {
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
        let config = RecognitionConfig {
            endpoint: "https://api.example.com/v1/".to_string(),
            ..Default::default()
        };
        let service = HttpRecognitionService::new(&config).unwrap();
        assert_eq!(service.url, "https://api.example.com/v1/audio/transcriptions");
    }

    #[test]
    fn new_rejects_unencodable_api_key() {
        let config = RecognitionConfig {
            api_key: "bad\nkey".to_string(),
            ..Default::default()
        };
        assert!(HttpRecognitionService::new(&config).is_err());
    }

    #[test]
    fn verbose_response_parses_segments() {
        let json = r#"{
            "text": "hello there",
            "language": "en",
            "segments": [
                {"avg_logprob": -0.2},
                {"avg_logprob": -0.4}
            ]
        }"#;
        let body: VerboseResponse = serde_json::from_str(json).unwrap();
        assert_eq!(body.text, "hello there");
        assert_eq!(body.segments.len(), 2);
    }

    #[test]
    fn verbose_response_tolerates_missing_segments() {
        let body: VerboseResponse = serde_json::from_str(r#"{"text": "hi"}"#).unwrap();
        assert!(body.segments.is_empty());
        assert!(body.language.is_none());
    }
}
