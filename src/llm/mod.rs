//! LLM 모듈 - Gemini `generateContent` 채팅 모델
//!
//! 쿼리 개선과 최종 답변 생성에 같은 모델을 사용합니다.
//! source: https://ai.google.dev/api/generate-content

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::embedding::GeminiError;
use crate::error::RagError;

/// Gemini API 베이스 URL
const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// 기본 temperature
pub const DEFAULT_TEMPERATURE: f32 = 0.9;

/// 최대 출력 토큰
const MAX_OUTPUT_TOKENS: u32 = 2048;

// ============================================================================
// ChatModel Trait
// ============================================================================

/// 텍스트 생성 모델 트레이트
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// 프롬프트에 대한 응답 텍스트 생성
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// 모델 이름
    fn name(&self) -> &str;
}

// ============================================================================
// GeminiChat
// ============================================================================

/// Gemini 채팅 모델
#[derive(Debug)]
pub struct GeminiChat {
    api_key: String,
    model: String,
    temperature: f32,
    client: reqwest::Client,
}

impl GeminiChat {
    /// 새 채팅 모델 생성
    ///
    /// 키가 비어 있으면 네트워크 호출 없이 `RagError::MissingApiKey`를 반환합니다.
    pub fn new(api_key: &str, model: &str) -> Result<Self> {
        Self::with_temperature(api_key, model, DEFAULT_TEMPERATURE)
    }

    /// temperature를 지정하여 생성
    pub fn with_temperature(api_key: &str, model: &str, temperature: f32) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(RagError::MissingApiKey.into());
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            api_key: api_key.trim().to_string(),
            model: model.to_string(),
            temperature,
            client,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/{}:generateContent", GEMINI_API_BASE, self.model)
    }
}

#[async_trait]
impl ChatModel for GeminiChat {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let request = GenerateRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: MAX_OUTPUT_TOKENS,
            },
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to send generateContent request")?;

        let status = response.status();
        let body = response.text().await.context("Failed to read response body")?;

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<GeminiError>(&body) {
                anyhow::bail!(
                    "Gemini API error ({}): {}",
                    error.error.status,
                    error.error.message
                );
            }
            anyhow::bail!("Gemini API error ({}): {}", status, body);
        }

        let parsed: GenerateResponse =
            serde_json::from_str(&body).context("Failed to parse generateContent response")?;

        let text = parsed.text();
        if text.trim().is_empty() {
            anyhow::bail!("Gemini returned an empty response");
        }

        Ok(text)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    role: String,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

impl GenerateResponse {
    /// 첫 번째 후보의 텍스트 파트를 이어붙임
    fn text(self) -> String {
        self.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| {
                c.parts
                    .into_iter()
                    .map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_key_rejected() {
        let err = GeminiChat::new("", "gemini-2.0-flash").err();
        assert!(matches!(err.map(RagError::classify), Some(RagError::MissingApiKey)));
    }

    #[test]
    fn test_endpoint() {
        let chat = GeminiChat::new("key", "gemini-2.0-flash").unwrap();
        assert!(chat
            .endpoint()
            .ends_with("/models/gemini-2.0-flash:generateContent"));
        assert_eq!(chat.name(), "gemini-2.0-flash");
    }

    #[test]
    fn test_parse_response_joins_parts() {
        let body = r#"{
            "candidates": [
                {"content": {"role": "model", "parts": [{"text": "연봉 "}, {"text": "5천만원"}]}}
            ]
        }"#;
        let parsed: GenerateResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.text(), "연봉 5천만원");
    }

    #[test]
    fn test_parse_response_without_candidates() {
        let parsed: GenerateResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed.text(), "");
    }

    #[test]
    fn test_request_serialization() {
        let request = GenerateRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![Part {
                    text: "hi".to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.5,
                max_output_tokens: 10,
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 10);
        assert_eq!(json["contents"][0]["parts"][0]["text"], "hi");
    }
}
