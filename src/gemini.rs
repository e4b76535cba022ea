//! Language model integration for the reasoning step
//!
//! The pipeline talks to a [`LanguageModel`] trait object: the Gemini REST
//! client in production, a deterministic scripted model for tests and
//! offline demos. Uses a long-lived reqwest::Client for connection pooling.

use crate::error::AgentError;
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};

/// Generated answer plus the client's own confidence estimate
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub text: String,
    pub confidence: f32,
}

/// Text generation behind the reasoning step
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, system: &str, prompt: &str) -> Result<LlmResponse>;
}

/// Reusable Gemini client (connection-pooled)
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: String) -> Self {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            api_key,
            base_url: "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent".to_string(),
        }
    }
}

#[async_trait]
impl LanguageModel for GeminiClient {
    async fn generate(&self, system: &str, prompt: &str) -> Result<LlmResponse> {
        if self.api_key.is_empty() {
            return Err(AgentError::LlmError(
                "GEMINI_API_KEY not configured".to_string(),
            ));
        }

        let url = format!("{}?key={}", self.base_url, self.api_key);

        let request = GeminiRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.3,
                top_p: 0.9,
                top_k: 40,
                max_output_tokens: 1024,
            },
            system_instruction: SystemInstruction {
                parts: vec![Part {
                    text: system.to_string(),
                }],
            },
        };

        info!("Calling Gemini API");

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("Gemini API request failed: {}", e);
                AgentError::LlmError(format!("Gemini API error: {}", e))
            })?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Gemini API error response: {}", error_text);
            return Err(AgentError::LlmError(format!(
                "Gemini API error: {}",
                error_text
            )));
        }

        let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
            error!("Failed to parse Gemini response: {}", e);
            AgentError::LlmError(format!("Gemini parse error: {}", e))
        })?;

        let candidate = gemini_response.candidates.first().ok_or_else(|| {
            AgentError::LlmError("No response from Gemini API".to_string())
        })?;

        let text = candidate
            .content
            .parts
            .first()
            .ok_or_else(|| AgentError::LlmError("Empty response from Gemini".to_string()))?
            .text
            .clone();

        let confidence = calculate_confidence(&gemini_response);

        info!("Gemini response received (confidence: {})", confidence);

        Ok(LlmResponse { text, confidence })
    }
}

//
// ================= Wire types =================
//

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
    system_instruction: SystemInstruction,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: i32,
    max_output_tokens: i32,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
    finish_reason: Option<String>,
}

/// Estimate response confidence from the finish reason and answer length
fn calculate_confidence(response: &GeminiResponse) -> f32 {
    let base_confidence: f32 = 0.85;

    let finish_confidence = match response.candidates[0].finish_reason.as_deref() {
        Some("STOP") => 1.0,
        Some("LENGTH") => 0.8,
        Some("SAFETY") => 0.6,
        _ => 0.7,
    };

    let response_length = response.candidates[0]
        .content
        .parts
        .first()
        .map(|p| p.text.len())
        .unwrap_or(0);

    let length_confidence = if response_length < 50 {
        0.6
    } else if response_length > 2000 {
        0.8
    } else {
        1.0
    };

    (base_confidence * finish_confidence * length_confidence).clamp(0.5, 0.98)
}

//
// ================= Scripted model =================
//

/// Deterministic offline model.
///
/// Splices the metric lines out of the reasoning prompt into a cautious,
/// fully disclaimed template, so offline runs still produce a grounded
/// response that clears every guardrail.
pub struct ScriptedModel;

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn generate(&self, _system: &str, prompt: &str) -> Result<LlmResponse> {
        let metrics: Vec<&str> = prompt
            .lines()
            .map(str::trim)
            .filter(|line| line.starts_with("- ") && line.contains("RSI"))
            .collect();

        let mut text = String::from("Key metrics reviewed:\n");
        if metrics.is_empty() {
            text.push_str("- No indicator data was available for this query.\n");
        } else {
            for line in &metrics {
                text.push_str(line);
                text.push('\n');
            }
        }

        text.push_str(
            "\nBased on the RSI, volatility, and momentum readings above, \
             conditions look mixed: if volatility stays contained, consider \
             holding and reassessing at the next moving-average cross. \
             Confidence: 0.6.\n\n\
             This analysis is for informational purposes only and is not \
             financial advice. Consult a licensed advisor before investing. \
             Past performance does not guarantee future results.",
        );

        Ok(LlmResponse {
            text,
            confidence: 0.6,
        })
    }
}

//
// ================= Tests =================
//

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let request = GeminiRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: "What is RSI?".to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.3,
                top_p: 0.9,
                top_k: 40,
                max_output_tokens: 1024,
            },
            system_instruction: SystemInstruction {
                parts: vec![Part {
                    text: "You are a financial advisor".to_string(),
                }],
            },
        };

        let json = serde_json::to_string(&request);
        assert!(json.is_ok());
        assert!(json.unwrap().contains("What is RSI?"));
    }

    #[test]
    fn test_confidence_bounds() {
        let response = GeminiResponse {
            candidates: vec![Candidate {
                content: Content {
                    parts: vec![Part {
                        text: "x".repeat(500),
                    }],
                },
                finish_reason: Some("STOP".to_string()),
            }],
        };
        let confidence = calculate_confidence(&response);
        assert!((0.5..=0.98).contains(&confidence));
    }

    #[tokio::test]
    async fn test_scripted_model_echoes_metrics() {
        let prompt = "Key metrics:\n- AAPL: RSI 54.2, volatility 1.1%, momentum +2.4%\n";
        let response = ScriptedModel.generate("system", prompt).await.unwrap();
        assert!(response.text.contains("RSI 54.2"));
        assert!(response.text.contains("not financial advice"));
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let client = GeminiClient::new(String::new());
        let result = client.generate("system", "what is RSI?").await;
        assert!(result.is_err());
        let message = result.unwrap_err().to_string();
        assert!(message.contains("GEMINI_API_KEY"));
    }
}
