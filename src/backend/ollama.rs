//! Text generation over Ollama's native API (`/api/generate`).

use super::{http_error, TextGeneration};
use crate::config::TextGenConfig;
use crate::error::{Result, TripError};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

/// Backend for a local Ollama server. Prompt-only, non-streaming.
#[derive(Debug, Clone)]
pub struct OllamaTextBackend {
    client: Client,
    base_url: String,
    model: String,
    temperature: f64,
    max_tokens: u32,
}

impl OllamaTextBackend {
    pub fn new(config: &TextGenConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self {
            client,
            base_url: config
                .base_url
                .trim_end_matches('/')
                .trim_end_matches("/api")
                .to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    fn build_body(&self, prompt: &str) -> Value {
        json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": self.temperature,
                "num_predict": self.max_tokens,
            },
        })
    }

    /// The `response` string of a non-streaming reply.
    fn extract_text(json_resp: &Value) -> Option<&str> {
        json_resp.get("response").and_then(|v| v.as_str())
    }
}

#[async_trait]
impl TextGeneration for OllamaTextBackend {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&self.build_body(prompt))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(http_error(resp).await);
        }

        let json_resp: Value = resp.json().await?;
        Self::extract_text(&json_resp)
            .map(str::to_string)
            .ok_or_else(|| {
                TripError::Generation(format!("generate response from {} has no response text", url))
            })
    }

    fn name(&self) -> &'static str {
        "ollama"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_payload() {
        let config = TextGenConfig::default()
            .with_base_url("http://localhost:11434/api/")
            .with_model("llama3.2");
        let backend = OllamaTextBackend::new(&config).unwrap();
        assert_eq!(backend.base_url, "http://localhost:11434");

        let body = backend.build_body("Why is the sky blue?");
        assert_eq!(body["model"], "llama3.2");
        assert_eq!(body["prompt"], "Why is the sky blue?");
        assert_eq!(body["stream"], false);
        assert_eq!(body["options"]["temperature"], 0.7);
        assert_eq!(body["options"]["num_predict"], 2048);
    }

    #[test]
    fn test_extract_text() {
        let ok = serde_json::json!({"model": "llama3.2", "response": "Day 1:\nFrom Oslo", "done": true});
        assert_eq!(OllamaTextBackend::extract_text(&ok), Some("Day 1:\nFrom Oslo"));

        let missing = serde_json::json!({"error": "model not found"});
        assert_eq!(OllamaTextBackend::extract_text(&missing), None);
        assert_eq!(OllamaTextBackend::extract_text(&serde_json::json!({"response": 3})), None);
    }
}
