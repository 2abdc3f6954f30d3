//! Text generation over OpenAI-compatible chat completions.
//!
//! [`OpenAiTextBackend`] covers Groq, OpenAI, Together, vLLM, LM Studio and
//! Ollama's `/v1/` endpoint. Endpoint: `{base_url}/v1/chat/completions`.

use super::{http_error, TextGeneration};
use crate::config::TextGenConfig;
use crate::error::Result;
use crate::TripError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

/// Backend for any OpenAI-compatible chat API.
///
/// # Example
///
/// ```
/// use trip_pipeline::backend::OpenAiTextBackend;
/// use trip_pipeline::config::TextGenConfig;
///
/// let backend = OpenAiTextBackend::new(&TextGenConfig::default().with_api_key("gsk-...")).unwrap();
/// assert!(backend.has_api_key());
/// ```
#[derive(Clone)]
pub struct OpenAiTextBackend {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f64,
    max_tokens: u32,
}

impl std::fmt::Debug for OpenAiTextBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiTextBackend")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field(
                "api_key",
                &self.api_key.as_ref().map(|k| {
                    if k.chars().count() > 6 {
                        format!("{}***", k.chars().take(6).collect::<String>())
                    } else {
                        "***".to_string()
                    }
                }),
            )
            .finish()
    }
}

impl OpenAiTextBackend {
    /// Build a backend with its own HTTP client bounded by `config.timeout()`.
    pub fn new(config: &TextGenConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self::with_client(client, config))
    }

    /// Build a backend around an existing client.
    pub fn with_client(client: Client, config: &TextGenConfig) -> Self {
        Self {
            client,
            base_url: normalize_base_url(&config.base_url),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    /// Returns `true` if an API key has been configured.
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }

    /// Build the request body for `/v1/chat/completions`.
    fn build_body(&self, prompt: &str) -> Value {
        json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "stream": false,
        })
    }

    /// Pull `choices[0].message.content` out of a response.
    fn extract_text(json_resp: &Value) -> Option<&str> {
        json_resp
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|v| v.as_str())
    }
}

#[async_trait]
impl TextGeneration for OpenAiTextBackend {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let url = self.endpoint();
        let mut req = self.client.post(&url).json(&self.build_body(prompt));
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await?;
        if !resp.status().is_success() {
            return Err(http_error(resp).await);
        }

        let json_resp: Value = resp.json().await?;
        Self::extract_text(&json_resp)
            .map(str::to_string)
            .ok_or_else(|| {
                TripError::Generation(format!(
                    "completion response from {} has no choices[0].message.content",
                    url
                ))
            })
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

/// Strip known provider path suffixes so the endpoint path isn't doubled.
/// e.g. "https://api.groq.com/openai/v1" -> "https://api.groq.com/openai"
fn normalize_base_url(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    for suffix in &["/v1/chat/completions", "/v1/chat", "/v1"] {
        if let Some(stripped) = trimmed.strip_suffix(suffix) {
            return stripped.to_string();
        }
    }
    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> OpenAiTextBackend {
        OpenAiTextBackend::with_client(Client::new(), &TextGenConfig::default())
    }

    #[test]
    fn test_body_shape() {
        let body = backend().build_body("Plan a trip");
        assert_eq!(body["model"], "llama-3.1-8b-instant");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "Plan a trip");
        assert_eq!(body["stream"], false);
        assert_eq!(body["max_tokens"], 2048);
    }

    #[test]
    fn test_endpoint_for_groq() {
        assert_eq!(
            backend().endpoint(),
            "https://api.groq.com/openai/v1/chat/completions"
        );
    }

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(normalize_base_url("https://api.openai.com/v1/"), "https://api.openai.com");
        assert_eq!(
            normalize_base_url("https://api.groq.com/openai/v1/chat/completions"),
            "https://api.groq.com/openai"
        );
        assert_eq!(normalize_base_url("http://localhost:8000"), "http://localhost:8000");
    }

    #[test]
    fn test_extract_text() {
        let resp = json!({"choices": [{"message": {"role": "assistant", "content": "Day 1: ..."}}]});
        assert_eq!(OpenAiTextBackend::extract_text(&resp), Some("Day 1: ..."));
        assert_eq!(OpenAiTextBackend::extract_text(&json!({"choices": []})), None);
    }

    #[test]
    fn test_debug_masks_key() {
        let config = TextGenConfig::default().with_api_key("gsk_abcdefghijkl");
        let backend = OpenAiTextBackend::with_client(Client::new(), &config);
        let debug = format!("{:?}", backend);
        assert!(debug.contains("gsk_ab***"));
        assert!(!debug.contains("ghijkl"));
    }
}
