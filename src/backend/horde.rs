//! Image generation through the Stable Horde v2 API.
//!
//! Submission is `POST /generate/async`. Progress comes from the lightweight
//! `GET /generate/check/{id}`; once that reports `done`, the results are
//! fetched once from `GET /generate/status/{id}`.

use super::{http_error, GeneratedImage, ImageCheck, ImageRequest, ImageService};
use crate::config::ImageConfig;
use crate::error::Result;
use crate::TripError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Clone)]
pub struct HordeImageService {
    client: Client,
    base_url: String,
    api_key: String,
    client_agent: String,
}

impl std::fmt::Debug for HordeImageService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HordeImageService")
            .field("base_url", &self.base_url)
            .field("client_agent", &self.client_agent)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    id: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CheckResponse {
    done: bool,
    faulted: bool,
    processing: u32,
    queue_position: u32,
    wait_time: u32,
    is_possible: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StatusResponse {
    faulted: bool,
    generations: Vec<Generation>,
}

#[derive(Debug, Deserialize)]
struct Generation {
    img: String,
}

impl HordeImageService {
    /// Timeouts are enforced per call by the orchestrator, not by this client.
    pub fn new(config: &ImageConfig) -> Result<Self> {
        Ok(Self::with_client(Client::builder().build()?, config))
    }

    pub fn with_client(client: Client, config: &ImageConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            client_agent: config.client_agent.clone(),
        }
    }

    fn build_body(request: &ImageRequest) -> Value {
        json!({
            "prompt": request.prompt,
            "params": {
                "samples": request.samples,
                "steps": request.steps,
            },
            "nsfw": request.nsfw,
            "censor_nsfw": request.censor_nsfw,
            "trusted_workers": request.trusted_workers,
        })
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.client
            .get(url)
            .header("apikey", &self.api_key)
            .header("Client-Agent", &self.client_agent)
    }

    async fn fetch_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let resp = self.get(url).send().await?;
        if !resp.status().is_success() {
            return Err(http_error(resp).await);
        }
        Ok(resp.json().await?)
    }

    fn normalize(check: CheckResponse, status: Option<StatusResponse>) -> ImageCheck {
        let impossible = check.is_possible == Some(false);
        let status_faulted = status.as_ref().is_some_and(|s| s.faulted);
        ImageCheck {
            done: check.done,
            faulted: check.faulted || status_faulted || (impossible && !check.done),
            processing: check.processing > 0,
            queue_position: Some(check.queue_position),
            wait_time_seconds: Some(check.wait_time),
            results: status
                .map(|s| {
                    s.generations
                        .into_iter()
                        .map(|g| GeneratedImage { url: g.img })
                        .collect()
                })
                .unwrap_or_default(),
        }
    }
}

#[async_trait]
impl ImageService for HordeImageService {
    async fn submit(&self, request: &ImageRequest) -> Result<String> {
        let url = format!("{}/generate/async", self.base_url);
        let resp = self
            .client
            .post(&url)
            .header("apikey", &self.api_key)
            .header("Client-Agent", &self.client_agent)
            .json(&Self::build_body(request))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(http_error(resp).await);
        }

        let body: SubmitResponse = resp.json().await?;
        body.id.filter(|id| !id.is_empty()).ok_or_else(|| {
            TripError::Submission(format!(
                "no id in submission response{}",
                body.message.map(|m| format!(": {}", m)).unwrap_or_default()
            ))
        })
    }

    async fn check(&self, id: &str) -> Result<ImageCheck> {
        let check: CheckResponse = self
            .fetch_json(&format!("{}/generate/check/{}", self.base_url, id))
            .await?;

        let status = if check.done && !check.faulted {
            Some(
                self.fetch_json::<StatusResponse>(&format!(
                    "{}/generate/status/{}",
                    self.base_url, id
                ))
                .await?,
            )
        } else {
            None
        };

        Ok(Self::normalize(check, status))
    }

    fn name(&self) -> &'static str {
        "stable-horde"
    }
}
