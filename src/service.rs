//! The request/response contract exposed to a web front end.
//!
//! [`TripService`] wraps a [`PipelineCoordinator`] in two plain async
//! functions whose inputs and outputs are serde types matching the JSON the
//! UI exchanges. Route wiring is left to the host application.

use crate::{
    config::ImageConfig,
    image_job::{ImageJobOrchestrator, JobState},
    pipeline::PipelineCoordinator,
    types::{TripPlan, TripType},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

/// Body of a `getRoute` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetRouteRequest {
    pub country: String,
    pub trip_type: TripType,
}

/// Failure body returned instead of a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub error: String,
    pub details: String,
}

impl ErrorPayload {
    fn fetching(details: impl Into<String>) -> Self {
        Self {
            error: "Error fetching data".to_string(),
            details: details.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GetRouteResponse {
    Success(TripPlan),
    Failure(ErrorPayload),
}

impl GetRouteResponse {
    /// HTTP status a host should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            GetRouteResponse::Success(_) => 200,
            GetRouteResponse::Failure(_) => 500,
        }
    }

    pub fn plan(&self) -> Option<&TripPlan> {
        match self {
            GetRouteResponse::Success(plan) => Some(plan),
            GetRouteResponse::Failure(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageStatusKind {
    Completed,
    Waiting,
    Failed,
    Error,
}

/// Body of a `checkImageStatus` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageStatusResponse {
    pub status: ImageStatusKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait_time: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ImageStatusResponse {
    fn error(message: impl Into<String>) -> Self {
        Self {
            status: ImageStatusKind::Error,
            url: None,
            queue_position: None,
            wait_time: None,
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TripService {
    coordinator: Arc<PipelineCoordinator>,
}

impl TripService {
    pub fn new(coordinator: Arc<PipelineCoordinator>) -> Self {
        Self { coordinator }
    }

    pub fn coordinator(&self) -> &PipelineCoordinator {
        &self.coordinator
    }

    /// Plan a trip. Never returns an error; failures become
    /// [`GetRouteResponse::Failure`].
    pub async fn get_route(&self, request: &GetRouteRequest) -> GetRouteResponse {
        self.get_route_with_cancel(request, &CancellationToken::new())
            .await
    }

    pub async fn get_route_with_cancel(
        &self,
        request: &GetRouteRequest,
        cancel: &CancellationToken,
    ) -> GetRouteResponse {
        match self
            .coordinator
            .plan(&request.country, request.trip_type, cancel)
            .await
        {
            Ok(plan) => GetRouteResponse::Success(plan),
            Err(e) => {
                error!(country = %request.country, trip_type = %request.trip_type, error = %e, "getRoute failed");
                GetRouteResponse::Failure(ErrorPayload::fetching(e.to_string()))
            }
        }
    }

    /// One status poll for image job `id`.
    pub async fn check_image_status(&self, id: &str) -> ImageStatusResponse {
        let id = id.trim();
        if id.is_empty() {
            return ImageStatusResponse::error("missing image job id");
        }
        let Some(service) = self.coordinator.image_service() else {
            return ImageStatusResponse::error("image generation is not configured");
        };
        let config: ImageConfig = self.coordinator.config().image.clone();
        let mut orchestrator = ImageJobOrchestrator::resume(service.clone(), config, id);

        let job = match orchestrator.check_once().await {
            Ok(job) => job,
            Err(e) if e.is_rate_limit() => {
                warn!(id, "image status check was rate limited");
                return ImageStatusResponse {
                    status: ImageStatusKind::Waiting,
                    url: None,
                    queue_position: None,
                    wait_time: None,
                    message: Some("rate limited, try again shortly".into()),
                };
            }
            Err(e) => {
                warn!(id, error = %e, "image status check failed");
                return ImageStatusResponse::error(e.to_string());
            }
        };

        let status = match job.state() {
            JobState::Completed => ImageStatusKind::Completed,
            JobState::Failed => ImageStatusKind::Failed,
            JobState::Errored | JobState::Abandoned => ImageStatusKind::Error,
            JobState::Idle | JobState::Submitting | JobState::Queued | JobState::Generating => {
                ImageStatusKind::Waiting
            }
        };
        ImageStatusResponse {
            status,
            url: job.url.clone(),
            queue_position: job.queue_position,
            wait_time: job.wait_time_seconds,
            message: job.failure.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ImageCheck, MockGeocoder, MockImageService, MockReply, MockTextBackend};
    use serde_json::json;

    fn service(image: Option<Arc<MockImageService>>) -> TripService {
        let mut builder = PipelineCoordinator::builder(Arc::new(MockTextBackend::fixed(
            "Day 1:\nFrom Paris to Lyon\nTotal Distance: 450 km\n",
        )))
        .geocoder(Arc::new(MockGeocoder::new()));
        builder = match image {
            Some(image) => builder.image_service(image),
            None => builder.image_enabled(false),
        };
        TripService::new(Arc::new(builder.build().unwrap()))
    }

    #[test]
    fn test_request_deserializes_camel_case() {
        let request: GetRouteRequest =
            serde_json::from_value(json!({"country": "France", "tripType": "bicycle"})).unwrap();
        assert_eq!(request.trip_type, TripType::Bicycle);
    }

    #[test]
    fn test_failure_payload_shape() {
        let response = GetRouteResponse::Failure(ErrorPayload::fetching("boom"));
        assert_eq!(response.status_code(), 500);
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"error": "Error fetching data", "details": "boom"})
        );
    }

    #[tokio::test]
    async fn test_check_status_waiting() {
        let image = Arc::new(MockImageService::new(
            vec![],
            vec![MockReply::Ok(ImageCheck::waiting(5, 100))],
        ));
        let response = service(Some(image)).check_image_status("abc").await;
        assert_eq!(response.status, ImageStatusKind::Waiting);
        assert_eq!(response.queue_position, Some(5));
        assert_eq!(response.wait_time, Some(100));

        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["status"], "waiting");
        assert_eq!(value["queuePosition"], 5);
        assert_eq!(value["waitTime"], 100);
    }

    #[tokio::test]
    async fn test_check_status_completed() {
        let image = Arc::new(MockImageService::new(
            vec![],
            vec![MockReply::Ok(ImageCheck::finished(["https://img/a.webp"]))],
        ));
        let response = service(Some(image)).check_image_status("abc").await;
        assert_eq!(response.status, ImageStatusKind::Completed);
        assert_eq!(response.url.as_deref(), Some("https://img/a.webp"));
    }

    #[tokio::test]
    async fn test_check_status_faulted_and_empty() {
        let faulted = Arc::new(MockImageService::new(vec![], vec![MockReply::Ok(ImageCheck::faulted())]));
        assert_eq!(
            service(Some(faulted)).check_image_status("abc").await.status,
            ImageStatusKind::Failed
        );

        let empty = Arc::new(MockImageService::new(
            vec![],
            vec![MockReply::Ok(ImageCheck::finished(Vec::<String>::new()))],
        ));
        assert_eq!(
            service(Some(empty)).check_image_status("abc").await.status,
            ImageStatusKind::Error
        );
    }

    #[tokio::test]
    async fn test_check_status_transport_error() {
        let image = Arc::new(MockImageService::new(vec![], vec![MockReply::Fail("down".into())]));
        let response = service(Some(image)).check_image_status("abc").await;
        assert_eq!(response.status, ImageStatusKind::Error);
        assert!(response.message.unwrap().contains("down"));
    }

    #[tokio::test]
    async fn test_check_status_without_image_service() {
        let response = service(None).check_image_status("abc").await;
        assert_eq!(response.status, ImageStatusKind::Error);
    }

    #[tokio::test]
    async fn test_check_status_blank_id() {
        let image = Arc::new(MockImageService::new(vec![], vec![]));
        let response = service(Some(image.clone())).check_image_status("  ").await;
        assert_eq!(response.status, ImageStatusKind::Error);
        assert_eq!(image.check_calls(), 0);
    }
}
