//! # Trip Pipeline
//!
//! Multi-day road and bicycle trip planning on top of three external
//! services: a text-generation model writes the itinerary, a geocoder pins
//! each stop, and an asynchronous image service paints a cover picture.
//!
//! The crate is the orchestration in between:
//!
//! - **[`ItineraryParser`]** turns free-form `Day N:` prose into ordered
//!   [`DayRoute`]s with continuous start/end places and clamped distances.
//! - **[`GeocodingResolver`]** resolves places to coordinates, degrading to
//!   `(0, 0)` on any miss instead of failing.
//! - **[`ImageJobOrchestrator`]** drives an image job through submission,
//!   rate limits and adaptive polling to a terminal [`JobState`].
//! - **[`PipelineCoordinator`]** sequences the above and runs geocoding and
//!   the image job concurrently.
//! - **[`TripService`]** exposes `get_route` / `check_image_status` as
//!   serde-typed functions for a web front end.
//!
//! Every collaborator sits behind a trait in [`backend`], with HTTP
//! adapters for OpenAI-compatible chat APIs, Ollama, Nominatim and Stable
//! Horde, plus scripted mocks.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use trip_pipeline::{GetRouteRequest, PipelineCoordinator, TripConfig, TripService, TripType};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let coordinator = PipelineCoordinator::from_config(TripConfig::from_env())?;
//!     let service = TripService::new(Arc::new(coordinator));
//!
//!     let response = service
//!         .get_route(&GetRouteRequest {
//!             country: "France".into(),
//!             trip_type: TripType::Car,
//!         })
//!         .await;
//!     println!("{}", serde_json::to_string_pretty(&response)?);
//!     Ok(())
//! }
//! ```
//!
//! ## Testing without services
//!
//! ```
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use trip_pipeline::backend::{MockGeocoder, MockTextBackend};
//! use trip_pipeline::{PipelineCoordinator, TripType};
//!
//! # tokio_test::block_on(async {
//! let coordinator = PipelineCoordinator::builder(Arc::new(MockTextBackend::fixed(
//!     "Day 1:\nFrom Paris to Lyon\nTotal Distance: 465 km",
//! )))
//! .geocoder(Arc::new(MockGeocoder::new().with_place("Paris", 48.85, 2.35)))
//! .image_enabled(false)
//! .build()
//! .unwrap();
//!
//! let plan = coordinator
//!     .plan("France", TripType::Car, &CancellationToken::new())
//!     .await
//!     .unwrap();
//! assert_eq!(plan.routes[0].distance_km, 300);
//! assert!(plan.routes[0].start_resolved);
//! assert!(!plan.routes[0].end_resolved);
//! # });
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod events;
pub mod geocode;
pub mod image_job;
pub mod itinerary;
pub mod pipeline;
pub mod prompt;
pub mod service;
pub mod types;

pub use backend::{
    BackoffConfig, Geocoder, HordeImageService, ImageService, NominatimGeocoder,
    OllamaTextBackend, OpenAiTextBackend, PollSchedule, TextGeneration,
};
pub use config::{GeocodingConfig, ImageConfig, TextGenConfig, TextProvider, TripConfig};
pub use error::{Result, TripError};
pub use events::{Event, EventHandler, FnEventHandler};
pub use geocode::{GeocodeCache, GeocodingResolver, Resolution};
pub use image_job::{ImageJob, ImageJobOrchestrator, JobState};
pub use itinerary::{CapitalizedWordExtractor, ItineraryParser, LocationExtractor};
pub use pipeline::{PipelineBuilder, PipelineCoordinator};
pub use service::{GetRouteRequest, GetRouteResponse, ImageStatusResponse, TripService};
pub use types::{Coordinate, DayRoute, ImageStatus, ImageSummary, TripPlan, TripType};
