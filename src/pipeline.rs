use crate::{
    backend::{
        with_backoff, Geocoder, HordeImageService, ImageRequest, ImageService, NominatimGeocoder,
        OllamaTextBackend, OpenAiTextBackend, TextGeneration,
    },
    config::{TextProvider, TripConfig},
    error::Result,
    events::{emit, Event, EventHandler, Stage},
    geocode::{GeocodeCache, GeocodingResolver},
    image_job::{ImageJob, ImageJobOrchestrator},
    itinerary::{ItineraryParser, LocationExtractor},
    prompt,
    types::{ImageStatus, ImageSummary, TripPlan, TripType},
    TripError,
};
use futures::future::OptionFuture;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Sequences one trip request: text generation, parsing, then geocoding and
/// the image job side by side.
///
/// Collaborators are injected trait objects, so the same coordinator runs
/// against live services ([`from_config`](Self::from_config)) or mocks
/// ([`builder`](Self::builder)). A coordinator holds no per-request state
/// and can serve concurrent requests.
pub struct PipelineCoordinator {
    text: Arc<dyn TextGeneration>,
    resolver: GeocodingResolver,
    image: Option<Arc<dyn ImageService>>,
    parser: ItineraryParser,
    config: TripConfig,
    events: Option<Arc<dyn EventHandler>>,
}

impl std::fmt::Debug for PipelineCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineCoordinator")
            .field("text", &self.text.name())
            .field("resolver", &self.resolver)
            .field("image", &self.image.as_ref().map(|s| s.name()))
            .field("parser", &self.parser)
            .field("days", &self.config.days)
            .field("has_events", &self.events.is_some())
            .finish()
    }
}

impl PipelineCoordinator {
    /// Start a builder around a text-generation backend.
    pub fn builder(text: Arc<dyn TextGeneration>) -> PipelineBuilder {
        PipelineBuilder::new(text)
    }

    /// Wire the live HTTP adapters described by `config`.
    pub fn from_config(config: TripConfig) -> Result<Self> {
        let text: Arc<dyn TextGeneration> = match config.text.provider {
            TextProvider::OpenAi => {
                let backend = OpenAiTextBackend::new(&config.text)?;
                if !backend.has_api_key() {
                    warn!(base_url = %config.text.base_url, "no text-generation API key configured");
                }
                Arc::new(backend)
            }
            TextProvider::Ollama => Arc::new(OllamaTextBackend::new(&config.text)?),
        };
        let geocoder: Arc<dyn Geocoder> = Arc::new(NominatimGeocoder::new(&config.geocoding)?);

        let mut builder = Self::builder(text).geocoder(geocoder);
        if config.image.enabled {
            builder = builder.image_service(Arc::new(HordeImageService::new(&config.image)?));
        }
        if config.geocoding.cache {
            builder = builder.cache(GeocodeCache::new());
        }
        builder.config(config).build()
    }

    pub fn config(&self) -> &TripConfig {
        &self.config
    }

    pub fn image_service(&self) -> Option<&Arc<dyn ImageService>> {
        self.image.as_ref()
    }

    fn image_enabled(&self) -> bool {
        self.config.image.enabled && self.image.is_some()
    }

    /// Produce a [`TripPlan`] for `country` and `trip_type`.
    ///
    /// Fails only when no itinerary could be produced: the text service was
    /// unusable ([`TripError::Generation`]), the text had no day sections
    /// ([`TripError::Parse`]), or `cancel` fired before the text arrived.
    /// Geocoding misses and image failures degrade the plan instead.
    pub async fn plan(
        &self,
        country: &str,
        trip_type: TripType,
        cancel: &CancellationToken,
    ) -> Result<TripPlan> {
        let country = country.trim();
        if country.is_empty() {
            return Err(TripError::InvalidConfig("country must not be empty".into()));
        }
        let days = self.config.days;
        let itinerary_prompt = prompt::itinerary_prompt(country, trip_type, days);
        info!(country, trip_type = %trip_type, days, "planning trip");

        emit(&self.events, Event::StageStart { stage: Stage::TextGeneration });
        let generated = with_backoff(
            &self.text,
            &itinerary_prompt,
            &self.config.text.backoff(),
            Some(cancel),
            &self.events,
            None,
        )
        .await
        .map_err(|e| match e {
            TripError::Cancelled | TripError::Generation(_) => e,
            other => TripError::Generation(format!("{} backend: {}", self.text.name(), other)),
        });
        emit(
            &self.events,
            Event::StageEnd {
                stage: Stage::TextGeneration,
                ok: generated.is_ok(),
            },
        );
        let text = generated?;

        emit(&self.events, Event::StageStart { stage: Stage::Parsing });
        let parsed = self.parser.parse_strict(&text, country, trip_type);
        emit(
            &self.events,
            Event::StageEnd {
                stage: Stage::Parsing,
                ok: parsed.is_ok(),
            },
        );
        let mut routes = parsed?;

        let image_job = self.image_enabled().then(|| {
            let request = ImageRequest::from_config(
                prompt::image_prompt(country, trip_type, days),
                &self.config.image,
            );
            self.run_image_job(request, cancel.child_token())
        });

        emit(&self.events, Event::StageStart { stage: Stage::Geocoding });
        let (complete, job) = tokio::join!(
            self.resolver.resolve_all(&mut routes, country),
            OptionFuture::from(image_job)
        );
        emit(
            &self.events,
            Event::StageEnd {
                stage: Stage::Geocoding,
                ok: complete == routes.len(),
            },
        );

        let image = summarize_image(job.as_ref());
        info!(
            country,
            routes = routes.len(),
            geocoded = complete,
            image = ?image.status,
            "trip planned"
        );
        Ok(TripPlan {
            routes,
            image,
            prompt: itinerary_prompt,
        })
    }

    async fn run_image_job(&self, request: ImageRequest, cancel: CancellationToken) -> ImageJob {
        emit(&self.events, Event::StageStart { stage: Stage::Image });
        let service = match &self.image {
            Some(service) => service.clone(),
            None => return ImageJob::new(),
        };
        let mut orchestrator = ImageJobOrchestrator::new(service, self.config.image.clone())
            .with_events(self.events.clone())
            .with_cancel(cancel);
        let job = orchestrator.run(&request).await;
        emit(
            &self.events,
            Event::StageEnd {
                stage: Stage::Image,
                ok: job.outcome().is_ok(),
            },
        );
        job
    }
}

/// Collapse a finished image job into the plan's image section.
fn summarize_image(job: Option<&ImageJob>) -> ImageSummary {
    let Some(job) = job else {
        return ImageSummary::skipped();
    };
    let job_id = job.id().map(str::to_string);
    match job.outcome() {
        Ok(url) => ImageSummary {
            status: ImageStatus::Completed,
            url: Some(url.to_string()),
            job_id,
            reason: None,
        },
        Err(e) => ImageSummary {
            status: ImageStatus::Unavailable,
            url: None,
            job_id,
            reason: Some(e.to_string()),
        },
    }
}

/// Builder for [`PipelineCoordinator`].
pub struct PipelineBuilder {
    text: Arc<dyn TextGeneration>,
    geocoder: Option<Arc<dyn Geocoder>>,
    image: Option<Arc<dyn ImageService>>,
    extractor: Option<Arc<dyn LocationExtractor>>,
    cache: Option<GeocodeCache>,
    config: TripConfig,
    image_enabled: Option<bool>,
    events: Option<Arc<dyn EventHandler>>,
}

impl PipelineBuilder {
    pub fn new(text: Arc<dyn TextGeneration>) -> Self {
        Self {
            text,
            geocoder: None,
            image: None,
            extractor: None,
            cache: None,
            config: TripConfig::default(),
            image_enabled: None,
            events: None,
        }
    }

    pub fn geocoder(mut self, geocoder: Arc<dyn Geocoder>) -> Self {
        self.geocoder = Some(geocoder);
        self
    }

    pub fn image_service(mut self, service: Arc<dyn ImageService>) -> Self {
        self.image = Some(service);
        self
    }

    /// Replace the default capitalized-word place extractor.
    pub fn extractor(mut self, extractor: Arc<dyn LocationExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Share resolved coordinates with other coordinators holding `cache`.
    pub fn cache(mut self, cache: GeocodeCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn config(mut self, config: TripConfig) -> Self {
        self.config = config;
        self
    }

    /// Turn the image job on or off, overriding `config.image.enabled`.
    pub fn image_enabled(mut self, enabled: bool) -> Self {
        self.image_enabled = Some(enabled);
        self
    }

    pub fn event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.events = Some(handler);
        self
    }

    /// Build the coordinator, validating configuration.
    pub fn build(self) -> Result<PipelineCoordinator> {
        let mut config = self.config;
        if let Some(enabled) = self.image_enabled {
            config.image.enabled = enabled;
        }
        config.validate()?;

        let geocoder = self.geocoder.ok_or_else(|| {
            TripError::InvalidConfig("PipelineCoordinator needs a geocoder".to_string())
        })?;
        if config.image.enabled && self.image.is_none() {
            return Err(TripError::InvalidConfig(
                "image generation is enabled but no image service was given".to_string(),
            ));
        }

        let mut resolver = GeocodingResolver::new(geocoder, config.geocoding.timeout())
            .with_events(self.events.clone());
        if let Some(cache) = self.cache {
            resolver = resolver.with_cache(cache);
        }
        let parser = match self.extractor {
            Some(extractor) => ItineraryParser::new(extractor),
            None => ItineraryParser::default(),
        };

        Ok(PipelineCoordinator {
            text: self.text,
            resolver,
            image: self.image,
            parser,
            config,
            events: self.events,
        })
    }
}
