//! Place-name to coordinate resolution with graceful degradation.
//!
//! A lookup never fails the request: transport errors, timeouts and empty
//! results all come back as [`Resolution::Miss`], and the route keeps the
//! `(0, 0)` sentinel with its `*_resolved` flag cleared.

use crate::backend::Geocoder;
use crate::events::{emit, Event, EventHandler};
use crate::types::{Coordinate, DayRoute};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, warn};

/// Result of resolving one place.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolution {
    Resolved(Coordinate),
    Miss,
}

impl Resolution {
    pub fn coordinate(self) -> Option<Coordinate> {
        match self {
            Resolution::Resolved(c) => Some(c),
            Resolution::Miss => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Resolution::Resolved(_))
    }
}

/// Resolved coordinates shared across requests, keyed by `(place, country)`
/// case-insensitively.
///
/// Misses are never stored, so a place that failed once is looked up again
/// next time.
#[derive(Debug, Clone, Default)]
pub struct GeocodeCache {
    inner: Arc<RwLock<HashMap<(String, String), Coordinate>>>,
}

impl GeocodeCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(place: &str, country: &str) -> (String, String) {
        (place.trim().to_lowercase(), country.trim().to_lowercase())
    }

    pub fn get(&self, place: &str, country: &str) -> Option<Coordinate> {
        let guard = self.inner.read().unwrap_or_else(|p| p.into_inner());
        guard.get(&Self::key(place, country)).copied()
    }

    pub fn insert(&self, place: &str, country: &str, coordinate: Coordinate) {
        let mut guard = self.inner.write().unwrap_or_else(|p| p.into_inner());
        guard.insert(Self::key(place, country), coordinate);
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.inner.write().unwrap_or_else(|p| p.into_inner()).clear();
    }
}

/// Resolves places through a [`Geocoder`], one timeout-bounded lookup each.
#[derive(Clone)]
pub struct GeocodingResolver {
    geocoder: Arc<dyn Geocoder>,
    timeout: Duration,
    cache: Option<GeocodeCache>,
    events: Option<Arc<dyn EventHandler>>,
}

impl std::fmt::Debug for GeocodingResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeocodingResolver")
            .field("geocoder", &self.geocoder.name())
            .field("timeout", &self.timeout)
            .field("cached", &self.cache.as_ref().map(GeocodeCache::len))
            .finish()
    }
}

impl GeocodingResolver {
    pub fn new(geocoder: Arc<dyn Geocoder>, timeout: Duration) -> Self {
        Self {
            geocoder,
            timeout,
            cache: None,
            events: None,
        }
    }

    pub fn with_cache(mut self, cache: GeocodeCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_events(mut self, handler: Option<Arc<dyn EventHandler>>) -> Self {
        self.events = handler;
        self
    }

    /// Resolve `place` within `country`. Uses the first match only.
    pub async fn resolve(&self, place: &str, country: &str) -> Resolution {
        if let Some(hit) = self.cache.as_ref().and_then(|c| c.get(place, country)) {
            debug!(place, country, "geocode cache hit");
            return Resolution::Resolved(hit);
        }

        let lookup = tokio::time::timeout(self.timeout, self.geocoder.search(place, country)).await;
        let matches = match lookup {
            Ok(Ok(matches)) => matches,
            Ok(Err(e)) => {
                warn!(geocoder = self.geocoder.name(), place, country, error = %e, "geocoding failed");
                return Resolution::Miss;
            }
            Err(_) => {
                warn!(
                    geocoder = self.geocoder.name(),
                    place,
                    country,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "geocoding timed out"
                );
                return Resolution::Miss;
            }
        };

        let Some(first) = matches.into_iter().next() else {
            warn!(geocoder = self.geocoder.name(), place, country, "no geocoding match");
            return Resolution::Miss;
        };
        if !(first.lat.is_finite() && first.lng.is_finite()) {
            warn!(place, country, "geocoder returned non-finite coordinates");
            return Resolution::Miss;
        }

        let coordinate = Coordinate::new(first.lat, first.lng);
        if let Some(cache) = &self.cache {
            cache.insert(place, country, coordinate);
        }
        debug!(place, country, lat = coordinate.lat, lng = coordinate.lng, "geocoded");
        Resolution::Resolved(coordinate)
    }

    /// Resolve both endpoints of one route concurrently.
    pub async fn resolve_route(
        &self,
        route: &DayRoute,
        country: &str,
    ) -> (Option<Coordinate>, Option<Coordinate>) {
        let (start, end) = tokio::join!(
            self.resolve(&route.start_place, country),
            self.resolve(&route.end_place, country)
        );
        for (place, resolution) in [(&route.start_place, start), (&route.end_place, end)] {
            emit(
                &self.events,
                Event::Geocoded {
                    index: route.index,
                    place: place.clone(),
                    resolved: resolution.is_resolved(),
                },
            );
        }
        (start.coordinate(), end.coordinate())
    }

    /// Geocode every route concurrently and write the results back in place.
    ///
    /// Results are matched to routes by position, whatever order the lookups
    /// finish in. Returns the number of routes with both endpoints resolved.
    pub async fn resolve_all(&self, routes: &mut [DayRoute], country: &str) -> usize {
        let results = join_all(routes.iter().map(|r| self.resolve_route(r, country))).await;
        let mut complete = 0;
        for (route, (start, end)) in routes.iter_mut().zip(results) {
            if start.is_some() && end.is_some() {
                complete += 1;
            }
            route.apply_coordinates(start, end);
        }
        complete
    }
}
