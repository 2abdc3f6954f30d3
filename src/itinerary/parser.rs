//! Turns generated itinerary prose into ordered [`DayRoute`]s.
//!
//! The input is whatever the text model produced. The parser only commits to
//! the coarse structure (`Day N:` sections); everything inside a section is
//! read best-effort, so a sloppy day still yields a route with empty fields.

use super::extract::{CapitalizedWordExtractor, LocationExtractor};
use crate::error::{Result, TripError};
use crate::types::{DayRoute, TripType};
use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::{debug, warn};

const KM_PER_MILE: f64 = 1.609_344;

static DAY_MARKER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)\bday\s+\d+\s*:").ok());

static DISTANCE_UNIT: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)\b(km|kms|kilomet(?:er|re)s?|mi|miles?)\b").ok());

static NUMBER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\d{1,3}(?:,\d{3})+|\d+(?:\.\d+)?").ok());

/// The fields read from one day section, before locations are assigned.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DayDetails {
    pub description: String,
    /// Raw distance in kilometres, unclamped. 0 when absent.
    pub distance_km: u32,
    pub duration: Option<String>,
    pub points_of_interest: Vec<String>,
}

/// Split text into day sections. Anything before the first marker is dropped.
pub fn split_days(text: &str) -> Vec<&str> {
    let Some(marker) = DAY_MARKER.as_ref() else {
        return Vec::new();
    };
    let starts: Vec<(usize, usize)> = marker.find_iter(text).map(|m| (m.start(), m.end())).collect();
    starts
        .iter()
        .enumerate()
        .map(|(i, &(_, body_start))| {
            let body_end = starts.get(i + 1).map_or(text.len(), |&(next, _)| next);
            &text[body_start..body_end]
        })
        .collect()
}

/// Trim whitespace plus the markdown decoration models like to add.
fn clean_line(line: &str) -> &str {
    line.trim()
        .trim_matches(|c: char| matches!(c, '*' | '#' | '_' | '-' | '•'))
        .trim()
}

/// Read a distance in km from a line that names a distance unit.
fn parse_distance(line: &str) -> Option<u32> {
    let unit = DISTANCE_UNIT.as_ref()?.find(line)?;
    let number = NUMBER.as_ref()?.find(line)?;
    let value: f64 = number.as_str().replace(',', "").parse().ok()?;
    let is_miles = unit.as_str().to_ascii_lowercase().starts_with("mi");
    let km = if is_miles { value * KM_PER_MILE } else { value };
    Some(km.round().clamp(0.0, f64::from(u32::MAX)) as u32)
}

/// Read the value after the first `:` on a line mentioning a duration.
fn parse_duration(line: &str) -> Option<String> {
    if !line.to_ascii_lowercase().contains("duration") {
        return None;
    }
    let (_, value) = line.split_once(':')?;
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Extract description, distance, duration and points of interest from one
/// day section.
pub fn extract_day_details(block: &str) -> DayDetails {
    let lines: Vec<&str> = block
        .lines()
        .map(clean_line)
        .filter(|l| !l.is_empty())
        .collect();

    let Some(description) = lines.first() else {
        return DayDetails::default();
    };

    let distance = lines
        .iter()
        .enumerate()
        .find_map(|(i, l)| parse_distance(l).map(|km| (i, km)));
    let duration = lines
        .iter()
        .enumerate()
        .find_map(|(i, l)| parse_duration(l).map(|d| (i, d)));

    let distance_idx = distance.map(|(i, _)| i);
    let duration_idx = duration.as_ref().map(|(i, _)| *i);

    let points_of_interest = lines
        .iter()
        .enumerate()
        .skip(1)
        .filter(|(i, _)| Some(*i) != distance_idx && Some(*i) != duration_idx)
        .map(|(_, l)| l.to_string())
        .collect();

    DayDetails {
        description: description.to_string(),
        distance_km: distance.map_or(0, |(_, km)| km),
        duration: duration.map(|(_, d)| d),
        points_of_interest,
    }
}

/// Parses itinerary text into day routes with continuous start/end places.
#[derive(Clone)]
pub struct ItineraryParser {
    extractor: Arc<dyn LocationExtractor>,
}

impl std::fmt::Debug for ItineraryParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItineraryParser")
            .field("extractor", &self.extractor.name())
            .finish()
    }
}

impl Default for ItineraryParser {
    fn default() -> Self {
        Self::new(Arc::new(CapitalizedWordExtractor::default()))
    }
}

impl ItineraryParser {
    pub fn new(extractor: Arc<dyn LocationExtractor>) -> Self {
        Self { extractor }
    }

    /// Places mentioned in a description, minus the country itself.
    fn locations(&self, description: &str, country: &str) -> Vec<String> {
        let country = country.trim();
        self.extractor
            .extract(description)
            .into_iter()
            .filter(|place| !place.eq_ignore_ascii_case(country))
            .collect()
    }

    /// Parse `text` into routes indexed 1..N.
    ///
    /// Returns an empty list when no `Day N:` section exists; use
    /// [`parse_strict`](Self::parse_strict) to turn that into an error.
    pub fn parse(&self, text: &str, country: &str, trip_type: TripType) -> Vec<DayRoute> {
        let mut routes = Vec::new();
        let mut previous_end: Option<String> = None;

        for (i, block) in split_days(text).into_iter().enumerate() {
            let index = i + 1;
            let details = extract_day_details(block);
            if details.description.is_empty() {
                warn!(day = index, "day section is empty");
            }

            let locations = self.locations(&details.description, country);
            let start = previous_end
                .clone()
                .or_else(|| locations.first().cloned())
                .unwrap_or_else(|| country.to_string());
            let mut end = locations
                .last()
                .cloned()
                .unwrap_or_else(|| country.to_string());
            if start == end && locations.len() >= 2 {
                end = locations[1].clone();
            }

            let distance_km = trip_type.clamp_distance(details.distance_km);
            debug!(
                day = index,
                start = %start,
                end = %end,
                raw_km = details.distance_km,
                km = distance_km,
                pois = details.points_of_interest.len(),
                "parsed day"
            );

            let mut route = DayRoute::new(index, country, details.description, &start, &end);
            route.distance_km = distance_km;
            route.duration = details.duration;
            route.points_of_interest = details.points_of_interest;
            routes.push(route);

            previous_end = Some(end);
        }

        routes
    }

    /// Like [`parse`](Self::parse), but zero day sections is a [`TripError::Parse`].
    pub fn parse_strict(&self, text: &str, country: &str, trip_type: TripType) -> Result<Vec<DayRoute>> {
        let routes = self.parse(text, country, trip_type);
        if routes.is_empty() {
            let snippet: String = text.trim().chars().take(200).collect();
            return Err(TripError::Parse(format!(
                "no 'Day N:' sections found in generated text (truncated): {}",
                snippet
            )));
        }
        Ok(routes)
    }
}
