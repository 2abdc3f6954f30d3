use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::TripError;

/// Mode of travel for a trip. Determines the daily distance bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TripType {
    Car,
    Bicycle,
}

impl TripType {
    pub const BICYCLE_MAX_KM: u32 = 80;
    pub const CAR_MIN_KM: u32 = 80;
    pub const CAR_MAX_KM: u32 = 300;

    /// Inclusive `(min, max)` daily distance in kilometres.
    pub fn distance_bounds(self) -> (u32, u32) {
        match self {
            TripType::Bicycle => (0, Self::BICYCLE_MAX_KM),
            TripType::Car => (Self::CAR_MIN_KM, Self::CAR_MAX_KM),
        }
    }

    /// Clamp a raw distance into this trip type's bounds.
    pub fn clamp_distance(self, km: u32) -> u32 {
        let (min, max) = self.distance_bounds();
        km.clamp(min, max)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TripType::Car => "car",
            TripType::Bicycle => "bicycle",
        }
    }
}

impl fmt::Display for TripType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TripType {
    type Err = TripError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "car" => Ok(TripType::Car),
            "bicycle" | "bike" => Ok(TripType::Bicycle),
            other => Err(TripError::InvalidConfig(format!(
                "unknown trip type '{}', expected 'car' or 'bicycle'",
                other
            ))),
        }
    }
}

/// A latitude/longitude pair.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    /// Sentinel used for places the geocoder could not resolve.
    pub const UNRESOLVED: Coordinate = Coordinate { lat: 0.0, lng: 0.0 };

    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// One day's travel segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayRoute {
    /// 1-based position within the trip.
    pub index: usize,
    /// Display name, e.g. `"France - Day 1 Route"`.
    pub name: String,
    /// First non-empty line of the day block.
    pub description: String,
    pub start_place: String,
    pub end_place: String,
    pub start_coord: Coordinate,
    pub end_coord: Coordinate,
    pub start_resolved: bool,
    pub end_resolved: bool,
    /// Clamped to the trip type's bounds.
    pub distance_km: u32,
    pub duration: Option<String>,
    pub points_of_interest: Vec<String>,
    #[serde(skip)]
    geocoded: bool,
}

impl DayRoute {
    /// A route with unresolved coordinates, as produced by the parser.
    pub fn new(
        index: usize,
        country: &str,
        description: impl Into<String>,
        start_place: impl Into<String>,
        end_place: impl Into<String>,
    ) -> Self {
        Self {
            index,
            name: format!("{} - Day {} Route", country, index),
            description: description.into(),
            start_place: start_place.into(),
            end_place: end_place.into(),
            start_coord: Coordinate::UNRESOLVED,
            end_coord: Coordinate::UNRESOLVED,
            start_resolved: false,
            end_resolved: false,
            distance_km: 0,
            duration: None,
            points_of_interest: Vec::new(),
            geocoded: false,
        }
    }

    /// Write geocoding results into the coordinate fields.
    ///
    /// Only the first call has any effect; returns `false` if the route was
    /// already geocoded.
    pub fn apply_coordinates(&mut self, start: Option<Coordinate>, end: Option<Coordinate>) -> bool {
        if self.geocoded {
            return false;
        }
        self.geocoded = true;
        self.start_resolved = start.is_some();
        self.end_resolved = end.is_some();
        self.start_coord = start.unwrap_or(Coordinate::UNRESOLVED);
        self.end_coord = end.unwrap_or(Coordinate::UNRESOLVED);
        true
    }

    pub fn is_geocoded(&self) -> bool {
        self.geocoded
    }
}

/// Outcome of the illustrative image for a trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageStatus {
    Completed,
    Unavailable,
    Skipped,
}

/// Image section of a [`TripPlan`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageSummary {
    pub status: ImageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Remote job id, usable with `check_image_status`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    /// Why the image is unavailable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ImageSummary {
    pub fn skipped() -> Self {
        Self {
            status: ImageStatus::Skipped,
            url: None,
            job_id: None,
            reason: None,
        }
    }
}

/// The aggregate result for one itinerary request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripPlan {
    pub routes: Vec<DayRoute>,
    pub image: ImageSummary,
    pub prompt: String,
}

impl TripPlan {
    /// Total clamped distance across all days.
    pub fn total_distance_km(&self) -> u32 {
        self.routes.iter().map(|r| r.distance_km).sum()
    }

    /// Routes with at least one unresolved endpoint.
    pub fn unresolved_routes(&self) -> impl Iterator<Item = &DayRoute> {
        self.routes
            .iter()
            .filter(|r| !(r.start_resolved && r.end_resolved))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bicycle_clamp() {
        assert_eq!(TripType::Bicycle.clamp_distance(120), 80);
        assert_eq!(TripType::Bicycle.clamp_distance(45), 45);
        assert_eq!(TripType::Bicycle.clamp_distance(0), 0);
    }

    #[test]
    fn test_car_clamp() {
        assert_eq!(TripType::Car.clamp_distance(450), 300);
        assert_eq!(TripType::Car.clamp_distance(20), 80);
        assert_eq!(TripType::Car.clamp_distance(150), 150);
    }

    #[test]
    fn test_trip_type_from_str() {
        assert_eq!("Car".parse::<TripType>().unwrap(), TripType::Car);
        assert_eq!("bicycle".parse::<TripType>().unwrap(), TripType::Bicycle);
        assert!("boat".parse::<TripType>().is_err());
    }

    #[test]
    fn test_trip_type_serde_lowercase() {
        let json = serde_json::to_string(&TripType::Bicycle).unwrap();
        assert_eq!(json, "\"bicycle\"");
        let parsed: TripType = serde_json::from_str("\"car\"").unwrap();
        assert_eq!(parsed, TripType::Car);
    }

    #[test]
    fn test_apply_coordinates_only_once() {
        let mut route = DayRoute::new(1, "France", "From Paris to Lyon", "Paris", "Lyon");
        assert!(route.apply_coordinates(Some(Coordinate::new(48.85, 2.35)), None));
        assert!(route.start_resolved);
        assert!(!route.end_resolved);
        assert_eq!(route.end_coord, Coordinate::UNRESOLVED);

        assert!(!route.apply_coordinates(None, Some(Coordinate::new(45.76, 4.83))));
        assert_eq!(route.start_coord, Coordinate::new(48.85, 2.35));
        assert!(!route.end_resolved);
    }

    #[test]
    fn test_day_route_serializes_camel_case() {
        let route = DayRoute::new(2, "Italy", "From Rome to Florence", "Rome", "Florence");
        let value = serde_json::to_value(&route).unwrap();
        assert_eq!(value["startPlace"], "Rome");
        assert_eq!(value["endPlace"], "Florence");
        assert_eq!(value["distanceKm"], 0);
        assert_eq!(value["name"], "Italy - Day 2 Route");
        assert!(value.get("geocoded").is_none());
    }

    #[test]
    fn test_image_summary_omits_empty_fields() {
        let value = serde_json::to_value(ImageSummary::skipped()).unwrap();
        assert_eq!(value["status"], "skipped");
        assert!(value.get("url").is_none());
        assert!(value.get("jobId").is_none());
    }
}
