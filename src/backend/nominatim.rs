//! Geocoding through a Nominatim (OpenStreetMap) server.

use super::{http_error, GeoMatch, Geocoder};
use crate::config::GeocodingConfig;
use crate::error::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

/// Nominatim search adapter: `GET {base_url}/search?q=<place>, <country>`.
#[derive(Debug, Clone)]
pub struct NominatimGeocoder {
    client: Client,
    base_url: String,
}

/// One row of a Nominatim `format=json` response. Coordinates arrive as strings.
#[derive(Debug, Deserialize)]
struct SearchRow {
    lat: String,
    lon: String,
    #[serde(default)]
    display_name: Option<String>,
}

impl SearchRow {
    fn into_match(self) -> Option<GeoMatch> {
        let lat = self.lat.trim().parse::<f64>().ok()?;
        let lng = self.lon.trim().parse::<f64>().ok()?;
        Some(GeoMatch {
            lat,
            lng,
            display_name: self.display_name,
        })
    }
}

impl NominatimGeocoder {
    /// Timeouts are enforced per lookup by the resolver, not by this client.
    pub fn new(config: &GeocodingConfig) -> Result<Self> {
        let client = Client::builder().user_agent(&config.user_agent).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn query(place: &str, country: &str) -> String {
        format!("{}, {}", place.trim(), country.trim())
    }

    fn parse_rows(rows: Vec<SearchRow>) -> Vec<GeoMatch> {
        rows.into_iter().filter_map(SearchRow::into_match).collect()
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn search(&self, place: &str, country: &str) -> Result<Vec<GeoMatch>> {
        let url = format!("{}/search", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[
                ("q", Self::query(place, country).as_str()),
                ("format", "json"),
                ("limit", "1"),
                ("addressdetails", "1"),
            ])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(http_error(resp).await);
        }

        let rows: Vec<SearchRow> = resp.json().await?;
        Ok(Self::parse_rows(rows))
    }

    fn name(&self) -> &'static str {
        "nominatim"
    }
}
