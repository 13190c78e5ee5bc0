//! Reverse geocoding: coordinates to a place description.
//!
//! The cache only depends on the [`ReverseGeocoder`] trait. The shipped
//! implementation queries the ArcGIS World geocoding service, which needs no
//! API key for reverse lookups.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::{GeoError, Result};

/// Default ArcGIS reverse-geocode endpoint.
pub const ARCGIS_REVERSE_URL: &str =
    "https://geocode.arcgis.com/arcgis/rest/services/World/GeocodeServer/reverseGeocode";

/// Raw place fields returned by a geocoder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaceResult {
    pub address: Option<String>,
    pub city: Option<String>,
    /// ISO 3166-1 alpha-3 country code.
    pub country_iso3: Option<String>,
    pub neighborhood: Option<String>,
    pub postal: Option<String>,
    pub region: Option<String>,
    pub state: Option<String>,
}

#[async_trait]
pub trait ReverseGeocoder: Send + Sync {
    async fn reverse(&self, latitude: f64, longitude: f64) -> Result<PlaceResult>;
}

// ---------------------------------------------------------------------------
// ArcGIS
// ---------------------------------------------------------------------------

pub struct ArcGisGeocoder {
    client: reqwest::Client,
    endpoint: String,
}

impl ArcGisGeocoder {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("meshgate/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl ReverseGeocoder for ArcGisGeocoder {
    async fn reverse(&self, latitude: f64, longitude: f64) -> Result<PlaceResult> {
        // ArcGIS takes x,y (longitude first)
        let location = format!("{longitude},{latitude}");

        let body = self
            .client
            .get(&self.endpoint)
            .query(&[("f", "json"), ("location", location.as_str())])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        debug!(latitude, longitude, len = body.len(), "reverse geocode response");

        parse_arcgis(&body)
    }
}

#[derive(Debug, Deserialize)]
struct ArcGisResponse {
    address: Option<ArcGisAddress>,
    error: Option<ArcGisErrorBody>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ArcGisAddress {
    #[serde(rename = "Match_addr", default)]
    match_addr: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    neighborhood: Option<String>,
    #[serde(default)]
    postal: Option<String>,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    country_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ArcGisErrorBody {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

fn parse_arcgis(body: &str) -> Result<PlaceResult> {
    let response: ArcGisResponse = serde_json::from_str(body)?;

    if let Some(err) = response.error {
        return Err(GeoError::Api(format!("{} {}", err.code, err.message)));
    }

    let address = response.address.ok_or(GeoError::NoResult)?;

    Ok(PlaceResult {
        address: address.match_addr,
        city: address.city,
        country_iso3: address.country_code,
        neighborhood: address.neighborhood,
        postal: address.postal,
        state: address.region.clone(),
        region: address.region,
    })
}

// ---------------------------------------------------------------------------
// Disabled
// ---------------------------------------------------------------------------

/// Geocoder used when lookups are turned off; every call fails.
pub struct DisabledGeocoder;

#[async_trait]
impl ReverseGeocoder for DisabledGeocoder {
    async fn reverse(&self, _latitude: f64, _longitude: f64) -> Result<PlaceResult> {
        Err(GeoError::Disabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_arcgis_address() {
        let body = r#"{
            "address": {
                "Match_addr": "Pariser Platz, 10117, Mitte, Berlin",
                "LongLabel": "Pariser Platz, 10117, Mitte, Berlin, DEU",
                "Neighborhood": "Mitte",
                "City": "Berlin",
                "Region": "Berlin",
                "Postal": "10117",
                "CountryCode": "DEU"
            },
            "location": {"x": 13.3777, "y": 52.5163, "spatialReference": {"wkid": 4326}}
        }"#;

        let result = parse_arcgis(body).unwrap();
        assert_eq!(result.city.as_deref(), Some("Berlin"));
        assert_eq!(result.state.as_deref(), Some("Berlin"));
        assert_eq!(result.country_iso3.as_deref(), Some("DEU"));
        assert_eq!(result.postal.as_deref(), Some("10117"));
        assert_eq!(result.neighborhood.as_deref(), Some("Mitte"));
        assert_eq!(
            result.address.as_deref(),
            Some("Pariser Platz, 10117, Mitte, Berlin")
        );
    }

    #[test]
    fn test_parse_arcgis_error() {
        let body = r#"{"error": {"code": 400, "message": "Cannot perform query.", "details": []}}"#;
        assert!(matches!(parse_arcgis(body), Err(GeoError::Api(msg)) if msg.contains("400")));
    }

    #[test]
    fn test_parse_arcgis_empty() {
        assert!(matches!(parse_arcgis("{}"), Err(GeoError::NoResult)));
        assert!(matches!(parse_arcgis("not json"), Err(GeoError::Parse(_))));
    }

    #[tokio::test]
    async fn test_disabled_geocoder_always_fails() {
        assert!(matches!(
            DisabledGeocoder.reverse(1.0, 2.0).await,
            Err(GeoError::Disabled)
        ));
    }
}
