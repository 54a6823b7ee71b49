//! Thin clients for the three third-party services: address geocoding,
//! driving routes (OSRM) and flood-zone queries (FEMA NFHL). One attempt per
//! call, generous timeout, no automatic retry; caching and rate limiting are
//! the pipeline driver's job.

use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;

use crate::types::Coordinates;

pub(crate) const ARCGIS_GEOCODE_URL: &str =
    "https://geocode.arcgis.com/arcgis/rest/services/World/GeocodeServer/findAddressCandidates";
pub(crate) const NOMINATIM_SEARCH_URL: &str = "https://nominatim.openstreetmap.org/search";
pub(crate) const OSRM_ROUTE_URL: &str = "http://router.project-osrm.org/route/v1/driving";
// Flood Hazard Zones layer (28) of the National Flood Hazard Layer
pub(crate) const FEMA_NFHL_URL: &str =
    "https://hazards.fema.gov/arcgis/rest/services/public/NFHL/MapServer/28/query";

pub const DEFAULT_FALLBACK_LOCALITY: &str = "New Orleans, LA";

#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
}

#[derive(Debug, thiserror::Error)]
#[error("Invalid geocode provider '{0}'. Accepted values: 'arcgis', 'nominatim', 'osm'")]
pub struct ProviderParseError(String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GeocodeProvider {
    #[default]
    ArcGis,
    Nominatim,
}

impl FromStr for GeocodeProvider {
    type Err = ProviderParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "arcgis" => Ok(GeocodeProvider::ArcGis),
            "nominatim" | "osm" => Ok(GeocodeProvider::Nominatim),
            _ => Err(ProviderParseError(s.to_string())),
        }
    }
}

impl Display for GeocodeProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GeocodeProvider::ArcGis => write!(f, "arcgis"),
            GeocodeProvider::Nominatim => write!(f, "nominatim"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteSummary {
    pub duration_mins: f64,
    pub distance_miles: f64,
}

#[derive(Debug, Clone)]
pub struct LookupClient {
    client: Client,
    provider: GeocodeProvider,
    fallback_locality: Option<String>,
}

impl LookupClient {
    pub fn new(provider: GeocodeProvider) -> Result<LookupClient, LookupError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(format!(
                "{}/{}",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            ))
            .build()?;

        Ok(LookupClient {
            client,
            provider,
            fallback_locality: Some(DEFAULT_FALLBACK_LOCALITY.to_string()),
        })
    }

    /// Locality substituted for the original city on a second geocode attempt
    /// when the first returns nothing (Nominatim only). `None` disables it.
    pub fn with_fallback_locality(mut self, locality: Option<String>) -> LookupClient {
        self.fallback_locality = locality;
        self
    }

    /// Resolves a one-line address to coordinates via the configured
    /// provider. `Ok(None)` means no candidate was found.
    pub async fn geocode(&self, address: &str) -> Result<Option<Coordinates>, LookupError> {
        match self.provider {
            GeocodeProvider::ArcGis => self.geocode_arcgis(address).await,
            GeocodeProvider::Nominatim => {
                if let Some(coords) = self.geocode_nominatim(address).await? {
                    return Ok(Some(coords));
                }
                let Some(fallback) = self
                    .fallback_locality
                    .as_deref()
                    .and_then(|locality| substitute_locality(address, locality))
                else {
                    return Ok(None);
                };
                log::debug!("Retrying geocode with fallback locality: {fallback}");
                self.geocode_nominatim(&fallback).await
            }
        }
    }

    async fn geocode_arcgis(&self, address: &str) -> Result<Option<Coordinates>, LookupError> {
        let response: ArcGisResponse = self
            .client
            .get(ARCGIS_GEOCODE_URL)
            .query(&[
                ("f", "json"),
                ("singleLine", address),
                ("outFields", "Match_addr,Addr_type"),
                ("maxLocations", "1"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        // ArcGIS reports (lat, lon) as (y, x)
        Ok(response.candidates.first().map(|c| Coordinates {
            lat: c.location.y,
            lon: c.location.x,
        }))
    }

    async fn geocode_nominatim(&self, address: &str) -> Result<Option<Coordinates>, LookupError> {
        let places: Vec<NominatimPlace> = self
            .client
            .get(NOMINATIM_SEARCH_URL)
            .query(&[("q", address), ("format", "json")])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let Some(place) = places.first() else {
            return Ok(None);
        };
        match (place.lat.parse::<f64>(), place.lon.parse::<f64>()) {
            (Ok(lat), Ok(lon)) => Ok(Some(Coordinates { lat, lon })),
            _ => Ok(None),
        }
    }

    /// Driving duration and distance between two points. `Ok(None)` when OSRM
    /// cannot produce a route.
    pub async fn route(
        &self,
        origin: Coordinates,
        destination: Coordinates,
    ) -> Result<Option<RouteSummary>, LookupError> {
        // OSRM takes coordinate pairs in lon,lat order
        let url = format!(
            "{OSRM_ROUTE_URL}/{},{};{},{}?overview=false",
            origin.lon, origin.lat, destination.lon, destination.lat
        );
        let response: OsrmResponse = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if response.code != "Ok" {
            return Ok(None);
        }
        Ok(response.routes.first().map(|route| RouteSummary {
            duration_mins: round1(route.duration / 60.0),
            distance_miles: round1(route.distance / 1609.34),
        }))
    }

    /// Flood-zone label for a point, e.g. `"AE (FLOODWAY)"` or `"X (N/A)"`.
    /// `Ok(None)` when the point intersects no mapped zone.
    pub async fn flood_zone(&self, point: Coordinates) -> Result<Option<String>, LookupError> {
        let geometry = format!("{},{}", point.lon, point.lat);
        let response: FemaResponse = self
            .client
            .get(FEMA_NFHL_URL)
            .query(&[
                ("geometry", geometry.as_str()),
                ("geometryType", "esriGeometryPoint"),
                ("inSR", "4326"),
                ("spatialRel", "esriSpatialRelIntersects"),
                ("outFields", "FLD_ZONE,ZONE_SUBTY"),
                ("returnGeometry", "false"),
                ("f", "json"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response.features.first().map(|f| f.attributes.label()))
    }
}

/// "street, city, rest..." with the city swapped for `locality`. `None` when
/// the address has no city component to swap.
fn substitute_locality(address: &str, locality: &str) -> Option<String> {
    let parts: Vec<&str> = address.split(',').collect();
    if parts.len() < 2 {
        return None;
    }
    let mut out = format!("{}, {}", parts[0].trim(), locality);
    if parts.len() > 2 {
        out.push(',');
        out.push_str(&parts[2..].join(","));
    }
    Some(out)
}

pub(crate) fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[derive(Debug, Deserialize)]
struct ArcGisResponse {
    #[serde(default)]
    candidates: Vec<ArcGisCandidate>,
}

#[derive(Debug, Deserialize)]
struct ArcGisCandidate {
    location: ArcGisLocation,
}

#[derive(Debug, Deserialize)]
struct ArcGisLocation {
    x: f64,
    y: f64,
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
}

#[derive(Debug, Deserialize)]
struct OsrmResponse {
    code: String,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    duration: f64,
    distance: f64,
}

#[derive(Debug, Deserialize)]
struct FemaResponse {
    #[serde(default)]
    features: Vec<FemaFeature>,
}

#[derive(Debug, Deserialize)]
struct FemaFeature {
    attributes: FemaZoneAttributes,
}

#[derive(Debug, Deserialize)]
struct FemaZoneAttributes {
    #[serde(rename = "FLD_ZONE")]
    fld_zone: Option<String>,
    #[serde(rename = "ZONE_SUBTY")]
    zone_subty: Option<String>,
}

impl FemaZoneAttributes {
    fn label(&self) -> String {
        let zone = self.fld_zone.as_deref().unwrap_or("N/A");
        let subtype = self
            .zone_subty
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or("N/A");
        format!("{zone} ({subtype})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_seconds_to_minutes() {
        assert_eq!(round1(1500.0 / 60.0), 25.0);
        assert_eq!(round1(1507.0 / 60.0), 25.1);
    }

    #[test]
    fn test_distance_meters_to_miles() {
        assert_eq!(round1(16093.4 / 1609.34), 10.0);
        assert_eq!(round1(804.67 / 1609.34), 0.5);
    }

    #[test]
    fn test_provider_from_str() {
        assert_eq!(
            "arcgis".parse::<GeocodeProvider>().unwrap(),
            GeocodeProvider::ArcGis
        );
        assert_eq!(
            "nominatim".parse::<GeocodeProvider>().unwrap(),
            GeocodeProvider::Nominatim
        );
        assert_eq!(
            "osm".parse::<GeocodeProvider>().unwrap(),
            GeocodeProvider::Nominatim
        );
        assert!("google".parse::<GeocodeProvider>().is_err());
    }

    #[test]
    fn test_substitute_locality() {
        assert_eq!(
            substitute_locality("123 Oak St, Metairie, LA 70001", "New Orleans, LA").unwrap(),
            "123 Oak St, New Orleans, LA, LA 70001"
        );
        assert_eq!(
            substitute_locality("123 Oak St, Metairie", "New Orleans, LA").unwrap(),
            "123 Oak St, New Orleans, LA"
        );
        assert_eq!(substitute_locality("123 Oak St", "New Orleans, LA"), None);
    }

    #[test]
    fn test_arcgis_candidate_decodes_y_as_lat() {
        let body = r#"{"candidates":[{"address":"781 Lasalle St","location":{"x":-90.077,"y":29.955},"score":100}]}"#;
        let response: ArcGisResponse = serde_json::from_str(body).unwrap();
        let location = &response.candidates[0].location;
        assert_eq!(location.y, 29.955);
        assert_eq!(location.x, -90.077);
    }

    #[test]
    fn test_arcgis_empty_candidates() {
        let response: ArcGisResponse = serde_json::from_str(r#"{"candidates":[]}"#).unwrap();
        assert!(response.candidates.is_empty());
        let response: ArcGisResponse = serde_json::from_str(r#"{}"#).unwrap();
        assert!(response.candidates.is_empty());
    }

    #[test]
    fn test_osrm_response_decodes() {
        let body = r#"{"code":"Ok","routes":[{"duration":1500.0,"distance":16093.4,"legs":[]}]}"#;
        let response: OsrmResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.code, "Ok");
        assert_eq!(response.routes[0].duration, 1500.0);
    }

    #[test]
    fn test_fema_zone_label() {
        let body = r#"{"features":[{"attributes":{"FLD_ZONE":"AE","ZONE_SUBTY":"FLOODWAY"}}]}"#;
        let response: FemaResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.features[0].attributes.label(), "AE (FLOODWAY)");

        let body = r#"{"features":[{"attributes":{"FLD_ZONE":"X","ZONE_SUBTY":null}}]}"#;
        let response: FemaResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.features[0].attributes.label(), "X (N/A)");

        let body = r#"{"features":[{"attributes":{"FLD_ZONE":"X","ZONE_SUBTY":""}}]}"#;
        let response: FemaResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.features[0].attributes.label(), "X (N/A)");
    }
}
