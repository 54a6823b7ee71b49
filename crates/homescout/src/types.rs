use std::fmt::Display;
use std::str::FromStr;

// Column names shared across stages. New columns are appended at the end of
// each stage's output, never inserted or removed.
pub const COL_STREET: &str = "Street";
pub const COL_CITY: &str = "City";
pub const COL_STATE: &str = "State";
pub const COL_ZIP: &str = "ZIP Code";
pub const COL_COORDINATES: &str = "Coordinates";
pub const COL_DRIVE_TIME: &str = "Drive Time (mins)";
pub const COL_DISTANCE: &str = "Distance (miles)";
pub const COL_FLOOD_ZONE: &str = "Flood Zone";

// Sentinel values stored in place of real data when a lookup fails. They are
// ordinary field values downstream, but a cached result containing one is
// never reused, so the next run retries the lookup.
pub const GEOCODING_FAILED: &str = "Geocoding failed";
pub const ROUTING_FAILED: &str = "Routing failed";
pub const INVALID_COORDINATES: &str = "Invalid coordinates";
pub const MISSING_COORDINATES: &str = "Missing coordinates";
pub const NOT_IN_FLOOD_ZONE: &str = "Not in mapped flood zone";

const ERROR_PREFIX: &str = "Error: ";

pub fn is_failure_sentinel(value: &str) -> bool {
    value == GEOCODING_FAILED
        || value == ROUTING_FAILED
        || value == INVALID_COORDINATES
        || value == MISSING_COORDINATES
        || value.starts_with(ERROR_PREFIX)
}

/// One listing row: an ordered field-name to value mapping. Field order is
/// the column order of the CSV it was read from, plus any appended fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, String)>,
}

impl Record {
    pub fn new() -> Record {
        Record::default()
    }

    /// Short rows are padded with empty values to the header's width; extra
    /// cells beyond the header are dropped.
    pub fn from_row(header: &[String], row: &[String]) -> Record {
        let fields = header
            .iter()
            .cloned()
            .zip(row.iter().cloned().chain(std::iter::repeat(String::new())))
            .collect();
        Record { fields }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Overwrites an existing field or appends a new one at the end.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| n == name) {
            Some((_, v)) => *v = value,
            None => self.fields.push((name.to_string(), value)),
        }
    }

    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Canonical cache key for an address record: `"Street, City, State ZIP"`,
/// components trimmed. Doubles as the geocoder query string, so casing is
/// preserved. `None` when any identity column is absent.
pub fn address_key(record: &Record) -> Option<String> {
    let street = record.get(COL_STREET)?.trim();
    let city = record.get(COL_CITY)?.trim();
    let state = record.get(COL_STATE)?.trim();
    let zip = record.get(COL_ZIP)?.trim();
    Some(format!("{street}, {city}, {state} {zip}"))
}

#[derive(Debug, thiserror::Error)]
pub enum CoordinateError {
    #[error("Empty or comma-less coordinate string: '{0}'")]
    Missing(String),
    #[error("Coordinate string is not a numeric pair: '{0}'")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl FromStr for Coordinates {
    type Err = CoordinateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((lat, lon)) = s.split_once(',') else {
            return Err(CoordinateError::Missing(s.to_string()));
        };
        match (lat.trim().parse::<f64>(), lon.trim().parse::<f64>()) {
            (Ok(lat), Ok(lon)) => Ok(Coordinates { lat, lon }),
            _ => Err(CoordinateError::Invalid(s.to_string())),
        }
    }
}

impl Display for Coordinates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}, {}", self.lat, self.lon)
    }
}

/// The derived fields one enrichment stage appends to a record, or sentinel
/// markers when the lookup failed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnrichmentResult {
    values: Vec<(String, String)>,
}

impl EnrichmentResult {
    pub fn new() -> EnrichmentResult {
        EnrichmentResult::default()
    }

    pub fn push(&mut self, field: &str, value: impl Into<String>) {
        self.values.push((field.to_string(), value.into()));
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(f, _)| f == field)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(f, v)| (f.as_str(), v.as_str()))
    }

    /// A cached result may replace a fresh lookup only if every field holds
    /// real data. Empty fields and failure sentinels force a re-query.
    pub fn is_reusable(&self) -> bool {
        !self.values.is_empty()
            && self
                .values
                .iter()
                .all(|(_, v)| !v.is_empty() && !is_failure_sentinel(v))
    }

    pub fn has_failure(&self) -> bool {
        self.values.iter().any(|(_, v)| is_failure_sentinel(v))
    }

    pub fn apply_to(&self, record: &mut Record) {
        for (field, value) in self.iter() {
            record.set(field, value);
        }
    }
}
