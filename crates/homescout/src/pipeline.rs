//! The resumable enrichment driver: one pass over the input file, reusing
//! prior results where the cache allows it and rate-limiting real lookups.

use std::fmt::Display;
use std::path::PathBuf;
use std::time::Duration;

use crate::cache::ResultCache;
use crate::csv::{self, CsvError, CsvWriter};
use crate::lookup::LookupClient;
use crate::types::{
    self, Coordinates, CoordinateError, EnrichmentResult, Record, COL_COORDINATES, COL_DISTANCE,
    COL_DRIVE_TIME, COL_FLOOD_ZONE, GEOCODING_FAILED, INVALID_COORDINATES, MISSING_COORDINATES,
    NOT_IN_FLOOD_ZONE, ROUTING_FAILED,
};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("CSV error: {0}")]
    Csv(#[from] CsvError),
    #[error("Failed to resolve destination address '{0}'")]
    DestinationUnresolved(String),
}

#[derive(Debug, Clone)]
pub struct StageConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Pause after each record that triggered a real network call. Cache hits
    /// never wait.
    pub rate_limit: Duration,
}

/// What one enrichment attempt produced. `called_network` gates both the
/// rate-limit delay and the lookup count in the summary.
#[derive(Debug)]
pub struct EnrichmentOutcome {
    pub result: EnrichmentResult,
    pub called_network: bool,
}

/// One enrichment stage: derives a cache key per record and computes the
/// derived fields for it. Lookup failures must surface as sentinel values in
/// the result, never as errors; a failed record must not stop the batch.
pub trait Enrich {
    /// Columns this stage appends to every record.
    const FIELDS: &'static [&'static str];

    fn key(&self, record: &Record) -> Option<String>;

    async fn enrich(&self, record: &Record) -> EnrichmentOutcome;
}

#[derive(Debug, Default, PartialEq)]
pub struct StageSummary {
    pub records: usize,
    pub cache_hits: usize,
    pub lookups: usize,
    pub failures: usize,
}

impl Display for StageSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\nStage summary:")?;
        writeln!(f, "  Records processed: {}", self.records)?;
        writeln!(f, "  Cache hits:        {}", self.cache_hits)?;
        writeln!(f, "  Lookups:           {}", self.lookups)?;
        writeln!(f, "  Failed lookups:    {}", self.failures)
    }
}

/// Reads the stage's input file, enriches every record and streams the
/// output. The previous output file (if any) seeds the cache before being
/// truncated, so a rerun only repeats failed or new lookups.
pub async fn run_enrichment_stage<E: Enrich>(
    config: &StageConfig,
    enricher: &E,
) -> Result<StageSummary, PipelineError> {
    // Rebuild the cache before the output file is truncated below.
    let cache = ResultCache::load(&config.output, |r| enricher.key(r), E::FIELDS);

    let (mut header, records) = csv::read_records(&config.input)?;
    for field in E::FIELDS {
        if !header.iter().any(|h| h == field) {
            header.push(field.to_string());
        }
    }
    let mut writer = CsvWriter::create(&config.output, &header)?;

    let mut summary = StageSummary::default();
    for mut record in records {
        summary.records += 1;

        let key = enricher.key(&record);
        if let Some(cached) = key.as_deref().and_then(|k| cache.get(k))
            && cached.is_reusable()
        {
            cached.apply_to(&mut record);
            writer.write_record(&record)?;
            summary.cache_hits += 1;
            continue;
        }

        let outcome = enricher.enrich(&record).await;
        if outcome.result.has_failure() {
            summary.failures += 1;
        }
        outcome.result.apply_to(&mut record);
        writer.write_record(&record)?;

        if outcome.called_network {
            summary.lookups += 1;
            if !config.rate_limit.is_zero() {
                tokio::time::sleep(config.rate_limit).await;
            }
        }
    }

    log::info!(
        "Wrote {} records to {} ({} cache hits, {} lookups)",
        summary.records,
        config.output.display(),
        summary.cache_hits,
        summary.lookups
    );
    Ok(summary)
}

/// Appends `Coordinates`, `Drive Time (mins)` and `Distance (miles)` by
/// geocoding each listing's address and routing to a fixed destination.
#[derive(Debug, Clone)]
pub struct DriveTimeEnricher {
    lookup: LookupClient,
    destination: Coordinates,
}

impl DriveTimeEnricher {
    /// Resolves the fixed destination once. Failure here aborts the stage
    /// before any record is touched, since every drive time depends on it.
    pub async fn new(
        lookup: LookupClient,
        destination: &str,
    ) -> Result<DriveTimeEnricher, PipelineError> {
        let coords = match lookup.geocode(destination).await {
            Ok(Some(coords)) => coords,
            Ok(None) => {
                return Err(PipelineError::DestinationUnresolved(destination.to_string()));
            }
            Err(e) => {
                log::error!("Destination geocode failed: {e}");
                return Err(PipelineError::DestinationUnresolved(destination.to_string()));
            }
        };
        log::info!("Destination '{destination}' resolved to {coords}");
        Ok(DriveTimeEnricher {
            lookup,
            destination: coords,
        })
    }
}

impl Enrich for DriveTimeEnricher {
    const FIELDS: &'static [&'static str] = &[COL_COORDINATES, COL_DRIVE_TIME, COL_DISTANCE];

    fn key(&self, record: &Record) -> Option<String> {
        types::address_key(record)
    }

    async fn enrich(&self, record: &Record) -> EnrichmentOutcome {
        let mut result = EnrichmentResult::new();

        let Some(origin) = self.key(record) else {
            // Identity columns are part of the input contract; treat their
            // absence like a geocoding miss rather than aborting the batch.
            log::warn!("Record is missing address columns, cannot geocode");
            for field in Self::FIELDS {
                result.push(field, GEOCODING_FAILED);
            }
            return EnrichmentOutcome {
                result,
                called_network: false,
            };
        };

        let coords = match self.lookup.geocode(&origin).await {
            Ok(Some(coords)) => Some(coords),
            Ok(None) => {
                log::warn!("Geocoding returned no candidates for '{origin}'");
                None
            }
            Err(e) => {
                log::warn!("Geocoding failed for '{origin}': {e}");
                None
            }
        };
        let Some(coords) = coords else {
            for field in Self::FIELDS {
                result.push(field, GEOCODING_FAILED);
            }
            return EnrichmentOutcome {
                result,
                called_network: true,
            };
        };

        result.push(COL_COORDINATES, coords.to_string());
        match self.lookup.route(coords, self.destination).await {
            Ok(Some(route)) => {
                result.push(COL_DRIVE_TIME, format!("{:.1}", route.duration_mins));
                result.push(COL_DISTANCE, format!("{:.1}", route.distance_miles));
            }
            Ok(None) => {
                log::warn!("No route found for '{origin}'");
                result.push(COL_DRIVE_TIME, ROUTING_FAILED);
                result.push(COL_DISTANCE, ROUTING_FAILED);
            }
            Err(e) => {
                log::warn!("Routing failed for '{origin}': {e}");
                result.push(COL_DRIVE_TIME, ROUTING_FAILED);
                result.push(COL_DISTANCE, ROUTING_FAILED);
            }
        }
        EnrichmentOutcome {
            result,
            called_network: true,
        }
    }
}

/// Appends `Flood Zone` by querying the FEMA flood-hazard layer with each
/// record's already-geocoded coordinates.
#[derive(Debug, Clone)]
pub struct FloodZoneEnricher {
    lookup: LookupClient,
}

impl FloodZoneEnricher {
    pub fn new(lookup: LookupClient) -> FloodZoneEnricher {
        FloodZoneEnricher { lookup }
    }
}

impl Enrich for FloodZoneEnricher {
    const FIELDS: &'static [&'static str] = &[COL_FLOOD_ZONE];

    // The coordinate string acts as its own key.
    fn key(&self, record: &Record) -> Option<String> {
        record.get(COL_COORDINATES).map(str::to_string)
    }

    async fn enrich(&self, record: &Record) -> EnrichmentOutcome {
        let mut result = EnrichmentResult::new();

        let raw = record.get(COL_COORDINATES).unwrap_or_default();
        let point = match raw.trim().parse::<Coordinates>() {
            Ok(point) => point,
            Err(CoordinateError::Missing(_)) => {
                result.push(COL_FLOOD_ZONE, MISSING_COORDINATES);
                return EnrichmentOutcome {
                    result,
                    called_network: false,
                };
            }
            Err(CoordinateError::Invalid(_)) => {
                log::warn!("Unparseable coordinates '{raw}'");
                result.push(COL_FLOOD_ZONE, INVALID_COORDINATES);
                return EnrichmentOutcome {
                    result,
                    called_network: false,
                };
            }
        };

        let zone = match self.lookup.flood_zone(point).await {
            Ok(Some(zone)) => zone,
            Ok(None) => NOT_IN_FLOOD_ZONE.to_string(),
            Err(e) => {
                // Stored as data: downstream filtering treats it like any
                // other zone value, and the cache refuses to reuse it.
                log::warn!("Flood zone query failed for {point}: {e}");
                format!("Error: {e}")
            }
        };
        result.push(COL_FLOOD_ZONE, zone);
        EnrichmentOutcome {
            result,
            called_network: true,
        }
    }
}
