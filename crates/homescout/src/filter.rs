//! Final stage: drops whole records by flood-zone prefix and drive-time
//! threshold. Columns pass through unchanged.

use std::fmt::Display;
use std::path::Path;

use crate::csv::{self, CsvError, CsvWriter};
use crate::types::{self, Record, COL_DRIVE_TIME, COL_FLOOD_ZONE, COL_STREET};

#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    #[error("CSV error: {0}")]
    Csv(#[from] CsvError),
    #[error("Record '{record}' is missing the '{column}' column")]
    MissingColumn {
        record: String,
        column: &'static str,
    },
    #[error("Record '{record}' has unparseable drive time '{value}'")]
    InvalidDriveTime { record: String, value: String },
}

#[derive(Debug, Clone)]
pub struct FilterConfig {
    /// Flood-zone prefixes that exclude a record outright, e.g. "AE".
    pub high_risk_zone_prefixes: Vec<String>,
    pub max_drive_time_minutes: f64,
}

impl Default for FilterConfig {
    fn default() -> FilterConfig {
        FilterConfig {
            high_risk_zone_prefixes: vec!["AE".to_string()],
            max_drive_time_minutes: 25.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Keep,
    ExcludedByZone,
    ExcludedByDriveTime,
}

impl FilterConfig {
    /// The zone check runs first, so a high-risk record is excluded even when
    /// its drive-time field is unusable. A non-numeric drive time on a record
    /// that reaches the second check is a data-quality error and propagates.
    pub fn verdict(&self, record: &Record) -> Result<Verdict, FilterError> {
        let zone = record.get(COL_FLOOD_ZONE).ok_or_else(|| {
            FilterError::MissingColumn {
                record: record_identity(record),
                column: COL_FLOOD_ZONE,
            }
        })?;
        if self
            .high_risk_zone_prefixes
            .iter()
            .any(|prefix| zone.starts_with(prefix.as_str()))
        {
            return Ok(Verdict::ExcludedByZone);
        }

        let raw = record.get(COL_DRIVE_TIME).ok_or_else(|| {
            FilterError::MissingColumn {
                record: record_identity(record),
                column: COL_DRIVE_TIME,
            }
        })?;
        let minutes: f64 =
            raw.trim()
                .parse()
                .map_err(|_| FilterError::InvalidDriveTime {
                    record: record_identity(record),
                    value: raw.to_string(),
                })?;

        if minutes > self.max_drive_time_minutes {
            Ok(Verdict::ExcludedByDriveTime)
        } else {
            Ok(Verdict::Keep)
        }
    }

    pub fn keep(&self, record: &Record) -> Result<bool, FilterError> {
        Ok(self.verdict(record)? == Verdict::Keep)
    }
}

fn record_identity(record: &Record) -> String {
    types::address_key(record)
        .or_else(|| record.get(COL_STREET).map(str::to_string))
        .unwrap_or_else(|| "<unknown>".to_string())
}

#[derive(Debug, Default, PartialEq)]
pub struct FilterSummary {
    pub kept: usize,
    pub excluded_by_zone: usize,
    pub excluded_by_drive_time: usize,
}

impl Display for FilterSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\nFilter summary:")?;
        writeln!(f, "  Kept:                   {}", self.kept)?;
        writeln!(f, "  Excluded (flood zone):  {}", self.excluded_by_zone)?;
        writeln!(f, "  Excluded (drive time):  {}", self.excluded_by_drive_time)
    }
}

pub fn run_filter_stage(
    input: &Path,
    output: &Path,
    config: &FilterConfig,
) -> Result<FilterSummary, FilterError> {
    let (header, records) = csv::read_records(input)?;
    let mut writer = CsvWriter::create(output, &header)?;

    let mut summary = FilterSummary::default();
    for record in records {
        match config.verdict(&record)? {
            Verdict::Keep => {
                writer.write_record(&record)?;
                summary.kept += 1;
            }
            Verdict::ExcludedByZone => summary.excluded_by_zone += 1,
            Verdict::ExcludedByDriveTime => summary.excluded_by_drive_time += 1,
        }
    }

    log::info!(
        "Kept {} of {} records in {}",
        summary.kept,
        summary.kept + summary.excluded_by_zone + summary.excluded_by_drive_time,
        output.display()
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn record(zone: &str, drive_time: &str) -> Record {
        let mut record = Record::new();
        record.set(COL_STREET, "123 Oak St");
        record.set(COL_FLOOD_ZONE, zone);
        record.set(COL_DRIVE_TIME, drive_time);
        record
    }

    #[test]
    fn test_high_risk_zone_excluded_regardless_of_drive_time() {
        let config = FilterConfig::default();
        let verdict = config.verdict(&record("AE (FLOODWAY)", "not-a-number"));
        assert_eq!(verdict.unwrap(), Verdict::ExcludedByZone);
    }

    #[test]
    fn test_kept_under_threshold() {
        let config = FilterConfig::default();
        assert!(config.keep(&record("X (N/A)", "24.9")).unwrap());
        assert!(config.keep(&record("Not in mapped flood zone", "25.0")).unwrap());
    }

    #[test]
    fn test_excluded_over_threshold() {
        let config = FilterConfig::default();
        let verdict = config.verdict(&record("X (N/A)", "25.1"));
        assert_eq!(verdict.unwrap(), Verdict::ExcludedByDriveTime);
    }

    #[test]
    fn test_unparseable_drive_time_is_an_error() {
        let config = FilterConfig::default();
        let err = config.verdict(&record("X (N/A)", "not-a-number")).unwrap_err();
        assert!(matches!(err, FilterError::InvalidDriveTime { .. }));
        assert!(err.to_string().contains("not-a-number"));
    }

    #[test]
    fn test_sentinel_drive_time_is_an_error_too() {
        // Enrichment failures must be investigated, not silently dropped
        let config = FilterConfig::default();
        let err = config.verdict(&record("X (N/A)", "Routing failed")).unwrap_err();
        assert!(matches!(err, FilterError::InvalidDriveTime { .. }));
    }

    #[test]
    fn test_missing_columns_are_errors() {
        let config = FilterConfig::default();
        let mut record = Record::new();
        record.set(COL_STREET, "123 Oak St");
        assert!(matches!(
            config.verdict(&record),
            Err(FilterError::MissingColumn { .. })
        ));
    }

    #[test]
    fn test_custom_prefixes_and_threshold() {
        let config = FilterConfig {
            high_risk_zone_prefixes: vec!["AE".to_string(), "VE".to_string()],
            max_drive_time_minutes: 30.0,
        };
        assert_eq!(
            config.verdict(&record("VE (N/A)", "5.0")).unwrap(),
            Verdict::ExcludedByZone
        );
        assert!(config.keep(&record("X (N/A)", "29.9")).unwrap());
    }

    #[test]
    fn test_run_filter_stage_preserves_columns() {
        let dir = std::env::temp_dir().join(format!("homescout_filter_{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let input = dir.join("input.csv");
        let output = dir.join("output.csv");
        fs::write(
            &input,
            "Street,Flood Zone,Drive Time (mins)\n\
             123 Oak St,X (N/A),24.9\n\
             9 Elm Ave,AE (FLOODWAY),5.0\n\
             4 Pine Rd,X (N/A),25.1\n",
        )
        .unwrap();

        let summary = run_filter_stage(&input, &output, &FilterConfig::default()).unwrap();
        assert_eq!(summary.kept, 1);
        assert_eq!(summary.excluded_by_zone, 1);
        assert_eq!(summary.excluded_by_drive_time, 1);

        let text = fs::read_to_string(&output).unwrap();
        assert_eq!(
            text,
            "Street,Flood Zone,Drive Time (mins)\n123 Oak St,X (N/A),24.9\n"
        );
        let _ = fs::remove_dir_all(&dir);
    }
}
