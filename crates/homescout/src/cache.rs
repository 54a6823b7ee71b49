//! Resumable result cache: a previous run's output file reinterpreted as a
//! lookup table, so successful network calls are never repeated.

use std::collections::HashMap;
use std::path::Path;

use crate::csv;
use crate::types::{EnrichmentResult, Record};

#[derive(Debug, Default)]
pub struct ResultCache {
    entries: HashMap<String, EnrichmentResult>,
}

impl ResultCache {
    /// Rebuilds the cache from a prior run's output file. A missing or
    /// malformed file yields an empty cache, never an error: the stage then
    /// simply runs from scratch.
    ///
    /// `key_of` must match the stage's own key derivation, and `fields` its
    /// derived columns; rows whose key cannot be derived are skipped.
    pub fn load(
        path: &Path,
        key_of: impl Fn(&Record) -> Option<String>,
        fields: &[&str],
    ) -> ResultCache {
        let (_, records) = match csv::read_records(path) {
            Ok(parsed) => parsed,
            Err(e) => {
                log::debug!("No resumable results at {}: {}", path.display(), e);
                return ResultCache::default();
            }
        };

        let mut entries = HashMap::new();
        for record in records {
            let Some(key) = key_of(&record) else {
                continue;
            };
            let mut result = EnrichmentResult::new();
            for field in fields {
                result.push(field, record.get(field).unwrap_or_default());
            }
            entries.insert(key, result);
        }

        log::info!(
            "Loaded {} prior results from {}",
            entries.len(),
            path.display()
        );
        ResultCache { entries }
    }

    pub fn get(&self, key: &str) -> Option<&EnrichmentResult> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{address_key, COL_DISTANCE, COL_DRIVE_TIME};
    use std::fs;
    use std::path::PathBuf;

    const FIELDS: &[&str] = &[COL_DRIVE_TIME, COL_DISTANCE];

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("homescout_cache_{}_{}", name, std::process::id()))
    }

    #[test]
    fn test_missing_file_gives_empty_cache() {
        let cache = ResultCache::load(&temp_path("missing"), address_key, FIELDS);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_malformed_file_gives_empty_cache() {
        let path = temp_path("malformed");
        fs::write(&path, "").unwrap();
        let cache = ResultCache::load(&path, address_key, FIELDS);
        assert!(cache.is_empty());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_prior_output_becomes_lookup_table() {
        let path = temp_path("prior_output");
        fs::write(
            &path,
            "Street,City,State,ZIP Code,Drive Time (mins),Distance (miles)\n\
             123 Oak St,Metairie,LA,70001,25.0,10.0\n\
             9 Elm Ave,Kenner,LA,70062,Routing failed,Routing failed\n",
        )
        .unwrap();

        let cache = ResultCache::load(&path, address_key, FIELDS);
        assert_eq!(cache.len(), 2);

        let good = cache.get("123 Oak St, Metairie, LA 70001").unwrap();
        assert!(good.is_reusable());
        assert_eq!(good.get(COL_DRIVE_TIME), Some("25.0"));

        // A stale failure is present but must not be reused
        let failed = cache.get("9 Elm Ave, Kenner, LA 70062").unwrap();
        assert!(!failed.is_reusable());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_rows_missing_derived_columns_are_not_reusable() {
        let path = temp_path("no_derived");
        fs::write(
            &path,
            "Street,City,State,ZIP Code\n123 Oak St,Metairie,LA,70001\n",
        )
        .unwrap();

        let cache = ResultCache::load(&path, address_key, FIELDS);
        let entry = cache.get("123 Oak St, Metairie, LA 70001").unwrap();
        assert!(!entry.is_reusable());
        let _ = fs::remove_file(&path);
    }
}
