pub mod cache;
pub mod csv;
pub mod filter;
pub mod lookup;
pub mod parser;
pub mod pipeline;
pub mod scraper;
pub mod types;

pub use lookup::{GeocodeProvider, LookupClient};
pub use pipeline::{
    run_enrichment_stage, DriveTimeEnricher, Enrich, FloodZoneEnricher, StageConfig,
};
pub use scraper::ListingScraper;

pub const DEFAULT_DESTINATION: &str = "781 Lasalle St, New Orleans, LA 70112";
