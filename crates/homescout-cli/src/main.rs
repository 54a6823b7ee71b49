use std::path::PathBuf;
use std::process;
use std::str::FromStr;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use log::LevelFilter;

use homescout::filter::{run_filter_stage, FilterConfig};
use homescout::pipeline::{run_enrichment_stage, DriveTimeEnricher, FloodZoneEnricher, StageConfig};
use homescout::scraper::{run_scrape_stage, ListingScraper, DEFAULT_SEARCH_URL};
use homescout::{GeocodeProvider, LookupClient, DEFAULT_DESTINATION};

#[derive(Parser)]
#[command(name = "homescout")]
#[command(about = "Scrape, enrich and filter real-estate listings", long_about = None)]
struct Cli {
    #[arg(
        short = 'l',
        long = "log-level",
        value_enum,
        default_value = "info",
        global = true,
        help = "Set the logging level"
    )]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape the listing search pages into the raw listings CSV
    Scrape {
        #[arg(long, default_value = DEFAULT_SEARCH_URL, help = "Search results URL to page through")]
        search_url: String,

        #[arg(short, long, default_value = "1_properties.csv")]
        output: PathBuf,
    },
    /// Append coordinates, drive time and distance to each listing
    DriveTime {
        #[arg(short, long, default_value = "1_properties.csv")]
        input: PathBuf,

        #[arg(short, long, default_value = "2_properties_w_drive.csv")]
        output: PathBuf,

        #[arg(
            long,
            default_value = DEFAULT_DESTINATION,
            help = "Reference point every drive time is measured to"
        )]
        destination: String,

        #[arg(
            long,
            default_value = "arcgis",
            value_parser = parse_provider,
            help = "Geocoding provider: arcgis or nominatim"
        )]
        provider: GeocodeProvider,

        #[arg(
            long,
            default_value_t = 1000,
            help = "Delay in milliseconds after each record that hit the network"
        )]
        delay_ms: u64,
    },
    /// Append the FEMA flood zone for each listing's coordinates
    FloodZone {
        #[arg(short, long, default_value = "2_properties_w_drive.csv")]
        input: PathBuf,

        #[arg(short, long, default_value = "3_properties_w_flood.csv")]
        output: PathBuf,

        #[arg(
            long,
            default_value_t = 200,
            help = "Delay in milliseconds after each record that hit the network"
        )]
        delay_ms: u64,
    },
    /// Drop listings in high-risk flood zones or beyond the drive-time limit
    Filter {
        #[arg(short, long, default_value = "3_properties_w_flood.csv")]
        input: PathBuf,

        #[arg(short, long, default_value = "4_filtered_properties.csv")]
        output: PathBuf,

        #[arg(long, default_value_t = 25.0, help = "Maximum drive time in minutes")]
        max_drive_time: f64,

        #[arg(
            long = "exclude-zone-prefix",
            default_values_t = vec!["AE".to_string()],
            help = "Flood-zone prefixes to exclude (repeatable)"
        )]
        exclude_zone_prefixes: Vec<String>,
    },
}

fn parse_provider(s: &str) -> Result<GeocodeProvider, String> {
    GeocodeProvider::from_str(s).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level.clone().into())
        .init();

    match cli.command {
        Commands::Scrape { search_url, output } => {
            let scraper = ListingScraper::new(search_url).unwrap_or_else(|e| {
                log::error!("Error creating scraper: {}", e);
                process::exit(1);
            });

            let count = run_scrape_stage(&scraper, &output).await.unwrap_or_else(|e| {
                log::error!("Scrape failed: {}", e);
                process::exit(1);
            });
            println!("Saved {} listings to {}", count, output.display());
        }

        Commands::DriveTime {
            input,
            output,
            destination,
            provider,
            delay_ms,
        } => {
            let lookup = LookupClient::new(provider).unwrap_or_else(|e| {
                log::error!("Error creating lookup client: {}", e);
                process::exit(1);
            });

            let enricher = DriveTimeEnricher::new(lookup, &destination)
                .await
                .unwrap_or_else(|e| {
                    log::error!("{}", e);
                    process::exit(1);
                });

            let config = StageConfig {
                input,
                output,
                rate_limit: Duration::from_millis(delay_ms),
            };
            let summary = run_enrichment_stage(&config, &enricher)
                .await
                .unwrap_or_else(|e| {
                    log::error!("Drive-time stage failed: {}", e);
                    process::exit(1);
                });
            print!("{}", summary);
        }

        Commands::FloodZone {
            input,
            output,
            delay_ms,
        } => {
            let lookup = LookupClient::new(GeocodeProvider::ArcGis).unwrap_or_else(|e| {
                log::error!("Error creating lookup client: {}", e);
                process::exit(1);
            });

            let enricher = FloodZoneEnricher::new(lookup);
            let config = StageConfig {
                input,
                output,
                rate_limit: Duration::from_millis(delay_ms),
            };
            let summary = run_enrichment_stage(&config, &enricher)
                .await
                .unwrap_or_else(|e| {
                    log::error!("Flood-zone stage failed: {}", e);
                    process::exit(1);
                });
            print!("{}", summary);
        }

        Commands::Filter {
            input,
            output,
            max_drive_time,
            exclude_zone_prefixes,
        } => {
            let config = FilterConfig {
                high_risk_zone_prefixes: exclude_zone_prefixes,
                max_drive_time_minutes: max_drive_time,
            };

            let summary = run_filter_stage(&input, &output, &config).unwrap_or_else(|e| {
                log::error!("Filter stage failed: {}", e);
                process::exit(1);
            });
            print!("{}", summary);
        }
    }
}
