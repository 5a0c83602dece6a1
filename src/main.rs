//! Lockweather - a four-day weather timeline for the terminal
//!
//! Plays the part of the widget host: it asks the scheduler for an entry,
//! prints it, and (with `--watch`) sleeps until the scheduled next refresh.

use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use lockweather::cache::{FileStore, KeyValueStore, MemoryStore, PersistedCache};
use lockweather::cli::{AppConfig, Cli};
use lockweather::data::{
    Authorization, IpLocationBackend, LocationSource, NominatimGeocoder, OpenWeatherClient,
};
use lockweather::display::render_timeline;
use lockweather::timeline::{Timeline, TimelineScheduler};

/// Logs go to stderr so stdout carries only entries
fn init_tracing(verbose: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(AppConfig::log_filter(verbose)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn open_store(config: &AppConfig) -> Arc<dyn KeyValueStore> {
    let store = match &config.cache_dir {
        Some(dir) => Some(FileStore::with_dir(dir.clone())),
        None => FileStore::new(),
    };
    match store {
        Some(store) => {
            info!(dir = %store.dir().display(), "using cache directory");
            Arc::new(store)
        }
        None => {
            warn!("no cache directory available, nothing will persist across runs");
            Arc::new(MemoryStore::new())
        }
    }
}

fn build_scheduler(config: &AppConfig) -> TimelineScheduler {
    let mut forecast = OpenWeatherClient::new();
    if let Some(url) = &config.forecast_url {
        forecast = forecast.with_base_url(url.clone());
    }

    let mut geocoder = NominatimGeocoder::new();
    if let Some(url) = &config.geocode_url {
        geocoder = geocoder.with_base_url(url.clone());
    }

    let cache = PersistedCache::new(open_store(config));
    let scheduler = TimelineScheduler::new(
        config.timeline.clone(),
        Arc::new(forecast),
        Arc::new(geocoder),
        cache,
    );

    let mut backend = IpLocationBackend::new();
    if let Some(url) = &config.location_url {
        backend = backend.with_base_url(url.clone());
    }
    let authorization = if config.device_location {
        Authorization::Authorized
    } else {
        Authorization::Denied
    };
    scheduler.with_location_source(Arc::new(LocationSource::new(backend, authorization)))
}

fn print_timeline(timeline: &Timeline, json: bool) -> Result<(), serde_json::Error> {
    if json {
        println!("{}", serde_json::to_string(timeline)?);
    } else {
        println!("{}\n", render_timeline(timeline));
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = AppConfig::from_cli(&cli)?;
    let scheduler = build_scheduler(&config);

    if !config.watch {
        let timeline = scheduler.refresh().await;
        print_timeline(&timeline, config.json)?;
        scheduler.wait_for_enrichment().await;
        return Ok(());
    }

    loop {
        let timeline = scheduler.refresh().await;
        print_timeline(&timeline, config.json)?;

        let wait = (timeline.next_refresh - chrono::Utc::now())
            .to_std()
            .unwrap_or_default();
        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, stopping");
                break;
            }
        }
    }

    scheduler.wait_for_enrichment().await;
    Ok(())
}
