//! Command-line interface parsing
//!
//! This module handles parsing of CLI arguments using clap and turns them
//! into the timeline configuration plus the host settings (cache location,
//! service URLs, output mode).

use std::path::PathBuf;

use chrono::Duration;
use clap::Parser;
use thiserror::Error;

use crate::data::{Coordinate, TemperatureUnit};
use crate::timeline::{TimelineConfig, DEFAULT_REFRESH_MINUTES, MAX_REFRESH_MINUTES};

/// Error types for CLI argument handling
#[derive(Debug, Error)]
pub enum CliError {
    /// The refresh interval must be between one minute and one week
    #[error("Invalid refresh interval: {0} minutes. Use a value from 1 to {max}", max = MAX_REFRESH_MINUTES)]
    InvalidRefreshInterval(i64),
}

/// Lock-screen weather timeline: one entry per refresh, with cached fallback
#[derive(Parser, Debug)]
#[command(name = "lockweather")]
#[command(about = "Four-day weather timeline with stale-cache fallback")]
#[command(version)]
pub struct Cli {
    /// OpenWeatherMap API key
    #[arg(long, env = "OPENWEATHER_API_KEY", default_value = "", hide_env_values = true)]
    pub api_key: String,

    /// Temperature units requested from the forecast service
    #[arg(long, value_enum, default_value_t = TemperatureUnit::Imperial)]
    pub units: TemperatureUnit,

    /// Custom latitude; replaces device location (requires --longitude)
    #[arg(long, requires = "longitude", allow_hyphen_values = true)]
    pub latitude: Option<f64>,

    /// Custom longitude; replaces device location (requires --latitude)
    #[arg(long, requires = "latitude", allow_hyphen_values = true)]
    pub longitude: Option<f64>,

    /// Do not look up the device location
    #[arg(long)]
    pub no_device_location: bool,

    /// Directory for persisted values (defaults to the XDG cache dir)
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Forecast API root
    #[arg(long, value_name = "URL")]
    pub forecast_url: Option<String>,

    /// Reverse geocoding API root
    #[arg(long, value_name = "URL")]
    pub geocode_url: Option<String>,

    /// IP geolocation API root
    #[arg(long, value_name = "URL")]
    pub location_url: Option<String>,

    /// Minutes between refresh cycles
    #[arg(long, default_value_t = DEFAULT_REFRESH_MINUTES)]
    pub refresh_minutes: i64,

    /// Keep running and refresh on schedule
    #[arg(long)]
    pub watch: bool,

    /// Print entries as JSON instead of text
    #[arg(long)]
    pub json: bool,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Everything the binary needs to assemble the pipeline
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub timeline: TimelineConfig,
    pub device_location: bool,
    pub cache_dir: Option<PathBuf>,
    pub forecast_url: Option<String>,
    pub geocode_url: Option<String>,
    pub location_url: Option<String>,
    pub watch: bool,
    pub json: bool,
}

impl AppConfig {
    /// Creates an AppConfig from parsed CLI arguments.
    ///
    /// Custom coordinates are passed through unvalidated; out-of-range
    /// values make the scheduler use its default coordinate.
    pub fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        let refresh_interval = Some(cli.refresh_minutes)
            .filter(|minutes| (1..=MAX_REFRESH_MINUTES).contains(minutes))
            .and_then(Duration::try_minutes)
            .ok_or(CliError::InvalidRefreshInterval(cli.refresh_minutes))?;

        let custom_location = match (cli.latitude, cli.longitude) {
            (Some(latitude), Some(longitude)) => Some(Coordinate {
                latitude,
                longitude,
            }),
            _ => None,
        };

        Ok(Self {
            timeline: TimelineConfig {
                unit: cli.units,
                api_key: cli.api_key.clone(),
                custom_location,
                refresh_interval,
            },
            device_location: !cli.no_device_location,
            cache_dir: cli.cache_dir.clone(),
            forecast_url: cli.forecast_url.clone(),
            geocode_url: cli.geocode_url.clone(),
            location_url: cli.location_url.clone(),
            watch: cli.watch,
            json: cli.json,
        })
    }

    /// Default log filter for the given verbosity
    pub fn log_filter(verbose: u8) -> &'static str {
        match verbose {
            0 => "lockweather=warn",
            1 => "lockweather=info",
            _ => "lockweather=debug",
        }
    }
}
