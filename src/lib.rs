//! Lockweather library
//!
//! The weather-widget refresh pipeline: location acquisition, reverse
//! geocoding, forecast fetch and timeline scheduling with a staleness-aware
//! cache fallback.

pub mod cache;
pub mod cli;
pub mod data;
pub mod display;
pub mod timeline;
