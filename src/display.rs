//! Plain-text rendering of a timeline for the terminal

use chrono::FixedOffset;

use crate::data::{DailyForecast, DEFAULT_PLACE};
use crate::timeline::{EntryStatus, Timeline};

/// Width of one day column, excluding separators
const COLUMN_WIDTH: usize = 20;

/// Renders the header, one column per day and the current-conditions line
pub fn render_timeline(timeline: &Timeline) -> String {
    let entry = &timeline.entry;
    let forecast = &entry.forecast;
    let offset = forecast.offset();
    let mut out = String::new();

    let place = entry.place.as_deref().unwrap_or(DEFAULT_PLACE);
    out.push_str(&format!("{}  ({})\n", place, entry.coordinate));

    let rows: [fn(&DailyForecast, FixedOffset) -> String; 5] = [
        |d, offset| d.weekday(offset),
        |d, _| format!("H: {:.0}°", d.max),
        |d, _| format!("L: {:.0}°", d.min),
        |d, _| d.symbol().to_string(),
        |d, _| format!("{:.0}%", d.precipitation * 100.0),
    ];
    for row in rows {
        out.push('|');
        for day in &forecast.daily {
            out.push_str(&format!(" {:<width$}|", row(day, offset), width = COLUMN_WIDTH - 1));
        }
        out.push('\n');
    }

    out.push_str(&format!(
        "Current: {:.0}° & {}  [{}]\n",
        forecast.current.temperature,
        forecast.current.description,
        status_label(entry.status)
    ));
    out.push_str(&format!(
        "Next refresh: {}",
        timeline.next_refresh.format("%Y-%m-%d %H:%M UTC")
    ));
    out
}

fn status_label(status: EntryStatus) -> &'static str {
    match status {
        EntryStatus::Live => "live",
        EntryStatus::Cached => "cached",
        EntryStatus::Outdated => "outdated",
        EntryStatus::UpdateFailed => "update failed",
        EntryStatus::Missing => "missing",
    }
}
