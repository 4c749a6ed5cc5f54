//! Acquisition timestamps.
//!
//! Instruments write their dates in a handful of textual conventions. Everything is
//! normalized to a naive `PrimitiveDateTime`; the filesystem fallback is read in UTC.

use std::path::Path;
use std::time::SystemTime;

use time::macros::{datetime, format_description};
use time::{Duration, OffsetDateTime, PrimitiveDateTime};

use super::constants::DOTNET_TICK_NANOS;

/// Modification time of a file, used when a format carries no usable date
pub fn file_mtime(path: &Path) -> Result<PrimitiveDateTime, std::io::Error> {
    let modified: SystemTime = std::fs::metadata(path)?.modified()?;
    let utc = OffsetDateTime::from(modified);
    Ok(PrimitiveDateTime::new(utc.date(), utc.time()))
}

/// Parse a date-time in ISO, dotted European, US slash or C `asctime` notation
pub fn parse_datetime(text: &str) -> Option<PrimitiveDateTime> {
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let text = text.as_str();
    PrimitiveDateTime::parse(
        text,
        format_description!(
            "[year]-[month padding:none]-[day padding:none] [hour padding:none]:[minute]:[second]"
        ),
    )
    .or_else(|_| {
        PrimitiveDateTime::parse(
            text,
            format_description!(
                "[year]-[month padding:none]-[day padding:none]T[hour padding:none]:[minute]:[second]"
            ),
        )
    })
    .or_else(|_| {
        PrimitiveDateTime::parse(
            text,
            format_description!(
                "[day padding:none].[month padding:none].[year] [hour padding:none]:[minute]:[second]"
            ),
        )
    })
    .or_else(|_| {
        PrimitiveDateTime::parse(
            text,
            format_description!(
                "[month padding:none]/[day padding:none]/[year] [hour padding:none]:[minute]:[second]"
            ),
        )
    })
    .or_else(|_| {
        PrimitiveDateTime::parse(
            text,
            format_description!(
                "[year]-[month padding:none]-[day padding:none] [hour padding:none]:[minute]"
            ),
        )
    })
    .or_else(|_| {
        PrimitiveDateTime::parse(
            text,
            format_description!(
                "[weekday repr:short] [month repr:short] [day padding:none] [hour padding:none]:[minute]:[second] [year]"
            ),
        )
    })
    .ok()
}

/// Join separate date and time fields before parsing
pub fn parse_date_and_time(date: &str, time: &str) -> Option<PrimitiveDateTime> {
    parse_datetime(&format!("{} {}", date.trim(), time.trim()))
}

/// Convert .NET `DateTime` ticks (100 ns since 0001-01-01) into a date-time
pub fn from_dotnet_ticks(ticks: i64) -> Option<PrimitiveDateTime> {
    if ticks < 0 {
        return None;
    }
    let per_second = 1_000_000_000 / DOTNET_TICK_NANOS;
    let offset = Duration::seconds(ticks / per_second)
        + Duration::nanoseconds((ticks % per_second) * DOTNET_TICK_NANOS);
    datetime!(0001-01-01 0:00).checked_add(offset)
}

/// Format used in logs and in the report
pub fn display(stamp: &PrimitiveDateTime) -> String {
    stamp
        .format(format_description!(
            "[year]-[month]-[day] [hour]:[minute]:[second]"
        ))
        .unwrap_or_else(|_| stamp.to_string())
}
