//! Event timestamp parsing.
//!
//! Formats are tried in order and the first success wins:
//! 1. ISO-8601 with fractional seconds (`2024-01-01T00:00:00.123`)
//! 2. ISO-8601 without fractional seconds (`2024-01-01T00:00:00`)
//! 3. UNIX epoch seconds, as a JSON number or a numeric string
//! 4. RFC 3339 with an explicit offset, converted to UTC
//!
//! Naive timestamps are taken as UTC. A space may stand in for the `T`.

use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::format_description::FormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

const ISO_FRACTIONAL: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]");

const ISO_SECONDS: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");

/// Canonical output form. Nine subsecond digits so that formatting and
/// re-parsing is lossless.
const CANONICAL: &[FormatItem<'static>] = format_description!(
    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:9]"
);

/// Parse a raw `event_time` value. `None` means the record must be dropped.
pub fn parse_event_time(value: &Value) -> Option<OffsetDateTime> {
    match value {
        Value::String(s) => parse_str(s.trim()),
        Value::Number(n) => match n.as_i64() {
            Some(secs) => OffsetDateTime::from_unix_timestamp(secs).ok(),
            None => n.as_f64().and_then(from_epoch_seconds),
        },
        _ => None,
    }
}

fn parse_str(input: &str) -> Option<OffsetDateTime> {
    if input.is_empty() {
        return None;
    }

    let iso = with_t_separator(input);
    if let Ok(dt) = PrimitiveDateTime::parse(&iso, ISO_FRACTIONAL) {
        return Some(dt.assume_utc());
    }
    if let Ok(dt) = PrimitiveDateTime::parse(&iso, ISO_SECONDS) {
        return Some(dt.assume_utc());
    }
    if let Ok(secs) = input.parse::<i64>() {
        return OffsetDateTime::from_unix_timestamp(secs).ok();
    }
    if let Ok(secs) = input.parse::<f64>() {
        return from_epoch_seconds(secs);
    }
    OffsetDateTime::parse(&iso, &Rfc3339)
        .ok()
        .map(|dt| dt.to_offset(UtcOffset::UTC))
}

/// `2024-01-01 00:00:00` -> `2024-01-01T00:00:00`.
fn with_t_separator(input: &str) -> String {
    let mut owned = input.to_string();
    if owned.len() > 10 && owned.as_bytes()[10] == b' ' {
        owned.replace_range(10..11, "T");
    }
    owned
}

fn from_epoch_seconds(secs: f64) -> Option<OffsetDateTime> {
    if !secs.is_finite() {
        return None;
    }
    let nanos = (secs * 1e9).round();
    if nanos.abs() > i128::MAX as f64 {
        return None;
    }
    OffsetDateTime::from_unix_timestamp_nanos(nanos as i128).ok()
}

/// Format a timestamp in the canonical ISO-8601 form accepted by
/// [`parse_event_time`].
pub fn format_canonical(at: OffsetDateTime) -> String {
    let at = at.to_offset(UtcOffset::UTC);
    at.format(CANONICAL)
        .unwrap_or_else(|_| at.unix_timestamp().to_string())
}
