//! Raw JSON records to a canonical [`Dataset`].

use std::collections::BTreeSet;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::timestamp::parse_event_time;
use super::types::{Column, Dataset, DepthRecord};
use crate::metrics;

/// Normalize raw depth records.
///
/// - A record whose `event_time` cannot be parsed is dropped; nothing else
///   drops a record.
/// - `best_bid`, `best_ask`, `min_bid`, `max_ask` and every field whose
///   name contains `depth` are coerced to numbers; a failed coercion is
///   stored as `None`.
/// - `symbol` falls back to `fallback_symbol` when absent.
/// - Output is sorted by `event_time`, ties kept in arrival order.
pub fn normalize(fallback_symbol: &str, rows: &[Value]) -> Dataset {
    let mut columns = BTreeSet::new();
    let mut records = Vec::with_capacity(rows.len());
    let mut dropped = 0usize;

    for row in rows {
        let Some(object) = row.as_object() else {
            dropped += 1;
            continue;
        };
        match normalize_record(fallback_symbol, object, &mut columns) {
            Some(record) => records.push(record),
            None => dropped += 1,
        }
    }

    if dropped > 0 {
        warn!(
            dropped,
            kept = records.len(),
            "Dropped depth records with unparsable timestamps"
        );
        metrics::inc_records_dropped(dropped as u64);
    }
    debug!(records = records.len(), "Normalized depth records");

    Dataset::new(records, columns)
}

fn normalize_record(
    fallback_symbol: &str,
    object: &Map<String, Value>,
    columns: &mut BTreeSet<Column>,
) -> Option<DepthRecord> {
    let event_time = parse_event_time(object.get("event_time")?)?;

    let symbol = object
        .get("symbol")
        .and_then(Value::as_str)
        .unwrap_or(fallback_symbol);
    let mut record = DepthRecord::new(symbol, event_time);
    columns.insert(Column::EventTime);

    for (name, value) in object {
        match Column::from_name(name) {
            Some(Column::EventTime) => {}
            Some(column) => {
                record.set(column, coerce_number(value));
                columns.insert(column);
            }
            None if name.contains("depth") => {
                record.extra_depth.insert(name.clone(), coerce_number(value));
            }
            None => {}
        }
    }

    Some(record)
}

/// Lenient numeric coercion: numbers and numeric strings parse, anything
/// else (including NaN and infinities) is `None`.
pub fn coerce_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    number.is_finite().then_some(number)
}
