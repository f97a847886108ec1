//! Dataset types: depth bands, columns, records.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};

use serde_json::{Map, Number, Value};
use strum::{EnumIter, IntoEnumIterator};
use time::OffsetDateTime;

use super::timestamp::format_canonical;
use crate::error::RenderError;

/// Percentage distance from the best price over which depth is summed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, EnumIter)]
pub enum Band {
    /// 1% band.
    One,
    /// 3% band.
    Three,
    /// 5% band.
    Five,
    /// 8% band.
    Eight,
}

impl Band {
    /// Band width in percent.
    pub fn pct(self) -> u8 {
        match self {
            Band::One => 1,
            Band::Three => 3,
            Band::Five => 5,
            Band::Eight => 8,
        }
    }

    fn index(self) -> usize {
        self as usize
    }

    /// Bands in ascending order.
    pub fn all() -> impl Iterator<Item = Band> {
        Band::iter()
    }
}

impl TryFrom<u8> for Band {
    type Error = RenderError;

    fn try_from(pct: u8) -> Result<Self, Self::Error> {
        Band::iter()
            .find(|band| band.pct() == pct)
            .ok_or(RenderError::UnsupportedBand(pct))
    }
}

impl Display for Band {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.pct())
    }
}

/// Canonical dataset column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Column {
    /// `event_time`.
    EventTime,
    /// `best_bid`.
    BestBid,
    /// `best_ask`.
    BestAsk,
    /// `depth_{pct}pct_bid`.
    BidDepth(Band),
    /// `depth_{pct}pct_ask`.
    AskDepth(Band),
    /// `min_bid`.
    MinBid,
    /// `max_ask`.
    MaxAsk,
}

impl Column {
    /// Wire name of the column.
    pub fn name(self) -> String {
        match self {
            Column::EventTime => "event_time".to_string(),
            Column::BestBid => "best_bid".to_string(),
            Column::BestAsk => "best_ask".to_string(),
            Column::BidDepth(band) => format!("depth_{}pct_bid", band.pct()),
            Column::AskDepth(band) => format!("depth_{}pct_ask", band.pct()),
            Column::MinBid => "min_bid".to_string(),
            Column::MaxAsk => "max_ask".to_string(),
        }
    }

    /// Resolve a wire name.
    pub fn from_name(name: &str) -> Option<Column> {
        match name {
            "event_time" => return Some(Column::EventTime),
            "best_bid" => return Some(Column::BestBid),
            "best_ask" => return Some(Column::BestAsk),
            "min_bid" => return Some(Column::MinBid),
            "max_ask" => return Some(Column::MaxAsk),
            _ => {}
        }
        Band::all().find_map(|band| {
            if name == Column::BidDepth(band).name() {
                Some(Column::BidDepth(band))
            } else if name == Column::AskDepth(band).name() {
                Some(Column::AskDepth(band))
            } else {
                None
            }
        })
    }
}

impl Display for Column {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name())
    }
}

/// One normalized depth snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthRecord {
    /// Trading symbol.
    pub symbol: String,
    /// Snapshot time, UTC.
    pub event_time: OffsetDateTime,
    /// Best bid price.
    pub best_bid: Option<f64>,
    /// Best ask price.
    pub best_ask: Option<f64>,
    /// Bid depth per band, indexed in [`Band`] order.
    pub bid_depth: [Option<f64>; 4],
    /// Ask depth per band, indexed in [`Band`] order.
    pub ask_depth: [Option<f64>; 4],
    /// Lowest bid inside the widest band.
    pub min_bid: Option<f64>,
    /// Highest ask inside the widest band.
    pub max_ask: Option<f64>,
    /// Other `depth*` fields the upstream sent, coerced to numbers.
    pub extra_depth: BTreeMap<String, Option<f64>>,
}

impl DepthRecord {
    /// Empty record at `event_time`.
    pub fn new(symbol: impl Into<String>, event_time: OffsetDateTime) -> Self {
        Self {
            symbol: symbol.into(),
            event_time,
            best_bid: None,
            best_ask: None,
            bid_depth: [None; 4],
            ask_depth: [None; 4],
            min_bid: None,
            max_ask: None,
            extra_depth: BTreeMap::new(),
        }
    }

    /// Bid depth for `band`.
    pub fn bid(&self, band: Band) -> Option<f64> {
        self.bid_depth[band.index()]
    }

    /// Ask depth for `band`.
    pub fn ask(&self, band: Band) -> Option<f64> {
        self.ask_depth[band.index()]
    }

    /// Numeric value of a column. `EventTime` yields UNIX seconds.
    pub fn value(&self, column: Column) -> Option<f64> {
        match column {
            Column::EventTime => Some(self.event_time.unix_timestamp_nanos() as f64 / 1e9),
            Column::BestBid => self.best_bid,
            Column::BestAsk => self.best_ask,
            Column::BidDepth(band) => self.bid(band),
            Column::AskDepth(band) => self.ask(band),
            Column::MinBid => self.min_bid,
            Column::MaxAsk => self.max_ask,
        }
    }

    pub(crate) fn set(&mut self, column: Column, value: Option<f64>) {
        match column {
            Column::EventTime => {}
            Column::BestBid => self.best_bid = value,
            Column::BestAsk => self.best_ask = value,
            Column::BidDepth(band) => self.bid_depth[band.index()] = value,
            Column::AskDepth(band) => self.ask_depth[band.index()] = value,
            Column::MinBid => self.min_bid = value,
            Column::MaxAsk => self.max_ask = value,
        }
    }

    fn to_json(&self, columns: &BTreeSet<Column>) -> Value {
        let mut object = Map::new();
        object.insert("symbol".to_string(), Value::String(self.symbol.clone()));
        for &column in columns {
            let value = match column {
                Column::EventTime => Value::String(format_canonical(self.event_time)),
                other => number(self.value(other)),
            };
            object.insert(column.name(), value);
        }
        for (name, value) in &self.extra_depth {
            object.insert(name.clone(), number(*value));
        }
        Value::Object(object)
    }
}

fn number(value: Option<f64>) -> Value {
    value
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

/// Time-ordered sequence of [`DepthRecord`]s.
///
/// Records are sorted ascending by `event_time`, ties in arrival order.
/// `columns` lists the canonical columns that appeared in the source
/// payload. Immutable once built.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dataset {
    records: Vec<DepthRecord>,
    columns: BTreeSet<Column>,
}

impl Dataset {
    /// Build from records; sorts them stably by `event_time`.
    pub fn new(mut records: Vec<DepthRecord>, columns: BTreeSet<Column>) -> Self {
        records.sort_by_key(|r| r.event_time);
        Self { records, columns }
    }

    /// Dataset with no records and no columns.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Records in time order.
    pub fn records(&self) -> &[DepthRecord] {
        &self.records
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether there are no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Columns present in the source payload.
    pub fn columns(&self) -> &BTreeSet<Column> {
        &self.columns
    }

    /// Whether `column` was present in the source payload.
    pub fn has_column(&self, column: Column) -> bool {
        self.columns.contains(&column)
    }

    /// All values of one column, in record order.
    pub fn series(&self, column: Column) -> Vec<Option<f64>> {
        self.records.iter().map(|r| r.value(column)).collect()
    }

    /// Earliest and latest event times.
    pub fn time_span(&self) -> Option<(OffsetDateTime, OffsetDateTime)> {
        Some((self.records.first()?.event_time, self.records.last()?.event_time))
    }

    /// Canonical JSON array; normalizing it again yields an equal dataset.
    pub fn to_json(&self) -> Value {
        Value::Array(
            self.records
                .iter()
                .map(|r| r.to_json(&self.columns))
                .collect(),
        )
    }
}
