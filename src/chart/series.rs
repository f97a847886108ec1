//! Chart variants and derived series.

use std::fmt::{Display, Formatter};

use strum::EnumIter;

use crate::depth::{Band, Column, Dataset};
use crate::error::RenderError;

/// Which view the lower panel shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter)]
pub enum Variant {
    /// Raw bid and ask depth.
    Raw,
    /// Bid depth divided by ask depth.
    Ratio,
    /// (bid - ask) / (bid + ask) * 100.
    Differential,
}

impl Variant {
    /// Numeric code used by callers (0, 1, 2).
    pub fn code(self) -> u8 {
        match self {
            Variant::Raw => 0,
            Variant::Ratio => 1,
            Variant::Differential => 2,
        }
    }

    /// Caption for `band` under this variant.
    pub fn description(self, band: Band) -> String {
        let pct = band.pct();
        match self {
            Variant::Raw => format!("Depth ({}% Bid/Ask)", pct),
            Variant::Ratio => format!("Depth ({}% K Bid/Ask)", pct),
            Variant::Differential => format!("Depth ({}% diff % Bids-Asks)", pct),
        }
    }
}

impl TryFrom<u8> for Variant {
    type Error = RenderError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Variant::Raw),
            1 => Ok(Variant::Ratio),
            2 => Ok(Variant::Differential),
            other => Err(RenderError::UnsupportedVariant(other)),
        }
    }
}

impl Display for Variant {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Variant::Raw => "raw",
            Variant::Ratio => "ratio",
            Variant::Differential => "diff",
        };
        f.write_str(name)
    }
}

/// RGB color of a line.
pub type Rgb = (u8, u8, u8);

/// One plotted line; `None` points are gaps.
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    /// Legend label.
    pub label: String,
    /// Line color.
    pub color: Rgb,
    /// One value per dataset record.
    pub values: Vec<Option<f64>>,
}

/// One chart panel.
#[derive(Debug, Clone, PartialEq)]
pub struct Panel {
    /// Y-axis title.
    pub y_label: &'static str,
    /// Lines drawn in this panel.
    pub lines: Vec<Line>,
}

impl Panel {
    /// Finite min/max across all lines, padded by 5%. `0..1` when every
    /// point is a gap.
    pub fn y_range(&self) -> (f64, f64) {
        let (lo, hi) = self
            .lines
            .iter()
            .flat_map(|l| l.values.iter().flatten())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });

        if !lo.is_finite() || !hi.is_finite() {
            return (0.0, 1.0);
        }
        let pad = if hi > lo { (hi - lo) * 0.05 } else { lo.abs().max(1.0) * 0.05 };
        (lo - pad, hi + pad)
    }
}

/// Everything needed to draw one chart, derived from a dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartSpec {
    /// Caption sent alongside the image.
    pub description: String,
    /// X positions: UNIX seconds per record.
    pub times: Vec<f64>,
    /// Upper panel: best bid and best ask.
    pub prices: Panel,
    /// Lower panel: variant-dependent depth view.
    pub depth: Panel,
}

const GREEN: Rgb = (0, 200, 0);
const RED: Rgb = (220, 20, 60);
const LIGHT_GREEN: Rgb = (144, 238, 144);
const LIGHT_CORAL: Rgb = (240, 128, 128);
const BLUE: Rgb = (30, 144, 255);
const CYAN: Rgb = (0, 255, 255);

/// Check preconditions and derive both panels.
pub fn chart_spec(dataset: &Dataset, band: Band, variant: Variant) -> Result<ChartSpec, RenderError> {
    if dataset.is_empty() {
        return Err(RenderError::EmptyDataset);
    }
    for column in [
        Column::EventTime,
        Column::BestBid,
        Column::BestAsk,
        Column::BidDepth(band),
        Column::AskDepth(band),
    ] {
        if !dataset.has_column(column) {
            return Err(RenderError::MissingColumn(column));
        }
    }

    let times = dataset
        .records()
        .iter()
        .map(|r| r.event_time.unix_timestamp_nanos() as f64 / 1e9)
        .collect();

    let prices = Panel {
        y_label: "Price",
        lines: vec![
            line("Best Bid", GREEN, dataset.series(Column::BestBid)),
            line("Best Ask", RED, dataset.series(Column::BestAsk)),
        ],
    };

    let bids = dataset.series(Column::BidDepth(band));
    let asks = dataset.series(Column::AskDepth(band));
    let pct = band.pct();

    let depth = match variant {
        Variant::Raw => Panel {
            y_label: "Volume",
            lines: vec![
                line(&format!("Bid {}%", pct), LIGHT_GREEN, bids),
                line(&format!("Ask {}%", pct), LIGHT_CORAL, asks),
            ],
        },
        Variant::Ratio => Panel {
            y_label: "Ratio",
            lines: vec![line("Bid/Ask Ratio", BLUE, zip_with(&bids, &asks, ratio))],
        },
        Variant::Differential => Panel {
            y_label: "Difference %",
            lines: vec![line("Bid-Ask Diff %", CYAN, zip_with(&bids, &asks, differential))],
        },
    };

    Ok(ChartSpec {
        description: variant.description(band),
        times,
        prices,
        depth,
    })
}

fn line(label: &str, color: Rgb, values: Vec<Option<f64>>) -> Line {
    Line {
        label: label.to_string(),
        color,
        values,
    }
}

fn zip_with(
    bids: &[Option<f64>],
    asks: &[Option<f64>],
    f: fn(f64, f64) -> Option<f64>,
) -> Vec<Option<f64>> {
    bids.iter()
        .zip(asks)
        .map(|(bid, ask)| match (bid, ask) {
            (Some(bid), Some(ask)) => f(*bid, *ask).filter(|v| v.is_finite()),
            _ => None,
        })
        .collect()
}

/// bid / ask; a zero ask is a gap.
pub fn ratio(bid: f64, ask: f64) -> Option<f64> {
    (ask != 0.0).then(|| bid / ask)
}

/// (bid - ask) / (bid + ask) * 100; a zero sum is a gap.
pub fn differential(bid: f64, ask: f64) -> Option<f64> {
    let total = bid + ask;
    (total != 0.0).then(|| (bid - ask) / total * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::depth::normalize;
    use serde_json::json;

    fn scenario() -> Dataset {
        let rows = json!([
            {"event_time": 1704067200, "best_bid": 100, "best_ask": 101,
             "depth_1pct_bid": "10", "depth_1pct_ask": "5"},
            {"event_time": 1704067260, "best_bid": 102, "best_ask": 103,
             "depth_1pct_bid": "12", "depth_1pct_ask": "6"}
        ]);
        normalize("BTCUSDT", rows.as_array().unwrap())
    }

    fn rounded(values: &[Option<f64>]) -> Vec<Option<f64>> {
        values
            .iter()
            .map(|v| v.map(|x| (x * 100.0).round() / 100.0))
            .collect()
    }

    #[test]
    fn variant_codes_round_trip() {
        for code in 0..3u8 {
            assert_eq!(Variant::try_from(code).unwrap().code(), code);
        }
        assert!(matches!(
            Variant::try_from(3),
            Err(RenderError::UnsupportedVariant(3))
        ));
    }

    #[test]
    fn raw_variant_plots_both_sides() {
        let spec = chart_spec(&scenario(), Band::One, Variant::Raw).unwrap();
        assert_eq!(spec.description, "Depth (1% Bid/Ask)");
        assert_eq!(spec.depth.lines.len(), 2);
        assert_eq!(spec.depth.lines[0].values, vec![Some(10.0), Some(12.0)]);
        assert_eq!(spec.depth.lines[1].values, vec![Some(5.0), Some(6.0)]);
        assert_eq!(spec.prices.lines[0].values, vec![Some(100.0), Some(102.0)]);
        assert_eq!(spec.times, vec![1704067200.0, 1704067260.0]);
    }

    #[test]
    fn ratio_variant_divides_bid_by_ask() {
        let spec = chart_spec(&scenario(), Band::One, Variant::Ratio).unwrap();
        assert_eq!(spec.description, "Depth (1% K Bid/Ask)");
        assert_eq!(spec.depth.lines[0].values, vec![Some(2.0), Some(2.0)]);
    }

    #[test]
    fn differential_variant_is_percentage_of_total() {
        let spec = chart_spec(&scenario(), Band::One, Variant::Differential).unwrap();
        assert_eq!(spec.description, "Depth (1% diff % Bids-Asks)");
        assert_eq!(
            rounded(&spec.depth.lines[0].values),
            vec![Some(33.33), Some(33.33)]
        );
    }

    #[test]
    fn zero_or_missing_denominator_is_a_gap() {
        let rows = json!([
            {"event_time": 1, "best_bid": 1, "best_ask": 2, "depth_3pct_bid": 4, "depth_3pct_ask": 0},
            {"event_time": 2, "best_bid": 1, "best_ask": 2, "depth_3pct_bid": 4, "depth_3pct_ask": null},
            {"event_time": 3, "best_bid": 1, "best_ask": 2, "depth_3pct_bid": "x", "depth_3pct_ask": 2},
            {"event_time": 4, "best_bid": 1, "best_ask": 2, "depth_3pct_bid": 4, "depth_3pct_ask": 2}
        ]);
        let dataset = normalize("X", rows.as_array().unwrap());

        let ratio = chart_spec(&dataset, Band::Three, Variant::Ratio).unwrap();
        assert_eq!(ratio.depth.lines[0].values, vec![None, None, None, Some(2.0)]);

        let diff = chart_spec(&dataset, Band::Three, Variant::Differential).unwrap();
        assert_eq!(diff.depth.lines[0].values[0], Some(100.0));
        assert_eq!(diff.depth.lines[0].values[1], None);
    }

    #[test]
    fn zero_total_depth_is_a_gap_in_differential() {
        assert_eq!(differential(0.0, 0.0), None);
        assert_eq!(differential(3.0, -3.0), None);
    }

    #[test]
    fn empty_dataset_is_rejected() {
        assert!(matches!(
            chart_spec(&Dataset::empty(), Band::One, Variant::Raw),
            Err(RenderError::EmptyDataset)
        ));
    }

    #[test]
    fn missing_band_columns_are_rejected() {
        assert!(matches!(
            chart_spec(&scenario(), Band::Five, Variant::Raw),
            Err(RenderError::MissingColumn(Column::BidDepth(Band::Five)))
        ));
    }

    #[test]
    fn y_range_ignores_gaps_and_pads() {
        let panel = Panel {
            y_label: "v",
            lines: vec![line("a", GREEN, vec![Some(10.0), None, Some(20.0)])],
        };
        let (lo, hi) = panel.y_range();
        assert!((lo - 9.5).abs() < 1e-9);
        assert!((hi - 20.5).abs() < 1e-9);

        let empty = Panel {
            y_label: "v",
            lines: vec![line("a", GREEN, vec![None])],
        };
        assert_eq!(empty.y_range(), (0.0, 1.0));
    }
}
