//! PNG rendering of depth charts.

use std::fmt::Debug;
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;

use plotters::coord::Shift;
use plotters::prelude::*;
use tracing::{info, instrument, warn};

use super::artifact::{ArtifactStore, ChartArtifact};
use super::series::{chart_spec, ChartSpec, Line, Panel, Variant};
use crate::depth::{Band, Dataset};
use crate::error::RenderError;
use crate::metrics;

const BACKGROUND: RGBColor = RGBColor(0, 0, 0);
const GRID: RGBColor = RGBColor(64, 64, 64);
const GRID_LINES: usize = 6;
const MARGIN: u32 = 12;

/// Renders two-panel depth charts into an [`ArtifactStore`].
///
/// Each call draws on its own bitmap, so renders may run concurrently.
#[derive(Debug, Clone)]
pub struct ChartRenderer {
    store: ArtifactStore,
    width: u32,
    height: u32,
}

impl ChartRenderer {
    /// Renderer producing `width` x `height` images.
    pub fn new(store: ArtifactStore, width: u32, height: u32) -> Self {
        Self {
            store,
            width,
            height,
        }
    }

    /// Artifact store.
    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Render `band` of `dataset` as `variant`.
    ///
    /// Preconditions are checked before any file is allocated. If drawing
    /// fails the partial file is removed.
    #[instrument(skip_all, fields(records = dataset.len(), band = %band, variant = %variant))]
    pub fn render(
        &self,
        dataset: &Dataset,
        band: Band,
        variant: Variant,
    ) -> Result<ChartArtifact, RenderError> {
        let _timer = metrics::timer_render(variant);
        let result = self.render_inner(dataset, band, variant);
        if let Err(e) = &result {
            warn!(error = %e, "Chart render failed");
            metrics::inc_render_failures();
        }
        result
    }

    /// [`render`](Self::render) on the blocking thread pool.
    pub async fn render_blocking(
        &self,
        dataset: Arc<Dataset>,
        band: Band,
        variant: Variant,
    ) -> Result<ChartArtifact, RenderError> {
        let renderer = self.clone();
        tokio::task::spawn_blocking(move || renderer.render(&dataset, band, variant))
            .await
            .map_err(|e| RenderError::Task(e.to_string()))?
    }

    fn render_inner(
        &self,
        dataset: &Dataset,
        band: Band,
        variant: Variant,
    ) -> Result<ChartArtifact, RenderError> {
        let spec = chart_spec(dataset, band, variant)?;
        let file = self.store.allocate()?;
        self.draw(file.path(), &spec)?;
        info!(path = %file.path().display(), "Rendered chart");
        Ok(ChartArtifact::new(file, spec.description, band, variant))
    }

    fn draw(&self, path: &Path, spec: &ChartSpec) -> Result<(), RenderError> {
        let root = BitMapBackend::new(path, (self.width, self.height)).into_drawing_area();
        root.fill(&BACKGROUND).map_err(drawing)?;

        let (upper, lower) = root.split_vertically(self.height / 2);
        let x_range = time_range(&spec.times);
        draw_panel(&upper, x_range.clone(), &spec.times, &spec.prices)?;
        draw_panel(&lower, x_range, &spec.times, &spec.depth)?;

        root.present().map_err(drawing)?;
        Ok(())
    }
}

fn draw_panel(
    area: &DrawingArea<BitMapBackend<'_>, Shift>,
    x_range: Range<f64>,
    times: &[f64],
    panel: &Panel,
) -> Result<(), RenderError> {
    let (y_lo, y_hi) = panel.y_range();
    let mut chart = ChartBuilder::on(area)
        .margin(MARGIN)
        .build_cartesian_2d(x_range.clone(), y_lo..y_hi)
        .map_err(drawing)?;

    // Text needs a font backend, so the grid is drawn by hand.
    let step = (y_hi - y_lo) / GRID_LINES as f64;
    chart
        .draw_series((0..=GRID_LINES).map(|i| {
            let y = y_lo + step * i as f64;
            PathElement::new(vec![(x_range.start, y), (x_range.end, y)], GRID.stroke_width(1))
        }))
        .map_err(drawing)?;

    for line in &panel.lines {
        draw_line(&mut chart, times, line)?;
    }
    Ok(())
}

type Cartesian<'a, 'b> =
    ChartContext<'a, BitMapBackend<'b>, Cartesian2d<plotters::coord::types::RangedCoordf64, plotters::coord::types::RangedCoordf64>>;

/// Draw one line; gaps split it into runs, and a run of one point is a dot.
fn draw_line(chart: &mut Cartesian<'_, '_>, times: &[f64], line: &Line) -> Result<(), RenderError> {
    let color = RGBColor(line.color.0, line.color.1, line.color.2);
    for run in runs(times, &line.values) {
        if run.len() == 1 {
            chart
                .draw_series(std::iter::once(Circle::new(run[0], 2, color.filled())))
                .map_err(drawing)?;
        } else {
            chart
                .draw_series(LineSeries::new(run, color.stroke_width(2)))
                .map_err(drawing)?;
        }
    }
    Ok(())
}

/// Split a gappy series into contiguous `(x, y)` runs.
fn runs(times: &[f64], values: &[Option<f64>]) -> Vec<Vec<(f64, f64)>> {
    let mut out = Vec::new();
    let mut current = Vec::new();
    for (&x, value) in times.iter().zip(values) {
        match value {
            Some(y) => current.push((x, *y)),
            None if !current.is_empty() => out.push(std::mem::take(&mut current)),
            None => {}
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

fn time_range(times: &[f64]) -> Range<f64> {
    let lo = times.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = times.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !lo.is_finite() || !hi.is_finite() {
        return 0.0..1.0;
    }
    if hi > lo {
        lo..hi
    } else {
        (lo - 30.0)..(hi + 30.0)
    }
}

fn drawing<E: Debug>(e: E) -> RenderError {
    RenderError::Drawing(format!("{:?}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::depth::normalize;
    use serde_json::json;
    use tempfile::TempDir;

    fn renderer(tmp: &TempDir) -> ChartRenderer {
        ChartRenderer::new(ArtifactStore::new(tmp.path()), 200, 360)
    }

    fn dataset() -> Dataset {
        let rows = json!([
            {"event_time": 1704067200, "best_bid": 100, "best_ask": 101,
             "depth_1pct_bid": 10, "depth_1pct_ask": 5},
            {"event_time": 1704067260, "best_bid": 102, "best_ask": 103,
             "depth_1pct_bid": 12, "depth_1pct_ask": 0},
            {"event_time": 1704067320, "best_bid": 101, "best_ask": 102,
             "depth_1pct_bid": 11, "depth_1pct_ask": 6}
        ]);
        normalize("BTCUSDT", rows.as_array().unwrap())
    }

    #[test]
    fn runs_split_on_gaps() {
        let times = [1.0, 2.0, 3.0, 4.0, 5.0];
        let values = [Some(1.0), None, Some(3.0), Some(4.0), None];
        assert_eq!(
            runs(&times, &values),
            vec![vec![(1.0, 1.0)], vec![(3.0, 3.0), (4.0, 4.0)]]
        );
    }

    #[test]
    fn single_point_time_range_is_widened() {
        let range = time_range(&[100.0]);
        assert!(range.start < 100.0 && range.end > 100.0);
    }

    #[test]
    fn renders_every_variant_to_png() {
        let tmp = TempDir::new().unwrap();
        let renderer = renderer(&tmp);
        for code in 0..3u8 {
            let variant = Variant::try_from(code).unwrap();
            let artifact = renderer.render(&dataset(), Band::One, variant).unwrap();
            let bytes = std::fs::read(artifact.path()).unwrap();
            assert_eq!(&bytes[..4], b"\x89PNG");
            assert_eq!(artifact.description(), variant.description(Band::One));
        }
        // every artifact was dropped, so nothing is left behind
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn empty_dataset_allocates_nothing() {
        let tmp = TempDir::new().unwrap();
        let err = renderer(&tmp)
            .render(&Dataset::empty(), Band::One, Variant::Raw)
            .unwrap_err();
        assert!(matches!(err, RenderError::EmptyDataset));
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn missing_best_ask_is_reported() {
        let tmp = TempDir::new().unwrap();
        let rows = json!([{"event_time": 1, "best_bid": 1, "depth_1pct_bid": 1, "depth_1pct_ask": 1}]);
        let dataset = normalize("X", rows.as_array().unwrap());
        let err = renderer(&tmp)
            .render(&dataset, Band::One, Variant::Raw)
            .unwrap_err();
        assert!(matches!(
            err,
            RenderError::MissingColumn(crate::depth::Column::BestAsk)
        ));
    }

    #[tokio::test]
    async fn concurrent_renders_use_distinct_files() {
        let tmp = TempDir::new().unwrap();
        let renderer = renderer(&tmp);
        let dataset = Arc::new(dataset());

        let (a, b) = tokio::join!(
            renderer.render_blocking(dataset.clone(), Band::One, Variant::Raw),
            renderer.render_blocking(dataset.clone(), Band::One, Variant::Ratio),
        );
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_ne!(a.path(), b.path());
        assert!(a.path().exists() && b.path().exists());
    }
}
