use crate::aggregate::{MetricDescription, MetricValue};
use crate::coord::Reprojector;
use crate::emit::EmittedCell;
use crate::error::HexbinError;
use crate::index::{to_resolution, validate_lat_lon};
use crate::raster::Raster;
use crate::skip::{SkipReason, SkipTally};
use h3o::CellIndex;
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap};

/// Colour ramp from low (red) to high (dark green) normalized values.
pub const COLOR_RAMP: [&str; 5] = ["#d32f2f", "#f57c00", "#ffd700", "#7cb342", "#2e7d32"];

/// Maps a normalized value in `[0, 1]` to one of five evenly spaced colour buckets.
pub fn color_for(normalized: f64) -> &'static str {
    let n = COLOR_RAMP.len();
    let idx = (normalized.max(0.0) * n as f64).floor() as usize;
    COLOR_RAMP[idx.min(n - 1)]
}

/// How the samples falling in one cell combine into its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BinMode {
    /// Average of all samples.
    #[default]
    Mean,
    /// Largest sample.
    Max,
}

/// Running per-cell statistics of binned samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellStats {
    pub sum: f64,
    pub count: u64,
    pub max: f64,
}

impl Default for CellStats {
    fn default() -> Self {
        Self {
            sum: 0.0,
            count: 0,
            max: f64::NEG_INFINITY,
        }
    }
}

impl CellStats {
    pub fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
        self.max = self.max.max(value);
    }

    pub fn merge(&mut self, other: CellStats) {
        self.sum += other.sum;
        self.count += other.count;
        self.max = self.max.max(other.max);
    }

    /// `None` until at least one sample was added.
    pub fn value(&self, mode: BinMode) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        Some(match mode {
            BinMode::Mean => self.sum / self.count as f64,
            BinMode::Max => self.max,
        })
    }
}

/// Final value of one binned cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinnedCell {
    pub value: f64,
    /// `(value - min) / (max - min)`, with a denominator of 1.0 when all
    /// cells share one value (so every cell normalizes to 0.0).
    pub normalized: f64,
    pub color: &'static str,
    pub pixel_count: u64,
}

/// Result of binning one raster.
#[derive(Debug, Clone, Default)]
pub struct BinnedRaster {
    pub cells: BTreeMap<CellIndex, BinnedCell>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub pixels_binned: usize,
    pub skipped: SkipTally,
}

impl BinnedRaster {
    /// Metric descriptions for [`BinnedRaster::into_cells`] output.
    pub fn descriptions(metric: &str, description: MetricDescription) -> BTreeMap<String, MetricDescription> {
        BTreeMap::from([
            (metric.to_string(), description),
            (
                "normalized_value".to_string(),
                MetricDescription::new("Normalized Value", "Cell value rescaled to [0, 1]"),
            ),
            (
                "pixel_count".to_string(),
                MetricDescription::new("Pixel Count", "Number of samples binned into the cell")
                    .unit("count"),
            ),
        ])
    }

    /// Output rows with the cell value under `metric`, plus `normalized_value`
    /// and `pixel_count`, and the colour bucket.
    pub fn into_cells(self, metric: &str, year: Option<i32>) -> Vec<EmittedCell> {
        self.cells
            .into_iter()
            .map(|(cell, binned)| {
                let metrics = BTreeMap::from([
                    (metric.to_string(), MetricValue::Number(binned.value)),
                    (
                        "normalized_value".to_string(),
                        MetricValue::Number(binned.normalized),
                    ),
                    (
                        "pixel_count".to_string(),
                        MetricValue::Number(binned.pixel_count as f64),
                    ),
                ]);
                let row = EmittedCell::new(cell, metrics).color(binned.color);
                match year {
                    Some(y) => row.year(y),
                    None => row,
                }
            })
            .collect()
    }
}

#[derive(Default)]
struct Partial {
    stats: HashMap<CellIndex, CellStats>,
    binned: usize,
    skipped: SkipTally,
}

impl Partial {
    fn merge(mut self, other: Partial) -> Self {
        for (cell, s) in other.stats {
            self.stats.entry(cell).or_default().merge(s);
        }
        self.binned += other.binned;
        self.skipped = self.skipped.merge(other.skipped);
        self
    }
}

/// Bins every valid pixel of `raster` into the cell containing its center.
///
/// Pixels equal to the no-data value or NaN are skipped, as are pixels
/// whose coordinate fails to reproject or falls outside the geographic
/// domain. Rows are scanned in parallel with one reprojector per worker.
///
/// Fails with `UnsupportedCrs` if the raster's CRS cannot be converted, and
/// with `InvalidResolution` for a resolution above 15. A raster with no
/// valid pixel yields an empty result, not an error.
///
/// # Example
/// ```
/// use hexbin_rs::raster::{AffineTransform, BinMode, Raster, bin};
///
/// # fn main() -> Result<(), hexbin_rs::HexbinError> {
/// let transform = AffineTransform::north_up(45.0, 3.0, 0.01, 0.01);
/// let raster = Raster::new(3, 3, vec![1.0; 9], transform)?;
/// let binned = bin(&raster, 5, BinMode::Mean)?;
/// assert_eq!(binned.pixels_binned, 9);
/// # Ok(())
/// # }
/// ```
pub fn bin(raster: &Raster, resolution: u8, mode: BinMode) -> Result<BinnedRaster, HexbinError> {
    let res = to_resolution(resolution)?;
    let reprojector = Reprojector::new(raster.crs)?;
    if !reprojector.is_identity() {
        log::info!("Converting raster from {} to EPSG:4326", raster.crs);
        match reprojector.rect_to_wgs84(&raster.bounds()) {
            Ok(b) => log::info!(
                "Raster bounds in WGS84: ({:.4}, {:.4}) - ({:.4}, {:.4})",
                b.min().x,
                b.min().y,
                b.max().x,
                b.max().y
            ),
            Err(e) => log::warn!("Could not reproject raster bounds: {}", e),
        }
    }
    let crs = raster.crs;

    let partial = (0..raster.height)
        .into_par_iter()
        .map_init(
            || Reprojector::new(crs),
            |reprojector, row| {
                let mut part = Partial::default();
                for col in 0..raster.width {
                    let Some(value) = raster.value(col, row) else {
                        continue;
                    };
                    if !raster.is_valid(value) {
                        part.skipped.record(SkipReason::NoData);
                        continue;
                    }
                    let Ok(proj) = reprojector.as_ref() else {
                        part.skipped.record(SkipReason::ReprojectionFailed);
                        continue;
                    };
                    let (x, y) = raster.transform.pixel_center(col, row);
                    let (lon, lat) = match proj.to_wgs84(&(x, y)) {
                        Ok(p) => p,
                        Err(_) => {
                            part.skipped.record(SkipReason::ReprojectionFailed);
                            continue;
                        }
                    };
                    match validate_lat_lon(lat, lon) {
                        Ok(ll) => {
                            part.stats.entry(ll.to_cell(res)).or_default().add(value);
                            part.binned += 1;
                        }
                        Err(_) => part.skipped.record(SkipReason::InvalidCoordinate),
                    }
                }
                part
            },
        )
        .reduce(Partial::default, Partial::merge);

    let values: BTreeMap<CellIndex, (f64, u64)> = partial
        .stats
        .iter()
        .filter_map(|(cell, s)| s.value(mode).map(|v| (*cell, (v, s.count))))
        .collect();

    let min = values.values().map(|(v, _)| *v).reduce(f64::min);
    let max = values.values().map(|(v, _)| *v).reduce(f64::max);
    let range = match (min, max) {
        (Some(lo), Some(hi)) if hi > lo => hi - lo,
        _ => 1.0,
    };
    let lo = min.unwrap_or(0.0);

    let cells = values
        .into_iter()
        .map(|(cell, (value, pixel_count))| {
            let normalized = (value - lo) / range;
            (
                cell,
                BinnedCell {
                    value,
                    normalized,
                    color: color_for(normalized),
                    pixel_count,
                },
            )
        })
        .collect();

    Ok(BinnedRaster {
        cells,
        min_value: min,
        max_value: max,
        pixels_binned: partial.binned,
        skipped: partial.skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::Crs;
    use crate::raster::AffineTransform;

    fn small_raster(data: Vec<f64>) -> Result<Raster, HexbinError> {
        // 4x4 pixels of 0.01 degrees near Mogadishu.
        Raster::new(4, 4, data, AffineTransform::north_up(45.30, 2.06, 0.01, 0.01))
    }

    #[test]
    fn test_color_buckets() {
        assert_eq!(color_for(0.0), "#d32f2f");
        assert_eq!(color_for(0.19), "#d32f2f");
        assert_eq!(color_for(0.2), "#f57c00");
        assert_eq!(color_for(0.5), "#ffd700");
        assert_eq!(color_for(0.79), "#7cb342");
        assert_eq!(color_for(1.0), "#2e7d32");
        assert_eq!(color_for(1.5), "#2e7d32");
        assert_eq!(color_for(-0.5), "#d32f2f");
    }

    #[test]
    fn test_uniform_raster_normalizes_without_nan() -> Result<(), HexbinError> {
        let raster = small_raster(vec![7.0; 16])?;
        let binned = bin(&raster, 7, BinMode::Mean)?;

        assert!(!binned.cells.is_empty());
        assert_eq!(binned.min_value, Some(7.0));
        assert_eq!(binned.max_value, Some(7.0));
        for cell in binned.cells.values() {
            assert_eq!(cell.normalized, 0.0);
            assert_eq!(cell.color, "#d32f2f");
        }
        Ok(())
    }

    #[test]
    fn test_all_nodata_is_empty() -> Result<(), HexbinError> {
        let raster = small_raster(vec![-9999.0; 16])?.nodata(Some(-9999.0));
        let binned = bin(&raster, 5, BinMode::Mean)?;

        assert!(binned.cells.is_empty());
        assert_eq!(binned.pixels_binned, 0);
        assert_eq!(binned.skipped.count(SkipReason::NoData), 16);
        assert_eq!(binned.min_value, None);
        Ok(())
    }

    #[test]
    fn test_nan_pixels_are_skipped() -> Result<(), HexbinError> {
        let mut data = vec![1.0; 16];
        data[3] = f64::NAN;
        data[7] = f64::NAN;
        let binned = bin(&small_raster(data)?, 5, BinMode::Mean)?;
        assert_eq!(binned.pixels_binned, 14);
        assert_eq!(binned.skipped.count(SkipReason::NoData), 2);
        Ok(())
    }

    #[test]
    fn test_mean_and_max_modes() -> Result<(), HexbinError> {
        // A 0.04 degree raster centered on a resolution 3 cell center lies
        // entirely inside that cell.
        let center = crate::cell::HexCell::from_lat_lng(2.05, 45.32, 3)?;
        let data: Vec<f64> = (1..=16).map(f64::from).collect();
        let transform = AffineTransform::north_up(center.lon() - 0.02, center.lat() + 0.02, 0.01, 0.01);
        let raster = Raster::new(4, 4, data, transform)?;

        let mean = bin(&raster, 3, BinMode::Mean)?;
        let max = bin(&raster, 3, BinMode::Max)?;
        assert_eq!(mean.cells.len(), 1);
        assert!(mean.cells.contains_key(&center.id));
        let mean_cell = mean.cells.values().next().copied();
        let max_cell = max.cells.values().next().copied();
        assert_eq!(mean_cell.map(|c| c.value), Some(8.5));
        assert_eq!(mean_cell.map(|c| c.pixel_count), Some(16));
        assert_eq!(max_cell.map(|c| c.value), Some(16.0));
        Ok(())
    }

    #[test]
    fn test_normalization_spans_unit_interval() -> Result<(), HexbinError> {
        let data: Vec<f64> = (0..16).map(f64::from).collect();
        let binned = bin(&small_raster(data)?, 9, BinMode::Mean)?;
        let normalized: Vec<f64> = binned.cells.values().map(|c| c.normalized).collect();

        assert!(normalized.iter().all(|n| (0.0..=1.0).contains(n)));
        assert!(normalized.contains(&0.0));
        assert!(normalized.contains(&1.0));
        Ok(())
    }

    #[test]
    fn test_out_of_range_pixels() -> Result<(), HexbinError> {
        // Pixels centered east of 180 degrees.
        let raster = Raster::new(2, 1, vec![1.0, 2.0], AffineTransform::north_up(179.5, 0.0, 1.0, 1.0))?;
        let binned = bin(&raster, 3, BinMode::Mean)?;
        assert_eq!(binned.pixels_binned, 1);
        assert_eq!(binned.skipped.count(SkipReason::InvalidCoordinate), 1);
        Ok(())
    }

    #[test]
    fn test_projected_raster() -> Result<(), HexbinError> {
        // 2x2 pixels of 1 km in EPSG:3857 around Mogadishu.
        let raster = Raster::new(
            2,
            2,
            vec![1.0, 2.0, 3.0, 4.0],
            AffineTransform::north_up(5_044_000.0, 229_000.0, 1000.0, 1000.0),
        )?
        .crs(Crs::Epsg(3857));
        let binned = bin(&raster, 5, BinMode::Mean)?;
        assert_eq!(binned.pixels_binned, 4);
        Ok(())
    }

    #[test]
    fn test_into_cells_carries_color_and_year() -> Result<(), HexbinError> {
        let binned = bin(&small_raster(vec![2.0; 16])?, 5, BinMode::Max)?;
        let rows = binned.into_cells("productivity", Some(2015));
        assert!(!rows.is_empty());
        for row in rows {
            assert_eq!(row.year, Some(2015));
            assert!(row.color.is_some());
            assert_eq!(row.metrics["productivity"], MetricValue::Number(2.0));
        }
        Ok(())
    }
}
