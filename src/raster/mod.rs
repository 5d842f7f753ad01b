mod binner;
mod transform;

pub use binner::{BinMode, BinnedCell, BinnedRaster, CellStats, bin, color_for, COLOR_RAMP};
pub use transform::AffineTransform;

use crate::coord::Crs;
use crate::error::HexbinError;
use geo_types::Rect;

/// A single-band grid of samples with its georeferencing.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    pub width: usize,
    pub height: usize,
    /// Row-major samples, `width * height` long.
    pub data: Vec<f64>,
    pub transform: AffineTransform,
    pub crs: Crs,
    pub nodata: Option<f64>,
}

impl Raster {
    pub fn new(
        width: usize,
        height: usize,
        data: Vec<f64>,
        transform: AffineTransform,
    ) -> Result<Self, HexbinError> {
        if data.len() != width * height {
            return Err(HexbinError::RasterError(format!(
                "{}x{} raster needs {} samples, got {}",
                width,
                height,
                width * height,
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
            transform,
            crs: Crs::Wgs84,
            nodata: None,
        })
    }

    pub fn crs(mut self, crs: Crs) -> Self {
        self.crs = crs;
        self
    }

    pub fn nodata(mut self, nodata: Option<f64>) -> Self {
        self.nodata = nodata;
        self
    }

    pub fn value(&self, col: usize, row: usize) -> Option<f64> {
        if col >= self.width {
            return None;
        }
        self.data.get(row * self.width + col).copied()
    }

    /// False for NaN and for the no-data sentinel.
    pub fn is_valid(&self, value: f64) -> bool {
        !value.is_nan() && self.nodata.is_none_or(|nd| value != nd)
    }

    /// Extent in the raster's own CRS.
    pub fn bounds(&self) -> Rect<f64> {
        self.transform.bounds(self.width, self.height)
    }
}
