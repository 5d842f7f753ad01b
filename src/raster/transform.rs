use crate::error::HexbinError;
use geo_types::{Coord, Rect};

/// Affine pixel to map-coordinate transform, in GDAL geotransform order.
///
/// ```text
/// x = origin_x + col * pixel_width + row * row_rotation
/// y = origin_y + col * col_rotation + row * pixel_height
/// ```
///
/// `pixel_height` is negative for the usual north-up raster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineTransform {
    pub origin_x: f64,
    pub pixel_width: f64,
    pub row_rotation: f64,
    pub origin_y: f64,
    pub col_rotation: f64,
    pub pixel_height: f64,
}

impl AffineTransform {
    /// North-up transform with no rotation.
    pub fn north_up(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            pixel_width,
            row_rotation: 0.0,
            origin_y,
            col_rotation: 0.0,
            pixel_height: -pixel_height.abs(),
        }
    }

    /// From a GeoTIFF `ModelTiepoint` (I, J, K, X, Y, Z) and `ModelPixelScale`
    /// (ScaleX, ScaleY, ScaleZ).
    pub fn from_tiepoint_scale(tiepoint: &[f64], scale: &[f64]) -> Result<Self, HexbinError> {
        if tiepoint.len() < 6 || scale.len() < 2 {
            return Err(HexbinError::RasterError(format!(
                "tiepoint needs 6 values and pixel scale 2, got {} and {}",
                tiepoint.len(),
                scale.len()
            )));
        }
        let (i, j, x, y) = (tiepoint[0], tiepoint[1], tiepoint[3], tiepoint[4]);
        let (sx, sy) = (scale[0], scale[1]);
        Ok(Self {
            origin_x: x - i * sx,
            pixel_width: sx,
            row_rotation: 0.0,
            origin_y: y + j * sy,
            col_rotation: 0.0,
            pixel_height: -sy,
        })
    }

    /// From a row-major 4x4 GeoTIFF `ModelTransformation` matrix.
    pub fn from_model_transformation(matrix: &[f64]) -> Result<Self, HexbinError> {
        if matrix.len() < 16 {
            return Err(HexbinError::RasterError(format!(
                "model transformation needs 16 values, got {}",
                matrix.len()
            )));
        }
        Ok(Self {
            origin_x: matrix[3],
            pixel_width: matrix[0],
            row_rotation: matrix[1],
            origin_y: matrix[7],
            col_rotation: matrix[4],
            pixel_height: matrix[5],
        })
    }

    /// Shift by half a pixel, for rasters whose tiepoint marks a pixel
    /// center rather than its corner.
    pub fn shifted_half_pixel(self) -> Self {
        let (x, y) = self.apply(-0.5, -0.5);
        Self {
            origin_x: x,
            origin_y: y,
            ..self
        }
    }

    /// Map coordinate of a fractional pixel position.
    pub fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.origin_x + col * self.pixel_width + row * self.row_rotation,
            self.origin_y + col * self.col_rotation + row * self.pixel_height,
        )
    }

    /// Map coordinate of the center of pixel `(col, row)`.
    pub fn pixel_center(&self, col: usize, row: usize) -> (f64, f64) {
        self.apply(col as f64 + 0.5, row as f64 + 0.5)
    }

    /// Envelope of a `width` x `height` raster in map coordinates.
    pub fn bounds(&self, width: usize, height: usize) -> Rect<f64> {
        let (w, h) = (width as f64, height as f64);
        let corners = [
            self.apply(0.0, 0.0),
            self.apply(w, 0.0),
            self.apply(w, h),
            self.apply(0.0, h),
        ];
        let (mut lo, mut hi) = (corners[0], corners[0]);
        for &(x, y) in &corners[1..] {
            lo = (lo.0.min(x), lo.1.min(y));
            hi = (hi.0.max(x), hi.1.max(y));
        }
        Rect::new(Coord { x: lo.0, y: lo.1 }, Coord { x: hi.0, y: hi.1 })
    }
}
