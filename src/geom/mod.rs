mod parse;
mod rasterize;

pub use parse::{feature_geometry, parse_geometry, polygons_of};
pub use rasterize::{RasterizeOutcome, normalize_polygon, rasterize, rasterize_all};
