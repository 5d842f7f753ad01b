/// Finest H3 resolution.
pub const MAX_RESOLUTION: u8 = 15;

/// Default resolution for coarse national aggregates (polygons, events, points).
pub const DEFAULT_COARSE_RESOLUTION: u8 = 3;

/// Default resolution for sub-national raster binning.
pub const DEFAULT_RASTER_RESOLUTION: u8 = 5;

/// Valid latitude range in degrees.
pub const LAT_RANGE: (f64, f64) = (-90.0, 90.0);

/// Valid longitude range in degrees.
pub const LON_RANGE: (f64, f64) = (-180.0, 180.0);
