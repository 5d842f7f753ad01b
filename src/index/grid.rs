use crate::error::HexbinError;
use crate::index::constants::{LAT_RANGE, LON_RANGE, MAX_RESOLUTION};
use h3o::{CellIndex, LatLng, Resolution};
use std::collections::HashSet;

/// Converts a `u8` resolution into the grid's resolution type.
pub fn to_resolution(resolution: u8) -> Result<Resolution, HexbinError> {
    if resolution > MAX_RESOLUTION {
        return Err(HexbinError::InvalidResolution(resolution));
    }
    Resolution::try_from(resolution).map_err(|_| HexbinError::InvalidResolution(resolution))
}

/// Checks that a latitude/longitude pair is finite and inside the geographic domain.
pub fn validate_lat_lon(lat: f64, lon: f64) -> Result<LatLng, HexbinError> {
    let in_range = (LAT_RANGE.0..=LAT_RANGE.1).contains(&lat)
        && (LON_RANGE.0..=LON_RANGE.1).contains(&lon);
    if !in_range {
        return Err(HexbinError::InvalidCoordinate { lat, lon });
    }
    LatLng::new(lat, lon).map_err(|_| HexbinError::InvalidCoordinate { lat, lon })
}

/// Returns the cell containing `(lat, lon)` at the given resolution.
///
/// # Example
/// ```
/// use hexbin_rs::index::{cell_from_point, point_from_cell};
///
/// # fn main() -> Result<(), hexbin_rs::HexbinError> {
/// let cell = cell_from_point(2.05, 45.32, 5)?;
/// let (lat, lon) = point_from_cell(cell);
/// assert!((lat - 2.05).abs() < 0.5 && (lon - 45.32).abs() < 0.5);
/// # Ok(())
/// # }
/// ```
pub fn cell_from_point(lat: f64, lon: f64, resolution: u8) -> Result<CellIndex, HexbinError> {
    let resolution = to_resolution(resolution)?;
    let ll = validate_lat_lon(lat, lon)?;
    Ok(ll.to_cell(resolution))
}

/// Returns the center of a cell as `(lat, lon)`.
pub fn point_from_cell(cell: CellIndex) -> (f64, f64) {
    let center = LatLng::from(cell);
    (center.lat(), center.lng())
}

/// Returns the cell boundary as `(lat, lon)` vertices, without a closing vertex.
///
/// Hexagons yield 6 vertices and pentagons 5 (more only where an edge crosses an
/// icosahedron face). The winding order is the grid's native counter-clockwise one.
pub fn boundary_from_cell(cell: CellIndex) -> Vec<(f64, f64)> {
    cell.boundary()
        .iter()
        .map(|vertex| (vertex.lat(), vertex.lng()))
        .collect()
}

/// Returns every cell within `k` grid steps of `cell`, including `cell` itself.
pub fn disk_around(cell: CellIndex, k: i64) -> Result<HashSet<CellIndex>, HexbinError> {
    let k = u32::try_from(k).map_err(|_| HexbinError::InvalidRadius(k))?;
    Ok(cell.grid_disk::<HashSet<_>>(k))
}

/// Returns the number of grid steps between two cells at the same resolution.
pub fn grid_distance(a: CellIndex, b: CellIndex) -> Result<i32, HexbinError> {
    let (ra, rb) = (u8::from(a.resolution()), u8::from(b.resolution()));
    if ra != rb {
        return Err(HexbinError::ResolutionMismatch(ra, rb));
    }
    a.grid_distance(b)
        .map_err(|e| HexbinError::DistanceUndefined(format!("{} -> {}: {}", a, b, e)))
}
