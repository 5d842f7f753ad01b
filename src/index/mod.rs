pub mod constants;
mod grid;
mod identifier;

pub use constants::{
    DEFAULT_COARSE_RESOLUTION, DEFAULT_RASTER_RESOLUTION, LAT_RANGE, LON_RANGE, MAX_RESOLUTION,
};
pub use grid::{
    boundary_from_cell, cell_from_point, disk_around, grid_distance, point_from_cell,
    to_resolution, validate_lat_lon,
};
pub use identifier::{format_cell_id, parse_cell_id};
