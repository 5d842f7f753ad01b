//! # hexbin-rs
//!
//! Converts polygons, rasters and event logs into H3 hexagon-cell
//! FeatureCollections with per-cell metrics.
//!
//! ### 1. `HexCell` - Single Cell Operations
//!
//! ```
//! use hexbin_rs::HexCell;
//!
//! # fn main() -> Result<(), hexbin_rs::HexbinError> {
//! let cell = HexCell::from_lat_lng(2.05, 45.32, 3)?;
//! println!("{}", cell.to_id_string());
//! let polygon = cell.to_polygon();
//! assert_eq!(polygon.exterior().coords().count(), 7);
//! # Ok(())
//! # }
//! ```
//!
//! ### 2. Grid primitives
//!
//! ```
//! use hexbin_rs::index::{cell_from_point, disk_around, grid_distance};
//!
//! # fn main() -> Result<(), hexbin_rs::HexbinError> {
//! let cell = cell_from_point(2.05, 45.32, 5)?;
//! let ring = disk_around(cell, 1)?;
//! assert_eq!(ring.len(), 7);
//! for neighbour in &ring {
//!     assert!(grid_distance(cell, *neighbour)? <= 1);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### 3. Drivers
//!
//! Each input shape has a builder config; [`pipeline::InputSource`] runs it
//! and writes the output FeatureCollection atomically:
//!
//! ```no_run
//! use hexbin_rs::aggregate::PolygonSchema;
//! use hexbin_rs::boundary::BoundaryRegistry;
//! use hexbin_rs::pipeline::{InputSource, PolygonHexConfig};
//!
//! let registry = BoundaryRegistry::new("data");
//! let config = PolygonHexConfig::new("deserts.geojson", "out/deserts_h3.geojson")
//!     .schema(PolygonSchema::desertification())
//!     .region("somalia");
//!
//! // Writes out/deserts_h3_somalia.geojson
//! InputSource::Polygons(config).run(&registry).unwrap();
//! ```
//!
//! The stages are usable on their own as well: [`geom::rasterize`] for
//! polygon coverage, [`raster::bin`] for pixel binning,
//! [`aggregate::TemporalAggregator`] for event logs and
//! [`emit::FeatureEmitter`] for building the output collection.

pub mod aggregate;
pub mod boundary;
pub mod cell;
pub mod coord;
pub mod emit;
pub mod error;
pub mod geom;
pub mod index;
pub mod io;
pub mod pipeline;
pub mod raster;
pub mod skip;

pub use boundary::{BoundaryRegistry, Region};
pub use cell::HexCell;
pub use coord::{Coordinate, Crs, Reprojector};
pub use error::HexbinError;
pub use pipeline::{InputSource, RunSummary};
pub use skip::{SkipReason, SkipTally};

pub use geo_types;
pub use geojson;
pub use h3o;
