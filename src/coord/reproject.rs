use crate::coord::{Coordinate, Crs};
use crate::error::HexbinError;
use geo::MapCoords;
use geo_types::{Coord, Geometry, Rect};
use proj::Proj;
use std::fmt;

/// Converts coordinates from a source CRS into WGS84 longitude/latitude.
///
/// Built once per source. For `Crs::Wgs84` no projection is allocated and
/// every conversion is the identity.
pub struct Reprojector {
    source: Crs,
    proj: Option<Proj>,
}

impl fmt::Debug for Reprojector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reprojector")
            .field("source", &self.source)
            .finish()
    }
}

impl Reprojector {
    /// Create a reprojector from `source` to EPSG:4326.
    ///
    /// Fails with `UnsupportedCrs` if the projection library does not know the source.
    pub fn new(source: Crs) -> Result<Self, HexbinError> {
        let proj = match source {
            Crs::Wgs84 => None,
            Crs::Epsg(_) => Some(
                Proj::new_known_crs(&source.code(), "EPSG:4326", None)
                    .map_err(|e| HexbinError::UnsupportedCrs(format!("{}: {}", source, e)))?,
            ),
        };
        Ok(Self { source, proj })
    }

    pub fn source(&self) -> Crs {
        self.source
    }

    pub fn is_identity(&self) -> bool {
        self.proj.is_none()
    }

    /// Convert one coordinate, returning `(lon, lat)`.
    pub fn to_wgs84<C: Coordinate>(&self, coord: &C) -> Result<(f64, f64), HexbinError> {
        match &self.proj {
            None => Ok((coord.x(), coord.y())),
            Some(proj) => {
                let (lon, lat) = proj
                    .convert((coord.x(), coord.y()))
                    .map_err(|e| HexbinError::ProjectionError(e.to_string()))?;
                if lon.is_finite() && lat.is_finite() {
                    Ok((lon, lat))
                } else {
                    Err(HexbinError::ProjectionError(format!(
                        "non-finite result for ({}, {})",
                        coord.x(),
                        coord.y()
                    )))
                }
            }
        }
    }

    /// Convert every vertex of a geometry.
    pub fn geometry_to_wgs84(&self, geom: Geometry<f64>) -> Result<Geometry<f64>, HexbinError> {
        if self.is_identity() {
            return Ok(geom);
        }
        geom.try_map_coords(|c: Coord<f64>| {
            self.to_wgs84(&(c.x, c.y))
                .map(|(x, y)| Coord { x, y })
        })
    }

    /// Convert an extent by projecting its four corners and taking their envelope.
    pub fn rect_to_wgs84(&self, rect: &Rect<f64>) -> Result<Rect<f64>, HexbinError> {
        if self.is_identity() {
            return Ok(*rect);
        }
        let (min, max) = (rect.min(), rect.max());
        let corners = [
            self.to_wgs84(&(min.x, min.y))?,
            self.to_wgs84(&(max.x, min.y))?,
            self.to_wgs84(&(max.x, max.y))?,
            self.to_wgs84(&(min.x, max.y))?,
        ];
        let (mut lo, mut hi) = (corners[0], corners[0]);
        for &(x, y) in &corners[1..] {
            lo = (lo.0.min(x), lo.1.min(y));
            hi = (hi.0.max(x), hi.1.max(y));
        }
        Ok(Rect::new(Coord { x: lo.0, y: lo.1 }, Coord { x: hi.0, y: hi.1 }))
    }
}
