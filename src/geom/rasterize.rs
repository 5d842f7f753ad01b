use crate::error::HexbinError;
use crate::geom::polygons_of;
use crate::index::to_resolution;
use crate::skip::{SkipReason, SkipTally};
use geo::Validation;
use geo_types::{Coord, Geometry, LineString, Polygon};
use h3o::geom::{ContainmentMode, TilerBuilder};
use h3o::{CellIndex, Resolution};
use rayon::prelude::*;
use std::collections::HashSet;

/// Strips repeated vertices from every ring and rejects unusable polygons.
///
/// Consecutive duplicates and the closing vertex are removed before counting,
/// so a ring needs at least 3 distinct vertices. Self-intersecting rings and
/// other topological defects fail with `InvalidGeometry`.
pub fn normalize_polygon(polygon: &Polygon<f64>) -> Result<Polygon<f64>, HexbinError> {
    let exterior = normalize_ring(polygon.exterior(), "exterior")?;
    let interiors = polygon
        .interiors()
        .iter()
        .enumerate()
        .map(|(i, ring)| normalize_ring(ring, &format!("hole {}", i)))
        .collect::<Result<Vec<_>, _>>()?;

    let normalized = Polygon::new(exterior, interiors);
    normalized
        .check_validation()
        .map_err(|e| HexbinError::InvalidGeometry(e.to_string()))?;
    Ok(normalized)
}

fn normalize_ring(ring: &LineString<f64>, label: &str) -> Result<LineString<f64>, HexbinError> {
    let mut coords: Vec<Coord<f64>> = Vec::with_capacity(ring.0.len());
    for c in ring.coords() {
        if !c.x.is_finite() || !c.y.is_finite() {
            return Err(HexbinError::InvalidGeometry(format!(
                "{} ring has a non-finite vertex",
                label
            )));
        }
        if coords.last() != Some(c) {
            coords.push(*c);
        }
    }
    if coords.len() > 1 && coords.first() == coords.last() {
        coords.pop();
    }
    if coords.len() < 3 {
        return Err(HexbinError::InvalidGeometry(format!(
            "{} ring has {} distinct vertices, need at least 3",
            label,
            coords.len()
        )));
    }
    Ok(LineString::from(coords))
}

/// Returns every cell whose center lies inside `geometry`.
///
/// MultiPolygons and collections are decomposed into simple polygons, holes
/// exclude cells, and the per-polygon results are unioned. A cell that only
/// touches the boundary without its center inside is not included, so two
/// adjacent polygons rasterized at the same resolution never share a cell.
///
/// # Example
/// ```
/// use hexbin_rs::geom::rasterize;
/// use geo_types::{Geometry, polygon};
///
/// # fn main() -> Result<(), hexbin_rs::HexbinError> {
/// let square = polygon![
///     (x: 40.0, y: 0.0),
///     (x: 45.0, y: 0.0),
///     (x: 45.0, y: 5.0),
///     (x: 40.0, y: 5.0),
/// ];
/// let cells = rasterize(&Geometry::Polygon(square), 3)?;
/// assert!(!cells.is_empty());
/// # Ok(())
/// # }
/// ```
pub fn rasterize(geometry: &Geometry<f64>, resolution: u8) -> Result<HashSet<CellIndex>, HexbinError> {
    let resolution = to_resolution(resolution)?;
    rasterize_at(geometry, resolution)
}

fn rasterize_at(
    geometry: &Geometry<f64>,
    resolution: Resolution,
) -> Result<HashSet<CellIndex>, HexbinError> {
    let parts = polygons_of(geometry);
    if parts.0.is_empty() {
        return Err(HexbinError::InvalidGeometry(
            "geometry has no polygonal parts".to_string(),
        ));
    }

    let mut tiler = TilerBuilder::new(resolution)
        .containment_mode(ContainmentMode::ContainsCentroid)
        .build();
    for polygon in &parts.0 {
        let normalized = normalize_polygon(polygon)?;
        tiler
            .add(normalized)
            .map_err(|e| HexbinError::InvalidGeometry(e.to_string()))?;
    }

    Ok(tiler.into_coverage().collect())
}

/// Result of rasterizing a batch of geometries.
#[derive(Debug, Clone, Default)]
pub struct RasterizeOutcome {
    /// Union of all covered cells.
    pub cells: HashSet<CellIndex>,
    /// Number of geometries that rasterized successfully.
    pub rasterized: usize,
    pub skipped: SkipTally,
}

/// Rasterizes many geometries in parallel and unions the cell sets.
///
/// A geometry that fails with `InvalidGeometry` is logged with its index and
/// skipped; only an invalid resolution aborts the batch.
pub fn rasterize_all(
    geometries: &[Geometry<f64>],
    resolution: u8,
) -> Result<RasterizeOutcome, HexbinError> {
    let resolution = to_resolution(resolution)?;

    let outcome = geometries
        .par_iter()
        .enumerate()
        .map(|(idx, geom)| match rasterize_at(geom, resolution) {
            Ok(cells) => RasterizeOutcome {
                cells,
                rasterized: 1,
                skipped: SkipTally::new(),
            },
            Err(e) => {
                log::warn!("Skipping feature {}: {}", idx, e);
                let mut skipped = SkipTally::new();
                skipped.record(SkipReason::InvalidGeometry);
                RasterizeOutcome {
                    cells: HashSet::new(),
                    rasterized: 0,
                    skipped,
                }
            }
        })
        .reduce(RasterizeOutcome::default, |mut a, b| {
            a.cells.extend(b.cells);
            a.rasterized += b.rasterized;
            a.skipped = a.skipped.merge(b.skipped);
            a
        });

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::HexCell;
    use geo::{BooleanOps, GeodesicArea};
    use geo_types::{MultiPolygon, polygon};

    fn ten_degree_box() -> Polygon<f64> {
        polygon![
            (x: 0.0, y: 0.0),
            (x: 10.0, y: 0.0),
            (x: 10.0, y: 10.0),
            (x: 0.0, y: 10.0),
            (x: 0.0, y: 0.0),
        ]
    }

    #[test]
    fn test_box_at_resolution_3_covers_area() -> Result<(), HexbinError> {
        let square = ten_degree_box();
        let cells = rasterize(&Geometry::Polygon(square.clone()), 3)?;

        assert!(!cells.is_empty());
        let covered_km2: f64 = cells.iter().map(|c| HexCell::from(*c).area_km2()).sum();
        let box_km2 = square.geodesic_area_unsigned() / 1_000_000.0;
        let ratio = covered_km2 / box_km2;
        assert!(ratio > 0.85 && ratio < 1.15, "coverage ratio {}", ratio);
        Ok(())
    }

    #[test]
    fn test_cell_centers_inside_polygon() -> Result<(), HexbinError> {
        use geo::Contains;

        let square = ten_degree_box();
        for cell in rasterize(&Geometry::Polygon(square.clone()), 3)? {
            let center = HexCell::from(cell).center;
            assert!(square.contains(&center) || square.exterior().contains(&center));
        }
        Ok(())
    }

    #[test]
    fn test_finer_resolution_never_fewer_cells() -> Result<(), HexbinError> {
        let geom = Geometry::Polygon(ten_degree_box());
        let mut previous = 0;
        for resolution in 1..=4 {
            let count = rasterize(&geom, resolution)?.len();
            assert!(count >= previous, "res {} gave {} < {}", resolution, count, previous);
            previous = count;
        }
        Ok(())
    }

    #[test]
    fn test_rasterize_is_idempotent() -> Result<(), HexbinError> {
        let geom = Geometry::Polygon(ten_degree_box());
        assert_eq!(rasterize(&geom, 3)?, rasterize(&geom, 3)?);
        Ok(())
    }

    #[test]
    fn test_hole_excludes_cells() -> Result<(), HexbinError> {
        let hole = LineString::from(vec![(3.0, 3.0), (7.0, 3.0), (7.0, 7.0), (3.0, 7.0), (3.0, 3.0)]);
        let with_hole = Polygon::new(ten_degree_box().exterior().clone(), vec![hole]);

        let full = rasterize(&Geometry::Polygon(ten_degree_box()), 4)?;
        let holed = rasterize(&Geometry::Polygon(with_hole), 4)?;
        assert!(holed.len() < full.len());

        let center_cell = HexCell::from_lat_lng(5.0, 5.0, 4)?;
        assert!(full.contains(&center_cell.id));
        assert!(!holed.contains(&center_cell.id));
        Ok(())
    }

    #[test]
    fn test_multipolygon_union_is_deduplicated() -> Result<(), HexbinError> {
        let left = polygon![(x: 0.0, y: 0.0), (x: 5.0, y: 0.0), (x: 5.0, y: 5.0), (x: 0.0, y: 5.0)];
        let right = polygon![(x: 5.0, y: 0.0), (x: 10.0, y: 0.0), (x: 10.0, y: 5.0), (x: 5.0, y: 5.0)];

        let left_cells = rasterize(&Geometry::Polygon(left.clone()), 3)?;
        let right_cells = rasterize(&Geometry::Polygon(right.clone()), 3)?;
        // Adjacent polygons give exclusive coverage.
        assert!(left_cells.is_disjoint(&right_cells));

        let both = rasterize(
            &Geometry::MultiPolygon(MultiPolygon::new(vec![left.clone(), right.clone()])),
            3,
        )?;
        assert_eq!(both.len(), left_cells.len() + right_cells.len());

        let merged = MultiPolygon::new(vec![left]).union(&MultiPolygon::new(vec![right]));
        let merged_cells = rasterize(&Geometry::MultiPolygon(merged), 3)?;
        assert_eq!(merged_cells, both);
        Ok(())
    }

    #[test]
    fn test_duplicate_vertices_are_stripped() -> Result<(), HexbinError> {
        let dup = LineString::from(vec![
            (0.0, 0.0),
            (0.0, 0.0),
            (10.0, 0.0),
            (10.0, 10.0),
            (10.0, 10.0),
            (0.0, 10.0),
            (0.0, 0.0),
        ]);
        let normalized = normalize_polygon(&Polygon::new(dup, vec![]))?;
        // 4 distinct vertices plus the closing one.
        assert_eq!(normalized.exterior().0.len(), 5);

        let a = rasterize(&Geometry::Polygon(normalized), 3)?;
        let b = rasterize(&Geometry::Polygon(ten_degree_box()), 3)?;
        assert_eq!(a, b);
        Ok(())
    }

    #[test]
    fn test_degenerate_polygon_rejected() {
        let line = Polygon::new(LineString::from(vec![(0.0, 0.0), (1.0, 1.0), (0.0, 0.0)]), vec![]);
        let result = rasterize(&Geometry::Polygon(line), 3);
        assert!(matches!(result, Err(HexbinError::InvalidGeometry(_))));
    }

    #[test]
    fn test_self_intersecting_polygon_rejected() {
        let bowtie = polygon![
            (x: 0.0, y: 0.0),
            (x: 10.0, y: 10.0),
            (x: 10.0, y: 0.0),
            (x: 0.0, y: 10.0),
        ];
        let result = rasterize(&Geometry::Polygon(bowtie), 3);
        assert!(matches!(result, Err(HexbinError::InvalidGeometry(_))));
    }

    #[test]
    fn test_point_geometry_rejected() {
        let result = rasterize(&Geometry::Point(geo_types::Point::new(1.0, 1.0)), 3);
        assert!(matches!(result, Err(HexbinError::InvalidGeometry(_))));
    }

    #[test]
    fn test_rasterize_all_skips_bad_features() -> Result<(), HexbinError> {
        let bowtie = polygon![
            (x: 0.0, y: 0.0),
            (x: 10.0, y: 10.0),
            (x: 10.0, y: 0.0),
            (x: 0.0, y: 10.0),
        ];
        let geometries = vec![
            Geometry::Polygon(ten_degree_box()),
            Geometry::Polygon(bowtie),
            Geometry::Polygon(ten_degree_box()),
        ];
        let outcome = rasterize_all(&geometries, 3)?;

        assert_eq!(outcome.rasterized, 2);
        assert_eq!(outcome.skipped.count(SkipReason::InvalidGeometry), 1);
        assert_eq!(outcome.cells, rasterize(&geometries[0], 3)?);
        Ok(())
    }

    #[test]
    fn test_rasterize_all_invalid_resolution() {
        let result = rasterize_all(&[Geometry::Polygon(ten_degree_box())], 16);
        assert!(matches!(result, Err(HexbinError::InvalidResolution(16))));
    }
}
