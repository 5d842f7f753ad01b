use crate::coord::{Coordinate, Reprojector};
use crate::error::HexbinError;
use crate::index::{boundary_from_cell, cell_from_point, format_cell_id, parse_cell_id, point_from_cell};
use geo_types::{Coord, LineString, Point, Polygon};
use h3o::CellIndex;

/// A single hexagonal (or pentagonal) cell of the global H3 grid.
///
/// Each `HexCell` holds the grid identifier, the cell center in WGS84
/// longitude/latitude and the resolution it belongs to.
///
/// # Example
///
/// ```
/// use hexbin_rs::HexCell;
///
/// # fn main() -> Result<(), hexbin_rs::HexbinError> {
/// // Create from WGS84 longitude/latitude
/// let cell = HexCell::from_wgs84(&(45.32, 2.05), 5)?;
/// println!("Cell ID: {}", cell.to_id_string());
/// println!("Center: ({}, {})", cell.lon(), cell.lat());
///
/// // Closed polygon ring ready for GeoJSON export
/// let polygon = cell.to_polygon();
/// assert_eq!(polygon.exterior().0.first(), polygon.exterior().0.last());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HexCell {
    /// Grid identifier
    pub id: CellIndex,
    /// Center point in WGS84 (x = longitude, y = latitude)
    pub center: Point<f64>,
    /// Resolution (0-15), where higher values mean smaller cells
    pub resolution: u8,
}

impl HexCell {
    /// Wrap an existing grid index.
    pub fn from_index(id: CellIndex) -> Self {
        let (lat, lon) = point_from_cell(id);
        Self {
            id,
            center: Point::new(lon, lat),
            resolution: u8::from(id.resolution()),
        }
    }

    /// Create a HexCell from its hexadecimal identifier.
    ///
    /// # Example
    /// ```
    /// use hexbin_rs::HexCell;
    ///
    /// # fn main() -> Result<(), hexbin_rs::HexbinError> {
    /// let cell = HexCell::from_wgs84(&(38.74, 9.03), 6)?;
    /// let restored = HexCell::from_hex_id(&cell.to_id_string())?;
    /// assert_eq!(cell.id, restored.id);
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_hex_id(id: &str) -> Result<Self, HexbinError> {
        parse_cell_id(id).map(Self::from_index)
    }

    /// Create a HexCell from a latitude/longitude pair.
    pub fn from_lat_lng(lat: f64, lon: f64, resolution: u8) -> Result<Self, HexbinError> {
        cell_from_point(lat, lon, resolution).map(Self::from_index)
    }

    /// Create a HexCell from WGS84 coordinates (x = longitude, y = latitude).
    pub fn from_wgs84(coord: &impl Coordinate, resolution: u8) -> Result<Self, HexbinError> {
        Self::from_lat_lng(coord.y(), coord.x(), resolution)
    }

    /// Create a HexCell from coordinates in the reprojector's source CRS.
    pub fn from_projected(
        coord: &impl Coordinate,
        reprojector: &Reprojector,
        resolution: u8,
    ) -> Result<Self, HexbinError> {
        let (lon, lat) = reprojector.to_wgs84(coord)?;
        Self::from_lat_lng(lat, lon, resolution)
    }

    pub fn lat(&self) -> f64 {
        self.center.y()
    }

    pub fn lon(&self) -> f64 {
        self.center.x()
    }

    pub fn to_id_string(&self) -> String {
        format_cell_id(self.id)
    }

    pub fn is_pentagon(&self) -> bool {
        self.id.is_pentagon()
    }

    /// Boundary vertices as `(lat, lon)`, open (no repeated vertex).
    pub fn boundary(&self) -> Vec<(f64, f64)> {
        boundary_from_cell(self.id)
    }

    /// Boundary as a closed `(lon, lat)` ring: the first vertex is repeated last.
    pub fn to_ring(&self) -> Vec<Coord<f64>> {
        let mut ring: Vec<Coord<f64>> = self
            .boundary()
            .into_iter()
            .map(|(lat, lon)| Coord { x: lon, y: lat })
            .collect();
        if let Some(first) = ring.first().copied() {
            ring.push(first);
        }
        ring
    }

    /// Converts this cell to a polygon.
    ///
    /// Returns a `geo_types::Polygon` in WGS84 longitude/latitude,
    /// suitable for spatial operations or GeoJSON export.
    pub fn to_polygon(&self) -> Polygon<f64> {
        Polygon::new(LineString::from(self.to_ring()), vec![])
    }

    /// Exact cell area in square kilometres.
    pub fn area_km2(&self) -> f64 {
        self.id.area_km2()
    }
}

impl From<CellIndex> for HexCell {
    fn from(id: CellIndex) -> Self {
        Self::from_index(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::Crs;

    #[test]
    fn test_from_wgs84_tuple() -> Result<(), HexbinError> {
        let cell = HexCell::from_wgs84(&(45.32, 2.05), 5)?;

        assert_eq!(cell.resolution, 5);
        assert!(!cell.to_id_string().is_empty());
        // Should be Mogadishu area
        assert!((cell.lon() - 45.32).abs() < 0.2);
        assert!((cell.lat() - 2.05).abs() < 0.2);
        Ok(())
    }

    #[test]
    fn test_tuple_and_point_same_result() -> Result<(), HexbinError> {
        let from_tuple = HexCell::from_wgs84(&(45.32, 2.05), 7)?;
        let from_point = HexCell::from_wgs84(&Point::new(45.32, 2.05), 7)?;
        assert_eq!(from_tuple.id, from_point.id);
        Ok(())
    }

    #[test]
    fn test_same_point_same_cell() -> Result<(), HexbinError> {
        let cell1 = HexCell::from_lat_lng(2.05, 45.32, 6)?;
        let cell2 = HexCell::from_lat_lng(2.05, 45.32, 6)?;
        assert_eq!(cell1.id, cell2.id);

        // The center itself maps back to the same cell
        let cell3 = HexCell::from_lat_lng(cell1.lat(), cell1.lon(), 6)?;
        assert_eq!(cell1.id, cell3.id);
        Ok(())
    }

    #[test]
    fn test_ring_is_closed() -> Result<(), HexbinError> {
        let cell = HexCell::from_lat_lng(-13.96, 33.77, 4)?;
        let ring = cell.to_ring();

        assert_eq!(ring.len(), cell.boundary().len() + 1);
        assert_eq!(ring.first(), ring.last());

        let polygon = cell.to_polygon();
        assert_eq!(polygon.exterior().coords().count(), ring.len());
        Ok(())
    }

    #[test]
    fn test_from_hex_id_invalid() {
        assert!(matches!(
            HexCell::from_hex_id("zzz"),
            Err(HexbinError::InvalidCellId(_))
        ));
    }

    #[test]
    fn test_from_projected() -> Result<(), HexbinError> {
        let reprojector = Reprojector::new(Crs::Epsg(3857))?;
        let projected = HexCell::from_projected(&(5_044_999.32, 228_253.66), &reprojector, 5)?;
        let direct = HexCell::from_lat_lng(2.05, 45.32, 5)?;
        assert_eq!(projected.id, direct.id);
        Ok(())
    }

    #[test]
    fn test_area_positive() -> Result<(), HexbinError> {
        let cell = HexCell::from_lat_lng(9.03, 38.74, 3)?;
        assert!(cell.area_km2() > 10_000.0 && cell.area_km2() < 15_000.0);
        Ok(())
    }
}
