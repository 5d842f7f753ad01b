mod reproject;

pub use reproject::Reprojector;

use crate::error::HexbinError;
use geo_types::Point;
use std::fmt;
use std::str::FromStr;

/// Trait for types that can provide x/y coordinates.
///
/// Implemented for `(f64, f64)` tuples and `geo_types::Point<f64>`.
/// This allows functions to accept either type.
pub trait Coordinate {
    /// Returns the x-coordinate (longitude or easting).
    fn x(&self) -> f64;
    /// Returns the y-coordinate (latitude or northing).
    fn y(&self) -> f64;
}

impl Coordinate for (f64, f64) {
    fn x(&self) -> f64 {
        self.0
    }
    fn y(&self) -> f64 {
        self.1
    }
}

impl Coordinate for Point<f64> {
    fn x(&self) -> f64 {
        Point::x(*self)
    }
    fn y(&self) -> f64 {
        Point::y(*self)
    }
}

/// Coordinate reference system of an input source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Crs {
    /// WGS84 (EPSG:4326) - longitude/latitude coordinates
    #[default]
    Wgs84,
    /// Any other EPSG-registered system, converted to WGS84 before grid lookup
    Epsg(u16),
}

impl Crs {
    pub fn from_epsg(code: u16) -> Self {
        if code == 4326 {
            Crs::Wgs84
        } else {
            Crs::Epsg(code)
        }
    }

    pub fn is_geographic(&self) -> bool {
        matches!(self, Crs::Wgs84)
    }

    pub fn code(&self) -> String {
        match self {
            Crs::Wgs84 => "EPSG:4326".to_string(),
            Crs::Epsg(code) => format!("EPSG:{}", code),
        }
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code())
    }
}

impl FromStr for Crs {
    type Err = HexbinError;

    /// Accepts `EPSG:nnnn` (any case), a bare EPSG number, or the OGC CRS84 URN.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("urn:ogc:def:crs:OGC:1.3:CRS84")
            || trimmed.eq_ignore_ascii_case("CRS84")
        {
            return Ok(Crs::Wgs84);
        }

        let digits = trimmed
            .rsplit(':')
            .next()
            .unwrap_or(trimmed)
            .trim();
        digits
            .parse::<u16>()
            .map(Crs::from_epsg)
            .map_err(|_| HexbinError::UnsupportedCrs(trimmed.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinate_trait_tuple() {
        let tuple = (100.0, 200.0);
        assert_eq!(tuple.x(), 100.0);
        assert_eq!(tuple.y(), 200.0);
    }

    #[test]
    fn test_coordinate_trait_point() {
        let point = Point::new(100.0, 200.0);
        assert_eq!(point.x(), 100.0);
        assert_eq!(point.y(), 200.0);
    }

    #[test]
    fn test_crs_parse() -> Result<(), HexbinError> {
        assert_eq!("EPSG:4326".parse::<Crs>()?, Crs::Wgs84);
        assert_eq!("epsg:3857".parse::<Crs>()?, Crs::Epsg(3857));
        assert_eq!("32638".parse::<Crs>()?, Crs::Epsg(32638));
        assert_eq!("urn:ogc:def:crs:EPSG::4326".parse::<Crs>()?, Crs::Wgs84);
        assert_eq!("urn:ogc:def:crs:OGC:1.3:CRS84".parse::<Crs>()?, Crs::Wgs84);
        assert!(matches!(
            "not-a-crs".parse::<Crs>(),
            Err(HexbinError::UnsupportedCrs(_))
        ));
        Ok(())
    }

    #[test]
    fn test_crs_default_and_code() {
        assert_eq!(Crs::default(), Crs::Wgs84);
        assert!(Crs::Wgs84.is_geographic());
        assert_eq!(Crs::Epsg(3857).code(), "EPSG:3857");
    }
}
