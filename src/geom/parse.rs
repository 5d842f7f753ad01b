use crate::error::HexbinError;
use geo_types::{Geometry, MultiPolygon};
use geojson::{Feature, GeoJson};

/// Parses a GeoJSON geometry or feature string into a `geo_types::Geometry`.
pub fn parse_geometry(s: &str) -> Result<Geometry<f64>, HexbinError> {
    let geojson: GeoJson = s
        .trim()
        .parse()
        .map_err(|e: geojson::Error| HexbinError::GeometryParseError(e.to_string()))?;

    match geojson {
        GeoJson::Geometry(geom) => {
            Geometry::try_from(geom).map_err(|e| HexbinError::GeometryParseError(e.to_string()))
        }
        GeoJson::Feature(feat) => feature_geometry(&feat),
        GeoJson::FeatureCollection(_) => Err(HexbinError::GeometryParseError(
            "FeatureCollection not supported, use individual geometries".to_string(),
        )),
    }
}

/// Extracts the geometry of a GeoJSON feature.
pub fn feature_geometry(feature: &Feature) -> Result<Geometry<f64>, HexbinError> {
    let geom = feature
        .geometry
        .clone()
        .ok_or_else(|| HexbinError::GeometryParseError("Feature has no geometry".to_string()))?;
    Geometry::try_from(geom).map_err(|e| HexbinError::GeometryParseError(e.to_string()))
}

/// Collects the areal parts of a geometry into one `MultiPolygon`.
///
/// Points and lines contribute nothing; collections are flattened.
pub fn polygons_of(geom: &Geometry<f64>) -> MultiPolygon<f64> {
    let mut parts = Vec::new();
    collect_polygons(geom, &mut parts);
    MultiPolygon::new(parts)
}

fn collect_polygons(geom: &Geometry<f64>, out: &mut Vec<geo_types::Polygon<f64>>) {
    match geom {
        Geometry::Polygon(p) => out.push(p.clone()),
        Geometry::MultiPolygon(mp) => out.extend(mp.0.iter().cloned()),
        Geometry::Rect(r) => out.push(r.to_polygon()),
        Geometry::Triangle(t) => out.push(t.to_polygon()),
        Geometry::GeometryCollection(gc) => {
            for g in gc.0.iter() {
                collect_polygons(g, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_geojson_point() -> Result<(), HexbinError> {
        let json = r#"{"type":"Point","coordinates":[45.3,2.05]}"#;
        let geom = parse_geometry(json)?;
        match geom {
            Geometry::Point(pt) => {
                assert!((pt.x() - 45.3).abs() < 0.001);
                assert!((pt.y() - 2.05).abs() < 0.001);
            }
            _ => panic!("Expected Point"),
        }
        Ok(())
    }

    #[test]
    fn test_parse_geojson_feature() -> Result<(), HexbinError> {
        let json = r#"{"type":"Feature","properties":{},"geometry":{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,0]]]}}"#;
        let geom = parse_geometry(json)?;
        assert!(matches!(geom, Geometry::Polygon(_)));
        Ok(())
    }

    #[test]
    fn test_feature_without_geometry() {
        let json = r#"{"type":"Feature","properties":{},"geometry":null}"#;
        let result = parse_geometry(json);
        assert!(matches!(result, Err(HexbinError::GeometryParseError(_))));
    }

    #[test]
    fn test_feature_collection_rejected() {
        let json = r#"{"type":"FeatureCollection","features":[]}"#;
        assert!(parse_geometry(json).is_err());
    }

    #[test]
    fn test_polygons_of_collection() -> Result<(), HexbinError> {
        let json = r#"{"type":"GeometryCollection","geometries":[
            {"type":"Point","coordinates":[0,0]},
            {"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,0]]]},
            {"type":"MultiPolygon","coordinates":[[[[2,2],[3,2],[3,3],[2,2]]],[[[4,4],[5,4],[5,5],[4,4]]]]}
        ]}"#;
        let geom = parse_geometry(json)?;
        assert_eq!(polygons_of(&geom).0.len(), 3);
        Ok(())
    }
}
