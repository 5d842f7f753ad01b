use crate::error::HexbinError;
use crate::geom::{feature_geometry, polygons_of};
use crate::io::read_feature_collection;
use geo::{BooleanOps, Intersects};
use geo_types::{Geometry, MultiPolygon, Point};
use geojson::FeatureCollection;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

/// Directory the built-in boundary entries are resolved against.
pub const DEFAULT_BOUNDARY_DIR: &str = "data";

/// Maps region names to administrative boundary GeoJSON files.
///
/// Names are matched case-insensitively. Relative paths are resolved
/// against the registry's base directory.
#[derive(Debug, Clone)]
pub struct BoundaryRegistry {
    base_dir: PathBuf,
    entries: BTreeMap<String, PathBuf>,
}

impl Default for BoundaryRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_BOUNDARY_DIR)
    }
}

impl BoundaryRegistry {
    /// Registry with the built-in entries, resolved under `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self::empty(base_dir).register(
            "somalia",
            "geoBoundaries-SOM-ADM2-all/geoBoundaries-SOM-ADM2.geojson",
        )
    }

    pub fn empty(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            entries: BTreeMap::new(),
        }
    }

    pub fn register(mut self, name: &str, path: impl Into<PathBuf>) -> Self {
        self.entries.insert(name.trim().to_lowercase(), path.into());
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Resolves a region name to its boundary file path.
    pub fn path_for(&self, name: &str) -> Result<PathBuf, HexbinError> {
        let key = name.trim().to_lowercase();
        let path = self
            .entries
            .get(&key)
            .ok_or_else(|| HexbinError::BoundaryNotFound(name.to_string()))?;
        if path.is_absolute() {
            Ok(path.clone())
        } else {
            Ok(self.base_dir.join(path))
        }
    }

    /// Loads and dissolves the boundary registered under `name`.
    pub fn load(&self, name: &str) -> Result<Region, HexbinError> {
        let path = self.path_for(name)?;
        load_boundary(name, &path)
    }
}

/// A named region with its dissolved boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    pub name: String,
    pub geometry: MultiPolygon<f64>,
}

impl Region {
    pub fn new(name: impl Into<String>, geometry: MultiPolygon<f64>) -> Self {
        Self {
            name: name.into(),
            geometry,
        }
    }

    /// Boundary touching counts as intersecting.
    pub fn intersects(&self, geom: &Geometry<f64>) -> bool {
        geom.intersects(&self.geometry)
    }

    /// Points on the boundary count as inside.
    pub fn contains_point(&self, lat: f64, lon: f64) -> bool {
        self.geometry.intersects(&Point::new(lon, lat))
    }

    /// Clips a geometry to the region, returning `None` when nothing remains.
    pub fn clip(&self, geom: &Geometry<f64>) -> Option<MultiPolygon<f64>> {
        let clipped = polygons_of(geom).intersection(&self.geometry);
        if clipped.0.is_empty() {
            None
        } else {
            Some(clipped)
        }
    }
}

/// Loads an administrative boundary FeatureCollection and unions all of
/// its sub-regions into one region geometry.
///
/// Fails with `BoundaryDataMissing` when the file is absent, unparseable or
/// holds no polygonal features.
pub fn load_boundary(name: &str, path: impl AsRef<Path>) -> Result<Region, HexbinError> {
    let path = path.as_ref();
    let fc = read_feature_collection(path).map_err(|e| {
        HexbinError::BoundaryDataMissing(format!("{} ({}): {}", name, path.display(), e))
    })?;

    let mut parts = 0usize;
    let mut dissolved = MultiPolygon::new(vec![]);
    for (idx, feature) in fc.features.iter().enumerate() {
        let geom = match feature_geometry(feature) {
            Ok(g) => g,
            Err(e) => {
                log::warn!("Boundary {} feature {} has no usable geometry: {}", name, idx, e);
                continue;
            }
        };
        let polys = polygons_of(&geom);
        if polys.0.is_empty() {
            continue;
        }
        dissolved = dissolved.union(&polys);
        parts += 1;
    }

    if dissolved.0.is_empty() {
        return Err(HexbinError::BoundaryDataMissing(format!(
            "{} ({}): no polygon features",
            name,
            path.display()
        )));
    }
    log::info!(
        "Loaded boundary for {}: {} sub-regions dissolved into {} polygons",
        name,
        parts,
        dissolved.0.len()
    );
    Ok(Region::new(name, dissolved))
}

/// Keeps only the features whose geometry intersects the region.
///
/// Features without a parseable geometry are dropped. When the collection
/// carries a `metadata` member, its `cell_count` is updated to the number of
/// distinct `h3_index` values retained (or the feature count when features
/// carry no index) and `country` is set to the region name.
pub fn filter_features(fc: &FeatureCollection, region: &Region) -> FeatureCollection {
    let features: Vec<_> = fc
        .features
        .iter()
        .filter(|f| match feature_geometry(f) {
            Ok(geom) => region.intersects(&geom),
            Err(_) => false,
        })
        .cloned()
        .collect();

    let mut out = fc.clone();
    if let Some(meta) = out
        .foreign_members
        .as_mut()
        .and_then(|m| m.get_mut("metadata"))
        .and_then(|m| m.as_object_mut())
    {
        let indexed: HashSet<&str> = features
            .iter()
            .filter_map(|f| f.property("h3_index").and_then(|v| v.as_str()))
            .collect();
        let count = if indexed.is_empty() {
            features.len()
        } else {
            indexed.len()
        };
        meta.insert("cell_count".to_string(), count.into());
        meta.insert("country".to_string(), region.name.clone().into());
    }

    log::info!(
        "Filtered {} features to {} intersecting {}",
        fc.features.len(),
        features.len(),
        region.name
    );
    out.features = features;
    out
}

/// Approximate geographic bounding box of a country.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CountryBounds {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
}

impl CountryBounds {
    /// Looks up the built-in bounding box for a country (case-insensitive).
    pub fn for_country(name: &str) -> Option<Self> {
        let b = |lat_min, lat_max, lon_min, lon_max| CountryBounds {
            lat_min,
            lat_max,
            lon_min,
            lon_max,
        };
        match name.trim().to_lowercase().as_str() {
            "malawi" => Some(b(-17.0, -9.5, 32.0, 36.0)),
            "panama" => Some(b(7.0, 10.0, -83.0, -77.0)),
            "ethiopia" => Some(b(3.0, 15.0, 33.0, 48.0)),
            "libya" => Some(b(19.5, 33.0, 10.0, 25.0)),
            "somalia" => Some(b(-1.5, 12.0, 41.0, 51.5)),
            _ => None,
        }
    }

    /// Inclusive on every edge.
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        (self.lat_min..=self.lat_max).contains(&lat) && (self.lon_min..=self.lon_max).contains(&lon)
    }
}
