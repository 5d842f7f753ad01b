use crate::aggregate::{MetricDescription, MetricValue, YearRange};
use crate::boundary::CountryBounds;
use crate::cell::HexCell;
use geojson::{Feature, FeatureCollection, JsonObject, JsonValue};
use h3o::CellIndex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One finalized `(cell, time bucket)` row, ready to become a Feature.
#[derive(Debug, Clone, PartialEq)]
pub struct EmittedCell {
    pub cell: CellIndex,
    pub year: Option<i32>,
    pub metrics: BTreeMap<String, MetricValue>,
    /// Colour bucket, written as a top-level `color` property.
    pub color: Option<String>,
}

impl EmittedCell {
    pub fn new(cell: CellIndex, metrics: BTreeMap<String, MetricValue>) -> Self {
        Self {
            cell,
            year: None,
            metrics,
            color: None,
        }
    }

    pub fn year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    pub fn color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemporalRange {
    pub start: i32,
    pub end: i32,
    pub interval: Interval,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interval {
    Yearly,
}

impl From<YearRange> for TemporalRange {
    fn from(range: YearRange) -> Self {
        Self {
            start: range.start,
            end: range.end,
            interval: Interval::Yearly,
        }
    }
}

/// The `metadata` member of an output FeatureCollection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub dataset: String,
    /// Distinct cells, not features: a dense temporal output has
    /// `cell_count * year_count` features.
    pub cell_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year_count: Option<usize>,
    pub h3_resolution: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temporal_range: Option<TemporalRange>,
    pub metrics: BTreeMap<String, MetricDescription>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<CountryBounds>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<f64>,
}

impl Metadata {
    /// Reads the metadata member back from a FeatureCollection.
    pub fn from_collection(fc: &FeatureCollection) -> Option<Self> {
        let value = fc.foreign_members.as_ref()?.get("metadata")?;
        serde_json::from_value(value.clone()).ok()
    }
}

/// Builds the output FeatureCollection from finalized cells.
///
/// # Example
/// ```
/// use hexbin_rs::emit::FeatureEmitter;
///
/// let fc = FeatureEmitter::new("empty run", 3).emit(vec![]);
/// assert!(fc.features.is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct FeatureEmitter {
    metadata: Metadata,
}

impl FeatureEmitter {
    pub fn new(dataset: impl Into<String>, resolution: u8) -> Self {
        Self {
            metadata: Metadata {
                dataset: dataset.into(),
                cell_count: 0,
                year_count: None,
                h3_resolution: resolution,
                temporal_range: None,
                metrics: BTreeMap::new(),
                country: None,
                bounds: None,
                source_file: None,
                min_value: None,
                max_value: None,
            },
        }
    }

    pub fn metrics(mut self, metrics: BTreeMap<String, MetricDescription>) -> Self {
        self.metadata.metrics = metrics;
        self
    }

    pub fn temporal_range(mut self, range: YearRange) -> Self {
        self.metadata.temporal_range = Some(range.into());
        self.metadata.year_count = Some(range.year_count());
        self
    }

    pub fn country(mut self, country: impl Into<String>) -> Self {
        self.metadata.country = Some(country.into());
        self
    }

    pub fn bounds(mut self, bounds: CountryBounds) -> Self {
        self.metadata.bounds = Some(bounds);
        self
    }

    pub fn source_file(mut self, name: impl Into<String>) -> Self {
        self.metadata.source_file = Some(name.into());
        self
    }

    pub fn value_range(mut self, min: f64, max: f64) -> Self {
        self.metadata.min_value = Some(min);
        self.metadata.max_value = Some(max);
        self
    }

    /// Converts cells to Polygon features sorted by `(cell, year)`.
    ///
    /// Every feature geometry is the closed boundary ring of its cell. An
    /// empty input yields a valid, empty FeatureCollection.
    pub fn emit(&self, mut cells: Vec<EmittedCell>) -> FeatureCollection {
        cells.sort_by_key(|c| (c.cell, c.year));

        let distinct: BTreeSet<CellIndex> = cells.iter().map(|c| c.cell).collect();
        let mut metadata = self.metadata.clone();
        metadata.cell_count = distinct.len();

        let features: Vec<Feature> = cells.iter().map(to_feature).collect();
        log::info!(
            "Emitting {} features for {} cells at resolution {}",
            features.len(),
            metadata.cell_count,
            metadata.h3_resolution
        );

        let mut foreign_members = JsonObject::new();
        match serde_json::to_value(&metadata) {
            Ok(value) => {
                foreign_members.insert("metadata".to_string(), value);
            }
            Err(e) => log::warn!("Could not serialize metadata: {}", e),
        }

        FeatureCollection {
            bbox: None,
            features,
            foreign_members: Some(foreign_members),
        }
    }
}

fn to_feature(row: &EmittedCell) -> Feature {
    let cell = HexCell::from(row.cell);
    let geometry = geojson::Geometry::from(&cell.to_polygon());

    let mut properties = JsonObject::new();
    properties.insert("h3_index".to_string(), cell.to_id_string().into());
    if let Some(year) = row.year {
        properties.insert("year".to_string(), year.into());
        properties.insert("timestamp".to_string(), timestamp_for(year).into());
    }
    let metrics: JsonObject = row
        .metrics
        .iter()
        .map(|(k, v)| (k.clone(), v.to_json()))
        .collect();
    properties.insert("metrics".to_string(), JsonValue::Object(metrics));
    if let Some(color) = &row.color {
        properties.insert("color".to_string(), color.clone().into());
    }

    Feature {
        bbox: None,
        geometry: Some(geometry),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

/// Start-of-year timestamp, e.g. `2015-01-01T00:00:00`.
pub fn timestamp_for(year: i32) -> String {
    format!("{:04}-01-01T00:00:00", year)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HexbinError;
    use geojson::Value as GeoValue;

    fn metric(v: f64) -> BTreeMap<String, MetricValue> {
        BTreeMap::from([("value".to_string(), MetricValue::Number(v))])
    }

    #[test]
    fn test_empty_input_is_valid() -> Result<(), HexbinError> {
        let fc = FeatureEmitter::new("nothing", 5).emit(vec![]);
        let json: serde_json::Value = serde_json::to_value(&fc)
            .map_err(|e| HexbinError::IoError(e.to_string()))?;

        assert_eq!(json["type"], "FeatureCollection");
        assert_eq!(json["features"], serde_json::json!([]));
        assert_eq!(json["metadata"]["cell_count"], 0);
        assert_eq!(json["metadata"]["h3_resolution"], 5);
        Ok(())
    }

    #[test]
    fn test_feature_shape() -> Result<(), HexbinError> {
        let cell = HexCell::from_lat_lng(2.05, 45.32, 3)?;
        let fc = FeatureEmitter::new("test", 3)
            .emit(vec![EmittedCell::new(cell.id, metric(4.0)).year(2010).color("#ffd700")]);

        let feature = &fc.features[0];
        assert_eq!(
            feature.property("h3_index").and_then(|v| v.as_str()),
            Some(cell.to_id_string().as_str())
        );
        assert_eq!(feature.property("year"), Some(&JsonValue::from(2010)));
        assert_eq!(
            feature.property("timestamp").and_then(|v| v.as_str()),
            Some("2010-01-01T00:00:00")
        );
        assert_eq!(feature.property("metrics"), Some(&serde_json::json!({"value": 4})));
        assert_eq!(
            feature.property("color").and_then(|v| v.as_str()),
            Some("#ffd700")
        );

        match feature.geometry.as_ref().map(|g| &g.value) {
            Some(GeoValue::Polygon(rings)) => {
                assert_eq!(rings.len(), 1);
                assert_eq!(rings[0].first(), rings[0].last());
                assert_eq!(rings[0].len(), cell.boundary().len() + 1);
            }
            other => panic!("Expected Polygon, got {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_metadata_counts_distinct_cells() -> Result<(), HexbinError> {
        let a = HexCell::from_lat_lng(2.05, 45.32, 3)?.id;
        let b = HexCell::from_lat_lng(-13.96, 33.77, 3)?.id;
        let range = YearRange::new(2001, 2002)?;
        let rows = vec![
            EmittedCell::new(b, metric(1.0)).year(2002),
            EmittedCell::new(a, metric(1.0)).year(2001),
            EmittedCell::new(a, metric(1.0)).year(2002),
            EmittedCell::new(b, metric(1.0)).year(2001),
        ];
        let fc = FeatureEmitter::new("test", 3).temporal_range(range).emit(rows);

        let meta = Metadata::from_collection(&fc)
            .ok_or_else(|| HexbinError::IoError("metadata missing".to_string()))?;
        assert_eq!(meta.cell_count, 2);
        assert_eq!(meta.year_count, Some(2));
        assert_eq!(
            meta.temporal_range,
            Some(TemporalRange { start: 2001, end: 2002, interval: Interval::Yearly })
        );

        let keys: Vec<(String, i64)> = fc
            .features
            .iter()
            .filter_map(|f| {
                let id = f.property("h3_index")?.as_str()?.to_string();
                let year = f.property("year")?.as_i64()?;
                Some((id, year))
            })
            .collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys.len(), 4);
        assert_eq!(keys, sorted);
        Ok(())
    }

    #[test]
    fn test_interval_serializes_lowercase() -> Result<(), HexbinError> {
        let range: TemporalRange = YearRange::new(2001, 2015)?.into();
        let json = serde_json::to_value(range).map_err(|e| HexbinError::IoError(e.to_string()))?;
        assert_eq!(json["interval"], "yearly");
        Ok(())
    }
}
