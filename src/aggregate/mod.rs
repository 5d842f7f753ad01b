//! Per-cell folding of records into metrics.
//!
//! [`CellBucket`] holds the running accumulators for one key.
//! [`TemporalAggregator`] buckets located events by `(cell, year)` and
//! [`aggregate_polygons`] overlays attributed polygons onto the grid.

mod bucket;
mod overlay;
mod rules;
mod temporal;

pub use bucket::CellBucket;
pub use overlay::{OverlayAggregate, PolygonFeature, PolygonSchema, aggregate_polygons};
pub use rules::{
    Aggregation, FieldSource, MetricDescription, MetricRule, MetricValue, describe_rules,
};
pub use temporal::{
    Event, EventFilter, EventSchema, TemporalAggregate, TemporalAggregator, YearRange,
};
