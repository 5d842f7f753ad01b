use crate::aggregate::bucket::CellBucket;
use crate::aggregate::rules::{
    Aggregation, FieldSource, MetricDescription, MetricRule, MetricValue, describe_rules,
};
use crate::boundary::{CountryBounds, Region};
use crate::emit::EmittedCell;
use crate::error::HexbinError;
use crate::index::{to_resolution, validate_lat_lon};
use crate::skip::{SkipReason, SkipTally};
use h3o::{CellIndex, Resolution};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Inclusive range of calendar years.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearRange {
    pub start: i32,
    pub end: i32,
}

impl YearRange {
    pub fn new(start: i32, end: i32) -> Result<Self, HexbinError> {
        if start > end {
            return Err(HexbinError::InvalidYearRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, year: i32) -> bool {
        (self.start..=self.end).contains(&year)
    }

    pub fn years(&self) -> impl Iterator<Item = i32> {
        self.start..=self.end
    }

    pub fn year_count(&self) -> usize {
        (i64::from(self.end) - i64::from(self.start) + 1) as usize
    }
}

impl Default for YearRange {
    /// 2001 to 2015, the span of the bundled event and desertification datasets.
    fn default() -> Self {
        Self {
            start: 2001,
            end: 2015,
        }
    }
}

/// One record of a tabular event log.
///
/// Numeric fields that were null or missing in the source are simply absent
/// from `numbers`, which sums treat as zero.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Event {
    pub lat: f64,
    pub lon: f64,
    pub year: i32,
    pub numbers: HashMap<String, f64>,
    pub labels: HashMap<String, String>,
}

impl Event {
    pub fn new(lat: f64, lon: f64, year: i32) -> Self {
        Self {
            lat,
            lon,
            year,
            ..Default::default()
        }
    }

    pub fn with_number(mut self, column: impl Into<String>, value: f64) -> Self {
        self.numbers.insert(column.into(), value);
        self
    }

    pub fn with_label(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(column.into(), value.into());
        self
    }
}

impl FieldSource for Event {
    fn number(&self, column: &str) -> Option<f64> {
        self.numbers.get(column).copied()
    }

    fn text(&self, column: &str) -> Option<String> {
        self.labels.get(column).cloned()
    }
}

/// Column layout and metric rules of an event log.
#[derive(Debug, Clone, PartialEq)]
pub struct EventSchema {
    pub dataset: String,
    pub lat_column: String,
    pub lon_column: String,
    pub date_column: String,
    pub rules: Vec<MetricRule>,
}

impl EventSchema {
    pub fn new(
        dataset: impl Into<String>,
        lat_column: impl Into<String>,
        lon_column: impl Into<String>,
        date_column: impl Into<String>,
    ) -> Self {
        Self {
            dataset: dataset.into(),
            lat_column: lat_column.into(),
            lon_column: lon_column.into(),
            date_column: date_column.into(),
            rules: Vec::new(),
        }
    }

    pub fn rule(mut self, rule: MetricRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// UCDP Georeferenced Event Dataset layout.
    ///
    /// # Example
    /// ```
    /// use hexbin_rs::aggregate::EventSchema;
    ///
    /// let schema = EventSchema::ged();
    /// assert_eq!(schema.date_column, "date_start");
    /// assert!(schema.rules.iter().any(|r| r.key == "deaths_military"));
    /// ```
    pub fn ged() -> Self {
        let count = |name: &str, description: &str| {
            Some(MetricDescription::new(name, description).unit("count"))
        };
        let mut schema = Self::new(
            "UCDP Georeferenced Event Dataset",
            "latitude",
            "longitude",
            "date_start",
        )
        .rule(MetricRule::new("incident_count", Aggregation::Count))
        .rule(MetricRule::new("deaths_total", Aggregation::sum("best")))
        .rule(MetricRule::new("deaths_civilians", Aggregation::sum("deaths_civilians")))
        .rule(MetricRule::new(
            "deaths_military",
            Aggregation::sum_of(["deaths_a", "deaths_b"]),
        ))
        .rule(MetricRule::new("countries", Aggregation::union("country")))
        .rule(MetricRule::new(
            "types_of_violence",
            Aggregation::union("type_of_violence"),
        ));

        let descriptions = [
            count("Incident Count", "Number of conflict events"),
            count("Total Deaths", "Total number of deaths"),
            count("Civilian Deaths", "Number of civilian deaths"),
            count(
                "Military Deaths",
                "Number of military deaths (side A + side B)",
            ),
            Some(MetricDescription::new(
                "Countries",
                "Distinct countries where events occurred",
            )),
            Some(MetricDescription::new(
                "Types of Violence",
                "Distinct UCDP violence type codes observed",
            )),
        ];
        for (rule, description) in schema.rules.iter_mut().zip(descriptions) {
            rule.description = description;
        }
        schema
    }

    /// Columns to parse as numbers when reading records.
    pub fn numeric_columns(&self) -> BTreeSet<&str> {
        self.rules
            .iter()
            .flat_map(|r| r.aggregation.numeric_columns())
            .collect()
    }

    /// Columns to keep as categorical labels when reading records.
    pub fn label_columns(&self) -> BTreeSet<&str> {
        self.rules
            .iter()
            .flat_map(|r| r.aggregation.label_columns())
            .collect()
    }

    pub fn descriptions(&self) -> BTreeMap<String, MetricDescription> {
        describe_rules(&self.rules)
    }
}

/// Restricts which events take part in an aggregation.
#[derive(Debug, Clone, PartialEq)]
pub enum EventFilter {
    /// Keep events whose categorical `column` equals `value`.
    Column { column: String, value: String },
    /// Keep events inside a latitude/longitude box.
    Bounds(CountryBounds),
    /// Keep events inside a loaded region boundary.
    Region(Region),
}

impl EventFilter {
    pub fn column(column: impl Into<String>, value: impl Into<String>) -> Self {
        EventFilter::Column {
            column: column.into(),
            value: value.into(),
        }
    }

    /// Label column the reader must keep for this filter to work.
    pub fn label_column(&self) -> Option<&str> {
        match self {
            EventFilter::Column { column, .. } => Some(column),
            _ => None,
        }
    }

    pub fn accepts(&self, event: &Event) -> bool {
        match self {
            EventFilter::Column { column, value } => {
                event.labels.get(column).is_some_and(|v| v == value)
            }
            EventFilter::Bounds(bounds) => bounds.contains(event.lat, event.lon),
            EventFilter::Region(region) => region.contains_point(event.lat, event.lon),
        }
    }
}

/// Buckets events into `(cell, year)` keys and folds their fields.
///
/// # Example
/// ```
/// use hexbin_rs::aggregate::{Event, EventSchema, TemporalAggregator, YearRange};
///
/// # fn main() -> Result<(), hexbin_rs::HexbinError> {
/// let schema = EventSchema::ged();
/// let mut aggregator = TemporalAggregator::new(&schema.rules, 3)?
///     .years(YearRange::new(2010, 2012)?);
///
/// let event = Event::new(2.05, 45.32, 2011).with_number("best", 4.0);
/// aggregator.add(&event).ok();
///
/// let result = aggregator.finish();
/// // Dense output: one row per year of the range.
/// assert_eq!(result.into_cells().len(), 3);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct TemporalAggregator {
    rules: Vec<MetricRule>,
    resolution: Resolution,
    years: Option<YearRange>,
    filter: Option<EventFilter>,
    buckets: BTreeMap<(CellIndex, i32), CellBucket>,
    skipped: SkipTally,
    folded: usize,
}

impl TemporalAggregator {
    pub fn new(rules: &[MetricRule], resolution: u8) -> Result<Self, HexbinError> {
        Ok(Self {
            rules: rules.to_vec(),
            resolution: to_resolution(resolution)?,
            years: None,
            filter: None,
            buckets: BTreeMap::new(),
            skipped: SkipTally::new(),
            folded: 0,
        })
    }

    /// Restricts events to `range` and makes the output dense over it.
    pub fn years(mut self, range: YearRange) -> Self {
        self.years = Some(range);
        self
    }

    pub fn filter(mut self, filter: EventFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Counts a record the caller could not turn into an `Event`.
    pub fn skip(&mut self, reason: SkipReason) {
        self.skipped.record(reason);
    }

    /// Folds one event into its `(cell, year)` bucket.
    ///
    /// Returns the cell the event landed in, or the reason it was skipped.
    /// Skips are tallied either way.
    pub fn add(&mut self, event: &Event) -> Result<CellIndex, SkipReason> {
        let result = self.locate(event);
        match result {
            Ok(cell) => {
                let rules = &self.rules;
                self.buckets
                    .entry((cell, event.year))
                    .or_insert_with(|| CellBucket::new(rules))
                    .fold(rules, event, 0.0);
                self.folded += 1;
            }
            Err(reason) => self.skipped.record(reason),
        }
        result
    }

    fn locate(&self, event: &Event) -> Result<CellIndex, SkipReason> {
        let ll =
            validate_lat_lon(event.lat, event.lon).map_err(|_| SkipReason::InvalidCoordinate)?;
        if self.years.is_some_and(|r| !r.contains(event.year)) {
            return Err(SkipReason::OutsideYearRange);
        }
        if self.filter.as_ref().is_some_and(|f| !f.accepts(event)) {
            return Err(SkipReason::OutsideRegion);
        }
        Ok(ll.to_cell(self.resolution))
    }

    pub fn finish(self) -> TemporalAggregate {
        TemporalAggregate {
            rules: self.rules,
            years: self.years,
            buckets: self.buckets,
            skipped: self.skipped,
            folded: self.folded,
        }
    }
}

/// Folded buckets of one temporal aggregation pass.
#[derive(Debug, Clone)]
pub struct TemporalAggregate {
    pub rules: Vec<MetricRule>,
    pub years: Option<YearRange>,
    pub buckets: BTreeMap<(CellIndex, i32), CellBucket>,
    pub skipped: SkipTally,
    /// Number of events folded into a bucket.
    pub folded: usize,
}

impl TemporalAggregate {
    /// Distinct cells that received at least one event.
    pub fn cells(&self) -> BTreeSet<CellIndex> {
        self.buckets.keys().map(|(cell, _)| *cell).collect()
    }

    /// Finalizes every bucket in ascending `(cell, year)` order.
    ///
    /// With a year range, every active cell gets one row per year of the
    /// range, years without events carrying empty defaults. Without one,
    /// only observed `(cell, year)` keys are emitted.
    pub fn into_cells(self) -> Vec<EmittedCell> {
        let rules = &self.rules;
        let Some(range) = self.years else {
            return self
                .buckets
                .iter()
                .map(|(&(cell, year), bucket)| {
                    EmittedCell::new(cell, bucket.finalize(rules)).year(year)
                })
                .collect();
        };

        let empty = CellBucket::new(rules).finalize(rules);
        let mut out = Vec::with_capacity(self.cells().len() * range.year_count());
        for cell in self.cells() {
            for year in range.years() {
                let metrics: BTreeMap<String, MetricValue> = match self.buckets.get(&(cell, year)) {
                    Some(bucket) => bucket.finalize(rules),
                    None => empty.clone(),
                };
                out.push(EmittedCell::new(cell, metrics).year(year));
            }
        }
        out
    }
}
