use crate::aggregate::{
    EventFilter, EventSchema, MetricDescription, MetricValue, PolygonFeature, PolygonSchema,
    TemporalAggregate, TemporalAggregator, YearRange, aggregate_polygons,
};
use crate::boundary::{BoundaryRegistry, CountryBounds, Region, filter_features};
use crate::coord::{Crs, Reprojector};
use crate::emit::{EmittedCell, FeatureEmitter};
use crate::error::HexbinError;
use crate::geom::{feature_geometry, normalize_polygon, polygons_of, rasterize_all};
use crate::index::{
    DEFAULT_COARSE_RESOLUTION, DEFAULT_RASTER_RESOLUTION, parse_cell_id, to_resolution,
};
use crate::io::{
    EventReader, output_path_for_region, read_feature_collection, read_geotiff,
    write_feature_collection,
};
use crate::raster::{BinMode, BinnedRaster, bin};
use crate::skip::{SkipReason, SkipTally};
use geo_types::Geometry;
use geojson::FeatureCollection;
use h3o::CellIndex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Outcome of one conversion run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    /// Files written.
    pub outputs: Vec<PathBuf>,
    pub features: usize,
    pub cells: usize,
    pub skipped: SkipTally,
    /// Inputs that failed in directory mode.
    pub failed: Vec<PathBuf>,
}

impl RunSummary {
    fn single(output: PathBuf, fc: &FeatureCollection, cells: usize, skipped: SkipTally) -> Self {
        Self {
            outputs: vec![output],
            features: fc.features.len(),
            cells,
            skipped,
            failed: Vec::new(),
        }
    }

    fn merge(mut self, other: RunSummary) -> Self {
        self.outputs.extend(other.outputs);
        self.features += other.features;
        self.cells += other.cells;
        self.skipped = self.skipped.merge(other.skipped);
        self.failed.extend(other.failed);
        self
    }
}

/// Configuration for converting a polygon GeoJSON FeatureCollection.
#[derive(Debug, Clone)]
pub struct PolygonHexConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub resolution: u8,
    pub crs: Crs,
    /// Overlay rules; `None` emits bare coverage cells without metrics.
    pub schema: Option<PolygonSchema>,
    /// Region each feature is clipped to before rasterization.
    pub region: Option<String>,
}

impl PolygonHexConfig {
    /// # Example
    /// ```
    /// use hexbin_rs::aggregate::PolygonSchema;
    /// use hexbin_rs::pipeline::PolygonHexConfig;
    ///
    /// let config = PolygonHexConfig::new("deserts.geojson", "out/deserts_h3.geojson")
    ///     .resolution(4)
    ///     .schema(PolygonSchema::desertification())
    ///     .region("Somalia");
    /// assert_eq!(config.resolution, 4);
    /// ```
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            resolution: DEFAULT_COARSE_RESOLUTION,
            crs: Crs::default(),
            schema: Some(PolygonSchema::coverage()),
            region: None,
        }
    }

    pub fn resolution(mut self, resolution: u8) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn crs(mut self, crs: Crs) -> Self {
        self.crs = crs;
        self
    }

    pub fn schema(mut self, schema: PolygonSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn cells_only(mut self) -> Self {
        self.schema = None;
        self
    }

    pub fn region(mut self, name: impl Into<String>) -> Self {
        self.region = Some(name.into());
        self
    }
}

/// Configuration for binning a GeoTIFF, or every GeoTIFF in a directory.
#[derive(Debug, Clone)]
pub struct RasterHexConfig {
    /// A `.tif` file, or a directory whose `*.tif`/`*.tiff` files are all converted.
    pub input: PathBuf,
    /// Output file, or output directory in directory mode.
    pub output: PathBuf,
    pub resolution: u8,
    pub mode: BinMode,
    pub metric: String,
    pub description: MetricDescription,
    /// Stamps every feature with this year.
    pub year: Option<i32>,
    /// Dataset name for the metadata block; defaults to the file name.
    pub dataset: Option<String>,
    /// Keeps only cells intersecting this region.
    pub region: Option<String>,
}

impl RasterHexConfig {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            resolution: DEFAULT_RASTER_RESOLUTION,
            mode: BinMode::Mean,
            metric: "value".to_string(),
            description: MetricDescription::new("Value", "Mean raster value in the cell"),
            year: None,
            dataset: None,
            region: None,
        }
    }

    pub fn resolution(mut self, resolution: u8) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn mode(mut self, mode: BinMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn metric(mut self, key: impl Into<String>, description: MetricDescription) -> Self {
        self.metric = key.into();
        self.description = description;
        self
    }

    pub fn year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    pub fn dataset(mut self, name: impl Into<String>) -> Self {
        self.dataset = Some(name.into());
        self
    }

    pub fn region(mut self, name: impl Into<String>) -> Self {
        self.region = Some(name.into());
        self
    }
}

/// How a country restriction is applied to an event log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CountryFilter {
    /// `country` column equality, falling back to the built-in box when no
    /// event matches and the country has one.
    Auto,
    /// Categorical column equal to the country name.
    Column(String),
    /// Built-in latitude/longitude box.
    Bounds,
    /// Registered administrative boundary.
    Boundary,
}

/// Configuration for aggregating a tabular event log.
#[derive(Debug, Clone)]
pub struct EventHexConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub resolution: u8,
    pub schema: EventSchema,
    /// Restricts events to the range and makes the output dense over it.
    pub years: Option<YearRange>,
    pub country: Option<(String, CountryFilter)>,
}

impl EventHexConfig {
    /// # Example
    /// ```
    /// use hexbin_rs::pipeline::{CountryFilter, EventHexConfig};
    ///
    /// let config = EventHexConfig::new("GEDEvent_v24_1.csv", "out/ged_h3.geojson")
    ///     .country_by("Malawi", CountryFilter::Bounds);
    /// assert!(config.years.is_some());
    /// ```
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            resolution: DEFAULT_COARSE_RESOLUTION,
            schema: EventSchema::ged(),
            years: Some(YearRange::default()),
            country: None,
        }
    }

    pub fn resolution(mut self, resolution: u8) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn schema(mut self, schema: EventSchema) -> Self {
        self.schema = schema;
        self
    }

    pub fn years(mut self, years: YearRange) -> Self {
        self.years = Some(years);
        self
    }

    /// Emits only observed `(cell, year)` keys.
    pub fn sparse(mut self) -> Self {
        self.years = None;
        self
    }

    /// Keeps events whose `country` column equals `name`, or those inside
    /// the country's bounding box when the column matches nothing.
    pub fn country(self, name: impl Into<String>) -> Self {
        self.country_by(name, CountryFilter::Auto)
    }

    pub fn country_by(mut self, name: impl Into<String>, filter: CountryFilter) -> Self {
        self.country = Some((name.into(), filter));
        self
    }
}

/// Configuration for point features carrying precomputed cells.
///
/// Each feature's `properties.h3_cell` names its cell and
/// `properties.value` its value. The last value seen for a cell wins and
/// is repeated for every year of the range. Cells are used as given; those
/// at a resolution other than the run's are skipped.
#[derive(Debug, Clone)]
pub struct PointHexConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Required cell resolution. `None` takes it from the first valid cell.
    pub resolution: Option<u8>,
    pub years: YearRange,
    pub dataset: String,
    pub metric: String,
    pub description: MetricDescription,
    /// Keeps only input points intersecting this region.
    pub region: Option<String>,
}

impl PointHexConfig {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            resolution: None,
            years: YearRange::default(),
            dataset: "Desertification Data".to_string(),
            metric: "desertification".to_string(),
            description: MetricDescription::new(
                "Desertification",
                "Desertification indicator value",
            )
            .unit("binary"),
            region: None,
        }
    }

    pub fn resolution(mut self, resolution: u8) -> Self {
        self.resolution = Some(resolution);
        self
    }

    pub fn years(mut self, years: YearRange) -> Self {
        self.years = years;
        self
    }

    pub fn dataset(mut self, name: impl Into<String>) -> Self {
        self.dataset = name.into();
        self
    }

    pub fn metric(mut self, key: impl Into<String>, description: MetricDescription) -> Self {
        self.metric = key.into();
        self.description = description;
        self
    }

    pub fn region(mut self, name: impl Into<String>) -> Self {
        self.region = Some(name.into());
        self
    }
}

/// One conversion job, tagged by input shape.
#[derive(Debug, Clone)]
pub enum InputSource {
    Polygons(PolygonHexConfig),
    Raster(RasterHexConfig),
    Events(EventHexConfig),
    Points(PointHexConfig),
}

impl InputSource {
    /// Runs the matching driver. Region names resolve through `registry`.
    ///
    /// # Example
    /// ```no_run
    /// use hexbin_rs::boundary::BoundaryRegistry;
    /// use hexbin_rs::pipeline::{EventHexConfig, InputSource};
    ///
    /// let job = InputSource::Events(EventHexConfig::new("ged.csv", "out/ged_h3.geojson"));
    /// let summary = job.run(&BoundaryRegistry::default()).unwrap();
    /// println!("{} features", summary.features);
    /// ```
    pub fn run(&self, registry: &BoundaryRegistry) -> Result<RunSummary, HexbinError> {
        match self {
            InputSource::Polygons(config) => convert_polygons(config, registry),
            InputSource::Raster(config) => convert_raster(config, registry),
            InputSource::Events(config) => convert_events(config, registry),
            InputSource::Points(config) => convert_points(config, registry),
        }
    }
}

fn load_region(
    registry: &BoundaryRegistry,
    name: Option<&str>,
) -> Result<Option<Region>, HexbinError> {
    name.map(|n| registry.load(n)).transpose()
}

/// Rasterizes a polygon FeatureCollection, folding feature attributes into
/// the covered cells when the config has an overlay schema.
pub fn convert_polygons(
    config: &PolygonHexConfig,
    registry: &BoundaryRegistry,
) -> Result<RunSummary, HexbinError> {
    to_resolution(config.resolution)?;
    let fc = read_feature_collection(&config.input)?;
    log::info!("Loaded {} features from {}", fc.features.len(), config.input.display());

    let reprojector = Reprojector::new(config.crs)?;
    let region = load_region(registry, config.region.as_deref())?;

    let mut skipped = SkipTally::new();
    let mut features = Vec::with_capacity(fc.features.len());
    for (idx, feature) in fc.features.iter().enumerate() {
        let geom = match feature_geometry(feature) {
            Ok(g) => g,
            Err(e) => {
                log::warn!("Skipping feature {}: {}", idx, e);
                skipped.record(SkipReason::InvalidGeometry);
                continue;
            }
        };
        let geom = match reprojector.geometry_to_wgs84(geom) {
            Ok(g) => g,
            Err(e) => {
                log::warn!("Skipping feature {}: {}", idx, e);
                skipped.record(SkipReason::ReprojectionFailed);
                continue;
            }
        };
        if let Err(e) = polygons_of(&geom)
            .0
            .iter()
            .try_for_each(|p| normalize_polygon(p).map(|_| ()))
        {
            log::warn!("Skipping feature {}: {}", idx, e);
            skipped.record(SkipReason::InvalidGeometry);
            continue;
        }
        let geom = match &region {
            Some(r) => match r.clip(&geom) {
                Some(clipped) => Geometry::MultiPolygon(clipped),
                None => {
                    skipped.record(SkipReason::OutsideRegion);
                    continue;
                }
            },
            None => geom,
        };
        features.push(PolygonFeature::new(
            geom,
            feature.properties.clone().unwrap_or_default(),
        ));
    }
    if let Some(r) = &region {
        log::info!("{} features intersect {}", features.len(), r.name);
    }

    let (dataset, descriptions, rows, rasterized) = match &config.schema {
        Some(schema) => {
            let overlay = aggregate_polygons(&features, schema, config.resolution)?;
            let rasterized = overlay.rasterized;
            skipped = skipped.merge(overlay.skipped.clone());
            (
                schema.dataset.clone(),
                schema.descriptions(),
                overlay.into_cells(),
                rasterized,
            )
        }
        None => {
            let geoms: Vec<Geometry<f64>> = features.into_iter().map(|f| f.geometry).collect();
            let outcome = rasterize_all(&geoms, config.resolution)?;
            skipped = skipped.merge(outcome.skipped);
            let rows = outcome
                .cells
                .into_iter()
                .map(|cell| EmittedCell::new(cell, BTreeMap::new()))
                .collect();
            ("Polygon coverage".to_string(), BTreeMap::new(), rows, outcome.rasterized)
        }
    };
    skipped.log_summary("polygons rasterized", rasterized);

    let mut emitter = FeatureEmitter::new(dataset, config.resolution).metrics(descriptions);
    if let Some(r) = &region {
        emitter = emitter.country(r.name.clone());
    }
    finish(emitter, rows, &config.output, config.region.as_deref(), skipped)
}

/// Bins one GeoTIFF, or every GeoTIFF in a directory.
///
/// In directory mode each `<stem>.tif` is written to `<output>/<stem>.geojson`;
/// a failing file is logged and listed in `RunSummary::failed` while the
/// rest of the batch continues.
pub fn convert_raster(
    config: &RasterHexConfig,
    registry: &BoundaryRegistry,
) -> Result<RunSummary, HexbinError> {
    to_resolution(config.resolution)?;
    let region = load_region(registry, config.region.as_deref())?;
    if !config.input.is_dir() {
        return convert_raster_file(config, &config.input, &config.output, region.as_ref());
    }

    let mut inputs: Vec<PathBuf> = std::fs::read_dir(&config.input)
        .map_err(|e| HexbinError::IoError(e.to_string()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| is_tiff(p))
        .collect();
    inputs.sort();
    if inputs.is_empty() {
        log::warn!("No GeoTIFF files found in {}", config.input.display());
    }

    let mut summary = RunSummary::default();
    for input in inputs {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let output = config.output.join(format!("{}.geojson", stem));
        log::info!("Converting {} to {}", input.display(), output.display());
        match convert_raster_file(config, &input, &output, region.as_ref()) {
            Ok(s) => summary = summary.merge(s),
            Err(e) => {
                log::error!("Failed to convert {}: {}", input.display(), e);
                summary.failed.push(input);
            }
        }
    }
    Ok(summary)
}

fn is_tiff(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .is_some_and(|e| e == "tif" || e == "tiff")
}

fn convert_raster_file(
    config: &RasterHexConfig,
    input: &Path,
    output: &Path,
    region: Option<&Region>,
) -> Result<RunSummary, HexbinError> {
    let raster = read_geotiff(input)?;
    let binned = bin(&raster, config.resolution, config.mode)?;
    binned.skipped.log_summary("pixels binned", binned.pixels_binned);

    let file_name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut emitter = FeatureEmitter::new(
        config.dataset.clone().unwrap_or_else(|| file_name.clone()),
        config.resolution,
    )
    .metrics(BinnedRaster::descriptions(&config.metric, config.description.clone()))
    .source_file(file_name)
    .value_range(
        binned.min_value.unwrap_or(0.0),
        binned.max_value.unwrap_or(0.0),
    );
    if let Some(year) = config.year {
        emitter = emitter.temporal_range(YearRange::new(year, year)?);
    }

    let skipped = binned.skipped.clone();
    let rows = binned.into_cells(&config.metric, config.year);
    let mut fc = emitter.emit(rows);
    if let Some(r) = region {
        fc = filter_features(&fc, r);
    }
    let cells = fc.features.len();
    let output = output_path_for_region(output, region.map(|r| r.name.as_str()));
    write_feature_collection(&fc, &output)?;
    Ok(RunSummary::single(output, &fc, cells, skipped))
}

/// Aggregates an event CSV by `(cell, year)`.
pub fn convert_events(
    config: &EventHexConfig,
    registry: &BoundaryRegistry,
) -> Result<RunSummary, HexbinError> {
    to_resolution(config.resolution)?;
    let filter = match &config.country {
        None => None,
        Some((name, CountryFilter::Auto)) => Some(EventFilter::column("country", name.clone())),
        Some((name, CountryFilter::Column(column))) => {
            Some(EventFilter::column(column.clone(), name.clone()))
        }
        Some((name, CountryFilter::Bounds)) => Some(EventFilter::Bounds(
            CountryBounds::for_country(name)
                .ok_or_else(|| HexbinError::BoundaryNotFound(name.clone()))?,
        )),
        Some((name, CountryFilter::Boundary)) => Some(EventFilter::Region(registry.load(name)?)),
    };

    let mut result = aggregate_events(config, filter)?;
    if let Some((name, CountryFilter::Auto)) = &config.country {
        if let (0, Some(bounds)) = (result.folded, CountryBounds::for_country(name)) {
            log::info!(
                "No events have country == {}, filtering by its bounding box instead",
                name
            );
            result = aggregate_events(config, Some(EventFilter::Bounds(bounds)))?;
        }
    }
    result.skipped.log_summary("events folded", result.folded);
    let skipped = result.skipped.clone();

    let mut emitter = FeatureEmitter::new(config.schema.dataset.clone(), config.resolution)
        .metrics(config.schema.descriptions());
    if let Some(years) = config.years {
        emitter = emitter.temporal_range(years);
    }
    let country = config.country.as_ref().map(|(name, _)| name.as_str());
    if let Some(name) = country {
        emitter = emitter.country(name);
        if let Some(bounds) = CountryBounds::for_country(name) {
            emitter = emitter.bounds(bounds);
        }
    }
    finish(emitter, result.into_cells(), &config.output, country, skipped)
}

fn aggregate_events(
    config: &EventHexConfig,
    filter: Option<EventFilter>,
) -> Result<TemporalAggregate, HexbinError> {
    let extra: Vec<&str> = filter.iter().filter_map(|f| f.label_column()).collect();
    let reader = EventReader::open(&config.input, &config.schema, &extra)?;

    let mut aggregator = TemporalAggregator::new(&config.schema.rules, config.resolution)?;
    if let Some(years) = config.years {
        aggregator = aggregator.years(years);
    }
    if let Some(f) = filter {
        aggregator = aggregator.filter(f);
    }

    for (line, item) in reader {
        let reason = match item {
            Ok(event) => match aggregator.add(&event) {
                Ok(_) => continue,
                Err(reason) => reason,
            },
            Err(reason) => {
                aggregator.skip(reason);
                reason
            }
        };
        match reason {
            SkipReason::OutsideYearRange | SkipReason::OutsideRegion => {
                log::debug!("Line {}: {}", line, reason)
            }
            _ => log::warn!("Skipping line {}: {}", line, reason),
        }
    }
    Ok(aggregator.finish())
}

/// Expands precomputed-cell points into a dense yearly timeseries.
pub fn convert_points(
    config: &PointHexConfig,
    registry: &BoundaryRegistry,
) -> Result<RunSummary, HexbinError> {
    if let Some(resolution) = config.resolution {
        to_resolution(resolution)?;
    }
    let mut fc = read_feature_collection(&config.input)?;
    if let Some(region) = load_region(registry, config.region.as_deref())? {
        fc = filter_features(&fc, &region);
    }

    let mut skipped = SkipTally::new();
    let mut resolution = config.resolution;
    let mut values: BTreeMap<CellIndex, MetricValue> = BTreeMap::new();
    for (idx, feature) in fc.features.iter().enumerate() {
        let Some(id) = feature.property("h3_cell").and_then(|v| v.as_str()) else {
            log::warn!("Skipping feature {}: no h3_cell property", idx);
            skipped.record(SkipReason::MalformedRecord);
            continue;
        };
        let cell = match parse_cell_id(id) {
            Ok(c) => c,
            Err(e) => {
                log::warn!("Skipping feature {}: {}", idx, e);
                skipped.record(SkipReason::InvalidCellId);
                continue;
            }
        };
        let cell_resolution = u8::from(cell.resolution());
        match resolution {
            Some(r) if r != cell_resolution => {
                log::warn!(
                    "Skipping feature {}: cell {} is at resolution {}, not {}",
                    idx,
                    id,
                    cell_resolution,
                    r
                );
                skipped.record(SkipReason::InvalidCellId);
                continue;
            }
            Some(_) => {}
            None => resolution = Some(cell_resolution),
        }
        let value = feature
            .property("value")
            .map_or(MetricValue::Null, MetricValue::from_json);
        values.insert(cell, value);
    }
    skipped.log_summary("points read", values.len());

    let rows: Vec<EmittedCell> = values
        .iter()
        .flat_map(|(cell, value)| {
            config.years.years().map(move |year| {
                let metrics = BTreeMap::from([(config.metric.clone(), value.clone())]);
                EmittedCell::new(*cell, metrics).year(year)
            })
        })
        .collect();

    let resolution = resolution.unwrap_or(DEFAULT_COARSE_RESOLUTION);
    let mut emitter = FeatureEmitter::new(config.dataset.clone(), resolution)
        .metrics(BTreeMap::from([(
            config.metric.clone(),
            config.description.clone(),
        )]))
        .temporal_range(config.years);
    if let Some(name) = &config.region {
        emitter = emitter.country(name.clone());
    }
    finish(emitter, rows, &config.output, config.region.as_deref(), skipped)
}

fn finish(
    emitter: FeatureEmitter,
    rows: Vec<EmittedCell>,
    output: &Path,
    region: Option<&str>,
    skipped: SkipTally,
) -> Result<RunSummary, HexbinError> {
    let fc = emitter.emit(rows);
    let cells = crate::emit::Metadata::from_collection(&fc).map_or(0, |m| m.cell_count);
    let output = output_path_for_region(output, region);
    write_feature_collection(&fc, &output)?;
    Ok(RunSummary::single(output, &fc, cells, skipped))
}
