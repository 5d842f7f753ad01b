//! `hexbin` command-line entry point.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};
use hexbin_rs::aggregate::{MetricDescription, PolygonSchema, YearRange};
use hexbin_rs::index::{DEFAULT_COARSE_RESOLUTION, DEFAULT_RASTER_RESOLUTION, disk_around};
use hexbin_rs::pipeline::{
    CountryFilter, EventHexConfig, InputSource, PointHexConfig, PolygonHexConfig,
    RasterHexConfig,
};
use hexbin_rs::raster::BinMode;
use hexbin_rs::{BoundaryRegistry, Crs, HexCell, HexbinError, RunSummary};

#[derive(Parser)]
#[command(name = "hexbin", about = "Aggregate geospatial data onto H3 hexagon cells")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Common {
    /// Input file (or directory of GeoTIFFs for `raster`)
    #[arg(long)]
    input: PathBuf,
    /// Output GeoJSON file (or directory for a raster batch)
    #[arg(long)]
    output: PathBuf,
    /// H3 resolution (0-15); points default to the resolution of their cells
    #[arg(long)]
    resolution: Option<u8>,
    /// Region or country name to restrict the output to. Events match it
    /// against their `country` column, see `--filter-by`
    #[arg(long)]
    country: Option<String>,
    /// Directory the built-in boundary files are resolved against
    #[arg(long, default_value = "data")]
    boundary_dir: PathBuf,
    /// Extra boundary file, as `NAME=PATH` (repeatable)
    #[arg(long = "boundary", value_parser = parse_boundary)]
    boundaries: Vec<(String, PathBuf)>,
}

impl Common {
    fn registry(&self) -> BoundaryRegistry {
        self.boundaries
            .iter()
            .fold(BoundaryRegistry::new(&self.boundary_dir), |r, (name, path)| {
                r.register(name, path)
            })
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Rasterize a polygon FeatureCollection onto cells
    Polygons {
        #[command(flatten)]
        common: Common,
        /// CRS of the input coordinates, e.g. `EPSG:32638`
        #[arg(long, default_value = "EPSG:4326", value_parser = parse_crs)]
        crs: Crs,
        /// Per-cell attribute rules
        #[arg(long, value_enum, default_value_t = SchemaPreset::Coverage)]
        schema: SchemaPreset,
    },
    /// Bin GeoTIFF pixels into cells
    Raster {
        #[command(flatten)]
        common: Common,
        #[arg(long, value_enum, default_value_t = ModeArg::Mean)]
        mode: ModeArg,
        /// Metric key for the binned value
        #[arg(long, default_value = "value")]
        metric: String,
        /// Human-readable metric name
        #[arg(long)]
        metric_name: Option<String>,
        /// Year stamped on every feature
        #[arg(long)]
        year: Option<i32>,
        /// Dataset name for the metadata block
        #[arg(long)]
        dataset: Option<String>,
    },
    /// Aggregate a UCDP GED style event CSV by cell and year
    Events {
        #[command(flatten)]
        common: Common,
        #[arg(long, default_value_t = 2001)]
        start_year: i32,
        #[arg(long, default_value_t = 2015)]
        end_year: i32,
        /// Emit only observed (cell, year) keys
        #[arg(long)]
        sparse: bool,
        /// How `--country` restricts events
        #[arg(long, value_enum, default_value_t = FilterArg::Auto)]
        filter_by: FilterArg,
    },
    /// Expand precomputed-cell points into a yearly timeseries
    Points {
        #[command(flatten)]
        common: Common,
        #[arg(long, default_value_t = 2001)]
        start_year: i32,
        #[arg(long, default_value_t = 2015)]
        end_year: i32,
        /// Metric key for the point value
        #[arg(long, default_value = "desertification")]
        metric: String,
    },
    /// Print a cell's id, center, boundary and disk for a coordinate
    Cell {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
        #[arg(long, default_value_t = DEFAULT_COARSE_RESOLUTION)]
        resolution: u8,
        /// Disk radius
        #[arg(long, default_value_t = 1)]
        k: i64,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SchemaPreset {
    /// Covered area per cell
    Coverage,
    /// Mean desertification indices, modal land and degradation classes, overlap area
    Desertification,
    /// Bare cells without metrics
    Cells,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Mean,
    Max,
}

#[derive(Clone, Copy, ValueEnum)]
enum FilterArg {
    /// `country` column, or the built-in box if no event matches
    Auto,
    /// `country` column equality
    Column,
    /// Built-in country bounding box
    Bounds,
    /// Registered boundary polygon
    Boundary,
}

fn parse_boundary(s: &str) -> Result<(String, PathBuf), String> {
    let (name, path) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=PATH, got '{}'", s))?;
    Ok((name.trim().to_string(), PathBuf::from(path.trim())))
}

fn parse_crs(s: &str) -> Result<Crs, String> {
    s.parse::<Crs>().map_err(|e| e.to_string())
}

fn main() -> ExitCode {
    pretty_env_logger::formatted_builder()
        .filter_level(log::LevelFilter::Info)
        .parse_env("RUST_LOG")
        .init();
    let cli = Cli::parse();

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<(), HexbinError> {
    let (job, registry) = match command {
        Commands::Cell {
            lat,
            lon,
            resolution,
            k,
        } => return print_cell(lat, lon, resolution, k),
        Commands::Polygons {
            common,
            crs,
            schema,
        } => {
            let mut config = PolygonHexConfig::new(&common.input, &common.output)
                .resolution(common.resolution.unwrap_or(DEFAULT_COARSE_RESOLUTION))
                .crs(crs);
            config = match schema {
                SchemaPreset::Coverage => config.schema(PolygonSchema::coverage()),
                SchemaPreset::Desertification => config.schema(PolygonSchema::desertification()),
                SchemaPreset::Cells => config.cells_only(),
            };
            if let Some(country) = &common.country {
                config = config.region(country);
            }
            (InputSource::Polygons(config), common.registry())
        }
        Commands::Raster {
            common,
            mode,
            metric,
            metric_name,
            year,
            dataset,
        } => {
            let mode = match mode {
                ModeArg::Mean => BinMode::Mean,
                ModeArg::Max => BinMode::Max,
            };
            let description = MetricDescription::new(
                metric_name.unwrap_or_else(|| metric.clone()),
                match mode {
                    BinMode::Mean => "Mean raster value in the cell",
                    BinMode::Max => "Maximum raster value in the cell",
                },
            );
            let mut config = RasterHexConfig::new(&common.input, &common.output)
                .resolution(common.resolution.unwrap_or(DEFAULT_RASTER_RESOLUTION))
                .mode(mode)
                .metric(metric, description);
            if let Some(year) = year {
                config = config.year(year);
            }
            if let Some(dataset) = dataset {
                config = config.dataset(dataset);
            }
            if let Some(country) = &common.country {
                config = config.region(country);
            }
            (InputSource::Raster(config), common.registry())
        }
        Commands::Events {
            common,
            start_year,
            end_year,
            sparse,
            filter_by,
        } => {
            let mut config = EventHexConfig::new(&common.input, &common.output)
                .resolution(common.resolution.unwrap_or(DEFAULT_COARSE_RESOLUTION))
                .years(YearRange::new(start_year, end_year)?);
            if sparse {
                config = config.sparse();
            }
            if let Some(country) = &common.country {
                let filter = match filter_by {
                    FilterArg::Auto => CountryFilter::Auto,
                    FilterArg::Column => CountryFilter::Column("country".to_string()),
                    FilterArg::Bounds => CountryFilter::Bounds,
                    FilterArg::Boundary => CountryFilter::Boundary,
                };
                config = config.country_by(country, filter);
            }
            (InputSource::Events(config), common.registry())
        }
        Commands::Points {
            common,
            start_year,
            end_year,
            metric,
        } => {
            let mut config = PointHexConfig::new(&common.input, &common.output)
                .years(YearRange::new(start_year, end_year)?);
            if let Some(resolution) = common.resolution {
                config = config.resolution(resolution);
            }
            if metric != config.metric {
                let description = MetricDescription::new(metric.clone(), "Point value");
                config = config.metric(metric, description);
            }
            if let Some(country) = &common.country {
                config = config.region(country);
            }
            (InputSource::Points(config), common.registry())
        }
    };

    let summary = job.run(&registry)?;
    report(&summary);
    Ok(())
}

fn report(summary: &RunSummary) {
    for output in &summary.outputs {
        log::info!("Wrote {}", output.display());
    }
    log::info!(
        "{} features over {} cells ({} items skipped)",
        summary.features,
        summary.cells,
        summary.skipped.total()
    );
    if !summary.failed.is_empty() {
        log::warn!("{} inputs failed to convert", summary.failed.len());
    }
}

fn print_cell(lat: f64, lon: f64, resolution: u8, k: i64) -> Result<(), HexbinError> {
    let cell = HexCell::from_lat_lng(lat, lon, resolution)?;

    println!("Cell ID: {}", cell.to_id_string());
    println!("Resolution: {}", cell.resolution);
    println!("Center: ({}, {})", cell.lat(), cell.lon());
    println!("Area: {:.3} km²", cell.area_km2());
    if cell.is_pentagon() {
        println!("Pentagon");
    }
    println!("Boundary:");
    for (vlat, vlon) in cell.boundary() {
        println!("  ({}, {})", vlat, vlon);
    }

    let mut disk: Vec<_> = disk_around(cell.id, k)?.into_iter().collect();
    disk.sort();
    println!("Disk k={} ({} cells):", k, disk.len());
    for neighbour in disk {
        println!("  {}", HexCell::from(neighbour).to_id_string());
    }
    Ok(())
}
