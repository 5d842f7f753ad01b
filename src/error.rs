/// Error type for hexbin-rs operations.
#[derive(Debug, PartialEq)]
pub enum HexbinError {
    /// Latitude outside [-90, 90] or longitude outside [-180, 180] (or non-finite).
    InvalidCoordinate { lat: f64, lon: f64 },
    /// The grid resolution is outside the valid range (0-15).
    InvalidResolution(u8),
    /// A disk radius was negative.
    InvalidRadius(i64),
    /// Two cells at different resolutions were compared.
    ResolutionMismatch(u8, u8),
    /// A polygon is degenerate or self-intersecting.
    InvalidGeometry(String),
    /// No boundary is registered under the requested region name.
    BoundaryNotFound(String),
    /// The boundary file for a region is absent or unparseable.
    BoundaryDataMissing(String),
    /// A required input file does not exist.
    SourceFileMissing(String),
    /// The coordinate reference system cannot be converted to EPSG:4326.
    UnsupportedCrs(String),
    /// A cell identifier string could not be parsed.
    InvalidCellId(String),
    /// The grid distance between two cells cannot be computed.
    DistanceUndefined(String),
    /// A year range whose start is after its end.
    InvalidYearRange { start: i32, end: i32 },
    /// Coordinate projection failed.
    ProjectionError(String),
    /// Failed to parse geometry from a GeoJSON string.
    GeometryParseError(String),
    /// Raster decoding or georeferencing error.
    RasterError(String),
    /// CSV parsing or reading error.
    CsvError(String),
    /// File I/O or serialization error.
    IoError(String),
}

impl std::fmt::Display for HexbinError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HexbinError::InvalidCoordinate { lat, lon } => {
                write!(f, "Invalid coordinate: lat {}, lon {}", lat, lon)
            }
            HexbinError::InvalidResolution(r) => write!(f, "Invalid resolution: {}", r),
            HexbinError::InvalidRadius(k) => write!(f, "Invalid disk radius: {}", k),
            HexbinError::ResolutionMismatch(a, b) => {
                write!(f, "Resolution mismatch: {} vs {}", a, b)
            }
            HexbinError::InvalidGeometry(msg) => write!(f, "Invalid geometry: {}", msg),
            HexbinError::BoundaryNotFound(name) => write!(f, "Boundary not found: {}", name),
            HexbinError::BoundaryDataMissing(msg) => write!(f, "Boundary data missing: {}", msg),
            HexbinError::SourceFileMissing(path) => write!(f, "Source file missing: {}", path),
            HexbinError::UnsupportedCrs(crs) => write!(f, "Unsupported CRS: {}", crs),
            HexbinError::InvalidCellId(id) => write!(f, "Invalid cell id: {}", id),
            HexbinError::DistanceUndefined(msg) => write!(f, "Grid distance undefined: {}", msg),
            HexbinError::InvalidYearRange { start, end } => {
                write!(f, "Invalid year range: {}..={}", start, end)
            }
            HexbinError::ProjectionError(msg) => write!(f, "Projection error: {}", msg),
            HexbinError::GeometryParseError(msg) => write!(f, "Geometry parse error: {}", msg),
            HexbinError::RasterError(msg) => write!(f, "Raster error: {}", msg),
            HexbinError::CsvError(msg) => write!(f, "CSV error: {}", msg),
            HexbinError::IoError(msg) => write!(f, "IO error: {}", msg),
        }
    }
}

impl std::error::Error for HexbinError {}
