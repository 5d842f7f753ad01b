use crate::aggregate::{Event, EventSchema};
use crate::error::HexbinError;
use crate::skip::SkipReason;
use chrono::{Datelike, NaiveDate};
use std::fs::File;
use std::path::Path;

/// Streams an event CSV into [`Event`]s.
///
/// Only the columns the schema's rules (and any extra label columns) refer
/// to are kept. Each item carries the record's line number so skipped rows
/// can be located.
pub struct EventReader {
    reader: csv::Reader<File>,
    record: csv::StringRecord,
    lat_idx: usize,
    lon_idx: usize,
    date_idx: usize,
    numeric: Vec<(String, usize)>,
    labels: Vec<(String, usize)>,
}

impl EventReader {
    /// Opens `path` and resolves the schema's columns against its header.
    ///
    /// Fails with `SourceFileMissing` when the file is absent and with
    /// `CsvError` when a coordinate or date column is missing. Metric
    /// columns absent from the header are treated as null for every row.
    pub fn open(
        path: impl AsRef<Path>,
        schema: &EventSchema,
        extra_labels: &[&str],
    ) -> Result<Self, HexbinError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(HexbinError::SourceFileMissing(path.display().to_string()));
        }
        let file = File::open(path).map_err(|e| HexbinError::CsvError(e.to_string()))?;
        let mut reader = csv::Reader::from_reader(file);
        let headers = reader
            .headers()
            .map_err(|e| HexbinError::CsvError(e.to_string()))?
            .clone();

        let required = |col: &str| {
            headers
                .iter()
                .position(|h| h == col)
                .ok_or_else(|| HexbinError::CsvError(format!("Column '{}' not found", col)))
        };
        let lat_idx = required(&schema.lat_column)?;
        let lon_idx = required(&schema.lon_column)?;
        let date_idx = required(&schema.date_column)?;

        let optional = |cols: Vec<&str>| -> Vec<(String, usize)> {
            cols.into_iter()
                .filter_map(|col| match headers.iter().position(|h| h == col) {
                    Some(idx) => Some((col.to_string(), idx)),
                    None => {
                        log::warn!("Column '{}' not found, treating it as null", col);
                        None
                    }
                })
                .collect()
        };
        let numeric = optional(schema.numeric_columns().into_iter().collect());
        let mut label_cols = schema.label_columns();
        label_cols.extend(extra_labels.iter().copied());
        let labels = optional(label_cols.into_iter().collect());

        Ok(Self {
            reader,
            record: csv::StringRecord::new(),
            lat_idx,
            lon_idx,
            date_idx,
            numeric,
            labels,
        })
    }

    fn parse(&self) -> Result<Event, SkipReason> {
        let field = |idx: usize| self.record.get(idx).map(str::trim).unwrap_or("");

        let lat = field(self.lat_idx)
            .parse::<f64>()
            .map_err(|_| SkipReason::InvalidCoordinate)?;
        let lon = field(self.lon_idx)
            .parse::<f64>()
            .map_err(|_| SkipReason::InvalidCoordinate)?;
        let year = parse_year(field(self.date_idx)).ok_or(SkipReason::InvalidTimestamp)?;

        let mut event = Event::new(lat, lon, year);
        for (col, idx) in &self.numeric {
            if let Ok(v) = field(*idx).parse::<f64>() {
                if v.is_finite() {
                    event.numbers.insert(col.clone(), v);
                }
            }
        }
        for (col, idx) in &self.labels {
            let v = field(*idx);
            if !v.is_empty() {
                event.labels.insert(col.clone(), v.to_string());
            }
        }
        Ok(event)
    }
}

impl Iterator for EventReader {
    /// Line number and the parsed event or the reason the row was skipped.
    type Item = (u64, Result<Event, SkipReason>);

    fn next(&mut self) -> Option<Self::Item> {
        match self.reader.read_record(&mut self.record) {
            Ok(false) => None,
            Ok(true) => {
                let line = self.record.position().map_or(0, |p| p.line());
                Some((line, self.parse()))
            }
            Err(e) => {
                let line = e.position().map_or(0, |p| p.line());
                log::warn!("Malformed CSV record at line {}: {}", line, e);
                Some((line, Err(SkipReason::MalformedRecord)))
            }
        }
    }
}

/// Extracts the year of an ISO date (`YYYY-MM-DD`, optionally followed by a
/// time) or of a bare four-digit year.
pub fn parse_year(s: &str) -> Option<i32> {
    let s = s.trim();
    if let Some(date) = s.get(..10).and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()) {
        return Some(date.year());
    }
    if s.len() == 4 {
        return s.parse().ok();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const GED_SAMPLE: &str = "\
id,date_start,latitude,longitude,best,deaths_a,deaths_b,deaths_civilians,country,type_of_violence
1,2010-03-04,2.05,45.32,5,1,,3,Somalia,1
2,2010-07-01 00:00:00.000,2.05,45.32,2,,1,,Somalia,2
3,not-a-date,2.05,45.32,1,0,0,0,Somalia,1
4,2011-01-01,,45.32,1,0,0,0,Somalia,1
";

    fn write_sample(dir: &Path) -> Result<std::path::PathBuf, HexbinError> {
        let path = dir.join("ged.csv");
        fs::write(&path, GED_SAMPLE).map_err(|e| HexbinError::IoError(e.to_string()))?;
        Ok(path)
    }

    #[test]
    fn test_parse_year() {
        assert_eq!(parse_year("2010-03-04"), Some(2010));
        assert_eq!(parse_year("2010-03-04 00:00:00.000"), Some(2010));
        assert_eq!(parse_year("2010-03-04T12:00:00"), Some(2010));
        assert_eq!(parse_year("1999"), Some(1999));
        assert_eq!(parse_year("03/04/2010"), None);
        assert_eq!(parse_year(""), None);
    }

    #[test]
    fn test_read_ged_rows() -> Result<(), HexbinError> {
        let dir = tempfile::tempdir().map_err(|e| HexbinError::IoError(e.to_string()))?;
        let path = write_sample(dir.path())?;
        let rows: Vec<_> = EventReader::open(&path, &EventSchema::ged(), &[])?.collect();

        assert_eq!(rows.len(), 4);
        let first = rows[0].1.as_ref().map_err(|r| HexbinError::CsvError(r.to_string()))?;
        assert_eq!(first.year, 2010);
        assert_eq!(first.numbers.get("deaths_civilians"), Some(&3.0));
        assert_eq!(first.numbers.get("deaths_b"), None);
        assert_eq!(first.labels.get("country").map(String::as_str), Some("Somalia"));

        let second = rows[1].1.as_ref().map_err(|r| HexbinError::CsvError(r.to_string()))?;
        assert_eq!(second.numbers.get("deaths_civilians"), None);

        assert_eq!(rows[2].1, Err(SkipReason::InvalidTimestamp));
        assert_eq!(rows[3].1, Err(SkipReason::InvalidCoordinate));
        assert!(rows[2].0 < rows[3].0);
        Ok(())
    }

    #[test]
    fn test_missing_coordinate_column() -> Result<(), HexbinError> {
        let dir = tempfile::tempdir().map_err(|e| HexbinError::IoError(e.to_string()))?;
        let path = dir.path().join("bad.csv");
        fs::write(&path, "date_start,lat,lon\n2010-01-01,1,2\n")
            .map_err(|e| HexbinError::IoError(e.to_string()))?;
        assert!(matches!(
            EventReader::open(&path, &EventSchema::ged(), &[]),
            Err(HexbinError::CsvError(_))
        ));
        Ok(())
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            EventReader::open("/definitely/not/here.csv", &EventSchema::ged(), &[]),
            Err(HexbinError::SourceFileMissing(_))
        ));
    }
}
