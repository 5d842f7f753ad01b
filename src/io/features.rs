use crate::error::HexbinError;
use geojson::{FeatureCollection, GeoJson};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Reads a GeoJSON FeatureCollection from disk.
///
/// Fails with `SourceFileMissing` when the path does not exist and with
/// `GeometryParseError` when the document is not a FeatureCollection.
pub fn read_feature_collection(path: impl AsRef<Path>) -> Result<FeatureCollection, HexbinError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(HexbinError::SourceFileMissing(path.display().to_string()));
    }
    let text = fs::read_to_string(path).map_err(|e| HexbinError::IoError(e.to_string()))?;
    parse_feature_collection(&text)
}

pub fn parse_feature_collection(text: &str) -> Result<FeatureCollection, HexbinError> {
    let geojson: GeoJson = text
        .parse()
        .map_err(|e: geojson::Error| HexbinError::GeometryParseError(e.to_string()))?;
    FeatureCollection::try_from(geojson)
        .map_err(|e| HexbinError::GeometryParseError(e.to_string()))
}

/// Writes a FeatureCollection to `path`, creating parent directories.
///
/// The document is written to a sibling temporary file and renamed into
/// place, so a failed write never leaves a partial output behind.
pub fn write_feature_collection(
    fc: &FeatureCollection,
    path: impl AsRef<Path>,
) -> Result<(), HexbinError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| HexbinError::IoError(e.to_string()))?;
    }

    let body = serde_json::to_vec(fc).map_err(|e| HexbinError::IoError(e.to_string()))?;
    let tmp = temp_path_for(path);
    let written = fs::File::create(&tmp)
        .and_then(|mut file| {
            file.write_all(&body)?;
            file.sync_all()
        })
        .and_then(|_| fs::rename(&tmp, path));

    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(HexbinError::IoError(format!("{}: {}", path.display(), e)));
    }
    log::info!(
        "Wrote {} features to {}",
        fc.features.len(),
        path.display()
    );
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    path.with_file_name(format!(".{}.tmp", name))
}

/// Appends `_<region>` (lower-case) to the file stem.
///
/// `out/deserts.geojson` with region `Somalia` becomes `out/deserts_somalia.geojson`.
pub fn output_path_for_region(path: impl AsRef<Path>, region: Option<&str>) -> PathBuf {
    let path = path.as_ref();
    let Some(region) = region else {
        return path.to_path_buf();
    };
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let suffix = region.trim().to_lowercase().replace(' ', "_");
    let name = match path.extension() {
        Some(ext) => format!("{}_{}.{}", stem, suffix, ext.to_string_lossy()),
        None => format!("{}_{}", stem, suffix),
    };
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_suffix() {
        assert_eq!(
            output_path_for_region("out/deserts.geojson", Some("Somalia")),
            PathBuf::from("out/deserts_somalia.geojson")
        );
        assert_eq!(
            output_path_for_region("out/deserts.geojson", None),
            PathBuf::from("out/deserts.geojson")
        );
        assert_eq!(
            output_path_for_region("cells", Some("Malawi")),
            PathBuf::from("cells_malawi")
        );
    }

    #[test]
    fn test_write_then_read() -> Result<(), HexbinError> {
        let dir = tempfile::tempdir().map_err(|e| HexbinError::IoError(e.to_string()))?;
        let path = dir.path().join("nested/dir/out.geojson");

        let fc = FeatureCollection {
            bbox: None,
            features: vec![],
            foreign_members: None,
        };
        write_feature_collection(&fc, &path)?;
        assert!(path.exists());
        assert!(!dir.path().join("nested/dir/.out.geojson.tmp").exists());

        let back = read_feature_collection(&path)?;
        assert!(back.features.is_empty());
        Ok(())
    }

    #[test]
    fn test_missing_file() {
        let result = read_feature_collection("/definitely/not/here.geojson");
        assert!(matches!(result, Err(HexbinError::SourceFileMissing(_))));
    }

    #[test]
    fn test_not_a_collection() {
        let result = parse_feature_collection(r#"{"type":"Point","coordinates":[1,2]}"#);
        assert!(matches!(result, Err(HexbinError::GeometryParseError(_))));
    }
}
