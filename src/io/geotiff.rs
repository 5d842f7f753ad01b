use crate::coord::Crs;
use crate::error::HexbinError;
use crate::raster::{AffineTransform, Raster};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::tags::Tag;

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const MODEL_TRANSFORMATION: u16 = 34264;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

const KEY_RASTER_TYPE: u16 = 1025;
const KEY_GEOGRAPHIC_TYPE: u16 = 2048;
const KEY_PROJECTED_CS_TYPE: u16 = 3072;
const RASTER_PIXEL_IS_POINT: u16 = 2;
const USER_DEFINED: u16 = 32767;

fn tag(code: u16) -> Tag {
    Tag::from_u16_exhaustive(code)
}

fn raster_err(e: impl std::fmt::Display) -> HexbinError {
    HexbinError::RasterError(e.to_string())
}

/// Reads the first band of a GeoTIFF into a [`Raster`].
///
/// The transform comes from `ModelTransformation` when present, otherwise
/// from `ModelTiepoint` plus `ModelPixelScale`. The CRS is taken from the
/// projected or geographic GeoKey; a raster without GeoKeys is assumed to
/// be WGS84. The no-data value is read from the `GDAL_NODATA` tag.
pub fn read_geotiff(path: impl AsRef<Path>) -> Result<Raster, HexbinError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(HexbinError::SourceFileMissing(path.display().to_string()));
    }
    let file = File::open(path).map_err(|e| HexbinError::IoError(e.to_string()))?;
    let mut decoder = Decoder::new(BufReader::new(file)).map_err(raster_err)?;

    let (width, height) = decoder.dimensions().map_err(raster_err)?;
    let samples = decoder
        .find_tag(Tag::SamplesPerPixel)
        .map_err(raster_err)?
        .map(|v| v.into_u16())
        .transpose()
        .map_err(raster_err)?
        .unwrap_or(1)
        .max(1) as usize;

    let geokeys = match decoder.find_tag(tag(GEO_KEY_DIRECTORY)).map_err(raster_err)? {
        Some(v) => parse_geokeys(&v.into_u16_vec().map_err(raster_err)?),
        None => Vec::new(),
    };
    let crs = crs_from_geokeys(&geokeys)?.unwrap_or_else(|| {
        log::warn!("{} has no CRS GeoKeys, assuming EPSG:4326", path.display());
        Crs::Wgs84
    });

    let mut transform = read_transform(&mut decoder)?;
    if geokey(&geokeys, KEY_RASTER_TYPE) == Some(RASTER_PIXEL_IS_POINT) {
        transform = transform.shifted_half_pixel();
    }

    let nodata = match decoder.find_tag(tag(GDAL_NODATA)).map_err(raster_err)? {
        Some(v) => {
            let text = v.into_string().map_err(raster_err)?;
            let text = text.trim_matches(|c: char| c == '\0' || c.is_whitespace());
            match text.parse::<f64>() {
                Ok(nd) => Some(nd),
                Err(_) => {
                    log::warn!("Ignoring unparseable GDAL_NODATA value {:?}", text);
                    None
                }
            }
        }
        None => None,
    };

    let pixels = decoder.read_image().map_err(raster_err)?;
    let data: Vec<f64> = decoded_to_f64(pixels)?
        .into_iter()
        .step_by(samples)
        .collect();

    log::info!(
        "Read {}: {}x{} pixels, {}, nodata {:?}",
        path.display(),
        width,
        height,
        crs,
        nodata
    );
    Ok(Raster::new(width as usize, height as usize, data, transform)?
        .crs(crs)
        .nodata(nodata))
}

fn read_transform<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
) -> Result<AffineTransform, HexbinError> {
    if let Some(v) = decoder.find_tag(tag(MODEL_TRANSFORMATION)).map_err(raster_err)? {
        return AffineTransform::from_model_transformation(&v.into_f64_vec().map_err(raster_err)?);
    }
    let tiepoint = decoder.find_tag(tag(MODEL_TIEPOINT)).map_err(raster_err)?;
    let scale = decoder.find_tag(tag(MODEL_PIXEL_SCALE)).map_err(raster_err)?;
    match (tiepoint, scale) {
        (Some(t), Some(s)) => AffineTransform::from_tiepoint_scale(
            &t.into_f64_vec().map_err(raster_err)?,
            &s.into_f64_vec().map_err(raster_err)?,
        ),
        _ => Err(HexbinError::RasterError(
            "no ModelTransformation or ModelTiepoint/ModelPixelScale tags".to_string(),
        )),
    }
}

/// `(key, value)` pairs of the GeoKey directory whose values are stored inline.
fn parse_geokeys(dir: &[u16]) -> Vec<(u16, u16)> {
    if dir.len() < 4 {
        return Vec::new();
    }
    let count = dir[3] as usize;
    dir[4..]
        .chunks_exact(4)
        .take(count)
        .filter(|entry| entry[1] == 0)
        .map(|entry| (entry[0], entry[3]))
        .collect()
}

fn geokey(keys: &[(u16, u16)], key: u16) -> Option<u16> {
    keys.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}

fn crs_from_geokeys(keys: &[(u16, u16)]) -> Result<Option<Crs>, HexbinError> {
    let code = geokey(keys, KEY_PROJECTED_CS_TYPE).or_else(|| geokey(keys, KEY_GEOGRAPHIC_TYPE));
    match code {
        Some(USER_DEFINED) => Err(HexbinError::UnsupportedCrs(
            "user-defined GeoTIFF coordinate system".to_string(),
        )),
        Some(code) => Ok(Some(Crs::from_epsg(code))),
        None => Ok(None),
    }
}

#[allow(unreachable_patterns)]
fn decoded_to_f64(pixels: DecodingResult) -> Result<Vec<f64>, HexbinError> {
    Ok(match pixels {
        DecodingResult::U8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U64(v) => v.into_iter().map(|x| x as f64).collect(),
        DecodingResult::I8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I64(v) => v.into_iter().map(|x| x as f64).collect(),
        DecodingResult::F32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::F64(v) => v,
        _ => return Err(HexbinError::RasterError("unsupported sample format".to_string())),
    })
}

/// Writes a single-band `f32` GeoTIFF whose top-left corner sits at
/// lon 45.30, lat 2.06 with 0.01° pixels.
#[cfg(test)]
pub(crate) fn write_test_geotiff(
    path: &Path,
    geokeys: Option<&[u16]>,
    nodata: Option<&str>,
    data: &[f32],
    width: u32,
    height: u32,
) -> Result<(), HexbinError> {
    use tiff::encoder::{TiffEncoder, colortype};

    let file = File::create(path).map_err(|e| HexbinError::IoError(e.to_string()))?;
    let mut encoder = TiffEncoder::new(file).map_err(raster_err)?;
    let mut image = encoder
        .new_image::<colortype::Gray32Float>(width, height)
        .map_err(raster_err)?;
    let dir = image.encoder();
    dir.write_tag(tag(MODEL_PIXEL_SCALE), &[0.01f64, 0.01, 0.0][..])
        .map_err(raster_err)?;
    dir.write_tag(tag(MODEL_TIEPOINT), &[0.0f64, 0.0, 0.0, 45.30, 2.06, 0.0][..])
        .map_err(raster_err)?;
    if let Some(keys) = geokeys {
        dir.write_tag(tag(GEO_KEY_DIRECTORY), keys).map_err(raster_err)?;
    }
    if let Some(nd) = nodata {
        dir.write_tag(tag(GDAL_NODATA), nd).map_err(raster_err)?;
    }
    image.write_data(data).map_err(raster_err)?;
    Ok(())
}
