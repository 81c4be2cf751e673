//! Single-band categorical `GeoTIFF` reading.
//!
//! Georeferencing comes from the `GeoTIFF` model tags: `ModelPixelScale`
//! plus `ModelTiepoint`, or a full `ModelTransformation` matrix. NoData is
//! read from `GDAL_NODATA` and the EPSG code from the `GeoKey` directory
//! (projected CRS key, falling back to the geographic CRS key).

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use field_panel_taxonomy::ClassCode;
use geo::{Rect, coord};
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;

use crate::RasterError;

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const MODEL_TRANSFORMATION: u16 = 34264;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

const GEOGRAPHIC_TYPE_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_KEY: u16 = 3072;

/// Marks samples that cannot be a class code (negative or fractional).
const INVALID: ClassCode = ClassCode::MAX;

/// Affine pixel → map transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    /// X of the upper-left corner of the upper-left pixel.
    pub origin_x: f64,
    /// Y of the upper-left corner of the upper-left pixel.
    pub origin_y: f64,
    /// Pixel width in map units.
    pub pixel_width: f64,
    /// Pixel height in map units (negative for north-up rasters).
    pub pixel_height: f64,
    /// Row term of the X equation.
    pub rotation_x: f64,
    /// Column term of the Y equation.
    pub rotation_y: f64,
}

impl GeoTransform {
    /// A north-up transform.
    #[must_use]
    pub const fn north_up(origin_x: f64, origin_y: f64, pixel_size: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width: pixel_size,
            pixel_height: -pixel_size,
            rotation_x: 0.0,
            rotation_y: 0.0,
        }
    }

    /// Map coordinates of a pixel-space point.
    #[must_use]
    pub fn pixel_to_geo(&self, col: f64, row: f64) -> (f64, f64) {
        let x = self.origin_x + col * self.pixel_width + row * self.rotation_x;
        let y = self.origin_y + col * self.rotation_y + row * self.pixel_height;
        (x, y)
    }

    /// Pixel-space coordinates of a map point. `None` for a degenerate
    /// transform.
    #[must_use]
    pub fn geo_to_pixel(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let det = self.pixel_width * self.pixel_height - self.rotation_x * self.rotation_y;
        if det.abs() < 1e-12 {
            return None;
        }
        let dx = x - self.origin_x;
        let dy = y - self.origin_y;
        let col = (self.pixel_height * dx - self.rotation_x * dy) / det;
        let row = (self.pixel_width * dy - self.rotation_y * dx) / det;
        Some((col, row))
    }

    /// Returns `true` if pixels are axis-aligned rectangles.
    #[must_use]
    pub fn is_axis_aligned(&self) -> bool {
        self.rotation_x == 0.0 && self.rotation_y == 0.0
    }

    /// Area of one pixel in map units squared.
    #[must_use]
    pub fn pixel_area(&self) -> f64 {
        (self.pixel_width * self.pixel_height - self.rotation_x * self.rotation_y).abs()
    }

    fn from_scale_and_tiepoint(scale: &[f64], tiepoint: &[f64]) -> Option<Self> {
        let (&sx, &sy) = (scale.first()?, scale.get(1)?);
        let (&i, &j, &x, &y) = (tiepoint.first()?, tiepoint.get(1)?, tiepoint.get(3)?, tiepoint.get(4)?);
        Some(Self {
            origin_x: i.mul_add(-sx, x),
            origin_y: j.mul_add(sy, y),
            pixel_width: sx,
            pixel_height: -sy,
            rotation_x: 0.0,
            rotation_y: 0.0,
        })
    }

    fn from_matrix(m: &[f64]) -> Option<Self> {
        if m.len() < 8 {
            return None;
        }
        Some(Self {
            origin_x: m[3],
            origin_y: m[7],
            pixel_width: m[0],
            pixel_height: m[5],
            rotation_x: m[1],
            rotation_y: m[4],
        })
    }
}

/// A decoded categorical raster.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoricalRaster {
    width: u32,
    height: u32,
    transform: GeoTransform,
    nodata: Option<ClassCode>,
    epsg: Option<u16>,
    data: Vec<ClassCode>,
}

impl CategoricalRaster {
    /// Builds a raster from row-major class codes.
    ///
    /// # Errors
    ///
    /// Returns [`RasterError::DataSize`] if `data` does not hold
    /// `width * height` samples.
    pub fn from_parts(
        width: u32,
        height: u32,
        transform: GeoTransform,
        nodata: Option<ClassCode>,
        epsg: Option<u16>,
        data: Vec<ClassCode>,
    ) -> Result<Self, RasterError> {
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(RasterError::DataSize {
                expected,
                found: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            transform,
            nodata,
            epsg,
            data,
        })
    }

    /// Opens and decodes a `GeoTIFF` file.
    ///
    /// # Errors
    ///
    /// Returns [`RasterError`] if the file cannot be read or decoded, or
    /// lacks georeferencing.
    pub fn open(path: &Path) -> Result<Self, RasterError> {
        let file = File::open(path).map_err(|source| RasterError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let raster = Self::from_reader(BufReader::new(file))?;
        log::info!(
            "Loaded {}x{} raster {} (EPSG {:?}, nodata {:?})",
            raster.width,
            raster.height,
            path.display(),
            raster.epsg,
            raster.nodata
        );
        Ok(raster)
    }

    /// Decodes a `GeoTIFF` from any seekable reader.
    ///
    /// # Errors
    ///
    /// Returns [`RasterError`] on decoding failure, missing georeferencing,
    /// or a sample format that cannot hold class codes.
    pub fn from_reader<R: Read + Seek>(reader: R) -> Result<Self, RasterError> {
        let mut decoder = Decoder::new(reader)?.with_limits(Limits::unlimited());
        let (width, height) = decoder.dimensions()?;

        let transform = read_transform(&mut decoder)?;
        let nodata = read_nodata(&mut decoder)?;
        let epsg = read_epsg(&mut decoder)?;
        let data = to_class_codes(decoder.read_image()?)?;

        Self::from_parts(width, height, transform, nodata, epsg, data)
    }

    /// Width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Pixel → map transform.
    #[must_use]
    pub const fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    /// NoData code, if declared.
    #[must_use]
    pub const fn nodata(&self) -> Option<ClassCode> {
        self.nodata
    }

    /// Replaces the NoData code.
    pub const fn set_nodata(&mut self, nodata: Option<ClassCode>) {
        self.nodata = nodata;
    }

    /// EPSG code from the `GeoKey` directory, if present.
    #[must_use]
    pub const fn epsg(&self) -> Option<u16> {
        self.epsg
    }

    /// Class code at `(col, row)`, or `None` outside the grid, at NoData,
    /// or for a sample that is not a valid code.
    #[must_use]
    pub fn value(&self, col: u32, row: u32) -> Option<ClassCode> {
        if col >= self.width || row >= self.height {
            return None;
        }
        let code = self.data[row as usize * self.width as usize + col as usize];
        (code != INVALID && Some(code) != self.nodata).then_some(code)
    }

    /// Map-space footprint of a pixel.
    #[must_use]
    pub fn cell_rect(&self, col: u32, row: u32) -> Rect<f64> {
        let (x0, y0) = self.transform.pixel_to_geo(f64::from(col), f64::from(row));
        let (x1, y1) = self
            .transform
            .pixel_to_geo(f64::from(col) + 1.0, f64::from(row) + 1.0);
        Rect::new(coord! { x: x0, y: y0 }, coord! { x: x1, y: y1 })
    }

    /// Pixel window `(col_start..col_end, row_start..row_end)` covering a
    /// map-space rectangle, clipped to the grid. `None` if they do not
    /// overlap.
    #[must_use]
    pub fn window(&self, rect: &Rect<f64>) -> Option<(std::ops::Range<u32>, std::ops::Range<u32>)> {
        let corners = [
            (rect.min().x, rect.min().y),
            (rect.min().x, rect.max().y),
            (rect.max().x, rect.min().y),
            (rect.max().x, rect.max().y),
        ];

        let mut min_col = f64::INFINITY;
        let mut max_col = f64::NEG_INFINITY;
        let mut min_row = f64::INFINITY;
        let mut max_row = f64::NEG_INFINITY;
        for (x, y) in corners {
            let (col, row) = self.transform.geo_to_pixel(x, y)?;
            min_col = min_col.min(col);
            max_col = max_col.max(col);
            min_row = min_row.min(row);
            max_row = max_row.max(row);
        }

        let clamp = |v: f64, max: u32| -> u32 {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let v = v.clamp(0.0, f64::from(max)) as u32;
            v
        };
        let cols = clamp(min_col.floor(), self.width)..clamp(max_col.ceil(), self.width);
        let rows = clamp(min_row.floor(), self.height)..clamp(max_row.ceil(), self.height);

        (!cols.is_empty() && !rows.is_empty()).then_some((cols, rows))
    }

    /// Pixel count per valid class code.
    #[must_use]
    pub fn histogram(&self) -> BTreeMap<ClassCode, u64> {
        let mut counts = BTreeMap::new();
        for &code in &self.data {
            if code != INVALID && Some(code) != self.nodata {
                *counts.entry(code).or_insert(0) += 1;
            }
        }
        counts
    }
}

fn read_transform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<GeoTransform, RasterError> {
    let scale = find_f64_vec(decoder, MODEL_PIXEL_SCALE)?;
    let tiepoint = find_f64_vec(decoder, MODEL_TIEPOINT)?;
    if let (Some(scale), Some(tiepoint)) = (&scale, &tiepoint)
        && let Some(transform) = GeoTransform::from_scale_and_tiepoint(scale, tiepoint)
    {
        return Ok(transform);
    }

    find_f64_vec(decoder, MODEL_TRANSFORMATION)?
        .as_deref()
        .and_then(GeoTransform::from_matrix)
        .ok_or(RasterError::MissingGeoreference)
}

fn find_f64_vec<R: Read + Seek>(
    decoder: &mut Decoder<R>,
    tag: u16,
) -> Result<Option<Vec<f64>>, RasterError> {
    Ok(decoder
        .find_tag(Tag::from_u16_exhaustive(tag))?
        .map(tiff::decoder::ifd::Value::into_f64_vec)
        .transpose()?)
}

fn read_nodata<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<Option<ClassCode>, RasterError> {
    let Some(value) = decoder.find_tag(Tag::from_u16_exhaustive(GDAL_NODATA))? else {
        return Ok(None);
    };
    let text = value.into_string()?;
    let text = text.trim_matches(char::from(0)).trim();

    let nodata = text.parse::<f64>().ok().and_then(float_to_code);
    if nodata.is_none() {
        log::warn!("Ignoring GDAL_NODATA value {text:?}: not a class code");
    }
    Ok(nodata)
}

fn read_epsg<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<Option<u16>, RasterError> {
    let Some(value) = decoder.find_tag(Tag::from_u16_exhaustive(GEO_KEY_DIRECTORY))? else {
        return Ok(None);
    };
    Ok(epsg_from_geokeys(&value.into_u16_vec()?))
}

/// Reads the EPSG code from a `GeoKey` directory. Only inline key values
/// (tag location 0) are considered; user-defined codes (32767) are ignored.
fn epsg_from_geokeys(keys: &[u16]) -> Option<u16> {
    let entries: BTreeMap<u16, u16> = keys
        .get(4..)?
        .chunks_exact(4)
        .filter(|entry| entry[1] == 0)
        .map(|entry| (entry[0], entry[3]))
        .collect();

    [PROJECTED_CS_TYPE_KEY, GEOGRAPHIC_TYPE_KEY]
        .iter()
        .filter_map(|key| entries.get(key).copied())
        .find(|&code| code != 0 && code != 32767)
}

fn float_to_code(value: f64) -> Option<ClassCode> {
    if !(value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value < f64::from(INVALID)) {
        return None;
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Some(value as ClassCode)
}

fn to_class_codes(image: DecodingResult) -> Result<Vec<ClassCode>, RasterError> {
    let codes = match image {
        DecodingResult::U8(values) => values.into_iter().map(ClassCode::from).collect(),
        DecodingResult::U16(values) => values.into_iter().map(ClassCode::from).collect(),
        DecodingResult::U32(values) => values.into_iter().map(|v| v.min(INVALID)).collect(),
        DecodingResult::I8(values) => values
            .into_iter()
            .map(|v| ClassCode::try_from(v).unwrap_or(INVALID))
            .collect(),
        DecodingResult::I16(values) => values
            .into_iter()
            .map(|v| ClassCode::try_from(v).unwrap_or(INVALID))
            .collect(),
        DecodingResult::I32(values) => values
            .into_iter()
            .map(|v| ClassCode::try_from(v).unwrap_or(INVALID))
            .collect(),
        DecodingResult::F32(values) => values
            .into_iter()
            .map(|v| float_to_code(f64::from(v)).unwrap_or(INVALID))
            .collect(),
        DecodingResult::F64(values) => values
            .into_iter()
            .map(|v| float_to_code(v).unwrap_or(INVALID))
            .collect(),
        _ => {
            return Err(RasterError::UnsupportedSampleFormat(
                "64-bit integer samples".to_string(),
            ));
        }
    };
    Ok(codes)
}
