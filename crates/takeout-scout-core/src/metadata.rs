use std::io::Cursor;

use exif::{Exif, In, Reader, Tag, Value};
use serde::{Deserialize, Serialize};

/// Embedded metadata of one photo entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhotoMetadata {
    pub has_exif: bool,
    pub has_gps: bool,
    pub has_datetime: bool,
    pub camera_make: Option<String>,
    pub camera_model: Option<String>,
    /// Camera-written capture time, verbatim ("YYYY:MM:DD HH:MM:SS")
    pub datetime_original: Option<String>,
    /// Decimal degrees, negative south of the equator
    pub gps_latitude: Option<f64>,
    /// Decimal degrees, negative west of Greenwich
    pub gps_longitude: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Decode metadata from the leading bytes of a photo.
///
/// Returns `None` when neither an EXIF block nor an image header could be
/// decoded. That is the ordinary result for truncated or foreign data and is
/// never treated as an error.
pub fn extract_photo_metadata(bytes: &[u8]) -> Option<PhotoMetadata> {
    let dimensions = header_dimensions(bytes);
    let exif = Reader::new()
        .read_from_container(&mut Cursor::new(bytes))
        .ok();

    if dimensions.is_none() && exif.is_none() {
        return None;
    }

    let mut metadata = PhotoMetadata::default();
    if let Some(exif) = &exif {
        apply_exif(&mut metadata, exif);
    }
    if let Some((w, h)) = dimensions {
        metadata.width = Some(w);
        metadata.height = Some(h);
    }
    Some(metadata)
}

/// Read width/height from the image header without decoding pixel data.
fn header_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

fn apply_exif(metadata: &mut PhotoMetadata, exif: &Exif) {
    metadata.has_exif = exif.fields().next().is_some();

    metadata.camera_make = field_string(exif, Tag::Make);
    metadata.camera_model = field_string(exif, Tag::Model);

    let datetime =
        field_string(exif, Tag::DateTimeOriginal).or_else(|| field_string(exif, Tag::DateTime));
    metadata.has_datetime = datetime.is_some();
    metadata.datetime_original = datetime;

    metadata.width = field_u32(exif, Tag::PixelXDimension).or_else(|| field_u32(exif, Tag::ImageWidth));
    metadata.height =
        field_u32(exif, Tag::PixelYDimension).or_else(|| field_u32(exif, Tag::ImageLength));

    let latitude = gps_coordinate(exif, Tag::GPSLatitude, Tag::GPSLatitudeRef, b'S');
    let longitude = gps_coordinate(exif, Tag::GPSLongitude, Tag::GPSLongitudeRef, b'W');
    if let (Some(lat), Some(lon)) = (latitude, longitude) {
        metadata.has_gps = true;
        metadata.gps_latitude = Some(lat);
        metadata.gps_longitude = Some(lon);
    }
}

/// Convert a degrees/minutes/seconds rational triple to signed decimal degrees.
fn gps_coordinate(exif: &Exif, tag: Tag, ref_tag: Tag, negative_ref: u8) -> Option<f64> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    let Value::Rational(ref parts) = field.value else {
        return None;
    };
    if parts.len() < 3 || parts.iter().take(3).any(|r| r.denom == 0) {
        return None;
    }
    let degrees = parts[0].to_f64() + parts[1].to_f64() / 60.0 + parts[2].to_f64() / 3600.0;
    if !degrees.is_finite() {
        return None;
    }

    let negative = exif
        .get_field(ref_tag, In::PRIMARY)
        .and_then(|f| match &f.value {
            Value::Ascii(v) => v.first().and_then(|s| s.first()).copied(),
            _ => None,
        })
        .is_some_and(|c| c.eq_ignore_ascii_case(&negative_ref));

    Some(if negative { -degrees } else { degrees })
}

fn field_string(exif: &Exif, tag: Tag) -> Option<String> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    let Value::Ascii(ref vec) = field.value else {
        return None;
    };
    let bytes = vec.first()?;
    let s = std::str::from_utf8(bytes).ok()?;
    let trimmed = s.trim_end_matches('\0').trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn field_u32(exif: &Exif, tag: Tag) -> Option<u32> {
    match exif.get_field(tag, In::PRIMARY)?.value {
        Value::Long(ref v) => v.first().copied(),
        Value::Short(ref v) => v.first().map(|n| *n as u32),
        _ => None,
    }
}
