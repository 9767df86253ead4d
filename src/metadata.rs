//! Metadata block extraction from image containers
//!
//! The container is identified with the `image` crate (magic bytes plus a
//! header decode), then the embedded EXIF payload is located by walking the
//! container's own structure:
//!
//! - **JPEG**: APP1 segment starting with `Exif\0\0`
//! - **PNG**: `eXIf` chunk
//! - **WebP**: `EXIF` RIFF chunk
//! - **TIFF**: the file itself is the metadata block
//!
//! Every other format the `image` crate can open simply has no metadata block.
//!
//! ## Example
//!
//! ```rust,ignore
//! use imagerff::metadata::decode;
//! use imagerff::tags::{tag, Section};
//!
//! let tags = decode(Path::new("photo_backup_20240101_120000.jpg"))?;
//! println!("Camera: {:?}", tags.text(Section::Primary, tag::MAKE));
//! ```

use image::error::{ImageFormatHint, UnsupportedError, UnsupportedErrorKind};
use image::{ImageError, ImageFormat, ImageReader};
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

use crate::error::{ExtractError, FormatError, Result};
use crate::tags::{self, TagDictionary};

/// Prefix of EXIF payloads in JPEG APP1 segments (and optionally WebP/PNG)
pub const EXIF_HEADER: &[u8] = b"Exif\0\0";

/// Decode the tag dictionary embedded in an image file.
///
/// A file without a metadata block yields an empty dictionary.
pub fn decode(path: &Path) -> Result<TagDictionary> {
    if !path.is_file() {
        return Err(ExtractError::NotFound(path.to_path_buf()));
    }

    let bytes = std::fs::read(path).map_err(|e| ExtractError::io(path, e))?;

    let format = identify(&bytes).map_err(|source| ExtractError::UnsupportedFormat {
        path: path.to_path_buf(),
        source,
    })?;

    let Some(block) = locate_metadata_block(format, &bytes) else {
        debug!("No metadata block in {} ({:?})", path.display(), format);
        return Ok(TagDictionary::empty());
    };

    debug!("Found {}-byte metadata block in {} ({:?})", block.len(), path.display(), format);

    tags::parse(block).map_err(|e| ExtractError::UnsupportedFormat {
        path: path.to_path_buf(),
        source: FormatError::Metadata(e),
    })
}

/// Identify the container and make sure its header decodes
pub fn identify(bytes: &[u8]) -> std::result::Result<ImageFormat, FormatError> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(ImageError::from)?;

    let Some(format) = reader.format() else {
        return Err(FormatError::Image(ImageError::Unsupported(
            UnsupportedError::from_format_and_kind(
                ImageFormatHint::Unknown,
                UnsupportedErrorKind::Format(ImageFormatHint::Unknown),
            ),
        )));
    };

    reader.into_dimensions()?;
    Ok(format)
}

/// Find the TIFF-layout metadata payload inside container bytes
pub fn locate_metadata_block(format: ImageFormat, bytes: &[u8]) -> Option<&[u8]> {
    match format {
        ImageFormat::Jpeg => jpeg_exif(bytes),
        ImageFormat::Png => png_exif(bytes),
        ImageFormat::WebP => webp_exif(bytes),
        ImageFormat::Tiff => Some(bytes),
        _ => None,
    }
}

fn strip_exif_header(payload: &[u8]) -> &[u8] {
    payload.strip_prefix(EXIF_HEADER).unwrap_or(payload)
}

// ============================================================================
// Container walkers
// ============================================================================

fn jpeg_exif(bytes: &[u8]) -> Option<&[u8]> {
    if !bytes.starts_with(&[0xFF, 0xD8]) {
        return None;
    }

    let mut pos = 2;
    while pos + 4 <= bytes.len() {
        if bytes[pos] != 0xFF {
            debug!("JPEG marker expected at offset {}", pos);
            return None;
        }

        let marker = bytes[pos + 1];
        match marker {
            // fill byte
            0xFF => {
                pos += 1;
                continue;
            }
            // standalone markers carry no length
            0x01 | 0xD0..=0xD8 => {
                pos += 2;
                continue;
            }
            // EOI or start of scan: no metadata past this point
            0xD9 | 0xDA => return None,
            _ => {}
        }

        let len = u16::from_be_bytes([bytes[pos + 2], bytes[pos + 3]]) as usize;
        if len < 2 {
            return None;
        }
        let body = bytes.get(pos + 4..pos + 2 + len)?;

        if marker == 0xE1 {
            if let Some(tiff) = body.strip_prefix(EXIF_HEADER) {
                return Some(tiff);
            }
        }

        pos += 2 + len;
    }

    None
}

fn png_exif(bytes: &[u8]) -> Option<&[u8]> {
    let mut pos = 8;
    while let Some(header) = bytes.get(pos..pos + 8) {
        let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let data_start = pos + 8;
        let data = bytes.get(data_start..data_start.checked_add(len)?)?;

        match &header[4..8] {
            b"eXIf" => return Some(strip_exif_header(data)),
            b"IEND" => return None,
            _ => {}
        }

        // data + 4-byte CRC
        pos = data_start + len + 4;
    }

    None
}

fn webp_exif(bytes: &[u8]) -> Option<&[u8]> {
    if bytes.get(0..4)? != b"RIFF" || bytes.get(8..12)? != b"WEBP" {
        return None;
    }

    let mut pos = 12;
    while let Some(header) = bytes.get(pos..pos + 8) {
        let len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;
        let data_start = pos + 8;
        let data = bytes.get(data_start..data_start.checked_add(len)?)?;

        if &header[..4] == b"EXIF" {
            return Some(strip_exif_header(data));
        }

        // chunks are padded to even length
        pos = data_start + len + (len & 1);
    }

    None
}

// ============================================================================
// Tests
// ============================================================================
