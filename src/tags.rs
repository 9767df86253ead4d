//! EXIF tag directory decoding
//!
//! An EXIF metadata block is laid out like a small TIFF file:
//!
//! - 2-byte byte order mark (`II` little endian, `MM` big endian)
//! - 2-byte magic number 42
//! - 4-byte offset of the first image file directory (IFD0)
//!
//! Each IFD is a 2-byte entry count, a run of 12-byte entries
//! (tag id, type code, value count, value or offset) and the 4-byte offset
//! of the next IFD. Values that fit in four bytes are stored inline.
//!
//! Sections are mapped as follows:
//!
//! | IFD                             | Section     |
//! |---------------------------------|-------------|
//! | IFD0                            | `Primary`   |
//! | IFD0 tag 0x8769 (Exif pointer)  | `Capture`   |
//! | IFD0 tag 0x8825 (GPS pointer)   | `Gps`       |
//! | IFD1 (next after IFD0)          | `Thumbnail` |

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::error::MetadataError;

/// Tag ids consumed by the pipeline
pub mod tag {
    pub const MAKE: u16 = 0x010F;
    pub const MODEL: u16 = 0x0110;
    pub const DATE_TIME: u16 = 0x0132;
    pub const JPEG_INTERCHANGE_FORMAT: u16 = 0x0201;
    pub const JPEG_INTERCHANGE_FORMAT_LENGTH: u16 = 0x0202;
    pub const EXIF_IFD_POINTER: u16 = 0x8769;
    pub const GPS_IFD_POINTER: u16 = 0x8825;

    pub const GPS_LATITUDE_REF: u16 = 0x0001;
    pub const GPS_LATITUDE: u16 = 0x0002;
    pub const GPS_LONGITUDE_REF: u16 = 0x0003;
    pub const GPS_LONGITUDE: u16 = 0x0004;
}

// ============================================================================
// Values
// ============================================================================

/// Dictionary section a tag was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Section {
    Primary,
    Capture,
    Gps,
    Thumbnail,
}

impl Section {
    pub const ALL: [Section; 4] = [Section::Primary, Section::Capture, Section::Gps, Section::Thumbnail];

    fn index(self) -> usize {
        match self {
            Section::Primary => 0,
            Section::Capture => 1,
            Section::Gps => 2,
            Section::Thumbnail => 3,
        }
    }
}

/// Unsigned rational (TIFF type 5)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Rational {
    pub numerator: u32,
    pub denominator: u32,
}

impl Rational {
    pub fn new(numerator: u32, denominator: u32) -> Self {
        Self { numerator, denominator }
    }

    /// `None` when the denominator is zero
    pub fn to_f64(&self) -> Option<f64> {
        if self.denominator == 0 {
            None
        } else {
            Some(self.numerator as f64 / self.denominator as f64)
        }
    }
}

/// Signed rational (TIFF type 10)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SRational {
    pub numerator: i32,
    pub denominator: i32,
}

/// Raw tag value, one variant per TIFF type code
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TagValue {
    Byte(Vec<u8>),
    Ascii(Vec<u8>),
    Short(Vec<u16>),
    Long(Vec<u32>),
    Rational(Vec<Rational>),
    SByte(Vec<i8>),
    Undefined(Vec<u8>),
    SShort(Vec<i16>),
    SLong(Vec<i32>),
    SRational(Vec<SRational>),
    Float(Vec<f32>),
    Double(Vec<f64>),
}

impl TagValue {
    /// Decode an ASCII value as UTF-8, dropping invalid sequences and
    /// trailing NUL terminators. Non-ASCII values yield `None`.
    pub fn as_text(&self) -> Option<String> {
        match self {
            TagValue::Ascii(bytes) => Some(decode_text(bytes)),
            _ => None,
        }
    }

    pub fn as_rationals(&self) -> Option<&[Rational]> {
        match self {
            TagValue::Rational(v) => Some(v),
            _ => None,
        }
    }

    /// First component of an unsigned integer value
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            TagValue::Byte(v) => v.first().map(|&b| b as u32),
            TagValue::Short(v) => v.first().map(|&s| s as u32),
            TagValue::Long(v) => v.first().copied(),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            TagValue::Byte(_) => "BYTE",
            TagValue::Ascii(_) => "ASCII",
            TagValue::Short(_) => "SHORT",
            TagValue::Long(_) => "LONG",
            TagValue::Rational(_) => "RATIONAL",
            TagValue::SByte(_) => "SBYTE",
            TagValue::Undefined(_) => "UNDEFINED",
            TagValue::SShort(_) => "SSHORT",
            TagValue::SLong(_) => "SLONG",
            TagValue::SRational(_) => "SRATIONAL",
            TagValue::Float(_) => "FLOAT",
            TagValue::Double(_) => "DOUBLE",
        }
    }
}

fn decode_text(bytes: &[u8]) -> String {
    let mut text = String::with_capacity(bytes.len());
    for chunk in bytes.utf8_chunks() {
        text.push_str(chunk.valid());
    }
    text.trim_end_matches('\0').trim().to_string()
}

// ============================================================================
// Dictionary
// ============================================================================

pub type TagMap = BTreeMap<u16, TagValue>;

/// Decoded tags grouped by section. All four sections are always present.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagDictionary {
    sections: [TagMap; 4],
    thumbnail: Option<Vec<u8>>,
}

impl TagDictionary {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn section(&self, section: Section) -> &TagMap {
        &self.sections[section.index()]
    }

    pub fn get(&self, section: Section, tag: u16) -> Option<&TagValue> {
        self.section(section).get(&tag)
    }

    /// Non-empty text value of an ASCII tag
    pub fn text(&self, section: Section, tag: u16) -> Option<String> {
        self.get(section, tag)
            .and_then(TagValue::as_text)
            .filter(|s| !s.is_empty())
    }

    /// Embedded JPEG thumbnail referenced by IFD1, if any
    pub fn thumbnail(&self) -> Option<&[u8]> {
        self.thumbnail.as_deref()
    }

    pub fn tag_count(&self) -> usize {
        self.sections.iter().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.tag_count() == 0
    }

    #[cfg(test)]
    pub(crate) fn with_gps(gps: TagMap) -> Self {
        let mut dict = Self::empty();
        dict.insert_section(Section::Gps, gps);
        dict
    }

    fn insert_section(&mut self, section: Section, tags: TagMap) {
        self.sections[section.index()] = tags;
    }
}

// ============================================================================
// Parsing
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    fn u16(self, b: &[u8]) -> u16 {
        match self {
            ByteOrder::Little => u16::from_le_bytes([b[0], b[1]]),
            ByteOrder::Big => u16::from_be_bytes([b[0], b[1]]),
        }
    }

    fn u32(self, b: &[u8]) -> u32 {
        match self {
            ByteOrder::Little => u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            ByteOrder::Big => u32::from_be_bytes([b[0], b[1], b[2], b[3]]),
        }
    }

    fn u64(self, b: &[u8]) -> u64 {
        let bytes = [b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]];
        match self {
            ByteOrder::Little => u64::from_le_bytes(bytes),
            ByteOrder::Big => u64::from_be_bytes(bytes),
        }
    }
}

/// Byte width of one component for a TIFF type code
fn component_size(type_code: u16) -> Option<usize> {
    match type_code {
        1 | 2 | 6 | 7 => Some(1),
        3 | 8 => Some(2),
        4 | 9 | 11 | 13 => Some(4),
        5 | 10 | 12 => Some(8),
        _ => None,
    }
}

struct IfdReader<'a> {
    data: &'a [u8],
    order: ByteOrder,
}

impl<'a> IfdReader<'a> {
    fn bytes(&self, offset: usize, len: usize) -> Option<&'a [u8]> {
        self.data.get(offset..offset.checked_add(len)?)
    }

    fn u16_at(&self, offset: usize) -> Option<u16> {
        self.bytes(offset, 2).map(|b| self.order.u16(b))
    }

    fn u32_at(&self, offset: usize) -> Option<u32> {
        self.bytes(offset, 4).map(|b| self.order.u32(b))
    }

    /// Read one IFD, returning its tags and the offset of the next IFD (0 = none)
    fn read_ifd(&self, offset: u32) -> Result<(TagMap, u32), MetadataError> {
        let start = offset as usize;
        let count = self
            .u16_at(start)
            .ok_or(MetadataError::IfdOutOfBounds(offset))? as usize;

        let mut tags = TagMap::new();
        for i in 0..count {
            let entry = start + 2 + i * 12;
            if self.bytes(entry, 12).is_none() {
                warn!("IFD at {} truncated after {} of {} entries", offset, i, count);
                return Ok((tags, 0));
            }
            match self.read_entry(entry) {
                Some((id, value)) => {
                    tags.insert(id, value);
                }
                None => debug!("Skipping unreadable IFD entry at offset {}", entry),
            }
        }

        let next = self.u32_at(start + 2 + count * 12).unwrap_or(0);
        Ok((tags, next))
    }

    fn read_entry(&self, entry: usize) -> Option<(u16, TagValue)> {
        let id = self.u16_at(entry)?;
        let type_code = self.u16_at(entry + 2)?;
        let count = self.u32_at(entry + 4)? as usize;
        let size = component_size(type_code)?;
        let total = count.checked_mul(size)?;

        let raw = if total <= 4 {
            self.bytes(entry + 8, total)?
        } else {
            let offset = self.u32_at(entry + 8)? as usize;
            match self.bytes(offset, total) {
                Some(raw) => raw,
                None => {
                    warn!("Tag {:#06x} value ({} bytes at {}) lies outside the metadata block", id, total, offset);
                    return None;
                }
            }
        };

        Some((id, self.decode_value(type_code, raw)?))
    }

    fn decode_value(&self, type_code: u16, raw: &[u8]) -> Option<TagValue> {
        let order = self.order;
        let value = match type_code {
            1 => TagValue::Byte(raw.to_vec()),
            2 => TagValue::Ascii(raw.to_vec()),
            3 => TagValue::Short(raw.chunks_exact(2).map(|c| order.u16(c)).collect()),
            4 | 13 => TagValue::Long(raw.chunks_exact(4).map(|c| order.u32(c)).collect()),
            5 => TagValue::Rational(
                raw.chunks_exact(8)
                    .map(|c| Rational::new(order.u32(&c[..4]), order.u32(&c[4..])))
                    .collect(),
            ),
            6 => TagValue::SByte(raw.iter().map(|&b| b as i8).collect()),
            7 => TagValue::Undefined(raw.to_vec()),
            8 => TagValue::SShort(raw.chunks_exact(2).map(|c| order.u16(c) as i16).collect()),
            9 => TagValue::SLong(raw.chunks_exact(4).map(|c| order.u32(c) as i32).collect()),
            10 => TagValue::SRational(
                raw.chunks_exact(8)
                    .map(|c| SRational {
                        numerator: order.u32(&c[..4]) as i32,
                        denominator: order.u32(&c[4..]) as i32,
                    })
                    .collect(),
            ),
            11 => TagValue::Float(raw.chunks_exact(4).map(|c| f32::from_bits(order.u32(c))).collect()),
            12 => TagValue::Double(raw.chunks_exact(8).map(|c| f64::from_bits(order.u64(c))).collect()),
            _ => return None,
        };
        Some(value)
    }

    /// Follow a pointer tag into a sub-IFD; unreadable sub-IFDs are dropped
    fn read_sub_ifd(&self, parent: &TagMap, pointer: u16, section: Section) -> TagMap {
        let Some(offset) = parent.get(&pointer).and_then(TagValue::as_u32) else {
            return TagMap::new();
        };
        match self.read_ifd(offset) {
            Ok((tags, _)) => tags,
            Err(e) => {
                warn!("Ignoring {:?} section: {}", section, e);
                TagMap::new()
            }
        }
    }
}

/// Parse a TIFF-layout metadata block (the payload after any container
/// header such as `Exif\0\0`) into a [`TagDictionary`].
///
/// Only a broken header or an unreachable IFD0 is an error. Unreadable
/// entries and sub-IFDs are skipped with a warning.
pub fn parse(block: &[u8]) -> Result<TagDictionary, MetadataError> {
    if block.len() < 8 {
        return Err(MetadataError::TooShort(block.len()));
    }

    let order = match &block[..2] {
        b"II" => ByteOrder::Little,
        b"MM" => ByteOrder::Big,
        other => return Err(MetadataError::InvalidByteOrder(u16::from_be_bytes([other[0], other[1]]))),
    };

    let reader = IfdReader { data: block, order };
    let magic = order.u16(&block[2..4]);
    if magic != 42 {
        return Err(MetadataError::InvalidMagic(magic));
    }

    let ifd0 = order.u32(&block[4..8]);
    let (primary, next) = reader.read_ifd(ifd0)?;

    let mut dict = TagDictionary::empty();
    dict.insert_section(
        Section::Capture,
        reader.read_sub_ifd(&primary, tag::EXIF_IFD_POINTER, Section::Capture),
    );
    dict.insert_section(
        Section::Gps,
        reader.read_sub_ifd(&primary, tag::GPS_IFD_POINTER, Section::Gps),
    );
    dict.insert_section(Section::Primary, primary);

    if next != 0 {
        match reader.read_ifd(next) {
            Ok((thumbnail, _)) => {
                dict.thumbnail = thumbnail_bytes(&reader, &thumbnail);
                dict.insert_section(Section::Thumbnail, thumbnail);
            }
            Err(e) => warn!("Ignoring Thumbnail section: {}", e),
        }
    }

    debug!(
        "Decoded {} tags (primary={}, capture={}, gps={}, thumbnail={})",
        dict.tag_count(),
        dict.section(Section::Primary).len(),
        dict.section(Section::Capture).len(),
        dict.section(Section::Gps).len(),
        dict.section(Section::Thumbnail).len(),
    );

    Ok(dict)
}

fn thumbnail_bytes(reader: &IfdReader<'_>, ifd1: &TagMap) -> Option<Vec<u8>> {
    let offset = ifd1.get(&tag::JPEG_INTERCHANGE_FORMAT)?.as_u32()? as usize;
    let len = ifd1.get(&tag::JPEG_INTERCHANGE_FORMAT_LENGTH)?.as_u32()? as usize;
    reader.bytes(offset, len).map(<[u8]>::to_vec)
}

// ============================================================================
// Tests
// ============================================================================
