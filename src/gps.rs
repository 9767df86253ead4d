//! GPS coordinate resolution
//!
//! Converts the GPS section's degree/minute/second rational triples and
//! hemisphere letters into signed decimal degrees.

use serde::{Deserialize, Serialize};

use crate::error::{ExtractError, Result};
use crate::tags::{tag, Rational, Section, TagDictionary, TagValue};

/// Signed decimal coordinates (south and west are negative)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Latitude,
    Longitude,
}

impl Axis {
    fn name(self) -> &'static str {
        match self {
            Axis::Latitude => "latitude",
            Axis::Longitude => "longitude",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hemisphere {
    North,
    South,
    East,
    West,
}

impl Hemisphere {
    /// Parse a reference tag; it must be exactly one letter valid for the axis
    fn parse(value: &TagValue, axis: Axis) -> Result<Self> {
        let TagValue::Ascii(bytes) = value else {
            return Err(ExtractError::MalformedGpsTag(format!(
                "{} reference has type {}, expected ASCII",
                axis.name(),
                value.type_name()
            )));
        };

        let letter = match bytes.as_slice() {
            [b] | [b, 0] => *b,
            _ => {
                return Err(ExtractError::MalformedGpsTag(format!(
                    "{} reference {:?} is not a single letter",
                    axis.name(),
                    String::from_utf8_lossy(bytes)
                )))
            }
        };

        match (axis, letter) {
            (Axis::Latitude, b'N') => Ok(Hemisphere::North),
            (Axis::Latitude, b'S') => Ok(Hemisphere::South),
            (Axis::Longitude, b'E') => Ok(Hemisphere::East),
            (Axis::Longitude, b'W') => Ok(Hemisphere::West),
            _ => Err(ExtractError::MalformedGpsTag(format!(
                "{} reference {:?} is not a valid hemisphere",
                axis.name(),
                letter as char
            ))),
        }
    }

    pub fn sign(self) -> f64 {
        match self {
            Hemisphere::North | Hemisphere::East => 1.0,
            Hemisphere::South | Hemisphere::West => -1.0,
        }
    }
}

/// Degrees + minutes/60 + seconds/3600
pub fn dms_to_decimal(degrees: f64, minutes: f64, seconds: f64) -> f64 {
    degrees + minutes / 60.0 + seconds / 3600.0
}

/// Resolve the GPS section into coordinates.
///
/// Returns `Ok(None)` when the section is empty or any of the four
/// latitude/longitude tags is missing. Structurally invalid tags (zero
/// denominators, wrong types, bad hemisphere letters) are
/// [`ExtractError::MalformedGpsTag`].
pub fn resolve(tags: &TagDictionary) -> Result<Option<Coordinates>> {
    let gps = tags.section(Section::Gps);

    let (Some(lat_ref), Some(lat), Some(lon_ref), Some(lon)) = (
        gps.get(&tag::GPS_LATITUDE_REF),
        gps.get(&tag::GPS_LATITUDE),
        gps.get(&tag::GPS_LONGITUDE_REF),
        gps.get(&tag::GPS_LONGITUDE),
    ) else {
        return Ok(None);
    };

    Ok(Some(Coordinates {
        latitude: signed_degrees(lat, lat_ref, Axis::Latitude)?,
        longitude: signed_degrees(lon, lon_ref, Axis::Longitude)?,
    }))
}

fn signed_degrees(dms: &TagValue, reference: &TagValue, axis: Axis) -> Result<f64> {
    let hemisphere = Hemisphere::parse(reference, axis)?;

    let components = match dms.as_rationals() {
        Some(v) if v.len() >= 3 => v,
        _ => {
            return Err(ExtractError::MalformedGpsTag(format!(
                "{} must be three rationals, got {}",
                axis.name(),
                value_shape(dms)
            )))
        }
    };

    let degrees = component(&components[0], axis, "degrees")?;
    let minutes = component(&components[1], axis, "minutes")?;
    let seconds = component(&components[2], axis, "seconds")?;

    Ok(hemisphere.sign() * dms_to_decimal(degrees, minutes, seconds))
}

fn component(r: &Rational, axis: Axis, part: &str) -> Result<f64> {
    r.to_f64().ok_or_else(|| {
        ExtractError::MalformedGpsTag(format!(
            "{} {} {}/{} has a zero denominator",
            axis.name(),
            part,
            r.numerator,
            r.denominator
        ))
    })
}

fn value_shape(value: &TagValue) -> String {
    match value.as_rationals() {
        Some(v) => format!("{} rationals", v.len()),
        None => value.type_name().to_string(),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::TagMap;

    fn dms(d: (u32, u32), m: (u32, u32), s: (u32, u32)) -> TagValue {
        TagValue::Rational(vec![
            Rational::new(d.0, d.1),
            Rational::new(m.0, m.1),
            Rational::new(s.0, s.1),
        ])
    }

    fn ascii(s: &str) -> TagValue {
        let mut bytes = s.as_bytes().to_vec();
        bytes.push(0);
        TagValue::Ascii(bytes)
    }

    fn dictionary(entries: Vec<(u16, TagValue)>) -> TagDictionary {
        let gps: TagMap = entries.into_iter().collect();
        TagDictionary::with_gps(gps)
    }

    fn full_group(lat_ref: &str, lon_ref: &str) -> TagDictionary {
        dictionary(vec![
            (tag::GPS_LATITUDE_REF, ascii(lat_ref)),
            (tag::GPS_LATITUDE, dms((40, 1), (26, 1), (46, 1))),
            (tag::GPS_LONGITUDE_REF, ascii(lon_ref)),
            (tag::GPS_LONGITUDE, dms((79, 1), (58, 1), (56, 1))),
        ])
    }

    #[test]
    fn test_dms_conversion() {
        let coords = resolve(&full_group("N", "E")).unwrap().unwrap();
        assert!((coords.latitude - 40.446111).abs() < 1e-6);
        assert!((coords.longitude - 79.982222).abs() < 1e-6);
    }

    #[test]
    fn test_hemisphere_signs() {
        for (lat_ref, lon_ref) in [("N", "E"), ("S", "E"), ("N", "W"), ("S", "W")] {
            let coords = resolve(&full_group(lat_ref, lon_ref)).unwrap().unwrap();
            assert_eq!(coords.latitude >= 0.0, lat_ref == "N", "latitude sign for {}", lat_ref);
            assert_eq!(coords.longitude >= 0.0, lon_ref == "E", "longitude sign for {}", lon_ref);
        }
    }

    #[test]
    fn test_zero_is_non_negative_and_non_positive() {
        let tags = dictionary(vec![
            (tag::GPS_LATITUDE_REF, ascii("S")),
            (tag::GPS_LATITUDE, dms((0, 1), (0, 1), (0, 1))),
            (tag::GPS_LONGITUDE_REF, ascii("E")),
            (tag::GPS_LONGITUDE, dms((0, 1), (0, 1), (0, 1))),
        ]);
        let coords = resolve(&tags).unwrap().unwrap();
        assert!(coords.latitude <= 0.0);
        assert!(coords.longitude >= 0.0);
    }

    #[test]
    fn test_fractional_seconds() {
        let tags = dictionary(vec![
            (tag::GPS_LATITUDE_REF, ascii("S")),
            (tag::GPS_LATITUDE, dms((33, 1), (52, 1), (1234, 100))),
            (tag::GPS_LONGITUDE_REF, ascii("E")),
            (tag::GPS_LONGITUDE, dms((151, 1), (1230, 100), (0, 1))),
        ]);
        let coords = resolve(&tags).unwrap().unwrap();
        assert!((coords.latitude + (33.0 + 52.0 / 60.0 + 12.34 / 3600.0)).abs() < 1e-9);
        assert!((coords.longitude - (151.0 + 12.3 / 60.0)).abs() < 1e-9);
    }

    #[test]
    fn test_missing_section_is_none() {
        assert_eq!(resolve(&TagDictionary::empty()).unwrap(), None);
    }

    #[test]
    fn test_partial_group_is_none() {
        let tags = dictionary(vec![
            (tag::GPS_LATITUDE_REF, ascii("N")),
            (tag::GPS_LATITUDE, dms((40, 1), (26, 1), (46, 1))),
        ]);
        assert_eq!(resolve(&tags).unwrap(), None);
    }

    #[test]
    fn test_zero_denominator_is_malformed() {
        let tags = dictionary(vec![
            (tag::GPS_LATITUDE_REF, ascii("N")),
            (tag::GPS_LATITUDE, dms((40, 1), (26, 0), (46, 1))),
            (tag::GPS_LONGITUDE_REF, ascii("E")),
            (tag::GPS_LONGITUDE, dms((79, 1), (58, 1), (56, 1))),
        ]);
        let err = resolve(&tags).unwrap_err();
        assert!(matches!(err, ExtractError::MalformedGpsTag(ref msg) if msg.contains("minutes")));
    }

    #[test]
    fn test_invalid_reference_is_malformed() {
        for bad in ["X", "NE", "", "E"] {
            let base = full_group("N", "E");
            let tags = TagDictionary::with_gps(
                base.section(Section::Gps)
                    .clone()
                    .into_iter()
                    .map(|(id, v)| if id == tag::GPS_LATITUDE_REF { (id, ascii(bad)) } else { (id, v) })
                    .collect(),
            );
            assert!(
                matches!(resolve(&tags), Err(ExtractError::MalformedGpsTag(_))),
                "reference {:?} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_wrong_value_type_is_malformed() {
        let tags = dictionary(vec![
            (tag::GPS_LATITUDE_REF, ascii("N")),
            (tag::GPS_LATITUDE, TagValue::Short(vec![40, 26, 46])),
            (tag::GPS_LONGITUDE_REF, ascii("E")),
            (tag::GPS_LONGITUDE, dms((79, 1), (58, 1), (56, 1))),
        ]);
        assert!(matches!(resolve(&tags), Err(ExtractError::MalformedGpsTag(_))));

        let tags = dictionary(vec![
            (tag::GPS_LATITUDE_REF, TagValue::Byte(vec![b'N'])),
            (tag::GPS_LATITUDE, dms((40, 1), (26, 1), (46, 1))),
            (tag::GPS_LONGITUDE_REF, ascii("E")),
            (tag::GPS_LONGITUDE, dms((79, 1), (58, 1), (56, 1))),
        ]);
        assert!(matches!(resolve(&tags), Err(ExtractError::MalformedGpsTag(_))));
    }

    #[test]
    fn test_short_dms_is_malformed() {
        let tags = dictionary(vec![
            (tag::GPS_LATITUDE_REF, ascii("N")),
            (tag::GPS_LATITUDE, TagValue::Rational(vec![Rational::new(40, 1)])),
            (tag::GPS_LONGITUDE_REF, ascii("E")),
            (tag::GPS_LONGITUDE, dms((79, 1), (58, 1), (56, 1))),
        ]);
        assert!(matches!(resolve(&tags), Err(ExtractError::MalformedGpsTag(_))));
    }

    #[test]
    fn test_extra_dms_components_are_ignored() {
        let latitude = vec![
            Rational::new(40, 1),
            Rational::new(26, 1),
            Rational::new(46, 1),
            Rational::new(7, 0),
        ];
        let tags = dictionary(vec![
            (tag::GPS_LATITUDE_REF, ascii("N")),
            (tag::GPS_LATITUDE, TagValue::Rational(latitude)),
            (tag::GPS_LONGITUDE_REF, ascii("E")),
            (tag::GPS_LONGITUDE, dms((79, 1), (58, 1), (56, 1))),
        ]);

        let coords = resolve(&tags).unwrap().unwrap();
        assert!((coords.latitude - 40.446111).abs() < 1e-6);
    }
}
