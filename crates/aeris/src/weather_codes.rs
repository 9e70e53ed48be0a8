//! Decoder for the provider's `coverage:intensity:weather` coded strings.
//!
//! Each segment is looked up in its own vocabulary. Unknown segment values
//! map to [`UNKNOWN_CODE`] rather than failing, the provider adds codes over
//! time.

use crate::error::AerisError;

/// Sentinel reported for a segment value outside the known vocabulary.
pub const UNKNOWN_CODE: u8 = 99;

/// Decoded weather triplet, one host index code per segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeatherCodes {
    pub coverage: u8,
    pub intensity: u8,
    pub condition: u8,
}

/// Split and decode a coded weather string such as `"C:L:RW"`.
///
/// Fewer than three segments is a [`AerisError::MalformedCode`]. Segments past
/// the third are ignored.
pub fn decode(coded: &str) -> Result<WeatherCodes, AerisError> {
    let mut parts = coded.split(':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(coverage), Some(intensity), Some(condition)) => Ok(WeatherCodes {
            coverage: coverage_code(coverage),
            intensity: intensity_code(intensity),
            condition: condition_code(condition),
        }),
        _ => Err(AerisError::MalformedCode(coded.to_string())),
    }
}

pub fn coverage_code(segment: &str) -> u8 {
    match segment.trim() {
        "" => 0,
        "AR" => 1,  // areas of
        "BR" => 2,  // brief
        "C" => 3,   // chance of
        "D" => 4,   // definite
        "FQ" => 5,  // frequent
        "IN" => 6,  // intermittent
        "IS" => 7,  // isolated
        "L" => 8,   // likely
        "NM" => 9,  // numerous
        "O" => 10,  // occasional
        "PA" => 11, // patchy
        "PD" => 12, // periods of
        "S" => 13,  // slight chance
        "SC" => 14, // scattered
        "VC" => 15, // in the vicinity
        "WD" => 16, // widespread
        _ => UNKNOWN_CODE,
    }
}

pub fn intensity_code(segment: &str) -> u8 {
    match segment.trim() {
        // empty means moderate
        "" => 0,
        "VL" => 1,
        "L" => 2,
        "H" => 3,
        "VH" => 4,
        _ => UNKNOWN_CODE,
    }
}

pub fn condition_code(segment: &str) -> u8 {
    match segment.trim() {
        "" => 0,
        "A" => 1,   // hail
        "BD" => 2,  // blowing dust
        "BN" => 3,  // blowing sand
        "BR" => 4,  // mist
        "BS" => 5,  // blowing snow
        "BY" => 6,  // blowing spray
        "F" => 7,   // fog
        "FR" => 8,  // frost
        "H" => 9,   // haze
        "IC" => 10, // ice crystals
        "IF" => 11, // ice fog
        "IP" => 12, // sleet
        "K" => 13,  // smoke
        "L" => 14,  // drizzle
        "R" => 15,  // rain
        "RW" => 16, // rain showers
        "RS" => 17, // rain/snow mix
        "SI" => 18, // snow/sleet mix
        "WM" => 19, // wintry mix
        "S" => 20,  // snow
        "SW" => 21, // snow showers
        "T" => 22,  // thunderstorms
        "UP" => 23, // unknown precipitation
        "VA" => 24, // volcanic ash
        "WP" => 25, // waterspouts
        "ZF" => 26, // freezing fog
        "ZL" => 27, // freezing drizzle
        "ZR" => 28, // freezing rain
        "ZY" => 29, // freezing spray
        "CL" => 30, // clear
        "FW" => 31, // fair
        "SC" => 32, // partly cloudy
        "BK" => 33, // mostly cloudy
        "OV" => 34, // cloudy
        "TO" => 35, // tornado
        "FC" => 36, // funnel cloud
        _ => UNKNOWN_CODE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_known_triplet() {
        let codes = decode("SC:L:RW").unwrap();
        assert_eq!(codes.coverage, 14);
        assert_eq!(codes.intensity, 2);
        assert_eq!(codes.condition, 16);
    }

    #[test]
    fn empty_segments_are_valid() {
        let codes = decode("::CL").unwrap();
        assert_eq!(codes.coverage, 0);
        assert_eq!(codes.intensity, 0);
        assert_eq!(codes.condition, 30);
    }

    #[test]
    fn unknown_vocabulary_maps_to_sentinel() {
        let codes = decode("PT:HVY:RA").unwrap();
        assert_eq!(codes.coverage, UNKNOWN_CODE);
        assert_eq!(codes.intensity, UNKNOWN_CODE);
        assert_eq!(codes.condition, UNKNOWN_CODE);
    }

    #[test]
    fn two_segments_is_malformed() {
        let err = decode("PT:HVY").unwrap_err();
        assert!(matches!(err, AerisError::MalformedCode(ref s) if s == "PT:HVY"));
        assert!(decode("").is_err());
    }
}
