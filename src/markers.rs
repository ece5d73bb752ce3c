//! Codestream marker codes (ISO/IEC 15444-1 Annex A, 15444-2, 15444-15).

use num_enum::TryFromPrimitive;

/// Marker codes recognised by the core. Each marker on the wire is the byte
/// 0xFF followed by the value below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum MarkerCode {
    /// SOC - start of codestream.
    StartOfCodestream = 0x4F,
    /// CAP - extended capability (Part 15 signalling).
    Capability = 0x50,
    /// SIZ - image and tile size.
    ImageAndTileSize = 0x51,
    /// COD - coding style default.
    CodingStyleDefault = 0x52,
    /// COC - coding style component.
    CodingStyleComponent = 0x53,
    /// CPF - corresponding profile.
    CorrespondingProfile = 0x59,
    /// QCD - quantization default.
    QuantizationDefault = 0x5C,
    /// QCC - quantization component.
    QuantizationComponent = 0x5D,
    /// ADS - arbitrary decomposition style (Part 2).
    ArbitraryDecompositionStyle = 0x74,
    /// SOT - start of tile-part.
    StartOfTile = 0x90,
    /// SOD - start of data.
    StartOfData = 0x93,
    /// EOC - end of codestream (shared with the JPEG EOI code).
    EndOfCodestream = 0xD9,
}

impl MarkerCode {
    /// Full two-byte value as it appears in the codestream.
    pub fn as_u16(self) -> u16 {
        0xFF00 | self as u16
    }

    /// Markers without a length field and payload.
    pub fn is_delimiter(self) -> bool {
        matches!(
            self,
            MarkerCode::StartOfCodestream
                | MarkerCode::StartOfData
                | MarkerCode::EndOfCodestream
        )
    }
}

/// Unrecognised markers in this range carry a length field and may be
/// skipped; anything below is a syntax error.
pub fn is_skippable(code: u8) -> bool {
    code >= 0x30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_values_match_standard() {
        assert_eq!(MarkerCode::StartOfCodestream.as_u16(), 0xFF4F);
        assert_eq!(MarkerCode::ImageAndTileSize.as_u16(), 0xFF51);
        assert_eq!(MarkerCode::CodingStyleDefault.as_u16(), 0xFF52);
        assert_eq!(MarkerCode::CodingStyleComponent.as_u16(), 0xFF53);
        assert_eq!(MarkerCode::QuantizationDefault.as_u16(), 0xFF5C);
        assert_eq!(MarkerCode::QuantizationComponent.as_u16(), 0xFF5D);
        assert_eq!(MarkerCode::Capability.as_u16(), 0xFF50);
        assert_eq!(MarkerCode::CorrespondingProfile.as_u16(), 0xFF59);
        assert_eq!(MarkerCode::ArbitraryDecompositionStyle.as_u16(), 0xFF74);
        assert_eq!(MarkerCode::StartOfTile.as_u16(), 0xFF90);
        assert_eq!(MarkerCode::StartOfData.as_u16(), 0xFF93);
        assert_eq!(MarkerCode::EndOfCodestream.as_u16(), 0xFFD9);
    }

    #[test]
    fn delimiters_have_no_payload() {
        assert!(MarkerCode::StartOfCodestream.is_delimiter());
        assert!(MarkerCode::EndOfCodestream.is_delimiter());
        assert!(!MarkerCode::ImageAndTileSize.is_delimiter());
    }

    #[test]
    fn unknown_marker_skippability() {
        assert!(is_skippable(0x30));
        assert!(is_skippable(0x64)); // COM-style comment range
        assert!(!is_skippable(0x2F));
    }
}
