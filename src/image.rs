//! Image, tile and code-block data structures.

use crate::error::{CodecError, Result};

/// One of the four frequency sub-regions of a wavelet level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum SubbandOrientation {
    #[default]
    LL,
    HL,
    LH,
    HH,
}

impl SubbandOrientation {
    /// log2 of the nominal subband gain used for the bit-depth bound
    /// (0 for LL, 1 for HL/LH, 2 for HH).
    pub fn log2_gain(self) -> u8 {
        match self {
            SubbandOrientation::LL => 0,
            SubbandOrientation::HL | SubbandOrientation::LH => 1,
            SubbandOrientation::HH => 2,
        }
    }
}

/// Per-component metadata as carried in SIZ.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentInfo {
    /// Bits per sample, 1..=38 on the wire; this core accepts 1..=16.
    pub bit_depth: u8,
    pub signed: bool,
    /// Horizontal subsampling factor (XRsiz).
    pub dx: u8,
    /// Vertical subsampling factor (YRsiz).
    pub dy: u8,
}

impl Default for ComponentInfo {
    fn default() -> Self {
        Self {
            bit_depth: 8,
            signed: false,
            dx: 1,
            dy: 1,
        }
    }
}

/// A raster image presented to the encoder or produced by the decoder.
/// Samples are stored per component, row-major, already sign-extended.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Image {
    pub width: u32,
    pub height: u32,
    pub components: Vec<ComponentInfo>,
    /// One sample plane per component; plane c has dimensions
    /// ceil(width / dx) x ceil(height / dy).
    pub planes: Vec<Vec<i32>>,
}

impl Image {
    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    /// Validate the sample planes against the declared geometry.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(CodecError::invalid_parameter(format!(
                "image dimensions {}x{} must be non-zero",
                self.width, self.height
            )));
        }
        if self.width == 1 && self.height == 1 {
            return Err(CodecError::invalid_parameter(
                "1x1 image is below the minimum transform size".to_string(),
            ));
        }
        if self.components.is_empty() || self.components.len() > 16384 {
            return Err(CodecError::invalid_parameter(format!(
                "component count {} outside [1, 16384]",
                self.components.len()
            )));
        }
        if self.planes.len() != self.components.len() {
            return Err(CodecError::invalid_parameter(format!(
                "{} sample planes for {} components",
                self.planes.len(),
                self.components.len()
            )));
        }
        for (c, (info, plane)) in self.components.iter().zip(&self.planes).enumerate() {
            if info.bit_depth == 0 || info.bit_depth > 16 {
                return Err(CodecError::invalid_parameter(format!(
                    "component {c}: bit depth {} outside [1, 16]",
                    info.bit_depth
                )));
            }
            if info.dx == 0 || info.dy == 0 {
                return Err(CodecError::invalid_parameter(format!(
                    "component {c}: zero subsampling factor"
                )));
            }
            let w = self.width.div_ceil(info.dx as u32) as usize;
            let h = self.height.div_ceil(info.dy as u32) as usize;
            if plane.len() != w * h {
                return Err(CodecError::invalid_parameter(format!(
                    "component {c}: plane has {} samples, expected {}",
                    plane.len(),
                    w * h
                )));
            }
        }
        Ok(())
    }
}

/// Validate code-block dimensions: powers of two in [4, 1024], product
/// at most 4096.
pub fn validate_code_block_size(width: usize, height: usize) -> Result<()> {
    let ok = |v: usize| v.is_power_of_two() && (4..=1024).contains(&v);
    if !ok(width) || !ok(height) {
        return Err(CodecError::invalid_parameter(format!(
            "code-block size {width}x{height}: sides must be powers of two in [4, 1024]"
        )));
    }
    if width * height > 4096 {
        return Err(CodecError::invalid_parameter(format!(
            "code-block size {width}x{height}: area exceeds 4096"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_block_bounds() {
        assert!(validate_code_block_size(4, 4).is_ok());
        assert!(validate_code_block_size(64, 64).is_ok());
        assert!(validate_code_block_size(1024, 4).is_ok());
        assert!(validate_code_block_size(2, 4).is_err());
        assert!(validate_code_block_size(4, 2048).is_err());
        assert!(validate_code_block_size(128, 64).is_err()); // area 8192
        assert!(validate_code_block_size(48, 4).is_err()); // not a power of two
    }

    #[test]
    fn one_by_one_image_rejected() {
        let img = Image {
            width: 1,
            height: 1,
            components: vec![ComponentInfo::default()],
            planes: vec![vec![0]],
        };
        assert!(matches!(
            img.validate(),
            Err(CodecError::InvalidParameter(_))
        ));
    }

    #[test]
    fn plane_size_must_match_subsampling() {
        let img = Image {
            width: 4,
            height: 4,
            components: vec![ComponentInfo {
                dx: 2,
                dy: 2,
                ..Default::default()
            }],
            planes: vec![vec![0; 4]],
        };
        assert!(img.validate().is_ok());
    }
}
