//! Encoder/decoder configuration and the cancellation token.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::dwt::kernel::WaveletKernel;
use crate::error::{CodecError, Result};
use crate::image::validate_code_block_size;

/// Packet interleaving discipline within a tile-part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProgressionOrder {
    /// Layer - resolution - component - position.
    #[default]
    Lrcp,
    /// Resolution - layer - component - position.
    Rlcp,
    /// Resolution - position - component - layer.
    Rpcl,
    /// Position - component - resolution - layer.
    Pcrl,
    /// Component - position - resolution - layer.
    Cprl,
}

impl ProgressionOrder {
    pub fn from_cod_value(v: u8) -> Result<Self> {
        Ok(match v {
            0 => ProgressionOrder::Lrcp,
            1 => ProgressionOrder::Rlcp,
            2 => ProgressionOrder::Rpcl,
            3 => ProgressionOrder::Pcrl,
            4 => ProgressionOrder::Cprl,
            _ => {
                return Err(CodecError::invalid_data(format!(
                    "COD progression order {v} outside [0, 4]"
                )))
            }
        })
    }

    pub fn cod_value(self) -> u8 {
        match self {
            ProgressionOrder::Lrcp => 0,
            ProgressionOrder::Rlcp => 1,
            ProgressionOrder::Rpcl => 2,
            ProgressionOrder::Pcrl => 3,
            ProgressionOrder::Cprl => 4,
        }
    }
}

/// Target-rate discipline for the layer former.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BitrateMode {
    /// Quality-driven; the quantizer step follows `quality` alone.
    ConstantQuality,
    /// Hit a bits-per-pixel budget.
    ConstantBitrate { bpp: f64 },
    /// Quality floor with a rate ceiling.
    VariableBitrate { min_quality: f64, max_bpp: f64 },
    /// Reversible path, no truncation.
    Lossless,
}

/// Encoder options recognised by the core. Defaults produce a lossless,
/// single-tile, single-layer LRCP codestream with 64x64 code-blocks.
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    /// Quality in [0, 1]; ignored when `lossless` is set.
    pub quality: f64,
    pub lossless: bool,
    /// Wavelet decomposition levels, 0..=10.
    pub decomposition_levels: u8,
    /// Code-block (width, height); powers of two in [4, 1024], area <= 4096.
    pub code_block_size: (usize, usize),
    /// Quality layers, 1..=20.
    pub quality_layers: u8,
    pub progression_order: ProgressionOrder,
    /// Tile (width, height); (0, 0) means a single image-sized tile.
    pub tile_size: (u32, u32),
    pub bitrate_mode: BitrateMode,
    /// Select the Part 15 block coder instead of EBCOT.
    pub use_htj2k: bool,
    /// Fan code-block entropy coding out over a worker pool.
    pub enable_parallel_code_blocks: bool,
    /// Contrast-sensitivity weighting of subband step sizes.
    pub visual_weighting: bool,
    /// Override the kernel implied by `lossless` (5/3 reversible vs 9/7).
    pub wavelet_kernel: Option<WaveletKernel>,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            quality: 1.0,
            lossless: true,
            decomposition_levels: 5,
            code_block_size: (64, 64),
            quality_layers: 1,
            progression_order: ProgressionOrder::Lrcp,
            tile_size: (0, 0),
            bitrate_mode: BitrateMode::Lossless,
            use_htj2k: false,
            enable_parallel_code_blocks: false,
            visual_weighting: false,
            wavelet_kernel: None,
        }
    }
}

impl EncoderConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.quality) {
            return Err(CodecError::invalid_parameter(format!(
                "quality {} outside [0, 1]",
                self.quality
            )));
        }
        if self.decomposition_levels > 10 {
            return Err(CodecError::invalid_parameter(format!(
                "decomposition levels {} outside [0, 10]",
                self.decomposition_levels
            )));
        }
        validate_code_block_size(self.code_block_size.0, self.code_block_size.1)?;
        if self.quality_layers == 0 || self.quality_layers > 20 {
            return Err(CodecError::invalid_parameter(format!(
                "quality layers {} outside [1, 20]",
                self.quality_layers
            )));
        }
        if (self.tile_size.0 == 0) != (self.tile_size.1 == 0) {
            return Err(CodecError::invalid_parameter(
                "tile size must be (0, 0) or fully specified".to_string(),
            ));
        }
        match self.bitrate_mode {
            BitrateMode::ConstantBitrate { bpp } if bpp <= 0.0 => {
                return Err(CodecError::invalid_parameter(format!(
                    "constant bitrate {bpp} bpp must be positive"
                )))
            }
            BitrateMode::VariableBitrate { min_quality, max_bpp }
                if !(0.0..=1.0).contains(&min_quality) || max_bpp <= 0.0 =>
            {
                return Err(CodecError::invalid_parameter(
                    "variable bitrate bounds out of range".to_string(),
                ))
            }
            _ => {}
        }
        Ok(())
    }
}

/// Decoder options.
#[derive(Debug, Clone)]
pub struct DecoderConfig {
    /// Strict (default) aborts on the first malformed tile or code-block;
    /// lenient discards the tile or conceals the block as all-zero
    /// coefficients and continues.
    pub strict: bool,
    pub enable_parallel_code_blocks: bool,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            strict: true,
            enable_parallel_code_blocks: false,
        }
    }
}

/// Cooperative cancellation flag checked at tile and code-block boundaries.
/// A tripped token aborts the operation with `CodecError::Cancelled` and no
/// partial output.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    pub(crate) fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(CodecError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(EncoderConfig::default().validate().is_ok());
    }

    #[test]
    fn out_of_range_options_rejected() {
        let mut cfg = EncoderConfig {
            quality: 1.5,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
        cfg.quality = 0.5;
        cfg.decomposition_levels = 11;
        assert!(cfg.validate().is_err());
        cfg.decomposition_levels = 5;
        cfg.quality_layers = 21;
        assert!(cfg.validate().is_err());
        cfg.quality_layers = 4;
        cfg.code_block_size = (32, 256); // area 8192
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn progression_order_codes() {
        for order in [
            ProgressionOrder::Lrcp,
            ProgressionOrder::Rlcp,
            ProgressionOrder::Rpcl,
            ProgressionOrder::Pcrl,
            ProgressionOrder::Cprl,
        ] {
            assert_eq!(
                ProgressionOrder::from_cod_value(order.cod_value()).unwrap(),
                order
            );
        }
        assert!(ProgressionOrder::from_cod_value(5).is_err());
    }

    #[test]
    fn cancellation_trips_once_set() {
        let token = CancellationToken::new();
        assert!(token.check().is_ok());
        token.cancel();
        assert_eq!(token.check(), Err(CodecError::Cancelled));
    }
}
