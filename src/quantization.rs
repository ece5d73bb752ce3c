//! Scalar, deadzone and expounded quantization (ISO/IEC 15444-1 Annex E),
//! step-size derivation per subband, and the 5+11-bit exponent/mantissa
//! step-size codec used by QCD/QCC.

use std::collections::BTreeMap;

use crate::error::{CodecError, Result};
use crate::image::SubbandOrientation;

/// Bias of the step-size exponent field.
pub const STEP_EXPONENT_BIAS: i32 = 16;
pub const MAX_GUARD_BITS: u8 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuantizerMode {
    /// Pass-through (reversible path).
    #[default]
    None,
    Scalar,
    Deadzone,
    /// Scalar with an explicit per-subband step table.
    Expounded,
}

/// Key of the expounded step table: (decomposition level, orientation),
/// level 0 being the finest.
pub type SubbandKey = (u8, SubbandOrientation);

#[derive(Debug, Clone)]
pub struct QuantParams {
    pub mode: QuantizerMode,
    /// Base step size, strictly positive.
    pub base_step: f64,
    /// Deadzone width factor w; the zero bin spans |c| <= step * w / 2.
    pub deadzone_factor: f64,
    pub guard_bits: u8,
    /// Explicit steps for `Expounded`.
    pub expounded_steps: BTreeMap<SubbandKey, f64>,
}

impl Default for QuantParams {
    fn default() -> Self {
        Self {
            mode: QuantizerMode::None,
            base_step: 1.0,
            deadzone_factor: 2.0,
            guard_bits: 2,
            expounded_steps: BTreeMap::new(),
        }
    }
}

impl QuantParams {
    pub fn validate(&self) -> Result<()> {
        if self.base_step <= 0.0 {
            return Err(CodecError::invalid_parameter(format!(
                "quantizer step size {} must be positive",
                self.base_step
            )));
        }
        if self.guard_bits > MAX_GUARD_BITS {
            return Err(CodecError::invalid_parameter(format!(
                "guard bits {} exceed {MAX_GUARD_BITS}",
                self.guard_bits
            )));
        }
        if self.deadzone_factor < 0.0 {
            return Err(CodecError::invalid_parameter(format!(
                "deadzone factor {} must be non-negative",
                self.deadzone_factor
            )));
        }
        Ok(())
    }
}

/// Subband energy gain G_b, the squared L2 norm of the synthesis filters:
/// (1, sqrt(2), sqrt(2), 2) for 5/3 and (1, 2, 2, 4) for 9/7.
pub fn subband_gain(reversible: bool, orientation: SubbandOrientation) -> f64 {
    let half = if reversible {
        std::f64::consts::SQRT_2
    } else {
        2.0
    };
    match orientation {
        SubbandOrientation::LL => 1.0,
        SubbandOrientation::HL | SubbandOrientation::LH => half,
        SubbandOrientation::HH => half * half,
    }
}

/// Step size for a subband at level `level` (0 = finest):
/// delta_b = delta * 2^level / G_b.
pub fn subband_step(
    params: &QuantParams,
    reversible: bool,
    level: u8,
    orientation: SubbandOrientation,
) -> f64 {
    if params.mode == QuantizerMode::Expounded {
        if let Some(&step) = params.expounded_steps.get(&(level, orientation)) {
            return step;
        }
    }
    params.base_step * (1u64 << level) as f64 / subband_gain(reversible, orientation)
}

/// Quantize one coefficient against a subband step.
pub fn quantize(params: &QuantParams, c: f64, step: f64) -> i32 {
    let sign = if c < 0.0 { -1 } else { 1 };
    let mag = c.abs();
    match params.mode {
        QuantizerMode::None => c.round() as i32,
        QuantizerMode::Scalar | QuantizerMode::Expounded => {
            sign * (mag / step).floor() as i32
        }
        QuantizerMode::Deadzone => {
            let t = step * params.deadzone_factor / 2.0;
            if mag <= t {
                0
            } else {
                sign * (((mag - t) / step).floor() as i32 + 1)
            }
        }
    }
}

/// Reconstruct at the bin midpoint; the reversible path is the identity.
pub fn dequantize(params: &QuantParams, q: i32, step: f64) -> f64 {
    if q == 0 {
        return 0.0;
    }
    let sign = if q < 0 { -1.0 } else { 1.0 };
    let mag = q.unsigned_abs() as f64;
    match params.mode {
        QuantizerMode::None => q as f64,
        QuantizerMode::Scalar | QuantizerMode::Expounded => sign * (mag + 0.5) * step,
        QuantizerMode::Deadzone => {
            let t = step * params.deadzone_factor / 2.0;
            sign * (t + (mag - 0.5) * step)
        }
    }
}

/// Quantize a whole coefficient array; rejects empty input and bad steps.
pub fn quantize_subband(params: &QuantParams, coeffs: &[f64], step: f64) -> Result<Vec<i32>> {
    params.validate()?;
    if coeffs.is_empty() {
        return Err(CodecError::invalid_parameter(
            "quantizer input is empty".to_string(),
        ));
    }
    if step <= 0.0 {
        return Err(CodecError::invalid_parameter(format!(
            "subband step size {step} must be positive"
        )));
    }
    Ok(coeffs.iter().map(|&c| quantize(params, c, step)).collect())
}

pub fn dequantize_subband(params: &QuantParams, indices: &[i32], step: f64) -> Result<Vec<f64>> {
    params.validate()?;
    if step <= 0.0 {
        return Err(CodecError::invalid_parameter(format!(
            "subband step size {step} must be positive"
        )));
    }
    Ok(indices
        .iter()
        .map(|&q| dequantize(params, q, step))
        .collect())
}

/// Encode a step size as the (exponent, mantissa) pair of Equation E.3:
/// delta = 2^(exponent - 16) * (1 + mantissa / 2048).
pub fn encode_step_size(step: f64) -> Result<(u8, u16)> {
    if step <= 0.0 {
        return Err(CodecError::invalid_parameter(format!(
            "step size {step} must be positive"
        )));
    }
    let mut exponent = step.log2().floor() as i32;
    let mut mantissa = ((step / 2f64.powi(exponent) - 1.0) * 2048.0).round() as i32;
    if mantissa == 2048 {
        exponent += 1;
        mantissa = 0;
    }
    let biased = exponent + STEP_EXPONENT_BIAS;
    if !(0..32).contains(&biased) {
        return Err(CodecError::invalid_parameter(format!(
            "step size {step} outside the representable exponent range"
        )));
    }
    Ok((biased as u8, mantissa as u16))
}

pub fn decode_step_size(exponent: u8, mantissa: u16) -> f64 {
    2f64.powi(exponent as i32 - STEP_EXPONENT_BIAS) * (1.0 + mantissa as f64 / 2048.0)
}

/// Contrast-sensitivity weights for visual weighting: one multiplier per
/// (level, orientation), peaking at the mid frequencies and attenuating
/// the finest diagonal details hardest. Steps are divided by the weight,
/// so a smaller weight quantizes the subband more coarsely.
pub fn csf_weight(num_levels: u8, level: u8, orientation: SubbandOrientation) -> f64 {
    // Normalised radial frequency of this level: finest = 1, halving per
    // coarser level.
    let f = 1.0 / (1u64 << level) as f64;
    let orient_factor = match orientation {
        SubbandOrientation::LL => return 1.0,
        SubbandOrientation::HL | SubbandOrientation::LH => 1.0,
        // Diagonal sensitivity is lower; treat as a sqrt(2) higher band.
        SubbandOrientation::HH => std::f64::consts::SQRT_2,
    };
    let _ = num_levels;
    let x = f * orient_factor;
    // Mannos-Sakrison style falloff, normalised so coarse bands tend to 1.
    let w = (-0.25 * (4.0 * x).powi(2)).exp() * 2.6 * (0.0192 + 0.114 * 8.0 * x);
    w.clamp(0.05, 1.0)
}
