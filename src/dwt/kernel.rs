//! Wavelet kernel descriptions and the named-kernel library.

use crate::error::{CodecError, Result};

/// Identity of a kernel, resolved once at engine construction so the hot
/// paths dispatch straight to the dedicated lifting implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelKind {
    /// Reversible LeGall 5/3.
    LeGall53,
    /// Irreversible CDF 9/7.
    Cdf97,
    Haar,
    /// Arbitrary filter banks (Part 2), handled by convolution.
    Custom,
}

/// Boundary extension for the convolution path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoundaryMode {
    /// Mirror: extended(-k-1) = extended(k), extended(n+k) = extended(n-1-k).
    #[default]
    Symmetric,
    /// Modulo n with signed-modulo behaviour.
    Periodic,
    ZeroPad,
}

impl BoundaryMode {
    /// Resolve a possibly out-of-range index against a signal of length `n`.
    /// Returns `None` only for `ZeroPad` outside the signal.
    pub fn resolve(self, i: i64, n: usize) -> Option<usize> {
        let n_i = n as i64;
        match self {
            BoundaryMode::Symmetric => {
                let mut i = i;
                // Each reflection maps the index closer to range; repeat for
                // far overshoots on short signals.
                loop {
                    if i < 0 {
                        i = -i - 1;
                    } else if i >= n_i {
                        i = 2 * n_i - 1 - i;
                    } else {
                        return Some(i as usize);
                    }
                }
            }
            BoundaryMode::Periodic => Some((((i % n_i) + n_i) % n_i) as usize),
            BoundaryMode::ZeroPad => {
                if (0..n_i).contains(&i) {
                    Some(i as usize)
                } else {
                    None
                }
            }
        }
    }
}

/// An immutable wavelet kernel: four filter banks plus a reversibility
/// flag. Arbitrary kernels may carry the ADS marker index they were
/// signalled under.
#[derive(Debug, Clone, PartialEq)]
pub struct WaveletKernel {
    pub name: String,
    pub analysis_low: Vec<f64>,
    pub analysis_high: Vec<f64>,
    pub synthesis_low: Vec<f64>,
    pub synthesis_high: Vec<f64>,
    pub reversible: bool,
    pub ads_index: Option<u8>,
}

impl WaveletKernel {
    /// Reversible LeGall 5/3 filter bank.
    pub fn le_gall_5_3() -> Self {
        Self {
            name: "5/3".to_string(),
            analysis_low: vec![-0.125, 0.25, 0.75, 0.25, -0.125],
            analysis_high: vec![-0.5, 1.0, -0.5],
            synthesis_low: vec![0.5, 1.0, 0.5],
            synthesis_high: vec![-0.125, -0.25, 0.75, -0.25, -0.125],
            reversible: true,
            ads_index: None,
        }
    }

    /// Irreversible CDF 9/7 filter bank.
    pub fn cdf_9_7() -> Self {
        Self {
            name: "9/7".to_string(),
            analysis_low: vec![
                0.026_748_76,
                -0.016_864_12,
                -0.078_223_27,
                0.266_864_1,
                0.602_949_0,
                0.266_864_1,
                -0.078_223_27,
                -0.016_864_12,
                0.026_748_76,
            ],
            analysis_high: vec![
                0.091_271_76,
                -0.057_543_53,
                -0.591_271_8,
                1.115_087_1,
                -0.591_271_8,
                -0.057_543_53,
                0.091_271_76,
            ],
            synthesis_low: vec![
                -0.091_271_76,
                -0.057_543_53,
                0.591_271_8,
                1.115_087_1,
                0.591_271_8,
                -0.057_543_53,
                -0.091_271_76,
            ],
            synthesis_high: vec![
                0.026_748_76,
                0.016_864_12,
                -0.078_223_27,
                -0.266_864_1,
                0.602_949_0,
                -0.266_864_1,
                -0.078_223_27,
                0.016_864_12,
                0.026_748_76,
            ],
            reversible: false,
            ads_index: None,
        }
    }

    pub fn haar() -> Self {
        let r = std::f64::consts::FRAC_1_SQRT_2;
        Self {
            name: "haar".to_string(),
            analysis_low: vec![r, r],
            analysis_high: vec![-r, r],
            synthesis_low: vec![r, r],
            synthesis_high: vec![r, -r],
            reversible: false,
            ads_index: None,
        }
    }

    /// User-supplied filter table (Part 2). The analysis and synthesis
    /// banks must each be non-empty.
    pub fn custom(
        name: impl Into<String>,
        analysis_low: Vec<f64>,
        analysis_high: Vec<f64>,
        synthesis_low: Vec<f64>,
        synthesis_high: Vec<f64>,
        ads_index: Option<u8>,
    ) -> Result<Self> {
        for (bank, taps) in [
            ("analysis lowpass", &analysis_low),
            ("analysis highpass", &analysis_high),
            ("synthesis lowpass", &synthesis_low),
            ("synthesis highpass", &synthesis_high),
        ] {
            if taps.is_empty() {
                return Err(CodecError::invalid_parameter(format!(
                    "custom kernel {bank} filter is empty"
                )));
            }
        }
        Ok(Self {
            name: name.into(),
            analysis_low,
            analysis_high,
            synthesis_low,
            synthesis_high,
            reversible: false,
            ads_index,
        })
    }

    /// Look up a kernel from the named library.
    pub fn named(name: &str) -> Result<Self> {
        match name {
            "5/3" | "5-3" | "legall" => Ok(Self::le_gall_5_3()),
            "9/7" | "9-7" | "cdf97" => Ok(Self::cdf_9_7()),
            "haar" => Ok(Self::haar()),
            _ => Err(CodecError::invalid_parameter(format!(
                "unknown wavelet kernel name {name:?}"
            ))),
        }
    }

    /// Fast-path identification, done once at engine construction.
    pub fn identify(&self) -> KernelKind {
        match self.name.as_str() {
            "5/3" => KernelKind::LeGall53,
            "9/7" => KernelKind::Cdf97,
            "haar" => KernelKind::Haar,
            _ => KernelKind::Custom,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symmetric_extension_identities() {
        // extended(-k-1) = extended(k) and extended(n+k) = extended(n-1-k).
        let n = 7;
        for k in 0..10i64 {
            assert_eq!(
                BoundaryMode::Symmetric.resolve(-k - 1, n),
                BoundaryMode::Symmetric.resolve(k, n),
                "left mirror at k={k}"
            );
            assert_eq!(
                BoundaryMode::Symmetric.resolve(n as i64 + k, n),
                BoundaryMode::Symmetric.resolve(n as i64 - 1 - k, n),
                "right mirror at k={k}"
            );
        }
    }

    #[test]
    fn periodic_extension_uses_signed_modulo() {
        assert_eq!(BoundaryMode::Periodic.resolve(-1, 4), Some(3));
        assert_eq!(BoundaryMode::Periodic.resolve(-5, 4), Some(3));
        assert_eq!(BoundaryMode::Periodic.resolve(4, 4), Some(0));
        assert_eq!(BoundaryMode::Periodic.resolve(9, 4), Some(1));
    }

    #[test]
    fn zero_padding_is_none_outside() {
        assert_eq!(BoundaryMode::ZeroPad.resolve(-1, 4), None);
        assert_eq!(BoundaryMode::ZeroPad.resolve(4, 4), None);
        assert_eq!(BoundaryMode::ZeroPad.resolve(2, 4), Some(2));
    }

    #[test]
    fn named_library_and_identification() {
        assert_eq!(WaveletKernel::named("5/3").unwrap().identify(), KernelKind::LeGall53);
        assert_eq!(WaveletKernel::named("9/7").unwrap().identify(), KernelKind::Cdf97);
        assert_eq!(WaveletKernel::named("haar").unwrap().identify(), KernelKind::Haar);
        assert!(WaveletKernel::named("13/7").is_err());
        assert!(WaveletKernel::le_gall_5_3().reversible);
        assert!(!WaveletKernel::cdf_9_7().reversible);
    }

    #[test]
    fn custom_kernel_requires_taps() {
        assert!(WaveletKernel::custom("x", vec![], vec![1.0], vec![1.0], vec![1.0], None).is_err());
        let k = WaveletKernel::custom(
            "x",
            vec![0.5, 0.5],
            vec![0.5, -0.5],
            vec![1.0, 1.0],
            vec![-1.0, 1.0],
            Some(2),
        )
        .unwrap();
        assert_eq!(k.identify(), KernelKind::Custom);
        assert_eq!(k.ads_index, Some(2));
    }
}
