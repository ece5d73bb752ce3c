//! Discrete wavelet transform engine: 1-D/2-D forward and inverse, multi-
//! level Mallat decomposition, with dedicated lifting fast paths selected at
//! construction and a convolution fallback for arbitrary kernels.

pub mod convolution;
pub mod kernel;
pub mod lifting;

use crate::error::{CodecError, Result};
use crate::image::SubbandOrientation;
use kernel::{BoundaryMode, KernelKind, WaveletKernel};

pub const MAX_LEVELS: u8 = 32;

/// A 2-D coefficient array for one subband.
#[derive(Debug, Clone, Default)]
pub struct Subband2D<T> {
    pub orientation: SubbandOrientation,
    pub width: usize,
    pub height: usize,
    pub data: Vec<T>,
}

/// Detail subbands of one decomposition level, with the dimensions of the
/// parent array they were split from.
#[derive(Debug, Clone)]
pub struct DecompLevel<T> {
    pub width: usize,
    pub height: usize,
    pub hl: Subband2D<T>,
    pub lh: Subband2D<T>,
    pub hh: Subband2D<T>,
}

/// Multi-level decomposition: detail levels ordered finest to coarsest,
/// plus the coarsest LL approximation.
#[derive(Debug, Clone)]
pub struct Decomposition<T> {
    pub width: usize,
    pub height: usize,
    pub levels: Vec<DecompLevel<T>>,
    pub ll: Subband2D<T>,
}

impl<T> Decomposition<T> {
    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    /// Zero-level decomposition: the whole array is the LL band. Used for
    /// tiles too small to split and for `decomposition_levels = 0`.
    pub fn single_band(data: Vec<T>, width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            levels: Vec::new(),
            ll: Subband2D {
                orientation: SubbandOrientation::LL,
                width,
                height,
                data,
            },
        }
    }
}

/// Transform engine bound to one kernel. The kernel identity is resolved
/// once here so every call dispatches straight to its implementation.
pub struct DwtEngine {
    kernel: WaveletKernel,
    kind: KernelKind,
    boundary: BoundaryMode,
}

impl DwtEngine {
    pub fn new(kernel: WaveletKernel, boundary: BoundaryMode) -> Self {
        let kind = kernel.identify();
        Self {
            kernel,
            kind,
            boundary,
        }
    }

    pub fn reversible(&self) -> bool {
        self.kernel.reversible
    }

    pub fn kind(&self) -> KernelKind {
        self.kind
    }

    pub fn kernel(&self) -> &WaveletKernel {
        &self.kernel
    }

    fn check_forward_len(len: usize) -> Result<()> {
        if len < 2 {
            return Err(CodecError::invalid_parameter(format!(
                "transform input length {len} is below the minimum of 2"
            )));
        }
        Ok(())
    }

    fn check_inverse_lens(low: usize, high: usize) -> Result<()> {
        if low.abs_diff(high) > 1 || low + high < 2 {
            return Err(CodecError::invalid_parameter(format!(
                "inverse transform halves {low}/{high} are mismatched"
            )));
        }
        Ok(())
    }

    /// Integer (reversible) 1-D forward; only the 5/3 kernel has an integer
    /// path.
    pub fn forward_int(&self, signal: &[i32]) -> Result<(Vec<i32>, Vec<i32>)> {
        Self::check_forward_len(signal.len())?;
        match self.kind {
            KernelKind::LeGall53 => Ok(lifting::forward_5_3(signal)),
            _ => Err(CodecError::invalid_parameter(format!(
                "kernel {:?} has no reversible integer path",
                self.kernel.name
            ))),
        }
    }

    pub fn inverse_int(&self, low: &[i32], high: &[i32]) -> Result<Vec<i32>> {
        Self::check_inverse_lens(low.len(), high.len())?;
        match self.kind {
            KernelKind::LeGall53 => Ok(lifting::inverse_5_3(low, high)),
            _ => Err(CodecError::invalid_parameter(format!(
                "kernel {:?} has no reversible integer path",
                self.kernel.name
            ))),
        }
    }

    /// Real-valued 1-D forward: lifting for the known kernels, convolution
    /// otherwise.
    pub fn forward_real(&self, signal: &[f64]) -> Result<(Vec<f64>, Vec<f64>)> {
        Self::check_forward_len(signal.len())?;
        Ok(match self.kind {
            KernelKind::Cdf97 => lifting::forward_9_7(signal),
            KernelKind::Haar => lifting::forward_haar(signal),
            KernelKind::LeGall53 => {
                let ints: Vec<i32> = signal.iter().map(|&v| v.round() as i32).collect();
                let (l, h) = lifting::forward_5_3(&ints);
                (
                    l.into_iter().map(f64::from).collect(),
                    h.into_iter().map(f64::from).collect(),
                )
            }
            KernelKind::Custom => convolution::forward(signal, &self.kernel, self.boundary),
        })
    }

    pub fn inverse_real(&self, low: &[f64], high: &[f64]) -> Result<Vec<f64>> {
        Self::check_inverse_lens(low.len(), high.len())?;
        Ok(match self.kind {
            KernelKind::Cdf97 => lifting::inverse_9_7(low, high),
            KernelKind::Haar => lifting::inverse_haar(low, high),
            KernelKind::LeGall53 => {
                let l: Vec<i32> = low.iter().map(|&v| v.round() as i32).collect();
                let h: Vec<i32> = high.iter().map(|&v| v.round() as i32).collect();
                lifting::inverse_5_3(&l, &h)
                    .into_iter()
                    .map(f64::from)
                    .collect()
            }
            KernelKind::Custom => convolution::inverse(low, high, &self.kernel, self.boundary),
        })
    }

    /// Multi-level integer decomposition (Mallat: only LL recurses).
    pub fn decompose_int(
        &self,
        data: &[i32],
        width: usize,
        height: usize,
        levels: u8,
    ) -> Result<Decomposition<i32>> {
        check_levels(levels)?;
        decompose_with(data, width, height, levels, &|s| self.forward_int(s))
    }

    pub fn reconstruct_int(&self, decomp: &Decomposition<i32>) -> Result<Vec<i32>> {
        reconstruct_with(decomp, &|l, h| self.inverse_int(l, h))
    }

    pub fn decompose_real(
        &self,
        data: &[f64],
        width: usize,
        height: usize,
        levels: u8,
    ) -> Result<Decomposition<f64>> {
        check_levels(levels)?;
        decompose_with(data, width, height, levels, &|s| self.forward_real(s))
    }

    pub fn reconstruct_real(&self, decomp: &Decomposition<f64>) -> Result<Vec<f64>> {
        reconstruct_with(decomp, &|l, h| self.inverse_real(l, h))
    }
}

fn check_levels(levels: u8) -> Result<()> {
    if levels == 0 || levels > MAX_LEVELS {
        return Err(CodecError::invalid_parameter(format!(
            "decomposition levels {levels} outside [1, {MAX_LEVELS}]"
        )));
    }
    Ok(())
}

/// One separable 2-D analysis step: rows then columns, quadrant split.
#[allow(clippy::type_complexity)]
fn forward_2d<T: Copy + Default>(
    data: &[T],
    width: usize,
    height: usize,
    fwd: &dyn Fn(&[T]) -> Result<(Vec<T>, Vec<T>)>,
) -> Result<(Vec<T>, Vec<T>, Vec<T>, Vec<T>)> {
    let lw = width.div_ceil(2);
    let lh = height.div_ceil(2);

    // Row pass: [L | H] halves in place.
    let mut temp = vec![T::default(); width * height];
    for y in 0..height {
        let row = &data[y * width..(y + 1) * width];
        let (l, h) = fwd(row)?;
        temp[y * width..y * width + lw].copy_from_slice(&l);
        temp[y * width + lw..(y + 1) * width].copy_from_slice(&h);
    }

    // Column pass over the row-transformed array.
    let mut out = vec![T::default(); width * height];
    let mut col = vec![T::default(); height];
    for x in 0..width {
        for y in 0..height {
            col[y] = temp[y * width + x];
        }
        let (l, h) = fwd(&col)?;
        for (y, &v) in l.iter().enumerate() {
            out[y * width + x] = v;
        }
        for (y, &v) in h.iter().enumerate() {
            out[(lh + y) * width + x] = v;
        }
    }

    let quadrant = |x0: usize, y0: usize, w: usize, h: usize| -> Vec<T> {
        let mut q = Vec::with_capacity(w * h);
        for y in 0..h {
            q.extend_from_slice(&out[(y0 + y) * width + x0..(y0 + y) * width + x0 + w]);
        }
        q
    };

    let ll = quadrant(0, 0, lw, lh);
    let hl = quadrant(lw, 0, width - lw, lh);
    let lh_band = quadrant(0, lh, lw, height - lh);
    let hh = quadrant(lw, lh, width - lw, height - lh);
    Ok((ll, hl, lh_band, hh))
}

/// One separable 2-D synthesis step: columns then rows.
fn inverse_2d<T: Copy + Default>(
    ll: &Subband2D<T>,
    hl: &Subband2D<T>,
    lh: &Subband2D<T>,
    hh: &Subband2D<T>,
    width: usize,
    height: usize,
    inv: &dyn Fn(&[T], &[T]) -> Result<Vec<T>>,
) -> Result<Vec<T>> {
    let lw = ll.width;
    let top_h = ll.height;
    let bottom_h = lh.height;

    // Reassemble the row-transformed planes: top = [LL | HL], bottom =
    // [LH | HH], then undo the column pass.
    let mut temp = vec![T::default(); width * height];
    let mut col_l = vec![T::default(); top_h];
    let mut col_h = vec![T::default(); bottom_h];
    for x in 0..width {
        for y in 0..top_h {
            col_l[y] = if x < lw {
                ll.data[y * lw + x]
            } else {
                hl.data[y * hl.width + (x - lw)]
            };
        }
        for y in 0..bottom_h {
            col_h[y] = if x < lw {
                lh.data[y * lw + x]
            } else {
                hh.data[y * hh.width + (x - lw)]
            };
        }
        let full = inv(&col_l, &col_h)?;
        for (y, &v) in full.iter().enumerate() {
            temp[y * width + x] = v;
        }
    }

    // Undo the row pass.
    let mut out = vec![T::default(); width * height];
    for y in 0..height {
        let row = &temp[y * width..(y + 1) * width];
        let full = inv(&row[..lw], &row[lw..])?;
        out[y * width..(y + 1) * width].copy_from_slice(&full);
    }
    Ok(out)
}

#[allow(clippy::type_complexity)]
fn decompose_with<T: Copy + Default>(
    data: &[T],
    width: usize,
    height: usize,
    levels: u8,
    fwd: &dyn Fn(&[T]) -> Result<(Vec<T>, Vec<T>)>,
) -> Result<Decomposition<T>> {
    if data.len() != width * height {
        return Err(CodecError::invalid_parameter(format!(
            "decomposition input {}x{} does not match {} samples",
            width,
            height,
            data.len()
        )));
    }
    if width.max(height) < 2 {
        return Err(CodecError::invalid_parameter(format!(
            "decomposition input {width}x{height} is below the minimum size"
        )));
    }

    let mut current = data.to_vec();
    let mut cw = width;
    let mut ch = height;
    let mut out_levels = Vec::new();

    for _ in 0..levels {
        if cw < 2 || ch < 2 {
            break; // deeper levels would degenerate to empty halves
        }
        let (ll, hl, lh, hh) = forward_2d(&current, cw, ch, fwd)?;
        let lw = cw.div_ceil(2);
        let lh_rows = ch.div_ceil(2);
        out_levels.push(DecompLevel {
            width: cw,
            height: ch,
            hl: Subband2D {
                orientation: SubbandOrientation::HL,
                width: cw - lw,
                height: lh_rows,
                data: hl,
            },
            lh: Subband2D {
                orientation: SubbandOrientation::LH,
                width: lw,
                height: ch - lh_rows,
                data: lh,
            },
            hh: Subband2D {
                orientation: SubbandOrientation::HH,
                width: cw - lw,
                height: ch - lh_rows,
                data: hh,
            },
        });
        current = ll;
        cw = lw;
        ch = lh_rows;
    }

    Ok(Decomposition {
        width,
        height,
        levels: out_levels,
        ll: Subband2D {
            orientation: SubbandOrientation::LL,
            width: cw,
            height: ch,
            data: current,
        },
    })
}

fn reconstruct_with<T: Copy + Default>(
    decomp: &Decomposition<T>,
    inv: &dyn Fn(&[T], &[T]) -> Result<Vec<T>>,
) -> Result<Vec<T>> {
    let mut ll = decomp.ll.clone();
    for level in decomp.levels.iter().rev() {
        if level.hl.height != ll.height || level.lh.width != ll.width {
            return Err(CodecError::invalid_parameter(format!(
                "subband sizes at level {}x{} do not assemble",
                level.width, level.height
            )));
        }
        let data = inverse_2d(
            &ll,
            &level.hl,
            &level.lh,
            &level.hh,
            level.width,
            level.height,
            inv,
        )?;
        ll = Subband2D {
            orientation: SubbandOrientation::LL,
            width: level.width,
            height: level.height,
            data,
        };
    }
    Ok(ll.data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_5_3() -> DwtEngine {
        DwtEngine::new(WaveletKernel::le_gall_5_3(), BoundaryMode::Symmetric)
    }

    fn engine_9_7() -> DwtEngine {
        DwtEngine::new(WaveletKernel::cdf_9_7(), BoundaryMode::Symmetric)
    }

    #[test]
    fn flat_image_concentrates_in_ll() {
        // 4x4 all-5 input: LL is all 5, every detail subband is zero.
        let data = vec![5i32; 16];
        let decomp = engine_5_3().decompose_int(&data, 4, 4, 1).unwrap();
        assert_eq!(decomp.ll.data, vec![5, 5, 5, 5]);
        assert_eq!(decomp.levels[0].hl.data, vec![0, 0, 0, 0]);
        assert_eq!(decomp.levels[0].lh.data, vec![0, 0, 0, 0]);
        assert_eq!(decomp.levels[0].hh.data, vec![0, 0, 0, 0]);
    }

    #[test]
    fn child_dimensions_follow_ceil_floor_split() {
        let data: Vec<i32> = (0..35).collect();
        let decomp = engine_5_3().decompose_int(&data, 7, 5, 1).unwrap();
        assert_eq!((decomp.ll.width, decomp.ll.height), (4, 3));
        assert_eq!(
            (decomp.levels[0].hl.width, decomp.levels[0].hl.height),
            (3, 3)
        );
        assert_eq!(
            (decomp.levels[0].lh.width, decomp.levels[0].lh.height),
            (4, 2)
        );
        assert_eq!(
            (decomp.levels[0].hh.width, decomp.levels[0].hh.height),
            (3, 2)
        );
    }

    #[test]
    fn multi_level_integer_round_trip() {
        let data: Vec<i32> = (0..64 * 48)
            .map(|i| ((i * 2654435761u64 as usize) % 509) as i32 - 254)
            .collect();
        let engine = engine_5_3();
        for levels in [1, 2, 3, 5] {
            let decomp = engine.decompose_int(&data, 64, 48, levels).unwrap();
            assert_eq!(decomp.num_levels(), levels as usize);
            let back = engine.reconstruct_int(&decomp).unwrap();
            assert_eq!(back, data, "levels={levels}");
        }
    }

    #[test]
    fn irreversible_round_trip_within_tolerance() {
        let data: Vec<f64> = (0..32 * 32)
            .map(|i| ((i * 37 % 251) as f64) - 125.0)
            .collect();
        let engine = engine_9_7();
        let decomp = engine.decompose_real(&data, 32, 32, 3).unwrap();
        let back = engine.reconstruct_real(&decomp).unwrap();
        let max_in = data.iter().fold(0f64, |a, &v| a.max(v.abs()));
        for (a, b) in data.iter().zip(back.iter()) {
            assert!((a - b).abs() < 1e-6 * max_in.max(1.0));
        }
    }

    #[test]
    fn level_cap_stops_at_degenerate_ll() {
        // An 8x8 image supports three levels before LL reaches 1x1.
        let data = vec![1i32; 64];
        let decomp = engine_5_3().decompose_int(&data, 8, 8, 10).unwrap();
        assert_eq!(decomp.num_levels(), 3);
        assert_eq!((decomp.ll.width, decomp.ll.height), (1, 1));
    }

    #[test]
    fn one_row_tile_is_transformable() {
        // (tile-width, 1): the row direction still splits; columns stop.
        let data: Vec<i32> = (0..16).collect();
        let decomp = engine_5_3().decompose_int(&data, 16, 1, 2).unwrap();
        // No full 2-D level possible with a single row.
        assert_eq!(decomp.num_levels(), 0);
        assert_eq!(decomp.ll.data, data);
    }

    #[test]
    fn rejected_inputs() {
        let engine = engine_5_3();
        assert!(engine.forward_int(&[1]).is_err());
        assert!(engine.decompose_int(&[1, 2], 2, 1, 0).is_err());
        assert!(engine.decompose_int(&[1, 2], 2, 1, 33).is_err());
        assert!(engine.inverse_int(&[1, 2, 3], &[1]).is_err());
        assert!(engine_9_7().forward_int(&[1, 2, 3, 4]).is_err());
    }

    #[test]
    fn custom_kernel_dispatches_to_convolution() {
        let base = WaveletKernel::le_gall_5_3();
        let custom = WaveletKernel::custom(
            "part2",
            base.analysis_low.clone(),
            base.analysis_high.clone(),
            base.synthesis_low.clone(),
            base.synthesis_high.clone(),
            Some(0),
        )
        .unwrap();
        let engine = DwtEngine::new(custom, BoundaryMode::Periodic);
        assert_eq!(engine.kind(), KernelKind::Custom);
        let signal: Vec<f64> = (0..16).map(|i| (i as f64).sin() * 10.0).collect();
        let (l, h) = engine.forward_real(&signal).unwrap();
        let back = engine.inverse_real(&l, &h).unwrap();
        for (a, b) in signal.iter().zip(back.iter()) {
            assert!((a - b).abs() < 1e-9);
        }
    }
}
