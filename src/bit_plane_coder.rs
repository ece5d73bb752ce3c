//! EBCOT Tier-1 bit-plane coding (ISO/IEC 15444-1 Annex D).
//!
//! A code-block is coded as three-pass sweeps (significance propagation,
//! magnitude refinement, cleanup) from the top non-zero bit-plane down to
//! bit-plane 0, in 4-row column-stripe scan order. The decoder rebuilds the
//! context state bit-exactly by mirroring the traversal.

use crate::context::{
    initial_states, magnitude_refinement_context, sign_coding_context, zero_coding_context,
    CTX_RUN_LENGTH, CTX_UNIFORM, NUM_CONTEXTS,
};
use crate::error::{CodecError, Result};
use crate::image::SubbandOrientation;
use crate::mq_coder::{MqDecoder, MqEncoder, Termination};

const SIG: u8 = 1 << 0;
const VISITED: u8 = 1 << 1;
const REFINED: u8 = 1 << 2;
const NEG: u8 = 1 << 3;

/// Block-coder options mirrored from the COD code-block style byte.
#[derive(Debug, Clone, Copy, Default)]
pub struct EbcotOptions {
    /// Terminate the MQ codeword after every coding pass, producing
    /// truncable segment boundaries.
    pub terminate_each_pass: bool,
    /// Emit a 1010 segmentation symbol after every cleanup pass.
    pub segmentation_symbols: bool,
}

/// Output of the block encoder; `pass_lengths[i]` is the byte length of the
/// stream after pass `i`, `pass_distortions[i]` the squared-error reduction
/// that pass contributed.
#[derive(Debug, Clone, Default)]
pub struct EncodedBlock {
    pub data: Vec<u8>,
    pub num_passes: u8,
    pub num_bit_planes: u8,
    pub pass_lengths: Vec<usize>,
    pub pass_distortions: Vec<f64>,
}

/// Per-coefficient flag array plus the neighbourhood queries shared by the
/// encoder and decoder scan loops.
struct BlockState {
    w: i32,
    h: i32,
    flags: Vec<u8>,
}

impl BlockState {
    fn new(width: usize, height: usize) -> Self {
        Self {
            w: width as i32,
            h: height as i32,
            flags: vec![0; width * height],
        }
    }

    #[inline]
    fn idx(&self, x: i32, y: i32) -> usize {
        (y * self.w + x) as usize
    }

    #[inline]
    fn sig(&self, x: i32, y: i32) -> u8 {
        if x < 0 || y < 0 || x >= self.w || y >= self.h {
            0
        } else {
            self.flags[self.idx(x, y)] & SIG
        }
    }

    /// Significant-neighbour counts (horizontal, vertical, diagonal).
    #[inline]
    fn counts(&self, x: i32, y: i32) -> (u8, u8, u8) {
        let h = self.sig(x - 1, y) + self.sig(x + 1, y);
        let v = self.sig(x, y - 1) + self.sig(x, y + 1);
        let d = self.sig(x - 1, y - 1)
            + self.sig(x + 1, y - 1)
            + self.sig(x - 1, y + 1)
            + self.sig(x + 1, y + 1);
        (h, v, d)
    }

    #[inline]
    fn has_sig_neighbour(&self, x: i32, y: i32) -> bool {
        let (h, v, d) = self.counts(x, y);
        h + v + d != 0
    }

    /// Signed sign contribution of one neighbour: +1 significant positive,
    /// -1 significant negative, 0 insignificant. Diagonals never contribute.
    #[inline]
    fn sign_contrib(&self, x: i32, y: i32) -> i32 {
        if self.sig(x, y) == 0 {
            0
        } else if self.flags[self.idx(x, y)] & NEG != 0 {
            -1
        } else {
            1
        }
    }

    #[inline]
    fn sign_sums(&self, x: i32, y: i32) -> (i32, i32) {
        (
            self.sign_contrib(x - 1, y) + self.sign_contrib(x + 1, y),
            self.sign_contrib(x, y - 1) + self.sign_contrib(x, y + 1),
        )
    }
}

/// Reconstruction error of magnitude `m` when bits down to `plane` are
/// known, with mid-bin placement.
fn recon_error(m: u32, plane: i32) -> f64 {
    let q = m >> plane;
    if q == 0 {
        (m as f64).powi(2)
    } else {
        let recon = (q as f64 + 0.5) * (1u64 << plane) as f64;
        (m as f64 - recon).powi(2)
    }
}

pub fn encode_block(
    width: usize,
    height: usize,
    orientation: SubbandOrientation,
    coeffs: &[i32],
    opts: EbcotOptions,
) -> Result<EncodedBlock> {
    if width == 0 || height == 0 || coeffs.len() != width * height {
        return Err(CodecError::encoding(format!(
            "code-block geometry {}x{} does not match {} coefficients",
            width,
            height,
            coeffs.len()
        )));
    }

    let max_mag = coeffs.iter().map(|&c| c.unsigned_abs()).max().unwrap_or(0);
    if max_mag == 0 {
        return Ok(EncodedBlock::default());
    }
    let num_bit_planes = (32 - max_mag.leading_zeros()) as u8;

    let mut state = BlockState::new(width, height);
    let mut mq = MqEncoder::new(NUM_CONTEXTS);
    for (cx, &(index, mps)) in initial_states().iter().enumerate() {
        mq.set_context(cx, index, mps);
    }

    let mut pass_lengths = Vec::new();
    let mut pass_distortions = Vec::new();

    let mut end_pass = |mq: &mut MqEncoder, lengths: &mut Vec<usize>, d: f64| {
        if opts.terminate_each_pass {
            mq.terminate_pass();
        }
        lengths.push(mq.num_bytes());
        pass_distortions.push(d);
    };

    for plane in (0..num_bit_planes as i32).rev() {
        if plane < num_bit_planes as i32 - 1 {
            let d = significance_pass_enc(&mut state, &mut mq, orientation, coeffs, plane);
            end_pass(&mut mq, &mut pass_lengths, d);
            let d = refinement_pass_enc(&mut state, &mut mq, coeffs, plane);
            end_pass(&mut mq, &mut pass_lengths, d);
        }
        let d = cleanup_pass_enc(&mut state, &mut mq, orientation, coeffs, plane);
        if opts.segmentation_symbols {
            for &bit in &[1u8, 0, 1, 0] {
                mq.encode(bit, CTX_UNIFORM);
            }
        }
        end_pass(&mut mq, &mut pass_lengths, d);
        for f in state.flags.iter_mut() {
            *f &= !VISITED;
        }
    }

    let num_passes = pass_lengths.len() as u8;
    let data = if opts.terminate_each_pass {
        mq.into_bytes()
    } else {
        mq.finish(Termination::Default)
    };
    *pass_lengths.last_mut().unwrap() = data.len();

    Ok(EncodedBlock {
        data,
        num_passes,
        num_bit_planes,
        pass_lengths,
        pass_distortions,
    })
}

fn encode_sign(state: &mut BlockState, mq: &mut MqEncoder, x: i32, y: i32, negative: bool) {
    let (hs, vs) = state.sign_sums(x, y);
    let (cx, predictor) = sign_coding_context(hs, vs);
    mq.encode(negative as u8 ^ predictor, cx);
    let idx = state.idx(x, y);
    state.flags[idx] |= SIG;
    if negative {
        state.flags[idx] |= NEG;
    }
}

fn significance_pass_enc(
    state: &mut BlockState,
    mq: &mut MqEncoder,
    orientation: SubbandOrientation,
    coeffs: &[i32],
    plane: i32,
) -> f64 {
    let (w, h) = (state.w, state.h);
    let mut distortion = 0.0;
    for y0 in (0..h).step_by(4) {
        for x in 0..w {
            for y in y0..(y0 + 4).min(h) {
                let idx = state.idx(x, y);
                if state.flags[idx] & SIG != 0 {
                    continue;
                }
                let (hc, vc, dc) = state.counts(x, y);
                if hc + vc + dc == 0 {
                    continue;
                }
                let m = coeffs[idx].unsigned_abs();
                let bit = ((m >> plane) & 1) as u8;
                mq.encode(bit, zero_coding_context(orientation, hc, vc, dc));
                state.flags[idx] |= VISITED;
                if bit == 1 {
                    distortion += recon_error(m, plane + 1) - recon_error(m, plane);
                    encode_sign(state, mq, x, y, coeffs[idx] < 0);
                }
            }
        }
    }
    distortion
}

fn refinement_pass_enc(
    state: &mut BlockState,
    mq: &mut MqEncoder,
    coeffs: &[i32],
    plane: i32,
) -> f64 {
    let (w, h) = (state.w, state.h);
    let mut distortion = 0.0;
    for y0 in (0..h).step_by(4) {
        for x in 0..w {
            for y in y0..(y0 + 4).min(h) {
                let idx = state.idx(x, y);
                let flags = state.flags[idx];
                if flags & SIG == 0 || flags & VISITED != 0 {
                    continue;
                }
                let m = coeffs[idx].unsigned_abs();
                let cx = magnitude_refinement_context(
                    flags & REFINED != 0,
                    state.has_sig_neighbour(x, y),
                );
                mq.encode(((m >> plane) & 1) as u8, cx);
                state.flags[idx] |= REFINED;
                distortion += recon_error(m, plane + 1) - recon_error(m, plane);
            }
        }
    }
    distortion
}

fn cleanup_pass_enc(
    state: &mut BlockState,
    mq: &mut MqEncoder,
    orientation: SubbandOrientation,
    coeffs: &[i32],
    plane: i32,
) -> f64 {
    let (w, h) = (state.w, state.h);
    let mut distortion = 0.0;
    for y0 in (0..h).step_by(4) {
        for x in 0..w {
            let y_end = (y0 + 4).min(h);
            let mut y = y0;
            // Run-length mode: a full stripe column, all four coefficients
            // still uncoded with empty neighbourhoods.
            if y_end - y0 == 4
                && (y0..y_end).all(|yy| {
                    state.flags[state.idx(x, yy)] & (SIG | VISITED) == 0
                        && !state.has_sig_neighbour(x, yy)
                })
            {
                let first_sig = (0..4).find(|k| {
                    (coeffs[state.idx(x, y0 + k)].unsigned_abs() >> plane) & 1 == 1
                });
                match first_sig {
                    None => {
                        mq.encode(0, CTX_RUN_LENGTH);
                        continue;
                    }
                    Some(r) => {
                        mq.encode(1, CTX_RUN_LENGTH);
                        mq.encode(((r >> 1) & 1) as u8, CTX_UNIFORM);
                        mq.encode((r & 1) as u8, CTX_UNIFORM);
                        let yy = y0 + r;
                        let idx = state.idx(x, yy);
                        let m = coeffs[idx].unsigned_abs();
                        distortion += recon_error(m, plane + 1) - recon_error(m, plane);
                        encode_sign(state, mq, x, yy, coeffs[idx] < 0);
                        y = yy + 1;
                    }
                }
            }
            while y < y_end {
                let idx = state.idx(x, y);
                if state.flags[idx] & (SIG | VISITED) == 0 {
                    let (hc, vc, dc) = state.counts(x, y);
                    let m = coeffs[idx].unsigned_abs();
                    let bit = ((m >> plane) & 1) as u8;
                    mq.encode(bit, zero_coding_context(orientation, hc, vc, dc));
                    if bit == 1 {
                        distortion += recon_error(m, plane + 1) - recon_error(m, plane);
                        encode_sign(state, mq, x, y, coeffs[idx] < 0);
                    }
                }
                y += 1;
            }
        }
    }
    distortion
}

/// Segment reader that restarts the MQ decoder at recorded pass boundaries
/// when per-pass termination was used.
enum PassDecoder<'a> {
    Single(MqDecoder<'a>),
    Segmented {
        data: &'a [u8],
        bounds: &'a [usize],
        segment: usize,
        dec: MqDecoder<'a>,
    },
}

impl<'a> PassDecoder<'a> {
    fn new(data: &'a [u8], bounds: Option<&'a [usize]>) -> Self {
        let mut initial = MqDecoder::new(&[], NUM_CONTEXTS);
        for (cx, &(index, mps)) in initial_states().iter().enumerate() {
            initial.set_context(cx, index, mps);
        }
        match bounds {
            None => {
                let mut dec = MqDecoder::new(data, NUM_CONTEXTS);
                for (cx, &(index, mps)) in initial_states().iter().enumerate() {
                    dec.set_context(cx, index, mps);
                }
                PassDecoder::Single(dec)
            }
            Some(bounds) => {
                let end = bounds.first().copied().unwrap_or(data.len()).min(data.len());
                let contexts = initial.into_contexts();
                let dec = MqDecoder::new_with_contexts(&data[..end], contexts);
                PassDecoder::Segmented {
                    data,
                    bounds,
                    segment: 0,
                    dec,
                }
            }
        }
    }

    fn decoder(&mut self) -> &mut MqDecoder<'a> {
        match self {
            PassDecoder::Single(dec) => dec,
            PassDecoder::Segmented { dec, .. } => dec,
        }
    }

    /// Advance to the next codeword segment after a terminated pass.
    fn next_pass(&mut self) {
        if let PassDecoder::Segmented {
            data,
            bounds,
            segment,
            dec,
        } = self
        {
            let start = bounds[*segment].min(data.len());
            *segment += 1;
            let end = bounds
                .get(*segment)
                .copied()
                .unwrap_or(data.len())
                .min(data.len());
            let old = std::mem::replace(dec, MqDecoder::new(&[], 0));
            *dec = MqDecoder::new_with_contexts(&data[start..end], old.into_contexts());
        }
    }
}

#[allow(clippy::too_many_arguments)]
pub fn decode_block(
    data: &[u8],
    width: usize,
    height: usize,
    orientation: SubbandOrientation,
    num_bit_planes: u8,
    num_passes: u8,
    opts: EbcotOptions,
    pass_lengths: Option<&[usize]>,
) -> Result<Vec<i32>> {
    if width == 0 || height == 0 {
        return Err(CodecError::decoding(format!(
            "empty code-block geometry {width}x{height}"
        )));
    }
    let size = width * height;
    if num_passes == 0 || num_bit_planes == 0 {
        return Ok(vec![0; size]);
    }
    if num_bit_planes as u32 > 31 {
        return Err(CodecError::decoding(format!(
            "{num_bit_planes} bit-planes exceed the 31-bit coefficient range"
        )));
    }

    let mut state = BlockState::new(width, height);
    let mut magnitudes = vec![0u32; size];
    let mut pd = PassDecoder::new(data, pass_lengths);

    let mut pass = 0u8;
    let mut plane = num_bit_planes as i32 - 1;
    while pass < num_passes {
        let first_plane = plane == num_bit_planes as i32 - 1;
        // Each plane below the top runs SPP, MRP, CUP in order.
        for kind in 0..3u8 {
            if first_plane && kind < 2 {
                continue;
            }
            if pass >= num_passes {
                break;
            }
            match kind {
                0 => significance_pass_dec(
                    &mut state,
                    pd.decoder(),
                    orientation,
                    &mut magnitudes,
                    plane,
                ),
                1 => refinement_pass_dec(&mut state, pd.decoder(), &mut magnitudes, plane),
                _ => {
                    cleanup_pass_dec(&mut state, pd.decoder(), orientation, &mut magnitudes, plane);
                    if opts.segmentation_symbols {
                        let mut sym = 0u8;
                        for _ in 0..4 {
                            sym = (sym << 1) | pd.decoder().decode(CTX_UNIFORM);
                        }
                        if sym != 0b1010 {
                            return Err(CodecError::decoding(format!(
                                "segmentation symbol {sym:04b} at bit-plane {plane} is not 1010"
                            )));
                        }
                    }
                    for f in state.flags.iter_mut() {
                        *f &= !VISITED;
                    }
                }
            }
            pass += 1;
            if pass < num_passes {
                pd.next_pass();
            }
        }
        if plane == 0 {
            break;
        }
        plane -= 1;
    }

    let out = magnitudes
        .iter()
        .zip(state.flags.iter())
        .map(|(&m, &f)| {
            if f & NEG != 0 {
                -(m as i32)
            } else {
                m as i32
            }
        })
        .collect();
    Ok(out)
}

fn decode_sign(state: &mut BlockState, mq: &mut MqDecoder, x: i32, y: i32) {
    let (hs, vs) = state.sign_sums(x, y);
    let (cx, predictor) = sign_coding_context(hs, vs);
    let negative = mq.decode(cx) ^ predictor != 0;
    let idx = state.idx(x, y);
    state.flags[idx] |= SIG;
    if negative {
        state.flags[idx] |= NEG;
    }
}

fn significance_pass_dec(
    state: &mut BlockState,
    mq: &mut MqDecoder,
    orientation: SubbandOrientation,
    magnitudes: &mut [u32],
    plane: i32,
) {
    let (w, h) = (state.w, state.h);
    for y0 in (0..h).step_by(4) {
        for x in 0..w {
            for y in y0..(y0 + 4).min(h) {
                let idx = state.idx(x, y);
                if state.flags[idx] & SIG != 0 {
                    continue;
                }
                let (hc, vc, dc) = state.counts(x, y);
                if hc + vc + dc == 0 {
                    continue;
                }
                let bit = mq.decode(zero_coding_context(orientation, hc, vc, dc));
                state.flags[idx] |= VISITED;
                if bit == 1 {
                    magnitudes[idx] |= 1 << plane;
                    decode_sign(state, mq, x, y);
                }
            }
        }
    }
}

fn refinement_pass_dec(
    state: &mut BlockState,
    mq: &mut MqDecoder,
    magnitudes: &mut [u32],
    plane: i32,
) {
    let (w, h) = (state.w, state.h);
    for y0 in (0..h).step_by(4) {
        for x in 0..w {
            for y in y0..(y0 + 4).min(h) {
                let idx = state.idx(x, y);
                let flags = state.flags[idx];
                if flags & SIG == 0 || flags & VISITED != 0 {
                    continue;
                }
                let cx = magnitude_refinement_context(
                    flags & REFINED != 0,
                    state.has_sig_neighbour(x, y),
                );
                let bit = mq.decode(cx);
                state.flags[idx] |= REFINED;
                if bit == 1 {
                    magnitudes[idx] |= 1 << plane;
                }
            }
        }
    }
}

fn cleanup_pass_dec(
    state: &mut BlockState,
    mq: &mut MqDecoder,
    orientation: SubbandOrientation,
    magnitudes: &mut [u32],
    plane: i32,
) {
    let (w, h) = (state.w, state.h);
    for y0 in (0..h).step_by(4) {
        for x in 0..w {
            let y_end = (y0 + 4).min(h);
            let mut y = y0;
            if y_end - y0 == 4
                && (y0..y_end).all(|yy| {
                    state.flags[state.idx(x, yy)] & (SIG | VISITED) == 0
                        && !state.has_sig_neighbour(x, yy)
                })
            {
                if mq.decode(CTX_RUN_LENGTH) == 0 {
                    continue; // all four stay insignificant
                }
                let r = ((mq.decode(CTX_UNIFORM) << 1) | mq.decode(CTX_UNIFORM)) as i32;
                let yy = y0 + r;
                let idx = state.idx(x, yy);
                magnitudes[idx] |= 1 << plane;
                decode_sign(state, mq, x, yy);
                y = yy + 1;
            }
            while y < y_end {
                let idx = state.idx(x, y);
                if state.flags[idx] & (SIG | VISITED) == 0 {
                    let (hc, vc, dc) = state.counts(x, y);
                    let bit = mq.decode(zero_coding_context(orientation, hc, vc, dc));
                    if bit == 1 {
                        magnitudes[idx] |= 1 << plane;
                        decode_sign(state, mq, x, y);
                    }
                }
                y += 1;
            }
        }
    }
}
