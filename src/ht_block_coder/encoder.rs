//! HT (FBCOT) block encoder: one cleanup pass over MEL/VLC/MagSgn streams,
//! plus optional SigProp and MagRef refinement passes per bit-plane below
//! the cleanup plane.

use crate::bit_io::BitWriter;
use crate::error::{CodecError, Result};
use crate::ht_block_coder::mag_sgn::MagSgnEncoder;
use crate::ht_block_coder::mel::MelEncoder;
use crate::ht_block_coder::vlc::VlcEncoder;

/// Encoded HT code-block. The buffer is `[2-byte cleanup length | 1-byte
/// cleanup plane | cleanup segment | refinement segment]`; the cleanup
/// segment itself ends with a 2-byte MEL length so the decoder can place
/// its three cursors.
#[derive(Debug, Clone, Default)]
pub struct HtEncodedBlock {
    pub data: Vec<u8>,
    pub num_passes: u8,
    pub num_bit_planes: u8,
    pub pass_lengths: Vec<usize>,
    pub pass_distortions: Vec<f64>,
}

pub fn encode_block(
    width: usize,
    height: usize,
    coeffs: &[i32],
    refinement_planes: u8,
) -> Result<HtEncodedBlock> {
    if width == 0 || height == 0 || coeffs.len() != width * height {
        return Err(CodecError::encoding(format!(
            "HT code-block geometry {}x{} does not match {} coefficients",
            width,
            height,
            coeffs.len()
        )));
    }

    let max_mag = coeffs.iter().map(|&c| c.unsigned_abs()).max().unwrap_or(0);
    if max_mag == 0 {
        return Ok(HtEncodedBlock::default());
    }
    let num_bit_planes = (32 - max_mag.leading_zeros()) as u8;
    let cleanup_plane = refinement_planes.min(num_bit_planes - 1);
    let residual_bits = num_bit_planes - cleanup_plane;

    let mut mel = MelEncoder::new();
    let mut vlc = VlcEncoder::new();
    let mut magsgn = MagSgnEncoder::new();
    let mut significant = vec![false; width * height];

    // Cleanup pass: 4-row stripes, columns walked in vertical sample pairs.
    for y0 in (0..height).step_by(4) {
        let y_end = (y0 + 4).min(height);
        for x in 0..width {
            for pair in (y0..y_end).step_by(2) {
                let first = pair * width + x;
                let second = (pair + 1 < y_end).then(|| (pair + 1) * width + x);

                let sig0 = coeffs[first].unsigned_abs() >> cleanup_plane != 0;
                let sig1 = second
                    .map(|i| coeffs[i].unsigned_abs() >> cleanup_plane != 0)
                    .unwrap_or(false);
                let pattern = ((sig0 as u8) << 1) | sig1 as u8;

                mel.encode(pattern != 0);
                if pattern == 0 {
                    continue;
                }
                vlc.encode(pattern);
                for (is_sig, idx) in [(sig0, Some(first)), (sig1, second)] {
                    if let (true, Some(i)) = (is_sig, idx) {
                        let v = coeffs[i].unsigned_abs() >> cleanup_plane;
                        magsgn.encode(coeffs[i] < 0, v, residual_bits);
                        significant[i] = true;
                    }
                }
            }
        }
    }

    let mel_bytes = mel.finish();
    let magsgn_bytes = magsgn.finish();
    let vlc_bytes = vlc.finish();
    if mel_bytes.len() > u16::MAX as usize {
        return Err(CodecError::encoding(format!(
            "MEL stream of {} bytes exceeds the segment split field",
            mel_bytes.len()
        )));
    }

    let mut cleanup = Vec::with_capacity(mel_bytes.len() + magsgn_bytes.len() + vlc_bytes.len() + 2);
    cleanup.extend_from_slice(&mel_bytes);
    cleanup.extend_from_slice(&magsgn_bytes);
    cleanup.extend(vlc_bytes.iter().rev());
    cleanup.extend_from_slice(&(mel_bytes.len() as u16).to_be_bytes());

    // Refinement passes: one SigProp + one MagRef per plane below the
    // cleanup plane, as raw bits in a fourth stream.
    let mut refinement = BitWriter::new();
    let mut fresh = vec![false; width * height];
    for plane in (0..cleanup_plane).rev() {
        sig_prop_pass(
            width,
            height,
            coeffs,
            &mut significant,
            &mut fresh,
            &mut refinement,
            plane,
        );
        mag_ref_pass(width, height, coeffs, &significant, &fresh, &mut refinement, plane);
        for f in fresh.iter_mut() {
            *f = false;
        }
    }
    let refinement_bytes = refinement.finish();

    let cleanup_len = cleanup.len();
    if cleanup_len > u16::MAX as usize {
        return Err(CodecError::encoding(format!(
            "cleanup segment of {cleanup_len} bytes exceeds the split field"
        )));
    }
    // Cleanup length and plane lead the buffer so a stream truncated after
    // the cleanup segment still carries its own framing.
    let mut data = Vec::with_capacity(3 + cleanup_len + refinement_bytes.len());
    data.extend_from_slice(&(cleanup_len as u16).to_be_bytes());
    data.push(cleanup_plane);
    data.extend_from_slice(&cleanup);
    data.extend_from_slice(&refinement_bytes);

    let num_passes = 1 + 2 * cleanup_plane;
    let total = data.len();
    Ok(HtEncodedBlock {
        data,
        num_passes,
        num_bit_planes,
        // HT blocks truncate at the cleanup boundary or not at all.
        pass_lengths: vec![3 + cleanup_len, total],
        pass_distortions: vec![0.0, 0.0],
    })
}

fn sig_prop_pass(
    width: usize,
    height: usize,
    coeffs: &[i32],
    significant: &mut [bool],
    fresh: &mut [bool],
    out: &mut BitWriter,
    plane: u8,
) {
    for y0 in (0..height).step_by(4) {
        for x in 0..width {
            for y in y0..(y0 + 4).min(height) {
                let idx = y * width + x;
                if significant[idx] || !has_sig_neighbour(width, height, significant, x, y) {
                    continue;
                }
                let bit = ((coeffs[idx].unsigned_abs() >> plane) & 1) as u8;
                out.write_bit(bit);
                if bit == 1 {
                    out.write_bit((coeffs[idx] < 0) as u8);
                    significant[idx] = true;
                    fresh[idx] = true;
                }
            }
        }
    }
}

fn mag_ref_pass(
    width: usize,
    height: usize,
    coeffs: &[i32],
    significant: &[bool],
    fresh: &[bool],
    out: &mut BitWriter,
    plane: u8,
) {
    for y0 in (0..height).step_by(4) {
        for x in 0..width {
            for y in y0..(y0 + 4).min(height) {
                let idx = y * width + x;
                if !significant[idx] || fresh[idx] {
                    continue;
                }
                out.write_bit(((coeffs[idx].unsigned_abs() >> plane) & 1) as u8);
            }
        }
    }
}

pub(super) fn has_sig_neighbour(
    width: usize,
    height: usize,
    significant: &[bool],
    x: usize,
    y: usize,
) -> bool {
    let (w, h) = (width as i64, height as i64);
    let (xi, yi) = (x as i64, y as i64);
    for dy in -1..=1i64 {
        for dx in -1..=1i64 {
            if dx == 0 && dy == 0 {
                continue;
            }
            let (nx, ny) = (xi + dx, yi + dy);
            if nx >= 0 && ny >= 0 && nx < w && ny < h && significant[(ny * w + nx) as usize] {
                return true;
            }
        }
    }
    false
}
