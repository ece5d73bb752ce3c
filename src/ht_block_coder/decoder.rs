//! HT (FBCOT) block decoder: dual-cursor cleanup decoding (MEL forward,
//! MagSgn forward, VLC backward) followed by the raw refinement passes.

use crate::bit_io::BitReader;
use crate::error::{CodecError, Result};
use crate::ht_block_coder::encoder::has_sig_neighbour;
use crate::ht_block_coder::mag_sgn::MagSgnDecoder;
use crate::ht_block_coder::mel::MelDecoder;
use crate::ht_block_coder::vlc::VlcDecoder;

pub fn decode_block(
    data: &[u8],
    width: usize,
    height: usize,
    num_bit_planes: u8,
    num_passes: u8,
) -> Result<Vec<i32>> {
    if width == 0 || height == 0 {
        return Err(CodecError::decoding(format!(
            "empty HT code-block geometry {width}x{height}"
        )));
    }
    let size = width * height;
    if num_passes == 0 || num_bit_planes == 0 {
        return Ok(vec![0; size]);
    }
    if num_passes % 2 == 0 {
        return Err(CodecError::decoding(format!(
            "HT pass count {num_passes} is not 1 + 2 * refinement planes"
        )));
    }
    if data.len() < 5 {
        return Err(CodecError::decoding(format!(
            "HT segment of {} bytes is too short for its framing",
            data.len()
        )));
    }

    let cleanup_len = u16::from_be_bytes([data[0], data[1]]) as usize;
    let cleanup_plane = data[2];
    if 3 + cleanup_len > data.len() || cleanup_len < 2 {
        return Err(CodecError::decoding(format!(
            "cleanup segment length {cleanup_len} exceeds the {}-byte block",
            data.len()
        )));
    }
    let cleanup = &data[3..3 + cleanup_len];
    let refinement = &data[3 + cleanup_len..];

    let mel_len = u16::from_be_bytes([cleanup[cleanup_len - 2], cleanup[cleanup_len - 1]]) as usize;
    if mel_len > cleanup_len - 2 {
        return Err(CodecError::decoding(format!(
            "MEL stream length {mel_len} exceeds its {cleanup_len}-byte segment"
        )));
    }

    if cleanup_plane >= num_bit_planes {
        return Err(CodecError::decoding(format!(
            "cleanup plane {cleanup_plane} at or above the {num_bit_planes} coded bit-planes"
        )));
    }
    // The pass count bounds how many refinement planes are present; a
    // truncated stream carries fewer than the cleanup plane implies.
    let refine_planes = ((num_passes - 1) / 2).min(cleanup_plane);
    let residual_bits = num_bit_planes - cleanup_plane;

    let mut mel = MelDecoder::new(&cleanup[..mel_len]);
    let mut magsgn = MagSgnDecoder::new(&cleanup[mel_len..cleanup_len - 2]);
    let mut vlc = VlcDecoder::new(&cleanup[mel_len..cleanup_len - 2]);

    let mut magnitudes = vec![0u32; size];
    let mut negative = vec![false; size];
    let mut significant = vec![false; size];

    for y0 in (0..height).step_by(4) {
        let y_end = (y0 + 4).min(height);
        for x in 0..width {
            for pair in (y0..y_end).step_by(2) {
                let first = pair * width + x;
                let second = (pair + 1 < y_end).then(|| (pair + 1) * width + x);

                if !mel.decode() {
                    continue;
                }
                let pattern = vlc.decode();
                for (bit, idx) in [(pattern & 2 != 0, Some(first)), (pattern & 1 != 0, second)] {
                    if let (true, Some(i)) = (bit, idx) {
                        let (neg, v) = magsgn.decode(residual_bits);
                        magnitudes[i] = v << cleanup_plane;
                        negative[i] = neg;
                        significant[i] = true;
                    }
                }
            }
        }
    }

    // Refinement passes mirror the encoder's raw stream, top plane first.
    let mut reader = BitReader::new(refinement);
    let mut fresh = vec![false; size];
    for plane in ((cleanup_plane - refine_planes)..cleanup_plane).rev() {
        sig_prop_pass(
            width,
            height,
            &mut magnitudes,
            &mut negative,
            &mut significant,
            &mut fresh,
            &mut reader,
            plane,
        );
        mag_ref_pass(
            width,
            height,
            &mut magnitudes,
            &significant,
            &fresh,
            &mut reader,
            plane,
        );
        for f in fresh.iter_mut() {
            *f = false;
        }
    }

    Ok(magnitudes
        .iter()
        .zip(negative.iter())
        .map(|(&m, &neg)| if neg { -(m as i32) } else { m as i32 })
        .collect())
}

#[allow(clippy::too_many_arguments)]
fn sig_prop_pass(
    width: usize,
    height: usize,
    magnitudes: &mut [u32],
    negative: &mut [bool],
    significant: &mut [bool],
    fresh: &mut [bool],
    reader: &mut BitReader,
    plane: u8,
) {
    for y0 in (0..height).step_by(4) {
        for x in 0..width {
            for y in y0..(y0 + 4).min(height) {
                let idx = y * width + x;
                if significant[idx] || !has_sig_neighbour(width, height, significant, x, y) {
                    continue;
                }
                let bit = reader.read_bit().unwrap_or(0);
                if bit == 1 {
                    magnitudes[idx] |= 1 << plane;
                    negative[idx] = reader.read_bit().unwrap_or(0) != 0;
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
    magnitudes: &mut [u32],
    significant: &[bool],
    fresh: &[bool],
    reader: &mut BitReader,
    plane: u8,
) {
    for y0 in (0..height).step_by(4) {
        for x in 0..width {
            for y in y0..(y0 + 4).min(height) {
                let idx = y * width + x;
                if !significant[idx] || fresh[idx] {
                    continue;
                }
                let bit = reader.read_bit().unwrap_or(0) as u32;
                magnitudes[idx] |= bit << plane;
            }
        }
    }
}
