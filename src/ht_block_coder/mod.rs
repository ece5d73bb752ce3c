//! HTJ2K high-throughput block coding (ISO/IEC 15444-15, FBCOT).
//!
//! - `mel`: adaptive run-length coding of significance decisions.
//! - `vlc`: pair-pattern codewords, stored byte-reversed at the segment end.
//! - `mag_sgn`: raw sign + magnitude-residual bits.
//! - `encoder` / `decoder`: the cleanup pass plus SigProp/MagRef
//!   refinement passes.

pub mod decoder;
pub mod encoder;
pub mod mag_sgn;
pub mod mel;
pub mod vlc;

pub use decoder::decode_block;
pub use encoder::{encode_block, HtEncodedBlock};

#[cfg(test)]
mod tests {
    use super::*;

    fn lcg_block(width: usize, height: usize, bits: u32, seed: u32) -> Vec<i32> {
        let mut s = seed;
        (0..width * height)
            .map(|_| {
                s = s.wrapping_mul(1664525).wrapping_add(1013904223);
                let mag = (s >> 9) % (1 << bits);
                if s & 1 == 0 {
                    -(mag as i32)
                } else {
                    mag as i32
                }
            })
            .collect()
    }

    fn round_trip(width: usize, height: usize, coeffs: &[i32], refinement_planes: u8) {
        let enc = encode_block(width, height, coeffs, refinement_planes).unwrap();
        let dec = decode_block(&enc.data, width, height, enc.num_bit_planes, enc.num_passes)
            .unwrap();
        assert_eq!(dec, coeffs);
    }

    #[test]
    fn cleanup_only_is_lossless() {
        // With the cleanup pass at bit-plane 0 every coded magnitude is
        // complete.
        let coeffs = lcg_block(16, 16, 12, 41);
        round_trip(16, 16, &coeffs, 0);
    }

    #[test]
    fn sparse_block_cleanup_only() {
        let mut coeffs = vec![0i32; 64];
        coeffs[0] = 513;
        coeffs[27] = -77;
        coeffs[63] = 1;
        round_trip(8, 8, &coeffs, 0);
    }

    #[test]
    fn all_zero_block() {
        let enc = encode_block(8, 8, &[0; 64], 0).unwrap();
        assert_eq!(enc.num_passes, 0);
        assert!(enc.data.is_empty());
        let dec = decode_block(&enc.data, 8, 8, 0, 0).unwrap();
        assert_eq!(dec, vec![0; 64]);
    }

    #[test]
    fn dense_block_with_refinement_recovers_all_planes() {
        // Every sample is significant at the cleanup plane, so SigProp and
        // MagRef together restore every lower bit exactly.
        let mut s = 5u32;
        let coeffs: Vec<i32> = (0..12 * 8)
            .map(|_| {
                s = s.wrapping_mul(1664525).wrapping_add(1013904223);
                let mag = 64 + (s >> 10) % 64; // always >= cleanup threshold
                if s & 2 == 0 {
                    -(mag as i32)
                } else {
                    mag as i32
                }
            })
            .collect();
        round_trip(12, 8, &coeffs, 3);
    }

    #[test]
    fn cleanup_only_decode_recovers_top_planes_of_full_stream() {
        let mut s = 99u32;
        let coeffs: Vec<i32> = (0..64)
            .map(|_| {
                s = s.wrapping_mul(1664525).wrapping_add(1013904223);
                32 + ((s >> 7) % 32) as i32
            })
            .collect();
        let enc = encode_block(8, 8, &coeffs, 2).unwrap();
        let cleanup_plane = (enc.num_passes - 1) / 2;
        // Drop the refinement passes: decode only the cleanup pass.
        let cleanup_only = &enc.data[..enc.pass_lengths[0]];
        let dec = decode_block(cleanup_only, 8, 8, enc.num_bit_planes, 1).unwrap();
        for (d, c) in dec.iter().zip(coeffs.iter()) {
            let mask = !0u32 << cleanup_plane;
            assert_eq!(d.unsigned_abs() & mask, c.unsigned_abs() & mask);
        }
    }

    #[test]
    fn odd_height_pairs_handle_missing_partner() {
        let coeffs = lcg_block(6, 7, 5, 61);
        round_trip(6, 7, &coeffs, 0);
        let coeffs = lcg_block(3, 5, 4, 67);
        round_trip(3, 5, &coeffs, 0);
    }

    #[test]
    fn rejects_malformed_framing() {
        // Too short for the framing at all.
        assert!(decode_block(&[0x00], 4, 4, 5, 1).is_err());
        // Cleanup length field points past the end of the block.
        assert!(decode_block(&[0, 50, 1, 0, 0], 4, 4, 5, 1).is_err());
        // MEL length field points past its cleanup segment.
        assert!(decode_block(&[0, 2, 0, 0, 2], 4, 4, 5, 1).is_err());
        // Even pass counts cannot arise from 1 + 2 * refinements.
        assert!(decode_block(&[0, 2, 0, 0, 0], 4, 4, 5, 2).is_err());
    }
}
