//! Decoder pipeline: codestream parsing, packet walking in the declared
//! progression order across all tiles and layers, entropy decoding
//! (optionally parallel per code-block), dequantization, inverse DWT and
//! inverse colour transform.

use log::{debug, warn};
use rayon::prelude::*;

use crate::bit_io::BitReader;
use crate::bit_plane_coder::{self, EbcotOptions};
use crate::colour;
use crate::config::{CancellationToken, DecoderConfig};
use crate::dwt::kernel::{BoundaryMode, WaveletKernel};
use crate::dwt::{DecompLevel, Decomposition, DwtEngine, Subband2D};
use crate::error::{CodecError, Result};
use crate::headers::{MainHeader, QcdRecord, STYLE_SEGMENTATION_SYMBOLS};
use crate::ht_block_coder;
use crate::image::{ComponentInfo, Image, SubbandOrientation};
use crate::packet::{read_subband_contributions, PrecinctState};
use crate::parser::CodestreamParser;
use crate::progression::{packet_sequence, ProgressionDims};
use crate::quantization::{decode_step_size, dequantize, QuantParams, QuantizerMode};
use crate::tile_geom::{subbands_of_resolution, tile_component_layout, TileComponentLayout};

const MAX_BIT_PLANES: u32 = 31;

/// Style bits this decoder understands; anything else is an optional
/// feature we do not provide.
const SUPPORTED_STYLE_BITS: u8 = STYLE_SEGMENTATION_SYMBOLS | crate::headers::STYLE_HT_BLOCK_CODER;

/// Coded data gathered for one code-block across every packet.
#[derive(Debug, Clone, Default)]
struct BlockAssembly {
    data: Vec<u8>,
    passes: u32,
    zero_bit_planes: Option<u32>,
}

pub struct Decoder {
    config: DecoderConfig,
    token: CancellationToken,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new(DecoderConfig::default())
    }
}

impl Decoder {
    pub fn new(config: DecoderConfig) -> Self {
        Self {
            config,
            token: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(config: DecoderConfig, token: CancellationToken) -> Self {
        Self { config, token }
    }

    /// Decode a codestream into sample planes plus per-component metadata.
    pub fn decode(&self, data: &[u8]) -> Result<Image> {
        let mut parser = CodestreamParser::new(data);
        let header = parser.parse_main_header()?;
        let mut sot_start = parser.reader.position() - 2;

        let siz = &header.siz;
        let mut image = Image {
            width: siz.width,
            height: siz.height,
            components: siz.components.clone(),
            planes: siz
                .components
                .iter()
                .map(|c| {
                    let w = siz.width.div_ceil(c.dx as u32) as usize;
                    let h = siz.height.div_ceil(c.dy as u32) as usize;
                    vec![0i32; w * h]
                })
                .collect(),
        };

        let (tiles_x, tiles_y) = siz.tile_grid();
        let num_tiles = tiles_x * tiles_y;

        loop {
            self.token.check()?;
            let sot = parser.parse_tile_part_header()?;
            let data_start = parser.reader.position();
            let region_end = if sot.tile_part_length > 0 {
                sot_start + sot.tile_part_length as usize
            } else {
                // Open-ended final tile-part: runs to EOC.
                data.len().saturating_sub(2)
            };
            if region_end < data_start || region_end > data.len() {
                return Err(CodecError::invalid_data(format!(
                    "tile {} Psot {} overruns the codestream",
                    sot.tile_index, sot.tile_part_length
                )));
            }
            if sot.tile_index as u32 >= num_tiles {
                return Err(CodecError::decoding(format!(
                    "tile index {} outside the {num_tiles}-tile grid",
                    sot.tile_index
                )));
            }

            let region = &data[data_start..region_end];
            if sot.tile_part_index != 0 {
                if self.config.strict {
                    return Err(CodecError::NotImplemented(
                        "multiple tile-parts per tile",
                    ));
                }
                warn!(
                    "tile {}: ignoring tile-part {}",
                    sot.tile_index, sot.tile_part_index
                );
            } else {
                match self.decode_tile(region, sot.tile_index as u32, &header, &mut image) {
                    Ok(()) => {}
                    Err(err) if !self.config.strict => {
                        // The malformed tile is discarded; later tiles are
                        // unaffected.
                        warn!("tile {} discarded: {err}", sot.tile_index);
                    }
                    Err(err) => return Err(err),
                }
            }

            parser.reader.skip(region_end - data_start)?;
            let marker = parser.reader.read_u16()?;
            if marker == 0xFFD9 {
                break;
            }
            if marker != 0xFF90 {
                return Err(CodecError::invalid_data(format!(
                    "expected SOT or EOC after tile data, found {marker:#06X}"
                )));
            }
            sot_start = parser.reader.position() - 2;
        }

        Ok(image)
    }

    #[allow(clippy::needless_range_loop)]
    fn decode_tile(
        &self,
        region: &[u8],
        tile: u32,
        header: &MainHeader,
        image: &mut Image,
    ) -> Result<()> {
        let siz = &header.siz;
        let num_components = siz.components.len();
        let main_cod = &header.cod;

        for c in 0..num_components {
            let style = header.cod_for(c as u16).code_block_style;
            if style & !SUPPORTED_STYLE_BITS != 0 {
                return Err(CodecError::NotImplemented(
                    "code-block style options beyond segmentation symbols and HT",
                ));
            }
        }

        let layouts: Vec<TileComponentLayout> = (0..num_components)
            .map(|c| tile_component_layout(siz, header.cod_for(c as u16), c, tile))
            .collect();

        // Packet walk: collect per-block coded bytes and pass counts.
        let mut states: Vec<Vec<PrecinctState>> = layouts
            .iter()
            .map(|l| {
                l.subbands
                    .iter()
                    .map(|g| PrecinctState::new(g.grid_width, g.grid_height))
                    .collect()
            })
            .collect();
        let mut assemblies: Vec<Vec<Vec<BlockAssembly>>> = layouts
            .iter()
            .map(|l| {
                l.subbands
                    .iter()
                    .map(|g| vec![BlockAssembly::default(); g.num_blocks()])
                    .collect()
            })
            .collect();

        let dims = ProgressionDims {
            num_layers: main_cod.num_layers as u32,
            precincts: layouts
                .iter()
                .map(|l| vec![1u32; l.levels as usize + 1])
                .collect(),
        };

        let mut offset = 0usize;
        for coord in packet_sequence(main_cod.progression_order, &dims) {
            if offset > region.len() {
                return Err(CodecError::decoding(format!(
                    "packet walk ran past the {}-byte tile body",
                    region.len()
                )));
            }
            let c = coord.component as usize;
            let slots = subbands_of_resolution(&layouts[c].subbands, coord.resolution);

            let mut reader = BitReader::new(&region[offset..]);
            let mut decoded_per_slot = Vec::with_capacity(slots.len());
            if reader.read_bit()? == 1 {
                for &slot in &slots {
                    let decoded =
                        read_subband_contributions(&mut reader, &mut states[c][slot], coord.layer)?;
                    decoded_per_slot.push(decoded);
                }
            } else {
                decoded_per_slot.resize_with(slots.len(), Vec::new);
            }
            offset += reader.align_position();

            for (&slot, decoded) in slots.iter().zip(decoded_per_slot.iter()) {
                for contribution in decoded {
                    let end = offset + contribution.length;
                    if end > region.len() {
                        return Err(CodecError::decoding(format!(
                            "code-block contribution of {} bytes overruns the packet body",
                            contribution.length
                        )));
                    }
                    let assembly = &mut assemblies[c][slot][contribution.block_index];
                    assembly.data.extend_from_slice(&region[offset..end]);
                    assembly.passes += contribution.added_passes;
                    if let Some(zbp) = contribution.zero_bit_planes {
                        if zbp > MAX_BIT_PLANES {
                            return Err(CodecError::decoding(format!(
                                "zero-bit-plane count {zbp} exceeds the coefficient range"
                            )));
                        }
                        assembly.zero_bit_planes = Some(zbp);
                    }
                    offset += contribution.length;
                }
            }
        }

        // Entropy-decode every code-block into its subband array.
        let mut jobs = Vec::new();
        for (c, layout) in layouts.iter().enumerate() {
            for (slot, geom) in layout.subbands.iter().enumerate() {
                for by in 0..geom.grid_height {
                    for bx in 0..geom.grid_width {
                        jobs.push((c, slot, bx, by));
                    }
                }
            }
        }

        let decode_one = |&(c, slot, bx, by): &(usize, usize, usize, usize)| -> Result<Vec<i32>> {
            self.token.check()?;
            let cod = header.cod_for(c as u16);
            let geom = &layouts[c].subbands[slot];
            let (_, _, w, h) = geom.block_rect(bx, by, cod.code_block_size());
            let assembly = &assemblies[c][slot][by * geom.grid_width + bx];
            if assembly.passes == 0 {
                return Ok(vec![0; w * h]);
            }
            let zbp = assembly.zero_bit_planes.unwrap_or(MAX_BIT_PLANES);
            let planes = (MAX_BIT_PLANES - zbp) as u8;
            let decoded = if cod.uses_ht() {
                ht_block_coder::decode_block(
                    &assembly.data,
                    w,
                    h,
                    planes,
                    assembly.passes.min(u8::MAX as u32) as u8,
                )
            } else {
                let opts = EbcotOptions {
                    terminate_each_pass: false,
                    segmentation_symbols: cod.code_block_style & STYLE_SEGMENTATION_SYMBOLS != 0,
                };
                bit_plane_coder::decode_block(
                    &assembly.data,
                    w,
                    h,
                    geom.orientation,
                    planes,
                    assembly.passes.min(u8::MAX as u32) as u8,
                    opts,
                    None,
                )
            };
            match decoded {
                Ok(coeffs) => Ok(coeffs),
                Err(err) if !self.config.strict => {
                    // Error concealment: a corrupt block decodes as zeros.
                    warn!("code-block ({c}, {slot}, {bx}, {by}) concealed: {err}");
                    Ok(vec![0; w * h])
                }
                Err(err) => Err(err),
            }
        };

        let block_coeffs: Vec<Vec<i32>> = if self.config.enable_parallel_code_blocks {
            jobs.par_iter().map(decode_one).collect::<Result<Vec<_>>>()?
        } else {
            jobs.iter().map(decode_one).collect::<Result<Vec<_>>>()?
        };

        // Scatter blocks into per-subband coefficient arrays.
        let mut subband_data: Vec<Vec<Vec<i32>>> = layouts
            .iter()
            .map(|l| {
                l.subbands
                    .iter()
                    .map(|g| vec![0i32; g.width * g.height])
                    .collect()
            })
            .collect();
        for (job, coeffs) in jobs.iter().zip(block_coeffs.into_iter()) {
            let &(c, slot, bx, by) = job;
            let cod = header.cod_for(c as u16);
            let geom = &layouts[c].subbands[slot];
            let (x0, y0, w, h) = geom.block_rect(bx, by, cod.code_block_size());
            let band = &mut subband_data[c][slot];
            for y in 0..h {
                let dst = (y0 + y) * geom.width + x0;
                band[dst..dst + w].copy_from_slice(&coeffs[y * w..(y + 1) * w]);
            }
        }

        // Per component: dequantize, inverse DWT.
        let mut int_planes: Vec<Vec<i32>> = Vec::with_capacity(num_components);
        let mut real_planes: Vec<Vec<f64>> = Vec::with_capacity(num_components);
        let reversible = main_cod.is_reversible();
        for c in 0..num_components {
            self.token.check()?;
            let cod = header.cod_for(c as u16);
            if cod.is_reversible() != reversible && main_cod.mct == 1 && c < 3 {
                return Err(CodecError::decoding(
                    "mixed transforms across colour-transformed components".to_string(),
                ));
            }
            let layout = &layouts[c];
            if layout.width == 0 || layout.height == 0 {
                int_planes.push(Vec::new());
                real_planes.push(Vec::new());
                continue;
            }
            if cod.is_reversible() {
                let decomp = build_decomposition_int(layout, &subband_data[c]);
                let engine =
                    DwtEngine::new(WaveletKernel::le_gall_5_3(), BoundaryMode::Symmetric);
                let samples = if layout.levels == 0 {
                    decomp.ll.data
                } else {
                    engine.reconstruct_int(&decomp)?
                };
                int_planes.push(samples);
                real_planes.push(Vec::new());
            } else {
                let qcd = header.qcd_for(c as u16);
                let decomp =
                    build_decomposition_real(layout, &subband_data[c], qcd)?;
                let engine = DwtEngine::new(WaveletKernel::cdf_9_7(), BoundaryMode::Symmetric);
                let samples = if layout.levels == 0 {
                    decomp.ll.data
                } else {
                    engine.reconstruct_real(&decomp)?
                };
                real_planes.push(samples);
                int_planes.push(Vec::new());
            }
        }

        // Inverse colour transform.
        if main_cod.mct == 1 && num_components >= 3 {
            if reversible {
                let (a, rest) = int_planes.split_at_mut(1);
                let (b, c) = rest.split_at_mut(1);
                colour::rct_inverse(&mut a[0], &mut b[0], &mut c[0])?;
            } else {
                let (a, rest) = real_planes.split_at_mut(1);
                let (b, c) = rest.split_at_mut(1);
                colour::ict_inverse(&mut a[0], &mut b[0], &mut c[0])?;
            }
        }

        // Level shift, clamp, scatter into the output planes.
        let (x0, y0, x1, y1) = siz.tile_rect(tile);
        for c in 0..num_components {
            let info: ComponentInfo = siz.components[c];
            let cod = header.cod_for(c as u16);
            let layout = &layouts[c];
            let (dx, dy) = (info.dx as u32, info.dy as u32);
            let (px0, px1) = (x0.div_ceil(dx), x1.div_ceil(dx));
            let (py0, py1) = (y0.div_ceil(dy), y1.div_ceil(dy));
            let plane_w = siz.width.div_ceil(dx) as usize;
            let shift = if info.signed {
                0
            } else {
                1 << (info.bit_depth - 1)
            };
            let (lo, hi) = if info.signed {
                (-(1 << (info.bit_depth - 1)), (1 << (info.bit_depth - 1)) - 1)
            } else {
                (0, (1 << info.bit_depth) - 1)
            };

            let tile_w = layout.width;
            for py in py0..py1 {
                for px in px0..px1 {
                    let local = (py - py0) as usize * tile_w + (px - px0) as usize;
                    let raw = if cod.is_reversible() {
                        int_planes[c][local]
                    } else {
                        real_planes[c][local].round() as i32
                    };
                    image.planes[c][py as usize * plane_w + px as usize] =
                        (raw + shift).clamp(lo, hi);
                }
            }
        }
        debug!("tile {tile}: decoded {num_components} components");
        Ok(())
    }
}

/// Reassemble a reversible decomposition from slot-ordered subband arrays.
fn build_decomposition_int(
    layout: &TileComponentLayout,
    subbands: &[Vec<i32>],
) -> Decomposition<i32> {
    let mut dims = Vec::with_capacity(layout.levels as usize);
    let (mut w, mut h) = (layout.width, layout.height);
    for _ in 0..layout.levels {
        dims.push((w, h));
        w = w.div_ceil(2);
        h = h.div_ceil(2);
    }

    let band = |slot: usize, orientation: SubbandOrientation| {
        let geom = &layout.subbands[slot];
        Subband2D {
            orientation,
            width: geom.width,
            height: geom.height,
            data: subbands[slot].clone(),
        }
    };

    let mut levels = Vec::with_capacity(layout.levels as usize);
    for level in 0..layout.levels {
        let resolution = layout.levels - level;
        let base = 1 + 3 * (resolution as usize - 1);
        let (pw, ph) = dims[level as usize];
        levels.push(DecompLevel {
            width: pw,
            height: ph,
            hl: band(base, SubbandOrientation::HL),
            lh: band(base + 1, SubbandOrientation::LH),
            hh: band(base + 2, SubbandOrientation::HH),
        });
    }

    Decomposition {
        width: layout.width,
        height: layout.height,
        levels,
        ll: band(0, SubbandOrientation::LL),
    }
}

/// Reassemble an irreversible decomposition, dequantizing each subband with
/// its QCD step.
fn build_decomposition_real(
    layout: &TileComponentLayout,
    subbands: &[Vec<i32>],
    qcd: &QcdRecord,
) -> Result<Decomposition<f64>> {
    let params = QuantParams {
        mode: QuantizerMode::Scalar,
        base_step: 1.0,
        ..Default::default()
    };

    let step_for_slot = |slot: usize, geom_level: u8, orientation: SubbandOrientation| -> Result<f64> {
        match qcd.style {
            1 => {
                // Scalar derived: a single base step scaled per subband.
                let (e, m) = *qcd.steps.first().ok_or_else(|| {
                    CodecError::decoding("QCD carries no step sizes".to_string())
                })?;
                let base = decode_step_size(e, m);
                let gain = crate::quantization::subband_gain(false, orientation);
                Ok(base * (1u64 << geom_level) as f64 / gain)
            }
            _ => {
                let &(e, m) = qcd.steps.get(slot).ok_or_else(|| {
                    CodecError::decoding(format!(
                        "QCD has no step size for subband slot {slot}"
                    ))
                })?;
                Ok(decode_step_size(e, m))
            }
        }
    };

    let band = |slot: usize, orientation: SubbandOrientation| -> Result<Subband2D<f64>> {
        let geom = &layout.subbands[slot];
        let step = step_for_slot(slot, geom.level, orientation)?;
        let data = subbands[slot]
            .iter()
            .map(|&q| dequantize(&params, q, step))
            .collect();
        Ok(Subband2D {
            orientation,
            width: geom.width,
            height: geom.height,
            data,
        })
    };

    let mut dims = Vec::with_capacity(layout.levels as usize);
    let (mut w, mut h) = (layout.width, layout.height);
    for _ in 0..layout.levels {
        dims.push((w, h));
        w = w.div_ceil(2);
        h = h.div_ceil(2);
    }

    let mut levels = Vec::with_capacity(layout.levels as usize);
    for level in 0..layout.levels {
        let resolution = layout.levels - level;
        let base = 1 + 3 * (resolution as usize - 1);
        let (pw, ph) = dims[level as usize];
        levels.push(DecompLevel {
            width: pw,
            height: ph,
            hl: band(base, SubbandOrientation::HL)?,
            lh: band(base + 1, SubbandOrientation::LH)?,
            hh: band(base + 2, SubbandOrientation::HH)?,
        });
    }

    Ok(Decomposition {
        width: layout.width,
        height: layout.height,
        levels,
        ll: band(0, SubbandOrientation::LL)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EncoderConfig, ProgressionOrder};
    use crate::encoder::Encoder;

    fn test_image(width: u32, height: u32, components: usize, depth: u8, signed: bool) -> Image {
        let lim = 1i32 << depth;
        let planes: Vec<Vec<i32>> = (0..components)
            .map(|c| {
                let mut s = 0x1234_0000u32 ^ (c as u32);
                (0..width * height)
                    .map(|_| {
                        s = s.wrapping_mul(1664525).wrapping_add(1013904223);
                        let v = ((s >> 9) % lim as u32) as i32;
                        if signed {
                            v - lim / 2
                        } else {
                            v
                        }
                    })
                    .collect()
            })
            .collect();
        Image {
            width,
            height,
            components: vec![
                ComponentInfo {
                    bit_depth: depth,
                    signed,
                    dx: 1,
                    dy: 1,
                };
                components
            ],
            planes,
        }
    }

    fn round_trip(config: EncoderConfig, image: &Image) -> Image {
        let bytes = Encoder::new(config).unwrap().encode(image).unwrap();
        Decoder::default().decode(&bytes).unwrap()
    }

    #[test]
    fn lossless_grayscale_round_trip() {
        let image = test_image(37, 23, 1, 8, false);
        let decoded = round_trip(
            EncoderConfig {
                decomposition_levels: 3,
                ..Default::default()
            },
            &image,
        );
        assert_eq!(decoded.planes, image.planes);
        assert_eq!(decoded.components, image.components);
    }

    #[test]
    fn lossless_rgb_round_trip_uses_rct() {
        let image = test_image(32, 32, 3, 8, false);
        let decoded = round_trip(EncoderConfig::default(), &image);
        assert_eq!(decoded.planes, image.planes);
    }

    #[test]
    fn lossless_sixteen_bit_signed_round_trip() {
        let image = test_image(24, 16, 1, 16, true);
        let decoded = round_trip(
            EncoderConfig {
                decomposition_levels: 2,
                ..Default::default()
            },
            &image,
        );
        assert_eq!(decoded.planes, image.planes);
    }

    #[test]
    fn bit_depth_one_round_trip() {
        let image = test_image(16, 16, 1, 1, false);
        let decoded = round_trip(
            EncoderConfig {
                decomposition_levels: 1,
                ..Default::default()
            },
            &image,
        );
        assert_eq!(decoded.planes, image.planes);
    }

    #[test]
    fn multi_tile_lossless_round_trip() {
        let image = test_image(70, 50, 1, 8, false);
        let decoded = round_trip(
            EncoderConfig {
                tile_size: (32, 32),
                decomposition_levels: 2,
                ..Default::default()
            },
            &image,
        );
        assert_eq!(decoded.planes, image.planes);
    }

    #[test]
    fn multi_layer_round_trip_stays_lossless() {
        let image = test_image(40, 40, 1, 8, false);
        let decoded = round_trip(
            EncoderConfig {
                quality_layers: 4,
                decomposition_levels: 2,
                ..Default::default()
            },
            &image,
        );
        assert_eq!(decoded.planes, image.planes);
    }

    #[test]
    fn every_progression_order_round_trips() {
        let image = test_image(33, 29, 3, 8, false);
        for order in [
            ProgressionOrder::Lrcp,
            ProgressionOrder::Rlcp,
            ProgressionOrder::Rpcl,
            ProgressionOrder::Pcrl,
            ProgressionOrder::Cprl,
        ] {
            let decoded = round_trip(
                EncoderConfig {
                    progression_order: order,
                    quality_layers: 2,
                    decomposition_levels: 2,
                    ..Default::default()
                },
                &image,
            );
            assert_eq!(decoded.planes, image.planes, "{order:?}");
        }
    }

    #[test]
    fn htj2k_lossless_round_trip() {
        let image = test_image(48, 32, 1, 8, false);
        let decoded = round_trip(
            EncoderConfig {
                use_htj2k: true,
                decomposition_levels: 2,
                ..Default::default()
            },
            &image,
        );
        assert_eq!(decoded.planes, image.planes);
    }

    #[test]
    fn parallel_decode_matches_sequential() {
        let image = test_image(64, 64, 1, 8, false);
        let bytes = Encoder::new(EncoderConfig::default())
            .unwrap()
            .encode(&image)
            .unwrap();
        let sequential = Decoder::default().decode(&bytes).unwrap();
        let parallel = Decoder::new(DecoderConfig {
            enable_parallel_code_blocks: true,
            ..Default::default()
        })
        .decode(&bytes)
        .unwrap();
        assert_eq!(sequential.planes, parallel.planes);
    }

    #[test]
    fn lossy_round_trip_stays_close() {
        let image = test_image(32, 32, 1, 8, false);
        let decoded = round_trip(
            EncoderConfig {
                lossless: false,
                quality: 0.95,
                decomposition_levels: 2,
                ..Default::default()
            },
            &image,
        );
        let mut max_err = 0i64;
        for (a, b) in image.planes[0].iter().zip(decoded.planes[0].iter()) {
            max_err = max_err.max((a - b).abs() as i64);
        }
        assert!(max_err <= 24, "max error {max_err} too large for q=0.95");
    }

    #[test]
    fn constant_bitrate_truncation_still_decodes() {
        use crate::config::BitrateMode;
        let image = test_image(64, 64, 1, 8, false);
        let bytes = Encoder::new(EncoderConfig {
            lossless: false,
            quality: 0.9,
            decomposition_levels: 3,
            quality_layers: 3,
            bitrate_mode: BitrateMode::ConstantBitrate { bpp: 2.0 },
            ..Default::default()
        })
        .unwrap()
        .encode(&image)
        .unwrap();
        let decoded = Decoder::default().decode(&bytes).unwrap();
        assert_eq!(decoded.width, 64);
        // Truncation is lossy; the image must still be recognisable.
        let mean_err: f64 = image.planes[0]
            .iter()
            .zip(decoded.planes[0].iter())
            .map(|(a, b)| ((a - b).abs() as f64))
            .sum::<f64>()
            / 4096.0;
        assert!(mean_err < 64.0, "mean error {mean_err}");
    }

    #[test]
    fn one_pixel_wide_edge_tile() {
        let image = test_image(33, 32, 1, 8, false);
        let decoded = round_trip(
            EncoderConfig {
                tile_size: (32, 32),
                decomposition_levels: 2,
                ..Default::default()
            },
            &image,
        );
        assert_eq!(decoded.planes, image.planes);
    }

    #[test]
    fn truncated_codestream_is_invalid_data() {
        let image = test_image(16, 16, 1, 8, false);
        let bytes = Encoder::new(EncoderConfig::default())
            .unwrap()
            .encode(&image)
            .unwrap();
        let err = Decoder::default().decode(&bytes[..bytes.len() / 3]).unwrap_err();
        assert!(matches!(
            err,
            CodecError::InvalidData(_) | CodecError::Decoding(_)
        ));
    }

    #[test]
    fn cancelled_decode_returns_cancelled() {
        let image = test_image(16, 16, 1, 8, false);
        let bytes = Encoder::new(EncoderConfig::default())
            .unwrap()
            .encode(&image)
            .unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let decoder = Decoder::with_cancellation(DecoderConfig::default(), token);
        assert_eq!(decoder.decode(&bytes), Err(CodecError::Cancelled));
    }
}
