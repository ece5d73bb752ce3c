//! Encoder pipeline: tiling, colour transform, DWT, quantization,
//! per-code-block entropy coding (optionally fanned out over a worker
//! pool), layer forming and packet/marker assembly.
//!
//! The produced codestream is byte-deterministic for identical (image,
//! configuration) inputs.

use log::debug;
use rayon::prelude::*;

use crate::bit_io::BitWriter;
use crate::bit_plane_coder::{self, EbcotOptions};
use crate::colour;
use crate::config::{BitrateMode, CancellationToken, EncoderConfig};
use crate::dwt::kernel::{BoundaryMode, KernelKind, WaveletKernel};
use crate::dwt::{Decomposition, DwtEngine};
use crate::error::{CodecError, Result};
use crate::headers::{CapRecord, CodRecord, QcdRecord, SizRecord, SotRecord, STYLE_HT_BLOCK_CODER};
use crate::ht_block_coder;
use crate::image::{Image, SubbandOrientation};
use crate::packet::{write_subband_contributions, Contribution, PrecinctState};
use crate::progression::{packet_sequence, ProgressionDims};
use crate::quantization::{
    self, decode_step_size, encode_step_size, subband_step, QuantParams, QuantizerMode,
};
use crate::rate_control::{allocate_layers, BlockRate};
use crate::tile_geom::{subbands_of_resolution, tile_component_layout, TileComponentLayout};
use crate::writer::CodestreamWriter;

/// All coefficient magnitudes fit 31 bits; zero-bit-plane counts are
/// signalled against this fixed ceiling.
const MAX_BIT_PLANES: u32 = 31;

/// One entropy-coded code-block with its rate-control bookkeeping.
#[derive(Debug, Clone, Default)]
struct CodedBlock {
    data: Vec<u8>,
    num_passes: u32,
    zero_bit_planes: u32,
    pass_lengths: Vec<usize>,
    pass_distortions: Vec<f64>,
    ht: bool,
}

pub struct Encoder {
    config: EncoderConfig,
    token: CancellationToken,
}

impl Encoder {
    pub fn new(config: EncoderConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            token: CancellationToken::new(),
        })
    }

    pub fn with_cancellation(config: EncoderConfig, token: CancellationToken) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, token })
    }

    fn kernel(&self) -> WaveletKernel {
        self.config.wavelet_kernel.clone().unwrap_or_else(|| {
            if self.config.lossless {
                WaveletKernel::le_gall_5_3()
            } else {
                WaveletKernel::cdf_9_7()
            }
        })
    }

    fn quant_params(&self) -> QuantParams {
        let mode = if self.config.lossless {
            QuantizerMode::None
        } else {
            QuantizerMode::Scalar
        };
        QuantParams {
            mode,
            base_step: 2f64.powf(-(1.0 + 7.0 * self.config.quality)),
            guard_bits: 2,
            ..Default::default()
        }
    }

    /// RCT/ICT applies when the first three components share full
    /// resolution and bit depth.
    fn mct_usable(image: &Image) -> bool {
        image.components.len() >= 3
            && image.components[..3].iter().all(|c| {
                c.dx == 1
                    && c.dy == 1
                    && c.bit_depth == image.components[0].bit_depth
                    && c.signed == image.components[0].signed
            })
    }

    /// Per-slot quantization steps for the nominal decomposition depth:
    /// the exact values used for coding and their QCD field encodings.
    fn subband_steps(&self, reversible: bool, max_depth: u8) -> Result<(Vec<f64>, QcdRecord)> {
        let params = self.quant_params();
        params.validate()?;
        let levels = self.config.decomposition_levels;
        let num_slots = 1 + 3 * levels as usize;
        let mut actual = Vec::with_capacity(num_slots);
        let mut fields = Vec::with_capacity(num_slots);

        let slot_info = |slot: usize| -> (u8, SubbandOrientation) {
            if slot == 0 {
                (levels.saturating_sub(1), SubbandOrientation::LL)
            } else {
                let r = 1 + (slot - 1) / 3;
                let orientation = match (slot - 1) % 3 {
                    0 => SubbandOrientation::HL,
                    1 => SubbandOrientation::LH,
                    _ => SubbandOrientation::HH,
                };
                (levels - r as u8, orientation)
            }
        };

        for slot in 0..num_slots {
            let (level, orientation) = slot_info(slot);
            if reversible {
                // Style 0: exponents record the nominal dynamic range.
                let exponent = max_depth + orientation.log2_gain();
                actual.push(1.0);
                fields.push((exponent, 0u16));
            } else {
                let mut step = subband_step(&params, false, level, orientation);
                if self.config.visual_weighting {
                    step /= quantization::csf_weight(levels, level, orientation);
                }
                let (exponent, mantissa) = encode_step_size(step)?;
                // Quantize with the value the decoder will reconstruct.
                actual.push(decode_step_size(exponent, mantissa));
                fields.push((exponent, mantissa));
            }
        }

        let qcd = QcdRecord {
            style: if reversible { 0 } else { 2 },
            guard_bits: params.guard_bits,
            steps: fields,
        };
        Ok((actual, qcd))
    }

    /// Encode an image into a codestream.
    pub fn encode(&self, image: &Image) -> Result<Vec<u8>> {
        image.validate()?;
        let kernel = self.kernel();
        let reversible = kernel.reversible;
        let engine = DwtEngine::new(kernel, BoundaryMode::Symmetric);
        // COD's transform byte can only name the two primary kernels; an
        // arbitrary kernel would need a codestream-side filter table to be
        // decodable, and ADS carries only an index.
        if !matches!(engine.kind(), KernelKind::LeGall53 | KernelKind::Cdf97) {
            return Err(CodecError::NotImplemented(
                "codestream signalling for non-primary wavelet kernels",
            ));
        }

        let (tile_w, tile_h) = if self.config.tile_size == (0, 0) {
            (image.width, image.height)
        } else {
            self.config.tile_size
        };

        let siz = SizRecord {
            rsiz: 0,
            width: image.width,
            height: image.height,
            x_offset: 0,
            y_offset: 0,
            tile_width: tile_w,
            tile_height: tile_h,
            tile_x_offset: 0,
            tile_y_offset: 0,
            components: image.components.clone(),
        };
        siz.validate()?;

        let mct = u8::from(Self::mct_usable(image));
        let cod = CodRecord {
            coding_style: 0,
            progression_order: self.config.progression_order,
            num_layers: self.config.quality_layers as u16,
            mct,
            decomposition_levels: self.config.decomposition_levels,
            code_block_width_exp: self.config.code_block_size.0.trailing_zeros() as u8,
            code_block_height_exp: self.config.code_block_size.1.trailing_zeros() as u8,
            code_block_style: if self.config.use_htj2k {
                STYLE_HT_BLOCK_CODER
            } else {
                0
            },
            transform: u8::from(reversible),
            precinct_sizes: Vec::new(),
        };
        cod.validate()?;

        let max_depth = image
            .components
            .iter()
            .map(|c| c.bit_depth)
            .max()
            .unwrap_or(8);
        let (steps, qcd) = self.subband_steps(reversible, max_depth)?;

        let mut writer = CodestreamWriter::new();
        writer.write_soc();
        writer.write_siz(&siz)?;
        if self.config.use_htj2k {
            writer.write_cap(&CapRecord::htj2k(false))?;
        }
        writer.write_cod(&cod)?;
        writer.write_qcd(&qcd)?;

        let (tiles_x, tiles_y) = siz.tile_grid();
        let num_tiles = tiles_x * tiles_y;
        for tile in 0..num_tiles {
            self.token.check()?;
            let body = self.encode_tile(image, &siz, &cod, &engine, &steps, tile)?;
            let sot = SotRecord {
                tile_index: tile as u16,
                tile_part_length: 0,
                tile_part_index: 0,
                num_tile_parts: 1,
            };
            let sot_start = writer.len();
            let psot_at = writer.write_sot(&sot);
            writer.write_sod();
            writer.write_bytes(&body);
            let psot = (writer.len() - sot_start) as u32;
            writer.patch_u32(psot_at, psot);
            debug!("tile {tile}: {psot} bytes");
        }

        writer.write_eoc();
        Ok(writer.into_bytes())
    }

    /// Extract one component's tile samples, level-shifted to signed.
    fn extract_tile_samples(
        image: &Image,
        siz: &SizRecord,
        component: usize,
        tile: u32,
    ) -> Vec<i32> {
        let comp = &image.components[component];
        let (x0, y0, x1, y1) = siz.tile_rect(tile);
        let (dx, dy) = (comp.dx as u32, comp.dy as u32);
        let (px0, px1) = (x0.div_ceil(dx), x1.div_ceil(dx));
        let (py0, py1) = (y0.div_ceil(dy), y1.div_ceil(dy));
        let plane_w = image.width.div_ceil(dx) as usize;
        let shift = if comp.signed {
            0
        } else {
            1 << (comp.bit_depth - 1)
        };

        let plane = &image.planes[component];
        let mut out = Vec::with_capacity(((px1 - px0) * (py1 - py0)) as usize);
        for py in py0..py1 {
            for px in px0..px1 {
                out.push(plane[py as usize * plane_w + px as usize] - shift);
            }
        }
        out
    }

    #[allow(clippy::too_many_arguments)]
    fn encode_tile(
        &self,
        image: &Image,
        siz: &SizRecord,
        cod: &CodRecord,
        engine: &DwtEngine,
        steps: &[f64],
        tile: u32,
    ) -> Result<Vec<u8>> {
        let reversible = cod.is_reversible();
        let num_components = image.components.len();
        let params = self.quant_params();

        // Sample extraction and colour transform.
        let mut comp_samples: Vec<Vec<i32>> = (0..num_components)
            .map(|c| Self::extract_tile_samples(image, siz, c, tile))
            .collect();
        let mut real_samples: Vec<Vec<f64>> = Vec::new();

        if reversible {
            if cod.mct == 1 {
                let (a, rest) = comp_samples.split_at_mut(1);
                let (b, c) = rest.split_at_mut(1);
                colour::rct_forward(&mut a[0], &mut b[0], &mut c[0])?;
            }
        } else {
            real_samples = comp_samples
                .iter()
                .map(|s| s.iter().map(|&v| v as f64).collect())
                .collect();
            if cod.mct == 1 {
                let (a, rest) = real_samples.split_at_mut(1);
                let (b, c) = rest.split_at_mut(1);
                colour::ict_forward(&mut a[0], &mut b[0], &mut c[0])?;
            }
        }

        // Per component: DWT, quantization, code-block partitioning.
        let layouts: Vec<TileComponentLayout> = (0..num_components)
            .map(|c| tile_component_layout(siz, cod, c, tile))
            .collect();

        // Quantized coefficients per (component, subband slot).
        let mut subband_coeffs: Vec<Vec<Vec<i32>>> = Vec::with_capacity(num_components);
        for c in 0..num_components {
            self.token.check()?;
            let layout = &layouts[c];
            if layout.width == 0 || layout.height == 0 {
                subband_coeffs.push(vec![Vec::new(); layout.subbands.len()]);
                continue;
            }
            let coeffs = if reversible {
                let decomp = if layout.levels == 0 {
                    Decomposition::single_band(
                        comp_samples[c].clone(),
                        layout.width,
                        layout.height,
                    )
                } else {
                    engine.decompose_int(
                        &comp_samples[c],
                        layout.width,
                        layout.height,
                        layout.levels,
                    )?
                };
                collect_int_subbands(&decomp)
            } else {
                let decomp = if layout.levels == 0 {
                    Decomposition::single_band(
                        real_samples[c].clone(),
                        layout.width,
                        layout.height,
                    )
                } else {
                    engine.decompose_real(
                        &real_samples[c],
                        layout.width,
                        layout.height,
                        layout.levels,
                    )?
                };
                quantize_real_subbands(&decomp, &params, steps)?
            };
            if coeffs.len() != layout.subbands.len() {
                return Err(CodecError::encoding(format!(
                    "component {c}: {} subbands produced for a {}-slot layout",
                    coeffs.len(),
                    layout.subbands.len()
                )));
            }
            subband_coeffs.push(coeffs);
        }

        // Entropy-code every code-block.
        let ebcot_opts = EbcotOptions::default();
        let use_ht = cod.uses_ht();
        let mut block_jobs: Vec<(usize, usize, usize, usize, usize, Vec<i32>)> = Vec::new();
        for (c, layout) in layouts.iter().enumerate() {
            for (slot, geom) in layout.subbands.iter().enumerate() {
                for by in 0..geom.grid_height {
                    for bx in 0..geom.grid_width {
                        let (x0, y0, w, h) = geom.block_rect(bx, by, cod.code_block_size());
                        let mut block = Vec::with_capacity(w * h);
                        let band = &subband_coeffs[c][slot];
                        for y in 0..h {
                            let row = (y0 + y) * geom.width + x0;
                            block.extend_from_slice(&band[row..row + w]);
                        }
                        block_jobs.push((c, slot, by * geom.grid_width + bx, w, h, block));
                    }
                }
            }
        }

        let code_one = |job: &(usize, usize, usize, usize, usize, Vec<i32>)| -> Result<CodedBlock> {
            self.token.check()?;
            let (c, slot, _idx, w, h, ref coeffs) = *job;
            let orientation = layouts[c].subbands[slot].orientation;
            if use_ht {
                let enc = ht_block_coder::encode_block(w, h, coeffs, 0)?;
                Ok(CodedBlock {
                    zero_bit_planes: MAX_BIT_PLANES - enc.num_bit_planes as u32,
                    num_passes: enc.num_passes as u32,
                    pass_lengths: if enc.data.is_empty() {
                        Vec::new()
                    } else {
                        vec![enc.data.len()]
                    },
                    pass_distortions: if enc.data.is_empty() {
                        Vec::new()
                    } else {
                        vec![0.0]
                    },
                    data: enc.data,
                    ht: true,
                })
            } else {
                let enc = bit_plane_coder::encode_block(w, h, orientation, coeffs, ebcot_opts)?;
                if enc.num_bit_planes as u32 > MAX_BIT_PLANES {
                    return Err(CodecError::encoding(format!(
                        "code-block needs {} bit-planes",
                        enc.num_bit_planes
                    )));
                }
                Ok(CodedBlock {
                    zero_bit_planes: MAX_BIT_PLANES - enc.num_bit_planes as u32,
                    num_passes: enc.num_passes as u32,
                    pass_lengths: enc.pass_lengths,
                    pass_distortions: enc.pass_distortions,
                    data: enc.data,
                    ht: false,
                })
            }
        };

        let coded: Vec<CodedBlock> = if self.config.enable_parallel_code_blocks {
            block_jobs
                .par_iter()
                .map(code_one)
                .collect::<Result<Vec<_>>>()?
        } else {
            block_jobs
                .iter()
                .map(code_one)
                .collect::<Result<Vec<_>>>()?
        };

        // Layer allocation over the whole tile.
        let rates: Vec<BlockRate> = coded
            .iter()
            .map(|b| BlockRate {
                pass_lengths: b.pass_lengths.clone(),
                pass_distortions: b.pass_distortions.clone(),
            })
            .collect();
        let (tx0, ty0, tx1, ty1) = siz.tile_rect(tile);
        let tile_pixels = ((tx1 - tx0) * (ty1 - ty0)) as usize;
        let mode = if self.config.lossless {
            BitrateMode::Lossless
        } else {
            self.config.bitrate_mode
        };
        let allocation = allocate_layers(
            &rates,
            self.config.quality_layers,
            &mode,
            self.config.quality,
            tile_pixels,
        )?;
        let num_layers = self.config.quality_layers as u32;

        // Cumulative passes per layer, clamped to what each block has.
        let cum = |layer: usize, block: usize| -> u32 {
            allocation.cumulative_passes[layer][block].min(coded[block].num_passes)
        };
        let first_layer_of = |block: usize| -> u32 {
            (0..num_layers)
                .find(|&l| cum(l as usize, block) > 0)
                .unwrap_or(num_layers)
        };

        // Precinct coding state, seeded with inclusion layers and
        // zero-bit-plane counts.
        let mut states: Vec<Vec<PrecinctState>> = Vec::with_capacity(num_components);
        // Map (component, slot, block) -> flat index into `coded`.
        let mut flat_index: Vec<Vec<usize>> = Vec::new();
        {
            let mut next = 0usize;
            for layout in &layouts {
                let mut slot_starts = Vec::with_capacity(layout.subbands.len());
                let mut comp_states = Vec::with_capacity(layout.subbands.len());
                for geom in &layout.subbands {
                    slot_starts.push(next);
                    let mut state = PrecinctState::new(geom.grid_width, geom.grid_height);
                    let n = geom.num_blocks();
                    let first_layers: Vec<u32> =
                        (0..n).map(|i| first_layer_of(next + i)).collect();
                    let zero_bps: Vec<u32> =
                        (0..n).map(|i| coded[next + i].zero_bit_planes).collect();
                    state.prepare_encode(&first_layers, &zero_bps)?;
                    comp_states.push(state);
                    next += n;
                }
                flat_index.push(slot_starts);
                states.push(comp_states);
            }
        }

        // Packet assembly in the declared progression order.
        let dims = ProgressionDims {
            num_layers,
            precincts: layouts
                .iter()
                .map(|l| vec![1u32; l.levels as usize + 1])
                .collect(),
        };
        let mut body = Vec::new();
        for coord in packet_sequence(cod.progression_order, &dims) {
            let c = coord.component as usize;
            let layer = coord.layer as usize;
            let slots = subbands_of_resolution(&layouts[c].subbands, coord.resolution);

            // Gather contributions slot by slot.
            let mut per_slot: Vec<Vec<Option<Contribution>>> = Vec::with_capacity(slots.len());
            let mut any = false;
            for &slot in &slots {
                let geom = &layouts[c].subbands[slot];
                let start = flat_index[c][slot];
                let contribs: Vec<Option<Contribution>> = (0..geom.num_blocks())
                    .map(|i| {
                        let b = start + i;
                        let now = cum(layer, b);
                        let before = if layer == 0 { 0 } else { cum(layer - 1, b) };
                        if now == before {
                            return None;
                        }
                        let (added, length) = if coded[b].ht {
                            (coded[b].num_passes, coded[b].data.len())
                        } else {
                            let end = coded[b].pass_lengths[now as usize - 1];
                            let begin = if before == 0 {
                                0
                            } else {
                                coded[b].pass_lengths[before as usize - 1]
                            };
                            (now - before, end - begin)
                        };
                        Some(Contribution {
                            added_passes: added,
                            length,
                            zero_bit_planes: coded[b].zero_bit_planes,
                        })
                    })
                    .collect();
                any |= contribs.iter().any(|c| c.is_some());
                per_slot.push(contribs);
            }

            let mut header = BitWriter::new();
            if !any {
                header.write_bit(0);
                body.extend_from_slice(&header.finish());
                continue;
            }
            header.write_bit(1);
            for (&slot, contribs) in slots.iter().zip(per_slot.iter()) {
                write_subband_contributions(
                    &mut header,
                    &mut states[c][slot],
                    coord.layer,
                    contribs,
                )?;
            }
            body.extend_from_slice(&header.finish());

            // Packet body: contributing byte ranges in the header's order.
            for (&slot, contribs) in slots.iter().zip(per_slot.iter()) {
                let start = flat_index[c][slot];
                for (i, contribution) in contribs.iter().enumerate() {
                    let Some(contribution) = contribution else {
                        continue;
                    };
                    let b = start + i;
                    let before = if layer == 0 { 0 } else { cum(layer - 1, b) };
                    let begin = if coded[b].ht || before == 0 {
                        0
                    } else {
                        coded[b].pass_lengths[before as usize - 1]
                    };
                    body.extend_from_slice(&coded[b].data[begin..begin + contribution.length]);
                }
            }
        }
        Ok(body)
    }
}

/// Flatten an integer decomposition into slot order (LL, then per
/// resolution HL, LH, HH).
fn collect_int_subbands(decomp: &Decomposition<i32>) -> Vec<Vec<i32>> {
    let mut out = Vec::with_capacity(1 + 3 * decomp.levels.len());
    out.push(decomp.ll.data.clone());
    for level in decomp.levels.iter().rev() {
        out.push(level.hl.data.clone());
        out.push(level.lh.data.clone());
        out.push(level.hh.data.clone());
    }
    out
}

/// Quantize a real decomposition into slot order using the per-slot steps.
fn quantize_real_subbands(
    decomp: &Decomposition<f64>,
    params: &QuantParams,
    steps: &[f64],
) -> Result<Vec<Vec<i32>>> {
    let mut out = Vec::with_capacity(1 + 3 * decomp.levels.len());
    let quant = |data: &[f64], slot: usize| -> Result<Vec<i32>> {
        if data.is_empty() {
            return Ok(Vec::new());
        }
        quantization::quantize_subband(params, data, steps[slot])
    };
    out.push(quant(&decomp.ll.data, 0)?);
    for (i, level) in decomp.levels.iter().rev().enumerate() {
        let base = 1 + 3 * i;
        out.push(quant(&level.hl.data, base)?);
        out.push(quant(&level.lh.data, base + 1)?);
        out.push(quant(&level.hh.data, base + 2)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::ComponentInfo;

    fn gradient_image(width: u32, height: u32) -> Image {
        let plane: Vec<i32> = (0..height)
            .flat_map(|y| (0..width).map(move |x| ((x * 3 + y * 5) % 256) as i32))
            .collect();
        Image {
            width,
            height,
            components: vec![ComponentInfo::default()],
            planes: vec![plane],
        }
    }

    #[test]
    fn encoded_stream_is_framed() {
        let encoder = Encoder::new(EncoderConfig {
            decomposition_levels: 2,
            ..Default::default()
        })
        .unwrap();
        let bytes = encoder.encode(&gradient_image(32, 32)).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0x4F]);
        assert_eq!(&bytes[2..4], &[0xFF, 0x51]);
        assert_eq!(&bytes[bytes.len() - 2..], &[0xFF, 0xD9]);
        assert!(bytes.windows(2).any(|p| p == [0xFF, 0x90]));
        assert!(bytes.windows(2).any(|p| p == [0xFF, 0x93]));
    }

    #[test]
    fn encoding_is_deterministic() {
        let config = EncoderConfig {
            decomposition_levels: 3,
            quality_layers: 2,
            ..Default::default()
        };
        let image = gradient_image(48, 40);
        let a = Encoder::new(config.clone()).unwrap().encode(&image).unwrap();
        let b = Encoder::new(config).unwrap().encode(&image).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn parallel_output_matches_sequential() {
        let image = gradient_image(64, 64);
        let sequential = Encoder::new(EncoderConfig::default())
            .unwrap()
            .encode(&image)
            .unwrap();
        let parallel = Encoder::new(EncoderConfig {
            enable_parallel_code_blocks: true,
            ..Default::default()
        })
        .unwrap()
        .encode(&image)
        .unwrap();
        assert_eq!(sequential, parallel);
    }

    #[test]
    fn htj2k_stream_carries_cap_marker() {
        let encoder = Encoder::new(EncoderConfig {
            use_htj2k: true,
            decomposition_levels: 1,
            ..Default::default()
        })
        .unwrap();
        let bytes = encoder.encode(&gradient_image(16, 16)).unwrap();
        assert!(bytes.windows(2).any(|p| p == [0xFF, 0x50]));
    }

    #[test]
    fn cancellation_aborts_encoding() {
        let token = CancellationToken::new();
        token.cancel();
        let encoder =
            Encoder::with_cancellation(EncoderConfig::default(), token).unwrap();
        assert_eq!(
            encoder.encode(&gradient_image(16, 16)),
            Err(CodecError::Cancelled)
        );
    }

    #[test]
    fn psot_matches_tile_extent() {
        let encoder = Encoder::new(EncoderConfig {
            decomposition_levels: 1,
            ..Default::default()
        })
        .unwrap();
        let bytes = encoder.encode(&gradient_image(16, 16)).unwrap();
        let sot = bytes
            .windows(2)
            .position(|p| p == [0xFF, 0x90])
            .unwrap();
        let psot = u32::from_be_bytes([
            bytes[sot + 6],
            bytes[sot + 7],
            bytes[sot + 8],
            bytes[sot + 9],
        ]) as usize;
        // Psot spans from the SOT marker to the end of the tile body, which
        // the EOC marker follows directly.
        assert_eq!(sot + psot, bytes.len() - 2);
    }
}
