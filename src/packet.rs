//! Packet headers (Annex B.10): code-block inclusion via tag trees,
//! zero-bit-plane signalling, pass-count codewords and Lblock-coded
//! contribution lengths. The header bit stream is stuffed after 0xFF bytes
//! so no marker can appear in a packet.

use crate::bit_io::{BitReader, BitWriter};
use crate::error::{CodecError, Result};
use crate::tag_tree::TagTree;

/// Most coding passes signallable by the Table B.4 codewords.
pub const MAX_CODING_PASSES: u32 = 164;

/// Per-code-block state that persists across the layers of one precinct.
#[derive(Debug, Clone)]
struct BlockState {
    included: bool,
    l_block: u32,
}

/// Per-precinct coding state: one inclusion tree and one zero-bit-plane
/// tree over the code-block grid, plus per-block Lblock counters.
#[derive(Debug, Clone)]
pub struct PrecinctState {
    grid_width: usize,
    grid_height: usize,
    inclusion_tree: TagTree,
    zero_bp_tree: TagTree,
    blocks: Vec<BlockState>,
}

/// One code-block's contribution to a packet, in precinct raster order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Contribution {
    pub added_passes: u32,
    pub length: usize,
    /// Leading zero bit-planes; consulted only on first inclusion.
    pub zero_bit_planes: u32,
}

/// A decoded contribution with its grid position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedContribution {
    pub block_index: usize,
    pub added_passes: u32,
    pub length: usize,
    /// Present when this packet includes the block for the first time.
    pub zero_bit_planes: Option<u32>,
}

impl PrecinctState {
    pub fn new(grid_width: usize, grid_height: usize) -> Self {
        Self {
            grid_width,
            grid_height,
            inclusion_tree: TagTree::new(grid_width, grid_height),
            zero_bp_tree: TagTree::new(grid_width, grid_height),
            blocks: vec![
                BlockState {
                    included: false,
                    l_block: 3,
                };
                grid_width * grid_height
            ],
        }
    }

    pub fn grid_size(&self) -> usize {
        self.grid_width * self.grid_height
    }

    /// Seed the encode-side tag trees: the layer each block is first
    /// included in and its zero-bit-plane count, in raster order.
    pub fn prepare_encode(&mut self, first_layers: &[u32], zero_bit_planes: &[u32]) -> Result<()> {
        if first_layers.len() != self.grid_size() || zero_bit_planes.len() != self.grid_size() {
            return Err(CodecError::encoding(format!(
                "precinct seed arrays of {}/{} entries do not cover the {} blocks",
                first_layers.len(),
                zero_bit_planes.len(),
                self.grid_size()
            )));
        }
        for y in 0..self.grid_height {
            for x in 0..self.grid_width {
                let i = y * self.grid_width + x;
                self.inclusion_tree.set_value(x, y, first_layers[i]);
                self.zero_bp_tree.set_value(x, y, zero_bit_planes[i]);
            }
        }
        self.inclusion_tree.finalize();
        self.zero_bp_tree.finalize();
        Ok(())
    }
}

/// Table B.4 pass-count codewords.
fn write_pass_count(writer: &mut BitWriter, n: u32) -> Result<()> {
    match n {
        1 => writer.write_bits(0b0, 1),
        2 => writer.write_bits(0b10, 2),
        3..=5 => {
            writer.write_bits(0b1100 + (n - 3), 4);
        }
        6..=36 => {
            writer.write_bits(0b1111, 4);
            writer.write_bits(n - 6, 5);
        }
        37..=164 => {
            writer.write_bits(0b1111, 4);
            writer.write_bits(0b11111, 5);
            writer.write_bits(n - 37, 7);
        }
        _ => {
            return Err(CodecError::encoding(format!(
                "{n} coding passes cannot be signalled (limit {MAX_CODING_PASSES})"
            )))
        }
    }
    Ok(())
}

fn read_pass_count(reader: &mut BitReader) -> Result<u32> {
    if reader.read_bit()? == 0 {
        return Ok(1);
    }
    if reader.read_bit()? == 0 {
        return Ok(2);
    }
    let two = reader.read_bits(2)?;
    if two < 3 {
        return Ok(3 + two);
    }
    let five = reader.read_bits(5)?;
    if five < 31 {
        return Ok(6 + five);
    }
    Ok(37 + reader.read_bits(7)?)
}

/// Write one packet header over a single subband grid. `contributions[i]`
/// is `None` when grid block `i` adds nothing in this layer.
/// `prepare_encode` must have seeded the trees.
pub fn write_packet_header(
    writer: &mut BitWriter,
    state: &mut PrecinctState,
    layer: u32,
    contributions: &[Option<Contribution>],
) -> Result<()> {
    if contributions.iter().all(|c| c.is_none()) {
        writer.write_bit(0);
        return Ok(());
    }
    writer.write_bit(1);
    write_subband_contributions(writer, state, layer, contributions)
}

/// The per-subband body of a packet header (everything after the leading
/// empty/non-empty bit). A multi-subband resolution writes one of these per
/// subband into the same header.
pub fn write_subband_contributions(
    writer: &mut BitWriter,
    state: &mut PrecinctState,
    layer: u32,
    contributions: &[Option<Contribution>],
) -> Result<()> {
    if contributions.len() != state.grid_size() {
        return Err(CodecError::encoding(format!(
            "{} contributions for a {}-block precinct",
            contributions.len(),
            state.grid_size()
        )));
    }

    for y in 0..state.grid_height {
        for x in 0..state.grid_width {
            let i = y * state.grid_width + x;
            let contribution = &contributions[i];

            let newly_included = if state.blocks[i].included {
                writer.write_bit(contribution.is_some() as u8);
                false
            } else {
                state.inclusion_tree.encode(writer, x, y, layer + 1)?;
                contribution.is_some()
            };

            let Some(contribution) = contribution else {
                continue;
            };
            if contribution.added_passes == 0 || contribution.added_passes > MAX_CODING_PASSES {
                return Err(CodecError::encoding(format!(
                    "block ({x}, {y}) contributes {} passes",
                    contribution.added_passes
                )));
            }

            if newly_included {
                state.zero_bp_tree.encode(writer, x, y, u32::MAX)?;
                state.blocks[i].included = true;
            }

            write_pass_count(writer, contribution.added_passes)?;

            // Lblock signalling: k ones raise the length field width.
            let pass_bits = 31 - contribution.added_passes.leading_zeros();
            let mut bits = state.blocks[i].l_block + pass_bits;
            while (contribution.length as u64) >= 1u64 << bits {
                writer.write_bit(1);
                state.blocks[i].l_block += 1;
                bits += 1;
            }
            writer.write_bit(0);
            writer.write_bits(contribution.length as u32, bits as u8);
        }
    }
    Ok(())
}

/// Read one single-subband packet header; returns the contributing blocks
/// in raster order.
pub fn read_packet_header(
    reader: &mut BitReader,
    state: &mut PrecinctState,
    layer: u32,
) -> Result<Vec<DecodedContribution>> {
    if reader.read_bit()? == 0 {
        return Ok(Vec::new()); // zero-length packet
    }
    read_subband_contributions(reader, state, layer)
}

/// The per-subband body of a packet header on the read side.
pub fn read_subband_contributions(
    reader: &mut BitReader,
    state: &mut PrecinctState,
    layer: u32,
) -> Result<Vec<DecodedContribution>> {
    let mut out = Vec::new();
    for y in 0..state.grid_height {
        for x in 0..state.grid_width {
            let i = y * state.grid_width + x;

            let (included, first_time) = if state.blocks[i].included {
                (reader.read_bit()? == 1, false)
            } else {
                let value = state.inclusion_tree.decode(reader, x, y, layer + 1)?;
                (value.is_some(), value.is_some())
            };
            if !included {
                continue;
            }

            let zero_bit_planes = if first_time {
                let zbp = state
                    .zero_bp_tree
                    .decode(reader, x, y, u32::MAX)?
                    .ok_or_else(|| {
                        CodecError::decoding(format!(
                            "zero-bit-plane tree for block ({x}, {y}) left undetermined"
                        ))
                    })?;
                state.blocks[i].included = true;
                Some(zbp)
            } else {
                None
            };

            let added_passes = read_pass_count(reader)?;
            if added_passes > MAX_CODING_PASSES {
                return Err(CodecError::decoding(format!(
                    "block ({x}, {y}) signals {added_passes} coding passes"
                )));
            }

            let mut bits = state.blocks[i].l_block + (31 - added_passes.leading_zeros());
            while reader.read_bit()? == 1 {
                state.blocks[i].l_block += 1;
                bits += 1;
            }
            if bits > 32 {
                return Err(CodecError::decoding(format!(
                    "contribution length field of {bits} bits for block ({x}, {y})"
                )));
            }
            let length = reader.read_bits(bits as u8)? as usize;

            out.push(DecodedContribution {
                block_index: i,
                added_passes,
                length,
                zero_bit_planes,
            });
        }
    }
    Ok(out)
}
