//! Tag trees (Annex B.10.2).
//!
//! A tag tree represents a 2-D array of non-negative integers through
//! successive reduced-resolution levels, each node holding the minimum of
//! its (up to four) children. Bits are emitted incrementally against a
//! threshold: a 0 raises the proven lower bound of a node by one, a 1 pins
//! the node's value at the bound. Only bits not implied by earlier queries
//! are coded.

use crate::bit_io::{BitReader, BitWriter};
use crate::error::{CodecError, Result};

#[derive(Debug, Clone, Copy, Default)]
struct Node {
    value: u32,
    low: u32,
    known: bool,
}

/// Level geometry shared by encoder and decoder: grids from the 1x1 root
/// down to the leaf grid.
fn level_dims(width: usize, height: usize) -> Vec<(usize, usize)> {
    let mut dims = vec![(width.max(1), height.max(1))];
    while dims.last().unwrap().0 > 1 || dims.last().unwrap().1 > 1 {
        let (w, h) = *dims.last().unwrap();
        dims.push((w.div_ceil(2), h.div_ceil(2)));
    }
    dims.reverse(); // root first
    dims
}

#[derive(Debug, Clone)]
pub struct TagTree {
    width: usize,
    height: usize,
    /// Per level, root first; nodes row-major within a level.
    levels: Vec<Vec<Node>>,
    dims: Vec<(usize, usize)>,
}

impl TagTree {
    pub fn new(width: usize, height: usize) -> Self {
        let dims = level_dims(width, height);
        let levels = dims.iter().map(|&(w, h)| vec![Node::default(); w * h]).collect();
        Self {
            width: width.max(1),
            height: height.max(1),
            levels,
            dims,
        }
    }

    /// Reset coding state (and values) for a fresh precinct.
    pub fn reset(&mut self) {
        for level in &mut self.levels {
            for node in level.iter_mut() {
                *node = Node::default();
            }
        }
    }

    /// Set the leaf value at (x, y). Internal minima are rebuilt by
    /// `finalize` before encoding.
    pub fn set_value(&mut self, x: usize, y: usize, value: u32) {
        let leaf = self.levels.len() - 1;
        let w = self.dims[leaf].0;
        self.levels[leaf][y * w + x].value = value;
    }

    /// Recompute internal nodes as the minimum of their children. Must be
    /// called after the last `set_value` and before the first `encode`.
    pub fn finalize(&mut self) {
        for depth in (0..self.levels.len() - 1).rev() {
            let (cw, ch) = self.dims[depth + 1];
            let (pw, ph) = self.dims[depth];
            for py in 0..ph {
                for px in 0..pw {
                    let mut min = u32::MAX;
                    for cy in (py * 2)..((py * 2 + 2).min(ch)) {
                        for cx in (px * 2)..((px * 2 + 2).min(cw)) {
                            min = min.min(self.levels[depth + 1][cy * cw + cx].value);
                        }
                    }
                    self.levels[depth][py * pw + px].value = min;
                }
            }
        }
    }

    fn check_leaf(&self, x: usize, y: usize) -> Result<()> {
        if x >= self.width || y >= self.height {
            return Err(CodecError::decoding(format!(
                "tag tree leaf ({x}, {y}) outside {}x{} grid",
                self.width, self.height
            )));
        }
        Ok(())
    }

    /// Emit the bits needed to decide whether the leaf value is below
    /// `threshold`; bits already implied by earlier calls are skipped.
    pub fn encode(
        &mut self,
        writer: &mut BitWriter,
        x: usize,
        y: usize,
        threshold: u32,
    ) -> Result<()> {
        self.check_leaf(x, y)?;
        let depth_max = self.levels.len() - 1;
        let mut low = 0u32;
        for depth in 0..=depth_max {
            let shift = depth_max - depth;
            let w = self.dims[depth].0;
            let idx = (y >> shift) * w + (x >> shift);
            let node = &mut self.levels[depth][idx];
            if node.low < low {
                node.low = low;
            } else {
                low = node.low;
            }
            while !node.known && node.low < threshold {
                if node.low < node.value {
                    writer.write_bit(0);
                    node.low += 1;
                } else {
                    writer.write_bit(1);
                    node.known = true;
                }
            }
            low = node.low;
            if !node.known {
                break; // value >= threshold; nothing further can be revealed
            }
        }
        Ok(())
    }

    /// Read bits until the leaf value is either determined (returned as
    /// `Some(value)`) or proven to be at least `threshold` (`None`).
    pub fn decode(
        &mut self,
        reader: &mut BitReader,
        x: usize,
        y: usize,
        threshold: u32,
    ) -> Result<Option<u32>> {
        self.check_leaf(x, y)?;
        let depth_max = self.levels.len() - 1;
        let mut low = 0u32;
        for depth in 0..=depth_max {
            let shift = depth_max - depth;
            let w = self.dims[depth].0;
            let idx = (y >> shift) * w + (x >> shift);
            let node = &mut self.levels[depth][idx];
            if node.low < low {
                node.low = low;
            } else {
                low = node.low;
            }
            while !node.known && node.low < threshold {
                if reader.read_bit()? == 1 {
                    node.known = true;
                    node.value = node.low;
                } else {
                    node.low += 1;
                }
            }
            low = node.low;
            if !node.known {
                return Ok(None);
            }
        }
        Ok(Some(low))
    }
}
