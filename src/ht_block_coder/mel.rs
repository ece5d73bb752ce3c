//! MEL adaptive run-length coding (ISO/IEC 15444-15).
//!
//! Runs of insignificant events are coded against an adaptive threshold
//! 2^E[k]: a 0 bit stands for a complete run (k adapts up), a 1 bit ends a
//! run early and is followed by E[k] raw bits of the run remainder (k
//! adapts down).

use crate::bit_io::{BitReader, BitWriter};

/// Exponent table indexed by the MEL state k.
const MEL_E: [u8; 13] = [0, 0, 0, 1, 1, 1, 2, 2, 2, 3, 3, 4, 5];

pub struct MelEncoder {
    writer: BitWriter,
    k: usize,
    run: u32,
}

impl Default for MelEncoder {
    fn default() -> Self {
        Self {
            writer: BitWriter::new(),
            k: 0,
            run: 0,
        }
    }
}

impl MelEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one significance event.
    pub fn encode(&mut self, significant: bool) {
        if !significant {
            self.run += 1;
            if self.run == 1 << MEL_E[self.k] {
                self.writer.write_bit(0);
                self.run = 0;
                self.k = (self.k + 1).min(MEL_E.len() - 1);
            }
        } else {
            self.writer.write_bit(1);
            self.writer.write_bits(self.run, MEL_E[self.k]);
            self.run = 0;
            self.k = self.k.saturating_sub(1);
        }
    }

    /// Flush a partial run and return the byte stream.
    pub fn finish(mut self) -> Vec<u8> {
        if self.run > 0 {
            // Declare the partial run complete; the decoder never consumes
            // past the events the cleanup scan demands.
            self.writer.write_bit(0);
        }
        self.writer.finish()
    }
}

pub struct MelDecoder<'a> {
    reader: BitReader<'a>,
    k: usize,
    pending_zeros: u32,
    pending_one: bool,
}

impl<'a> MelDecoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            reader: BitReader::new(data),
            k: 0,
            pending_zeros: 0,
            pending_one: false,
        }
    }

    /// Decode one significance event. Exhausted data decodes as an
    /// unbounded insignificant run.
    pub fn decode(&mut self) -> bool {
        if self.pending_zeros > 0 {
            self.pending_zeros -= 1;
            return false;
        }
        if self.pending_one {
            self.pending_one = false;
            return true;
        }
        let Ok(bit) = self.reader.read_bit() else {
            return false;
        };
        if bit == 0 {
            self.pending_zeros = (1 << MEL_E[self.k]) - 1;
            self.k = (self.k + 1).min(MEL_E.len() - 1);
            false
        } else {
            let e = MEL_E[self.k];
            let remainder = self.reader.read_bits(e).unwrap_or(0);
            self.k = self.k.saturating_sub(1);
            if remainder == 0 {
                true
            } else {
                self.pending_zeros = remainder - 1;
                self.pending_one = true;
                false
            }
        }
    }
}
