//! MQ arithmetic coder (ISO/IEC 15444-1 Annex C).
//!
//! Binary adaptive arithmetic coding over a fixed 47-state probability
//! table. The encoder's byte emission resolves carries into the previously
//! emitted byte and bit-stuffs after 0xFF so the output can never contain a
//! marker; the decoder stalls on a marker prefix and synthesises 0xFF bytes
//! past the end of data.

/// One row of Table C.2: (Qe, NMPS, NLPS, switch-MPS).
#[derive(Clone, Copy)]
struct StateRow {
    qe: u16,
    nmps: u8,
    nlps: u8,
    switch: bool,
}

const fn row(qe: u16, nmps: u8, nlps: u8, switch: u8) -> StateRow {
    StateRow {
        qe,
        nmps,
        nlps,
        switch: switch != 0,
    }
}

/// Table C.2. Process-wide, immutable, shared by encoder and decoder.
const MQ_TABLE: [StateRow; 47] = [
    row(0x5601, 1, 1, 1),
    row(0x3401, 2, 6, 0),
    row(0x1801, 3, 9, 0),
    row(0x0AC1, 4, 12, 0),
    row(0x0521, 5, 29, 0),
    row(0x0221, 38, 33, 0),
    row(0x5601, 7, 6, 1),
    row(0x5401, 8, 14, 0),
    row(0x4801, 9, 14, 0),
    row(0x3801, 10, 14, 0),
    row(0x3001, 11, 17, 0),
    row(0x2401, 12, 18, 0),
    row(0x1C01, 13, 20, 0),
    row(0x1601, 29, 21, 0),
    row(0x5601, 15, 14, 1),
    row(0x5401, 16, 14, 0),
    row(0x5101, 17, 15, 0),
    row(0x4801, 18, 16, 0),
    row(0x3801, 19, 17, 0),
    row(0x3401, 20, 18, 0),
    row(0x3001, 21, 19, 0),
    row(0x2801, 22, 19, 0),
    row(0x2401, 23, 19, 0),
    row(0x2201, 24, 19, 0),
    row(0x1C01, 25, 20, 0),
    row(0x1801, 26, 21, 0),
    row(0x1601, 27, 22, 0),
    row(0x1401, 28, 23, 0),
    row(0x1201, 29, 24, 0),
    row(0x1101, 30, 25, 0),
    row(0x0AC1, 31, 26, 0),
    row(0x09C1, 32, 27, 0),
    row(0x08A1, 33, 28, 0),
    row(0x0521, 34, 29, 0),
    row(0x0441, 35, 30, 0),
    row(0x02A1, 36, 31, 0),
    row(0x0221, 37, 32, 0),
    row(0x0141, 38, 33, 0),
    row(0x0111, 39, 34, 0),
    row(0x0085, 40, 35, 0),
    row(0x0049, 41, 36, 0),
    row(0x0025, 42, 37, 0),
    row(0x0015, 43, 38, 0),
    row(0x0009, 44, 39, 0),
    row(0x0005, 45, 40, 0),
    row(0x0001, 45, 41, 0),
    row(0x5601, 46, 46, 0),
];

/// A mutable (state index, MPS symbol) pair, one per context label.
#[derive(Debug, Clone, Copy, Default)]
pub struct MqContext {
    pub index: u8,
    pub mps: u8,
}

/// Termination discipline for `MqEncoder::finish`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Termination {
    /// Standard two-byte flush (C.2.9).
    #[default]
    Default,
    /// ERTERM: a predictable sequence that allows per-pass truncation.
    Predictable,
    /// Reserved for a shorter flush; currently identical to `Default`.
    NearOptimal,
}

pub struct MqEncoder {
    a: u32,
    c: u32,
    ct: u8,
    /// Output with a leading sentinel byte that absorbs the (impossible on
    /// the first emission) carry and primes the 0xFF check.
    out: Vec<u8>,
    contexts: Vec<MqContext>,
}

impl MqEncoder {
    pub fn new(num_contexts: usize) -> Self {
        Self {
            a: 0x8000,
            c: 0,
            ct: 12,
            out: vec![0],
            contexts: vec![MqContext::default(); num_contexts],
        }
    }

    pub fn set_context(&mut self, cx: usize, index: u8, mps: u8) {
        self.contexts[cx] = MqContext { index, mps: mps & 1 };
    }

    pub fn reset_contexts(&mut self) {
        for ctx in &mut self.contexts {
            *ctx = MqContext::default();
        }
    }

    /// Bytes emitted so far (without termination); used by callers that
    /// record per-pass truncation lengths.
    pub fn num_bytes(&self) -> usize {
        self.out.len() - 1
    }

    /// Encode one decision in the given context (C.2.5 / C.2.6).
    pub fn encode(&mut self, d: u8, cx: usize) {
        let ctx = self.contexts[cx];
        let st = MQ_TABLE[ctx.index as usize];
        let qe = st.qe as u32;

        self.a -= qe;
        if d == ctx.mps {
            if self.a & 0x8000 != 0 {
                self.c += qe;
                return;
            }
            // Conditional exchange: code the MPS in the smaller interval.
            if self.a < qe {
                self.a = qe;
            } else {
                self.c += qe;
            }
            self.contexts[cx].index = st.nmps;
            self.renorm();
        } else {
            if self.a < qe {
                self.c += qe;
            } else {
                self.a = qe;
            }
            if st.switch {
                self.contexts[cx].mps = 1 - ctx.mps;
            }
            self.contexts[cx].index = st.nlps;
            self.renorm();
        }
    }

    fn renorm(&mut self) {
        loop {
            self.a <<= 1;
            self.c <<= 1;
            self.ct -= 1;
            if self.ct == 0 {
                self.byte_out();
            }
            if self.a & 0x8000 != 0 {
                break;
            }
        }
    }

    /// C.2.4: emit one byte, resolving a pending carry into the previous
    /// byte and limiting the byte after 0xFF to seven bits.
    fn byte_out(&mut self) {
        if *self.out.last().unwrap() == 0xFF {
            self.out.push((self.c >> 20) as u8);
            self.c &= 0xF_FFFF;
            self.ct = 7;
        } else if self.c & 0x800_0000 == 0 {
            self.out.push((self.c >> 19) as u8);
            self.c &= 0x7_FFFF;
            self.ct = 8;
        } else {
            // Carry ripples into the byte already emitted.
            *self.out.last_mut().unwrap() += 1;
            if *self.out.last().unwrap() == 0xFF {
                self.c &= 0x7FF_FFFF;
                self.out.push((self.c >> 20) as u8);
                self.c &= 0xF_FFFF;
                self.ct = 7;
            } else {
                self.out.push((self.c >> 19) as u8);
                self.c &= 0x7_FFFF;
                self.ct = 8;
            }
        }
    }

    /// C.2.8: set as many of the C bits to 1 as the interval allows before
    /// flushing.
    fn set_bits(&mut self) {
        let temp = self.c + self.a;
        self.c |= 0xFFFF;
        if self.c >= temp {
            self.c -= 0x8000;
        }
    }

    /// Terminate the current codeword in place (predictable mode) and
    /// restart the registers for the next pass. Context states carry over;
    /// the caller records the byte boundary via `num_bytes`.
    pub fn terminate_pass(&mut self) {
        let mut k = 11 - self.ct as i32 + 1;
        while k > 0 {
            self.c <<= self.ct;
            self.ct = 0;
            self.byte_out();
            k -= self.ct as i32;
        }
        if *self.out.last().unwrap() != 0xFF {
            self.byte_out();
        }
        if *self.out.last().unwrap() == 0xFF {
            self.out.push(0x7F);
        }
        self.a = 0x8000;
        self.c = 0;
        self.ct = 12;
    }

    /// Terminate the codeword and return the byte stream.
    pub fn finish(mut self, mode: Termination) -> Vec<u8> {
        match mode {
            Termination::Default | Termination::NearOptimal => {
                self.set_bits();
                self.c <<= self.ct;
                self.byte_out();
                self.c <<= self.ct;
                self.byte_out();
                // A trailing 0xFF carries no information for the decoder.
                if *self.out.last().unwrap() == 0xFF {
                    self.out.pop();
                }
            }
            Termination::Predictable => {
                // ERTERM: pad so a decoder can detect pass truncation.
                let mut k = 11 - self.ct as i32 + 1;
                while k > 0 {
                    self.c <<= self.ct;
                    self.ct = 0;
                    self.byte_out();
                    k -= self.ct as i32;
                }
                if *self.out.last().unwrap() != 0xFF {
                    self.byte_out();
                }
                if *self.out.last().unwrap() == 0xFF {
                    self.out.push(0x7F);
                }
            }
        }
        self.out.remove(0); // sentinel
        self.out
    }

    /// Return the byte stream after the caller already terminated the final
    /// pass with `terminate_pass`.
    pub fn into_bytes(mut self) -> Vec<u8> {
        self.out.remove(0);
        self.out
    }
}

pub struct MqDecoder<'a> {
    a: u32,
    c: u32,
    ct: u8,
    data: &'a [u8],
    /// Cursor of the byte currently loaded into C.
    pos: usize,
    contexts: Vec<MqContext>,
}

impl<'a> MqDecoder<'a> {
    /// C.3.1 initialisation: prime C from the first byte, then consume
    /// seven bits.
    pub fn new(data: &'a [u8], num_contexts: usize) -> Self {
        let mut dec = Self {
            a: 0,
            c: 0,
            ct: 0,
            data,
            pos: 0,
            contexts: vec![MqContext::default(); num_contexts],
        };
        dec.c = (*dec.data.first().unwrap_or(&0xFF) as u32) << 16;
        dec.byte_in();
        dec.c <<= 7;
        dec.ct = dec.ct.saturating_sub(7);
        dec.a = 0x8000;
        dec
    }

    /// Start a fresh codeword segment carrying over context states from a
    /// previous segment (per-pass termination).
    pub fn new_with_contexts(data: &'a [u8], contexts: Vec<MqContext>) -> Self {
        let mut dec = Self::new(data, 0);
        dec.contexts = contexts;
        dec
    }

    pub fn into_contexts(self) -> Vec<MqContext> {
        self.contexts
    }

    pub fn set_context(&mut self, cx: usize, index: u8, mps: u8) {
        self.contexts[cx] = MqContext { index, mps: mps & 1 };
    }

    pub fn reset_contexts(&mut self) {
        for ctx in &mut self.contexts {
            *ctx = MqContext::default();
        }
    }

    /// C.3.4: load the next byte into C. A marker prefix (0xFF followed by a
    /// byte above 0x8F) or the end of data is never consumed; 1-bits are
    /// fed instead.
    fn byte_in(&mut self) {
        if self.pos >= self.data.len() {
            self.c += 0xFF00;
            self.ct = 8;
            return;
        }
        let current = self.data[self.pos];
        if current == 0xFF {
            let next = self.data.get(self.pos + 1).copied().unwrap_or(0xFF);
            if next > 0x8F {
                self.c += 0xFF00;
                self.ct = 8;
            } else {
                // Stuffed byte: only seven bits are payload.
                self.pos += 1;
                self.c += (self.data[self.pos] as u32) << 9;
                self.ct = 7;
            }
        } else {
            self.pos += 1;
            if self.pos < self.data.len() {
                self.c += (self.data[self.pos] as u32) << 8;
                self.ct = 8;
            } else {
                self.c += 0xFF00;
                self.ct = 8;
            }
        }
    }

    /// Decode one decision in the given context (C.3.2).
    pub fn decode(&mut self, cx: usize) -> u8 {
        let ctx = self.contexts[cx];
        let st = MQ_TABLE[ctx.index as usize];
        let qe = st.qe as u32;

        self.a -= qe;
        let d;
        if (self.c >> 16) < qe {
            // LPS sub-interval, with conditional exchange.
            if self.a < qe {
                d = ctx.mps;
                self.contexts[cx].index = st.nmps;
            } else {
                d = 1 - ctx.mps;
                if st.switch {
                    self.contexts[cx].mps = 1 - ctx.mps;
                }
                self.contexts[cx].index = st.nlps;
            }
            self.a = qe;
            self.renorm();
        } else {
            self.c -= qe << 16;
            if self.a & 0x8000 == 0 {
                if self.a < qe {
                    d = 1 - ctx.mps;
                    if st.switch {
                        self.contexts[cx].mps = 1 - ctx.mps;
                    }
                    self.contexts[cx].index = st.nlps;
                } else {
                    d = ctx.mps;
                    self.contexts[cx].index = st.nmps;
                }
                self.renorm();
            } else {
                d = ctx.mps;
            }
        }
        d
    }

    fn renorm(&mut self) {
        loop {
            if self.ct == 0 {
                self.byte_in();
            }
            self.a <<= 1;
            self.c <<= 1;
            self.ct -= 1;
            if self.a & 0x8000 != 0 {
                break;
            }
        }
    }
}

/// Raw-bit writer for equi-probable data (bypass coding). Bit-stuffs after
/// 0xFF like the arithmetic path so markers cannot appear.
#[derive(Default)]
pub struct BypassEncoder {
    out: Vec<u8>,
    acc: u32,
    ct: u8,
}

impl BypassEncoder {
    pub fn new() -> Self {
        Self {
            out: Vec::new(),
            acc: 0,
            ct: 8,
        }
    }

    pub fn encode(&mut self, d: u8) {
        self.ct -= 1;
        self.acc |= ((d & 1) as u32) << self.ct;
        if self.ct == 0 {
            let byte = self.acc as u8;
            self.out.push(byte);
            self.acc = 0;
            self.ct = if byte == 0xFF { 7 } else { 8 };
        }
    }

    pub fn finish(mut self) -> Vec<u8> {
        let limit = if self.out.last() == Some(&0xFF) { 7 } else { 8 };
        if self.ct < limit {
            self.out.push(self.acc as u8);
        }
        if self.out.last() == Some(&0xFF) {
            self.out.push(0x7F);
        }
        self.out
    }
}

/// Raw-bit reader matching `BypassEncoder`.
pub struct BypassDecoder<'a> {
    data: &'a [u8],
    pos: usize,
    acc: u32,
    ct: u8,
    prev: u8,
}

impl<'a> BypassDecoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            acc: 0,
            ct: 0,
            prev: 0,
        }
    }

    pub fn decode(&mut self) -> u8 {
        if self.ct == 0 {
            let byte = self.data.get(self.pos).copied().unwrap_or(0xFF);
            self.pos += 1;
            self.ct = if self.prev == 0xFF { 7 } else { 8 };
            self.prev = byte;
            self.acc = byte as u32;
        }
        self.ct -= 1;
        ((self.acc >> self.ct) & 1) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(symbols: &[(u8, usize)], num_ctx: usize) {
        let mut enc = MqEncoder::new(num_ctx);
        for &(d, cx) in symbols {
            enc.encode(d, cx);
        }
        let bytes = enc.finish(Termination::Default);
        assert!(
            !bytes.windows(2).any(|p| p[0] == 0xFF && p[1] > 0x8F),
            "marker pair leaked into MQ output"
        );

        let mut dec = MqDecoder::new(&bytes, num_ctx);
        for (i, &(d, cx)) in symbols.iter().enumerate() {
            assert_eq!(dec.decode(cx), d, "symbol {i}");
        }
    }

    #[test]
    fn thousand_zeros_then_one() {
        let mut symbols: Vec<(u8, usize)> = vec![(0, 0); 1000];
        symbols.push((1, 0));
        round_trip(&symbols, 1);
    }

    #[test]
    fn alternating_symbols_single_context() {
        let symbols: Vec<(u8, usize)> = (0..256).map(|i| ((i & 1) as u8, 0)).collect();
        round_trip(&symbols, 1);
    }

    #[test]
    fn pseudo_random_multi_context() {
        // LCG-driven symbol/context stream; long enough to exercise the
        // carry path and 0xFF stuffing in byte_out.
        let mut state = 0x1234_5678u32;
        let mut symbols = Vec::new();
        for _ in 0..5000 {
            state = state.wrapping_mul(1664525).wrapping_add(1013904223);
            let d = ((state >> 16) & 1) as u8;
            let cx = ((state >> 20) % 19) as usize;
            symbols.push((d, cx));
        }
        round_trip(&symbols, 19);
    }

    #[test]
    fn carry_worst_case_round_trip() {
        // Long LPS bursts drive C toward overflow so byte emission must
        // resolve carries and stuff after 0xFF.
        let mut symbols = Vec::new();
        for i in 0..2000 {
            symbols.push((if i % 37 == 0 { 0 } else { 1 }, 0));
        }
        round_trip(&symbols, 1);
    }

    #[test]
    fn run_and_uniform_contexts_with_initial_states() {
        let ops: Vec<(u8, usize)> = vec![(0, 17), (0, 17), (1, 17), (0, 17), (1, 18), (0, 18)];
        let mut enc = MqEncoder::new(19);
        enc.set_context(17, 3, 0);
        enc.set_context(18, 46, 0);
        for &(d, cx) in &ops {
            enc.encode(d, cx);
        }
        let bytes = enc.finish(Termination::Default);

        let mut dec = MqDecoder::new(&bytes, 19);
        dec.set_context(17, 3, 0);
        dec.set_context(18, 46, 0);
        for &(d, cx) in &ops {
            assert_eq!(dec.decode(cx), d);
        }
    }

    #[test]
    fn predictable_termination_round_trip() {
        let symbols: Vec<(u8, usize)> = (0..100).map(|i| ((i % 3 == 0) as u8, 0)).collect();
        let mut enc = MqEncoder::new(1);
        for &(d, cx) in &symbols {
            enc.encode(d, cx);
        }
        let bytes = enc.finish(Termination::Predictable);
        let mut dec = MqDecoder::new(&bytes, 1);
        for &(d, cx) in &symbols {
            assert_eq!(dec.decode(cx), d);
        }
    }

    #[test]
    fn near_optimal_matches_default() {
        let encode_with = |mode| {
            let mut enc = MqEncoder::new(2);
            for i in 0..64 {
                enc.encode((i & 1) as u8, (i % 2) as usize);
            }
            enc.finish(mode)
        };
        assert_eq!(
            encode_with(Termination::Default),
            encode_with(Termination::NearOptimal)
        );
    }

    #[test]
    fn decoder_survives_truncated_data() {
        // Premature end of data behaves as if the remaining bytes were
        // 0xFF; the decoder must not panic.
        let mut enc = MqEncoder::new(1);
        for _ in 0..500 {
            enc.encode(1, 0);
        }
        let bytes = enc.finish(Termination::Default);
        let cut = &bytes[..bytes.len() / 2];
        let mut dec = MqDecoder::new(cut, 1);
        for _ in 0..500 {
            dec.decode(0);
        }
    }

    #[test]
    fn per_pass_termination_yields_independent_segments() {
        let seg_a: Vec<(u8, usize)> = (0..80).map(|i| ((i % 5 == 0) as u8, 0)).collect();
        let seg_b: Vec<(u8, usize)> = (0..80).map(|i| ((i % 3 == 0) as u8, 1)).collect();

        let mut enc = MqEncoder::new(2);
        for &(d, cx) in &seg_a {
            enc.encode(d, cx);
        }
        enc.terminate_pass();
        let split = enc.num_bytes();
        for &(d, cx) in &seg_b {
            enc.encode(d, cx);
        }
        enc.terminate_pass();
        let bytes = enc.into_bytes();

        let mut dec = MqDecoder::new(&bytes[..split], 2);
        for &(d, cx) in &seg_a {
            assert_eq!(dec.decode(cx), d);
        }
        let contexts = dec.into_contexts();
        let mut dec = MqDecoder::new_with_contexts(&bytes[split..], contexts);
        for &(d, cx) in &seg_b {
            assert_eq!(dec.decode(cx), d);
        }
    }

    #[test]
    fn bypass_round_trip() {
        let bits: Vec<u8> = (0..777).map(|i: u32| (i.count_ones() & 1) as u8).collect();
        let mut enc = BypassEncoder::new();
        for &b in &bits {
            enc.encode(b);
        }
        let bytes = enc.finish();
        assert!(!bytes.windows(2).any(|p| p[0] == 0xFF && p[1] > 0x8F));
        let mut dec = BypassDecoder::new(&bytes);
        for &b in &bits {
            assert_eq!(dec.decode(), b);
        }
    }
}
