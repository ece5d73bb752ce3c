//! Trellis-coded quantization (ISO/IEC 15444-2).
//!
//! A Viterbi search over an S-state shift-register trellis. Each state
//! selects a half-step level offset for the union quantizer; the branch bit
//! is the parity of the chosen index, so a decoder can replay the state
//! sequence from the indices alone. The trellis is a dense [stage][state]
//! array with back-pointers materialised as it grows.

use crate::error::{CodecError, Result};

#[derive(Debug, Clone)]
pub struct TrellisQuantizer {
    /// Trellis size; one of 2, 4, 6, 8.
    pub num_states: usize,
    /// Rate weight of the transition cost.
    pub lambda: f64,
    /// States whose path cost exceeds best * threshold are pruned; >= 1.
    pub prune_threshold: f64,
}

#[derive(Debug, Clone)]
pub struct TcqResult {
    pub indices: Vec<i32>,
    pub distortion: f64,
    pub rate_bits: f64,
}

/// Level offset carried by a state: even states quantize on the lattice,
/// odd states half a step off.
#[inline]
fn state_offset(state: usize) -> f64 {
    (state & 1) as f64 * 0.5
}

/// Per-symbol rate estimate: sign + 1 + log2|q| bits, one bit for zero.
#[inline]
fn rate_bits(q: i32) -> f64 {
    let mag = q.unsigned_abs();
    if mag == 0 {
        1.0
    } else {
        2.0 + (mag as f64).log2()
    }
}

#[derive(Clone, Copy, Default)]
struct TrellisNode {
    cost: f64,
    back_state: usize,
    index: i32,
}

impl TrellisQuantizer {
    pub fn new(num_states: usize, lambda: f64, prune_threshold: f64) -> Result<Self> {
        if !matches!(num_states, 2 | 4 | 6 | 8) {
            return Err(CodecError::invalid_parameter(format!(
                "trellis size {num_states} not in {{2, 4, 6, 8}}"
            )));
        }
        if prune_threshold < 1.0 {
            return Err(CodecError::invalid_parameter(format!(
                "prune threshold {prune_threshold} below 1"
            )));
        }
        if lambda < 0.0 {
            return Err(CodecError::invalid_parameter(format!(
                "negative rate weight {lambda}"
            )));
        }
        Ok(Self {
            num_states,
            lambda,
            prune_threshold,
        })
    }

    /// Reconstruction of index `q` under the offset of `state`.
    #[inline]
    fn recon(&self, q: i32, state: usize, step: f64) -> f64 {
        if q == 0 {
            return 0.0;
        }
        let sign = if q < 0 { -1.0 } else { 1.0 };
        sign * (q.unsigned_abs() as f64 + state_offset(state)) * step
    }

    /// Cheapest index with magnitude parity `parity` for coefficient `c`.
    fn best_index(&self, c: f64, state: usize, step: f64, parity: u32) -> (i32, f64) {
        let sign = if c < 0.0 { -1 } else { 1 };
        let ideal = (c.abs() / step - state_offset(state)).max(0.0);
        let base = ideal.round() as i64;

        let mut best: Option<(i32, f64)> = None;
        for cand in [base - 2, base - 1, base, base + 1, base + 2] {
            if cand < 0 || cand as u32 & 1 != parity {
                continue;
            }
            let q = sign * cand as i32;
            let err = c - self.recon(q, state, step);
            let cost = err * err + self.lambda * rate_bits(q);
            if best.map_or(true, |(_, c0)| cost < c0) {
                best = Some((q, cost));
            }
        }
        // Parity 1 always has a candidate >= 1; parity 0 has 0 itself.
        best.unwrap_or((0, c * c + self.lambda * rate_bits(0)))
    }

    /// Quantize a coefficient sequence; returns the optimal index sequence
    /// with its distortion and estimated rate.
    pub fn quantize(&self, coeffs: &[f64], step: f64) -> Result<TcqResult> {
        if coeffs.is_empty() {
            return Err(CodecError::invalid_parameter(
                "trellis quantizer input is empty".to_string(),
            ));
        }
        if step <= 0.0 {
            return Err(CodecError::invalid_parameter(format!(
                "trellis step size {step} must be positive"
            )));
        }

        let s = self.num_states;
        let n = coeffs.len();
        let mut trellis: Vec<Vec<TrellisNode>> = Vec::with_capacity(n + 1);

        let mut current = vec![
            TrellisNode {
                cost: f64::INFINITY,
                ..Default::default()
            };
            s
        ];
        current[0].cost = 0.0; // start state fixed at 0
        trellis.push(current.clone());

        for &c in coeffs {
            let mut next = vec![
                TrellisNode {
                    cost: f64::INFINITY,
                    ..Default::default()
                };
                s
            ];
            for (state, node) in current.iter().enumerate() {
                if !node.cost.is_finite() {
                    continue;
                }
                for branch in 0..2u32 {
                    let (q, branch_cost) = self.best_index(c, state, step, branch);
                    let target = ((state << 1) | branch as usize) % s;
                    let cost = node.cost + branch_cost;
                    if cost < next[target].cost {
                        next[target] = TrellisNode {
                            cost,
                            back_state: state,
                            index: q,
                        };
                    }
                }
            }
            // Prune states that fell too far behind the best path.
            let best = next.iter().map(|n| n.cost).fold(f64::INFINITY, f64::min);
            if best.is_finite() && self.prune_threshold.is_finite() {
                for node in next.iter_mut() {
                    if node.cost > best * self.prune_threshold {
                        node.cost = f64::INFINITY;
                    }
                }
            }
            trellis.push(next.clone());
            current = next;
        }

        // Viterbi traceback from the cheapest final state.
        let (mut state, _) = current
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.cost.total_cmp(&b.1.cost))
            .expect("trellis has at least one state");
        let mut indices = vec![0i32; n];
        for stage in (1..=n).rev() {
            let node = trellis[stage][state];
            indices[stage - 1] = node.index;
            state = node.back_state;
        }

        // Replay for the reported distortion and rate.
        let mut replay_state = 0usize;
        let mut distortion = 0.0;
        let mut rate = 0.0;
        for (&c, &q) in coeffs.iter().zip(indices.iter()) {
            let err = c - self.recon(q, replay_state, step);
            distortion += err * err;
            rate += rate_bits(q);
            replay_state = ((replay_state << 1) | (q.unsigned_abs() as usize & 1)) % s;
        }

        Ok(TcqResult {
            indices,
            distortion,
            rate_bits: rate,
        })
    }

    /// Reconstruct coefficients by replaying the state sequence implied by
    /// the index parities.
    pub fn dequantize(&self, indices: &[i32], step: f64) -> Result<Vec<f64>> {
        if step <= 0.0 {
            return Err(CodecError::invalid_parameter(format!(
                "trellis step size {step} must be positive"
            )));
        }
        let s = self.num_states;
        let mut state = 0usize;
        let mut out = Vec::with_capacity(indices.len());
        for &q in indices {
            out.push(self.recon(q, state, step));
            state = ((state << 1) | (q.unsigned_abs() as usize & 1)) % s;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameter_validation() {
        assert!(TrellisQuantizer::new(3, 0.1, 1.0).is_err());
        assert!(TrellisQuantizer::new(4, 0.1, 0.5).is_err());
        assert!(TrellisQuantizer::new(4, -0.1, 1.5).is_err());
        assert!(TrellisQuantizer::new(8, 0.0, 1.0).is_ok());
        let tq = TrellisQuantizer::new(4, 0.1, 2.0).unwrap();
        assert!(tq.quantize(&[], 1.0).is_err());
        assert!(tq.quantize(&[1.0], 0.0).is_err());
    }

    #[test]
    fn reconstruction_replays_encoder_states() {
        let tq = TrellisQuantizer::new(4, 0.05, 4.0).unwrap();
        let coeffs: Vec<f64> = (0..64).map(|i| ((i * 31 % 17) as f64 - 8.0) * 1.3).collect();
        let result = tq.quantize(&coeffs, 0.5).unwrap();
        let recon = tq.dequantize(&result.indices, 0.5).unwrap();
        let mut replay_distortion = 0.0;
        for (c, r) in coeffs.iter().zip(recon.iter()) {
            replay_distortion += (c - r).powi(2);
        }
        assert!((replay_distortion - result.distortion).abs() < 1e-6);
    }

    #[test]
    fn zero_lambda_tracks_coefficients_closely() {
        let tq = TrellisQuantizer::new(8, 0.0, f64::INFINITY).unwrap();
        let coeffs = vec![3.3f64, -1.8, 0.2, 7.9, -4.4, 2.1];
        let step = 0.25;
        let result = tq.quantize(&coeffs, step).unwrap();
        let recon = tq.dequantize(&result.indices, step).unwrap();
        for (c, r) in coeffs.iter().zip(recon.iter()) {
            assert!((c - r).abs() <= step, "{c} vs {r}");
        }
    }

    #[test]
    fn higher_lambda_spends_fewer_bits() {
        let coeffs: Vec<f64> = (0..128).map(|i| ((i * 97 % 41) as f64 - 20.0) * 0.7).collect();
        let cheap = TrellisQuantizer::new(4, 0.01, 8.0)
            .unwrap()
            .quantize(&coeffs, 0.4)
            .unwrap();
        let pricey = TrellisQuantizer::new(4, 5.0, 8.0)
            .unwrap()
            .quantize(&coeffs, 0.4)
            .unwrap();
        assert!(pricey.rate_bits <= cheap.rate_bits);
        assert!(pricey.distortion >= cheap.distortion);
    }

    #[test]
    fn pruning_keeps_the_search_consistent() {
        let coeffs: Vec<f64> = (0..48).map(|i| (i as f64 * 0.37).sin() * 6.0).collect();
        let wide = TrellisQuantizer::new(8, 0.1, f64::INFINITY)
            .unwrap()
            .quantize(&coeffs, 0.3)
            .unwrap();
        let pruned = TrellisQuantizer::new(8, 0.1, 1.5)
            .unwrap()
            .quantize(&coeffs, 0.3)
            .unwrap();
        // Pruning may only lose optimality, never validity.
        let cost =
            |r: &TcqResult| r.distortion + 0.1 * r.rate_bits;
        assert!(cost(&pruned) >= cost(&wide) - 1e-9);
        assert_eq!(pruned.indices.len(), coeffs.len());
    }
}
