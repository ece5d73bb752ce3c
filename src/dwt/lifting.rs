//! Dedicated lifting implementations for the well-known kernels.
//!
//! Signals are lifted in interleaved form (even = lowpass lattice, odd =
//! highpass lattice) and de-interleaved on output. At the right edge of the
//! predict step the even lattice is extended by linear extrapolation, which
//! keeps the detail of a constant-gradient signal identically zero; the
//! update step mirrors across the edge.

/// 9/7 lifting constants (Table F.4).
const ALPHA: f64 = -1.586_134_342;
const BETA: f64 = -0.052_980_118;
const GAMMA: f64 = 0.882_911_075;
const DELTA: f64 = 0.443_506_852;
const K: f64 = 1.230_174_105;

/// Right-edge extension of the even lattice seen from odd index `i`:
/// linear extrapolation when two even samples precede, else the mirror.
#[inline]
fn predict_right_i32(x: &[i32], i: usize) -> i32 {
    if i + 1 < x.len() {
        x[i + 1]
    } else if i >= 3 {
        2 * x[i - 1] - x[i - 3]
    } else {
        x[i - 1]
    }
}

#[inline]
fn predict_right_f64(x: &[f64], i: usize) -> f64 {
    if i + 1 < x.len() {
        x[i + 1]
    } else if i >= 3 {
        2.0 * x[i - 1] - x[i - 3]
    } else {
        x[i - 1]
    }
}

#[inline]
fn update_edges_i32(x: &[i32], i: usize) -> (i32, i32) {
    let left = if i > 0 { x[i - 1] } else { x[i + 1] };
    let right = if i + 1 < x.len() { x[i + 1] } else { x[i - 1] };
    (left, right)
}

#[inline]
fn update_edges_f64(x: &[f64], i: usize) -> (f64, f64) {
    let left = if i > 0 { x[i - 1] } else { x[i + 1] };
    let right = if i + 1 < x.len() { x[i + 1] } else { x[i - 1] };
    (left, right)
}

fn deinterleave_i32(x: &[i32]) -> (Vec<i32>, Vec<i32>) {
    let low = x.iter().step_by(2).copied().collect();
    let high = x.iter().skip(1).step_by(2).copied().collect();
    (low, high)
}

fn interleave_i32(low: &[i32], high: &[i32]) -> Vec<i32> {
    let mut x = vec![0i32; low.len() + high.len()];
    for (i, &v) in low.iter().enumerate() {
        x[2 * i] = v;
    }
    for (i, &v) in high.iter().enumerate() {
        x[2 * i + 1] = v;
    }
    x
}

fn deinterleave_f64(x: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let low = x.iter().step_by(2).copied().collect();
    let high = x.iter().skip(1).step_by(2).copied().collect();
    (low, high)
}

fn interleave_f64(low: &[f64], high: &[f64]) -> Vec<f64> {
    let mut x = vec![0f64; low.len() + high.len()];
    for (i, &v) in low.iter().enumerate() {
        x[2 * i] = v;
    }
    for (i, &v) in high.iter().enumerate() {
        x[2 * i + 1] = v;
    }
    x
}

/// Forward reversible 5/3: predict then update, all integer.
pub fn forward_5_3(signal: &[i32]) -> (Vec<i32>, Vec<i32>) {
    let mut x = signal.to_vec();
    let len = x.len();
    for i in (1..len).step_by(2) {
        let right = predict_right_i32(&x, i);
        x[i] -= (x[i - 1] + right) >> 1;
    }
    for i in (0..len).step_by(2) {
        let (left, right) = update_edges_i32(&x, i);
        x[i] += (left + right + 2) >> 2;
    }
    deinterleave_i32(&x)
}

/// Inverse reversible 5/3: undo update, then predict.
pub fn inverse_5_3(low: &[i32], high: &[i32]) -> Vec<i32> {
    let mut x = interleave_i32(low, high);
    let len = x.len();
    for i in (0..len).step_by(2) {
        let (left, right) = update_edges_i32(&x, i);
        x[i] -= (left + right + 2) >> 2;
    }
    for i in (1..len).step_by(2) {
        let right = predict_right_i32(&x, i);
        x[i] += (x[i - 1] + right) >> 1;
    }
    x
}

fn lift_step_odd(x: &mut [f64], coeff: f64) {
    for i in (1..x.len()).step_by(2) {
        let right = predict_right_f64(x, i);
        x[i] += coeff * (x[i - 1] + right);
    }
}

fn lift_step_even(x: &mut [f64], coeff: f64) {
    for i in (0..x.len()).step_by(2) {
        let (left, right) = update_edges_f64(x, i);
        x[i] += coeff * (left + right);
    }
}

/// Forward irreversible 9/7: four lifting steps plus scaling.
pub fn forward_9_7(signal: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let mut x = signal.to_vec();
    lift_step_odd(&mut x, ALPHA);
    lift_step_even(&mut x, BETA);
    lift_step_odd(&mut x, GAMMA);
    lift_step_even(&mut x, DELTA);
    for (i, v) in x.iter_mut().enumerate() {
        *v *= if i % 2 == 0 { 1.0 / K } else { K };
    }
    deinterleave_f64(&x)
}

/// Inverse irreversible 9/7: unscale, then undo the lifting steps in
/// reverse order.
pub fn inverse_9_7(low: &[f64], high: &[f64]) -> Vec<f64> {
    let mut x = interleave_f64(low, high);
    for (i, v) in x.iter_mut().enumerate() {
        *v *= if i % 2 == 0 { K } else { 1.0 / K };
    }
    lift_step_even(&mut x, -DELTA);
    lift_step_odd(&mut x, -GAMMA);
    lift_step_even(&mut x, -BETA);
    lift_step_odd(&mut x, -ALPHA);
    x
}

/// Orthonormal Haar over reals; single butterfly pair.
pub fn forward_haar(signal: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let r = std::f64::consts::SQRT_2;
    let mut low = Vec::with_capacity(signal.len().div_ceil(2));
    let mut high = Vec::with_capacity(signal.len() / 2);
    let mut i = 0;
    while i + 1 < signal.len() {
        let (a, b) = (signal[i], signal[i + 1]);
        low.push((a + b) / r);
        high.push((a - b) / r);
        i += 2;
    }
    if signal.len() % 2 == 1 {
        low.push(signal[signal.len() - 1]);
    }
    (low, high)
}

pub fn inverse_haar(low: &[f64], high: &[f64]) -> Vec<f64> {
    let r = std::f64::consts::SQRT_2;
    let mut out = Vec::with_capacity(low.len() + high.len());
    for i in 0..high.len() {
        out.push((low[i] + high[i]) / r);
        out.push((low[i] - high[i]) / r);
    }
    if low.len() > high.len() {
        out.push(low[low.len() - 1]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gradient_signal_has_zero_detail() {
        let (low, high) = forward_5_3(&[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(low, vec![1, 3, 5, 7]);
        assert_eq!(high, vec![0, 0, 0, 0]);
    }

    #[test]
    fn reversible_round_trip_even_and_odd_lengths() {
        for signal in [
            vec![10, 20, 30, 40, 50, 60, 70, 80],
            vec![10, -20, 30, -40, 50],
            vec![7, 7],
            vec![0, 1, 0, -1, 0, 1, 0],
            vec![-32768, 32767, -32768, 32767, 0, 12345],
        ] {
            let (low, high) = forward_5_3(&signal);
            assert_eq!(low.len(), signal.len().div_ceil(2));
            assert_eq!(high.len(), signal.len() / 2);
            assert_eq!(inverse_5_3(&low, &high), signal, "signal {signal:?}");
        }
    }

    #[test]
    fn irreversible_round_trip_to_float_precision() {
        let signal: Vec<f64> = (0..37).map(|i| ((i * 13 % 29) as f64) - 14.0).collect();
        let (low, high) = forward_9_7(&signal);
        let back = inverse_9_7(&low, &high);
        let max_in = signal.iter().fold(0f64, |a, &v| a.max(v.abs()));
        for (a, b) in signal.iter().zip(back.iter()) {
            assert!((a - b).abs() < 1e-6 * max_in.max(1.0), "{a} vs {b}");
        }
    }

    #[test]
    fn haar_round_trip() {
        for signal in [vec![1.0, 4.0, 9.0, 16.0], vec![3.0, 1.0, 4.0, 1.0, 5.0]] {
            let (low, high) = forward_haar(&signal);
            let back = inverse_haar(&low, &high);
            for (a, b) in signal.iter().zip(back.iter()) {
                assert!((a - b).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn length_two_signal() {
        let (low, high) = forward_5_3(&[5, 9]);
        assert_eq!((low.len(), high.len()), (1, 1));
        assert_eq!(inverse_5_3(&low, &high), vec![5, 9]);
    }
}
