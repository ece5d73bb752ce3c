//! EBCOT context modelling (ISO/IEC 15444-1 Annex D).
//!
//! Maps the significance neighbourhood of a coefficient to one of the 19
//! context labels: 0..=8 zero coding, 9..=13 sign coding, 14..=16 magnitude
//! refinement, 17 run-length, 18 uniform.

use crate::image::SubbandOrientation;

pub const CTX_RUN_LENGTH: usize = 17;
pub const CTX_UNIFORM: usize = 18;
pub const NUM_CONTEXTS: usize = 19;

/// Initial (state index, MPS) per label: 4 for the significance labels, 0
/// for sign, 6 for first refinement and 3 for the subsequent-refinement
/// labels, 3 for run-length, 46 for uniform. MPS always starts at 0.
pub fn initial_states() -> [(u8, u8); NUM_CONTEXTS] {
    let mut states = [(0u8, 0u8); NUM_CONTEXTS];
    for state in states.iter_mut().take(9) {
        *state = (4, 0);
    }
    states[14] = (6, 0);
    states[15] = (3, 0);
    states[16] = (3, 0);
    states[CTX_RUN_LENGTH] = (3, 0);
    states[CTX_UNIFORM] = (46, 0);
    states
}

/// Zero-coding context label from the H/V/D significance counts
/// (Table D.1). HL transposes the H/V roles; HH is keyed on the diagonal
/// count first.
pub fn zero_coding_context(
    orientation: SubbandOrientation,
    h: u8,
    v: u8,
    d: u8,
) -> usize {
    let (h, v) = match orientation {
        SubbandOrientation::HL => (v, h),
        _ => (h, v),
    };
    match orientation {
        SubbandOrientation::LL | SubbandOrientation::LH | SubbandOrientation::HL => {
            if h == 2 {
                8
            } else if h == 1 && v >= 1 {
                7
            } else if h == 1 && d >= 1 {
                6
            } else if h == 1 {
                5
            } else if v == 2 {
                4
            } else if v == 1 {
                3
            } else if d >= 2 {
                2
            } else if d == 1 {
                1
            } else {
                0
            }
        }
        SubbandOrientation::HH => {
            let hv = h + v;
            if d >= 3 {
                8
            } else if d == 2 && hv >= 1 {
                7
            } else if d == 2 {
                6
            } else if d == 1 && hv >= 2 {
                5
            } else if d == 1 && hv == 1 {
                4
            } else if d == 1 {
                3
            } else if hv >= 2 {
                2
            } else if hv == 1 {
                1
            } else {
                0
            }
        }
    }
}

/// Sign-coding context label and XOR predictor bit (Table D.2). Inputs are
/// the clamped signed sums of the horizontal and vertical neighbour
/// contributions (+1 significant positive, -1 significant negative).
pub fn sign_coding_context(h: i32, v: i32) -> (usize, u8) {
    match (h.clamp(-1, 1), v.clamp(-1, 1)) {
        (1, 1) => (13, 0),
        (1, 0) => (12, 0),
        (1, -1) => (11, 0),
        (0, 1) => (10, 0),
        (0, 0) => (9, 0),
        (0, -1) => (10, 1),
        (-1, 1) => (11, 1),
        (-1, 0) => (12, 1),
        (-1, -1) => (13, 1),
        _ => unreachable!(),
    }
}

/// Magnitude-refinement context label: 14 for the first refinement of a
/// coefficient; for subsequent refinements, 15 without a significant
/// neighbour at first significance and 16 with at least one.
pub fn magnitude_refinement_context(refined_before: bool, any_significant_neighbour: bool) -> usize {
    if !refined_before {
        14
    } else if any_significant_neighbour {
        16
    } else {
        15
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::SubbandOrientation::{HH, HL, LH, LL};

    #[test]
    fn ll_and_lh_prioritise_horizontal() {
        assert_eq!(zero_coding_context(LL, 2, 0, 0), 8);
        assert_eq!(zero_coding_context(LH, 2, 2, 4), 8);
        assert_eq!(zero_coding_context(LL, 1, 1, 0), 7);
        assert_eq!(zero_coding_context(LL, 1, 0, 1), 6);
        assert_eq!(zero_coding_context(LL, 1, 0, 0), 5);
        assert_eq!(zero_coding_context(LL, 0, 2, 0), 4);
        assert_eq!(zero_coding_context(LL, 0, 1, 0), 3);
        assert_eq!(zero_coding_context(LL, 0, 0, 2), 2);
        assert_eq!(zero_coding_context(LL, 0, 0, 1), 1);
        assert_eq!(zero_coding_context(LL, 0, 0, 0), 0);
    }

    #[test]
    fn hl_transposes_counts() {
        // HL gives priority to the vertical count.
        assert_eq!(zero_coding_context(HL, 0, 2, 0), 8);
        assert_eq!(zero_coding_context(HL, 2, 0, 0), 4);
        assert_eq!(zero_coding_context(HL, 1, 1, 0), 7);
        assert_eq!(zero_coding_context(HL, 0, 1, 1), 6);
        assert_eq!(zero_coding_context(HL, 1, 0, 0), 3);
    }

    #[test]
    fn hh_keys_on_diagonal() {
        assert_eq!(zero_coding_context(HH, 0, 0, 3), 8);
        assert_eq!(zero_coding_context(HH, 2, 2, 4), 8);
        assert_eq!(zero_coding_context(HH, 1, 0, 2), 7);
        assert_eq!(zero_coding_context(HH, 0, 0, 2), 6);
        assert_eq!(zero_coding_context(HH, 1, 1, 1), 5);
        assert_eq!(zero_coding_context(HH, 1, 0, 1), 4);
        assert_eq!(zero_coding_context(HH, 0, 0, 1), 3);
        assert_eq!(zero_coding_context(HH, 2, 0, 0), 2);
        assert_eq!(zero_coding_context(HH, 0, 1, 0), 1);
        assert_eq!(zero_coding_context(HH, 0, 0, 0), 0);
    }

    #[test]
    fn sign_contexts_cover_symmetries() {
        assert_eq!(sign_coding_context(0, 0), (9, 0));
        assert_eq!(sign_coding_context(2, 0), (12, 0));
        assert_eq!(sign_coding_context(-2, 0), (12, 1));
        assert_eq!(sign_coding_context(1, 1), (13, 0));
        assert_eq!(sign_coding_context(-1, -1), (13, 1));
        assert_eq!(sign_coding_context(0, -1), (10, 1));
    }

    #[test]
    fn refinement_labels() {
        assert_eq!(magnitude_refinement_context(false, false), 14);
        assert_eq!(magnitude_refinement_context(false, true), 14);
        assert_eq!(magnitude_refinement_context(true, false), 15);
        assert_eq!(magnitude_refinement_context(true, true), 16);
    }

    #[test]
    fn initial_state_table() {
        let states = initial_states();
        assert_eq!(states[0], (4, 0));
        assert_eq!(states[8], (4, 0));
        assert_eq!(states[9], (0, 0));
        assert_eq!(states[14], (6, 0));
        assert_eq!(states[15], (3, 0));
        assert_eq!(states[17], (3, 0));
        assert_eq!(states[18], (46, 0));
    }
}
