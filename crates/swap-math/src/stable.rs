//! Numerically stable helpers.

/// Floor applied to probabilities before taking logarithms.
pub const PROB_FLOOR: f64 = 1e-300;

/// Natural log with the argument floored at [`PROB_FLOOR`].
pub fn ln_floor(p: f64) -> f64 {
    p.max(PROB_FLOOR).ln()
}

/// Normalise two log-weights and return the share of the first.
pub fn two_class_share(log_a: f64, log_b: f64) -> f64 {
    if log_a == f64::NEG_INFINITY && log_b == f64::NEG_INFINITY {
        return 0.5;
    }
    let diff = log_b - log_a;
    if diff > 0.0 {
        let e = (-diff).exp();
        e / (1.0 + e)
    } else {
        1.0 / (1.0 + diff.exp())
    }
}

/// Mean absolute element-wise difference; zero for empty input.
pub fn mean_abs_change(new: &[f64], old: &[f64]) -> f64 {
    if new.is_empty() {
        return 0.0;
    }
    let total: f64 = new.iter().zip(old).map(|(a, b)| (a - b).abs()).sum();
    total / new.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn equal_weights_split_evenly() {
        assert!((two_class_share(-3.0, -3.0) - 0.5).abs() < 1e-15);
    }

    #[test]
    fn extreme_weights_do_not_overflow() {
        assert!(two_class_share(0.0, -2000.0) > 0.999_999);
        assert!(two_class_share(-2000.0, 0.0) < 1e-12);
    }

    #[test]
    fn mean_abs_change_basic() {
        assert!((mean_abs_change(&[1.0, 0.0], &[0.5, 0.5]) - 0.5).abs() < 1e-15);
        assert_eq!(mean_abs_change(&[], &[]), 0.0);
    }

    proptest! {
        #[test]
        fn share_is_a_probability(a in -1e4f64..1e4, b in -1e4f64..1e4) {
            let p = two_class_share(a, b);
            prop_assert!((0.0..=1.0).contains(&p));
        }
    }
}
