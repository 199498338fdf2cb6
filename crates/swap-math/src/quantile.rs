//! Empirical quantile cutoffs over sorted score samples.
//!
//! Both searches take samples sorted ascending and an error rate. The rate
//! is converted into an allowed count `floor(rate * n)` of samples that may
//! fall on the wrong side of the cutoff; the returned cutoff is always one of
//! the sample values.

/// Number of samples allowed past a cutoff for a given error rate.
pub fn allowed_count(rate: f64, n: usize) -> usize {
    if n == 0 || rate <= 0.0 {
        return 0;
    }
    let allowed = (rate * n as f64 + 1e-9).floor();
    (allowed as usize).min(n)
}

/// Largest sample value `c` with at most `floor(rate * n)` samples `<= c`.
///
/// Returns `None` when no sample value qualifies (empty input, zero
/// allowance, or ties that push every candidate over the allowance).
pub fn lower_tail_cutoff(sorted: &[f64], rate: f64) -> Option<f64> {
    let allowed = allowed_count(rate, sorted.len());
    if allowed == 0 {
        return None;
    }
    let mut idx = allowed - 1;
    loop {
        let value = sorted[idx];
        let at_or_below = sorted.partition_point(|&x| x <= value);
        if at_or_below <= allowed {
            return Some(value);
        }
        let first = sorted.partition_point(|&x| x < value);
        if first == 0 {
            return None;
        }
        idx = first - 1;
    }
}

/// Smallest sample value `c` with at most `floor(rate * n)` samples `>= c`.
pub fn upper_tail_cutoff(sorted: &[f64], rate: f64) -> Option<f64> {
    let n = sorted.len();
    let allowed = allowed_count(rate, n);
    if allowed == 0 {
        return None;
    }
    let mut idx = n - allowed;
    loop {
        let value = sorted[idx];
        let at_or_above = n - sorted.partition_point(|&x| x < value);
        if at_or_above <= allowed {
            return Some(value);
        }
        let past = sorted.partition_point(|&x| x <= value);
        if past >= n {
            return None;
        }
        idx = past;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn grid(n: usize) -> Vec<f64> {
        (0..n).map(|i| i as f64 / n as f64).collect()
    }

    #[test]
    fn allowed_count_floors() {
        assert_eq!(allowed_count(0.1, 100), 10);
        assert_eq!(allowed_count(0.01, 100), 1);
        assert_eq!(allowed_count(0.01, 50), 0);
        assert_eq!(allowed_count(2.0, 5), 5);
    }

    #[test]
    fn lower_cutoff_picks_kth_sample() {
        let s = grid(100);
        assert_eq!(lower_tail_cutoff(&s, 0.1), Some(s[9]));
    }

    #[test]
    fn upper_cutoff_picks_kth_from_top() {
        let s = grid(100);
        assert_eq!(upper_tail_cutoff(&s, 0.01), Some(s[99]));
        assert_eq!(upper_tail_cutoff(&s, 0.05), Some(s[95]));
    }

    #[test]
    fn ties_step_past_the_block() {
        let s = [0.1, 0.2, 0.2, 0.2, 0.9];
        // allowance 2: 0.2 would cover 4 samples, fall back to 0.1
        assert_eq!(lower_tail_cutoff(&s, 0.4), Some(0.1));
        let s = [0.1, 0.8, 0.8, 0.8, 0.9];
        assert_eq!(upper_tail_cutoff(&s, 0.4), Some(0.9));
    }

    #[test]
    fn zero_allowance_yields_none() {
        assert_eq!(lower_tail_cutoff(&[0.5], 0.1), None);
        assert_eq!(upper_tail_cutoff(&[], 0.1), None);
    }

    proptest! {
        #[test]
        fn cutoffs_respect_allowance(
            mut v in prop::collection::vec(0.0f64..=1.0, 1..200),
            rate in 0.0f64..0.5,
        ) {
            v.sort_by(|a, b| a.total_cmp(b));
            let allowed = allowed_count(rate, v.len());
            if let Some(c) = lower_tail_cutoff(&v, rate) {
                prop_assert!(v.iter().filter(|&&x| x <= c).count() <= allowed);
            }
            if let Some(c) = upper_tail_cutoff(&v, rate) {
                prop_assert!(v.iter().filter(|&&x| x >= c).count() <= allowed);
            }
        }
    }
}
