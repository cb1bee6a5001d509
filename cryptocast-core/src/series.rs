//! Window and shift helpers over `&[f64]` series.
//!
//! NaN marks an undefined value. Rolling windows are strict: a window that
//! is incomplete or contains NaN yields NaN.

/// `x[i] / x[i - periods] - 1`.
pub fn pct_change(x: &[f64], periods: usize) -> Vec<f64> {
    (0..x.len())
        .map(|i| {
            if i < periods {
                f64::NAN
            } else {
                x[i] / x[i - periods] - 1.0
            }
        })
        .collect()
}

/// `x[i] - x[i - periods]`.
pub fn diff(x: &[f64], periods: usize) -> Vec<f64> {
    (0..x.len())
        .map(|i| {
            if i < periods {
                f64::NAN
            } else {
                x[i] - x[i - periods]
            }
        })
        .collect()
}

/// Shift by `k` rows: positive moves values later (lag), negative moves them earlier (lead).
pub fn shift(x: &[f64], k: isize) -> Vec<f64> {
    let n = x.len() as isize;
    (0..n)
        .map(|i| {
            let src = i - k;
            if src < 0 || src >= n {
                f64::NAN
            } else {
                x[src as usize]
            }
        })
        .collect()
}

/// `ln(x[i] / x[i - periods])`.
pub fn log_return(x: &[f64], periods: usize) -> Vec<f64> {
    (0..x.len())
        .map(|i| {
            if i < periods {
                f64::NAN
            } else {
                (x[i] / x[i - periods]).ln()
            }
        })
        .collect()
}

fn rolling<F>(x: &[f64], window: usize, f: F) -> Vec<f64>
where
    F: Fn(&[f64]) -> f64,
{
    let n = x.len();
    let mut out = vec![f64::NAN; n];
    if window == 0 || n < window {
        return out;
    }
    for i in (window - 1)..n {
        let w = &x[i + 1 - window..=i];
        if w.iter().all(|v| !v.is_nan()) {
            out[i] = f(w);
        }
    }
    out
}

pub fn rolling_mean(x: &[f64], window: usize) -> Vec<f64> {
    rolling(x, window, mean)
}

/// Rolling sample standard deviation (ddof = 1).
pub fn rolling_std(x: &[f64], window: usize) -> Vec<f64> {
    rolling(x, window, std_sample)
}

pub fn rolling_max(x: &[f64], window: usize) -> Vec<f64> {
    rolling(x, window, |w| w.iter().copied().fold(f64::NEG_INFINITY, f64::max))
}

/// Weighted moving average with linear weights `1..=window` (newest heaviest).
pub fn wma(x: &[f64], window: usize) -> Vec<f64> {
    let denom = (window * (window + 1)) as f64 / 2.0;
    rolling(x, window, |w| {
        w.iter()
            .enumerate()
            .map(|(j, v)| v * (j + 1) as f64)
            .sum::<f64>()
            / denom
    })
}

/// Recursive exponential moving average, `alpha = 2 / (span + 1)`, seeded
/// with the first defined value. Undefined inputs carry the previous value.
pub fn ema(x: &[f64], span: usize) -> Vec<f64> {
    let alpha = 2.0 / (span as f64 + 1.0);
    let mut out = Vec::with_capacity(x.len());
    let mut prev = f64::NAN;
    for &v in x {
        if v.is_nan() {
            out.push(prev);
            continue;
        }
        prev = if prev.is_nan() {
            v
        } else {
            alpha * v + (1.0 - alpha) * prev
        };
        out.push(prev);
    }
    out
}

/// Cumulative sum; NaN inputs contribute zero.
pub fn cumsum(x: &[f64]) -> Vec<f64> {
    let mut acc = 0.0;
    x.iter()
        .map(|v| {
            if !v.is_nan() {
                acc += v;
            }
            acc
        })
        .collect()
}

/// Arithmetic mean. NaN for an empty slice.
pub fn mean(x: &[f64]) -> f64 {
    if x.is_empty() {
        return f64::NAN;
    }
    x.iter().sum::<f64>() / x.len() as f64
}

/// Mean of the defined (finite) values, if any.
pub fn mean_defined(x: &[f64]) -> Option<f64> {
    let (sum, count) = x
        .iter()
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Sample standard deviation (ddof = 1). NaN for fewer than two values.
pub fn std_sample(x: &[f64]) -> f64 {
    if x.len() < 2 {
        return f64::NAN;
    }
    let m = mean(x);
    let ss: f64 = x.iter().map(|v| (v - m).powi(2)).sum();
    (ss / (x.len() - 1) as f64).sqrt()
}

/// Population standard deviation (ddof = 0). NaN for an empty slice.
pub fn std_population(x: &[f64]) -> f64 {
    if x.is_empty() {
        return f64::NAN;
    }
    let m = mean(x);
    let ss: f64 = x.iter().map(|v| (v - m).powi(2)).sum();
    (ss / x.len() as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, DEFAULT_EPSILON};

    #[test]
    fn pct_change_and_diff() {
        let x = [100.0, 110.0, 99.0];
        let p = pct_change(&x, 1);
        assert!(p[0].is_nan());
        assert_approx(p[1], 0.1, DEFAULT_EPSILON);
        assert_approx(p[2], -0.1, DEFAULT_EPSILON);
        assert_eq!(diff(&x, 2)[2], -1.0);
    }

    #[test]
    fn shift_both_directions() {
        let x = [1.0, 2.0, 3.0];
        let lag = shift(&x, 1);
        assert!(lag[0].is_nan());
        assert_eq!(&lag[1..], &[1.0, 2.0]);
        let lead = shift(&x, -2);
        assert_eq!(lead[0], 3.0);
        assert!(lead[1].is_nan() && lead[2].is_nan());
    }

    #[test]
    fn rolling_windows_are_strict() {
        let x = [1.0, 2.0, f64::NAN, 4.0, 5.0, 6.0];
        let m = rolling_mean(&x, 2);
        assert!(m[0].is_nan());
        assert_approx(m[1], 1.5, DEFAULT_EPSILON);
        assert!(m[2].is_nan() && m[3].is_nan());
        assert_approx(m[4], 4.5, DEFAULT_EPSILON);
        assert_approx(rolling_max(&x, 3)[5], 6.0, DEFAULT_EPSILON);
    }

    #[test]
    fn rolling_std_uses_sample_form() {
        let s = rolling_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0], 8);
        // population std is 2.0; sample std is sqrt(32/7)
        assert_approx(s[7], (32.0f64 / 7.0).sqrt(), 1e-12);
        assert_approx(std_population(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]), 2.0, 1e-12);
    }

    #[test]
    fn wma_weights_newest_heaviest() {
        let w = wma(&[1.0, 2.0, 3.0], 3);
        // (1*1 + 2*2 + 3*3) / 6
        assert_approx(w[2], 14.0 / 6.0, DEFAULT_EPSILON);
    }

    #[test]
    fn ema_seeds_with_first_value() {
        let e = ema(&[10.0, 20.0], 3);
        assert_approx(e[0], 10.0, DEFAULT_EPSILON);
        assert_approx(e[1], 15.0, DEFAULT_EPSILON);
    }

    #[test]
    fn mean_defined_skips_nan() {
        assert_eq!(mean_defined(&[1.0, f64::NAN, 3.0]), Some(2.0));
        assert_eq!(mean_defined(&[f64::NAN]), None);
    }

    #[test]
    fn cumsum_skips_nan() {
        assert_eq!(cumsum(&[1.0, f64::NAN, 2.0]), vec![1.0, 1.0, 3.0]);
    }
}
