//! Sample statistics over `f64` slices.
//!
//! Callers check lengths before calling; these helpers return `0.0` on empty input
//! rather than `NaN` so that a degenerate case never leaks into a result.

/// Arithmetic mean.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// True when every value is bit-for-bit equal to the first one.
pub fn is_constant(values: &[f64]) -> bool {
    match values.first() {
        Some(first) => values.iter().all(|v| v == first),
        None => true,
    }
}

/// Variance with `ddof` delta degrees of freedom.
///
/// A constant series has variance exactly zero, even where floating point summation of
/// the mean would leave residual noise.
pub fn variance(values: &[f64], ddof: usize) -> f64 {
    if values.len() <= ddof || is_constant(values) {
        return 0.0;
    }
    let m = mean(values);
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    ss / (values.len() - ddof) as f64
}

pub fn std_dev(values: &[f64], ddof: usize) -> f64 {
    variance(values, ddof).sqrt()
}

/// Covariance of two equal-length series.
pub fn covariance(xs: &[f64], ys: &[f64], ddof: usize) -> f64 {
    let n = xs.len().min(ys.len());
    if n <= ddof {
        return 0.0;
    }
    let mx = mean(&xs[..n]);
    let my = mean(&ys[..n]);
    let sp: f64 = xs
        .iter()
        .zip(ys.iter())
        .map(|(x, y)| (x - mx) * (y - my))
        .sum();
    sp / (n - ddof) as f64
}

/// Pearson correlation, `None` when either side has zero variance.
pub fn correlation(xs: &[f64], ys: &[f64]) -> Option<f64> {
    let n = xs.len().min(ys.len());
    let sx = std_dev(&xs[..n], 1);
    let sy = std_dev(&ys[..n], 1);
    if sx == 0.0 || sy == 0.0 {
        return None;
    }
    Some((covariance(xs, ys, 1) / (sx * sy)).clamp(-1.0, 1.0))
}

/// Population skewness (third standardized moment).
pub fn skewness(values: &[f64]) -> Option<f64> {
    let var = variance(values, 0);
    if var == 0.0 {
        return None;
    }
    let m = mean(values);
    let m3 = values.iter().map(|v| (v - m).powi(3)).sum::<f64>() / values.len() as f64;
    Some(m3 / var.powf(1.5))
}

/// Population excess kurtosis (fourth standardized moment minus 3).
pub fn excess_kurtosis(values: &[f64]) -> Option<f64> {
    let var = variance(values, 0);
    if var == 0.0 {
        return None;
    }
    let m = mean(values);
    let m4 = values.iter().map(|v| (v - m).powi(4)).sum::<f64>() / values.len() as f64;
    Some(m4 / (var * var) - 3.0)
}

/// Quantile of an ascending slice by linear interpolation between order statistics.
///
/// The position is `(n - 1) * p`, so `p = 0` is the minimum and `p = 1` the maximum.
pub fn quantile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let pos = (sorted.len() - 1) as f64 * p.clamp(0.0, 1.0);
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + frac * (sorted[hi] - sorted[lo])
}

/// Returns an ascending copy; NaNs are never present in validated series.
pub fn sorted_copy(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted
}

/// `n` evenly spaced values from `start` to `end` inclusive.
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n)
                .map(|i| if i == n - 1 { end } else { start + step * i as f64 })
                .collect()
        }
    }
}

/// Compounded total return of simple returns.
pub fn compound(values: &[f64]) -> f64 {
    values.iter().fold(1.0, |acc, r| acc * (1.0 + r)) - 1.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_series_has_zero_variance() {
        let values = [0.01; 7];
        assert_eq!(variance(&values, 1), 0.0);
        assert_eq!(std_dev(&values, 1), 0.0);
        assert!(skewness(&values).is_none());
        assert!(excess_kurtosis(&values).is_none());
    }

    #[test]
    fn test_sample_variance() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert!((variance(&values, 1) - 5.0 / 3.0).abs() < 1e-12);
        assert!((variance(&values, 0) - 1.25).abs() < 1e-12);
    }

    #[test]
    fn test_quantile_interpolates() {
        let sorted = [-0.02, -0.01, 0.01, 0.015, 0.03];
        assert!((quantile_sorted(&sorted, 0.05) - (-0.018)).abs() < 1e-12);
        assert_eq!(quantile_sorted(&sorted, 0.0), -0.02);
        assert_eq!(quantile_sorted(&sorted, 1.0), 0.03);
        assert_eq!(quantile_sorted(&sorted, 0.5), 0.01);
    }

    #[test]
    fn test_correlation_bounds() {
        let xs = [1.0, 2.0, 3.0, 4.0];
        let ys = [2.0, 4.0, 6.0, 8.0];
        assert!((correlation(&xs, &ys).unwrap() - 1.0).abs() < 1e-12);
        let zs = [4.0, 3.0, 2.0, 1.0];
        assert!((correlation(&xs, &zs).unwrap() + 1.0).abs() < 1e-12);
        assert!(correlation(&xs, &[1.0; 4]).is_none());
    }

    #[test]
    fn test_linspace_endpoints() {
        let points = linspace(0.05, 0.15, 5);
        assert_eq!(points.len(), 5);
        assert_eq!(points[0], 0.05);
        assert_eq!(points[4], 0.15);
        assert!((points[2] - 0.10).abs() < 1e-12);
    }

    #[test]
    fn test_symmetric_skew_is_zero() {
        let values = [-2.0, -1.0, 0.0, 1.0, 2.0];
        assert!(skewness(&values).unwrap().abs() < 1e-12);
        // Uniform-like samples are platykurtic
        assert!(excess_kurtosis(&values).unwrap() < 0.0);
    }
}
