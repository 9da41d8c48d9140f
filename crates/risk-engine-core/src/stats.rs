//! Sample statistics over `f64` return series.
//!
//! Shared by the performance metrics and the VaR engines so both report the
//! same estimator (n - 1 denominator).

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample covariance of two equal-length series; zero below two observations.
pub fn covariance(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return 0.0;
    }
    let (mx, my) = (mean(&xs[..n]), mean(&ys[..n]));
    let sum: f64 = xs.iter().zip(ys).map(|(x, y)| (x - mx) * (y - my)).sum();
    sum / (n - 1) as f64
}

pub fn sample_variance(values: &[f64]) -> f64 {
    covariance(values, values)
}

pub fn sample_std(values: &[f64]) -> f64 {
    sample_variance(values).sqrt()
}
