//! Moments, quantiles and tail estimates used by the VaR engines.

use serde::{Deserialize, Serialize};

use crate::stats::{mean, sample_std};

/// First four moments of a return distribution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReturnMoments {
    pub mean: f64,
    /// Sample standard deviation (n - 1 denominator)
    pub std_dev: f64,
    pub skewness: f64,
    /// Excess kurtosis (normal = 0)
    pub kurtosis: f64,
}

impl ReturnMoments {
    pub fn of(values: &[f64]) -> Self {
        let n = values.len() as f64;
        let mean = mean(values);
        let pop_var = if values.is_empty() {
            0.0
        } else {
            values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n
        };
        let pop_std = pop_var.sqrt();

        // Population skew and excess kurtosis
        let (skewness, kurtosis) = if pop_std > f64::EPSILON {
            let skew = values.iter().map(|v| ((v - mean) / pop_std).powi(3)).sum::<f64>() / n;
            let kurt = values.iter().map(|v| ((v - mean) / pop_std).powi(4)).sum::<f64>() / n - 3.0;
            (skew, kurt)
        } else {
            (0.0, 0.0)
        };

        Self {
            mean,
            std_dev: sample_std(values),
            skewness,
            kurtosis,
        }
    }

    /// Flag distributions a normal model describes poorly.
    pub fn normality_warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.kurtosis > 1.0 {
            warnings.push(format!(
                "Excess kurtosis of {:.2}: returns are fat-tailed and normal VaR may understate tail losses",
                self.kurtosis
            ));
        }
        if self.skewness.abs() > 0.5 {
            warnings.push(format!(
                "Skewness of {:.2}: returns are asymmetric and normal VaR may misstate tail losses",
                self.skewness
            ));
        }
        warnings
    }
}

/// Linear-interpolated quantile of ascending data, `p` in [0, 1].
pub fn quantile_sorted(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let rank = p.clamp(0.0, 1.0) * (n - 1) as f64;
            let lower = rank.floor() as usize;
            let upper = rank.ceil() as usize;
            if lower == upper {
                sorted[lower]
            } else {
                let frac = rank - lower as f64;
                sorted[lower] * (1.0 - frac) + sorted[upper] * frac
            }
        }
    }
}

/// Ascending copy; NaN-tolerant ordering.
pub fn sorted_copy(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted
}

/// Empirical loss quantile and tail mean of a return distribution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TailEstimate {
    /// Loss at the (1 - α) quantile, positive for a loss
    pub var: f64,
    /// Mean loss of returns at or beyond the quantile
    pub cvar: f64,
    pub tail_observations: usize,
}

/// VaR = −q(1−α); CVaR = −mean(r ≤ q).
///
/// An empty tail falls back to VaR and a single-observation tail is that
/// observation, so the result never divides by zero.
pub fn empirical_tail(sorted: &[f64], confidence_level: f64) -> TailEstimate {
    let threshold = quantile_sorted(sorted, 1.0 - confidence_level);
    let var = -threshold;
    let tail: Vec<f64> = sorted.iter().copied().take_while(|r| *r <= threshold).collect();
    let cvar = match tail.len() {
        0 => var,
        1 => -tail[0],
        _ => -mean(&tail),
    };
    TailEstimate {
        var,
        cvar,
        tail_observations: tail.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_moments_of_symmetric_sample() {
        let m = ReturnMoments::of(&[-0.02, -0.01, 0.0, 0.01, 0.02]);
        assert_relative_eq!(m.mean, 0.0, epsilon = 1e-15);
        // sample variance = 0.001 / 4
        assert_relative_eq!(m.std_dev, (0.001_f64 / 4.0).sqrt(), epsilon = 1e-15);
        assert_relative_eq!(m.skewness, 0.0, epsilon = 1e-12);
        // population kurtosis of a 5-point uniform grid is 1.7
        assert_relative_eq!(m.kurtosis, 1.7 - 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_constant_sample_has_zero_higher_moments() {
        let m = ReturnMoments::of(&[0.25; 8]);
        assert_eq!(m.std_dev, 0.0);
        assert_eq!(m.skewness, 0.0);
        assert_eq!(m.kurtosis, 0.0);
    }

    #[test]
    fn test_quantile_interpolates() {
        let sorted = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(quantile_sorted(&sorted, 0.0), 1.0);
        assert_eq!(quantile_sorted(&sorted, 1.0), 5.0);
        assert_relative_eq!(quantile_sorted(&sorted, 0.1), 1.4, epsilon = 1e-12);
        assert_eq!(quantile_sorted(&[7.0], 0.3), 7.0);
        assert!(quantile_sorted(&[], 0.5).is_nan());
    }

    #[test]
    fn test_tail_with_single_observation() {
        // 20 points, 5% quantile sits between the two worst; only the worst is below it
        let mut r: Vec<f64> = (0..20).map(|i| i as f64 * 0.001).collect();
        r[0] = -0.10;
        let sorted = sorted_copy(&r);
        let tail = empirical_tail(&sorted, 0.95);
        assert_eq!(tail.tail_observations, 1);
        assert_relative_eq!(tail.cvar, 0.10, epsilon = 1e-15);
        assert!(tail.cvar >= tail.var);
    }

    #[test]
    fn test_tail_mean_of_several_observations() {
        let sorted = sorted_copy(&[-0.05, -0.04, -0.03, 0.0, 0.01, 0.02, 0.03, 0.04, 0.05, 0.06]);
        let tail = empirical_tail(&sorted, 0.70);
        // q(0.30) at rank 2.7 → -0.03 * 0.3 + 0.0 * 0.7 = -0.009
        assert_relative_eq!(tail.var, 0.009, epsilon = 1e-12);
        assert_eq!(tail.tail_observations, 3);
        assert_relative_eq!(tail.cvar, 0.04, epsilon = 1e-12);
    }
}
