//! Greedy Gaussian decomposition of a spectrum into analytic seeds.
//!
//! Each round detects the maxima of a working copy, measures a candidate width on
//! each flank from where the trace crosses the target height fraction, scores the
//! flanks against an ideal Gaussian, keeps the single best candidate, subtracts it
//! and repeats until no maximum clears the height threshold. The resulting
//! `(height, center, width, fraction)` seeds feed the bounded multi-peak fit.

use crate::error::{Result, SpecError};
use crate::math_tools::{detect_maxima, sigma_from_width};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// An analytic Gaussian seed: `width` is the full width at `height_frac` of the
/// peak height.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GaussianSeed {
    pub height: f64,
    pub center: f64,
    pub width: f64,
    pub height_frac: f64,
}

impl GaussianSeed {
    /// The standard deviation implied by the width/fraction pair.
    pub fn sigma(&self) -> f64 {
        sigma_from_width(self.width, self.height_frac)
    }

    /// The integrated amplitude `a·√(2π)·σ` used to initialize fits.
    pub fn amplitude(&self) -> f64 {
        self.height * (2.0 * std::f64::consts::PI).sqrt() * self.sigma()
    }

    /// Evaluates the seed Gaussian at `x`.
    pub fn evaluate(&self, x: f64) -> f64 {
        let sigma = self.sigma();
        self.height * (-0.5 * ((x - self.center) / sigma).powi(2)).exp()
    }
}

/// Options for [`approx_peak_gausses`].
#[derive(Debug, Clone, Copy)]
pub struct SeedOptions {
    /// Maxima below this fraction of the global maximum are not seeded.
    pub threshold: f64,
    /// Fraction of the peak height at which widths are measured.
    pub height_frac: f64,
    /// Hard cap on the number of seeds.
    pub max_peaks: usize,
}

impl Default for SeedOptions {
    fn default() -> Self {
        SeedOptions {
            threshold: 0.1,
            height_frac: 0.5,
            max_peaks: 10,
        }
    }
}

/// Measures the x position on one flank of a maximum where the working trace
/// crosses `target`, walking outward from `i`. Returns `None` when the trace
/// reaches the boundary without crossing.
fn flank_crossing(
    x: &Array1<f64>,
    y: &Array1<f64>,
    i: usize,
    target: f64,
    leftward: bool,
) -> Option<f64> {
    let n = y.len();
    let mut j = i;
    loop {
        let next = if leftward {
            if j == 0 {
                return None;
            }
            j - 1
        } else {
            if j + 1 >= n {
                return None;
            }
            j + 1
        };
        if y[next] <= target {
            // linear crossing between j and next
            let frac = if y[j] != y[next] {
                (y[j] - target) / (y[j] - y[next])
            } else {
                0.0
            };
            return Some(x[j] + frac * (x[next] - x[j]));
        }
        j = next;
    }
}

/// Scores a candidate seed over one flank: the standard deviation of
/// `(gaussian − data) / height` between the crossing and the maximum.
fn flank_score(x: &Array1<f64>, y: &Array1<f64>, seed: &GaussianSeed, i: usize, x_cross: f64) -> f64 {
    let mut residuals = Vec::new();
    if x_cross <= seed.center {
        let mut j = i;
        while j > 0 && x[j] >= x_cross {
            residuals.push((seed.evaluate(x[j]) - y[j]) / seed.height);
            j -= 1;
        }
    } else {
        let mut j = i;
        while j < x.len() && x[j] <= x_cross {
            residuals.push((seed.evaluate(x[j]) - y[j]) / seed.height);
            j += 1;
        }
    }
    if residuals.len() < 2 {
        return f64::INFINITY;
    }
    let mean = residuals.iter().sum::<f64>() / residuals.len() as f64;
    (residuals.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / residuals.len() as f64).sqrt()
}

/// Decomposes a spectrum into Gaussian seeds by greedy peak subtraction.
///
/// # Arguments
/// - `x`, `y`: the trace to decompose (ideally baselined and lightly smoothed).
/// - `opts`: height threshold (relative to the global maximum), width-measurement
///   fraction, and the seed cap.
///
/// # Returns
/// Seeds in the order they were extracted (tallest residual first).
pub fn approx_peak_gausses(
    x: &Array1<f64>,
    y: &Array1<f64>,
    opts: SeedOptions,
) -> Result<Vec<GaussianSeed>> {
    if x.is_empty() {
        return Err(SpecError::EmptyInput("approx_peak_gausses x"));
    }
    SpecError::check_lengths(x.len(), y.len())?;
    if !(opts.height_frac > 0.0 && opts.height_frac < 1.0) {
        return Err(SpecError::InvalidParameter {
            name: "height_frac",
            value: opts.height_frac,
        });
    }

    let global_max = y.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let height_threshold = opts.threshold * global_max;

    let mut y_work = y.clone();
    let mut seeds: Vec<GaussianSeed> = Vec::new();

    while seeds.len() < opts.max_peaks {
        let maxima = detect_maxima(&y_work, height_threshold, f64::INFINITY);
        if maxima.is_empty() {
            break;
        }

        let mut best: Option<(f64, GaussianSeed)> = None;
        for &i in &maxima {
            let a = y_work[i];
            let mu = x[i];
            let target = a * opts.height_frac;

            let left = flank_crossing(x, &y_work, i, target, true);
            let right = flank_crossing(x, &y_work, i, target, false);

            for cross in [left, right].into_iter().flatten() {
                let width = 2.0 * (mu - cross).abs();
                if width <= 0.0 {
                    continue;
                }
                let seed = GaussianSeed {
                    height: a,
                    center: mu,
                    width,
                    height_frac: opts.height_frac,
                };
                let score = flank_score(x, &y_work, &seed, i, cross);
                if score.is_finite() {
                    match &best {
                        Some((s, _)) if *s <= score => {}
                        _ => best = Some((score, seed)),
                    }
                }
            }
        }

        let Some((_, seed)) = best else {
            break;
        };
        for k in 0..y_work.len() {
            y_work[k] -= seed.evaluate(x[k]);
        }
        seeds.push(seed);
    }

    Ok(seeds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use crate::math_tools::width_from_sigma;

    fn gauss(x: f64, a: f64, mu: f64, sigma: f64) -> f64 {
        a * (-0.5 * ((x - mu) / sigma).powi(2)).exp()
    }

    #[test]
    fn seed_width_amplitude_relations() {
        let seed = GaussianSeed {
            height: 2.0,
            center: 100.0,
            width: width_from_sigma(5.0, 0.5),
            height_frac: 0.5,
        };
        assert_relative_eq!(seed.sigma(), 5.0, max_relative = 1e-12);
        assert_relative_eq!(
            seed.amplitude(),
            2.0 * (2.0 * std::f64::consts::PI).sqrt() * 5.0,
            max_relative = 1e-12
        );
    }

    #[test]
    fn single_gaussian_is_recovered() {
        let x = Array1::linspace(0.0, 500.0, 1001);
        let y = x.mapv(|v| gauss(v, 1.0, 300.0, 5.0));
        let seeds = approx_peak_gausses(&x, &y, SeedOptions::default()).unwrap();
        assert!(!seeds.is_empty());
        let s = seeds[0];
        assert_relative_eq!(s.center, 300.0, epsilon = 0.5);
        assert_relative_eq!(s.height, 1.0, max_relative = 0.02);
        // full width at half height of sigma=5 is ~11.77
        assert_relative_eq!(s.sigma(), 5.0, max_relative = 0.2);
    }

    #[test]
    fn well_separated_triple_is_recovered() {
        let x = Array1::linspace(0.0, 500.0, 1001);
        let step = x[1] - x[0];
        let truth = [(1.0, 150.0, 5.0), (0.6, 280.0, 7.0), (0.25, 420.0, 10.0)];
        let y = x.mapv(|v| truth.iter().map(|&(a, m, s)| gauss(v, a, m, s)).sum());

        let seeds = approx_peak_gausses(&x, &y, SeedOptions::default()).unwrap();
        assert_eq!(seeds.len(), 3);

        for &(a, mu, sigma) in &truth {
            let matched = seeds
                .iter()
                .find(|s| (s.center - mu).abs() <= step)
                .unwrap_or_else(|| panic!("no seed near {mu}"));
            assert_relative_eq!(matched.height, a, max_relative = 0.1);
            // FWHM within 20% of the true value
            let true_fwhm = width_from_sigma(sigma, 0.5);
            let seed_fwhm = width_from_sigma(matched.sigma(), 0.5);
            assert_relative_eq!(seed_fwhm, true_fwhm, max_relative = 0.2);
        }
    }

    #[test]
    fn threshold_suppresses_small_peaks() {
        let x = Array1::linspace(0.0, 500.0, 1001);
        let y = x.mapv(|v| gauss(v, 1.0, 150.0, 5.0) + gauss(v, 0.05, 400.0, 10.0));
        let seeds = approx_peak_gausses(&x, &y, SeedOptions::default()).unwrap();
        assert!(seeds.iter().all(|s| (s.center - 400.0).abs() > 20.0));
    }

    #[test]
    fn invalid_fraction_is_rejected() {
        let x = Array1::linspace(0.0, 1.0, 10);
        let y = Array1::zeros(10);
        let opts = SeedOptions {
            height_frac: 1.5,
            ..SeedOptions::default()
        };
        assert!(approx_peak_gausses(&x, &y, opts).is_err());
    }
}
