//! Bounded nonlinear multi-peak fitting.
//!
//! The composite model is `c + Σₖ Aₖ·φ(x; μₖ, σₖ)` with normalized Gaussians
//! `φ = exp(−½((x−μ)/σ)²)/(σ√(2π))`, so `Aₖ` is the integrated peak area. The
//! solve is a Levenberg-Marquardt iteration with analytic Jacobian and box
//! bounds enforced by projection; parameter standard errors come from the
//! Jacobian at the solution.
//!
//! Non-convergence is not an exception: the solver retries every seed subset of
//! size N−1, then N−2, and so on, accepting the candidate with the lowest L¹
//! residual that also passes the amplitude and peak-separation checks. If no
//! subset survives, or the accepted fit reports R² below the floor, the outcome
//! is `Failed` and carries the seeds so callers can downgrade gracefully.

use crate::error::{Result, SpecError};
use crate::math_tools::{invert_dense, solve_dense};
use crate::peaks::seed::GaussianSeed;
use ndarray::Array1;
use serde::{Deserialize, Serialize};

const SQRT_TAU: f64 = 2.5066282746310002; // sqrt(2*pi)

/// One fitted Gaussian component; `amplitude` is the integrated area.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FittedPeak {
    pub amplitude: f64,
    pub center: f64,
    pub sigma: f64,
    pub amplitude_err: f64,
    pub center_err: f64,
    pub sigma_err: f64,
}

impl FittedPeak {
    /// Peak height `A / (σ·√(2π))`.
    pub fn height(&self) -> f64 {
        self.amplitude / (self.sigma * SQRT_TAU)
    }

    /// Full width at half maximum.
    pub fn fwhm(&self) -> f64 {
        2.0 * (2.0 * (2.0f64).ln()).sqrt() * self.sigma
    }

    /// Full width at fraction `frac` of the height, as used by the peak records.
    pub fn width_at_frac(&self, frac: f64) -> f64 {
        crate::math_tools::width_from_sigma(self.sigma, frac)
    }

    fn evaluate(&self, x: f64) -> f64 {
        self.amplitude / (self.sigma * SQRT_TAU) * (-0.5 * ((x - self.center) / self.sigma).powi(2)).exp()
    }
}

/// A converged multi-peak fit.
#[derive(Debug, Clone, PartialEq)]
pub struct PeakFit {
    /// Fitted components, ordered by center.
    pub peaks: Vec<FittedPeak>,
    pub offset: f64,
    pub offset_err: f64,
    /// Coefficient of determination against the input trace.
    pub r_squared: f64,
    /// The composite model evaluated on the input grid.
    pub y_fit: Array1<f64>,
}

/// Outcome of a multi-peak fit; failure carries the seeds for downgrading.
#[derive(Debug, Clone, PartialEq)]
pub enum FitOutcome {
    Converged(PeakFit),
    Failed {
        reason: FitFailure,
        seeds: Vec<GaussianSeed>,
    },
}

impl FitOutcome {
    /// The fit, if one converged and was accepted.
    pub fn fit(&self) -> Option<&PeakFit> {
        match self {
            FitOutcome::Converged(fit) => Some(fit),
            FitOutcome::Failed { .. } => None,
        }
    }
}

/// Why a fit was rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FitFailure {
    /// No seed subset produced a converged, acceptable solve.
    NoConvergence,
    /// The best accepted fit fell below the R² floor.
    LowRSquared(f64),
    /// There was nothing to fit.
    NoSeeds,
}

/// Options for [`fit_gaussians`].
#[derive(Debug, Clone, Copy)]
pub struct FitOptions {
    /// Include a constant offset parameter.
    pub fit_offset: bool,
    /// Fits whose R² fall below this are flagged as failed (§ API contract).
    pub r2_floor: f64,
    /// Fitted amplitudes must exceed this to be accepted.
    pub min_amplitude: f64,
    /// Levenberg-Marquardt iteration cap.
    pub max_iterations: usize,
}

impl Default for FitOptions {
    fn default() -> Self {
        FitOptions {
            fit_offset: true,
            r2_floor: 0.90,
            min_amplitude: 0.0,
            max_iterations: 200,
        }
    }
}

/// Model/Jacobian closure pair for the LM driver.
struct LmProblem<'a> {
    eval: &'a dyn Fn(&[f64], f64) -> f64,
    jacobian: &'a dyn Fn(&[f64], f64, &mut [f64]),
}

struct LmSolution {
    params: Vec<f64>,
    errors: Vec<f64>,
    ssr: f64,
    converged: bool,
}

/// Box-bounded Levenberg-Marquardt with analytic Jacobian.
fn levenberg_marquardt(
    x: &Array1<f64>,
    y: &Array1<f64>,
    p0: &[f64],
    bounds: &[(f64, f64)],
    problem: &LmProblem,
    max_iterations: usize,
) -> LmSolution {
    let n = x.len();
    let np = p0.len();
    let clamp = |p: &mut [f64]| {
        for (v, (lo, hi)) in p.iter_mut().zip(bounds.iter()) {
            *v = v.clamp(*lo, *hi);
        }
    };

    let cost = |p: &[f64]| -> f64 {
        (0..n)
            .map(|i| {
                let r = y[i] - (problem.eval)(p, x[i]);
                r * r
            })
            .sum()
    };

    let mut params = p0.to_vec();
    clamp(&mut params);
    let mut current_cost = cost(&params);
    let mut lambda = 1e-3;
    let mut converged = false;
    let mut jrow = vec![0.0; np];

    for _ in 0..max_iterations {
        // assemble J^T J and J^T r
        let mut jtj = vec![vec![0.0; np]; np];
        let mut jtr = vec![0.0; np];
        for i in 0..n {
            (problem.jacobian)(&params, x[i], &mut jrow);
            let r = y[i] - (problem.eval)(&params, x[i]);
            for a in 0..np {
                jtr[a] += jrow[a] * r;
                for b in a..np {
                    jtj[a][b] += jrow[a] * jrow[b];
                }
            }
        }
        for a in 0..np {
            for b in 0..a {
                jtj[a][b] = jtj[b][a];
            }
        }

        // damped step; retry with stronger damping while the cost refuses to drop
        let mut stepped = false;
        for _ in 0..12 {
            let mut damped = jtj.clone();
            for a in 0..np {
                damped[a][a] += lambda * jtj[a][a].max(1e-12);
            }
            let Some(delta) = solve_dense(damped, jtr.clone()) else {
                lambda *= 10.0;
                continue;
            };
            let mut trial = params.clone();
            for a in 0..np {
                trial[a] += delta[a];
            }
            clamp(&mut trial);
            let trial_cost = cost(&trial);
            if trial_cost <= current_cost {
                let improvement = (current_cost - trial_cost) / current_cost.max(1e-300);
                params = trial;
                current_cost = trial_cost;
                lambda = (lambda / 3.0).max(1e-12);
                stepped = true;
                if improvement < 1e-12 {
                    converged = true;
                }
                break;
            }
            lambda *= 10.0;
        }
        if converged {
            break;
        }
        if !stepped {
            // damping exhausted: treat a stagnant but finite solution as converged
            converged = current_cost.is_finite();
            break;
        }
    }

    // parameter standard errors from (J^T J)^-1 * s^2
    let mut errors = vec![f64::NAN; np];
    if n > np {
        let mut jtj = vec![vec![0.0; np]; np];
        for i in 0..n {
            (problem.jacobian)(&params, x[i], &mut jrow);
            for a in 0..np {
                for b in a..np {
                    jtj[a][b] += jrow[a] * jrow[b];
                }
            }
        }
        for a in 0..np {
            for b in 0..a {
                jtj[a][b] = jtj[b][a];
            }
        }
        if let Some(cov) = invert_dense(&jtj) {
            let s2 = current_cost / (n - np) as f64;
            for a in 0..np {
                errors[a] = (cov[a][a] * s2).max(0.0).sqrt();
            }
        }
    }

    LmSolution {
        params,
        errors,
        ssr: current_cost,
        converged,
    }
}

fn gaussian_model(offset_param: bool) -> impl Fn(&[f64], f64) -> f64 {
    move |p: &[f64], x: f64| {
        let (c, peaks) = if offset_param {
            (p[0], &p[1..])
        } else {
            (0.0, p)
        };
        let mut acc = c;
        let mut k = 0;
        while k + 3 <= peaks.len() {
            let (a, mu, sigma) = (peaks[k], peaks[k + 1], peaks[k + 2]);
            acc += a / (sigma * SQRT_TAU) * (-0.5 * ((x - mu) / sigma).powi(2)).exp();
            k += 3;
        }
        acc
    }
}

fn gaussian_jacobian(offset_param: bool) -> impl Fn(&[f64], f64, &mut [f64]) {
    move |p: &[f64], x: f64, out: &mut [f64]| {
        let base = if offset_param {
            out[0] = 1.0;
            1
        } else {
            0
        };
        let mut k = base;
        while k + 3 <= p.len() {
            let (a, mu, sigma) = (p[k], p[k + 1], p[k + 2]);
            let z = (x - mu) / sigma;
            let phi = (-0.5 * z * z).exp() / (sigma * SQRT_TAU);
            out[k] = phi;
            out[k + 1] = a * phi * z / sigma;
            out[k + 2] = a * phi * (z * z - 1.0) / sigma;
            k += 3;
        }
    }
}

fn run_gaussian_lm(
    x: &Array1<f64>,
    y: &Array1<f64>,
    seeds: &[GaussianSeed],
    opts: FitOptions,
) -> Option<(Vec<FittedPeak>, f64, f64, f64)> {
    let x_min = x.iter().cloned().fold(f64::INFINITY, f64::min);
    let x_max = x.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

    let base = usize::from(opts.fit_offset);
    let mut p0 = Vec::with_capacity(base + 3 * seeds.len());
    let mut bounds = Vec::with_capacity(base + 3 * seeds.len());
    if opts.fit_offset {
        p0.push(0.0);
        bounds.push((f64::NEG_INFINITY, f64::INFINITY));
    }
    for seed in seeds {
        let sigma0 = seed.sigma();
        p0.extend_from_slice(&[seed.amplitude(), seed.center, sigma0]);
        bounds.push((0.0, f64::INFINITY));
        bounds.push((x_min, x_max));
        bounds.push((0.5 * sigma0, 2.0 * sigma0));
    }

    let eval = gaussian_model(opts.fit_offset);
    let jac = gaussian_jacobian(opts.fit_offset);
    let problem = LmProblem {
        eval: &eval,
        jacobian: &jac,
    };
    let solution = levenberg_marquardt(x, y, &p0, &bounds, &problem, opts.max_iterations);
    if !solution.converged {
        return None;
    }

    let (offset, offset_err) = if opts.fit_offset {
        (solution.params[0], solution.errors[0])
    } else {
        (0.0, 0.0)
    };
    let mut peaks = Vec::with_capacity(seeds.len());
    for k in 0..seeds.len() {
        let j = base + 3 * k;
        peaks.push(FittedPeak {
            amplitude: solution.params[j],
            center: solution.params[j + 1],
            sigma: solution.params[j + 2],
            amplitude_err: solution.errors[j],
            center_err: solution.errors[j + 1],
            sigma_err: solution.errors[j + 2],
        });
    }
    peaks.sort_by(|a, b| a.center.total_cmp(&b.center));
    Some((peaks, offset, offset_err, solution.ssr))
}

/// Acceptance checks shared by the full fit and the combinatorial fallback:
/// every amplitude above the configured minimum and its own standard error, and
/// adjacent centers separated by more than the sum of their widths.
fn acceptable(peaks: &[FittedPeak], opts: &FitOptions) -> bool {
    for p in peaks {
        if p.amplitude <= opts.min_amplitude {
            return false;
        }
        if p.amplitude_err.is_finite() && p.amplitude <= p.amplitude_err {
            return false;
        }
    }
    for pair in peaks.windows(2) {
        if (pair[1].center - pair[0].center).abs() <= pair[0].sigma + pair[1].sigma {
            return false;
        }
    }
    true
}

fn subsets_of_size(n: usize, m: usize) -> Vec<Vec<usize>> {
    let mut out = Vec::new();
    let mut current = Vec::with_capacity(m);
    fn rec(start: usize, n: usize, m: usize, current: &mut Vec<usize>, out: &mut Vec<Vec<usize>>) {
        if current.len() == m {
            out.push(current.clone());
            return;
        }
        for i in start..n {
            current.push(i);
            rec(i + 1, n, m, current, out);
            current.pop();
        }
    }
    rec(0, n, m, &mut current, &mut out);
    out
}

fn build_fit(
    x: &Array1<f64>,
    y: &Array1<f64>,
    peaks: Vec<FittedPeak>,
    offset: f64,
    offset_err: f64,
) -> PeakFit {
    let y_fit = x.mapv(|xv| offset + peaks.iter().map(|p| p.evaluate(xv)).sum::<f64>());
    let mean = y.mean().unwrap_or(0.0);
    let ss_tot: f64 = y.iter().map(|v| (v - mean).powi(2)).sum();
    let ss_res: f64 = y
        .iter()
        .zip(y_fit.iter())
        .map(|(v, f)| (v - f).powi(2))
        .sum();
    let r_squared = if ss_tot > 0.0 {
        1.0 - ss_res / ss_tot
    } else {
        0.0
    };
    PeakFit {
        peaks,
        offset,
        offset_err,
        r_squared,
        y_fit,
    }
}

/// Fits a sum of bounded Gaussians (plus optional constant offset) to a trace.
///
/// Starts from the full seed set; on solver failure or rejected checks, retries
/// every N−1 subset, then N−2, and so on, keeping the candidate with the lowest
/// L¹ residual at the first level that produces one. A fit whose R² falls below
/// `opts.r2_floor` is reported as `Failed` with the seeds attached.
pub fn fit_gaussians(
    x: &Array1<f64>,
    y: &Array1<f64>,
    seeds: &[GaussianSeed],
    opts: FitOptions,
) -> Result<FitOutcome> {
    if x.is_empty() {
        return Err(SpecError::EmptyInput("fit_gaussians x"));
    }
    SpecError::check_lengths(x.len(), y.len())?;
    if seeds.is_empty() {
        return Ok(FitOutcome::Failed {
            reason: FitFailure::NoSeeds,
            seeds: Vec::new(),
        });
    }

    let l1_residual = |fit: &PeakFit| -> f64 {
        y.iter()
            .zip(fit.y_fit.iter())
            .map(|(a, b)| (a - b).abs())
            .sum()
    };

    let mut chosen: Option<PeakFit> = None;
    for size in (1..=seeds.len()).rev() {
        let mut level_best: Option<(f64, PeakFit)> = None;
        for subset in subsets_of_size(seeds.len(), size) {
            let picked: Vec<GaussianSeed> = subset.iter().map(|&i| seeds[i]).collect();
            let Some((peaks, offset, offset_err, _ssr)) = run_gaussian_lm(x, y, &picked, opts)
            else {
                continue;
            };
            if !acceptable(&peaks, &opts) {
                continue;
            }
            let fit = build_fit(x, y, peaks, offset, offset_err);
            let l1 = l1_residual(&fit);
            match &level_best {
                Some((best_l1, _)) if *best_l1 <= l1 => {}
                _ => level_best = Some((l1, fit)),
            }
        }
        if let Some((_, fit)) = level_best {
            chosen = Some(fit);
            break;
        }
        log::debug!("fit_gaussians: no acceptable fit with {size} peaks, reducing");
    }

    let Some(fit) = chosen else {
        return Ok(FitOutcome::Failed {
            reason: FitFailure::NoConvergence,
            seeds: seeds.to_vec(),
        });
    };

    if fit.r_squared < opts.r2_floor {
        log::warn!(
            "fit_gaussians: fit rejected, R^2 = {:.3} below floor {:.3}",
            fit.r_squared,
            opts.r2_floor
        );
        return Ok(FitOutcome::Failed {
            reason: FitFailure::LowRSquared(fit.r_squared),
            seeds: seeds.to_vec(),
        });
    }
    Ok(FitOutcome::Converged(fit))
}

/// A fitted single Lorentzian `I·γ²/((x−x₀)² + γ²)` plus constant offset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LorentzianFit {
    pub height: f64,
    pub center: f64,
    /// Half width at half maximum.
    pub gamma: f64,
    pub offset: f64,
    pub height_err: f64,
    pub center_err: f64,
    pub gamma_err: f64,
    pub r_squared: f64,
}

/// Fits a single Lorentzian with bounds analogous to the Gaussian fit:
/// `I ≥ 0`, center inside the x range, `γ` within a factor 2 of its guess.
pub fn fit_lorentzian(
    x: &Array1<f64>,
    y: &Array1<f64>,
    height0: f64,
    center0: f64,
    gamma0: f64,
    opts: FitOptions,
) -> Result<Option<LorentzianFit>> {
    if x.is_empty() {
        return Err(SpecError::EmptyInput("fit_lorentzian x"));
    }
    SpecError::check_lengths(x.len(), y.len())?;
    if !(gamma0 > 0.0) {
        return Err(SpecError::InvalidParameter {
            name: "gamma0",
            value: gamma0,
        });
    }

    let x_min = x.iter().cloned().fold(f64::INFINITY, f64::min);
    let x_max = x.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let p0 = [0.0, height0, center0, gamma0];
    let bounds = [
        (f64::NEG_INFINITY, f64::INFINITY),
        (0.0, f64::INFINITY),
        (x_min, x_max),
        (0.5 * gamma0, 2.0 * gamma0),
    ];

    let eval = |p: &[f64], xv: f64| -> f64 {
        let g2 = p[3] * p[3];
        p[0] + p[1] * g2 / ((xv - p[2]).powi(2) + g2)
    };
    let jac = |p: &[f64], xv: f64, out: &mut [f64]| {
        let d = xv - p[2];
        let g = p[3];
        let g2 = g * g;
        let denom = d * d + g2;
        out[0] = 1.0;
        out[1] = g2 / denom;
        out[2] = p[1] * g2 * 2.0 * d / (denom * denom);
        out[3] = p[1] * 2.0 * g * d * d / (denom * denom);
    };
    let problem = LmProblem {
        eval: &eval,
        jacobian: &jac,
    };
    let solution = levenberg_marquardt(x, y, &p0, &bounds, &problem, opts.max_iterations);
    if !solution.converged {
        return Ok(None);
    }

    let y_fit = x.mapv(|xv| eval(&solution.params, xv));
    let mean = y.mean().unwrap_or(0.0);
    let ss_tot: f64 = y.iter().map(|v| (v - mean).powi(2)).sum();
    let ss_res: f64 = y
        .iter()
        .zip(y_fit.iter())
        .map(|(v, f)| (v - f).powi(2))
        .sum();

    Ok(Some(LorentzianFit {
        offset: solution.params[0],
        height: solution.params[1],
        center: solution.params[2],
        gamma: solution.params[3],
        height_err: solution.errors[1],
        center_err: solution.errors[2],
        gamma_err: solution.errors[3],
        r_squared: if ss_tot > 0.0 { 1.0 - ss_res / ss_tot } else { 0.0 },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math_tools::width_from_sigma;
    use crate::peaks::seed::{approx_peak_gausses, SeedOptions};
    use approx::assert_relative_eq;

    fn gauss(x: f64, a: f64, mu: f64, sigma: f64) -> f64 {
        a * (-0.5 * ((x - mu) / sigma).powi(2)).exp()
    }

    fn lcg_noise(n: usize, seed: u64, scale: f64) -> Vec<f64> {
        let mut state = seed;
        (0..n)
            .map(|_| {
                state = state
                    .wrapping_mul(6364136223846793005)
                    .wrapping_add(1442695040888963407);
                (((state >> 33) as f64 / (1u64 << 31) as f64) - 0.5) * scale
            })
            .collect()
    }

    #[test]
    fn dense_solver_handles_pivoting() {
        // first pivot is zero; must swap rows
        let a = vec![vec![0.0, 2.0], vec![3.0, 1.0]];
        let x = solve_dense(a, vec![4.0, 5.0]).unwrap();
        assert_relative_eq!(x[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(x[1], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn seed_and_fit_recover_triple() {
        // scenario: g(1, 300, 5) + g(0.6, 320, 7) + g(0.2, 380, 10) + noise
        let x = Array1::linspace(0.0, 500.0, 1001);
        let noise = lcg_noise(x.len(), 7, 0.01);
        let y = Array1::from_iter(x.iter().enumerate().map(|(i, &v)| {
            gauss(v, 1.0, 300.0, 5.0)
                + gauss(v, 0.6, 320.0, 7.0)
                + gauss(v, 0.2, 380.0, 10.0)
                + noise[i]
        }));

        let seeds = approx_peak_gausses(&x, &y, SeedOptions::default()).unwrap();
        assert!(seeds.len() >= 3, "expected 3 seeds, got {}", seeds.len());

        let outcome = fit_gaussians(&x, &y, &seeds, FitOptions::default()).unwrap();
        let fit = outcome.fit().expect("fit should converge");
        assert!(fit.r_squared > 0.97);

        for &truth in &[300.0, 320.0, 380.0] {
            let matched = fit
                .peaks
                .iter()
                .find(|p| (p.center - truth).abs() <= 0.5)
                .unwrap_or_else(|| panic!("no fitted peak near {truth}"));
            assert!(matched.amplitude > 0.0);
        }
    }

    #[test]
    fn single_peak_parameters_are_accurate() {
        let x = Array1::linspace(0.0, 200.0, 801);
        let y = x.mapv(|v| gauss(v, 2.0, 100.0, 6.0) + 0.5);
        let seeds = approx_peak_gausses(&x, &y.mapv(|v| v - 0.5), SeedOptions::default()).unwrap();
        let outcome = fit_gaussians(&x, &y, &seeds, FitOptions::default()).unwrap();
        let fit = outcome.fit().unwrap();
        assert_eq!(fit.peaks.len(), 1);
        let p = fit.peaks[0];
        assert_relative_eq!(p.center, 100.0, epsilon = 0.05);
        assert_relative_eq!(p.sigma, 6.0, max_relative = 0.02);
        assert_relative_eq!(p.height(), 2.0, max_relative = 0.02);
        assert_relative_eq!(fit.offset, 0.5, epsilon = 0.01);
        assert_relative_eq!(
            p.width_at_frac(0.5),
            width_from_sigma(6.0, 0.5),
            max_relative = 0.02
        );
    }

    #[test]
    fn overlapping_seeds_are_reduced_to_one_peak() {
        // one true peak, two nearly identical seeds: the separation check rejects
        // the doublet and the fallback settles on a single broader peak
        let x = Array1::linspace(0.0, 200.0, 801);
        let y = x.mapv(|v| gauss(v, 1.0, 100.0, 8.0));
        let seeds = vec![
            GaussianSeed {
                height: 0.9,
                center: 98.0,
                width: width_from_sigma(8.0, 0.5),
                height_frac: 0.5,
            },
            GaussianSeed {
                height: 0.9,
                center: 102.0,
                width: width_from_sigma(8.0, 0.5),
                height_frac: 0.5,
            },
        ];
        let outcome = fit_gaussians(&x, &y, &seeds, FitOptions::default()).unwrap();
        let fit = outcome.fit().expect("fallback should converge");
        assert_eq!(fit.peaks.len(), 1);
        assert_relative_eq!(fit.peaks[0].center, 100.0, epsilon = 0.5);
    }

    #[test]
    fn hopeless_fit_reports_failure_with_seeds() {
        // seeds nowhere near the data: the fitted model cannot reach the floor
        let x = Array1::linspace(0.0, 100.0, 401);
        let y = x.mapv(|v: f64| (v / 5.0).sin().abs() + 0.5);
        let seeds = vec![GaussianSeed {
            height: 0.1,
            center: 50.0,
            width: 2.0,
            height_frac: 0.5,
        }];
        let outcome = fit_gaussians(&x, &y, &seeds, FitOptions::default()).unwrap();
        match outcome {
            FitOutcome::Failed { reason, seeds } => {
                assert_eq!(seeds.len(), 1);
                assert!(matches!(reason, FitFailure::LowRSquared(_) | FitFailure::NoConvergence));
            }
            FitOutcome::Converged(fit) => panic!("unexpected convergence, R^2 {}", fit.r_squared),
        }
    }

    #[test]
    fn no_seeds_reports_failure() {
        let x = Array1::linspace(0.0, 10.0, 11);
        let y = Array1::zeros(11);
        let outcome = fit_gaussians(&x, &y, &[], FitOptions::default()).unwrap();
        assert!(matches!(
            outcome,
            FitOutcome::Failed {
                reason: FitFailure::NoSeeds,
                ..
            }
        ));
    }

    #[test]
    fn lorentzian_fit_recovers_parameters() {
        let x = Array1::linspace(1400.0, 1700.0, 601);
        let y = x.mapv(|v| crate::math_tools::lorentzian(v, 2.4, 1550.0, 40.0) + 0.2);
        let fit = fit_lorentzian(&x, &y, 2.0, 1545.0, 22.0, FitOptions::default())
            .unwrap()
            .expect("should converge");
        assert_relative_eq!(fit.center, 1550.0, epsilon = 0.5);
        assert_relative_eq!(fit.height, 2.4, max_relative = 0.05);
        // gamma is the HWHM: fwhm 40 -> gamma 20
        assert_relative_eq!(fit.gamma, 20.0, max_relative = 0.05);
        assert_relative_eq!(fit.offset, 0.2, epsilon = 0.02);
        assert!(fit.r_squared > 0.99);
    }

    #[test]
    fn lorentzian_rejects_bad_width_guess() {
        let x = Array1::linspace(0.0, 10.0, 11);
        let y = Array1::zeros(11);
        assert!(fit_lorentzian(&x, &y, 1.0, 5.0, 0.0, FitOptions::default()).is_err());
    }
}
