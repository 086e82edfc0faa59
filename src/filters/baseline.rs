//! Iterative asymmetric least-squares (ALS) baseline estimation.
//!
//! For a signal `y` of length `L`, the baseline `z` minimises
//! `Σ wᵢ (yᵢ − zᵢ)² + λ Σ (Δ²z)ᵢ²`, where the second-difference penalty enforces
//! smoothness and the weights are updated asymmetrically each iteration
//! (`w = p` above the baseline, `1 − p` below). The normal matrix
//! `W + λ·DᵀD` is pentadiagonal, so it is stored as its three unique diagonals
//! and solved with a banded LDLᵀ factorization — never densified.
//!
//! Typical tunables: `lam` in 10² – 10⁹, `p` in 10⁻³ – 10⁻¹.

use crate::error::{Result, SpecError};
use crate::math_tools::remove_nans;
use cancellable_loops::par_map_cancellable;
use ndarray::Array1;
use std::sync::atomic::AtomicBool;

/// Second-difference penalty diagonals of `DᵀD` for a signal of length `l`.
///
/// Returns `(c0, c1, c2)`: main, first and second off-diagonal.
fn second_difference_diagonals(l: usize) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let mut c0 = vec![0.0; l];
    let mut c1 = vec![0.0; l.saturating_sub(1)];
    let mut c2 = vec![0.0; l.saturating_sub(2)];
    for k in 0..l.saturating_sub(2) {
        c0[k] += 1.0;
        c0[k + 1] += 4.0;
        c0[k + 2] += 1.0;
        c1[k] += -2.0;
        c1[k + 1] += -2.0;
        c2[k] += 1.0;
    }
    (c0, c1, c2)
}

/// Solves the symmetric pentadiagonal system given by its diagonals via LDLᵀ.
///
/// `d0` is the main diagonal, `d1[i] = M[i+1][i]`, `d2[i] = M[i+2][i]`.
fn solve_pentadiagonal(d0: &[f64], d1: &[f64], d2: &[f64], rhs: &[f64]) -> Vec<f64> {
    let n = d0.len();
    let mut diag = vec![0.0; n]; // D of LDL^T
    let mut l1 = vec![0.0; n]; // L[i][i-1]
    let mut l2 = vec![0.0; n]; // L[i][i-2]

    for i in 0..n {
        if i >= 2 {
            l2[i] = d2[i - 2] / diag[i - 2];
        }
        if i >= 1 {
            let mut v = d1[i - 1];
            if i >= 2 {
                v -= l2[i] * l1[i - 1] * diag[i - 2];
            }
            l1[i] = v / diag[i - 1];
        }
        let mut v = d0[i];
        if i >= 1 {
            v -= l1[i] * l1[i] * diag[i - 1];
        }
        if i >= 2 {
            v -= l2[i] * l2[i] * diag[i - 2];
        }
        diag[i] = v;
    }

    // forward: L v = rhs
    let mut v = vec![0.0; n];
    for i in 0..n {
        let mut s = rhs[i];
        if i >= 1 {
            s -= l1[i] * v[i - 1];
        }
        if i >= 2 {
            s -= l2[i] * v[i - 2];
        }
        v[i] = s;
    }
    // diagonal
    for i in 0..n {
        v[i] /= diag[i];
    }
    // backward: L^T z = v
    let mut z = vec![0.0; n];
    for i in (0..n).rev() {
        let mut s = v[i];
        if i + 1 < n {
            s -= l1[i + 1] * z[i + 1];
        }
        if i + 2 < n {
            s -= l2[i + 2] * z[i + 2];
        }
        z[i] = s;
    }
    z
}

fn validate_als_params(lam: f64, p: f64) -> Result<()> {
    if !(p > 0.0 && p < 1.0) {
        return Err(SpecError::InvalidParameter { name: "p", value: p });
    }
    if !(lam > 0.0) {
        return Err(SpecError::InvalidParameter {
            name: "lam",
            value: lam,
        });
    }
    Ok(())
}

fn baseline_als_unchecked(y: &Array1<f64>, lam: f64, p: f64, niter: usize) -> Array1<f64> {
    let l = y.len();
    if l < 3 {
        return y.clone();
    }

    let y = if y.iter().any(|v| !v.is_finite()) {
        log::warn!("baseline_als: input contains NaNs, repairing before solve");
        remove_nans(y)
    } else {
        y.clone()
    };

    let (c0, c1, c2) = second_difference_diagonals(l);
    let d1: Vec<f64> = c1.iter().map(|v| lam * v).collect();
    let d2: Vec<f64> = c2.iter().map(|v| lam * v).collect();

    let mut w = vec![1.0; l];
    let mut z = vec![0.0; l];

    for _ in 0..niter {
        let d0: Vec<f64> = (0..l).map(|i| w[i] + lam * c0[i]).collect();
        let rhs: Vec<f64> = (0..l).map(|i| w[i] * y[i]).collect();
        z = solve_pentadiagonal(&d0, &d1, &d2, &rhs);
        for i in 0..l {
            w[i] = if y[i] > z[i] { p } else { 1.0 - p };
        }
    }

    Array1::from_vec(z)
}

/// Calculates a spectral baseline using iterative asymmetric least-squares fitting.
///
/// # Arguments
/// - `y`: signal to be baselined.
/// - `lam`: smoothness weight; larger values give stiffer baselines (typical 10² – 10⁹).
/// - `p`: asymmetry, `0 < p < 1`; smaller values hug the signal from below
///   (typical 10⁻³ – 10⁻¹).
/// - `niter`: number of reweighting iterations.
///
/// # Returns
/// The baseline `z`, same length as `y`. Inputs containing NaN are repaired by
/// linear interpolation before solving (with a warning).
pub fn baseline_als(y: &Array1<f64>, lam: f64, p: f64, niter: usize) -> Result<Array1<f64>> {
    if y.is_empty() {
        return Err(SpecError::EmptyInput("baseline_als y"));
    }
    validate_als_params(lam, p)?;
    Ok(baseline_als_unchecked(y, lam, p, niter))
}

/// ALS baseline for spectra with a spectral notch.
///
/// The spectrum is split at the notch bounds (in x units): the segments below and
/// above the notch are baselined independently and the segment inside the notch is
/// passed through unchanged, so `y − z` vanishes there.
///
/// # Arguments
/// - `x`: x axis (wavelengths or wavenumbers), same length as `y`.
/// - `y`: signal to be baselined.
/// - `lam`, `p`, `niter`: as for [`baseline_als`].
/// - `notch`: `(low, high)` bounds of the notch window in x units.
pub fn baseline_als_notch(
    x: &Array1<f64>,
    y: &Array1<f64>,
    lam: f64,
    p: f64,
    niter: usize,
    notch: (f64, f64),
) -> Result<Array1<f64>> {
    if y.is_empty() {
        return Err(SpecError::EmptyInput("baseline_als_notch y"));
    }
    SpecError::check_lengths(x.len(), y.len())?;
    validate_als_params(lam, p)?;

    let (lo, hi) = notch;
    let below: Vec<usize> = (0..x.len()).filter(|&i| x[i] < lo).collect();
    let inside: Vec<usize> = (0..x.len()).filter(|&i| x[i] >= lo && x[i] <= hi).collect();
    let above: Vec<usize> = (0..x.len()).filter(|&i| x[i] > hi).collect();

    let mut z = Array1::zeros(y.len());
    for segment in [&below, &above] {
        if segment.is_empty() {
            continue;
        }
        let seg_y = Array1::from_iter(segment.iter().map(|&i| y[i]));
        let seg_z = baseline_als_unchecked(&seg_y, lam, p, niter);
        for (j, &i) in segment.iter().enumerate() {
            z[i] = seg_z[j];
        }
    }
    for &i in &inside {
        z[i] = y[i];
    }
    Ok(z)
}

/// Batch ALS over many independent spectra on the Rayon thread pool.
///
/// Each worker baselines one spectrum; raising `abort_flag` skips the remaining
/// inputs. The output has the same length and ordering as the input, with `None`
/// for spectra that were skipped.
pub fn baseline_als_batch(
    spectra: &[Array1<f64>],
    lam: f64,
    p: f64,
    niter: usize,
    abort_flag: &AtomicBool,
) -> Result<Vec<Option<Array1<f64>>>> {
    validate_als_params(lam, p)?;
    for y in spectra {
        if y.is_empty() {
            return Err(SpecError::EmptyInput("baseline_als_batch spectrum"));
        }
    }
    Ok(par_map_cancellable(spectra, abort_flag, |y| {
        baseline_als_unchecked(y, lam, p, niter)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::sync::atomic::AtomicBool;

    fn tilted_gaussian() -> Array1<f64> {
        let x = Array1::linspace(0.0, 1000.0, 1001);
        x.mapv(|v| 0.01 * v + 10.0 * (-0.5 * ((v - 500.0) / 20.0_f64).powi(2)).exp())
    }

    #[test]
    fn pentadiagonal_solver_recovers_known_solution() {
        // M = I + D^T D for a small system, checked against a hand-multiplied M z
        let l = 6;
        let (c0, c1, c2) = second_difference_diagonals(l);
        let d0: Vec<f64> = c0.iter().map(|v| 1.0 + v).collect();
        let z_true = [1.0, -2.0, 0.5, 3.0, -1.0, 2.0];

        // rhs = M * z_true
        let mut rhs = vec![0.0; l];
        for i in 0..l {
            rhs[i] += d0[i] * z_true[i];
            if i + 1 < l {
                rhs[i] += c1[i] * z_true[i + 1];
                rhs[i + 1] += c1[i] * z_true[i];
            }
            if i + 2 < l {
                rhs[i] += c2[i] * z_true[i + 2];
                rhs[i + 2] += c2[i] * z_true[i];
            }
        }

        let z = solve_pentadiagonal(&d0, &c1, &c2, &rhs);
        for i in 0..l {
            assert_relative_eq!(z[i], z_true[i], epsilon = 1e-10);
        }
    }

    #[test]
    fn als_rejects_bad_asymmetry() {
        let y = Array1::ones(10);
        assert!(baseline_als(&y, 1e4, 0.0, 10).is_err());
        assert!(baseline_als(&y, 1e4, 1.0, 10).is_err());
        assert!(baseline_als(&y, -1.0, 0.5, 10).is_err());
    }

    #[test]
    fn als_rejects_empty_input() {
        let y = Array1::zeros(0);
        assert_eq!(
            baseline_als(&y, 1e4, 1e-3, 10),
            Err(SpecError::EmptyInput("baseline_als y"))
        );
    }

    #[test]
    fn als_tracks_constant_signal() {
        let y = Array1::from_elem(64, 5.0);
        let z = baseline_als(&y, 1e4, 1e-3, 10).unwrap();
        for v in z.iter() {
            assert_relative_eq!(*v, 5.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn als_on_tilted_gaussian() {
        let y = tilted_gaussian();
        let z = baseline_als(&y, 1e4, 1e-3, 10).unwrap();

        let y_max = y.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        assert!(z[500] <= 0.5 * y_max, "baseline climbed into the peak");

        // the baselined signal must peak at the true centre
        let baselined = &y - &z;
        let argmax = baselined
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert!((argmax as i64 - 500).abs() <= 1);
    }

    #[test]
    fn als_stays_below_signal_at_most_points() {
        let y = tilted_gaussian();
        let p = 1e-3;
        let z = baseline_als(&y, 1e4, p, 10).unwrap();
        let below = y.iter().zip(z.iter()).filter(|(y, z)| z <= y).count();
        let frac = below as f64 / y.len() as f64;
        assert!(frac > 0.9, "baseline above signal too often: {frac}");
    }

    #[test]
    fn als_repairs_nan_input() {
        let mut y = tilted_gaussian();
        y[123] = f64::NAN;
        let z = baseline_als(&y, 1e4, 1e-3, 10).unwrap();
        assert!(z.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn notch_segment_passes_through() {
        let x = Array1::linspace(0.0, 100.0, 101);
        let y = x.mapv(|v: f64| 1.0 + (v / 10.0).sin());
        let z = baseline_als_notch(&x, &y, 1e3, 1e-2, 10, (40.0, 60.0)).unwrap();
        for i in 0..x.len() {
            if x[i] >= 40.0 && x[i] <= 60.0 {
                assert_relative_eq!(z[i], y[i], epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn batch_matches_single() {
        let y = tilted_gaussian();
        let abort = AtomicBool::new(false);
        let batch = baseline_als_batch(&[y.clone(), y.clone()], 1e4, 1e-3, 10, &abort).unwrap();
        let single = baseline_als(&y, 1e4, 1e-3, 10).unwrap();
        for out in batch {
            let out = out.expect("no abort requested");
            for i in 0..y.len() {
                assert_relative_eq!(out[i], single[i], epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn batch_abort_skips_everything() {
        let y = Array1::ones(16);
        let abort = AtomicBool::new(true);
        let batch = baseline_als_batch(&[y.clone(), y], 1e4, 1e-3, 5, &abort).unwrap();
        assert!(batch.iter().all(|o| o.is_none()));
    }
}
