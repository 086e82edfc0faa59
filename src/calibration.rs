//! Spectral calibration: polynomial x-axis re-mapping against literature peak
//! positions, and the white-light reciprocal efficiency curve for intensity
//! correction.
//!
//! X-axis calibration fits `p(measured) ≈ literature` by least squares and maps
//! the working axis through `p`; the caller judges the reported R². The
//! efficiency curve divides a dark-subtracted white-light measurement by the
//! lamp's literature emission (cubic-spline resampled onto the target grid) and
//! normalizes the quotient to a maximum of one; spectra divided by this curve are
//! flat where the instrument is flat.

use crate::error::{Result, SpecError};
use crate::math_tools::solve_dense;
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// A polynomial with coefficients stored lowest-degree first.
///
/// The ordering is explicit to avoid the classic highest-first confusion when
/// exchanging coefficients with other tooling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polynomial {
    pub coeffs: Vec<f64>,
}

impl Polynomial {
    pub fn degree(&self) -> usize {
        self.coeffs.len().saturating_sub(1)
    }

    /// Horner evaluation.
    pub fn evaluate(&self, x: f64) -> f64 {
        self.coeffs.iter().rev().fold(0.0, |acc, &c| acc * x + c)
    }

    /// Evaluates the polynomial over an array.
    pub fn evaluate_arr(&self, x: &Array1<f64>) -> Array1<f64> {
        x.mapv(|v| self.evaluate(v))
    }
}

/// Least-squares polynomial fit of degree `deg` through `(xs, ys)`.
///
/// The abscissa is centred and scaled internally before the normal-equation
/// solve, so nm- or cm⁻¹-scale axes stay well-conditioned up to degree 3; the
/// returned coefficients are in the original x units.
pub fn polyfit(xs: &[f64], ys: &[f64], deg: usize) -> Result<Polynomial> {
    SpecError::check_lengths(xs.len(), ys.len())?;
    if xs.is_empty() {
        return Err(SpecError::EmptyInput("polyfit xs"));
    }
    if xs.len() < deg + 1 {
        return Err(SpecError::InvalidParameter {
            name: "deg",
            value: deg as f64,
        });
    }

    let mu = xs.iter().sum::<f64>() / xs.len() as f64;
    let spread = xs
        .iter()
        .map(|&x| (x - mu).abs())
        .fold(f64::NEG_INFINITY, f64::max)
        .max(1.0);

    // normal equations on the Vandermonde system in scaled coordinates
    let np = deg + 1;
    let mut a = vec![vec![0.0; np]; np];
    let mut b = vec![0.0; np];
    for (&x, &y) in xs.iter().zip(ys.iter()) {
        let t = (x - mu) / spread;
        let mut powers = vec![1.0; 2 * np - 1];
        for i in 1..2 * np - 1 {
            powers[i] = powers[i - 1] * t;
        }
        for i in 0..np {
            b[i] += powers[i] * y;
            for j in 0..np {
                a[i][j] += powers[i + j];
            }
        }
    }

    let scaled = solve_dense(a, b).ok_or(SpecError::InvalidParameter {
        name: "polyfit matrix",
        value: f64::NAN,
    })?;

    // expand p(t) with t = (x - mu)/spread back into coefficients of x
    let shift = [-mu / spread, 1.0 / spread]; // t as a polynomial in x
    let mut coeffs = vec![0.0; np];
    let mut t_power = vec![1.0]; // t^0
    for (k, &c) in scaled.iter().enumerate() {
        for (i, &tc) in t_power.iter().enumerate() {
            coeffs[i] += c * tc;
        }
        if k + 1 < np {
            // t_power <- t_power * shift
            let mut next = vec![0.0; t_power.len() + 1];
            for (i, &tc) in t_power.iter().enumerate() {
                next[i] += tc * shift[0];
                next[i + 1] += tc * shift[1];
            }
            t_power = next;
        }
    }
    Ok(Polynomial { coeffs })
}

/// Result of an x-axis calibration fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XAxisCalibration {
    pub poly: Polynomial,
    /// R² of the peak-position fit; the caller decides whether to accept.
    pub r_squared: f64,
    /// Set when `r_squared` fell below the configured floor.
    pub low_confidence: bool,
}

impl XAxisCalibration {
    /// Maps an x axis through the calibration polynomial.
    pub fn apply(&self, x: &Array1<f64>) -> Array1<f64> {
        self.poly.evaluate_arr(x)
    }
}

/// Fits the x-axis calibration polynomial `p(measured) ≈ literature`.
///
/// The two peak lists must be matched in identical order (use
/// [`find_closest_matches`] when the measured list is longer). The calibration is
/// always returned; when its R² falls below `r2_floor` it is flagged as
/// low-confidence and a warning is logged.
pub fn calibrate_x_axis(
    measured_peaks: &[f64],
    literature_peaks: &[f64],
    deg: usize,
    r2_floor: f64,
) -> Result<XAxisCalibration> {
    SpecError::check_lengths(measured_peaks.len(), literature_peaks.len())?;
    let poly = polyfit(measured_peaks, literature_peaks, deg)?;

    let mean = literature_peaks.iter().sum::<f64>() / literature_peaks.len() as f64;
    let ss_tot: f64 = literature_peaks.iter().map(|v| (v - mean).powi(2)).sum();
    let ss_res: f64 = measured_peaks
        .iter()
        .zip(literature_peaks.iter())
        .map(|(&m, &l)| (l - poly.evaluate(m)).powi(2))
        .sum();
    let r_squared = if ss_tot > 0.0 {
        1.0 - ss_res / ss_tot
    } else {
        1.0
    };

    let low_confidence = r_squared < r2_floor;
    if low_confidence {
        log::warn!(
            "calibrate_x_axis: low-confidence calibration, R^2 = {r_squared:.4} < {r2_floor:.4}"
        );
    }
    Ok(XAxisCalibration {
        poly,
        r_squared,
        low_confidence,
    })
}

/// Nearest-neighbour peak matching: for each literature peak, picks the closest
/// measured peak not already taken. The output is ordered like `literature`.
pub fn find_closest_matches(literature: &[f64], measured: &[f64]) -> Vec<f64> {
    let mut matches: Vec<f64> = Vec::with_capacity(literature.len());
    for &lit in literature {
        let mut best: Option<f64> = None;
        for &m in measured {
            if matches.iter().any(|&taken| taken == m) {
                continue;
            }
            match best {
                Some(b) if (b - lit).abs() <= (m - lit).abs() => {}
                _ => best = Some(m),
            }
        }
        if let Some(b) = best {
            matches.push(b);
        }
    }
    matches
}

/// A natural cubic spline interpolator for resampling literature curves.
///
/// Construction runs the tridiagonal second-derivative sweep; evaluation is a
/// binary segment search. Points outside the knot range extrapolate with the
/// boundary polynomial.
#[derive(Debug, Clone)]
pub struct CubicSpline {
    xs: Vec<f64>,
    ys: Vec<f64>,
    y2s: Vec<f64>,
}

impl CubicSpline {
    /// Builds a spline over strictly increasing knots.
    pub fn new(xs: Vec<f64>, ys: Vec<f64>) -> Result<Self> {
        SpecError::check_lengths(xs.len(), ys.len())?;
        if xs.len() < 2 {
            return Err(SpecError::EmptyInput("CubicSpline knots"));
        }
        for i in 1..xs.len() {
            if xs[i] <= xs[i - 1] {
                return Err(SpecError::InvalidParameter {
                    name: "spline knots",
                    value: xs[i],
                });
            }
        }

        let n = xs.len();
        let mut y2s = vec![0.0; n];
        let mut u = vec![0.0; n - 1];

        for i in 1..n - 1 {
            let sig = (xs[i] - xs[i - 1]) / (xs[i + 1] - xs[i - 1]);
            let p = sig * y2s[i - 1] + 2.0;
            y2s[i] = (sig - 1.0) / p;
            u[i] = (ys[i + 1] - ys[i]) / (xs[i + 1] - xs[i])
                - (ys[i] - ys[i - 1]) / (xs[i] - xs[i - 1]);
            u[i] = (6.0 * u[i] / (xs[i + 1] - xs[i - 1]) - sig * u[i - 1]) / p;
        }
        for k in (0..n - 2).rev() {
            y2s[k + 1] = y2s[k + 1] * y2s[k + 2] + u[k + 1];
        }

        Ok(CubicSpline { xs, ys, y2s })
    }

    /// Evaluates the spline at `x`.
    pub fn evaluate(&self, x: f64) -> f64 {
        let n = self.xs.len();
        let mut lo = 0;
        let mut hi = n - 1;
        while hi - lo > 1 {
            let mid = (lo + hi) / 2;
            if self.xs[mid] > x {
                hi = mid;
            } else {
                lo = mid;
            }
        }
        let h = self.xs[hi] - self.xs[lo];
        let a = (self.xs[hi] - x) / h;
        let b = (x - self.xs[lo]) / h;
        a * self.ys[lo]
            + b * self.ys[hi]
            + ((a * a * a - a) * self.y2s[lo] + (b * b * b - b) * self.y2s[hi]) * (h * h) / 6.0
    }
}

/// Calculates the instrument response curve `R_setup` from a white-light
/// reference measurement and the lamp's literature emission.
///
/// `R(λ) = (W(λ) − D) / Ê(λ)`, normalized to `max R = 1`, where `Ê` is the
/// literature emission resampled onto the target grid with a cubic spline.
/// Wavelengths where `Ê ≤ 0` (or the quotient is non-finite) are masked as NaN;
/// inside the optional notch window `R` is overridden to 1 to avoid division
/// instability. Intensity-calibrated spectra are then
/// `(raw − dark) / (R · power · exposure)`.
///
/// # Arguments
/// - `wl`: target wavelength grid (nm).
/// - `white_scatter`: measured white-light counts on `wl`.
/// - `white_bkg`: dark offset, typically the mean counts in the notch region
///   (see [`notch_dark_counts`]).
/// - `lamp_wl`, `lamp_emission`: literature lamp emission samples.
/// - `notch`: optional `(low, high)` notch window in nm.
pub fn white_scatter_calibration(
    wl: &Array1<f64>,
    white_scatter: &Array1<f64>,
    white_bkg: f64,
    lamp_wl: &[f64],
    lamp_emission: &[f64],
    notch: Option<(f64, f64)>,
) -> Result<Array1<f64>> {
    if wl.is_empty() {
        return Err(SpecError::EmptyInput("white_scatter_calibration wl"));
    }
    SpecError::check_lengths(wl.len(), white_scatter.len())?;

    let spline = CubicSpline::new(lamp_wl.to_vec(), lamp_emission.to_vec())?;
    let emission = wl.mapv(|v| spline.evaluate(v));

    let mut r = Array1::zeros(wl.len());
    let mut masked = 0usize;
    for i in 0..wl.len() {
        if emission[i] > 0.0 {
            r[i] = (white_scatter[i] - white_bkg) / emission[i];
        } else {
            r[i] = f64::NAN;
            masked += 1;
        }
    }

    let r_max = r.iter().cloned().filter(|v| v.is_finite()).fold(f64::NEG_INFINITY, f64::max);
    if !r_max.is_finite() || r_max <= 0.0 {
        return Err(SpecError::InvalidParameter {
            name: "white_scatter",
            value: r_max,
        });
    }
    r.mapv_inplace(|v| {
        let n = v / r_max;
        if n.is_finite() {
            n
        } else {
            f64::NAN
        }
    });

    if let Some((lo, hi)) = notch {
        for i in 0..wl.len() {
            if wl[i] >= lo && wl[i] <= hi {
                r[i] = 1.0;
            }
        }
    }

    if masked > 0 {
        log::warn!(
            "white_scatter_calibration: masked {masked} wavelengths with non-positive lamp emission"
        );
    }
    Ok(r)
}

/// Mean counts inside the notch window of a spectrum, used as the dark offset
/// for [`white_scatter_calibration`].
pub fn notch_dark_counts(x: &Array1<f64>, y: &Array1<f64>, notch: (f64, f64)) -> Result<f64> {
    SpecError::check_lengths(x.len(), y.len())?;
    let values: Vec<f64> = x
        .iter()
        .zip(y.iter())
        .filter(|(x, _)| **x >= notch.0 && **x <= notch.1)
        .map(|(_, y)| *y)
        .collect();
    SpecError::check_non_empty(&values, "notch window")?;
    Ok(values.iter().sum::<f64>() / values.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn horner_matches_direct_evaluation() {
        let p = Polynomial {
            coeffs: vec![1.0, -2.0, 0.5],
        };
        for &x in &[-3.0, 0.0, 2.5] {
            assert_relative_eq!(p.evaluate(x), 1.0 - 2.0 * x + 0.5 * x * x, epsilon = 1e-12);
        }
    }

    #[test]
    fn polyfit_recovers_exact_polynomial() {
        // literature = p_true(measured) for a degree-2 map: the fit must recover
        // p_true to machine precision
        let p_true = Polynomial {
            coeffs: vec![12.0, 0.98, 1.5e-5],
        };
        let measured: Vec<f64> = vec![400.0, 650.0, 900.0, 1150.0, 1400.0];
        let literature: Vec<f64> = measured.iter().map(|&m| p_true.evaluate(m)).collect();

        for deg in [2usize, 3] {
            let fit = polyfit(&measured, &literature, deg).unwrap();
            for &m in &measured {
                assert_relative_eq!(fit.evaluate(m), p_true.evaluate(m), max_relative = 1e-9);
            }
        }
    }

    #[test]
    fn polyfit_needs_enough_points() {
        assert!(polyfit(&[1.0, 2.0], &[1.0, 2.0], 2).is_err());
        assert!(polyfit(&[], &[], 0).is_err());
    }

    #[test]
    fn calibration_is_exact_for_polynomial_distortion() {
        let p_true = Polynomial {
            coeffs: vec![-35.0, 1.02, 3.0e-6],
        };
        let measured: Vec<f64> = vec![520.0, 760.0, 1010.0, 1290.0, 1580.0, 1620.0];
        let literature: Vec<f64> = measured.iter().map(|&m| p_true.evaluate(m)).collect();

        let cal = calibrate_x_axis(&measured, &literature, 2, 0.99).unwrap();
        assert!(!cal.low_confidence);
        assert_relative_eq!(cal.r_squared, 1.0, epsilon = 1e-9);

        let x = Array1::linspace(500.0, 1700.0, 200);
        let x_cal = cal.apply(&x);
        for i in 0..x.len() {
            assert_relative_eq!(x_cal[i], p_true.evaluate(x[i]), max_relative = 1e-9);
        }
    }

    #[test]
    fn noisy_calibration_is_flagged_low_confidence() {
        // scrambled targets cannot be captured by a smooth polynomial
        let measured = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let literature = [10.0, -4.0, 22.0, 3.0, 18.0, -9.0];
        let cal = calibrate_x_axis(&measured, &literature, 1, 0.9).unwrap();
        assert!(cal.low_confidence);
        assert!(cal.r_squared < 0.9);
    }

    #[test]
    fn closest_match_pairs_in_literature_order() {
        let literature = [500.0, 1000.0, 1600.0];
        let measured = [1020.0, 480.0, 1590.0, 700.0];
        let matched = find_closest_matches(&literature, &measured);
        assert_eq!(matched, vec![480.0, 1020.0, 1590.0]);
    }

    #[test]
    fn spline_reproduces_smooth_curve() {
        let xs: Vec<f64> = (0..30).map(|i| 400.0 + 20.0 * i as f64).collect();
        let ys: Vec<f64> = xs.iter().map(|&x| (x / 150.0).sin() + 2.0).collect();
        let spline = CubicSpline::new(xs, ys).unwrap();
        for i in 0..100 {
            let x = 420.0 + i as f64 * 5.0;
            assert_relative_eq!(
                spline.evaluate(x),
                (x / 150.0).sin() + 2.0,
                max_relative = 1e-3
            );
        }
    }

    #[test]
    fn spline_rejects_unsorted_knots() {
        assert!(CubicSpline::new(vec![1.0, 1.0, 2.0], vec![0.0; 3]).is_err());
    }

    #[test]
    fn response_curve_recovers_instrument_shape() {
        // fabricate a measurement: W = E * R_true + dark, with a smooth R_true
        let wl = Array1::linspace(450.0, 900.0, 451);
        let lamp_wl: Vec<f64> = (0..50).map(|i| 400.0 + 11.0 * i as f64).collect();
        let lamp_emission: Vec<f64> = lamp_wl
            .iter()
            .map(|&x| 1.0 + ((x - 650.0) / 300.0).powi(2))
            .collect();
        let spline = CubicSpline::new(lamp_wl.clone(), lamp_emission.clone()).unwrap();

        let dark = 100.0;
        let r_true = wl.mapv(|v: f64| 0.4 + 0.6 * (-((v - 700.0) / 120.0).powi(2)).exp());
        let white = Array1::from_iter(
            wl.iter()
                .zip(r_true.iter())
                .map(|(&x, &r)| spline.evaluate(x) * r + dark),
        );

        let r = white_scatter_calibration(&wl, &white, dark, &lamp_wl, &lamp_emission, None)
            .unwrap();
        let r_true_max = r_true.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        for i in 0..wl.len() {
            assert_relative_eq!(r[i], r_true[i] / r_true_max, max_relative = 1e-6);
        }
    }

    #[test]
    fn notch_window_is_overridden_to_one() {
        let wl = Array1::linspace(450.0, 900.0, 451);
        let lamp_wl: Vec<f64> = (0..50).map(|i| 400.0 + 11.0 * i as f64).collect();
        let lamp_emission = vec![2.0; 50];
        let white = Array1::from_elem(451, 10.0);
        let r = white_scatter_calibration(
            &wl,
            &white,
            0.0,
            &lamp_wl,
            &lamp_emission,
            Some((600.0, 650.0)),
        )
        .unwrap();
        for i in 0..wl.len() {
            if wl[i] >= 600.0 && wl[i] <= 650.0 {
                assert_relative_eq!(r[i], 1.0, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn degenerate_emission_is_masked() {
        let wl = Array1::linspace(450.0, 550.0, 101);
        // emission collapses to zero (and below) above 500 nm
        let lamp_wl: Vec<f64> = vec![400.0, 480.0, 500.0, 520.0, 600.0];
        let lamp_emission = vec![2.0, 1.0, 0.0, -0.5, -1.0];
        let white = Array1::from_elem(101, 10.0);
        let r =
            white_scatter_calibration(&wl, &white, 0.0, &lamp_wl, &lamp_emission, None).unwrap();
        assert!(r.iter().any(|v| v.is_nan()));
        assert!(r.iter().any(|v| v.is_finite()));
    }

    #[test]
    fn notch_dark_counts_averages_window() {
        let x = Array1::linspace(0.0, 10.0, 11);
        let y = x.mapv(|v| v);
        let mean = notch_dark_counts(&x, &y, (2.0, 4.0)).unwrap();
        assert_relative_eq!(mean, 3.0, epsilon = 1e-12);
        assert!(notch_dark_counts(&x, &y, (20.0, 30.0)).is_err());
    }
}
