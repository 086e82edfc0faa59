//! This module provides the shared numeric primitives for spectral processing: wavelength,
//! wavenumber and energy conversions, central-difference gradients, zero-crossing detection,
//! NaN-aware interpolation, extremum detection and the analytic line shapes (Gaussian,
//! Lorentzian) used throughout peak seeding and fitting.

use crate::error::{Result, SpecError};
use ndarray::Array1;
use num_traits::Float;

/// Wavelength of the helium-neon excitation laser in nm.
///
/// "633 nm" is a display abbreviation only; every computation uses this value.
pub const HENE_WAVELENGTH_NM: f64 = 632.8;

/// Converts a measured wavelength (nm) to a Raman shift (cm⁻¹), given the laser excitation.
///
/// # Arguments
/// - `wl`: wavelength in nm.
/// - `laser_wl`: wavelength of the excitation laser in nm.
///
/// # Returns
/// The Raman shift in reciprocal centimetres.
pub fn wl_to_wn<T: Float>(wl: T, laser_wl: T) -> T {
    let scale = T::from(1e7).unwrap();
    scale * (T::one() / laser_wl - T::one() / wl)
}

/// Converts a Raman shift (cm⁻¹) back to a measured wavelength (nm), given the laser excitation.
///
/// Inverse of [`wl_to_wn`].
pub fn wn_to_wl<T: Float>(wn: T, laser_wl: T) -> T {
    let scale = T::from(1e7).unwrap();
    scale / (scale / laser_wl - wn)
}

/// Vectorized [`wl_to_wn`].
pub fn wl_to_wn_arr(wl: &Array1<f64>, laser_wl: f64) -> Array1<f64> {
    wl.mapv(|w| wl_to_wn(w, laser_wl))
}

/// Vectorized [`wn_to_wl`].
pub fn wn_to_wl_arr(wn: &Array1<f64>, laser_wl: f64) -> Array1<f64> {
    wn.mapv(|w| wn_to_wl(w, laser_wl))
}

/// Converts photon energy in eV to wavelength in nm.
pub fn ev_to_nm(ev: f64) -> f64 {
    // h*c/e in units of eV*nm
    1e9 * 6.62607015e-34 * 299792458.0 / (ev * 1.60217662e-19)
}

/// Converts wavelength in nm to photon energy in eV.
pub fn nm_to_ev(nm: f64) -> f64 {
    1e9 * 6.62607015e-34 * 299792458.0 / (nm * 1.60217662e-19)
}

/// Numerically calculates dy/dx using the central difference method with mirrored ends.
///
/// The input is mirror-extended by one sample at each end, so the output has the
/// same length as the input. Positions where the local `Δx` is zero are repaired by
/// linear interpolation from their neighbours before dividing. The quotient is
/// halved, matching the convention of the downstream extremum detection.
///
/// # Arguments
/// - `x`: sample positions.
/// - `y`: sample values, same length as `x`.
///
/// # Returns
/// The gradient array, same length as the input.
pub fn cent_diff(x: &Array1<f64>, y: &Array1<f64>) -> Result<Array1<f64>> {
    if x.is_empty() {
        return Err(SpecError::EmptyInput("cent_diff x"));
    }
    SpecError::check_lengths(x.len(), y.len())?;

    let n = x.len();
    if n < 2 {
        return Ok(Array1::zeros(n));
    }

    let mut dx = Array1::zeros(n);
    let mut dy = Array1::zeros(n);
    for i in 0..n {
        let (lo, hi) = if i == 0 {
            (0, 1)
        } else if i == n - 1 {
            (n - 2, n - 1)
        } else {
            (i - 1, i + 1)
        };
        dx[i] = x[hi] - x[lo];
        dy[i] = y[hi] - y[lo];
    }

    if dx.iter().any(|&d| d == 0.0) {
        let marked = dx.mapv(|d| if d == 0.0 { f64::NAN } else { d });
        dx = remove_nans(&marked);
    }

    Ok(dy / dx / 2.0)
}

/// Finds the zero crossing points in a 1-D array using linear interpolation.
///
/// Returns fractional indices `i + α` (α in [0, 1)) where a linear segment of the
/// input changes sign; samples that are exactly zero report their own index.
pub fn find_zeroes(a: &Array1<f64>) -> Vec<f64> {
    let mut output = Vec::new();
    for i in 1..a.len() {
        if a[i] == 0.0 {
            output.push(i as f64);
        } else if (a[i] > 0.0) != (a[i - 1] > 0.0) && a[i - 1] != 0.0 {
            let frac = a[i - 1] / (a[i - 1] - a[i]);
            output.push(i as f64 + frac - 1.0);
        }
    }
    output
}

/// Returns the indices of any minima in the input.
///
/// Walks a three-state machine (rising / falling / neutral) along first differences;
/// a minimum is emitted wherever a falling segment meets a rising one, at the middle
/// of any intervening plateau. To identify maxima, pass `-y`.
///
/// # Arguments
/// - `y`: input samples.
/// - `lower_threshold`: minima with `y` at or below this value are ignored.
/// - `upper_threshold`: minima with `y` at or above this value are ignored.
pub fn detect_minima(y: &Array1<f64>, lower_threshold: f64, upper_threshold: f64) -> Vec<usize> {
    let mut mindices: Vec<usize> = Vec::new();

    if y.len() < 3 {
        return mindices;
    }

    const NEUTRAL: u8 = 0;
    const FALLING: u8 = 2;

    fn get_state(a: f64, b: f64) -> u8 {
        if a < b {
            1 // rising
        } else if a > b {
            2 // falling
        } else {
            0 // neutral
        }
    }

    let mut ps = get_state(y[0], y[1]);
    let mut begin = 1usize;

    for i in 2..y.len() {
        let s = get_state(y[i - 1], y[i]);

        if s != NEUTRAL {
            if ps != NEUTRAL && ps != s && s != FALLING {
                mindices.push((begin + i - 1) / 2);
            }
            begin = i;
            ps = s;
        }
    }

    mindices
        .into_iter()
        .filter(|&i| y[i] > lower_threshold && y[i] < upper_threshold)
        .collect()
}

/// Returns the indices of any maxima in the input, with thresholds applied to `y` itself.
pub fn detect_maxima(y: &Array1<f64>, lower_threshold: f64, upper_threshold: f64) -> Vec<usize> {
    let neg = y.mapv(|v| -v);
    detect_minima(&neg, f64::NEG_INFINITY, f64::INFINITY)
        .into_iter()
        .filter(|&i| y[i] > lower_threshold && y[i] < upper_threshold)
        .collect()
}

/// Interpolates across gaps left by NaN values in a 1-D array.
///
/// NaNs are replaced by linear interpolation between the nearest finite neighbours;
/// leading or trailing runs of NaN are filled with the nearest finite value. An
/// all-NaN input is returned unchanged with a warning, since no interpolation is
/// possible — downstream math is then the caller's risk.
pub fn remove_nans(y: &Array1<f64>) -> Array1<f64> {
    let total = y.len();
    let finite: Vec<(f64, f64)> = y
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .map(|(i, v)| (i as f64, *v))
        .collect();

    if finite.len() == total {
        return y.clone();
    }
    if finite.is_empty() {
        log::warn!("remove_nans: entire array is NaN, returning input unchanged");
        return y.clone();
    }

    let xp: Vec<f64> = finite.iter().map(|(i, _)| *i).collect();
    let fp: Vec<f64> = finite.iter().map(|(_, v)| *v).collect();

    Array1::from_iter((0..total).map(|i| interp_linear(i as f64, &xp, &fp)))
}

/// Linear interpolation of a single point onto a sorted grid, `np.interp` style.
///
/// Points outside the grid clamp to the first/last value.
pub fn interp_linear(x: f64, xp: &[f64], fp: &[f64]) -> f64 {
    debug_assert_eq!(xp.len(), fp.len());
    if xp.is_empty() {
        return f64::NAN;
    }
    if x <= xp[0] {
        return fp[0];
    }
    if x >= xp[xp.len() - 1] {
        return fp[fp.len() - 1];
    }
    // binary search for the enclosing segment
    let mut lo = 0usize;
    let mut hi = xp.len() - 1;
    while hi - lo > 1 {
        let mid = (lo + hi) / 2;
        if xp[mid] > x {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    let frac = (x - xp[lo]) / (xp[hi] - xp[lo]);
    fp[lo] + frac * (fp[hi] - fp[lo])
}

/// Trapezoidal integral of y over x.
pub fn trapz(x: &Array1<f64>, y: &Array1<f64>) -> f64 {
    let mut area = 0.0;
    for i in 1..x.len().min(y.len()) {
        area += 0.5 * (y[i] + y[i - 1]) * (x[i] - x[i - 1]);
    }
    area
}

/// Gaussian as a function of height, centre, FWHM and offset.
pub fn gaussian(x: f64, height: f64, center: f64, fwhm: f64, offset: f64) -> f64 {
    let n = 4.0 * (2.0f64).ln() * (x - center).powi(2);
    height * (-(n / fwhm.powi(2))).exp() + offset
}

/// Lorentzian as a function of height, centre and FWHM.
pub fn lorentzian(x: f64, height: f64, center: f64, fwhm: f64) -> f64 {
    let gamma = fwhm / 2.0;
    height * gamma.powi(2) / ((x - center).powi(2) + gamma.powi(2))
}

/// Area of a Gaussian from its height and FWHM alone (no y-offset assumed).
pub fn gauss_area(height: f64, fwhm: f64) -> f64 {
    height * ((std::f64::consts::PI * fwhm.powi(2)) / (4.0 * (2.0f64).ln())).sqrt()
}

/// Standard deviation of a Gaussian whose full width at fraction `frac` of its
/// height is `width`: `σ = w / (2·√(2·ln(1/f)))`.
pub fn sigma_from_width(width: f64, frac: f64) -> f64 {
    width / (2.0 * (2.0 * (1.0 / frac).ln()).sqrt())
}

/// Full width of a Gaussian at fraction `frac` of its height: `w = 2σ·√(2·ln(1/f))`.
pub fn width_from_sigma(sigma: f64, frac: f64) -> f64 {
    2.0 * sigma * (2.0 * (1.0 / frac).ln()).sqrt()
}

/// Solves a small dense linear system by Gaussian elimination with partial
/// pivoting. Returns `None` on a (numerically) singular matrix.
pub(crate) fn solve_dense(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col].abs() < 1e-300 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);
        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }
    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let mut s = b[row];
        for k in row + 1..n {
            s -= a[row][k] * x[k];
        }
        x[row] = s / a[row][row];
    }
    Some(x)
}

/// Inverts a small symmetric matrix by solving against unit vectors.
pub(crate) fn invert_dense(a: &[Vec<f64>]) -> Option<Vec<Vec<f64>>> {
    let n = a.len();
    let mut inv = vec![vec![0.0; n]; n];
    for col in 0..n {
        let mut e = vec![0.0; n];
        e[col] = 1.0;
        let column = solve_dense(a.to_vec(), e)?;
        for (row, item) in inv.iter_mut().enumerate() {
            item[col] = column[row];
        }
    }
    Some(inv)
}

/// Estimates the local noise level by comparing a signal with a smoothed copy.
///
/// A moving window of `window_size` samples (rounded up to even) slides over the
/// residual `y − y_smooth`, mirrored at the edges; the standard deviation inside
/// the window is the noise level at that sample.
pub fn calc_noise(
    y: &Array1<f64>,
    y_smooth: &Array1<f64>,
    window_size: usize,
) -> Result<Array1<f64>> {
    if y.is_empty() {
        return Err(SpecError::EmptyInput("calc_noise y"));
    }
    SpecError::check_lengths(y.len(), y_smooth.len())?;

    let mut window = window_size.max(2);
    if window % 2 != 0 {
        window += 1;
    }
    let half = window / 2;

    let noise: Vec<f64> = y.iter().zip(y_smooth.iter()).map(|(a, b)| a - b).collect();
    let n = noise.len();

    // mirror-pad by half a window at each end
    let mut padded = Vec::with_capacity(n + window);
    padded.extend(noise[..half.min(n)].iter().rev());
    padded.extend(noise.iter());
    padded.extend(noise[n.saturating_sub(half)..].iter().rev());

    let mut level = Array1::zeros(n);
    for i in 0..n {
        let seg = &padded[i..(i + window).min(padded.len())];
        let mean = seg.iter().sum::<f64>() / seg.len() as f64;
        let var = seg.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / seg.len() as f64;
        level[i] = var.sqrt();
    }
    Ok(level)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn wavelength_wavenumber_scenario() {
        // HeNe excitation: 700 nm scatters at ~1516.95 cm^-1
        let wn = wl_to_wn(700.0, HENE_WAVELENGTH_NM);
        assert_relative_eq!(wn, 1516.95, epsilon = 0.05);
        let wl = wn_to_wl(1516.95, HENE_WAVELENGTH_NM);
        assert_relative_eq!(wl, 700.0, epsilon = 0.005);
    }

    #[test]
    fn wavelength_wavenumber_round_trip() {
        for &wl in &[450.0, 632.8, 700.0, 950.0] {
            let back = wn_to_wl(wl_to_wn(wl, HENE_WAVELENGTH_NM), HENE_WAVELENGTH_NM);
            assert_relative_eq!(back, wl, max_relative = 1e-9);
        }
    }

    #[test]
    fn energy_conversion_round_trip() {
        let nm = ev_to_nm(nm_to_ev(633.0));
        assert_relative_eq!(nm, 633.0, max_relative = 1e-12);
    }

    #[test]
    fn cent_diff_of_line_is_constant_inside() {
        let x = Array1::linspace(0.0, 9.0, 10);
        let y = x.mapv(|v| 3.0 * v + 1.0);
        let d = cent_diff(&x, &y).unwrap();
        // halved by convention
        for i in 1..9 {
            assert_relative_eq!(d[i], 1.5, epsilon = 1e-12);
        }
    }

    #[test]
    fn cent_diff_rejects_mismatched_lengths() {
        let x = Array1::linspace(0.0, 1.0, 5);
        let y = Array1::zeros(4);
        assert!(cent_diff(&x, &y).is_err());
    }

    #[test]
    fn cent_diff_rejects_empty() {
        let x = Array1::zeros(0);
        let y = Array1::zeros(0);
        assert_eq!(cent_diff(&x, &y), Err(SpecError::EmptyInput("cent_diff x")));
    }

    #[test]
    fn find_zeroes_reports_fractional_crossings() {
        let a = array![1.0, -1.0, -1.0, 0.0, 2.0];
        let z = find_zeroes(&a);
        assert_relative_eq!(z[0], 0.5, epsilon = 1e-12);
        assert_relative_eq!(z[1], 3.0, epsilon = 1e-12);
    }

    #[test]
    fn detect_minima_finds_troughs() {
        let y = array![3.0, 2.0, 1.0, 2.0, 3.0, 1.5, 0.5, 1.0];
        let mins = detect_minima(&y, f64::NEG_INFINITY, f64::INFINITY);
        assert_eq!(mins, vec![2, 6]);
    }

    #[test]
    fn detect_minima_thresholds_filter() {
        let y = array![3.0, 2.0, 1.0, 2.0, 3.0, 1.5, 0.5, 1.0];
        let mins = detect_minima(&y, 0.7, f64::INFINITY);
        assert_eq!(mins, vec![2]);
    }

    #[test]
    fn detect_minima_plateau_reports_middle() {
        let y = array![2.0, 1.0, 1.0, 1.0, 2.0];
        let mins = detect_minima(&y, f64::NEG_INFINITY, f64::INFINITY);
        assert_eq!(mins, vec![2]);
    }

    #[test]
    fn detect_maxima_finds_peak() {
        let x = Array1::linspace(0.0, 10.0, 101);
        let y = x.mapv(|v| gaussian(v, 1.0, 5.0, 2.0, 0.0));
        let maxs = detect_maxima(&y, 0.5, f64::INFINITY);
        assert_eq!(maxs, vec![50]);
    }

    #[test]
    fn remove_nans_interpolates_gap() {
        let y = array![1.0, f64::NAN, f64::NAN, 4.0];
        let fixed = remove_nans(&y);
        assert_relative_eq!(fixed[1], 2.0, epsilon = 1e-12);
        assert_relative_eq!(fixed[2], 3.0, epsilon = 1e-12);
    }

    #[test]
    fn remove_nans_fills_edges() {
        let y = array![f64::NAN, 2.0, 3.0, f64::NAN];
        let fixed = remove_nans(&y);
        assert_relative_eq!(fixed[0], 2.0, epsilon = 1e-12);
        assert_relative_eq!(fixed[3], 3.0, epsilon = 1e-12);
    }

    #[test]
    fn remove_nans_all_nan_returned_unchanged() {
        let y = array![f64::NAN, f64::NAN];
        let fixed = remove_nans(&y);
        assert!(fixed.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn trapz_of_constant() {
        let x = Array1::linspace(0.0, 1.0, 11);
        let y = Array1::from_elem(11, 2.0);
        assert_relative_eq!(trapz(&x, &y), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn gaussian_width_relations_are_inverse() {
        let sigma = 4.2;
        for &f in &[0.1, 0.5, 0.9] {
            let w = width_from_sigma(sigma, f);
            assert_relative_eq!(sigma_from_width(w, f), sigma, max_relative = 1e-12);
        }
        // at half height, the full width must reproduce the textbook FWHM
        let w = width_from_sigma(sigma, 0.5);
        let val = (-0.5 * (w / 2.0 / sigma).powi(2)).exp();
        assert_relative_eq!(val, 0.5, max_relative = 1e-12);
    }

    #[test]
    fn lorentzian_half_height_at_gamma() {
        let h = 2.0;
        let fwhm = 10.0;
        assert_relative_eq!(lorentzian(100.0 + fwhm / 2.0, h, 100.0, fwhm), h / 2.0);
    }

    #[test]
    fn calc_noise_scales_with_amplitude() {
        let n = 200;
        let x = Array1::linspace(0.0, 20.0 * std::f64::consts::PI, n);
        let smooth = Array1::zeros(n);
        // deterministic pseudo-noise
        let noisy = x.mapv(|v| (v * 37.7).sin() * 0.3);
        let level = calc_noise(&noisy, &smooth, 10).unwrap();
        let mean_level = level.mean().unwrap();
        assert!(mean_level > 0.1 && mean_level < 0.4);
    }
}
