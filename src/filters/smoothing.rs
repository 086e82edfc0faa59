//! Zero-phase Butterworth low-pass smoothing.
//!
//! The filter is designed as a cascade of biquad (second-order) sections from the
//! analog Butterworth prototype via the bilinear transform, then applied forward
//! and backward so the smoothed trace has zero group delay. This is the standard
//! smoothing step before extremum detection and baselining: `cutoff` and `fs` are
//! unitless design knobs inherited from the acquisition scripts (typical spectra
//! use `cutoff = 1500`, `fs = 60000`).

use crate::error::{Result, SpecError};
use crate::math_tools::remove_nans;
use ndarray::{Array1, Array2, Axis};
use num_complex::Complex64;
use std::f64::consts::PI;

/// A single biquad (second-order) filter section.
///
/// Transfer function: `H(z) = (b0 + b1·z⁻¹ + b2·z⁻²) / (1 + a1·z⁻¹ + a2·z⁻²)`,
/// evaluated in Direct Form II Transposed for numerical robustness.
#[derive(Debug, Clone, Copy)]
pub struct Biquad {
    b: [f64; 3],
    a: [f64; 2],
    state: [f64; 2],
}

impl Biquad {
    /// Creates a section from numerator `[b0, b1, b2]` and denominator `[a1, a2]`
    /// coefficients (`a0` normalized to 1).
    pub fn new(b: [f64; 3], a: [f64; 2]) -> Self {
        Biquad {
            b,
            a,
            state: [0.0; 2],
        }
    }

    /// Processes a single sample.
    pub fn process(&mut self, input: f64) -> f64 {
        let output = self.b[0] * input + self.state[0];
        self.state[0] = self.b[1] * input - self.a[0] * output + self.state[1];
        self.state[1] = self.b[2] * input - self.a[1] * output;
        output
    }

    /// Clears the internal state.
    pub fn reset(&mut self) {
        self.state = [0.0; 2];
    }
}

/// Designs a digital Butterworth low-pass as a cascade of biquad sections.
///
/// The analog prototype poles sit on the left half of the unit circle; the cutoff
/// is pre-warped and each pole (pair) is mapped through the bilinear transform.
///
/// # Arguments
/// - `order`: filter order (≥ 1).
/// - `cutoff`: low-pass cutoff, same unit as `fs`.
/// - `fs`: sampling rate; the cutoff must sit below the Nyquist rate `fs / 2`.
pub fn butterworth_lowpass(order: usize, cutoff: f64, fs: f64) -> Result<Vec<Biquad>> {
    if order == 0 {
        return Err(SpecError::InvalidParameter {
            name: "order",
            value: 0.0,
        });
    }
    if !(cutoff > 0.0 && cutoff < fs / 2.0) {
        return Err(SpecError::InvalidParameter {
            name: "cutoff",
            value: cutoff,
        });
    }

    // pre-warped analog cutoff and bilinear constant
    let wc = 2.0 * fs * (PI * cutoff / fs).tan();
    let k = 2.0 * fs;

    let mut sections = Vec::new();
    for i in 0..order {
        let theta = PI * (2 * i + order + 1) as f64 / (2 * order) as f64;
        let pole = Complex64::new(theta.cos(), theta.sin());

        if pole.im.abs() < 1e-10 {
            // real pole: first-order section
            let p = pole.re * wc;
            let alpha = k - p;
            let beta = k + p;
            sections.push(Biquad::new([-p / alpha, -p / alpha, 0.0], [-beta / alpha, 0.0]));
        } else if pole.im > 0.0 {
            // one section per conjugate pair
            let p = pole * wc;
            let mag_sq = p.re * p.re + p.im * p.im;
            let k2 = k * k;
            let d = k2 - 2.0 * k * p.re + mag_sq;
            sections.push(Biquad::new(
                [mag_sq / d, 2.0 * mag_sq / d, mag_sq / d],
                [2.0 * (mag_sq - k2) / d, (k2 + 2.0 * k * p.re + mag_sq) / d],
            ));
        }
    }

    Ok(sections)
}

fn run_cascade(sections: &mut [Biquad], data: &[f64]) -> Vec<f64> {
    for s in sections.iter_mut() {
        s.reset();
    }
    let mut out = Vec::with_capacity(data.len());
    for &v in data {
        let mut acc = v;
        for s in sections.iter_mut() {
            acc = s.process(acc);
        }
        out.push(acc);
    }
    out
}

/// Applies a biquad cascade forward then backward (zero group delay).
fn filtfilt(sections: &mut [Biquad], data: &[f64]) -> Vec<f64> {
    let mut forward = run_cascade(sections, data);
    forward.reverse();
    let mut backward = run_cascade(sections, &forward);
    backward.reverse();
    backward
}

/// Smoothes data without shifting it.
///
/// Designs a Butterworth low-pass at `cutoff / (fs/2)` of the given order and runs
/// it forward and backward over the signal. Inputs shorter than 18 samples are
/// padded at both ends with the first value and cropped after filtering; longer
/// inputs use odd-reflection padding to suppress edge transients.
///
/// # Arguments
/// - `data`: the signal to smooth.
/// - `cutoff`, `fs`: low-pass design parameters (typical: 1500 and 60000).
/// - `order`: filter order (typical: 5).
///
/// # Returns
/// The smoothed signal, same length as the input.
pub fn butter_lowpass_filtfilt(
    data: &Array1<f64>,
    cutoff: f64,
    fs: f64,
    order: usize,
) -> Result<Array1<f64>> {
    if data.is_empty() {
        return Err(SpecError::EmptyInput("butter_lowpass_filtfilt data"));
    }
    let mut sections = butterworth_lowpass(order, cutoff, fs)?;

    let n = data.len();
    let y: Vec<f64> = data.to_vec();

    if n < 18 {
        // short traces: pad both ends with the first value, filter, crop
        let pad = 18 - n / 2 + 1;
        let mut padded = vec![y[0]; pad];
        padded.extend_from_slice(&y);
        padded.extend(std::iter::repeat(y[0]).take(pad));
        let filtered = filtfilt(&mut sections, &padded);
        return Ok(Array1::from_iter(filtered[pad..pad + n].iter().copied()));
    }

    // odd-reflection padding, like scipy's filtfilt default
    let ext = (3 * (order + 1)).min(n - 1);
    let mut padded = Vec::with_capacity(n + 2 * ext);
    for j in 0..ext {
        padded.push(2.0 * y[0] - y[ext - j]);
    }
    padded.extend_from_slice(&y);
    for j in 0..ext {
        padded.push(2.0 * y[n - 1] - y[n - 2 - j]);
    }

    let filtered = filtfilt(&mut sections, &padded);
    Ok(Array1::from_iter(filtered[ext..ext + n].iter().copied()))
}

/// Row-wise [`butter_lowpass_filtfilt`] for 2-D data: each row of `y` is a spectrum
/// and is smoothed individually.
pub fn butter_lowpass_filtfilt_rows(
    y: &Array2<f64>,
    cutoff: f64,
    fs: f64,
    order: usize,
) -> Result<Array2<f64>> {
    let mut out = y.clone();
    for mut row in out.axis_iter_mut(Axis(0)) {
        let smoothed = butter_lowpass_filtfilt(&row.to_owned(), cutoff, fs, order)?;
        row.assign(&smoothed);
    }
    Ok(out)
}

/// NaN repair for very noisy signals: NaN samples are replaced with values from a
/// smoothed copy rather than a straight line, which avoids artificial flat segments
/// when the gap sits inside a noisy region.
pub fn remove_nans_too_noisy(
    y: &Array1<f64>,
    cutoff: f64,
    fs: f64,
    order: usize,
) -> Result<Array1<f64>> {
    let interp = remove_nans(y);
    if interp.iter().any(|v| v.is_nan()) {
        // all-NaN input: nothing to smooth against
        return Ok(interp);
    }
    let smooth = butter_lowpass_filtfilt(&interp, cutoff, fs, order)?;
    Ok(Array1::from_iter(y.iter().zip(smooth.iter()).map(
        |(&raw, &sm)| {
            if raw.is_nan() {
                sm
            } else {
                raw
            }
        },
    )))
}
