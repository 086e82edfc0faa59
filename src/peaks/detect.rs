//! Extremum detection over spectral traces.
//!
//! Thin policy layer over the derivative state machine in `math_tools`: value
//! thresholds keep only extrema inside a band, and boundary samples can be
//! admitted when the first difference leaves the edge with the right sign.

use crate::error::Result;
use crate::filters::smoothing::butter_lowpass_filtfilt;
use crate::math_tools::{cent_diff, detect_maxima, detect_minima};
use ndarray::Array1;

/// Options for extremum detection.
#[derive(Debug, Clone, Copy)]
pub struct ExtremaOptions {
    /// Extrema with values at or below this are ignored.
    pub lower_threshold: f64,
    /// Extrema with values at or above this are ignored.
    pub upper_threshold: f64,
    /// Admit boundary samples when the first difference has the right sign there.
    pub include_edges: bool,
}

impl Default for ExtremaOptions {
    fn default() -> Self {
        ExtremaOptions {
            lower_threshold: f64::NEG_INFINITY,
            upper_threshold: f64::INFINITY,
            include_edges: false,
        }
    }
}

/// Indices of local minima of `y` under the given policy, in ascending order.
pub fn find_minima(y: &Array1<f64>, opts: ExtremaOptions) -> Vec<usize> {
    let mut indices = detect_minima(y, opts.lower_threshold, opts.upper_threshold);
    if opts.include_edges && y.len() >= 2 {
        let n = y.len();
        let in_band = |v: f64| v > opts.lower_threshold && v < opts.upper_threshold;
        if y[1] > y[0] && in_band(y[0]) {
            indices.insert(0, 0);
        }
        if y[n - 2] > y[n - 1] && in_band(y[n - 1]) {
            indices.push(n - 1);
        }
    }
    indices
}

/// Indices of local maxima of `y` under the given policy, in ascending order.
pub fn find_maxima(y: &Array1<f64>, opts: ExtremaOptions) -> Vec<usize> {
    let mut indices = detect_maxima(y, opts.lower_threshold, opts.upper_threshold);
    if opts.include_edges && y.len() >= 2 {
        let n = y.len();
        let in_band = |v: f64| v > opts.lower_threshold && v < opts.upper_threshold;
        if y[1] < y[0] && in_band(y[0]) {
            indices.insert(0, 0);
        }
        if y[n - 2] < y[n - 1] && in_band(y[n - 1]) {
            indices.push(n - 1);
        }
    }
    indices
}

/// Finds shoulder-peak candidates from the smoothed second derivative.
///
/// The trace is smoothed, differentiated twice, and the second derivative is
/// normalized to its maximum; minima more negative than `-threshold` are kept,
/// ordered by depth, and capped at `max_n`. Also returns the plain maxima of the
/// smoothed trace for comparison.
///
/// # Arguments
/// - `x`, `y`: the trace.
/// - `threshold`: relative depth cutoff for d² minima (typical 0.1).
/// - `max_n`: maximum number of candidates to keep.
/// - `cutoff`, `fs`, `order`: Butterworth design for the pre-smoothing.
///
/// # Returns
/// `(d2_minima, smoothed_maxima)` index lists.
pub fn find_d2_minima(
    x: &Array1<f64>,
    y: &Array1<f64>,
    threshold: f64,
    max_n: usize,
    cutoff: f64,
    fs: f64,
    order: usize,
) -> Result<(Vec<usize>, Vec<usize>)> {
    let y_smooth = butter_lowpass_filtfilt(y, cutoff, fs, order)?;
    let d1 = cent_diff(x, &y_smooth)?;
    let mut d2 = cent_diff(x, &d1)?;
    let d2_max = d2.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if d2_max > 0.0 {
        d2.mapv_inplace(|v| v / d2_max);
    }

    let mut mins: Vec<usize> = detect_minima(&d2, f64::NEG_INFINITY, f64::INFINITY)
        .into_iter()
        .filter(|&i| d2[i] < -threshold)
        .collect();
    mins.sort_by(|&a, &b| d2[a].total_cmp(&d2[b]));
    mins.truncate(max_n);

    let maxima = find_maxima(&y_smooth, ExtremaOptions::default());
    Ok((mins, maxima))
}
