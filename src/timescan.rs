//! This module defines the 2-D timescan container: a stack of spectra acquired over
//! time on a shared x axis, with the per-pixel reductions used for SERS time series
//! (integration, nanocavity extraction, flare/picocavity deviation) and the
//! histogram-based colour-scale auto-levels for heatmap rendering.

use crate::error::{Result, SpecError};
use crate::filters::smoothing::butter_lowpass_filtfilt_rows;
use crate::spectrum::{truncate_arrays, AttrValue, Dataset, DatasetData, Metadata, Spectrum, TruncateFill};
use ndarray::{Array1, Array2, Axis};

/// Options for the timescan colour-scale auto-levels.
///
/// `v_min = max(mode − min_std·σ, 1)` and `v_max = mode + max_std·σ`, where the
/// mode is taken from a 1000-bin histogram of all intensities. Passing 0 for
/// either multiplier disables that bound (0 / global max respectively); the
/// lower clamp of 1 keeps log-scaled heatmaps valid.
#[derive(Debug, Clone, Copy)]
pub struct AutoLevelOptions {
    pub min_std: f64,
    pub max_std: f64,
}

impl Default for AutoLevelOptions {
    fn default() -> Self {
        AutoLevelOptions {
            min_std: 2.0,
            max_std: 10.0,
        }
    }
}

/// A time-resolved scan: T spectra of N samples each, ordered by acquisition time.
///
/// Row `t` of `scan` is the spectrum acquired at time `t`; `y` is the per-column
/// average across rows (the 1-D view used for quick plotting), and `t` carries
/// acquisition times once the exposure is known.
#[derive(Debug, Clone)]
pub struct Timescan {
    pub x: Array1<f64>,
    /// The (T, N) data matrix.
    pub scan: Array2<f64>,
    /// Per-column average of `scan`.
    pub y: Array1<f64>,
    scan_raw: Array2<f64>,
    /// Spectrum indices 0..T.
    pub t_raw: Array1<f64>,
    /// Acquisition times, `t_raw · exposure`.
    pub t: Array1<f64>,
    /// Exposure / cycle time in seconds.
    pub exposure_s: f64,
    /// Heatmap colour-scale bounds from the last auto-level pass.
    pub v_lims: Option<(f64, f64)>,
    pub attrs: Metadata,
}

impl Timescan {
    /// Creates a timescan from an x axis and a (T, N) matrix.
    pub fn new(x: Array1<f64>, scan: Array2<f64>) -> Result<Self> {
        if x.is_empty() || scan.nrows() == 0 {
            return Err(SpecError::EmptyInput("Timescan data"));
        }
        if scan.ncols() != x.len() {
            return Err(SpecError::ShapeMismatch {
                expected: (scan.nrows(), x.len()),
                actual: (scan.nrows(), scan.ncols()),
            });
        }

        let y = scan.mean_axis(Axis(0)).unwrap();
        let t_raw = Array1::from_iter((0..scan.nrows()).map(|i| i as f64));
        Ok(Timescan {
            x,
            y,
            scan_raw: scan.clone(),
            scan,
            t: t_raw.clone(),
            t_raw,
            exposure_s: 1.0,
            v_lims: None,
            attrs: Metadata::new(),
        })
    }

    /// Creates a timescan from an external dataset handle (2-D payload required).
    /// The exposure is taken from `Exposure` / `cycle_time` when present.
    pub fn from_dataset(dset: &Dataset) -> Result<Self> {
        let scan = match &dset.data {
            DatasetData::TwoD(arr) => arr.clone(),
            DatasetData::OneD(_) => {
                return Err(SpecError::EmptyInput(
                    "Timescan::from_dataset expects 2-D data",
                ))
            }
        };
        let x = dset
            .wavelengths()
            .ok_or(SpecError::MissingAttribute("wavelengths"))?;
        let mut scan = Timescan::new(x, scan)?;
        scan.attrs = dset.attrs.clone();
        if let Some(exposure) = dset.exposure_s() {
            scan.set_exposure(exposure);
        }
        Ok(scan)
    }

    /// Immutable snapshot of the scan as constructed.
    pub fn scan_raw(&self) -> &Array2<f64> {
        &self.scan_raw
    }

    /// Number of spectra in the scan.
    pub fn len_t(&self) -> usize {
        self.scan.nrows()
    }

    /// Sets the exposure (seconds per spectrum) and recomputes the time axis.
    pub fn set_exposure(&mut self, exposure_s: f64) {
        self.exposure_s = exposure_s;
        self.t = self.t_raw.mapv(|v| v * exposure_s);
    }

    /// Converts the x axis to Raman shift (cm⁻¹) for the given excitation.
    pub fn with_raman_excitation(mut self, laser_wl_nm: f64) -> Self {
        self.x = crate::math_tools::wl_to_wn_arr(&self.x, laser_wl_nm);
        self
    }

    /// `x ← scale·x + shift`; used after coarse calibration shifts.
    pub fn scale_x(&mut self, scale: f64, shift: f64) {
        self.x.mapv_inplace(|v| v * scale + shift);
    }

    /// Restricts every row (and the integrated view) to `x_lo ≤ x ≤ x_hi`.
    pub fn truncate(&mut self, x_lo: f64, x_hi: f64, fill: TruncateFill) -> Result<()> {
        let mut rows: Vec<Array1<f64>> = Vec::with_capacity(self.len_t());
        let mut x_new = self.x.clone();
        for row in self.scan.axis_iter(Axis(0)) {
            let (xt, yt, _) = truncate_arrays(&self.x, &row.to_owned(), x_lo, x_hi, fill)?;
            x_new = xt;
            rows.push(yt);
        }

        let n = x_new.len();
        let mut scan = Array2::zeros((rows.len(), n));
        for (t, row) in rows.iter().enumerate() {
            scan.row_mut(t).assign(row);
        }
        self.x = x_new;
        self.scan = scan;
        self.y = self.scan.mean_axis(Axis(0)).unwrap();
        Ok(())
    }

    /// Row-wise intensity calibration: `Y ← (Y − dark) / (R · power · exposure)`.
    ///
    /// If subtraction leaves negative counts the whole scan is shifted up to zero
    /// before dividing, then the integrated view is recomputed. Laser power is in
    /// mW; samples with degenerate `R` are masked as NaN.
    pub fn calibrate_intensity(
        &mut self,
        r_setup: Option<&Array1<f64>>,
        dark_counts: Option<&Array1<f64>>,
        laser_power_mw: Option<f64>,
    ) -> Result<()> {
        let power = laser_power_mw
            .or_else(|| self.attrs.get("laser_power").and_then(AttrValue::as_scalar))
            .ok_or(SpecError::MissingAttribute("laser_power"))?;
        if let Some(r) = r_setup {
            SpecError::check_lengths(self.x.len(), r.len())?;
        }
        if let Some(d) = dark_counts {
            SpecError::check_lengths(self.x.len(), d.len())?;
        }

        for t in 0..self.len_t() {
            for i in 0..self.x.len() {
                let d = dark_counts.map(|d| d[i]).unwrap_or(0.0);
                self.scan[[t, i]] -= d;
            }
        }

        let min = self.scan.iter().cloned().fold(f64::INFINITY, f64::min);
        if min < 0.0 {
            self.scan.mapv_inplace(|v| v - min);
        }

        for t in 0..self.len_t() {
            for i in 0..self.x.len() {
                let r = r_setup.map(|r| r[i]).unwrap_or(1.0);
                if !(r > 0.0) || !r.is_finite() {
                    self.scan[[t, i]] = f64::NAN;
                } else {
                    self.scan[[t, i]] /= r * power * self.exposure_s;
                }
            }
        }
        self.y = self.scan.mean_axis(Axis(0)).unwrap();
        Ok(())
    }

    /// Adds all spectra together into a single integrated spectrum, optionally
    /// restricted to an x-window.
    pub fn integrate_timescan(&self, window: Option<(f64, f64)>) -> Result<Spectrum> {
        let summed = self.scan.sum_axis(Axis(0));
        let mut spectrum = Spectrum::new(self.x.clone(), summed)?;
        if let Some((lo, hi)) = window {
            spectrum.truncate(lo, hi, TruncateFill::NaN)?;
        }
        Ok(spectrum)
    }

    /// Extracts the stable nanocavity spectrum from a timescan containing flares or
    /// picocavities.
    ///
    /// The nanocavity intensity at each pixel is the degree-0 least-squares fit of
    /// that pixel's trace over time — its temporal mean — which suppresses rare
    /// transient events.
    pub fn extract_nanocavity(&self) -> Result<Spectrum> {
        let pixel_baseline = self.scan.mean_axis(Axis(0)).unwrap();
        Spectrum::new(self.x.clone(), pixel_baseline)
    }

    /// Per-pixel standard deviation across time, as a spectrum on the same x axis.
    ///
    /// Flare and picocavity events show up as peaks in this trace.
    pub fn pixel_deviation(&self) -> Result<Spectrum> {
        let sigma = self.scan.std_axis(Axis(0), 0.0);
        Spectrum::new(self.x.clone(), sigma)
    }

    /// Scalar deviation metric: the per-pixel σ summed over an x-window (or the
    /// whole axis). Used to rank scans by flare/picocavity activity.
    pub fn deviation_metric(&self, window: Option<(f64, f64)>) -> Result<f64> {
        let sigma = self.pixel_deviation()?;
        let (lo, hi) = window.unwrap_or(sigma.x_lim);
        Ok(sigma
            .x
            .iter()
            .zip(sigma.y.iter())
            .filter(|(x, _)| **x >= lo && **x <= hi)
            .map(|(_, s)| s)
            .sum())
    }

    /// Row-wise Butterworth smoothing of the whole scan.
    pub fn smooth_scan(&self, cutoff: f64, fs: f64, order: usize) -> Result<Array2<f64>> {
        butter_lowpass_filtfilt_rows(&self.scan, cutoff, fs, order)
    }

    /// Normalizes spectra in the scan to `range`, each row individually or the
    /// scan as a whole, optionally restricted to a time window (seconds).
    pub fn normalise(
        &self,
        range: (f64, f64),
        norm_individual: bool,
        t_min: Option<f64>,
        t_max: Option<f64>,
    ) -> Result<Array2<f64>> {
        let t_lo = t_min.unwrap_or_else(|| self.t.iter().cloned().fold(f64::INFINITY, f64::min));
        let t_hi = t_max.unwrap_or_else(|| {
            self.t
                .iter()
                .cloned()
                .fold(f64::NEG_INFINITY, f64::max)
        });
        let i_lo = ((t_lo / self.exposure_s).round() as usize).min(self.len_t().saturating_sub(1));
        let i_hi = ((t_hi / self.exposure_s).round() as usize).min(self.len_t().saturating_sub(1));
        if i_lo > i_hi {
            return Err(SpecError::InvalidParameter {
                name: "t_min",
                value: t_lo,
            });
        }

        let mut out = self.scan.clone();
        let remap = |v: f64, min: f64, max: f64| {
            if max > min {
                (v - min) / (max - min) * (range.1 - range.0) + range.0
            } else {
                range.0
            }
        };

        if norm_individual {
            for t in i_lo..=i_hi {
                let row = self.scan.row(t);
                let min = row.iter().cloned().fold(f64::INFINITY, f64::min);
                let max = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                for i in 0..row.len() {
                    out[[t, i]] = remap(self.scan[[t, i]], min, max);
                }
            }
        } else {
            let block = self.scan.slice(ndarray::s![i_lo..=i_hi, ..]);
            let min = block.iter().cloned().fold(f64::INFINITY, f64::min);
            let max = block.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            for t in i_lo..=i_hi {
                for i in 0..self.x.len() {
                    out[[t, i]] = remap(self.scan[[t, i]], min, max);
                }
            }
        }
        Ok(out)
    }

    /// Calculates appropriate intensity limits for a 2-D plot of the scan from the
    /// frequency distribution of its intensities, storing and returning them.
    pub fn determine_v_lims(&mut self, opts: AutoLevelOptions) -> Result<(f64, f64)> {
        let values: Vec<f64> = self.scan.iter().cloned().filter(|v| v.is_finite()).collect();
        SpecError::check_non_empty(&values, "determine_v_lims scan")?;

        let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let bins = 1000usize;
        let width = if max > 0.0 { max / bins as f64 } else { 1.0 };

        let mut counts = vec![0usize; bins];
        for &v in &values {
            if v >= 0.0 && v <= max {
                let b = ((v / width) as usize).min(bins - 1);
                counts[b] += 1;
            }
        }
        let mode_bin = counts
            .iter()
            .enumerate()
            .max_by_key(|(_, c)| **c)
            .map(|(i, _)| i)
            .unwrap_or(0);
        let mode = (mode_bin as f64 + 0.5) * width;

        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let std =
            (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64).sqrt();

        let v_min = if opts.min_std == 0.0 {
            0.0
        } else {
            (mode - opts.min_std * std).max(1.0)
        };
        let v_max = if opts.max_std == 0.0 {
            max
        } else {
            mode + opts.max_std * std
        };

        self.v_lims = Some((v_min, v_max));
        Ok((v_min, v_max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math_tools::gaussian;
    use approx::assert_relative_eq;

    /// Scenario: every row is a fixed spectrum except two rows that add a narrow
    /// 10x flare around x-index 256.
    fn flare_scan() -> (Timescan, Array1<f64>, usize) {
        let n = 512;
        let t = 100;
        let x = Array1::linspace(400.0, 900.0, n);
        let s = x.mapv(|v| 10.0 + gaussian(v, 100.0, 650.0, 80.0, 0.0));
        let flare_center = 256;
        let flare = x.mapv(|v| gaussian(v, 10.0 * 110.0, x[flare_center], 10.0, 0.0));

        let mut scan = Array2::zeros((t, n));
        for row in 0..t {
            let mut r = scan.row_mut(row);
            r.assign(&s);
            if row == 10 || row == 57 {
                r += &flare;
            }
        }
        (Timescan::new(x, scan).unwrap(), s, flare_center)
    }

    #[test]
    fn construction_checks_shape() {
        let x = Array1::linspace(0.0, 9.0, 10);
        assert!(Timescan::new(x.clone(), Array2::zeros((5, 10))).is_ok());
        assert!(Timescan::new(x, Array2::zeros((5, 9))).is_err());
    }

    #[test]
    fn integrated_view_is_column_average() {
        let x = Array1::linspace(0.0, 2.0, 3);
        let mut scan = Array2::zeros((2, 3));
        scan.row_mut(0).assign(&ndarray::array![1.0, 2.0, 3.0]);
        scan.row_mut(1).assign(&ndarray::array![3.0, 4.0, 5.0]);
        let ts = Timescan::new(x, scan).unwrap();
        assert_eq!(ts.y, ndarray::array![2.0, 3.0, 4.0]);
    }

    #[test]
    fn exposure_scales_time_axis() {
        let (mut ts, _, _) = flare_scan();
        ts.set_exposure(0.5);
        assert_relative_eq!(ts.t[10], 5.0);
    }

    #[test]
    fn nanocavity_bounded_by_column_extremes_and_tracks_fixed_spectrum() {
        let (ts, s, flare_center) = flare_scan();
        let nano = ts.extract_nanocavity().unwrap();

        for i in 0..ts.x.len() {
            let col = ts.scan.column(i);
            let min = col.iter().cloned().fold(f64::INFINITY, f64::min);
            let max = col.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            assert!(nano.y[i] >= min - 1e-9 && nano.y[i] <= max + 1e-9);
        }

        // away from the flare the nanocavity equals the fixed spectrum
        for i in 0..ts.x.len() {
            if (i as i64 - flare_center as i64).abs() > 40 {
                assert_relative_eq!(nano.y[i], s[i], epsilon = 1e-9);
            }
        }
        // at the flare the 2/100 duty cycle pulls the mean up by at most ~25%
        assert!(nano.y[flare_center] < s[flare_center] * 1.25);
    }

    #[test]
    fn pixel_deviation_peaks_at_flare() {
        let (ts, _, flare_center) = flare_scan();
        let sigma = ts.pixel_deviation().unwrap();
        let argmax = sigma
            .y
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert!((argmax as i64 - flare_center as i64).abs() <= 2);
    }

    #[test]
    fn deviation_metric_restricted_to_window_is_smaller() {
        let (ts, _, _) = flare_scan();
        let full = ts.deviation_metric(None).unwrap();
        let partial = ts.deviation_metric(Some((400.0, 500.0))).unwrap();
        assert!(partial < full);
        assert!(full > 0.0);
    }

    #[test]
    fn integrate_timescan_sums_rows() {
        let (ts, s, _) = flare_scan();
        let integrated = ts.integrate_timescan(None).unwrap();
        // column 0 is never flared: exactly 100 * s[0]
        assert_relative_eq!(integrated.y[0], 100.0 * s[0], max_relative = 1e-12);
    }

    #[test]
    fn truncate_applies_to_every_row() {
        let (mut ts, _, _) = flare_scan();
        ts.truncate(500.0, 800.0, TruncateFill::NaN).unwrap();
        assert_eq!(ts.scan.ncols(), ts.x.len());
        assert_eq!(ts.y.len(), ts.x.len());
        assert!(ts.x.iter().all(|&v| (500.0..=800.0).contains(&v)));
    }

    #[test]
    fn normalise_individual_rows_hit_unit_range() {
        let (ts, _, _) = flare_scan();
        let normed = ts.normalise((0.0, 1.0), true, None, None).unwrap();
        for t in 0..ts.len_t() {
            let row = normed.row(t);
            let max = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let min = row.iter().cloned().fold(f64::INFINITY, f64::min);
            assert_relative_eq!(max, 1.0, epsilon = 1e-12);
            assert_relative_eq!(min, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn auto_levels_are_ordered_and_clamped() {
        let (mut ts, _, _) = flare_scan();
        let (v_min, v_max) = ts.determine_v_lims(AutoLevelOptions::default()).unwrap();
        assert!(v_min >= 1.0);
        assert!(v_max > v_min);
        assert_eq!(ts.v_lims, Some((v_min, v_max)));
    }

    #[test]
    fn calibration_divides_by_power_and_exposure() {
        let x = Array1::linspace(0.0, 9.0, 10);
        let scan = Array2::from_elem((4, 10), 100.0);
        let mut ts = Timescan::new(x, scan).unwrap();
        ts.set_exposure(2.0);
        ts.calibrate_intensity(None, None, Some(5.0)).unwrap();
        for v in ts.scan.iter() {
            assert_relative_eq!(*v, 10.0, epsilon = 1e-12);
        }
    }
}
