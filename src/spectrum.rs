//! This module defines the 1-D spectrum container: x/y data with immutable raw
//! snapshots, named derived channels, instrument metadata and the lifecycle
//! operations (truncation, smoothing, baselining, normalization, cosmic-ray
//! repair, intensity calibration) that the rest of the pipeline composes.

use crate::error::{Result, SpecError};
use crate::filters::baseline::{baseline_als, baseline_als_notch};
use crate::filters::cosmic_ray::{remove_cosmic_rays, CosmicRayOptions};
use crate::filters::smoothing::butter_lowpass_filtfilt;
use crate::math_tools::{interp_linear, wl_to_wn_arr, wn_to_wl_arr};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single metadata value attached to a dataset or spectrum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    Scalar(f64),
    Array(Vec<f64>),
    Text(String),
}

impl AttrValue {
    /// The scalar payload, if this value is one.
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            AttrValue::Scalar(v) => Some(*v),
            _ => None,
        }
    }

    /// The array payload, if this value is one.
    pub fn as_array(&self) -> Option<Array1<f64>> {
        match self {
            AttrValue::Array(v) => Some(Array1::from_vec(v.clone())),
            _ => None,
        }
    }
}

/// String-keyed instrument metadata (exposure, laser power, sample name, ...).
pub type Metadata = HashMap<String, AttrValue>;

/// Raw payload of an external dataset: a single spectrum or a 2-D scan.
#[derive(Debug, Clone)]
pub enum DatasetData {
    OneD(Array1<f64>),
    TwoD(ndarray::Array2<f64>),
}

/// A named dataset handed over by the persistence layer: numeric payload plus an
/// attribute mapping. Only attribute access is modelled here; the store itself is
/// an external collaborator.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub data: DatasetData,
    pub attrs: Metadata,
}

impl Dataset {
    /// The wavelength axis (required for constructing spectra).
    pub fn wavelengths(&self) -> Option<Array1<f64>> {
        self.attrs.get("wavelengths").and_then(AttrValue::as_array)
    }

    /// The dark-current spectrum, under either of its historical keys.
    pub fn background(&self) -> Option<Array1<f64>> {
        self.attrs
            .get("background")
            .or_else(|| self.attrs.get("dark_counts"))
            .and_then(AttrValue::as_array)
    }

    /// The reference spectrum used for ratioing.
    pub fn reference(&self) -> Option<Array1<f64>> {
        self.attrs.get("reference").and_then(AttrValue::as_array)
    }

    /// Exposure / cycle time in seconds.
    pub fn exposure_s(&self) -> Option<f64> {
        self.attrs
            .get("Exposure")
            .or_else(|| self.attrs.get("cycle_time"))
            .and_then(AttrValue::as_scalar)
    }

    /// Laser power in mW.
    pub fn laser_power_mw(&self) -> Option<f64> {
        self.attrs.get("laser_power").and_then(AttrValue::as_scalar)
    }

    /// Excitation laser wavelength in nm.
    pub fn laser_wavelength_nm(&self) -> Option<f64> {
        self.attrs
            .get("laser_wavelength")
            .and_then(AttrValue::as_scalar)
    }

    /// Sample description.
    pub fn sample(&self) -> Option<&str> {
        match self.attrs.get("sample") {
            Some(AttrValue::Text(s)) => Some(s),
            _ => None,
        }
    }
}

/// Selects one of a spectrum's channels as the input of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Y,
    YRaw,
    YSmooth,
    YBaselined,
    YNorm,
    YFit,
    Baseline,
}

/// Fill policy when truncation bounds reach outside the measured x range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TruncateFill {
    /// Pad with a constant value.
    Constant(f64),
    /// Pad with the edge sample.
    Edge,
    /// Pad with NaN.
    NaN,
}

/// Dark-count input for intensity calibration.
#[derive(Debug, Clone)]
pub enum DarkCounts {
    None,
    Scalar(f64),
    PerPixel(Array1<f64>),
}

impl DarkCounts {
    fn value_at(&self, i: usize) -> f64 {
        match self {
            DarkCounts::None => 0.0,
            DarkCounts::Scalar(v) => *v,
            DarkCounts::PerPixel(arr) => arr[i],
        }
    }

    fn check_len(&self, n: usize) -> Result<()> {
        if let DarkCounts::PerPixel(arr) = self {
            SpecError::check_lengths(n, arr.len())?;
        }
        Ok(())
    }
}

/// Object containing xy data and the operations for general spectral analysis.
///
/// `x_raw` / `y_raw` are immutable snapshots taken at construction; every other
/// channel is derived and regenerated on demand. If a Raman excitation wavelength
/// is supplied, `x` holds wavenumbers (cm⁻¹) and `x_wl` caches the equivalent
/// wavelength axis in nm.
#[derive(Debug, Clone)]
pub struct Spectrum {
    pub x: Array1<f64>,
    pub y: Array1<f64>,
    x_raw: Array1<f64>,
    y_raw: Array1<f64>,
    /// Currently active x-range window (low, high).
    pub x_lim: (f64, f64),
    /// Cached wavelength axis (nm) when `x` is in wavenumbers.
    pub x_wl: Option<Array1<f64>>,
    pub y_smooth: Option<Array1<f64>>,
    pub y_baselined: Option<Array1<f64>>,
    pub y_norm: Option<Array1<f64>>,
    pub y_fit: Option<Array1<f64>>,
    pub baseline: Option<Array1<f64>>,
    pub attrs: Metadata,
}

impl Spectrum {
    /// Creates a spectrum from a pair of arrays.
    pub fn new(x: Array1<f64>, y: Array1<f64>) -> Result<Self> {
        if x.is_empty() {
            return Err(SpecError::EmptyInput("Spectrum x"));
        }
        SpecError::check_lengths(x.len(), y.len())?;

        let x_lim = x_span(&x);
        Ok(Spectrum {
            x_raw: x.clone(),
            y_raw: y.clone(),
            x,
            y,
            x_lim,
            x_wl: None,
            y_smooth: None,
            y_baselined: None,
            y_norm: None,
            y_fit: None,
            baseline: None,
            attrs: Metadata::new(),
        })
    }

    /// Creates a spectrum from an external dataset handle; the `wavelengths`
    /// attribute supplies the x axis and all attributes are carried over.
    pub fn from_dataset(dset: &Dataset) -> Result<Self> {
        let y = match &dset.data {
            DatasetData::OneD(arr) => arr.clone(),
            DatasetData::TwoD(_) => {
                return Err(SpecError::EmptyInput(
                    "Spectrum::from_dataset expects 1-D data",
                ))
            }
        };
        let x = dset
            .wavelengths()
            .ok_or(SpecError::MissingAttribute("wavelengths"))?;
        let mut spectrum = Spectrum::new(x, y)?;
        spectrum.attrs = dset.attrs.clone();
        Ok(spectrum)
    }

    /// Immutable snapshot of the x axis as constructed.
    pub fn x_raw(&self) -> &Array1<f64> {
        &self.x_raw
    }

    /// Immutable snapshot of the y data as constructed.
    pub fn y_raw(&self) -> &Array1<f64> {
        &self.y_raw
    }

    /// Borrow of a named channel, when it is present.
    pub fn channel(&self, channel: Channel) -> Option<&Array1<f64>> {
        match channel {
            Channel::Y => Some(&self.y),
            Channel::YRaw => Some(&self.y_raw),
            Channel::YSmooth => self.y_smooth.as_ref(),
            Channel::YBaselined => self.y_baselined.as_ref(),
            Channel::YNorm => self.y_norm.as_ref(),
            Channel::YFit => self.y_fit.as_ref(),
            Channel::Baseline => self.baseline.as_ref(),
        }
    }

    /// Converts the (wavelength, nm) x axis to Raman shift in cm⁻¹ for the given
    /// excitation, caching the original axis in `x_wl`.
    pub fn with_raman_excitation(mut self, laser_wl_nm: f64) -> Self {
        self.x_wl = Some(self.x.clone());
        self.x = wl_to_wn_arr(&self.x, laser_wl_nm);
        self.x_lim = x_span(&self.x);
        self
    }

    /// Recovers the wavelength axis from a wavenumber axis (cached or computed).
    pub fn wavelength_axis(&self, laser_wl_nm: f64) -> Array1<f64> {
        match &self.x_wl {
            Some(wl) => wl.clone(),
            None => wn_to_wl_arr(&self.x, laser_wl_nm),
        }
    }

    /// `x ← scale·x + shift`; used after coarse calibration shifts.
    pub fn scale_x(&mut self, scale: f64, shift: f64) {
        self.x.mapv_inplace(|v| v * scale + shift);
        self.x_lim = x_span(&self.x);
    }

    /// Replaces the x axis with a calibrated one of identical length.
    pub fn set_calibrated_x(&mut self, x_cal: Array1<f64>) -> Result<()> {
        SpecError::check_lengths(x_cal.len(), self.x.len())?;
        self.x = x_cal;
        self.x_lim = x_span(&self.x);
        Ok(())
    }

    /// Restricts the spectrum to `x_lo ≤ x ≤ x_hi`.
    ///
    /// A descending x axis is reversed internally and restored afterwards. Bounds
    /// outside the measured range extend the grid with step `|x[1] − x[0]|`,
    /// filling according to `fill` and interpolating linearly onto the extended
    /// grid; derived channels are dropped in that case (they cannot be extended)
    /// and are truncated alongside otherwise. Raw snapshots are preserved.
    pub fn truncate(&mut self, x_lo: f64, x_hi: f64, fill: TruncateFill) -> Result<()> {
        let (x_new, y_new, kept) = truncate_arrays(&self.x, &self.y, x_lo, x_hi, fill)?;

        match kept {
            Some(indices) => {
                for channel in [
                    &mut self.y_smooth,
                    &mut self.y_baselined,
                    &mut self.y_norm,
                    &mut self.y_fit,
                    &mut self.baseline,
                ] {
                    if let Some(data) = channel.take() {
                        *channel = Some(Array1::from_iter(indices.iter().map(|&i| data[i])));
                    }
                }
                if let Some(wl) = self.x_wl.take() {
                    self.x_wl = Some(Array1::from_iter(indices.iter().map(|&i| wl[i])));
                }
            }
            None => {
                // grid was extended: derived views are no longer meaningful
                self.y_smooth = None;
                self.y_baselined = None;
                self.y_norm = None;
                self.y_fit = None;
                self.baseline = None;
                self.x_wl = None;
            }
        }

        self.x = x_new;
        self.y = y_new;
        self.x_lim = (x_lo, x_hi);
        Ok(())
    }

    /// Maps a channel linearly so its minimum lands on `range.0` and its maximum on
    /// `range.1`, writing the result to `y_norm`.
    pub fn normalise(&mut self, range: (f64, f64), channel: Channel) -> Result<()> {
        let source = self
            .channel(channel)
            .ok_or(SpecError::EmptyInput("normalise source channel missing"))?;
        let min = source.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = source.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let span = max - min;
        let normed = if span == 0.0 {
            Array1::from_elem(source.len(), range.0)
        } else {
            source.mapv(|v| (v - min) / span * (range.1 - range.0) + range.0)
        };
        self.y_norm = Some(normed);
        Ok(())
    }

    /// Stores a Butterworth-filtered copy of `y` in `y_smooth`.
    pub fn smooth(&mut self, cutoff: f64, fs: f64, order: usize) -> Result<()> {
        self.y_smooth = Some(butter_lowpass_filtfilt(&self.y, cutoff, fs, order)?);
        Ok(())
    }

    /// Runs ALS baselining, storing the baseline and the baselined signal.
    pub fn baseline(&mut self, lam: f64, p: f64, niter: usize) -> Result<()> {
        let z = baseline_als(&self.y, lam, p, niter)?;
        self.y_baselined = Some(&self.y - &z);
        self.baseline = Some(z);
        Ok(())
    }

    /// Notch-aware ALS baselining (see `filters::baseline::baseline_als_notch`).
    pub fn baseline_notch(
        &mut self,
        lam: f64,
        p: f64,
        niter: usize,
        notch: (f64, f64),
    ) -> Result<()> {
        let z = baseline_als_notch(&self.x, &self.y, lam, p, niter, notch)?;
        self.y_baselined = Some(&self.y - &z);
        self.baseline = Some(z);
        Ok(())
    }

    /// In-place cosmic-ray repair of `y`.
    pub fn remove_cosmic_ray(&mut self, opts: CosmicRayOptions) -> Result<()> {
        self.y = remove_cosmic_rays(&self.y, opts)?;
        Ok(())
    }

    /// Converts raw counts to counts/mW/s and applies the spectral efficiency
    /// correction: `y ← (y − dark) / (R · power · exposure)`.
    ///
    /// Laser power is in mW and exposure in seconds; both fall back to the
    /// dataset attributes (`laser_power`, `Exposure`/`cycle_time`) when `None`.
    /// Samples where `R` is non-positive or non-finite are masked as NaN.
    pub fn calibrate_intensity(
        &mut self,
        r_setup: Option<&Array1<f64>>,
        dark_counts: &DarkCounts,
        laser_power_mw: Option<f64>,
        exposure_s: Option<f64>,
    ) -> Result<()> {
        let power = laser_power_mw
            .or_else(|| self.attrs.get("laser_power").and_then(AttrValue::as_scalar))
            .ok_or(SpecError::MissingAttribute("laser_power"))?;
        let exposure = exposure_s
            .or_else(|| self.attrs.get("Exposure").and_then(AttrValue::as_scalar))
            .or_else(|| self.attrs.get("cycle_time").and_then(AttrValue::as_scalar))
            .ok_or(SpecError::MissingAttribute("Exposure"))?;

        dark_counts.check_len(self.y.len())?;
        if let Some(r) = r_setup {
            SpecError::check_lengths(self.y.len(), r.len())?;
        }

        let mut masked = 0usize;
        let n = self.y.len();
        for i in 0..n {
            let r = r_setup.map(|r| r[i]).unwrap_or(1.0);
            if !(r > 0.0) || !r.is_finite() {
                self.y[i] = f64::NAN;
                masked += 1;
                continue;
            }
            self.y[i] = (self.y[i] - dark_counts.value_at(i)) / (r * power * exposure);
        }
        if masked > 0 {
            log::warn!("calibrate_intensity: masked {masked} samples with degenerate response");
        }
        Ok(())
    }
}

fn x_span(x: &Array1<f64>) -> (f64, f64) {
    let min = x.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = x.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    (min, max)
}

/// Shared truncation kernel for 1-D data.
///
/// Returns the truncated `(x, y)` pair and, when no grid extension happened, the
/// kept source indices (in output order) so parallel channels can be sliced the
/// same way.
pub(crate) fn truncate_arrays(
    x: &Array1<f64>,
    y: &Array1<f64>,
    x_lo: f64,
    x_hi: f64,
    fill: TruncateFill,
) -> Result<(Array1<f64>, Array1<f64>, Option<Vec<usize>>)> {
    if x.is_empty() {
        return Err(SpecError::EmptyInput("truncate x"));
    }
    SpecError::check_lengths(x.len(), y.len())?;

    let n = x.len();
    let descending = x[0] > x[n - 1];

    let (xs, ys, src_index): (Vec<f64>, Vec<f64>, Vec<usize>) = if descending {
        (
            x.iter().rev().cloned().collect(),
            y.iter().rev().cloned().collect(),
            (0..n).rev().collect(),
        )
    } else {
        (x.to_vec(), y.to_vec(), (0..n).collect())
    };

    let x_min = xs[0];
    let x_max = xs[n - 1];

    if x_lo < x_min || x_hi > x_max {
        // extend the grid and interpolate; original indices are lost
        let step = (xs[1] - xs[0]).abs();
        if step == 0.0 {
            return Err(SpecError::InvalidParameter {
                name: "x step",
                value: 0.0,
            });
        }
        let start = x_lo.min(x_min);
        let end = x_hi.max(x_max);
        let count = ((end - start) / step).floor() as usize + 1;
        let x_ext: Vec<f64> = (0..count).map(|i| start + i as f64 * step).collect();

        let (pad_lo, pad_hi) = match fill {
            TruncateFill::Constant(v) => (v, v),
            TruncateFill::Edge => (ys[0], ys[n - 1]),
            TruncateFill::NaN => (f64::NAN, f64::NAN),
        };
        let mut xp = Vec::with_capacity(n + 2);
        let mut fp = Vec::with_capacity(n + 2);
        xp.push(start - step);
        fp.push(pad_lo);
        xp.extend_from_slice(&xs);
        fp.extend_from_slice(&ys);
        xp.push(end + step);
        fp.push(pad_hi);

        let mut x_out = Vec::new();
        let mut y_out = Vec::new();
        for &xv in &x_ext {
            if xv >= x_lo && xv <= x_hi {
                x_out.push(xv);
                y_out.push(interp_linear(xv, &xp, &fp));
            }
        }
        if x_out.is_empty() {
            return Err(SpecError::EmptyInput("truncate window"));
        }
        if descending {
            x_out.reverse();
            y_out.reverse();
        }
        return Ok((Array1::from_vec(x_out), Array1::from_vec(y_out), None));
    }

    let mut kept: Vec<usize> = Vec::new();
    let mut x_out = Vec::new();
    let mut y_out = Vec::new();
    for i in 0..n {
        if xs[i] >= x_lo && xs[i] <= x_hi {
            kept.push(src_index[i]);
            x_out.push(xs[i]);
            y_out.push(ys[i]);
        }
    }
    if x_out.is_empty() {
        return Err(SpecError::EmptyInput("truncate window"));
    }
    if descending {
        kept.reverse();
        x_out.reverse();
        y_out.reverse();
    }
    Ok((Array1::from_vec(x_out), Array1::from_vec(y_out), Some(kept)))
}
