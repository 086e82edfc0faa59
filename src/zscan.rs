//! Dark-field z-scan handling: referencing, collection-path alignment checks,
//! chromatic-aberration-aware condensation of a focus stack into a single
//! spectrum, and the NPoM classification heuristic applied to the result.
//!
//! A z-scan is a 2-D stack of dark-field spectra taken at different axial focus
//! positions. Because of chromatic aberration the best focus drifts with
//! wavelength, so condensation tracks the per-wavelength intensity maximum along
//! the focus axis, smooths that trajectory, and interpolates between the two
//! neighbouring focus rows.

use crate::error::{Result, SpecError};
use crate::filters::cosmic_ray::{remove_cosmic_rays, CosmicRayOptions};
use crate::filters::smoothing::butter_lowpass_filtfilt;
use crate::math_tools::{detect_maxima, remove_nans, trapz};
use crate::spectrum::Spectrum;
use interp1d::Interp1d;
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Construction options for a z-scan stack.
#[derive(Debug, Clone, Copy)]
pub struct ZScanOptions {
    /// Focus range used when the stage positions are not recorded.
    pub z_min: f64,
    pub z_max: f64,
    /// Leading focus rows to drop; the first acquisitions of a stack suffer from
    /// spectrometer readout artefacts.
    pub z_trim: usize,
}

impl Default for ZScanOptions {
    fn default() -> Self {
        ZScanOptions {
            z_min: -3.0,
            z_max: 3.0,
            z_trim: 2,
        }
    }
}

/// Result of the collection-path alignment check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlignmentReport {
    pub aligned: bool,
    /// Trapezoidal integral of the focus profile over the central 50%.
    pub mid_intensity: f64,
    /// Integral over the two outer 25% segments.
    pub edge_intensity: f64,
    pub ratio: f64,
}

/// A z-scan stack: spectra (rows) over focus positions `dz`, on wavelength axis `x`.
#[derive(Debug, Clone)]
pub struct ZScan {
    pub x: Array1<f64>,
    pub dz: Array1<f64>,
    /// The (Z, N) stack.
    pub scan: Array2<f64>,
}

impl ZScan {
    /// Builds a stack from raw data, generating the focus axis from `opts` and
    /// dropping the first `z_trim` rows.
    pub fn new(x: Array1<f64>, scan: Array2<f64>, opts: ZScanOptions) -> Result<Self> {
        if x.is_empty() || scan.nrows() == 0 {
            return Err(SpecError::EmptyInput("ZScan data"));
        }
        if scan.ncols() != x.len() {
            return Err(SpecError::ShapeMismatch {
                expected: (scan.nrows(), x.len()),
                actual: (scan.nrows(), scan.ncols()),
            });
        }
        if scan.nrows() <= opts.z_trim + 1 {
            return Err(SpecError::EmptyInput("ZScan rows after trim"));
        }

        let total = scan.nrows();
        let dz_full = Array1::linspace(opts.z_min, opts.z_max, total);
        let dz = dz_full.slice(ndarray::s![opts.z_trim..]).to_owned();
        let scan = scan.slice(ndarray::s![opts.z_trim.., ..]).to_owned();
        Ok(ZScan { x, dz, scan })
    }

    /// Builds a stack with explicit focus positions, without trimming.
    pub fn with_focus_axis(x: Array1<f64>, scan: Array2<f64>, dz: Array1<f64>) -> Result<Self> {
        if x.is_empty() || scan.nrows() == 0 {
            return Err(SpecError::EmptyInput("ZScan data"));
        }
        if scan.ncols() != x.len() || scan.nrows() != dz.len() {
            return Err(SpecError::ShapeMismatch {
                expected: (dz.len(), x.len()),
                actual: (scan.nrows(), scan.ncols()),
            });
        }
        Ok(ZScan { x, dz, scan })
    }

    /// Background-subtracts and references every row: `Z ← (Z − bg) / ref`.
    ///
    /// Zeros in the reference are repaired by interpolation from their
    /// neighbours before dividing.
    pub fn reference(&mut self, background: &Array1<f64>, reference: &Array1<f64>) -> Result<()> {
        SpecError::check_lengths(self.x.len(), background.len())?;
        SpecError::check_lengths(self.x.len(), reference.len())?;

        let marked = reference.mapv(|v| if v == 0.0 { f64::NAN } else { v });
        let safe_ref = remove_nans(&marked);

        for t in 0..self.scan.nrows() {
            for i in 0..self.x.len() {
                self.scan[[t, i]] = (self.scan[[t, i]] - background[i]) / safe_ref[i];
            }
        }
        Ok(())
    }

    /// Checks whether the particle sat in the collection path.
    ///
    /// The wavelength-averaged intensity profile versus focus position is
    /// interpolated onto a dense grid; the stack is aligned when the trapezoidal
    /// integral over the central 50% of the focus range exceeds
    /// `brightness_threshold` times the integral over the two outer 25%s.
    pub fn check_alignment(&self, brightness_threshold: f64) -> Result<AlignmentReport> {
        let profile = self.scan.mean_axis(Axis(1)).unwrap();

        if self.dz.len() < 2 {
            return Err(SpecError::EmptyInput("alignment profile"));
        }
        // the focus axis is validated non-empty above, so construction cannot fail
        let interp = Interp1d::new_unsorted(self.dz.to_vec(), profile.to_vec())
            .expect("failed to create interpolator");

        let dense_n = 201;
        let z0 = self.dz[0];
        let z1 = self.dz[self.dz.len() - 1];
        let dense_z = Array1::linspace(z0, z1, dense_n);
        let dense_profile = dense_z.mapv(|z| interp.interpolate(z));

        let span = z1 - z0;
        let mid_lo = z0 + 0.25 * span;
        let mid_hi = z0 + 0.75 * span;

        let segment = |lo: f64, hi: f64| -> f64 {
            let xs: Vec<f64> = dense_z.iter().cloned().filter(|&z| z >= lo && z <= hi).collect();
            let ys: Vec<f64> = dense_z
                .iter()
                .zip(dense_profile.iter())
                .filter(|(z, _)| **z >= lo && **z <= hi)
                .map(|(_, v)| *v)
                .collect();
            trapz(&Array1::from_vec(xs), &Array1::from_vec(ys))
        };

        let mid = segment(mid_lo, mid_hi);
        let edge = segment(z0, mid_lo) + segment(mid_hi, z1);
        let ratio = if edge > 0.0 { mid / edge } else { f64::INFINITY };

        Ok(AlignmentReport {
            aligned: ratio > brightness_threshold,
            mid_intensity: mid,
            edge_intensity: edge,
            ratio,
        })
    }

    /// Legacy condensation: the per-wavelength maximum over focus positions.
    pub fn condense_max(&self) -> Result<Spectrum> {
        let y = Array1::from_iter((0..self.x.len()).map(|i| {
            self.scan
                .column(i)
                .iter()
                .cloned()
                .fold(f64::NEG_INFINITY, f64::max)
        }));
        Spectrum::new(self.x.clone(), y)
    }

    /// Chromatic-aberration-aware condensation into a single best-focus spectrum.
    ///
    /// For each wavelength the focus row of maximum intensity is found; the
    /// resulting index-versus-wavelength trajectory is low-pass filtered
    /// (`cutoff`, `fs`, `order`), clamped to the stack, and the output intensity
    /// is linearly interpolated between the two neighbouring focus rows at the
    /// smoothed index. Cosmic rays can optionally be repaired on the result.
    pub fn condense(
        &self,
        cutoff: f64,
        fs: f64,
        order: usize,
        cosmic_ray: Option<CosmicRayOptions>,
    ) -> Result<Spectrum> {
        let n = self.x.len();
        let rows = self.scan.nrows();

        let argmax = Array1::from_iter((0..n).map(|i| {
            self.scan
                .column(i)
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map(|(t, _)| t as f64)
                .unwrap_or(0.0)
        }));

        let trajectory = butter_lowpass_filtfilt(&argmax, cutoff, fs, order)?
            .mapv(|v| v.clamp(0.0, (rows - 1) as f64));

        let mut y = Array1::zeros(n);
        for i in 0..n {
            let lower = trajectory[i].floor() as usize;
            let upper = (lower + 1).min(rows - 1);
            let frac = if upper > lower {
                trajectory[i] - lower as f64
            } else {
                0.0
            };
            y[i] = self.scan[[lower, i]] * (1.0 - frac) + self.scan[[upper, i]] * frac;
        }

        if let Some(opts) = cosmic_ray {
            y = remove_cosmic_rays(&y, opts)?;
        }
        Spectrum::new(self.x.clone(), y)
    }
}

/// Tunables for the NPoM classification heuristic.
#[derive(Debug, Clone, Copy)]
pub struct NpomTestOptions {
    /// Rule 1: minimum total integrated intensity.
    pub min_total_intensity: f64,
    /// Rule 1: optional maximum (rejects saturated or aggregate captures).
    pub max_total_intensity: Option<f64>,
    /// Rule 2: the long-wavelength half must exceed the short half by this factor.
    pub coupled_mode_ratio: f64,
    /// Rule 3: the out-of-band tail may hold at most this fraction of the
    /// in-band integral.
    pub max_tail_fraction: f64,
    /// In-band window (nm) used by rules 2 – 4.
    pub band: (f64, f64),
    /// Rule 4: required number of in-band spectral maxima.
    pub required_maxima: usize,
    /// Maxima below this fraction of the in-band maximum are not counted.
    pub maxima_threshold: f64,
    /// Butterworth design for the pre-classification smoothing.
    pub smoothing: (f64, f64, usize),
}

impl Default for NpomTestOptions {
    fn default() -> Self {
        NpomTestOptions {
            min_total_intensity: 0.0,
            max_total_intensity: None,
            coupled_mode_ratio: 1.1,
            max_tail_fraction: 0.5,
            band: (450.0, 900.0),
            required_maxima: 1,
            maxima_threshold: 0.1,
            smoothing: (1500.0, 60000.0, 5),
        }
    }
}

impl NpomTestOptions {
    /// Size-dependent defaults: larger particles show both the transverse and
    /// the coupled mode, so two maxima are required from 80 nm up.
    pub fn for_np_size(np_size_nm: f64) -> Self {
        NpomTestOptions {
            required_maxima: if np_size_nm >= 80.0 { 2 } else { 1 },
            ..NpomTestOptions::default()
        }
    }
}

/// Outcome of the NPoM classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NpomVerdict {
    pub is_npom: bool,
    /// The rule that triggered rejection, when one did.
    pub reason: Option<String>,
    /// Wavelength of the tallest smoothed in-band maximum (NaN when none).
    pub critical_wl: f64,
}

/// Classifies a condensed dark-field spectrum as NPoM or not.
///
/// All four rules must hold: sufficient (bounded) total intensity, coupled-mode
/// dominance of the long-wavelength half, a quiet out-of-band tail, and the
/// size-dependent number of in-band maxima. The first failing rule is recorded.
pub fn classify_npom(spectrum: &Spectrum, opts: NpomTestOptions) -> Result<NpomVerdict> {
    let x = &spectrum.x;
    let y = &spectrum.y;
    if x.is_empty() {
        return Err(SpecError::EmptyInput("classify_npom spectrum"));
    }

    let (cutoff, fs, order) = opts.smoothing;
    let y_smooth = butter_lowpass_filtfilt(y, cutoff, fs, order)?;

    let (band_lo, band_hi) = opts.band;
    let in_band: Vec<usize> = (0..x.len())
        .filter(|&i| x[i] >= band_lo && x[i] <= band_hi)
        .collect();
    SpecError::check_non_empty(&in_band, "classify_npom band")?;

    // critical wavelength from the tallest smoothed in-band maximum
    let band_y = Array1::from_iter(in_band.iter().map(|&i| y_smooth[i]));
    let band_max = band_y.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let maxima = detect_maxima(&band_y, opts.maxima_threshold * band_max, f64::INFINITY);
    let critical_wl = maxima
        .iter()
        .max_by(|&&a, &&b| band_y[a].total_cmp(&band_y[b]))
        .map(|&i| x[in_band[i]])
        .unwrap_or(f64::NAN);

    let reject = |reason: &str| NpomVerdict {
        is_npom: false,
        reason: Some(reason.to_string()),
        critical_wl,
    };

    // rule 1: total integrated intensity window
    let band_sum: f64 = in_band.iter().map(|&i| y[i]).sum();
    if band_sum <= opts.min_total_intensity {
        return Ok(reject("total intensity below minimum"));
    }
    if let Some(max_total) = opts.max_total_intensity {
        if band_sum >= max_total {
            return Ok(reject("total intensity above maximum"));
        }
    }

    // rule 2: coupled-mode presence at long wavelengths
    let half = in_band.len() / 2;
    let first_half: f64 = in_band[..half].iter().map(|&i| y[i]).sum();
    let second_half: f64 = in_band[half..].iter().map(|&i| y[i]).sum();
    if second_half < first_half * opts.coupled_mode_ratio {
        return Ok(reject("no coupled mode at long wavelengths"));
    }

    // rule 3: out-of-band tail must be quiet
    let tail_sum: f64 = (0..x.len())
        .filter(|i| !in_band.contains(i))
        .map(|i| y[i].abs())
        .sum();
    if tail_sum > opts.max_tail_fraction * band_sum.abs() {
        return Ok(reject("out-of-band tail too strong"));
    }

    // rule 4: spectral structure
    if maxima.len() < opts.required_maxima {
        return Ok(reject("not enough spectral maxima"));
    }

    Ok(NpomVerdict {
        is_npom: true,
        reason: None,
        critical_wl,
    })
}
