//! Baseline estimation and denoising filters for nano-optics spectra.
//!
//! This module contains the numerical filters that prepare raw instrument traces
//! for peak analysis. They operate on plain arrays and are composed by the
//! `Spectrum` / `Timescan` containers.
//!
//! # Filter Categories
//!
//! * **Baseline estimation**: iterative asymmetric least-squares background fitting,
//!   including a notch-aware variant and a cancellable parallel batch form.
//!
//! * **Smoothing**: zero-phase Butterworth low-pass filtering (forward-backward
//!   biquad cascade), for 1-D spectra and row-wise for timescans.
//!
//! * **Spike repair**: iterative cosmic-ray detection and replacement against a
//!   smoothed copy of the signal.

/// Asymmetric least-squares baseline estimation.
pub mod baseline;

/// Iterative cosmic-ray detection and repair.
pub mod cosmic_ray;

/// Zero-phase Butterworth low-pass smoothing.
pub mod smoothing;
