//! Spectral processing core for nano-optics experiments.
//!
//! This crate turns raw instrument traces from single nanoparticle-on-mirror
//! (NPoM) constructs and molecular monolayer aggregates into calibrated,
//! denoised, decomposed spectra: SERS timescans, dark-field z-scans and
//! photoluminescence traces share the same pipeline of containers and numeric
//! primitives.
//!
//! The five cooperating subsystems:
//!
//! * [`spectrum`] / [`timescan`] — the 1-D and 2-D data containers with raw
//!   snapshots, derived channels and lifecycle operations.
//! * [`filters`] — asymmetric least-squares baselining, zero-phase Butterworth
//!   smoothing and cosmic-ray repair.
//! * [`peaks`] — extremum detection, greedy Gaussian seeding and bounded
//!   multi-peak fitting.
//! * [`calibration`] — polynomial x-axis re-mapping against literature peak
//!   positions and the white-light efficiency curve.
//! * [`zscan`] — dark-field focus stacks: alignment checks, chromatic-aware
//!   condensation and NPoM classification.
//!
//! Persistence, plotting and interactive screening are external collaborators;
//! everything here is pure computation over arrays.

pub mod calibration;
pub mod error;
pub mod filters;
pub mod math_tools;
pub mod peaks;
pub mod spectrum;
pub mod timescan;
pub mod zscan;

pub use calibration::{
    calibrate_x_axis, find_closest_matches, polyfit, white_scatter_calibration, CubicSpline,
    Polynomial, XAxisCalibration,
};
pub use error::{Result, SpecError};
pub use filters::baseline::{baseline_als, baseline_als_batch, baseline_als_notch};
pub use filters::cosmic_ray::{remove_cosmic_rays, CosmicRayOptions};
pub use filters::smoothing::{butter_lowpass_filtfilt, butter_lowpass_filtfilt_rows};
pub use math_tools::HENE_WAVELENGTH_NM;
pub use peaks::fit::{
    fit_gaussians, fit_lorentzian, FitFailure, FitOptions, FitOutcome, FittedPeak, LorentzianFit,
    PeakFit,
};
pub use peaks::seed::{approx_peak_gausses, GaussianSeed, SeedOptions};
pub use spectrum::{
    AttrValue, Channel, DarkCounts, Dataset, DatasetData, Metadata, Spectrum, TruncateFill,
};
pub use timescan::{AutoLevelOptions, Timescan};
pub use zscan::{classify_npom, AlignmentReport, NpomTestOptions, NpomVerdict, ZScan, ZScanOptions};
