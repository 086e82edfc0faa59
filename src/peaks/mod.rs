//! Peak detection, seeding and fitting.
//!
//! The pipeline runs in three stages: extremum detection walks the derivative
//! state machine over a (usually smoothed) trace; greedy Gaussian decomposition
//! turns detected maxima into analytic `(height, center, width, fraction)` seeds;
//! and the bounded nonlinear multi-peak fit refines the seeds into calibrated
//! peak records with standard errors, falling back to reduced seed subsets when
//! the solver does not converge.

/// Extremum detection with thresholds and boundary policy.
pub mod detect;

/// Greedy Gaussian decomposition into analytic seeds.
pub mod seed;

/// Bounded multi-Gaussian / Lorentzian nonlinear fitting.
pub mod fit;
