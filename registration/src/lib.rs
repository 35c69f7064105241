//! Coherent Point Drift point set registration
//!
//! This crate provides:
//! - Gaussian affinity kernels
//! - The direct Gauss transform producing soft correspondence aggregates
//! - Nonrigid CPD with a precision (pivoted QR) and a performance
//!   (unpivoted QR) solver
//! - The EM driver and one-shot `nonrigid`/`nonrigid_quick` entry points

pub mod registration;

pub use registration::{
    affinity, default_sigma2, estimate_sigma2, gauss_transform, nonrigid, nonrigid_quick, run,
    Error, Nonrigid, NonrigidConfig, NonrigidQuick, Normalization, Performance, PointSet,
    Precision, Probabilities, RegistrationOptions, RegistrationResult, RegularizationTarget,
    Result, SolverPolicy, Transform,
};
