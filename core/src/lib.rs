//! Shared building blocks for the CPD registration workspace
//!
//! - [`PointSet`]/[`Vector`]: dense `f64` matrices, one row per point
//! - [`Error`]/[`Result`]: the error type used by every crate in the workspace
//! - [`runtime`]: global Rayon pool configuration for the parallel kernels

pub mod point_set;
pub mod runtime;

pub use point_set::*;
pub use runtime::{current_cpu_threads, init_global_thread_pool};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("Not initialized: {0}")]
    NotInitialized(String),

    #[error("Degenerate input: {0}")]
    DegenerateInput(String),

    #[error("Runtime error: {0}")]
    RuntimeError(String),
}

impl Error {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    pub fn dimension_mismatch(msg: impl Into<String>) -> Self {
        Self::DimensionMismatch(msg.into())
    }

    pub fn not_initialized(msg: impl Into<String>) -> Self {
        Self::NotInitialized(msg.into())
    }

    pub fn degenerate(msg: impl Into<String>) -> Self {
        Self::DegenerateInput(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn helpers_build_matching_variants() {
        assert!(matches!(Error::invalid_config("a"), Error::InvalidConfig(m) if m == "a"));
        assert!(matches!(
            Error::dimension_mismatch(String::from("b")),
            Error::DimensionMismatch(m) if m == "b"
        ));
        assert!(matches!(Error::not_initialized("c"), Error::NotInitialized(m) if m == "c"));
        assert!(matches!(Error::degenerate("d"), Error::DegenerateInput(m) if m == "d"));
    }

    #[test]
    fn display_prefixes_the_kind() {
        assert_eq!(Error::degenerate("x").to_string(), "Degenerate input: x");
        assert_eq!(
            Error::not_initialized("call init").to_string(),
            "Not initialized: call init"
        );
    }
}
