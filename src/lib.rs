pub use cpd_core as core;
pub use cpd_registration as registration;

pub use cpd_core::{Error, PointSet, Result, Vector};
pub use cpd_registration::{
    nonrigid, nonrigid_quick, run, Nonrigid, NonrigidConfig, NonrigidQuick, Performance,
    Precision, Probabilities, RegistrationOptions, RegistrationResult, RegularizationTarget,
    Transform,
};

/// Initialize a single global Rayon thread pool for the parallel kernels.
///
/// Call this once at application startup before registering large point sets.
/// Repeated calls are idempotent and return the first initialization result.
///
/// Priority order:
/// 1. explicit `num_threads`
/// 2. `CPD_CPU_THREADS` env var
/// 3. Rayon default
pub fn init_thread_pool(num_threads: Option<usize>) -> Result<()> {
    cpd_core::init_global_thread_pool(num_threads)
}

/// Worker count of the Rayon pool the parallel kernels run on.
pub fn current_cpu_threads() -> usize {
    cpd_core::current_cpu_threads()
}
