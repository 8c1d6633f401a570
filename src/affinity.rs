//! CPU pinning for worker processes.
//!
//! Pinning is an optimization (cache locality, less cross-core scheduling
//! jitter), not a correctness requirement: callers log a failure and move on.
//! The single-execution-unit restriction that accompanies pinning is enforced
//! by running the worker on a current-thread runtime, not here.

use derive_more::{Display, Error};

/// Why pinning did not happen.
#[derive(Debug, Display, Error)]
pub enum AffinityError {
    /// This platform has no usable affinity API.
    #[display("cpu affinity is not supported on this platform")]
    Unsupported,

    /// The kernel rejected the affinity mask.
    #[display("sched_setaffinity failed: {_0}")]
    Syscall(nix::errno::Errno),
}

/// Asks the OS to keep this process on `core`.
#[cfg(any(target_os = "linux", target_os = "android"))]
pub(crate) fn pin_to_core(core: usize) -> Result<(), AffinityError> {
    use nix::sched::{sched_setaffinity, CpuSet};
    use nix::unistd::Pid;

    let mut cpus = CpuSet::new();
    cpus.set(core).map_err(AffinityError::Syscall)?;
    sched_setaffinity(Pid::from_raw(0), &cpus).map_err(AffinityError::Syscall)
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
pub(crate) fn pin_to_core(_core: usize) -> Result<(), AffinityError> {
    Err(AffinityError::Unsupported)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(target_os = "linux")]
    #[test]
    fn pinning_uses_the_platform_api() {
        // Core 0 can sit outside a restricted cpuset, so a syscall error is
        // tolerated here; Unsupported on linux is not.
        match pin_to_core(0) {
            Ok(()) | Err(AffinityError::Syscall(_)) => {}
            Err(AffinityError::Unsupported) => panic!("affinity unsupported on linux"),
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn pinning_to_an_absurd_core_fails() {
        // CpuSet capacity is 1024 cores; index out of range must error, not
        // silently pin elsewhere.
        assert!(pin_to_core(1 << 20).is_err());
    }
}
