//! Backend abstraction - Multi-backend support
//!
//! The CPU backend (NdArray) is always available. An accelerator backend is
//! compiled in with the `wgpu` or `cuda` feature; CUDA wins when both are on.
//! The device is chosen once at startup and passed explicitly from there.

use burn::backend::{Autodiff, NdArray};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// CPU inference backend
pub type CpuBackend = NdArray;

/// CPU training backend
pub type CpuTrainingBackend = Autodiff<CpuBackend>;

#[cfg(feature = "cuda")]
pub type AcceleratorBackend = burn::backend::Cuda;

#[cfg(all(feature = "wgpu", not(feature = "cuda")))]
pub type AcceleratorBackend = burn::backend::Wgpu;

/// Accelerator training backend
#[cfg(any(feature = "cuda", feature = "wgpu"))]
pub type AcceleratorTrainingBackend = Autodiff<AcceleratorBackend>;

/// Where the computation runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
pub enum DeviceKind {
    /// General-purpose processor
    #[default]
    Cpu,
    /// GPU through the compiled-in accelerator backend
    Accelerator,
}

/// Whether an accelerator backend was compiled in
pub fn accelerator_available() -> bool {
    cfg!(any(feature = "cuda", feature = "wgpu"))
}

/// Map a requested device onto one this build can serve
///
/// Returns the device to use and whether the request had to be downgraded.
pub fn resolve_device(requested: DeviceKind) -> (DeviceKind, bool) {
    match requested {
        DeviceKind::Accelerator if !accelerator_available() => (DeviceKind::Cpu, true),
        other => (other, false),
    }
}

/// Get a human-readable name for a device kind in this build
pub fn backend_name(kind: DeviceKind) -> &'static str {
    match kind {
        DeviceKind::Cpu => "NdArray (CPU)",
        DeviceKind::Accelerator => {
            if cfg!(feature = "cuda") {
                "CUDA (GPU)"
            } else if cfg!(feature = "wgpu") {
                "WGPU (GPU)"
            } else {
                "unavailable"
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_always_resolves() {
        assert_eq!(resolve_device(DeviceKind::Cpu), (DeviceKind::Cpu, false));
        assert_eq!(backend_name(DeviceKind::Cpu), "NdArray (CPU)");
    }

    #[test]
    fn test_accelerator_falls_back_without_feature() {
        let (kind, downgraded) = resolve_device(DeviceKind::Accelerator);
        if accelerator_available() {
            assert_eq!(kind, DeviceKind::Accelerator);
            assert!(!downgraded);
        } else {
            assert_eq!(kind, DeviceKind::Cpu);
            assert!(downgraded);
        }
    }
}
