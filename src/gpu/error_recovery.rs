//! Per-emitter dispatch guard
//!
//! Wraps each emitter's simulation step so a device error or a panic inside
//! a backend costs that emitter one frame and nothing more.

use super::backend::GpuError;
use std::panic;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

pub struct DispatchGuard {
    /// Set once a backend reports the device as lost
    device_lost: AtomicBool,
    /// Failures since the last successful step
    consecutive_failures: AtomicU32,
    /// Failures over the guard's lifetime
    total_failures: AtomicU32,
    /// Consecutive failures after which a warning is logged
    warn_threshold: u32,
}

impl DispatchGuard {
    pub fn new(warn_threshold: u32) -> Self {
        Self {
            device_lost: AtomicBool::new(false),
            consecutive_failures: AtomicU32::new(0),
            total_failures: AtomicU32::new(0),
            warn_threshold,
        }
    }

    pub fn is_device_lost(&self) -> bool {
        self.device_lost.load(Ordering::Relaxed)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    pub fn total_failures(&self) -> u32 {
        self.total_failures.load(Ordering::Relaxed)
    }

    /// Run one emitter step, converting panics into `GpuError::Panic`
    pub fn execute<F, R>(&self, operation: F) -> Result<R, GpuError>
    where
        F: FnOnce() -> Result<R, GpuError>,
    {
        if self.is_device_lost() {
            return Err(GpuError::DeviceLost);
        }

        let result = panic::catch_unwind(panic::AssertUnwindSafe(operation));

        let error = match result {
            Ok(Ok(value)) => {
                self.consecutive_failures.store(0, Ordering::Relaxed);
                return Ok(value);
            }
            Ok(Err(e)) => e,
            Err(panic_info) => {
                let message = if let Some(s) = panic_info.downcast_ref::<String>() {
                    s.clone()
                } else if let Some(s) = panic_info.downcast_ref::<&str>() {
                    s.to_string()
                } else {
                    "Unknown panic".to_string()
                };
                log::error!("[DispatchGuard] Emitter step panicked: {}", message);
                GpuError::Panic { message }
            }
        };

        if error == GpuError::DeviceLost {
            log::error!("[DispatchGuard] Device lost, disabling further dispatches");
            self.device_lost.store(true, Ordering::Relaxed);
        }

        self.total_failures.fetch_add(1, Ordering::Relaxed);
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures == self.warn_threshold {
            log::warn!(
                "[DispatchGuard] {} consecutive dispatch failures",
                failures
            );
        }

        Err(error)
    }
}

impl Default for DispatchGuard {
    fn default() -> Self {
        Self::new(10)
    }
}
