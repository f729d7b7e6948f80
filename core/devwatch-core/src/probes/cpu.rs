use super::Probe;
use crate::error::{CoreError, Result};
use std::time::Duration;
use sysinfo::System;

/// Time to wait after [`CpuProbe::new`] before the first sample means
/// anything. sysinfo reports noise for shorter windows.
pub const CPU_SAMPLE_WINDOW: Duration = Duration::from_secs(1);

/// Whole-machine CPU usage since the previous sample.
///
/// The `System` handle is kept between ticks so each reading covers the last
/// poll interval instead of a fresh one-second window.
pub struct CpuProbe {
    system: System,
}

impl CpuProbe {
    /// Primes the counters. Wait [`CPU_SAMPLE_WINDOW`] before sampling.
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu();
        Self { system }
    }
}

impl Default for CpuProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl Probe for CpuProbe {
    type Output = f32;

    fn name(&self) -> &'static str {
        "cpu"
    }

    fn sample(&mut self) -> Result<f32> {
        self.system.refresh_cpu();
        if self.system.cpus().is_empty() {
            return Err(CoreError::probe("cpu", "no CPUs reported"));
        }
        let usage = self.system.global_cpu_info().cpu_usage();
        if !usage.is_finite() {
            return Err(CoreError::probe("cpu", format!("non-finite usage {}", usage)));
        }
        Ok(usage.clamp(0.0, 100.0))
    }

    fn neutral(&self) -> f32 {
        0.0
    }
}
