//! System metric sampling for monitor triggers

use shovel_core::domain::trigger::Metric;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use sysinfo::{MINIMUM_CPU_UPDATE_INTERVAL, System};

/// Source of system utilisation samples, in percent
pub trait MetricSource: Send + Sync {
    /// Take one synchronous sample of `metric`
    fn sample(&self, metric: Metric) -> anyhow::Result<f64>;
}

struct Sampler {
    system: System,
    cpu_refreshed_at: Instant,
}

/// Samples the host through `sysinfo`
///
/// CPU usage is computed between consecutive refreshes, so the first sample
/// after construction covers the time since [`SystemMetrics::new`]. Samples
/// taken within [`MINIMUM_CPU_UPDATE_INTERVAL`] of the last refresh reuse
/// it, so monitors polling on the same tick all see the same reading.
pub struct SystemMetrics {
    sampler: Mutex<Sampler>,
}

impl SystemMetrics {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_usage();
        system.refresh_memory();
        Self {
            sampler: Mutex::new(Sampler {
                system,
                cpu_refreshed_at: Instant::now(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Sampler> {
        self.sampler.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn cpu_percent(&self) -> f64 {
        let mut sampler = self.lock();
        if sampler.cpu_refreshed_at.elapsed() >= MINIMUM_CPU_UPDATE_INTERVAL {
            sampler.system.refresh_cpu_usage();
            sampler.cpu_refreshed_at = Instant::now();
        }
        f64::from(sampler.system.global_cpu_usage())
    }

    pub fn memory_percent(&self) -> anyhow::Result<f64> {
        let mut sampler = self.lock();
        sampler.system.refresh_memory();
        let total = sampler.system.total_memory();
        if total == 0 {
            anyhow::bail!("total memory reported as zero");
        }
        Ok(sampler.system.used_memory() as f64 / total as f64 * 100.0)
    }
}

impl Default for SystemMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricSource for SystemMetrics {
    fn sample(&self, metric: Metric) -> anyhow::Result<f64> {
        match metric {
            Metric::Cpu => Ok(self.cpu_percent()),
            Metric::Memory => self.memory_percent(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_percent_in_range() {
        let metrics = SystemMetrics::new();
        let value = metrics.sample(Metric::Memory).unwrap();
        assert!((0.0..=100.0).contains(&value));
    }

    #[test]
    fn test_cpu_percent_is_non_negative() {
        let metrics = SystemMetrics::new();
        assert!(metrics.sample(Metric::Cpu).unwrap() >= 0.0);
    }

    #[test]
    fn test_back_to_back_cpu_samples_share_a_refresh() {
        let metrics = SystemMetrics::new();
        std::thread::sleep(MINIMUM_CPU_UPDATE_INTERVAL);

        let first = metrics.sample(Metric::Cpu).unwrap();
        let second = metrics.sample(Metric::Cpu).unwrap();
        assert_eq!(first, second);
    }
}
