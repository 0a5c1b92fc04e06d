#[cfg(feature = "cli")]
use std::collections::BTreeMap;
#[cfg(feature = "cli")]
use std::sync::{Arc, Mutex};
#[cfg(feature = "cli")]
use std::time::{Duration, Instant};
#[cfg(feature = "cli")]
use sysinfo::{Pid, RefreshKind, System};

#[cfg(feature = "cli")]
#[derive(Debug, Clone)]
pub struct ServiceStats {
    pub cpu_usage: f32,
    pub memory_usage_mb: u64,
}

#[cfg(feature = "cli")]
#[derive(Debug, Clone)]
pub struct SystemStats {
    pub services: Vec<(String, ServiceStats)>,
    pub total_memory_mb: u64,
    pub peak_memory_mb: u64,
    pub elapsed_time: Duration,
}

#[cfg(feature = "cli")]
pub struct SystemMonitor {
    system: Arc<Mutex<System>>,
    tracked: Arc<Mutex<BTreeMap<String, Pid>>>,
    start_time: Instant,
    peak_memory: Arc<Mutex<u64>>,
    enabled: bool,
}

#[cfg(feature = "cli")]
impl SystemMonitor {
    pub fn new(enabled: bool) -> Self {
        let mut system = System::new_with_specifics(RefreshKind::everything());

        // 初始刷新
        system.refresh_all();

        Self {
            system: Arc::new(Mutex::new(system)),
            tracked: Arc::new(Mutex::new(BTreeMap::new())),
            start_time: Instant::now(),
            peak_memory: Arc::new(Mutex::new(0)),
            enabled,
        }
    }

    pub fn track(&self, service: &str, pid: u32) {
        if let Ok(mut tracked) = self.tracked.lock() {
            tracked.insert(service.to_string(), Pid::from_u32(pid));
        }
    }

    pub fn untrack(&self, service: &str) {
        if let Ok(mut tracked) = self.tracked.lock() {
            tracked.remove(service);
        }
    }

    pub fn get_stats(&self) -> Option<SystemStats> {
        if !self.enabled {
            return None;
        }

        let mut system = self.system.lock().ok()?;
        system.refresh_all();

        let tracked = self.tracked.lock().ok()?;
        let mut services = Vec::new();
        let mut total_mb = 0u64;

        for (name, pid) in tracked.iter() {
            if let Some(process) = system.process(*pid) {
                let memory_mb = process.memory() / 1024 / 1024; // Convert bytes to MB
                total_mb += memory_mb;
                services.push((
                    name.clone(),
                    ServiceStats {
                        cpu_usage: process.cpu_usage(),
                        memory_usage_mb: memory_mb,
                    },
                ));
            }
        }

        // 更新峰值記憶體
        let mut peak = self.peak_memory.lock().ok()?;
        if total_mb > *peak {
            *peak = total_mb;
        }
        let peak_memory = *peak;

        Some(SystemStats {
            services,
            total_memory_mb: total_mb,
            peak_memory_mb: peak_memory,
            elapsed_time: self.start_time.elapsed(),
        })
    }

    pub fn log_stats(&self, phase: &str) {
        if let Some(stats) = self.get_stats() {
            for (name, service) in &stats.services {
                tracing::info!(
                    "📊 {} - {}: CPU {:.1}%, Memory {}MB",
                    phase,
                    name,
                    service.cpu_usage,
                    service.memory_usage_mb
                );
            }
            tracing::info!(
                "📊 {} - Total: {}MB, Peak: {}MB, Time: {:?}",
                phase,
                stats.total_memory_mb,
                stats.peak_memory_mb,
                stats.elapsed_time
            );
        }
    }

    pub fn log_final_stats(&self) {
        if let Some(stats) = self.get_stats() {
            tracing::info!(
                "📊 Final Stats - Total Time: {:?}, Peak Memory: {}MB",
                stats.elapsed_time,
                stats.peak_memory_mb
            );
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

#[cfg(feature = "cli")]
impl Default for SystemMonitor {
    fn default() -> Self {
        Self::new(false)
    }
}

#[cfg(feature = "cli")]
pub fn pid_alive(pid: u32) -> bool {
    let mut system = System::new_with_specifics(RefreshKind::everything());
    system.refresh_all();
    system.process(Pid::from_u32(pid)).is_some()
}

// 為非CLI環境提供空實現
#[cfg(not(feature = "cli"))]
pub struct SystemMonitor;

#[cfg(not(feature = "cli"))]
impl SystemMonitor {
    pub fn new(_enabled: bool) -> Self {
        Self
    }

    pub fn track(&self, _service: &str, _pid: u32) {}

    pub fn untrack(&self, _service: &str) {}

    pub fn log_stats(&self, _phase: &str) {}

    pub fn log_final_stats(&self) {}

    pub fn is_enabled(&self) -> bool {
        false
    }
}
