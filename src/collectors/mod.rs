pub mod gpu;
pub mod system;

use crate::state::{RawReadings, StatsSnapshot};
use nvml_wrapper::error::NvmlError;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub const CPU_SAMPLE_WINDOW: Duration = Duration::from_secs(1);

/// Core host readings. A failure here fails the whole snapshot.
pub trait HostProbe: Send + Sync {
    /// Blocks the calling thread for `window`.
    fn cpu_usage_percent(&self, window: Duration) -> Result<f64, CollectError>;
    fn memory_usage_percent(&self) -> Result<f64, CollectError>;
    fn disk_usage_percent(&self, path: &Path) -> Result<f64, CollectError>;
    fn network_counters(&self) -> Result<NetCounters, CollectError>;
    fn temperature_sensors(&self) -> Result<SensorTable, SensorError>;
}

pub trait GpuProbe: Send + Sync {
    fn temperature(&self, index: u32) -> Result<f64, GpuError>;
    fn utilization(&self, index: u32) -> Result<f64, GpuError>;
    fn memory(&self, index: u32) -> Result<GpuMemory, GpuError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetCounters {
    pub bytes_sent: u64,
    pub bytes_recv: u64,
}

impl NetCounters {
    pub fn total(&self) -> u64 {
        self.bytes_sent.saturating_add(self.bytes_recv)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SensorGroup {
    pub name: String,
    pub readings: Vec<f64>,
}

/// Sensor groups in the order the OS reported them.
pub type SensorTable = Vec<SensorGroup>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuMemory {
    pub used: u64,
    pub total: u64,
}

/// Filesystem capacity in bytes, as statvfs reports it. `free_bytes`
/// includes root-reserved blocks, `available_bytes` does not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskSpace {
    pub total_bytes: u64,
    pub free_bytes: u64,
    pub available_bytes: u64,
}

/// Read once at startup and shared read-only with every handler.
#[derive(Clone, Default)]
pub struct GpuCapability {
    probe: Option<Arc<dyn GpuProbe>>,
    device_index: u32,
}

impl GpuCapability {
    pub fn available(probe: Arc<dyn GpuProbe>, device_index: u32) -> Self {
        Self {
            probe: Some(probe),
            device_index,
        }
    }

    pub fn unavailable() -> Self {
        Self::default()
    }

    pub fn is_available(&self) -> bool {
        self.probe.is_some()
    }

    pub fn probe(&self) -> Option<&dyn GpuProbe> {
        self.probe.as_deref()
    }

    pub fn device_index(&self) -> u32 {
        self.device_index
    }
}

impl std::fmt::Debug for GpuCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuCapability")
            .field("available", &self.is_available())
            .field("device_index", &self.device_index)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum CollectError {
    #[error("ОС не сообщила ни одного CPU")]
    NoCpus,
    #[error("не удалось определить объём памяти")]
    MemoryUnavailable,
    #[cfg(not(unix))]
    #[error("не найдена файловая система для пути {path}")]
    DiskNotFound { path: String },
    #[error("не удалось получить статистику файловой системы для {path}: {source}")]
    DiskStat {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("задача сбора метрик прервана: {0}")]
    Task(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SensorError {
    #[error("датчики температуры не поддерживаются на этой платформе")]
    Unsupported,
    #[error("таблица датчиков температуры пуста")]
    Empty,
}

#[derive(Debug, Error)]
pub enum GpuError {
    #[error("ошибка NVML при запросе {op}: {source}")]
    Nvml {
        op: &'static str,
        #[source]
        source: NvmlError,
    },
    #[error("GPU {index} сообщает нулевой объём памяти")]
    ZeroMemoryTotal { index: u32 },
}

/// Builds one snapshot. Blocks for [`CPU_SAMPLE_WINDOW`], so call it off the async runtime.
pub fn collect_stats(
    host: &dyn HostProbe,
    gpu: &GpuCapability,
    disk_path: &Path,
) -> Result<StatsSnapshot, CollectError> {
    let cpu_usage_percent = host.cpu_usage_percent(CPU_SAMPLE_WINDOW)?;
    let cpu_temp_celsius = system::read_cpu_temperature(host);
    let memory_usage_percent = host.memory_usage_percent()?;
    let disk_usage_percent = host.disk_usage_percent(disk_path)?;
    let network_bytes_total = host.network_counters()?.total();
    let gpu_stats = gpu::read_gpu_stats(gpu);

    Ok(StatsSnapshot::from(RawReadings {
        cpu_usage_percent,
        cpu_temp_celsius,
        memory_usage_percent,
        disk_usage_percent,
        network_bytes_total,
        gpu: gpu_stats,
    }))
}
