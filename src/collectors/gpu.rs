use crate::collectors::{GpuCapability, GpuError, GpuMemory, GpuProbe};
use crate::config::GpuConfig;
use crate::state::GpuStats;
use nvml_wrapper::enum_wrappers::device::TemperatureSensor;
use nvml_wrapper::{Device, Nvml};
use std::sync::Arc;
use tracing::{info, warn};

pub struct NvmlProbe {
    nvml: Nvml,
}

impl NvmlProbe {
    pub fn init() -> Result<Self, GpuError> {
        let nvml = Nvml::init().map_err(|source| GpuError::Nvml { op: "init", source })?;
        Ok(Self { nvml })
    }

    fn device(&self, index: u32) -> Result<Device<'_>, GpuError> {
        self.nvml
            .device_by_index(index)
            .map_err(|source| GpuError::Nvml {
                op: "device_by_index",
                source,
            })
    }
}

impl GpuProbe for NvmlProbe {
    fn temperature(&self, index: u32) -> Result<f64, GpuError> {
        let celsius = self
            .device(index)?
            .temperature(TemperatureSensor::Gpu)
            .map_err(|source| GpuError::Nvml {
                op: "temperature",
                source,
            })?;
        Ok(f64::from(celsius))
    }

    fn utilization(&self, index: u32) -> Result<f64, GpuError> {
        let rates = self
            .device(index)?
            .utilization_rates()
            .map_err(|source| GpuError::Nvml {
                op: "utilization_rates",
                source,
            })?;
        Ok(f64::from(rates.gpu))
    }

    fn memory(&self, index: u32) -> Result<GpuMemory, GpuError> {
        let info = self
            .device(index)?
            .memory_info()
            .map_err(|source| GpuError::Nvml {
                op: "memory_info",
                source,
            })?;
        Ok(GpuMemory {
            used: info.used,
            total: info.total,
        })
    }
}

/// Probes the GPU driver once. The result is never re-evaluated.
pub fn detect_gpu(cfg: &GpuConfig) -> GpuCapability {
    if !cfg.enabled {
        info!("поддержка GPU отключена в конфигурации");
        return GpuCapability::unavailable();
    }

    match NvmlProbe::init() {
        Ok(probe) => {
            info!(device_index = cfg.device_index, "NVML инициализирован, метрики GPU доступны");
            GpuCapability::available(Arc::new(probe), cfg.device_index)
        }
        Err(err) => {
            warn!(error = %err, "не удалось инициализировать NVML, метрики GPU недоступны");
            GpuCapability::unavailable()
        }
    }
}

/// All three values, or none of them.
pub fn read_gpu_stats(gpu: &GpuCapability) -> GpuStats {
    let Some(probe) = gpu.probe() else {
        return GpuStats::unavailable();
    };

    match query_device(probe, gpu.device_index()) {
        Ok(stats) => stats,
        Err(err) => {
            warn!(device_index = gpu.device_index(), error = %err, "ошибка чтения метрик GPU");
            GpuStats::unavailable()
        }
    }
}

fn query_device(probe: &dyn GpuProbe, index: u32) -> Result<GpuStats, GpuError> {
    let temp = probe.temperature(index)?;
    let utilization = probe.utilization(index)?;
    let memory = probe.memory(index)?;
    if memory.total == 0 {
        return Err(GpuError::ZeroMemoryTotal { index });
    }

    Ok(GpuStats {
        temp: Some(temp),
        utilization: Some(utilization),
        memory_utilization: Some((memory.used as f64 / memory.total as f64) * 100.0),
    })
}
