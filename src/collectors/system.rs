use crate::collectors::{
    CollectError, DiskSpace, HostProbe, NetCounters, SensorError, SensorGroup, SensorTable,
};
#[cfg(any(target_os = "linux", test))]
use std::fs;
use std::path::Path;
#[cfg(not(unix))]
use std::path::PathBuf;
use std::time::Duration;
#[cfg(not(unix))]
use sysinfo::DiskExt;
use sysinfo::{ComponentExt, CpuExt, NetworkExt, NetworksExt, RefreshKind, System, SystemExt};
use tracing::debug;

const CORE_SENSOR_GROUP: &str = "coretemp";

#[cfg(target_os = "linux")]
const THERMAL_SYSFS_ROOT: &str = "/sys/class/thermal";

/// Host readings backed by `sysinfo`, with statvfs for disk usage on unix.
///
/// Every call builds its own `System`, so concurrent requests never share
/// refresh state and each CPU sample gets its own measurement window.
#[derive(Debug, Clone, Copy, Default)]
pub struct SysinfoHost;

impl HostProbe for SysinfoHost {
    fn cpu_usage_percent(&self, window: Duration) -> Result<f64, CollectError> {
        let mut system = System::new_with_specifics(RefreshKind::new());
        system.refresh_cpu();
        std::thread::sleep(window.max(System::MINIMUM_CPU_UPDATE_INTERVAL));
        system.refresh_cpu();

        if system.cpus().is_empty() {
            return Err(CollectError::NoCpus);
        }
        let sum: f32 = system.cpus().iter().map(|c| c.cpu_usage()).sum();
        Ok((sum / system.cpus().len() as f32) as f64)
    }

    fn memory_usage_percent(&self) -> Result<f64, CollectError> {
        let mut system = System::new_with_specifics(RefreshKind::new());
        system.refresh_memory();
        memory_usage(system.total_memory(), system.available_memory())
    }

    fn disk_usage_percent(&self, path: &Path) -> Result<f64, CollectError> {
        disk_space(path).map(|space| disk_usage(&space))
    }

    fn network_counters(&self) -> Result<NetCounters, CollectError> {
        let mut system = System::new_with_specifics(RefreshKind::new());
        system.refresh_networks_list();
        system.refresh_networks();
        let counters = system
            .networks()
            .iter()
            .fold(NetCounters::default(), |acc, (_iface, data)| NetCounters {
                bytes_sent: acc.bytes_sent.saturating_add(data.total_transmitted()),
                bytes_recv: acc.bytes_recv.saturating_add(data.total_received()),
            });
        Ok(counters)
    }

    fn temperature_sensors(&self) -> Result<SensorTable, SensorError> {
        if !System::IS_SUPPORTED {
            return Err(SensorError::Unsupported);
        }
        let mut system = System::new_with_specifics(RefreshKind::new());
        system.refresh_components_list();
        system.refresh_components();

        let mut table = group_sensors(
            system
                .components()
                .iter()
                .map(|c| (c.label().to_string(), c.temperature() as f64)),
        );
        let sysinfo_groups = table.len();
        if table.is_empty() {
            table = group_sensors(collect_thermal_zones());
        }
        debug!(
            sysinfo_groups,
            total_groups = table.len(),
            "результат опроса датчиков температуры"
        );

        if table.is_empty() {
            return Err(SensorError::Empty);
        }
        Ok(table)
    }
}

/// Share of physical memory that is not available to new allocations.
pub fn memory_usage(total: u64, available: u64) -> Result<f64, CollectError> {
    if total == 0 {
        return Err(CollectError::MemoryUnavailable);
    }
    Ok(percent(total.saturating_sub(available), total))
}

/// `used / (used + available)` with `used = total - free`, matching `df`.
/// Root-reserved blocks count neither as used nor as available.
pub fn disk_usage(space: &DiskSpace) -> f64 {
    let used = space.total_bytes.saturating_sub(space.free_bytes);
    let denominator = used.saturating_add(space.available_bytes);
    if denominator == 0 {
        return 0.0;
    }
    percent(used, denominator)
}

#[cfg(unix)]
fn disk_space(path: &Path) -> Result<DiskSpace, CollectError> {
    use nix::sys::statvfs::statvfs;

    let stat = statvfs(path).map_err(|errno| CollectError::DiskStat {
        path: path.display().to_string(),
        source: std::io::Error::from(errno),
    })?;
    let fragment = stat.fragment_size() as u64;
    Ok(DiskSpace {
        total_bytes: (stat.blocks() as u64).saturating_mul(fragment),
        free_bytes: (stat.blocks_free() as u64).saturating_mul(fragment),
        available_bytes: (stat.blocks_available() as u64).saturating_mul(fragment),
    })
}

#[cfg(not(unix))]
fn disk_space(path: &Path) -> Result<DiskSpace, CollectError> {
    let mut system = System::new_with_specifics(RefreshKind::new());
    system.refresh_disks_list();
    system.refresh_disks();
    let mounts: Vec<(PathBuf, DiskSpace)> = system
        .disks()
        .iter()
        .map(|d| {
            (
                d.mount_point().to_path_buf(),
                DiskSpace {
                    total_bytes: d.total_space(),
                    // sysinfo has no reserved-block figure here
                    free_bytes: d.available_space(),
                    available_bytes: d.available_space(),
                },
            )
        })
        .collect();

    mount_for_path(&mounts, path)
        .copied()
        .ok_or_else(|| CollectError::DiskNotFound {
            path: path.display().to_string(),
        })
}

/// Space of the longest mount point that is a prefix of `path`.
#[cfg(not(unix))]
fn mount_for_path<'a>(mounts: &'a [(PathBuf, DiskSpace)], path: &Path) -> Option<&'a DiskSpace> {
    mounts
        .iter()
        .filter(|(mount, _)| path.starts_with(mount))
        .max_by_key(|(mount, _)| mount.components().count())
        .map(|(_, space)| space)
}

/// Mean of the `coretemp` group if present, else the first reading of the
/// first group, else `None`.
pub fn read_cpu_temperature(host: &dyn HostProbe) -> Option<f64> {
    let table = match host.temperature_sensors() {
        Ok(table) => table,
        Err(err) => {
            debug!(error = %err, "температура CPU недоступна");
            return None;
        }
    };

    if let Some(core) = table
        .iter()
        .find(|g| g.name == CORE_SENSOR_GROUP && !g.readings.is_empty())
    {
        let sum: f64 = core.readings.iter().sum();
        return Some(sum / core.readings.len() as f64);
    }

    table.iter().find_map(|g| g.readings.first().copied())
}

/// Groups `(label, celsius)` pairs by the label's first word, keeping the
/// order in which groups first appear.
pub fn group_sensors(readings: impl IntoIterator<Item = (String, f64)>) -> SensorTable {
    let mut table: SensorTable = Vec::new();
    for (label, celsius) in readings {
        if !celsius.is_finite() {
            continue;
        }
        let name = label
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_string();
        match table.iter_mut().find(|g| g.name == name) {
            Some(group) => group.readings.push(celsius),
            None => table.push(SensorGroup {
                name,
                readings: vec![celsius],
            }),
        }
    }
    table
}

fn percent(part: u64, total: u64) -> f64 {
    (part as f64 / total as f64) * 100.0
}

#[cfg(target_os = "linux")]
fn collect_thermal_zones() -> Vec<(String, f64)> {
    read_thermal_zones(Path::new(THERMAL_SYSFS_ROOT))
}

#[cfg(not(target_os = "linux"))]
fn collect_thermal_zones() -> Vec<(String, f64)> {
    Vec::new()
}

/// Reads `thermal_zone*/{type,temp}` under `root`. Values above 1000 are
/// millidegrees.
#[cfg(any(target_os = "linux", test))]
fn read_thermal_zones(root: &Path) -> Vec<(String, f64)> {
    let Ok(entries) = fs::read_dir(root) else {
        return Vec::new();
    };

    let mut zones: Vec<_> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|v| v.to_str())
                .is_some_and(|n| n.starts_with("thermal_zone"))
        })
        .collect();
    zones.sort();

    let mut out = Vec::new();
    for path in zones {
        let Ok(raw) = fs::read_to_string(path.join("temp")) else {
            continue;
        };
        let Ok(value) = raw.trim().parse::<f64>() else {
            continue;
        };
        let kind = fs::read_to_string(path.join("type"))
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|_| "thermal_zone".to_string());
        let celsius = if value > 1000.0 { value / 1000.0 } else { value };
        if celsius > 0.0 {
            out.push((kind, celsius));
        }
    }
    out
}
