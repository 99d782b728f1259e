use serde::Serialize;

/// One `/stats` response. Built fresh per request and never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub cpu_usage: f64,
    pub cpu_temp: Option<f64>,
    pub memory_usage: f64,
    pub disk_usage: f64,
    /// Cumulative sent + received megabytes since boot, not a rate.
    pub network_speed: f64,
    pub gpu_temp: Option<f64>,
    pub gpu_utilization: Option<f64>,
    pub gpu_memory_utilization: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GpuStats {
    pub temp: Option<f64>,
    pub utilization: Option<f64>,
    pub memory_utilization: Option<f64>,
}

impl GpuStats {
    pub const fn unavailable() -> Self {
        Self {
            temp: None,
            utilization: None,
            memory_utilization: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RawReadings {
    pub cpu_usage_percent: f64,
    pub cpu_temp_celsius: Option<f64>,
    pub memory_usage_percent: f64,
    pub disk_usage_percent: f64,
    pub network_bytes_total: u64,
    pub gpu: GpuStats,
}

impl From<RawReadings> for StatsSnapshot {
    fn from(raw: RawReadings) -> Self {
        Self {
            cpu_usage: round1(raw.cpu_usage_percent),
            cpu_temp: raw.cpu_temp_celsius.map(round1),
            memory_usage: round1(raw.memory_usage_percent),
            disk_usage: round1(raw.disk_usage_percent),
            network_speed: round2(bytes_to_megabytes(raw.network_bytes_total)),
            gpu_temp: raw.gpu.temp.map(round1),
            gpu_utilization: raw.gpu.utilization.map(round1),
            gpu_memory_utilization: raw.gpu.memory_utilization.map(round1),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
}

impl HealthStatus {
    pub const fn healthy() -> Self {
        Self { status: "healthy" }
    }
}

pub fn bytes_to_megabytes(bytes: u64) -> f64 {
    bytes as f64 / 1024.0 / 1024.0
}

pub fn round1(value: f64) -> f64 {
    round_to(value, 1)
}

pub fn round2(value: f64) -> f64 {
    round_to(value, 2)
}

/// Rounds the exact binary value of `value`, sending ties to the even
/// neighbour. `mul_add` keeps `value * factor - midpoint` to a single
/// rounding, so its sign is exact and a tie is only taken when one is real.
fn round_to(value: f64, decimals: i32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let factor = 10_f64.powi(decimals);
    let lower = (value * factor).floor();
    let diff = value.mul_add(factor, -(lower + 0.5));
    let rounded = if diff > 0.0 {
        lower + 1.0
    } else if diff < 0.0 || lower.rem_euclid(2.0) == 0.0 {
        lower
    } else {
        lower + 1.0
    };
    rounded / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw() -> RawReadings {
        RawReadings {
            cpu_usage_percent: 42.36,
            cpu_temp_celsius: None,
            memory_usage_percent: 67.89,
            disk_usage_percent: 55.0,
            network_bytes_total: 1_048_576 + 2_097_152,
            gpu: GpuStats::unavailable(),
        }
    }

    #[test]
    fn snapshot_rounds_percentages_and_network() {
        let snapshot = StatsSnapshot::from(raw());
        assert_eq!(snapshot.cpu_usage, 42.4);
        assert_eq!(snapshot.memory_usage, 67.9);
        assert_eq!(snapshot.disk_usage, 55.0);
        assert_eq!(snapshot.network_speed, 3.0);
    }

    #[test]
    fn network_speed_is_cumulative_megabytes() {
        let mut r = raw();
        r.network_bytes_total = 5 * 1024 * 1024 + 1024 * 1024 / 3;
        let snapshot = StatsSnapshot::from(r);
        assert_eq!(snapshot.network_speed, 5.33);
    }

    #[test]
    fn ties_round_to_even() {
        assert_eq!(round2(bytes_to_megabytes(131_072)), 0.12);
        assert_eq!(round2(bytes_to_megabytes(655_360)), 0.62);
        assert_eq!(round2(bytes_to_megabytes(393_216)), 0.38);
        assert_eq!(round1(0.25), 0.2);
        assert_eq!(round1(0.75), 0.8);
        assert_eq!(round1(-0.25), -0.2);
    }

    #[test]
    fn near_ties_follow_the_stored_value() {
        // 0.15, 0.35 and 2.675 are stored slightly below the written decimal
        assert_eq!(round1(0.15), 0.1);
        assert_eq!(round1(0.35), 0.3);
        assert_eq!(round2(2.675), 2.67);
        // 0.45 is stored slightly above
        assert_eq!(round1(0.45), 0.5);
    }

    #[test]
    fn gpu_values_round_to_one_decimal() {
        let mut r = raw();
        r.gpu = GpuStats {
            temp: Some(61.04),
            utilization: Some(99.96),
            memory_utilization: Some(12.345),
        };
        let snapshot = StatsSnapshot::from(r);
        assert_eq!(snapshot.gpu_temp, Some(61.0));
        assert_eq!(snapshot.gpu_utilization, Some(100.0));
        assert_eq!(snapshot.gpu_memory_utilization, Some(12.3));
    }

    #[test]
    fn absent_fields_serialize_as_null() {
        let snapshot = StatsSnapshot::from(raw());
        let value = serde_json::to_value(&snapshot).unwrap();
        let obj = value.as_object().unwrap();
        assert_eq!(obj.len(), 8);
        for key in ["cpu_temp", "gpu_temp", "gpu_utilization", "gpu_memory_utilization"] {
            assert!(obj.get(key).unwrap().is_null(), "{key} should be null");
        }
    }
}
