use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_disk_path")]
    pub disk_path: PathBuf,
    #[serde(default)]
    pub gpu: GpuConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct GpuConfig {
    #[serde(default = "default_gpu_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub device_index: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            disk_path: default_disk_path(),
            gpu: GpuConfig::default(),
        }
    }
}

impl Default for GpuConfig {
    fn default() -> Self {
        Self {
            enabled: default_gpu_enabled(),
            device_index: 0,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("не удалось прочитать файл конфигурации {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("не удалось разобрать YAML в {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("переменная окружения {name}='{value}' не является корректным портом")]
    EnvPort { name: &'static str, value: String },
    #[error("ошибка валидации конфигурации: {0}")]
    Validation(String),
}

/// Environment variables that override file values.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub host: Option<String>,
    pub port: Option<String>,
}

impl EnvOverrides {
    pub fn from_process_env() -> Self {
        Self {
            host: non_empty_env("HOST"),
            port: non_empty_env("PORT"),
        }
    }
}

impl Config {
    /// Reads `path` if given, otherwise starts from defaults, then applies
    /// environment overrides and validates.
    pub fn load(path: Option<&Path>, env: &EnvOverrides) -> Result<Self, ConfigError> {
        let mut cfg = match path {
            Some(path) => Self::read_file(path)?,
            None => Self::default(),
        };
        cfg.apply_env(env)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn read_file(path: &Path) -> Result<Self, ConfigError> {
        let path_display = path.display().to_string();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path_display.clone(),
            source,
        })?;

        serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path_display,
            source,
        })
    }

    pub fn apply_env(&mut self, env: &EnvOverrides) -> Result<(), ConfigError> {
        if let Some(host) = &env.host {
            self.host = host.trim().to_string();
        }
        if let Some(port) = &env.port {
            self.port = port.trim().parse().map_err(|_| ConfigError::EnvPort {
                name: "PORT",
                value: port.clone(),
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Validation("поле host обязательно".to_string()));
        }
        if self.port == 0 {
            return Err(ConfigError::Validation(
                "port должен быть в диапазоне 1..65535".to_string(),
            ));
        }
        self.listen_addr()?;
        if self.disk_path.as_os_str().is_empty() || !self.disk_path.is_absolute() {
            return Err(ConfigError::Validation(format!(
                "disk_path должен быть абсолютным путём, получено '{}'",
                self.disk_path.display()
            )));
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        let host = self.host.trim();
        let joined = if host.contains(':') && !host.starts_with('[') {
            format!("[{host}]:{}", self.port)
        } else {
            format!("{host}:{}", self.port)
        };
        joined.parse().map_err(|_| {
            ConfigError::Validation(format!(
                "host '{}' и port {} не образуют корректный адрес",
                self.host, self.port
            ))
        })
    }

    pub fn example_yaml() -> &'static str {
        include_str!("../config.yaml.example")
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    8082
}

fn default_disk_path() -> PathBuf {
    PathBuf::from("/")
}

const fn default_gpu_enabled() -> bool {
    true
}
