use std::path::Path;
use std::time::Duration;

use thiserror::Error;
use yaml_rust::{Yaml, YamlLoader};

use crate::feed::lifecycle::BackoffPolicy;
use crate::store::RADIO_RETENTION;

pub const DEFAULT_URL: &str = "ws://localhost:8000/ws";
pub const DEFAULT_CONFIG_FILE: &str = "pitwall.yaml";
pub const URL_ENV: &str = "PITWALL_WS_URL";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse yaml: {0}")]
    Yaml(#[from] yaml_rust::ScanError),
    #[error("config key `{key}` {problem}")]
    Invalid { key: &'static str, problem: &'static str },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub url: String,
    pub backoff: BackoffPolicy,
    pub radio_retention: usize,
    /// How much history the telemetry trace keeps per driver.
    pub trace_window: Duration,
    pub digest_interval: Duration,
    /// Drivers to subscribe to every time the connection opens.
    pub drivers: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            url: DEFAULT_URL.to_string(),
            backoff: BackoffPolicy::default(),
            radio_retention: RADIO_RETENTION,
            trace_window: Duration::from_secs(10),
            digest_interval: Duration::from_secs(5),
            drivers: vec![],
        }
    }
}

fn read_u64(node: &Yaml, key: &'static str) -> Result<Option<u64>, ConfigError> {
    match node {
        Yaml::BadValue | Yaml::Null => Ok(None),
        Yaml::Integer(value) if *value >= 0 => Ok(Some(*value as u64)),
        _ => Err(ConfigError::Invalid {
            key,
            problem: "must be a non-negative integer",
        }),
    }
}

fn read_u32(node: &Yaml, key: &'static str) -> Result<Option<u32>, ConfigError> {
    match read_u64(node, key)? {
        Some(value) if value <= u32::MAX as u64 => Ok(Some(value as u32)),
        Some(_) => Err(ConfigError::Invalid { key, problem: "is too large" }),
        None => Ok(None),
    }
}

fn read_string(node: &Yaml, key: &'static str) -> Result<Option<String>, ConfigError> {
    match node {
        Yaml::BadValue | Yaml::Null => Ok(None),
        Yaml::String(value) => Ok(Some(value.clone())),
        _ => Err(ConfigError::Invalid { key, problem: "must be a string" }),
    }
}

impl Config {
    /// Defaults, then the yaml file, then the environment.
    ///
    /// An explicit `path` has to exist. Without one, `pitwall.yaml` in the
    /// working directory is used when present.
    pub fn load(path: Option<&str>) -> Result<Config, ConfigError> {
        let path = match path {
            Some(path) => Some(path),
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => Some(DEFAULT_CONFIG_FILE),
            None => None,
        };

        let mut config = match path {
            Some(path) => {
                info!["Loading config file {}", path];
                let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.to_string(),
                    source,
                })?;
                Config::from_yaml_str(&contents)?
            }
            None => Config::default(),
        };

        config.apply_env(std::env::var(URL_ENV).ok());
        Ok(config)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Config, ConfigError> {
        let docs = YamlLoader::load_from_str(contents)?;
        let mut config = Config::default();
        let doc = match docs.first() {
            Some(doc) => doc,
            None => return Ok(config),
        };

        if let Some(url) = read_string(&doc["url"], "url")? {
            config.url = url;
        }

        let reconnect = &doc["reconnect"];
        if let Some(ms) = read_u64(&reconnect["base_delay_ms"], "reconnect.base_delay_ms")? {
            config.backoff.base = Duration::from_millis(ms);
        }
        if let Some(factor) = read_u32(&reconnect["factor"], "reconnect.factor")? {
            if factor == 0 {
                return Err(ConfigError::Invalid {
                    key: "reconnect.factor",
                    problem: "must be at least 1",
                });
            }
            config.backoff.factor = factor;
        }
        if let Some(attempts) = read_u32(&reconnect["max_attempts"], "reconnect.max_attempts")? {
            config.backoff.max_attempts = attempts;
        }
        if let Some(ms) = read_u64(&reconnect["max_delay_ms"], "reconnect.max_delay_ms")? {
            config.backoff.max_delay = Some(Duration::from_millis(ms));
        }

        if let Some(retention) = read_u64(&doc["radio_retention"], "radio_retention")? {
            if retention == 0 {
                return Err(ConfigError::Invalid {
                    key: "radio_retention",
                    problem: "must be at least 1",
                });
            }
            config.radio_retention = retention as usize;
        }
        if let Some(secs) = read_u64(&doc["trace_window_secs"], "trace_window_secs")? {
            config.trace_window = Duration::from_secs(secs);
        }
        if let Some(secs) = read_u64(&doc["digest_interval_secs"], "digest_interval_secs")? {
            if secs == 0 {
                return Err(ConfigError::Invalid {
                    key: "digest_interval_secs",
                    problem: "must be at least 1",
                });
            }
            config.digest_interval = Duration::from_secs(secs);
        }

        match &doc["drivers"] {
            Yaml::BadValue | Yaml::Null => {}
            Yaml::Array(drivers) => {
                for driver in drivers {
                    match driver {
                        Yaml::String(driver) => config.drivers.push(driver.clone()),
                        _ => {
                            return Err(ConfigError::Invalid {
                                key: "drivers",
                                problem: "must be a list of strings",
                            })
                        }
                    }
                }
            }
            _ => {
                return Err(ConfigError::Invalid {
                    key: "drivers",
                    problem: "must be a list of strings",
                })
            }
        }

        Ok(config)
    }

    /// The environment wins over the file for the gateway url.
    pub fn apply_env(&mut self, url: Option<String>) {
        if let Some(url) = url.filter(|url| !url.trim().is_empty()) {
            self.url = url;
        }
    }
}
