use crate::images::DEFAULT_IMAGE_NAMES;
use crate::probe::{DEFAULT_PROBE_PORTS, DEFAULT_PROBE_TIMEOUT};
use crate::shutdown::DEFAULT_SHUTDOWN_COMMAND;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::warn;

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct KernelConfig {
    pub http: HttpConf,
    pub storage: StorageConf,
    pub probe: ProbeConf,
    pub shutdown: ShutdownConf,
    pub images: ImagesConf,
    /// Insert the demo hosts when the store is empty at startup.
    pub seed: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConf {
    pub bind: String,
    /// Base used to build image URLs handed to clients.
    pub public_url: String,
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConf {
    /// `None` keeps the inventory in memory only.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ProbeConf {
    pub timeout_ms: u64,
    pub ports: Vec<u16>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ShutdownConf {
    pub command: String, // ex: "shutdown /s /f /t 0 /m '\\{address}'"
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ImagesConf {
    pub dir: PathBuf,
    pub names: Vec<String>,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            http: HttpConf::default(),
            storage: StorageConf::default(),
            probe: ProbeConf::default(),
            shutdown: ShutdownConf::default(),
            images: ImagesConf::default(),
            seed: true,
        }
    }
}

impl Default for HttpConf {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".into(),
            public_url: "http://localhost:8080".into(),
            cors_origins: vec![
                "http://localhost:3000".into(),
                "http://localhost:4200".into(),
                "http://localhost".into(),
            ],
        }
    }
}

impl Default for StorageConf {
    fn default() -> Self {
        Self { path: Some(PathBuf::from("./data/hosts.json")) }
    }
}

impl Default for ProbeConf {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_PROBE_TIMEOUT.as_millis() as u64,
            ports: DEFAULT_PROBE_PORTS.to_vec(),
        }
    }
}

impl Default for ShutdownConf {
    fn default() -> Self {
        Self { command: DEFAULT_SHUTDOWN_COMMAND.into(), timeout_secs: Some(30) }
    }
}

impl Default for ImagesConf {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./images"),
            names: DEFAULT_IMAGE_NAMES.iter().map(|n| n.to_string()).collect(),
        }
    }
}

impl ProbeConf {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl ShutdownConf {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

impl KernelConfig {
    /// Applies `HOSTWATCH_BIND` / `HOSTWATCH_DATA` style overrides from `lookup`.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(bind) = lookup("HOSTWATCH_BIND").filter(|v| !v.trim().is_empty()) {
            self.http.bind = bind;
        }
        if let Some(data) = lookup("HOSTWATCH_DATA") {
            self.storage.path = if data.trim().is_empty() { None } else { Some(PathBuf::from(data)) };
        }
        self
    }
}

fn parse_config(txt: &str) -> KernelConfig {
    if txt.trim().is_empty() {
        return KernelConfig::default();
    }
    serde_yaml::from_str(txt).unwrap_or_else(|e| {
        warn!("invalid config, using defaults: {e}");
        KernelConfig::default()
    })
}

pub async fn load_config() -> KernelConfig {
    let path = std::env::var("HOSTWATCH_CONFIG").unwrap_or_else(|_| "hostwatch.yaml".into());
    let cfg = if Path::new(&path).exists() {
        let txt = fs::read_to_string(&path).await.unwrap_or_else(|e| {
            warn!(path = %path, "cannot read config: {e}");
            String::new()
        });
        parse_config(&txt)
    } else {
        warn!(path = %path, "no config file, using defaults");
        KernelConfig::default()
    };
    cfg.with_overrides(|key| std::env::var(key).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let cfg = KernelConfig::default();
        assert_eq!(cfg.http.bind, "0.0.0.0:8080");
        assert_eq!(cfg.probe.timeout(), Duration::from_secs(10));
        assert_eq!(cfg.images.names.len(), 4);
        assert!(cfg.seed);
    }

    #[test]
    fn test_partial_yaml_keeps_other_defaults() {
        let cfg = parse_config(
            "probe:\n  timeout_ms: 1500\nshutdown:\n  command: \"echo {address}\"\nseed: false\n",
        );
        assert_eq!(cfg.probe.timeout(), Duration::from_millis(1500));
        assert_eq!(cfg.probe.ports, DEFAULT_PROBE_PORTS.to_vec());
        assert_eq!(cfg.shutdown.command, "echo {address}");
        assert_eq!(cfg.shutdown.timeout(), Some(Duration::from_secs(30)));
        assert!(!cfg.seed);
    }

    #[test]
    fn test_empty_or_invalid_yaml_falls_back_to_defaults() {
        assert_eq!(parse_config("  \n").http.bind, "0.0.0.0:8080");
        assert_eq!(parse_config("probe: [not, a, map]").probe.timeout_ms, 10_000);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [("HOSTWATCH_BIND", "127.0.0.1:9000"), ("HOSTWATCH_DATA", "")].into();
        let cfg = KernelConfig::default().with_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(cfg.http.bind, "127.0.0.1:9000");
        assert!(cfg.storage.path.is_none());
    }
}
