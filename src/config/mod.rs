// Configuration loading and management.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::unit::UnitDefinition;

mod test_config;
pub use test_config::new_test_config;


pub const PROD: &str = "prod";
pub const DEV: &str = "dev";
pub const TEST: &str = "test";

pub const ENV_LOCAL_DEPLOYMENT_TOKEN: &str = "PHOTON_LOCAL_DEPLOYMENT_TOKEN";
pub const ENV_PORT: &str = "PHOTON_PORT";
pub const ENV_TIMEOUT_GRACEFUL_SHUTDOWN: &str = "PHOTON_TIMEOUT_GRACEFUL_SHUTDOWN";
pub const ENV_INCOMING_TRAFFIC_GRACE_PERIOD: &str = "PHOTON_INCOMING_TRAFFIC_GRACE_PERIOD";

pub const DEFAULT_NAME: &str = "photon";
pub const DEFAULT_PORT: u16 = crate::unit::definition::DEFAULT_PORT;
pub const DEFAULT_TIMEOUT_GRACEFUL_SHUTDOWN: Duration = Duration::from_secs(5);
pub const DEFAULT_INCOMING_TRAFFIC_GRACE_PERIOD: Duration = Duration::ZERO;
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Photon {
    #[serde(rename = "photon")]
    pub photon: PhotonBox,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PhotonBox {
    #[serde(default = "default_env")]
    pub env: String,
    #[serde(default)]
    pub logs: Option<Logs>,
    #[serde(default)]
    pub api: Option<Api>,
    #[serde(default)]
    pub auth: Option<Auth>,
    #[serde(default)]
    pub shutdown: Option<Shutdown>,
    #[serde(default)]
    pub k8s: Option<K8S>,
    #[serde(default)]
    pub metrics: Option<Metrics>,
}

fn default_env() -> String {
    DEV.to_string()
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Logs {
    pub level: Option<String>,
    #[serde(default)]
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Api {
    pub name: Option<String>,
    pub port: Option<u16>,
    /// Second listener serving only liveness; unset or equal to `port` means none.
    #[serde(default)]
    pub liveness_port: Option<u16>,
    /// Larger request bodies are answered with 413.
    #[serde(default)]
    pub max_body_bytes: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Auth {
    pub token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Shutdown {
    #[serde(default, with = "humantime_serde")]
    pub graceful_timeout: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub incoming_traffic_grace_period: Option<Duration>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Probe {
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct K8S {
    pub probe: Probe,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Metrics {
    pub enabled: bool,
}

pub trait ConfigTrait {
    fn logs(&self) -> Option<&Logs>;
    fn is_prod(&self) -> bool;
    fn is_test(&self) -> bool;
    fn api(&self) -> Option<&Api>;
    fn name(&self) -> &str;
    fn port(&self) -> u16;
    fn liveness_port(&self) -> Option<u16>;
    fn token(&self) -> Option<&str>;
    fn graceful_timeout(&self) -> Duration;
    fn incoming_traffic_grace_period(&self) -> Duration;
    fn probe_timeout(&self) -> Duration;
    fn is_metrics_enabled(&self) -> bool;
    fn max_body_bytes(&self) -> usize;
}

// Config type alias for convenience
pub type Config = Photon;

impl ConfigTrait for Config {
    fn logs(&self) -> Option<&Logs> {
        self.photon.logs.as_ref()
    }

    fn is_prod(&self) -> bool {
        self.photon.env == PROD
    }

    fn is_test(&self) -> bool {
        self.photon.env == TEST
    }

    fn api(&self) -> Option<&Api> {
        self.photon.api.as_ref()
    }

    fn name(&self) -> &str {
        self.api()
            .and_then(|a| a.name.as_deref())
            .unwrap_or(DEFAULT_NAME)
    }

    fn port(&self) -> u16 {
        self.api().and_then(|a| a.port).unwrap_or(DEFAULT_PORT)
    }

    fn liveness_port(&self) -> Option<u16> {
        self.api()
            .and_then(|a| a.liveness_port)
            .filter(|p| *p != self.port())
    }

    fn token(&self) -> Option<&str> {
        self.photon
            .auth
            .as_ref()
            .and_then(|a| a.token.as_deref())
            .filter(|t| !t.is_empty())
    }

    fn graceful_timeout(&self) -> Duration {
        self.photon
            .shutdown
            .as_ref()
            .and_then(|s| s.graceful_timeout)
            .unwrap_or(DEFAULT_TIMEOUT_GRACEFUL_SHUTDOWN)
    }

    fn incoming_traffic_grace_period(&self) -> Duration {
        self.photon
            .shutdown
            .as_ref()
            .and_then(|s| s.incoming_traffic_grace_period)
            .unwrap_or(DEFAULT_INCOMING_TRAFFIC_GRACE_PERIOD)
    }

    fn probe_timeout(&self) -> Duration {
        self.photon
            .k8s
            .as_ref()
            .and_then(|k| k.probe.timeout)
            .unwrap_or(DEFAULT_PROBE_TIMEOUT)
    }

    fn is_metrics_enabled(&self) -> bool {
        self.photon.metrics.as_ref().map(|m| m.enabled).unwrap_or(true)
    }

    fn max_body_bytes(&self) -> usize {
        self.api()
            .and_then(|a| a.max_body_bytes)
            .unwrap_or(DEFAULT_MAX_BODY_BYTES)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            photon: PhotonBox {
                env: default_env(),
                logs: None,
                api: None,
                auth: None,
                shutdown: None,
                k8s: None,
                metrics: None,
            },
        }
    }
}

impl Config {
    /// Loads configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let abs_path = path
            .canonicalize()
            .with_context(|| format!("failed to resolve absolute config filepath: {:?}", path))?;

        let data = std::fs::read_to_string(&abs_path)
            .with_context(|| format!("read config yaml file {:?}", abs_path))?;

        Self::from_yaml(&data).with_context(|| format!("unmarshal yaml from {:?}", abs_path))
    }

    pub fn from_yaml(data: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(data)?)
    }

    /// Applies the `PHOTON_*` environment overrides.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_vars(|name| std::env::var(name).ok())
    }

    fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        let seconds = |name: &str, raw: String| -> Result<Duration> {
            let secs: f64 = raw
                .trim()
                .parse()
                .with_context(|| format!("{name} must be a number of seconds, got {raw:?}"))?;
            Duration::try_from_secs_f64(secs).with_context(|| format!("{name} out of range: {raw:?}"))
        };

        if let Some(token) = var(ENV_LOCAL_DEPLOYMENT_TOKEN) {
            self.photon.auth.get_or_insert_with(Auth::default).token = Some(token);
        }
        if let Some(port) = var(ENV_PORT) {
            let port: u16 = port
                .trim()
                .parse()
                .with_context(|| format!("{ENV_PORT} must be a port number, got {port:?}"))?;
            self.photon.api.get_or_insert_with(Api::default).port = Some(port);
        }
        if let Some(raw) = var(ENV_TIMEOUT_GRACEFUL_SHUTDOWN) {
            self.photon.shutdown.get_or_insert_with(Shutdown::default).graceful_timeout =
                Some(seconds(ENV_TIMEOUT_GRACEFUL_SHUTDOWN, raw)?);
        }
        if let Some(raw) = var(ENV_INCOMING_TRAFFIC_GRACE_PERIOD) {
            self.photon
                .shutdown
                .get_or_insert_with(Shutdown::default)
                .incoming_traffic_grace_period = Some(seconds(ENV_INCOMING_TRAFFIC_GRACE_PERIOD, raw)?);
        }
        Ok(())
    }

    /// Values declared by the unit itself take precedence over file and
    /// environment.
    pub fn apply_unit(&mut self, unit: &UnitDefinition) {
        if let Some(port) = unit.declared_port() {
            self.photon.api.get_or_insert_with(Api::default).port = Some(port);
        }
        if let Some(port) = unit.health_check_liveness_tcp_port() {
            self.photon.api.get_or_insert_with(Api::default).liveness_port = Some(port);
        }
        if let Some(timeout) = unit.timeout_graceful_shutdown() {
            self.photon.shutdown.get_or_insert_with(Shutdown::default).graceful_timeout = Some(timeout);
        }
        if let Some(period) = unit.incoming_traffic_grace_period() {
            self.photon
                .shutdown
                .get_or_insert_with(Shutdown::default)
                .incoming_traffic_grace_period = Some(period);
        }
    }
}
