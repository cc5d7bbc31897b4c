use crate::error::ConfigLoadError;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Executable launched when no override is given.
pub const DEFAULT_EXECUTABLE: &str = "inlets-pro";

/// Well-known location of the service configuration.
#[cfg(windows)]
pub const DEFAULT_CONFIG_PATH: &str = r"C:\inlets.json";
#[cfg(not(windows))]
pub const DEFAULT_CONFIG_PATH: &str = "/etc/inlets/inlets.json";

/// Tunnel client configuration, loaded once at startup and never mutated.
///
/// Every field is required; a missing key is a parse failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(alias = "Upstreams")]
    pub upstreams: Vec<String>,
    #[serde(alias = "URL")]
    pub url: String,
    #[serde(alias = "Token")]
    pub token: String,
    #[serde(rename = "license-file", alias = "LicenseFile")]
    pub license_file: String,
    #[serde(rename = "auto-tls", alias = "AutoTLS")]
    pub auto_tls: bool,
}

impl ServiceConfig {
    /// Read and parse the configuration at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigLoadError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigLoadError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: ServiceConfig =
            serde_json::from_str(&raw).map_err(|source| ConfigLoadError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the tunnel client cannot start with.
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.url.trim().is_empty() {
            return Err(ConfigLoadError::Invalid("url must not be empty".into()));
        }
        if self.upstreams.iter().all(|u| u.trim().is_empty()) {
            return Err(ConfigLoadError::Invalid(
                "at least one upstream is required".into(),
            ));
        }
        Ok(())
    }

    /// Default config location for this platform.
    pub fn default_path() -> PathBuf {
        PathBuf::from(DEFAULT_CONFIG_PATH)
    }
}

/// Executable plus ordered arguments for one spawn of the child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    executable: String,
    args: Vec<String>,
}

impl LaunchSpec {
    pub fn new<S: ToString, I: IntoIterator<Item = S>>(executable: impl Into<String>, args: I) -> Self {
        Self {
            executable: executable.into(),
            args: args.into_iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Project `config` onto the tunnel client's command line.
    pub fn from_config(executable: impl Into<String>, config: &ServiceConfig) -> Self {
        let upstreams = config.upstreams.join(",");
        let args = vec![
            "http".to_string(),
            "client".to_string(),
            format!("--url={}", config.url),
            format!("--upstream={}", upstreams.trim_end_matches(',')),
            format!("--token={}", config.token),
            format!("--license-file={}", config.license_file),
            format!("--auto-tls={}", config.auto_tls),
        ];
        Self {
            executable: executable.into(),
            args,
        }
    }

    pub fn executable(&self) -> &str {
        &self.executable
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Display form with the token value masked, for logging.
    pub fn redacted(&self) -> Redacted<'_> {
        Redacted(self)
    }
}

pub struct Redacted<'a>(&'a LaunchSpec);

impl fmt::Display for Redacted<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.executable)?;
        for arg in &self.0.args {
            if arg.starts_with("--token=") {
                write!(f, " --token=***")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

pub const DEFAULT_FAST_TICK: Duration = Duration::from_millis(500);
pub const DEFAULT_SLOW_TICK: Duration = Duration::from_secs(2);
pub const DEFAULT_INTERROGATE_DELAY: Duration = Duration::from_millis(100);

/// Timing knobs for the control loop.
#[derive(Debug, Clone, PartialEq, Builder)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct ControlLoopSettings {
    /// Heartbeat period while running.
    #[builder(default = "DEFAULT_FAST_TICK")]
    pub fast_tick: Duration,
    /// Heartbeat period while paused.
    #[builder(default = "DEFAULT_SLOW_TICK")]
    pub slow_tick: Duration,
    /// Pause between the two status echoes of an interrogate. Zero skips it.
    #[builder(default = "DEFAULT_INTERROGATE_DELAY")]
    pub interrogate_delay: Duration,
}

impl Default for ControlLoopSettings {
    fn default() -> Self {
        Self {
            fast_tick: DEFAULT_FAST_TICK,
            slow_tick: DEFAULT_SLOW_TICK,
            interrogate_delay: DEFAULT_INTERROGATE_DELAY,
        }
    }
}

impl ControlLoopSettings {
    pub fn builder() -> ControlLoopSettingsBuilder {
        ControlLoopSettingsBuilder::default()
    }
}

impl ControlLoopSettingsBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.fast_tick == Some(Duration::ZERO) || self.slow_tick == Some(Duration::ZERO) {
            return Err("tick periods must be non-zero".to_string());
        }
        Ok(())
    }
}
