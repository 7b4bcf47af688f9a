//! JSON configuration file
//!
//! ```json
//! {
//!   "configuration": {
//!     "machines": [
//!       { "host": "fr-db1", "datacenter": "paris" },
//!       { "host": "uk-db1", "datacenter": "london" }
//!     ],
//!     "reference_file": "/var/lib/linkrtt/rtt.ref",
//!     "deviation_percent": 20,
//!     "deviation_micros": 500,
//!     "ssh_user": "monitor"
//!   }
//! }
//! ```
//!
//! Every other key is optional; see [`Config`] for defaults.

use crate::baseline::BaselineStrictness;
use crate::deviation::DeviationThresholds;
use crate::machine::MachineId;
use crate::notify::MailSettings;
use crate::probe::{ProbeSettings, SelfProbePolicy, SshProber};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Extra time granted to a probe on top of the `ping -w` deadline
const PROBE_TIMEOUT_SLACK_SECS: u64 = 20;

/// Bound on reading the configuration file itself, before
/// `file_timeout_secs` is known
pub const LOAD_TIMEOUT: Duration = Duration::from_secs(DEFAULT_FILE_TIMEOUT_SECS);

const DEFAULT_FILE_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("missing configuration value '{0}'")]
    Missing(&'static str),
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    configuration: Config,
}

fn default_ssh_cmd() -> String {
    "ssh".to_string()
}

fn default_ping_cmd() -> String {
    "ping".to_string()
}

fn default_ping_count() -> u32 {
    10
}

fn default_ping_timeout() -> u64 {
    10
}

fn default_probe_concurrency() -> usize {
    8
}

fn default_micro_factor() -> f64 {
    1000.0
}

fn default_file_timeout() -> u64 {
    DEFAULT_FILE_TIMEOUT_SECS
}

fn default_true() -> bool {
    true
}

fn default_smtp_port() -> u16 {
    587
}

fn default_mail_timeout() -> u64 {
    60
}

/// Contents of the `configuration` object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Probe endpoints, in report order
    pub machines: Vec<MachineId>,

    /// Baseline file read for comparison and written by `--gen-reference`
    pub reference_file: PathBuf,

    pub deviation_percent: f64,
    pub deviation_micros: f64,

    #[serde(default)]
    pub allow_ping_to_self: bool,

    #[serde(default = "default_ssh_cmd")]
    pub ssh_cmd: String,

    /// Extra SSH arguments, split on whitespace
    #[serde(default)]
    pub ssh_options: String,

    pub ssh_user: String,

    #[serde(default = "default_ping_cmd")]
    pub ping_cmd: String,

    #[serde(default = "default_ping_count")]
    pub ping_count: u32,

    /// `ping -w` deadline in seconds
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout: u64,

    /// Hard limit per probe; defaults to `ping_timeout` plus 20 seconds
    #[serde(default)]
    pub probe_timeout_secs: Option<u64>,

    #[serde(default = "default_probe_concurrency")]
    pub probe_concurrency: usize,

    /// `ping` reports milliseconds; the matrix is kept in microseconds
    #[serde(default = "default_micro_factor")]
    pub ping_output_to_micro_factor: f64,

    #[serde(default)]
    pub baseline_strictness: BaselineStrictness,

    /// Limit for reading or writing the baseline file
    #[serde(default = "default_file_timeout")]
    pub file_timeout_secs: u64,

    #[serde(default)]
    pub display_only_datacenters: bool,

    #[serde(default = "default_true")]
    pub print_reference_table: bool,

    /// Mail the report even when nothing deviates
    #[serde(default)]
    pub always_send_report: bool,

    #[serde(default)]
    pub mail_from: Option<String>,

    #[serde(default)]
    pub mail_to: Option<String>,

    #[serde(default)]
    pub smtp_server: Option<String>,

    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,

    #[serde(default)]
    pub smtp_user: Option<String>,

    #[serde(default)]
    pub smtp_password: Option<String>,

    #[serde(default = "default_mail_timeout")]
    pub mail_timeout_secs: u64,
}

impl Config {
    /// Read, parse and validate a configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&contents, path)?;
        tracing::info!(
            path = %path.display(),
            machines = config.machines.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Parse and validate JSON text; `origin` only labels errors
    pub fn from_json(contents: &str, origin: &Path) -> Result<Self, ConfigError> {
        let file: ConfigFile =
            serde_json::from_str(contents).map_err(|source| ConfigError::Parse {
                path: origin.to_path_buf(),
                source,
            })?;
        file.configuration.validate()?;
        Ok(file.configuration)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.machines.is_empty() {
            return Err(ConfigError::Missing("machines"));
        }

        let mut seen = HashSet::new();
        for machine in &self.machines {
            if machine.host.is_empty() || machine.zone.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "machine '{}' has an empty host or datacenter",
                    machine
                )));
            }
            if let Some(token) = machine.reserved_token() {
                return Err(ConfigError::Invalid(format!(
                    "machine '{}' contains reserved token '{}'",
                    machine, token
                )));
            }
            if !seen.insert(machine) {
                return Err(ConfigError::Invalid(format!(
                    "machine '{}' is listed twice",
                    machine
                )));
            }
        }

        if self.reference_file.as_os_str().is_empty() {
            return Err(ConfigError::Missing("reference_file"));
        }
        if self.ssh_user.is_empty() {
            return Err(ConfigError::Missing("ssh_user"));
        }
        if self.ssh_cmd.trim().is_empty() {
            return Err(ConfigError::Missing("ssh_cmd"));
        }
        if self.ping_cmd.trim().is_empty() {
            return Err(ConfigError::Missing("ping_cmd"));
        }

        self.thresholds().validate().map_err(ConfigError::Invalid)?;

        if self.probe_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "probe_concurrency must be >= 1".to_string(),
            ));
        }
        if self.probe_timeout_secs == Some(0) {
            return Err(ConfigError::Invalid(
                "probe_timeout_secs must be >= 1".to_string(),
            ));
        }
        if !self.ping_output_to_micro_factor.is_finite() || self.ping_output_to_micro_factor <= 0.0
        {
            return Err(ConfigError::Invalid(format!(
                "ping_output_to_micro_factor must be positive, got {}",
                self.ping_output_to_micro_factor
            )));
        }
        if self.file_timeout_secs == 0 || self.mail_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "file_timeout_secs and mail_timeout_secs must be >= 1".to_string(),
            ));
        }

        Ok(())
    }

    pub fn thresholds(&self) -> DeviationThresholds {
        DeviationThresholds::new(self.deviation_percent, self.deviation_micros)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(
            self.probe_timeout_secs
                .unwrap_or(self.ping_timeout + PROBE_TIMEOUT_SLACK_SECS),
        )
    }

    pub fn file_timeout(&self) -> Duration {
        Duration::from_secs(self.file_timeout_secs)
    }

    pub fn probe_settings(&self) -> ProbeSettings {
        ProbeSettings {
            timeout: self.probe_timeout(),
            concurrency: self.probe_concurrency,
            micros_factor: self.ping_output_to_micro_factor,
            self_probe: if self.allow_ping_to_self {
                SelfProbePolicy::Allow
            } else {
                SelfProbePolicy::Skip
            },
        }
    }

    pub fn ssh_prober(&self) -> SshProber {
        SshProber {
            ssh_cmd: self.ssh_cmd.trim().to_string(),
            ssh_options: self
                .ssh_options
                .split_whitespace()
                .map(str::to_string)
                .collect(),
            ssh_user: self.ssh_user.clone(),
            ping_cmd: self
                .ping_cmd
                .split_whitespace()
                .map(str::to_string)
                .collect(),
            ping_count: self.ping_count,
            ping_deadline_secs: self.ping_timeout,
        }
    }

    /// Mail settings; only required when a report is actually sent
    pub fn mail_settings(&self) -> Result<MailSettings, ConfigError> {
        let required = |value: &Option<String>, key: &'static str| {
            value
                .as_deref()
                .filter(|v| !v.trim().is_empty())
                .map(str::to_string)
                .ok_or(ConfigError::Missing(key))
        };

        Ok(MailSettings {
            from: required(&self.mail_from, "mail_from")?,
            to: required(&self.mail_to, "mail_to")?,
            smtp_server: required(&self.smtp_server, "smtp_server")?,
            smtp_port: self.smtp_port,
            smtp_user: self.smtp_user.clone(),
            smtp_password: self.smtp_password.clone(),
            timeout: Duration::from_secs(self.mail_timeout_secs),
        })
    }
}
