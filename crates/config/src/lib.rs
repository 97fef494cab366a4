//! Configuration module for easyacme
//!
//! Configuration is read from KDL (preferred), JSON or TOML. Every field has a
//! default so an empty document is a valid configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use validator::Validate;

use easyacme_common::{EasyAcmeError, EasyAcmeResult, LogFormat};

pub mod defaults;
pub mod kdl;

pub use defaults::DEFAULT_CONFIG_KDL;

// ============================================================================
// Main Configuration Structure
// ============================================================================

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct Config {
    #[validate(nested)]
    pub acme: AcmeSettings,

    #[validate(nested)]
    pub polling: PollingConfig,

    #[validate(nested)]
    pub pending: PendingConfig,

    #[validate(nested)]
    pub precheck: PrecheckConfig,

    #[validate(nested)]
    pub propagation: PropagationConfig,

    #[validate(nested)]
    pub dns_providers: DnsProvidersConfig,

    pub storage: StorageConfig,

    pub logging: LoggingConfig,
}

/// CA connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct AcmeSettings {
    /// Directory used when an account is registered without an explicit server
    #[validate(url(message = "acme.directory-url must be a valid URL"))]
    pub directory_url: String,

    /// Issuer common name of the preferred alternate chain
    pub preferred_chain: Option<String>,

    #[validate(range(min = 1, message = "acme.request-timeout-secs must be at least 1"))]
    pub request_timeout_secs: u64,

    #[validate(length(min = 1))]
    pub user_agent: String,
}

impl Default for AcmeSettings {
    fn default() -> Self {
        Self {
            directory_url: defaults::LETS_ENCRYPT_PRODUCTION.to_string(),
            preferred_chain: None,
            request_timeout_secs: 30,
            user_agent: defaults::USER_AGENT.to_string(),
        }
    }
}

impl AcmeSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Polling policy for challenge validation and order finalization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct PollingConfig {
    /// Used when the CA sends no Retry-After for a challenge
    #[validate(range(min = 1))]
    pub challenge_initial_interval_secs: u64,

    #[validate(range(min = 1))]
    pub finalize_window_secs: u64,

    #[validate(range(min = 1))]
    pub finalize_attempts: u32,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            challenge_initial_interval_secs: 5,
            finalize_window_secs: 30,
            finalize_attempts: 60,
        }
    }
}

impl PollingConfig {
    pub fn challenge_initial_interval(&self) -> Duration {
        Duration::from_secs(self.challenge_initial_interval_secs)
    }

    pub fn finalize_window(&self) -> Duration {
        Duration::from_secs(self.finalize_window_secs)
    }
}

/// Manual authorization session cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct PendingConfig {
    #[validate(range(min = 1))]
    pub ttl_secs: u64,
}

impl Default for PendingConfig {
    fn default() -> Self {
        Self { ttl_secs: 600 }
    }
}

impl PendingConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// TXT precheck run before manual validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct PrecheckConfig {
    pub retry_delay_secs: u64,

    /// Nameserver IPs; empty uses the system resolver configuration
    pub nameservers: Vec<String>,
}

impl Default for PrecheckConfig {
    fn default() -> Self {
        Self {
            retry_delay_secs: 30,
            nameservers: Vec::new(),
        }
    }
}

impl PrecheckConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    /// Parsed nameserver addresses
    pub fn nameserver_addrs(&self) -> EasyAcmeResult<Vec<IpAddr>> {
        self.nameservers
            .iter()
            .map(|ns| {
                ns.parse().map_err(|_| {
                    EasyAcmeError::validation(format!(
                        "precheck.nameservers: '{}' is not an IP address",
                        ns
                    ))
                })
            })
            .collect()
    }
}

/// Propagation wait used by the automatic DNS-01 flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct PropagationConfig {
    pub enabled: bool,

    pub initial_delay_secs: u64,

    #[validate(range(min = 1))]
    pub check_interval_secs: u64,

    #[validate(range(min = 1))]
    pub timeout_secs: u64,
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay_secs: 10,
            check_interval_secs: 5,
            timeout_secs: 120,
        }
    }
}

impl PropagationConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_secs)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Settings shared by DNS provider API clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct DnsProvidersConfig {
    #[validate(range(min = 1))]
    pub api_timeout_secs: u64,

    /// Base URL overrides keyed by provider type
    pub endpoints: HashMap<String, String>,
}

impl Default for DnsProvidersConfig {
    fn default() -> Self {
        Self {
            api_timeout_secs: 30,
            endpoints: HashMap::new(),
        }
    }
}

impl DnsProvidersConfig {
    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }
}

/// Persistence settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// JSON state file; `None` keeps everything in memory
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn log_format(&self) -> EasyAcmeResult<LogFormat> {
        self.format
            .parse()
            .map_err(|e: String| EasyAcmeError::validation(format!("logging.format: {}", e)))
    }
}

// ============================================================================
// Loading
// ============================================================================

impl Config {
    /// Load configuration from a file, dispatching on its extension
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("kdl");

        let config = match extension {
            "kdl" => Self::from_kdl(&content),
            "json" => Self::from_json(&content),
            "toml" => Self::from_toml(&content),
            _ => Err(anyhow::anyhow!("Unsupported config format: {}", extension)),
        }?;

        config.validate()?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Parse configuration from KDL format
    pub fn from_kdl(content: &str) -> Result<Self> {
        let doc: ::kdl::KdlDocument = content.parse().map_err(|e: ::kdl::KdlError| {
            use miette::Diagnostic;

            let mut error_msg = String::from("KDL configuration parse error:\n");
            if let Some(related) = e.related() {
                for diagnostic in related {
                    error_msg.push_str(&format!("\n  {}", diagnostic));
                    if let Some(labels) = diagnostic.labels() {
                        for label in labels {
                            let (line, col) = kdl::offset_to_line_col(content, label.offset());
                            error_msg.push_str(&format!(" (line {}, column {})", line, col));
                        }
                    }
                }
            } else {
                error_msg.push_str(&format!("\n  {}", e));
            }
            anyhow::anyhow!(error_msg)
        })?;

        kdl::parse_kdl_document(&doc)
    }

    /// Parse configuration from JSON format
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("Failed to parse JSON configuration")
    }

    /// Parse configuration from TOML format
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse TOML configuration")
    }

    /// The embedded default configuration
    pub fn default_embedded() -> Result<Self> {
        Self::from_kdl(DEFAULT_CONFIG_KDL)
    }

    /// Validate the configuration
    pub fn validate(&self) -> EasyAcmeResult<()> {
        Validate::validate(self).map_err(|e| {
            EasyAcmeError::validation(format!("Configuration validation failed: {}", e))
        })?;

        self.precheck.nameserver_addrs()?;
        self.logging.log_format()?;

        if self.polling.finalize_attempts as u64 > self.polling.finalize_window_secs * 1000 {
            return Err(EasyAcmeError::validation(
                "polling.finalize-attempts exceeds one probe per millisecond of the window",
            ));
        }

        Ok(())
    }
}
