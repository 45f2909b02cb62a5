use crate::error::ConfigError;
use crate::poller::{PollPolicy, MAX_WAIT_LIMIT};
use crate::provider::ProviderEndpoints;
use crate::types::Platform;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// ProviderConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_provisioning_url")]
    pub provisioning_url: String,
    #[serde(default = "default_copytrade_url")]
    pub copytrade_url: String,
    #[serde(default = "default_trading_url")]
    pub trading_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_provisioning_url() -> String {
    "https://mt-provisioning-api-v1.agiliumtrade.agiliumtrade.ai".to_string()
}

fn default_copytrade_url() -> String {
    "https://copyfactory-api-v1.new-york.agiliumtrade.ai".to_string()
}

fn default_trading_url() -> String {
    "https://mt-client-api-v1.new-york.agiliumtrade.ai".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            provisioning_url: default_provisioning_url(),
            copytrade_url: default_copytrade_url(),
            trading_url: default_trading_url(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

// ---------------------------------------------------------------------------
// PollingConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_max_wait")]
    pub max_wait_secs: u64,
    #[serde(default = "default_interval")]
    pub interval_ms: u64,
}

fn default_max_wait() -> u64 {
    90
}

fn default_interval() -> u64 {
    2500
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            max_wait_secs: default_max_wait(),
            interval_ms: default_interval(),
        }
    }
}

impl PollingConfig {
    pub fn policy(&self) -> PollPolicy {
        PollPolicy {
            max_wait: Duration::from_secs(self.max_wait_secs),
            interval: Duration::from_millis(self.interval_ms),
        }
    }
}

// ---------------------------------------------------------------------------
// AccountDefaults
// ---------------------------------------------------------------------------

/// Values applied to new accounts when the request leaves them out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountDefaults {
    #[serde(default = "default_platform")]
    pub platform: Platform,
    #[serde(default = "default_account_type")]
    pub account_type: String,
    #[serde(default)]
    pub magic: u64,
}

fn default_platform() -> Platform {
    Platform::Mt5
}

fn default_account_type() -> String {
    "cloud-g2".to_string()
}

impl Default for AccountDefaults {
    fn default() -> Self {
        Self {
            platform: default_platform(),
            account_type: default_account_type(),
            magic: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// LinkConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_strategy_id: Option<String>,
    #[serde(default = "default_multiplier")]
    pub default_multiplier: f64,
    /// Undeploy and delete the account when it never connects.
    #[serde(default = "default_cleanup")]
    pub cleanup_on_failure: bool,
    /// Check the strategy exists before creating anything.
    #[serde(default = "default_verify_strategy")]
    pub verify_strategy: bool,
}

fn default_multiplier() -> f64 {
    1.0
}

fn default_cleanup() -> bool {
    true
}

fn default_verify_strategy() -> bool {
    true
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            default_strategy_id: None,
            default_multiplier: default_multiplier(),
            cleanup_on_failure: default_cleanup(),
            verify_strategy: default_verify_strategy(),
        }
    }
}

// ---------------------------------------------------------------------------
// ServerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

// ---------------------------------------------------------------------------
// ServiceConfig (top-level)
// ---------------------------------------------------------------------------

/// Process-wide settings, resolved once at startup and passed down explicitly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub account: AccountDefaults,
    #[serde(default)]
    pub link: LinkConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl ServiceConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let data = std::fs::read_to_string(path)?;
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(&data)?)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn endpoints(&self) -> ProviderEndpoints {
        ProviderEndpoints {
            provisioning_url: self.provider.provisioning_url.clone(),
            copytrade_url: self.provider.copytrade_url.clone(),
            trading_url: self.provider.trading_url.clone(),
            token: self.provider.token.clone(),
            request_timeout: Duration::from_secs(self.provider.request_timeout_secs),
        }
    }

    pub fn poll_policy(&self) -> PollPolicy {
        self.polling.policy()
    }

    /// Fail on any `WarnLevel::Error` finding.
    pub fn ensure_valid(&self) -> Result<(), ConfigError> {
        let errors: Vec<String> = self
            .validate()
            .into_iter()
            .filter(|w| w.level == WarnLevel::Error)
            .map(|w| w.message)
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(errors.join("; ")))
        }
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.provider.token.trim().is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "provider.token is empty (set COPYLINK_TOKEN)".to_string(),
            });
        }

        for (key, url) in [
            ("provider.provisioning_url", &self.provider.provisioning_url),
            ("provider.copytrade_url", &self.provider.copytrade_url),
            ("provider.trading_url", &self.provider.trading_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("{key} '{url}' is not an http(s) URL"),
                });
            }
        }

        if self.polling.interval_ms == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "polling.interval_ms must be greater than zero".to_string(),
            });
        } else if self.polling.interval_ms >= self.polling.max_wait_secs.saturating_mul(1000) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "polling.interval_ms={} is not shorter than max_wait_secs={} (only one poll will run)",
                    self.polling.interval_ms, self.polling.max_wait_secs
                ),
            });
        }

        if self.polling.max_wait_secs > MAX_WAIT_LIMIT.as_secs() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!(
                    "polling.max_wait_secs={} exceeds the limit of {}",
                    self.polling.max_wait_secs,
                    MAX_WAIT_LIMIT.as_secs()
                ),
            });
        }

        if self.link.default_multiplier <= 0.0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!(
                    "link.default_multiplier={} must be greater than zero",
                    self.link.default_multiplier
                ),
            });
        }

        if self.link.default_strategy_id.is_none() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "link.default_strategy_id is unset; every link request must name a strategy"
                    .to_string(),
            });
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
