use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub deposit: DepositConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub derivative: DerivativeConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DepositConfig {
    /// Program and leading arguments, split on whitespace.
    pub command: String,
    #[serde(default = "default_working_dir")]
    pub working_dir: PathBuf,
    pub depositor: String,
    #[serde(default = "default_worktype")]
    pub worktype: String,
}

fn default_working_dir() -> PathBuf {
    PathBuf::from(".")
}
fn default_worktype() -> String {
    "Etd".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct FetchConfig {
    #[serde(default)]
    pub auth_enable: bool,
    #[serde(default)]
    pub auth_user: Option<String>,
    #[serde(default)]
    pub auth_pass: Option<String>,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            auth_enable: false,
            auth_user: None,
            auth_pass: None,
            max_attempts: 3,
            retry_delay_secs: 2,
            timeout_secs: 120,
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_retry_delay_secs() -> u64 {
    2
}
fn default_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct DerivativeConfig {
    #[serde(default = "default_program")]
    pub program: String,
}

impl Default for DerivativeConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
        }
    }
}

fn default_program() -> String {
    "convert".to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RetryConfig {
    /// Where the retry file goes. Unset means next to the batch file, so
    /// relative file references in it still resolve on resume.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            file: None,
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

impl FetchConfig {
    /// Basic-auth credentials, when enabled.
    pub fn credentials(&self) -> Option<(String, Option<String>)> {
        if !self.auth_enable {
            return None;
        }
        self.auth_user
            .as_ref()
            .map(|user| (user.clone(), self.auth_pass.clone()))
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate deposit
    if config.deposit.command.split_whitespace().next().is_none() {
        anyhow::bail!("deposit.command must not be empty");
    }
    if config.deposit.depositor.trim().is_empty() {
        anyhow::bail!("deposit.depositor must not be empty");
    }

    // Validate fetch
    if config.fetch.max_attempts == 0 {
        anyhow::bail!("fetch.max_attempts must be >= 1");
    }
    if config.fetch.auth_enable && config.fetch.auth_user.is_none() {
        anyhow::bail!("fetch.auth_user must be set when fetch.auth_enable = true");
    }

    match config.logging.level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        other => anyhow::bail!(
            "Unknown logging level: '{}'. Must be trace, debug, info, warn, or error.",
            other
        ),
    }

    Ok(config)
}
