use crate::checkpoint::CheckpointConfig;
use crate::domain::YearRange;
use crate::fetcher::{ClientConfig, RetryConfig};
use crate::harvest::{FailurePolicy, HarvestSettings};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("File error: {0}")]
    FileError(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    ParseError(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

/// How a run treats existing output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HarvestMode {
    /// Full year range ending at `year_end`, optionally starting from scratch.
    #[default]
    Backfill,
    /// Extends coverage to the current year and skips awards already stored.
    Update,
}

#[derive(Parser, Debug, Clone, Serialize, Deserialize)]
#[command(author, version, about = "Resumable harvester for the NSF awards API", long_about = None)]
#[serde(default)]
pub struct Config {
    /// Run mode
    #[arg(long, env = "HARVEST_MODE", default_value = "backfill")]
    pub mode: HarvestMode,

    /// Delete the output and checkpoint before starting (backfill only)
    #[arg(long, env = "HARVEST_RESET")]
    pub reset: bool,

    /// Awards API endpoint URL
    #[arg(
        long,
        env = "AWARDS_ENDPOINT",
        default_value = "https://api.nsf.gov/services/v1/awards.json"
    )]
    pub endpoint: String,

    /// CSV file the awards are appended to
    #[arg(long, env = "OUTPUT_FILE", default_value = "nsf_awards_us_2019_2024.csv")]
    pub output_file: PathBuf,

    /// JSON checkpoint file
    #[arg(long, env = "CHECKPOINT_FILE", default_value = "checkpoint.json")]
    pub checkpoint_file: PathBuf,

    /// Records requested per page
    #[arg(long, env = "PAGE_SIZE", default_value = "25")]
    pub page_size: u32,

    /// Pause after every full page in milliseconds
    #[arg(long, env = "PAUSE_MS", default_value = "200")]
    pub pause_ms: u64,

    /// Attempts per page before giving up
    #[arg(long, env = "MAX_RETRIES", default_value = "3")]
    pub max_retries: u32,

    /// Backoff step in milliseconds; the n-th retry waits n times this
    #[arg(long, env = "RETRY_BASE_DELAY_MS", default_value = "2000")]
    pub retry_base_delay_ms: u64,

    /// Request timeout in seconds
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value = "40")]
    pub timeout_secs: u64,

    /// Oldest year to harvest
    #[arg(long, env = "YEAR_START", default_value = "2019")]
    pub year_start: i32,

    /// Newest year to harvest (update mode always uses the current year)
    #[arg(long, env = "YEAR_END", default_value = "2024")]
    pub year_end: i32,

    /// Issuing agency filter
    #[arg(long, env = "AWARDS_AGENCY", default_value = "NSF")]
    pub agency: String,

    /// Awardee country filter
    #[arg(long, env = "AWARDEE_COUNTRY_CODE", default_value = "US")]
    pub country_code: String,

    /// Comma separated list of fields to request
    #[arg(
        long,
        env = "PRINT_FIELDS",
        value_delimiter = ',',
        default_value = "agency,awardeeCountryCode,awardeeStateCode,awardeeName,startDate,expDate,date,title,abstractText"
    )]
    pub fields: Vec<String>,

    /// What to do when a page cannot be fetched
    #[arg(long, env = "ON_FETCH_FAILURE", default_value = "skip")]
    pub on_fetch_failure: FailurePolicy,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: LogLevel,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON")]
    pub log_json: bool,

    /// Configuration file path (optional)
    #[arg(long, env = "CONFIG_FILE")]
    pub config_file: Option<PathBuf>,

    /// Derived fields (not CLI arguments)
    #[serde(skip)]
    #[arg(skip)]
    pub pause: Duration,

    #[serde(skip)]
    #[arg(skip)]
    pub timeout: Duration,

    #[serde(skip)]
    #[arg(skip)]
    pub retry_base_delay: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: HarvestMode::Backfill,
            reset: false,
            endpoint: "https://api.nsf.gov/services/v1/awards.json".to_string(),
            output_file: PathBuf::from("nsf_awards_us_2019_2024.csv"),
            checkpoint_file: PathBuf::from("checkpoint.json"),
            page_size: 25,
            pause_ms: 200,
            max_retries: 3,
            retry_base_delay_ms: 2000,
            timeout_secs: 40,
            year_start: 2019,
            year_end: 2024,
            agency: "NSF".to_string(),
            country_code: "US".to_string(),
            fields: crate::fetcher::DEFAULT_FIELDS
                .iter()
                .map(|f| (*f).to_string())
                .collect(),
            on_fetch_failure: FailurePolicy::Skip,
            log_level: LogLevel::Info,
            log_json: false,
            config_file: None,
            pause: Duration::from_millis(200),
            timeout: Duration::from_secs(40),
            retry_base_delay: Duration::from_millis(2000),
        }
    }
}

impl Config {
    pub fn from_args<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let mut config = Config::parse_from(args);
        config.post_process()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let mut config: Config = toml::from_str(content)?;
        config.post_process()?;
        config.validate()?;
        Ok(config)
    }

    pub fn post_process(&mut self) -> Result<(), ConfigError> {
        self.pause = Duration::from_millis(self.pause_ms);
        self.timeout = Duration::from_secs(self.timeout_secs);
        self.retry_base_delay = Duration::from_millis(self.retry_base_delay_ms);

        self.fields = self
            .fields
            .iter()
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty())
            .collect();

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        Url::parse(&self.endpoint).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid endpoint URL '{}': {}", self.endpoint, e))
        })?;

        if self.page_size == 0 {
            return Err(ConfigError::InvalidConfig(
                "Page size must be greater than 0".to_string(),
            ));
        }

        if self.max_retries == 0 {
            return Err(ConfigError::InvalidConfig(
                "Max retries must be greater than 0".to_string(),
            ));
        }

        if self.timeout_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "Request timeout must be greater than 0".to_string(),
            ));
        }

        if self.mode == HarvestMode::Backfill && self.year_start > self.year_end {
            return Err(ConfigError::InvalidConfig(format!(
                "Year start ({}) must not be after year end ({})",
                self.year_start, self.year_end
            )));
        }

        if self.fields.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "At least one field must be requested".to_string(),
            ));
        }

        Ok(())
    }

    /// Year window for a run happening in `current_year`.
    pub fn year_range(&self, current_year: i32) -> Result<YearRange, ConfigError> {
        let end = match self.mode {
            HarvestMode::Backfill => self.year_end,
            HarvestMode::Update => current_year,
        };
        if self.year_start > end {
            return Err(ConfigError::InvalidConfig(format!(
                "Year start ({}) must not be after year end ({end})",
                self.year_start
            )));
        }
        Ok(YearRange::new(self.year_start, end))
    }

    pub fn harvest_settings(&self, range: YearRange) -> HarvestSettings {
        HarvestSettings {
            range,
            page_size: self.page_size,
            pause: self.pause,
            on_fetch_failure: self.on_fetch_failure,
        }
    }

    pub fn checkpoint_config(&self, range: YearRange) -> CheckpointConfig {
        CheckpointConfig {
            path: self.checkpoint_file.clone(),
            range,
            page_size: self.page_size,
        }
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            endpoint: self.endpoint.clone(),
            timeout: self.timeout,
            agency: self.agency.clone(),
            country_code: self.country_code.clone(),
            fields: self.fields.clone(),
            page_size: self.page_size,
            ..ClientConfig::default()
        }
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_retries,
            base_delay: self.retry_base_delay,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_parsed_defaults() {
        let parsed = Config::from_args(["nsf-harvest"]).unwrap();
        let mut default = Config::default();
        default.post_process().unwrap();

        assert_eq!(parsed.mode, default.mode);
        assert_eq!(parsed.endpoint, default.endpoint);
        assert_eq!(parsed.page_size, default.page_size);
        assert_eq!(parsed.fields, default.fields);
        assert_eq!(parsed.pause, default.pause);
        assert_eq!(parsed.retry_base_delay, default.retry_base_delay);
    }

    #[test]
    fn test_update_mode_extends_to_current_year() {
        let config = Config {
            mode: HarvestMode::Update,
            ..Config::default()
        };
        assert_eq!(config.year_range(2026).unwrap(), YearRange::new(2019, 2026));

        let config = Config::default();
        assert_eq!(config.year_range(2026).unwrap(), YearRange::new(2019, 2024));
    }

    #[test]
    fn test_retry_config_is_linear() {
        let mut config = Config::default();
        config.post_process().unwrap();
        let retry = config.retry_config();
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.base_delay, Duration::from_secs(2));

        let policy = crate::fetcher::RetryPolicy::new(retry).unwrap();
        assert_eq!(policy.calculate_delay(2), Duration::from_secs(4));
    }

    #[test]
    fn test_invalid_year_order() {
        let config = Config {
            year_start: 2025,
            year_end: 2020,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidConfig(_))
        ));
    }
}
