use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::AppError;
use crate::workflows::grading::{GradePolicy, PolicyKind};
use crate::workflows::notifications::RetryPolicy;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub grading: GradingSettings,
    pub escalation: EscalationSettings,
    pub notifications: NotificationSettings,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let log_format = match env::var("APP_LOG_FORMAT") {
            Ok(raw) => LogFormat::parse(&raw).ok_or(ConfigError::InvalidLogFormat(raw))?,
            Err(_) => LogFormat::Compact,
        };

        let policy = match env::var("GRADE_POLICY") {
            Ok(raw) => PolicyKind::parse(&raw).ok_or(ConfigError::InvalidGradePolicy(raw))?,
            Err(_) => PolicyKind::Threshold,
        };
        let policy_file = env::var("GRADE_POLICY_FILE")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(PathBuf::from);

        let enabled = match env::var("ESCALATION_ENABLED") {
            Ok(raw) => parse_flag(&raw).ok_or(ConfigError::InvalidFlag {
                key: "ESCALATION_ENABLED",
                value: raw,
            })?,
            Err(_) => true,
        };
        let short_period = seconds_var("ESCALATION_SHORT_PERIOD_SECS", 600)?;
        let long_period = seconds_var("ESCALATION_LONG_PERIOD_SECS", 3600)?;

        let max_attempts = number_var("NOTIFY_MAX_ATTEMPTS", 3)?;
        if max_attempts == 0 {
            return Err(ConfigError::InvalidNumber {
                key: "NOTIFY_MAX_ATTEMPTS",
                value: "0".to_string(),
            });
        }
        let backoff_base_ms = number_var("NOTIFY_BACKOFF_MS", 250)?;
        let push_gateway_url = env::var("PUSH_GATEWAY_URL")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig {
                log_level,
                format: log_format,
            },
            grading: GradingSettings {
                policy,
                policy_file,
            },
            escalation: EscalationSettings {
                enabled,
                short_period,
                long_period,
            },
            notifications: NotificationSettings {
                retry: RetryPolicy {
                    max_attempts: max_attempts as u32,
                    backoff_base_ms,
                },
                push_gateway_url,
            },
        })
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn number_var(key: &'static str, default: u64) -> Result<u64, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidNumber { key, value: raw }),
        Err(_) => Ok(default),
    }
}

fn seconds_var(key: &'static str, default: u64) -> Result<Duration, ConfigError> {
    let seconds = number_var(key, default)?;
    if seconds == 0 {
        return Err(ConfigError::InvalidNumber {
            key,
            value: "0".to_string(),
        });
    }
    Ok(Duration::from_secs(seconds))
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Output layout for the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "compact" | "text" => Some(Self::Compact),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub format: LogFormat,
}

/// Which classifier policy grades contractors.
#[derive(Debug, Clone)]
pub struct GradingSettings {
    pub policy: PolicyKind,
    /// JSON policy definition; replaces the standard rubric for `policy` when set.
    pub policy_file: Option<PathBuf>,
}

impl GradingSettings {
    pub fn resolve_policy(&self) -> Result<GradePolicy, AppError> {
        match &self.policy_file {
            Some(path) => {
                let raw = std::fs::read_to_string(path)?;
                Ok(GradePolicy::from_json(&raw)?)
            }
            None => Ok(GradePolicy::standard(self.policy)),
        }
    }
}

/// Cadence of the two surcharge escalation jobs.
#[derive(Debug, Clone)]
pub struct EscalationSettings {
    pub enabled: bool,
    pub short_period: Duration,
    pub long_period: Duration,
}

/// Delivery retry policy and the optional push gateway endpoint.
#[derive(Debug, Clone)]
pub struct NotificationSettings {
    pub retry: RetryPolicy,
    pub push_gateway_url: Option<String>,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost {
        source: std::net::AddrParseError,
    },
    InvalidLogFormat(String),
    InvalidGradePolicy(String),
    InvalidFlag {
        key: &'static str,
        value: String,
    },
    InvalidNumber {
        key: &'static str,
        value: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidLogFormat(value) => {
                write!(f, "APP_LOG_FORMAT must be 'compact' or 'json', got '{value}'")
            }
            ConfigError::InvalidGradePolicy(value) => {
                write!(
                    f,
                    "GRADE_POLICY must be 'threshold' or 'weighted', got '{value}'"
                )
            }
            ConfigError::InvalidFlag { key, value } => {
                write!(f, "{key} must be a boolean flag, got '{value}'")
            }
            ConfigError::InvalidNumber { key, value } => {
                write!(f, "{key} must be a positive integer, got '{value}'")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}
