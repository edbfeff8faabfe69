//! Configuration management for the HTML to PDF server

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

use crate::conversion::options::{Length, RenderDefaults};

const DEFAULT_REMOTE_ENDPOINT: &str = "https://api.pdfshift.io/v3/convert/pdf";

/// Configuration errors that cannot be papered over with a default
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Unknown conversion mode `{0}` (expected local, serverless or remote)")]
    UnknownMode(String),

    #[error("CONVERSION_TIMEOUT_MS ({timeout_ms}) exceeds CONVERSION_MAX_TIMEOUT_MS ({max_timeout_ms})")]
    TimeoutAboveMaximum { timeout_ms: u64, max_timeout_ms: u64 },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub conversion: ConversionConfig,
    pub browser: BrowserConfig,
    pub remote: RemoteApiConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Reported on the status endpoint
    pub environment: String,
}

/// Which backend renders documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentMode {
    Local,
    Serverless,
    Remote,
}

impl DeploymentMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Serverless => "serverless",
            Self::Remote => "remote",
        }
    }

    /// Default per-call timeout in milliseconds
    pub fn default_timeout_ms(self) -> u64 {
        match self {
            Self::Local => 30_000,
            Self::Serverless => 15_000,
            Self::Remote => 60_000,
        }
    }

    pub fn default_margin(self) -> Length {
        match self {
            Self::Serverless => Length::cm(0.5),
            Self::Local | Self::Remote => Length::px(40.0),
        }
    }
}

impl FromStr for DeploymentMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "serverless" => Ok(Self::Serverless),
            "remote" => Ok(Self::Remote),
            other => Err(ConfigError::UnknownMode(other.to_string())),
        }
    }
}

impl fmt::Display for DeploymentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct ConversionConfig {
    pub mode: DeploymentMode,
    pub timeout_ms: u64,
    pub max_timeout_ms: u64,
    /// Concurrent browser processes
    pub max_sessions: usize,
}

#[derive(Debug, Clone)]
pub struct BrowserConfig {
    pub executable_path: Option<PathBuf>,
    pub launch_timeout_ms: u64,
    pub network_idle_ms: u64,
    /// Hard cap on the network idle wait
    pub network_idle_max_ms: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            executable_path: None,
            launch_timeout_ms: 10_000,
            network_idle_ms: 500,
            network_idle_max_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RemoteApiConfig {
    pub endpoint: String,
    pub demo_endpoint: String,
    pub api_key: Option<String>,
}

impl Default for RemoteApiConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_REMOTE_ENDPOINT.to_string(),
            demo_endpoint: DEFAULT_REMOTE_ENDPOINT.to_string(),
            api_key: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
                environment: "development".to_string(),
            },
            conversion: ConversionConfig {
                mode: DeploymentMode::Local,
                timeout_ms: DeploymentMode::Local.default_timeout_ms(),
                max_timeout_ms: 120_000,
                max_sessions: 4,
            },
            browser: BrowserConfig::default(),
            remote: RemoteApiConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let environment = var("APP_ENV").unwrap_or_else(|| "development".to_string());
        let mode = match var("CONVERSION_MODE") {
            Some(mode) => mode.parse()?,
            None if environment.eq_ignore_ascii_case("production") => DeploymentMode::Serverless,
            None => DeploymentMode::Local,
        };

        let max_timeout_ms = parse_or(&var, "CONVERSION_MAX_TIMEOUT_MS", 120_000u64).max(1);
        let timeout_ms = parse_or(&var, "CONVERSION_TIMEOUT_MS", mode.default_timeout_ms()).max(1);
        if timeout_ms > max_timeout_ms {
            return Err(ConfigError::TimeoutAboveMaximum {
                timeout_ms,
                max_timeout_ms,
            });
        }

        let endpoint = var("PDF_API_URL").unwrap_or_else(|| DEFAULT_REMOTE_ENDPOINT.to_string());

        Ok(Config {
            server: ServerConfig {
                host: var("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: parse_or(&var, "SERVER_PORT", 3000),
                environment,
            },
            conversion: ConversionConfig {
                mode,
                timeout_ms,
                max_timeout_ms,
                max_sessions: parse_or(&var, "MAX_BROWSER_SESSIONS", 4usize).max(1),
            },
            browser: BrowserConfig {
                executable_path: var("CHROME_EXECUTABLE_PATH").map(PathBuf::from),
                launch_timeout_ms: parse_or(&var, "BROWSER_LAUNCH_TIMEOUT_MS", 10_000),
                network_idle_ms: parse_or(&var, "NETWORK_IDLE_MS", 500),
                network_idle_max_ms: parse_or(&var, "NETWORK_IDLE_MAX_MS", 10_000),
            },
            remote: RemoteApiConfig {
                demo_endpoint: var("PDF_API_DEMO_URL").unwrap_or_else(|| endpoint.clone()),
                endpoint,
                api_key: var("PDF_API_KEY"),
            },
        })
    }

    /// Defaults applied to every request's render options
    pub fn render_defaults(&self) -> RenderDefaults {
        RenderDefaults {
            margin: self.conversion.mode.default_margin(),
            timeout: Duration::from_millis(self.conversion.timeout_ms),
            max_timeout: Duration::from_millis(self.conversion.max_timeout_ms),
        }
    }
}

fn parse_or<T, F>(var: &F, key: &str, default: T) -> T
where
    T: FromStr + fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring invalid {}={:?}, using {}", key, raw, default);
            default
        }),
        None => default,
    }
}
