//! Browser launch profiles

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::config::BrowserConfig;
use crate::conversion::ConversionError;

/// Flags needed to run Chromium inside containers
const SANDBOX_ARGS: &[&str] = &["--no-sandbox", "--disable-setuid-sandbox"];

/// Reduced-footprint flags for ephemeral function environments
const SERVERLESS_ARGS: &[&str] = &[
    "--single-process",
    "--no-zygote",
    "--disable-dev-shm-usage",
    "--disable-gpu",
    "--no-first-run",
    "--hide-scrollbars",
    "--mute-audio",
    "--disable-extensions",
    "--disable-background-networking",
    "--ignore-certificate-errors",
];

/// DevTools command timeout when no render budget is configured
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Location of the bundled minimal browser in serverless images
pub const SERVERLESS_EXECUTABLE: &str = "/tmp/chromium";

/// Environment a browser is launched for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnvironmentProfile {
    SandboxedLocal,
    Serverless,
}

/// Everything needed to start one browser process
#[derive(Debug, Clone)]
pub struct LaunchProfile {
    pub environment: EnvironmentProfile,
    /// Browser binary; `None` lets the driver locate an installed Chrome
    pub executable: Option<PathBuf>,
    pub args: Vec<String>,
    /// Upper bound for the process to become ready
    pub launch_timeout: Duration,
    /// Quiet window used by the network idle wait
    pub network_idle: Duration,
    /// Longest the idle wait may hold up printing
    pub network_idle_max: Duration,
    /// Per-command DevTools timeout; at least the longest render budget
    pub request_timeout: Duration,
    /// Whether `executable` came from configuration rather than a lookup of known paths
    explicit_executable: bool,
}

impl LaunchProfile {
    pub fn sandboxed_local(config: &BrowserConfig) -> Self {
        let (executable, explicit_executable) = match &config.executable_path {
            Some(path) => (Some(path.clone()), true),
            None => (platform_default_executable(), false),
        };

        Self {
            environment: EnvironmentProfile::SandboxedLocal,
            executable,
            args: SANDBOX_ARGS.iter().map(|s| s.to_string()).collect(),
            launch_timeout: Duration::from_millis(config.launch_timeout_ms),
            network_idle: Duration::from_millis(config.network_idle_ms),
            network_idle_max: Duration::from_millis(config.network_idle_max_ms),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            explicit_executable,
        }
    }

    pub fn serverless(config: &BrowserConfig) -> Self {
        let executable = config
            .executable_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(SERVERLESS_EXECUTABLE));

        Self {
            environment: EnvironmentProfile::Serverless,
            executable: Some(executable),
            args: SANDBOX_ARGS
                .iter()
                .chain(SERVERLESS_ARGS)
                .map(|s| s.to_string())
                .collect(),
            launch_timeout: Duration::from_millis(config.launch_timeout_ms),
            network_idle: Duration::from_millis(config.network_idle_ms),
            network_idle_max: Duration::from_millis(config.network_idle_max_ms),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            explicit_executable: true,
        }
    }

    /// Raise the DevTools command timeout to cover the longest render
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Fail fast when a configured binary does not exist
    pub fn check_executable(&self) -> Result<(), ConversionError> {
        match &self.executable {
            Some(path) if self.explicit_executable && !path.is_file() => {
                Err(ConversionError::BrowserLaunchFailed(format!(
                    "browser binary not found at {}",
                    path.display()
                )))
            }
            _ => Ok(()),
        }
    }
}

fn platform_default_executable() -> Option<PathBuf> {
    let candidates: &[&str] = if cfg!(target_os = "windows") {
        &[r"C:\Program Files\Google\Chrome\Application\chrome.exe"]
    } else if cfg!(target_os = "macos") {
        &["/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"]
    } else {
        &["/usr/bin/google-chrome", "/usr/bin/chromium", "/usr/bin/chromium-browser"]
    };

    candidates
        .iter()
        .map(PathBuf::from)
        .find(|path| path.is_file())
}
