//! Daemon configuration loaded from `warden.toml`.
//!
//! ```toml
//! server_url = "https://vault.example.com"
//! session_cookie = "session=abc123"
//!
//! [monitor]
//! check_interval_ms = 60000
//! grace_failures = 3
//! request_timeout_ms = 10000
//!
//! [surfaces]
//! authenticated = "app"
//! login = "login"
//! ```
//!
//! Every key is optional. A missing file yields defaults.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Result, WardenError};
use crate::phase::SurfaceRole;

pub const DEFAULT_CHECK_INTERVAL_MS: u64 = 60_000;
pub const DEFAULT_GRACE_FAILURES: u32 = 3;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WardenConfig {
    /// Base URL of the credential server. No URL means no user is configured
    /// yet and the daemon skips the bootstrap check.
    #[serde(default)]
    pub server_url: Option<String>,
    #[serde(default)]
    pub session_cookie: Option<String>,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub surfaces: SurfaceConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_check_interval_ms")]
    pub check_interval_ms: u64,
    /// Consecutive transport failures tolerated before an authenticated
    /// session is treated as lost.
    #[serde(default = "default_grace_failures")]
    pub grace_failures: u32,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            check_interval_ms: DEFAULT_CHECK_INTERVAL_MS,
            grace_failures: DEFAULT_GRACE_FAILURES,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }
}

impl MonitorConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SurfaceConfig {
    #[serde(default = "default_authenticated_surface")]
    pub authenticated: String,
    #[serde(default = "default_login_surface")]
    pub login: String,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            authenticated: default_authenticated_surface(),
            login: default_login_surface(),
        }
    }
}

impl SurfaceConfig {
    pub fn name_for(&self, role: SurfaceRole) -> &str {
        match role {
            SurfaceRole::Authenticated => &self.authenticated,
            SurfaceRole::Login => &self.login,
        }
    }
}

impl WardenConfig {
    pub fn validate(&self) -> Result<()> {
        if self.monitor.check_interval_ms == 0 {
            return Err(WardenError::ConfigInvalid(
                "monitor.check_interval_ms must be positive".to_string(),
            ));
        }
        if self.monitor.request_timeout_ms == 0 {
            return Err(WardenError::ConfigInvalid(
                "monitor.request_timeout_ms must be positive".to_string(),
            ));
        }
        if self.surfaces.authenticated.trim().is_empty() || self.surfaces.login.trim().is_empty()
        {
            return Err(WardenError::ConfigInvalid(
                "surface names must not be empty".to_string(),
            ));
        }
        if self.surfaces.authenticated == self.surfaces.login {
            return Err(WardenError::ConfigInvalid(
                "authenticated and login surfaces must differ".to_string(),
            ));
        }
        if let Some(url) = self.server_url.as_deref() {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(WardenError::ConfigInvalid(format!(
                    "server_url must be an http(s) URL: {}",
                    url
                )));
            }
        }
        Ok(())
    }

    /// `server_url` without a trailing slash, if one is configured.
    pub fn server_base(&self) -> Option<&str> {
        self.server_url
            .as_deref()
            .map(|url| url.trim_end_matches('/'))
            .filter(|url| !url.is_empty())
    }
}

fn default_check_interval_ms() -> u64 {
    DEFAULT_CHECK_INTERVAL_MS
}

fn default_grace_failures() -> u32 {
    DEFAULT_GRACE_FAILURES
}

fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

fn default_authenticated_surface() -> String {
    "app".to_string()
}

fn default_login_surface() -> String {
    "login".to_string()
}

/// Loads and validates `path`, returning defaults when the file does not exist.
pub fn load_config(path: &Path) -> Result<WardenConfig> {
    if !path.exists() {
        return Ok(WardenConfig::default());
    }

    let content = fs_err::read_to_string(path).map_err(|err| WardenError::Io {
        context: format!("reading config {}", path.display()),
        source: err,
    })?;
    let config =
        toml::from_str::<WardenConfig>(&content).map_err(|err| WardenError::ConfigMalformed {
            path: path.to_path_buf(),
            details: err.to_string(),
        })?;
    config.validate()?;
    Ok(config)
}
