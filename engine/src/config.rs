// --- Configuration -------------------------------------------------------
//
// Everything comes from the environment, with defaults that work when the
// engine runs on a laptop joined to the device's own Wi-Fi:
//
//   STAGEPANEL_BIND               local API address      (127.0.0.1:3000)
//   STAGEPANEL_DEVICE_URL         device base URL        (http://192.168.4.1)
//   STAGEPANEL_UI_DIR             static UI to serve     (unset: API only)
//   STAGEPANEL_HTTP_TIMEOUT_SECS  connect/request limit  (30)

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;

pub const DEFAULT_BIND: &str = "127.0.0.1:3000";
pub const DEFAULT_DEVICE_URL: &str = "http://192.168.4.1";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelConfig {
    pub bind: SocketAddr,
    pub device_url: String,
    pub ui_dir: Option<PathBuf>,
    pub http_timeout: Duration,
}

impl PanelConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind = var("STAGEPANEL_BIND")
            .unwrap_or_else(|| DEFAULT_BIND.to_string())
            .parse()
            .context("STAGEPANEL_BIND is not a socket address")?;

        let device_url = var("STAGEPANEL_DEVICE_URL").unwrap_or_else(|| DEFAULT_DEVICE_URL.to_string());
        if !device_url.starts_with("http://") && !device_url.starts_with("https://") {
            anyhow::bail!("STAGEPANEL_DEVICE_URL must start with http:// or https://, got {device_url}");
        }

        let http_timeout = match var("STAGEPANEL_HTTP_TIMEOUT_SECS") {
            Some(v) => v
                .parse::<u64>()
                .context("STAGEPANEL_HTTP_TIMEOUT_SECS is not a whole number of seconds")?,
            None => DEFAULT_HTTP_TIMEOUT_SECS,
        };
        if http_timeout == 0 {
            anyhow::bail!("STAGEPANEL_HTTP_TIMEOUT_SECS must be at least 1");
        }

        Ok(Self {
            bind,
            device_url: device_url.trim_end_matches('/').to_string(),
            ui_dir: var("STAGEPANEL_UI_DIR").map(PathBuf::from),
            http_timeout: Duration::from_secs(http_timeout),
        })
    }
}
