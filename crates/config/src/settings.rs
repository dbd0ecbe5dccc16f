use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::CONFIG_FILE_NAME;

pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";

/// Process-level settings read once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub bind: SocketAddr,
    pub data_dir: PathBuf,
    pub config_file: PathBuf,
    /// Reachability target; the model host itself is probed when unset.
    pub backend_api_url: Option<String>,
    pub github_api_url: String,
    pub github_token: Option<String>,
    pub connect_timeout: Duration,
    pub status_timeout: Duration,
    pub upstream_attempts: u32,
}

impl ServerSettings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let value = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let port = parse_or(value("PORT"), "PORT", DEFAULT_PORT)?;
        let ip = parse_or(
            value("LUMEN_BIND"),
            "LUMEN_BIND",
            IpAddr::V4(Ipv4Addr::LOCALHOST),
        )?;

        let data_dir = match value("LUMEN_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => default_data_dir(),
        };
        let config_file = value("LUMEN_CONFIG_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join(CONFIG_FILE_NAME));

        let connect_ms = parse_or(value("LUMEN_CONNECT_TIMEOUT_MS"), "LUMEN_CONNECT_TIMEOUT_MS", 8_000u64)?;
        let status_ms = parse_or(value("LUMEN_STATUS_TIMEOUT_MS"), "LUMEN_STATUS_TIMEOUT_MS", 4_000u64)?;
        let upstream_attempts =
            parse_or(value("LUMEN_UPSTREAM_ATTEMPTS"), "LUMEN_UPSTREAM_ATTEMPTS", 2u32)?.max(1);

        Ok(Self {
            bind: SocketAddr::new(ip, port),
            data_dir,
            config_file,
            backend_api_url: value("BACKEND_API_URL"),
            github_api_url: value("GITHUB_API_URL")
                .unwrap_or_else(|| DEFAULT_GITHUB_API_URL.to_string()),
            github_token: value("GITHUB_TOKEN"),
            connect_timeout: Duration::from_millis(connect_ms),
            status_timeout: Duration::from_millis(status_ms),
            upstream_attempts,
        })
    }
}

fn default_data_dir() -> PathBuf {
    let mut dir = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    dir.push("lumen");
    dir
}

fn parse_or<T>(raw: Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match raw {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {key}: `{raw}`")),
        None => Ok(default),
    }
}
