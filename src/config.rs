use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::format::PixelFormat;

const DEFAULT_FORMAT: PixelFormat = PixelFormat::Rgb;
const DEFAULT_POLL_INTERVAL_MS: u64 = 100;
const DEFAULT_DRAIN_TIMEOUT_SECS: u64 = 5;
const SUPPORTED_SCHEMES: &[&str] = &["rtsp", "rtsps", "rtspt", "stub"];

#[derive(Debug, Deserialize, Default)]
struct TapConfigFile {
    url: Option<String>,
    latency_ms: Option<u32>,
    format: Option<String>,
    poll_interval_ms: Option<u64>,
    drain_timeout_secs: Option<u64>,
    queue: Option<bool>,
}

/// Resolved settings for one consume run.
#[derive(Debug, Clone)]
pub struct TapConfig {
    pub url: String,
    pub debug: bool,
    /// Jitter buffer latency passed to the RTSP source; engine default when unset.
    pub latency_ms: Option<u32>,
    pub expected_format: PixelFormat,
    pub poll_interval: Duration,
    /// Upper bound on draining the bus for EOS after an interrupt.
    pub drain_timeout: Duration,
    /// Insert a queue ahead of the sink.
    pub queue: bool,
}

/// Command-line values. Unset fields leave the file/env layers in place.
#[derive(Debug, Clone, Default)]
pub struct TapOverrides {
    pub url: Option<String>,
    pub config_path: Option<PathBuf>,
    pub debug: bool,
    pub latency_ms: Option<u32>,
    pub format: Option<String>,
    pub drain_timeout_secs: Option<u64>,
    pub no_queue: bool,
}

impl TapConfig {
    /// Defaults for `url`, validated.
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let mut cfg = Self::from_file(TapConfigFile {
            url: Some(url.into()),
            ..TapConfigFile::default()
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Resolve defaults, config file, environment and command line, in that order.
    pub fn load(overrides: TapOverrides) -> Result<Self> {
        let config_path = overrides.config_path.clone().or_else(|| {
            std::env::var("RTSP_TAP_CONFIG")
                .ok()
                .filter(|path| !path.trim().is_empty())
                .map(PathBuf::from)
        });
        let file_cfg = match config_path.as_deref() {
            Some(path) => read_config_file(path)?,
            None => TapConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg)?;
        cfg.apply_env()?;
        cfg.apply_overrides(overrides)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: TapConfigFile) -> Result<Self> {
        let expected_format = match file.format.as_deref() {
            Some(format) => PixelFormat::from_caps_str(format)?,
            None => DEFAULT_FORMAT,
        };
        Ok(Self {
            url: file.url.unwrap_or_default(),
            debug: false,
            latency_ms: file.latency_ms,
            expected_format,
            poll_interval: Duration::from_millis(
                file.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS),
            ),
            drain_timeout: Duration::from_secs(
                file.drain_timeout_secs
                    .unwrap_or(DEFAULT_DRAIN_TIMEOUT_SECS),
            ),
            queue: file.queue.unwrap_or(true),
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("RTSP_TAP_URL") {
            if !url.trim().is_empty() {
                self.url = url;
            }
        }
        if let Ok(latency) = std::env::var("RTSP_TAP_LATENCY_MS") {
            let ms: u32 = latency
                .parse()
                .map_err(|_| anyhow!("RTSP_TAP_LATENCY_MS must be an integer number of milliseconds"))?;
            self.latency_ms = Some(ms);
        }
        if let Ok(drain) = std::env::var("RTSP_TAP_DRAIN_TIMEOUT_SECS") {
            let seconds: u64 = drain.parse().map_err(|_| {
                anyhow!("RTSP_TAP_DRAIN_TIMEOUT_SECS must be an integer number of seconds")
            })?;
            self.drain_timeout = Duration::from_secs(seconds);
        }
        Ok(())
    }

    fn apply_overrides(&mut self, overrides: TapOverrides) -> Result<()> {
        if let Some(url) = overrides.url {
            self.url = url;
        }
        self.debug = overrides.debug;
        if let Some(ms) = overrides.latency_ms {
            self.latency_ms = Some(ms);
        }
        if let Some(format) = overrides.format.as_deref() {
            self.expected_format = PixelFormat::from_caps_str(format)?;
        }
        if let Some(seconds) = overrides.drain_timeout_secs {
            self.drain_timeout = Duration::from_secs(seconds);
        }
        if overrides.no_queue {
            self.queue = false;
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        self.url = self.url.trim().to_string();
        if self.url.is_empty() {
            return Err(anyhow!("no RTSP URL given"));
        }
        let parsed =
            Url::parse(&self.url).map_err(|e| anyhow!("invalid URL {:?}: {}", self.url, e))?;
        if !SUPPORTED_SCHEMES.contains(&parsed.scheme()) {
            return Err(anyhow!(
                "unsupported URL scheme {:?} (expected one of {})",
                parsed.scheme(),
                SUPPORTED_SCHEMES.join(", ")
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(anyhow!("poll interval must be greater than zero"));
        }
        if self.drain_timeout.is_zero() {
            return Err(anyhow!("drain timeout must be greater than zero"));
        }
        Ok(())
    }

    /// Whether the URL selects the synthetic backend. Schemes are case-insensitive.
    pub fn is_stub(&self) -> bool {
        Url::parse(&self.url)
            .map(|url| url.scheme() == "stub")
            .unwrap_or(false)
    }
}

fn read_config_file(path: &Path) -> Result<TapConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
