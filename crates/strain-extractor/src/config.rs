//! Configuration loading and resolution.
//!
//! Every setting resolves explicit value > environment variable > default.

use crate::renderer::WaitUntil;
use crate::types::{ExtractError, ExtractResult};
use std::path::PathBuf;
use std::time::Duration;

/// Site root the product pages live under.
pub const DEFAULT_BASE_URL: &str = "https://www.leafly.com";

/// URL substring identifying the internal strain-data API.
pub const DEFAULT_API_PATTERN: &str = "/api/strain/v2/public/";

/// Wait applied after navigation settles, before the payload is read.
pub const DEFAULT_SETTLE_WINDOW: Duration = Duration::from_millis(3000);

/// How the session waits for the payload once navigation has settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleStrategy {
    /// Sleep for a constant window, then read whatever was captured.
    FixedDelay(Duration),
    /// Return as soon as a payload is captured, or after `timeout`.
    UntilCaptured { timeout: Duration },
}

impl Default for SettleStrategy {
    fn default() -> Self {
        SettleStrategy::FixedDelay(DEFAULT_SETTLE_WINDOW)
    }
}

/// Options for launching the browser.
#[derive(Debug, Clone, Default)]
pub struct BrowserOptions {
    /// Explicit Chromium binary. Discovered when `None`.
    pub chromium_path: Option<PathBuf>,
    /// Show the browser window instead of running headless.
    pub headful: bool,
}

/// Full extractor configuration.
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    pub base_url: String,
    pub api_pattern: String,
    pub wait_until: WaitUntil,
    pub settle: SettleStrategy,
    /// Upper bound on navigation. `None` lets navigation run indefinitely.
    pub navigation_timeout: Option<Duration>,
    pub browser: BrowserOptions,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_pattern: DEFAULT_API_PATTERN.to_string(),
            wait_until: WaitUntil::default(),
            settle: SettleStrategy::default(),
            navigation_timeout: None,
            browser: BrowserOptions::default(),
        }
    }
}

impl ExtractorConfig {
    /// Resolve configuration from the process environment.
    pub fn from_env() -> ExtractResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ExtractResult<Self> {
        let mut config = Self::default();

        if let Some(base) = lookup("STRAIN_BASE_URL") {
            config = config.with_base_url(&base)?;
        }
        if let Some(pattern) = lookup("STRAIN_API_PATTERN").filter(|p| !p.is_empty()) {
            config.api_pattern = pattern;
        }
        if let Some(wait) = lookup("STRAIN_WAIT_UNTIL") {
            config.wait_until = parse_wait_until(&wait)?;
        }

        let window = match lookup("STRAIN_SETTLE_MS") {
            Some(ms) => parse_millis("STRAIN_SETTLE_MS", &ms)?,
            None => DEFAULT_SETTLE_WINDOW,
        };
        config.settle = match lookup("STRAIN_SETTLE_MODE").as_deref() {
            None | Some("delay") => SettleStrategy::FixedDelay(window),
            Some("signal") => SettleStrategy::UntilCaptured { timeout: window },
            Some(other) => {
                return Err(ExtractError::Config(format!(
                    "STRAIN_SETTLE_MODE must be 'delay' or 'signal', got '{other}'"
                )))
            }
        };

        if let Some(ms) = lookup("STRAIN_NAV_TIMEOUT_MS") {
            let timeout = parse_millis("STRAIN_NAV_TIMEOUT_MS", &ms)?;
            config.navigation_timeout = (!timeout.is_zero()).then_some(timeout);
        }

        config.browser.chromium_path = lookup("STRAIN_CHROMIUM_PATH")
            .filter(|p| !p.is_empty())
            .map(PathBuf::from);
        config.browser.headful = lookup("STRAIN_HEADFUL").is_some_and(|v| is_truthy(&v));

        Ok(config)
    }

    /// Set the site root. Must be an absolute http(s) URL.
    pub fn with_base_url(mut self, base_url: &str) -> ExtractResult<Self> {
        let parsed = url::Url::parse(base_url)
            .map_err(|e| ExtractError::Config(format!("invalid base URL '{base_url}': {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ExtractError::Config(format!(
                "base URL must be http or https, got '{base_url}'"
            )));
        }
        self.base_url = base_url.trim_end_matches('/').to_string();
        Ok(self)
    }

    pub fn with_api_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.api_pattern = pattern.into();
        self
    }

    pub fn with_wait_until(mut self, wait_until: WaitUntil) -> Self {
        self.wait_until = wait_until;
        self
    }

    pub fn with_settle(mut self, settle: SettleStrategy) -> Self {
        self.settle = settle;
        self
    }

    pub fn with_navigation_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.navigation_timeout = timeout;
        self
    }
}

fn parse_wait_until(value: &str) -> ExtractResult<WaitUntil> {
    match value.to_ascii_lowercase().as_str() {
        "load" => Ok(WaitUntil::Load),
        "networkidle0" => Ok(WaitUntil::NETWORK_IDLE_0),
        "networkidle2" => Ok(WaitUntil::NETWORK_IDLE_2),
        other => Err(ExtractError::Config(format!(
            "STRAIN_WAIT_UNTIL must be load, networkidle0 or networkidle2, got '{other}'"
        ))),
    }
}

fn parse_millis(name: &str, value: &str) -> ExtractResult<Duration> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|e| ExtractError::Config(format!("{name} must be milliseconds: {e}")))
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
