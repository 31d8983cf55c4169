//! Settings for the Chrome session the harvester drives.

use serde::{Deserialize, Serialize};
use std::env;

/// How Chrome is launched or reached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowserEngineConfig {
    /// Launch without a window. Turn off to watch a harvest live.
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Passed to Chrome as `--proxy-server`, e.g. `socks5://127.0.0.1:1080`.
    #[serde(default)]
    pub proxy: Option<String>,

    /// CDP request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Extra command-line switches for a locally launched Chrome.
    #[serde(default)]
    pub chrome_args: Vec<String>,

    /// DevTools endpoint of an already running Chrome (`ws://` or `http://`).
    /// Nothing is launched locally when this is set.
    #[serde(default)]
    pub remote_url: Option<String>,

    /// Fixed user agent. A desktop Chrome agent is picked at random when unset.
    #[serde(default)]
    pub user_agent: Option<String>,
}

fn default_headless() -> bool {
    true
}

fn default_timeout() -> u64 {
    30
}

impl Default for BrowserEngineConfig {
    fn default() -> Self {
        Self {
            headless: default_headless(),
            proxy: None,
            timeout: default_timeout(),
            chrome_args: Vec::new(),
            remote_url: None,
            user_agent: None,
        }
    }
}

impl BrowserEngineConfig {
    /// Apply `BROWSER_URL`, `BROWSER_HEADLESS` and `SOCKS_PROXY` from the environment.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(url) = env::var("BROWSER_URL").ok().filter(|s| !s.is_empty()) {
            self.remote_url = Some(url);
        }
        if let Ok(headless) = env::var("BROWSER_HEADLESS") {
            match headless.to_lowercase().as_str() {
                "0" | "false" | "no" => self.headless = false,
                "1" | "true" | "yes" => self.headless = true,
                _ => {}
            }
        }
        if let Some(proxy) = env::var("SOCKS_PROXY").ok().filter(|s| !s.is_empty()) {
            self.proxy = Some(proxy);
        }
        self
    }
}
