//! chromiumoxide-backed page driver.

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use super::{BrowserEngineConfig, DriverError, DriverResult, PageDriver, SessionFactory};

#[cfg(feature = "browser")]
use std::path::PathBuf;
#[cfg(feature = "browser")]
use std::time::Duration;
#[cfg(feature = "browser")]
use tracing::{debug, info};

#[cfg(feature = "browser")]
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
#[cfg(feature = "browser")]
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
#[cfg(feature = "browser")]
use chromiumoxide::element::Element;
#[cfg(feature = "browser")]
use chromiumoxide::error::CdpError;
#[cfg(feature = "browser")]
use chromiumoxide::{Browser, BrowserConfig, Page};
#[cfg(feature = "browser")]
use futures::StreamExt;
#[cfg(feature = "browser")]
use tokio::task::JoinHandle;

/// Desktop user agents rotated between sessions.
#[cfg_attr(not(feature = "browser"), allow(dead_code))]
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
];

/// Common Chrome executable paths to check.
#[cfg(feature = "browser")]
const CHROME_PATHS: &[&str] = &[
    // Linux
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/snap/bin/chromium",
    // macOS
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    // Common install locations
    "/opt/google/chrome/google-chrome",
];

#[cfg_attr(not(feature = "browser"), allow(dead_code))]
fn pick_user_agent(config: &BrowserEngineConfig) -> String {
    use rand::seq::IndexedRandom;

    config.user_agent.clone().unwrap_or_else(|| {
        USER_AGENTS
            .choose(&mut rand::rng())
            .copied()
            .unwrap_or(USER_AGENTS[0])
            .to_string()
    })
}

/// Find Chrome executable.
#[cfg(feature = "browser")]
fn find_chrome() -> DriverResult<PathBuf> {
    for path in CHROME_PATHS {
        let p = std::path::Path::new(path);
        if p.exists() {
            info!("Found Chrome at: {}", path);
            return Ok(p.to_path_buf());
        }
    }

    for cmd in [
        "google-chrome",
        "google-chrome-stable",
        "chromium",
        "chromium-browser",
    ] {
        if let Ok(path) = which::which(cmd) {
            info!("Found Chrome in PATH: {}", path.display());
            return Ok(path);
        }
    }

    Err(DriverError::Launch(
        "Chrome/Chromium not found. Install chromium or set BROWSER_URL to a remote DevTools endpoint"
            .to_string(),
    ))
}

/// Opens a new [`ChromiumSession`] per run attempt.
#[derive(Debug, Clone)]
pub struct ChromiumFactory {
    config: BrowserEngineConfig,
}

impl ChromiumFactory {
    pub fn new(config: BrowserEngineConfig) -> Self {
        Self { config }
    }
}

#[cfg(feature = "browser")]
fn protocol(err: CdpError) -> DriverError {
    DriverError::Protocol(err.to_string())
}

/// One browser process (or remote connection) with a single working page.
#[cfg(feature = "browser")]
pub struct ChromiumSession {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
}

#[cfg(feature = "browser")]
impl ChromiumSession {
    /// Launch or connect to a browser and open a blank page.
    pub async fn open(config: &BrowserEngineConfig) -> DriverResult<Self> {
        let (browser, handler) = match config.remote_url.as_deref() {
            Some(url) => Self::connect_remote(url).await?,
            None => Self::launch(config).await?,
        };

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| DriverError::Launch(format!("Failed to open page: {}", e)))?;

        let user_agent = pick_user_agent(config);
        debug!("Using user agent: {}", user_agent);
        page.execute(SetUserAgentOverrideParams::new(user_agent))
            .await
            .map_err(protocol)?;

        Ok(Self {
            browser,
            page,
            handler,
        })
    }

    async fn launch(config: &BrowserEngineConfig) -> DriverResult<(Browser, JoinHandle<()>)> {
        info!("Launching browser (headless={})", config.headless);

        let chrome_path = find_chrome()?;

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .window_size(1920, 1080)
            .request_timeout(Duration::from_secs(config.timeout));

        // with_head means NOT headless
        if !config.headless {
            builder = builder.with_head();
        }

        if let Some(ref proxy) = config.proxy {
            builder = builder.arg(format!("--proxy-server={}", proxy));
        }

        builder = builder
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--no-sandbox")
            .arg("--disable-gpu");

        for arg in &config.chrome_args {
            builder = builder.arg(arg);
        }

        let browser_config = builder
            .build()
            .map_err(|e| DriverError::Launch(format!("Failed to build browser config: {}", e)))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| DriverError::Launch(e.to_string()))?;

        let handle = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        Ok((browser, handle))
    }

    /// Connect to a remote Chrome instance.
    async fn connect_remote(url: &str) -> DriverResult<(Browser, JoinHandle<()>)> {
        info!("Connecting to remote browser at {}", url);

        // Get WebSocket URL from the /json/version endpoint
        let http_url = url
            .replace("ws://", "http://")
            .replace("wss://", "https://");
        let version_url = format!("{}/json/version", http_url.trim_end_matches('/'));

        let resp: Value = reqwest::Client::new()
            .get(&version_url)
            .send()
            .await
            .map_err(|e| DriverError::Launch(format!("Failed to reach remote browser: {}", e)))?
            .json()
            .await
            .map_err(|e| DriverError::Launch(format!("Failed to parse version info: {}", e)))?;

        let ws_url = resp
            .get("webSocketDebuggerUrl")
            .and_then(|v| v.as_str())
            .ok_or_else(|| DriverError::Launch("No webSocketDebuggerUrl in response".into()))?;

        info!("Connecting to WebSocket: {}", ws_url);

        let (browser, mut handler) = Browser::connect(ws_url)
            .await
            .map_err(|e| DriverError::Launch(e.to_string()))?;

        let handle = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        Ok((browser, handle))
    }

    fn ensure_alive(&self) -> DriverResult<()> {
        if self.handler.is_finished() {
            Err(DriverError::SessionLost)
        } else {
            Ok(())
        }
    }
}

#[cfg(feature = "browser")]
#[async_trait]
impl PageDriver for ChromiumSession {
    type Element = Element;

    async fn goto(&self, url: &str) -> DriverResult<()> {
        self.ensure_alive()?;
        info!("Navigating to {}", url);
        let params = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(|e| DriverError::Navigation(format!("Invalid URL {}: {}", url, e)))?;
        self.page
            .execute(params)
            .await
            .map_err(|e| DriverError::Navigation(e.to_string()))?;
        if let Err(e) = self.page.wait_for_navigation().await {
            debug!("Navigation wait for {} ended early: {}", url, e);
        }
        Ok(())
    }

    async fn find_all(&self, selector: &str) -> DriverResult<Vec<Element>> {
        self.ensure_alive()?;
        self.page.find_elements(selector).await.map_err(protocol)
    }

    async fn find_within(
        &self,
        element: &Element,
        selector: &str,
    ) -> DriverResult<Option<Element>> {
        Ok(self.find_all_within(element, selector).await?.into_iter().next())
    }

    async fn find_all_within(
        &self,
        element: &Element,
        selector: &str,
    ) -> DriverResult<Vec<Element>> {
        self.ensure_alive()?;
        element.find_elements(selector).await.map_err(protocol)
    }

    async fn text(&self, element: &Element) -> DriverResult<Option<String>> {
        self.ensure_alive()?;
        element.inner_text().await.map_err(protocol)
    }

    async fn attribute(&self, element: &Element, name: &str) -> DriverResult<Option<String>> {
        self.ensure_alive()?;
        element.attribute(name).await.map_err(protocol)
    }

    async fn type_text(&self, element: &Element, text: &str) -> DriverResult<()> {
        self.ensure_alive()?;
        element
            .focus()
            .await
            .map_err(|e| DriverError::Interaction(e.to_string()))?;
        element
            .type_str(text)
            .await
            .map_err(|e| DriverError::Interaction(e.to_string()))?;
        Ok(())
    }

    async fn click(&self, element: &Element) -> DriverResult<()> {
        self.ensure_alive()?;
        element
            .click()
            .await
            .map_err(|e| DriverError::Interaction(e.to_string()))?;
        Ok(())
    }

    async fn script_click(&self, element: &Element) -> DriverResult<()> {
        self.ensure_alive()?;
        element
            .call_js_fn("function() { this.click(); }", false)
            .await
            .map_err(|e| DriverError::Interaction(e.to_string()))?;
        Ok(())
    }

    async fn hover(&self, element: &Element) -> DriverResult<()> {
        self.ensure_alive()?;
        element
            .hover()
            .await
            .map_err(|e| DriverError::Interaction(e.to_string()))?;
        Ok(())
    }

    async fn scroll_into_view(&self, element: &Element) -> DriverResult<()> {
        self.ensure_alive()?;
        element
            .scroll_into_view()
            .await
            .map_err(|e| DriverError::Interaction(e.to_string()))?;
        Ok(())
    }

    async fn evaluate(&self, expression: &str) -> DriverResult<Value> {
        self.ensure_alive()?;
        let result = self
            .page
            .evaluate(expression)
            .await
            .map_err(|e| DriverError::Script(e.to_string()))?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    async fn current_url(&self) -> DriverResult<String> {
        self.ensure_alive()?;
        Ok(self.page.url().await.map_err(protocol)?.unwrap_or_default())
    }

    async fn close(&mut self) -> DriverResult<()> {
        if !self.handler.is_finished() {
            if let Err(e) = self.browser.close().await {
                warn!("Error closing browser: {}", e);
            }
            if let Err(e) = self.browser.wait().await {
                debug!("Error waiting for browser exit: {}", e);
            }
        }
        self.handler.abort();
        info!("Browser closed");
        Ok(())
    }
}

#[cfg(feature = "browser")]
#[async_trait]
impl SessionFactory for ChromiumFactory {
    type Session = ChromiumSession;

    async fn open(&self) -> DriverResult<ChromiumSession> {
        ChromiumSession::open(&self.config).await
    }
}

// Stub for when browser feature is disabled
#[cfg(not(feature = "browser"))]
pub struct ChromiumSession {
    _private: (),
}

#[cfg(not(feature = "browser"))]
fn not_compiled<T>() -> DriverResult<T> {
    Err(DriverError::Launch(
        "Browser support not compiled. Rebuild with: cargo build --features browser".to_string(),
    ))
}

#[cfg(not(feature = "browser"))]
#[async_trait]
impl PageDriver for ChromiumSession {
    type Element = ();

    async fn goto(&self, _url: &str) -> DriverResult<()> {
        not_compiled()
    }
    async fn find_all(&self, _selector: &str) -> DriverResult<Vec<()>> {
        not_compiled()
    }
    async fn find_within(&self, _element: &(), _selector: &str) -> DriverResult<Option<()>> {
        not_compiled()
    }
    async fn find_all_within(&self, _element: &(), _selector: &str) -> DriverResult<Vec<()>> {
        not_compiled()
    }
    async fn text(&self, _element: &()) -> DriverResult<Option<String>> {
        not_compiled()
    }
    async fn attribute(&self, _element: &(), _name: &str) -> DriverResult<Option<String>> {
        not_compiled()
    }
    async fn type_text(&self, _element: &(), _text: &str) -> DriverResult<()> {
        not_compiled()
    }
    async fn click(&self, _element: &()) -> DriverResult<()> {
        not_compiled()
    }
    async fn script_click(&self, _element: &()) -> DriverResult<()> {
        not_compiled()
    }
    async fn hover(&self, _element: &()) -> DriverResult<()> {
        not_compiled()
    }
    async fn scroll_into_view(&self, _element: &()) -> DriverResult<()> {
        not_compiled()
    }
    async fn evaluate(&self, _expression: &str) -> DriverResult<Value> {
        not_compiled()
    }
    async fn current_url(&self) -> DriverResult<String> {
        not_compiled()
    }
    async fn close(&mut self) -> DriverResult<()> {
        Ok(())
    }
}

#[cfg(not(feature = "browser"))]
#[async_trait]
impl SessionFactory for ChromiumFactory {
    type Session = ChromiumSession;

    async fn open(&self) -> DriverResult<ChromiumSession> {
        warn!("Cannot open browser for {:?}", self.config.remote_url);
        not_compiled()
    }
}
