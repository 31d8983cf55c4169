//! Browser session handle.
//!
//! The harvester only ever talks to a page through [`PageDriver`], so the
//! extraction and resilience logic can run against chromiumoxide in
//! production and against a scripted page in tests.

mod chromium;
mod config;

pub use chromium::{ChromiumFactory, ChromiumSession};
pub use config::BrowserEngineConfig;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

/// Interval between polls while waiting for a selector or text.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Result type for driver operations.
pub type DriverResult<T> = Result<T, DriverError>;

/// Errors surfaced by a browser session.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("Timed out after {timeout:?} waiting for {target}")]
    Timeout { target: String, timeout: Duration },

    #[error("Element not found: {0}")]
    NotFound(String),

    #[error("Interaction failed: {0}")]
    Interaction(String),

    #[error("Script execution failed: {0}")]
    Script(String),

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Browser session is gone")]
    SessionLost,

    #[error("Failed to launch browser: {0}")]
    Launch(String),
}

impl DriverError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, DriverError::Timeout { .. })
    }

    /// The session cannot be used again and must be replaced.
    pub fn is_session_lost(&self) -> bool {
        matches!(self, DriverError::SessionLost)
    }
}

/// Capability surface of one browser page.
///
/// Element handles are opaque and only valid until the next navigation.
#[async_trait]
pub trait PageDriver: Send + Sync {
    type Element: Send + Sync;

    async fn goto(&self, url: &str) -> DriverResult<()>;

    async fn find_all(&self, selector: &str) -> DriverResult<Vec<Self::Element>>;

    async fn find_within(
        &self,
        element: &Self::Element,
        selector: &str,
    ) -> DriverResult<Option<Self::Element>>;

    async fn find_all_within(
        &self,
        element: &Self::Element,
        selector: &str,
    ) -> DriverResult<Vec<Self::Element>>;

    /// Rendered text of an element (line breaks preserved).
    async fn text(&self, element: &Self::Element) -> DriverResult<Option<String>>;

    async fn attribute(&self, element: &Self::Element, name: &str)
        -> DriverResult<Option<String>>;

    async fn type_text(&self, element: &Self::Element, text: &str) -> DriverResult<()>;

    /// Native (input-event) click.
    async fn click(&self, element: &Self::Element) -> DriverResult<()>;

    /// Programmatic `element.click()` from page script.
    async fn script_click(&self, element: &Self::Element) -> DriverResult<()>;

    async fn hover(&self, element: &Self::Element) -> DriverResult<()>;

    async fn scroll_into_view(&self, element: &Self::Element) -> DriverResult<()>;

    /// Evaluate a script expression and return its JSON value (`Null` for undefined).
    async fn evaluate(&self, expression: &str) -> DriverResult<Value>;

    async fn current_url(&self) -> DriverResult<String>;

    async fn close(&mut self) -> DriverResult<()>;

    /// Poll until at least one element matches `selector`.
    async fn wait_for(&self, selector: &str, timeout: Duration) -> DriverResult<Self::Element> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(found) = self.find_all(selector).await?.into_iter().next() {
                return Ok(found);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(DriverError::Timeout {
                    target: selector.to_string(),
                    timeout,
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Poll until the page's visible text contains `needle`.
    async fn wait_for_text(&self, needle: &str, timeout: Duration) -> DriverResult<()> {
        let quoted =
            serde_json::to_string(needle).map_err(|e| DriverError::Script(e.to_string()))?;
        let probe = format!("!!document.body && document.body.innerText.includes({quoted})");
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.evaluate(&probe).await?.as_bool().unwrap_or(false) {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(DriverError::Timeout {
                    target: format!("text {quoted}"),
                    timeout,
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// First element matching `selector` whose trimmed text equals `label`.
    async fn find_by_text(&self, selector: &str, label: &str) -> DriverResult<Self::Element> {
        for element in self.find_all(selector).await? {
            if let Some(text) = self.text(&element).await? {
                if text.trim() == label {
                    return Ok(element);
                }
            }
        }
        Err(DriverError::NotFound(format!("{selector} with text {label:?}")))
    }

    /// Poll for a labelled control, as with [`PageDriver::wait_for`].
    async fn wait_for_label(
        &self,
        selector: &str,
        label: &str,
        timeout: Duration,
    ) -> DriverResult<Self::Element> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match self.find_by_text(selector, label).await {
                Ok(found) => return Ok(found),
                Err(DriverError::NotFound(target)) => {
                    if tokio::time::Instant::now() >= deadline {
                        return Err(DriverError::Timeout { target, timeout });
                    }
                }
                Err(e) => return Err(e),
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn scroll_height(&self) -> DriverResult<u64> {
        let value = self.evaluate("document.body.scrollHeight").await?;
        value
            .as_u64()
            .or_else(|| value.as_f64().map(|h| h as u64))
            .ok_or_else(|| DriverError::Script(format!("unexpected scroll height {value}")))
    }

    async fn scroll_to_bottom(&self) -> DriverResult<()> {
        self.evaluate("window.scrollTo(0, document.body.scrollHeight)")
            .await
            .map(|_| ())
    }

    async fn scroll_by(&self, dy: i64) -> DriverResult<()> {
        self.evaluate(&format!("window.scrollBy(0, {dy})"))
            .await
            .map(|_| ())
    }

    async fn dispatch_pointer_move(&self, x: i64, y: i64) -> DriverResult<()> {
        let script = format!(
            "document.dispatchEvent(new MouseEvent('mousemove', {{ view: window, bubbles: true, cancelable: true, clientX: {x}, clientY: {y} }}))"
        );
        self.evaluate(&script).await.map(|_| ())
    }
}

/// Creates a fresh browser session for each run attempt.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    type Session: PageDriver;

    async fn open(&self) -> DriverResult<Self::Session>;
}
