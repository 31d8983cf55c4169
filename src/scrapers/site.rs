//! DOM contract of the target site.
//!
//! Everything the harvester knows about the site's markup lives here so a
//! markup change is a configuration change.

use serde::{Deserialize, Serialize};
use url::Url;

/// Entry points and selectors for the target site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Login flow entry point.
    pub login_url: String,
    /// Base URL that profile handles are appended to.
    pub profile_base_url: String,
    /// Trending topics listing.
    pub trending_url: String,
    /// Substring of the location that signals an authenticated landing page.
    pub home_marker: String,
    /// Text shown only when the site asks for an extra identifier.
    pub challenge_text: String,
    pub selectors: SiteSelectors,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            login_url: "https://twitter.com/i/flow/login".to_string(),
            profile_base_url: "https://twitter.com/".to_string(),
            trending_url: "https://x.com/explore/tabs/trending".to_string(),
            home_marker: "home".to_string(),
            challenge_text: "unusual login activity".to_string(),
            selectors: SiteSelectors::default(),
        }
    }
}

impl SiteConfig {
    /// Profile page for a handle (leading `@` is ignored).
    pub fn profile_url(&self, username: &str) -> Result<String, url::ParseError> {
        let mut base = Url::parse(&self.profile_base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(base.join(username.trim_start_matches('@'))?.to_string())
    }
}

/// CSS selectors (and button labels) the harvester relies on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteSelectors {
    pub post: String,
    pub author: String,
    pub content: String,
    pub timestamp: String,
    /// Attribute on the timestamp element holding the ISO-8601 value.
    pub timestamp_attribute: String,
    /// Generic selector matching every engagement counter.
    pub metric: String,
    /// Attribute on a counter naming its kind.
    pub metric_marker_attribute: String,
    pub trend: String,
    pub username_input: String,
    pub challenge_input: String,
    pub password_input: String,
    /// Elements searched for button labels.
    pub button_label: String,
    pub next_label: String,
    pub login_label: String,
}

impl Default for SiteSelectors {
    fn default() -> Self {
        Self {
            post: r#"article[data-testid="tweet"]"#.to_string(),
            author: r#"div[data-testid="User-Name"]"#.to_string(),
            content: r#"div[data-testid="tweetText"]"#.to_string(),
            timestamp: "time".to_string(),
            timestamp_attribute: "datetime".to_string(),
            metric: r#"div[data-testid$="-count"]"#.to_string(),
            metric_marker_attribute: "data-testid".to_string(),
            trend: r#"div[data-testid="trend"]"#.to_string(),
            username_input: r#"input[autocomplete="username"]"#.to_string(),
            challenge_input: r#"input[type="text"]"#.to_string(),
            password_input: r#"input[type="password"]"#.to_string(),
            button_label: "span".to_string(),
            next_label: "Next".to_string(),
            login_label: "Log in".to_string(),
        }
    }
}
