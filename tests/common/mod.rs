//! Scripted in-memory browser used by the integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use trendharvest::browser::{DriverError, DriverResult, PageDriver, SessionFactory};
use trendharvest::config::HarvestConfig;
use trendharvest::scrapers::{Pacer, SiteConfig};

/// One post as rendered by the fake page.
#[derive(Debug, Clone, Default)]
pub struct FakePost {
    /// Raw author block (first line is the display name).
    pub author: Option<String>,
    pub content: Option<String>,
    pub datetime: Option<String>,
    /// `(data-testid marker, text)` per counter, in DOM order.
    pub metrics: Vec<(String, String)>,
}

impl FakePost {
    pub fn new(author: &str, content: &str) -> Self {
        Self {
            author: Some(format!("{author}\n@{}", author.to_lowercase())),
            content: Some(content.to_string()),
            datetime: Some("2024-05-01T10:00:00.000Z".to_string()),
            metrics: Vec::new(),
        }
    }

    pub fn body_only(content: &str) -> Self {
        Self {
            content: Some(content.to_string()),
            ..Default::default()
        }
    }

    pub fn metric(mut self, marker: &str, text: &str) -> Self {
        self.metrics.push((marker.to_string(), text.to_string()));
        self
    }
}

/// What the fake site serves.
#[derive(Debug, Clone, Default)]
pub struct Script {
    /// Profile timeline, in render order.
    pub posts: Vec<FakePost>,
    /// Posts rendered before any scrolling.
    pub initially_rendered: usize,
    /// Number of scroll-to-bottom calls that grow the page.
    pub growth_rounds: usize,
    /// Extra posts rendered by each growing scroll.
    pub render_per_growth: usize,
    /// Trending topic labels.
    pub trends: Vec<String>,
    /// Posts shown on each topic page, by topic index.
    pub topic_posts: Vec<Vec<FakePost>>,
    /// Topics whose post query fails with a protocol error.
    pub failing_topics: HashSet<usize>,
    /// Topics where every click strategy fails.
    pub unclickable_topics: HashSet<usize>,
    /// Topics whose scripted click fails but a native click works.
    pub script_click_broken: HashSet<usize>,
    /// Topic whose post query reports a lost session.
    pub session_lost_on_topic: Option<usize>,
    /// After the first return to the trending page the list has this many entries.
    pub shrink_trends_to: Option<usize>,
    /// Show the unusual-activity prompt during login.
    pub challenge: bool,
    /// Navigation to any URL containing this fails.
    pub fail_navigation_to: Option<String>,
    /// Topics whose page cannot be navigated away from.
    pub stuck_topics: HashSet<usize>,
}

/// Counters and switches shared by every session a factory opens.
#[derive(Debug)]
pub struct Shared {
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub login_ok: AtomicBool,
    pub fail_open: AtomicBool,
}

impl Default for Shared {
    fn default() -> Self {
        Self {
            opened: AtomicUsize::new(0),
            closed: AtomicUsize::new(0),
            login_ok: AtomicBool::new(true),
            fail_open: AtomicBool::new(false),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum El {
    Input(String),
    Button(String),
    Post(usize),
    Author(usize),
    Content(usize),
    Time(usize),
    Metric(usize, usize),
    Trend(usize),
}

#[derive(Debug, Default)]
struct State {
    location: String,
    rendered: usize,
    growth_left: usize,
    height: u64,
    trends_len: usize,
    list_visits: usize,
    topic: Option<usize>,
    typed: Vec<(String, String)>,
    clicked: Vec<String>,
    closed: bool,
}

pub struct FakePage {
    script: Script,
    site: SiteConfig,
    shared: Arc<Shared>,
    state: Mutex<State>,
}

impl FakePage {
    pub fn new(script: Script) -> Self {
        Self::with_shared(script, Arc::new(Shared::default()))
    }

    pub fn with_shared(script: Script, shared: Arc<Shared>) -> Self {
        let state = State {
            location: "about:blank".to_string(),
            rendered: script.initially_rendered.min(script.posts.len()),
            growth_left: script.growth_rounds,
            height: 1000,
            trends_len: script.trends.len(),
            ..Default::default()
        };
        Self {
            script,
            site: SiteConfig::default(),
            shared,
            state: Mutex::new(state),
        }
    }

    /// Everything typed into inputs, as `(selector, text)`.
    pub fn typed(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().typed.clone()
    }

    pub fn clicked(&self) -> Vec<String> {
        self.state.lock().unwrap().clicked.clone()
    }

    pub fn location(&self) -> String {
        self.state.lock().unwrap().location.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    fn on_login_page(state: &State, site: &SiteConfig) -> bool {
        state.location == site.login_url
    }

    fn on_trending_page(state: &State, site: &SiteConfig) -> bool {
        state.location == site.trending_url
    }

    fn current_posts(&self, state: &State) -> Vec<FakePost> {
        match state.topic {
            Some(topic) => self
                .script
                .topic_posts
                .get(topic)
                .cloned()
                .unwrap_or_default(),
            None => self.script.posts[..state.rendered].to_vec(),
        }
    }

    fn post(&self, index: usize) -> DriverResult<FakePost> {
        let state = self.state.lock().unwrap();
        self.current_posts(&state)
            .get(index)
            .cloned()
            .ok_or_else(|| DriverError::Protocol(format!("stale post handle {index}")))
    }

    fn check_open(&self) -> DriverResult<()> {
        if self.state.lock().unwrap().closed {
            Err(DriverError::SessionLost)
        } else {
            Ok(())
        }
    }

    fn open_topic(&self, index: usize) {
        let mut state = self.state.lock().unwrap();
        state.topic = Some(index);
        state.location = format!("https://x.com/search?q=topic{index}");
    }
}

#[async_trait]
impl PageDriver for FakePage {
    type Element = El;

    async fn goto(&self, url: &str) -> DriverResult<()> {
        self.check_open()?;
        if let Some(topic) = self.state.lock().unwrap().topic {
            if self.script.stuck_topics.contains(&topic) {
                return Err(DriverError::Navigation(format!("stuck on topic {topic}")));
            }
        }
        if let Some(fragment) = &self.script.fail_navigation_to {
            if url.contains(fragment.as_str()) {
                return Err(DriverError::Navigation(format!("refused {url}")));
            }
        }
        let mut state = self.state.lock().unwrap();
        state.location = url.to_string();
        state.topic = None;
        if url == self.site.trending_url {
            state.list_visits += 1;
            if state.list_visits > 1 {
                if let Some(len) = self.script.shrink_trends_to {
                    state.trends_len = state.trends_len.min(len);
                }
            }
        }
        Ok(())
    }

    async fn find_all(&self, selector: &str) -> DriverResult<Vec<El>> {
        self.check_open()?;
        let sel = &self.site.selectors;
        let state = self.state.lock().unwrap();

        if selector == sel.post {
            if let Some(topic) = state.topic {
                if self.script.session_lost_on_topic == Some(topic) {
                    return Err(DriverError::SessionLost);
                }
                if self.script.failing_topics.contains(&topic) {
                    return Err(DriverError::Protocol("node detached".to_string()));
                }
            } else if Self::on_login_page(&state, &self.site)
                || Self::on_trending_page(&state, &self.site)
            {
                return Ok(Vec::new());
            }
            return Ok((0..self.current_posts(&state).len()).map(El::Post).collect());
        }
        if selector == sel.trend {
            if Self::on_trending_page(&state, &self.site) {
                return Ok((0..state.trends_len).map(El::Trend).collect());
            }
            return Ok(Vec::new());
        }

        if !Self::on_login_page(&state, &self.site) {
            return Ok(Vec::new());
        }
        if selector == sel.username_input || selector == sel.password_input {
            return Ok(vec![El::Input(selector.to_string())]);
        }
        if selector == sel.challenge_input && self.script.challenge {
            return Ok(vec![El::Input(selector.to_string())]);
        }
        if selector == sel.button_label {
            return Ok(vec![
                El::Button(sel.next_label.clone()),
                El::Button(sel.login_label.clone()),
            ]);
        }
        Ok(Vec::new())
    }

    async fn find_within(&self, element: &El, selector: &str) -> DriverResult<Option<El>> {
        self.check_open()?;
        let El::Post(index) = element else {
            return Ok(None);
        };
        let post = self.post(*index)?;
        let sel = &self.site.selectors;
        let found = if selector == sel.author {
            post.author.map(|_| El::Author(*index))
        } else if selector == sel.content {
            post.content.map(|_| El::Content(*index))
        } else if selector == sel.timestamp {
            post.datetime.map(|_| El::Time(*index))
        } else {
            None
        };
        Ok(found)
    }

    async fn find_all_within(&self, element: &El, selector: &str) -> DriverResult<Vec<El>> {
        self.check_open()?;
        match element {
            El::Post(index) if selector == self.site.selectors.metric => {
                let post = self.post(*index)?;
                Ok((0..post.metrics.len()).map(|m| El::Metric(*index, m)).collect())
            }
            _ => Ok(Vec::new()),
        }
    }

    async fn text(&self, element: &El) -> DriverResult<Option<String>> {
        self.check_open()?;
        Ok(match element {
            El::Author(i) => self.post(*i)?.author,
            El::Content(i) => self.post(*i)?.content,
            El::Metric(i, m) => self.post(*i)?.metrics.get(*m).map(|(_, text)| text.clone()),
            El::Trend(i) => self.script.trends.get(*i).cloned(),
            El::Button(label) => Some(label.clone()),
            _ => None,
        })
    }

    async fn attribute(&self, element: &El, name: &str) -> DriverResult<Option<String>> {
        self.check_open()?;
        let sel = &self.site.selectors;
        Ok(match element {
            El::Time(i) if name == sel.timestamp_attribute => self.post(*i)?.datetime,
            El::Metric(i, m) if name == sel.metric_marker_attribute => self
                .post(*i)?
                .metrics
                .get(*m)
                .map(|(marker, _)| marker.clone()),
            _ => None,
        })
    }

    async fn type_text(&self, element: &El, text: &str) -> DriverResult<()> {
        self.check_open()?;
        let El::Input(selector) = element else {
            return Err(DriverError::Interaction("not an input".to_string()));
        };
        self.state
            .lock()
            .unwrap()
            .typed
            .push((selector.clone(), text.to_string()));
        Ok(())
    }

    async fn click(&self, element: &El) -> DriverResult<()> {
        self.check_open()?;
        match element {
            El::Button(label) => {
                let mut state = self.state.lock().unwrap();
                state.clicked.push(label.clone());
                if *label == self.site.selectors.login_label
                    && self.shared.login_ok.load(Ordering::SeqCst)
                {
                    state.location = "https://twitter.com/home".to_string();
                }
                Ok(())
            }
            El::Trend(i) if self.script.unclickable_topics.contains(i) => {
                Err(DriverError::Interaction("element not clickable".to_string()))
            }
            El::Trend(i) => {
                self.state.lock().unwrap().clicked.push(format!("native:{i}"));
                self.open_topic(*i);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    async fn script_click(&self, element: &El) -> DriverResult<()> {
        self.check_open()?;
        match element {
            El::Trend(i)
                if self.script.unclickable_topics.contains(i)
                    || self.script.script_click_broken.contains(i) =>
            {
                Err(DriverError::Interaction("click() threw".to_string()))
            }
            El::Trend(i) => {
                self.state.lock().unwrap().clicked.push(format!("script:{i}"));
                self.open_topic(*i);
                Ok(())
            }
            other => self.click(other).await,
        }
    }

    async fn hover(&self, _element: &El) -> DriverResult<()> {
        self.check_open()
    }

    async fn scroll_into_view(&self, _element: &El) -> DriverResult<()> {
        self.check_open()
    }

    async fn evaluate(&self, expression: &str) -> DriverResult<Value> {
        self.check_open()?;
        if expression.contains("innerText.includes") {
            let state = self.state.lock().unwrap();
            let shown = self.script.challenge
                && Self::on_login_page(&state, &self.site)
                && state.typed.len() == 1;
            return Ok(Value::Bool(shown));
        }
        Ok(Value::Null)
    }

    async fn current_url(&self) -> DriverResult<String> {
        self.check_open()?;
        Ok(self.location())
    }

    async fn close(&mut self) -> DriverResult<()> {
        let mut state = self.state.lock().unwrap();
        if !state.closed {
            state.closed = true;
            self.shared.closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn scroll_height(&self) -> DriverResult<u64> {
        self.check_open()?;
        Ok(self.state.lock().unwrap().height)
    }

    async fn scroll_to_bottom(&self) -> DriverResult<()> {
        self.check_open()?;
        let mut state = self.state.lock().unwrap();
        if state.growth_left > 0 {
            state.growth_left -= 1;
            state.height += 1000;
            state.rendered =
                (state.rendered + self.script.render_per_growth).min(self.script.posts.len());
        }
        Ok(())
    }

    async fn scroll_by(&self, _dy: i64) -> DriverResult<()> {
        self.check_open()
    }

    async fn dispatch_pointer_move(&self, _x: i64, _y: i64) -> DriverResult<()> {
        self.check_open()
    }
}

/// Opens a fresh [`FakePage`] per session.
pub struct FakeFactory {
    pub script: Script,
    pub shared: Arc<Shared>,
}

impl FakeFactory {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            shared: Arc::new(Shared::default()),
        }
    }
}

#[async_trait]
impl SessionFactory for FakeFactory {
    type Session = FakePage;

    async fn open(&self) -> DriverResult<FakePage> {
        if self.shared.fail_open.load(Ordering::SeqCst) {
            return Err(DriverError::Launch("no browser available".to_string()));
        }
        self.shared.opened.fetch_add(1, Ordering::SeqCst);
        Ok(FakePage::with_shared(self.script.clone(), self.shared.clone()))
    }
}

/// Records every requested delay instead of sleeping.
#[derive(Clone, Default)]
pub struct RecordingPacer {
    sleeps: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingPacer {
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }

    /// Recorded sleeps exactly equal to `duration`.
    pub fn count(&self, duration: Duration) -> usize {
        self.sleeps().iter().filter(|d| **d == duration).count()
    }

    pub fn clear(&self) {
        self.sleeps.lock().unwrap().clear();
    }
}

#[async_trait]
impl Pacer for RecordingPacer {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}

/// Config with instant waits, writing into `data_dir`.
pub fn test_config(data_dir: &std::path::Path) -> HarvestConfig {
    let mut config = HarvestConfig {
        data_dir: data_dir.to_path_buf(),
        ..Default::default()
    };
    config.timing.wait_timeout_secs = 0;
    config.timing.challenge_timeout_secs = 0;
    config
}
