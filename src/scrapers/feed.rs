//! Feed pagination for profile timelines and trending topics.

use std::collections::HashSet;

use rand::Rng;
use tracing::{debug, info, warn};

use crate::browser::{DriverError, DriverResult, PageDriver};
use crate::config::TimingConfig;
use crate::models::PostRecord;
use crate::storage::RecordStore;

use super::extract::RecordExtractor;
use super::humanize::Pacer;
use super::site::SiteConfig;

/// Which kind of feed a collection runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedContext {
    /// Infinite-scroll profile timeline.
    Profile,
    /// A trending topic's result page, bounded to `cap` posts.
    Topic { cap: usize },
}

/// Why a collection stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The record limit was reached.
    Quota,
    /// The feed stopped growing (or showed no posts).
    Exhausted,
}

/// Result of one [`FeedCollector::collect`] call.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedPass {
    pub records: Vec<PostRecord>,
    /// Scroll rounds performed.
    pub rounds: u32,
    pub stop: StopReason,
}

/// Position in the trending list.
///
/// Only an index is kept: element handles go stale whenever the page
/// navigates, so the slot is resolved against a fresh query every time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrendCursor(usize);

impl TrendCursor {
    pub fn index(&self) -> usize {
        self.0
    }

    pub fn advance(&mut self) {
        self.0 += 1;
    }

    /// Pick this slot out of a freshly queried list. `None` if the list shrank.
    pub fn resolve<T>(&self, slots: Vec<T>) -> Option<T> {
        slots.into_iter().nth(self.0)
    }
}

/// Outcome of visiting one trending slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TopicVisit {
    Harvested,
    Skipped,
    ListShrank,
}

/// Totals for one walk over the trending list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrendingPass {
    pub topics: usize,
    pub visited: usize,
    pub skipped: usize,
    /// Records written to the store, including those from topics that later failed.
    pub records: usize,
}

/// Scrolls feeds and extracts their posts.
#[derive(Debug, Clone)]
pub struct FeedCollector {
    extractor: RecordExtractor,
    site: SiteConfig,
    timing: TimingConfig,
}

impl FeedCollector {
    pub fn new(site: SiteConfig, timing: TimingConfig) -> Self {
        Self {
            extractor: RecordExtractor::new(site.selectors.clone()),
            site,
            timing,
        }
    }

    /// Collect up to `max_records` posts from the page currently loaded in `driver`.
    pub async fn collect<D, P>(
        &self,
        driver: &D,
        pacer: &P,
        max_records: usize,
        context: FeedContext,
    ) -> DriverResult<FeedPass>
    where
        D: PageDriver,
        P: Pacer + ?Sized,
    {
        self.collect_with(driver, pacer, max_records, context, &mut |_: &PostRecord| {})
            .await
    }

    async fn collect_with<D, P>(
        &self,
        driver: &D,
        pacer: &P,
        max_records: usize,
        context: FeedContext,
        on_record: &mut (dyn FnMut(&PostRecord) + Send),
    ) -> DriverResult<FeedPass>
    where
        D: PageDriver,
        P: Pacer + ?Sized,
    {
        match context {
            FeedContext::Profile => self.collect_profile(driver, pacer, max_records).await,
            FeedContext::Topic { cap } => {
                self.collect_topic(driver, pacer, cap.min(max_records), on_record)
                    .await
            }
        }
    }

    /// Scroll until `max_records` unique posts are held or the height has not
    /// grown for `stall_ceiling` consecutive rounds.
    async fn collect_profile<D, P>(
        &self,
        driver: &D,
        pacer: &P,
        max_records: usize,
    ) -> DriverResult<FeedPass>
    where
        D: PageDriver,
        P: Pacer + ?Sized,
    {
        let post_selector = &self.extractor.selectors().post;
        let mut records: Vec<PostRecord> = Vec::new();
        let mut seen: HashSet<(Option<String>, String)> = HashSet::new();
        let mut stalls = 0u32;
        let mut rounds = 0u32;

        let stop = loop {
            if records.len() >= max_records {
                break StopReason::Quota;
            }
            if stalls >= self.timing.stall_ceiling {
                break StopReason::Exhausted;
            }
            rounds += 1;

            let before = driver.scroll_height().await?;

            match driver
                .wait_for(post_selector, self.timing.wait_timeout())
                .await
            {
                Ok(_) => {
                    for post in driver.find_all(post_selector).await? {
                        if records.len() >= max_records {
                            break;
                        }
                        if let Some(record) = self.extractor.extract(driver, &post).await {
                            if seen.insert((record.author.clone(), record.content.clone())) {
                                records.push(record);
                            }
                        }
                    }
                }
                Err(e) if e.is_timeout() => {
                    debug!("No posts rendered this round: {}", e);
                }
                Err(e) => return Err(e),
            }

            if records.len() >= max_records {
                break StopReason::Quota;
            }

            driver.scroll_to_bottom().await?;
            pacer.pause(self.timing.scroll_pause).await;

            let after = driver.scroll_height().await?;
            if after == before {
                stalls += 1;
                debug!("Feed height unchanged ({}/{})", stalls, self.timing.stall_ceiling);
            } else {
                stalls = 0;
            }

            self.timing.humanizer.simulate(driver, pacer).await;
        };

        debug!(
            "Profile feed finished after {} rounds with {} posts ({:?})",
            rounds,
            records.len(),
            stop
        );
        Ok(FeedPass {
            records,
            rounds,
            stop,
        })
    }

    /// Scroll a topic page a few times, then extract the first `cap` posts.
    async fn collect_topic<D, P>(
        &self,
        driver: &D,
        pacer: &P,
        cap: usize,
        on_record: &mut (dyn FnMut(&PostRecord) + Send),
    ) -> DriverResult<FeedPass>
    where
        D: PageDriver,
        P: Pacer + ?Sized,
    {
        let (lo, hi) = self.timing.topic_scroll_rounds;
        let rounds = rand::rng().random_range(lo..=hi.max(lo));

        for _ in 0..rounds {
            driver.scroll_to_bottom().await?;
            pacer.pause(self.timing.topic_scroll_pause).await;
            self.timing.humanizer.simulate(driver, pacer).await;
        }

        let post_selector = &self.extractor.selectors().post;
        match driver
            .wait_for(post_selector, self.timing.wait_timeout())
            .await
        {
            Ok(_) => {}
            Err(e) if e.is_timeout() => {
                info!("No posts found for this topic");
                return Ok(FeedPass {
                    records: Vec::new(),
                    rounds,
                    stop: StopReason::Exhausted,
                });
            }
            Err(e) => return Err(e),
        }
        pacer.pause(self.timing.posts_settle).await;

        let posts = driver.find_all(post_selector).await?;
        debug!("Found {} posts, extracting up to {}", posts.len(), cap);

        let mut records = Vec::new();
        for post in posts.iter().take(cap) {
            if let Some(record) = self.extractor.extract(driver, post).await {
                info!("Extracted post: {}", record.preview());
                on_record(&record);
                records.push(record);
            }
        }

        let stop = if records.len() >= cap {
            StopReason::Quota
        } else {
            StopReason::Exhausted
        };
        Ok(FeedPass {
            records,
            rounds,
            stop,
        })
    }

    /// Harvest one profile timeline and persist it as a single batch.
    pub async fn harvest_profile<D, P>(
        &self,
        driver: &D,
        pacer: &P,
        store: &RecordStore,
        username: &str,
        max_records: usize,
    ) -> DriverResult<Vec<PostRecord>>
    where
        D: PageDriver,
        P: Pacer + ?Sized,
    {
        let url = self
            .site
            .profile_url(username)
            .map_err(|e| DriverError::Navigation(format!("{username}: {e}")))?;

        info!("Harvesting profile {}", username);
        driver.goto(&url).await?;
        pacer.pause(self.timing.profile_load).await;

        let pass = self
            .collect(driver, pacer, max_records, FeedContext::Profile)
            .await?;
        info!(
            "Collected {} posts from {} in {} rounds",
            pass.records.len(),
            username,
            pass.rounds
        );

        store.append(&pass.records);
        Ok(pass.records)
    }

    /// Visit every trending topic, persisting each post as soon as it is extracted.
    ///
    /// A failing topic is logged and skipped; only a lost session ends the walk early.
    pub async fn harvest_trending<D, P>(
        &self,
        driver: &D,
        pacer: &P,
        store: &RecordStore,
        per_topic_cap: usize,
    ) -> DriverResult<TrendingPass>
    where
        D: PageDriver,
        P: Pacer + ?Sized,
    {
        info!("Navigating to trending page");
        driver.goto(&self.site.trending_url).await?;
        pacer.pause(self.timing.trending_load).await;

        let trend_selector = &self.site.selectors.trend;
        match driver
            .wait_for(trend_selector, self.timing.wait_timeout())
            .await
        {
            Ok(_) => {}
            Err(e) if e.is_timeout() => {
                warn!("Trending list did not load: {}", e);
                return Ok(TrendingPass::default());
            }
            Err(e) => return Err(e),
        }

        let mut summary = TrendingPass {
            topics: driver.find_all(trend_selector).await?.len(),
            ..Default::default()
        };
        info!("Found {} trending topics", summary.topics);

        let mut cursor = TrendCursor::default();
        while cursor.index() < summary.topics {
            let visit = self
                .visit_topic(
                    driver,
                    pacer,
                    store,
                    cursor,
                    per_topic_cap,
                    &mut summary.records,
                )
                .await;
            match visit {
                Ok(TopicVisit::Harvested) => summary.visited += 1,
                Ok(TopicVisit::Skipped) => summary.skipped += 1,
                Ok(TopicVisit::ListShrank) => {
                    info!("Trend list shrank below index {}, stopping", cursor.index());
                    break;
                }
                Err(e) if e.is_session_lost() => return Err(e),
                Err(e) => {
                    warn!("Error processing trend {}: {}", cursor.index(), e);
                    summary.skipped += 1;
                    match self.return_to_list(driver, pacer).await {
                        Err(e) if e.is_session_lost() => return Err(e),
                        Err(e) => warn!("Could not return to trending page: {}", e),
                        Ok(()) => {}
                    }
                }
            }
            cursor.advance();
        }

        info!(
            "Trending pass done: {} topics visited, {} skipped, {} posts",
            summary.visited, summary.skipped, summary.records
        );
        Ok(summary)
    }

    async fn visit_topic<D, P>(
        &self,
        driver: &D,
        pacer: &P,
        store: &RecordStore,
        cursor: TrendCursor,
        cap: usize,
        persisted: &mut usize,
    ) -> DriverResult<TopicVisit>
    where
        D: PageDriver,
        P: Pacer + ?Sized,
    {
        let trend_selector = &self.site.selectors.trend;
        driver
            .wait_for(trend_selector, self.timing.wait_timeout())
            .await?;
        pacer.pause(self.timing.list_settle).await;

        let Some(slot) = cursor.resolve(driver.find_all(trend_selector).await?) else {
            return Ok(TopicVisit::ListShrank);
        };
        if let Ok(Some(label)) = driver.text(&slot).await {
            info!("Processing trend {}: {}", cursor.index(), first_line(&label));
        }

        driver.scroll_into_view(&slot).await?;
        pacer.pause(self.timing.click_pause).await;

        if !self.open_topic(driver, pacer, &slot).await? {
            return Ok(TopicVisit::Skipped);
        }
        pacer.pause(self.timing.topic_settle).await;

        let mut persist = |record: &PostRecord| {
            if store.append(std::slice::from_ref(record)).is_some() {
                *persisted += 1;
            }
        };
        self.collect_with(driver, pacer, cap, FeedContext::Topic { cap }, &mut persist)
            .await?;

        pacer.pause(self.timing.topic_linger).await;
        self.return_to_list(driver, pacer).await?;
        Ok(TopicVisit::Harvested)
    }

    /// Hover then script-click the slot, falling back to a native click.
    async fn open_topic<D, P>(
        &self,
        driver: &D,
        pacer: &P,
        slot: &D::Element,
    ) -> DriverResult<bool>
    where
        D: PageDriver,
        P: Pacer + ?Sized,
    {
        let primary = async {
            driver.hover(slot).await?;
            pacer.pause(self.timing.hover_pause).await;
            driver.script_click(slot).await
        };
        let primary_error = match primary.await {
            Ok(()) => return Ok(true),
            Err(e) if e.is_session_lost() => return Err(e),
            Err(e) => e,
        };

        debug!("Scripted click failed ({}), trying a native click", primary_error);
        match driver.click(slot).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_session_lost() => Err(e),
            Err(e) => {
                warn!("Could not open trend: {}", e);
                Ok(false)
            }
        }
    }

    async fn return_to_list<D, P>(&self, driver: &D, pacer: &P) -> DriverResult<()>
    where
        D: PageDriver,
        P: Pacer + ?Sized,
    {
        driver.goto(&self.site.trending_url).await?;
        pacer.pause(self.timing.return_settle).await;
        Ok(())
    }
}

fn first_line(text: &str) -> &str {
    text.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or_default()
}
