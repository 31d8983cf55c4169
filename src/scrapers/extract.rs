//! Per-post record extraction.
//!
//! Every field is read independently. A field that cannot be located or read
//! is left empty; only a missing body discards the post.

use chrono::{DateTime, Utc};
use tracing::{debug, trace};

use crate::browser::{DriverError, PageDriver};
use crate::models::{author_label, format_timestamp, FieldOutcome, MetricKind, PostRecord};

use super::site::SiteSelectors;

/// Turns post elements into [`PostRecord`]s.
#[derive(Debug, Clone)]
pub struct RecordExtractor {
    selectors: SiteSelectors,
}

impl RecordExtractor {
    pub fn new(selectors: SiteSelectors) -> Self {
        Self { selectors }
    }

    pub fn selectors(&self) -> &SiteSelectors {
        &self.selectors
    }

    /// Extract one post, stamped with the current time. `None` means the post had no body.
    pub async fn extract<D: PageDriver>(
        &self,
        driver: &D,
        post: &D::Element,
    ) -> Option<PostRecord> {
        self.extract_at(driver, post, Utc::now()).await
    }

    pub async fn extract_at<D: PageDriver>(
        &self,
        driver: &D,
        post: &D::Element,
        collected_at: DateTime<Utc>,
    ) -> Option<PostRecord> {
        let content = match self.read_content(driver, post).await {
            FieldOutcome::Found(content) => content,
            FieldOutcome::NotFound => {
                trace!("Post without body skipped");
                return None;
            }
            FieldOutcome::Malformed(reason) => {
                debug!("Unreadable post body skipped: {}", reason);
                return None;
            }
        };

        let mut record = PostRecord {
            author: None,
            content,
            published_at: None,
            like_count: None,
            repost_count: None,
            reply_count: None,
            collected_at: format_timestamp(collected_at),
        };

        record.author = log_outcome("author", self.read_author(driver, post).await);
        record.published_at = log_outcome("date", self.read_published_at(driver, post).await);
        self.read_metrics(driver, post, &mut record).await;

        Some(record)
    }

    async fn read_content<D: PageDriver>(
        &self,
        driver: &D,
        post: &D::Element,
    ) -> FieldOutcome<String> {
        text_of(driver, post, &self.selectors.content).await.non_blank()
    }

    async fn read_author<D: PageDriver>(
        &self,
        driver: &D,
        post: &D::Element,
    ) -> FieldOutcome<String> {
        match text_of(driver, post, &self.selectors.author).await {
            FieldOutcome::Found(block) => match author_label(&block) {
                Some(label) => FieldOutcome::Found(label),
                None => FieldOutcome::NotFound,
            },
            other => other,
        }
    }

    async fn read_published_at<D: PageDriver>(
        &self,
        driver: &D,
        post: &D::Element,
    ) -> FieldOutcome<String> {
        let element = match lookup(driver, post, &self.selectors.timestamp).await {
            FieldOutcome::Found(element) => element,
            FieldOutcome::NotFound => return FieldOutcome::NotFound,
            FieldOutcome::Malformed(reason) => return FieldOutcome::Malformed(reason),
        };
        match driver
            .attribute(&element, &self.selectors.timestamp_attribute)
            .await
        {
            Ok(Some(value)) => FieldOutcome::Found(value).non_blank(),
            Ok(None) => FieldOutcome::NotFound,
            Err(e) => FieldOutcome::Malformed(e.to_string()),
        }
    }

    /// Classify every counter element; later counters of a kind overwrite earlier ones.
    async fn read_metrics<D: PageDriver>(
        &self,
        driver: &D,
        post: &D::Element,
        record: &mut PostRecord,
    ) {
        let counters = match driver.find_all_within(post, &self.selectors.metric).await {
            Ok(counters) => counters,
            Err(e) => {
                debug!("Could not list engagement counters: {}", e);
                return;
            }
        };

        for counter in &counters {
            let marker = match driver
                .attribute(counter, &self.selectors.metric_marker_attribute)
                .await
            {
                Ok(Some(marker)) => marker,
                Ok(None) => continue,
                Err(e) => {
                    debug!("Unreadable counter marker: {}", e);
                    continue;
                }
            };
            let Some(kind) = MetricKind::classify(&marker) else {
                continue;
            };
            let value = match driver.text(counter).await {
                Ok(text) => text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()),
                Err(e) => {
                    debug!("Unreadable {:?} counter: {}", kind, e);
                    continue;
                }
            };
            record.set_metric(kind, value);
        }
    }
}

fn log_outcome(field: &str, outcome: FieldOutcome<String>) -> Option<String> {
    if let FieldOutcome::Malformed(ref reason) = outcome {
        debug!("Could not read {}: {}", field, reason);
    }
    outcome.found()
}

async fn lookup<D: PageDriver>(
    driver: &D,
    post: &D::Element,
    selector: &str,
) -> FieldOutcome<D::Element> {
    match driver.find_within(post, selector).await {
        Ok(Some(element)) => FieldOutcome::Found(element),
        Ok(None) | Err(DriverError::NotFound(_)) => FieldOutcome::NotFound,
        Err(e) => FieldOutcome::Malformed(e.to_string()),
    }
}

async fn text_of<D: PageDriver>(
    driver: &D,
    post: &D::Element,
    selector: &str,
) -> FieldOutcome<String> {
    let element = match lookup(driver, post, selector).await {
        FieldOutcome::Found(element) => element,
        FieldOutcome::NotFound => return FieldOutcome::NotFound,
        FieldOutcome::Malformed(reason) => return FieldOutcome::Malformed(reason),
    };
    match driver.text(&element).await {
        Ok(Some(text)) => FieldOutcome::Found(text),
        Ok(None) => FieldOutcome::NotFound,
        Err(e) => FieldOutcome::Malformed(e.to_string()),
    }
}
