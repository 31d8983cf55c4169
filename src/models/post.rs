//! Post record model.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// One harvested post.
///
/// Field renames are the column names of the daily store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRecord {
    /// Display name of the author (first line of the author block).
    #[serde(rename = "username")]
    pub author: Option<String>,
    pub content: String,
    /// ISO-8601 publication time as rendered by the site.
    #[serde(rename = "date")]
    pub published_at: Option<String>,
    #[serde(rename = "likes")]
    pub like_count: Option<String>,
    #[serde(rename = "retweets")]
    pub repost_count: Option<String>,
    #[serde(rename = "replies")]
    pub reply_count: Option<String>,
    /// ISO-8601 UTC time the record was extracted.
    #[serde(rename = "timestamp")]
    pub collected_at: String,
}

impl PostRecord {
    /// A record with only content, stamped with the given collection time.
    pub fn new(content: impl Into<String>, collected_at: DateTime<Utc>) -> Self {
        Self {
            author: None,
            content: content.into(),
            published_at: None,
            like_count: None,
            repost_count: None,
            reply_count: None,
            collected_at: format_timestamp(collected_at),
        }
    }

    /// Deduplication key: `(author, content)`.
    pub fn key(&self) -> (Option<&str>, &str) {
        (self.author.as_deref(), self.content.as_str())
    }

    pub fn has_content(&self) -> bool {
        !self.content.trim().is_empty()
    }

    /// Short prefix of the content for log lines.
    pub fn preview(&self) -> String {
        let mut preview: String = self.content.chars().take(50).collect();
        if self.content.chars().count() > 50 {
            preview.push_str("...");
        }
        preview
    }

    /// Record an engagement counter. A later counter of the same kind replaces an earlier one.
    pub fn set_metric(&mut self, kind: MetricKind, value: Option<String>) {
        let slot = match kind {
            MetricKind::Like => &mut self.like_count,
            MetricKind::Repost => &mut self.repost_count,
            MetricKind::Reply => &mut self.reply_count,
        };
        *slot = value;
    }
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Engagement counter categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    Like,
    Repost,
    Reply,
}

impl MetricKind {
    /// Classify a counter by its type marker (e.g. `"like-count"`).
    ///
    /// Case-sensitive substring match, checked like, then retweet/repost, then reply.
    pub fn classify(marker: &str) -> Option<Self> {
        if marker.contains("like") {
            Some(MetricKind::Like)
        } else if marker.contains("retweet") || marker.contains("repost") {
            Some(MetricKind::Repost)
        } else if marker.contains("reply") {
            Some(MetricKind::Reply)
        } else {
            None
        }
    }
}

/// Outcome of reading one optional field from a post element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldOutcome<T> {
    Found(T),
    NotFound,
    /// The element was located but could not be read.
    Malformed(String),
}

impl<T> FieldOutcome<T> {
    pub fn found(self) -> Option<T> {
        match self {
            FieldOutcome::Found(value) => Some(value),
            FieldOutcome::NotFound | FieldOutcome::Malformed(_) => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> FieldOutcome<U> {
        match self {
            FieldOutcome::Found(value) => FieldOutcome::Found(f(value)),
            FieldOutcome::NotFound => FieldOutcome::NotFound,
            FieldOutcome::Malformed(reason) => FieldOutcome::Malformed(reason),
        }
    }
}

impl FieldOutcome<String> {
    /// Treat blank text as absent.
    pub fn non_blank(self) -> Self {
        match self {
            FieldOutcome::Found(text) if text.trim().is_empty() => FieldOutcome::NotFound,
            other => other,
        }
    }
}

/// First line of an author block; the remaining lines (handle, badges) are dropped.
pub fn author_label(block: &str) -> Option<String> {
    let first = block.split('\n').next().unwrap_or_default().trim();
    if first.is_empty() {
        None
    } else {
        Some(first.to_string())
    }
}
