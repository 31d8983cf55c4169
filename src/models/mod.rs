//! Data models for harvested posts.

mod post;

pub use post::{author_label, format_timestamp, FieldOutcome, MetricKind, PostRecord};
