//! Site interaction: login, feed pagination and post extraction.

pub mod auth;
pub mod extract;
pub mod feed;
pub mod humanize;
pub mod site;

pub use auth::{Authenticator, Credentials};
pub use extract::RecordExtractor;
pub use feed::{FeedCollector, FeedContext, FeedPass, StopReason, TrendCursor, TrendingPass};
pub use humanize::{DelayRange, Humanizer, Pacer, TokioPacer};
pub use site::{SiteConfig, SiteSelectors};
