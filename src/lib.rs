//! trendharvest - long-running browser harvester for social feed posts.
//!
//! Logs in through a real browser session, scrolls configured profile
//! timelines and the trending topics, and appends every post to a daily
//! CSV store, recovering from failures without ever exiting.

pub mod browser;
pub mod cli;
pub mod config;
pub mod models;
pub mod scrapers;
pub mod session;
pub mod storage;
