//! Session resilience controller driven through the fake browser.

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use common::{test_config, FakeFactory, FakePost, RecordingPacer, Script};
use trendharvest::scrapers::Credentials;
use trendharvest::session::{Harvester, SessionState};
use trendharvest::storage::read_records;

const AUTH_RETRY: Duration = Duration::from_secs(60);
const STALL_PAUSE: Duration = Duration::from_secs(30);
const COOLDOWN: Duration = Duration::from_secs(300);
const FATAL_BACKOFF: Duration = Duration::from_secs(60);

fn credentials() -> Credentials {
    Credentials::new("someone", "hunter2")
}

#[tokio::test]
async fn test_repeated_login_failures_keep_retrying() {
    let dir = tempfile::tempdir().unwrap();
    let factory = FakeFactory::new(Script::default());
    factory.shared.login_ok.store(false, Ordering::SeqCst);
    let shared = factory.shared.clone();
    let pacer = RecordingPacer::default();
    let mut harvester = Harvester::new(
        &test_config(dir.path()),
        credentials(),
        factory,
        pacer.clone(),
    );

    for _ in 0..3 {
        assert_eq!(harvester.step().await, SessionState::Authenticating);
    }

    assert_eq!(pacer.count(AUTH_RETRY), 3);
    assert_eq!(shared.opened.load(Ordering::SeqCst), 3);
    assert_eq!(shared.closed.load(Ordering::SeqCst), 3);
    assert!(!harvester.has_session());
}

#[tokio::test]
async fn test_completed_pass_cools_down_with_fresh_session() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.targets.profiles = vec!["rustlang".to_string()];
    config.targets.max_per_profile = 2;
    let factory = FakeFactory::new(Script {
        posts: vec![FakePost::new("Rust", "release notes"), FakePost::new("Rust", "blog post")],
        initially_rendered: 2,
        ..Default::default()
    });
    let shared = factory.shared.clone();
    let pacer = RecordingPacer::default();
    let mut harvester = Harvester::new(&config, credentials(), factory, pacer.clone());

    assert_eq!(harvester.step().await, SessionState::Harvesting);
    assert_eq!(harvester.step().await, SessionState::CycleCooldown);
    assert_eq!(read_records(&harvester.store().today()).unwrap().len(), 2);
    let cycle_pause = *pacer.sleeps().last().unwrap();
    assert!(cycle_pause >= Duration::from_secs(10) && cycle_pause <= Duration::from_secs(15));

    assert_eq!(harvester.step().await, SessionState::Authenticating);
    assert_eq!(pacer.count(COOLDOWN), 1);
    assert_eq!(shared.closed.load(Ordering::SeqCst), 1);

    assert_eq!(harvester.step().await, SessionState::Harvesting);
    assert_eq!(shared.opened.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_harvest_failure_stalls_then_reauthenticates() {
    let dir = tempfile::tempdir().unwrap();
    let factory = FakeFactory::new(Script {
        trends: vec!["#Rust".to_string()],
        fail_navigation_to: Some("explore".to_string()),
        ..Default::default()
    });
    let shared = factory.shared.clone();
    let pacer = RecordingPacer::default();
    let mut harvester = Harvester::new(
        &test_config(dir.path()),
        credentials(),
        factory,
        pacer.clone(),
    );

    assert_eq!(harvester.step().await, SessionState::Harvesting);
    assert_eq!(harvester.step().await, SessionState::StalledRetry);
    assert_eq!(pacer.sleeps().last(), Some(&STALL_PAUSE));

    assert_eq!(harvester.step().await, SessionState::ReAuthenticating);
    assert_eq!(harvester.step().await, SessionState::Harvesting);

    assert_eq!(shared.opened.load(Ordering::SeqCst), 1);
    assert_eq!(shared.closed.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_failed_reauthentication_backs_off_to_fresh_session() {
    let dir = tempfile::tempdir().unwrap();
    let factory = FakeFactory::new(Script {
        fail_navigation_to: Some("explore".to_string()),
        ..Default::default()
    });
    let shared = factory.shared.clone();
    let pacer = RecordingPacer::default();
    let mut harvester = Harvester::new(
        &test_config(dir.path()),
        credentials(),
        factory,
        pacer.clone(),
    );

    assert_eq!(harvester.step().await, SessionState::Harvesting);
    assert_eq!(harvester.step().await, SessionState::StalledRetry);
    assert_eq!(harvester.step().await, SessionState::ReAuthenticating);

    shared.login_ok.store(false, Ordering::SeqCst);
    assert_eq!(harvester.step().await, SessionState::FatalBackoff);

    pacer.clear();
    assert_eq!(harvester.step().await, SessionState::Authenticating);
    assert_eq!(pacer.sleeps(), vec![FATAL_BACKOFF]);
    assert_eq!(shared.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unopenable_session_crashes_into_backoff() {
    let dir = tempfile::tempdir().unwrap();
    let factory = FakeFactory::new(Script::default());
    factory.shared.fail_open.store(true, Ordering::SeqCst);
    let shared = factory.shared.clone();
    let pacer = RecordingPacer::default();
    let mut harvester = Harvester::new(
        &test_config(dir.path()),
        credentials(),
        factory,
        pacer.clone(),
    );

    assert_eq!(harvester.step().await, SessionState::Authenticating);
    assert_eq!(pacer.sleeps(), vec![FATAL_BACKOFF]);

    shared.fail_open.store(false, Ordering::SeqCst);
    assert_eq!(harvester.step().await, SessionState::Harvesting);
}

#[tokio::test]
async fn test_shutdown_closes_live_session() {
    let dir = tempfile::tempdir().unwrap();
    let factory = FakeFactory::new(Script::default());
    let shared = factory.shared.clone();
    let mut harvester = Harvester::new(
        &test_config(dir.path()),
        credentials(),
        factory,
        RecordingPacer::default(),
    );

    assert_eq!(harvester.step().await, SessionState::Harvesting);
    harvester.shutdown().await;

    assert!(!harvester.has_session());
    assert_eq!(shared.closed.load(Ordering::SeqCst), 1);
}
