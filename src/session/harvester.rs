//! Lifecycle owner for the browser session.

use tracing::{debug, error, info, warn};

use crate::browser::{DriverError, DriverResult, PageDriver, SessionFactory};
use crate::config::{HarvestConfig, TargetsConfig, TimingConfig};
use crate::models::PostRecord;
use crate::scrapers::{Authenticator, Credentials, FeedCollector, Pacer, TrendingPass};
use crate::storage::RecordStore;

use super::{Delay, SessionEvent, SessionState, Transition};

/// Owns the single live browser session and drives it through [`SessionState`].
pub struct Harvester<F: SessionFactory, P: Pacer> {
    factory: F,
    pacer: P,
    authenticator: Authenticator,
    collector: FeedCollector,
    store: RecordStore,
    targets: TargetsConfig,
    timing: TimingConfig,
    session: Option<F::Session>,
    state: SessionState,
}

impl<F: SessionFactory, P: Pacer> Harvester<F, P> {
    pub fn new(config: &HarvestConfig, credentials: Credentials, factory: F, pacer: P) -> Self {
        Self {
            factory,
            pacer,
            authenticator: Authenticator::new(
                config.site.clone(),
                config.timing.clone(),
                credentials,
            ),
            collector: FeedCollector::new(config.site.clone(), config.timing.clone()),
            store: RecordStore::new(config.data_dir.clone(), config.file_prefix.clone()),
            targets: config.targets.clone(),
            timing: config.timing.clone(),
            session: None,
            state: SessionState::Authenticating,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    /// Run forever. Only a termination signal (racing this future) ends the process.
    pub async fn run(&mut self) {
        info!("Starting harvester");
        loop {
            self.step().await;
        }
    }

    /// Handle the current state once and apply the resulting transition.
    pub async fn step(&mut self) -> SessionState {
        let from = self.state;
        let event = match self.advance().await {
            Ok(event) => event,
            Err(e) => {
                error!("Unexpected error in {:?}: {}", from, e);
                SessionEvent::Crashed
            }
        };

        let transition = from.on(event).unwrap_or_else(|| {
            error!("No transition for {:?} in {:?}, restarting", event, from);
            Transition::restart(Delay::FatalBackoff)
        });
        debug!("{:?} --{:?}--> {:?}", from, event, transition.next);

        self.apply(transition).await;
        self.state
    }

    /// Close the live session, if any.
    pub async fn shutdown(&mut self) {
        info!("Shutting down harvester");
        self.close_session().await;
    }

    /// Open a session if needed and log in once.
    pub async fn login(&mut self) -> DriverResult<bool> {
        self.open_session().await?;
        let session = self.session.as_ref().ok_or(DriverError::SessionLost)?;
        Ok(self.authenticator.login(session, &self.pacer).await)
    }

    /// Harvest the given profiles on the current session.
    pub async fn harvest_profiles(
        &mut self,
        usernames: &[String],
        max_records: usize,
    ) -> DriverResult<Vec<PostRecord>> {
        self.open_session().await?;
        let session = self.session.as_ref().ok_or(DriverError::SessionLost)?;
        let mut harvested = Vec::new();
        for username in usernames {
            let records = self
                .collector
                .harvest_profile(session, &self.pacer, &self.store, username, max_records)
                .await?;
            harvested.extend(records);
        }
        Ok(harvested)
    }

    /// Walk the trending list on the current session.
    pub async fn harvest_trending(&mut self, per_topic_cap: usize) -> DriverResult<TrendingPass> {
        self.open_session().await?;
        let session = self.session.as_ref().ok_or(DriverError::SessionLost)?;
        self.collector
            .harvest_trending(session, &self.pacer, &self.store, per_topic_cap)
            .await
    }

    async fn advance(&mut self) -> DriverResult<SessionEvent> {
        match self.state {
            SessionState::Authenticating | SessionState::ReAuthenticating => {
                if self.login().await? {
                    Ok(SessionEvent::LoginSucceeded)
                } else {
                    Ok(SessionEvent::LoginFailed)
                }
            }
            SessionState::Harvesting => match self.run_pass().await {
                Ok(()) => Ok(SessionEvent::PassCompleted),
                Err(e) => {
                    warn!("Harvesting pass failed: {}", e);
                    Ok(SessionEvent::HarvestFailed)
                }
            },
            SessionState::StalledRetry => {
                if let Some(session) = self.session.as_ref() {
                    self.timing.humanizer.simulate(session, &self.pacer).await;
                }
                Ok(SessionEvent::Recovered)
            }
            SessionState::FatalBackoff => Ok(SessionEvent::BackoffElapsed),
            SessionState::CycleCooldown => Ok(SessionEvent::CooldownElapsed),
        }
    }

    /// Every configured profile, then the trending topics, then a short pause.
    async fn run_pass(&mut self) -> DriverResult<()> {
        let profiles = self.targets.profiles.clone();
        if !profiles.is_empty() {
            let records = self
                .harvest_profiles(&profiles, self.targets.max_per_profile)
                .await?;
            info!("Harvested {} posts from {} profiles", records.len(), profiles.len());
        }

        if self.targets.trending {
            self.harvest_trending(self.targets.per_topic_cap).await?;
        }

        info!("Completed harvesting pass");
        self.pacer.pause(self.timing.cycle_pause).await;
        Ok(())
    }

    async fn apply(&mut self, transition: Transition) {
        if transition.close_session {
            self.close_session().await;
        }
        if let Some(delay) = transition.delay {
            let duration = delay.duration(&self.timing);
            info!("Waiting {}s before {:?}", duration.as_secs(), transition.next);
            self.pacer.sleep(duration).await;
        }
        self.state = transition.next;
    }

    async fn open_session(&mut self) -> DriverResult<()> {
        if self.session.is_none() {
            info!("Opening browser session");
            self.session = Some(self.factory.open().await?);
        }
        Ok(())
    }

    async fn close_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            debug!("Closing browser session");
            if let Err(e) = session.close().await {
                warn!("Error closing browser session: {}", e);
            }
        }
    }
}
