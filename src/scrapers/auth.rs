//! Login flow.

use std::fmt;

use tracing::{debug, info, warn};

use crate::browser::{DriverResult, PageDriver};
use crate::config::TimingConfig;

use super::humanize::Pacer;
use super::site::SiteConfig;

/// Account credentials for the login flow.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub account: String,
    pub secret: String,
    /// Extra identifier requested when the site flags unusual activity.
    pub verification_id: Option<String>,
}

impl Credentials {
    pub fn new(account: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            secret: secret.into(),
            verification_id: None,
        }
    }

    pub fn with_verification_id(mut self, id: Option<String>) -> Self {
        self.verification_id = id.filter(|s| !s.is_empty());
        self
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("account", &self.account)
            .field("secret", &"<redacted>")
            .field(
                "verification_id",
                &self.verification_id.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// Drives the multi-step login form.
#[derive(Debug, Clone)]
pub struct Authenticator {
    site: SiteConfig,
    timing: TimingConfig,
    credentials: Credentials,
}

impl Authenticator {
    pub fn new(site: SiteConfig, timing: TimingConfig, credentials: Credentials) -> Self {
        Self {
            site,
            timing,
            credentials,
        }
    }

    /// Log in on `driver`. Every failure is logged and reported as `false`.
    pub async fn login<D, P>(&self, driver: &D, pacer: &P) -> bool
    where
        D: PageDriver,
        P: Pacer + ?Sized,
    {
        match self.try_login(driver, pacer).await {
            Ok(true) => {
                info!("Successfully logged in");
                true
            }
            Ok(false) => {
                warn!("Login did not reach the home page");
                false
            }
            Err(e) => {
                warn!("Login failed: {}", e);
                false
            }
        }
    }

    async fn try_login<D, P>(&self, driver: &D, pacer: &P) -> DriverResult<bool>
    where
        D: PageDriver,
        P: Pacer + ?Sized,
    {
        let selectors = &self.site.selectors;
        let timeout = self.timing.wait_timeout();

        info!("Opening login page");
        driver.goto(&self.site.login_url).await?;
        pacer.pause(self.timing.login_load).await;

        let username = driver.wait_for(&selectors.username_input, timeout).await?;
        driver.type_text(&username, &self.credentials.account).await?;
        pacer.pause(self.timing.field_pause).await;
        self.press(driver, &selectors.next_label).await?;
        pacer.pause(self.timing.step_pause).await;

        self.answer_challenge(driver, pacer).await?;

        let password = driver.wait_for(&selectors.password_input, timeout).await?;
        driver.type_text(&password, &self.credentials.secret).await?;
        pacer.pause(self.timing.field_pause).await;
        self.press(driver, &selectors.login_label).await?;
        pacer.pause(self.timing.login_settle).await;

        let location = driver.current_url().await?;
        debug!("Landed on {}", location);
        Ok(location.contains(&self.site.home_marker))
    }

    /// Fill the extra identifier prompt if the site shows one.
    async fn answer_challenge<D, P>(&self, driver: &D, pacer: &P) -> DriverResult<()>
    where
        D: PageDriver,
        P: Pacer + ?Sized,
    {
        match driver
            .wait_for_text(&self.site.challenge_text, self.timing.challenge_timeout())
            .await
        {
            Ok(()) => {}
            Err(e) if e.is_timeout() => {
                info!("No verification step requested");
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        info!("Verification step detected");
        let Some(id) = self.credentials.verification_id.as_deref() else {
            warn!("Verification requested but no verification identifier is configured");
            return Ok(());
        };

        match self.fill_challenge(driver, pacer, id).await {
            Err(e) if !e.is_session_lost() => {
                info!("Verification step could not be completed: {}", e);
                Ok(())
            }
            other => other,
        }
    }

    async fn fill_challenge<D, P>(&self, driver: &D, pacer: &P, id: &str) -> DriverResult<()>
    where
        D: PageDriver,
        P: Pacer + ?Sized,
    {
        let selectors = &self.site.selectors;
        let input = driver
            .wait_for(&selectors.challenge_input, self.timing.wait_timeout())
            .await?;
        driver.type_text(&input, id).await?;
        pacer.pause(self.timing.field_pause).await;
        self.press(driver, &selectors.next_label).await?;
        pacer.pause(self.timing.challenge_settle).await;
        Ok(())
    }

    async fn press<D: PageDriver>(&self, driver: &D, label: &str) -> DriverResult<()> {
        let button = driver
            .wait_for_label(&self.site.selectors.button_label, label, self.timing.wait_timeout())
            .await?;
        driver.click(&button).await
    }
}
