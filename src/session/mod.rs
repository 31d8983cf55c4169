//! Session resilience state machine.
//!
//! The table in [`SessionState::on`] is the whole recovery policy; the
//! [`Harvester`] only produces events and applies the resulting transitions.

mod harvester;

pub use harvester::Harvester;

use std::time::Duration;

use crate::config::TimingConfig;

/// Lifecycle states of a long-running harvest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Authenticating,
    Harvesting,
    StalledRetry,
    ReAuthenticating,
    CycleCooldown,
    FatalBackoff,
}

/// Outcomes reported by the state handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionEvent {
    LoginSucceeded,
    LoginFailed,
    /// A full pass over every target finished.
    PassCompleted,
    /// An error escaped the harvesting pass.
    HarvestFailed,
    /// Human simulation ran after a stall.
    Recovered,
    BackoffElapsed,
    CooldownElapsed,
    /// The state handler itself failed (e.g. no session could be opened).
    Crashed,
}

/// Named waits applied after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delay {
    AuthRetry,
    StallPause,
    FatalBackoff,
    CycleCooldown,
}

impl Delay {
    pub fn duration(self, timing: &TimingConfig) -> Duration {
        match self {
            Delay::AuthRetry => timing.auth_retry(),
            Delay::StallPause => timing.stall_pause(),
            Delay::FatalBackoff => timing.fatal_backoff(),
            Delay::CycleCooldown => timing.cycle_cooldown(),
        }
    }
}

/// Effects of handling one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub next: SessionState,
    /// Wait applied after the session (if any) is closed.
    pub delay: Option<Delay>,
    pub close_session: bool,
}

impl Transition {
    const fn to(next: SessionState) -> Self {
        Self {
            next,
            delay: None,
            close_session: false,
        }
    }

    const fn after(next: SessionState, delay: Delay) -> Self {
        Self {
            next,
            delay: Some(delay),
            close_session: false,
        }
    }

    const fn restart(delay: Delay) -> Self {
        Self {
            next: SessionState::Authenticating,
            delay: Some(delay),
            close_session: true,
        }
    }
}

impl SessionState {
    /// Transition for `event`, or `None` if the event cannot occur in this state.
    pub fn on(self, event: SessionEvent) -> Option<Transition> {
        use SessionEvent as E;
        use SessionState as S;

        let transition = match (self, event) {
            (_, E::Crashed) => Transition::restart(Delay::FatalBackoff),

            (S::Authenticating, E::LoginSucceeded) => Transition::to(S::Harvesting),
            (S::Authenticating, E::LoginFailed) => Transition::restart(Delay::AuthRetry),

            (S::Harvesting, E::PassCompleted) => Transition::to(S::CycleCooldown),
            (S::Harvesting, E::HarvestFailed) => {
                Transition::after(S::StalledRetry, Delay::StallPause)
            }

            (S::StalledRetry, E::Recovered) => Transition::to(S::ReAuthenticating),

            (S::ReAuthenticating, E::LoginSucceeded) => Transition::to(S::Harvesting),
            (S::ReAuthenticating, E::LoginFailed) => Transition::to(S::FatalBackoff),

            (S::FatalBackoff, E::BackoffElapsed) => Transition::restart(Delay::FatalBackoff),
            (S::CycleCooldown, E::CooldownElapsed) => Transition::restart(Delay::CycleCooldown),

            _ => return None,
        };
        Some(transition)
    }
}
