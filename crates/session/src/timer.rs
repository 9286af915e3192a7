//! Idle timer state machine
//!
//! [`IdleTimer`] is pure: it never sleeps or reads the clock. Callers pass
//! the current instant in and ask for the next deadline, which keeps every
//! transition testable without a runtime.

use portal_core::{CoreError, CoreResult, IdleConfig};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Where the session is in the warn-then-expire cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionTimerState {
    Active,
    PromptVisible,
    Expired,
}

impl fmt::Display for SessionTimerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::PromptVisible => write!(f, "prompt_visible"),
            Self::Expired => write!(f, "expired"),
        }
    }
}

/// Transition produced by [`IdleTimer::poll`] and the explicit actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    /// The stay-signed-in prompt should be shown
    PromptShown,
    /// The prompt was withdrawn without expiring the session
    PromptCleared,
    /// The session must be signed out
    Expired,
}

/// Identity state the timer needs when a deadline passes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStatus {
    pub signed_in: bool,
    pub loading: bool,
}

impl SessionStatus {
    const fn can_prompt(self) -> bool {
        self.signed_in && !self.loading
    }
}

/// Validated idle durations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdleSettings {
    timeout: Duration,
    prompt_before_idle: Duration,
    throttle: Duration,
}

impl IdleSettings {
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] if `timeout` is zero or the
    /// prompt window does not fit inside it
    pub fn new(timeout: Duration, prompt_before_idle: Duration, throttle: Duration) -> CoreResult<Self> {
        if timeout.is_zero() {
            return Err(CoreError::invalid_config("idle timeout must be positive"));
        }
        if prompt_before_idle >= timeout {
            return Err(CoreError::invalid_config(format!(
                "prompt window {prompt_before_idle:?} must be shorter than idle timeout {timeout:?}"
            )));
        }
        Ok(Self {
            timeout,
            prompt_before_idle,
            throttle,
        })
    }

    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] if the configured window is invalid
    pub fn from_config(config: &IdleConfig) -> CoreResult<Self> {
        Self::new(
            Duration::from_millis(config.timeout_ms),
            Duration::from_millis(config.prompt_before_idle_ms),
            Duration::from_millis(config.throttle_ms),
        )
    }

    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    pub const fn prompt_before_idle(&self) -> Duration {
        self.prompt_before_idle
    }

    pub const fn throttle(&self) -> Duration {
        self.throttle
    }

    /// Idle time after which the prompt appears
    pub fn prompt_after(&self) -> Duration {
        self.timeout - self.prompt_before_idle
    }
}

/// Two-stage idle clock
#[derive(Debug, Clone)]
pub struct IdleTimer {
    settings: IdleSettings,
    state: SessionTimerState,
    idle_since: Instant,
    last_counted: Option<Instant>,
}

impl IdleTimer {
    pub const fn new(settings: IdleSettings, now: Instant) -> Self {
        Self {
            settings,
            state: SessionTimerState::Active,
            idle_since: now,
            last_counted: None,
        }
    }

    pub const fn state(&self) -> SessionTimerState {
        self.state
    }

    pub const fn settings(&self) -> &IdleSettings {
        &self.settings
    }

    /// Instant the idle clock was last reset
    pub const fn idle_since(&self) -> Instant {
        self.idle_since
    }

    /// When [`IdleTimer::poll`] next needs to run
    pub fn next_deadline(&self) -> Option<Instant> {
        match self.state {
            SessionTimerState::Active => Some(self.idle_since + self.settings.prompt_after()),
            SessionTimerState::PromptVisible => Some(self.idle_since + self.settings.timeout),
            SessionTimerState::Expired => None,
        }
    }

    /// Register user input; returns whether it reset the idle clock
    ///
    /// Only counts while `Active`: once the prompt is up the user has to
    /// answer it. Input within `throttle` of the last counted event is
    /// dropped.
    pub fn record_activity(&mut self, now: Instant) -> bool {
        if self.state != SessionTimerState::Active {
            return false;
        }
        if let Some(last) = self.last_counted {
            if now.saturating_duration_since(last) < self.settings.throttle {
                return false;
            }
        }
        self.last_counted = Some(now);
        self.idle_since = now;
        true
    }

    /// Advance the state machine to `now`
    pub fn poll(&mut self, now: Instant, status: SessionStatus) -> Option<TimerEvent> {
        match self.state {
            SessionTimerState::Active => {
                if now < self.idle_since + self.settings.prompt_after() {
                    return None;
                }
                if status.can_prompt() {
                    self.state = SessionTimerState::PromptVisible;
                    Some(TimerEvent::PromptShown)
                } else {
                    // Never prompt a signed-out or loading session; start over.
                    self.idle_since = now;
                    None
                }
            }
            SessionTimerState::PromptVisible => {
                if !status.signed_in {
                    self.state = SessionTimerState::Active;
                    self.idle_since = now;
                    return Some(TimerEvent::PromptCleared);
                }
                if now < self.idle_since + self.settings.timeout {
                    return None;
                }
                self.state = SessionTimerState::Expired;
                Some(TimerEvent::Expired)
            }
            SessionTimerState::Expired => None,
        }
    }

    /// The user chose to stay signed in
    pub fn continue_session(&mut self, now: Instant) -> bool {
        if self.state != SessionTimerState::PromptVisible {
            return false;
        }
        self.state = SessionTimerState::Active;
        self.idle_since = now;
        self.last_counted = Some(now);
        true
    }

    /// The user chose to log out from the prompt
    pub fn logout(&mut self) -> Option<TimerEvent> {
        if self.state != SessionTimerState::PromptVisible {
            return None;
        }
        self.state = SessionTimerState::Expired;
        Some(TimerEvent::Expired)
    }

    /// The identity session ended elsewhere; withdraw any prompt
    pub fn session_signed_out(&mut self, now: Instant) -> Option<TimerEvent> {
        if self.state != SessionTimerState::PromptVisible {
            return None;
        }
        self.state = SessionTimerState::Active;
        self.idle_since = now;
        Some(TimerEvent::PromptCleared)
    }

    /// Start a fresh cycle, e.g. after an expiry was handled
    pub fn reset(&mut self, now: Instant) {
        self.state = SessionTimerState::Active;
        self.idle_since = now;
        self.last_counted = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIGNED_IN: SessionStatus = SessionStatus {
        signed_in: true,
        loading: false,
    };

    fn settings() -> IdleSettings {
        IdleSettings::new(
            Duration::from_secs(60),
            Duration::from_secs(10),
            Duration::from_millis(500),
        )
        .unwrap()
    }

    #[test]
    fn test_settings_validation() {
        let second = Duration::from_secs(1);
        assert!(IdleSettings::new(Duration::ZERO, Duration::ZERO, second).is_err());
        assert!(IdleSettings::new(second, second, Duration::ZERO).is_err());
        assert_eq!(settings().prompt_after(), Duration::from_secs(50));
    }

    #[test]
    fn test_settings_from_config() {
        let config = IdleConfig {
            timeout_ms: 120_000,
            prompt_before_idle_ms: 20_000,
            throttle_ms: 250,
            ..IdleConfig::default()
        };
        let settings = IdleSettings::from_config(&config).unwrap();
        assert_eq!(settings.timeout(), Duration::from_secs(120));
        assert_eq!(settings.prompt_after(), Duration::from_secs(100));
        assert_eq!(settings.throttle(), Duration::from_millis(250));
    }

    #[test]
    fn test_prompt_fires_at_offset_not_before() {
        let start = Instant::now();
        let mut timer = IdleTimer::new(settings(), start);
        assert_eq!(timer.next_deadline(), Some(start + Duration::from_secs(50)));

        let just_before = start + Duration::from_secs(50) - Duration::from_millis(1);
        assert_eq!(timer.poll(just_before, SIGNED_IN), None);
        assert_eq!(timer.state(), SessionTimerState::Active);

        let at = start + Duration::from_secs(50);
        assert_eq!(timer.poll(at, SIGNED_IN), Some(TimerEvent::PromptShown));
        assert_eq!(timer.poll(at, SIGNED_IN), None);
        assert_eq!(timer.state(), SessionTimerState::PromptVisible);
        assert_eq!(timer.next_deadline(), Some(start + Duration::from_secs(60)));
    }

    #[test]
    fn test_expiry_at_full_timeout() {
        let start = Instant::now();
        let mut timer = IdleTimer::new(settings(), start);
        timer.poll(start + Duration::from_secs(50), SIGNED_IN);

        let before = start + Duration::from_secs(60) - Duration::from_millis(1);
        assert_eq!(timer.poll(before, SIGNED_IN), None);
        assert_eq!(
            timer.poll(start + Duration::from_secs(60), SIGNED_IN),
            Some(TimerEvent::Expired)
        );
        assert_eq!(timer.state(), SessionTimerState::Expired);
        assert_eq!(timer.next_deadline(), None);
    }

    #[test]
    fn test_continue_resets_clock() {
        let start = Instant::now();
        let mut timer = IdleTimer::new(settings(), start);
        timer.poll(start + Duration::from_secs(50), SIGNED_IN);

        let resumed = start + Duration::from_secs(55);
        assert!(timer.continue_session(resumed));
        assert_eq!(timer.state(), SessionTimerState::Active);
        assert_eq!(
            timer.next_deadline(),
            Some(resumed + Duration::from_secs(50))
        );
        assert_eq!(timer.poll(start + Duration::from_secs(60), SIGNED_IN), None);
        assert!(!timer.continue_session(resumed));
    }

    #[test]
    fn test_activity_throttled() {
        let start = Instant::now();
        let mut timer = IdleTimer::new(settings(), start);

        let first = start + Duration::from_secs(1);
        assert!(timer.record_activity(first));
        assert!(!timer.record_activity(first + Duration::from_millis(499)));
        assert_eq!(timer.idle_since(), first);
        assert!(timer.record_activity(first + Duration::from_millis(500)));
        assert_eq!(timer.idle_since(), first + Duration::from_millis(500));
    }

    #[test]
    fn test_activity_ignored_while_prompt_visible() {
        let start = Instant::now();
        let mut timer = IdleTimer::new(settings(), start);
        timer.poll(start + Duration::from_secs(50), SIGNED_IN);

        assert!(!timer.record_activity(start + Duration::from_secs(51)));
        assert_eq!(timer.state(), SessionTimerState::PromptVisible);
    }

    #[test]
    fn test_no_prompt_for_signed_out_or_loading_session() {
        let start = Instant::now();
        let at = start + Duration::from_secs(50);

        for status in [
            SessionStatus {
                signed_in: false,
                loading: false,
            },
            SessionStatus {
                signed_in: true,
                loading: true,
            },
        ] {
            let mut timer = IdleTimer::new(settings(), start);
            assert_eq!(timer.poll(at, status), None);
            assert_eq!(timer.state(), SessionTimerState::Active);
            assert_eq!(timer.idle_since(), at);
        }
    }

    #[test]
    fn test_external_sign_out_clears_prompt() {
        let start = Instant::now();
        let mut timer = IdleTimer::new(settings(), start);
        timer.poll(start + Duration::from_secs(50), SIGNED_IN);

        let now = start + Duration::from_secs(52);
        assert_eq!(
            timer.session_signed_out(now),
            Some(TimerEvent::PromptCleared)
        );
        assert_eq!(timer.state(), SessionTimerState::Active);
        assert_eq!(timer.session_signed_out(now), None);
    }

    #[test]
    fn test_signed_out_at_expiry_clears_instead_of_expiring() {
        let start = Instant::now();
        let mut timer = IdleTimer::new(settings(), start);
        timer.poll(start + Duration::from_secs(50), SIGNED_IN);

        let signed_out = SessionStatus {
            signed_in: false,
            loading: false,
        };
        assert_eq!(
            timer.poll(start + Duration::from_secs(60), signed_out),
            Some(TimerEvent::PromptCleared)
        );
    }

    #[test]
    fn test_logout_only_from_prompt() {
        let start = Instant::now();
        let mut timer = IdleTimer::new(settings(), start);
        assert_eq!(timer.logout(), None);

        timer.poll(start + Duration::from_secs(50), SIGNED_IN);
        assert_eq!(timer.logout(), Some(TimerEvent::Expired));
        assert_eq!(timer.state(), SessionTimerState::Expired);

        let later = start + Duration::from_secs(70);
        timer.reset(later);
        assert_eq!(timer.state(), SessionTimerState::Active);
        assert_eq!(timer.next_deadline(), Some(later + Duration::from_secs(50)));
    }

    #[test]
    fn test_state_serializes_snake_case() {
        let json = serde_json::to_string(&SessionTimerState::PromptVisible).unwrap();
        assert_eq!(json, "\"prompt_visible\"");
        assert_eq!(SessionTimerState::PromptVisible.to_string(), "prompt_visible");
    }
}
