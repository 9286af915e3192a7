//! Idle session policy
//!
//! Watches user activity and enforces a warn-then-expire policy: after a
//! period of inactivity the user is asked whether to stay signed in, and if
//! nobody answers before the full idle timeout the session is signed out and
//! the host is sent to its login route.

pub mod controller;
pub mod timer;

pub use controller::{ActivityNotifier, IdleSessionController, Navigator};
pub use timer::{IdleSettings, IdleTimer, SessionStatus, SessionTimerState, TimerEvent};
