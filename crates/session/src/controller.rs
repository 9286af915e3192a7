//! Runtime driver for [`IdleTimer`]
//!
//! The controller owns one background task per started session. The task
//! listens for activity, user commands and the timer's next deadline, and
//! carries out the sign-out and navigation when the session expires. An
//! expired session is over: the task ends and the host calls
//! [`IdleSessionController::start`] again for the next one.

use crate::timer::{IdleSettings, IdleTimer, SessionStatus, SessionTimerState, TimerEvent};
use portal_core::IdentitySession;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

/// Moves the host to another route, e.g. the login surface
pub trait Navigator: Send + Sync {
    fn navigate(&self, route: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Continue,
    Logout,
    SessionSignedOut,
}

/// Handle hosts call from their input listeners
///
/// Cheap to clone. Bursts coalesce to the latest instant. Once the session
/// stops or expires every notifier is inert.
#[derive(Debug, Clone)]
pub struct ActivityNotifier {
    tx: Arc<watch::Sender<Instant>>,
}

impl ActivityNotifier {
    /// Report user input; returns `false` if the controller is not running
    pub fn notify(&self) -> bool {
        self.tx.send(Instant::now()).is_ok()
    }
}

struct Running {
    notifier: ActivityNotifier,
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

/// Warn-then-expire idle session controller
pub struct IdleSessionController {
    settings: IdleSettings,
    identity: Arc<dyn IdentitySession>,
    navigator: Arc<dyn Navigator>,
    login_route: String,
    state: Arc<watch::Sender<SessionTimerState>>,
    running: Option<Running>,
}

impl IdleSessionController {
    pub fn new(
        settings: IdleSettings,
        identity: Arc<dyn IdentitySession>,
        navigator: Arc<dyn Navigator>,
        login_route: impl Into<String>,
    ) -> Self {
        let (state, _) = watch::channel(SessionTimerState::Active);
        Self {
            settings,
            identity,
            navigator,
            login_route: login_route.into(),
            state: Arc::new(state),
            running: None,
        }
    }

    /// Begin watching for inactivity
    ///
    /// Must be called from within a tokio runtime. Calling it again while
    /// running returns a notifier for the existing session.
    pub fn start(&mut self) -> ActivityNotifier {
        if let Some(running) = &self.running {
            if !running.task.is_finished() {
                return running.notifier.clone();
            }
        }

        let (activity_tx, activity_rx) = watch::channel(Instant::now());
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        publish(&self.state, SessionTimerState::Active);

        let driver = Driver {
            timer: IdleTimer::new(self.settings, Instant::now()),
            identity: self.identity.clone(),
            navigator: self.navigator.clone(),
            login_route: self.login_route.clone(),
            state: self.state.clone(),
        };
        let task = tokio::spawn(driver.run(activity_rx, command_rx));

        let notifier = ActivityNotifier {
            tx: Arc::new(activity_tx),
        };
        self.running = Some(Running {
            notifier: notifier.clone(),
            commands: command_tx,
            task,
        });

        debug!(
            prompt_after = ?self.settings.prompt_after(),
            timeout = ?self.settings.timeout(),
            "Idle session controller started"
        );
        notifier
    }

    /// Stop watching; outstanding notifiers become inert
    pub fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            running.task.abort();
            publish(&self.state, SessionTimerState::Active);
            debug!("Idle session controller stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|running| !running.task.is_finished())
    }

    /// Observe state changes, e.g. to show or hide the prompt
    pub fn subscribe(&self) -> watch::Receiver<SessionTimerState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> SessionTimerState {
        *self.state.borrow()
    }

    /// "Stay signed in" from the prompt
    pub fn continue_session(&self) {
        self.send(Command::Continue);
    }

    /// "Log out" from the prompt
    pub fn logout(&self) {
        self.send(Command::Logout);
    }

    /// The identity session was ended elsewhere (another tab, an auth guard)
    pub fn session_signed_out(&self) {
        self.send(Command::SessionSignedOut);
    }

    fn send(&self, command: Command) {
        let delivered = self
            .running
            .as_ref()
            .is_some_and(|running| running.commands.send(command).is_ok());
        if !delivered {
            debug!(?command, "Idle session controller not running; command dropped");
        }
    }
}

impl Drop for IdleSessionController {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            running.task.abort();
        }
    }
}

struct Driver {
    timer: IdleTimer,
    identity: Arc<dyn IdentitySession>,
    navigator: Arc<dyn Navigator>,
    login_route: String,
    state: Arc<watch::Sender<SessionTimerState>>,
}

impl Driver {
    async fn run(
        mut self,
        mut activity: watch::Receiver<Instant>,
        mut commands: mpsc::UnboundedReceiver<Command>,
    ) {
        let mut running = true;
        while running {
            let deadline = self.timer.next_deadline();
            let wake = async move {
                match deadline {
                    Some(at) => sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                Ok(()) = activity.changed() => {
                    let at = *activity.borrow_and_update();
                    if self.timer.record_activity(at) {
                        tracing::trace!("Activity reset idle clock");
                    }
                }
                Some(command) = commands.recv() => running = self.handle(command).await,
                () = wake => {
                    let status = SessionStatus {
                        signed_in: self.identity.is_signed_in(),
                        loading: self.identity.is_loading(),
                    };
                    let event = self.timer.poll(Instant::now(), status);
                    running = self.apply(event).await;
                }
                else => break,
            }
        }
        debug!("Idle session supervision ended");
    }

    /// Returns `false` once the session has expired
    async fn handle(&mut self, command: Command) -> bool {
        let now = Instant::now();
        let event = match command {
            Command::Continue => {
                if self.timer.continue_session(now) {
                    info!("Session continued from idle prompt");
                    publish(&self.state, self.timer.state());
                }
                None
            }
            Command::Logout => self.timer.logout(),
            Command::SessionSignedOut => self.timer.session_signed_out(now),
        };
        self.apply(event).await
    }

    async fn apply(&mut self, event: Option<TimerEvent>) -> bool {
        match event {
            Some(TimerEvent::PromptShown) => {
                info!(
                    remaining = ?self.timer.settings().prompt_before_idle(),
                    "Session idle, showing stay-signed-in prompt"
                );
                publish(&self.state, SessionTimerState::PromptVisible);
            }
            Some(TimerEvent::PromptCleared) => {
                debug!("Session signed out elsewhere, clearing idle prompt");
                publish(&self.state, SessionTimerState::Active);
            }
            Some(TimerEvent::Expired) => {
                self.expire().await;
                return false;
            }
            None => {}
        }
        true
    }

    async fn expire(&mut self) {
        publish(&self.state, SessionTimerState::Expired);
        info!("Idle session expired, signing out");

        if let Err(e) = self.identity.sign_out().await {
            warn!("Sign-out on idle expiry failed: {e}");
        }
        self.navigator.navigate(&self.login_route);

        self.timer.reset(Instant::now());
        publish(&self.state, SessionTimerState::Active);
    }
}

fn publish(tx: &watch::Sender<SessionTimerState>, next: SessionTimerState) {
    tx.send_if_modified(|current| {
        if *current == next {
            false
        } else {
            *current = next;
            true
        }
    });
}
