// Upstream session substate: login prompt, 2FA, disconnected overlay

pub mod client;


pub use client::{AuthClient, BuildInfo, LoginRequest, LoginResponse, LoginStage};

use crate::protocol::SessionStatusPayload;
use crate::timer::{Scheduler, TimerKind, TimerSlot, TimerToken};
use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;
use tracing::{info, warn};

pub const NETWORK_ERROR_MESSAGE: &str = "Network error. Please try again.";
pub const INVALID_CREDENTIALS_MESSAGE: &str = "Invalid credentials";
pub const INVALID_CODE_MESSAGE: &str = "Invalid 2FA code";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    NoSession,
    LoginPrompt,
    TwoFactorPrompt,
    SessionActive,
}

/// Local validation failures; nothing is sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    MissingCredentials,
    MissingCode,
    NoTwoFactorPending,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::MissingCredentials => {
                write!(f, "Please enter both username and password")
            }
            SessionError::MissingCode => write!(f, "Please enter your 2FA code"),
            SessionError::NoTwoFactorPending => write!(f, "No 2FA verification is pending"),
        }
    }
}

impl std::error::Error for SessionError {}

/// Effect of a session-status message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionChange {
    /// Session came back; `refresh` asks for a snapshot when the feed is open
    Restored { refresh: bool },
    StillActive,
    /// No session; `overlay` tells whether the disconnected overlay is now shown
    Lost { overlay: bool },
}

/// Effect of a login/2FA result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    Accepted,
    TwoFactorRequired { two_factor_type: Option<String> },
    Rejected(String),
    NetworkError,
}

/// Tracks whether the server holds an upstream session and drives the
/// login/2FA prompts and the disconnected overlay
#[derive(Debug)]
pub struct SessionMachine {
    phase: SessionPhase,
    has_active_session: bool,
    last_session_time: Option<DateTime<Utc>>,
    started_at: DateTime<Utc>,
    overlay_visible: bool,
    prompt_error: Option<String>,
    two_factor_type: Option<String>,
    clock: TimerSlot,
    clock_period: Duration,
}

impl SessionMachine {
    pub fn new(clock_period: Duration, started_at: DateTime<Utc>) -> Self {
        Self {
            phase: SessionPhase::NoSession,
            has_active_session: false,
            last_session_time: None,
            started_at,
            overlay_visible: false,
            prompt_error: None,
            two_factor_type: None,
            clock: TimerSlot::new(),
            clock_period,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn has_active_session(&self) -> bool {
        self.has_active_session
    }

    pub fn last_session_time(&self) -> Option<DateTime<Utc>> {
        self.last_session_time
    }

    pub fn overlay_visible(&self) -> bool {
        self.overlay_visible
    }

    pub fn prompt_visible(&self) -> bool {
        matches!(
            self.phase,
            SessionPhase::LoginPrompt | SessionPhase::TwoFactorPrompt
        )
    }

    /// Inline error under the current prompt
    pub fn prompt_error(&self) -> Option<&str> {
        self.prompt_error.as_deref()
    }

    pub fn two_factor_type(&self) -> Option<&str> {
        self.two_factor_type.as_deref()
    }

    pub fn on_session_status(
        &mut self,
        status: &SessionStatusPayload,
        connection_open: bool,
        timers: &mut dyn Scheduler,
    ) -> SessionChange {
        let was_active = self.has_active_session;
        self.has_active_session = status.has_active_session;
        self.last_session_time = status.last_session_time();
        info!(
            has_active_session = status.has_active_session,
            last_session_time = ?self.last_session_time,
            "Session status update"
        );

        if status.has_active_session {
            if was_active {
                return SessionChange::StillActive;
            }
            self.phase = SessionPhase::SessionActive;
            self.overlay_visible = false;
            self.clear_prompt();
            self.sync_clock(timers);
            return SessionChange::Restored {
                refresh: connection_open,
            };
        }

        if let Some(error) = &status.error {
            warn!(error = %error, "Server reported session error");
        }
        if self.prompt_visible() {
            // The prompt already tracks the disconnection
            return SessionChange::Lost { overlay: false };
        }
        self.phase = SessionPhase::NoSession;
        self.overlay_visible = true;
        self.sync_clock(timers);
        SessionChange::Lost { overlay: true }
    }

    /// Open the credentials prompt; hides the overlay
    pub fn show_login(&mut self, timers: &mut dyn Scheduler) {
        self.phase = SessionPhase::LoginPrompt;
        self.overlay_visible = false;
        self.prompt_error = None;
        self.two_factor_type = None;
        self.sync_clock(timers);
    }

    /// Close the prompt; the overlay returns while there is no session
    pub fn cancel_login(&mut self, timers: &mut dyn Scheduler) {
        if !self.prompt_visible() {
            return;
        }
        self.clear_prompt();
        if self.has_active_session {
            self.phase = SessionPhase::SessionActive;
        } else {
            self.phase = SessionPhase::NoSession;
            self.overlay_visible = true;
        }
        self.sync_clock(timers);
    }

    /// Validate credentials and build the request
    pub fn submit_credentials(
        &mut self,
        username: &str,
        password: &str,
    ) -> Result<LoginRequest, SessionError> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(self.reject(SessionError::MissingCredentials));
        }
        self.prompt_error = None;
        info!(username = %username, "Submitting login");
        Ok(LoginRequest::Credentials {
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    /// Validate a 2FA code and build the request
    pub fn submit_two_factor(&mut self, code: &str) -> Result<LoginRequest, SessionError> {
        if self.phase != SessionPhase::TwoFactorPrompt {
            return Err(self.reject(SessionError::NoTwoFactorPending));
        }
        let code = code.trim();
        if code.is_empty() {
            return Err(self.reject(SessionError::MissingCode));
        }
        self.prompt_error = None;
        info!("Submitting 2FA code");
        Ok(LoginRequest::TwoFactor {
            two_factor_code: code.to_string(),
        })
    }

    fn reject(&mut self, error: SessionError) -> SessionError {
        self.prompt_error = Some(error.to_string());
        error
    }

    /// Apply the result of a login call. `Err` is a network failure;
    /// the state is left as it was so the user can retry.
    pub fn apply_login_response(
        &mut self,
        stage: LoginStage,
        result: Result<&LoginResponse, &str>,
        timers: &mut dyn Scheduler,
    ) -> LoginOutcome {
        let response = match result {
            Ok(response) => response,
            Err(error) => {
                warn!(error = %error, "Login request failed");
                self.prompt_error = Some(NETWORK_ERROR_MESSAGE.to_string());
                return LoginOutcome::NetworkError;
            }
        };

        if response.success {
            info!("Login accepted");
            // The next session-status message confirms the session
            self.clear_prompt();
            self.phase = if self.has_active_session {
                SessionPhase::SessionActive
            } else {
                SessionPhase::NoSession
            };
            self.sync_clock(timers);
            return LoginOutcome::Accepted;
        }

        if stage == LoginStage::Credentials && response.requires_two_factor {
            info!(two_factor_type = ?response.two_factor_type, "2FA required");
            self.phase = SessionPhase::TwoFactorPrompt;
            self.prompt_error = None;
            self.two_factor_type = response.two_factor_type.clone();
            self.sync_clock(timers);
            return LoginOutcome::TwoFactorRequired {
                two_factor_type: response.two_factor_type.clone(),
            };
        }

        let fallback = match stage {
            LoginStage::Credentials => INVALID_CREDENTIALS_MESSAGE,
            LoginStage::TwoFactor => INVALID_CODE_MESSAGE,
        };
        let message = response
            .message
            .clone()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| fallback.to_string());
        warn!(stage = ?stage, message = %message, "Login rejected");
        self.prompt_error = Some(message.clone());
        LoginOutcome::Rejected(message)
    }

    fn clear_prompt(&mut self) {
        self.prompt_error = None;
        self.two_factor_type = None;
    }

    /// The elapsed clock runs only while the overlay or a prompt is visible
    fn sync_clock(&mut self, timers: &mut dyn Scheduler) {
        let needed = self.overlay_visible || self.prompt_visible();
        if needed && !self.clock.is_armed() {
            self.clock
                .arm(timers.every(TimerKind::SessionClock, self.clock_period));
        } else if !needed {
            self.clock.cancel();
        }
    }

    pub fn is_clock_tick(&self, token: TimerToken) -> bool {
        self.clock.is_current(token)
    }

    pub fn clock_running(&self) -> bool {
        self.clock.is_armed()
    }

    /// Time since the session was lost: last session time, else server
    /// start, else process start
    pub fn disconnected_for(
        &self,
        now: DateTime<Utc>,
        server_started_at: Option<DateTime<Utc>>,
    ) -> Duration {
        let since = self
            .last_session_time
            .or(server_started_at)
            .unwrap_or(self.started_at);
        (now - since).to_std().unwrap_or(Duration::ZERO)
    }

    pub fn teardown(&mut self) {
        self.clock.cancel();
    }
}
