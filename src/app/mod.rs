// Owned application context: every event handler runs against it

mod commands;
pub mod runtime;


pub use commands::{CommandError, UserCommand};

use crate::announce::announce_change;
use crate::config::{MonitorConfig, UiConfig};
use crate::connection::{
    CloseOutcome, ConnectionManager, TimerOutcome, Transport, TransportEvent,
};
use crate::diagnostics::{LogBook, LogCategory};
use crate::dispatch::{dispatch, MessageHandler};
use crate::entity::EntityState;
use crate::protocol::{LogEntryPayload, SessionStatusPayload, SystemPayload};
use crate::render::{
    format_elapsed, format_uptime, BackendHealth, RenderInstruction, RenderSink, SessionView,
    StatusLine,
};
use crate::session::{
    BuildInfo, LoginRequest, LoginResponse, LoginStage, SessionChange, SessionMachine,
};
use crate::state::{reconcile, ReconcileDecision, StateStore};
use crate::timer::{Now, Scheduler, TimerFired, TimerKind, TimerSlot};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

/// Everything the event loop reacts to
#[derive(Debug)]
pub enum AppEvent {
    Transport(TransportEvent),
    Timer(TimerFired),
    Command(UserCommand),
    Http(HttpCompletion),
}

impl From<TransportEvent> for AppEvent {
    fn from(event: TransportEvent) -> Self {
        AppEvent::Transport(event)
    }
}

impl From<TimerFired> for AppEvent {
    fn from(fired: TimerFired) -> Self {
        AppEvent::Timer(fired)
    }
}

/// Out-of-band HTTP call queued by a handler; the runtime performs it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpRequest {
    Login(LoginRequest),
    Logout,
    BuildInfo,
}

/// Result of an `HttpRequest`, posted back as an event. Errors are
/// already rendered to text.
#[derive(Debug, Clone, PartialEq)]
pub enum HttpCompletion {
    Login {
        stage: LoginStage,
        result: Result<LoginResponse, String>,
    },
    Logout(Result<(), String>),
    BuildInfo(Result<BuildInfo, String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    Quit,
}

/// Process-wide client state. Created once at startup, torn down on quit.
pub struct MonitorContext<T, S, R> {
    connection: ConnectionManager,
    store: StateStore,
    session: SessionMachine,
    log_book: LogBook,
    transport: T,
    timers: S,
    sink: R,
    ui: UiConfig,
    ui_refresh: TimerSlot,
    status_message: String,
    last_update: Option<DateTime<Utc>>,
    build: Option<String>,
    outbox: Vec<HttpRequest>,
}

impl<T, S, R> MonitorContext<T, S, R>
where
    T: Transport,
    S: Scheduler,
    R: RenderSink,
{
    pub fn new(config: &MonitorConfig, transport: T, timers: S, sink: R, now: Now) -> Self {
        Self {
            connection: ConnectionManager::new(config.reconnect.clone()),
            store: StateStore::new(),
            session: SessionMachine::new(config.ui.session_clock(), now.wall),
            log_book: LogBook::new(config.ui.max_log_entries),
            transport,
            timers,
            sink,
            ui: config.ui.clone(),
            ui_refresh: TimerSlot::new(),
            status_message: "Initializing...".to_string(),
            last_update: None,
            build: None,
            outbox: Vec::new(),
        }
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn session(&self) -> &SessionMachine {
        &self.session
    }

    pub fn log_book(&self) -> &LogBook {
        &self.log_book
    }

    pub fn status_message(&self) -> &str {
        &self.status_message
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.last_update
    }

    pub fn build(&self) -> Option<&str> {
        self.build.as_deref()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn timers(&self) -> &S {
        &self.timers
    }

    pub fn sink(&self) -> &R {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut R {
        &mut self.sink
    }

    /// HTTP calls queued since the last call
    pub fn take_requests(&mut self) -> Vec<HttpRequest> {
        std::mem::take(&mut self.outbox)
    }

    /// Arm the periodic refresh, open the feed and ask for build info
    pub fn start(&mut self, now: Now) {
        info!("Starting presence monitor");
        self.ui_refresh.arm(
            self.timers
                .every(TimerKind::UiRefresh, self.ui.refresh_interval()),
        );
        self.outbox.push(HttpRequest::BuildInfo);
        self.connect(now);
    }

    fn connect(&mut self, now: Now) {
        self.connection.connect(&mut self.transport);
        self.status_message = "Connecting...".to_string();
        self.render_status(now);
    }

    pub fn handle(&mut self, event: AppEvent, now: Now) -> Control {
        match event {
            AppEvent::Transport(event) => self.on_transport(event, now),
            AppEvent::Timer(fired) => self.on_timer(fired, now),
            AppEvent::Command(command) => return self.on_command(command, now),
            AppEvent::Http(completion) => self.on_http(completion, now),
        }
        Control::Continue
    }

    fn on_transport(&mut self, event: TransportEvent, now: Now) {
        match event {
            TransportEvent::Opened { id } => {
                if !self.connection.on_open(id, &mut self.transport) {
                    return;
                }
                self.record(
                    LogCategory::ClientRequest,
                    "Sending REFRESH command to server",
                    now.wall,
                );
                self.status_message = "WebSocket connected. Waiting for data...".to_string();
                self.render_banner();
                self.render_status(now);
            }
            TransportEvent::Frame { id, text } => {
                if self.connection.current() != Some(id) {
                    debug!(connection_id = %id, "Dropping frame from superseded connection");
                    return;
                }
                self.last_update = Some(now.wall);
                self.status_message = "Operational".to_string();
                self.record(LogCategory::ClientResponse, text.as_str(), now.wall);
                let mut handler = FeedHandler { ctx: self, now };
                dispatch(&text, &mut handler);
                self.render_status(now);
            }
            TransportEvent::Errored { id, error } => {
                if self.connection.on_error(id, &error) {
                    self.status_message = "Connection error!".to_string();
                    self.render_status(now);
                }
            }
            TransportEvent::Closed { id, code, reason } => {
                let outcome = self.connection.on_close(
                    id,
                    code,
                    &reason,
                    &mut self.timers,
                    now.monotonic,
                );
                if outcome == CloseOutcome::Stale {
                    return;
                }
                self.status_message = if reason.is_empty() {
                    "Disconnected: Connection closed".to_string()
                } else {
                    format!("Disconnected: {}", reason)
                };
                self.render_banner();
                self.render_status(now);
            }
        }
    }

    fn on_timer(&mut self, fired: TimerFired, now: Now) {
        match fired.kind {
            TimerKind::Reconnect | TimerKind::CountdownTick | TimerKind::ShutdownGrace => {
                let outcome = self.connection.on_timer(
                    fired,
                    &mut self.transport,
                    &mut self.timers,
                    now.monotonic,
                );
                match outcome {
                    TimerOutcome::Ignored => {}
                    TimerOutcome::Reconnecting(_) => {
                        self.status_message = "Connecting...".to_string();
                        self.render_status(now);
                    }
                    TimerOutcome::CountdownUpdated(_) | TimerOutcome::BackoffScheduled(_) => {
                        self.render_banner();
                    }
                }
            }
            TimerKind::SessionClock => {
                if self.session.is_clock_tick(fired.token) {
                    self.render_session(now);
                }
            }
            TimerKind::UiRefresh => {
                if self.ui_refresh.is_current(fired.token) {
                    self.render_status(now);
                    self.render_full();
                }
            }
        }
    }

    fn on_command(&mut self, command: UserCommand, now: Now) -> Control {
        debug!(command = ?command, "User command");
        match command {
            UserCommand::Refresh => self.refresh(now),
            UserCommand::Retry => {
                self.connection.retry_now(&mut self.transport);
                self.status_message = "Connecting...".to_string();
                self.render_status(now);
            }
            UserCommand::ShowLogin => {
                self.session.show_login(&mut self.timers);
                self.render_session(now);
            }
            UserCommand::Login { username, password } => {
                if !self.session.prompt_visible() {
                    self.session.show_login(&mut self.timers);
                }
                match self.session.submit_credentials(&username, &password) {
                    Ok(request) => self.queue_login(
                        request,
                        "Sending login request",
                        now,
                    ),
                    Err(e) => debug!(error = %e, "Login not submitted"),
                }
                self.render_session(now);
            }
            UserCommand::TwoFactor(code) => {
                match self.session.submit_two_factor(&code) {
                    Ok(request) => self.queue_login(
                        request,
                        "Sending 2FA verification",
                        now,
                    ),
                    Err(e) => debug!(error = %e, "2FA code not submitted"),
                }
                self.render_session(now);
            }
            UserCommand::CancelLogin => {
                self.session.cancel_login(&mut self.timers);
                self.render_session(now);
            }
            UserCommand::Logout => {
                info!("Dropping upstream session");
                self.status_message = "Dropping session...".to_string();
                self.record(
                    LogCategory::ClientRequest,
                    "Sending request: POST /api/auth/logout",
                    now.wall,
                );
                self.outbox.push(HttpRequest::Logout);
                self.render_status(now);
            }
            UserCommand::Shutdown => {
                match self.connection.request_shutdown(&mut self.transport) {
                    Ok(()) => {
                        info!("Server shutdown requested");
                        self.status_message = "Shutting down server...".to_string();
                        self.record(
                            LogCategory::ClientRequest,
                            "Sending SHUTDOWN command to server",
                            now.wall,
                        );
                    }
                    Err(e) => warn!(error = %e, "Cannot request shutdown"),
                }
                self.render_status(now);
            }
            UserCommand::Quit => {
                self.teardown();
                return Control::Quit;
            }
        }
        Control::Continue
    }

    fn refresh(&mut self, now: Now) {
        match self.connection.send_refresh(&mut self.transport) {
            Ok(()) => {
                info!("Sending REFRESH request");
                self.record(
                    LogCategory::ClientRequest,
                    "Sending REFRESH command to server",
                    now.wall,
                );
            }
            Err(e) => {
                warn!(error = %e, "Cannot refresh");
                let content = if self.connection.is_open() {
                    "Attempted REFRESH while server is shutting down"
                } else {
                    "Attempted REFRESH but WebSocket not connected"
                };
                self.record(LogCategory::ClientRequest, content, now.wall);
            }
        }
    }

    fn queue_login(&mut self, request: LoginRequest, description: &str, now: Now) {
        self.record(
            LogCategory::ClientRequest,
            format!("{}: {}", description, request.masked()),
            now.wall,
        );
        self.outbox.push(HttpRequest::Login(request));
    }

    fn on_http(&mut self, completion: HttpCompletion, now: Now) {
        match completion {
            HttpCompletion::Login { stage, result } => {
                let label = match stage {
                    LoginStage::Credentials => "Login",
                    LoginStage::TwoFactor => "2FA",
                };
                let entry = match &result {
                    Ok(response) => format!(
                        "{} Result: {}",
                        label,
                        serde_json::to_string(response).unwrap_or_default()
                    ),
                    Err(e) => format!("{} Error: {}", label, e),
                };
                self.record(LogCategory::ClientResponse, entry, now.wall);
                let result = result.as_ref().map_err(String::as_str);
                self.session
                    .apply_login_response(stage, result, &mut self.timers);
                self.render_session(now);
            }
            HttpCompletion::Logout(Ok(())) => {
                info!("Session dropped");
                self.record(
                    LogCategory::ClientResponse,
                    "Session dropped successfully",
                    now.wall,
                );
            }
            HttpCompletion::Logout(Err(e)) => {
                warn!(error = %e, "Failed to drop session");
                self.record(
                    LogCategory::ClientResponse,
                    format!("Failed to drop session: {}", e),
                    now.wall,
                );
                self.status_message = "Failed to drop session".to_string();
                self.render_status(now);
            }
            HttpCompletion::BuildInfo(Ok(info)) => {
                self.build = info.build_time.or(info.version);
                info!(build = self.build.as_deref().unwrap_or("Unknown"), "Server build info");
                self.render_status(now);
            }
            HttpCompletion::BuildInfo(Err(e)) => {
                warn!(error = %e, "Failed to fetch build info");
            }
        }
    }

    /// Cancel every timer and close the feed
    pub fn teardown(&mut self) {
        info!("Shutting down presence monitor");
        self.ui_refresh.cancel();
        self.session.teardown();
        self.connection.teardown(&mut self.transport);
    }

    fn record(&mut self, category: LogCategory, content: impl Into<String>, at: DateTime<Utc>) {
        self.log_book.record(category, content, at);
        if let Some(record) = self.log_book.latest(category) {
            self.sink.apply(RenderInstruction::Log(record.clone()));
        }
    }

    fn backend_health(&self) -> BackendHealth {
        if self.connection.is_open() && !self.store.is_empty() {
            BackendHealth::Ok
        } else {
            BackendHealth::Unknown
        }
    }

    fn render_status(&mut self, now: Now) {
        let line = StatusLine {
            connection: self.connection.state(),
            backend_health: self.backend_health(),
            last_update: self.last_update,
            status_message: self.status_message.clone(),
            controls_enabled: self.connection.controls_enabled(),
            uptime: format_uptime(self.store.server_started_at(), now.wall),
            build: self.build.clone(),
        };
        self.sink.apply(RenderInstruction::StatusLine(line));
    }

    fn render_banner(&mut self) {
        self.sink
            .apply(RenderInstruction::Banner(self.connection.banner()));
    }

    fn render_full(&mut self) {
        self.sink
            .apply(RenderInstruction::FullRedraw(self.store.sorted()));
    }

    fn render_session(&mut self, now: Now) {
        let session = &self.session;
        let disconnected_for = (session.overlay_visible() || session.prompt_visible()).then(|| {
            format_elapsed(session.disconnected_for(now.wall, self.store.server_started_at()))
        });
        let view = SessionView {
            phase: session.phase(),
            overlay_visible: session.overlay_visible(),
            disconnected_for,
            prompt_error: session.prompt_error().map(str::to_string),
            two_factor_type: session.two_factor_type().map(str::to_string),
        };
        self.sink.apply(RenderInstruction::Session(view));
    }
}

/// Routes feed messages into the context for the duration of one frame
struct FeedHandler<'a, T, S, R> {
    ctx: &'a mut MonitorContext<T, S, R>,
    now: Now,
}

impl<T, S, R> MessageHandler for FeedHandler<'_, T, S, R>
where
    T: Transport,
    S: Scheduler,
    R: RenderSink,
{
    fn on_initial_state(
        &mut self,
        entities: Vec<EntityState>,
        server_started_at: Option<DateTime<Utc>>,
    ) {
        info!(count = entities.len(), "Received initial state");
        self.ctx.store.reset_all(entities, server_started_at);
        self.ctx.render_full();
    }

    fn on_user_update(&mut self, state: EntityState) {
        let previous = self.ctx.store.upsert(state.clone());
        let announcement = announce_change(previous.as_ref(), &state);

        match reconcile(previous.as_ref(), &state) {
            ReconcileDecision::FullRedraw => self.ctx.render_full(),
            ReconcileDecision::Patch { id, attributes } => {
                self.ctx
                    .sink
                    .apply(RenderInstruction::Patch { id, attributes });
            }
        }
        if let Some(announcement) = announcement {
            self.ctx
                .sink
                .apply(RenderInstruction::Announce(announcement));
        }
    }

    fn on_session_status(&mut self, status: SessionStatusPayload) {
        let ctx = &mut *self.ctx;
        let change =
            ctx.session
                .on_session_status(&status, ctx.connection.is_open(), &mut ctx.timers);
        match change {
            SessionChange::Restored { refresh } => {
                ctx.status_message = "Connected with active session".to_string();
                if refresh {
                    ctx.refresh(self.now);
                }
            }
            SessionChange::StillActive => {}
            SessionChange::Lost { .. } => {
                ctx.status_message = "No active session".to_string();
            }
        }
        ctx.render_session(self.now);
    }

    fn on_system(&mut self, system: SystemPayload) {
        if system.is_shutdown() {
            warn!("Server announced shutdown");
            self.ctx.connection.mark_shutting_down();
            self.ctx.status_message = "Server is shutting down...".to_string();
            self.ctx.render_banner();
        } else {
            warn!(action = ?system.action, "Ignoring unknown system action");
        }
    }

    fn on_log_entry(&mut self, entry: LogEntryPayload) {
        let Some(category) = entry
            .kind
            .as_deref()
            .and_then(LogCategory::from_server_kind)
        else {
            warn!(kind = ?entry.kind, "Unknown log entry type");
            return;
        };
        let timestamp = entry.timestamp().unwrap_or(self.now.wall);
        let content = entry.content.unwrap_or_default();
        self.ctx.record(category, content, timestamp);
    }

    fn on_server_error(&mut self, message: String) {
        warn!(message = %message, "Backend error");
        self.ctx.status_message = format!("Backend Error: {}", message);
    }
}
