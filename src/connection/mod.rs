// Connection lifecycle: open/close handling, reconnect backoff, shutdown grace

mod schedule;
pub mod transport;


pub use schedule::{ReconnectSchedule, ReconnectTrigger};
pub use transport::{ConnectionId, Transport, TransportEvent, WsTransport};

use crate::config::ReconnectConfig;
use crate::protocol::{OutboundFrame, ServerCommand};
use crate::timer::{Scheduler, TimerFired, TimerKind, TimerSlot};
use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Connection state shown in the status line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
    Error,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Open => "Open",
            ConnectionState::Closed => "Closed",
            ConnectionState::Error => "Error",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reconnect progress shown under the "Server Unavailable" banner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectNotice {
    /// Seconds left until the next attempt (rounded up)
    In(u64),
    /// Countdown reached zero
    Imminent,
}

/// Banner covering the dashboard while the feed is down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionBanner {
    /// Server announced shutdown
    ShutdownNotice,
    /// Server unreachable, reconnecting
    Unavailable(ReconnectNotice),
}

/// Result of handling a close event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    /// Event from a superseded connection
    Stale,
    /// Server was shutting down; waiting before showing the banner
    GracePeriod(Duration),
    /// Ordinary drop; one direct retry
    Retry(Duration),
    /// Attempt failed; backoff with countdown
    Backoff(Duration),
}

/// Result of handling a connection timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerOutcome {
    Ignored,
    Reconnecting(ConnectionId),
    CountdownUpdated(ReconnectNotice),
    /// Grace expired: banner shown and backoff armed
    BackoffScheduled(Duration),
}

/// Owns the single feed connection and every timer tied to it
#[derive(Debug)]
pub struct ConnectionManager {
    config: ReconnectConfig,
    state: ConnectionState,
    shutting_down: bool,
    controls_enabled: bool,
    schedule: ReconnectSchedule,
    grace: TimerSlot,
    current: Option<ConnectionId>,
    reached_open: bool,
    banner: Option<ConnectionBanner>,
}

impl ConnectionManager {
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            schedule: ReconnectSchedule::new(&config),
            config,
            state: ConnectionState::Closed,
            shutting_down: false,
            controls_enabled: false,
            grace: TimerSlot::new(),
            current: None,
            reached_open: false,
            banner: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down
    }

    pub fn controls_enabled(&self) -> bool {
        self.controls_enabled
    }

    pub fn attempts(&self) -> u32 {
        self.schedule.attempts()
    }

    pub fn banner(&self) -> Option<ConnectionBanner> {
        self.banner
    }

    pub fn current(&self) -> Option<ConnectionId> {
        self.current
    }

    /// True while a reconnect timer is armed
    pub fn reconnect_pending(&self) -> bool {
        self.schedule.has_pending()
    }

    /// Open a new connection. Cancels the pending reconnect, countdown and grace timers.
    pub fn connect(&mut self, transport: &mut dyn Transport) -> ConnectionId {
        self.schedule.cancel();
        self.grace.cancel();
        self.state = ConnectionState::Connecting;
        self.reached_open = false;
        let id = transport.open();
        self.current = Some(id);
        id
    }

    fn is_current(&self, id: ConnectionId) -> bool {
        self.current == Some(id)
    }

    /// Connection established: reset backoff, clear shutdown, request a snapshot.
    /// Returns false for a stale connection.
    pub fn on_open(&mut self, id: ConnectionId, transport: &mut dyn Transport) -> bool {
        if !self.is_current(id) {
            debug!(connection_id = %id, "Ignoring open from superseded connection");
            return false;
        }
        info!(connection_id = %id, attempts = self.schedule.attempts(), "Connected to feed");
        self.state = ConnectionState::Open;
        self.reached_open = true;
        self.schedule.reset();
        self.grace.cancel();
        self.shutting_down = false;
        self.controls_enabled = true;
        self.banner = None;
        if let Err(e) = transport.send(OutboundFrame::Refresh) {
            warn!(error = %e, "Failed to request initial state");
        }
        true
    }

    /// Transport error: only recorded; the close that follows drives reconnection
    pub fn on_error(&mut self, id: ConnectionId, error: &str) -> bool {
        if !self.is_current(id) {
            return false;
        }
        warn!(connection_id = %id, error = %error, "Feed connection error");
        self.state = ConnectionState::Error;
        true
    }

    pub fn on_close(
        &mut self,
        id: ConnectionId,
        code: u16,
        reason: &str,
        timers: &mut dyn Scheduler,
        now: Instant,
    ) -> CloseOutcome {
        if !self.is_current(id) {
            debug!(connection_id = %id, "Ignoring close from superseded connection");
            return CloseOutcome::Stale;
        }
        info!(connection_id = %id, code, reason = %reason, "Feed connection closed");
        self.state = ConnectionState::Closed;
        self.current = None;
        self.controls_enabled = false;

        if self.shutting_down {
            let grace = self.config.shutdown_grace();
            self.schedule.cancel();
            self.grace
                .arm(timers.after(TimerKind::ShutdownGrace, grace));
            // A failed retry after the grace keeps the unavailable banner
            if !matches!(self.banner, Some(ConnectionBanner::Unavailable(_))) {
                self.banner = Some(ConnectionBanner::ShutdownNotice);
            }
            CloseOutcome::GracePeriod(grace)
        } else if self.reached_open {
            let delay = self.config.close_retry();
            self.schedule.schedule_retry(timers, delay);
            CloseOutcome::Retry(delay)
        } else {
            CloseOutcome::Backoff(self.schedule_reconnect(timers, now))
        }
    }

    /// Arm the backoff timer and countdown, and show the unavailable banner
    pub fn schedule_reconnect(&mut self, timers: &mut dyn Scheduler, now: Instant) -> Duration {
        let delay = self.schedule.schedule_backoff(timers, now);
        self.banner = Some(ConnectionBanner::Unavailable(notice_for(delay)));
        info!(
            delay_ms = delay.as_millis() as u64,
            attempts = self.schedule.attempts(),
            "Scheduled reconnect"
        );
        delay
    }

    /// Timer firing for `Reconnect`, `CountdownTick` or `ShutdownGrace`
    pub fn on_timer(
        &mut self,
        fired: TimerFired,
        transport: &mut dyn Transport,
        timers: &mut dyn Scheduler,
        now: Instant,
    ) -> TimerOutcome {
        match fired.kind {
            TimerKind::Reconnect => match self.schedule.take_expired(fired.token) {
                Some(trigger) => {
                    info!(trigger = ?trigger, "Attempting reconnection");
                    TimerOutcome::Reconnecting(self.connect(transport))
                }
                None => TimerOutcome::Ignored,
            },
            TimerKind::CountdownTick => {
                if !self.schedule.is_countdown_tick(fired.token) {
                    return TimerOutcome::Ignored;
                }
                let remaining = self.schedule.remaining(now).unwrap_or(Duration::ZERO);
                let notice = notice_for(remaining);
                if notice == ReconnectNotice::Imminent {
                    self.schedule.stop_countdown();
                }
                self.banner = Some(ConnectionBanner::Unavailable(notice));
                TimerOutcome::CountdownUpdated(notice)
            }
            TimerKind::ShutdownGrace => {
                if !self.grace.take_fired(fired.token) {
                    return TimerOutcome::Ignored;
                }
                TimerOutcome::BackoffScheduled(self.schedule_reconnect(timers, now))
            }
            TimerKind::SessionClock | TimerKind::UiRefresh => TimerOutcome::Ignored,
        }
    }

    /// User-requested immediate retry; forgets previous failures
    pub fn retry_now(&mut self, transport: &mut dyn Transport) -> ConnectionId {
        info!("Manual reconnect requested");
        self.schedule.reset();
        self.connect(transport)
    }

    /// Server is going away: disable controls until the next open
    pub fn mark_shutting_down(&mut self) {
        self.shutting_down = true;
        self.controls_enabled = false;
        self.banner = Some(ConnectionBanner::ShutdownNotice);
    }

    fn ensure_actionable(&self) -> Result<()> {
        if !self.is_open() {
            bail!("Not connected to the feed server");
        }
        if !self.controls_enabled {
            bail!("Feed server is shutting down");
        }
        Ok(())
    }

    /// Ask the server to shut down. Only sent while open and not already shutting down.
    pub fn request_shutdown(&mut self, transport: &mut dyn Transport) -> Result<()> {
        self.ensure_actionable()?;
        transport
            .send(OutboundFrame::Command(ServerCommand::Shutdown))
            .context("Failed to send shutdown command")?;
        self.shutting_down = true;
        self.controls_enabled = false;
        Ok(())
    }

    /// Ask the server for a fresh snapshot
    pub fn send_refresh(&mut self, transport: &mut dyn Transport) -> Result<()> {
        self.ensure_actionable()?;
        transport
            .send(OutboundFrame::Refresh)
            .context("Failed to send refresh")
    }

    /// Cancel every timer and close the transport
    pub fn teardown(&mut self, transport: &mut dyn Transport) {
        self.schedule.cancel();
        self.grace.cancel();
        transport.close();
        self.current = None;
        self.state = ConnectionState::Closed;
        self.controls_enabled = false;
    }
}

fn notice_for(remaining: Duration) -> ReconnectNotice {
    let secs = (remaining.as_millis() as u64).div_ceil(1000);
    if secs == 0 {
        ReconnectNotice::Imminent
    } else {
        ReconnectNotice::In(secs)
    }
}
