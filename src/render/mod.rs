// Render instructions and the sink that applies them

mod format;

pub use format::{format_elapsed, format_uptime, reconnect_text};

use crate::announce::Announcement;
use crate::connection::{ConnectionBanner, ConnectionState};
use crate::diagnostics::LogRecord;
use crate::entity::EntityId;
use crate::session::SessionPhase;
use crate::state::{DisplayEntry, RenderedAttributes};
use chrono::{DateTime, Utc};
use tracing::info;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendHealth {
    Ok,
    Unknown,
}

impl BackendHealth {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendHealth::Ok => "ok",
            BackendHealth::Unknown => "unknown",
        }
    }
}

/// Summary line above the dashboard
#[derive(Clone, Debug, PartialEq)]
pub struct StatusLine {
    pub connection: ConnectionState,
    pub backend_health: BackendHealth,
    pub last_update: Option<DateTime<Utc>>,
    pub status_message: String,
    pub controls_enabled: bool,
    pub uptime: String,
    pub build: Option<String>,
}

/// Session prompt / overlay state
#[derive(Clone, Debug, PartialEq)]
pub struct SessionView {
    pub phase: SessionPhase,
    pub overlay_visible: bool,
    /// `dd:hh:mm:ss`, present while the overlay or a prompt is visible
    pub disconnected_for: Option<String>,
    pub prompt_error: Option<String>,
    pub two_factor_type: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum RenderInstruction {
    /// Rebuild every sorted surface
    FullRedraw(Vec<DisplayEntry>),
    /// Update one entry in place
    Patch {
        id: EntityId,
        attributes: RenderedAttributes,
    },
    StatusLine(StatusLine),
    Banner(Option<ConnectionBanner>),
    Session(SessionView),
    Announce(Announcement),
    Log(LogRecord),
}

/// Rendering surface
pub trait RenderSink {
    fn apply(&mut self, instruction: RenderInstruction);
}

/// Writes every instruction as structured log output
#[derive(Debug, Default)]
pub struct TracingSink;

impl RenderSink for TracingSink {
    fn apply(&mut self, instruction: RenderInstruction) {
        match instruction {
            RenderInstruction::FullRedraw(entries) => {
                info!(count = entries.len(), "Dashboard redraw");
                for entry in &entries {
                    info!(
                        entity_id = %entry.id,
                        label = %entry.attributes.label,
                        category = %entry.attributes.category,
                        error = entry.attributes.error_message.as_deref().unwrap_or(""),
                        "  entry"
                    );
                }
            }
            RenderInstruction::Patch { id, attributes } => {
                info!(
                    entity_id = %id,
                    label = %attributes.label,
                    category = %attributes.category,
                    icon = %attributes.icon_url,
                    "Entry updated"
                );
            }
            RenderInstruction::StatusLine(line) => {
                info!(
                    connection = %line.connection,
                    backend = line.backend_health.as_str(),
                    last_update = %line
                        .last_update
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| "Never".to_string()),
                    uptime = %line.uptime,
                    controls = line.controls_enabled,
                    build = line.build.as_deref().unwrap_or("Unknown"),
                    "{}",
                    line.status_message
                );
            }
            RenderInstruction::Banner(None) => {
                info!("Connection banner cleared");
            }
            RenderInstruction::Banner(Some(ConnectionBanner::ShutdownNotice)) => {
                info!("Server Shutdown Initiated");
            }
            RenderInstruction::Banner(Some(ConnectionBanner::Unavailable(notice))) => {
                info!("Server Unavailable: {}", reconnect_text(notice));
            }
            RenderInstruction::Session(view) => {
                info!(
                    phase = ?view.phase,
                    overlay = view.overlay_visible,
                    disconnected_for = view.disconnected_for.as_deref().unwrap_or(""),
                    error = view.prompt_error.as_deref().unwrap_or(""),
                    two_factor_type = view.two_factor_type.as_deref().unwrap_or(""),
                    "Session"
                );
            }
            RenderInstruction::Announce(announcement) => {
                info!(volume = announcement.volume, "Announce: {}", announcement.text);
            }
            RenderInstruction::Log(record) => {
                info!(
                    category = %record.category,
                    timestamp = %record.timestamp.to_rfc3339(),
                    "{}",
                    record.content
                );
            }
        }
    }
}
