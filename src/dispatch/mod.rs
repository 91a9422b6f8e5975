use crate::entity::EntityState;
use crate::protocol::{
    InboundMessage, LogEntryPayload, MessageType, ProtocolError, SessionStatusPayload,
    SystemPayload,
};
use chrono::{DateTime, Utc};
use tracing::{debug, error, warn};


/// Receiver of routed feed messages, one method per handled type
pub trait MessageHandler {
    /// Full reset of the tracked entity set
    fn on_initial_state(
        &mut self,
        entities: Vec<EntityState>,
        server_started_at: Option<DateTime<Utc>>,
    );

    /// Single-entity upsert
    fn on_user_update(&mut self, state: EntityState);

    fn on_session_status(&mut self, status: SessionStatusPayload);

    fn on_system(&mut self, system: SystemPayload);

    fn on_log_entry(&mut self, entry: LogEntryPayload);

    /// Server-reported failure, surfaced as a status message
    fn on_server_error(&mut self, message: String);
}

/// What happened to one inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Routed(MessageType),
    Unhandled(MessageType),
    Unknown(Option<String>),
    Rejected(ProtocolError),
}

/// Parse one text frame and route it by type.
///
/// Never fails: protocol faults and unrecognized types are logged and the
/// frame is dropped.
pub fn dispatch(raw: &str, handler: &mut impl MessageHandler) -> DispatchOutcome {
    let message = match InboundMessage::parse(raw) {
        Ok(message) => message,
        Err(e) => {
            error!(error = %e, "Failed to parse feed message, discarding");
            return DispatchOutcome::Rejected(e);
        }
    };

    match message {
        InboundMessage::InitialState {
            entities,
            server_started_at,
        } => {
            debug!(entities = entities.len(), "Routing INITIAL_STATE");
            handler.on_initial_state(entities, server_started_at);
            DispatchOutcome::Routed(MessageType::InitialState)
        }
        InboundMessage::UserUpdate(state) => {
            debug!(entity_id = %state.id, "Routing USER_UPDATE");
            handler.on_user_update(state);
            DispatchOutcome::Routed(MessageType::UserUpdate)
        }
        InboundMessage::SessionStatus(status) => {
            handler.on_session_status(status);
            DispatchOutcome::Routed(MessageType::SessionStatus)
        }
        InboundMessage::System(system) => {
            handler.on_system(system);
            DispatchOutcome::Routed(MessageType::System)
        }
        InboundMessage::LogEntry(entry) => {
            handler.on_log_entry(entry);
            DispatchOutcome::Routed(MessageType::LogEntry)
        }
        InboundMessage::Error(payload) => {
            let message = payload.message.unwrap_or_else(|| "Unknown".to_string());
            error!(message = %message, "Backend reported an error");
            handler.on_server_error(message);
            DispatchOutcome::Routed(MessageType::Error)
        }
        InboundMessage::Unhandled(message_type) => {
            warn!(message_type = %message_type, "Received valid but unhandled message type");
            DispatchOutcome::Unhandled(message_type)
        }
        InboundMessage::Unknown(message_type) => {
            error!(
                message_type = message_type.as_deref().unwrap_or("<missing>"),
                "Received unknown message type"
            );
            DispatchOutcome::Unknown(message_type)
        }
    }
}
