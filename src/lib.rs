// Entity snapshots and wire contract
pub mod entity;

// Display category classification
pub mod classify;

// Tracked entities, display order and reconciliation
pub mod state;

// Feed envelope parsing and outbound frames
pub mod protocol;

// Message routing
pub mod dispatch;

// Owned, cancellable timers
pub mod timer;

// Feed connection lifecycle and reconnect backoff
pub mod connection;

// Upstream session, login and 2FA
pub mod session;

// Spoken status change notices
pub mod announce;

// Request/response log book
pub mod diagnostics;

// Render instructions and sinks
pub mod render;

// Configuration loading
pub mod config;

// Application context and event loop
pub mod app;
