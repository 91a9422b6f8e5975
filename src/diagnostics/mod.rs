// Bounded request/response log shown in the diagnostics panel

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum LogCategory {
    ClientRequest,
    ClientResponse,
    ServerRequest,
    ServerResponse,
}

impl LogCategory {
    pub const ALL: [LogCategory; 4] = [
        LogCategory::ClientRequest,
        LogCategory::ClientResponse,
        LogCategory::ServerRequest,
        LogCategory::ServerResponse,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LogCategory::ClientRequest => "client-request",
            LogCategory::ClientResponse => "client-response",
            LogCategory::ServerRequest => "server-request",
            LogCategory::ServerResponse => "server-response",
        }
    }

    /// Category of a server `LOG_ENTRY` by its `type` field
    pub fn from_server_kind(kind: &str) -> Option<Self> {
        match kind {
            "request" => Some(LogCategory::ServerRequest),
            "response" => Some(LogCategory::ServerResponse),
            _ => None,
        }
    }

    fn index(self) -> usize {
        match self {
            LogCategory::ClientRequest => 0,
            LogCategory::ClientResponse => 1,
            LogCategory::ServerRequest => 2,
            LogCategory::ServerResponse => 3,
        }
    }
}

impl fmt::Display for LogCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LogRecord {
    pub category: LogCategory,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// One ring buffer per category; the oldest entry is dropped when full
#[derive(Debug)]
pub struct LogBook {
    capacity: usize,
    buffers: [VecDeque<LogRecord>; 4],
}

impl LogBook {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            buffers: Default::default(),
        }
    }

    pub fn record(
        &mut self,
        category: LogCategory,
        content: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) {
        if self.capacity == 0 {
            return;
        }
        let buffer = &mut self.buffers[category.index()];
        while buffer.len() >= self.capacity {
            buffer.pop_front();
        }
        buffer.push_back(LogRecord {
            category,
            content: content.into(),
            timestamp,
        });
    }

    /// Oldest first
    pub fn entries(&self, category: LogCategory) -> impl Iterator<Item = &LogRecord> {
        self.buffers[category.index()].iter()
    }

    pub fn latest(&self, category: LogCategory) -> Option<&LogRecord> {
        self.buffers[category.index()].back()
    }

    pub fn len(&self, category: LogCategory) -> usize {
        self.buffers[category.index()].len()
    }

    pub fn clear(&mut self) {
        for buffer in &mut self.buffers {
            buffer.clear();
        }
    }
}
