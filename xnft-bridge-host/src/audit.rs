//! Audit trail of capability use
//!
//! Hosts plug in an [`AuditSink`] to record which plugin touched storage,
//! asked for signatures, or opened windows.

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::io::Write;
use std::sync::{Mutex, PoisonError, RwLock};
use thiserror::Error;

use crate::approval::ApprovalKind;

/// ISO 8601 timestamp
pub type Timestamp = String;

fn now_iso8601() -> Timestamp {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// One recorded use of a capability
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub timestamp: Timestamp,
    pub event_type: AuditEventType,
    /// Plugin identity
    pub plugin: String,
    pub details: AuditDetails,
}

impl AuditEvent {
    pub fn new(event_type: AuditEventType, plugin: impl Into<String>, details: AuditDetails) -> Self {
        Self {
            timestamp: now_iso8601(),
            event_type,
            plugin: plugin.into(),
            details,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    ApprovalRequested,
    ApprovalGranted,
    ApprovalDenied,
    StorageRead,
    StorageWritten,
    WindowOpened,
    SessionMounted,
    SessionUnmounted,
    ContextActivated,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum AuditDetails {
    Approval {
        kind: ApprovalKind,
        public_key: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    Storage {
        key: String,
    },
    Window {
        url: String,
    },
    Lifecycle {
        url: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        context: Option<u64>,
    },
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Failed to serialize audit event: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Failed to write audit event: {0}")]
    Io(#[from] std::io::Error),
}

/// Destination for audit events
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent) -> Result<(), AuditError>;

    fn flush(&self) -> Result<(), AuditError> {
        Ok(())
    }
}

/// In-memory audit sink with FIFO eviction
pub struct MemoryAuditSink {
    events: RwLock<VecDeque<AuditEvent>>,
    max_events: usize,
}

impl MemoryAuditSink {
    /// Sink holding up to 1000 events
    pub fn new() -> Self {
        Self::with_capacity(1000)
    }

    pub fn with_capacity(max_events: usize) -> Self {
        Self {
            events: RwLock::new(VecDeque::with_capacity(max_events.min(1000))),
            max_events,
        }
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn count(&self) -> usize {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn clear(&self) {
        self.events
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn find_by_type(&self, event_type: AuditEventType) -> Vec<AuditEvent> {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }
}

impl Default for MemoryAuditSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        let mut events = self.events.write().unwrap_or_else(PoisonError::into_inner);
        if self.max_events == 0 {
            return Ok(());
        }
        if events.len() >= self.max_events {
            events.pop_front();
        }
        events.push_back(event);
        Ok(())
    }
}

impl fmt::Debug for MemoryAuditSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryAuditSink")
            .field("count", &self.count())
            .field("max_events", &self.max_events)
            .finish()
    }
}

/// Writes one JSON object per line to any writer (a log file, stderr)
pub struct JsonLinesAuditSink<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesAuditSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Recover the writer, e.g. to inspect what was written
    pub fn into_inner(self) -> W {
        self.writer.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W: Write + Send> AuditSink for JsonLinesAuditSink<W> {
    fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        let json = serde_json::to_string(&event)?;
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(writer, "{}", json)?;
        Ok(())
    }

    fn flush(&self) -> Result<(), AuditError> {
        self.writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .flush()?;
        Ok(())
    }
}

impl<W> fmt::Debug for JsonLinesAuditSink<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonLinesAuditSink").finish_non_exhaustive()
    }
}

/// Discards all events
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAuditSink;

impl AuditSink for NullAuditSink {
    fn record(&self, _event: AuditEvent) -> Result<(), AuditError> {
        Ok(())
    }
}

// ============================================================================
// Helper functions
// ============================================================================

pub fn approval_requested(plugin: &str, kind: ApprovalKind, public_key: &str) -> AuditEvent {
    AuditEvent::new(
        AuditEventType::ApprovalRequested,
        plugin,
        AuditDetails::Approval {
            kind,
            public_key: public_key.to_string(),
            reason: None,
        },
    )
}

pub fn approval_granted(plugin: &str, kind: ApprovalKind, public_key: &str) -> AuditEvent {
    AuditEvent::new(
        AuditEventType::ApprovalGranted,
        plugin,
        AuditDetails::Approval {
            kind,
            public_key: public_key.to_string(),
            reason: None,
        },
    )
}

pub fn approval_denied(
    plugin: &str,
    kind: ApprovalKind,
    public_key: &str,
    reason: &str,
) -> AuditEvent {
    AuditEvent::new(
        AuditEventType::ApprovalDenied,
        plugin,
        AuditDetails::Approval {
            kind,
            public_key: public_key.to_string(),
            reason: Some(reason.to_string()),
        },
    )
}

pub fn storage_read(plugin: &str, key: &str) -> AuditEvent {
    AuditEvent::new(
        AuditEventType::StorageRead,
        plugin,
        AuditDetails::Storage {
            key: key.to_string(),
        },
    )
}

pub fn storage_written(plugin: &str, key: &str) -> AuditEvent {
    AuditEvent::new(
        AuditEventType::StorageWritten,
        plugin,
        AuditDetails::Storage {
            key: key.to_string(),
        },
    )
}

pub fn window_opened(plugin: &str, url: &str) -> AuditEvent {
    AuditEvent::new(
        AuditEventType::WindowOpened,
        plugin,
        AuditDetails::Window {
            url: url.to_string(),
        },
    )
}

pub fn lifecycle(
    event_type: AuditEventType,
    plugin: &str,
    url: &str,
    context: Option<u64>,
) -> AuditEvent {
    AuditEvent::new(
        event_type,
        plugin,
        AuditDetails::Lifecycle {
            url: url.to_string(),
            context,
        },
    )
}
