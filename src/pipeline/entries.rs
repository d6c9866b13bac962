//! Queue entry types for events, log lines and status notifications.

use std::fmt;

use bytes::Bytes;
use chrono::{Local, SecondsFormat};
use serde::Serialize;

use crate::adapter::AdapterId;

/// Current local time as an RFC 3339 string with millisecond precision.
pub fn timestamp() -> String {
    Local::now().to_rfc3339_opts(SecondsFormat::Millis, false)
}

/// Owned copy of one SoftDevice event as received from the link.
///
/// The transport's receive buffer is reused for the next packet, so the
/// pipeline copies the bytes before queueing them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord(Bytes);

impl EventRecord {
    /// Copy `data` into a new record.
    pub fn copy_from(data: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(data))
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[inline]
    pub fn into_bytes(self) -> Bytes {
        self.0
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Bytes> for EventRecord {
    fn from(bytes: Bytes) -> Self {
        Self(bytes)
    }
}

/// A queued SoftDevice event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventEntry {
    pub event: EventRecord,
    /// Time the I/O thread received the event.
    pub timestamp: String,
    /// Adapter the event arrived on.
    pub adapter_id: AdapterId,
}

/// Severity of a log line emitted by the transport stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogSeverity {
    Trace,
    Debug,
    Info,
    Warning,
    Error,
    Fatal,
}

impl LogSeverity {
    /// Map the numeric severity used on the wire.
    pub fn from_raw(value: u32) -> Option<Self> {
        Some(match value {
            0 => LogSeverity::Trace,
            1 => LogSeverity::Debug,
            2 => LogSeverity::Info,
            3 => LogSeverity::Warning,
            4 => LogSeverity::Error,
            5 => LogSeverity::Fatal,
            _ => return None,
        })
    }
}

impl fmt::Display for LogSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogSeverity::Trace => "trace",
            LogSeverity::Debug => "debug",
            LogSeverity::Info => "info",
            LogSeverity::Warning => "warning",
            LogSeverity::Error => "error",
            LogSeverity::Fatal => "fatal",
        };
        f.write_str(name)
    }
}

/// A queued log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub severity: LogSeverity,
    pub message: String,
}

/// Transport status reported to the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusCode {
    PktSendMaxRetriesReached,
    PktUnexpected,
    PktEncodeError,
    PktDecodeError,
    PktSendError,
    IoResourcesUnavailable,
    ResetPerformed,
    ConnectionActive,
}

impl StatusCode {
    /// Map the numeric status code used by the transport.
    pub fn from_raw(value: u32) -> Option<Self> {
        Some(match value {
            0 => StatusCode::PktSendMaxRetriesReached,
            1 => StatusCode::PktUnexpected,
            2 => StatusCode::PktEncodeError,
            3 => StatusCode::PktDecodeError,
            4 => StatusCode::PktSendError,
            5 => StatusCode::IoResourcesUnavailable,
            6 => StatusCode::ResetPerformed,
            7 => StatusCode::ConnectionActive,
            _ => return None,
        })
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatusCode::PktSendMaxRetriesReached => "PKT_SEND_MAX_RETRIES_REACHED",
            StatusCode::PktUnexpected => "PKT_UNEXPECTED",
            StatusCode::PktEncodeError => "PKT_ENCODE_ERROR",
            StatusCode::PktDecodeError => "PKT_DECODE_ERROR",
            StatusCode::PktSendError => "PKT_SEND_ERROR",
            StatusCode::IoResourcesUnavailable => "IO_RESOURCES_UNAVAILABLE",
            StatusCode::ResetPerformed => "RESET_PERFORMED",
            StatusCode::ConnectionActive => "CONNECTION_ACTIVE",
        };
        f.write_str(name)
    }
}

/// A queued status notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusEntry {
    pub id: StatusCode,
    pub message: String,
    pub timestamp: String,
}
