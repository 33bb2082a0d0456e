use thiserror::Error;

use super::pdu::PduType;

/// Errors that can occur while opening a source, encoding PDUs, or driving a
/// capture session.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("device error: {0}")]
    Device(#[from] DeviceError),

    #[error("capture file error: {0}")]
    File(#[from] FileError),

    #[error("encoding failed: {0}")]
    Encoding(#[from] EncodingError),

    /// A second fill was requested while one is still running on the session.
    #[error("a fill is already in progress on this session")]
    FillInProgress,

    #[error("session is closed")]
    SessionClosed,

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),
}

/// Live interface failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("no such device: {0}")]
    NotFound(String),

    #[error("device i/o: {0}")]
    Io(String),
}

/// Capture file failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FileError {
    #[error("file not found: {0}")]
    NotFound(String),

    #[error("invalid capture format: {0}")]
    InvalidFormat(String),

    #[error("file i/o: {0}")]
    Io(String),
}

/// A PDU could not be serialized under its schema.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodingError {
    #[error("no schema registered for pdu type {0}")]
    UnknownSchema(PduType),

    #[error("record {record}: expected {expected} fields, found {found}")]
    FieldCount {
        record: String,
        expected: usize,
        found: usize,
    },

    #[error("record {record}, field {field}: expected {expected}, found {found}")]
    FieldType {
        record: String,
        field: String,
        expected: String,
        found: String,
    },

    #[error("record {record}, field {field}: fixed size {expected}, found {found} bytes")]
    FixedSize {
        record: String,
        field: String,
        expected: usize,
        found: usize,
    },
}

impl CaptureError {
    /// Whether the fill was refused before touching the source or buffer.
    pub fn is_admission_error(&self) -> bool {
        matches!(self, Self::FillInProgress | Self::SessionClosed)
    }
}
