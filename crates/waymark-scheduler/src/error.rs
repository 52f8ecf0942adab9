//! Error types for the scheduler.

use thiserror::Error;

/// Errors that can occur in scheduler operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Reading or writing the reminder store failed.
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The reminder store holds content that cannot be decoded.
    #[error("corrupt reminder store: {0}")]
    Corrupt(#[from] serde_json::Error),

    /// The reminder store was written by an incompatible version.
    #[error("unsupported reminder store version: {0}")]
    UnsupportedVersion(u32),

    /// Location access has not been granted.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The alarm or region-monitoring service rejected a request.
    #[error("external service failure: {0}")]
    ExternalService(#[from] ServiceError),

    /// Reminder id is empty or otherwise unusable.
    #[error("invalid reminder id: {0:?}")]
    InvalidId(String),

    /// Hour, minute or second out of range.
    #[error("invalid time of day: {0}")]
    InvalidTimeOfDay(String),

    /// Day name not recognised.
    #[error("invalid day of week: {0}")]
    InvalidDayOfWeek(String),
}

impl SchedulerError {
    /// Whether this error came from the persistent store.
    pub fn is_storage_failure(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::Corrupt(_) | Self::UnsupportedVersion(_)
        )
    }
}

/// A request rejected by an external alarm or region-monitoring service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{service}: {message}")]
pub struct ServiceError {
    pub service: &'static str,
    pub message: String,
}

impl ServiceError {
    pub fn new(service: &'static str, message: impl Into<String>) -> Self {
        Self {
            service,
            message: message.into(),
        }
    }
}
