//! Errors raised by the command-line host.

use thiserror::Error;
use waymark_scheduler::ServiceError;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("journal I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt journal: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("invalid listener parameter {0:?}, expected key=value")]
    InvalidParam(String),
}

impl HostError {
    /// Report this error as a failure of the named service.
    pub fn into_service_error(self, service: &'static str) -> ServiceError {
        ServiceError::new(service, self.to_string())
    }
}
