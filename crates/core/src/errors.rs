use thiserror::Error;

use crate::domain::session::SessionState;
use crate::session::SessionFault;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid session transition from {from} to {to}")]
    InvalidSessionTransition { from: SessionState, to: SessionState },
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Session(#[from] SessionFault),
    #[error("session not found: {0}")]
    SessionNotFound(String),
    #[error("user not found: {0}")]
    UserNotFound(String),
    #[error("product not found: {0}")]
    ProductNotFound(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let unassigned = || "unassigned".to_owned();
        match value {
            ApplicationError::Domain(DomainError::InvariantViolation(_)) => Self::BadRequest {
                message: "domain validation failed".to_owned(),
                correlation_id: unassigned(),
            },
            ApplicationError::SessionNotFound(id) => Self::BadRequest {
                message: format!("unknown session `{id}`"),
                correlation_id: unassigned(),
            },
            ApplicationError::UserNotFound(id) => Self::BadRequest {
                message: format!("unknown user `{id}`"),
                correlation_id: unassigned(),
            },
            ApplicationError::ProductNotFound(id) => Self::BadRequest {
                message: format!("unknown product `{id}`"),
                correlation_id: unassigned(),
            },
            ApplicationError::Persistence(message) => {
                Self::ServiceUnavailable { message, correlation_id: unassigned() }
            }
            // Unsupported operations and impossible transitions are bugs, not user errors.
            ApplicationError::Domain(error @ DomainError::InvalidSessionTransition { .. }) => {
                Self::Internal { message: error.to_string(), correlation_id: unassigned() }
            }
            ApplicationError::Session(fault) => {
                Self::Internal { message: fault.to_string(), correlation_id: unassigned() }
            }
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: unassigned() }
            }
        }
    }
}
