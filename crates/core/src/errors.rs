use thiserror::Error;

use crate::domain::associate::AssociateId;
use crate::domain::customer::CustomerId;
use crate::domain::quote::QuoteId;
use crate::domain::settlement::SettlementReplyError;
use crate::flows::FlowTransitionError;
use crate::ports::{GatewayError, StoreError};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    FlowTransition(#[from] FlowTransitionError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("customer {0} does not exist in the customer directory")]
    UnknownCustomer(CustomerId),
    #[error("associate {actor} does not own quote {quote_id}")]
    NotOwner { actor: AssociateId, quote_id: QuoteId },
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

/// Stable classification shared by every outer surface (HTTP bodies, CLI payloads, logs).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    NotFound,
    InvalidStateTransition,
    Unauthorized,
    Forbidden,
    Conflict,
    ConcurrentModification,
    ExternalSystem,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation_error",
            Self::NotFound => "not_found",
            Self::InvalidStateTransition => "invalid_state_transition",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::Conflict => "conflict",
            Self::ConcurrentModification => "concurrent_modification",
            Self::ExternalSystem => "external_system_error",
            Self::Internal => "internal_error",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("{entity} {id} was not found")]
    NotFound { entity: &'static str, id: String },
    #[error("invalid credentials")]
    Unauthorized,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("quote {0} was modified concurrently")]
    ConcurrentModification(QuoteId),
    #[error("external system failure: {0}")]
    ExternalSystem(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl ApplicationError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound { entity, id: id.to_string() }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Domain(DomainError::Validation(_)) => ErrorKind::Validation,
            Self::Domain(DomainError::FlowTransition(_))
            | Self::Domain(DomainError::UnknownCustomer(_)) => ErrorKind::InvalidStateTransition,
            Self::Domain(DomainError::NotOwner { .. }) => ErrorKind::Forbidden,
            Self::Domain(DomainError::InvariantViolation(_)) => ErrorKind::Internal,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Unauthorized => ErrorKind::Unauthorized,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::ConcurrentModification(_) => ErrorKind::ConcurrentModification,
            Self::ExternalSystem(_) => ErrorKind::ExternalSystem,
            Self::Persistence(_) | Self::Configuration(_) => ErrorKind::Internal,
        }
    }

    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let kind = self.kind();
        let message = self.to_string();
        let correlation_id = correlation_id.into();
        match kind {
            ErrorKind::Validation | ErrorKind::InvalidStateTransition => {
                InterfaceError::BadRequest { kind, message, correlation_id }
            }
            ErrorKind::NotFound => InterfaceError::NotFound { kind, message, correlation_id },
            ErrorKind::Unauthorized => {
                InterfaceError::Unauthorized { kind, message, correlation_id }
            }
            ErrorKind::Forbidden => InterfaceError::Forbidden { kind, message, correlation_id },
            ErrorKind::Conflict | ErrorKind::ConcurrentModification => {
                InterfaceError::Conflict { kind, message, correlation_id }
            }
            ErrorKind::ExternalSystem => {
                InterfaceError::BadGateway { kind, message, correlation_id }
            }
            ErrorKind::Internal => InterfaceError::Internal { kind, message, correlation_id },
        }
    }
}

impl From<StoreError> for ApplicationError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict(quote_id) => Self::ConcurrentModification(quote_id),
            StoreError::AssociateHasQuotes(associate_id) => {
                Self::Conflict(format!("associate {associate_id} still owns quotes"))
            }
            StoreError::DuplicateLogin(login) => {
                Self::Conflict(format!("login `{login}` is already taken"))
            }
            StoreError::Backend(message) => Self::Persistence(message),
        }
    }
}

impl From<GatewayError> for ApplicationError {
    fn from(value: GatewayError) -> Self {
        Self::ExternalSystem(value.to_string())
    }
}

impl From<SettlementReplyError> for ApplicationError {
    fn from(value: SettlementReplyError) -> Self {
        Self::ExternalSystem(value.to_string())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { kind: ErrorKind, message: String, correlation_id: String },
    #[error("unauthorized: {message}")]
    Unauthorized { kind: ErrorKind, message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { kind: ErrorKind, message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { kind: ErrorKind, message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { kind: ErrorKind, message: String, correlation_id: String },
    #[error("bad gateway: {message}")]
    BadGateway { kind: ErrorKind, message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { kind: ErrorKind, message: String, correlation_id: String },
}

impl InterfaceError {
    fn parts(&self) -> (ErrorKind, &str, &str) {
        match self {
            Self::BadRequest { kind, message, correlation_id }
            | Self::Unauthorized { kind, message, correlation_id }
            | Self::Forbidden { kind, message, correlation_id }
            | Self::NotFound { kind, message, correlation_id }
            | Self::Conflict { kind, message, correlation_id }
            | Self::BadGateway { kind, message, correlation_id }
            | Self::Internal { kind, message, correlation_id } => (*kind, message, correlation_id),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.parts().0
    }

    pub fn correlation_id(&self) -> &str {
        self.parts().2
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest { kind: ErrorKind::InvalidStateTransition, .. } => 409,
            Self::BadRequest { .. } => 400,
            Self::Unauthorized { .. } => 401,
            Self::Forbidden { .. } => 403,
            Self::NotFound { .. } => 404,
            Self::Conflict { .. } => 409,
            Self::BadGateway { .. } => 502,
            Self::Internal { .. } => 500,
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::Unauthorized { .. } => "The supplied credentials were not accepted.",
            Self::Forbidden { .. } => "You are not allowed to act on this quote.",
            Self::NotFound { .. } => "The requested record does not exist.",
            Self::Conflict { .. } => "The record changed while processing. Reload and retry.",
            Self::BadGateway { .. } => {
                "The settlement system did not accept the order. Nothing was changed."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    /// Message safe to hand to a client. Internal details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            Self::Internal { .. } => self.user_message().to_string(),
            other => other.parts().1.to_string(),
        }
    }
}
