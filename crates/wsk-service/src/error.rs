use thiserror::Error;
use wsk_db::GatewayError;
use wsk_orders::{TransitionError, ValidationError};
use wsk_reconcile::PaymentError;

/// Errors surfaced by [`OrderService`](crate::OrderService) commands.
///
/// Only `Transient` may leave a command partially applied; repeating the
/// command converges.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),
    #[error("invalid transition: {0}")]
    InvalidTransition(String),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },
    #[error("transient failure: {0}")]
    Transient(String),
}

impl From<ValidationError> for ServiceError {
    fn from(e: ValidationError) -> Self {
        ServiceError::Validation(e.to_string())
    }
}

impl From<TransitionError> for ServiceError {
    fn from(e: TransitionError) -> Self {
        match e {
            TransitionError::UnpaidDelivery => ServiceError::PreconditionFailed(e.to_string()),
            TransitionError::Terminal { .. } => ServiceError::InvalidTransition(e.to_string()),
        }
    }
}

impl From<PaymentError> for ServiceError {
    fn from(e: PaymentError) -> Self {
        ServiceError::PreconditionFailed(e.to_string())
    }
}

impl From<GatewayError> for ServiceError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::NotFound { entity, id } => ServiceError::NotFound { entity, id },
            other => ServiceError::Transient(other.to_string()),
        }
    }
}
