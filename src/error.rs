//! Error taxonomy shared by the cart, lifecycle, stores and service layers.

use thiserror::Error;

use crate::models::OrderStatus;

pub type PosResult<T> = Result<T, PosError>;

#[derive(Debug, Error)]
pub enum PosError {
    /// Checkout attempted with no cart lines.
    #[error("cannot place an order from an empty cart")]
    EmptyCart,

    /// Status change requested from a state that does not permit it.
    #[error("order {order_id} cannot move from {from} to {to}")]
    InvalidTransition {
        order_id: String,
        from: OrderStatus,
        to: OrderStatus,
    },

    #[error("order not found: {0}")]
    OrderNotFound(String),

    #[error("menu item not found: {0}")]
    MenuItemNotFound(String),

    /// Input rejected before any write happened.
    #[error("invalid input: {0}")]
    Validation(String),

    /// The backing store or notification channel failed.
    #[error("provider error: {message}")]
    Provider { message: String, transient: bool },
}

impl PosError {
    pub fn provider(message: impl Into<String>) -> Self {
        PosError::Provider {
            message: message.into(),
            transient: false,
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        PosError::Provider {
            message: message.into(),
            transient: true,
        }
    }

    /// Only transient provider failures are worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PosError::Provider {
                transient: true,
                ..
            }
        )
    }
}

impl From<rusqlite::Error> for PosError {
    fn from(err: rusqlite::Error) -> Self {
        let transient = matches!(
            err.sqlite_error_code(),
            Some(rusqlite::ErrorCode::DatabaseBusy) | Some(rusqlite::ErrorCode::DatabaseLocked)
        );
        PosError::Provider {
            message: format!("sqlite: {err}"),
            transient,
        }
    }
}

impl From<std::io::Error> for PosError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        let transient = matches!(
            err.kind(),
            ErrorKind::Interrupted | ErrorKind::TimedOut | ErrorKind::WouldBlock
        );
        PosError::Provider {
            message: format!("io: {err}"),
            transient,
        }
    }
}

impl From<serde_json::Error> for PosError {
    fn from(err: serde_json::Error) -> Self {
        PosError::provider(format!("json: {err}"))
    }
}
