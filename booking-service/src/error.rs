//! Error kinds surfaced by the booking engine.

use std::time::Duration;

use diesel_async::pooled_connection::PoolError;
use shared::{InputError, ReservationStatus};
use thiserror::Error;

pub type BookingResult<T> = Result<T, BookingError>;

#[derive(Debug, Error)]
pub enum BookingError {
    #[error("a price is not available for one or more nights in the requested date range")]
    PriceNotAvailable,

    #[error("the selected room type is not available for the given dates")]
    NotAvailable,

    /// Fewer inventory cells were decremented than the stay has nights.
    /// Never leaves the coordinator; callers see `NotAvailable`.
    #[error("claimed {claimed} of {expected} nights, potential race condition")]
    RaceDetected { expected: usize, claimed: usize },

    #[error("the requested reservation could not be found")]
    NotFound,

    #[error("a {from} reservation cannot {attempted}")]
    InvalidStateTransition {
        from: ReservationStatus,
        attempted: String,
    },

    #[error("edit conflict: reservation has been modified by another user")]
    EditConflict,

    #[error("{0}")]
    InvalidInput(String),

    #[error("unit of work exceeded its {0:?} deadline")]
    DeadlineExceeded(Duration),

    #[error("storage failure: {0}")]
    Storage(#[source] anyhow::Error),
}

impl BookingError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn transition(from: ReservationStatus, attempted: impl Into<String>) -> Self {
        Self::InvalidStateTransition {
            from,
            attempted: attempted.into(),
        }
    }

    pub fn storage(err: impl Into<anyhow::Error>) -> Self {
        Self::Storage(err.into())
    }

    /// Storage and deadline failures. Everything else is a typed business outcome.
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, BookingError::Storage(_) | BookingError::DeadlineExceeded(_))
    }

    /// Maps internal signals onto the kinds callers are promised.
    pub fn surfaced(self) -> Self {
        match self {
            BookingError::RaceDetected { .. } => BookingError::NotAvailable,
            other => other,
        }
    }
}

impl From<InputError> for BookingError {
    fn from(err: InputError) -> Self {
        BookingError::InvalidInput(err.to_string())
    }
}

impl From<diesel::result::Error> for BookingError {
    fn from(err: diesel::result::Error) -> Self {
        BookingError::Storage(err.into())
    }
}

impl From<bb8::RunError<PoolError>> for BookingError {
    fn from(err: bb8::RunError<PoolError>) -> Self {
        BookingError::Storage(anyhow::anyhow!("failed to get a database connection: {}", err))
    }
}
