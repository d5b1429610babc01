use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    CheckedIn,
    CheckedOut,
    Cancelled,
    NoShow,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown reservation status: {0}")]
pub struct UnknownStatus(pub String);

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "PENDING",
            ReservationStatus::Confirmed => "CONFIRMED",
            ReservationStatus::CheckedIn => "CHECKED_IN",
            ReservationStatus::CheckedOut => "CHECKED_OUT",
            ReservationStatus::Cancelled => "CANCELLED",
            ReservationStatus::NoShow => "NO_SHOW",
        }
    }

    /// Terminal reservations accept no further inventory-affecting mutation.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReservationStatus::CheckedOut | ReservationStatus::Cancelled | ReservationStatus::NoShow
        )
    }

    /// States a new reservation may start in.
    pub fn is_initial(&self) -> bool {
        matches!(self, ReservationStatus::Pending | ReservationStatus::Confirmed)
    }

    pub fn can_transition_to(&self, target: ReservationStatus) -> bool {
        use ReservationStatus::*;

        match (self, target) {
            (from, Cancelled) => !from.is_terminal(),
            (Pending, Confirmed) => true,
            (Confirmed, CheckedIn) | (Confirmed, NoShow) => true,
            (CheckedIn, CheckedOut) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReservationStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(ReservationStatus::Pending),
            "CONFIRMED" => Ok(ReservationStatus::Confirmed),
            "CHECKED_IN" => Ok(ReservationStatus::CheckedIn),
            "CHECKED_OUT" => Ok(ReservationStatus::CheckedOut),
            "CANCELLED" => Ok(ReservationStatus::Cancelled),
            "NO_SHOW" => Ok(ReservationStatus::NoShow),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}
