//! Reservation record store: persistence of reservations behind an
//! optimistic `version` guard.

use chrono::{NaiveDate, Utc};
use shared::*;
use tracing::debug;

use crate::error::{BookingError, BookingResult};
use crate::store::BookingTx;

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Overlap window and paging for [`list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListFilter {
    pub from: Option<NaiveDate>,
    pub until: Option<NaiveDate>,
    pub page: i64,
    pub page_size: i64,
}

impl ListFilter {
    pub fn new(
        from: Option<NaiveDate>,
        until: Option<NaiveDate>,
        page: Option<i64>,
        page_size: Option<i64>,
    ) -> BookingResult<Self> {
        let page = page.unwrap_or(DEFAULT_PAGE);
        let page_size = page_size.unwrap_or(DEFAULT_PAGE_SIZE);

        if page < 1 {
            return Err(BookingError::invalid("page must be greater than zero"));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&page_size) {
            return Err(BookingError::invalid(format!(
                "page_size must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }
        if (page - 1).checked_mul(page_size).is_none() {
            return Err(BookingError::invalid("page is out of range"));
        }
        if let (Some(from), Some(until)) = (from, until) {
            if until <= from {
                return Err(BookingError::invalid("end_date must be after start_date"));
            }
        }

        Ok(Self { from, until, page, page_size })
    }

    /// Rows to skip. Saturates instead of overflowing for filters built by hand.
    pub fn offset(&self) -> i64 {
        self.page.saturating_sub(1).saturating_mul(self.page_size).max(0)
    }
}

impl Default for ListFilter {
    fn default() -> Self {
        Self {
            from: None,
            until: None,
            page: DEFAULT_PAGE,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

pub async fn insert<T: BookingTx>(tx: &mut T, reservation: &Reservation) -> BookingResult<()> {
    tx.insert_reservation(reservation).await
}

/// Loads a reservation owned by `tenant_id`; anything else is `NotFound`.
pub async fn load<T: BookingTx>(
    tx: &mut T,
    tenant_id: TenantId,
    reservation_id: ReservationId,
) -> BookingResult<Reservation> {
    tx.find_reservation(tenant_id, reservation_id)
        .await?
        .ok_or(BookingError::NotFound)
}

/// [`load`] for a unit of work that is about to modify the reservation.
/// Concurrent modifiers queue behind the row lock, so the loser of a race
/// sees the winner's version and fails the version check.
pub async fn load_for_update<T: BookingTx>(
    tx: &mut T,
    tenant_id: TenantId,
    reservation_id: ReservationId,
) -> BookingResult<Reservation> {
    tx.lock_reservation(tenant_id, reservation_id)
        .await?
        .ok_or(BookingError::NotFound)
}

/// Writes `reservation` if the stored version still equals
/// `expected_version`, then bumps the in-memory copy to match.
pub async fn save_guarded<T: BookingTx>(
    tx: &mut T,
    reservation: &mut Reservation,
    expected_version: i32,
) -> BookingResult<()> {
    reservation.updated_at = Utc::now();

    let updated = tx.update_reservation(reservation, expected_version).await?;
    if updated == 0 {
        debug!(
            reservation_id = %reservation.id,
            expected_version,
            "Guarded write matched no row"
        );
        return Err(BookingError::EditConflict);
    }

    reservation.version = expected_version + 1;
    Ok(())
}

pub async fn list<T: BookingTx>(
    tx: &mut T,
    tenant_id: TenantId,
    filter: &ListFilter,
) -> BookingResult<Vec<Reservation>> {
    tx.list_reservations(tenant_id, filter).await
}
