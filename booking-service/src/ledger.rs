//! Inventory ledger: the only writer of per-night inventory counters.
//!
//! Every mutation is a single conditional statement followed by a
//! rows-affected check, run on the caller's unit of work.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use shared::*;
use tracing::{debug, warn};

use crate::error::{BookingError, BookingResult};
use crate::store::BookingTx;

/// True only when every night of `stay` has at least one unit left.
pub async fn check_availability<T: BookingTx>(
    tx: &mut T,
    tenant_id: TenantId,
    room_type_id: RoomTypeId,
    stay: &StayRange,
) -> BookingResult<bool> {
    let sellable = tx.count_sellable_nights(tenant_id, room_type_id, stay).await?;
    Ok(sellable == stay.nights())
}

/// Takes one unit from every night of `stay`.
///
/// The decrement is guarded by `available_units > 0`, so a cell sold out
/// between the availability check and this call is skipped rather than driven
/// negative. A short count is reported as `RaceDetected` and the caller must
/// abort its unit of work, undoing the cells that were decremented.
pub async fn claim<T: BookingTx>(
    tx: &mut T,
    tenant_id: TenantId,
    room_type_id: RoomTypeId,
    stay: &StayRange,
) -> BookingResult<()> {
    let expected = stay.nights();
    let claimed = tx.decrement_units(tenant_id, room_type_id, stay).await?;

    if claimed != expected {
        warn!(
            %tenant_id,
            %room_type_id,
            %stay,
            expected,
            claimed,
            "Inventory claim came up short, potential race condition"
        );
        return Err(BookingError::RaceDetected { expected, claimed });
    }

    debug!(%tenant_id, %room_type_id, %stay, "Inventory claimed");
    Ok(())
}

/// Gives one unit back to every night of `stay`. Not idempotent.
pub async fn release<T: BookingTx>(
    tx: &mut T,
    tenant_id: TenantId,
    room_type_id: RoomTypeId,
    stay: &StayRange,
) -> BookingResult<()> {
    let expected = stay.nights();
    let released = tx.increment_units(tenant_id, room_type_id, stay).await?;

    if released != expected {
        warn!(
            %tenant_id,
            %room_type_id,
            %stay,
            expected,
            released,
            "Released fewer nights than the stay spans"
        );
    }

    debug!(%tenant_id, %room_type_id, %stay, "Inventory released");
    Ok(())
}

/// Units left per night. Nights without an inventory cell are absent.
pub async fn get_availability<T: BookingTx>(
    tx: &mut T,
    tenant_id: TenantId,
    room_type_id: RoomTypeId,
    stay: &StayRange,
) -> BookingResult<BTreeMap<NaiveDate, i32>> {
    tx.available_units(tenant_id, room_type_id, stay).await
}

pub async fn allocate<T: BookingTx>(
    tx: &mut T,
    tenant_id: TenantId,
    room_type_id: RoomTypeId,
    stay: &StayRange,
    units: i32,
) -> BookingResult<usize> {
    if units < 0 {
        return Err(BookingError::invalid("available_units must not be negative"));
    }
    tx.upsert_units(tenant_id, room_type_id, stay, units).await
}
