//! Pricing engine. Quotes are all-or-nothing: a stay with any unpriced night
//! has no price.

use shared::*;

use crate::error::{BookingError, BookingResult};
use crate::store::BookingTx;

pub async fn quote<T: BookingTx>(
    tx: &mut T,
    tenant_id: TenantId,
    room_type_id: RoomTypeId,
    rate_plan_id: RatePlanId,
    stay: &StayRange,
) -> BookingResult<PriceQuote> {
    let nightly = tx.nightly_rates(tenant_id, room_type_id, rate_plan_id, stay).await?;
    price_nights(stay, nightly)
}

/// Builds a quote from one rate per night of `stay`, or fails if any night
/// is missing.
pub fn price_nights(stay: &StayRange, nightly: Vec<NightlyRate>) -> BookingResult<PriceQuote> {
    let covered = nightly.len() == stay.nights()
        && nightly.iter().zip(stay.dates()).all(|(rate, date)| rate.date == date);

    if !covered {
        return Err(BookingError::PriceNotAvailable);
    }
    PriceQuote::new(nightly).ok_or_else(|| BookingError::invalid("total price is too large"))
}

/// One rate at `price_cents` for every night of `stay`.
pub fn rate_sheet(stay: &StayRange, price_cents: i64) -> BookingResult<Vec<NightlyRate>> {
    if price_cents < 0 {
        return Err(BookingError::invalid("price_cents must not be negative"));
    }
    Ok(stay
        .dates()
        .map(|date| NightlyRate { date, price_cents })
        .collect())
}

pub async fn load_rates<T: BookingTx>(
    tx: &mut T,
    tenant_id: TenantId,
    room_type_id: RoomTypeId,
    rate_plan_id: RatePlanId,
    stay: &StayRange,
    price_cents: i64,
) -> BookingResult<usize> {
    let sheet = rate_sheet(stay, price_cents)?;
    tx.insert_rates(tenant_id, room_type_id, rate_plan_id, &sheet).await
}
