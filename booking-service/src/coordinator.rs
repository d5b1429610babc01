//! Booking transaction coordinator.
//!
//! Every reservation write runs pricing, the inventory ledger and the record
//! store inside one unit of work on the configured [`BookingStore`], so a
//! failure at any step leaves neither a claimed night nor a half-written
//! reservation behind.

use std::collections::BTreeMap;

use chrono::{NaiveDate, Utc};
use shared::*;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{BookingError, BookingResult};
use crate::reservations::ListFilter;
use crate::store::BookingStore;
use crate::{ledger, pricing, reservations};

/// What happens to the stored total when an update changes the stay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RepricePolicy {
    /// Quote the new range and store its total.
    #[default]
    Recompute,
    /// Keep the total agreed at booking time.
    KeepOriginal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookingSettings {
    /// Status given to new reservations that do not ask for one.
    pub initial_status: ReservationStatus,
    pub reprice: RepricePolicy,
}

impl Default for BookingSettings {
    fn default() -> Self {
        Self {
            initial_status: ReservationStatus::Confirmed,
            reprice: RepricePolicy::Recompute,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewBooking {
    pub guest_id: GuestId,
    pub room_type_id: RoomTypeId,
    pub rate_plan_id: RatePlanId,
    pub stay: StayRange,
    pub occupancy: Occupancy,
    pub status: Option<ReservationStatus>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BookingChange {
    pub stay: StayRange,
    pub occupancy: Occupancy,
    pub expected_version: Option<i32>,
    pub notes: Option<String>,
}

impl TryFrom<CreateReservationRequest> for NewBooking {
    type Error = BookingError;

    fn try_from(request: CreateReservationRequest) -> Result<Self, Self::Error> {
        Ok(Self {
            stay: request.stay()?,
            occupancy: request.occupancy()?,
            guest_id: request.guest_id,
            room_type_id: request.room_type_id,
            rate_plan_id: request.rate_plan_id,
            status: request.status,
            notes: request.notes,
        })
    }
}

impl TryFrom<UpdateReservationRequest> for BookingChange {
    type Error = BookingError;

    fn try_from(request: UpdateReservationRequest) -> Result<Self, Self::Error> {
        Ok(Self {
            stay: request.stay()?,
            occupancy: request.occupancy()?,
            expected_version: request.version,
            notes: request.notes,
        })
    }
}

fn check_version(reservation: &Reservation, expected_version: Option<i32>) -> BookingResult<()> {
    match expected_version {
        Some(expected) if expected != reservation.version => Err(BookingError::EditConflict),
        _ => Ok(()),
    }
}

pub struct BookingCoordinator<S> {
    store: S,
    settings: BookingSettings,
}

impl<S: BookingStore> BookingCoordinator<S> {
    pub fn new(store: S, settings: BookingSettings) -> Self {
        Self { store, settings }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn settings(&self) -> BookingSettings {
        self.settings
    }

    pub async fn quote(
        &self,
        tenant_id: TenantId,
        room_type_id: RoomTypeId,
        rate_plan_id: RatePlanId,
        stay: StayRange,
    ) -> BookingResult<PriceQuote> {
        self.store
            .read(move |tx| {
                Box::pin(async move {
                    pricing::quote(tx, tenant_id, room_type_id, rate_plan_id, &stay).await
                })
            })
            .await
    }

    pub async fn check_availability(
        &self,
        tenant_id: TenantId,
        room_type_id: RoomTypeId,
        stay: StayRange,
    ) -> BookingResult<bool> {
        self.store
            .read(move |tx| {
                Box::pin(async move {
                    ledger::check_availability(tx, tenant_id, room_type_id, &stay).await
                })
            })
            .await
    }

    pub async fn get_availability(
        &self,
        tenant_id: TenantId,
        room_type_id: RoomTypeId,
        stay: StayRange,
    ) -> BookingResult<BTreeMap<NaiveDate, i32>> {
        self.store
            .read(move |tx| {
                Box::pin(async move {
                    ledger::get_availability(tx, tenant_id, room_type_id, &stay).await
                })
            })
            .await
    }

    pub async fn allocate_inventory(
        &self,
        tenant_id: TenantId,
        room_type_id: RoomTypeId,
        stay: StayRange,
        units: i32,
    ) -> BookingResult<usize> {
        let written = self
            .store
            .transaction(move |tx| {
                Box::pin(async move {
                    ledger::allocate(tx, tenant_id, room_type_id, &stay, units).await
                })
            })
            .await?;

        info!(%tenant_id, %room_type_id, %stay, units, "Inventory allocated");
        Ok(written)
    }

    pub async fn load_rates(
        &self,
        tenant_id: TenantId,
        room_type_id: RoomTypeId,
        rate_plan_id: RatePlanId,
        stay: StayRange,
        price_cents: i64,
    ) -> BookingResult<usize> {
        let inserted = self
            .store
            .transaction(move |tx| {
                Box::pin(async move {
                    pricing::load_rates(
                        tx,
                        tenant_id,
                        room_type_id,
                        rate_plan_id,
                        &stay,
                        price_cents,
                    )
                    .await
                })
            })
            .await?;

        info!(%tenant_id, %room_type_id, %rate_plan_id, %stay, inserted, "Rates loaded");
        Ok(inserted)
    }

    /// Prices, claims and records a new reservation in one unit of work.
    pub async fn create_reservation(
        &self,
        tenant_id: TenantId,
        booking: NewBooking,
    ) -> BookingResult<Reservation> {
        let status = booking.status.unwrap_or(self.settings.initial_status);
        if !status.is_initial() {
            return Err(BookingError::invalid(format!(
                "a new reservation cannot start as {}",
                status
            )));
        }

        let reservation = self
            .store
            .transaction(move |tx| {
                Box::pin(async move {
                    let quote = pricing::quote(
                        tx,
                        tenant_id,
                        booking.room_type_id,
                        booking.rate_plan_id,
                        &booking.stay,
                    )
                    .await?;

                    let (room_type_id, stay) = (booking.room_type_id, &booking.stay);
                    if !ledger::check_availability(tx, tenant_id, room_type_id, stay).await? {
                        return Err(BookingError::NotAvailable);
                    }
                    ledger::claim(tx, tenant_id, room_type_id, stay).await?;

                    let now = Utc::now();
                    let reservation = Reservation {
                        id: Uuid::new_v4(),
                        tenant_id,
                        guest_id: booking.guest_id,
                        room_type_id: booking.room_type_id,
                        rate_plan_id: booking.rate_plan_id,
                        stay: booking.stay,
                        occupancy: booking.occupancy,
                        status,
                        total_cost_cents: quote.total_cents,
                        notes: booking.notes,
                        version: 0,
                        created_at: now,
                        updated_at: now,
                    };
                    reservations::insert(tx, &reservation).await?;

                    Ok(reservation)
                })
            })
            .await
            .map_err(BookingError::surfaced)?;

        info!(
            %tenant_id,
            reservation_id = %reservation.id,
            room_type_id = %reservation.room_type_id,
            stay = %reservation.stay,
            total_cost_cents = reservation.total_cost_cents,
            "Reservation created"
        );
        Ok(reservation)
    }

    /// Moves a reservation to new dates and occupancy.
    ///
    /// The old nights are released and the new ones claimed in the same unit
    /// of work, so a failed claim also undoes the release.
    pub async fn update_reservation(
        &self,
        tenant_id: TenantId,
        reservation_id: ReservationId,
        change: BookingChange,
    ) -> BookingResult<Reservation> {
        let reprice = self.settings.reprice;

        let reservation = self
            .store
            .transaction(move |tx| {
                Box::pin(async move {
                    let mut reservation =
                        reservations::load_for_update(tx, tenant_id, reservation_id).await?;
                    if reservation.is_terminal() {
                        return Err(BookingError::transition(reservation.status, "be modified"));
                    }
                    check_version(&reservation, change.expected_version)?;

                    let expected_version = reservation.version;
                    let old_stay = reservation.stay;
                    let new_stay = change.stay;

                    if new_stay != old_stay {
                        if reprice == RepricePolicy::Recompute {
                            let quote = pricing::quote(
                                tx,
                                tenant_id,
                                reservation.room_type_id,
                                reservation.rate_plan_id,
                                &new_stay,
                            )
                            .await?;
                            reservation.total_cost_cents = quote.total_cents;
                        }

                        let room_type_id = reservation.room_type_id;
                        ledger::release(tx, tenant_id, room_type_id, &old_stay).await?;
                        let available =
                            ledger::check_availability(tx, tenant_id, room_type_id, &new_stay)
                                .await?;
                        if !available {
                            return Err(BookingError::NotAvailable);
                        }
                        ledger::claim(tx, tenant_id, room_type_id, &new_stay).await?;
                    }

                    reservation.stay = new_stay;
                    reservation.occupancy = change.occupancy;
                    if change.notes.is_some() {
                        reservation.notes = change.notes;
                    }
                    reservations::save_guarded(tx, &mut reservation, expected_version).await?;

                    Ok(reservation)
                })
            })
            .await
            .map_err(BookingError::surfaced)?;

        info!(
            %tenant_id,
            %reservation_id,
            stay = %reservation.stay,
            version = reservation.version,
            "Reservation updated"
        );
        Ok(reservation)
    }

    pub async fn cancel_reservation(
        &self,
        tenant_id: TenantId,
        reservation_id: ReservationId,
        expected_version: Option<i32>,
    ) -> BookingResult<Reservation> {
        let reservation = self
            .store
            .transaction(move |tx| {
                Box::pin(async move {
                    let mut reservation =
                        reservations::load_for_update(tx, tenant_id, reservation_id).await?;
                    if reservation.is_terminal() {
                        return Err(BookingError::transition(reservation.status, "be cancelled"));
                    }
                    check_version(&reservation, expected_version)?;

                    let version = reservation.version;
                    let (room_type_id, stay) = (reservation.room_type_id, reservation.stay);
                    ledger::release(tx, tenant_id, room_type_id, &stay).await?;

                    reservation.status = ReservationStatus::Cancelled;
                    reservations::save_guarded(tx, &mut reservation, version).await?;

                    Ok(reservation)
                })
            })
            .await
            .map_err(BookingError::surfaced)?;

        info!(%tenant_id, %reservation_id, "Reservation cancelled");
        Ok(reservation)
    }

    /// Front-desk status changes. Inventory is untouched; cancellation goes
    /// through [`Self::cancel_reservation`] instead.
    pub async fn transition_status(
        &self,
        tenant_id: TenantId,
        reservation_id: ReservationId,
        target: ReservationStatus,
        expected_version: Option<i32>,
    ) -> BookingResult<Reservation> {
        if target == ReservationStatus::Cancelled {
            return self
                .cancel_reservation(tenant_id, reservation_id, expected_version)
                .await;
        }

        let reservation = self
            .store
            .transaction(move |tx| {
                Box::pin(async move {
                    let mut reservation =
                        reservations::load_for_update(tx, tenant_id, reservation_id).await?;
                    if !reservation.status.can_transition_to(target) {
                        return Err(BookingError::transition(
                            reservation.status,
                            format!("move to {}", target),
                        ));
                    }
                    check_version(&reservation, expected_version)?;

                    let version = reservation.version;
                    reservation.status = target;
                    reservations::save_guarded(tx, &mut reservation, version).await?;

                    Ok(reservation)
                })
            })
            .await?;

        info!(
            %tenant_id,
            %reservation_id,
            status = %reservation.status,
            "Reservation status changed"
        );
        Ok(reservation)
    }

    pub async fn get_reservation(
        &self,
        tenant_id: TenantId,
        reservation_id: ReservationId,
    ) -> BookingResult<Reservation> {
        self.store
            .read(move |tx| {
                Box::pin(async move { reservations::load(tx, tenant_id, reservation_id).await })
            })
            .await
    }

    pub async fn list_reservations(
        &self,
        tenant_id: TenantId,
        filter: ListFilter,
    ) -> BookingResult<Vec<Reservation>> {
        let listed = self
            .store
            .read(move |tx| {
                Box::pin(async move { reservations::list(tx, tenant_id, &filter).await })
            })
            .await?;

        debug!(%tenant_id, count = listed.len(), "Reservations listed");
        Ok(listed)
    }
}
