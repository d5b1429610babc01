//! Storage seam for the booking engine.
//!
//! The ledger, pricing and record-store modules never talk to a database
//! directly. They run against a [`BookingTx`], the statement-level primitives
//! of one open unit of work, handed to them by a [`BookingStore`].

mod memory;
mod postgres;

pub use memory::{MemoryStore, MemoryTx};
pub use postgres::{run_migrations, DbPool, PgStore};

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use futures::future::BoxFuture;
use shared::*;

use crate::error::BookingResult;
use crate::reservations::ListFilter;

pub(crate) const RATES_EXIST: &str = "one or more rates for the given dates already exist";

/// Future returned by a unit-of-work closure; borrows the transaction handle.
pub type TxFuture<'c, T> = BoxFuture<'c, BookingResult<T>>;

#[async_trait]
pub trait BookingStore: Send + Sync + 'static {
    type Tx: BookingTx;

    /// Runs `work` inside one atomic unit of work.
    ///
    /// Commits when `work` returns `Ok`. Rolls back when it returns `Err` or
    /// when the store's deadline elapses first, in which case
    /// `BookingError::DeadlineExceeded` is returned. Nothing `work` did is
    /// visible to other units before the commit.
    async fn transaction<T, F>(&self, work: F) -> BookingResult<T>
    where
        T: Send,
        F: for<'c> FnOnce(&'c mut Self::Tx) -> TxFuture<'c, T> + Send;

    /// Runs `work` on a handle outside any transaction. For read-only
    /// projections; writes made here are not guaranteed to persist.
    async fn read<T, F>(&self, work: F) -> BookingResult<T>
    where
        T: Send,
        F: for<'c> FnOnce(&'c mut Self::Tx) -> TxFuture<'c, T> + Send;
}

/// Statement-level primitives available inside a unit of work.
///
/// Inventory writers report rows affected and never clamp or retry; the
/// ledger decides what a short count means.
#[async_trait]
pub trait BookingTx: Send {
    /// Rates for each priced night of `stay`, ordered by date.
    async fn nightly_rates(
        &mut self,
        tenant_id: TenantId,
        room_type_id: RoomTypeId,
        rate_plan_id: RatePlanId,
        stay: &StayRange,
    ) -> BookingResult<Vec<NightlyRate>>;

    /// Inserts all rates or none. A clash with an existing
    /// (tenant, room type, rate plan, date) row is `InvalidInput`.
    async fn insert_rates(
        &mut self,
        tenant_id: TenantId,
        room_type_id: RoomTypeId,
        rate_plan_id: RatePlanId,
        nightly: &[NightlyRate],
    ) -> BookingResult<usize>;

    /// Nights of `stay` whose cell has at least one unit left.
    async fn count_sellable_nights(
        &mut self,
        tenant_id: TenantId,
        room_type_id: RoomTypeId,
        stay: &StayRange,
    ) -> BookingResult<usize>;

    /// `available_units - 1` on every cell of `stay` that is still above zero.
    async fn decrement_units(
        &mut self,
        tenant_id: TenantId,
        room_type_id: RoomTypeId,
        stay: &StayRange,
    ) -> BookingResult<usize>;

    /// `available_units + 1` on every existing cell of `stay`.
    async fn increment_units(
        &mut self,
        tenant_id: TenantId,
        room_type_id: RoomTypeId,
        stay: &StayRange,
    ) -> BookingResult<usize>;

    async fn available_units(
        &mut self,
        tenant_id: TenantId,
        room_type_id: RoomTypeId,
        stay: &StayRange,
    ) -> BookingResult<BTreeMap<NaiveDate, i32>>;

    /// Sets every cell of `stay` to `units`, creating missing cells.
    async fn upsert_units(
        &mut self,
        tenant_id: TenantId,
        room_type_id: RoomTypeId,
        stay: &StayRange,
        units: i32,
    ) -> BookingResult<usize>;

    async fn insert_reservation(&mut self, reservation: &Reservation) -> BookingResult<()>;

    async fn find_reservation(
        &mut self,
        tenant_id: TenantId,
        reservation_id: ReservationId,
    ) -> BookingResult<Option<Reservation>>;

    /// Like `find_reservation`, but holds the row until the unit of work ends
    /// so a concurrent writer waits and then reads the committed version.
    async fn lock_reservation(
        &mut self,
        tenant_id: TenantId,
        reservation_id: ReservationId,
    ) -> BookingResult<Option<Reservation>>;

    /// Writes the mutable fields of `reservation` and sets
    /// `version = expected_version + 1`, only where the stored version is
    /// still `expected_version`. Returns rows affected.
    async fn update_reservation(
        &mut self,
        reservation: &Reservation,
        expected_version: i32,
    ) -> BookingResult<usize>;

    async fn list_reservations(
        &mut self,
        tenant_id: TenantId,
        filter: &ListFilter,
    ) -> BookingResult<Vec<Reservation>>;
}
