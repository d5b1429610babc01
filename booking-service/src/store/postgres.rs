use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::upsert::excluded;
use diesel_async::pooled_connection::bb8::Pool;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use shared::*;
use tracing::info;

use super::{BookingStore, BookingTx, TxFuture, RATES_EXIST};
use crate::error::{BookingError, BookingResult};
use crate::models::*;
use crate::reservations::ListFilter;
use crate::schema::*;

pub type DbPool = Pool<AsyncPgConnection>;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Applies pending migrations over a blocking connection.
pub fn run_migrations(database_url: &str) -> anyhow::Result<()> {
    let mut conn = diesel::PgConnection::establish(database_url)?;
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|e| anyhow::anyhow!("Migration error: {}", e))?;
    Ok(())
}

/// Postgres-backed store. Units of work are database transactions; the
/// claim and guarded-update statements rely on row locks taken by `UPDATE`.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
    deadline: Duration,
}

impl PgStore {
    pub fn new(pool: DbPool, deadline: Duration) -> Self {
        Self { pool, deadline }
    }

    pub async fn connect(
        database_url: &str,
        max_size: u32,
        deadline: Duration,
    ) -> anyhow::Result<Self> {
        let config = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
        let pool = Pool::builder()
            .max_size(max_size)
            .connection_timeout(deadline)
            .build(config)
            .await?;
        info!(max_size, "Postgres connection pool ready");
        Ok(Self::new(pool, deadline))
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl BookingStore for PgStore {
    type Tx = AsyncPgConnection;

    async fn transaction<T, F>(&self, work: F) -> BookingResult<T>
    where
        T: Send,
        F: for<'c> FnOnce(&'c mut Self::Tx) -> TxFuture<'c, T> + Send,
    {
        let unit = async {
            let mut conn = self.pool.get().await?;
            conn.transaction::<T, BookingError, _>(|conn| Box::pin(async move { work(conn).await }))
                .await
        };

        // A dropped transaction leaves the connection mid-transaction; the pool
        // discards such connections, which rolls the work back server-side.
        tokio::time::timeout(self.deadline, unit)
            .await
            .map_err(|_| BookingError::DeadlineExceeded(self.deadline))?
    }

    async fn read<T, F>(&self, work: F) -> BookingResult<T>
    where
        T: Send,
        F: for<'c> FnOnce(&'c mut Self::Tx) -> TxFuture<'c, T> + Send,
    {
        let unit = async {
            let mut conn = self.pool.get().await?;
            work(&mut *conn).await
        };

        tokio::time::timeout(self.deadline, unit)
            .await
            .map_err(|_| BookingError::DeadlineExceeded(self.deadline))?
    }
}

#[async_trait]
impl BookingTx for AsyncPgConnection {
    async fn nightly_rates(
        &mut self,
        tenant_id: TenantId,
        room_type_id: RoomTypeId,
        rate_plan_id: RatePlanId,
        stay: &StayRange,
    ) -> BookingResult<Vec<NightlyRate>> {
        let rows = rates::table
            .filter(rates::tenant_id.eq(tenant_id))
            .filter(rates::room_type_id.eq(room_type_id))
            .filter(rates::rate_plan_id.eq(rate_plan_id))
            .filter(rates::date.ge(stay.start_date()))
            .filter(rates::date.lt(stay.end_date()))
            .order(rates::date.asc())
            .select((rates::date, rates::price_cents))
            .load::<(NaiveDate, i64)>(self)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(date, price_cents)| NightlyRate { date, price_cents })
            .collect())
    }

    async fn insert_rates(
        &mut self,
        tenant_id: TenantId,
        room_type_id: RoomTypeId,
        rate_plan_id: RatePlanId,
        nightly: &[NightlyRate],
    ) -> BookingResult<usize> {
        let new_rates: Vec<NewRate> = nightly
            .iter()
            .map(|rate| NewRate::from_nightly(tenant_id, room_type_id, rate_plan_id, rate))
            .collect();

        diesel::insert_into(rates::table)
            .values(&new_rates)
            .execute(self)
            .await
            .map_err(|e| match e {
                DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                    BookingError::invalid(RATES_EXIST)
                }
                other => other.into(),
            })
    }

    async fn count_sellable_nights(
        &mut self,
        tenant_id: TenantId,
        room_type_id: RoomTypeId,
        stay: &StayRange,
    ) -> BookingResult<usize> {
        let count = inventory_levels::table
            .filter(inventory_levels::tenant_id.eq(tenant_id))
            .filter(inventory_levels::room_type_id.eq(room_type_id))
            .filter(inventory_levels::date.ge(stay.start_date()))
            .filter(inventory_levels::date.lt(stay.end_date()))
            .filter(inventory_levels::available_units.gt(0))
            .count()
            .get_result::<i64>(self)
            .await?;

        Ok(count as usize)
    }

    async fn decrement_units(
        &mut self,
        tenant_id: TenantId,
        room_type_id: RoomTypeId,
        stay: &StayRange,
    ) -> BookingResult<usize> {
        let claimed = diesel::update(
            inventory_levels::table
                .filter(inventory_levels::tenant_id.eq(tenant_id))
                .filter(inventory_levels::room_type_id.eq(room_type_id))
                .filter(inventory_levels::date.ge(stay.start_date()))
                .filter(inventory_levels::date.lt(stay.end_date()))
                .filter(inventory_levels::available_units.gt(0)),
        )
        .set((
            inventory_levels::available_units.eq(inventory_levels::available_units - 1),
            inventory_levels::updated_at.eq(Utc::now()),
        ))
        .execute(self)
        .await?;

        Ok(claimed)
    }

    async fn increment_units(
        &mut self,
        tenant_id: TenantId,
        room_type_id: RoomTypeId,
        stay: &StayRange,
    ) -> BookingResult<usize> {
        let released = diesel::update(
            inventory_levels::table
                .filter(inventory_levels::tenant_id.eq(tenant_id))
                .filter(inventory_levels::room_type_id.eq(room_type_id))
                .filter(inventory_levels::date.ge(stay.start_date()))
                .filter(inventory_levels::date.lt(stay.end_date())),
        )
        .set((
            inventory_levels::available_units.eq(inventory_levels::available_units + 1),
            inventory_levels::updated_at.eq(Utc::now()),
        ))
        .execute(self)
        .await?;

        Ok(released)
    }

    async fn available_units(
        &mut self,
        tenant_id: TenantId,
        room_type_id: RoomTypeId,
        stay: &StayRange,
    ) -> BookingResult<BTreeMap<NaiveDate, i32>> {
        let rows = inventory_levels::table
            .filter(inventory_levels::tenant_id.eq(tenant_id))
            .filter(inventory_levels::room_type_id.eq(room_type_id))
            .filter(inventory_levels::date.ge(stay.start_date()))
            .filter(inventory_levels::date.lt(stay.end_date()))
            .select((inventory_levels::date, inventory_levels::available_units))
            .load::<(NaiveDate, i32)>(self)
            .await?;

        Ok(rows.into_iter().collect())
    }

    async fn upsert_units(
        &mut self,
        tenant_id: TenantId,
        room_type_id: RoomTypeId,
        stay: &StayRange,
        units: i32,
    ) -> BookingResult<usize> {
        let levels = NewInventoryLevel::for_stay(tenant_id, room_type_id, stay, units);

        let written = diesel::insert_into(inventory_levels::table)
            .values(&levels)
            .on_conflict((
                inventory_levels::tenant_id,
                inventory_levels::room_type_id,
                inventory_levels::date,
            ))
            .do_update()
            .set((
                inventory_levels::available_units.eq(excluded(inventory_levels::available_units)),
                inventory_levels::updated_at.eq(excluded(inventory_levels::updated_at)),
            ))
            .execute(self)
            .await?;

        Ok(written)
    }

    async fn insert_reservation(&mut self, reservation: &Reservation) -> BookingResult<()> {
        diesel::insert_into(reservations::table)
            .values(DbReservation::from(reservation))
            .execute(self)
            .await?;
        Ok(())
    }

    async fn find_reservation(
        &mut self,
        tenant_id: TenantId,
        reservation_id: ReservationId,
    ) -> BookingResult<Option<Reservation>> {
        let row = reservations::table
            .filter(reservations::id.eq(reservation_id))
            .filter(reservations::tenant_id.eq(tenant_id))
            .first::<DbReservation>(self)
            .await
            .optional()?;

        row.map(Reservation::try_from)
            .transpose()
            .map_err(BookingError::Storage)
    }

    async fn lock_reservation(
        &mut self,
        tenant_id: TenantId,
        reservation_id: ReservationId,
    ) -> BookingResult<Option<Reservation>> {
        let row = reservations::table
            .filter(reservations::id.eq(reservation_id))
            .filter(reservations::tenant_id.eq(tenant_id))
            .for_update()
            .first::<DbReservation>(self)
            .await
            .optional()?;

        row.map(Reservation::try_from)
            .transpose()
            .map_err(BookingError::Storage)
    }

    async fn update_reservation(
        &mut self,
        reservation: &Reservation,
        expected_version: i32,
    ) -> BookingResult<usize> {
        let updated = diesel::update(
            reservations::table
                .filter(reservations::id.eq(reservation.id))
                .filter(reservations::tenant_id.eq(reservation.tenant_id))
                .filter(reservations::version.eq(expected_version)),
        )
        .set((
            reservations::start_date.eq(reservation.stay.start_date()),
            reservations::end_date.eq(reservation.stay.end_date()),
            reservations::num_adults.eq(reservation.occupancy.num_adults),
            reservations::num_children.eq(reservation.occupancy.num_children),
            reservations::status.eq(reservation.status.as_str()),
            reservations::total_cost_cents.eq(reservation.total_cost_cents),
            reservations::notes.eq(reservation.notes.as_deref()),
            reservations::updated_at.eq(reservation.updated_at),
            reservations::version.eq(expected_version + 1),
        ))
        .execute(self)
        .await?;

        Ok(updated)
    }

    async fn list_reservations(
        &mut self,
        tenant_id: TenantId,
        filter: &ListFilter,
    ) -> BookingResult<Vec<Reservation>> {
        let mut query = reservations::table
            .filter(reservations::tenant_id.eq(tenant_id))
            .into_boxed();

        if let Some(from) = filter.from {
            query = query.filter(reservations::end_date.gt(from));
        }
        if let Some(until) = filter.until {
            query = query.filter(reservations::start_date.lt(until));
        }

        let rows = query
            .order((reservations::start_date.asc(), reservations::id.asc()))
            .limit(filter.page_size)
            .offset(filter.offset())
            .load::<DbReservation>(self)
            .await?;

        rows.into_iter()
            .map(|row| Reservation::try_from(row).map_err(BookingError::Storage))
            .collect()
    }
}
