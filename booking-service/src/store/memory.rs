use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use shared::*;
use tokio::sync::Mutex;

use super::{BookingStore, BookingTx, TxFuture, RATES_EXIST};
use crate::error::{BookingError, BookingResult};
use crate::reservations::ListFilter;

type CellKey = (TenantId, RoomTypeId, NaiveDate);
type RateKey = (TenantId, RoomTypeId, RatePlanId, NaiveDate);

fn cell_range(tenant_id: TenantId, room_type_id: RoomTypeId, stay: &StayRange) -> Range<CellKey> {
    (tenant_id, room_type_id, stay.start_date())..(tenant_id, room_type_id, stay.end_date())
}

#[derive(Debug, Clone, Default)]
struct Tables {
    inventory: BTreeMap<CellKey, i32>,
    rates: BTreeMap<RateKey, i64>,
    reservations: BTreeMap<ReservationId, Reservation>,
}

/// In-process store for tests and local runs.
///
/// A unit of work holds the store lock for its whole lifetime and mutates a
/// private copy of the tables; the copy replaces the committed tables only
/// when the work succeeds. Units are therefore serializable, and a failed or
/// timed-out unit leaves no trace.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    committed: Arc<Mutex<Tables>>,
    deadline: Duration,
}

/// Working copy of the tables seen by one unit of work.
#[derive(Debug)]
pub struct MemoryTx {
    tables: Tables,
}

impl MemoryStore {
    pub fn new(deadline: Duration) -> Self {
        Self {
            committed: Arc::new(Mutex::new(Tables::default())),
            deadline,
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl BookingStore for MemoryStore {
    type Tx = MemoryTx;

    async fn transaction<T, F>(&self, work: F) -> BookingResult<T>
    where
        T: Send,
        F: for<'c> FnOnce(&'c mut Self::Tx) -> TxFuture<'c, T> + Send,
    {
        let unit = async {
            let mut committed = self.committed.lock().await;
            let mut tx = MemoryTx { tables: committed.clone() };
            let value = work(&mut tx).await?;
            *committed = tx.tables;
            Ok(value)
        };

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
            let tables = self.committed.lock().await.clone();
            work(&mut MemoryTx { tables }).await
        };

        tokio::time::timeout(self.deadline, unit)
            .await
            .map_err(|_| BookingError::DeadlineExceeded(self.deadline))?
    }
}

impl MemoryTx {
    fn cells_mut(
        &mut self,
        tenant_id: TenantId,
        room_type_id: RoomTypeId,
        stay: &StayRange,
    ) -> impl Iterator<Item = &mut i32> {
        self.tables
            .inventory
            .range_mut(cell_range(tenant_id, room_type_id, stay))
            .map(|(_, units)| units)
    }
}

#[async_trait]
impl BookingTx for MemoryTx {
    async fn nightly_rates(
        &mut self,
        tenant_id: TenantId,
        room_type_id: RoomTypeId,
        rate_plan_id: RatePlanId,
        stay: &StayRange,
    ) -> BookingResult<Vec<NightlyRate>> {
        let from = (tenant_id, room_type_id, rate_plan_id, stay.start_date());
        let until = (tenant_id, room_type_id, rate_plan_id, stay.end_date());

        Ok(self
            .tables
            .rates
            .range(from..until)
            .map(|(&(_, _, _, date), &price_cents)| NightlyRate { date, price_cents })
            .collect())
    }

    async fn insert_rates(
        &mut self,
        tenant_id: TenantId,
        room_type_id: RoomTypeId,
        rate_plan_id: RatePlanId,
        nightly: &[NightlyRate],
    ) -> BookingResult<usize> {
        let key = |date| (tenant_id, room_type_id, rate_plan_id, date);
        if nightly.iter().any(|rate| self.tables.rates.contains_key(&key(rate.date))) {
            return Err(BookingError::invalid(RATES_EXIST));
        }

        for rate in nightly {
            self.tables.rates.insert(key(rate.date), rate.price_cents);
        }
        Ok(nightly.len())
    }

    async fn count_sellable_nights(
        &mut self,
        tenant_id: TenantId,
        room_type_id: RoomTypeId,
        stay: &StayRange,
    ) -> BookingResult<usize> {
        Ok(self
            .tables
            .inventory
            .range(cell_range(tenant_id, room_type_id, stay))
            .filter(|(_, units)| **units > 0)
            .count())
    }

    async fn decrement_units(
        &mut self,
        tenant_id: TenantId,
        room_type_id: RoomTypeId,
        stay: &StayRange,
    ) -> BookingResult<usize> {
        let mut claimed = 0;
        for units in self.cells_mut(tenant_id, room_type_id, stay) {
            if *units > 0 {
                *units -= 1;
                claimed += 1;
            }
        }
        Ok(claimed)
    }

    async fn increment_units(
        &mut self,
        tenant_id: TenantId,
        room_type_id: RoomTypeId,
        stay: &StayRange,
    ) -> BookingResult<usize> {
        let mut released = 0;
        for units in self.cells_mut(tenant_id, room_type_id, stay) {
            *units += 1;
            released += 1;
        }
        Ok(released)
    }

    async fn available_units(
        &mut self,
        tenant_id: TenantId,
        room_type_id: RoomTypeId,
        stay: &StayRange,
    ) -> BookingResult<BTreeMap<NaiveDate, i32>> {
        Ok(self
            .tables
            .inventory
            .range(cell_range(tenant_id, room_type_id, stay))
            .map(|(&(_, _, date), &units)| (date, units))
            .collect())
    }

    async fn upsert_units(
        &mut self,
        tenant_id: TenantId,
        room_type_id: RoomTypeId,
        stay: &StayRange,
        units: i32,
    ) -> BookingResult<usize> {
        for date in stay.dates() {
            self.tables.inventory.insert((tenant_id, room_type_id, date), units);
        }
        Ok(stay.nights())
    }

    async fn insert_reservation(&mut self, reservation: &Reservation) -> BookingResult<()> {
        if self.tables.reservations.contains_key(&reservation.id) {
            return Err(BookingError::storage(anyhow::anyhow!(
                "duplicate reservation id {}",
                reservation.id
            )));
        }
        self.tables.reservations.insert(reservation.id, reservation.clone());
        Ok(())
    }

    async fn find_reservation(
        &mut self,
        tenant_id: TenantId,
        reservation_id: ReservationId,
    ) -> BookingResult<Option<Reservation>> {
        Ok(self
            .tables
            .reservations
            .get(&reservation_id)
            .filter(|reservation| reservation.tenant_id == tenant_id)
            .cloned())
    }

    // Units of work already run one at a time.
    async fn lock_reservation(
        &mut self,
        tenant_id: TenantId,
        reservation_id: ReservationId,
    ) -> BookingResult<Option<Reservation>> {
        self.find_reservation(tenant_id, reservation_id).await
    }

    async fn update_reservation(
        &mut self,
        reservation: &Reservation,
        expected_version: i32,
    ) -> BookingResult<usize> {
        match self.tables.reservations.get_mut(&reservation.id) {
            Some(stored)
                if stored.tenant_id == reservation.tenant_id
                    && stored.version == expected_version =>
            {
                *stored = Reservation {
                    version: expected_version + 1,
                    ..reservation.clone()
                };
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn list_reservations(
        &mut self,
        tenant_id: TenantId,
        filter: &ListFilter,
    ) -> BookingResult<Vec<Reservation>> {
        let mut matching: Vec<Reservation> = self
            .tables
            .reservations
            .values()
            .filter(|reservation| reservation.tenant_id == tenant_id)
            .filter(|reservation| reservation.stay.overlaps(filter.from, filter.until))
            .cloned()
            .collect();
        matching.sort_by_key(|reservation| (reservation.stay.start_date(), reservation.id));

        Ok(matching
            .into_iter()
            .skip(usize::try_from(filter.offset()).unwrap_or(usize::MAX))
            .take(usize::try_from(filter.page_size).unwrap_or(0))
            .collect())
    }
}
