use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use shared::*;
use uuid::Uuid;

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::inventory_levels)]
pub struct NewInventoryLevel {
    pub tenant_id: Uuid,
    pub room_type_id: Uuid,
    pub date: NaiveDate,
    pub available_units: i32,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::rates)]
pub struct NewRate {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub room_type_id: Uuid,
    pub rate_plan_id: Uuid,
    pub date: NaiveDate,
    pub price_cents: i64,
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = crate::schema::reservations)]
pub struct DbReservation {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub guest_id: Uuid,
    pub room_type_id: Uuid,
    pub rate_plan_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub num_adults: i32,
    pub num_children: i32,
    pub status: String,
    pub total_cost_cents: i64,
    pub notes: Option<String>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NewInventoryLevel {
    pub fn for_stay(
        tenant_id: TenantId,
        room_type_id: RoomTypeId,
        stay: &StayRange,
        available_units: i32,
    ) -> Vec<Self> {
        let updated_at = Utc::now();
        stay.dates()
            .map(|date| Self { tenant_id, room_type_id, date, available_units, updated_at })
            .collect()
    }
}

impl NewRate {
    pub fn from_nightly(
        tenant_id: TenantId,
        room_type_id: RoomTypeId,
        rate_plan_id: RatePlanId,
        rate: &NightlyRate,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            room_type_id,
            rate_plan_id,
            date: rate.date,
            price_cents: rate.price_cents,
        }
    }
}

impl From<&Reservation> for DbReservation {
    fn from(reservation: &Reservation) -> Self {
        Self {
            id: reservation.id,
            tenant_id: reservation.tenant_id,
            guest_id: reservation.guest_id,
            room_type_id: reservation.room_type_id,
            rate_plan_id: reservation.rate_plan_id,
            start_date: reservation.stay.start_date(),
            end_date: reservation.stay.end_date(),
            num_adults: reservation.occupancy.num_adults,
            num_children: reservation.occupancy.num_children,
            status: reservation.status.as_str().to_string(),
            total_cost_cents: reservation.total_cost_cents,
            notes: reservation.notes.clone(),
            version: reservation.version,
            created_at: reservation.created_at,
            updated_at: reservation.updated_at,
        }
    }
}

impl TryFrom<DbReservation> for Reservation {
    type Error = anyhow::Error;

    fn try_from(row: DbReservation) -> Result<Self, Self::Error> {
        let stay = StayRange::new(row.start_date, row.end_date)
            .map_err(|e| anyhow::anyhow!("reservation {} has a corrupt stay: {}", row.id, e))?;
        let status = row.status.parse::<ReservationStatus>()?;

        Ok(Self {
            id: row.id,
            tenant_id: row.tenant_id,
            guest_id: row.guest_id,
            room_type_id: row.room_type_id,
            rate_plan_id: row.rate_plan_id,
            stay,
            occupancy: Occupancy {
                num_adults: row.num_adults,
                num_children: row.num_children,
            },
            status,
            total_cost_cents: row.total_cost_cents,
            notes: row.notes,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
