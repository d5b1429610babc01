use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

mod stay;
mod status;

pub use stay::{parse_date, InputError, Occupancy, StayRange, DATE_FORMAT, MAX_NIGHTS};
pub use status::{ReservationStatus, UnknownStatus};

pub type TenantId = Uuid;
pub type RoomTypeId = Uuid;
pub type RatePlanId = Uuid;
pub type GuestId = Uuid;
pub type ReservationId = Uuid;

/// Every price in the system is expressed in minor units of this currency.
pub const CURRENCY: &str = "USD";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    #[serde(skip)]
    pub tenant_id: TenantId,
    pub guest_id: GuestId,
    pub room_type_id: RoomTypeId,
    pub rate_plan_id: RatePlanId,
    #[serde(flatten)]
    pub stay: StayRange,
    #[serde(flatten)]
    pub occupancy: Occupancy,
    pub status: ReservationStatus,
    pub total_cost_cents: i64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub notes: Option<String>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NightlyRate {
    pub date: NaiveDate,
    pub price_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub total_cents: i64,
    pub nightly_rates: Vec<NightlyRate>,
    pub currency: String,
    pub number_of_nights: usize,
}

// Request bodies. Dates stay as strings until the request layer parses them.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateReservationRequest {
    pub guest_id: GuestId,
    pub room_type_id: RoomTypeId,
    pub rate_plan_id: RatePlanId,
    pub start_date: String,
    pub end_date: String,
    pub num_adults: i32,
    #[serde(default)]
    pub num_children: i32,
    #[serde(default)]
    pub status: Option<ReservationStatus>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateReservationRequest {
    pub start_date: String,
    pub end_date: String,
    pub num_adults: i32,
    #[serde(default)]
    pub num_children: i32,
    #[serde(default)]
    pub version: Option<i32>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CancelReservationRequest {
    #[serde(default)]
    pub version: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionStatusRequest {
    pub status: ReservationStatus,
    #[serde(default)]
    pub version: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRatesRequest {
    pub room_type_id: RoomTypeId,
    pub rate_plan_id: RatePlanId,
    pub start_date: String,
    pub end_date: String,
    pub price_cents: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocateInventoryRequest {
    pub room_type_id: RoomTypeId,
    pub start_date: String,
    pub end_date: String,
    pub available_units: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteQuery {
    pub room_type_id: RoomTypeId,
    pub rate_plan_id: RatePlanId,
    pub start_date: String,
    pub end_date: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityQuery {
    pub room_type_id: RoomTypeId,
    pub start_date: String,
    pub end_date: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListReservationsQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

// Response envelopes.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationEnvelope {
    pub reservation: Reservation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationListEnvelope {
    pub reservations: Vec<Reservation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteEnvelope {
    pub price_quote: PriceQuote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityEnvelope {
    pub availability: BTreeMap<NaiveDate, i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordsWritten {
    pub message: String,
    pub records: usize,
}

impl CreateReservationRequest {
    pub fn stay(&self) -> Result<StayRange, InputError> {
        StayRange::parse(&self.start_date, &self.end_date)
    }

    pub fn occupancy(&self) -> Result<Occupancy, InputError> {
        Occupancy::new(self.num_adults, self.num_children)
    }
}

impl UpdateReservationRequest {
    pub fn stay(&self) -> Result<StayRange, InputError> {
        StayRange::parse(&self.start_date, &self.end_date)
    }

    pub fn occupancy(&self) -> Result<Occupancy, InputError> {
        Occupancy::new(self.num_adults, self.num_children)
    }
}

impl Reservation {
    pub fn nights(&self) -> usize {
        self.stay.nights()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

impl PriceQuote {
    /// `None` when the total does not fit in an `i64` of cents.
    pub fn new(nightly_rates: Vec<NightlyRate>) -> Option<Self> {
        let total_cents = nightly_rates
            .iter()
            .try_fold(0i64, |total, rate| total.checked_add(rate.price_cents))?;

        Some(Self {
            total_cents,
            number_of_nights: nightly_rates.len(),
            nightly_rates,
            currency: CURRENCY.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_reservation() -> Reservation {
        let now = Utc::now();
        Reservation {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            guest_id: Uuid::new_v4(),
            room_type_id: Uuid::new_v4(),
            rate_plan_id: Uuid::new_v4(),
            stay: StayRange::parse("2024-06-01", "2024-06-04").unwrap(),
            occupancy: Occupancy::new(2, 1).unwrap(),
            status: ReservationStatus::Confirmed,
            total_cost_cents: 45_000,
            notes: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn reservation_json_uses_flat_wire_names() {
        let reservation = sample_reservation();
        let value = serde_json::to_value(&reservation).unwrap();

        assert_eq!(value["start_date"], "2024-06-01");
        assert_eq!(value["end_date"], "2024-06-04");
        assert_eq!(value["num_adults"], 2);
        assert_eq!(value["num_children"], 1);
        assert_eq!(value["status"], "CONFIRMED");
        assert!(value.get("tenant_id").is_none());
        assert!(value.get("notes").is_none());
    }

    #[test]
    fn reservation_json_reads_back_without_tenant() {
        let reservation = sample_reservation();
        let json = serde_json::to_string(&reservation).unwrap();
        let parsed: Reservation = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.id, reservation.id);
        assert_eq!(parsed.stay, reservation.stay);
        assert!(parsed.tenant_id.is_nil());
    }

    #[test]
    fn inverted_stay_in_json_is_rejected() {
        let mut value = serde_json::to_value(sample_reservation()).unwrap();
        value["end_date"] = "2024-05-30".into();

        assert!(serde_json::from_value::<Reservation>(value).is_err());
    }

    #[test]
    fn quote_sums_nightly_prices() {
        let quote = PriceQuote::new(vec![
            NightlyRate { date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(), price_cents: 10_000 },
            NightlyRate { date: NaiveDate::from_ymd_opt(2024, 6, 2).unwrap(), price_cents: 12_500 },
        ])
        .unwrap();

        assert_eq!(quote.total_cents, 22_500);
        assert_eq!(quote.number_of_nights, 2);
        assert_eq!(quote.currency, "USD");
    }

    #[test]
    fn quote_total_past_i64_is_none() {
        let night = |day| NightlyRate {
            date: NaiveDate::from_ymd_opt(2024, 6, day).unwrap(),
            price_cents: i64::MAX,
        };

        assert!(PriceQuote::new(vec![night(1)]).is_some());
        assert!(PriceQuote::new(vec![night(1), night(2)]).is_none());
    }

    #[test]
    fn create_request_defaults_optional_fields() {
        let request: CreateReservationRequest = serde_json::from_value(serde_json::json!({
            "guest_id": Uuid::new_v4(),
            "room_type_id": Uuid::new_v4(),
            "rate_plan_id": Uuid::new_v4(),
            "start_date": "2024-06-01",
            "end_date": "2024-06-03",
            "num_adults": 2
        }))
        .unwrap();

        assert_eq!(request.num_children, 0);
        assert!(request.status.is_none());
        assert_eq!(request.stay().unwrap().nights(), 2);
    }
}
