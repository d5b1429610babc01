use std::sync::Arc;

use booking_service::{
    BookingChange, BookingCoordinator, BookingError, BookingSettings, ListFilter, MemoryStore, NewBooking,
};
use chrono::NaiveDate;
use shared::*;
use uuid::Uuid;

struct Fixture {
    coordinator: Arc<BookingCoordinator<MemoryStore>>,
    tenant_id: TenantId,
    room_type_id: RoomTypeId,
    rate_plan_id: RatePlanId,
}

fn stay(from: &str, to: &str) -> StayRange {
    StayRange::parse(from, to).unwrap()
}

fn june(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, day).unwrap()
}

impl Fixture {
    fn new() -> Self {
        Self {
            coordinator: Arc::new(BookingCoordinator::new(MemoryStore::default(), BookingSettings::default())),
            tenant_id: Uuid::new_v4(),
            room_type_id: Uuid::new_v4(),
            rate_plan_id: Uuid::new_v4(),
        }
    }

    async fn allocate(&self, range: StayRange, units: i32) {
        self.coordinator
            .allocate_inventory(self.tenant_id, self.room_type_id, range, units)
            .await
            .unwrap();
    }

    async fn price(&self, range: StayRange, price_cents: i64) {
        self.coordinator
            .load_rates(self.tenant_id, self.room_type_id, self.rate_plan_id, range, price_cents)
            .await
            .unwrap();
    }

    fn booking(&self, range: StayRange) -> NewBooking {
        NewBooking {
            guest_id: Uuid::new_v4(),
            room_type_id: self.room_type_id,
            rate_plan_id: self.rate_plan_id,
            stay: range,
            occupancy: Occupancy::new(2, 0).unwrap(),
            status: None,
            notes: None,
        }
    }

    async fn book(&self, range: StayRange) -> Result<Reservation, BookingError> {
        self.coordinator.create_reservation(self.tenant_id, self.booking(range)).await
    }

    async fn availability(&self, range: StayRange) -> Vec<(NaiveDate, i32)> {
        self.coordinator
            .get_availability(self.tenant_id, self.room_type_id, range)
            .await
            .unwrap()
            .into_iter()
            .collect()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_creates_never_overbook() {
    let fixture = Arc::new(Fixture::new());
    let units = 5;
    fixture.allocate(stay("2024-06-01", "2024-06-04"), units).await;
    fixture.price(stay("2024-06-01", "2024-06-04"), 12_500).await;

    let attempts: Vec<_> = (0..units + 1)
        .map(|_| {
            let fixture = Arc::clone(&fixture);
            tokio::spawn(async move { fixture.book(stay("2024-06-01", "2024-06-04")).await })
        })
        .collect();

    let mut booked = 0;
    let mut refused = 0;
    for attempt in attempts {
        match attempt.await.unwrap() {
            Ok(_) => booked += 1,
            Err(BookingError::NotAvailable) => refused += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(booked, units);
    assert_eq!(refused, 1);
    assert!(fixture
        .availability(stay("2024-06-01", "2024-06-04"))
        .await
        .iter()
        .all(|(_, left)| *left == 0));
}

#[tokio::test]
async fn quote_is_all_or_nothing() {
    let fixture = Fixture::new();
    fixture.price(stay("2024-06-01", "2024-06-03"), 10_000).await;
    fixture.price(stay("2024-06-04", "2024-06-06"), 15_000).await;

    let gap = fixture
        .coordinator
        .quote(fixture.tenant_id, fixture.room_type_id, fixture.rate_plan_id, stay("2024-06-01", "2024-06-06"))
        .await;
    assert!(matches!(gap, Err(BookingError::PriceNotAvailable)));

    fixture.price(stay("2024-06-03", "2024-06-04"), 20_000).await;
    let quote = fixture
        .coordinator
        .quote(fixture.tenant_id, fixture.room_type_id, fixture.rate_plan_id, stay("2024-06-01", "2024-06-06"))
        .await
        .unwrap();
    assert_eq!(quote.number_of_nights, 5);
    assert_eq!(quote.total_cents, 10_000 * 2 + 20_000 + 15_000 * 2);
}

#[tokio::test]
async fn unpriced_stay_claims_nothing() {
    let fixture = Fixture::new();
    fixture.allocate(stay("2024-06-01", "2024-06-04"), 2).await;
    fixture.price(stay("2024-06-01", "2024-06-03"), 10_000).await;

    let result = fixture.book(stay("2024-06-01", "2024-06-04")).await;
    assert!(matches!(result, Err(BookingError::PriceNotAvailable)));
    assert_eq!(
        fixture.availability(stay("2024-06-01", "2024-06-04")).await,
        vec![(june(1), 2), (june(2), 2), (june(3), 2)]
    );
}

#[tokio::test]
async fn failed_update_restores_released_inventory() {
    let fixture = Fixture::new();
    fixture.allocate(stay("2024-06-01", "2024-06-06"), 1).await;
    fixture.allocate(stay("2024-06-06", "2024-06-07"), 0).await;
    fixture.price(stay("2024-06-01", "2024-06-08"), 9_000).await;

    let reservation = fixture.book(stay("2024-06-01", "2024-06-05")).await.unwrap();

    let change = BookingChange {
        stay: stay("2024-06-05", "2024-06-07"),
        occupancy: reservation.occupancy,
        expected_version: None,
        notes: None,
    };
    let result = fixture
        .coordinator
        .update_reservation(fixture.tenant_id, reservation.id, change)
        .await;
    assert!(matches!(result, Err(BookingError::NotAvailable)));

    assert_eq!(
        fixture.availability(stay("2024-06-01", "2024-06-07")).await,
        vec![
            (june(1), 0),
            (june(2), 0),
            (june(3), 0),
            (june(4), 0),
            (june(5), 1),
            (june(6), 0),
        ]
    );

    let stored = fixture
        .coordinator
        .get_reservation(fixture.tenant_id, reservation.id)
        .await
        .unwrap();
    assert_eq!(stored.stay, reservation.stay);
    assert_eq!(stored.version, 0);
}

#[tokio::test]
async fn successful_update_moves_inventory_and_reprices() {
    let fixture = Fixture::new();
    fixture.allocate(stay("2024-06-01", "2024-06-10"), 1).await;
    fixture.price(stay("2024-06-01", "2024-06-10"), 10_000).await;

    let reservation = fixture.book(stay("2024-06-01", "2024-06-03")).await.unwrap();
    assert_eq!(reservation.total_cost_cents, 20_000);

    let change = BookingChange {
        stay: stay("2024-06-02", "2024-06-05"),
        occupancy: reservation.occupancy,
        expected_version: Some(0),
        notes: None,
    };
    let updated = fixture
        .coordinator
        .update_reservation(fixture.tenant_id, reservation.id, change)
        .await
        .unwrap();

    assert_eq!(updated.version, 1);
    assert_eq!(updated.total_cost_cents, 30_000);
    assert_eq!(
        fixture.availability(stay("2024-06-01", "2024-06-06")).await,
        vec![(june(1), 1), (june(2), 0), (june(3), 0), (june(4), 0), (june(5), 1)]
    );
}

#[tokio::test]
async fn cancellation_is_terminal() {
    let fixture = Fixture::new();
    fixture.allocate(stay("2024-06-01", "2024-06-04"), 3).await;
    fixture.price(stay("2024-06-01", "2024-06-04"), 10_000).await;

    let reservation = fixture.book(stay("2024-06-01", "2024-06-04")).await.unwrap();
    assert_eq!(reservation.status, ReservationStatus::Confirmed);

    let cancelled = fixture
        .coordinator
        .cancel_reservation(fixture.tenant_id, reservation.id, None)
        .await
        .unwrap();
    assert_eq!(cancelled.status, ReservationStatus::Cancelled);
    assert_eq!(cancelled.version, 1);
    assert!(fixture
        .availability(stay("2024-06-01", "2024-06-04"))
        .await
        .iter()
        .all(|(_, left)| *left == 3));

    let again = fixture
        .coordinator
        .cancel_reservation(fixture.tenant_id, reservation.id, None)
        .await;
    assert!(matches!(
        again,
        Err(BookingError::InvalidStateTransition { from: ReservationStatus::Cancelled, .. })
    ));

    let change = BookingChange {
        stay: stay("2024-06-02", "2024-06-03"),
        occupancy: reservation.occupancy,
        expected_version: None,
        notes: None,
    };
    let update = fixture
        .coordinator
        .update_reservation(fixture.tenant_id, reservation.id, change)
        .await;
    assert!(matches!(update, Err(BookingError::InvalidStateTransition { .. })));
    assert!(fixture
        .availability(stay("2024-06-01", "2024-06-04"))
        .await
        .iter()
        .all(|(_, left)| *left == 3));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_updates_on_one_version_conflict() {
    let fixture = Arc::new(Fixture::new());
    fixture.allocate(stay("2024-06-01", "2024-06-04"), 2).await;
    fixture.price(stay("2024-06-01", "2024-06-04"), 10_000).await;
    let reservation = fixture.book(stay("2024-06-01", "2024-06-04")).await.unwrap();
    let reservation_id = reservation.id;

    let edits: Vec<_> = [1, 3]
        .into_iter()
        .map(|adults| {
            let fixture = Arc::clone(&fixture);
            let change = BookingChange {
                stay: reservation.stay,
                occupancy: Occupancy::new(adults, 0).unwrap(),
                expected_version: Some(reservation.version),
                notes: None,
            };
            tokio::spawn(async move {
                fixture
                    .coordinator
                    .update_reservation(fixture.tenant_id, reservation_id, change)
                    .await
            })
        })
        .collect();

    let mut committed = Vec::new();
    let mut conflicts = 0;
    for edit in edits {
        match edit.await.unwrap() {
            Ok(updated) => committed.push(updated),
            Err(BookingError::EditConflict) => conflicts += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(committed.len(), 1);
    assert_eq!(conflicts, 1);
    assert_eq!(committed[0].version, reservation.version + 1);

    let stored = fixture
        .coordinator
        .get_reservation(fixture.tenant_id, reservation.id)
        .await
        .unwrap();
    assert_eq!(stored, committed[0]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn racing_moves_onto_scarce_nights_lose_on_version() {
    let fixture = Arc::new(Fixture::new());
    fixture.allocate(stay("2024-06-01", "2024-06-03"), 1).await;
    fixture.allocate(stay("2024-06-05", "2024-06-07"), 1).await;
    fixture.price(stay("2024-06-01", "2024-06-08"), 10_000).await;
    let reservation = fixture.book(stay("2024-06-01", "2024-06-03")).await.unwrap();
    let reservation_id = reservation.id;

    let moves: Vec<_> = (0..2)
        .map(|_| {
            let fixture = Arc::clone(&fixture);
            let change = BookingChange {
                stay: stay("2024-06-05", "2024-06-07"),
                occupancy: reservation.occupancy,
                expected_version: Some(0),
                notes: None,
            };
            tokio::spawn(async move {
                fixture
                    .coordinator
                    .update_reservation(fixture.tenant_id, reservation_id, change)
                    .await
            })
        })
        .collect();

    let mut outcomes = Vec::new();
    for attempt in moves {
        outcomes.push(attempt.await.unwrap());
    }
    assert_eq!(outcomes.iter().filter(|outcome| outcome.is_ok()).count(), 1);
    assert!(outcomes
        .iter()
        .any(|outcome| matches!(outcome, Err(BookingError::EditConflict))));

    assert_eq!(
        fixture.availability(stay("2024-06-01", "2024-06-07")).await,
        vec![(june(1), 1), (june(2), 1), (june(5), 0), (june(6), 0)]
    );
}

#[tokio::test]
async fn tenants_do_not_see_each_other() {
    let fixture = Fixture::new();
    fixture.allocate(stay("2024-06-01", "2024-06-03"), 1).await;
    fixture.price(stay("2024-06-01", "2024-06-03"), 10_000).await;
    let reservation = fixture.book(stay("2024-06-01", "2024-06-03")).await.unwrap();

    let stranger = Uuid::new_v4();
    let lookup = fixture.coordinator.get_reservation(stranger, reservation.id).await;
    assert!(matches!(lookup, Err(BookingError::NotFound)));

    let cancel = fixture.coordinator.cancel_reservation(stranger, reservation.id, None).await;
    assert!(matches!(cancel, Err(BookingError::NotFound)));

    let theirs = fixture
        .coordinator
        .list_reservations(stranger, ListFilter::default())
        .await
        .unwrap();
    assert!(theirs.is_empty());

    let foreign_booking = fixture.coordinator.create_reservation(stranger, fixture.booking(reservation.stay)).await;
    assert!(matches!(foreign_booking, Err(BookingError::PriceNotAvailable)));
}

#[tokio::test]
async fn front_desk_flow_runs_to_checkout() {
    let fixture = Fixture::new();
    fixture.allocate(stay("2024-06-01", "2024-06-03"), 1).await;
    fixture.price(stay("2024-06-01", "2024-06-03"), 10_000).await;
    let reservation = fixture.book(stay("2024-06-01", "2024-06-03")).await.unwrap();

    let checked_in = fixture
        .coordinator
        .transition_status(fixture.tenant_id, reservation.id, ReservationStatus::CheckedIn, Some(0))
        .await
        .unwrap();
    assert_eq!(checked_in.status, ReservationStatus::CheckedIn);

    let stale = fixture
        .coordinator
        .transition_status(fixture.tenant_id, reservation.id, ReservationStatus::CheckedOut, Some(0))
        .await;
    assert!(matches!(stale, Err(BookingError::EditConflict)));

    let checked_out = fixture
        .coordinator
        .transition_status(fixture.tenant_id, reservation.id, ReservationStatus::CheckedOut, Some(1))
        .await
        .unwrap();
    assert_eq!(checked_out.status, ReservationStatus::CheckedOut);
    assert_eq!(checked_out.version, 2);

    let cancel = fixture
        .coordinator
        .cancel_reservation(fixture.tenant_id, reservation.id, None)
        .await;
    assert!(matches!(cancel, Err(BookingError::InvalidStateTransition { .. })));
}

#[tokio::test]
async fn list_pages_through_overlapping_stays() {
    let fixture = Fixture::new();
    fixture.allocate(stay("2024-06-01", "2024-06-30"), 10).await;
    fixture.price(stay("2024-06-01", "2024-06-30"), 10_000).await;

    for (from, to) in [
        ("2024-06-20", "2024-06-22"),
        ("2024-06-01", "2024-06-03"),
        ("2024-06-05", "2024-06-08"),
        ("2024-06-10", "2024-06-11"),
    ] {
        fixture.book(stay(from, to)).await.unwrap();
    }

    let window = ListFilter::new(Some(june(2)), Some(june(11)), Some(1), Some(2)).unwrap();
    let first = fixture
        .coordinator
        .list_reservations(fixture.tenant_id, window.clone())
        .await
        .unwrap();
    let starts: Vec<_> = first.iter().map(|r| r.stay.start_date()).collect();
    assert_eq!(starts, vec![june(1), june(5)]);

    let second = fixture
        .coordinator
        .list_reservations(fixture.tenant_id, ListFilter { page: 2, ..window })
        .await
        .unwrap();
    let starts: Vec<_> = second.iter().map(|r| r.stay.start_date()).collect();
    assert_eq!(starts, vec![june(10)]);
}
