pub mod api;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod ledger;
pub mod models;
pub mod pricing;
pub mod reservations;
pub mod schema;
pub mod store;

pub use coordinator::{
    BookingChange, BookingCoordinator, BookingSettings, NewBooking, RepricePolicy,
};
pub use error::{BookingError, BookingResult};
pub use reservations::ListFilter;
pub use store::{BookingStore, BookingTx, MemoryStore, PgStore};
