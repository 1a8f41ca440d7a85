//! # devpool-engine - Reconciliation Engine
//!
//! The stateful heart of the device pool manager. Owns pool state and
//! drives the three loops that keep it honest:
//!
//! - **Ingestion** ([`ingest`]) - discover connected devices per platform
//!   and admit them into the pool
//! - **Presence** ([`presence`]) - flip device statuses as hardware
//!   appears and disappears
//! - **Reservation** ([`reserve`]) - match queued reservations against
//!   the pool and lock devices all-or-nothing
//!
//! Device lock/unlock coordination with automation servers lives in
//! [`lock`]; pool state access goes through the store traits in
//! [`store`]. [`engine::Engine`] wires the production components
//! together and supervises the tasks.

pub mod engine;
pub mod ingest;
pub mod lock;
pub mod presence;
pub mod reserve;
pub mod store;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_utils;

pub use engine::{Engine, PoolReconciler};
pub use ingest::IngestionService;
pub use lock::{lock_device, unlock_device};
pub use presence::reconcile_presence;
pub use reserve::ReservationReconciler;
pub use store::{
    AppliedStore, DeviceStore, InMemoryAppliedStore, InMemoryDeviceStore,
    InMemoryReservationStore, ReservationStore,
};
