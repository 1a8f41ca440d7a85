//! Pool state stores
//!
//! The engine reads and writes pool state through these traits. The
//! in-memory implementations are the production backend; the daemon is
//! the single writer of record, so a `RwLock<HashMap>` per collection
//! is all the coordination needed.

use std::collections::HashMap;

use tokio::sync::RwLock;

use devpool_core::device::Device;
use devpool_core::prelude::*;
use devpool_core::reservation::{Reservation, ReservationApplied};

/// Tracked devices, keyed by device id
#[trait_variant::make(DeviceStore: Send)]
pub trait LocalDeviceStore {
    /// Every tracked device, ordered by id
    async fn all(&self) -> Result<Vec<Device>>;

    async fn get(&self, id: &str) -> Result<Option<Device>>;

    /// Add a new device; fails with `AlreadyExists` on a duplicate id
    async fn add(&self, device: Device) -> Result<()>;

    /// Replace an existing device; fails with `NotFound` for unknown ids
    async fn update(&self, device: Device) -> Result<()>;

    /// Remove a device; `false` when the id was not tracked
    async fn remove(&self, id: &str) -> Result<bool>;
}

/// Queued reservations awaiting devices
#[trait_variant::make(ReservationStore: Send)]
pub trait LocalReservationStore {
    /// The queue in arrival order (oldest first)
    async fn all(&self) -> Result<Vec<Reservation>>;

    async fn get(&self, id: &str) -> Result<Option<Reservation>>;

    async fn add(&self, reservation: Reservation) -> Result<()>;

    async fn update(&self, reservation: Reservation) -> Result<()>;

    async fn remove(&self, id: &str) -> Result<bool>;
}

/// Committed reservations holding locked devices
#[trait_variant::make(AppliedStore: Send)]
pub trait LocalAppliedStore {
    async fn all(&self) -> Result<Vec<ReservationApplied>>;

    async fn get(&self, id: &str) -> Result<Option<ReservationApplied>>;

    async fn add(&self, applied: ReservationApplied) -> Result<()>;

    async fn remove(&self, id: &str) -> Result<bool>;
}

// ============================================================================
// In-memory implementations
// ============================================================================

#[derive(Debug, Default)]
pub struct InMemoryDeviceStore {
    devices: RwLock<HashMap<String, Device>>,
}

impl InMemoryDeviceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DeviceStore for InMemoryDeviceStore {
    async fn all(&self) -> Result<Vec<Device>> {
        let devices = self.devices.read().await;
        let mut all: Vec<Device> = devices.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all)
    }

    async fn get(&self, id: &str) -> Result<Option<Device>> {
        Ok(self.devices.read().await.get(id).cloned())
    }

    async fn add(&self, device: Device) -> Result<()> {
        let mut devices = self.devices.write().await;
        if devices.contains_key(&device.id) {
            return Err(Error::AlreadyExists {
                kind: "device",
                id: device.id,
            });
        }
        devices.insert(device.id.clone(), device);
        Ok(())
    }

    async fn update(&self, device: Device) -> Result<()> {
        let mut devices = self.devices.write().await;
        if !devices.contains_key(&device.id) {
            return Err(Error::device_not_found(&device.id));
        }
        devices.insert(device.id.clone(), device);
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        Ok(self.devices.write().await.remove(id).is_some())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryReservationStore {
    reservations: RwLock<HashMap<String, Reservation>>,
}

impl InMemoryReservationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReservationStore for InMemoryReservationStore {
    async fn all(&self) -> Result<Vec<Reservation>> {
        let reservations = self.reservations.read().await;
        let mut all: Vec<Reservation> = reservations.values().cloned().collect();
        // FIFO: oldest request is served first
        all.sort_by(|a, b| a.date_created.cmp(&b.date_created));
        Ok(all)
    }

    async fn get(&self, id: &str) -> Result<Option<Reservation>> {
        Ok(self.reservations.read().await.get(id).cloned())
    }

    async fn add(&self, reservation: Reservation) -> Result<()> {
        let mut reservations = self.reservations.write().await;
        if reservations.contains_key(&reservation.id) {
            return Err(Error::AlreadyExists {
                kind: "reservation",
                id: reservation.id,
            });
        }
        reservations.insert(reservation.id.clone(), reservation);
        Ok(())
    }

    async fn update(&self, reservation: Reservation) -> Result<()> {
        let mut reservations = self.reservations.write().await;
        if !reservations.contains_key(&reservation.id) {
            return Err(Error::reservation_not_found(&reservation.id));
        }
        reservations.insert(reservation.id.clone(), reservation);
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        Ok(self.reservations.write().await.remove(id).is_some())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryAppliedStore {
    applied: RwLock<HashMap<String, ReservationApplied>>,
}

impl InMemoryAppliedStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AppliedStore for InMemoryAppliedStore {
    async fn all(&self) -> Result<Vec<ReservationApplied>> {
        let applied = self.applied.read().await;
        let mut all: Vec<ReservationApplied> = applied.values().cloned().collect();
        all.sort_by(|a, b| a.date_created.cmp(&b.date_created));
        Ok(all)
    }

    async fn get(&self, id: &str) -> Result<Option<ReservationApplied>> {
        Ok(self.applied.read().await.get(id).cloned())
    }

    async fn add(&self, applied: ReservationApplied) -> Result<()> {
        let mut store = self.applied.write().await;
        if store.contains_key(&applied.id) {
            return Err(Error::AlreadyExists {
                kind: "applied reservation",
                id: applied.id,
            });
        }
        store.insert(applied.id.clone(), applied);
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        Ok(self.applied.write().await.remove(id).is_some())
    }
}
