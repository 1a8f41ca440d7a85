//! Reservation reconciliation
//!
//! Reservations are queued by callers and matched to devices
//! asynchronously by [`ReservationReconciler`]. Each pass walks the
//! queue oldest-first and tries to lock every requested device of a
//! reservation. A reservation is applied all-or-nothing: when not every
//! request could be locked, devices locked so far are unlocked again
//! and the reservation stays queued, with `failed_to_apply` counting
//! each lock that failed outright.

use std::sync::Arc;

use tokio::sync::watch;

use devpool_agent::automation::AutomationService;
use devpool_core::config::ReservationSettings;
use devpool_core::device::{Device, ReservedDevice};
use devpool_core::matching::find_matching_device;
use devpool_core::prelude::*;
use devpool_core::reservation::{RequestedDevice, Reservation, ReservationApplied};

use crate::lock::{lock_device, unlock_device};
use crate::store::{AppliedStore, DeviceStore, ReservationStore};

pub struct ReservationReconciler<D, R, P, A> {
    devices: Arc<D>,
    reservations: Arc<R>,
    applied: Arc<P>,
    automation: Arc<A>,
    settings: ReservationSettings,
}

impl<D, R, P, A> ReservationReconciler<D, R, P, A>
where
    D: DeviceStore + Sync + Send,
    R: ReservationStore + Sync + Send,
    P: AppliedStore + Sync + Send,
    A: AutomationService + Sync + Send,
{
    pub fn new(
        devices: Arc<D>,
        reservations: Arc<R>,
        applied: Arc<P>,
        automation: Arc<A>,
        settings: ReservationSettings,
    ) -> Self {
        Self {
            devices,
            reservations,
            applied,
            automation,
            settings,
        }
    }

    /// Validate and queue a new reservation
    pub async fn create_reservation(
        &self,
        requested_devices: Vec<RequestedDevice>,
    ) -> Result<Reservation> {
        let reservation = Reservation::new(requested_devices);
        reservation.validate()?;
        self.reservations.add(reservation.clone()).await?;
        info!(
            "Queued reservation {} for {} device(s)",
            reservation.id,
            reservation.requested_devices.len()
        );
        Ok(reservation)
    }

    /// Remove a queued reservation; `false` when the id is unknown
    pub async fn cancel_reservation(&self, id: &str) -> Result<bool> {
        Ok(self.reservations.remove(id).await?)
    }

    /// Release an applied reservation: unlock every contained device and
    /// remove the record. An unlock failure keeps the record so the
    /// caller can retry the release; devices unlocked before the
    /// failure stay unlocked.
    pub async fn release_applied(&self, id: &str) -> Result<ReservationApplied> {
        let applied = self
            .applied
            .get(id)
            .await?
            .ok_or_else(|| Error::reservation_not_found(id))?;

        for reserved in &applied.reserved_devices {
            if let Err(e) =
                unlock_device(&*self.devices, &*self.automation, &reserved.device_id).await
            {
                error!(
                    "Releasing reservation {}: failed to unlock {}: {}",
                    id, reserved.device_id, e
                );
                return Err(e);
            }
        }

        self.applied.remove(id).await?;
        info!("Released reservation {}", id);
        Ok(applied)
    }

    /// Run reconciliation until shutdown is signalled or a fatal error
    /// occurs.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!("Reservation reconciler started");
        loop {
            if *shutdown.borrow() {
                info!("Reservation reconciler shutting down");
                return Ok(());
            }

            let delay = match self.pass().await {
                Ok(applied) => {
                    if applied > 0 {
                        info!("Applied {} reservation(s)", applied);
                    }
                    self.settings.refresh_interval()
                }
                Err(e) if e.is_fatal() => {
                    error!("Reservation reconciler stopping: {}", e);
                    return Err(e);
                }
                Err(e) => {
                    warn!("Reservation pass failed: {}", e);
                    self.settings.reconnect_backoff()
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Reservation reconciler shutting down");
                        return Ok(());
                    }
                }
            }
        }
    }

    /// One reconciliation pass over the queue. Returns how many
    /// reservations were applied.
    pub async fn pass(&self) -> Result<usize> {
        let queue = self.reservations.all().await?;
        let mut applied_count = 0;

        for mut reservation in queue {
            // For multi-device reservations, make sure every request can
            // be satisfied before locking anything.
            if reservation.requested_devices.len() > 1
                && !self.all_requested_available(&reservation).await?
            {
                debug!(
                    "Reservation {} not satisfiable yet, keeping queued",
                    reservation.id
                );
                continue;
            }

            if self.apply_reservation(&mut reservation).await? {
                applied_count += 1;
            }
        }

        Ok(applied_count)
    }

    /// Check that every request of a multi-device reservation resolves
    /// to an available device. Matched devices are speculatively held
    /// (marked unavailable and persisted) so a concurrent scan cannot
    /// count on the same device; every hold is released before
    /// returning.
    async fn all_requested_available(&self, reservation: &Reservation) -> Result<bool> {
        let mut held: Vec<Device> = Vec::new();
        let mut all_available = true;

        for requested in &reservation.requested_devices {
            let pool = self.devices.all().await?;
            match find_matching_device(requested, &pool) {
                Some(mut device) if device.available => {
                    device.available = false;
                    self.devices.update(device.clone()).await?;
                    held.push(device);
                }
                Some(device) => {
                    debug!(
                        "Reservation {}: device {} is not available",
                        reservation.id, device.id
                    );
                    all_available = false;
                }
                None => {
                    debug!(
                        "Reservation {}: no device matches a request",
                        reservation.id
                    );
                    all_available = false;
                }
            }
        }

        for mut device in held {
            device.available = true;
            self.devices.update(device).await?;
        }

        Ok(all_available)
    }

    /// Try to lock every requested device. Unresolved or unavailable
    /// requests are skipped; a lock failure bumps `failed_to_apply` and
    /// the loop continues with the next request. Returns `Ok(true)`
    /// when the reservation was applied and dequeued, `Ok(false)` when
    /// it stays queued (with any partial locks compensated).
    async fn apply_reservation(&self, reservation: &mut Reservation) -> Result<bool> {
        let mut locked: Vec<Device> = Vec::new();

        for requested in &reservation.requested_devices {
            let pool = self.devices.all().await?;
            let Some(candidate) = find_matching_device(requested, &pool) else {
                warn!("Reservation {}: no matching device found", reservation.id);
                continue;
            };
            if !candidate.available {
                debug!(
                    "Reservation {}: device {} is not available",
                    reservation.id, candidate.id
                );
                continue;
            }

            match lock_device(&*self.devices, &*self.automation, &candidate.id).await {
                Ok(device) => locked.push(device),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(
                        "Reservation {}: failed to lock {}: {}",
                        reservation.id, candidate.id, e
                    );
                    reservation.failed_to_apply += 1;
                    self.reservations.update(reservation.clone()).await?;
                }
            }
        }

        if locked.len() != reservation.requested_devices.len() {
            if !locked.is_empty() {
                self.compensate(reservation, &locked).await?;
            }
            return Ok(false);
        }

        let reserved = locked.iter().map(ReservedDevice::from_device).collect();
        let applied = ReservationApplied::new(reservation, reserved);
        self.applied.add(applied).await?;
        self.reservations.remove(&reservation.id).await?;

        info!(
            "Applied reservation {} with {} device(s)",
            reservation.id,
            locked.len()
        );
        Ok(true)
    }

    /// Unlock every device locked for a reservation that could not be
    /// applied. A failing unlock leaves the pool inconsistent, which
    /// nothing downstream can repair, so it escalates as fatal.
    async fn compensate(&self, reservation: &Reservation, locked: &[Device]) -> Result<()> {
        for device in locked {
            if let Err(e) = unlock_device(&*self.devices, &*self.automation, &device.id).await {
                error!(
                    "Reservation {}: failed to unlock {} during rollback: {}",
                    reservation.id, device.id, e
                );
                return Err(Error::CompensationFailed {
                    device_id: device.id.clone(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devpool_core::device::{DeviceStatus, DeviceType};

    use crate::store::{
        InMemoryAppliedStore, InMemoryDeviceStore, InMemoryReservationStore, AppliedStore,
        DeviceStore, ReservationStore,
    };
    use crate::test_utils::{locked_device, online_device, FakeAutomation};

    type TestReconciler = ReservationReconciler<
        InMemoryDeviceStore,
        InMemoryReservationStore,
        InMemoryAppliedStore,
        FakeAutomation,
    >;

    fn reconciler() -> TestReconciler {
        ReservationReconciler::new(
            Arc::new(InMemoryDeviceStore::new()),
            Arc::new(InMemoryReservationStore::new()),
            Arc::new(InMemoryAppliedStore::new()),
            Arc::new(FakeAutomation::new()),
            ReservationSettings::default(),
        )
    }

    async fn add_online(r: &TestReconciler, id: &str, name: &str) {
        r.devices
            .add(online_device(id, name, DeviceType::Android))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_single_device_reservation_is_applied() {
        let r = reconciler();
        add_online(&r, "emulator-5554", "Pixel 8").await;

        let reservation = r
            .create_reservation(vec![RequestedDevice::by_id("emulator-5554")])
            .await
            .unwrap();

        assert_eq!(r.pass().await.unwrap(), 1);

        let device = r.devices.get("emulator-5554").await.unwrap().unwrap();
        assert_eq!(device.status, DeviceStatus::Locked);
        assert!(!device.available);

        let applied = r.applied.get(&reservation.id).await.unwrap().unwrap();
        assert_eq!(applied.reserved_devices.len(), 1);
        assert_eq!(applied.reserved_devices[0].device_id, "emulator-5554");
        assert!(applied.reserved_devices[0]
            .automation_endpoint
            .starts_with("http://"));

        assert!(r.reservations.get(&reservation.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unsatisfiable_reservation_stays_queued() {
        let r = reconciler();

        let reservation = r
            .create_reservation(vec![RequestedDevice::by_name("Pixel 8")])
            .await
            .unwrap();

        assert_eq!(r.pass().await.unwrap(), 0);

        let queued = r.reservations.get(&reservation.id).await.unwrap().unwrap();
        assert_eq!(queued.failed_to_apply, 0);
    }

    #[tokio::test]
    async fn test_partial_availability_changes_nothing() {
        let r = reconciler();
        add_online(&r, "emulator-5554", "Pixel 8").await;

        let reservation = r
            .create_reservation(vec![
                RequestedDevice::by_id("emulator-5554"),
                RequestedDevice::by_name("Test iPhone"),
            ])
            .await
            .unwrap();

        assert_eq!(r.pass().await.unwrap(), 0);

        // eligibility holds are rolled back, no lock was attempted
        let device = r.devices.get("emulator-5554").await.unwrap().unwrap();
        assert!(device.available);
        assert_eq!(device.status, DeviceStatus::Online);
        assert_eq!(r.automation.running_count(), 0);

        let queued = r.reservations.get(&reservation.id).await.unwrap().unwrap();
        assert_eq!(queued.failed_to_apply, 0);
    }

    #[tokio::test]
    async fn test_multi_device_request_resolving_to_locked_device_stays_queued() {
        let r = reconciler();
        r.devices
            .add(locked_device("a", "Pixel 8", DeviceType::Android))
            .await
            .unwrap();
        add_online(&r, "b", "Pixel 7").await;

        let reservation = r
            .create_reservation(vec![
                RequestedDevice::by_name("Pixel 8"),
                RequestedDevice::by_name("Pixel 7"),
            ])
            .await
            .unwrap();

        assert_eq!(r.pass().await.unwrap(), 0);

        // the eligibility hold on b was rolled back
        let b = r.devices.get("b").await.unwrap().unwrap();
        assert!(b.available);

        let queued = r.reservations.get(&reservation.id).await.unwrap().unwrap();
        assert_eq!(queued.failed_to_apply, 0);
    }

    #[tokio::test]
    async fn test_multi_device_reservation_locks_distinct_devices() {
        let r = reconciler();
        add_online(&r, "a", "Pixel 8").await;
        add_online(&r, "b", "Pixel 7").await;

        let reservation = r
            .create_reservation(vec![
                RequestedDevice::by_name("Pixel 8"),
                RequestedDevice::by_name("Pixel 7"),
            ])
            .await
            .unwrap();

        assert_eq!(r.pass().await.unwrap(), 1);

        let applied = r.applied.get(&reservation.id).await.unwrap().unwrap();
        let mut ids: Vec<&str> = applied
            .reserved_devices
            .iter()
            .map(|d| d.device_id.as_str())
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(r.automation.running_count(), 2);
    }

    #[tokio::test]
    async fn test_lock_failure_rolls_back_and_counts() {
        let r = reconciler();
        add_online(&r, "a", "Pixel 8").await;
        add_online(&r, "b", "Test iPhone").await;
        r.automation.fail_start_for("b");

        let reservation = r
            .create_reservation(vec![
                RequestedDevice::by_id("a"),
                RequestedDevice::by_id("b"),
            ])
            .await
            .unwrap();

        assert_eq!(r.pass().await.unwrap(), 0);

        // the first lock was rolled back
        let a = r.devices.get("a").await.unwrap().unwrap();
        assert!(a.available);
        assert_eq!(a.status, DeviceStatus::Offline);
        assert_eq!(r.automation.running_count(), 0);

        let queued = r.reservations.get(&reservation.id).await.unwrap().unwrap();
        assert_eq!(queued.failed_to_apply, 1);
        assert!(r.applied.get(&reservation.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_each_failed_lock_bumps_the_counter() {
        let r = reconciler();
        add_online(&r, "a", "Pixel 8").await;
        add_online(&r, "b", "Pixel 7").await;
        r.automation.fail_start_for("a");
        r.automation.fail_start_for("b");

        let reservation = r
            .create_reservation(vec![
                RequestedDevice::by_id("a"),
                RequestedDevice::by_id("b"),
            ])
            .await
            .unwrap();

        assert_eq!(r.pass().await.unwrap(), 0);

        // the second lock was still attempted after the first failed
        let queued = r.reservations.get(&reservation.id).await.unwrap().unwrap();
        assert_eq!(queued.failed_to_apply, 2);
        assert_eq!(r.automation.running_count(), 0);
    }

    #[tokio::test]
    async fn test_queue_is_served_oldest_first() {
        let r = reconciler();
        add_online(&r, "a", "Pixel 8").await;

        let mut first = Reservation::new(vec![RequestedDevice::by_name("Pixel 8")]);
        first.date_created = chrono::Utc::now() - chrono::Duration::seconds(60);
        let first_id = first.id.clone();
        r.reservations.add(first).await.unwrap();

        let second = r
            .create_reservation(vec![RequestedDevice::by_name("Pixel 8")])
            .await
            .unwrap();

        assert_eq!(r.pass().await.unwrap(), 1);

        assert!(r.applied.get(&first_id).await.unwrap().is_some());
        assert!(r.reservations.get(&second.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_release_applied_unlocks_devices() {
        let r = reconciler();
        add_online(&r, "a", "Pixel 8").await;

        let reservation = r
            .create_reservation(vec![RequestedDevice::by_id("a")])
            .await
            .unwrap();
        r.pass().await.unwrap();

        let released = r.release_applied(&reservation.id).await.unwrap();
        assert_eq!(released.id, reservation.id);

        let device = r.devices.get("a").await.unwrap().unwrap();
        assert_eq!(device.status, DeviceStatus::Offline);
        assert!(device.available);
        assert!(device.automation_endpoint.is_empty());
        assert_eq!(r.automation.running_count(), 0);
        assert!(r.applied.get(&reservation.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_release_keeps_record_when_unlock_errors() {
        let r = reconciler();
        add_online(&r, "a", "Pixel 8").await;

        let reservation = r
            .create_reservation(vec![RequestedDevice::by_id("a")])
            .await
            .unwrap();
        r.pass().await.unwrap();

        // the locked device vanished from the pool, unlocking it errors
        r.devices.remove("a").await.unwrap();

        let err = r.release_applied(&reservation.id).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
        assert!(r.applied.get(&reservation.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_release_unknown_applied_fails() {
        let r = reconciler();
        let err = r.release_applied("missing").await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_create_reservation_validates() {
        let r = reconciler();
        let err = r.create_reservation(vec![]).await.unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[tokio::test]
    async fn test_cancel_reservation() {
        let r = reconciler();
        let reservation = r
            .create_reservation(vec![RequestedDevice::by_id("a")])
            .await
            .unwrap();

        assert!(r.cancel_reservation(&reservation.id).await.unwrap());
        assert!(!r.cancel_reservation(&reservation.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_locked_devices_are_not_rematched() {
        let r = reconciler();
        add_online(&r, "a", "Pixel 8").await;

        r.create_reservation(vec![RequestedDevice::by_name("Pixel 8")])
            .await
            .unwrap();
        let second = r
            .create_reservation(vec![RequestedDevice::by_name("Pixel 8")])
            .await
            .unwrap();

        assert_eq!(r.pass().await.unwrap(), 1);
        // second pass finds no eligible device
        assert_eq!(r.pass().await.unwrap(), 0);
        assert!(r.reservations.get(&second.id).await.unwrap().is_some());
    }
}
