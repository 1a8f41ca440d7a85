//! Device ingestion
//!
//! One [`IngestionService`] runs per enabled platform. Each tick it
//! enumerates connected devices, adds newcomers to the pool, runs the
//! platform bootstrap on them when one exists (iOS disk image mounting),
//! and hands the connected set to presence reconciliation.
//!
//! Android devices go straight to `Online`. Platforms with a bootstrap
//! enter as `Initialize` and move to `Online` or `FailedToInitialize`
//! depending on the bootstrap outcome. A device that never reports a
//! name is skipped and retried on the next tick.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use devpool_agent::ios::{DeviceBootstrap, MountOutcome};
use devpool_agent::source::EnumerationSource;
use devpool_core::device::{Device, DeviceStatus, DeviceType};
use devpool_core::prelude::*;

use crate::presence::reconcile_presence;
use crate::store::DeviceStore;

/// Type anchor for platforms that run without a bootstrap step
pub struct NoBootstrap;

impl DeviceBootstrap for NoBootstrap {
    async fn initialize(&self, _device: &Device) -> Result<MountOutcome> {
        Ok(MountOutcome::AlreadyMounted)
    }
}

pub struct IngestionService<S, B, D> {
    source: S,
    bootstrap: Option<B>,
    devices: Arc<D>,
    device_type: DeviceType,
    refresh: Duration,
    backoff: Duration,
}

impl<S, B, D> IngestionService<S, B, D>
where
    S: EnumerationSource + Sync + Send,
    B: DeviceBootstrap + Sync + Send,
    D: DeviceStore + Sync + Send,
{
    pub fn new(
        source: S,
        bootstrap: Option<B>,
        devices: Arc<D>,
        device_type: DeviceType,
        refresh: Duration,
        backoff: Duration,
    ) -> Self {
        Self {
            source,
            bootstrap,
            devices,
            device_type,
            refresh,
            backoff,
        }
    }

    /// Access the enumeration source, for scripting fakes in tests
    #[cfg(any(test, feature = "test-helpers"))]
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Run ingestion ticks until shutdown is signalled or a fatal error
    /// occurs.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!("{} ingestion started", self.device_type);
        loop {
            if *shutdown.borrow() {
                info!("{} ingestion shutting down", self.device_type);
                return Ok(());
            }

            let delay = match self.tick().await {
                Ok(()) => self.refresh,
                Err(e) if e.is_fatal() => {
                    error!("{} ingestion stopping: {}", self.device_type, e);
                    return Err(e);
                }
                Err(e) => {
                    warn!("{} ingestion tick failed: {}", self.device_type, e);
                    self.backoff
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("{} ingestion shutting down", self.device_type);
                        return Ok(());
                    }
                }
            }
        }
    }

    /// One enumeration tick: ingest newcomers, then reconcile presence.
    pub async fn tick(&self) -> Result<()> {
        let connected: HashSet<String> = self
            .source
            .list_connected_device_ids()
            .await?
            .into_iter()
            .collect();

        for device_id in &connected {
            if self.devices.get(device_id).await?.is_none() {
                self.ingest(device_id).await?;
            }
        }

        reconcile_presence(&*self.devices, self.device_type, &connected).await
    }

    async fn ingest(&self, device_id: &str) -> Result<()> {
        let Some(name) = self.source.read_device_name(device_id).await? else {
            debug!(
                "Device {} reported no usable name, retrying next tick",
                device_id
            );
            return Ok(());
        };

        let properties = self.source.read_properties(device_id).await?;

        let Some(bootstrap) = &self.bootstrap else {
            let device = Device::new(
                device_id,
                name,
                true,
                self.device_type,
                DeviceStatus::Online,
            )
            .with_properties(properties);
            info!("Ingested {} device {} ({})", self.device_type, device_id, device.name);
            return self.devices.add(device).await;
        };

        let mut device = Device::new(
            device_id,
            name,
            false,
            self.device_type,
            DeviceStatus::Initialize,
        )
        .with_properties(properties);
        self.devices.add(device.clone()).await?;

        match bootstrap.initialize(&device).await {
            Ok(outcome) => {
                debug!("Bootstrap of {}: {:?}", device_id, outcome);
                device.status = DeviceStatus::Online;
                device.available = true;
                info!("Ingested {} device {} ({})", self.device_type, device_id, device.name);
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!("Bootstrap of {} failed: {}", device_id, e);
                device.status = DeviceStatus::FailedToInitialize;
            }
        }
        self.devices.update(device).await
    }
}
