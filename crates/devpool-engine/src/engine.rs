//! Daemon supervisor
//!
//! Wires the production components together and runs one task per
//! concern: the reservation reconciler plus an ingestion loop for each
//! enabled platform. A single watch channel fans the shutdown signal
//! out to every task; a fatal error in any task brings the rest down.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinSet;

use devpool_agent::android::AndroidEnumeration;
use devpool_agent::automation::{AutomationService, ProcessAutomationService};
use devpool_agent::ios::{IosDiskImageMounter, IosEnumeration};
use devpool_agent::tools::ToolAvailability;
use devpool_core::config::Settings;
use devpool_core::device::DeviceType;
use devpool_core::prelude::*;

use crate::ingest::{IngestionService, NoBootstrap};
use crate::reserve::ReservationReconciler;
use crate::store::{InMemoryAppliedStore, InMemoryDeviceStore, InMemoryReservationStore};

/// The reconciler over the production store and automation backends
pub type PoolReconciler = ReservationReconciler<
    InMemoryDeviceStore,
    InMemoryReservationStore,
    InMemoryAppliedStore,
    ProcessAutomationService,
>;

pub struct Engine {
    settings: Settings,
    devices: Arc<InMemoryDeviceStore>,
    automation: Arc<ProcessAutomationService>,
    reconciler: Arc<PoolReconciler>,
    shutdown_tx: watch::Sender<bool>,
}

impl Engine {
    pub fn new(settings: Settings) -> Result<Self> {
        settings.validate()?;

        let devices = Arc::new(InMemoryDeviceStore::new());
        let reservations = Arc::new(InMemoryReservationStore::new());
        let applied = Arc::new(InMemoryAppliedStore::new());
        let automation = Arc::new(ProcessAutomationService::new(settings.automation.clone()));

        let reconciler = Arc::new(ReservationReconciler::new(
            devices.clone(),
            reservations,
            applied,
            automation.clone(),
            settings.reservation.clone(),
        ));

        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            settings,
            devices,
            automation,
            reconciler,
            shutdown_tx,
        })
    }

    /// Reservation intake and release operations
    pub fn reconciler(&self) -> Arc<PoolReconciler> {
        self.reconciler.clone()
    }

    /// The tracked device pool
    pub fn devices(&self) -> Arc<InMemoryDeviceStore> {
        self.devices.clone()
    }

    /// Signal every task to stop
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Verify that every external tool the enabled platforms need is on
    /// PATH. Run before [`run`](Self::run); failures here are fatal.
    pub fn check_tools(&self) -> Result<()> {
        let tools = ToolAvailability::check(&self.settings.automation.server_command);
        tools.require_automation_server(&self.settings.automation.server_command)?;
        if self.settings.android.enabled {
            tools.require_android()?;
        }
        if self.settings.ios.enabled {
            tools.require_ios()?;
        }
        Ok(())
    }

    /// Run all loops until shutdown. Returns the first fatal error, if
    /// any; automation servers are stopped either way.
    pub async fn run(&self) -> Result<()> {
        let mut tasks: JoinSet<Result<()>> = JoinSet::new();

        let reconciler = self.reconciler.clone();
        let rx = self.shutdown_tx.subscribe();
        tasks.spawn(async move { reconciler.run(rx).await });

        if self.settings.android.enabled {
            let ingestion = IngestionService::<_, NoBootstrap, _>::new(
                AndroidEnumeration::new(self.settings.tools.timeout()),
                None,
                self.devices.clone(),
                DeviceType::Android,
                self.settings.android.refresh_interval(),
                self.settings.reservation.reconnect_backoff(),
            );
            let rx = self.shutdown_tx.subscribe();
            tasks.spawn(async move { ingestion.run(rx).await });
        }

        if self.settings.ios.enabled {
            let image_root = self
                .settings
                .ios
                .developer_image_root
                .clone()
                .ok_or_else(|| Error::config("ios.developer_image_root is not set"))?;
            let mounter = IosDiskImageMounter::new(image_root, self.settings.tools.timeout())?;

            let ingestion = IngestionService::new(
                IosEnumeration::new(self.settings.tools.timeout()),
                Some(mounter),
                self.devices.clone(),
                DeviceType::Ios,
                self.settings.ios.refresh_interval(),
                self.settings.reservation.reconnect_backoff(),
            );
            let rx = self.shutdown_tx.subscribe();
            tasks.spawn(async move { ingestion.run(rx).await });
        }

        let mut first_error: Option<Error> = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!("Engine task failed: {}", e);
                    self.shutdown();
                    first_error.get_or_insert(e);
                }
                Err(join_err) => {
                    error!("Engine task panicked: {}", join_err);
                    self.shutdown();
                    first_error.get_or_insert(Error::process(join_err.to_string()));
                }
            }
        }

        self.automation.shutdown_all().await;
        info!("Engine stopped");

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
