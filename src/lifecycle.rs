//! Process wiring: store, gateway and scheduler built once and handed to the
//! startup/shutdown hooks.

use std::path::Path;
use std::sync::Arc;

use segurospy_channels::NotifyGateway;
use segurospy_core::error::Result;
use segurospy_core::traits::{LeadStore, NotificationGateway};
use segurospy_core::SegurosConfig;
use segurospy_db::SqliteLeadStore;
use segurospy_scheduler::{Clock, Scheduler, SystemClock, register_builtin_jobs};

pub struct Backoffice {
    scheduler: Scheduler,
}

impl Backoffice {
    /// Open the SQLite store at `config.database.path` (already expanded) and
    /// wire the real Telegram/SMTP gateway and wall clock.
    pub fn build(config: &SegurosConfig) -> Result<Self> {
        let store = Arc::new(SqliteLeadStore::open(Path::new(&config.database.path))?);
        let gateway = Arc::new(NotifyGateway::from_config(config));
        Self::with_components(config, store, gateway, Arc::new(SystemClock))
    }

    pub fn with_components(
        config: &SegurosConfig,
        store: Arc<dyn LeadStore>,
        gateway: Arc<dyn NotificationGateway>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let scheduler = Scheduler::from_config(&config.scheduler, clock)?;
        register_builtin_jobs(&scheduler, store, gateway, config)?;
        Ok(Self { scheduler })
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Called once the store is ready. Starts firing jobs.
    pub fn on_startup(&self) -> bool {
        self.scheduler.start()
    }

    /// Stops new firings; jobs already running finish on their own.
    pub async fn on_shutdown(&self) -> bool {
        self.scheduler.stop().await
    }
}
