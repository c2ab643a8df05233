//! Weekly sweep of old chat conversations.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use segurospy_core::error::Result;
use segurospy_core::traits::LeadStore;

use crate::engine::{JobReport, ScheduledJob};

pub struct RetentionJob {
    store: Arc<dyn LeadStore>,
    keep: Duration,
}

impl RetentionJob {
    pub fn new(store: Arc<dyn LeadStore>, keep: Duration) -> Self {
        Self { store, keep }
    }
}

#[async_trait]
impl ScheduledJob for RetentionJob {
    fn name(&self) -> &str {
        "Limpieza semanal"
    }

    async fn run(&self, now: DateTime<Utc>) -> Result<JobReport> {
        let cutoff = now - self.keep;
        let deleted = self.store.delete_conversations_before(cutoff).await?;
        tracing::info!("🧹 Deleted {deleted} conversations older than {cutoff}");
        Ok(JobReport::new(format!("{deleted} conversations deleted"), deleted))
    }
}
