//! Alert on leads still `new` long after they arrived.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use segurospy_core::error::Result;
use segurospy_core::models::{Lead, LeadFilter, LeadStatus};
use segurospy_core::traits::{LeadStore, NotificationGateway};

use super::escape_html;
use crate::engine::{JobReport, ScheduledJob};

pub struct StaleLeadJob {
    store: Arc<dyn LeadStore>,
    gateway: Arc<dyn NotificationGateway>,
    stale_after: Duration,
    limit: usize,
}

impl StaleLeadJob {
    pub fn new(
        store: Arc<dyn LeadStore>,
        gateway: Arc<dyn NotificationGateway>,
        stale_after: Duration,
        limit: usize,
    ) -> Self {
        Self {
            store,
            gateway,
            stale_after,
            limit,
        }
    }

    pub fn compose_alert(&self, leads: &[Lead], now: DateTime<Utc>) -> String {
        let mut message = format!(
            "⚠️ <b>ALERTA: {} LEADS SIN CONTACTAR</b>\n\nLos siguientes leads llevan más de {} horas sin respuesta:\n\n",
            leads.len(),
            self.stale_after.num_hours()
        );
        for lead in leads.iter().take(self.limit) {
            let hours = (now - lead.created_at).num_seconds().max(0) / 3600;
            message.push_str(&format!(
                "• <b>{}</b> ({}) - {hours}h\n",
                escape_html(&lead.name),
                lead.insurance_type
            ));
        }
        if leads.len() > self.limit {
            message.push_str(&format!("\n... y {} más", leads.len() - self.limit));
        }
        message
    }
}

#[async_trait]
impl ScheduledJob for StaleLeadJob {
    fn name(&self) -> &str {
        "Alertar leads pendientes"
    }

    async fn run(&self, now: DateTime<Utc>) -> Result<JobReport> {
        let filter = LeadFilter::new()
            .status(LeadStatus::New)
            .created_to(now - self.stale_after);
        let leads = self.store.find_leads(&filter).await?;

        if !leads.is_empty() {
            let message = self.compose_alert(&leads, now);
            if let Err(e) = self.gateway.send_push(&message).await {
                tracing::warn!("⚠️ Stale lead alert not delivered: {e}");
            }
        }

        Ok(JobReport::new(format!("{} stale leads", leads.len()), leads.len()))
    }
}
