//! Daily lead report pushed to the brokerage chat.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use segurospy_core::error::Result;
use segurospy_core::models::{InsuranceType, LeadFilter};
use segurospy_core::traits::{LeadStore, NotificationGateway};

use super::local_midnight;
use crate::engine::{JobReport, ScheduledJob};

pub struct DailyReportJob {
    store: Arc<dyn LeadStore>,
    gateway: Arc<dyn NotificationGateway>,
    offset: FixedOffset,
}

impl DailyReportJob {
    pub fn new(store: Arc<dyn LeadStore>, gateway: Arc<dyn NotificationGateway>, offset: FixedOffset) -> Self {
        Self { store, gateway, offset }
    }
}

/// Counts per insurance type, in enum order.
pub fn compose_report(
    counts: &BTreeMap<InsuranceType, usize>,
    now: DateTime<Utc>,
    offset: FixedOffset,
) -> String {
    let local = now.with_timezone(&offset);
    let total: usize = counts.values().sum();

    let mut message = format!(
        "📊 <b>INFORME DIARIO - {}</b>\n\n📈 <b>Leads recibidos:</b> {total}\n\n📋 <b>Por tipo de seguro:</b>\n",
        local.format("%d/%m/%Y")
    );
    for (insurance_type, count) in counts {
        message.push_str(&format!("  • {insurance_type}: {count}\n"));
    }
    if total == 0 {
        message.push_str("\n😢 No se recibieron leads hoy.\n");
    }
    message.push_str(&format!("\n⏰ Generado: {}", local.format("%H:%M")));
    message
}

#[async_trait]
impl ScheduledJob for DailyReportJob {
    fn name(&self) -> &str {
        "Informe diario de leads"
    }

    async fn run(&self, now: DateTime<Utc>) -> Result<JobReport> {
        let since = local_midnight(now, self.offset)?;
        let leads = self.store.find_leads(&LeadFilter::new().created_from(since)).await?;

        let mut counts: BTreeMap<InsuranceType, usize> = BTreeMap::new();
        for lead in &leads {
            *counts.entry(lead.insurance_type).or_default() += 1;
        }

        let message = compose_report(&counts, now, self.offset);
        if let Err(e) = self.gateway.send_push(&message).await {
            tracing::warn!("⚠️ Daily report not delivered: {e}");
        }

        Ok(JobReport::new(format!("{} leads today", leads.len()), leads.len()))
    }
}
