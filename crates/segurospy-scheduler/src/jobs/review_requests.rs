//! Review solicitation: mail won leads a week after closing, once per lead.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use segurospy_core::config::CompanyConfig;
use segurospy_core::error::Result;
use segurospy_core::models::{Lead, LeadFilter, LeadStatus, NewReviewRequest};
use segurospy_core::traits::{LeadStore, NotificationGateway};

use super::escape_html;
use crate::engine::{JobReport, ScheduledJob};

pub struct ReviewRequestJob {
    store: Arc<dyn LeadStore>,
    gateway: Arc<dyn NotificationGateway>,
    company: CompanyConfig,
    delay: Duration,
}

impl ReviewRequestJob {
    pub fn new(
        store: Arc<dyn LeadStore>,
        gateway: Arc<dyn NotificationGateway>,
        company: CompanyConfig,
        delay: Duration,
    ) -> Self {
        Self {
            store,
            gateway,
            company,
            delay,
        }
    }

    /// Leads closed within `[now - delay - 1d, now - delay)`.
    fn window(&self, now: DateTime<Utc>) -> LeadFilter {
        let end = now - self.delay;
        LeadFilter::new()
            .status(LeadStatus::Won)
            .updated_from(end - Duration::days(1))
            .updated_before(end)
    }

    /// Mails every candidate without a receipt, collecting the ones delivered.
    /// Receipts gathered before an error stay in `sent` for the caller to commit.
    async fn send_pending(
        &self,
        candidates: &[Lead],
        now: DateTime<Utc>,
        sent: &mut Vec<NewReviewRequest>,
    ) -> Result<()> {
        let subject = self.subject();
        for lead in candidates {
            if self.store.review_request_exists(lead.id).await? {
                continue;
            }
            match self.gateway.send_mail(&lead.email, &subject, &self.body(lead)).await {
                Ok(()) => sent.push(NewReviewRequest {
                    lead_id: lead.id,
                    sent_at: now,
                }),
                // left without a receipt so a later run in the window retries it
                Err(e) => tracing::warn!("⚠️ Review request to lead {} not sent: {e}", lead.id),
            }
        }
        Ok(())
    }

    pub fn subject(&self) -> String {
        format!("¿Qué tal tu experiencia con {}? ⭐", self.company.name)
    }

    pub fn body(&self, lead: &Lead) -> String {
        let company = escape_html(&self.company.name);
        format!(
            r#"<html>
<body style="font-family: Arial, sans-serif; padding: 20px;">
    <h2>Hola {name},</h2>
    <p>Esperamos que estés disfrutando de tu nuevo seguro. 🎉</p>
    <p>Tu opinión es muy importante para nosotros. ¿Podrías dedicarnos 1 minuto para dejarnos una reseña en Google?</p>
    <p style="text-align: center; margin: 30px 0;">
        <a href="{url}" style="background: #6366f1; color: white; padding: 15px 30px; text-decoration: none; border-radius: 8px;">⭐ Dejar Reseña</a>
    </p>
    <p>¡Gracias por confiar en nosotros!</p>
    <p><strong>El equipo de {company}</strong></p>
</body>
</html>"#,
            name = escape_html(&lead.name),
            url = escape_html(&self.company.review_url),
        )
    }
}

#[async_trait]
impl ScheduledJob for ReviewRequestJob {
    fn name(&self) -> &str {
        "Solicitar reseñas"
    }

    async fn run(&self, now: DateTime<Utc>) -> Result<JobReport> {
        let candidates = self.store.find_leads(&self.window(now)).await?;

        let mut sent: Vec<NewReviewRequest> = Vec::new();
        let outcome = self.send_pending(&candidates, now, &mut sent).await;
        if let Err(e) = &outcome {
            tracing::error!("❌ Review solicitation interrupted after {} mails: {e}", sent.len());
        }

        let recorded = if sent.is_empty() {
            0
        } else {
            self.store.commit_review_requests(&sent).await?
        };
        if recorded < sent.len() {
            tracing::warn!(
                "⚠️ {} review requests were already recorded by a concurrent run",
                sent.len() - recorded
            );
        }
        outcome?;

        Ok(JobReport::new(
            format!("{recorded} review requests sent ({} candidates)", candidates.len()),
            recorded,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::testing::{FailingStore, FlakyStore, RecordingGateway};
    use chrono::TimeZone;
    use segurospy_core::error::SegurosError;
    use segurospy_core::models::{InsuranceType, NewLead};
    use segurospy_db::SqliteLeadStore;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap()
    }

    fn job(store: Arc<dyn LeadStore>, gateway: Arc<RecordingGateway>) -> ReviewRequestJob {
        ReviewRequestJob::new(store, gateway, CompanyConfig::default(), Duration::days(7))
    }

    async fn won_lead(store: &SqliteLeadStore, name: &str, email: &str, closed_at: DateTime<Utc>) -> Lead {
        let lead = NewLead::new(name, email, InsuranceType::Hogar, closed_at - Duration::days(3))
            .with_status(LeadStatus::Won, closed_at);
        store.insert_lead(&lead).await.unwrap()
    }

    #[tokio::test]
    async fn test_sends_once_per_lead() {
        let store = Arc::new(SqliteLeadStore::open_in_memory().unwrap());
        let lead = won_lead(&store, "Ana", "ana@example.com", t0()).await;
        let gateway = Arc::new(RecordingGateway::default());
        let job = job(store.clone(), gateway.clone());

        let first = job.run(t0() + Duration::days(7) + Duration::hours(1)).await.unwrap();
        assert_eq!(first.affected, 1);
        let second = job.run(t0() + Duration::days(7) + Duration::hours(2)).await.unwrap();
        assert_eq!(second.affected, 0);

        let mails = gateway.mails();
        assert_eq!(mails.len(), 1);
        assert_eq!(mails[0].to, "ana@example.com");
        assert_eq!(mails[0].subject, "¿Qué tal tu experiencia con Candi Seguros? ⭐");
        assert!(mails[0].body.contains("Hola Ana,"));
        assert!(mails[0].body.contains("https://g.page/r/candiseguros/review"));

        let receipts = store.review_requests().await.unwrap();
        assert_eq!(receipts.len(), 1);
        assert_eq!(receipts[0].lead_id, lead.id);
        assert!(receipts[0].email_sent);
        assert_eq!(
            receipts[0].sent_at,
            Some(t0() + Duration::days(7) + Duration::hours(1))
        );
    }

    #[tokio::test]
    async fn test_window_is_half_open() {
        let store = Arc::new(SqliteLeadStore::open_in_memory().unwrap());
        let now = t0() + Duration::days(30);
        // exactly delay ago: excluded
        won_lead(&store, "Justo", "justo@example.com", now - Duration::days(7)).await;
        // exactly delay + 1 day ago: included
        won_lead(&store, "Borde", "borde@example.com", now - Duration::days(8)).await;
        // too old
        won_lead(&store, "Viejo", "viejo@example.com", now - Duration::days(8) - Duration::seconds(1)).await;
        // not won
        let open = NewLead::new("Abierto", "abierto@example.com", InsuranceType::Auto, now - Duration::days(10))
            .with_status(LeadStatus::Quoted, now - Duration::days(7) - Duration::hours(5));
        store.insert_lead(&open).await.unwrap();

        let gateway = Arc::new(RecordingGateway::default());
        job(store, gateway.clone()).run(now).await.unwrap();

        let recipients: Vec<String> = gateway.mails().into_iter().map(|m| m.to).collect();
        assert_eq!(recipients, ["borde@example.com"]);
    }

    #[tokio::test]
    async fn test_failed_mail_is_not_recorded() {
        let store = Arc::new(SqliteLeadStore::open_in_memory().unwrap());
        let ana = won_lead(&store, "Ana", "ana@example.com", t0()).await;
        won_lead(&store, "Luis", "luis@example.com", t0()).await;
        let gateway = Arc::new(RecordingGateway {
            fail_mail_to: Some("luis@example.com".into()),
            ..Default::default()
        });

        let report = job(store.clone(), gateway.clone())
            .run(t0() + Duration::days(7) + Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(report.affected, 1);

        let receipts = store.review_requests().await.unwrap();
        assert_eq!(receipts.len(), 1);
        assert_eq!(receipts[0].lead_id, ana.id);

        // Luis is still a candidate on the next run within the window
        let retry = Arc::new(RecordingGateway::default());
        let report = job(store.clone(), retry.clone())
            .run(t0() + Duration::days(7) + Duration::hours(3))
            .await
            .unwrap();
        assert_eq!(report.affected, 1);
        assert_eq!(retry.mails()[0].to, "luis@example.com");
    }

    #[tokio::test]
    async fn test_store_error_mid_run_keeps_receipts_of_sent_mail() {
        let store = Arc::new(SqliteLeadStore::open_in_memory().unwrap());
        let ana = won_lead(&store, "Ana", "ana@example.com", t0()).await;
        won_lead(&store, "Luis", "luis@example.com", t0()).await;
        let gateway = Arc::new(RecordingGateway::default());
        let flaky = Arc::new(FlakyStore::new(store.clone(), 2));

        let err = job(flaky, gateway.clone())
            .run(t0() + Duration::days(7) + Duration::hours(1))
            .await
            .unwrap_err();
        assert!(matches!(err, SegurosError::Store(_)));

        let receipts = store.review_requests().await.unwrap();
        assert_eq!(receipts.len(), 1);
        assert_eq!(receipts[0].lead_id, ana.id);

        // the retry mails Luis only
        let report = job(store.clone(), gateway.clone())
            .run(t0() + Duration::days(7) + Duration::hours(2))
            .await
            .unwrap();
        assert_eq!(report.affected, 1);
        let recipients: Vec<String> = gateway.mails().into_iter().map(|m| m.to).collect();
        assert_eq!(recipients, ["ana@example.com", "luis@example.com"]);
    }

    #[tokio::test]
    async fn test_name_is_escaped() {
        let store = Arc::new(SqliteLeadStore::open_in_memory().unwrap());
        won_lead(&store, "<script>", "x@example.com", t0()).await;
        let gateway = Arc::new(RecordingGateway::default());
        job(store, gateway.clone())
            .run(t0() + Duration::days(7) + Duration::hours(1))
            .await
            .unwrap();
        assert!(gateway.mails()[0].body.contains("Hola &lt;script&gt;,"));
    }

    #[tokio::test]
    async fn test_store_failure_aborts() {
        let gateway = Arc::new(RecordingGateway::default());
        let err = job(Arc::new(FailingStore), gateway.clone())
            .run(t0())
            .await
            .unwrap_err();
        assert!(matches!(err, SegurosError::Store(_)));
        assert!(gateway.mails().is_empty());
    }
}
