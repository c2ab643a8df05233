//! Backoffice jobs run by the scheduler.

pub mod daily_report;
pub mod retention;
pub mod review_requests;
pub mod stale_leads;

use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, Utc};
use segurospy_core::config::SegurosConfig;
use segurospy_core::error::{Result, SegurosError};
use segurospy_core::traits::{LeadStore, NotificationGateway};

use crate::engine::Scheduler;

pub use daily_report::DailyReportJob;
pub use retention::RetentionJob;
pub use review_requests::ReviewRequestJob;
pub use stale_leads::StaleLeadJob;

/// Register the four backoffice jobs with the triggers from `config`.
/// Any unparsable trigger spec aborts with a config error.
pub fn register_builtin_jobs(
    scheduler: &Scheduler,
    store: Arc<dyn LeadStore>,
    gateway: Arc<dyn NotificationGateway>,
    config: &SegurosConfig,
) -> Result<()> {
    let jobs = &config.scheduler.jobs;

    scheduler.register_spec(
        "daily_report",
        &jobs.daily_report,
        Arc::new(DailyReportJob::new(
            Arc::clone(&store),
            Arc::clone(&gateway),
            scheduler.offset(),
        )),
    )?;
    scheduler.register_spec(
        "review_requests",
        &jobs.review_requests,
        Arc::new(ReviewRequestJob::new(
            Arc::clone(&store),
            Arc::clone(&gateway),
            config.company.clone(),
            Duration::days(config.scheduler.review_delay_days),
        )),
    )?;
    scheduler.register_spec(
        "stale_leads",
        &jobs.stale_leads,
        Arc::new(StaleLeadJob::new(
            Arc::clone(&store),
            gateway,
            Duration::hours(config.scheduler.stale_after_hours),
            config.scheduler.stale_alert_limit,
        )),
    )?;
    scheduler.register_spec(
        "retention",
        &jobs.retention,
        Arc::new(RetentionJob::new(
            store,
            Duration::days(config.scheduler.retention_days),
        )),
    )?;
    Ok(())
}

/// Escape text for Telegram/mail HTML.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Start of the local calendar day containing `now`, as a UTC instant.
pub(crate) fn local_midnight(now: DateTime<Utc>, offset: FixedOffset) -> Result<DateTime<Utc>> {
    now.with_timezone(&offset)
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .and_then(|midnight| midnight.and_local_timezone(offset).single())
        .map(|midnight| midnight.with_timezone(&Utc))
        .ok_or_else(|| SegurosError::Scheduler(format!("no local midnight for {now}")))
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;
    use segurospy_db::SqliteLeadStore;

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("Pérez & <Hijos>"), "Pérez &amp; &lt;Hijos&gt;");
    }

    #[test]
    fn test_local_midnight() {
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 23, 30, 0).unwrap();
        let madrid = FixedOffset::east_opt(3600).unwrap();
        // 00:30 local on the 3rd
        assert_eq!(
            local_midnight(now, madrid).unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 2, 23, 0, 0).unwrap()
        );
        assert_eq!(
            local_midnight(now, FixedOffset::east_opt(0).unwrap()).unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_register_builtin_jobs() {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap()));
        let config = SegurosConfig::default();
        let scheduler = Scheduler::from_config(&config.scheduler, clock).unwrap();
        let store = Arc::new(SqliteLeadStore::open_in_memory().unwrap());
        let gateway = Arc::new(testing::RecordingGateway::default());

        register_builtin_jobs(&scheduler, store, gateway, &config).unwrap();

        let ids: Vec<String> = scheduler.jobs().into_iter().map(|j| j.id).collect();
        assert_eq!(ids, ["daily_report", "retention", "review_requests", "stale_leads"]);
        let stale = scheduler.jobs().into_iter().find(|j| j.id == "stale_leads").unwrap();
        assert_eq!(
            stale.next_run,
            Some(Utc.with_ymd_and_hms(2026, 3, 2, 16, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_bad_trigger_in_config_is_rejected() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let mut config = SegurosConfig::default();
        config.scheduler.jobs.retention = "fortnightly".into();
        let scheduler = Scheduler::from_config(&config.scheduler, clock).unwrap();
        let store = Arc::new(SqliteLeadStore::open_in_memory().unwrap());
        let gateway = Arc::new(testing::RecordingGateway::default());

        let err = register_builtin_jobs(&scheduler, store, gateway, &config).unwrap_err();
        assert!(matches!(err, SegurosError::Config(_)));
    }
}
