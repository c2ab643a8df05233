//! Scheduler engine: holds named jobs and fires them when their trigger matches.
//! A tokio interval drives `tick`; each firing runs in its own task so a slow
//! job never delays another job's firing.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use segurospy_core::config::SchedulerConfig;
use segurospy_core::error::{Result, SegurosError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::clock::Clock;
use crate::trigger::{Trigger, truncate_to_minute};

/// A due instant still fires while `now` is inside the same minute.
/// Triggers have minute resolution, so a later run would land on a
/// minute the trigger does not match.
fn misfire_grace() -> chrono::Duration {
    chrono::Duration::minutes(1)
}

/// Upper bound on the loop period, so every due minute is observed in time.
const MAX_TICK: std::time::Duration = std::time::Duration::from_secs(30);

/// A unit of work bound to a trigger.
#[async_trait]
pub trait ScheduledJob: Send + Sync {
    /// Human-readable name used in logs and job listings.
    fn name(&self) -> &str;

    /// Run once. `now` is the firing instant.
    async fn run(&self, now: DateTime<Utc>) -> Result<JobReport>;
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub summary: String,
    /// Rows or messages touched by the run.
    pub affected: usize,
}

impl JobReport {
    pub fn new(summary: impl Into<String>, affected: usize) -> Self {
        Self {
            summary: summary.into(),
            affected,
        }
    }
}

/// One firing started by [`Scheduler::tick`].
#[derive(Debug)]
pub struct Firing {
    pub job_id: String,
    pub scheduled_for: DateTime<Utc>,
    pub handle: JoinHandle<()>,
}

/// Snapshot of a registered job.
#[derive(Debug, Clone)]
pub struct JobInfo {
    pub id: String,
    pub name: String,
    pub trigger: Trigger,
    pub next_run: Option<DateTime<Utc>>,
    pub last_run: Option<DateTime<Utc>>,
    pub run_count: u64,
    pub failure_count: u64,
    pub running: bool,
    pub last_error: Option<String>,
}

#[derive(Debug, Default)]
struct JobState {
    running: bool,
    run_count: u64,
    failure_count: u64,
    last_run: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

struct JobEntry {
    name: String,
    trigger: Trigger,
    job: Arc<dyn ScheduledJob>,
    next_run: Option<DateTime<Utc>>,
    state: Arc<Mutex<JobState>>,
}

struct Shared {
    jobs: Mutex<BTreeMap<String, JobEntry>>,
    clock: Arc<dyn Clock>,
    offset: FixedOffset,
}

struct Runner {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

/// In-process scheduler. Construct one per process (or per test) and pass it
/// to whoever needs it.
pub struct Scheduler {
    shared: Arc<Shared>,
    tick_every: std::time::Duration,
    runner: Mutex<Option<Runner>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl Scheduler {
    pub fn new(clock: Arc<dyn Clock>, offset: FixedOffset, tick_every: std::time::Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                jobs: Mutex::new(BTreeMap::new()),
                clock,
                offset,
            }),
            tick_every: tick_every.clamp(std::time::Duration::from_millis(10), MAX_TICK),
            runner: Mutex::new(None),
        }
    }

    /// Build from the `[scheduler]` config section.
    pub fn from_config(config: &SchedulerConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let offset = config
            .utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| {
                SegurosError::Config(format!(
                    "utc_offset_minutes out of range: {}",
                    config.utc_offset_minutes
                ))
            })?;
        if !(1..=MAX_TICK.as_secs()).contains(&config.tick_secs) {
            return Err(SegurosError::Config(format!(
                "tick_secs must be between 1 and {}, got {}",
                MAX_TICK.as_secs(),
                config.tick_secs
            )));
        }
        Ok(Self::new(
            clock,
            offset,
            std::time::Duration::from_secs(config.tick_secs),
        ))
    }

    pub fn offset(&self) -> FixedOffset {
        self.shared.offset
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.shared.clock.now()
    }

    /// Register `job` under `job_id`. An existing job with the same id is
    /// replaced; its run history and in-flight flag carry over.
    pub fn register(&self, job_id: &str, trigger: Trigger, job: Arc<dyn ScheduledJob>) -> Result<()> {
        trigger.validate()?;
        let next_run = trigger.next_after(self.shared.clock.now(), self.shared.offset);
        let name = job.name().to_string();

        let mut jobs = lock(&self.shared.jobs);
        let state = match jobs.remove(job_id) {
            Some(previous) => {
                tracing::info!("🔁 Job replaced: '{job_id}' ({trigger})");
                previous.state
            }
            None => {
                tracing::info!("📅 Job added: '{job_id}' ({trigger})");
                Arc::new(Mutex::new(JobState::default()))
            }
        };
        jobs.insert(
            job_id.to_string(),
            JobEntry {
                name,
                trigger,
                job,
                next_run,
                state,
            },
        );
        Ok(())
    }

    /// Parse `spec` (see [`Trigger`]) and register.
    pub fn register_spec(&self, job_id: &str, spec: &str, job: Arc<dyn ScheduledJob>) -> Result<()> {
        let trigger: Trigger = spec.parse()?;
        self.register(job_id, trigger, job)
    }

    pub fn remove(&self, job_id: &str) -> bool {
        lock(&self.shared.jobs).remove(job_id).is_some()
    }

    pub fn jobs(&self) -> Vec<JobInfo> {
        lock(&self.shared.jobs)
            .iter()
            .map(|(id, entry)| {
                let state = lock(&*entry.state);
                JobInfo {
                    id: id.clone(),
                    name: entry.name.clone(),
                    trigger: entry.trigger,
                    next_run: entry.next_run,
                    last_run: state.last_run,
                    run_count: state.run_count,
                    failure_count: state.failure_count,
                    running: state.running,
                    last_error: state.last_error.clone(),
                }
            })
            .collect()
    }

    pub fn job_count(&self) -> usize {
        lock(&self.shared.jobs).len()
    }

    /// Fire every job due at `now`. Must be called inside a tokio runtime.
    pub fn tick(&self, now: DateTime<Utc>) -> Vec<Firing> {
        self.shared.tick(now)
    }

    /// Run a registered job immediately, outside its trigger.
    pub async fn run_now(&self, job_id: &str) -> Result<JobReport> {
        let (job, state) = {
            let jobs = lock(&self.shared.jobs);
            let entry = jobs
                .get(job_id)
                .ok_or_else(|| SegurosError::Scheduler(format!("unknown job '{job_id}'")))?;
            (Arc::clone(&entry.job), Arc::clone(&entry.state))
        };
        {
            let mut state = lock(&*state);
            if state.running {
                return Err(SegurosError::Scheduler(format!("job '{job_id}' is already running")));
            }
            state.running = true;
        }

        let now = self.shared.clock.now();
        execute(job_id, job, state, now)
            .await
            .map_err(|e| SegurosError::Scheduler(format!("job '{job_id}' failed: {e}")))
    }

    pub fn is_running(&self) -> bool {
        lock(&self.runner).is_some()
    }

    /// Start the tick loop. Returns `false` if it was already running.
    pub fn start(&self) -> bool {
        let mut runner = lock(&self.runner);
        if runner.is_some() {
            tracing::warn!("⚠️ Scheduler already running, start ignored");
            return false;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let shared = Arc::clone(&self.shared);
        let tick_every = self.tick_every;
        let join = tokio::spawn(async move {
            run_loop(shared, tick_every, shutdown_rx).await;
        });

        tracing::info!(
            "⏰ Scheduler started ({} jobs, check every {:?})",
            self.job_count(),
            tick_every
        );
        *runner = Some(Runner { shutdown_tx, join });
        true
    }

    /// Stop the tick loop and wait for it to exit. Firings already spawned
    /// keep running. Returns `false` if the scheduler was not running.
    pub async fn stop(&self) -> bool {
        let Some(runner) = lock(&self.runner).take() else {
            return false;
        };
        // ignore send error: the loop may already be gone
        let _ = runner.shutdown_tx.send(true);
        if let Err(e) = runner.join.await {
            tracing::warn!("⚠️ Scheduler loop ended abnormally: {e}");
        }
        tracing::info!("🛑 Scheduler stopped");
        true
    }
}

impl Shared {
    fn tick(&self, now: DateTime<Utc>) -> Vec<Firing> {
        let mut firings = Vec::new();
        let mut jobs = lock(&self.jobs);

        for (id, entry) in jobs.iter_mut() {
            let Some(due) = entry.next_run.filter(|at| *at <= now) else {
                continue;
            };
            entry.next_run = entry.trigger.next_after(now, self.offset);

            // A due instant only fires within its own minute. Older ones are
            // dropped; if `now` is itself a firing minute, that one runs.
            let scheduled_for = if now - due < misfire_grace() {
                due
            } else if entry.trigger.matches(now, self.offset) {
                tracing::warn!("⏭️ Job '{id}' missed its run at {due}, running the {} slot", entry.trigger);
                truncate_to_minute(now)
            } else {
                tracing::warn!("⏭️ Job '{id}' missed its run at {due}, next at {:?}", entry.next_run);
                continue;
            };

            {
                let mut state = lock(&*entry.state);
                if state.running {
                    tracing::warn!("⏭️ Job '{id}' still running, skipping firing at {scheduled_for}");
                    continue;
                }
                state.running = true;
            }

            tracing::info!("🔔 Job fired: '{}' ({id})", entry.name);
            let job_id = id.clone();
            let job = Arc::clone(&entry.job);
            let state = Arc::clone(&entry.state);
            let handle = tokio::spawn(async move {
                // errors are already logged and counted by execute
                let _ = execute(&job_id, job, state, now).await;
            });

            firings.push(Firing {
                job_id: id.clone(),
                scheduled_for,
                handle,
            });
        }

        firings
    }
}

async fn run_loop(shared: Arc<Shared>, tick_every: std::time::Duration, mut shutdown_rx: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(tick_every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        if *shutdown_rx.borrow() {
            break;
        }
        tokio::select! {
            biased;
            changed = shutdown_rx.changed() => {
                // sender dropped: the owning Scheduler is gone
                if changed.is_err() {
                    break;
                }
            }
            _ = interval.tick() => {
                let now = shared.clock.now();
                shared.tick(now);
            }
        }
    }
}

/// Run `job` on its own task so a panic is contained, then record the outcome.
/// The caller must have set `state.running`.
async fn execute(
    job_id: &str,
    job: Arc<dyn ScheduledJob>,
    state: Arc<Mutex<JobState>>,
    now: DateTime<Utc>,
) -> std::result::Result<JobReport, String> {
    let outcome = match tokio::spawn(async move { job.run(now).await }).await {
        Ok(Ok(report)) => Ok(report),
        Ok(Err(e)) => Err(e.to_string()),
        Err(join_err) if join_err.is_panic() => {
            Err(format!("panicked: {}", panic_message(join_err.into_panic())))
        }
        Err(join_err) => Err(format!("cancelled: {join_err}")),
    };

    let mut state = lock(&*state);
    state.running = false;
    state.run_count += 1;
    state.last_run = Some(now);
    match &outcome {
        Ok(report) => {
            state.last_error = None;
            tracing::info!("✅ Job '{job_id}' finished: {}", report.summary);
        }
        Err(e) => {
            state.failure_count += 1;
            state.last_error = Some(e.clone());
            tracing::error!("❌ Job '{job_id}' failed: {e}");
        }
    }
    outcome
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{Duration, TimeZone, Weekday};
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Semaphore;

    struct CountingJob {
        runs: AtomicUsize,
    }

    impl CountingJob {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                runs: AtomicUsize::new(0),
            })
        }

        fn runs(&self) -> usize {
            self.runs.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ScheduledJob for CountingJob {
        fn name(&self) -> &str {
            "counting"
        }

        async fn run(&self, _now: DateTime<Utc>) -> Result<JobReport> {
            let n = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(JobReport::new(format!("run {n}"), 1))
        }
    }

    struct FailingJob;

    #[async_trait]
    impl ScheduledJob for FailingJob {
        fn name(&self) -> &str {
            "failing"
        }

        async fn run(&self, _now: DateTime<Utc>) -> Result<JobReport> {
            Err(SegurosError::Store("database is locked".into()))
        }
    }

    struct PanickingJob;

    #[async_trait]
    impl ScheduledJob for PanickingJob {
        fn name(&self) -> &str {
            "panicking"
        }

        async fn run(&self, _now: DateTime<Utc>) -> Result<JobReport> {
            panic!("boom");
        }
    }

    /// Blocks until a permit is released by the test.
    struct GatedJob {
        gate: Semaphore,
        started: AtomicUsize,
    }

    #[async_trait]
    impl ScheduledJob for GatedJob {
        fn name(&self) -> &str {
            "gated"
        }

        async fn run(&self, _now: DateTime<Utc>) -> Result<JobReport> {
            self.started.fetch_add(1, Ordering::SeqCst);
            let permit = self
                .gate
                .acquire()
                .await
                .map_err(|e| SegurosError::Scheduler(e.to_string()))?;
            permit.forget();
            Ok(JobReport::new("released", 0))
        }
    }

    fn start_of_week() -> DateTime<Utc> {
        // Monday
        Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap()
    }

    fn scheduler_at(at: DateTime<Utc>, offset_minutes: i32) -> (Arc<ManualClock>, Scheduler) {
        let clock = Arc::new(ManualClock::new(at));
        let offset = FixedOffset::east_opt(offset_minutes * 60).unwrap();
        let scheduler = Scheduler::new(clock.clone(), offset, std::time::Duration::from_millis(10));
        (clock, scheduler)
    }

    async fn drain(firings: Vec<Firing>) -> Vec<DateTime<Utc>> {
        let mut fired = Vec::new();
        for firing in firings {
            fired.push(firing.scheduled_for);
            firing.handle.await.unwrap();
        }
        fired
    }

    #[test]
    fn test_invalid_spec_is_config_error() {
        let (_, scheduler) = scheduler_at(start_of_week(), 0);
        let err = scheduler
            .register_spec("bad", "every 25 hours", CountingJob::new())
            .unwrap_err();
        assert!(matches!(err, SegurosError::Config(_)));
        assert_eq!(scheduler.job_count(), 0);
    }

    #[test]
    fn test_from_config_rejects_bad_offset() {
        let config = SchedulerConfig {
            utc_offset_minutes: 24 * 60,
            ..SchedulerConfig::default()
        };
        let clock = Arc::new(ManualClock::new(start_of_week()));
        assert!(matches!(
            Scheduler::from_config(&config, clock),
            Err(SegurosError::Config(_))
        ));
    }

    #[test]
    fn test_from_config_rejects_tick_longer_than_a_minute_slot() {
        let clock = Arc::new(ManualClock::new(start_of_week()));
        for tick_secs in [0, 31, 60] {
            let config = SchedulerConfig {
                tick_secs,
                ..SchedulerConfig::default()
            };
            assert!(
                matches!(
                    Scheduler::from_config(&config, clock.clone()),
                    Err(SegurosError::Config(_))
                ),
                "tick_secs = {tick_secs}"
            );
        }
    }

    #[test]
    fn test_reregister_replaces() {
        let (_, scheduler) = scheduler_at(start_of_week(), 0);
        scheduler.register_spec("report", "daily 20:00", CountingJob::new()).unwrap();
        scheduler.register_spec("report", "daily 21:00", CountingJob::new()).unwrap();

        let jobs = scheduler.jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].trigger, Trigger::daily(21, 0).unwrap());
        assert_eq!(
            jobs[0].next_run,
            Some(Utc.with_ymd_and_hms(2026, 3, 2, 21, 0, 0).unwrap())
        );
        assert!(scheduler.remove("report"));
        assert!(!scheduler.remove("report"));
    }

    #[tokio::test]
    async fn test_fires_exactly_at_matching_minutes_over_a_week() {
        let triggers = [
            (Trigger::daily(20, 0).unwrap(), 7),
            (Trigger::every_hours(4).unwrap(), 42),
            (Trigger::weekly(Weekday::Sun, 3, 0).unwrap(), 1),
        ];

        for (trigger, expected_count) in triggers {
            // local time is UTC+1
            let offset = FixedOffset::east_opt(3600).unwrap();
            let week_start = start_of_week() - Duration::hours(1);
            let (clock, scheduler) = scheduler_at(week_start - Duration::seconds(30), 60);
            let job = CountingJob::new();
            scheduler.register("job", trigger, job.clone()).unwrap();

            let mut fired = BTreeSet::new();
            let mut expected = BTreeSet::new();
            for minute in 0..7 * 24 * 60 {
                let now = week_start + Duration::minutes(minute);
                clock.set(now);
                if trigger.matches(now, offset) {
                    expected.insert(now);
                }
                fired.extend(drain(scheduler.tick(now)).await);
            }

            assert_eq!(fired, expected, "{trigger}");
            assert_eq!(fired.len(), expected_count, "{trigger}");
            assert_eq!(job.runs(), expected_count);
        }
    }

    #[tokio::test]
    async fn test_missed_instants_are_dropped() {
        let (_, scheduler) = scheduler_at(start_of_week(), 0);
        let job = CountingJob::new();
        scheduler.register_spec("stale", "every 4h", job.clone()).unwrap();

        // 04:00 passed unobserved; 05:30 is not a firing minute
        let late = start_of_week() + Duration::hours(5) + Duration::minutes(30);
        assert!(drain(scheduler.tick(late)).await.is_empty());
        assert_eq!(
            scheduler.jobs()[0].next_run,
            Some(start_of_week() + Duration::hours(8))
        );
        assert_eq!(job.runs(), 0);

        let on_time = start_of_week() + Duration::hours(8);
        assert_eq!(drain(scheduler.tick(on_time)).await, vec![on_time]);
        assert_eq!(job.runs(), 1);
    }

    #[tokio::test]
    async fn test_daily_run_missed_overnight_does_not_fire_next_morning() {
        let evening = start_of_week() + Duration::hours(19);
        let (_, scheduler) = scheduler_at(evening, 0);
        let job = CountingJob::new();
        scheduler.register_spec("daily_report", "daily 20:00", job.clone()).unwrap();

        let next_morning = start_of_week() + Duration::days(1) + Duration::hours(3);
        assert!(drain(scheduler.tick(next_morning)).await.is_empty());
        assert_eq!(job.runs(), 0);
        assert_eq!(
            scheduler.jobs()[0].next_run,
            Some(start_of_week() + Duration::days(1) + Duration::hours(20))
        );
    }

    #[tokio::test]
    async fn test_late_tick_within_the_minute_still_fires() {
        let (_, scheduler) = scheduler_at(start_of_week(), 0);
        let job = CountingJob::new();
        scheduler.register_spec("hourly", "every 1h", job.clone()).unwrap();

        let due = start_of_week() + Duration::hours(1);
        let fired = drain(scheduler.tick(due + Duration::seconds(45))).await;
        assert_eq!(fired, vec![due]);

        // 02:00 missed, but 05:00 is itself a firing minute
        let later = start_of_week() + Duration::hours(5) + Duration::seconds(20);
        let fired = drain(scheduler.tick(later)).await;
        assert_eq!(fired, vec![start_of_week() + Duration::hours(5)]);
        assert_eq!(job.runs(), 2);
    }

    #[tokio::test]
    async fn test_failing_and_panicking_jobs_stay_registered() {
        let (_, scheduler) = scheduler_at(start_of_week(), 0);
        scheduler.register_spec("fails", "every 1h", Arc::new(FailingJob)).unwrap();
        scheduler.register_spec("panics", "every 1h", Arc::new(PanickingJob)).unwrap();

        for hour in 1..=2 {
            let now = start_of_week() + Duration::hours(hour);
            assert_eq!(drain(scheduler.tick(now)).await.len(), 2);
        }

        let jobs = scheduler.jobs();
        assert_eq!(jobs.len(), 2);
        for info in jobs {
            assert_eq!(info.run_count, 2);
            assert_eq!(info.failure_count, 2);
            assert!(!info.running);
            assert!(info.last_error.is_some());
        }
        let panicked = scheduler.jobs().into_iter().find(|j| j.id == "panics").unwrap();
        assert!(panicked.last_error.unwrap().contains("boom"));
    }

    #[tokio::test]
    async fn test_overlapping_firing_is_skipped() {
        let (_, scheduler) = scheduler_at(start_of_week(), 0);
        let job = Arc::new(GatedJob {
            gate: Semaphore::new(0),
            started: AtomicUsize::new(0),
        });
        scheduler.register_spec("slow", "every 1h", job.clone()).unwrap();

        let first = scheduler.tick(start_of_week() + Duration::hours(1));
        assert_eq!(first.len(), 1);
        assert!(scheduler.tick(start_of_week() + Duration::hours(2)).is_empty());
        assert!(scheduler.run_now("slow").await.is_err());

        job.gate.add_permits(1);
        drain(first).await;
        assert_eq!(job.started.load(Ordering::SeqCst), 1);

        job.gate.add_permits(1);
        let third = drain(scheduler.tick(start_of_week() + Duration::hours(3))).await;
        assert_eq!(third.len(), 1);
        assert_eq!(job.started.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_run_now() {
        let (_, scheduler) = scheduler_at(start_of_week(), 0);
        let job = CountingJob::new();
        scheduler.register_spec("report", "daily 20:00", job.clone()).unwrap();

        let report = scheduler.run_now("report").await.unwrap();
        assert_eq!(report.summary, "run 1");
        assert_eq!(scheduler.jobs()[0].run_count, 1);
        assert!(matches!(
            scheduler.run_now("missing").await,
            Err(SegurosError::Scheduler(_))
        ));
    }

    #[tokio::test]
    async fn test_start_twice_is_noop() {
        let (_, scheduler) = scheduler_at(start_of_week(), 0);
        assert!(scheduler.start());
        assert!(!scheduler.start());
        assert!(scheduler.is_running());
        assert!(scheduler.stop().await);
        assert!(!scheduler.stop().await);
        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn test_no_firings_after_stop() {
        let (clock, scheduler) = scheduler_at(start_of_week() + Duration::seconds(30), 0);
        let job = CountingJob::new();
        scheduler.register_spec("hourly", "every 1h", job.clone()).unwrap();
        assert!(scheduler.start());

        clock.set(start_of_week() + Duration::hours(1));
        for _ in 0..200 {
            if job.runs() == 1 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(job.runs(), 1);

        assert!(scheduler.stop().await);
        clock.set(start_of_week() + Duration::hours(2));
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert_eq!(job.runs(), 1);
    }
}
