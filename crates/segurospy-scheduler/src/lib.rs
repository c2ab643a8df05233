//! # SegurosPy Scheduler
//!
//! Single-process job scheduler plus the four backoffice jobs that run on it.
//!
//! ## Architecture
//! ```text
//! Scheduler (tokio interval, watch-channel shutdown)
//!   ├── daily_report     "daily 20:00"       → push: leads received today
//!   ├── review_requests  "daily 10:00"       → mail: review request to won leads
//!   ├── stale_leads      "every 4h"          → push: leads still `new` after 24h
//!   └── retention        "weekly sun 03:00"  → delete old chat conversations
//!
//! each firing → own tokio task → Err / panic caught, logged, counted
//! ```

pub mod clock;
pub mod engine;
pub mod jobs;
pub mod trigger;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{Firing, JobInfo, JobReport, ScheduledJob, Scheduler};
pub use jobs::register_builtin_jobs;
pub use trigger::Trigger;
