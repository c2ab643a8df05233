//! # SegurosPy Core
//!
//! Shared building blocks for the backoffice: error type, configuration,
//! the lead/conversation/review-request data model, and the traits the
//! scheduled jobs are written against.
//!
//! ```text
//! segurospy-core
//!   ├── error    SegurosError + Result
//!   ├── config   SegurosConfig (TOML + env overrides)
//!   ├── models   Lead, Conversation, ReviewRequest, LeadFilter
//!   └── traits   LeadStore, NotificationGateway
//! ```

pub mod config;
pub mod error;
pub mod models;
pub mod traits;

pub use config::SegurosConfig;
pub use error::{Result, SegurosError};
pub use models::{
    ChatRole, Conversation, InsuranceType, Lead, LeadFilter, LeadStatus, NewConversation,
    NewLead, NewReviewRequest, ReviewRequest,
};
pub use traits::{LeadStore, NotificationGateway};
