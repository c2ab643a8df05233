//! Seams between the scheduled jobs and their collaborators.

pub mod notify;
pub mod store;

pub use notify::NotificationGateway;
pub use store::LeadStore;
