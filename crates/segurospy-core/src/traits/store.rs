//! Lead store interface.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{
    Conversation, Lead, LeadFilter, LeadStatus, NewConversation, NewLead, NewReviewRequest,
    ReviewRequest,
};

/// Durable record of leads, chat conversations and review-request receipts.
///
/// Every call is its own scoped unit of work: multi-row writes commit
/// together or not at all.
#[async_trait]
pub trait LeadStore: Send + Sync {
    /// Leads matching `filter`, in insertion order.
    async fn find_leads(&self, filter: &LeadFilter) -> Result<Vec<Lead>>;

    async fn insert_lead(&self, lead: &NewLead) -> Result<Lead>;

    /// Move a lead to `status`, stamping `updated_at`. Returns false if no such lead.
    async fn update_lead_status(&self, id: i64, status: LeadStatus, at: DateTime<Utc>) -> Result<bool>;

    async fn insert_conversation(&self, entry: &NewConversation) -> Result<Conversation>;

    /// Delete every conversation with `created_at < cutoff`. Returns the number removed.
    async fn delete_conversations_before(&self, cutoff: DateTime<Utc>) -> Result<usize>;

    async fn review_request_exists(&self, lead_id: i64) -> Result<bool>;

    /// Insert receipts in one transaction. Leads that already have a receipt
    /// are ignored; returns the number of rows actually inserted.
    async fn commit_review_requests(&self, requests: &[NewReviewRequest]) -> Result<usize>;

    async fn review_requests(&self) -> Result<Vec<ReviewRequest>>;
}
