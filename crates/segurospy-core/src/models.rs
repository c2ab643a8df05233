//! Lead store data model: leads, chat conversations and review requests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::SegurosError;

/// Insurance category a lead asked about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsuranceType {
    Hogar,
    Auto,
    Vida,
    Decesos,
    Salud,
    Mascotas,
    Autonomos,
}

impl InsuranceType {
    pub const ALL: [InsuranceType; 7] = [
        InsuranceType::Hogar,
        InsuranceType::Auto,
        InsuranceType::Vida,
        InsuranceType::Decesos,
        InsuranceType::Salud,
        InsuranceType::Mascotas,
        InsuranceType::Autonomos,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InsuranceType::Hogar => "hogar",
            InsuranceType::Auto => "auto",
            InsuranceType::Vida => "vida",
            InsuranceType::Decesos => "decesos",
            InsuranceType::Salud => "salud",
            InsuranceType::Mascotas => "mascotas",
            InsuranceType::Autonomos => "autonomos",
        }
    }
}

impl fmt::Display for InsuranceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InsuranceType {
    type Err = SegurosError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        InsuranceType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| SegurosError::InvalidValue(format!("unknown insurance type '{s}'")))
    }
}

/// Position of a lead in the sales funnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    #[serde(alias = "nuevo")]
    New,
    #[serde(alias = "contactado")]
    Contacted,
    #[serde(alias = "en_proceso")]
    InProgress,
    #[serde(alias = "cotizado")]
    Quoted,
    #[serde(alias = "cerrado_ganado")]
    Won,
    #[serde(alias = "cerrado_perdido")]
    Lost,
}

impl LeadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::New => "new",
            LeadStatus::Contacted => "contacted",
            LeadStatus::InProgress => "in_progress",
            LeadStatus::Quoted => "quoted",
            LeadStatus::Won => "won",
            LeadStatus::Lost => "lost",
        }
    }
}

impl fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeadStatus {
    type Err = SegurosError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "new" | "nuevo" => Ok(LeadStatus::New),
            "contacted" | "contactado" => Ok(LeadStatus::Contacted),
            "in_progress" | "en_proceso" => Ok(LeadStatus::InProgress),
            "quoted" | "cotizado" => Ok(LeadStatus::Quoted),
            "won" | "cerrado_ganado" => Ok(LeadStatus::Won),
            "lost" | "cerrado_perdido" => Ok(LeadStatus::Lost),
            other => Err(SegurosError::InvalidValue(format!("unknown lead status '{other}'"))),
        }
    }
}

/// A prospective customer's inquiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub insurance_type: InsuranceType,
    pub message: Option<String>,
    pub locality: Option<String>,
    pub status: LeadStatus,
    /// Where the lead came from: web, comparador, landing...
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert payload for a lead. Timestamps are explicit so callers control the clock.
#[derive(Debug, Clone)]
pub struct NewLead {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub insurance_type: InsuranceType,
    pub message: Option<String>,
    pub locality: Option<String>,
    pub status: LeadStatus,
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NewLead {
    /// A fresh web lead in the `new` state, created and updated at `at`.
    pub fn new(name: &str, email: &str, insurance_type: InsuranceType, at: DateTime<Utc>) -> Self {
        Self {
            name: name.to_string(),
            email: email.to_string(),
            phone: String::new(),
            insurance_type,
            message: None,
            locality: None,
            status: LeadStatus::New,
            source: "web".to_string(),
            created_at: at,
            updated_at: at,
        }
    }

    pub fn with_status(mut self, status: LeadStatus, updated_at: DateTime<Utc>) -> Self {
        self.status = status;
        self.updated_at = updated_at;
        self
    }
}

/// Speaker of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

impl FromStr for ChatRole {
    type Err = SegurosError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(ChatRole::User),
            "assistant" => Ok(ChatRole::Assistant),
            other => Err(SegurosError::InvalidValue(format!("unknown chat role '{other}'"))),
        }
    }
}

/// One persisted chat log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: i64,
    pub lead_id: Option<i64>,
    pub session_id: String,
    pub role: ChatRole,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewConversation {
    pub lead_id: Option<i64>,
    pub session_id: String,
    pub role: ChatRole,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Receipt of a review-request mail. At most one per lead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewRequest {
    pub id: i64,
    pub lead_id: i64,
    pub email_sent: bool,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewReviewRequest {
    pub lead_id: i64,
    pub sent_at: DateTime<Utc>,
}

/// Predicate for lead retrieval. Unset fields do not filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LeadFilter {
    pub status: Option<LeadStatus>,
    pub insurance_type: Option<InsuranceType>,
    /// `created_at >= created_from`
    pub created_from: Option<DateTime<Utc>>,
    /// `created_at <= created_to`
    pub created_to: Option<DateTime<Utc>>,
    /// `updated_at >= updated_from`
    pub updated_from: Option<DateTime<Utc>>,
    /// `updated_at < updated_before`
    pub updated_before: Option<DateTime<Utc>>,
}

impl LeadFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: LeadStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn insurance_type(mut self, insurance_type: InsuranceType) -> Self {
        self.insurance_type = Some(insurance_type);
        self
    }

    pub fn created_from(mut self, at: DateTime<Utc>) -> Self {
        self.created_from = Some(at);
        self
    }

    pub fn created_to(mut self, at: DateTime<Utc>) -> Self {
        self.created_to = Some(at);
        self
    }

    pub fn updated_from(mut self, at: DateTime<Utc>) -> Self {
        self.updated_from = Some(at);
        self
    }

    pub fn updated_before(mut self, at: DateTime<Utc>) -> Self {
        self.updated_before = Some(at);
        self
    }

    /// In-memory evaluation of the same predicate the store applies in SQL.
    pub fn matches(&self, lead: &Lead) -> bool {
        self.status.is_none_or(|s| lead.status == s)
            && self.insurance_type.is_none_or(|t| lead.insurance_type == t)
            && self.created_from.is_none_or(|at| lead.created_at >= at)
            && self.created_to.is_none_or(|at| lead.created_at <= at)
            && self.updated_from.is_none_or(|at| lead.updated_at >= at)
            && self.updated_before.is_none_or(|at| lead.updated_at < at)
    }
}
