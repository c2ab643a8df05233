//! SQLite lead store.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC text
//! (`2026-03-01T12:00:00.000000Z`) so that text comparison in SQL is
//! chronological.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, params};
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use segurospy_core::error::{Result, SegurosError};
use segurospy_core::models::{
    Conversation, Lead, LeadFilter, LeadStatus, NewConversation, NewLead, NewReviewRequest,
    ReviewRequest,
};
use segurospy_core::traits::LeadStore;

const LEAD_COLUMNS: &str = "id, name, email, phone, insurance_type, message, locality, status, source, created_at, updated_at";

/// Lead store on a single SQLite connection.
pub struct SqliteLeadStore {
    conn: Mutex<Connection>,
}

impl SqliteLeadStore {
    /// Open or create the store at `path` (`:memory:` works for tests).
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(store_err)?;

        // WAL for concurrent readers; a no-op for in-memory databases
        conn.execute_batch("PRAGMA journal_mode=WAL;").ok();
        conn.execute_batch("PRAGMA foreign_keys=ON;").map_err(store_err)?;

        let store = Self { conn: Mutex::new(conn) };
        store.migrate()?;
        tracing::debug!("🗄️ Lead store opened at {}", path.display());
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open(Path::new(":memory:"))
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.lock();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS leads (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                email TEXT NOT NULL,
                phone TEXT NOT NULL DEFAULT '',
                insurance_type TEXT NOT NULL,
                message TEXT,
                locality TEXT,
                status TEXT NOT NULL DEFAULT 'new',
                source TEXT NOT NULL DEFAULT 'web',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_leads_status ON leads(status);
            CREATE INDEX IF NOT EXISTS idx_leads_created_at ON leads(created_at);

            CREATE TABLE IF NOT EXISTS conversations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                lead_id INTEGER REFERENCES leads(id),
                session_id TEXT NOT NULL,
                role TEXT NOT NULL,            -- 'user', 'assistant'
                message TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_conversations_session ON conversations(session_id);
            CREATE INDEX IF NOT EXISTS idx_conversations_created_at ON conversations(created_at);

            -- One receipt per lead; the unique key rejects duplicate sends at the storage layer
            CREATE TABLE IF NOT EXISTS review_requests (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                lead_id INTEGER NOT NULL UNIQUE REFERENCES leads(id),
                email_sent INTEGER NOT NULL DEFAULT 0,
                sent_at TEXT,
                created_at TEXT NOT NULL
            );
            ",
        )
        .map_err(|e| SegurosError::Store(format!("Migration: {e}")))
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl LeadStore for SqliteLeadStore {
    async fn find_leads(&self, filter: &LeadFilter) -> Result<Vec<Lead>> {
        let mut clauses: Vec<String> = Vec::new();
        let mut values: Vec<String> = Vec::new();
        let mut push = |clause: &str, value: String| {
            values.push(value);
            clauses.push(format!("{clause} ?{}", values.len()));
        };

        if let Some(status) = filter.status {
            push("status =", status.as_str().to_string());
        }
        if let Some(kind) = filter.insurance_type {
            push("insurance_type =", kind.as_str().to_string());
        }
        if let Some(at) = filter.created_from {
            push("created_at >=", ts(&at));
        }
        if let Some(at) = filter.created_to {
            push("created_at <=", ts(&at));
        }
        if let Some(at) = filter.updated_from {
            push("updated_at >=", ts(&at));
        }
        if let Some(at) = filter.updated_before {
            push("updated_at <", ts(&at));
        }

        let mut sql = format!("SELECT {LEAD_COLUMNS} FROM leads");
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY id");

        let conn = self.lock();
        let mut stmt = conn.prepare(&sql).map_err(store_err)?;
        let leads = stmt
            .query_map(rusqlite::params_from_iter(values.iter()), lead_from_row)
            .map_err(store_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(store_err)?;
        Ok(leads)
    }

    async fn insert_lead(&self, lead: &NewLead) -> Result<Lead> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO leads (name, email, phone, insurance_type, message, locality, status, source, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                lead.name,
                lead.email,
                lead.phone,
                lead.insurance_type.as_str(),
                lead.message,
                lead.locality,
                lead.status.as_str(),
                lead.source,
                ts(&lead.created_at),
                ts(&lead.updated_at),
            ],
        )
        .map_err(store_err)?;

        Ok(Lead {
            id: conn.last_insert_rowid(),
            name: lead.name.clone(),
            email: lead.email.clone(),
            phone: lead.phone.clone(),
            insurance_type: lead.insurance_type,
            message: lead.message.clone(),
            locality: lead.locality.clone(),
            status: lead.status,
            source: lead.source.clone(),
            created_at: lead.created_at,
            updated_at: lead.updated_at,
        })
    }

    async fn update_lead_status(&self, id: i64, status: LeadStatus, at: DateTime<Utc>) -> Result<bool> {
        let conn = self.lock();
        let changed = conn
            .execute(
                "UPDATE leads SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![status.as_str(), ts(&at), id],
            )
            .map_err(store_err)?;
        Ok(changed > 0)
    }

    async fn insert_conversation(&self, entry: &NewConversation) -> Result<Conversation> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO conversations (lead_id, session_id, role, message, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.lead_id,
                entry.session_id,
                entry.role.as_str(),
                entry.message,
                ts(&entry.created_at),
            ],
        )
        .map_err(store_err)?;

        Ok(Conversation {
            id: conn.last_insert_rowid(),
            lead_id: entry.lead_id,
            session_id: entry.session_id.clone(),
            role: entry.role,
            message: entry.message.clone(),
            created_at: entry.created_at,
        })
    }

    async fn delete_conversations_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let conn = self.lock();
        conn.execute(
            "DELETE FROM conversations WHERE created_at < ?1",
            params![ts(&cutoff)],
        )
        .map_err(store_err)
    }

    async fn review_request_exists(&self, lead_id: i64) -> Result<bool> {
        let conn = self.lock();
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM review_requests WHERE lead_id = ?1)",
            params![lead_id],
            |row| row.get::<_, bool>(0),
        )
        .map_err(store_err)
    }

    async fn commit_review_requests(&self, requests: &[NewReviewRequest]) -> Result<usize> {
        if requests.is_empty() {
            return Ok(0);
        }

        let mut conn = self.lock();
        let tx = conn.transaction().map_err(store_err)?;
        let mut inserted = 0;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT OR IGNORE INTO review_requests (lead_id, email_sent, sent_at, created_at)
                     VALUES (?1, 1, ?2, ?2)",
                )
                .map_err(store_err)?;
            for request in requests {
                inserted += stmt
                    .execute(params![request.lead_id, ts(&request.sent_at)])
                    .map_err(store_err)?;
            }
        }
        tx.commit().map_err(store_err)?;
        Ok(inserted)
    }

    async fn review_requests(&self) -> Result<Vec<ReviewRequest>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare("SELECT id, lead_id, email_sent, sent_at, created_at FROM review_requests ORDER BY id")
            .map_err(store_err)?;
        let requests = stmt
            .query_map([], |row| {
                let sent_at: Option<String> = row.get(3)?;
                Ok(ReviewRequest {
                    id: row.get(0)?,
                    lead_id: row.get(1)?,
                    email_sent: row.get(2)?,
                    sent_at: sent_at.map(|raw| parse_ts(3, &raw)).transpose()?,
                    created_at: parse_ts(4, &row.get::<_, String>(4)?)?,
                })
            })
            .map_err(store_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(store_err)?;
        Ok(requests)
    }
}

fn lead_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Lead> {
    Ok(Lead {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        phone: row.get(3)?,
        insurance_type: parse_text(4, &row.get::<_, String>(4)?)?,
        message: row.get(5)?,
        locality: row.get(6)?,
        status: parse_text(7, &row.get::<_, String>(7)?)?,
        source: row.get(8)?,
        created_at: parse_ts(9, &row.get::<_, String>(9)?)?,
        updated_at: parse_ts(10, &row.get::<_, String>(10)?)?,
    })
}

fn ts(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_text<T>(idx: usize, raw: &str) -> rusqlite::Result<T>
where
    T: FromStr<Err = SegurosError>,
{
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn store_err(e: rusqlite::Error) -> SegurosError {
    SegurosError::Store(e.to_string())
}
