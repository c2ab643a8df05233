//! # SegurosPy DB
//!
//! SQLite-backed [`LeadStore`](segurospy_core::LeadStore). One connection
//! behind a mutex; each trait call is a scoped unit of work.

pub mod sqlite;

pub use sqlite::SqliteLeadStore;
