//! The relational collaborator behind the retrieval gateway.
//!
//! Everything here is ground truth fetched directly from storage, bypassing
//! the language model. Timestamps round-trip as ISO-8601 UTC strings at the
//! boundary.

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

use crate::agent::{Scope, TaskStatus};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;

/// Kind of a searchable item.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ItemKind {
    Note,
    Doc,
    Task,
    Meeting,
}

/// One nearest-neighbor row, ordered by ascending distance. The body fields
/// mirror the store's structured columns; snippet extraction picks the first
/// non-empty one in priority order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorHit {
    pub item_id: String,
    pub project_id: Option<String>,
    pub kind: ItemKind,
    pub title: Option<String>,
    pub body_markdown: Option<String>,
    pub body_text: Option<String>,
    pub lines: Vec<String>,
    pub raw: Option<String>,
    /// Cosine distance in 0.0–1.0; smaller is closer.
    pub distance: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSummary {
    pub id: String,
    pub project_id: Option<String>,
    pub title: String,
    pub status: TaskStatus,
    pub due_date: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingSummary {
    pub id: String,
    pub project_id: Option<String>,
    pub title: String,
    pub starts_at: DateTime<Utc>,
    pub location: Option<String>,
}

/// Most recent risk score for one project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskSummary {
    pub project_id: String,
    pub score: f32,
    pub level: String,
    pub computed_at: DateTime<Utc>,
}

/// Storage collaborator. Implementations must be safe for concurrent
/// invocation by many simultaneous turns; no per-turn state lives here.
pub trait Store: Send + Sync {
    /// Nearest-neighbor search scoped by ownership, ordered by ascending
    /// distance, bounded to `k` rows. The distance cutoff is applied by the
    /// retrieval gateway, not here.
    fn vector_search<'a>(
        &'a self,
        scope: &'a Scope,
        embedding: &'a [f32],
        k: usize,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<VectorHit>>> + Send + 'a>>;

    /// Open (not done) tasks ordered by (status, due date, recency).
    fn open_tasks<'a>(
        &'a self,
        scope: &'a Scope,
        limit: usize,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<TaskSummary>>> + Send + 'a>>;

    /// Calendar events within the UTC day window of `day`.
    fn meetings_on<'a>(
        &'a self,
        scope: &'a Scope,
        day: NaiveDate,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<MeetingSummary>>> + Send + 'a>>;

    /// Most recent risk score per project; one row per project, latest
    /// computation wins.
    fn latest_risk_scores<'a>(
        &'a self,
        scope: &'a Scope,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<RiskSummary>>> + Send + 'a>>;

    /// Persist a generated digest. Only invoked when the caller explicitly
    /// asks for persistence; the pipeline itself never writes.
    fn save_digest<'a>(
        &'a self,
        scope: &'a Scope,
        date: NaiveDate,
        payload: &'a serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>>;
}
