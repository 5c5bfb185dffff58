//! SQLite-backed store on `sqlx`.
//!
//! Vector search is a brute-force scan: embeddings are small BLOBs and the
//! candidate set per scope stays in the low thousands, so a linear pass with
//! a sort beats maintaining an ANN index. Timestamps are RFC 3339 TEXT
//! columns compared lexicographically, which is ordering-correct for UTC.

use super::{ItemKind, MeetingSummary, RiskSummary, Store, TaskSummary, VectorHit};
use crate::agent::{Scope, TaskStatus};
use crate::error::StoreError;
use crate::vector::{bytes_to_vec, cosine_distance};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::str::FromStr;

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS projects (
    id          TEXT PRIMARY KEY,
    owner_id    TEXT NOT NULL,
    slug        TEXT NOT NULL,
    name        TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS items (
    id            TEXT PRIMARY KEY,
    project_id    TEXT,
    owner_id      TEXT NOT NULL,
    kind          TEXT NOT NULL,
    title         TEXT,
    body_markdown TEXT,
    body_text     TEXT,
    body_lines    TEXT,
    raw           TEXT,
    embedding     BLOB,
    created_at    TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_items_project ON items(project_id);
CREATE INDEX IF NOT EXISTS idx_items_owner ON items(owner_id);

CREATE TABLE IF NOT EXISTS tasks (
    id          TEXT PRIMARY KEY,
    project_id  TEXT,
    owner_id    TEXT NOT NULL,
    title       TEXT NOT NULL,
    status      TEXT NOT NULL,
    due_date    TEXT,
    updated_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_tasks_project ON tasks(project_id);

CREATE TABLE IF NOT EXISTS events (
    id          TEXT PRIMARY KEY,
    project_id  TEXT,
    owner_id    TEXT NOT NULL,
    title       TEXT NOT NULL,
    starts_at   TEXT NOT NULL,
    location    TEXT
);
CREATE INDEX IF NOT EXISTS idx_events_starts ON events(starts_at);

CREATE TABLE IF NOT EXISTS risk_scores (
    project_id  TEXT NOT NULL,
    owner_id    TEXT NOT NULL,
    score       REAL NOT NULL,
    level       TEXT NOT NULL,
    computed_at TEXT NOT NULL,
    PRIMARY KEY (project_id, computed_at)
);

CREATE TABLE IF NOT EXISTS digests (
    scope_key   TEXT NOT NULL,
    digest_date TEXT NOT NULL,
    payload     TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    PRIMARY KEY (scope_key, digest_date)
);
";

#[derive(Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        Self::migrate(pool).await
    }

    #[cfg(test)]
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        Self::migrate(pool).await
    }

    async fn migrate(pool: SqlitePool) -> Result<Self, StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&pool)
            .await
            .map_err(StoreError::Migration)?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert a searchable item with an optional precomputed embedding.
    #[allow(clippy::too_many_arguments)]
    pub async fn insert_item(
        &self,
        id: &str,
        project_id: Option<&str>,
        owner_id: &str,
        kind: ItemKind,
        title: Option<&str>,
        body_markdown: Option<&str>,
        embedding: Option<&[u8]>,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO items (id, project_id, owner_id, kind, title, body_markdown, embedding, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(project_id)
        .bind(owner_id)
        .bind(kind.to_string())
        .bind(title)
        .bind(body_markdown)
        .bind(embedding)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_task(
        &self,
        task: &TaskSummary,
        owner_id: &str,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO tasks (id, project_id, owner_id, title, status, due_date, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&task.id)
        .bind(task.project_id.as_deref())
        .bind(owner_id)
        .bind(&task.title)
        .bind(task.status.to_string())
        .bind(task.due_date.map(|d| d.to_rfc3339()))
        .bind(task.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_meeting(
        &self,
        meeting: &MeetingSummary,
        owner_id: &str,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO events (id, project_id, owner_id, title, starts_at, location)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&meeting.id)
        .bind(meeting.project_id.as_deref())
        .bind(owner_id)
        .bind(&meeting.title)
        .bind(meeting.starts_at.to_rfc3339())
        .bind(meeting.location.as_deref())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_risk(&self, risk: &RiskSummary, owner_id: &str) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO risk_scores (project_id, owner_id, score, level, computed_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&risk.project_id)
        .bind(owner_id)
        .bind(f64::from(risk.score))
        .bind(&risk.level)
        .bind(risk.computed_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn scope_predicate(scope: &Scope) -> (&'static str, &str) {
        match scope {
            Scope::Project { project_id, .. } => ("project_id = ?", project_id),
            Scope::Global { user_id } => ("owner_id = ?", user_id),
        }
    }

    fn scope_key(scope: &Scope) -> String {
        match scope {
            Scope::Project { project_id, .. } => format!("project:{project_id}"),
            Scope::Global { user_id } => format!("user:{user_id}"),
        }
    }

    fn parse_ts(raw: &str) -> anyhow::Result<DateTime<Utc>> {
        Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
    }

    fn row_to_task(row: &SqliteRow) -> anyhow::Result<TaskSummary> {
        let status_raw: String = row.get("status");
        let due_raw: Option<String> = row.get("due_date");
        let updated_raw: String = row.get("updated_at");
        Ok(TaskSummary {
            id: row.get("id"),
            project_id: row.get("project_id"),
            title: row.get("title"),
            status: TaskStatus::from_str(&status_raw)
                .map_err(|_| anyhow::anyhow!("unknown task status: {status_raw}"))?,
            due_date: due_raw.as_deref().map(Self::parse_ts).transpose()?,
            updated_at: Self::parse_ts(&updated_raw)?,
        })
    }
}

impl Store for SqliteStore {
    fn vector_search<'a>(
        &'a self,
        scope: &'a Scope,
        embedding: &'a [f32],
        k: usize,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<VectorHit>>> + Send + 'a>> {
        Box::pin(async move {
            let (predicate, value) = Self::scope_predicate(scope);
            let sql = format!(
                "SELECT id, project_id, kind, title, body_markdown, body_text, body_lines, raw, embedding
                 FROM items WHERE {predicate} AND embedding IS NOT NULL"
            );
            let rows = sqlx::query(&sql).bind(value).fetch_all(&self.pool).await?;

            let mut hits = Vec::with_capacity(rows.len());
            for row in rows {
                let blob: Vec<u8> = row.get("embedding");
                let stored = bytes_to_vec(&blob);
                if stored.len() != embedding.len() {
                    continue;
                }
                let kind_raw: String = row.get("kind");
                let Ok(kind) = ItemKind::from_str(&kind_raw) else {
                    tracing::warn!(kind = %kind_raw, "skipping item with unknown kind");
                    continue;
                };
                let lines_raw: Option<String> = row.get("body_lines");
                let lines: Vec<String> = lines_raw
                    .as_deref()
                    .and_then(|raw| serde_json::from_str(raw).ok())
                    .unwrap_or_default();
                hits.push(VectorHit {
                    item_id: row.get("id"),
                    project_id: row.get("project_id"),
                    kind,
                    title: row.get("title"),
                    body_markdown: row.get("body_markdown"),
                    body_text: row.get("body_text"),
                    lines,
                    raw: row.get("raw"),
                    distance: cosine_distance(embedding, &stored),
                });
            }
            hits.sort_by(|a, b| {
                a.distance
                    .partial_cmp(&b.distance)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            hits.truncate(k);
            Ok(hits)
        })
    }

    fn open_tasks<'a>(
        &'a self,
        scope: &'a Scope,
        limit: usize,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<TaskSummary>>> + Send + 'a>> {
        Box::pin(async move {
            let (predicate, value) = Self::scope_predicate(scope);
            let sql = format!(
                "SELECT id, project_id, title, status, due_date, updated_at
                 FROM tasks
                 WHERE {predicate} AND status != 'done'
                 ORDER BY
                   CASE status
                     WHEN 'in_progress' THEN 0
                     WHEN 'blocked' THEN 1
                     ELSE 2
                   END,
                   due_date IS NULL,
                   due_date ASC,
                   updated_at DESC
                 LIMIT ?"
            );
            let rows = sqlx::query(&sql)
                .bind(value)
                .bind(i64::try_from(limit).unwrap_or(i64::MAX))
                .fetch_all(&self.pool)
                .await?;
            rows.iter().map(Self::row_to_task).collect()
        })
    }

    fn meetings_on<'a>(
        &'a self,
        scope: &'a Scope,
        day: NaiveDate,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<MeetingSummary>>> + Send + 'a>> {
        Box::pin(async move {
            let (predicate, value) = Self::scope_predicate(scope);
            // RFC 3339 UTC strings compare lexicographically in time order.
            let day_start = format!("{day}T00:00:00");
            let day_end = format!("{day}T23:59:59.999999999");
            let sql = format!(
                "SELECT id, project_id, title, starts_at, location
                 FROM events
                 WHERE {predicate} AND starts_at >= ? AND starts_at <= ?
                 ORDER BY starts_at ASC"
            );
            let rows = sqlx::query(&sql)
                .bind(value)
                .bind(&day_start)
                .bind(&day_end)
                .fetch_all(&self.pool)
                .await?;

            let mut meetings = Vec::with_capacity(rows.len());
            for row in rows {
                let starts_raw: String = row.get("starts_at");
                meetings.push(MeetingSummary {
                    id: row.get("id"),
                    project_id: row.get("project_id"),
                    title: row.get("title"),
                    starts_at: Self::parse_ts(&starts_raw)?,
                    location: row.get("location"),
                });
            }
            Ok(meetings)
        })
    }

    fn latest_risk_scores<'a>(
        &'a self,
        scope: &'a Scope,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<RiskSummary>>> + Send + 'a>> {
        Box::pin(async move {
            let (predicate, value) = Self::scope_predicate(scope);
            let sql = format!(
                "SELECT r.project_id, r.score, r.level, r.computed_at
                 FROM risk_scores r
                 INNER JOIN (
                   SELECT project_id, MAX(computed_at) AS latest
                   FROM risk_scores
                   WHERE {predicate}
                   GROUP BY project_id
                 ) m ON r.project_id = m.project_id AND r.computed_at = m.latest
                 ORDER BY r.score DESC"
            );
            let rows = sqlx::query(&sql).bind(value).fetch_all(&self.pool).await?;

            let mut risks = Vec::with_capacity(rows.len());
            for row in rows {
                let computed_raw: String = row.get("computed_at");
                let score: f64 = row.get("score");
                #[allow(clippy::cast_possible_truncation)]
                risks.push(RiskSummary {
                    project_id: row.get("project_id"),
                    score: score as f32,
                    level: row.get("level"),
                    computed_at: Self::parse_ts(&computed_raw)?,
                });
            }
            Ok(risks)
        })
    }

    fn save_digest<'a>(
        &'a self,
        scope: &'a Scope,
        date: NaiveDate,
        payload: &'a serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>> {
        Box::pin(async move {
            sqlx::query(
                "INSERT OR REPLACE INTO digests (scope_key, digest_date, payload, created_at)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(Self::scope_key(scope))
            .bind(date.to_string())
            .bind(payload.to_string())
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;
            Ok(())
        })
    }
}
