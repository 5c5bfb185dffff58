//! In-memory store used by tests and offline runs. Rows live in plain
//! vectors behind a mutex; ranking logic matches the SQLite implementation.

use super::{ItemKind, MeetingSummary, RiskSummary, Store, TaskSummary, VectorHit};
use crate::agent::Scope;
use crate::vector::cosine_distance;
use chrono::{DateTime, NaiveDate, Utc};
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub struct StoredItem {
    pub item_id: String,
    pub project_id: Option<String>,
    pub owner_id: String,
    pub kind: ItemKind,
    pub title: Option<String>,
    pub body_markdown: Option<String>,
    pub body_text: Option<String>,
    pub lines: Vec<String>,
    pub raw: Option<String>,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct StoredMeeting {
    pub summary: MeetingSummary,
    pub owner_id: String,
}

#[derive(Default)]
struct Rows {
    items: Vec<StoredItem>,
    tasks: Vec<(TaskSummary, String)>,
    meetings: Vec<StoredMeeting>,
    risks: Vec<(RiskSummary, String)>,
    digests: Vec<(Scope, NaiveDate, serde_json::Value)>,
}

#[derive(Default)]
pub struct InMemoryStore {
    rows: Mutex<Rows>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_item(&self, item: StoredItem) {
        self.lock().items.push(item);
    }

    pub fn insert_task(&self, task: TaskSummary, owner_id: impl Into<String>) {
        self.lock().tasks.push((task, owner_id.into()));
    }

    pub fn insert_meeting(&self, summary: MeetingSummary, owner_id: impl Into<String>) {
        self.lock().meetings.push(StoredMeeting {
            summary,
            owner_id: owner_id.into(),
        });
    }

    pub fn insert_risk(&self, risk: RiskSummary, owner_id: impl Into<String>) {
        self.lock().risks.push((risk, owner_id.into()));
    }

    pub fn saved_digests(&self) -> usize {
        self.lock().digests.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Rows> {
        self.rows
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn in_scope(scope: &Scope, project_id: Option<&str>, owner_id: &str) -> bool {
        match scope {
            Scope::Project { project_id: id, .. } => project_id == Some(id.as_str()),
            Scope::Global { user_id } => owner_id == user_id,
        }
    }
}

impl Store for InMemoryStore {
    fn vector_search<'a>(
        &'a self,
        scope: &'a Scope,
        embedding: &'a [f32],
        k: usize,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<VectorHit>>> + Send + 'a>> {
        Box::pin(async move {
            let rows = self.lock();
            let mut hits: Vec<VectorHit> = rows
                .items
                .iter()
                .filter(|item| {
                    Self::in_scope(scope, item.project_id.as_deref(), &item.owner_id)
                        && !item.embedding.is_empty()
                })
                .map(|item| VectorHit {
                    item_id: item.item_id.clone(),
                    project_id: item.project_id.clone(),
                    kind: item.kind,
                    title: item.title.clone(),
                    body_markdown: item.body_markdown.clone(),
                    body_text: item.body_text.clone(),
                    lines: item.lines.clone(),
                    raw: item.raw.clone(),
                    distance: cosine_distance(embedding, &item.embedding),
                })
                .collect();
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
            let rows = self.lock();
            let far_future: DateTime<Utc> = DateTime::<Utc>::MAX_UTC;
            let mut tasks: Vec<TaskSummary> = rows
                .tasks
                .iter()
                .filter(|(task, owner)| {
                    task.status.is_open()
                        && Self::in_scope(scope, task.project_id.as_deref(), owner)
                })
                .map(|(task, _)| task.clone())
                .collect();
            tasks.sort_by(|a, b| {
                a.status
                    .sort_rank()
                    .cmp(&b.status.sort_rank())
                    .then(a.due_date.unwrap_or(far_future).cmp(&b.due_date.unwrap_or(far_future)))
                    .then(b.updated_at.cmp(&a.updated_at))
            });
            tasks.truncate(limit);
            Ok(tasks)
        })
    }

    fn meetings_on<'a>(
        &'a self,
        scope: &'a Scope,
        day: NaiveDate,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<MeetingSummary>>> + Send + 'a>> {
        Box::pin(async move {
            let rows = self.lock();
            let mut meetings: Vec<MeetingSummary> = rows
                .meetings
                .iter()
                .filter(|stored| {
                    stored.summary.starts_at.date_naive() == day
                        && Self::in_scope(
                            scope,
                            stored.summary.project_id.as_deref(),
                            &stored.owner_id,
                        )
                })
                .map(|stored| stored.summary.clone())
                .collect();
            meetings.sort_by_key(|meeting| meeting.starts_at);
            Ok(meetings)
        })
    }

    fn latest_risk_scores<'a>(
        &'a self,
        scope: &'a Scope,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<RiskSummary>>> + Send + 'a>> {
        Box::pin(async move {
            let rows = self.lock();
            let mut latest: Vec<RiskSummary> = Vec::new();
            for (risk, owner) in &rows.risks {
                if !Self::in_scope(scope, Some(risk.project_id.as_str()), owner) {
                    continue;
                }
                match latest
                    .iter_mut()
                    .find(|existing| existing.project_id == risk.project_id)
                {
                    Some(existing) if existing.computed_at < risk.computed_at => {
                        *existing = risk.clone();
                    }
                    Some(_) => {}
                    None => latest.push(risk.clone()),
                }
            }
            latest.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            Ok(latest)
        })
    }

    fn save_digest<'a>(
        &'a self,
        scope: &'a Scope,
        date: NaiveDate,
        payload: &'a serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>> {
        Box::pin(async move {
            self.lock()
                .digests
                .push((scope.clone(), date, payload.clone()));
            Ok(())
        })
    }
}
