//! Retrieval gateway — gathers the evidence bundle a reply is grounded in.
//!
//! Two independent paths run concurrently: semantic snippets via embedding
//! plus nearest-neighbor search, and authoritative facts fetched straight
//! from the store. Either path failing degrades that path to empty instead
//! of failing the turn.

use crate::agent::Scope;
use crate::embedding::{EmbeddingProvider, EMBEDDING_DIMENSIONS};
use crate::error::RetrievalError;
use crate::store::{ItemKind, MeetingSummary, RiskSummary, Store, TaskSummary, VectorHit};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Rows farther than this cosine distance are discarded outright.
pub const DISTANCE_CUTOFF: f32 = 0.6;

/// Longest snippet text carried into the evidence bundle.
pub const MAX_SNIPPET_CHARS: usize = 800;

/// Default and maximum nearest-neighbor result counts.
pub const DEFAULT_K: usize = 6;
pub const MAX_K: usize = 8;

const OPEN_TASK_LIMIT: usize = 20;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snippet {
    pub item_id: String,
    pub kind: ItemKind,
    pub title: Option<String>,
    pub text: String,
    pub distance: f32,
}

/// Pointer to a piece of evidence, surfaced to the caller so replies can be
/// traced back to source items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reference {
    pub item_id: String,
    /// `1 - distance`, so higher is more confident.
    pub confidence: f32,
    pub project_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrievalBundle {
    pub snippets: Vec<Snippet>,
    pub references: Vec<Reference>,
    pub tasks: Vec<TaskSummary>,
    pub meetings: Vec<MeetingSummary>,
    pub risks: Vec<RiskSummary>,
}

impl RetrievalBundle {
    pub fn is_empty(&self) -> bool {
        self.snippets.is_empty()
            && self.tasks.is_empty()
            && self.meetings.is_empty()
            && self.risks.is_empty()
    }
}

pub struct RetrievalGateway {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn Store>,
}

impl RetrievalGateway {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, store: Arc<dyn Store>) -> Self {
        Self { embedder, store }
    }

    /// Gather evidence for one turn. `date` bounds the calendar facts; `k`
    /// bounds the semantic results and is clamped to [1, 8].
    pub async fn retrieve(
        &self,
        scope: &Scope,
        query: &str,
        date: NaiveDate,
        k: Option<usize>,
    ) -> RetrievalBundle {
        let k = k.unwrap_or(DEFAULT_K).clamp(1, MAX_K);

        let (semantic, facts) = tokio::join!(
            self.semantic_snippets(scope, query, k),
            self.structured_facts(scope, date),
        );

        let (snippets, references) = semantic;
        let (tasks, meetings, risks) = facts;
        RetrievalBundle {
            snippets,
            references,
            tasks,
            meetings,
            risks,
        }
    }

    async fn semantic_snippets(
        &self,
        scope: &Scope,
        query: &str,
        k: usize,
    ) -> (Vec<Snippet>, Vec<Reference>) {
        // Context-free requests like "show my tasks" skip embedding entirely.
        if query.trim().is_empty() {
            return (Vec::new(), Vec::new());
        }

        match self.try_semantic(scope, query, k).await {
            Ok(pair) => pair,
            Err(error) => {
                tracing::warn!(%error, "continuing without semantic evidence");
                (Vec::new(), Vec::new())
            }
        }
    }

    async fn try_semantic(
        &self,
        scope: &Scope,
        query: &str,
        k: usize,
    ) -> Result<(Vec<Snippet>, Vec<Reference>), RetrievalError> {
        let embedding = self
            .embedder
            .embed_one(query)
            .await
            .map_err(|error| RetrievalError::Embedding(error.to_string()))?;
        if embedding.len() != EMBEDDING_DIMENSIONS {
            return Err(RetrievalError::DimensionMismatch {
                expected: EMBEDDING_DIMENSIONS,
                actual: embedding.len(),
            });
        }

        let hits = self
            .store
            .vector_search(scope, &embedding, k)
            .await
            .map_err(|error| RetrievalError::Search(error.to_string()))?;

        let mut snippets = Vec::new();
        let mut references = Vec::new();
        for hit in hits {
            if hit.distance > DISTANCE_CUTOFF {
                continue;
            }
            let Some(text) = extract_snippet(&hit) else {
                continue;
            };
            references.push(Reference {
                item_id: hit.item_id.clone(),
                confidence: (1.0 - hit.distance).clamp(0.0, 1.0),
                project_id: hit.project_id.clone(),
            });
            snippets.push(Snippet {
                item_id: hit.item_id,
                kind: hit.kind,
                title: hit.title,
                text,
                distance: hit.distance,
            });
        }
        Ok((snippets, references))
    }

    async fn structured_facts(
        &self,
        scope: &Scope,
        date: NaiveDate,
    ) -> (Vec<TaskSummary>, Vec<MeetingSummary>, Vec<RiskSummary>) {
        let tasks = match self.store.open_tasks(scope, OPEN_TASK_LIMIT).await {
            Ok(tasks) => tasks,
            Err(error) => {
                tracing::warn!(%error, "open-task fetch failed");
                Vec::new()
            }
        };

        // Calendar and risk facts only matter for the cross-project view.
        if !scope.is_global() {
            return (tasks, Vec::new(), Vec::new());
        }

        let (meetings, risks) = tokio::join!(
            self.store.meetings_on(scope, date),
            self.store.latest_risk_scores(scope),
        );
        let meetings = meetings.unwrap_or_else(|error| {
            tracing::warn!(%error, "meeting fetch failed");
            Vec::new()
        });
        let risks = risks.unwrap_or_else(|error| {
            tracing::warn!(%error, "risk fetch failed");
            Vec::new()
        });
        (tasks, meetings, risks)
    }
}

/// First non-empty body field wins; rows with no usable text are dropped.
fn extract_snippet(hit: &VectorHit) -> Option<String> {
    let candidates: [Option<String>; 5] = [
        hit.body_markdown.clone(),
        hit.body_text.clone(),
        if hit.lines.is_empty() {
            None
        } else {
            Some(hit.lines.join("\n"))
        },
        hit.raw.clone(),
        hit.title.clone(),
    ];
    candidates
        .into_iter()
        .flatten()
        .map(|text| text.trim().to_string())
        .find(|text| !text.is_empty())
        .map(|text| truncate_chars(&text, MAX_SNIPPET_CHARS))
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        text.chars().take(max).collect()
    }
}
