//! Per-turn execution context.
//!
//! Each turn owns one `ExecutionContext`; nothing here is shared across
//! turns, so concurrent requests never contend. Tool handlers append into
//! the scratch under a short-lived lock (never held across an await).

use super::proposals::Proposals;
use super::scope::{Intent, Scope};
use crate::retrieval::{Reference, RetrievalBundle, RetrievalGateway};
use chrono::NaiveDate;
use std::sync::{Arc, Mutex, MutexGuard};

/// Mutable state accumulated while the tool loop runs.
#[derive(Debug, Default)]
pub struct TurnScratch {
    /// Union of every retrieval this turn performed. Snippets and facts
    /// accumulate across calls; references de-duplicate by item id in
    /// first-seen order.
    pub bundle: RetrievalBundle,
    pub proposals: Proposals,
    pub tool_calls: usize,
}

impl TurnScratch {
    /// Merge one retrieval result into the accumulated bundle, keeping the
    /// first-seen occurrence of each reference.
    pub fn absorb(&mut self, fresh: RetrievalBundle) {
        for reference in fresh.references {
            if !self
                .bundle
                .references
                .iter()
                .any(|existing| existing.item_id == reference.item_id)
            {
                self.bundle.references.push(reference);
            }
        }
        for snippet in fresh.snippets {
            if !self
                .bundle
                .snippets
                .iter()
                .any(|existing| existing.item_id == snippet.item_id)
            {
                self.bundle.snippets.push(snippet);
            }
        }
        // Facts are authoritative point-in-time reads; the latest fetch wins
        // when it returned anything at all.
        if !fresh.tasks.is_empty() {
            self.bundle.tasks = fresh.tasks;
        }
        if !fresh.meetings.is_empty() {
            self.bundle.meetings = fresh.meetings;
        }
        if !fresh.risks.is_empty() {
            self.bundle.risks = fresh.risks;
        }
    }

    pub fn references(&self) -> &[Reference] {
        &self.bundle.references
    }
}

/// Read-mostly context threaded into every tool handler for one turn.
pub struct ExecutionContext {
    pub scope: Scope,
    pub intent: Intent,
    /// Date anchor for calendar-bound retrieval, normally "today" in UTC.
    pub date: NaiveDate,
    pub retrieval: Arc<RetrievalGateway>,
    scratch: Mutex<TurnScratch>,
}

impl ExecutionContext {
    pub fn new(
        scope: Scope,
        intent: Intent,
        date: NaiveDate,
        retrieval: Arc<RetrievalGateway>,
    ) -> Self {
        Self {
            scope,
            intent,
            date,
            retrieval,
            scratch: Mutex::new(TurnScratch::default()),
        }
    }

    pub fn scratch(&self) -> MutexGuard<'_, TurnScratch> {
        self.scratch
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Run a retrieval and fold the result into the turn's scratch.
    pub async fn retrieve_into_scratch(
        &self,
        query: &str,
        date: Option<NaiveDate>,
        k: Option<usize>,
    ) -> RetrievalBundle {
        let bundle = self
            .retrieval
            .retrieve(&self.scope, query, date.unwrap_or(self.date), k)
            .await;
        self.scratch().absorb(bundle.clone());
        bundle
    }

    /// Consume the context, returning everything accumulated on the turn.
    pub fn into_scratch(self) -> TurnScratch {
        self.scratch
            .into_inner()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::Snippet;
    use crate::store::ItemKind;

    fn reference(id: &str) -> Reference {
        Reference {
            item_id: id.into(),
            confidence: 0.9,
            project_id: None,
        }
    }

    fn snippet(id: &str) -> Snippet {
        Snippet {
            item_id: id.into(),
            kind: ItemKind::Note,
            title: None,
            text: "text".into(),
            distance: 0.1,
        }
    }

    #[test]
    fn references_deduplicate_in_first_seen_order() {
        let mut scratch = TurnScratch::default();
        scratch.absorb(RetrievalBundle {
            references: vec![reference("a"), reference("b")],
            ..Default::default()
        });
        scratch.absorb(RetrievalBundle {
            references: vec![reference("b"), reference("c")],
            ..Default::default()
        });

        let ids: Vec<&str> = scratch
            .references()
            .iter()
            .map(|r| r.item_id.as_str())
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn snippets_accumulate_without_duplicates() {
        let mut scratch = TurnScratch::default();
        scratch.absorb(RetrievalBundle {
            snippets: vec![snippet("a")],
            ..Default::default()
        });
        scratch.absorb(RetrievalBundle {
            snippets: vec![snippet("a"), snippet("b")],
            ..Default::default()
        });
        assert_eq!(scratch.bundle.snippets.len(), 2);
    }

    #[test]
    fn empty_fact_fetch_keeps_previous_facts() {
        let mut scratch = TurnScratch::default();
        scratch.absorb(RetrievalBundle {
            tasks: vec![crate::store::TaskSummary {
                id: "t1".into(),
                project_id: None,
                title: "keep me".into(),
                status: crate::agent::TaskStatus::Todo,
                due_date: None,
                updated_at: chrono::Utc::now(),
            }],
            ..Default::default()
        });
        scratch.absorb(RetrievalBundle::default());
        assert_eq!(scratch.bundle.tasks.len(), 1);
    }
}
