//! System prompt assembly for the agent loop.

use super::scope::{Intent, Scope};
use crate::retrieval::RetrievalBundle;
use chrono::NaiveDate;

/// Build the system prompt for one turn. The reply contract (required
/// headings plus the machine-readable tail) is encoded here; the output
/// guardrail re-checks it after the fact.
pub fn system_prompt(
    scope: &Scope,
    intent: Intent,
    date: NaiveDate,
    initial_bundle: &RetrievalBundle,
) -> String {
    let mut prompt = format!(
        "You are an executive assistant operating in {} scope on {date}.\n\
         The user's request was classified as intent `{intent}`.\n\n\
         ## Rules\n\
         - Ground every claim in the evidence provided below or fetched via\n\
           `fetch_context`. If evidence is missing, say so instead of guessing.\n\
         - Tasks, notes and reminders you create are proposals for the user\n\
           to confirm; phrase them that way.\n\
         - Use at most a handful of tool calls, then answer.\n\n\
         ## Reply format\n\
         Respond in markdown with these sections, in order:\n\
         - `## Summary`\n\
         - `## Recommendations / Next Steps`\n\
         - `## Quick actions`\n\
         - optionally `## Notes & Risks` (project scope) or\n\
           `## Projects at Risk` (cross-project scope)\n\
         End the reply with a fenced ```json block containing exactly:\n\
         {{\"intent\": string, \"references\": [string], \"proposed_tasks\": [object], \"followups\": [string]}}\n\
         where `references` lists the item ids of evidence you used and\n\
         `proposed_tasks` mirrors the tasks you proposed via tools.\n",
        scope.label()
    );

    if !initial_bundle.is_empty() {
        let evidence = serde_json::to_string_pretty(initial_bundle)
            .unwrap_or_else(|_| "{}".to_string());
        prompt.push_str("\n## Evidence\n");
        prompt.push_str(&evidence);
        prompt.push('\n');
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_carries_scope_intent_and_date() {
        let scope = Scope::project("p1", "apollo");
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let prompt = system_prompt(&scope, Intent::Status, date, &RetrievalBundle::default());
        assert!(prompt.contains("project \"apollo\""));
        assert!(prompt.contains("`status`"));
        assert!(prompt.contains("2026-03-02"));
        assert!(prompt.contains("## Summary"));
        assert!(prompt.contains("proposed_tasks"));
        // Empty bundle leaves the evidence section out.
        assert!(!prompt.contains("## Evidence"));
    }

    #[test]
    fn prompt_embeds_nonempty_evidence() {
        let scope = Scope::global("u1");
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let bundle = RetrievalBundle {
            tasks: vec![crate::store::TaskSummary {
                id: "t1".into(),
                project_id: None,
                title: "follow up with vendor".into(),
                status: crate::agent::TaskStatus::Todo,
                due_date: None,
                updated_at: chrono::Utc::now(),
            }],
            ..Default::default()
        };
        let prompt = system_prompt(&scope, Intent::TaskQuery, date, &bundle);
        assert!(prompt.contains("## Evidence"));
        assert!(prompt.contains("follow up with vendor"));
    }
}
