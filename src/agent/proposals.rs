//! Proposals — candidate side effects suggested by the model.
//!
//! Nothing here is ever persisted by the pipeline. Proposals are validated,
//! trimmed, accumulated on the turn, and handed back to the caller, who
//! decides whether to act on them.

use super::scope::TaskStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const MAX_TITLE_CHARS: usize = 200;
const MAX_BODY_CHARS: usize = 4000;
const MAX_TAGS: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposedTask {
    /// Stable handle the caller echoes back when confirming the proposal.
    pub id: String,
    pub title: String,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposedNote {
    pub id: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposedReminder {
    pub id: String,
    pub content: String,
    pub due_at: DateTime<Utc>,
}

/// All proposals accumulated on one turn, in call order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Proposals {
    pub tasks: Vec<ProposedTask>,
    pub notes: Vec<ProposedNote>,
    pub reminders: Vec<ProposedReminder>,
}

impl Proposals {
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty() && self.notes.is_empty() && self.reminders.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tasks.len() + self.notes.len() + self.reminders.len()
    }
}

impl ProposedTask {
    /// Trim and bound the fields; a blank title is rejected.
    pub fn validated(
        title: &str,
        status: Option<TaskStatus>,
        due_date: Option<DateTime<Utc>>,
        note: Option<&str>,
        project_id: Option<&str>,
    ) -> anyhow::Result<Self> {
        let title = clamp_line(title, MAX_TITLE_CHARS);
        if title.is_empty() {
            anyhow::bail!("task title must not be empty");
        }
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            title,
            status: status.unwrap_or(TaskStatus::Todo),
            due_date,
            note: nonempty(note, MAX_BODY_CHARS),
            project_id: nonempty(project_id, MAX_TITLE_CHARS),
        })
    }
}

impl ProposedNote {
    pub fn validated(
        body: &str,
        title: Option<&str>,
        tags: &[String],
        project_id: Option<&str>,
    ) -> anyhow::Result<Self> {
        let body = clamp_line(body, MAX_BODY_CHARS);
        if body.is_empty() {
            anyhow::bail!("note body must not be empty");
        }
        let tags: Vec<String> = tags
            .iter()
            .map(|t| clamp_line(t, MAX_TITLE_CHARS))
            .filter(|t| !t.is_empty())
            .take(MAX_TAGS)
            .collect();
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            body,
            title: nonempty(title, MAX_TITLE_CHARS),
            tags,
            project_id: nonempty(project_id, MAX_TITLE_CHARS),
        })
    }
}

impl ProposedReminder {
    pub fn validated(content: &str, due_at: DateTime<Utc>) -> anyhow::Result<Self> {
        let content = clamp_line(content, MAX_BODY_CHARS);
        if content.is_empty() {
            anyhow::bail!("reminder content must not be empty");
        }
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            content,
            due_at,
        })
    }
}

fn clamp_line(text: &str, max: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max {
        trimmed.to_string()
    } else {
        trimmed.chars().take(max).collect()
    }
}

fn nonempty(value: Option<&str>, max: usize) -> Option<String> {
    value
        .map(|v| clamp_line(v, max))
        .filter(|v| !v.is_empty())
}
