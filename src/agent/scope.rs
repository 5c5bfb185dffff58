use serde::{Deserialize, Serialize};

/// Whether a conversation is bound to one project or spans all of a user's
/// projects. Per-scope differences downstream (extra tools, extra retrieval
/// facts) are additive capabilities keyed off this value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Scope {
    Project { project_id: String, slug: String },
    Global { user_id: String },
}

impl Scope {
    pub fn project(project_id: impl Into<String>, slug: impl Into<String>) -> Self {
        Self::Project {
            project_id: project_id.into(),
            slug: slug.into(),
        }
    }

    pub fn global(user_id: impl Into<String>) -> Self {
        Self::Global {
            user_id: user_id.into(),
        }
    }

    pub fn is_global(&self) -> bool {
        matches!(self, Self::Global { .. })
    }

    pub fn project_id(&self) -> Option<&str> {
        match self {
            Self::Project { project_id, .. } => Some(project_id),
            Self::Global { .. } => None,
        }
    }

    /// Human-readable label injected into system prompts.
    pub fn label(&self) -> String {
        match self {
            Self::Project { slug, .. } => format!("project \"{slug}\""),
            Self::Global { .. } => "cross-project".to_string(),
        }
    }
}

/// Classified purpose of the user's latest message. One superset enum serves
/// both scopes; `meeting_prep` and `daily_digest` are simply more likely in
/// one scope than the other.
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
pub enum Intent {
    Status,
    Plan,
    TaskQuery,
    MeetingPrep,
    DailyDigest,
    GeneralQ,
}

/// Task lifecycle state. Wire strings are snake_case; parsing is
/// case-insensitive so model-supplied values like "TODO" round-trip.
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
pub enum TaskStatus {
    Todo,
    InProgress,
    Blocked,
    Done,
}

impl TaskStatus {
    pub fn is_open(self) -> bool {
        self != Self::Done
    }

    /// Sort key for task listings: in-flight work first, done last.
    pub fn sort_rank(self) -> u8 {
        match self {
            Self::InProgress => 0,
            Self::Blocked => 1,
            Self::Todo => 2,
            Self::Done => 3,
        }
    }
}
