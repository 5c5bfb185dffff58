//! The toolbox offered to the model during a turn.
//!
//! Retrieval is the only tool with real side effects on the turn (it grows
//! the evidence bundle). The write-shaped tools are proposal-only: they
//! validate, append to the turn's proposal list, and acknowledge — storage
//! is never touched.

use super::context::ExecutionContext;
use super::proposals::{ProposedNote, ProposedReminder, ProposedTask};
use super::scope::{Scope, TaskStatus};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;

/// Result of a tool execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
        }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(error.into()),
        }
    }
}

/// Description of a tool for the LLM
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

pub trait Tool: Send + Sync {
    /// Tool name (used in LLM function calling)
    fn name(&self) -> &str;

    /// Human-readable description
    fn description(&self) -> &str;

    /// JSON schema for parameters
    fn parameters_schema(&self) -> serde_json::Value;

    /// Whether the tool is offered in the given scope.
    fn available_in(&self, _scope: &Scope) -> bool {
        true
    }

    /// Execute the tool with given arguments
    fn execute<'a>(
        &'a self,
        args: Value,
        ctx: &'a ExecutionContext,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ToolResult>> + Send + 'a>>;

    /// Get the full spec for LLM registration
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

fn arg_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn arg_datetime(args: &Value, key: &str) -> anyhow::Result<Option<DateTime<Utc>>> {
    let Some(raw) = arg_str(args, key) else {
        return Ok(None);
    };
    let parsed = DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Tolerate a bare date, pinned to start of day UTC.
            NaiveDate::from_str(raw).map(|date| {
                date.and_hms_opt(0, 0, 0)
                    .unwrap_or_default()
                    .and_utc()
            })
        })
        .map_err(|_| anyhow::anyhow!("{key} must be an ISO-8601 date or datetime, got {raw:?}"))?;
    Ok(Some(parsed))
}

// ── fetch_context ────────────────────────────────────────────

pub struct FetchContextTool;

impl Tool for FetchContextTool {
    fn name(&self) -> &str {
        "fetch_context"
    }

    fn description(&self) -> &str {
        "Look up relevant notes, documents, tasks, meetings and risk scores. \
         Call again with a different query to gather more evidence; results \
         accumulate across calls."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search text. Leave empty for structured facts only."
                },
                "date": {
                    "type": "string",
                    "description": "ISO date anchoring calendar lookups; defaults to today."
                },
                "k": {
                    "type": "integer",
                    "description": "Max semantic results (1-8, default 6)."
                }
            }
        })
    }

    fn execute<'a>(
        &'a self,
        args: Value,
        ctx: &'a ExecutionContext,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ToolResult>> + Send + 'a>> {
        Box::pin(async move {
            let query = arg_str(&args, "query").unwrap_or("").to_string();
            let date = arg_str(&args, "date")
                .and_then(|raw| NaiveDate::from_str(raw).ok());
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let k = args
                .get("k")
                .and_then(Value::as_u64)
                .map(|k| k as usize);

            let bundle = ctx.retrieve_into_scratch(&query, date, k).await;
            let output = serde_json::to_string(&bundle)?;
            Ok(ToolResult::ok(output))
        })
    }
}

// ── create_task ──────────────────────────────────────────────

pub struct CreateTaskTool;

impl Tool for CreateTaskTool {
    fn name(&self) -> &str {
        "create_task"
    }

    fn description(&self) -> &str {
        "Propose a new task for the user to confirm. The task is NOT saved; \
         it is returned to the user as a suggestion."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "title": { "type": "string" },
                "status": {
                    "type": "string",
                    "enum": ["todo", "in_progress", "blocked", "done"],
                    "description": "Defaults to todo."
                },
                "dueDate": { "type": "string", "description": "ISO-8601 due date." },
                "note": { "type": "string" },
                "projectId": { "type": "string" }
            },
            "required": ["title"]
        })
    }

    fn execute<'a>(
        &'a self,
        args: Value,
        ctx: &'a ExecutionContext,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ToolResult>> + Send + 'a>> {
        Box::pin(async move {
            let Some(title) = arg_str(&args, "title") else {
                return Ok(ToolResult::fail("title is required"));
            };
            let status = match arg_str(&args, "status") {
                Some(raw) => match TaskStatus::from_str(raw) {
                    Ok(status) => Some(status),
                    Err(_) => return Ok(ToolResult::fail(format!("unknown status: {raw}"))),
                },
                None => None,
            };
            let due_date = match arg_datetime(&args, "dueDate") {
                Ok(due) => due,
                Err(error) => return Ok(ToolResult::fail(error.to_string())),
            };

            let task = match ProposedTask::validated(
                title,
                status,
                due_date,
                arg_str(&args, "note"),
                arg_str(&args, "projectId"),
            ) {
                Ok(task) => task,
                Err(error) => return Ok(ToolResult::fail(error.to_string())),
            };

            let ack = serde_json::to_string(&json!({
                "proposed": true,
                "task": task
            }))?;
            ctx.scratch().proposals.tasks.push(task);
            Ok(ToolResult::ok(ack))
        })
    }
}

// ── add_note ─────────────────────────────────────────────────

pub struct AddNoteTool;

impl Tool for AddNoteTool {
    fn name(&self) -> &str {
        "add_note"
    }

    fn description(&self) -> &str {
        "Propose a note to capture. The note is NOT saved; it is returned to \
         the user as a suggestion."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "body": { "type": "string" },
                "title": { "type": "string" },
                "tags": { "type": "array", "items": { "type": "string" } },
                "projectId": { "type": "string" }
            },
            "required": ["body"]
        })
    }

    fn execute<'a>(
        &'a self,
        args: Value,
        ctx: &'a ExecutionContext,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ToolResult>> + Send + 'a>> {
        Box::pin(async move {
            let Some(body) = arg_str(&args, "body") else {
                return Ok(ToolResult::fail("body is required"));
            };
            let tags: Vec<String> = args
                .get("tags")
                .and_then(Value::as_array)
                .map(|values| {
                    values
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();

            let note = match ProposedNote::validated(
                body,
                arg_str(&args, "title"),
                &tags,
                arg_str(&args, "projectId"),
            ) {
                Ok(note) => note,
                Err(error) => return Ok(ToolResult::fail(error.to_string())),
            };

            let ack = serde_json::to_string(&json!({
                "proposed": true,
                "note": note
            }))?;
            ctx.scratch().proposals.notes.push(note);
            Ok(ToolResult::ok(ack))
        })
    }
}

// ── set_reminder (cross-project scope only) ──────────────────

pub struct SetReminderTool;

impl Tool for SetReminderTool {
    fn name(&self) -> &str {
        "set_reminder"
    }

    fn description(&self) -> &str {
        "Propose a reminder at a specific time. The reminder is NOT saved; \
         it is returned to the user as a suggestion."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "content": { "type": "string" },
                "dueAt": { "type": "string", "description": "ISO-8601 datetime." }
            },
            "required": ["content", "dueAt"]
        })
    }

    fn available_in(&self, scope: &Scope) -> bool {
        scope.is_global()
    }

    fn execute<'a>(
        &'a self,
        args: Value,
        ctx: &'a ExecutionContext,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ToolResult>> + Send + 'a>> {
        Box::pin(async move {
            if !ctx.scope.is_global() {
                return Ok(ToolResult::fail(
                    "set_reminder is only available in cross-project scope",
                ));
            }
            let Some(content) = arg_str(&args, "content") else {
                return Ok(ToolResult::fail("content is required"));
            };
            let due_at = match arg_datetime(&args, "dueAt") {
                Ok(Some(due)) => due,
                Ok(None) => return Ok(ToolResult::fail("dueAt is required")),
                Err(error) => return Ok(ToolResult::fail(error.to_string())),
            };

            let reminder = match ProposedReminder::validated(content, due_at) {
                Ok(reminder) => reminder,
                Err(error) => return Ok(ToolResult::fail(error.to_string())),
            };

            let ack = serde_json::to_string(&json!({
                "proposed": true,
                "reminder": reminder
            }))?;
            ctx.scratch().proposals.reminders.push(reminder);
            Ok(ToolResult::ok(ack))
        })
    }
}
