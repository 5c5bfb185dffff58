//! Conversation agent: scope and intent types, the per-turn execution
//! context, the toolbox, and the orchestrator that runs a turn end to end.

pub mod context;
pub mod middleware;
pub mod orchestrator;
pub mod prompt;
pub mod proposals;
pub mod registry;
pub mod scope;
pub mod tool_loop;
pub mod tools;

pub use context::{ExecutionContext, TurnScratch};
pub use middleware::{AuditMiddleware, MiddlewareDecision, OutputSizeMiddleware, ToolMiddleware};
pub use orchestrator::{
    ConversationRequest, ConversationResult, GuardrailReport, Orchestrator,
};
pub use proposals::{ProposedNote, ProposedReminder, ProposedTask, Proposals};
pub use registry::ToolRegistry;
pub use scope::{Intent, Scope, TaskStatus};
pub use tool_loop::{LoopStopReason, ToolCallRecord, ToolLoop, ToolLoopResult, ToolLoopRunParams};
pub use tools::{Tool, ToolResult, ToolSpec};
