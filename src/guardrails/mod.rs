//! Input and output guardrails wrapping the agent loop.
//!
//! Both fail open on infrastructure problems and fail closed only on an
//! explicit classifier verdict. Verdict JSON is parsed defensively in one
//! place (`parse`) so both sides share identical salvage behavior.

pub mod input;
pub mod output;
mod parse;

pub use input::{heuristic_intent, InputDecision, InputGuardrail};
pub use output::{OutputDecision, OutputGuardrail};
