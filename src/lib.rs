#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::struct_field_names,
    clippy::must_use_candidate,
    clippy::new_without_default,
    clippy::return_self_not_must_use
)]

pub mod agent;
pub mod config;
pub mod digest;
pub mod embedding;
pub mod error;
pub mod gateway;
pub mod guardrails;
pub mod llm;
pub mod retrieval;
pub mod store;
pub mod transport;
pub mod vector;

pub use config::Config;
