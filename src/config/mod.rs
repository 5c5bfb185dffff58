pub mod schema;

pub use schema::{AgentConfig, Config, EmbeddingConfig, GatewayConfig, LlmConfig, StoreConfig};
