//! HTTP and SSE front end for the deliberation orchestrator.

pub mod api;
pub mod config;
pub mod llm;

pub use api::{router, serve, AppState, SharedAppState};
pub use config::{Args, LlmConfig, ServerConfig};
pub use llm::OpenAiCompatibleEngine;
