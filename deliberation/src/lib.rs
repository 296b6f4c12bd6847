//! Deliberation Library
//!
//! Runs a structured debate over the factors of a problem statement and
//! turns the outcomes into a scored recommendation with traceable reasoning.
//!
//! This library provides:
//! - A typed, append-only message bus with replay (`events`)
//! - The per-factor debate state machine and its runner (`debate`)
//! - Deterministic disagreement, confidence and risk scoring (`scoring`)
//! - Factor validation and integrity checks (`validation`)
//! - The reasoning-engine adapter: prompts, retry, boundary parsing (`collaborators`)
//! - The orchestrator, progress relay and history adapter
//!
//! # Usage
//!
//! ```ignore
//! let orchestrator = DeliberationOrchestrator::new(engine, DeliberationConfig::default())
//!     .with_history(Arc::new(InMemoryHistoryStore::new()));
//! let outcome = orchestrator.deliberate("Should we launch product X?").await?;
//! println!("{}", outcome.deliberation.summary_line());
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod collaborators;
pub mod config;
pub mod debate;
pub mod error;
pub mod events;
pub mod history;
pub mod orchestrator;
pub mod report;
pub mod scoring;
pub mod streaming;
pub mod validation;

pub use collaborators::{EngineError, EngineRequest, Panel, ReasoningEngine};
pub use config::{ConfigError, DeliberationConfig, RetryPolicy};
pub use debate::{DebateRecord, FactorDebate, FactorPhase, Resolution};
pub use error::{DeliberationError, DeliberationResult};
pub use events::{
    project, Factor, Message, MessageBus, MessageFilter, MessageKind, ParticipantRole, Payload,
    SharedMessageBus,
};
pub use history::{
    DeliberationSummary, FileHistoryStore, HistoryError, HistoryStore, InMemoryHistoryStore,
    SharedHistoryStore,
};
pub use orchestrator::{DeliberationOrchestrator, DeliberationOutcome};
pub use report::{Assumption, Decision, Deliberation, FinalRecommendation, SynthesisReport};
pub use scoring::{ResolutionCounts, ScoringConfig};
pub use streaming::{stream_deliberation, ProgressEvent, ProgressUpdate, Stage};
pub use validation::{FactorValidation, IntegrityReport};
