//! Collaborator adapter
//!
//! The reasoning engine is an opaque capability: given a request it returns
//! text or fails. `Panel` wraps it with a per-call timeout and retry with
//! exponential backoff, builds each role's prompt, and normalises the reply
//! into typed payloads so nothing untyped reaches the bus.

pub mod parse;
pub mod prompts;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::{DeliberationConfig, RetryPolicy};
use crate::debate::record::DebateRecord;
use crate::events::{
    CritiquePayload, Factor, FactorId, ParticipantRole, RebuttalPayload, SupportPayload,
};
use crate::report::{Decision, SynthesisReport};
use crate::validation::FactorValidation;

pub use parse::DirectiveSections;

/// A single request to the reasoning engine.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineRequest {
    pub role: ParticipantRole,
    pub factor_id: Option<FactorId>,
    pub round: u32,
    pub system: String,
    pub prompt: String,
    pub max_tokens: u32,
}

/// Failure reported by a reasoning engine.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Engine returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Engine returned no content")]
    EmptyResponse,
}

/// Turns a prompt into text.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReasoningEngine: Send + Sync {
    async fn generate(&self, request: EngineRequest) -> Result<String, EngineError>;
}

/// A collaborator call that failed after all attempts.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CollaboratorError {
    #[error("{role} failed after {attempts} attempt(s): {source}")]
    Engine {
        role: ParticipantRole,
        attempts: u32,
        source: EngineError,
    },

    #[error("{role} timed out after {attempts} attempt(s) ({timeout_secs}s each)")]
    Timeout {
        role: ParticipantRole,
        attempts: u32,
        timeout_secs: u64,
    },
}

pub type CollaboratorResult<T> = Result<T, CollaboratorError>;

/// Role-specific calls against one reasoning engine.
#[derive(Clone)]
pub struct Panel {
    engine: Arc<dyn ReasoningEngine>,
    retry: RetryPolicy,
    call_timeout: Duration,
    max_tokens: u32,
}

impl Panel {
    pub fn new(engine: Arc<dyn ReasoningEngine>, config: &DeliberationConfig) -> Self {
        Self {
            engine,
            retry: config.retry.clone(),
            call_timeout: config.call_timeout(),
            max_tokens: config.max_tokens,
        }
    }

    fn request(
        &self,
        role: ParticipantRole,
        factor_id: Option<FactorId>,
        round: u32,
        prompt: String,
    ) -> EngineRequest {
        EngineRequest {
            role,
            factor_id,
            round,
            system: prompts::system_prompt(role).to_string(),
            prompt,
            max_tokens: self.max_tokens,
        }
    }

    /// Call the engine with timeout and retry.
    async fn call(&self, request: EngineRequest) -> CollaboratorResult<String> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let outcome =
                tokio::time::timeout(self.call_timeout, self.engine.generate(request.clone()))
                    .await;

            let error = match outcome {
                Ok(Ok(text)) => {
                    debug!(
                        role = %request.role,
                        factor_id = ?request.factor_id,
                        round = request.round,
                        attempt,
                        chars = text.len(),
                        "Collaborator call succeeded"
                    );
                    return Ok(text);
                }
                Ok(Err(source)) => CollaboratorError::Engine {
                    role: request.role,
                    attempts: attempt,
                    source,
                },
                Err(_) => CollaboratorError::Timeout {
                    role: request.role,
                    attempts: attempt,
                    timeout_secs: self.call_timeout.as_secs(),
                },
            };

            if !self.retry.should_retry(attempt) {
                return Err(error);
            }

            let backoff = self.retry.backoff(attempt);
            warn!(
                role = %request.role,
                factor_id = ?request.factor_id,
                attempt,
                backoff_ms = backoff.as_millis() as u64,
                error = %error,
                "Collaborator call failed, retrying"
            );
            tokio::time::sleep(backoff).await;
        }
    }

    pub async fn extract_factors(&self, problem: &str) -> CollaboratorResult<Vec<Factor>> {
        let request = self.request(
            ParticipantRole::FactorExtractor,
            None,
            1,
            prompts::extraction(problem),
        );
        let text = self.call(request).await?;
        Ok(parse::factors(&text))
    }

    pub async fn support(&self, problem: &str, factor: &Factor) -> CollaboratorResult<SupportPayload> {
        let request = self.request(
            ParticipantRole::Supporter,
            Some(factor.id),
            1,
            prompts::support(problem, factor),
        );
        Ok(parse::support(&self.call(request).await?))
    }

    pub async fn critique(
        &self,
        problem: &str,
        factor: &Factor,
        validation: Option<&FactorValidation>,
        support: &SupportPayload,
    ) -> CollaboratorResult<CritiquePayload> {
        let request = self.request(
            ParticipantRole::Critic,
            Some(factor.id),
            1,
            prompts::critique(problem, factor, validation, support),
        );
        Ok(parse::critique(&self.call(request).await?))
    }

    pub async fn rebut(
        &self,
        problem: &str,
        factor: &Factor,
        support: &SupportPayload,
        critique: &CritiquePayload,
    ) -> CollaboratorResult<RebuttalPayload> {
        let request = self.request(
            ParticipantRole::Supporter,
            Some(factor.id),
            2,
            prompts::rebuttal(problem, factor, support, critique),
        );
        Ok(parse::rebuttal(&self.call(request).await?))
    }

    pub async fn recritique(
        &self,
        problem: &str,
        factor: &Factor,
        critique: &CritiquePayload,
        rebuttal: &RebuttalPayload,
    ) -> CollaboratorResult<CritiquePayload> {
        let request = self.request(
            ParticipantRole::Critic,
            Some(factor.id),
            2,
            prompts::recritique(problem, factor, critique, rebuttal),
        );
        let text = self.call(request).await?;
        Ok(parse::recritique(&text, critique, rebuttal))
    }

    pub async fn synthesize(
        &self,
        problem: &str,
        factors: &[Factor],
        records: &[DebateRecord],
    ) -> CollaboratorResult<SynthesisReport> {
        let request = self.request(
            ParticipantRole::Synthesizer,
            None,
            1,
            prompts::synthesis(problem, factors, records),
        );
        Ok(parse::synthesis(&self.call(request).await?))
    }

    pub async fn final_directive(
        &self,
        problem: &str,
        decision: Decision,
        confidence: f64,
        factors: &[Factor],
        records: &[DebateRecord],
        synthesis: &SynthesisReport,
    ) -> CollaboratorResult<DirectiveSections> {
        let request = self.request(
            ParticipantRole::Decider,
            None,
            1,
            prompts::final_directive(problem, decision, confidence, factors, records, synthesis),
        );
        Ok(parse::directive(&self.call(request).await?))
    }
}
