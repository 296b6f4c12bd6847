//! Log projection and replay
//!
//! Folds an ordered message log back into per-factor debates and the
//! `Deliberation` aggregate. The projection is pure: replaying the same
//! log always yields the same result.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::types::{Factor, FactorId, Message, MessageId, MessageKind, ParticipantRole, Payload};
use crate::debate::record::DebateRecord;
use crate::debate::state::{FactorDebate, TransitionError};
use crate::report::{Assumption, Deliberation, FinalRecommendation, SynthesisReport};
use crate::scoring::{self, ResolutionCounts, ScoringConfig};
use crate::validation::{FactorValidation, IntegrityReport};

/// Error type for replay operations
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("Log does not start with a FACTOR_LIST message")]
    MissingFactorList,

    #[error("Duplicate FACTOR_LIST at message {0}")]
    DuplicateFactorList(MessageId),

    #[error("Message {id} references unknown factor {factor_id}")]
    UnknownFactor { id: MessageId, factor_id: FactorId },

    #[error("Invalid debate sequence: {0}")]
    Transition(#[from] TransitionError),

    #[error("Log is incomplete: {0}")]
    Incomplete(String),
}

/// Result type for replay operations
pub type ReplayResult<T> = Result<T, ReplayError>;

/// Aggregate statistics for a message log
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct LogStats {
    pub total_messages: usize,
    pub by_kind: BTreeMap<MessageKind, usize>,
    pub by_role: BTreeMap<ParticipantRole, usize>,
    pub by_factor: BTreeMap<FactorId, usize>,
    pub updates: usize,
}

impl LogStats {
    pub fn from_messages(messages: &[Message]) -> Self {
        let mut stats = Self::default();

        for message in messages {
            stats.total_messages += 1;
            *stats.by_kind.entry(message.kind()).or_insert(0) += 1;
            *stats.by_role.entry(message.sender).or_insert(0) += 1;
            if let Some(fid) = message.factor_id {
                *stats.by_factor.entry(fid).or_insert(0) += 1;
            }
            if message.is_update {
                stats.updates += 1;
            }
        }

        stats
    }
}

/// Per-factor debates and deliberation-level messages folded from a log
#[derive(Debug, Clone)]
pub struct DebateLedger {
    pub deliberation_id: String,
    pub problem_statement: String,
    pub factors: Vec<Factor>,
    pub validations: Vec<FactorValidation>,
    pub created_at: DateTime<Utc>,
    debates: BTreeMap<FactorId, FactorDebate>,
    /// Latest synthesis note
    pub synthesis: Option<SynthesisReport>,
    /// Latest final directive
    pub recommendation: Option<FinalRecommendation>,
}

impl DebateLedger {
    /// Fold an ordered log into a ledger
    pub fn from_messages(messages: &[Message]) -> ReplayResult<Self> {
        let (first, rest) = messages.split_first().ok_or(ReplayError::MissingFactorList)?;
        let Payload::FactorList(list) = &first.payload else {
            return Err(ReplayError::MissingFactorList);
        };

        let mut ledger = Self {
            deliberation_id: list.deliberation_id.clone(),
            problem_statement: list.problem_statement.clone(),
            factors: list.factors.clone(),
            validations: list.validations.clone(),
            created_at: first.created_at,
            debates: list
                .factors
                .iter()
                .map(|f| (f.id, FactorDebate::new(f.clone())))
                .collect(),
            synthesis: None,
            recommendation: None,
        };

        for message in rest {
            ledger.apply(message)?;
        }

        debug!(
            deliberation_id = %ledger.deliberation_id,
            messages = messages.len(),
            factors = ledger.factors.len(),
            "Ledger folded from log"
        );
        Ok(ledger)
    }

    fn apply(&mut self, message: &Message) -> ReplayResult<()> {
        match &message.payload {
            Payload::FactorList(_) => return Err(ReplayError::DuplicateFactorList(message.id)),
            Payload::SynthesisNote(report) => self.synthesis = Some(report.clone()),
            Payload::FinalDirective(recommendation) => {
                self.recommendation = Some(recommendation.clone())
            }
            Payload::SupportArgument(_) | Payload::Critique(_) | Payload::Rebuttal(_) => {
                let factor_id = message.factor_id.ok_or_else(|| {
                    ReplayError::Incomplete(format!("message {} has no factor id", message.id))
                })?;
                let debate =
                    self.debates
                        .get_mut(&factor_id)
                        .ok_or(ReplayError::UnknownFactor {
                            id: message.id,
                            factor_id,
                        })?;
                debate.apply(message)?;
            }
        }
        Ok(())
    }

    /// Debate state for one factor
    pub fn debate(&self, factor_id: FactorId) -> Option<&FactorDebate> {
        self.debates.get(&factor_id)
    }

    /// Scored records in factor order.
    ///
    /// Debates are resolved on a copy, so a live ledger can be scored
    /// repeatedly.
    pub fn records(&self, config: &ScoringConfig) -> ReplayResult<Vec<DebateRecord>> {
        self.debates
            .values()
            .map(|debate| {
                let mut debate = debate.clone();
                debate.resolve()?;
                let confidence = self
                    .synthesis
                    .as_ref()
                    .and_then(|s| s.factor_confidence(debate.factor().id));
                Ok(debate.to_record(config, confidence))
            })
            .collect()
    }

    /// Whether any factor was flagged as circular at extraction
    pub fn circular_flagged(&self) -> bool {
        self.validations.iter().any(|v| v.circular)
    }

    /// Build the aggregate. Requires a final directive in the log.
    pub fn into_deliberation(self, config: &ScoringConfig) -> ReplayResult<Deliberation> {
        let records = self.records(config)?;
        let recommendation = self
            .recommendation
            .ok_or_else(|| ReplayError::Incomplete("no FINAL_DIRECTIVE".to_string()))?;

        let counts = ResolutionCounts::from_records(&records);
        let scores: Vec<f64> = records.iter().map(|r| r.disagreement_score).collect();
        let integrity = IntegrityReport::evaluate(
            &self.factors,
            &self.validations,
            &records,
            self.synthesis.as_ref(),
            &recommendation,
        );

        let assumptions = Assumption::surviving(&self.factors, &records);

        Ok(Deliberation {
            id: self.deliberation_id,
            problem_statement: self.problem_statement,
            factors: self.factors,
            validations: self.validations,
            overall_risk: scoring::overall_risk(&counts, recommendation.confidence),
            overall_disagreement: scoring::overall_disagreement(&scores),
            debates: records,
            synthesis: self.synthesis,
            recommendation,
            counts,
            assumptions,
            integrity,
            created_at: self.created_at,
        })
    }
}

/// Replay a complete log into the `Deliberation` it produced
pub fn project(messages: &[Message], config: &ScoringConfig) -> ReplayResult<Deliberation> {
    let deliberation = DebateLedger::from_messages(messages)?.into_deliberation(config)?;
    info!(
        deliberation_id = %deliberation.id,
        messages = messages.len(),
        decision = %deliberation.recommendation.decision,
        "Log projected"
    );
    Ok(deliberation)
}
