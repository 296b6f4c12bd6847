//! Per-factor debate state machine: phases, transitions, and the record
//! built incrementally as the factor's messages arrive.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::record::{self, DebateRecord, Resolution};
use crate::events::{
    CritiquePayload, Factor, FactorId, Message, Payload, RebuttalPayload, SupportPayload,
};
use crate::scoring::{self, DisagreementInputs, RebuttalSignal, ScoringConfig};

/// Phase of a factor's debate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FactorPhase {
    /// Extracted, nothing said yet.
    Pending,
    /// Supporting argument published.
    Supported,
    /// First critique published.
    Critiqued,
    /// Supporter answered the critique.
    Rebutted,
    /// Re-critique published, or the rebuttal conceded.
    Recritiqued,
    /// Final resolution fixed. Absorbing.
    Resolved,
}

impl FactorPhase {
    /// Whether this is a terminal phase.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Resolved)
    }

    /// Valid transitions from this phase.
    ///
    /// Every live phase may jump to `Resolved` so a collaborator failure
    /// can close the factor wherever it happens.
    pub fn valid_transitions(self) -> &'static [FactorPhase] {
        match self {
            Self::Pending => &[Self::Supported, Self::Resolved],
            Self::Supported => &[Self::Critiqued, Self::Resolved],
            Self::Critiqued => &[Self::Rebutted, Self::Resolved],
            Self::Rebutted => &[Self::Recritiqued, Self::Resolved],
            Self::Recritiqued => &[Self::Resolved],
            Self::Resolved => &[],
        }
    }
}

impl std::fmt::Display for FactorPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Supported => write!(f, "supported"),
            Self::Critiqued => write!(f, "critiqued"),
            Self::Rebutted => write!(f, "rebutted"),
            Self::Recritiqued => write!(f, "recritiqued"),
            Self::Resolved => write!(f, "resolved"),
        }
    }
}

/// A phase transition record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub from: FactorPhase,
    pub to: FactorPhase,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

/// Error for invalid state transitions or misrouted messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionError {
    pub factor_id: FactorId,
    pub from: FactorPhase,
    pub to: Option<FactorPhase>,
    pub reason: String,
}

impl std::fmt::Display for TransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.to {
            Some(to) => write!(
                f,
                "factor {}: invalid transition {} → {}: {}",
                self.factor_id, self.from, to, self.reason
            ),
            None => write!(
                f,
                "factor {} ({}): {}",
                self.factor_id, self.from, self.reason
            ),
        }
    }
}

impl std::error::Error for TransitionError {}

/// Debate state for one factor.
#[derive(Debug, Clone)]
pub struct FactorDebate {
    factor: Factor,
    phase: FactorPhase,
    transitions: Vec<PhaseTransition>,
    support: Option<SupportPayload>,
    /// Highest-round critique with its round.
    critique: Option<(u32, CritiquePayload)>,
    rebuttal: Option<RebuttalPayload>,
    resolution: Option<Resolution>,
    rounds: u32,
    text_chars: usize,
}

impl FactorDebate {
    pub fn new(factor: Factor) -> Self {
        Self {
            factor,
            phase: FactorPhase::Pending,
            transitions: Vec::new(),
            support: None,
            critique: None,
            rebuttal: None,
            resolution: None,
            rounds: 0,
            text_chars: 0,
        }
    }

    pub fn factor(&self) -> &Factor {
        &self.factor
    }

    pub fn phase(&self) -> FactorPhase {
        self.phase
    }

    pub fn transitions(&self) -> &[PhaseTransition] {
        &self.transitions
    }

    pub fn support(&self) -> Option<&SupportPayload> {
        self.support.as_ref()
    }

    pub fn critique(&self) -> Option<&CritiquePayload> {
        self.critique.as_ref().map(|(_, c)| c)
    }

    pub fn rebuttal(&self) -> Option<&RebuttalPayload> {
        self.rebuttal.as_ref()
    }

    /// Final resolution, once resolved.
    pub fn resolution(&self) -> Option<Resolution> {
        self.resolution
    }

    pub fn is_resolved(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Transition to a new phase with a reason.
    pub fn transition(&mut self, to: FactorPhase, reason: &str) -> Result<(), TransitionError> {
        if !self.phase.valid_transitions().contains(&to) {
            return Err(TransitionError {
                factor_id: self.factor.id,
                from: self.phase,
                to: Some(to),
                reason: format!(
                    "not a valid transition (allowed: {:?})",
                    self.phase.valid_transitions()
                ),
            });
        }

        debug!(
            factor_id = self.factor.id,
            from = %self.phase,
            to = %to,
            reason,
            "Factor phase transition"
        );
        self.transitions.push(PhaseTransition {
            from: self.phase,
            to,
            timestamp: Utc::now(),
            reason: reason.to_string(),
        });
        self.phase = to;
        Ok(())
    }

    fn reject_message(&self, reason: impl Into<String>) -> TransitionError {
        TransitionError {
            factor_id: self.factor.id,
            from: self.phase,
            to: None,
            reason: reason.into(),
        }
    }

    /// Fold one published message into the debate.
    ///
    /// Nothing is accepted once the factor is resolved.
    pub fn apply(&mut self, message: &Message) -> Result<(), TransitionError> {
        if message.factor_id != Some(self.factor.id) {
            return Err(self.reject_message(format!(
                "message {} belongs to factor {:?}",
                message.id, message.factor_id
            )));
        }
        if self.phase.is_terminal() {
            return Err(self.reject_message(format!(
                "factor already resolved; refusing {} message {}",
                message.kind(),
                message.id
            )));
        }

        match &message.payload {
            Payload::SupportArgument(support) => {
                self.transition(FactorPhase::Supported, "supporting argument published")?;
                self.support = Some(support.clone());
            }
            Payload::Critique(critique) if critique.synthetic => {
                self.transition(FactorPhase::Resolved, &critique.justification)?;
                self.keep_critique(message.round, critique);
                self.resolution = Some(critique.resolution);
            }
            Payload::Critique(critique) => {
                let (to, reason) = if message.is_update {
                    (FactorPhase::Recritiqued, "re-critique published")
                } else {
                    (FactorPhase::Critiqued, "critique published")
                };
                self.transition(to, reason)?;
                self.keep_critique(message.round, critique);
            }
            Payload::Rebuttal(rebuttal) => {
                self.transition(FactorPhase::Rebutted, "rebuttal published")?;
                self.rebuttal = Some(rebuttal.clone());
                if rebuttal.is_concession {
                    self.transition(FactorPhase::Recritiqued, "rebuttal conceded the critique")?;
                }
            }
            other => {
                return Err(self.reject_message(format!(
                    "{} is not a factor-level message",
                    other.kind()
                )));
            }
        }

        self.rounds = self.rounds.max(message.round);
        self.text_chars += message.payload.text_len();
        Ok(())
    }

    // The highest round wins; within a round the later message wins.
    fn keep_critique(&mut self, round: u32, critique: &CritiquePayload) {
        let newer = self
            .critique
            .as_ref()
            .map_or(true, |(kept_round, _)| round >= *kept_round);
        if newer {
            self.critique = Some((round, critique.clone()));
        }
    }

    /// Resolution implied by the messages so far.
    ///
    /// The deciding critique rules; a concession can only weaken it.
    pub fn current_resolution(&self) -> Option<Resolution> {
        if let Some(resolution) = self.resolution {
            return Some(resolution);
        }
        let (_, critique) = self.critique.as_ref()?;
        if self.rebuttal.as_ref().is_some_and(|r| r.is_concession) {
            Some(critique.resolution.conceded())
        } else {
            Some(critique.resolution)
        }
    }

    /// Whether the critique leaves room for a rebuttal round.
    pub fn needs_rebuttal(&self) -> bool {
        self.phase == FactorPhase::Critiqued
            && self
                .critique()
                .is_some_and(|c| c.resolution != Resolution::Accepted)
    }

    /// Fix the final resolution. Idempotent once resolved.
    pub fn resolve(&mut self) -> Result<Resolution, TransitionError> {
        if let (FactorPhase::Resolved, Some(resolution)) = (self.phase, self.resolution) {
            return Ok(resolution);
        }
        let resolution = self.current_resolution().ok_or_else(|| {
            self.reject_message("cannot resolve a factor that was never critiqued")
        })?;
        self.transition(
            FactorPhase::Resolved,
            &format!("resolved {}", resolution.as_str()),
        )?;
        self.resolution = Some(resolution);
        Ok(resolution)
    }

    /// Scoring inputs observed in this debate.
    pub fn disagreement_inputs(&self) -> DisagreementInputs {
        DisagreementInputs {
            resolution: self.current_resolution(),
            // A factor with no support message at all had no evidence either
            has_evidence: self.support.as_ref().is_some_and(|s| s.has_evidence),
            rebuttal: self.rebuttal.as_ref().map(|r| RebuttalSignal {
                is_concession: r.is_concession,
                chars: r.text.chars().count(),
            }),
            total_chars: self.text_chars,
            sub_claim_rejection_rate: self
                .critique()
                .and_then(|c| record::rejection_rate(&c.sub_claims)),
        }
    }

    /// Snapshot the debate as a scored record.
    ///
    /// `confidence` overrides the default contribution of
    /// `1 - disagreement`.
    pub fn to_record(&self, config: &ScoringConfig, confidence: Option<f64>) -> DebateRecord {
        let disagreement = scoring::disagreement_score(&self.disagreement_inputs(), config);
        DebateRecord {
            factor_id: self.factor.id,
            support: self.support.clone(),
            critique: self.critique().cloned(),
            rebuttal: self.rebuttal.clone(),
            resolution: self.current_resolution().unwrap_or(Resolution::Rejected),
            disagreement_score: disagreement,
            confidence: confidence.unwrap_or(1.0 - disagreement),
            rounds: self.rounds,
            debated: self.critique().is_some_and(|c| !c.synthetic),
        }
    }

    /// Compact status line.
    pub fn status_line(&self) -> String {
        format!(
            "[{}] factor {} '{}' | round {} | {}",
            self.phase,
            self.factor.id,
            self.factor.name,
            self.rounds,
            self.current_resolution()
                .map(|r| r.as_str())
                .unwrap_or("unresolved")
        )
    }
}
