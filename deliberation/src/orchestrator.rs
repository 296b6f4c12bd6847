//! Deliberation orchestrator: runs one problem statement end to end.
//!
//! ```text
//! extract factors ─► validate ─► FACTOR_LIST
//!        │
//!        ▼
//! per-factor debates (bounded concurrency, ordered within a factor)
//!        │
//!        ▼
//! synthesis ─► SYNTHESIS_NOTE ─► decision + confidence ─► FINAL_DIRECTIVE
//!        │
//!        ▼
//! project(log) ─► Deliberation ─► history (best effort)
//! ```
//!
//! The returned `Deliberation` is the projection of the bus log, so
//! replaying the log reproduces it exactly.

use std::sync::Arc;

use futures::{StreamExt, TryStreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::collaborators::{parse, DirectiveSections, Panel, ReasoningEngine};
use crate::config::DeliberationConfig;
use crate::debate::{DebateRecord, FactorRunner, Resolution};
use crate::error::{DeliberationError, DeliberationResult};
use crate::events::{
    project, DebateLedger, Factor, FactorListPayload, LogStats, MessageBus, MessageDraft,
    MessageFilter, ParticipantRole, Payload, SharedMessageBus,
};
use crate::history::SharedHistoryStore;
use crate::report::{Decision, Deliberation, FinalRecommendation, SynthesisReport};
use crate::scoring::{self, ResolutionCounts};
use crate::validation::FactorValidator;

/// A completed run.
#[derive(Debug, Clone)]
pub struct DeliberationOutcome {
    pub deliberation: Deliberation,
    /// Set when the history store accepted the deliberation.
    pub history_id: Option<String>,
    /// Non-fatal problems, e.g. a failed save.
    pub warnings: Vec<String>,
}

/// Drives deliberations against one reasoning engine.
#[derive(Clone)]
pub struct DeliberationOrchestrator {
    panel: Panel,
    validator: FactorValidator,
    config: DeliberationConfig,
    history: Option<SharedHistoryStore>,
}

impl DeliberationOrchestrator {
    pub fn new(engine: Arc<dyn ReasoningEngine>, config: DeliberationConfig) -> Self {
        Self {
            panel: Panel::new(engine, &config),
            validator: FactorValidator::new(config.validation.clone()),
            config,
            history: None,
        }
    }

    /// Persist completed deliberations to `store`.
    pub fn with_history(mut self, store: SharedHistoryStore) -> Self {
        self.history = Some(store);
        self
    }

    pub fn config(&self) -> &DeliberationConfig {
        &self.config
    }

    pub fn history(&self) -> Option<&SharedHistoryStore> {
        self.history.as_ref()
    }

    /// Run on a private bus with no cancellation.
    pub async fn deliberate(&self, problem: &str) -> DeliberationResult<DeliberationOutcome> {
        self.run(problem, MessageBus::new().shared(), CancellationToken::new())
            .await
    }

    /// Run on `bus` until the final directive is published or `cancel`
    /// fires. The bus is closed either way.
    ///
    /// A cancelled run returns `DeliberationError::Cancelled` and writes
    /// no history.
    pub async fn run(
        &self,
        problem: &str,
        bus: SharedMessageBus,
        cancel: CancellationToken,
    ) -> DeliberationResult<DeliberationOutcome> {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(DeliberationError::Cancelled),
            result = self.drive(problem, &bus) => result,
        };
        bus.close();

        let deliberation = match result {
            Ok(deliberation) => deliberation,
            Err(e) => {
                warn!(error = %e, messages = bus.len(), "Deliberation aborted");
                return Err(e);
            }
        };

        let mut warnings = Vec::new();
        let history_id = match &self.history {
            Some(store) => match store.save(&deliberation).await {
                Ok(id) => Some(id),
                Err(e) => {
                    warn!(id = %deliberation.id, error = %e, "Failed to save deliberation");
                    warnings.push(format!("Deliberation was not saved to history: {e}"));
                    None
                }
            },
            None => None,
        };

        info!(
            id = %deliberation.id,
            saved = history_id.is_some(),
            "{}",
            deliberation.summary_line()
        );
        Ok(DeliberationOutcome {
            deliberation,
            history_id,
            warnings,
        })
    }

    async fn extract(&self, problem: &str) -> Vec<Factor> {
        match self.panel.extract_factors(problem).await {
            Ok(factors) if !factors.is_empty() => factors,
            Ok(_) => vec![parse::primary_factor(problem)],
            Err(e) => {
                warn!(error = %e, "Factor extraction failed; debating the problem as one factor");
                vec![parse::primary_factor(problem)]
            }
        }
    }

    async fn drive(&self, problem: &str, bus: &MessageBus) -> DeliberationResult<Deliberation> {
        let problem = problem.trim();
        if problem.is_empty() {
            return Err(DeliberationError::EmptyProblem);
        }
        let deliberation_id = Uuid::new_v4().to_string();
        info!(id = %deliberation_id, chars = problem.chars().count(), "Deliberation started");

        // ── Factor list ──
        let factors = self.extract(problem).await;
        let validations = self.validator.validate_all(&factors, problem);
        for validation in validations.iter().filter(|v| !v.is_valid()) {
            debug!(factor_id = validation.factor_id, "Factor flagged: {}", validation.summary());
        }
        bus.publish(MessageDraft::new(
            ParticipantRole::FactorExtractor,
            Payload::FactorList(FactorListPayload {
                deliberation_id,
                problem_statement: problem.to_string(),
                factors: factors.clone(),
                validations: validations.clone(),
            }),
        ))?;

        // ── Debates ──
        let runner = FactorRunner::new(&self.panel, bus, problem);
        let resolved: Vec<_> = futures::stream::iter(factors.iter().cloned())
            .map(|factor| {
                let validation = validations.iter().find(|v| v.factor_id == factor.id);
                runner.run(factor, validation)
            })
            .buffer_unordered(self.config.max_concurrent_factors.max(1))
            .try_collect()
            .await?;
        debug!(factors = resolved.len(), "All factors resolved");

        let records = self.records(bus)?;

        // ── Synthesis ──
        let mut synthesis = match self.panel.synthesize(problem, &factors, &records).await {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, "Synthesis failed; summarising from debate records");
                SynthesisReport::from_records(&factors, &records)
            }
        };
        synthesis.reconcile(&factors, &records);
        bus.publish(MessageDraft::new(
            ParticipantRole::Synthesizer,
            Payload::SynthesisNote(synthesis.clone()),
        ))?;

        // Per-factor confidence may have changed with the synthesis
        let ledger = self.ledger(bus)?;
        let records = ledger.records(&self.config.scoring)?;

        // ── Decision ──
        let counts = ResolutionCounts::from_records(&records);
        let decision = scoring::select_decision(&counts);
        let all_debated = records.iter().all(|r| r.debated);
        let confidence = scoring::resolve_confidence(
            synthesis.confidence,
            scoring::fallback_confidence(&counts, all_debated, ledger.circular_flagged()),
        );
        debug!(decision = %decision, confidence, "Decision computed");

        let sections = match self
            .panel
            .final_directive(problem, decision, confidence, &factors, &records, &synthesis)
            .await
        {
            Ok(sections) => sections,
            Err(e) => {
                warn!(error = %e, "Final directive failed; using computed reasoning");
                fallback_directive(decision, &counts)
            }
        };

        let recommendation = recommend(
            decision,
            confidence,
            sections,
            &factors,
            &records,
            &LogStats::from_messages(&bus.history(&MessageFilter::new())),
        );
        bus.publish(MessageDraft::new(
            ParticipantRole::Decider,
            Payload::FinalDirective(recommendation),
        ))?;

        Ok(project(&bus.history(&MessageFilter::new()), &self.config.scoring)?)
    }

    fn ledger(&self, bus: &MessageBus) -> DeliberationResult<DebateLedger> {
        Ok(DebateLedger::from_messages(
            &bus.history(&MessageFilter::new()),
        )?)
    }

    fn records(&self, bus: &MessageBus) -> DeliberationResult<Vec<DebateRecord>> {
        Ok(self.ledger(bus)?.records(&self.config.scoring)?)
    }
}

fn factor_name(factors: &[Factor], record: &DebateRecord) -> String {
    factors
        .iter()
        .find(|f| f.id == record.factor_id)
        .map(|f| f.name.clone())
        .unwrap_or_else(|| format!("Factor {}", record.factor_id))
}

/// Directive used when the decider is unavailable.
fn fallback_directive(decision: Decision, counts: &ResolutionCounts) -> DirectiveSections {
    let reasoning = format!(
        "Decision {decision} follows from the debate outcomes: {} accepted, {} partially \
         accepted, {} weakened and {} rejected of {} factors.",
        counts.accepted, counts.partially_accepted, counts.weakened, counts.rejected, counts.total
    );
    let recommendations = match decision {
        Decision::Proceed => vec!["Proceed and monitor the accepted factors".to_string()],
        Decision::Reject => vec!["Do not proceed on the current evidence".to_string()],
        Decision::ConditionalProceed => {
            vec!["Proceed only once the listed conditions hold".to_string()]
        }
        Decision::NeedsMoreData => {
            vec!["Gather evidence for the contested factors and deliberate again".to_string()]
        }
    };
    DirectiveSections {
        reasoning,
        recommendations,
        conditions: Vec::new(),
    }
}

/// Assemble the final recommendation.
///
/// Influence counts the directive itself, so the decider is never at zero.
fn recommend(
    decision: Decision,
    confidence: f64,
    sections: DirectiveSections,
    factors: &[Factor],
    records: &[DebateRecord],
    stats: &LogStats,
) -> FinalRecommendation {
    let argument = |r: &DebateRecord| format!("{}: {}", factor_name(factors, r), r.justification());

    let accepted_arguments = records
        .iter()
        .filter(|r| r.resolution.is_favorable())
        .map(argument)
        .collect();
    let rejected_arguments = records
        .iter()
        .filter(|r| !r.resolution.is_favorable())
        .map(argument)
        .collect();

    let conditions = (decision == Decision::ConditionalProceed).then(|| {
        if !sections.conditions.is_empty() {
            return sections.conditions.clone();
        }
        records
            .iter()
            .filter(|r| matches!(r.resolution, Resolution::PartiallyAccepted | Resolution::Weakened))
            .map(|r| format!("Resolve the open concerns on {}", factor_name(factors, r)))
            .collect()
    });

    let mut stats = stats.clone();
    *stats.by_role.entry(ParticipantRole::Decider).or_insert(0) += 1;

    FinalRecommendation {
        decision,
        confidence,
        reasoning: sections.reasoning,
        accepted_arguments,
        rejected_arguments,
        conditions,
        recommendations: sections.recommendations,
        agent_influence: scoring::agent_influence(&stats),
    }
}
