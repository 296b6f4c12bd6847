//! Deliberation outputs: synthesis report, final recommendation, and the
//! top-level `Deliberation` aggregate.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::debate::record::{DebateRecord, Resolution};
use crate::events::{Factor, FactorId, ParticipantRole};
use crate::scoring::ResolutionCounts;
use crate::validation::{FactorValidation, IntegrityReport};

/// Overall decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Proceed,
    Reject,
    ConditionalProceed,
    NeedsMoreData,
}

impl Decision {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Proceed => "PROCEED",
            Self::Reject => "REJECT",
            Self::ConditionalProceed => "CONDITIONAL_PROCEED",
            Self::NeedsMoreData => "NEEDS_MORE_DATA",
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A synthesis entry about one factor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SynthesisItem {
    #[serde(default)]
    pub factor_id: Option<FactorId>,
    #[serde(default)]
    pub factor_name: String,
    /// Why the factor worked, failed, or was rejected.
    #[serde(default, alias = "rejection_reason")]
    pub reason: String,
    #[serde(default)]
    pub confidence: Option<f64>,
}

/// A notable moment in a debate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DebateHighlight {
    #[serde(default)]
    pub factor_id: Option<FactorId>,
    /// strong_claim, concession, deadlock or breakthrough
    #[serde(default)]
    pub highlight_type: String,
    #[serde(default)]
    pub description: String,
}

/// Cross-factor summary produced by the synthesizer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SynthesisReport {
    pub what_worked: Vec<SynthesisItem>,
    pub what_failed: Vec<SynthesisItem>,
    pub analytically_rejected: Vec<SynthesisItem>,
    pub debate_highlights: Vec<DebateHighlight>,
    /// Keyed by factor id as written by the synthesizer.
    pub per_factor_confidence: BTreeMap<String, f64>,
    pub root_causes: Vec<String>,
    pub narrative_summary: String,
    /// Overall confidence, when the synthesizer committed to a number.
    pub confidence: Option<f64>,
    /// Set when this report was produced without the synthesizer.
    #[schemars(skip)]
    pub fallback: bool,
}

impl SynthesisReport {
    /// Confidence the synthesizer assigned to one factor, if numeric and in range.
    pub fn factor_confidence(&self, id: FactorId) -> Option<f64> {
        self.per_factor_confidence
            .get(&id.to_string())
            .copied()
            .filter(|c| c.is_finite())
            .map(|c| c.clamp(0.0, 1.0))
    }

    /// Make sure every rejected factor is listed as analytically rejected.
    pub fn reconcile(&mut self, factors: &[Factor], records: &[DebateRecord]) {
        for record in records.iter().filter(|r| r.resolution == Resolution::Rejected) {
            let listed = self
                .analytically_rejected
                .iter()
                .any(|item| item.factor_id == Some(record.factor_id));
            if listed {
                continue;
            }
            let name = factors
                .iter()
                .find(|f| f.id == record.factor_id)
                .map(|f| f.name.clone())
                .unwrap_or_default();
            self.analytically_rejected.push(SynthesisItem {
                factor_id: Some(record.factor_id),
                factor_name: name,
                reason: record.justification().to_string(),
                confidence: Some(1.0),
            });
        }
        self.analytically_rejected
            .sort_by_key(|item| item.factor_id.unwrap_or(FactorId::MAX));
    }

    /// Report assembled from the debate records alone.
    pub fn from_records(factors: &[Factor], records: &[DebateRecord]) -> Self {
        let mut report = Self {
            fallback: true,
            ..Self::default()
        };
        for record in records {
            let name = factors
                .iter()
                .find(|f| f.id == record.factor_id)
                .map(|f| f.name.clone())
                .unwrap_or_default();
            let item = SynthesisItem {
                factor_id: Some(record.factor_id),
                factor_name: name,
                reason: record.justification().to_string(),
                confidence: Some(record.confidence),
            };
            match record.resolution {
                Resolution::Accepted | Resolution::PartiallyAccepted => {
                    report.what_worked.push(item)
                }
                Resolution::Weakened => report.what_failed.push(item),
                Resolution::Rejected => {}
            }
        }
        report.reconcile(factors, records);
        report.narrative_summary = format!(
            "Synthesis unavailable; summarised {} debated factors from their recorded outcomes.",
            records.len()
        );
        report
    }
}

/// Final recommendation, immutable once published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalRecommendation {
    pub decision: Decision,
    pub confidence: f64,
    pub reasoning: String,
    pub accepted_arguments: Vec<String>,
    pub rejected_arguments: Vec<String>,
    /// Present only for `CONDITIONAL_PROCEED`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Vec<String>>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    /// Share of published messages per role (participation, not causation).
    pub agent_influence: BTreeMap<ParticipantRole, f64>,
}

/// A premise a supporter relied on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assumption {
    pub factor_id: FactorId,
    pub factor_name: String,
    pub text: String,
}

impl Assumption {
    /// Supporters' assumptions in factor order, skipping factors that
    /// resolved REJECTED.
    pub fn surviving(factors: &[Factor], records: &[DebateRecord]) -> Vec<Self> {
        records
            .iter()
            .filter(|r| r.resolution != Resolution::Rejected)
            .flat_map(|record| {
                let factor_name = factors
                    .iter()
                    .find(|f| f.id == record.factor_id)
                    .map(|f| f.name.clone())
                    .unwrap_or_default();
                record
                    .support
                    .iter()
                    .flat_map(|s| s.assumptions.iter())
                    .map(move |text| Self {
                        factor_id: record.factor_id,
                        factor_name: factor_name.clone(),
                        text: text.clone(),
                    })
            })
            .collect()
    }
}

/// The top-level aggregate persisted by the history adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deliberation {
    pub id: String,
    pub problem_statement: String,
    pub factors: Vec<Factor>,
    pub validations: Vec<FactorValidation>,
    /// One record per factor, ordered by factor id.
    pub debates: Vec<DebateRecord>,
    pub synthesis: Option<SynthesisReport>,
    pub recommendation: FinalRecommendation,
    pub counts: ResolutionCounts,
    /// Assumptions behind the factors that were not rejected.
    #[serde(default)]
    pub assumptions: Vec<Assumption>,
    pub overall_risk: f64,
    pub overall_disagreement: f64,
    pub integrity: IntegrityReport,
    pub created_at: DateTime<Utc>,
}

impl Deliberation {
    pub fn factor(&self, id: FactorId) -> Option<&Factor> {
        self.factors.iter().find(|f| f.id == id)
    }

    pub fn debate(&self, id: FactorId) -> Option<&DebateRecord> {
        self.debates.iter().find(|d| d.factor_id == id)
    }

    /// Compact summary line.
    pub fn summary_line(&self) -> String {
        format!(
            "[{}] {} factors | confidence={:.2} risk={:.2} disagreement={:.2}",
            self.recommendation.decision,
            self.factors.len(),
            self.recommendation.confidence,
            self.overall_risk,
            self.overall_disagreement
        )
    }
}
