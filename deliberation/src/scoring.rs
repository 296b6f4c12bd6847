//! Resolution and scoring engine.
//!
//! Pure functions mapping observable debate features to disagreement,
//! decision, confidence, and risk numbers. Resolution category alone is
//! too coarse, so each score adds bounded adjustments derived from the
//! debate itself rather than from a second opaque judgment.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::debate::record::{DebateRecord, Resolution};
use crate::events::{LogStats, ParticipantRole};
use crate::report::Decision;

const BASE_ACCEPTED: f64 = 0.10;
const BASE_PARTIALLY_ACCEPTED: f64 = 0.40;
const BASE_WEAKENED: f64 = 0.60;
const BASE_REJECTED: f64 = 0.70;
const BASE_UNKNOWN: f64 = 0.50;

const NO_EVIDENCE_PENALTY: f64 = 0.15;
const CONCESSION_PENALTY: f64 = 0.15;
const SUBSTANTIVE_REBUTTAL_CREDIT: f64 = 0.10;
const CONTESTED_LENGTH_PENALTY: f64 = 0.05;
const SUB_CLAIM_WEIGHT: f64 = 0.20;

const CONFIDENCE_BASE: f64 = 0.7;
const CONFIDENCE_ALL_DEBATED: f64 = 0.1;
const CONFIDENCE_NO_CIRCULAR: f64 = 0.1;

const RISK_REJECTION_WEIGHT: f64 = 0.6;
const RISK_UNCERTAINTY_WEIGHT: f64 = 0.4;

/// Length thresholds used by the disagreement adjustments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// A non-concession rebuttal longer than this (chars) counts as substantive.
    pub substantive_rebuttal_chars: usize,
    /// Total debate text longer than this (chars) marks contested ground.
    pub contested_debate_chars: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            substantive_rebuttal_chars: 200,
            contested_debate_chars: 1500,
        }
    }
}

/// What the rebuttal round looked like, if there was one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RebuttalSignal {
    pub is_concession: bool,
    pub chars: usize,
}

/// Observable debate features that determine a factor's disagreement.
#[derive(Debug, Clone, PartialEq)]
pub struct DisagreementInputs {
    pub resolution: Option<Resolution>,
    pub has_evidence: bool,
    pub rebuttal: Option<RebuttalSignal>,
    pub total_chars: usize,
    /// Fraction of sub-claims rejected, when sub-claims were given.
    pub sub_claim_rejection_rate: Option<f64>,
}

impl DisagreementInputs {
    /// Resolution-only inputs: evidence present, no rebuttal, short debate.
    pub fn resolved(resolution: Resolution) -> Self {
        Self {
            resolution: Some(resolution),
            has_evidence: true,
            rebuttal: None,
            total_chars: 0,
            sub_claim_rejection_rate: None,
        }
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

fn base_disagreement(resolution: Option<Resolution>) -> f64 {
    match resolution {
        Some(Resolution::Accepted) => BASE_ACCEPTED,
        Some(Resolution::PartiallyAccepted) => BASE_PARTIALLY_ACCEPTED,
        Some(Resolution::Weakened) => BASE_WEAKENED,
        Some(Resolution::Rejected) => BASE_REJECTED,
        None => BASE_UNKNOWN,
    }
}

/// Disagreement score for one factor, clamped to [0, 1].
pub fn disagreement_score(inputs: &DisagreementInputs, config: &ScoringConfig) -> f64 {
    let mut score = base_disagreement(inputs.resolution);

    if !inputs.has_evidence {
        score += NO_EVIDENCE_PENALTY;
    }

    if let Some(rebuttal) = inputs.rebuttal {
        if rebuttal.is_concession {
            score += CONCESSION_PENALTY;
        } else if rebuttal.chars > config.substantive_rebuttal_chars {
            score -= SUBSTANTIVE_REBUTTAL_CREDIT;
        }
    }

    if inputs.total_chars > config.contested_debate_chars {
        score += CONTESTED_LENGTH_PENALTY;
    }

    if let Some(rate) = inputs.sub_claim_rejection_rate {
        score += SUB_CLAIM_WEIGHT * clamp_unit(rate);
    }

    clamp_unit(score)
}

/// Factor counts by final resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionCounts {
    pub accepted: usize,
    pub partially_accepted: usize,
    pub weakened: usize,
    pub rejected: usize,
    pub total: usize,
}

impl ResolutionCounts {
    pub fn from_resolutions(resolutions: impl IntoIterator<Item = Resolution>) -> Self {
        let mut counts = Self::default();
        for resolution in resolutions {
            counts.total += 1;
            match resolution {
                Resolution::Accepted => counts.accepted += 1,
                Resolution::PartiallyAccepted => counts.partially_accepted += 1,
                Resolution::Weakened => counts.weakened += 1,
                Resolution::Rejected => counts.rejected += 1,
            }
        }
        counts
    }

    pub fn from_records(records: &[DebateRecord]) -> Self {
        Self::from_resolutions(records.iter().map(|r| r.resolution))
    }

    /// `|accepted - rejected| / total`, 0 for an empty deliberation.
    pub fn clarity(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.accepted.abs_diff(self.rejected) as f64 / self.total as f64
    }
}

/// Pick the overall decision. Checked in priority order:
/// REJECT, CONDITIONAL_PROCEED, PROCEED, then NEEDS_MORE_DATA.
pub fn select_decision(counts: &ResolutionCounts) -> Decision {
    if counts.total == 0 {
        return Decision::NeedsMoreData;
    }
    // "more than half" compared in integers to avoid rounding at the boundary
    if counts.rejected * 2 > counts.total {
        return Decision::Reject;
    }
    if counts.partially_accepted > 0 || (counts.accepted > 0 && counts.rejected > 0) {
        return Decision::ConditionalProceed;
    }
    if counts.accepted * 2 > counts.total {
        return Decision::Proceed;
    }
    Decision::NeedsMoreData
}

/// Confidence when the synthesis did not supply one.
pub fn fallback_confidence(
    counts: &ResolutionCounts,
    all_debated: bool,
    circular_flagged: bool,
) -> f64 {
    let mut confidence = CONFIDENCE_BASE;
    if all_debated {
        confidence += CONFIDENCE_ALL_DEBATED;
    }
    if !circular_flagged {
        confidence += CONFIDENCE_NO_CIRCULAR;
    }
    clamp_unit(confidence * (0.7 + 0.3 * counts.clarity()))
}

/// Prefer a supplied numeric confidence, else the fallback.
pub fn resolve_confidence(supplied: Option<f64>, fallback: f64) -> f64 {
    match supplied {
        Some(value) if value.is_finite() => clamp_unit(value),
        _ => clamp_unit(fallback),
    }
}

/// `0.6 * rejected/total + 0.4 * (1 - confidence)`, clamped.
pub fn overall_risk(counts: &ResolutionCounts, confidence: f64) -> f64 {
    let rejected_share = if counts.total == 0 {
        0.0
    } else {
        counts.rejected as f64 / counts.total as f64
    };
    clamp_unit(
        RISK_REJECTION_WEIGHT * rejected_share
            + RISK_UNCERTAINTY_WEIGHT * (1.0 - clamp_unit(confidence)),
    )
}

/// Arithmetic mean of per-factor disagreement, 0 when there are none.
pub fn overall_disagreement(scores: &[f64]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    clamp_unit(scores.iter().sum::<f64>() / scores.len() as f64)
}

/// Share of published messages per participant role.
///
/// This counts message volume. It is a heuristic for participation,
/// not a causal attribution of the decision.
pub fn agent_influence(stats: &LogStats) -> BTreeMap<ParticipantRole, f64> {
    let total: usize = stats.by_role.values().sum();
    if total == 0 {
        return BTreeMap::new();
    }
    stats
        .by_role
        .iter()
        .map(|(role, count)| (*role, *count as f64 / total as f64))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn counts(resolutions: &[Resolution]) -> ResolutionCounts {
        ResolutionCounts::from_resolutions(resolutions.iter().copied())
    }

    // ── Disagreement ──

    #[test]
    fn test_base_scores() {
        let config = ScoringConfig::default();
        let cases = [
            (Some(Resolution::Accepted), 0.10),
            (Some(Resolution::PartiallyAccepted), 0.40),
            (Some(Resolution::Weakened), 0.60),
            (Some(Resolution::Rejected), 0.70),
            (None, 0.50),
        ];
        for (resolution, expected) in cases {
            let inputs = DisagreementInputs {
                resolution,
                ..DisagreementInputs::resolved(Resolution::Accepted)
            };
            assert!(close(disagreement_score(&inputs, &config), expected));
        }
    }

    #[test]
    fn test_missing_evidence_and_concession_add_up() {
        let inputs = DisagreementInputs {
            has_evidence: false,
            rebuttal: Some(RebuttalSignal {
                is_concession: true,
                chars: 20,
            }),
            ..DisagreementInputs::resolved(Resolution::Weakened)
        };
        assert!(close(
            disagreement_score(&inputs, &ScoringConfig::default()),
            0.90
        ));
    }

    #[test]
    fn test_substantive_rebuttal_reduces_disagreement() {
        let config = ScoringConfig::default();
        let long = DisagreementInputs {
            rebuttal: Some(RebuttalSignal {
                is_concession: false,
                chars: config.substantive_rebuttal_chars + 1,
            }),
            ..DisagreementInputs::resolved(Resolution::Rejected)
        };
        let short = DisagreementInputs {
            rebuttal: Some(RebuttalSignal {
                is_concession: false,
                chars: config.substantive_rebuttal_chars,
            }),
            ..DisagreementInputs::resolved(Resolution::Rejected)
        };
        assert!(close(disagreement_score(&long, &config), 0.60));
        assert!(close(disagreement_score(&short, &config), 0.70));
    }

    #[test]
    fn test_contested_length_adjustment() {
        let config = ScoringConfig::default();
        let inputs = DisagreementInputs {
            total_chars: config.contested_debate_chars + 1,
            ..DisagreementInputs::resolved(Resolution::PartiallyAccepted)
        };
        assert!(close(disagreement_score(&inputs, &config), 0.45));
    }

    #[test]
    fn test_sub_claim_term_three_of_four_rejected() {
        let inputs = DisagreementInputs {
            sub_claim_rejection_rate: Some(0.75),
            ..DisagreementInputs::resolved(Resolution::PartiallyAccepted)
        };
        // 0.40 base + 0.75 * 0.20
        assert!(close(
            disagreement_score(&inputs, &ScoringConfig::default()),
            0.55
        ));
    }

    #[test]
    fn test_score_is_clamped() {
        let config = ScoringConfig::default();
        let high = DisagreementInputs {
            resolution: Some(Resolution::Rejected),
            has_evidence: false,
            rebuttal: Some(RebuttalSignal {
                is_concession: true,
                chars: 0,
            }),
            total_chars: 10_000,
            sub_claim_rejection_rate: Some(1.0),
        };
        assert!(close(disagreement_score(&high, &config), 1.0));

        let low = DisagreementInputs {
            rebuttal: Some(RebuttalSignal {
                is_concession: false,
                chars: 5_000,
            }),
            ..DisagreementInputs::resolved(Resolution::Accepted)
        };
        assert!(close(disagreement_score(&low, &config), 0.0));
    }

    #[test]
    fn test_missing_evidence_does_not_change_resolution_inputs() {
        // Evidence only shifts the score; the resolution stays as judged.
        let inputs = DisagreementInputs {
            has_evidence: false,
            ..DisagreementInputs::resolved(Resolution::Accepted)
        };
        assert!(close(
            disagreement_score(&inputs, &ScoringConfig::default()),
            0.25
        ));
    }

    // ── Decision ──

    #[test]
    fn test_decision_reject_has_priority() {
        use Resolution::*;
        let c = counts(&[Rejected, Rejected, Rejected, PartiallyAccepted, Accepted]);
        assert_eq!(select_decision(&c), Decision::Reject);
    }

    #[test]
    fn test_decision_conditional_when_mixed() {
        use Resolution::*;
        let c = counts(&[Accepted, Accepted, Rejected, PartiallyAccepted]);
        assert_eq!(select_decision(&c), Decision::ConditionalProceed);
        assert!(close(c.clarity(), 0.25));

        let c = counts(&[Accepted, Accepted, Accepted, Rejected]);
        assert_eq!(select_decision(&c), Decision::ConditionalProceed);
    }

    #[test]
    fn test_decision_proceed_and_default() {
        use Resolution::*;
        assert_eq!(
            select_decision(&counts(&[Accepted, Accepted, Weakened])),
            Decision::Proceed
        );
        assert_eq!(
            select_decision(&counts(&[Accepted, Weakened])),
            Decision::NeedsMoreData
        );
        assert_eq!(select_decision(&counts(&[])), Decision::NeedsMoreData);
    }

    #[test]
    fn test_decision_half_rejected_is_not_reject() {
        use Resolution::*;
        let c = counts(&[Rejected, Rejected, Weakened, Weakened]);
        assert_eq!(select_decision(&c), Decision::NeedsMoreData);
    }

    // ── Confidence and risk ──

    #[test]
    fn test_fallback_confidence() {
        use Resolution::*;
        let c = counts(&[Accepted, Accepted, Rejected, PartiallyAccepted]);
        // (0.7 + 0.1 + 0.1) * (0.7 + 0.3 * 0.25)
        assert!(close(fallback_confidence(&c, true, false), 0.6975));
        // 0.7 * 0.775
        assert!(close(fallback_confidence(&c, false, true), 0.5425));
    }

    #[test]
    fn test_supplied_confidence_preferred() {
        assert!(close(resolve_confidence(Some(0.42), 0.9), 0.42));
        assert!(close(resolve_confidence(Some(1.7), 0.9), 1.0));
        assert!(close(resolve_confidence(Some(f64::NAN), 0.9), 0.9));
        assert!(close(resolve_confidence(None, 0.9), 0.9));
    }

    #[test]
    fn test_overall_risk() {
        use Resolution::*;
        let c = counts(&[Accepted, Rejected, Rejected, Accepted]);
        // 0.6 * 0.5 + 0.4 * 0.5
        assert!(close(overall_risk(&c, 0.5), 0.5));
        assert!(close(overall_risk(&ResolutionCounts::default(), 1.0), 0.0));
    }

    #[test]
    fn test_overall_disagreement_mean() {
        assert!(close(overall_disagreement(&[0.1, 0.7, 0.4]), 0.4));
        assert!(close(overall_disagreement(&[]), 0.0));
    }

    #[test]
    fn test_agent_influence_sums_to_one() {
        let mut stats = LogStats::default();
        stats.by_role.insert(ParticipantRole::Supporter, 3);
        stats.by_role.insert(ParticipantRole::Critic, 4);
        stats.by_role.insert(ParticipantRole::FactorExtractor, 1);

        let influence = agent_influence(&stats);
        let sum: f64 = influence.values().sum();
        assert!(close(sum, 1.0));
        assert!(close(influence[&ParticipantRole::Critic], 0.5));
        assert!(agent_influence(&LogStats::default()).is_empty());
    }
}
