//! Post-deliberation integrity report.
//!
//! Runs after the final directive and checks that the outcome is
//! consistent with the debates that produced it.

use serde::{Deserialize, Serialize};

use crate::debate::record::{DebateRecord, Resolution};
use crate::events::{Factor, FactorId};
use crate::report::{FinalRecommendation, SynthesisReport};

use super::factors::FactorValidation;

/// Named integrity checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    AllFactorsResolved,
    RejectedFactorsExcluded,
    CircularReasoning,
    IrrelevantFactors,
    /// Informational only; never affects validity.
    CriticWonDebate,
}

impl CheckKind {
    pub fn question(self) -> &'static str {
        match self {
            Self::AllFactorsResolved => "Do all factors have explicit resolutions?",
            Self::RejectedFactorsExcluded => "Did any rejected factor influence the outcome?",
            Self::CircularReasoning => "Did any circular reasoning occur?",
            Self::IrrelevantFactors => "Were any irrelevant factors introduced?",
            Self::CriticWonDebate => "Did the critic win any debate?",
        }
    }
}

/// Result of one check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrityCheck {
    pub check: CheckKind,
    pub passed: bool,
    pub message: String,
}

/// Integrity checks over a completed deliberation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub checks: Vec<IntegrityCheck>,
    /// Factors resolved without a real critique.
    pub bypassed_debate: Vec<FactorId>,
    /// Rejected factors excluded and every factor resolved.
    pub valid: bool,
}

impl IntegrityReport {
    pub fn evaluate(
        factors: &[Factor],
        validations: &[FactorValidation],
        records: &[DebateRecord],
        synthesis: Option<&SynthesisReport>,
        recommendation: &FinalRecommendation,
    ) -> Self {
        let unresolved: Vec<FactorId> = factors
            .iter()
            .filter(|f| !records.iter().any(|r| r.factor_id == f.id))
            .map(|f| f.id)
            .collect();
        let all_resolved = IntegrityCheck {
            check: CheckKind::AllFactorsResolved,
            passed: unresolved.is_empty(),
            message: if unresolved.is_empty() {
                "All factors have explicit resolutions".to_string()
            } else {
                format!("{} factors lack a resolution: {:?}", unresolved.len(), unresolved)
            },
        };

        let rejected: Vec<&Factor> = records
            .iter()
            .filter(|r| r.resolution == Resolution::Rejected)
            .filter_map(|r| factors.iter().find(|f| f.id == r.factor_id))
            .collect();
        let leaked: Vec<FactorId> = rejected
            .iter()
            .filter(|f| {
                let in_synthesis = synthesis.is_some_and(|s| {
                    s.what_worked.iter().any(|item| item.factor_id == Some(f.id))
                });
                let prefix = format!("{}:", f.name);
                let in_arguments = recommendation
                    .accepted_arguments
                    .iter()
                    .any(|a| a.starts_with(&prefix));
                in_synthesis || in_arguments
            })
            .map(|f| f.id)
            .collect();
        let excluded = IntegrityCheck {
            check: CheckKind::RejectedFactorsExcluded,
            passed: leaked.is_empty(),
            message: match (rejected.len(), leaked.is_empty()) {
                (0, _) => "No rejected factors to exclude".to_string(),
                (n, true) => format!("{n} rejected factors excluded from the outcome"),
                (_, false) => format!("Rejected factors {leaked:?} appear in the outcome"),
            },
        };

        let circular = validations.iter().filter(|v| v.circular).count();
        let ungrounded = validations.iter().filter(|v| !v.grounded).count();
        let circular_check = IntegrityCheck {
            check: CheckKind::CircularReasoning,
            passed: circular == 0,
            message: if circular == 0 {
                "No circular reasoning detected".to_string()
            } else {
                format!("{circular} circular factors flagged")
            },
        };
        let irrelevant_check = IntegrityCheck {
            check: CheckKind::IrrelevantFactors,
            passed: ungrounded == 0,
            message: if ungrounded == 0 {
                "No irrelevant factors introduced".to_string()
            } else {
                format!("{ungrounded} ungrounded factors detected")
            },
        };
        let critic_check = IntegrityCheck {
            check: CheckKind::CriticWonDebate,
            passed: !rejected.is_empty(),
            message: if rejected.is_empty() {
                "Critic did not reject any factors".to_string()
            } else {
                format!("Critic won {} debate(s)", rejected.len())
            },
        };

        let valid = all_resolved.passed && excluded.passed;
        let bypassed_debate = records
            .iter()
            .filter(|r| !r.debated)
            .map(|r| r.factor_id)
            .collect();

        Self {
            checks: vec![
                all_resolved,
                excluded,
                circular_check,
                irrelevant_check,
                critic_check,
            ],
            bypassed_debate,
            valid,
        }
    }

    pub fn check(&self, kind: CheckKind) -> Option<&IntegrityCheck> {
        self.checks.iter().find(|c| c.check == kind)
    }

    /// Messages of failed checks, excluding informational ones.
    pub fn failures(&self) -> Vec<String> {
        self.checks
            .iter()
            .filter(|c| !c.passed && c.check != CheckKind::CriticWonDebate)
            .map(|c| c.message.clone())
            .collect()
    }

    /// Human-readable report.
    pub fn render(&self) -> String {
        let mut out = String::from("=== INTEGRITY CHECK ===\n\n");
        for check in &self.checks {
            let mark = if check.passed { "✓" } else { "✗" };
            out.push_str(&format!(
                "{mark} {}\n   {}\n\n",
                check.check.question(),
                check.message
            ));
        }
        if !self.bypassed_debate.is_empty() {
            out.push_str(&format!(
                "Factors that bypassed debate: {:?}\n\n",
                self.bypassed_debate
            ));
        }
        out.push_str(if self.valid {
            "VERDICT: passed all integrity checks.\n"
        } else {
            "VERDICT: FAILED integrity checks.\n"
        });
        out
    }
}
