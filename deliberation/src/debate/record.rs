//! Resolution outcomes and the per-factor debate record.

use serde::{Deserialize, Serialize};

use crate::events::{CritiquePayload, FactorId, RebuttalPayload, SupportPayload};

/// Outcome category of a factor's debate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Resolution {
    Accepted,
    PartiallyAccepted,
    Weakened,
    Rejected,
}

impl Resolution {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Accepted => "ACCEPTED",
            Self::PartiallyAccepted => "PARTIALLY_ACCEPTED",
            Self::Weakened => "WEAKENED",
            Self::Rejected => "REJECTED",
        }
    }

    /// Parse a resolution label as a critic writes it.
    ///
    /// Accepts `ACCEPTED (DESCRIPTIVE ONLY)`, spaces or hyphens in place of
    /// underscores, and any casing.
    pub fn from_label(label: &str) -> Option<Self> {
        let normalized = label
            .trim()
            .to_ascii_uppercase()
            .replace(['-', ' '], "_");
        if normalized.starts_with("ACCEPTED") {
            return Some(Self::Accepted);
        }
        match normalized.as_str() {
            "PARTIALLY_ACCEPTED" | "PARTIAL" | "PARTIALLY" => Some(Self::PartiallyAccepted),
            "WEAKENED" => Some(Self::Weakened),
            "REJECTED" => Some(Self::Rejected),
            _ => None,
        }
    }

    /// Whether the factor survives into the accepted arguments.
    pub fn is_favorable(self) -> bool {
        matches!(self, Self::Accepted | Self::PartiallyAccepted)
    }

    /// Resolution after the supporter conceded the critique.
    ///
    /// A concession never strengthens a factor: partial acceptance drops
    /// to weakened, and nothing conceded can stand as accepted.
    pub fn conceded(self) -> Self {
        match self {
            Self::Accepted | Self::PartiallyAccepted => Self::Weakened,
            other => other,
        }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a single sub-claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubClaimStatus {
    Accepted,
    Rejected,
}

/// A narrower assertion within a factor, judged independently by the critic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubClaim {
    pub claim: String,
    pub status: SubClaimStatus,
}

impl SubClaim {
    pub fn accepted(claim: impl Into<String>) -> Self {
        Self {
            claim: claim.into(),
            status: SubClaimStatus::Accepted,
        }
    }

    pub fn rejected(claim: impl Into<String>) -> Self {
        Self {
            claim: claim.into(),
            status: SubClaimStatus::Rejected,
        }
    }
}

/// Fraction of `claims` marked rejected, `None` when there are no claims.
pub fn rejection_rate(claims: &[SubClaim]) -> Option<f64> {
    if claims.is_empty() {
        return None;
    }
    let rejected = claims
        .iter()
        .filter(|c| c.status == SubClaimStatus::Rejected)
        .count();
    Some(rejected as f64 / claims.len() as f64)
}

/// Finalised debate outcome for one factor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateRecord {
    pub factor_id: FactorId,
    pub support: Option<SupportPayload>,
    /// Highest-round critique.
    pub critique: Option<CritiquePayload>,
    pub rebuttal: Option<RebuttalPayload>,
    pub resolution: Resolution,
    /// In [0, 1].
    pub disagreement_score: f64,
    /// Contribution to overall confidence, in [0, 1].
    pub confidence: f64,
    /// Highest round reached.
    pub rounds: u32,
    /// Whether a real (non-synthetic) critique ruled on the factor.
    pub debated: bool,
}

impl DebateRecord {
    /// Fraction of sub-claims the critic rejected, if any were given.
    pub fn sub_claim_rejection_rate(&self) -> Option<f64> {
        rejection_rate(&self.critique.as_ref()?.sub_claims)
    }

    /// Justification given by the deciding critique.
    pub fn justification(&self) -> &str {
        self.critique
            .as_ref()
            .map(|c| c.justification.as_str())
            .unwrap_or("no critique recorded")
    }

    pub fn was_conceded(&self) -> bool {
        self.rebuttal.as_ref().is_some_and(|r| r.is_concession)
    }
}
