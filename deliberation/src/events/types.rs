//! Message types for the deliberation bus
//!
//! Collaborator output is normalised into these payloads before it is
//! published. Nothing untyped travels past the collaborator adapter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::debate::record::{Resolution, SubClaim};
use crate::report::{FinalRecommendation, SynthesisReport};
use crate::validation::FactorValidation;

/// Offset of a message in the append-only log (1-based, monotonic)
pub type MessageId = u64;

/// Stable identifier assigned to a factor at extraction
pub type FactorId = u32;

/// Wire-stable message kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    FactorList,
    SupportArgument,
    Critique,
    Rebuttal,
    SynthesisNote,
    FinalDirective,
}

impl MessageKind {
    pub const ALL: [MessageKind; 6] = [
        MessageKind::FactorList,
        MessageKind::SupportArgument,
        MessageKind::Critique,
        MessageKind::Rebuttal,
        MessageKind::SynthesisNote,
        MessageKind::FinalDirective,
    ];

    /// Wire name of this kind
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::FactorList => "FACTOR_LIST",
            MessageKind::SupportArgument => "SUPPORT_ARGUMENT",
            MessageKind::Critique => "CRITIQUE",
            MessageKind::Rebuttal => "REBUTTAL",
            MessageKind::SynthesisNote => "SYNTHESIS_NOTE",
            MessageKind::FinalDirective => "FINAL_DIRECTIVE",
        }
    }

    /// Whether messages of this kind must carry a factor id
    pub fn is_factor_scoped(self) -> bool {
        matches!(
            self,
            MessageKind::SupportArgument | MessageKind::Critique | MessageKind::Rebuttal
        )
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role of a deliberation participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParticipantRole {
    /// Splits the problem statement into factors.
    FactorExtractor,
    /// Argues for a factor and answers critiques.
    Supporter,
    /// Challenges a factor and rules on it.
    Critic,
    /// Summarises all debates.
    Synthesizer,
    /// Issues the final directive.
    Decider,
}

impl ParticipantRole {
    pub const ALL: [ParticipantRole; 5] = [
        ParticipantRole::FactorExtractor,
        ParticipantRole::Supporter,
        ParticipantRole::Critic,
        ParticipantRole::Synthesizer,
        ParticipantRole::Decider,
    ];

    /// Message kinds this role may publish.
    pub fn publishes(self) -> &'static [MessageKind] {
        match self {
            Self::FactorExtractor => &[MessageKind::FactorList],
            Self::Supporter => &[MessageKind::SupportArgument, MessageKind::Rebuttal],
            Self::Critic => &[MessageKind::Critique],
            Self::Synthesizer => &[MessageKind::SynthesisNote],
            Self::Decider => &[MessageKind::FinalDirective],
        }
    }

    /// Whether this role may publish the given kind.
    pub fn may_publish(self, kind: MessageKind) -> bool {
        self.publishes().contains(&kind)
    }
}

impl std::fmt::Display for ParticipantRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FactorExtractor => write!(f, "factor_extractor"),
            Self::Supporter => write!(f, "supporter"),
            Self::Critic => write!(f, "critic"),
            Self::Synthesizer => write!(f, "synthesizer"),
            Self::Decider => write!(f, "decider"),
        }
    }
}

/// A unit of debate, immutable once extracted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Factor {
    pub id: FactorId,
    pub name: String,
    pub description: String,
    /// Supporting quote from the problem statement, when the extractor gave one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote: Option<String>,
}

impl Factor {
    pub fn new(id: FactorId, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            description: description.into(),
            quote: None,
        }
    }
}

/// Payload of a `FACTOR_LIST` message
///
/// Carries the deliberation id and problem statement so the log is
/// self-describing for replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorListPayload {
    pub deliberation_id: String,
    pub problem_statement: String,
    pub factors: Vec<Factor>,
    #[serde(default)]
    pub validations: Vec<FactorValidation>,
}

/// Payload of a `SUPPORT_ARGUMENT` message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupportPayload {
    pub argument: String,
    pub has_evidence: bool,
    #[serde(default)]
    pub quotes: Vec<String>,
    /// Premises listed under `ASSUMPTIONS:`
    #[serde(default)]
    pub assumptions: Vec<String>,
}

/// Payload of a `CRITIQUE` message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CritiquePayload {
    pub text: String,
    pub resolution: Resolution,
    pub justification: String,
    #[serde(default)]
    pub sub_claims: Vec<SubClaim>,
    /// Produced by the orchestrator after a collaborator failure
    #[serde(default)]
    pub synthetic: bool,
}

/// Payload of a `REBUTTAL` message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RebuttalPayload {
    pub text: String,
    pub is_concession: bool,
}

/// Tagged union of every payload the bus carries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Payload {
    FactorList(FactorListPayload),
    SupportArgument(SupportPayload),
    Critique(CritiquePayload),
    Rebuttal(RebuttalPayload),
    SynthesisNote(SynthesisReport),
    FinalDirective(FinalRecommendation),
}

impl Payload {
    pub fn kind(&self) -> MessageKind {
        match self {
            Payload::FactorList(_) => MessageKind::FactorList,
            Payload::SupportArgument(_) => MessageKind::SupportArgument,
            Payload::Critique(_) => MessageKind::Critique,
            Payload::Rebuttal(_) => MessageKind::Rebuttal,
            Payload::SynthesisNote(_) => MessageKind::SynthesisNote,
            Payload::FinalDirective(_) => MessageKind::FinalDirective,
        }
    }

    /// Characters of free text carried by this payload
    pub fn text_len(&self) -> usize {
        match self {
            Payload::SupportArgument(p) => p.argument.chars().count(),
            Payload::Critique(p) => p.text.chars().count(),
            Payload::Rebuttal(p) => p.text.chars().count(),
            _ => 0,
        }
    }
}

/// A published, immutable bus message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub sender: ParticipantRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factor_id: Option<FactorId>,
    pub round: u32,
    pub is_update: bool,
    pub payload: Payload,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        self.payload.kind()
    }
}

/// A message before the bus has stamped it with an id and timestamp.
#[derive(Debug, Clone)]
pub struct MessageDraft {
    pub sender: ParticipantRole,
    pub factor_id: Option<FactorId>,
    pub round: u32,
    pub is_update: bool,
    pub payload: Payload,
}

impl MessageDraft {
    /// Round 1, no factor, not an update.
    pub fn new(sender: ParticipantRole, payload: Payload) -> Self {
        Self {
            sender,
            factor_id: None,
            round: 1,
            is_update: false,
            payload,
        }
    }

    pub fn for_factor(mut self, factor_id: FactorId) -> Self {
        self.factor_id = Some(factor_id);
        self
    }

    pub fn round(mut self, round: u32) -> Self {
        self.round = round;
        self
    }

    /// Mark this message as a revision of an earlier one of the same kind.
    pub fn update(mut self) -> Self {
        self.is_update = true;
        self
    }

    pub fn kind(&self) -> MessageKind {
        self.payload.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_wire_names() {
        for kind in MessageKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }

    #[test]
    fn test_role_publish_policy() {
        assert!(ParticipantRole::Supporter.may_publish(MessageKind::Rebuttal));
        assert!(ParticipantRole::Supporter.may_publish(MessageKind::SupportArgument));
        assert!(!ParticipantRole::Supporter.may_publish(MessageKind::Critique));
        assert!(ParticipantRole::Critic.may_publish(MessageKind::Critique));
        assert!(!ParticipantRole::Decider.may_publish(MessageKind::SynthesisNote));

        // Every kind has exactly one publishing role
        for kind in MessageKind::ALL {
            let owners = ParticipantRole::ALL
                .iter()
                .filter(|r| r.may_publish(kind))
                .count();
            assert_eq!(owners, 1, "{kind} should have one owner");
        }
    }

    #[test]
    fn test_payload_tag_is_message_type() {
        let payload = Payload::Rebuttal(RebuttalPayload {
            text: "I concede.".to_string(),
            is_concession: true,
        });
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "REBUTTAL");
        assert_eq!(json["is_concession"], true);
    }

    #[test]
    fn test_factor_scope() {
        assert!(MessageKind::Critique.is_factor_scoped());
        assert!(!MessageKind::FactorList.is_factor_scoped());
        assert!(!MessageKind::FinalDirective.is_factor_scoped());
    }

    #[test]
    fn test_draft_builder() {
        let draft = MessageDraft::new(
            ParticipantRole::Critic,
            Payload::Rebuttal(RebuttalPayload {
                text: String::new(),
                is_concession: false,
            }),
        )
        .for_factor(3)
        .round(2)
        .update();

        assert_eq!(draft.factor_id, Some(3));
        assert_eq!(draft.round, 2);
        assert!(draft.is_update);
        assert_eq!(draft.kind(), MessageKind::Rebuttal);
    }
}
