//! Prompt templates for each participant role.
//!
//! The output formats requested here are the ones `parse` understands.

use crate::debate::record::DebateRecord;
use crate::events::{CritiquePayload, Factor, ParticipantRole, RebuttalPayload, SupportPayload};
use crate::report::{Decision, SynthesisReport};
use crate::validation::FactorValidation;

/// Characters of the problem statement quoted into per-factor prompts.
const CONTEXT_CHARS: usize = 2000;

/// Statements shorter than this are judged with general knowledge allowed.
const SMALL_CONTEXT_CHARS: usize = 500;

pub const EXTRACTOR_SYSTEM: &str = r#"You are the Factor Extractor of a structured deliberation.
Identify the distinct factors in a document that bear on the decision it describes.
Extract only what exists in the document. Never invent facts or quotes."#;

pub const SUPPORTER_SYSTEM: &str = r#"You are the Supporter of a structured deliberation.
You argue FOR a factor using only evidence from the source document.
Quote the document verbatim. If the document holds no evidence, say so plainly."#;

pub const CRITIC_SYSTEM: &str = r#"You are the Critic of a structured deliberation.
You stress-test each factor and rule on it. Do not simulate false balance:
if the evidence invalidates a factor, reject it. Descriptive facts do not need a
causal mechanism; causal claims do."#;

pub const SYNTHESIZER_SYSTEM: &str = r#"You are the Synthesizer of a structured deliberation.
You summarise every factor debate into one structured report.
Rejected factors must never appear among the things that worked."#;

pub const DECIDER_SYSTEM: &str = r#"You are the Decider of a structured deliberation.
You explain a decision that has already been computed from the debate outcomes.
Be concrete and actionable."#;

pub fn system_prompt(role: ParticipantRole) -> &'static str {
    match role {
        ParticipantRole::FactorExtractor => EXTRACTOR_SYSTEM,
        ParticipantRole::Supporter => SUPPORTER_SYSTEM,
        ParticipantRole::Critic => CRITIC_SYSTEM,
        ParticipantRole::Synthesizer => SYNTHESIZER_SYSTEM,
        ParticipantRole::Decider => DECIDER_SYSTEM,
    }
}

fn excerpt(text: &str) -> String {
    let total = text.chars().count();
    if total <= CONTEXT_CHARS {
        return text.to_string();
    }
    let head: String = text.chars().take(CONTEXT_CHARS).collect();
    format!("{head}\n[... {} more characters]", total - CONTEXT_CHARS)
}

fn context_mode(problem: &str) -> &'static str {
    if problem.trim().chars().count() < SMALL_CONTEXT_CHARS {
        "CONTEXT MODE: SHORT STATEMENT. General knowledge is allowed; say \"Based on general knowledge\" when you use it."
    } else {
        "CONTEXT MODE: DOCUMENT. Use only information from the document."
    }
}

fn factor_block(factor: &Factor) -> String {
    let mut block = format!(
        "Factor {}: {}\nDescription: {}",
        factor.id, factor.name, factor.description
    );
    if let Some(quote) = &factor.quote {
        block.push_str(&format!("\nSource quote: \"{quote}\""));
    }
    block
}

pub fn extraction(problem: &str) -> String {
    format!(
        r#"Extract 3-8 factors from the document below.

For each factor give an exact QUOTE from the document, a short NAME derived from
the quote, and a DESCRIPTION that uses only the quote's content.

Document:
{problem}

Answer with a JSON array only:
[
  {{"id": 1, "quote": "exact text", "name": "Factor name", "description": "What the quote says"}}
]"#
    )
}

pub fn support(problem: &str, factor: &Factor) -> String {
    format!(
        r#"{mode}

{factor}

Argue for this factor. Every claim must cite the document on its own line as:
QUOTE: "exact text from the document"

List any premise the argument relies on that the document does not state:
ASSUMPTIONS:
- <assumption>

If the document contains no evidence for the factor, answer only:
INSUFFICIENT_EVIDENCE: <brief explanation>

Document:
{document}"#,
        mode = context_mode(problem),
        factor = factor_block(factor),
        document = excerpt(problem),
    )
}

pub fn critique(
    problem: &str,
    factor: &Factor,
    validation: Option<&FactorValidation>,
    support: &SupportPayload,
) -> String {
    let validation = validation
        .map(|v| {
            let mut notes = Vec::new();
            if v.circular {
                notes.push(format!("CIRCULAR ({})", v.circular_note));
            }
            if !v.grounded {
                notes.push(format!("UNGROUNDED ({})", v.grounding_note));
            }
            if notes.is_empty() {
                "Valid for debate".to_string()
            } else {
                notes.join("; ")
            }
        })
        .unwrap_or_else(|| "Not validated".to_string());

    format!(
        r#"{mode}

{factor}
Validation: {validation}

Supporter's argument:
{argument}
Evidence provided: {evidence}

Challenge the argument point by point. If the factor claims causality, check
that a causal mechanism is given. Do not reject a descriptive fact for lacking
a mechanism.

End with exactly:
RESOLUTION: ACCEPTED | ACCEPTED (DESCRIPTIVE ONLY) | PARTIALLY_ACCEPTED | WEAKENED | REJECTED
JUSTIFICATION: <one paragraph>
For PARTIALLY_ACCEPTED also give:
SUB-CLAIMS:
- <sub-claim>: ACCEPTED
- <sub-claim>: REJECTED

Document:
{document}"#,
        mode = context_mode(problem),
        factor = factor_block(factor),
        argument = support.argument,
        evidence = if support.has_evidence { "YES" } else { "NO" },
        document = excerpt(problem),
    )
}

pub fn rebuttal(
    problem: &str,
    factor: &Factor,
    support: &SupportPayload,
    critique: &CritiquePayload,
) -> String {
    format!(
        r#"{factor}

Your argument:
{argument}

The critic ruled {resolution}:
{critique}

Answer the critique. Provide an exact QUOTE from the document and explain the
mechanism, or concede with:
CONCEDE: <reason>

Document:
{document}"#,
        factor = factor_block(factor),
        argument = support.argument,
        resolution = critique.resolution,
        critique = critique.text,
        document = excerpt(problem),
    )
}

pub fn recritique(
    problem: &str,
    factor: &Factor,
    critique: &CritiquePayload,
    rebuttal: &RebuttalPayload,
) -> String {
    format!(
        r#"{factor}

Your earlier critique ({resolution}):
{critique}

The supporter's rebuttal:
{rebuttal}

Give your final ruling. A rebuttal that only repeats quotes does not answer a
causality challenge.

End with exactly:
RESOLUTION: ACCEPTED | ACCEPTED (DESCRIPTIVE ONLY) | PARTIALLY_ACCEPTED | WEAKENED | REJECTED
JUSTIFICATION: <one paragraph>

Document:
{document}"#,
        factor = factor_block(factor),
        resolution = critique.resolution,
        critique = critique.text,
        rebuttal = rebuttal.text,
        document = excerpt(problem),
    )
}

fn outcome_lines(factors: &[Factor], records: &[DebateRecord]) -> String {
    records
        .iter()
        .map(|r| {
            let name = factors
                .iter()
                .find(|f| f.id == r.factor_id)
                .map_or("unknown", |f| f.name.as_str());
            format!(
                "- Factor {} ({}): {} (disagreement {:.2}). {}",
                r.factor_id,
                name,
                r.resolution,
                r.disagreement_score,
                r.justification()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// JSON schema the synthesizer's report must follow.
pub fn synthesis_schema() -> String {
    let schema = schemars::schema_for!(SynthesisReport);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

pub fn synthesis(problem: &str, factors: &[Factor], records: &[DebateRecord]) -> String {
    format!(
        r#"Problem:
{problem}

Debate outcomes:
{outcomes}

Write a JSON object with these keys:
  "what_worked": [{{"factor_id", "factor_name", "reason", "confidence"}}],
  "what_failed": [...same shape...],
  "analytically_rejected": [{{"factor_id", "factor_name", "rejection_reason"}}],
  "debate_highlights": [{{"factor_id", "highlight_type", "description"}}],
  "per_factor_confidence": {{"<factor id>": <0..1>}},
  "root_causes": ["..."],
  "narrative_summary": "...",
  "confidence": <0..1>

REJECTED factors belong in analytically_rejected only.

Schema:
{schema}"#,
        problem = excerpt(problem),
        outcomes = outcome_lines(factors, records),
        schema = synthesis_schema(),
    )
}

pub fn final_directive(
    problem: &str,
    decision: Decision,
    confidence: f64,
    factors: &[Factor],
    records: &[DebateRecord],
    synthesis: &SynthesisReport,
) -> String {
    let conditions = if decision == Decision::ConditionalProceed {
        "\nCONDITIONS:\n- <condition that must hold to proceed>"
    } else {
        ""
    };
    format!(
        r#"Problem:
{problem}

Computed decision: {decision} (confidence {confidence:.2})

Debate outcomes:
{outcomes}

Synthesis:
{summary}

Explain this decision using these sections:
REASONING:
<why the outcomes lead to this decision>
RECOMMENDATIONS:
- <next step>{conditions}"#,
        problem = excerpt(problem),
        outcomes = outcome_lines(factors, records),
        summary = synthesis.narrative_summary,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_long_documents_are_excerpted() {
        let long = "x".repeat(CONTEXT_CHARS + 10);
        let prompt = support(&long, &Factor::new(1, "Demand", "d"));
        assert!(prompt.contains("[... 10 more characters]"));
        assert!(prompt.contains("CONTEXT MODE: DOCUMENT"));
    }

    #[test]
    fn test_critique_prompt_carries_validation() {
        let validation = FactorValidation {
            factor_id: 1,
            grounded: true,
            grounding_note: "Grounded".to_string(),
            circular: true,
            circular_note: "describes outcome".to_string(),
        };
        let support = SupportPayload {
            argument: "QUOTE: \"x\"".to_string(),
            has_evidence: false,
            quotes: vec![],
            assumptions: vec![],
        };
        let prompt = critique("short", &Factor::new(1, "Impact", "d"), Some(&validation), &support);
        assert!(prompt.contains("Validation: CIRCULAR (describes outcome)"));
        assert!(prompt.contains("Evidence provided: NO"));
        assert!(prompt.contains("CONTEXT MODE: SHORT STATEMENT"));
    }

    #[test]
    fn test_conditions_requested_only_for_conditional() {
        let report = SynthesisReport::default();
        let conditional = final_directive("p", Decision::ConditionalProceed, 0.5, &[], &[], &report);
        assert!(conditional.contains("CONDITIONS:"));
        let proceed = final_directive("p", Decision::Proceed, 0.9, &[], &[], &report);
        assert!(!proceed.contains("CONDITIONS:"));
    }

    #[test]
    fn test_synthesis_schema_lists_report_fields() {
        let schema = synthesis_schema();
        assert!(schema.contains("what_worked"));
        assert!(schema.contains("per_factor_confidence"));
        assert!(!schema.contains("\"fallback\""));
    }

    #[test]
    fn test_every_role_has_system_prompt() {
        for role in ParticipantRole::ALL {
            assert!(!system_prompt(role).is_empty());
        }
    }
}
