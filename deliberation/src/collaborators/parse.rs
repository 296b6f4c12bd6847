//! Boundary parsing of collaborator text into typed payloads.
//!
//! Every function here is total: malformed output degrades to a
//! best-effort payload instead of an error.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use crate::debate::record::{Resolution, SubClaim};
use crate::events::{CritiquePayload, Factor, RebuttalPayload, SupportPayload};
use crate::report::SynthesisReport;

/// Name given to the single factor used when extraction yields nothing.
pub const PRIMARY_FACTOR_NAME: &str = "Primary Analysis Factor";

const PRIMARY_DESCRIPTION_CHARS: usize = 200;

static NUMBERED_ITEM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)[.)]\s*(.+?)(?::\s*(.+))?$").expect("NUMBERED_ITEM regex should compile")
});

static RESOLUTION_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)RESOLUTION:\s*\**\s*\[?\s*(ACCEPTED\s*\(DESCRIPTIVE ONLY\)|PARTIALLY[_ ]ACCEPTED|WEAKENED|REJECTED|ACCEPTED)",
    )
    .expect("RESOLUTION_LABEL regex should compile")
});

static JUSTIFICATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)JUSTIFICATION:\s*(.+?)(?:SUB-CLAIMS:|$)")
        .expect("JUSTIFICATION regex should compile")
});

static SUB_CLAIM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\s*[-*]\s*(.+?):\s*\**(ACCEPTED|REJECTED)\b")
        .expect("SUB_CLAIM regex should compile")
});

static QUOTE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)QUOTE:[ \t]*(.*)$").expect("QUOTE_LINE regex should compile")
});

static SUB_CLAIMS_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)SUB-CLAIMS:").expect("SUB_CLAIMS_HEADER regex should compile")
});

static SECTION_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\s*\**\s*(REASONING|RECOMMENDATIONS|CONDITIONS)\s*\**\s*:")
        .expect("SECTION_HEADER regex should compile")
});

static ASSUMPTIONS_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\s*\**\s*ASSUMPTIONS\s*\**\s*:").expect("ASSUMPTIONS_HEADER regex should compile")
});

static ANY_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*\**\s*[A-Z][A-Z_ -]*[A-Z]\s*\**\s*:").expect("ANY_HEADER regex should compile")
});

static LIST_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:[-*•]|\d+[.)])\s*").expect("LIST_MARKER regex should compile")
});

const MECHANISM_TERMS: &[&str] = &[
    "MECHANISM",
    "BECAUSE",
    "THEREFORE",
    "THUS",
    "CONSEQUENTLY",
    "LEADS TO",
    "RESULTS IN",
    "CAUSES",
];

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

fn clean_markup(text: &str) -> String {
    text.trim()
        .trim_matches(|c: char| c == '*' || c == '#' || c == '"' || c.is_whitespace())
        .to_string()
}

#[derive(Debug, Deserialize)]
struct RawFactor {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    quote: Option<String>,
}

/// The single factor used when nothing else can be extracted.
pub fn primary_factor(source: &str) -> Factor {
    Factor::new(
        1,
        PRIMARY_FACTOR_NAME,
        truncate_chars(source.trim(), PRIMARY_DESCRIPTION_CHARS),
    )
}

fn json_factors(text: &str) -> Option<Vec<Factor>> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    if end <= start {
        return None;
    }
    let raw: Vec<RawFactor> = serde_json::from_str(&text[start..=end]).ok()?;
    Some(
        raw.into_iter()
            .enumerate()
            .map(|(i, f)| {
                let name = f
                    .name
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or_else(|| format!("Factor {}", i + 1));
                let description = f
                    .description
                    .filter(|d| !d.trim().is_empty())
                    .unwrap_or_else(|| "No description provided".to_string());
                Factor {
                    id: 0,
                    name,
                    description,
                    quote: f.quote.filter(|q| !q.trim().is_empty()),
                }
            })
            .collect(),
    )
}

fn listed_factors(text: &str) -> Vec<Factor> {
    text.lines()
        .filter_map(|line| {
            let caps = NUMBERED_ITEM.captures(line.trim())?;
            let name = clean_markup(caps.get(2)?.as_str());
            let description = caps
                .get(3)
                .map(|d| d.as_str().trim().to_string())
                .unwrap_or_else(|| name.clone());
            Some(Factor::new(0, name, description))
        })
        .collect()
}

/// Factors from extractor output: a JSON array, else a numbered list, else
/// the primary factor. Ids are assigned 1..n and duplicate names dropped.
pub fn factors(text: &str) -> Vec<Factor> {
    let parsed = json_factors(text)
        .filter(|f| !f.is_empty())
        .unwrap_or_else(|| listed_factors(text));

    let mut seen = HashSet::new();
    let mut factors: Vec<Factor> = parsed
        .into_iter()
        .filter(|f| !f.name.trim().is_empty())
        .filter(|f| seen.insert(f.name.trim().to_lowercase()))
        .collect();

    if factors.is_empty() {
        return vec![primary_factor(text)];
    }
    for (i, factor) in factors.iter_mut().enumerate() {
        factor.id = (i + 1) as u32;
        factor.name = factor.name.trim().to_string();
    }
    factors
}

fn quotes(text: &str) -> Vec<String> {
    QUOTE_LINE
        .captures_iter(text)
        .filter_map(|caps| {
            let quote = clean_markup(caps.get(1)?.as_str());
            (!quote.is_empty()).then_some(quote)
        })
        .collect()
}

/// Items of the `ASSUMPTIONS:` section, which runs until the next
/// upper-case header.
fn assumptions(text: &str) -> Vec<String> {
    let Some(header) = ASSUMPTIONS_HEADER.find(text) else {
        return Vec::new();
    };
    text[header.end()..]
        .lines()
        .enumerate()
        .take_while(|(i, line)| *i == 0 || !ANY_HEADER.is_match(line))
        .map(|(_, line)| line.trim())
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| clean_markup(&LIST_MARKER.replace(line, "")))
        .filter(|item| !item.is_empty())
        .collect()
}

/// Supporting argument.
pub fn support(text: &str) -> SupportPayload {
    SupportPayload {
        argument: text.trim().to_string(),
        has_evidence: !text.to_uppercase().contains("INSUFFICIENT_EVIDENCE"),
        quotes: quotes(text),
        assumptions: assumptions(text),
    }
}

fn keyword_resolution(text: &str) -> Resolution {
    let upper = text.to_uppercase();
    if upper.contains("REJECT") {
        Resolution::Rejected
    } else if upper.contains("PARTIAL") {
        Resolution::PartiallyAccepted
    } else if upper.contains("WEAKEN") {
        Resolution::Weakened
    } else if upper.contains("ACCEPT") {
        Resolution::Accepted
    } else {
        Resolution::Rejected
    }
}

fn sub_claims(text: &str) -> Vec<SubClaim> {
    let Some(header) = SUB_CLAIMS_HEADER.find(text) else {
        return Vec::new();
    };
    SUB_CLAIM
        .captures_iter(&text[header.end()..])
        .filter_map(|caps| {
            let claim = clean_markup(caps.get(1)?.as_str());
            let status = caps.get(2)?.as_str();
            Some(if status.eq_ignore_ascii_case("REJECTED") {
                SubClaim::rejected(claim)
            } else {
                SubClaim::accepted(claim)
            })
        })
        .collect()
}

/// Critique with its resolution, justification and sub-claims.
pub fn critique(text: &str) -> CritiquePayload {
    let label = RESOLUTION_LABEL
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string());
    let descriptive_only = label
        .as_deref()
        .is_some_and(|l| l.to_uppercase().contains("DESCRIPTIVE"));
    let resolution = label
        .as_deref()
        .and_then(Resolution::from_label)
        .unwrap_or_else(|| keyword_resolution(text));

    let mut justification = JUSTIFICATION
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|j| !j.is_empty())
        .unwrap_or_else(|| "See critique text".to_string());
    if descriptive_only {
        justification = format!(
            "DESCRIPTIVE ONLY: {}. Describes what happened without establishing causality.",
            justification.trim_end_matches('.')
        );
    }

    CritiquePayload {
        text: text.trim().to_string(),
        resolution,
        justification,
        sub_claims: sub_claims(text),
        synthetic: false,
    }
}

/// Rebuttal. Without a quote the supporter has nothing left to offer,
/// so the rebuttal counts as a concession.
pub fn rebuttal(text: &str) -> RebuttalPayload {
    let upper = text.to_uppercase();
    RebuttalPayload {
        text: text.trim().to_string(),
        is_concession: upper.contains("CONCEDE") || !upper.contains("QUOTE:"),
    }
}

/// Whether the critique raised causality and the rebuttal only re-quoted.
pub fn causality_unanswered(critique_text: &str, rebuttal_text: &str) -> bool {
    if !critique_text.to_uppercase().contains("CAUSAL") {
        return false;
    }
    let rebuttal = rebuttal_text.to_uppercase();
    rebuttal.contains("QUOTE:") && !MECHANISM_TERMS.iter().any(|t| rebuttal.contains(t))
}

/// Re-critique, overridden to REJECTED when a causality challenge went
/// unanswered.
pub fn recritique(text: &str, original: &CritiquePayload, rebuttal: &RebuttalPayload) -> CritiquePayload {
    let mut parsed = critique(text);
    if causality_unanswered(&original.text, &rebuttal.text) {
        parsed.resolution = Resolution::Rejected;
        parsed.justification = "Causality challenge unanswered: the rebuttal re-quoted the \
            document without giving a causal mechanism"
            .to_string();
    }
    parsed
}

/// Synthesis report from the JSON object in `text`, else the whole text
/// as the narrative.
pub fn synthesis(text: &str) -> SynthesisReport {
    let json = match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if end > start => Some(&text[start..=end]),
        _ => None,
    };
    json.and_then(|j| serde_json::from_str::<SynthesisReport>(j).ok())
        .map(|mut report| {
            report.fallback = false;
            report
        })
        .unwrap_or_else(|| SynthesisReport {
            narrative_summary: text.trim().to_string(),
            ..SynthesisReport::default()
        })
}

/// Sections of a final directive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirectiveSections {
    pub reasoning: String,
    pub recommendations: Vec<String>,
    pub conditions: Vec<String>,
}

fn bullets(section: &str) -> Vec<String> {
    section
        .lines()
        .filter(|line| LIST_MARKER.is_match(line))
        .map(|line| clean_markup(&LIST_MARKER.replace(line, "")))
        .filter(|item| !item.is_empty())
        .collect()
}

/// Final directive sections. Without a `REASONING:` header the whole
/// text is the reasoning.
pub fn directive(text: &str) -> DirectiveSections {
    let headers: Vec<(String, usize, usize)> = SECTION_HEADER
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some((caps.get(1)?.as_str().to_uppercase(), whole.start(), whole.end()))
        })
        .collect();

    let mut sections = DirectiveSections::default();
    for (i, (name, _, body_start)) in headers.iter().enumerate() {
        let body_end = headers.get(i + 1).map_or(text.len(), |(_, start, _)| *start);
        let body = &text[*body_start..body_end];
        match name.as_str() {
            "REASONING" => sections.reasoning = body.trim().to_string(),
            "RECOMMENDATIONS" => sections.recommendations = bullets(body),
            "CONDITIONS" => sections.conditions = bullets(body),
            _ => {}
        }
    }
    if sections.reasoning.is_empty() {
        sections.reasoning = text.trim().to_string();
    }
    sections
}
