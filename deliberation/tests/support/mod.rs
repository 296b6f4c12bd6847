//! Shared helpers for deliberation integration tests: a scripted
//! reasoning engine and a canned four-factor launch debate.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use deliberation::{DeliberationConfig, EngineError, EngineRequest, ParticipantRole, ReasoningEngine};

pub type Script = dyn Fn(&EngineRequest) -> Result<String, EngineError> + Send + Sync;

/// Engine that answers from a closure and counts calls.
pub struct ScriptedEngine {
    script: Box<Script>,
    calls: AtomicUsize,
}

impl ScriptedEngine {
    pub fn new(
        script: impl Fn(&EngineRequest) -> Result<String, EngineError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            script: Box::new(script),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReasoningEngine for ScriptedEngine {
    async fn generate(&self, request: EngineRequest) -> Result<String, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.script)(&request)
    }
}

/// Engine that never answers a critic, for cancellation tests.
pub struct StalledCritic;

#[async_trait]
impl ReasoningEngine for StalledCritic {
    async fn generate(&self, request: EngineRequest) -> Result<String, EngineError> {
        if request.role == ParticipantRole::Critic {
            std::future::pending::<()>().await;
        }
        launch_script(&request)
    }
}

pub const PROBLEM: &str = "Should we launch product X? Customer demand doubled last quarter. \
    Production costs rose sharply this year. The sales team is understaffed. \
    Market timing looks favorable.";

pub const FACTORS_JSON: &str = r#"[
  {"id": 1, "quote": "Customer demand doubled last quarter", "name": "Customer demand", "description": "Demand doubled last quarter"},
  {"id": 2, "quote": "Production costs rose sharply this year", "name": "Production costs", "description": "Costs rose sharply"},
  {"id": 3, "quote": "The sales team is understaffed", "name": "Sales team staffing", "description": "The team is understaffed"},
  {"id": 4, "quote": "Market timing looks favorable", "name": "Market timing", "description": "Timing looks favorable"}
]"#;

pub const SYNTHESIS_JSON: &str = r#"{
  "what_worked": [{"factor_id": 1, "factor_name": "Customer demand", "reason": "quoted growth"}],
  "what_failed": [{"factor_id": 3, "factor_name": "Sales team staffing", "reason": "partly shown"}],
  "analytically_rejected": [],
  "per_factor_confidence": {"1": 0.9},
  "narrative_summary": "Demand is strong but costs are unproven."
}"#;

pub const DIRECTIVE: &str = "REASONING:\nDemand supports a launch, costs do not.\n\
    RECOMMENDATIONS:\n- Hire two sales staff\n- Re-quote suppliers\n\
    CONDITIONS:\n- Unit cost stays under target";

/// Factor 1 and 4 accepted, 2 rejected after a concession, 3 partially
/// accepted after a full rebuttal round.
pub fn launch_script(request: &EngineRequest) -> Result<String, EngineError> {
    let reply = match (request.role, request.factor_id, request.round) {
        (ParticipantRole::FactorExtractor, _, _) => FACTORS_JSON.to_string(),
        (ParticipantRole::Supporter, Some(id), 1) => format!(
            "Factor {id} is supported.\nQUOTE: \"Customer demand doubled last quarter\"\n\
             ASSUMPTIONS:\n- Factor {id} premise holds"
        ),
        (ParticipantRole::Critic, Some(1 | 4), 1) => {
            "Well supported.\nRESOLUTION: ACCEPTED\nJUSTIFICATION: The quote carries it.".to_string()
        }
        (ParticipantRole::Critic, Some(2), 1) => {
            "RESOLUTION: REJECTED\nJUSTIFICATION: No figures back the cost claim.".to_string()
        }
        (ParticipantRole::Critic, Some(_), 1) => "RESOLUTION: PARTIALLY_ACCEPTED\n\
            JUSTIFICATION: Only part holds.\n\
            SUB-CLAIMS:\n- Team is small: ACCEPTED\n- Team is untrained: REJECTED"
            .to_string(),
        (ParticipantRole::Supporter, Some(2), _) => {
            "CONCEDE: Unable to provide documentary evidence".to_string()
        }
        (ParticipantRole::Supporter, Some(_), _) => {
            "QUOTE: \"The sales team is understaffed\" because hiring stalled".to_string()
        }
        (ParticipantRole::Critic, Some(_), _) => {
            "RESOLUTION: PARTIALLY_ACCEPTED\nJUSTIFICATION: Still only partly shown.".to_string()
        }
        (ParticipantRole::Synthesizer, _, _) => SYNTHESIS_JSON.to_string(),
        (ParticipantRole::Decider, _, _) => DIRECTIVE.to_string(),
        (role, factor_id, round) => {
            return Err(EngineError::Request(format!(
                "unscripted call {role} {factor_id:?} round {round}"
            )))
        }
    };
    Ok(reply)
}

pub fn test_config() -> DeliberationConfig {
    DeliberationConfig {
        call_timeout_secs: 30,
        max_concurrent_factors: 2,
        ..DeliberationConfig::default()
    }
}

pub fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}
