//! Progress relay for one deliberation.
//!
//! The deliberation runs on its own task; the relay subscribes to its bus
//! with backfill and forwards each message, in log order, as a
//! `ProgressEvent`. The observer sees `Connected`, then `Progress`*, then
//! exactly one terminal `Complete` or `Error`, after which the channel
//! closes.
//!
//! A departed observer never stops the deliberation: it still completes
//! and is still saved to history.

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::DeliberationError;
use crate::events::{
    FactorId, Message, MessageBus, MessageFilter, MessageId, MessageKind, Payload,
    SharedMessageBus,
};
use crate::orchestrator::DeliberationOrchestrator;
use crate::report::Deliberation;
use crate::validation::IntegrityReport;

/// Events buffered per observer before the relay waits.
pub const STREAM_BUFFER: usize = 64;

/// Pipeline stage a progress event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    FactorExtraction,
    Debate,
    Synthesis,
    Final,
    Validation,
}

impl Stage {
    pub fn for_kind(kind: MessageKind) -> Self {
        match kind {
            MessageKind::FactorList => Self::FactorExtraction,
            MessageKind::SupportArgument | MessageKind::Critique | MessageKind::Rebuttal => {
                Self::Debate
            }
            MessageKind::SynthesisNote => Self::Synthesis,
            MessageKind::FinalDirective => Self::Final,
        }
    }
}

/// One observer-facing step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressUpdate {
    pub stage: Stage,
    pub status: String,
    /// Bus message this update mirrors, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<MessageId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub factor_id: Option<FactorId>,
    /// Snapshot of the message payload
    pub payload: Value,
}

impl ProgressUpdate {
    pub fn from_message(message: &Message) -> Self {
        Self {
            stage: Stage::for_kind(message.kind()),
            status: status_line(message),
            message_id: Some(message.id),
            factor_id: message.factor_id,
            payload: serde_json::to_value(&message.payload).unwrap_or(Value::Null),
        }
    }

    fn integrity(report: &IntegrityReport) -> Self {
        let status = if report.valid {
            "Integrity checks passed".to_string()
        } else {
            format!("Integrity checks failed: {}", report.failures().join("; "))
        };
        Self {
            stage: Stage::Validation,
            status,
            message_id: None,
            factor_id: None,
            payload: serde_json::to_value(report).unwrap_or(Value::Null),
        }
    }
}

fn status_line(message: &Message) -> String {
    let factor = message
        .factor_id
        .map(|id| format!("Factor {id}"))
        .unwrap_or_default();
    match &message.payload {
        Payload::FactorList(list) => format!("Extracted {} factors", list.factors.len()),
        Payload::SupportArgument(support) if support.has_evidence => {
            format!("{factor}: supporting argument with {} quotes", support.quotes.len())
        }
        Payload::SupportArgument(_) => format!("{factor}: supporting argument without evidence"),
        Payload::Critique(critique) if critique.synthetic => {
            format!("{factor}: resolved {} after collaborator failure", critique.resolution)
        }
        Payload::Critique(critique) if message.is_update => {
            format!("{factor}: re-critique ruled {}", critique.resolution)
        }
        Payload::Critique(critique) => format!("{factor}: critique ruled {}", critique.resolution),
        Payload::Rebuttal(rebuttal) if rebuttal.is_concession => {
            format!("{factor}: supporter conceded")
        }
        Payload::Rebuttal(_) => format!("{factor}: rebuttal"),
        Payload::SynthesisNote(report) if report.fallback => {
            "Synthesis assembled from debate records".to_string()
        }
        Payload::SynthesisNote(_) => "Synthesis complete".to_string(),
        Payload::FinalDirective(rec) => {
            format!("Final decision: {} (confidence {:.2})", rec.decision, rec.confidence)
        }
    }
}

/// Event delivered to a stream observer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ProgressEvent {
    Connected {
        session_id: String,
    },
    Progress(ProgressUpdate),
    Complete {
        deliberation: Box<Deliberation>,
        history_id: Option<String>,
        warnings: Vec<String>,
    },
    Error {
        message: String,
        cancelled: bool,
    },
}

impl ProgressEvent {
    /// Frame name on the wire.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::Progress(_) => "progress",
            Self::Complete { .. } => "complete",
            Self::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Error { .. })
    }

    /// The `data` half of the frame.
    pub fn data(&self) -> Value {
        match serde_json::to_value(self) {
            Ok(Value::Object(mut map)) => map.remove("data").unwrap_or(Value::Null),
            _ => Value::Null,
        }
    }
}

/// Closes the bus when the run task ends, even by panic, so the relay's
/// subscription always terminates.
struct CloseOnDrop(SharedMessageBus);

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        self.0.close();
    }
}

/// Forwards events until the observer leaves.
struct Relay {
    tx: mpsc::Sender<ProgressEvent>,
    connected: bool,
}

impl Relay {
    async fn send(&mut self, event: ProgressEvent) {
        if !self.connected {
            return;
        }
        if self.tx.send(event).await.is_err() {
            self.connected = false;
            debug!("Progress observer disconnected; deliberation continues");
        }
    }
}

/// Start a deliberation and return its progress channel.
///
/// Cancelling `cancel` ends the run with a terminal `Error` event whose
/// `cancelled` flag is set.
pub fn stream_deliberation(
    orchestrator: DeliberationOrchestrator,
    problem: String,
    session_id: String,
    cancel: CancellationToken,
) -> mpsc::Receiver<ProgressEvent> {
    let (tx, rx) = mpsc::channel(STREAM_BUFFER);

    tokio::spawn(async move {
        let mut relay = Relay {
            tx,
            connected: true,
        };
        relay
            .send(ProgressEvent::Connected {
                session_id: session_id.clone(),
            })
            .await;

        let bus = MessageBus::new().shared();
        let mut subscription = bus.subscribe(MessageFilter::new().with_backfill());

        let run_bus = bus.clone();
        let run = tokio::spawn(async move {
            let _guard = CloseOnDrop(run_bus.clone());
            orchestrator.run(&problem, run_bus, cancel).await
        });

        let mut relayed = 0usize;
        while let Some(message) = subscription.recv().await {
            relayed += 1;
            relay
                .send(ProgressEvent::Progress(ProgressUpdate::from_message(&message)))
                .await;
        }

        let terminal = match run.await {
            Ok(Ok(outcome)) => {
                relay
                    .send(ProgressEvent::Progress(ProgressUpdate::integrity(
                        &outcome.deliberation.integrity,
                    )))
                    .await;
                ProgressEvent::Complete {
                    deliberation: Box::new(outcome.deliberation),
                    history_id: outcome.history_id,
                    warnings: outcome.warnings,
                }
            }
            Ok(Err(e)) => ProgressEvent::Error {
                cancelled: matches!(e, DeliberationError::Cancelled),
                message: e.to_string(),
            },
            Err(join_error) => {
                warn!(session_id = %session_id, error = %join_error, "Deliberation task failed");
                ProgressEvent::Error {
                    message: format!("Deliberation task failed: {join_error}"),
                    cancelled: false,
                }
            }
        };

        info!(
            session_id = %session_id,
            relayed,
            terminal = terminal.event_name(),
            "Progress stream finished"
        );
        relay.send(terminal).await;
    });

    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debate::Resolution;
    use crate::events::{CritiquePayload, ParticipantRole, RebuttalPayload};

    fn message(payload: Payload, is_update: bool) -> Message {
        Message {
            id: 7,
            sender: ParticipantRole::Critic,
            factor_id: Some(2),
            round: 2,
            is_update,
            payload,
            created_at: chrono::Utc::now(),
        }
    }

    fn critique(synthetic: bool) -> Payload {
        Payload::Critique(CritiquePayload {
            text: "t".to_string(),
            resolution: Resolution::Rejected,
            justification: "j".to_string(),
            sub_claims: vec![],
            synthetic,
        })
    }

    #[test]
    fn test_stage_mapping() {
        assert_eq!(Stage::for_kind(MessageKind::FactorList), Stage::FactorExtraction);
        assert_eq!(Stage::for_kind(MessageKind::Rebuttal), Stage::Debate);
        assert_eq!(Stage::for_kind(MessageKind::SynthesisNote), Stage::Synthesis);
        assert_eq!(Stage::for_kind(MessageKind::FinalDirective), Stage::Final);
    }

    #[test]
    fn test_status_lines() {
        let update = ProgressUpdate::from_message(&message(critique(false), true));
        assert_eq!(update.status, "Factor 2: re-critique ruled REJECTED");
        assert_eq!(update.message_id, Some(7));
        assert_eq!(update.payload["type"], "CRITIQUE");

        let degraded = ProgressUpdate::from_message(&message(critique(true), false));
        assert_eq!(
            degraded.status,
            "Factor 2: resolved REJECTED after collaborator failure"
        );

        let conceded = ProgressUpdate::from_message(&message(
            Payload::Rebuttal(RebuttalPayload {
                text: "CONCEDE".to_string(),
                is_concession: true,
            }),
            false,
        ));
        assert_eq!(conceded.status, "Factor 2: supporter conceded");
    }

    #[test]
    fn test_event_frames() {
        let error = ProgressEvent::Error {
            message: "Deliberation was cancelled".to_string(),
            cancelled: true,
        };
        assert_eq!(error.event_name(), "error");
        assert!(error.is_terminal());
        assert_eq!(error.data()["cancelled"], true);

        let connected = ProgressEvent::Connected {
            session_id: "s1".to_string(),
        };
        assert!(!connected.is_terminal());
        assert_eq!(connected.data()["session_id"], "s1");
    }
}
