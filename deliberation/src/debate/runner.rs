//! Factor runner: drives one factor from PENDING to RESOLVED.
//!
//! Each step asks the panel for an artifact, publishes it, and folds the
//! published message back into the local `FactorDebate`, so the debate
//! state always mirrors the log.

use tracing::{debug, warn};

use super::record::Resolution;
use super::state::FactorDebate;
use crate::collaborators::{CollaboratorError, Panel};
use crate::error::DeliberationResult;
use crate::events::{
    CritiquePayload, Factor, MessageBus, MessageDraft, ParticipantRole, Payload, SupportPayload,
};
use crate::validation::FactorValidation;

/// Round of the supporting argument and first critique.
pub const OPENING_ROUND: u32 = 1;
/// Round of the rebuttal and re-critique.
pub const REBUTTAL_ROUND: u32 = 2;

/// Runs factor debates against one bus and problem statement.
pub struct FactorRunner<'a> {
    panel: &'a Panel,
    bus: &'a MessageBus,
    problem: &'a str,
}

impl<'a> FactorRunner<'a> {
    pub fn new(panel: &'a Panel, bus: &'a MessageBus, problem: &'a str) -> Self {
        Self {
            panel,
            bus,
            problem,
        }
    }

    fn publish(&self, debate: &mut FactorDebate, draft: MessageDraft) -> DeliberationResult<()> {
        let message = self.bus.publish(draft)?;
        debate.apply(&message)?;
        Ok(())
    }

    /// Close the factor as REJECTED after a collaborator gave up.
    fn degrade(
        &self,
        mut debate: FactorDebate,
        step: &str,
        error: CollaboratorError,
    ) -> DeliberationResult<FactorDebate> {
        let factor_id = debate.factor().id;
        warn!(
            factor_id,
            step,
            error = %error,
            "Collaborator failed; resolving factor as REJECTED"
        );
        let critique = CritiquePayload {
            text: format!("{step} unavailable: {error}"),
            resolution: Resolution::Rejected,
            justification: format!("The {step} step failed after retry, so the factor could not be debated"),
            sub_claims: Vec::new(),
            synthetic: true,
        };
        self.publish(
            &mut debate,
            MessageDraft::new(ParticipantRole::Critic, Payload::Critique(critique))
                .for_factor(factor_id)
                .round(OPENING_ROUND),
        )?;
        Ok(debate)
    }

    /// Debate one factor to resolution.
    ///
    /// Collaborator failures degrade the factor; only bus or state errors
    /// are returned.
    pub async fn run(
        &self,
        factor: Factor,
        validation: Option<&FactorValidation>,
    ) -> DeliberationResult<FactorDebate> {
        let factor_id = factor.id;
        let mut debate = FactorDebate::new(factor.clone());

        let support = match self.panel.support(self.problem, &factor).await {
            Ok(support) => support,
            Err(e) => return self.degrade(debate, "support", e),
        };
        self.publish(
            &mut debate,
            MessageDraft::new(
                ParticipantRole::Supporter,
                Payload::SupportArgument(support.clone()),
            )
            .for_factor(factor_id)
            .round(OPENING_ROUND),
        )?;

        let critique = match self
            .panel
            .critique(self.problem, &factor, validation, &support)
            .await
        {
            Ok(critique) => critique,
            Err(e) => return self.degrade(debate, "critique", e),
        };
        self.publish(
            &mut debate,
            MessageDraft::new(ParticipantRole::Critic, Payload::Critique(critique.clone()))
                .for_factor(factor_id)
                .round(OPENING_ROUND),
        )?;

        if debate.needs_rebuttal() {
            self.rebuttal_round(&mut debate, &factor, &support, &critique)
                .await?;
        }

        let resolution = debate.resolve()?;
        debug!(factor_id, resolution = %resolution, "Factor resolved");
        Ok(debate)
    }

    async fn rebuttal_round(
        &self,
        debate: &mut FactorDebate,
        factor: &Factor,
        support: &SupportPayload,
        critique: &CritiquePayload,
    ) -> DeliberationResult<()> {
        let rebuttal = match self
            .panel
            .rebut(self.problem, factor, support, critique)
            .await
        {
            Ok(rebuttal) => rebuttal,
            Err(e) => {
                warn!(factor_id = factor.id, error = %e, "Rebuttal failed; first critique stands");
                return Ok(());
            }
        };
        self.publish(
            debate,
            MessageDraft::new(ParticipantRole::Supporter, Payload::Rebuttal(rebuttal.clone()))
                .for_factor(factor.id)
                .round(REBUTTAL_ROUND),
        )?;

        if rebuttal.is_concession {
            debug!(factor_id = factor.id, "Rebuttal conceded the critique");
            return Ok(());
        }

        match self
            .panel
            .recritique(self.problem, factor, critique, &rebuttal)
            .await
        {
            Ok(recritique) => self.publish(
                debate,
                MessageDraft::new(ParticipantRole::Critic, Payload::Critique(recritique))
                    .for_factor(factor.id)
                    .round(REBUTTAL_ROUND)
                    .update(),
            ),
            Err(e) => {
                warn!(factor_id = factor.id, error = %e, "Re-critique failed; first critique stands");
                Ok(())
            }
        }
    }
}
