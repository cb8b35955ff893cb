//! Advance one step of the intake flow.

use tracing::debug;

use crate::error::FlowError;
use crate::flow::registry::{StepRegistry, Transition};
use crate::flow::session::Session;
use crate::flow::step::Step;
use crate::flow::validators::is_skip;

/// What a successful advance did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Advanced {
    pub from: Step,
    pub to: Step,
    /// The user skipped the step; nothing was stored.
    pub skipped: bool,
}

/// Apply `raw_input` to the session's current step.
///
/// On success the answer is stored and `current_step` moves to the next
/// step. On any error the session is left untouched.
pub fn advance(
    registry: &StepRegistry,
    session: &mut Session,
    raw_input: &str,
) -> Result<Advanced, FlowError> {
    let from = session.current_step;
    let def = registry
        .get(from)
        .ok_or_else(|| FlowError::UnknownStep(from.to_string()))?;

    if is_skip(raw_input) {
        let Transition::Fixed(next) = def.transition else {
            return Err(FlowError::SkipNotAllowed { step: from });
        };
        session.current_step = next;
        debug!(external_id = %session.external_id, from = %from, to = %next, "Step skipped");
        return Ok(Advanced {
            from,
            to: next,
            skipped: true,
        });
    }

    let answer = def.validator.validate(raw_input, session)?;

    let normalized = raw_input.trim().to_lowercase();
    let next = def
        .transition
        .resolve(&normalized)
        .ok_or_else(|| FlowError::MissingBranch {
            step: from,
            input: normalized.clone(),
        })?;

    session.apply(answer);
    session.current_step = next;
    debug!(external_id = %session.external_id, from = %from, to = %next, "Step advanced");

    Ok(Advanced {
        from,
        to: next,
        skipped: false,
    })
}
