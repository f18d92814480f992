//! Then steps for release mutation BDD scenarios.

use super::world::ReleaseMutationWorld;
use harbormaster::release::services::BUSY_MESSAGE_PREFIX;
use rstest_bdd_macros::then;

#[then("the request is rejected as busy")]
fn rejected_as_busy(world: &ReleaseMutationWorld) -> Result<(), eyre::Report> {
    match world.last_result.as_ref() {
        Some(Err(err)) if err.is_busy() => {
            if err.to_string().starts_with(BUSY_MESSAGE_PREFIX) {
                Ok(())
            } else {
                Err(eyre::eyre!("unexpected busy message: {err}"))
            }
        }
        other => Err(eyre::eyre!("expected a busy rejection, got {other:?}")),
    }
}

#[then("the request is accepted")]
fn request_accepted(world: &ReleaseMutationWorld) -> Result<(), eyre::Report> {
    match world.last_result.as_ref() {
        Some(Ok(Some(_))) => Ok(()),
        other => Err(eyre::eyre!("expected a dispatched task, got {other:?}")),
    }
}

#[then("no task is dispatched")]
fn no_task_dispatched(world: &ReleaseMutationWorld) -> Result<(), eyre::Report> {
    match world.last_result.as_ref() {
        Some(Ok(None)) => Ok(()),
        other => Err(eyre::eyre!("expected no dispatch, got {other:?}")),
    }
}
