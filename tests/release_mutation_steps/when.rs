//! When steps for release mutation BDD scenarios.

use std::time::Duration;

use super::world::{ReleaseMutationWorld, run_async};
use harbormaster::release::domain::ReleaseRequest;
use rstest_bdd_macros::when;

#[when(r#"another install of "{name}" is requested"#)]
fn another_install(world: &mut ReleaseMutationWorld, name: String) {
    let result = run_async(world.service.install_upgrade(
        "prod",
        ReleaseRequest::new(name, "nginx"),
        true,
        60,
    ));
    world.last_result = Some(result.map(Some));
}

#[when("the previous task times out")]
fn previous_task_times_out(world: &mut ReleaseMutationWorld) -> Result<(), eyre::Report> {
    let timeout = world
        .last_timeout_secs
        .ok_or_else(|| eyre::eyre!("missing dispatched timeout in scenario world"))?;
    run_async(tokio::time::sleep(
        Duration::from_secs(timeout) + Duration::from_millis(1100),
    ));
    Ok(())
}

#[when(r#"deleting "{name}" is requested"#)]
fn delete_requested(world: &mut ReleaseMutationWorld, name: String) {
    let result = run_async(world.service.delete("prod", &name, true, 0, false));
    world.last_result = Some(result);
}
