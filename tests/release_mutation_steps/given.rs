//! Given steps for release mutation BDD scenarios.

use super::world::{ReleaseMutationWorld, run_async};
use eyre::WrapErr;
use harbormaster::release::domain::ReleaseRequest;
use rstest_bdd_macros::given;

#[given("a release service whose task workers are stopped")]
fn service_with_stopped_workers(world: &mut ReleaseMutationWorld) {
    world.last_result = None;
}

#[given(r#"an install of "{name}" was dispatched with a {timeout:u64} second timeout"#)]
fn install_dispatched(
    world: &mut ReleaseMutationWorld,
    name: String,
    timeout: u64,
) -> Result<(), eyre::Report> {
    run_async(world.service.install_upgrade(
        "prod",
        ReleaseRequest::new(name, "nginx"),
        true,
        timeout,
    ))
    .wrap_err("dispatch the first install")?;
    world.last_timeout_secs = Some(timeout);
    Ok(())
}
