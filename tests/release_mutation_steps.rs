//! Behaviour tests for the release mutation guard.

#[path = "release_mutation_steps/mod.rs"]
mod release_mutation_steps_defs;

use release_mutation_steps_defs::world::{ReleaseMutationWorld, world};
use rstest_bdd_macros::scenario;

#[scenario(
    path = "tests/features/release_mutation.feature",
    name = "Reject a second install while the first is outstanding"
)]
#[tokio::test(flavor = "multi_thread")]
async fn reject_second_install(world: ReleaseMutationWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/release_mutation.feature",
    name = "Accept an install once the previous task timed out"
)]
#[tokio::test(flavor = "multi_thread")]
async fn accept_install_after_timeout(world: ReleaseMutationWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/release_mutation.feature",
    name = "Installs of different releases do not block each other"
)]
#[tokio::test(flavor = "multi_thread")]
async fn independent_releases_do_not_block(world: ReleaseMutationWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/release_mutation.feature",
    name = "Deleting an unknown release does nothing"
)]
#[tokio::test(flavor = "multi_thread")]
async fn delete_unknown_release(world: ReleaseMutationWorld) {
    let _ = world;
}
