//! When steps for manifest reconciliation scenarios.

use super::world::{BASE_BRANCH, ReconcileWorld, commit};
use manifest_reconciler::reconcile::domain::{
    CheckSuiteCompletedEvent, PushEvent, RepositoryFullName, WebhookEvent,
};
use rstest_bdd_macros::when;

#[when(r#"a check suite completes on "{repository}" for commit "{head}""#)]
fn a_check_suite_completes(
    world: &mut ReconcileWorld,
    repository: String,
    head: String,
) -> Result<(), eyre::Report> {
    let event = WebhookEvent::CheckSuite(CheckSuiteCompletedEvent {
        repository: RepositoryFullName::new(repository)?,
        head_branch: Some(BASE_BRANCH.to_owned()),
        head_sha: commit(&head)?,
        installation: None,
    });
    world.dispatch(event)
}

#[when(r#"a push to "{git_ref}" arrives from "{repository}""#)]
fn a_push_arrives(
    world: &mut ReconcileWorld,
    git_ref: String,
    repository: String,
) -> Result<(), eyre::Report> {
    let event = WebhookEvent::Push(PushEvent {
        repository: RepositoryFullName::new(repository)?,
        git_ref,
        installation: None,
    });
    world.dispatch(event)
}
