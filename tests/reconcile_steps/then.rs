//! Then steps for manifest reconciliation scenarios.

use super::world::ReconcileWorld;
use eyre::WrapErr;
use manifest_reconciler::reconcile::{
    adapters::memory::PullRequestRecord,
    domain::{RunOutcome, SkipReason},
    services::DispatchOutcome,
};
use rstest_bdd_macros::then;

fn pull_request_from(
    world: &ReconcileWorld,
    head: &str,
) -> Result<PullRequestRecord, eyre::Report> {
    let manifest = world.manifest()?;
    world
        .platform
        .pull_requests(manifest)
        .wrap_err("list manifest pull requests")?
        .into_iter()
        .find(|record| record.head == head)
        .ok_or_else(|| eyre::eyre!("no pull request from {head}"))
}

fn run_outcome(world: &ReconcileWorld) -> Result<&RunOutcome, eyre::Report> {
    world
        .outcome()?
        .report()
        .map(|report| &report.outcome)
        .ok_or_else(|| eyre::eyre!("run did not complete: {:?}", world.outcomes))
}

#[then(r#"a pull request is open from branch "{head}""#)]
fn pull_request_is_open(world: &mut ReconcileWorld, head: String) -> Result<(), eyre::Report> {
    match run_outcome(world)? {
        RunOutcome::Proposed { branch, .. } if branch.as_str() == head => {}
        other => return Err(eyre::eyre!("expected a proposal from {head}, got {other:?}")),
    }
    let record = pull_request_from(world, &head)?;
    if !record.open {
        return Err(eyre::eyre!("pull request #{} is closed", record.number));
    }
    Ok(())
}

#[then(r#"the pull request from branch "{head}" mentions "{text}""#)]
fn pull_request_mentions(
    world: &mut ReconcileWorld,
    head: String,
    text: String,
) -> Result<(), eyre::Report> {
    let record = pull_request_from(world, &head)?;
    if !record.title.contains(&text) {
        return Err(eyre::eyre!("title {:?} does not mention {text}", record.title));
    }
    Ok(())
}

#[then(r#"the proposal from branch "{head}" is closed"#)]
fn proposal_is_closed(world: &mut ReconcileWorld, head: String) -> Result<(), eyre::Report> {
    let record = pull_request_from(world, &head)?;
    if record.open {
        return Err(eyre::eyre!("pull request #{} is still open", record.number));
    }
    Ok(())
}

#[then(r#"the proposal from branch "{head}" is still open"#)]
fn proposal_is_still_open(world: &mut ReconcileWorld, head: String) -> Result<(), eyre::Report> {
    let record = pull_request_from(world, &head)?;
    if !record.open {
        return Err(eyre::eyre!("pull request #{} was closed", record.number));
    }
    Ok(())
}

#[then(r#"the pushed deployment "{path}" pins "{image_ref}""#)]
fn pushed_deployment_pins(
    world: &mut ReconcileWorld,
    path: String,
    image_ref: String,
) -> Result<(), eyre::Report> {
    let pushes = world.provider.pushes().wrap_err("read pushes")?;
    let push = pushes
        .last()
        .ok_or_else(|| eyre::eyre!("nothing was pushed"))?;
    let contents = push
        .files
        .get(&path)
        .ok_or_else(|| eyre::eyre!("{path} missing from pushed commit"))?;
    let text = String::from_utf8_lossy(contents);
    if !text.contains(&format!("image: {image_ref}")) {
        return Err(eyre::eyre!("{path} does not pin {image_ref}:\n{text}"));
    }
    Ok(())
}

#[then("the run is skipped")]
fn run_is_skipped(world: &mut ReconcileWorld) -> Result<(), eyre::Report> {
    match run_outcome(world)? {
        RunOutcome::Skipped(SkipReason::StaleHead { .. } | SkipReason::ChecksNotReady) => Ok(()),
        other => Err(eyre::eyre!("expected a skipped run, got {other:?}")),
    }
}

#[then(r#"no branch "{branch}" exists in the manifest repository"#)]
fn no_branch_exists(world: &mut ReconcileWorld, branch: String) -> Result<(), eyre::Report> {
    let manifest = world.manifest()?;
    let tip = world
        .platform
        .branch(manifest, &branch)
        .wrap_err("look up branch")?;
    if let Some(existing) = tip {
        return Err(eyre::eyre!("branch {branch} exists at {existing}"));
    }
    Ok(())
}

#[then("the event is not routed")]
fn event_is_not_routed(world: &mut ReconcileWorld) -> Result<(), eyre::Report> {
    match world.outcome()? {
        DispatchOutcome::Unrouted { .. } => Ok(()),
        other => Err(eyre::eyre!("expected an unrouted event, got {other:?}")),
    }
}

#[then("no hosting call was made")]
fn no_hosting_call(world: &mut ReconcileWorld) -> Result<(), eyre::Report> {
    let calls = world.platform.calls().wrap_err("read hosting calls")?;
    if !calls.is_empty() {
        return Err(eyre::eyre!("unexpected hosting calls: {calls:?}"));
    }
    Ok(())
}
