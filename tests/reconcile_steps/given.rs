//! Given steps for manifest reconciliation scenarios.

use super::world::{BASE_BRANCH, BASE_TIP, ReconcileWorld, commit, deployment};
use eyre::WrapErr;
use manifest_reconciler::reconcile::domain::{
    BranchName, BranchPrefix, CheckConclusion, CheckReport, ImageName, ImageUpdate,
    ManagedTarget, RepositoryFullName,
};
use rstest_bdd_macros::given;

#[given(
    r#"a manifest repository "{repository}" with deployment "{path}" pinning "{image_ref}""#
)]
fn a_manifest_repository(
    world: &mut ReconcileWorld,
    repository: String,
    path: String,
    image_ref: String,
) -> Result<(), eyre::Report> {
    let manifest = RepositoryFullName::new(repository)?;
    world.install(&manifest)?;
    world
        .platform
        .set_branch(&manifest, &BranchName::new(BASE_BRANCH)?, commit(BASE_TIP)?)
        .wrap_err("create manifest base branch")?;
    world
        .provider
        .seed_file(&manifest, &path, deployment(&image_ref))
        .wrap_err("seed deployment manifest")?;
    world.manifest = Some(manifest);
    Ok(())
}

#[given(
    r#"a target repository "{repository}" releasing "{image}" to overlay "{overlay}" under prefix "{prefix}""#
)]
fn a_target_repository(
    world: &mut ReconcileWorld,
    repository: String,
    image: String,
    overlay: String,
    prefix: String,
) -> Result<(), eyre::Report> {
    let target_repository = RepositoryFullName::new(repository)?;
    world.install(&target_repository)?;
    let target = ManagedTarget::new(
        target_repository,
        BranchName::new(BASE_BRANCH)?,
        BranchPrefix::new(prefix)?,
        vec![ImageUpdate::new(ImageName::new(image)?, overlay)?],
    )
    .wrap_err("build managed target")?;
    world.targets.push(target);
    Ok(())
}

#[given(r#"an earlier proposal from branch "{head}""#)]
fn an_earlier_proposal(world: &mut ReconcileWorld, head: String) -> Result<(), eyre::Report> {
    let manifest = world.manifest()?.clone();
    world
        .platform
        .seed_pull_request(
            &manifest,
            &head,
            &BranchName::new(BASE_BRANCH)?,
            commit(BASE_TIP)?,
        )
        .wrap_err("seed earlier proposal")?;
    Ok(())
}

#[given(r#"check "{name}" passed on "{repository}" for commit "{head}""#)]
fn check_passed(
    world: &mut ReconcileWorld,
    name: String,
    repository: String,
    head: String,
) -> Result<(), eyre::Report> {
    let report = CheckReport::completed(name, CheckConclusion::Success, commit(&head)?);
    world
        .platform
        .set_check_runs(
            &RepositoryFullName::new(repository)?,
            &BranchName::new(BASE_BRANCH)?,
            vec![report],
        )
        .wrap_err("record check runs")?;
    Ok(())
}
