//! Manifest session tests: retirement and the change protocol.

use super::fixtures::{
    BASE_TIP, DEPLOYMENT_PATH, HEAD, Harness, MANIFEST_INSTALLATION, PREFIX, branch, deployment,
    harness, installation, portal_target, repo, sha,
};
use crate::reconcile::{
    adapters::memory::{HostingOperation, InlineImageEditor},
    domain::{BranchPrefix, PullRequestIntent, RetirementStep},
    ports::{
        AuthError, HostingClient, HostingError, InstallationToken, MockHostingClient,
        MockInstallationAuth, MockManifestMutation, MutationError,
    },
    services::{
        ChangeOutcome, ImageTagMutation, ManifestChangeError, ManifestCoordinates,
        ManifestSession, build_intent,
    },
};
use mockall::Sequence;
use rstest::rstest;
use std::sync::Arc;

async fn open_session(harness: &Harness) -> ManifestSession {
    ManifestSession::open(
        &harness.auth,
        Arc::new(harness.provider.clone()),
        harness.coordinates(),
    )
    .await
    .expect("session opens")
}

fn prefix() -> BranchPrefix {
    BranchPrefix::new(PREFIX).expect("valid prefix")
}

fn intent() -> PullRequestIntent {
    build_intent(&portal_target(), &sha(HEAD)).expect("intent builds")
}

fn image_mutation(intent: &PullRequestIntent) -> ImageTagMutation {
    ImageTagMutation::new(Arc::new(InlineImageEditor::new()), intent.edits().to_vec())
}

/// Auth that scopes the manifest repository to its installation and hands
/// out `client`.
fn auth_with_client(client: MockHostingClient) -> MockInstallationAuth {
    let mut auth = MockInstallationAuth::new();
    auth.expect_installation_for()
        .returning(|_| Ok(installation(MANIFEST_INSTALLATION)));
    auth.expect_token_for()
        .returning(|_| Ok(InstallationToken::new("ghs_manifest")));
    auth.expect_client_for()
        .times(1)
        .return_once(move |_| Ok(Arc::new(client) as Arc<dyn HostingClient>));
    auth
}

fn noop_mutation() -> MockManifestMutation {
    let mut mutation = MockManifestMutation::new();
    mutation.expect_apply().returning(|_| Ok(()));
    mutation
}

// ── Opening ─────────────────────────────────────────────────────────

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn open_scopes_session_to_manifest_installation(harness: Harness) {
    let session = open_session(&harness).await;

    assert_eq!(session.installation().value(), MANIFEST_INSTALLATION);
    assert_eq!(session.coordinates().repository(), &harness.manifest);
    assert_eq!(
        harness.auth.issued_tokens().expect("tokens"),
        vec![session.installation()]
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn open_fails_without_manifest_installation(harness: Harness) {
    let known = harness.coordinates();
    let coordinates = ManifestCoordinates::new(
        repo("MISW/unknown"),
        known.base_branch().clone(),
        known.committer().clone(),
    );

    let result =
        ManifestSession::open(&harness.auth, Arc::new(harness.provider.clone()), coordinates)
            .await;

    assert!(matches!(result, Err(AuthError::NoInstallation(_))));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn base_tip_is_fetched_once(harness: Harness) {
    let session = open_session(&harness).await;

    let first = session.base_tip().await.expect("tip").clone();
    let second = session.base_tip().await.expect("tip").clone();

    assert_eq!(first, sha(BASE_TIP));
    assert_eq!(first, second);
    assert_eq!(
        harness
            .platform
            .call_count(HostingOperation::BranchTip)
            .expect("calls"),
        1
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn denied_token_stops_before_any_client_is_built(harness: Harness) {
    let mut auth = MockInstallationAuth::new();
    auth.expect_installation_for()
        .returning(|_| Ok(installation(MANIFEST_INSTALLATION)));
    auth.expect_token_for().returning(|denied| {
        Err(AuthError::Denied {
            installation: denied,
            reason: "suspended".to_owned(),
        })
    });
    auth.expect_client_for().times(0);

    let result =
        ManifestSession::open(&auth, Arc::new(harness.provider.clone()), harness.coordinates())
            .await;

    assert!(matches!(
        result,
        Err(AuthError::Denied { installation: denied, .. })
            if denied.value() == MANIFEST_INSTALLATION
    ));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn failed_base_tip_lookup_is_retried(harness: Harness) {
    let mut client = MockHostingClient::new();
    let mut sequence = Sequence::new();
    client
        .expect_branch_tip()
        .times(1)
        .in_sequence(&mut sequence)
        .returning(|_, _| Err(HostingError::Decode("truncated body".to_owned())));
    client
        .expect_branch_tip()
        .times(1)
        .in_sequence(&mut sequence)
        .returning(|_, _| Ok(sha(BASE_TIP)));
    let auth = auth_with_client(client);
    let session =
        ManifestSession::open(&auth, Arc::new(harness.provider.clone()), harness.coordinates())
            .await
            .expect("session opens");

    let first = session.base_tip().await;
    let second = session.base_tip().await.expect("tip").clone();

    assert!(matches!(first, Err(HostingError::Decode(_))));
    assert_eq!(second, sha(BASE_TIP));
}

// ── Retirement ──────────────────────────────────────────────────────

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn retirement_closes_and_deletes_every_prefixed_proposal(harness: Harness) {
    let first = harness.seed_proposal("0000001");
    let second = harness.seed_proposal("0000002");
    harness
        .platform
        .seed_pull_request(
            &harness.manifest,
            "dependabot/docker/nginx",
            &branch("master"),
            sha(BASE_TIP),
        )
        .expect("foreign pull request seeded");
    let session = open_session(&harness).await;

    let report = session
        .retire_obsolete(&prefix(), None)
        .await
        .expect("listing succeeds");

    let retired: Vec<u64> = report.retired().iter().map(|number| number.value()).collect();
    assert_eq!(retired, vec![first, second]);
    assert!(report.failures().is_empty());
    assert_eq!(report.untouched(), 1);

    let open: Vec<String> = harness
        .platform
        .pull_requests(&harness.manifest)
        .expect("pull requests")
        .into_iter()
        .filter(|pull_request| pull_request.open)
        .map(|pull_request| pull_request.head)
        .collect();
    assert_eq!(open, vec!["dependabot/docker/nginx".to_owned()]);
    for short in ["0000001", "0000002"] {
        let head = format!("{PREFIX}{short}");
        assert!(
            harness
                .platform
                .branch(&harness.manifest, &head)
                .expect("lookup")
                .is_none()
        );
    }
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn retirement_attempts_every_proposal_despite_failures(harness: Harness) {
    let numbers: Vec<u64> = ["0000001", "0000002", "0000003", "0000004"]
        .into_iter()
        .map(|short| harness.seed_proposal(short))
        .collect();
    let failing_close = numbers.get(1).copied().expect("second proposal");
    harness
        .platform
        .fail(
            HostingOperation::ClosePullRequest,
            Some(&failing_close.to_string()),
        )
        .expect("failure injected");
    harness
        .platform
        .fail(
            HostingOperation::DeleteBranch,
            Some(&format!("{PREFIX}0000003")),
        )
        .expect("failure injected");
    let session = open_session(&harness).await;

    let report = session
        .retire_obsolete(&prefix(), None)
        .await
        .expect("listing succeeds");

    assert_eq!(report.attempted().len(), 4);
    assert_eq!(report.retired().len(), 2);
    let steps: Vec<RetirementStep> = report.failures().iter().map(|failure| failure.step).collect();
    assert_eq!(steps.len(), 2);
    assert!(steps.contains(&RetirementStep::Close));
    assert!(steps.contains(&RetirementStep::DeleteBranch));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn failed_close_still_deletes_branch(harness: Harness) {
    harness.seed_proposal("0000001");
    harness
        .platform
        .fail(HostingOperation::ClosePullRequest, None)
        .expect("failure injected");
    let session = open_session(&harness).await;

    let report = session
        .retire_obsolete(&prefix(), None)
        .await
        .expect("listing succeeds");

    assert!(report.retired().is_empty());
    assert_eq!(
        harness
            .platform
            .call_count(HostingOperation::DeleteBranch)
            .expect("calls"),
        1
    );
    assert!(
        harness
            .platform
            .branch(&harness.manifest, &format!("{PREFIX}0000001"))
            .expect("lookup")
            .is_none()
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn retirement_keeps_the_current_proposal(harness: Harness) {
    let obsolete = harness.seed_proposal("0000001");
    harness.seed_proposal("abc1234");
    let session = open_session(&harness).await;
    let current = intent();

    let report = session
        .retire_obsolete(&prefix(), Some(current.branch()))
        .await
        .expect("listing succeeds");

    let attempted: Vec<u64> = report.attempted().iter().map(|number| number.value()).collect();
    assert_eq!(attempted, vec![obsolete]);
    assert_eq!(report.untouched(), 0);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn retirement_reports_listing_failure(harness: Harness) {
    harness
        .platform
        .fail(HostingOperation::ListPullRequests, None)
        .expect("failure injected");
    let session = open_session(&harness).await;

    let result = session.retire_obsolete(&prefix(), None).await;

    assert!(matches!(result, Err(HostingError::Rejected { .. })));
    assert_eq!(
        harness
            .platform
            .call_count(HostingOperation::ClosePullRequest)
            .expect("calls"),
        0
    );
}

// ── Change protocol ─────────────────────────────────────────────────

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn change_is_committed_pushed_and_proposed(harness: Harness) {
    let session = open_session(&harness).await;
    let current = intent();
    let committer = harness.coordinates().committer().clone();

    let outcome = session
        .create_change(&current, &image_mutation(&current), &committer)
        .await
        .expect("change proposed");

    let ChangeOutcome::Proposed {
        branch: proposed,
        pull_request,
    } = outcome
    else {
        panic!("expected a proposal, got {outcome:?}");
    };
    assert_eq!(proposed.as_str(), "reconciler/portal/abc1234");
    assert_eq!(
        harness
            .platform
            .branch(&harness.manifest, proposed.as_str())
            .expect("lookup"),
        Some(sha(BASE_TIP))
    );

    let pushes = harness.provider.pushes().expect("pushes");
    let [push] = pushes.as_slice() else {
        panic!("expected one push, got {pushes:?}");
    };
    assert_eq!(push.branch.as_ref(), Some(&proposed));
    assert_eq!(push.commit_message.as_deref(), Some("Update MISW/Portal to abc1234"));
    assert_eq!(push.author.as_ref(), Some(&committer));
    let written = push.files.get(DEPLOYMENT_PATH).expect("deployment pushed");
    assert_eq!(
        String::from_utf8_lossy(written),
        deployment("sha-abc1234").as_str()
    );

    let records = harness
        .platform
        .pull_requests(&harness.manifest)
        .expect("pull requests");
    let [record] = records.as_slice() else {
        panic!("expected one pull request, got {records:?}");
    };
    assert_eq!(record.number, pull_request);
    assert_eq!(record.title, "Update MISW/Portal to abc1234");
    assert_eq!(record.base, "master");
    assert!(record.maintainer_can_modify);
    assert_eq!(harness.provider.live_copies().expect("live copies"), 0);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn unchanged_manifests_skip_commit_push_and_proposal(harness: Harness) {
    let session = open_session(&harness).await;
    let current = intent();
    let mutation = noop_mutation();

    let outcome = session
        .create_change(&current, &mutation, harness.coordinates().committer())
        .await
        .expect("change evaluated");

    assert_eq!(
        outcome,
        ChangeOutcome::Unchanged {
            branch: current.branch().clone()
        }
    );
    assert!(harness.provider.pushes().expect("pushes").is_empty());
    assert_eq!(
        harness
            .platform
            .call_count(HostingOperation::CreatePullRequest)
            .expect("calls"),
        0
    );
    assert_eq!(harness.provider.live_copies().expect("live copies"), 0);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn repeated_change_for_same_head_is_a_ref_conflict(harness: Harness) {
    let current = intent();
    let committer = harness.coordinates().committer().clone();
    let first = open_session(&harness).await;
    first
        .create_change(&current, &image_mutation(&current), &committer)
        .await
        .expect("first change proposed");

    let second = open_session(&harness).await;
    let err = second
        .create_change(&current, &image_mutation(&current), &committer)
        .await
        .expect_err("second change conflicts");

    assert!(err.is_ref_conflict());
    assert!(!err.is_partial());
    assert_eq!(
        harness
            .platform
            .pull_requests(&harness.manifest)
            .expect("pull requests")
            .len(),
        1
    );
    assert_eq!(harness.provider.clone_count().expect("clones"), 1);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn mutation_failure_strands_branch_and_releases_working_copy(harness: Harness) {
    let session = open_session(&harness).await;
    let current = intent();
    let mut mutation = MockManifestMutation::new();
    mutation
        .expect_apply()
        .returning(|_| Err(MutationError::MissingOverlay("bases/frontend".into())));

    let err = session
        .create_change(&current, &mutation, harness.coordinates().committer())
        .await
        .expect_err("mutation fails");

    assert!(matches!(err, ManifestChangeError::Mutation { .. }));
    assert!(err.is_partial());
    assert_eq!(err.stranded_branch(), Some(current.branch()));
    assert!(harness.provider.pushes().expect("pushes").is_empty());
    assert_eq!(harness.provider.live_copies().expect("live copies"), 0);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn push_failure_opens_no_pull_request(harness: Harness) {
    harness.provider.fail_pushes().expect("failure injected");
    let session = open_session(&harness).await;
    let current = intent();

    let err = session
        .create_change(
            &current,
            &image_mutation(&current),
            harness.coordinates().committer(),
        )
        .await
        .expect_err("push fails");

    assert!(matches!(err, ManifestChangeError::Push { .. }));
    assert!(err.is_partial());
    assert_eq!(
        harness
            .platform
            .call_count(HostingOperation::CreatePullRequest)
            .expect("calls"),
        0
    );
    assert_eq!(harness.provider.live_copies().expect("live copies"), 0);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn missing_base_branch_fails_before_any_write(harness: Harness) {
    harness
        .platform
        .fail(HostingOperation::BranchTip, None)
        .expect("failure injected");
    let session = open_session(&harness).await;
    let current = intent();

    let err = session
        .prepare_change(&current, &noop_mutation())
        .await
        .expect_err("base tip fails");

    assert!(matches!(err, ManifestChangeError::BaseTip(_)));
    assert!(!err.is_partial());
    assert_eq!(
        harness
            .platform
            .call_count(HostingOperation::CreateBranch)
            .expect("calls"),
        0
    );
    assert_eq!(harness.provider.clone_count().expect("clones"), 0);
}
