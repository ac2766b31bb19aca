//! Event dispatcher tests: detached runs, bounded concurrency and outcomes.

use super::fixtures::{HEAD, Harness, TARGET_REPO, harness, passing, portal_target, repo, sha};
use crate::reconcile::{
    domain::{
        BranchCreatedEvent, CheckSuiteCompletedEvent, EventKind, ManagedTarget, PushEvent, RunId,
        RunOutcome, RunPhase, RunReport, WebhookEvent,
    },
    services::{
        DispatchError, DispatchOutcome, EventDispatcher, ReconcileResult, TargetReconciler,
        TargetRegistry,
    },
};
use async_trait::async_trait;
use chrono::Utc;
use mockable::DefaultClock;
use rstest::rstest;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Reconciler that records how many of its runs overlap.
struct CountingReconciler {
    target: ManagedTarget,
    running: AtomicUsize,
    peak: AtomicUsize,
    completed: AtomicUsize,
}

impl CountingReconciler {
    fn new() -> Self {
        Self {
            target: portal_target(),
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
        }
    }

    async fn run(&self, kind: EventKind) -> ReconcileResult<RunReport> {
        let now_running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now_running, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.running.fetch_sub(1, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::SeqCst);

        let now = Utc::now();
        Ok(RunReport {
            run_id: RunId::new(),
            target: self.target.repository().clone(),
            trigger: kind,
            phases: vec![RunPhase::Idle],
            outcome: RunOutcome::Ignored,
            started_at: now,
            finished_at: now,
        })
    }
}

#[async_trait]
impl TargetReconciler for CountingReconciler {
    fn target(&self) -> &ManagedTarget {
        &self.target
    }

    async fn on_push(&self, _event: &PushEvent) -> ReconcileResult<RunReport> {
        self.run(EventKind::Push).await
    }

    async fn on_check_suite(
        &self,
        _event: &CheckSuiteCompletedEvent,
    ) -> ReconcileResult<RunReport> {
        self.run(EventKind::CheckSuite).await
    }

    async fn on_branch_created(&self, _event: &BranchCreatedEvent) -> ReconcileResult<RunReport> {
        self.run(EventKind::BranchCreated).await
    }
}

fn push_from(repository: &str) -> WebhookEvent {
    WebhookEvent::Push(PushEvent {
        repository: repo(repository),
        git_ref: "refs/heads/master".to_owned(),
        installation: None,
    })
}

fn counting_dispatcher(limit: usize) -> (Arc<CountingReconciler>, EventDispatcher) {
    let reconciler = Arc::new(CountingReconciler::new());
    let registry = TargetRegistry::new();
    registry
        .register(Arc::clone(&reconciler) as Arc<dyn TargetReconciler>)
        .expect("registered");
    registry.seal().expect("sealed");
    (reconciler, EventDispatcher::new(Arc::new(registry), limit))
}

#[rstest]
#[case(2, 2)]
#[case(1, 1)]
#[case(0, 1)]
#[tokio::test(flavor = "multi_thread")]
async fn submitted_runs_respect_the_concurrency_limit(
    #[case] limit: usize,
    #[case] expected_peak: usize,
) {
    let (reconciler, dispatcher) = counting_dispatcher(limit);

    for _ in 0..6 {
        dispatcher.submit(push_from(TARGET_REPO)).await;
    }
    let outcomes = dispatcher.drain().await;

    assert_eq!(outcomes.len(), 6);
    assert!(outcomes.iter().all(|outcome| outcome.report().is_some()));
    assert_eq!(reconciler.completed.load(Ordering::SeqCst), 6);
    let peak = reconciler.peak.load(Ordering::SeqCst);
    assert!((1..=expected_peak).contains(&peak), "peak {peak}");
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn drain_without_submissions_is_empty() {
    let (_, dispatcher) = counting_dispatcher(1);

    assert!(dispatcher.drain().await.is_empty());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn unknown_repository_is_unrouted() {
    let (reconciler, dispatcher) = counting_dispatcher(1);

    let outcome = dispatcher.handle(push_from("MISW/Gateway")).await;

    assert!(matches!(
        &outcome,
        DispatchOutcome::Unrouted { repository } if *repository == repo("MISW/Gateway")
    ));
    assert!(!outcome.is_failure());
    assert!(outcome.report().is_none());
    assert_eq!(reconciler.completed.load(Ordering::SeqCst), 0);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn failed_run_is_reported_with_its_trigger(harness: Harness) {
    harness.report_checks(vec![passing("build", HEAD)]);
    harness.provider.fail_pushes().expect("failure injected");
    let context = Arc::new(harness.context());
    let registry =
        TargetRegistry::with_policies([portal_target()], &context, &Arc::new(DefaultClock))
            .expect("registry built");
    let dispatcher = EventDispatcher::new(Arc::new(registry), 1);
    let event = WebhookEvent::CheckSuite(CheckSuiteCompletedEvent {
        repository: repo(TARGET_REPO),
        head_branch: Some("master".to_owned()),
        head_sha: sha(HEAD),
        installation: None,
    });

    dispatcher.submit(event).await;
    let outcomes = dispatcher.drain().await;

    let [outcome] = outcomes.as_slice() else {
        panic!("expected one outcome, got {outcomes:?}");
    };
    assert!(outcome.is_failure());
    assert!(matches!(
        outcome,
        DispatchOutcome::Failed {
            trigger: EventKind::CheckSuite,
            error: DispatchError::Reconcile(err),
            ..
        } if err.is_partial()
    ));
}
