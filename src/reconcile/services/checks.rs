//! Check-status aggregation for a target branch.

use crate::reconcile::{
    domain::{BranchName, CheckAggregate, CheckSource, RepositoryFullName},
    ports::{HostingClient, HostingResult},
};
use std::sync::Arc;

/// Reduces the CI checks of a branch head to a go/no-go decision.
#[derive(Clone)]
pub struct CheckStatusAggregator {
    client: Arc<dyn HostingClient>,
}

impl CheckStatusAggregator {
    /// Creates an aggregator querying `client`.
    #[must_use]
    pub fn new(client: Arc<dyn HostingClient>) -> Self {
        Self { client }
    }

    /// Queries the reports selected by `source` for `branch` and reduces them.
    ///
    /// No reports is a normal answer: CI has not reported yet, so the
    /// aggregate is not ready and carries no head commit.
    ///
    /// # Errors
    ///
    /// Returns the hosting error verbatim when the query fails.
    pub async fn evaluate(
        &self,
        repository: &RepositoryFullName,
        branch: &BranchName,
        source: CheckSource,
    ) -> HostingResult<CheckAggregate> {
        let reports = match source {
            CheckSource::CheckRuns => self.client.list_check_runs(repository, branch).await?,
            CheckSource::CheckSuites => self.client.list_check_suites(repository, branch).await?,
        };
        let aggregate = CheckAggregate::from_reports(&reports);
        tracing::debug!(
            branch = %branch,
            reports = reports.len(),
            ready = aggregate.is_ready(),
            head = aggregate.head_sha().map(|sha| sha.as_str()),
            "aggregated checks"
        );
        Ok(aggregate)
    }
}
