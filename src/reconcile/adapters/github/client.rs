//! GitHub REST implementation of [`HostingClient`].

use super::models::{
    ApiErrorDto, CheckRunList, CheckSuiteList, CreatePullRequestBody, CreateRefBody,
    CreatedPullRequestDto, GitRefDto, PullRequestDto, UpdatePullRequestBody,
};
use crate::reconcile::{
    domain::{
        BranchName, CheckConclusion, CheckReport, CheckStatus, CommitSha, NewPullRequest,
        OpenPullRequest, PullRequestNumber, RepositoryFullName,
    },
    ports::{HostingClient, HostingError, HostingResult, InstallationToken},
};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Public GitHub API endpoint.
pub const DEFAULT_API_BASE: &str = "https://api.github.com";

const API_VERSION: &str = "2022-11-28";
const PAGE_SIZE: usize = 100;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Hosting client speaking the GitHub REST API with an installation token.
#[derive(Debug, Clone)]
pub struct GitHubRestClient {
    http: reqwest::Client,
    api_base: String,
}

impl GitHubRestClient {
    /// Creates a client for `api_base` authenticated with `token`.
    ///
    /// # Errors
    ///
    /// Returns [`HostingError::Transport`] when the token cannot be used as a
    /// header value or the HTTP client cannot be built.
    pub fn new(api_base: &str, token: &InstallationToken) -> HostingResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("manifest-reconciler"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert("x-github-api-version", HeaderValue::from_static(API_VERSION));
        let mut authorization = HeaderValue::from_str(&format!("Bearer {}", token.expose()))
            .map_err(HostingError::transport)?;
        authorization.set_sensitive(true);
        headers.insert(AUTHORIZATION, authorization);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(HostingError::transport)?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_owned(),
        })
    }

    fn request(&self, method: Method, repository: &RepositoryFullName, path: &str) -> RequestBuilder {
        let url = format!("{}/repos/{repository}/{path}", self.api_base);
        self.http.request(method, url)
    }

    fn list_checks(
        &self,
        repository: &RepositoryFullName,
        branch: &BranchName,
        kind: &str,
        page: usize,
    ) -> RequestBuilder {
        self.request(
            Method::GET,
            repository,
            &format!("commits/{}/{kind}", branch.as_str()),
        )
        .query(&[("per_page", PAGE_SIZE), ("page", page)])
    }
}

async fn get_json<T: DeserializeOwned>(request: RequestBuilder) -> HostingResult<T> {
    let response = send(request).await?;
    response
        .json::<T>()
        .await
        .map_err(|err| HostingError::Decode(err.to_string()))
}

async fn send(request: RequestBuilder) -> HostingResult<reqwest::Response> {
    let response = request.send().await.map_err(HostingError::transport)?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiErrorDto>(&body)
        .map(|error| error.message)
        .unwrap_or(body);
    if status == StatusCode::NOT_FOUND {
        return Err(HostingError::NotFound(message));
    }
    Err(HostingError::Rejected {
        status: status.as_u16(),
        message,
    })
}

fn commit_sha(value: &str) -> HostingResult<CommitSha> {
    CommitSha::new(value).map_err(|err| HostingError::Decode(err.to_string()))
}

fn check_status(value: &str) -> HostingResult<CheckStatus> {
    value
        .parse::<CheckStatus>()
        .map_err(|err| HostingError::Decode(err.to_string()))
}

fn check_conclusion(value: Option<&str>) -> HostingResult<Option<CheckConclusion>> {
    value
        .map(str::parse::<CheckConclusion>)
        .transpose()
        .map_err(|err| HostingError::Decode(err.to_string()))
}

#[async_trait]
impl HostingClient for GitHubRestClient {
    async fn list_check_runs(
        &self,
        repository: &RepositoryFullName,
        branch: &BranchName,
    ) -> HostingResult<Vec<CheckReport>> {
        let mut reports = Vec::new();
        for page in 1_usize.. {
            let request = self.list_checks(repository, branch, "check-runs", page);
            let list: CheckRunList = get_json(request).await?;
            let batch_len = list.check_runs.len();
            for run in list.check_runs {
                reports.push(CheckReport::new(
                    run.name,
                    check_status(&run.status)?,
                    check_conclusion(run.conclusion.as_deref())?,
                    commit_sha(&run.head_sha)?,
                ));
            }
            if batch_len < PAGE_SIZE {
                break;
            }
        }
        Ok(reports)
    }

    async fn list_check_suites(
        &self,
        repository: &RepositoryFullName,
        branch: &BranchName,
    ) -> HostingResult<Vec<CheckReport>> {
        let mut reports = Vec::new();
        for page in 1_usize.. {
            let request = self.list_checks(repository, branch, "check-suites", page);
            let list: CheckSuiteList = get_json(request).await?;
            let batch_len = list.check_suites.len();
            for suite in list.check_suites {
                let status = check_status(suite.status.as_deref().unwrap_or("queued"))?;
                let name = suite
                    .app
                    .and_then(|app| app.slug)
                    .unwrap_or_else(|| format!("suite-{}", suite.id));
                reports.push(CheckReport::new(
                    name,
                    status,
                    check_conclusion(suite.conclusion.as_deref())?,
                    commit_sha(&suite.head_sha)?,
                ));
            }
            if batch_len < PAGE_SIZE {
                break;
            }
        }
        Ok(reports)
    }

    async fn branch_tip(
        &self,
        repository: &RepositoryFullName,
        branch: &BranchName,
    ) -> HostingResult<CommitSha> {
        let request = self.request(
            Method::GET,
            repository,
            &format!("git/ref/heads/{}", branch.as_str()),
        );
        let git_ref: GitRefDto = get_json(request).await?;
        commit_sha(&git_ref.object.sha)
    }

    async fn create_branch(
        &self,
        repository: &RepositoryFullName,
        branch: &BranchName,
        sha: &CommitSha,
    ) -> HostingResult<()> {
        let body = CreateRefBody {
            git_ref: branch.qualified(),
            sha: sha.as_str(),
        };
        let request = self.request(Method::POST, repository, "git/refs").json(&body);
        match send(request).await {
            Ok(_) => Ok(()),
            Err(HostingError::Rejected { status: 422, message })
                if message.contains("already exists") =>
            {
                Err(HostingError::RefAlreadyExists {
                    repository: repository.clone(),
                    branch: branch.as_str().to_owned(),
                })
            }
            Err(err) => Err(err),
        }
    }

    async fn delete_branch(
        &self,
        repository: &RepositoryFullName,
        branch: &str,
    ) -> HostingResult<()> {
        let request = self.request(
            Method::DELETE,
            repository,
            &format!("git/refs/heads/{branch}"),
        );
        send(request).await.map(|_| ())
    }

    async fn list_open_pull_requests(
        &self,
        repository: &RepositoryFullName,
    ) -> HostingResult<Vec<OpenPullRequest>> {
        let mut open = Vec::new();
        for page in 1_usize.. {
            let request = self
                .request(Method::GET, repository, "pulls")
                .query(&[("state", "open")])
                .query(&[("per_page", PAGE_SIZE), ("page", page)]);
            let batch: Vec<PullRequestDto> = get_json(request).await?;
            let batch_len = batch.len();
            for pull_request in batch {
                let number = PullRequestNumber::new(pull_request.number)
                    .map_err(|err| HostingError::Decode(err.to_string()))?;
                open.push(OpenPullRequest::new(number, pull_request.head.git_ref));
            }
            if batch_len < PAGE_SIZE {
                break;
            }
        }
        Ok(open)
    }

    async fn close_pull_request(
        &self,
        repository: &RepositoryFullName,
        number: PullRequestNumber,
    ) -> HostingResult<()> {
        let request = self
            .request(
                Method::PATCH,
                repository,
                &format!("pulls/{}", number.value()),
            )
            .json(&UpdatePullRequestBody { state: "closed" });
        send(request).await.map(|_| ())
    }

    async fn create_pull_request(
        &self,
        repository: &RepositoryFullName,
        request: &NewPullRequest,
    ) -> HostingResult<PullRequestNumber> {
        let body = CreatePullRequestBody {
            title: &request.title,
            head: request.head.as_str(),
            base: request.base.as_str(),
            body: request.body.as_deref(),
            maintainer_can_modify: request.maintainer_can_modify,
        };
        let http_request = self.request(Method::POST, repository, "pulls").json(&body);
        let created: CreatedPullRequestDto = get_json(http_request).await?;
        PullRequestNumber::new(created.number).map_err(|err| HostingError::Decode(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::domain::CheckAggregate;
    use httpmock::prelude::*;
    use rstest::rstest;
    use serde_json::json;

    const SHA: &str = "abc1234def5678abc1234def5678abc1234def56";

    fn repository() -> RepositoryFullName {
        RepositoryFullName::new("misw/portal").expect("valid repository")
    }

    fn branch(name: &str) -> BranchName {
        BranchName::new(name).expect("valid branch")
    }

    fn client(server: &MockServer) -> GitHubRestClient {
        GitHubRestClient::new(&server.base_url(), &InstallationToken::new("ghs_test"))
            .expect("client builds")
    }

    #[rstest]
    #[tokio::test]
    async fn list_check_runs_maps_reports() {
        let server = MockServer::start();
        let runs = server.mock(|when, then| {
            when.method(GET)
                .path("/repos/misw/portal/commits/master/check-runs")
                .header("authorization", "Bearer ghs_test");
            then.status(200).json_body(json!({
                "total_count": 2,
                "check_runs": [
                    {"name": "build", "head_sha": SHA, "status": "completed", "conclusion": "success"},
                    {"name": "lint", "head_sha": SHA, "status": "in_progress", "conclusion": null}
                ]
            }));
        });

        let reports = client(&server)
            .list_check_runs(&repository(), &branch("master"))
            .await
            .expect("listing succeeds");

        runs.assert_calls(1);
        assert_eq!(reports.len(), 2);
        assert!(reports.first().is_some_and(CheckReport::passed));
        assert_eq!(
            reports.get(1).map(CheckReport::status),
            Some(CheckStatus::InProgress)
        );
    }

    #[rstest]
    #[tokio::test]
    async fn list_check_runs_follows_pages() {
        let server = MockServer::start();
        let full_page: Vec<_> = (0..PAGE_SIZE)
            .map(|index| {
                json!({"name": format!("job-{index}"), "head_sha": SHA,
                       "status": "completed", "conclusion": "success"})
            })
            .collect();
        let first = server.mock(|when, then| {
            when.method(GET)
                .path("/repos/misw/portal/commits/master/check-runs")
                .query_param("page", "1");
            then.status(200)
                .json_body(json!({"total_count": 101, "check_runs": full_page}));
        });
        let second = server.mock(|when, then| {
            when.method(GET)
                .path("/repos/misw/portal/commits/master/check-runs")
                .query_param("page", "2");
            then.status(200).json_body(json!({
                "total_count": 101,
                "check_runs": [
                    {"name": "deploy", "head_sha": SHA, "status": "queued", "conclusion": null}
                ]
            }));
        });

        let reports = client(&server)
            .list_check_runs(&repository(), &branch("master"))
            .await
            .expect("listing succeeds");

        first.assert_calls(1);
        second.assert_calls(1);
        assert_eq!(reports.len(), PAGE_SIZE + 1);
        assert!(!CheckAggregate::from_reports(&reports).is_ready());
    }

    #[rstest]
    #[tokio::test]
    async fn list_check_suites_names_reports_after_app() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET)
                .path("/repos/misw/portal/commits/master/check-suites");
            then.status(200).json_body(json!({
                "total_count": 1,
                "check_suites": [
                    {"id": 9, "head_sha": SHA, "status": "completed", "conclusion": "neutral",
                     "app": {"slug": "github-actions"}}
                ]
            }));
        });

        let reports = client(&server)
            .list_check_suites(&repository(), &branch("master"))
            .await
            .expect("listing succeeds");

        let suite = reports.first().expect("one suite");
        assert_eq!(suite.name(), "github-actions");
        assert_eq!(suite.conclusion(), Some(CheckConclusion::Neutral));
    }

    #[rstest]
    #[tokio::test]
    async fn create_branch_reports_existing_ref() {
        let server = MockServer::start();
        let create = server.mock(|when, then| {
            when.method(POST)
                .path("/repos/misw/portal/git/refs")
                .body_includes("refs/heads/reconciler/portal/abc1234");
            then.status(422)
                .json_body(json!({"message": "Reference already exists"}));
        });

        let err = client(&server)
            .create_branch(
                &repository(),
                &branch("reconciler/portal/abc1234"),
                &CommitSha::new(SHA).expect("valid sha"),
            )
            .await
            .expect_err("existing ref is rejected");

        create.assert_calls(1);
        assert!(matches!(err, HostingError::RefAlreadyExists { branch, .. } if branch == "reconciler/portal/abc1234"));
    }

    #[rstest]
    #[tokio::test]
    async fn branch_tip_maps_missing_ref_to_not_found() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET)
                .path("/repos/misw/portal/git/ref/heads/master");
            then.status(404).json_body(json!({"message": "Not Found"}));
        });

        let err = client(&server)
            .branch_tip(&repository(), &branch("master"))
            .await
            .expect_err("missing ref fails");

        assert!(matches!(err, HostingError::NotFound(message) if message == "Not Found"));
    }

    #[rstest]
    #[tokio::test]
    async fn list_open_pull_requests_reads_head_refs() {
        let server = MockServer::start();
        let pulls = server.mock(|when, then| {
            when.method(GET)
                .path("/repos/misw/portal/pulls")
                .query_param("state", "open")
                .query_param("page", "1");
            then.status(200).json_body(json!([
                {"number": 4, "head": {"ref": "reconciler/portal/0000000"}},
                {"number": 5, "head": {"ref": "feature/login"}}
            ]));
        });

        let open = client(&server)
            .list_open_pull_requests(&repository())
            .await
            .expect("listing succeeds");

        pulls.assert_calls(1);
        let heads: Vec<&str> = open.iter().map(|pr| pr.head_ref.as_str()).collect();
        assert_eq!(heads, vec!["reconciler/portal/0000000", "feature/login"]);
    }

    #[rstest]
    #[tokio::test]
    async fn close_pull_request_patches_state() {
        let server = MockServer::start();
        let close = server.mock(|when, then| {
            when.method(PATCH)
                .path("/repos/misw/portal/pulls/4")
                .body_includes("closed");
            then.status(200).json_body(json!({"number": 4, "state": "closed"}));
        });

        client(&server)
            .close_pull_request(
                &repository(),
                PullRequestNumber::new(4).expect("valid number"),
            )
            .await
            .expect("close succeeds");

        close.assert_calls(1);
    }

    #[rstest]
    #[tokio::test]
    async fn create_pull_request_is_maintainer_editable() {
        let server = MockServer::start();
        let create = server.mock(|when, then| {
            when.method(POST)
                .path("/repos/misw/portal/pulls")
                .body_includes("\"maintainer_can_modify\":true")
                .body_includes("\"head\":\"reconciler/portal/abc1234\"");
            then.status(201).json_body(json!({"number": 12}));
        });
        let request = NewPullRequest::new(
            "Update misw/portal to abc1234",
            branch("reconciler/portal/abc1234"),
            branch("master"),
        );

        let number = client(&server)
            .create_pull_request(&repository(), &request)
            .await
            .expect("creation succeeds");

        create.assert_calls(1);
        assert_eq!(number.value(), 12);
    }
}
