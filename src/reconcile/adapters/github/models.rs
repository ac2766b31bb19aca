//! Wire shapes of the GitHub REST API subset used by the reconciler.

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub(super) struct CheckRunList {
    pub(super) check_runs: Vec<CheckRunDto>,
}

#[derive(Debug, Deserialize)]
pub(super) struct CheckRunDto {
    pub(super) name: String,
    pub(super) head_sha: String,
    pub(super) status: String,
    pub(super) conclusion: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct CheckSuiteList {
    pub(super) check_suites: Vec<CheckSuiteDto>,
}

#[derive(Debug, Deserialize)]
pub(super) struct CheckSuiteDto {
    pub(super) id: u64,
    pub(super) head_sha: String,
    pub(super) status: Option<String>,
    pub(super) conclusion: Option<String>,
    pub(super) app: Option<AppDto>,
}

#[derive(Debug, Deserialize)]
pub(super) struct AppDto {
    pub(super) slug: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct GitRefDto {
    pub(super) object: GitObjectDto,
}

#[derive(Debug, Deserialize)]
pub(super) struct GitObjectDto {
    pub(super) sha: String,
}

#[derive(Debug, Serialize)]
pub(super) struct CreateRefBody<'a> {
    #[serde(rename = "ref")]
    pub(super) git_ref: String,
    pub(super) sha: &'a str,
}

#[derive(Debug, Deserialize)]
pub(super) struct PullRequestDto {
    pub(super) number: u64,
    pub(super) head: PullRequestHeadDto,
}

#[derive(Debug, Deserialize)]
pub(super) struct PullRequestHeadDto {
    #[serde(rename = "ref")]
    pub(super) git_ref: String,
}

#[derive(Debug, Serialize)]
pub(super) struct UpdatePullRequestBody {
    pub(super) state: &'static str,
}

#[derive(Debug, Serialize)]
pub(super) struct CreatePullRequestBody<'a> {
    pub(super) title: &'a str,
    pub(super) head: &'a str,
    pub(super) base: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) body: Option<&'a str>,
    pub(super) maintainer_can_modify: bool,
}

#[derive(Debug, Deserialize)]
pub(super) struct CreatedPullRequestDto {
    pub(super) number: u64,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct ApiErrorDto {
    #[serde(default)]
    pub(super) message: String,
}
