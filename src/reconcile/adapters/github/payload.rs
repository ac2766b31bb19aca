//! Decoding of GitHub webhook deliveries into [`WebhookEvent`]s.
//!
//! Signature verification happens before this point; the decoder only
//! understands the payload shapes of the three triggering events.

use crate::reconcile::domain::{
    BranchCreatedEvent, CheckSuiteCompletedEvent, CommitSha, InstallationId, PushEvent,
    ReconcileDomainError, RepositoryFullName, WebhookEvent,
};
use serde::Deserialize;
use thiserror::Error;

/// Errors returned while decoding a webhook delivery.
#[derive(Debug, Error)]
pub enum PayloadError {
    /// The body is not the JSON shape of the named event.
    #[error("malformed {event} payload: {source}")]
    Malformed {
        /// Event name from the delivery header.
        event: String,
        /// Decoder error.
        #[source]
        source: serde_json::Error,
    },

    /// A field failed domain validation.
    #[error("invalid {event} payload: {source}")]
    Invalid {
        /// Event name from the delivery header.
        event: String,
        /// Validation error.
        #[source]
        source: ReconcileDomainError,
    },
}

#[derive(Debug, Deserialize)]
struct RepositoryPayload {
    full_name: String,
}

#[derive(Debug, Deserialize)]
struct InstallationPayload {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct PushPayload {
    #[serde(rename = "ref")]
    git_ref: String,
    repository: RepositoryPayload,
    installation: Option<InstallationPayload>,
}

#[derive(Debug, Deserialize)]
struct CheckSuitePayload {
    action: String,
    check_suite: CheckSuiteBody,
    repository: RepositoryPayload,
    installation: Option<InstallationPayload>,
}

#[derive(Debug, Deserialize)]
struct CheckSuiteBody {
    head_branch: Option<String>,
    head_sha: String,
}

#[derive(Debug, Deserialize)]
struct CreatePayload {
    #[serde(rename = "ref")]
    git_ref: String,
    ref_type: String,
    repository: RepositoryPayload,
    installation: Option<InstallationPayload>,
}

/// Decodes a delivery given its `X-GitHub-Event` name and raw body.
///
/// Returns `Ok(None)` for events that never trigger reconciliation,
/// including check suites that have not completed.
///
/// # Errors
///
/// Returns [`PayloadError`] when a relevant event carries a malformed or
/// invalid body.
pub fn parse_webhook(event_name: &str, body: &[u8]) -> Result<Option<WebhookEvent>, PayloadError> {
    let invalid = |source| PayloadError::Invalid {
        event: event_name.to_owned(),
        source,
    };

    match event_name {
        "push" => {
            let payload: PushPayload = decode(event_name, body)?;
            Ok(Some(WebhookEvent::Push(PushEvent {
                repository: RepositoryFullName::new(payload.repository.full_name)
                    .map_err(invalid)?,
                git_ref: payload.git_ref,
                installation: installation(payload.installation).map_err(invalid)?,
            })))
        }
        "check_suite" => {
            let payload: CheckSuitePayload = decode(event_name, body)?;
            if payload.action != "completed" {
                return Ok(None);
            }
            Ok(Some(WebhookEvent::CheckSuite(CheckSuiteCompletedEvent {
                repository: RepositoryFullName::new(payload.repository.full_name)
                    .map_err(invalid)?,
                head_branch: payload.check_suite.head_branch,
                head_sha: CommitSha::new(payload.check_suite.head_sha).map_err(invalid)?,
                installation: installation(payload.installation).map_err(invalid)?,
            })))
        }
        "create" => {
            let payload: CreatePayload = decode(event_name, body)?;
            Ok(Some(WebhookEvent::BranchCreated(BranchCreatedEvent {
                repository: RepositoryFullName::new(payload.repository.full_name)
                    .map_err(invalid)?,
                ref_type: payload.ref_type,
                git_ref: payload.git_ref,
                installation: installation(payload.installation).map_err(invalid)?,
            })))
        }
        _ => Ok(None),
    }
}

fn decode<'a, T: Deserialize<'a>>(event_name: &str, body: &'a [u8]) -> Result<T, PayloadError> {
    serde_json::from_slice(body).map_err(|source| PayloadError::Malformed {
        event: event_name.to_owned(),
        source,
    })
}

fn installation(
    payload: Option<InstallationPayload>,
) -> Result<Option<InstallationId>, ReconcileDomainError> {
    payload
        .map(|installation| InstallationId::new(installation.id))
        .transpose()
}
