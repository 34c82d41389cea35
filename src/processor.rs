//! Push event processing: validate, filter, fetch, compose, deliver.

use axum::http::StatusCode;
use tracing::{debug, info};

use crate::config::MailerConfig;
use crate::diff::DiffFetcher;
use crate::error::{MailerError, Result};
use crate::message::{compose, diff_stat};
use crate::smtp::{DeliveryChannel, deliver};
use crate::webhook::{Commit, Identity, PushPayload};

pub const JSON_MEDIA_TYPE: &str = "application/json";
/// Reported when a request carries no content type at all.
pub const DEFAULT_MEDIA_TYPE: &str = "application/octet-stream";

/// Intentional non-delivery. These are expected outcomes, not errors.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    UnsupportedMediaType(String),
    NoCommits,
    InvalidBranch,
}

impl Rejection {
    pub fn status(&self) -> StatusCode {
        match self {
            Rejection::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Rejection::NoCommits | Rejection::InvalidBranch => StatusCode::NO_CONTENT,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Rejection::UnsupportedMediaType(actual) => {
                format!("can only accept {}, not {}", JSON_MEDIA_TYPE, actual)
            }
            Rejection::NoCommits => "There is no commit to be processed.".to_string(),
            Rejection::InvalidBranch => "Invalid branch name.".to_string(),
        }
    }
}

/// Result of processing one push delivery.
#[derive(Debug)]
pub enum ProcessOutcome {
    /// Message accepted; carries the SMTP server's reply text.
    Delivered(String),
    Rejected(Rejection),
    Failed(MailerError),
}

/// Drives one push event through the pipeline using collaborators owned by
/// the current request.
pub struct EventProcessor<'a> {
    config: &'a MailerConfig,
    diffs: &'a dyn DiffFetcher,
    channel: &'a mut dyn DeliveryChannel,
}

impl<'a> EventProcessor<'a> {
    pub fn new(
        config: &'a MailerConfig,
        diffs: &'a dyn DiffFetcher,
        channel: &'a mut dyn DeliveryChannel,
    ) -> Self {
        Self {
            config,
            diffs,
            channel,
        }
    }

    /// Process a request with the given `Content-Type` header value and body.
    /// Replaying the same payload sends the email again.
    pub async fn process(&mut self, content_type: Option<&str>, body: &[u8]) -> ProcessOutcome {
        if let Err(rejection) = check_media_type(content_type) {
            return ProcessOutcome::Rejected(rejection);
        }

        let payload: PushPayload = match serde_json::from_slice(body) {
            Ok(payload) => payload,
            Err(e) => return ProcessOutcome::Failed(e.into()),
        };

        // Squash merges leave a single commit per push; later ones are ignored.
        let Some(commit) = payload.commits.first() else {
            info!("Push carries no commits, nothing to send");
            return ProcessOutcome::Rejected(Rejection::NoCommits);
        };

        let Some(branch) = payload.branch_name() else {
            return ProcessOutcome::Failed(MailerError::MalformedPayload(
                "missing \"ref\" field".to_string(),
            ));
        };

        if !self.config.allowed_branches.is_allowed(branch) {
            info!("Ignoring push to branch '{}'", branch);
            return ProcessOutcome::Rejected(Rejection::InvalidBranch);
        }

        if payload.commits.len() > 1 {
            debug!(
                "Push carries {} commits, only {} is mailed",
                payload.commits.len(),
                commit.id
            );
        }

        match self
            .mail_commit(commit, payload.pusher.as_ref(), branch)
            .await
        {
            Ok(reply) => {
                info!("Mailed commit {} on branch '{}'", commit.id, branch);
                ProcessOutcome::Delivered(reply)
            }
            Err(e) => ProcessOutcome::Failed(e),
        }
    }

    async fn mail_commit(
        &mut self,
        commit: &Commit,
        pusher: Option<&Identity>,
        branch: &str,
    ) -> Result<String> {
        let unified_diff = self.diffs.fetch(&commit.diff_url()).await?;
        let stat = diff_stat(commit);
        let message = compose(
            commit,
            pusher,
            branch,
            &stat,
            &unified_diff,
            self.config,
        );

        deliver(&mut *self.channel, &message, self.config.credentials().as_ref()).await
    }
}

/// First pipeline step. Callers may run it before acquiring any
/// per-request resources.
pub fn check_media_type(content_type: Option<&str>) -> std::result::Result<(), Rejection> {
    let actual = content_type.unwrap_or(DEFAULT_MEDIA_TYPE);
    if is_json(actual) {
        Ok(())
    } else {
        Err(Rejection::UnsupportedMediaType(actual.to_string()))
    }
}

/// Compares the media type essence, ignoring parameters such as charset.
fn is_json(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(|essence| essence.trim().eq_ignore_ascii_case(JSON_MEDIA_TYPE))
        .unwrap_or(false)
}
