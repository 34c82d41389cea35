//! Rendering of the plain-text notification for one commit.

use lettre::Message;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;

use crate::config::MailerConfig;
use crate::error::{MailerError, Result};
use crate::webhook::{Commit, Identity};

/// Committer name GitHub records for commits made through its web UI.
const WEB_FLOW_COMMITTER: &str = "GitHub";

/// A composed notification, ready for delivery.
#[derive(Debug, Clone)]
pub struct EmailMessage {
    pub from: Mailbox,
    pub to: Mailbox,
    pub subject: String,
    pub body: String,
}

impl EmailMessage {
    /// Build the RFC 5322 message handed to the SMTP channel.
    pub fn to_message(&self) -> Result<Message> {
        Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(self.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(self.body.clone())
            .map_err(|e| MailerError::MessageBuildFailed(e.to_string()))
    }
}

/// One `A `/`D `/`M ` line per path, added first, then removed, then modified.
pub fn diff_stat(commit: &Commit) -> String {
    let groups = [
        ("A", &commit.added),
        ("D", &commit.removed),
        ("M", &commit.modified),
    ];

    groups
        .iter()
        .filter(|(_, paths)| !paths.is_empty())
        .map(|(kind, paths)| {
            paths
                .iter()
                .map(|path| format!("{} {}", kind, path))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// The pusher, when known, stands in for the commit's committer.
pub fn effective_committer<'a>(commit: &'a Commit, pusher: Option<&'a Identity>) -> &'a Identity {
    pusher.unwrap_or(&commit.committer)
}

/// Display name for the `From` header.
pub fn sender_name<'a>(committer: &'a Identity, author: &'a Identity) -> &'a str {
    if committer.name == WEB_FLOW_COMMITTER {
        &author.name
    } else {
        &committer.name
    }
}

/// First line of the commit message; trailers such as
/// "(cherry picked from commit ...)" never reach the subject.
pub fn subject(commit: &Commit) -> &str {
    commit.message.split('\n').next().unwrap_or_default()
}

pub fn body(
    commit: &Commit,
    committer: &Identity,
    branch: &str,
    diff_stat: &str,
    unified_diff: &str,
) -> String {
    format!(
        "{url}\n\
         commit: {id}\n\
         branch: {branch}\n\
         author: {author_name} <{author_email}>\n\
         committer: {committer_name} <{committer_email}>\n\
         date: {timestamp}\n\
         summary:\n\
         \n\
         {message}\n\
         \n\
         files:\n\
         {diff_stat}\n\
         \n\
         {unified_diff}\n",
        url = commit.url,
        id = commit.id,
        branch = branch,
        author_name = commit.author.name,
        author_email = commit.author.email,
        committer_name = committer.name,
        committer_email = committer.email,
        timestamp = commit.timestamp,
        message = commit.message,
        diff_stat = diff_stat,
        unified_diff = unified_diff,
    )
}

/// Assemble the notification. The `From` address is always the configured
/// sender; only its display name follows the commit.
pub fn compose(
    commit: &Commit,
    pusher: Option<&Identity>,
    branch: &str,
    diff_stat: &str,
    unified_diff: &str,
    config: &MailerConfig,
) -> EmailMessage {
    let committer = effective_committer(commit, pusher);
    let name = sender_name(committer, &commit.author);

    EmailMessage {
        from: Mailbox::new(Some(name.to_string()), config.sender.clone()),
        to: Mailbox::new(None, config.recipient.clone()),
        subject: subject(commit).to_string(),
        body: body(commit, committer, branch, diff_stat, unified_diff),
    }
}
