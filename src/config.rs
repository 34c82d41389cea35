//! Environment-derived configuration, resolved once at startup.

use lettre::Address;
use regex::RegexSet;
use std::path::PathBuf;

use crate::error::{MailerError, Result};

pub const DEFAULT_SMTP_HOSTNAME: &str = "localhost";
pub const DEFAULT_SMTP_PORT: u16 = 1025;
pub const DEFAULT_ALLOWED_BRANCHES: &str = r"\d+\.\d+,main,master";
pub const DEFAULT_BIND_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8585;

/// Operational parameters for the push-to-email pipeline.
#[derive(Debug, Clone)]
pub struct MailerConfig {
    pub sender: Address,
    pub recipient: Address,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub allowed_branches: BranchFilter,
}

/// Username/password pair handed to the delivery channel.
#[derive(Debug, Clone, PartialEq)]
pub struct SmtpCredentials {
    pub username: String,
    pub password: String,
}

impl MailerConfig {
    /// Load the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load the configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let sender = required_address(&lookup, "SENDER_EMAIL")?;
        let recipient = required_address(&lookup, "RECIPIENT_EMAIL")?;

        let smtp_host = non_empty(&lookup, "SMTP_HOSTNAME")
            .unwrap_or_else(|| DEFAULT_SMTP_HOSTNAME.to_string());
        let smtp_port = match non_empty(&lookup, "SMTP_PORT") {
            Some(raw) => parse_port("SMTP_PORT", &raw)?,
            None => DEFAULT_SMTP_PORT,
        };

        let allowed = non_empty(&lookup, "ALLOWED_BRANCHES")
            .unwrap_or_else(|| DEFAULT_ALLOWED_BRANCHES.to_string());

        Ok(Self {
            sender,
            recipient,
            smtp_host,
            smtp_port,
            smtp_username: non_empty(&lookup, "SMTP_USERNAME"),
            smtp_password: lookup("SMTP_PASSWORD").filter(|value| !value.is_empty()),
            allowed_branches: BranchFilter::parse(&allowed)?,
        })
    }

    /// Returns credentials only when both username and password are set.
    pub fn credentials(&self) -> Option<SmtpCredentials> {
        match (&self.smtp_username, &self.smtp_password) {
            (Some(username), Some(password)) => Some(SmtpCredentials {
                username: username.clone(),
                password: password.clone(),
            }),
            _ => None,
        }
    }
}

/// Allow-list of branch names. Each entry is a regular expression that must
/// match the whole branch name, so `main` only accepts `main` while
/// `\d+\.\d+` accepts `3.12`.
///
/// Entries are separated by commas outside `{...}` repetitions and `[...]`
/// classes, so `\d{1,2}\.\d+` stays one entry. An escaped `\,` never splits.
#[derive(Debug, Clone)]
pub struct BranchFilter {
    patterns: RegexSet,
}

impl BranchFilter {
    /// Parse a comma-separated list of branch patterns.
    pub fn parse(raw: &str) -> Result<Self> {
        let anchored: Vec<String> = split_patterns(raw)
            .into_iter()
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| format!("^(?:{})$", entry))
            .collect();

        if anchored.is_empty() {
            return Err(MailerError::ConfigError(
                "ALLOWED_BRANCHES does not contain any branch pattern".to_string(),
            ));
        }

        let patterns = RegexSet::new(&anchored).map_err(|e| {
            MailerError::ConfigError(format!("Invalid ALLOWED_BRANCHES pattern: {}", e))
        })?;
        Ok(Self { patterns })
    }

    pub fn is_allowed(&self, branch: &str) -> bool {
        self.patterns.is_match(branch)
    }
}

/// Split on commas that are not part of a regex construct.
fn split_patterns(raw: &str) -> Vec<&str> {
    let mut entries = Vec::new();
    let mut start = 0;
    let mut braces = 0usize;
    let mut in_class = false;
    let mut escaped = false;

    for (i, c) in raw.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '[' => in_class = true,
            ']' => in_class = false,
            '{' if !in_class => braces += 1,
            '}' if !in_class => braces = braces.saturating_sub(1),
            ',' if !in_class && braces == 0 => {
                entries.push(&raw[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    entries.push(&raw[start..]);
    entries
}

/// Where the HTTP server listens.
#[derive(Debug, Clone, PartialEq)]
pub enum ListenTarget {
    Tcp { host: String, port: u16 },
    Unix(PathBuf),
}

/// Server bootstrap settings, kept apart from the pipeline configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: ListenTarget,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = non_empty(&lookup, "UNIX_SOCKET") {
            return Ok(Self {
                listen: ListenTarget::Unix(PathBuf::from(path)),
            });
        }

        let host = non_empty(&lookup, "BIND_HOST").unwrap_or_else(|| DEFAULT_BIND_HOST.to_string());
        let port = match non_empty(&lookup, "PORT") {
            Some(raw) => parse_port("PORT", &raw)?,
            None => DEFAULT_PORT,
        };
        Ok(Self {
            listen: ListenTarget::Tcp { host, port },
        })
    }
}

fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn required_address<F>(lookup: &F, key: &str) -> Result<Address>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = non_empty(lookup, key)
        .ok_or_else(|| MailerError::MissingConfiguration(key.to_string()))?;
    raw.parse::<Address>().map_err(|e| {
        MailerError::ConfigError(format!("{} is not a valid email address '{}': {}", key, raw, e))
    })
}

fn parse_port(key: &str, raw: &str) -> Result<u16> {
    raw.parse::<u16>().map_err(|e| {
        MailerError::ConfigError(format!("{} is not a valid port '{}': {}", key, raw, e))
    })
}
