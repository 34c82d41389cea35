use std::io;

/// Custom error type for commit_mailer operations
#[derive(Debug, thiserror::Error)]
pub enum MailerError {
    #[error("Missing configuration: {0} is not set")]
    MissingConfiguration(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Could not parse push payload: {0}")]
    PayloadParseFailed(#[from] serde_json::Error),

    #[error("Malformed push payload: {0}")]
    MalformedPayload(String),

    #[error("Unexpected response for {url:?}: {status}")]
    UpstreamFetchFailed { url: String, status: u16 },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Failed to build email message: {0}")]
    MessageBuildFailed(String),

    #[error("SMTP connect failed: {0}")]
    ConnectFailed(String),

    #[error("SMTP greeting failed: {0}")]
    GreetFailed(String),

    #[error("SMTP authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("SMTP send failed: {reason}")]
    SendFailed { reason: String },

    #[error("SMTP channel used out of order: {0}")]
    ChannelState(String),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
}

/// Helper type for Results that use MailerError
pub type Result<T> = std::result::Result<T, MailerError>;
