//! Retrieval of a commit's unified diff from the hosting service.

use async_trait::async_trait;
use tracing::debug;

use crate::error::{MailerError, Result};

const USER_AGENT: &str = concat!("commit_mailer/", env!("CARGO_PKG_VERSION"));

/// Source of unified diff text for a URL.
#[async_trait]
pub trait DiffFetcher: Send + Sync {
    /// Single GET of `url`; any final status >= 300 is a failure.
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// `DiffFetcher` backed by a reqwest client owned by one request.
pub struct HttpDiffFetcher {
    client: reqwest::Client,
}

impl HttpDiffFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DiffFetcher for HttpDiffFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        debug!("Fetching diff from {}", url);
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if status.as_u16() >= 300 {
            return Err(MailerError::UpstreamFetchFailed {
                url: response.url().to_string(),
                status: status.as_u16(),
            });
        }

        Ok(response.text().await?)
    }
}
