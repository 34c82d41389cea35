pub mod api;
pub mod config;
pub mod diff;
pub mod error;
pub mod logging;
pub mod message;
pub mod processor;
pub mod smtp;
pub mod webhook;

use std::sync::Arc;

use config::MailerConfig;
use diff::{DiffFetcher, HttpDiffFetcher};
use error::Result;
use smtp::{DeliveryChannel, SmtpChannel};

/// Hands out the collaborators a single request works with. Nothing is
/// pooled: each call returns a fresh instance that the request drops when done.
pub trait ResourceProvider: Send + Sync {
    fn diff_fetcher(&self) -> Result<Box<dyn DiffFetcher>>;
    fn delivery_channel(&self, config: &MailerConfig) -> Box<dyn DeliveryChannel>;
}

/// Production resources: a new reqwest client and a new SMTP session per request.
pub struct LiveResources;

impl ResourceProvider for LiveResources {
    fn diff_fetcher(&self) -> Result<Box<dyn DiffFetcher>> {
        Ok(Box::new(HttpDiffFetcher::new()?))
    }

    fn delivery_channel(&self, config: &MailerConfig) -> Box<dyn DeliveryChannel> {
        Box::new(SmtpChannel::from_config(config))
    }
}

pub struct AppState {
    pub config: MailerConfig,
    pub resources: Box<dyn ResourceProvider>,
}

impl AppState {
    pub fn new(config: MailerConfig) -> Self {
        Self {
            config,
            resources: Box::new(LiveResources),
        }
    }

    pub fn with_resources(config: MailerConfig, resources: impl ResourceProvider + 'static) -> Self {
        Self {
            config,
            resources: Box::new(resources),
        }
    }
}

pub type SharedState = Arc<AppState>;
