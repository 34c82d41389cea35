//! SMTP delivery: a narrow channel capability and its lettre-backed session.

use async_trait::async_trait;
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::transport::smtp::client::AsyncSmtpConnection;
use lettre::transport::smtp::commands::Ehlo;
use lettre::transport::smtp::extension::ClientId;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{MailerConfig, SmtpCredentials};
use crate::error::{MailerError, Result};
use crate::message::EmailMessage;

const DEFAULT_HELLO_NAME: &str = "localhost";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// One SMTP session, driven step by step. Implementations are used for a
/// single message and then closed.
#[async_trait]
pub trait DeliveryChannel: Send {
    async fn connect(&mut self) -> Result<()>;
    async fn greet(&mut self) -> Result<()>;
    async fn authenticate(&mut self, credentials: &SmtpCredentials) -> Result<()>;
    /// Returns the server's reply text for the accepted message.
    async fn send(&mut self, message: &EmailMessage) -> Result<String>;
    /// Must be safe to call in any state, including after a failure.
    async fn close(&mut self);
}

/// Run a full session for `message` and always close the channel afterwards.
///
/// Authentication is attempted only when credentials are given; a rejected
/// AUTH aborts the session and the message is not sent.
pub async fn deliver(
    channel: &mut dyn DeliveryChannel,
    message: &EmailMessage,
    credentials: Option<&SmtpCredentials>,
) -> Result<String> {
    let result = run_session(channel, message, credentials).await;
    channel.close().await;
    result
}

async fn run_session(
    channel: &mut dyn DeliveryChannel,
    message: &EmailMessage,
    credentials: Option<&SmtpCredentials>,
) -> Result<String> {
    channel.connect().await?;
    channel.greet().await?;
    if let Some(credentials) = credentials {
        channel.authenticate(credentials).await?;
    }
    channel.send(message).await
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChannelState {
    Disconnected,
    Connected,
    Greeted,
    Authenticated,
    Sent,
    Closed,
}

/// Plaintext SMTP session over tokio. Dropping the channel drops the
/// connection, which closes the socket even if `close` never ran.
///
/// lettre reads the banner and sends the first EHLO while connecting, so a
/// rejected greeting surfaces from `connect` as `GreetFailed`. `greet`
/// re-issues EHLO on the open connection.
pub struct SmtpChannel {
    host: String,
    port: u16,
    hello_name: ClientId,
    timeout: Duration,
    connection: Option<AsyncSmtpConnection>,
    state: ChannelState,
}

impl SmtpChannel {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            hello_name: ClientId::Domain(DEFAULT_HELLO_NAME.to_string()),
            timeout: DEFAULT_TIMEOUT,
            connection: None,
            state: ChannelState::Disconnected,
        }
    }

    pub fn from_config(config: &MailerConfig) -> Self {
        Self::new(config.smtp_host.clone(), config.smtp_port)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    fn expect_state(&self, allowed: &[ChannelState], step: &str) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(MailerError::ChannelState(format!(
                "cannot {} while {:?}",
                step, self.state
            )))
        }
    }

    fn connection(&mut self) -> Result<&mut AsyncSmtpConnection> {
        self.connection
            .as_mut()
            .ok_or_else(|| MailerError::ChannelState("no open connection".to_string()))
    }
}

#[async_trait]
impl DeliveryChannel for SmtpChannel {
    async fn connect(&mut self) -> Result<()> {
        self.expect_state(&[ChannelState::Disconnected], "connect")?;
        debug!("Connecting to SMTP server {}:{}", self.host, self.port);

        let connection = AsyncSmtpConnection::connect_tokio1(
            (self.host.as_str(), self.port),
            Some(self.timeout),
            &self.hello_name,
            None,
            None,
        )
        .await
        .map_err(|e| {
            // Reply codes mean the server answered the banner or EHLO with an error.
            if e.is_permanent() || e.is_transient() {
                MailerError::GreetFailed(format!("{}:{}: {}", self.host, self.port, e))
            } else {
                MailerError::ConnectFailed(format!("{}:{}: {}", self.host, self.port, e))
            }
        })?;

        self.connection = Some(connection);
        self.state = ChannelState::Connected;
        Ok(())
    }

    async fn greet(&mut self) -> Result<()> {
        self.expect_state(&[ChannelState::Connected], "greet")?;
        let hello_name = self.hello_name.clone();
        self.connection()?
            .command(Ehlo::new(hello_name))
            .await
            .map_err(|e| MailerError::GreetFailed(e.to_string()))?;
        self.state = ChannelState::Greeted;
        Ok(())
    }

    async fn authenticate(&mut self, credentials: &SmtpCredentials) -> Result<()> {
        self.expect_state(&[ChannelState::Greeted], "authenticate")?;
        let creds = Credentials::new(credentials.username.clone(), credentials.password.clone());
        self.connection()?
            .auth(&[Mechanism::Plain, Mechanism::Login], &creds)
            .await
            .map_err(|e| MailerError::AuthenticationFailed(e.to_string()))?;
        debug!("Authenticated to SMTP server as {}", credentials.username);
        self.state = ChannelState::Authenticated;
        Ok(())
    }

    async fn send(&mut self, message: &EmailMessage) -> Result<String> {
        self.expect_state(
            &[ChannelState::Greeted, ChannelState::Authenticated],
            "send",
        )?;
        let message = message.to_message()?;
        let response = self
            .connection()?
            .send(message.envelope(), &message.formatted())
            .await
            .map_err(|e| MailerError::SendFailed {
                reason: e.to_string(),
            })?;

        self.state = ChannelState::Sent;
        let reply = response.message().collect::<Vec<_>>().join("\n");
        info!("SMTP server accepted message: {}", reply);
        Ok(reply)
    }

    async fn close(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            if let Err(e) = connection.quit().await {
                warn!("SMTP QUIT failed, dropping connection: {}", e);
            }
        }
        self.state = ChannelState::Closed;
    }
}
