//! Outbound email boundary.
//!
//! The sweep engine only knows how to hand a composed message to a
//! `Notifier`; the SMTP implementation lives here, and tests substitute the
//! mock. A rejected message is a terminal verdict for the item, while a
//! transport problem is still reported as a failure but carries the raw
//! error for the record.

use async_trait::async_trait;
use lettre::{
    message::header::ContentType,
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use thiserror::Error;

/// A composed message ready to hand to the transport.
#[derive(Debug, Clone)]
pub struct OutboundEmail {
    /// Recipient address.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// HTML body.
    pub html_body: String,
}

/// Receipt returned by a notifier on acceptance.
#[derive(Debug, Clone, Default)]
pub struct Delivery {
    /// Provider-side identifier for the accepted message, when one exists.
    pub email_id: Option<String>,
}

/// Why a notifier could not deliver a message.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The provider refused the message. Retrying the same message will not
    /// help.
    #[error("message rejected: {0}")]
    Rejected(String),

    /// The message never reached the provider.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Delivery channel for composed messages.
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    /// Sends one message, returning a receipt on acceptance.
    async fn send(&self, email: &OutboundEmail) -> Result<Delivery, NotifyError>;
}

/// SMTP relay settings.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    /// Relay hostname.
    pub host: String,
    /// Relay port.
    pub port: u16,
    /// Username for relay authentication, if the relay requires it.
    pub username: Option<String>,
    /// Password for relay authentication.
    pub password: Option<String>,
    /// From address for all outbound mail, e.g. `Postdate <noreply@example.com>`.
    pub from: String,
}

/// Notifier backed by an SMTP relay via STARTTLS.
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpNotifier {
    /// Builds the transport from relay settings.
    pub fn new(config: &SmtpConfig) -> Result<Self, NotifyError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| NotifyError::Transport(e.to_string()))?
            .port(config.port);
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }
        Ok(Self { transport: builder.build(), from: config.from.clone() })
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(&self, email: &OutboundEmail) -> Result<Delivery, NotifyError> {
        let message = Message::builder()
            .from(self.from.parse().map_err(|e| NotifyError::Rejected(format!("from: {e}")))?)
            .to(email.to.parse().map_err(|e| NotifyError::Rejected(format!("to: {e}")))?)
            .subject(&email.subject)
            .header(ContentType::TEXT_HTML)
            .body(email.html_body.clone())
            .map_err(|e| NotifyError::Rejected(e.to_string()))?;

        let response = self
            .transport
            .send(message)
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;
        if response.is_positive() {
            Ok(Delivery { email_id: Some(response.code().to_string()) })
        } else {
            Err(NotifyError::Rejected(response.code().to_string()))
        }
    }
}

pub mod mock {
    //! Scriptable notifier for tests.

    use std::{sync::Arc, time::Duration};

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use super::{Delivery, Notifier, NotifyError, OutboundEmail};

    /// What the mock does with the next messages it receives.
    #[derive(Debug, Clone)]
    pub enum Behavior {
        /// Accept every message, returning the given receipt identifier.
        Accept {
            /// Identifier echoed back as the delivery receipt.
            email_id: Option<String>,
        },
        /// Reject every message with the given reason.
        Reject {
            /// Reason carried in the rejection.
            reason: String,
        },
        /// Sleep before accepting, to exercise timeout handling.
        Delay {
            /// How long to sleep before accepting.
            latency: Duration,
        },
    }

    /// Notifier that records every message it is asked to send.
    #[derive(Debug, Clone)]
    pub struct MockNotifier {
        behavior: Arc<Mutex<Behavior>>,
        sent: Arc<Mutex<Vec<OutboundEmail>>>,
    }

    impl MockNotifier {
        /// Creates a mock that accepts everything.
        pub fn new() -> Self {
            Self {
                behavior: Arc::new(Mutex::new(Behavior::Accept { email_id: None })),
                sent: Arc::new(Mutex::new(Vec::new())),
            }
        }

        /// Replaces the scripted behavior.
        pub async fn set_behavior(&self, behavior: Behavior) {
            *self.behavior.lock().await = behavior;
        }

        /// Messages the mock has accepted or rejected so far.
        pub async fn sent(&self) -> Vec<OutboundEmail> {
            self.sent.lock().await.clone()
        }

        /// Number of send attempts observed.
        pub async fn sent_count(&self) -> usize {
            self.sent.lock().await.len()
        }
    }

    impl Default for MockNotifier {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl Notifier for MockNotifier {
        async fn send(&self, email: &OutboundEmail) -> Result<Delivery, NotifyError> {
            self.sent.lock().await.push(email.clone());
            let behavior = self.behavior.lock().await.clone();
            match behavior {
                Behavior::Accept { email_id } => Ok(Delivery { email_id }),
                Behavior::Reject { reason } => Err(NotifyError::Rejected(reason)),
                Behavior::Delay { latency } => {
                    tokio::time::sleep(latency).await;
                    Ok(Delivery { email_id: None })
                },
            }
        }
    }
}
