//! Email and SMS dispatch.
//!
//! Verification flows persist their code first, then hand a message to the
//! configured gateway. Delivery is attempted exactly once per request: a
//! failed dispatch surfaces to the route handler while the persisted code
//! stays valid, so the caller can ask for the send to be retried.
//!
//! Each channel is either an HTTP gateway (JSON POST with a bearer token) or
//! the logging sender used for local development. Missing gateway
//! credentials select the logging sender instead of failing startup.

use anyhow::{anyhow, Context, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, Instrument};

#[derive(Clone, Debug)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Clone, Debug)]
pub struct SmsMessage {
    pub to: String,
    pub body: String,
}

/// Gateway acknowledgement for a dispatched message.
#[derive(Clone, Debug, Default)]
pub struct DispatchReceipt {
    pub message_id: Option<String>,
}

#[derive(Deserialize, Default)]
struct GatewayResponse {
    message_id: Option<String>,
}

/// Email transport selected at startup.
pub enum EmailGateway {
    /// Local dev sender that logs the payload instead of sending real email.
    Log,
    /// Transactional email gateway reached over HTTP.
    Http {
        client: reqwest::Client,
        url: String,
        token: SecretString,
        from: String,
    },
}

impl EmailGateway {
    #[must_use]
    pub fn from_config(
        client: &reqwest::Client,
        url: Option<String>,
        token: Option<String>,
        from: String,
    ) -> Self {
        match (url, token) {
            (Some(url), Some(token)) if !url.trim().is_empty() => Self::Http {
                client: client.clone(),
                url,
                token: SecretString::from(token),
                from,
            },
            _ => Self::Log,
        }
    }

    /// Deliver a message or return an error so the caller can surface the
    /// failure. Never retried here.
    pub async fn send(&self, message: &EmailMessage) -> Result<DispatchReceipt> {
        match self {
            Self::Log => {
                info!(
                    to = %message.to,
                    subject = %message.subject,
                    body = %message.body,
                    "email gateway log stub"
                );
                Ok(DispatchReceipt::default())
            }
            Self::Http {
                client,
                url,
                token,
                from,
            } => {
                let payload = json!({
                    "from": from,
                    "to": message.to,
                    "subject": message.subject,
                    "body": message.body,
                });
                let span = tracing::info_span!(
                    "notify.email",
                    http.method = "POST",
                    url = %url
                );
                let response = client
                    .post(url)
                    .bearer_auth(token.expose_secret())
                    .json(&payload)
                    .send()
                    .instrument(span)
                    .await
                    .context("email gateway request failed")?;

                let status = response.status();
                if !status.is_success() {
                    return Err(anyhow!("email gateway returned {status}"));
                }

                let receipt: GatewayResponse = response.json().await.unwrap_or_default();
                Ok(DispatchReceipt {
                    message_id: receipt.message_id,
                })
            }
        }
    }
}

/// SMS transport selected at startup.
pub enum SmsGateway {
    /// Local dev sender that logs the payload instead of sending real SMS.
    Log,
    /// SMS gateway reached over HTTP.
    Http {
        client: reqwest::Client,
        url: String,
        token: SecretString,
        from: String,
    },
}

impl SmsGateway {
    #[must_use]
    pub fn from_config(
        client: &reqwest::Client,
        url: Option<String>,
        token: Option<String>,
        from: String,
    ) -> Self {
        match (url, token) {
            (Some(url), Some(token)) if !url.trim().is_empty() => Self::Http {
                client: client.clone(),
                url,
                token: SecretString::from(token),
                from,
            },
            _ => Self::Log,
        }
    }

    /// Deliver a message or return an error so the caller can surface the
    /// failure. Never retried here.
    pub async fn send(&self, message: &SmsMessage) -> Result<DispatchReceipt> {
        match self {
            Self::Log => {
                info!(to = %message.to, body = %message.body, "sms gateway log stub");
                Ok(DispatchReceipt::default())
            }
            Self::Http {
                client,
                url,
                token,
                from,
            } => {
                let payload = json!({
                    "from": from,
                    "to": message.to,
                    "body": message.body,
                });
                let span = tracing::info_span!(
                    "notify.sms",
                    http.method = "POST",
                    url = %url
                );
                let response = client
                    .post(url)
                    .bearer_auth(token.expose_secret())
                    .json(&payload)
                    .send()
                    .instrument(span)
                    .await
                    .context("sms gateway request failed")?;

                let status = response.status();
                if !status.is_success() {
                    return Err(anyhow!("sms gateway returned {status}"));
                }

                let receipt: GatewayResponse = response.json().await.unwrap_or_default();
                Ok(DispatchReceipt {
                    message_id: receipt.message_id,
                })
            }
        }
    }
}

/// Both delivery channels, injected into the verification handlers.
pub struct Notifier {
    email: EmailGateway,
    sms: SmsGateway,
}

impl Notifier {
    #[must_use]
    pub fn new(email: EmailGateway, sms: SmsGateway) -> Self {
        Self { email, sms }
    }

    /// # Errors
    /// Returns an error when the gateway rejects or cannot be reached.
    pub async fn send_email(&self, message: &EmailMessage) -> Result<DispatchReceipt> {
        self.email.send(message).await
    }

    /// # Errors
    /// Returns an error when the gateway rejects or cannot be reached.
    pub async fn send_sms(&self, message: &SmsMessage) -> Result<DispatchReceipt> {
        self.sms.send(message).await
    }
}
