//! Mail delivery over a transactional email HTTP API

use crate::config::MailConfig;
use crate::error::{DispatchError, Error, Result};
use crate::types::{Attachment, MailMessage};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Delivery seam for outbound mail. Implementations own the wire protocol;
/// callers only see a message, its attachments, and an optional provider
/// message id on success.
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Deliver `message` with `attachments`, returning the provider-assigned
    /// message id when one is reported.
    async fn send(
        &self,
        message: &MailMessage,
        attachments: &[Attachment],
    ) -> std::result::Result<Option<String>, DispatchError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    from: Option<&'a str>,
    to: &'a [String],
    subject: &'a str,
    body_html: &'a str,
    attachments: Vec<WireAttachment>,
}

#[derive(Serialize)]
struct WireAttachment {
    filename: String,
    /// base64-encoded file bytes
    content: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendResponse {
    message_id: Option<String>,
}

/// [`MailTransport`] that POSTs the message as JSON to a configured
/// HTTP endpoint.
#[derive(Debug)]
pub struct HttpMailTransport {
    client: reqwest::Client,
    endpoint: String,
    auth_header: Option<String>,
    from: Option<String>,
}

impl HttpMailTransport {
    /// Build the transport from mail configuration. Requires an endpoint.
    pub fn from_config(config: &MailConfig) -> Result<Self> {
        let endpoint = config.endpoint.clone().ok_or_else(|| Error::Config {
            message: "mail endpoint is not configured".to_string(),
            key: Some("endpoint".to_string()),
        })?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Other(format!("failed to build http client: {e}")))?;
        Ok(Self {
            client,
            endpoint,
            auth_header: config.auth_header.clone(),
            from: config.from.clone(),
        })
    }
}

#[async_trait]
impl MailTransport for HttpMailTransport {
    async fn send(
        &self,
        message: &MailMessage,
        attachments: &[Attachment],
    ) -> std::result::Result<Option<String>, DispatchError> {
        let generated = attachments.len();
        let fail = |reason: String| DispatchError::MailFailed { reason, generated };

        let body = SendRequest {
            from: self.from.as_deref(),
            to: &message.to,
            subject: &message.subject,
            body_html: &message.body_html,
            attachments: attachments
                .iter()
                .map(|a| WireAttachment {
                    filename: a.filename.clone(),
                    content: BASE64.encode(&a.bytes),
                })
                .collect(),
        };

        debug!(
            endpoint = %self.endpoint,
            recipients = message.to.len(),
            attachments = generated,
            "posting mail"
        );

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(auth) = &self.auth_header {
            request = request.header(reqwest::header::AUTHORIZATION, auth.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| fail(format!("mail request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(fail(format!(
                "mail endpoint returned {status}: {}",
                detail.trim()
            )));
        }

        let message_id = response
            .json::<SendResponse>()
            .await
            .ok()
            .and_then(|r| r.message_id);
        info!(message_id = ?message_id, attachments = generated, "mail accepted");
        Ok(message_id)
    }
}
