/// 邮件网关客户端
///
/// 通过 HTTP 邮件中继接口发送纯文本邮件
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use tracing::debug;

use crate::clients::MailTransport;
use crate::config::Config;
use crate::error::TransportError;
use crate::models::template::RenderedEmail;

#[derive(Debug, Serialize)]
struct MailPayload<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

/// HTTP 邮件网关客户端
pub struct HttpMailClient {
    http: Client,
    api_url: String,
    api_key: String,
    from: String,
}

impl HttpMailClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: Client::new(),
            api_url: config.mail_api_url.clone(),
            api_key: config.mail_api_key.clone(),
            from: config.mail_from.clone(),
        }
    }
}

#[async_trait]
impl MailTransport for HttpMailClient {
    async fn send(&self, to_address: &str, email: &RenderedEmail) -> Result<(), TransportError> {
        let payload = MailPayload {
            from: &self.from,
            to: to_address,
            subject: &email.subject,
            text: &email.body,
        };

        debug!("发送邮件 -> {} (主题: {})", to_address, email.subject);

        let resp = self
            .http
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout { after_ms: 0 }
                } else {
                    TransportError::Transient { message: e.to_string() }
                }
            })?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }

        let body = resp.text().await.unwrap_or_default();
        Err(classify_status(status, to_address, body))
    }
}

/// 429 和 5xx 可重试，其余 4xx 视为拒收
fn classify_status(status: StatusCode, to_address: &str, body: String) -> TransportError {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        TransportError::Transient {
            message: format!("HTTP {}: {}", status.as_u16(), body),
        }
    } else {
        TransportError::Rejected {
            address: to_address.to_string(),
            message: format!("HTTP {}: {}", status.as_u16(), body),
        }
    }
}
