//! SMS gateway client
//!
//! The gateway takes `POST {url}` with `{"to": ..., "message": ...}` and a
//! bearer key; any non-2xx status is a failed delivery.

use async_trait::async_trait;
use serde::Serialize;
use ward_core::BoxError;
use ward_core::mfa::OtpSender;

#[derive(Serialize)]
struct SmsRequest<'a> {
    to: &'a str,
    message: String,
}

#[derive(Clone)]
pub struct HttpSmsSender {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

impl HttpSmsSender {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl OtpSender for HttpSmsSender {
    async fn send(&self, destination: &str, code: &str) -> Result<(), BoxError> {
        let request = SmsRequest {
            to: destination,
            message: format!("Your Ward verification code is {code}"),
        };
        self.client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?
            .error_for_status()?;
        tracing::info!(to = destination, "Verification code sent by SMS");
        Ok(())
    }
}
