use async_trait::async_trait;
use aws_sdk_sesv2::Client as SesClient;
use aws_sdk_sesv2::types::{Body, Content, Destination, EmailContent, Message};
use ward_core::BoxError;
use ward_core::mfa::OtpSender;

/// Verification codes over SES
#[derive(Clone)]
pub struct SesOtpSender {
    ses: SesClient,
    from: String,
    ttl_minutes: i64,
}

impl SesOtpSender {
    pub fn new(ses: SesClient, from: impl Into<String>, ttl_minutes: i64) -> Self {
        Self {
            ses,
            from: from.into(),
            ttl_minutes,
        }
    }
}

#[async_trait]
impl OtpSender for SesOtpSender {
    async fn send(&self, destination: &str, code: &str) -> Result<(), BoxError> {
        let subject = Content::builder()
            .data("Your Ward verification code")
            .build()?;

        let body_text = format!(
            "Your verification code is: {code}\n\
             Valid for {} minutes.\n\n\
             If you did not request this code, you can ignore this message.",
            self.ttl_minutes
        );

        let body = Body::builder()
            .text(Content::builder().data(body_text).build()?)
            .build();

        let message = Message::builder().subject(subject).body(body).build();

        self.ses
            .send_email()
            .from_email_address(&self.from)
            .destination(Destination::builder().to_addresses(destination).build())
            .content(EmailContent::builder().simple(message).build())
            .send()
            .await?;

        tracing::info!(to = destination, "Verification code e-mailed");
        Ok(())
    }
}
