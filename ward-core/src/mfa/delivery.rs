//! One-time code delivery
//!
//! Transports only accept `(destination, code)` and report success or
//! failure. Timeouts and retries are applied here, never in the transport.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::MfaMethod;
use crate::error::{BoxError, EngineError};

#[async_trait]
pub trait OtpSender: Send + Sync {
    async fn send(&self, destination: &str, code: &str) -> Result<(), BoxError>;
}

/// Logs the code instead of sending it (local development)
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSender;

#[async_trait]
impl OtpSender for LogSender {
    async fn send(&self, destination: &str, code: &str) -> Result<(), BoxError> {
        tracing::info!(destination = %destination, code = %code, "Verification code (not sent)");
        Ok(())
    }
}

/// Per-channel senders with bounded timeout and retry
#[derive(Clone)]
pub struct OtpDelivery {
    email: Arc<dyn OtpSender>,
    sms: Arc<dyn OtpSender>,
}

impl OtpDelivery {
    pub fn new(email: Arc<dyn OtpSender>, sms: Arc<dyn OtpSender>) -> Self {
        Self { email, sms }
    }

    pub async fn deliver(
        &self,
        method: MfaMethod,
        destination: &str,
        code: &str,
        timeout: Duration,
        retries: u32,
    ) -> Result<(), EngineError> {
        let sender = match method {
            MfaMethod::Email => &self.email,
            MfaMethod::Sms => &self.sms,
            MfaMethod::Totp => {
                return Err(EngineError::MfaInvalidState("TOTP codes are not delivered"));
            }
        };

        let mut last_error = String::new();
        for attempt in 0..=retries {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(200 * u64::from(attempt))).await;
            }
            match tokio::time::timeout(timeout, sender.send(destination, code)).await {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(e)) => last_error = e.to_string(),
                Err(_) => last_error = format!("timed out after {}ms", timeout.as_millis()),
            }
            tracing::warn!(
                method = %method,
                attempt = attempt + 1,
                error = %last_error,
                "Verification code delivery failed"
            );
        }
        Err(EngineError::DeliveryFailed(last_error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Flaky {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl OtpSender for Flaky {
        async fn send(&self, _: &str, _: &str) -> Result<(), BoxError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err("gateway unavailable".into())
            } else {
                Ok(())
            }
        }
    }

    struct Hangs;

    #[async_trait]
    impl OtpSender for Hangs {
        async fn send(&self, _: &str, _: &str) -> Result<(), BoxError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_then_succeeds() {
        let flaky = Arc::new(Flaky {
            failures: 2,
            calls: AtomicU32::new(0),
        });
        let delivery = OtpDelivery::new(flaky.clone(), Arc::new(LogSender));
        delivery
            .deliver(MfaMethod::Email, "a@example.com", "123456", Duration::from_secs(1), 2)
            .await
            .unwrap();
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_retries() {
        let flaky = Arc::new(Flaky {
            failures: 10,
            calls: AtomicU32::new(0),
        });
        let delivery = OtpDelivery::new(Arc::new(LogSender), flaky.clone());
        let err = delivery
            .deliver(MfaMethod::Sms, "+15550100", "123456", Duration::from_secs(1), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::DeliveryFailed(ref msg) if msg.contains("unavailable")));
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_bounded() {
        let delivery = OtpDelivery::new(Arc::new(Hangs), Arc::new(LogSender));
        let err = delivery
            .deliver(MfaMethod::Email, "a@example.com", "123456", Duration::from_secs(5), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::DeliveryFailed(ref msg) if msg.contains("timed out")));
    }
}
