//! Service configuration

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// How one-time codes leave the service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpTransport {
    /// Codes are written to the log (development)
    Log,
    /// SES for e-mail, the HTTP gateway for SMS
    Live,
}

/// Service configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection URL
    pub database_url: String,
    /// HTTP port
    pub http_port: u16,
    /// Environment: development | staging | production
    pub environment: String,
    /// SES sender email address
    pub ses_from_email: String,
    /// SMS gateway endpoint (JSON POST)
    pub sms_gateway_url: Option<String>,
    /// SMS gateway bearer key
    pub sms_gateway_key: String,
    pub otp_transport: OtpTransport,
    /// HMAC secret for session tokens
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    /// Base64 AES-256 key for authenticator secrets at rest
    pub mfa_encryption_key: String,
    /// Shared secret of the payment provider notifications
    pub payment_webhook_secret: String,
    /// Seconds between usage archival sweeps
    pub archive_interval_secs: u64,
    /// Seconds between runtime settings refreshes
    pub settings_refresh_secs: u64,
    /// Reverse proxies in front of the service that append X-Forwarded-For;
    /// 0 means the header is ignored
    pub trusted_proxy_hops: usize,
    /// Administrator created at startup when missing
    pub bootstrap_admin: Option<(String, String)>,
}

impl Config {
    /// Require a secret env var: must be set and non-empty in non-development environments.
    fn require_secret(name: &str, environment: &str, dev_default: &str) -> Result<String, BoxError> {
        let val = match std::env::var(name) {
            Ok(v) => v,
            Err(_) => {
                if environment != "development" {
                    return Err(format!("{name} must be set in {environment} environment").into());
                }
                dev_default.to_string()
            }
        };
        if val.is_empty() && environment != "development" {
            return Err(format!("{name} must not be empty in {environment} environment").into());
        }
        Ok(val)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, BoxError> {
        let environment = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let otp_transport = match std::env::var("OTP_TRANSPORT").ok().as_deref() {
            Some("log") => OtpTransport::Log,
            Some("live") => OtpTransport::Live,
            Some(other) => return Err(format!("OTP_TRANSPORT must be log or live, got {other}").into()),
            None if environment == "development" => OtpTransport::Log,
            None => OtpTransport::Live,
        };

        let bootstrap_admin = match (
            std::env::var("BOOTSTRAP_ADMIN_EMAIL").ok().filter(|s| !s.is_empty()),
            std::env::var("BOOTSTRAP_ADMIN_PASSWORD").ok().filter(|s| !s.is_empty()),
        ) {
            (Some(email), Some(password)) => Some((email, password)),
            _ => None,
        };

        Ok(Self {
            database_url: std::env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set")?,
            http_port: std::env::var("HTTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            environment: environment.clone(),
            ses_from_email: std::env::var("SES_FROM_EMAIL")
                .unwrap_or_else(|_| "security@ward.local".into()),
            sms_gateway_url: std::env::var("SMS_GATEWAY_URL").ok().filter(|s| !s.is_empty()),
            sms_gateway_key: std::env::var("SMS_GATEWAY_KEY").unwrap_or_default(),
            otp_transport,
            jwt_secret: Self::require_secret(
                "JWT_SECRET",
                &environment,
                "dev-JWT_SECRET-not-for-production-0123456789",
            )?,
            jwt_issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "ward".into()),
            jwt_audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "ward-clients".into()),
            // 32 zero bytes, development only
            mfa_encryption_key: Self::require_secret(
                "MFA_ENCRYPTION_KEY",
                &environment,
                "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=",
            )?,
            payment_webhook_secret: Self::require_secret(
                "PAYMENT_WEBHOOK_SECRET",
                &environment,
                "dev-PAYMENT_WEBHOOK_SECRET-not-for-production",
            )?,
            archive_interval_secs: std::env::var("ARCHIVE_INTERVAL_SECS")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3600),
            settings_refresh_secs: std::env::var("SETTINGS_REFRESH_SECS")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(30),
            trusted_proxy_hops: std::env::var("TRUSTED_PROXY_HOPS")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(0),
            bootstrap_admin,
        })
    }
}
