//! Application state for ward-cloud

use std::sync::Arc;

use aws_sdk_sesv2::Client as SesClient;
use sqlx::PgPool;
use ward_core::clock::{Clock, SystemClock};
use ward_core::crypto::SecretCipher;
use ward_core::entitlement::EntitlementChecker;
use ward_core::ledger::QuotaLedger;
use ward_core::mfa::{LogSender, MfaGate, OtpDelivery, OtpSender};
use ward_core::plan::PlanCatalog;
use ward_core::session::{SessionConfig, SessionIssuer};
use ward_core::{ConfigHandle, EngineConfig};

use crate::config::{Config, OtpTransport};
use crate::db;
use crate::email::SesOtpSender;
use crate::sms::HttpSmsSender;
use crate::util::hash_password;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// PostgreSQL connection pool
    pub pool: PgPool,
    /// Engine configuration snapshot (refreshed from `runtime_settings`)
    pub engine: ConfigHandle,
    pub clock: Arc<dyn Clock>,
    pub catalog: Arc<PlanCatalog>,
    pub ledger: Arc<QuotaLedger>,
    pub checker: Arc<EntitlementChecker>,
    pub mfa: Arc<MfaGate>,
    pub sessions: Arc<SessionIssuer>,
    pub accounts: Arc<db::PgAccountStore>,
    /// Payment notification signing secret
    pub payment_webhook_secret: String,
    /// Proxies trusted to append X-Forwarded-For
    pub trusted_proxy_hops: usize,
}

impl AppState {
    /// Create a new AppState
    pub async fn new(config: &Config) -> Result<Self, BoxError> {
        let pool = PgPool::connect(&config.database_url).await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        let engine = ConfigHandle::new(EngineConfig {
            maintenance_mode: db::settings::maintenance_mode(&pool).await?,
            ..EngineConfig::default()
        });
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let accounts = Arc::new(db::PgAccountStore::new(pool.clone()));
        let audit = Arc::new(db::PgAuditSink::new(pool.clone()));

        let catalog = Arc::new(PlanCatalog::new(
            Arc::new(db::PgPlanStore::new(pool.clone())),
            engine.clone(),
        ));
        let ledger = Arc::new(QuotaLedger::new(
            Arc::new(db::PgUsageStore::new(pool.clone())),
            clock.clone(),
        ));
        let checker = Arc::new(EntitlementChecker::new(
            catalog.clone(),
            ledger.clone(),
            accounts.clone(),
            audit.clone(),
            engine.clone(),
            clock.clone(),
        ));

        let (email, sms) = Self::otp_senders(config).await;
        let cipher = SecretCipher::from_base64(&config.mfa_encryption_key)?;
        let mfa = Arc::new(MfaGate::new(
            Arc::new(db::PgMfaStore::new(pool.clone())),
            accounts.clone(),
            OtpDelivery::new(email, sms),
            cipher,
            audit,
            engine.clone(),
            clock.clone(),
        ));

        let sessions = Arc::new(SessionIssuer::new(
            SessionConfig {
                secret: config.jwt_secret.clone(),
                issuer: config.jwt_issuer.clone(),
                audience: config.jwt_audience.clone(),
            },
            accounts.clone(),
            engine.clone(),
            clock.clone(),
        ));

        if let Some((email, password)) = &config.bootstrap_admin {
            let hash = hash_password(password).map_err(|e| format!("hash admin password: {e}"))?;
            let email = email.trim().to_lowercase();
            if db::accounts::ensure_admin(&pool, &email, &hash, shared::util::now_millis()).await? {
                tracing::info!(email = %email, "Bootstrap administrator created");
            }
        }

        Ok(Self {
            pool,
            engine,
            clock,
            catalog,
            ledger,
            checker,
            mfa,
            sessions,
            accounts,
            payment_webhook_secret: config.payment_webhook_secret.clone(),
            trusted_proxy_hops: config.trusted_proxy_hops,
        })
    }

    async fn otp_senders(config: &Config) -> (Arc<dyn OtpSender>, Arc<dyn OtpSender>) {
        if config.otp_transport == OtpTransport::Log {
            tracing::warn!("OTP transport is 'log': verification codes are not delivered");
            return (Arc::new(LogSender), Arc::new(LogSender));
        }

        let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let ses = if let Ok(ses_region) = std::env::var("SES_REGION") {
            let ses_config = aws_config
                .to_builder()
                .region(aws_config::Region::new(ses_region))
                .build();
            SesClient::new(&ses_config)
        } else {
            SesClient::new(&aws_config)
        };
        let ttl_minutes = EngineConfig::default().otp_ttl().num_minutes();
        let email: Arc<dyn OtpSender> =
            Arc::new(SesOtpSender::new(ses, config.ses_from_email.clone(), ttl_minutes));

        let sms: Arc<dyn OtpSender> = match &config.sms_gateway_url {
            Some(url) => Arc::new(HttpSmsSender::new(url.clone(), config.sms_gateway_key.clone())),
            None => {
                tracing::warn!("SMS_GATEWAY_URL not set: SMS codes are only logged");
                Arc::new(LogSender)
            }
        };
        (email, sms)
    }
}
