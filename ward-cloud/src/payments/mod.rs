//! Payment provider notifications
//!
//! Notifications carry `X-Payment-Signature: t=<unix>,v1=<hex>` where `v1` is
//! HMAC-SHA256 over `"{t}.{body}"` with the shared webhook secret.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

/// Notifications older (or newer) than this are replays
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Parsed notification body
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub subject_id: String,
    #[serde(default)]
    pub plan: Option<String>,
}

pub fn verify_signature(
    payload: &[u8],
    sig_header: &str,
    secret: &str,
    now: i64,
) -> Result<(), &'static str> {
    let mut timestamp = "";
    let mut signature = "";
    for part in sig_header.split(',') {
        let part = part.trim();
        if let Some(t) = part.strip_prefix("t=") {
            timestamp = t;
        } else if let Some(v) = part.strip_prefix("v1=") {
            signature = v;
        }
    }

    if timestamp.is_empty() || signature.is_empty() {
        return Err("Invalid signature header");
    }

    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).map_err(|_| "HMAC key error")?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);

    // Constant-time comparison via verify_slice
    let sig_bytes = hex::decode(signature).map_err(|_| "Invalid signature hex")?;
    mac.verify_slice(&sig_bytes)
        .map_err(|_| "Signature mismatch")?;

    let ts: i64 = timestamp.parse().map_err(|_| "Invalid timestamp")?;
    if (now - ts).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err("Signature timestamp outside tolerance");
    }

    Ok(())
}
