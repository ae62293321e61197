//! Time-based one-time passwords (RFC 6238, HMAC-SHA1)

use chrono::{DateTime, Utc};
use data_encoding::BASE32_NOPAD;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use subtle::ConstantTimeEq;

type HmacSha1 = Hmac<Sha1>;

const SECRET_LEN: usize = 20;

pub fn generate_secret() -> Vec<u8> {
    let mut secret = vec![0u8; SECRET_LEN];
    rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut secret);
    secret
}

/// Base32 without padding, as authenticator apps expect
pub fn encode_secret(secret: &[u8]) -> String {
    BASE32_NOPAD.encode(secret)
}

pub fn decode_secret(encoded: &str) -> Option<Vec<u8>> {
    BASE32_NOPAD.decode(encoded.as_bytes()).ok()
}

/// HOTP value for one counter (RFC 4226 dynamic truncation)
pub fn hotp(secret: &[u8], counter: u64, digits: u32) -> String {
    let Ok(mut mac) = HmacSha1::new_from_slice(secret) else {
        return String::new();
    };
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();

    let offset = (digest[digest.len() - 1] & 0x0f) as usize;
    let binary = u32::from_be_bytes([
        digest[offset] & 0x7f,
        digest[offset + 1],
        digest[offset + 2],
        digest[offset + 3],
    ]);
    let modulus = 10u32.pow(digits.min(9));
    format!("{:0width$}", binary % modulus, width = digits as usize)
}

pub fn step_at(now: DateTime<Utc>, step_secs: i64) -> i64 {
    now.timestamp().div_euclid(step_secs.max(1))
}

/// Matching time step within `±skew` steps of `now`
pub fn verify(
    secret: &[u8],
    code: &str,
    now: DateTime<Utc>,
    step_secs: i64,
    skew: i64,
    digits: u32,
) -> Option<i64> {
    let code = code.trim();
    if code.len() != digits as usize || !code.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let current = step_at(now, step_secs);
    let mut matched = None;
    // Check every candidate so timing does not reveal which step matched
    for step in (current - skew)..=(current + skew) {
        if step < 0 {
            continue;
        }
        let expected = hotp(secret, step as u64, digits);
        if bool::from(expected.as_bytes().ct_eq(code.as_bytes())) {
            matched = Some(step);
        }
    }
    matched
}

/// `otpauth://` URI for QR provisioning
pub fn provisioning_uri(
    issuer: &str,
    account: &str,
    secret_b32: &str,
    digits: u32,
    period: i64,
) -> String {
    format!(
        "otpauth://totp/{}:{}?secret={secret_b32}&issuer={}&algorithm=SHA1&digits={digits}&period={period}",
        encode_component(issuer),
        encode_component(account),
        encode_component(issuer),
    )
}

fn encode_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' | b'@' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    // RFC 6238 appendix B test secret
    const RFC_SECRET: &[u8] = b"12345678901234567890";

    #[test]
    fn test_rfc6238_vectors() {
        let cases = [
            (59, "94287082"),
            (1_111_111_109, "07081804"),
            (1_234_567_890, "89005924"),
            (2_000_000_000, "69279037"),
        ];
        for (ts, expected) in cases {
            let now = Utc.timestamp_opt(ts, 0).unwrap();
            assert_eq!(hotp(RFC_SECRET, step_at(now, 30) as u64, 8), expected);
        }
    }

    #[test]
    fn test_rfc4226_vectors() {
        assert_eq!(hotp(RFC_SECRET, 0, 6), "755224");
        assert_eq!(hotp(RFC_SECRET, 1, 6), "287082");
        assert_eq!(hotp(RFC_SECRET, 9, 6), "520489");
    }

    #[test]
    fn test_verify_allows_one_step_of_skew() {
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let step = step_at(now, 30);
        let previous = hotp(RFC_SECRET, (step - 1) as u64, 6);
        let next = hotp(RFC_SECRET, (step + 1) as u64, 6);
        let too_old = hotp(RFC_SECRET, (step - 2) as u64, 6);

        assert_eq!(verify(RFC_SECRET, &previous, now, 30, 1, 6), Some(step - 1));
        assert_eq!(verify(RFC_SECRET, &next, now, 30, 1, 6), Some(step + 1));
        assert_eq!(verify(RFC_SECRET, &too_old, now, 30, 1, 6), None);
        assert_eq!(verify(RFC_SECRET, "12ab56", now, 30, 1, 6), None);
    }

    #[test]
    fn test_secret_encoding() {
        let secret = generate_secret();
        let encoded = encode_secret(&secret);
        assert!(!encoded.contains('='));
        assert_eq!(decode_secret(&encoded).unwrap(), secret);
    }

    #[test]
    fn test_provisioning_uri_escapes_label() {
        let uri = provisioning_uri("Ward Cloud", "ana@example.com", "ABC", 6, 30);
        assert!(uri.starts_with("otpauth://totp/Ward%20Cloud:ana@example.com?secret=ABC"));
        assert!(uri.contains("issuer=Ward%20Cloud"));
    }
}
