//! Shared utility functions for ward-cloud

use std::net::{IpAddr, SocketAddr};

use axum::extract::Request;

pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    use argon2::password_hash::SaltString;
    use argon2::password_hash::rand_core::OsRng;
    use argon2::{Argon2, PasswordHasher};
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    use argon2::{Argon2, PasswordHash, PasswordVerifier};
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// Client IP as seen by the outermost of `trusted_hops` proxies
///
/// Every proxy appends the address it received from, so entries left of the
/// trusted ones are caller supplied. With no trusted proxies, or a header
/// shorter than the trusted chain, the peer address is used.
pub fn client_ip(request: &Request, trusted_hops: usize) -> String {
    if trusted_hops > 0
        && let Some(forwarded) = request.headers().get("x-forwarded-for")
        && let Ok(val) = forwarded.to_str()
    {
        let entries: Vec<&str> = val
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        if let Some(index) = entries.len().checked_sub(trusted_hops)
            && let Ok(ip) = entries[index].parse::<IpAddr>()
        {
            return ip.to_string();
        }
        tracing::debug!(forwarded = %val, trusted_hops, "Unusable X-Forwarded-For, using peer address");
    }

    request
        .extensions()
        .get::<axum::extract::ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_owned())
}

pub fn user_agent(request: &Request) -> String {
    request
        .headers()
        .get(http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_owned()
}
