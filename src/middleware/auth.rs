// SPDX-License-Identifier: MIT

//! Signed principal-cookie authentication.
//!
//! The browser session is bound to a principal by the `athlete_hub_user_id`
//! cookie (plus `athlete_hub_original_user_id` while impersonating). Cookie
//! values are HMAC-signed, but remain untrusted input: every resolution
//! cross-checks the id against the stored principal set, and a failed check
//! is treated exactly like an absent cookie.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{AppError, Result};
use crate::services::identity::ActingIdentity;
use crate::AppState;

/// Cookie holding the acting principal id.
pub const ACTING_COOKIE: &str = "athlete_hub_user_id";
/// Cookie holding the original principal id while impersonating.
pub const ORIGINAL_COOKIE: &str = "athlete_hub_original_user_id";

const COOKIE_MAX_AGE_DAYS: i64 = 30;

// Type alias for HMAC-SHA256
type HmacSha256 = Hmac<Sha256>;

/// Sign a principal id into a cookie token: base64url("id|signature_hex").
pub fn sign_principal_token(user_id: &str, key: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("HMAC init failed: {}", e)))?;
    mac.update(user_id.as_bytes());
    let signature = mac.finalize().into_bytes();

    let token = format!("{}|{}", user_id, hex::encode(signature));
    Ok(URL_SAFE_NO_PAD.encode(token.as_bytes()))
}

/// Verify a cookie token and extract the principal id it carries.
pub fn verify_principal_token(token: &str, key: &[u8]) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD.decode(token).ok()?;
    let token_str = String::from_utf8(bytes).ok()?;
    let (user_id, signature_hex) = token_str.rsplit_once('|')?;

    let provided = hex::decode(signature_hex).ok()?;
    let mut mac = HmacSha256::new_from_slice(key).ok()?;
    mac.update(user_id.as_bytes());
    let expected = mac.finalize().into_bytes();

    if bool::from(expected.as_slice().ct_eq(provided.as_slice())) {
        Some(user_id.to_string())
    } else {
        tracing::warn!("Principal cookie signature mismatch");
        None
    }
}

/// Resolve the acting identity from the request cookies, if any.
pub async fn resolve_identity(
    state: &AppState,
    jar: &CookieJar,
) -> Result<Option<ActingIdentity>> {
    let key = &state.config.cookie_signing_key;

    let Some(acting_id) = jar
        .get(ACTING_COOKIE)
        .and_then(|c| verify_principal_token(c.value(), key))
    else {
        return Ok(None);
    };

    let Some(acting) = state.db.get_user(&acting_id).await?.filter(|u| u.is_active) else {
        tracing::warn!(user_id = %acting_id, "Principal cookie references no active user");
        return Ok(None);
    };

    let original = match jar
        .get(ORIGINAL_COOKIE)
        .and_then(|c| verify_principal_token(c.value(), key))
    {
        Some(original_id) => state.db.get_user(&original_id).await?.filter(|u| u.is_active),
        None => None,
    };

    Ok(Some(ActingIdentity::resume(acting, original)))
}

/// Middleware that requires a resolved acting identity.
pub async fn require_principal(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    match resolve_identity(&state, &jar).await? {
        Some(identity) => {
            request.extensions_mut().insert(identity);
            Ok(next.run(request).await)
        }
        None => Err(AppError::Unauthorized),
    }
}

/// Build an identity cookie with the attributes shared by both cookies.
pub fn identity_cookie(name: &'static str, token: String, secure: bool) -> Cookie<'static> {
    Cookie::build((name, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(time::Duration::days(COOKIE_MAX_AGE_DAYS))
        .build()
}

/// Build a removal cookie matching the creation attributes.
pub fn removal_cookie(name: &'static str, secure: bool) -> Cookie<'static> {
    Cookie::build((name, ""))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(time::Duration::ZERO)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_round_trip() {
        let key = b"test_cookie_key";
        let token = sign_principal_token("user-17", key).unwrap();
        assert_eq!(
            verify_principal_token(&token, key),
            Some("user-17".to_string())
        );
    }

    #[test]
    fn test_tampered_token_rejected() {
        let key = b"test_cookie_key";
        let token = sign_principal_token("user-17", key).unwrap();

        // Re-point the signed id at another principal.
        let decoded = String::from_utf8(URL_SAFE_NO_PAD.decode(&token).unwrap()).unwrap();
        let (_, signature) = decoded.rsplit_once('|').unwrap();
        let forged = URL_SAFE_NO_PAD.encode(format!("user-1|{}", signature).as_bytes());

        assert_eq!(verify_principal_token(&forged, key), None);
    }

    #[test]
    fn test_wrong_key_rejected() {
        let token = sign_principal_token("user-17", b"key_a").unwrap();
        assert_eq!(verify_principal_token(&token, b"key_b"), None);
    }

    #[test]
    fn test_garbage_token_rejected() {
        assert_eq!(verify_principal_token("not-base64!!", b"key"), None);
        let no_separator = URL_SAFE_NO_PAD.encode(b"just-a-user-id");
        assert_eq!(verify_principal_token(&no_separator, b"key"), None);
    }
}
