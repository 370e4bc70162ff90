//! Bearer token providers for Google APIs
//!
//! A [`TokenProvider`] is constructed once per process and shared by the
//! Gmail client and the Cloud Storage object store. Uses synchronous HTTP
//! (ureq) to be executor-agnostic.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::sync::Mutex;

/// Source of a valid OAuth2 access token
pub trait TokenProvider: Send + Sync {
    /// Get a valid access token, refreshing it if needed
    fn access_token(&self) -> Result<String>;
}

/// A fixed, externally issued access token
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl TokenProvider for StaticToken {
    fn access_token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Access token held in memory with its expiry
#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Option<i64>,
}

impl CachedToken {
    /// Tokens are refreshed five minutes before they expire
    const EXPIRY_BUFFER_SECS: i64 = 300;

    fn from_response(token: TokenResponse) -> Self {
        Self {
            access_token: token.access_token,
            expires_at: token
                .expires_in
                .map(|d| chrono::Utc::now().timestamp() + d as i64),
        }
    }

    fn is_fresh(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at > chrono::Utc::now().timestamp() + Self::EXPIRY_BUFFER_SECS,
            None => false,
        }
    }
}

/// Token response from Google
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<u64>,
    #[allow(dead_code)]
    token_type: String,
}

fn cached_or_fetch<F>(cache: &Mutex<Option<CachedToken>>, fetch: F) -> Result<String>
where
    F: FnOnce() -> Result<TokenResponse>,
{
    let mut guard = cache
        .lock()
        .map_err(|_| anyhow::anyhow!("Token cache lock poisoned"))?;

    if let Some(token) = guard.as_ref()
        && token.is_fresh()
    {
        return Ok(token.access_token.clone());
    }

    let token = CachedToken::from_response(fetch()?);
    let access_token = token.access_token.clone();
    *guard = Some(token);
    Ok(access_token)
}

/// OAuth2 refresh-token flow for Gmail
///
/// The refresh token is obtained out of band; this type only exchanges it
/// for short-lived access tokens.
pub struct RefreshTokenAuth {
    client_id: String,
    client_secret: String,
    refresh_token: String,
    cache: Mutex<Option<CachedToken>>,
}

impl RefreshTokenAuth {
    const TOKEN_URL: &'static str = "https://oauth2.googleapis.com/token";

    /// Create a new RefreshTokenAuth instance
    ///
    /// # Arguments
    /// * `client_id` - OAuth2 client ID from Google Cloud Console
    /// * `client_secret` - OAuth2 client secret from Google Cloud Console
    /// * `refresh_token` - Long-lived refresh token for the watched account
    pub fn new(client_id: String, client_secret: String, refresh_token: String) -> Self {
        Self {
            client_id,
            client_secret,
            refresh_token,
            cache: Mutex::new(None),
        }
    }

    /// Refresh an access token using the refresh token
    fn refresh_access_token(&self) -> Result<TokenResponse> {
        let response = ureq::post(Self::TOKEN_URL)
            .send_form([
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", self.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .context("Failed to refresh access token")?;

        response
            .into_body()
            .read_json()
            .context("Failed to parse refresh token response")
    }
}

impl TokenProvider for RefreshTokenAuth {
    fn access_token(&self) -> Result<String> {
        cached_or_fetch(&self.cache, || self.refresh_access_token())
    }
}

/// Token of the runtime service account, from the GCE metadata server
///
/// Available inside Cloud Functions / Cloud Run; used for Cloud Storage.
pub struct MetadataServerAuth {
    cache: Mutex<Option<CachedToken>>,
}

impl MetadataServerAuth {
    const TOKEN_URL: &'static str =
        "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

    pub fn new() -> Self {
        Self {
            cache: Mutex::new(None),
        }
    }

    fn fetch_token(&self) -> Result<TokenResponse> {
        let mut response = ureq::get(Self::TOKEN_URL)
            .header("Metadata-Flavor", "Google")
            .call()
            .context("Failed to request metadata server token")?;

        response
            .body_mut()
            .read_json()
            .context("Failed to parse metadata server token")
    }
}

impl Default for MetadataServerAuth {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenProvider for MetadataServerAuth {
    fn access_token(&self) -> Result<String> {
        cached_or_fetch(&self.cache, || self.fetch_token())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn response(token: &str, expires_in: Option<u64>) -> TokenResponse {
        TokenResponse {
            access_token: token.to_string(),
            expires_in,
            token_type: "Bearer".to_string(),
        }
    }

    #[test]
    fn test_static_token() {
        let provider = StaticToken::new("abc");
        assert_eq!(provider.access_token().unwrap(), "abc");
    }

    #[test]
    fn test_cache_reuses_fresh_token() {
        let cache = Mutex::new(None);
        let calls = Cell::new(0);

        for _ in 0..3 {
            let token = cached_or_fetch(&cache, || {
                calls.set(calls.get() + 1);
                Ok(response("fresh", Some(3600)))
            })
            .unwrap();
            assert_eq!(token, "fresh");
        }
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_cache_refreshes_inside_expiry_buffer() {
        let cache = Mutex::new(None);
        let calls = Cell::new(0);

        for _ in 0..2 {
            cached_or_fetch(&cache, || {
                calls.set(calls.get() + 1);
                Ok(response("short", Some(60)))
            })
            .unwrap();
        }
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_cache_propagates_fetch_error() {
        let cache = Mutex::new(None);
        let result = cached_or_fetch(&cache, || Err(anyhow::anyhow!("denied")));
        assert!(result.is_err());
        assert!(cache.lock().unwrap().is_none());
    }
}
