//! Shared access signature tokens for the registry REST API

use base64::{engine::general_purpose, Engine as _};
use errors::{PortalError, PortalResult};
use hmac::{Hmac, Mac};
use parking_lot::Mutex;
use sha2::Sha256;
use url::form_urlencoded;

type HmacSha256 = Hmac<Sha256>;

/// Tokens are renewed this long before they expire
const RENEW_MARGIN_SECS: i64 = 60;

/// Build `SharedAccessSignature sr=..&sig=..&se=..&skn=..`
///
/// The signature is HMAC-SHA256 over `{url-encoded resource}\n{expiry}` keyed
/// with the base64 decoded policy key.
pub fn generate_sas_token(
    resource_uri: &str,
    key_name: &str,
    key_base64: &str,
    expiry: i64,
) -> PortalResult<String> {
    let key = general_purpose::STANDARD
        .decode(key_base64.trim())
        .map_err(|e| PortalError::Authentication(format!("Invalid shared access key: {}", e)))?;

    let encoded_resource: String = form_urlencoded::byte_serialize(resource_uri.to_lowercase().as_bytes()).collect();
    let string_to_sign = format!("{}\n{}", encoded_resource, expiry);

    let mut mac = HmacSha256::new_from_slice(&key)
        .map_err(|e| PortalError::Authentication(format!("HMAC error: {}", e)))?;
    mac.update(string_to_sign.as_bytes());
    let signature = general_purpose::STANDARD.encode(mac.finalize().into_bytes());

    let mut token = form_urlencoded::Serializer::new(String::new());
    token.append_pair("sr", &resource_uri.to_lowercase());
    token.append_pair("sig", &signature);
    token.append_pair("se", &expiry.to_string());
    token.append_pair("skn", key_name);

    Ok(format!("SharedAccessSignature {}", token.finish()))
}

struct CachedToken {
    value: String,
    expires_at: i64,
}

/// Caches the current token until shortly before it expires
pub struct SasTokenProvider {
    resource_uri: String,
    key_name: String,
    key_base64: String,
    ttl_secs: i64,
    cached: Mutex<Option<CachedToken>>,
}

impl SasTokenProvider {
    pub fn new(resource_uri: impl Into<String>, key_name: impl Into<String>, key_base64: impl Into<String>, ttl_secs: u64) -> Self {
        Self {
            resource_uri: resource_uri.into(),
            key_name: key_name.into(),
            key_base64: key_base64.into(),
            ttl_secs: (ttl_secs as i64).max(RENEW_MARGIN_SECS * 2),
            cached: Mutex::new(None),
        }
    }

    /// Token valid at `now` (unix seconds)
    pub fn token_at(&self, now: i64) -> PortalResult<String> {
        let mut cached = self.cached.lock();
        if let Some(token) = cached.as_ref() {
            if token.expires_at - RENEW_MARGIN_SECS > now {
                return Ok(token.value.clone());
            }
        }

        let expires_at = now + self.ttl_secs;
        let value = generate_sas_token(&self.resource_uri, &self.key_name, &self.key_base64, expires_at)?;
        tracing::debug!("SAS token renewed, expires at {}", expires_at);
        *cached = Some(CachedToken {
            value: value.clone(),
            expires_at,
        });
        Ok(value)
    }

    pub fn token(&self) -> PortalResult<String> {
        self.token_at(chrono::Utc::now().timestamp())
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    const KEY: &str = "c2VjcmV0LWtleS1mb3ItdGVzdHM=";

    #[test]
    fn test_token_format() {
        let token = generate_sas_token("Hub.Azure-Devices.net", "service", KEY, 1_700_000_000).unwrap();
        assert!(token.starts_with("SharedAccessSignature sr=hub.azure-devices.net&sig="));
        assert!(token.contains("&se=1700000000"));
        assert!(token.ends_with("&skn=service"));
    }

    #[test]
    fn test_signature_is_deterministic() {
        let a = generate_sas_token("hub", "service", KEY, 10).unwrap();
        let b = generate_sas_token("hub", "service", KEY, 10).unwrap();
        let c = generate_sas_token("hub", "service", KEY, 11).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_invalid_key() {
        let err = generate_sas_token("hub", "service", "not base64!", 10).unwrap_err();
        assert!(matches!(err, PortalError::Authentication(_)));
    }

    #[test]
    fn test_provider_caches_until_renewal() {
        let provider = SasTokenProvider::new("hub", "service", KEY, 3600);
        let first = provider.token_at(1_000).unwrap();
        assert_eq!(provider.token_at(2_000).unwrap(), first);
        // Inside the renewal margin
        let renewed = provider.token_at(1_000 + 3600 - 30).unwrap();
        assert_ne!(renewed, first);
    }
}
