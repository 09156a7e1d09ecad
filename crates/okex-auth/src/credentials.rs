//! API credentials and request signing
//!
//! Signatures are `base64(HMAC-SHA256(secret_key, prehash))` where the prehash
//! is `timestamp + METHOD + request_path + body`. A websocket login signs
//! `timestamp + "GET" + "/users/self/verify"`.
//!
//! # Security
//!
//! The secret key and passphrase are stored using the `secrecy` crate, so
//! they are zeroized on drop and never show up in `Debug` output.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;

use crate::error::{AuthError, AuthResult};

type HmacSha256 = Hmac<Sha256>;

/// Request path signed by a websocket login
pub const LOGIN_PATH: &str = "/users/self/verify";

/// HTTP method signed by a websocket login
pub const LOGIN_METHOD: &str = "GET";

/// Build the string a request signature covers
pub fn prehash(timestamp: &str, method: &str, request_path: &str, body: &str) -> String {
    format!(
        "{}{}{}{}",
        timestamp,
        method.to_ascii_uppercase(),
        request_path,
        body
    )
}

/// Epoch seconds with millisecond precision, e.g. `1538054050.975`
pub fn epoch_timestamp() -> String {
    format_epoch(Utc::now())
}

fn format_epoch(at: DateTime<Utc>) -> String {
    format!("{}.{:03}", at.timestamp(), at.timestamp_subsec_millis())
}

/// Arguments of a login control frame, in wire order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginParams {
    /// API key
    pub api_key: String,
    /// Passphrase chosen when the key was created
    pub passphrase: String,
    /// Epoch timestamp that was signed
    pub timestamp: String,
    /// Base64 signature
    pub signature: String,
}

/// API credentials for authenticated sessions
pub struct Credentials {
    api_key: String,
    secret_key: SecretString,
    passphrase: SecretString,
}

impl Credentials {
    /// Create credentials from API key, secret key and passphrase
    pub fn new(
        api_key: impl Into<String>,
        secret_key: impl Into<String>,
        passphrase: impl Into<String>,
    ) -> AuthResult<Self> {
        let api_key = api_key.into();
        let secret_key = secret_key.into();
        if api_key.is_empty() {
            return Err(AuthError::InvalidCredentials("empty API key".to_string()));
        }
        if secret_key.is_empty() {
            return Err(AuthError::InvalidCredentials("empty secret key".to_string()));
        }

        Ok(Self {
            api_key,
            secret_key: SecretString::from(secret_key),
            passphrase: SecretString::from(passphrase.into()),
        })
    }

    /// Create credentials from environment variables
    ///
    /// Reads `OKEX_API_KEY`, `OKEX_SECRET_KEY` and `OKEX_PASSPHRASE`.
    pub fn from_env() -> AuthResult<Self> {
        let var = |name: &str| {
            std::env::var(name).map_err(|_| AuthError::EnvVarNotSet(name.to_string()))
        };

        Self::new(
            var("OKEX_API_KEY")?,
            var("OKEX_SECRET_KEY")?,
            var("OKEX_PASSPHRASE")?,
        )
    }

    /// Get the API key
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Sign a prehash string
    pub fn sign(&self, prehash: &str) -> AuthResult<String> {
        let mut mac = HmacSha256::new_from_slice(self.secret_key.expose_secret().as_bytes())
            .map_err(|e| AuthError::InvalidCredentials(e.to_string()))?;
        mac.update(prehash.as_bytes());
        Ok(BASE64.encode(mac.finalize().into_bytes()))
    }

    /// Sign a REST-style request
    pub fn sign_request(
        &self,
        timestamp: &str,
        method: &str,
        request_path: &str,
        body: &str,
    ) -> AuthResult<String> {
        self.sign(&prehash(timestamp, method, request_path, body))
    }

    /// Login arguments signed at the given timestamp
    pub fn login_params_at(&self, timestamp: &str) -> AuthResult<LoginParams> {
        let signature = self.sign_request(timestamp, LOGIN_METHOD, LOGIN_PATH, "")?;
        tracing::debug!(api_key = %self.redacted_key(), "signed login request");

        Ok(LoginParams {
            api_key: self.api_key.clone(),
            passphrase: self.passphrase.expose_secret().to_string(),
            timestamp: timestamp.to_string(),
            signature,
        })
    }

    /// Login arguments signed now
    pub fn login_params(&self) -> AuthResult<LoginParams> {
        self.login_params_at(&epoch_timestamp())
    }

    fn redacted_key(&self) -> String {
        let prefix: String = self.api_key.chars().take(8).collect();
        format!("{}...", prefix)
    }
}

impl Clone for Credentials {
    fn clone(&self) -> Self {
        Self {
            api_key: self.api_key.clone(),
            secret_key: SecretString::from(self.secret_key.expose_secret().to_string()),
            passphrase: SecretString::from(self.passphrase.expose_secret().to_string()),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.redacted_key())
            .field("secret_key", &"[REDACTED]")
            .field("passphrase", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn creds() -> Credentials {
        Credentials::new("test_api_key", "test_secret_key", "test_passphrase").unwrap()
    }

    #[test]
    fn test_prehash() {
        assert_eq!(
            prehash("1538054050.975", "get", LOGIN_PATH, ""),
            "1538054050.975GET/users/self/verify"
        );
        assert_eq!(
            prehash("1", "POST", "/api/spot/v3/orders", "{\"a\":1}"),
            "1POST/api/spot/v3/orders{\"a\":1}"
        );
    }

    #[test]
    fn test_epoch_format() {
        let at = Utc.timestamp_millis_opt(1_538_054_050_975).unwrap();
        assert_eq!(format_epoch(at), "1538054050.975");

        let at = Utc.timestamp_millis_opt(1_538_054_050_005).unwrap();
        assert_eq!(format_epoch(at), "1538054050.005");
    }

    #[test]
    fn test_signature_matches_manual_hmac() {
        let creds = creds();
        let signature = creds.sign("1538054050.975GET/users/self/verify").unwrap();

        let mut mac = HmacSha256::new_from_slice(b"test_secret_key").unwrap();
        mac.update(b"1538054050.975GET/users/self/verify");
        let expected = BASE64.encode(mac.finalize().into_bytes());

        assert_eq!(signature, expected);
        assert_eq!(BASE64.decode(&signature).unwrap().len(), 32);
    }

    #[test]
    fn test_login_params() {
        let params = creds().login_params_at("1538054050.975").unwrap();
        assert_eq!(params.api_key, "test_api_key");
        assert_eq!(params.passphrase, "test_passphrase");
        assert_eq!(params.timestamp, "1538054050.975");
        assert_eq!(
            params.signature,
            creds().sign("1538054050.975GET/users/self/verify").unwrap()
        );
    }

    #[test]
    fn test_credentials_debug_redacts_secrets() {
        let debug = format!("{:?}", creds());
        assert!(!debug.contains("test_secret_key"));
        assert!(!debug.contains("test_passphrase"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_empty_key_rejected() {
        assert!(Credentials::new("", "secret", "pass").is_err());
        assert!(Credentials::new("key", "", "pass").is_err());
    }

    #[test]
    fn test_clone_signs_identically() {
        let a = creds();
        let b = a.clone();
        assert_eq!(a.sign("x").unwrap(), b.sign("x").unwrap());
    }
}
