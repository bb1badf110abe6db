use std::sync::Arc;

use jsonwebtoken::jwk::{Jwk, JwkSet, KeyAlgorithm};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use thiserror::Error;

use crate::auth::keyset::{KeySetCache, KeySetError};
use crate::auth::{Claims, Identity};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,
    #[error(transparent)]
    KeySet(#[from] KeySetError),
    #[error("token rejected: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
    #[error("no signing key matches the token")]
    NoMatchingKey,
}

/// Validates bearer tokens against the issuer's signing-key set and the
/// configured audience, and extracts the subject claim.
pub struct TokenVerifier {
    keys: Arc<KeySetCache>,
    audience: String,
}

impl TokenVerifier {
    pub fn new(keys: Arc<KeySetCache>, audience: impl Into<String>) -> Self {
        Self {
            keys,
            audience: audience.into(),
        }
    }

    /// Authenticate the literal value of an `Authorization` header.
    ///
    /// A missing `Bearer ` prefix is tolerated and the remainder is treated
    /// as the token text. Existing clients depend on this, so it is a policy
    /// choice rather than a validation gap.
    pub async fn authenticate(&self, authorization_header: &str) -> Result<Identity, AuthError> {
        let token = authorization_header
            .strip_prefix("Bearer ")
            .unwrap_or(authorization_header)
            .trim();
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }

        let keys = self.keys.current().await?;
        let claims = verify_token(token, &keys, &self.audience)?;

        Ok(Identity(claims.sub))
    }
}

/// Verify `token` against every candidate key in the set, honoring the `kid`
/// header when present. Signature, audience, and time-based claims are all
/// checked; the first key that validates wins.
fn verify_token(token: &str, keys: &JwkSet, audience: &str) -> Result<Claims, AuthError> {
    let header = decode_header(token)?;

    let candidates: Vec<&Jwk> = match header.kid.as_deref() {
        Some(kid) => keys
            .keys
            .iter()
            .filter(|k| k.common.key_id.as_deref() == Some(kid))
            .collect(),
        None => keys.keys.iter().collect(),
    };

    let mut last_err = AuthError::NoMatchingKey;
    for jwk in candidates {
        let decoding_key = match DecodingKey::from_jwk(jwk) {
            Ok(key) => key,
            Err(_) => continue,
        };

        let mut validation = Validation::new(signing_algorithm(jwk, header.alg));
        validation.set_audience(&[audience]);

        match decode::<Claims>(token, &decoding_key, &validation) {
            Ok(data) => return Ok(data.claims),
            Err(err) => last_err = AuthError::InvalidToken(err),
        }
    }

    Err(last_err)
}

/// Algorithm to validate with: the key's own `alg` when it names a signing
/// algorithm, otherwise whatever the token header claims.
fn signing_algorithm(jwk: &Jwk, header_alg: Algorithm) -> Algorithm {
    match jwk.common.key_algorithm {
        Some(KeyAlgorithm::HS256) => Algorithm::HS256,
        Some(KeyAlgorithm::HS384) => Algorithm::HS384,
        Some(KeyAlgorithm::HS512) => Algorithm::HS512,
        Some(KeyAlgorithm::RS256) => Algorithm::RS256,
        Some(KeyAlgorithm::RS384) => Algorithm::RS384,
        Some(KeyAlgorithm::RS512) => Algorithm::RS512,
        Some(KeyAlgorithm::PS256) => Algorithm::PS256,
        Some(KeyAlgorithm::PS384) => Algorithm::PS384,
        Some(KeyAlgorithm::PS512) => Algorithm::PS512,
        Some(KeyAlgorithm::ES256) => Algorithm::ES256,
        Some(KeyAlgorithm::ES384) => Algorithm::ES384,
        Some(KeyAlgorithm::EdDSA) => Algorithm::EdDSA,
        _ => header_alg,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use std::time::Duration;
    use std::time::{SystemTime, UNIX_EPOCH};

    const SECRET: &[u8] = b"a-string-secret-at-least-256-bits-long!!";
    const AUDIENCE: &str = "citadel-app";

    fn test_keys() -> JwkSet {
        serde_json::from_value(serde_json::json!({
            "keys": [{
                "kty": "oct",
                "alg": "HS256",
                "kid": "test",
                "k": "YS1zdHJpbmctc2VjcmV0LWF0LWxlYXN0LTI1Ni1iaXRzLWxvbmchIQ"
            }]
        }))
        .expect("static key set parses")
    }

    fn mint(sub: &str, aud: &str, expires_in_secs: i64, secret: &[u8]) -> String {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock after epoch")
            .as_secs() as i64;
        let claims = serde_json::json!({
            "sub": sub,
            "aud": aud,
            "iat": now,
            "exp": now + expires_in_secs,
        });
        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some("test".to_string());
        encode(&header, &claims, &EncodingKey::from_secret(secret)).expect("token encodes")
    }

    #[test]
    fn test_valid_token_yields_subject() {
        let token = mint("alice", AUDIENCE, 3600, SECRET);
        let claims = verify_token(&token, &test_keys(), AUDIENCE).expect("valid token verifies");
        assert_eq!(claims.sub, "alice");
    }

    #[test]
    fn test_wrong_audience_rejected() {
        let token = mint("alice", "some-other-app", 3600, SECRET);
        assert!(verify_token(&token, &test_keys(), AUDIENCE).is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let token = mint("alice", AUDIENCE, -3600, SECRET);
        assert!(verify_token(&token, &test_keys(), AUDIENCE).is_err());
    }

    #[test]
    fn test_wrong_signature_rejected() {
        let token = mint("alice", AUDIENCE, 3600, b"a-different-secret-that-is-long-enough!!");
        assert!(verify_token(&token, &test_keys(), AUDIENCE).is_err());
    }

    #[test]
    fn test_malformed_token_rejected() {
        assert!(verify_token("not-a-jwt", &test_keys(), AUDIENCE).is_err());
    }

    #[test]
    fn test_unknown_kid_rejected() {
        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some("rotated-away".to_string());
        let claims = serde_json::json!({"sub": "alice", "aud": AUDIENCE, "exp": i64::MAX});
        let token = encode(&header, &claims, &EncodingKey::from_secret(SECRET)).unwrap();
        assert!(matches!(
            verify_token(&token, &test_keys(), AUDIENCE),
            Err(AuthError::NoMatchingKey)
        ));
    }

    #[tokio::test]
    async fn test_authenticate_tolerates_missing_bearer_prefix() {
        let cache = Arc::new(KeySetCache::new(
            "http://127.0.0.1:1/keys",
            Duration::from_secs(300),
            reqwest::Client::new(),
        ));
        cache.prime(test_keys()).await;
        let verifier = TokenVerifier::new(cache, AUDIENCE);

        let token = mint("alice", AUDIENCE, 3600, SECRET);

        let with_prefix = verifier
            .authenticate(&format!("Bearer {token}"))
            .await
            .expect("prefixed header authenticates");
        let without_prefix = verifier
            .authenticate(&token)
            .await
            .expect("bare token authenticates");

        assert_eq!(with_prefix, Identity("alice".to_string()));
        assert_eq!(without_prefix, with_prefix);
    }

    #[tokio::test]
    async fn test_authenticate_rejects_empty_header() {
        let cache = Arc::new(KeySetCache::new(
            "http://127.0.0.1:1/keys",
            Duration::from_secs(300),
            reqwest::Client::new(),
        ));
        cache.prime(test_keys()).await;
        let verifier = TokenVerifier::new(cache, AUDIENCE);

        assert!(matches!(
            verifier.authenticate("").await,
            Err(AuthError::MissingToken)
        ));
    }
}
