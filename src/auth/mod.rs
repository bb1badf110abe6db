pub mod keyset;
pub mod verifier;

pub use keyset::{KeySetCache, KeySetError};
pub use verifier::{AuthError, TokenVerifier};

use serde::Deserialize;

/// Verified caller identity, attached to the request's extensions by the
/// authentication middleware for the duration of the call. Never persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity(pub String);

impl Identity {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Claims read out of a verified token. Audience and expiry are enforced by
/// the verifier; only the subject is carried forward.
#[derive(Debug, Deserialize)]
pub struct Claims {
    pub sub: String,
}
