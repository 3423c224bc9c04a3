use std::collections::HashMap;

use thiserror::Error;

use crate::session::AuthClaims;

/// The identity collaborator declined a token
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct AuthRejected {
    pub reason: String,
}

/// Verifies the credentials a client presents when joining. A client that
/// presents no token is a guest unless the provider says otherwise.
pub trait IdentityProvider: Send + Sync {
    fn verify(&self, token: Option<&str>) -> Result<AuthClaims, AuthRejected>;
}

/// Accepts everyone as a guest
#[derive(Clone, Copy, Debug, Default)]
pub struct GuestIdentity;

impl IdentityProvider for GuestIdentity {
    fn verify(&self, _token: Option<&str>) -> Result<AuthClaims, AuthRejected> {
        Ok(AuthClaims::Guest)
    }
}

/// Fixed table of tokens issued elsewhere. Clients without a token join as
/// guests; unknown tokens are rejected.
#[derive(Clone, Debug, Default)]
pub struct TokenTable {
    tokens: HashMap<String, AuthClaims>,
}

impl TokenTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, token: &str, claims: AuthClaims) -> Self {
        self.tokens.insert(token.to_string(), claims);
        self
    }
}

impl IdentityProvider for TokenTable {
    fn verify(&self, token: Option<&str>) -> Result<AuthClaims, AuthRejected> {
        let Some(token) = token else {
            return Ok(AuthClaims::Guest);
        };
        self.tokens.get(token).cloned().ok_or_else(|| AuthRejected {
            reason: "unknown token".to_string(),
        })
    }
}
