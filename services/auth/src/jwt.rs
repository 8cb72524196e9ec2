//! Access token claim inspection
//!
//! The client never verifies token signatures, the backend does. It only
//! reads the `scope` claim to learn the role granted at login.

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::Deserialize;
use thiserror::Error;

use crate::session::Role;

/// Claims the client cares about
#[derive(Debug, Clone, Deserialize)]
pub struct AccessClaims {
    pub sub: Option<String>,
    pub scope: Option<String>,
    pub exp: Option<u64>,
}

#[derive(Error, Debug)]
pub enum JwtError {
    #[error("malformed access token: {0}")]
    Malformed(#[from] jsonwebtoken::errors::Error),

    #[error("access token carries no scope claim")]
    MissingScope,
}

/// Decode the claims of `token` without checking signature or expiry
pub fn inspect(token: &str) -> Result<AccessClaims, JwtError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let data = decode::<AccessClaims>(token, &DecodingKey::from_secret(&[]), &validation)?;
    Ok(data.claims)
}

/// Role carried by the `scope` claim of an access token
pub fn role_from_token(token: &str) -> Result<Role, JwtError> {
    inspect(token)?
        .scope
        .map(|scope| scope.trim().to_string())
        .filter(|scope| !scope.is_empty())
        .map(Role::from)
        .ok_or(JwtError::MissingScope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde_json::json;

    fn token(claims: serde_json::Value) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"backend-secret"),
        )
        .unwrap()
    }

    #[test]
    fn test_role_from_scope_claim() {
        let access = token(json!({"sub": "reader@library.test", "scope": "ROLE_ADMIN", "exp": 1}));
        assert_eq!(role_from_token(&access).unwrap(), Role::new("ROLE_ADMIN"));
    }

    #[test]
    fn test_expired_token_is_still_readable() {
        let access = token(json!({"scope": "ROLE_USER", "exp": 1, "aud": "library"}));
        let claims = inspect(&access).unwrap();
        assert_eq!(claims.exp, Some(1));
        assert_eq!(claims.scope.as_deref(), Some("ROLE_USER"));
    }

    #[test]
    fn test_missing_scope() {
        let access = token(json!({"sub": "reader@library.test"}));
        assert!(matches!(
            role_from_token(&access),
            Err(JwtError::MissingScope)
        ));
    }

    #[test]
    fn test_garbage_is_malformed() {
        assert!(matches!(inspect("not-a-jwt"), Err(JwtError::Malformed(_))));
    }
}
