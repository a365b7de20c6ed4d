//! Access token signing and verification
//!
//! Tokens are compact JWS strings signed with ES256 (ECDSA P-256 / SHA-256):
//! `base64url(header).base64url(claims).base64url(r || s)`.
//! Timestamps are whole Unix seconds.

use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use p256::ecdsa::{
    signature::{Signer, Verifier},
    Signature,
};
use serde::{Deserialize, Serialize};

use crate::error::TokenError;
use crate::keys::KeyMaterial;

const ALGORITHM: &str = "ES256";

/// Default access token lifetime (15 minutes)
pub const DEFAULT_ACCESS_TOKEN_TTL_SECS: i64 = 15 * 60;

#[derive(Debug, Serialize, Deserialize)]
struct JwtHeader {
    alg: String,
    typ: String,
}

impl Default for JwtHeader {
    fn default() -> Self {
        Self {
            alg: ALGORITHM.to_string(),
            typ: "JWT".to_string(),
        }
    }
}

/// Claims carried by an access token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (username)
    pub sub: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration (Unix timestamp)
    pub exp: i64,
    /// Unique token id
    pub jti: String,
}

/// A freshly minted access token
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: Claims,
    pub expires_at: DateTime<Utc>,
}

/// Signs and verifies access tokens with the process key pair.
#[derive(Debug, Clone)]
pub struct TokenCodec {
    keys: Arc<KeyMaterial>,
    ttl: Duration,
}

impl TokenCodec {
    pub fn new(keys: Arc<KeyMaterial>, ttl: Duration) -> Self {
        Self { keys, ttl }
    }

    /// Configured access token lifetime
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Sign a token for `subject` valid from now for the configured TTL.
    pub fn issue(&self, subject: &str) -> Result<IssuedToken, TokenError> {
        self.sign(subject, Utc::now(), self.ttl)
    }

    /// Sign a token for `subject` issued at `now` and expiring at `now + ttl`.
    pub fn sign(
        &self,
        subject: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<IssuedToken, TokenError> {
        let expires_at = now
            .checked_add_signed(ttl)
            .ok_or_else(|| TokenError::Encode("token lifetime out of range".to_string()))?;
        let iat = now.timestamp();
        let exp = iat + ttl.num_seconds();

        let claims = Claims {
            sub: subject.to_string(),
            iat,
            exp,
            jti: uuid::Uuid::new_v4().to_string(),
        };

        let header_json =
            serde_json::to_vec(&JwtHeader::default()).map_err(|e| TokenError::Encode(e.to_string()))?;
        let claims_json =
            serde_json::to_vec(&claims).map_err(|e| TokenError::Encode(e.to_string()))?;

        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header_json),
            URL_SAFE_NO_PAD.encode(claims_json)
        );

        let signature: Signature = self.keys.private_key().sign(signing_input.as_bytes());
        let token = format!(
            "{}.{}",
            signing_input,
            URL_SAFE_NO_PAD.encode(signature.to_bytes())
        );

        Ok(IssuedToken {
            token,
            expires_at,
            claims,
        })
    }

    /// Verify a token against the public key and the current time.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify_at(token, Utc::now())
    }

    /// Verify a token as of `now`.
    ///
    /// Structure is checked first, then the signature, then expiry, so an
    /// expired token is only reported as `Expired` if it was genuinely ours.
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, TokenError> {
        let parts: Vec<&str> = token.split('.').collect();
        if parts.len() != 3 {
            return Err(TokenError::Malformed);
        }

        let (header_b64, payload_b64, signature_b64) = (parts[0], parts[1], parts[2]);

        let header_bytes = URL_SAFE_NO_PAD
            .decode(header_b64)
            .map_err(|_| TokenError::Malformed)?;
        let header: JwtHeader =
            serde_json::from_slice(&header_bytes).map_err(|_| TokenError::Malformed)?;
        if header.alg != ALGORITHM {
            return Err(TokenError::Malformed);
        }

        let signature_bytes = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| TokenError::Malformed)?;
        let signature =
            Signature::from_slice(&signature_bytes).map_err(|_| TokenError::Malformed)?;

        let signing_input = &token[..header_b64.len() + 1 + payload_b64.len()];
        self.keys
            .public_key()
            .verify(signing_input.as_bytes(), &signature)
            .map_err(|_| TokenError::InvalidSignature)?;

        let payload_bytes = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| TokenError::Malformed)?;
        let claims: Claims =
            serde_json::from_slice(&payload_bytes).map_err(|_| TokenError::Malformed)?;

        if claims.exp <= now.timestamp() {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn codec() -> TokenCodec {
        TokenCodec::new(
            Arc::new(KeyMaterial::generate("test")),
            Duration::seconds(DEFAULT_ACCESS_TOKEN_TTL_SECS),
        )
    }

    #[test]
    fn test_sign_and_verify() {
        let codec = codec();
        let issued = codec.issue("alice").unwrap();

        let claims = codec.verify(&issued.token).unwrap();
        assert_eq!(claims.sub, "alice");
        assert_eq!(claims.exp - claims.iat, DEFAULT_ACCESS_TOKEN_TTL_SECS);
        assert_eq!(claims, issued.claims);
    }

    #[test]
    fn test_token_format() {
        let issued = codec().issue("alice").unwrap();

        let parts: Vec<&str> = issued.token.split('.').collect();
        assert_eq!(parts.len(), 3);

        let header_bytes = URL_SAFE_NO_PAD.decode(parts[0]).unwrap();
        let header: JwtHeader = serde_json::from_slice(&header_bytes).unwrap();
        assert_eq!(header.alg, "ES256");
        assert_eq!(header.typ, "JWT");

        let signature = URL_SAFE_NO_PAD.decode(parts[2]).unwrap();
        assert_eq!(signature.len(), 64);
    }

    #[test]
    fn test_tokens_in_same_second_differ() {
        let codec = codec();
        let now = Utc::now();
        let a = codec.sign("alice", now, codec.ttl()).unwrap();
        let b = codec.sign("alice", now, codec.ttl()).unwrap();
        assert_ne!(a.token, b.token);
    }

    #[test]
    fn test_wrong_key() {
        let issued = codec().issue("alice").unwrap();
        let result = codec().verify(&issued.token);
        assert_eq!(result, Err(TokenError::InvalidSignature));
    }

    #[test]
    fn test_expired() {
        let codec = codec();
        let issued_at = Utc::now() - Duration::hours(1);
        let issued = codec.sign("alice", issued_at, Duration::minutes(15)).unwrap();

        assert_eq!(codec.verify(&issued.token), Err(TokenError::Expired));
    }

    #[test]
    fn test_expiry_boundary() {
        let codec = codec();
        let now = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
        let issued = codec.sign("alice", now, Duration::seconds(60)).unwrap();

        assert!(codec
            .verify_at(&issued.token, now + Duration::seconds(59))
            .is_ok());
        assert_eq!(
            codec.verify_at(&issued.token, now + Duration::seconds(60)),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn test_malformed() {
        let codec = codec();
        assert_eq!(codec.verify("invalid-token"), Err(TokenError::Malformed));
        assert_eq!(codec.verify("a.b.c"), Err(TokenError::Malformed));
        assert_eq!(codec.verify(""), Err(TokenError::Malformed));
    }

    #[test]
    fn test_rejects_other_algorithms() {
        let codec = codec();
        let issued = codec.issue("alice").unwrap();
        let parts: Vec<&str> = issued.token.split('.').collect();

        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
        let forged = format!("{}.{}.{}", header, parts[1], parts[2]);
        assert_eq!(codec.verify(&forged), Err(TokenError::Malformed));
    }

    #[test]
    fn test_swapped_payload_fails_signature() {
        let codec = codec();
        let alice = codec.issue("alice").unwrap();
        let mallory = codec.issue("mallory").unwrap();

        let a: Vec<&str> = alice.token.split('.').collect();
        let m: Vec<&str> = mallory.token.split('.').collect();
        let spliced = format!("{}.{}.{}", a[0], m[1], a[2]);

        assert_eq!(codec.verify(&spliced), Err(TokenError::InvalidSignature));
    }

    #[test]
    fn test_out_of_range_ttl_is_an_error() {
        let codec = TokenCodec::new(
            Arc::new(KeyMaterial::generate("test")),
            Duration::days(100_000_000),
        );

        assert!(matches!(codec.issue("alice"), Err(TokenError::Encode(_))));
    }
}
