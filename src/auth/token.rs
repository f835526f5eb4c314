//! Stateless session tokens (compact JWS, HS256).
//!
//! A token is `base64url(header).base64url(claims).base64url(mac)` where the
//! MAC is HMAC-SHA256 over the first two segments with the server secret.
//! There is no revocation list: validity is the signature, the expiry, and
//! (checked by the engine) the subject still existing.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::Duration;
use zeroize::Zeroizing;

type HmacSha256 = Hmac<Sha256>;

pub const ALGORITHM: &str = "HS256";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenHeader {
    pub alg: String,
    pub typ: String,
}

impl TokenHeader {
    fn hs256() -> Self {
        Self {
            alg: ALGORITHM.to_string(),
            typ: "JWT".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionClaims {
    /// Identity id.
    pub sub: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub iat: u64,
    pub exp: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("invalid token format")]
    Format,
    #[error("invalid base64url encoding")]
    Base64,
    #[error("invalid json")]
    Json(#[from] serde_json::Error),
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlg(String),
    #[error("invalid signing key")]
    Key,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
}

fn b64e_json<T: Serialize>(value: &T) -> Result<String, TokenError> {
    let json = serde_json::to_vec(value)?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

fn b64d_json<T: for<'de> Deserialize<'de>>(s: &str) -> Result<T, TokenError> {
    let bytes = URL_SAFE_NO_PAD.decode(s).map_err(|_| TokenError::Base64)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Issues and verifies session tokens with one shared secret.
pub struct TokenSigner {
    secret: Zeroizing<Vec<u8>>,
    ttl: Duration,
}

impl TokenSigner {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            secret: Zeroizing::new(secret.to_vec()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn mac(&self) -> Result<HmacSha256, TokenError> {
        HmacSha256::new_from_slice(&self.secret).map_err(|_| TokenError::Key)
    }

    /// Sign a token for `sub` valid from `now` for the configured TTL.
    pub fn issue(
        &self,
        sub: i64,
        email: Option<String>,
        phone: Option<String>,
        now: u64,
    ) -> Result<String, TokenError> {
        let claims = SessionClaims {
            sub,
            email,
            phone,
            iat: now,
            exp: now + self.ttl.as_secs(),
        };

        let header_b64 = b64e_json(&TokenHeader::hs256())?;
        let claims_b64 = b64e_json(&claims)?;
        let signing_input = format!("{header_b64}.{claims_b64}");

        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        let signature_b64 = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(format!("{signing_input}.{signature_b64}"))
    }

    /// Verify a token and return its claims.
    ///
    /// The header must declare exactly `HS256`; anything else is rejected
    /// before the signature is looked at.
    pub fn verify(&self, token: &str, now: u64) -> Result<SessionClaims, TokenError> {
        let mut parts = token.split('.');
        let header_b64 = parts.next().ok_or(TokenError::Format)?;
        let claims_b64 = parts.next().ok_or(TokenError::Format)?;
        let sig_b64 = parts.next().ok_or(TokenError::Format)?;
        if parts.next().is_some() {
            return Err(TokenError::Format);
        }

        let header: TokenHeader = b64d_json(header_b64)?;
        if header.alg != ALGORITHM {
            return Err(TokenError::UnsupportedAlg(header.alg));
        }

        let signature = URL_SAFE_NO_PAD
            .decode(sig_b64)
            .map_err(|_| TokenError::Base64)?;
        let mut mac = self.mac()?;
        mac.update(header_b64.as_bytes());
        mac.update(b".");
        mac.update(claims_b64.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::InvalidSignature)?;

        let claims: SessionClaims = b64d_json(claims_b64)?;
        if now >= claims.exp {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: Duration = Duration::from_secs(86_400);

    fn signer() -> TokenSigner {
        TokenSigner::new(b"test-secret-0123456789", DAY)
    }

    #[test]
    fn test_issue_and_verify() {
        let signer = signer();
        let token = signer
            .issue(42, Some("ann@example.com".to_string()), None, 1_000)
            .unwrap();

        let claims = signer.verify(&token, 1_001).unwrap();
        assert_eq!(claims.sub, 42);
        assert_eq!(claims.email.as_deref(), Some("ann@example.com"));
        assert_eq!(claims.phone, None);
        assert_eq!(claims.exp, 1_000 + 86_400);
    }

    #[test]
    fn test_expired() {
        let signer = signer();
        let token = signer.issue(1, None, None, 1_000).unwrap();

        assert!(signer.verify(&token, 1_000 + 86_399).is_ok());
        assert!(matches!(
            signer.verify(&token, 1_000 + 86_400),
            Err(TokenError::Expired)
        ));
    }

    #[test]
    fn test_wrong_secret() {
        let token = signer().issue(1, None, None, 1_000).unwrap();
        let other = TokenSigner::new(b"another-secret-abcdef", DAY);
        assert!(matches!(
            other.verify(&token, 1_001),
            Err(TokenError::InvalidSignature)
        ));
    }

    #[test]
    fn test_tampered_claims() {
        let signer = signer();
        let token = signer.issue(1, None, None, 1_000).unwrap();
        let parts: Vec<&str> = token.split('.').collect();

        let forged = SessionClaims {
            sub: 2,
            email: None,
            phone: None,
            iat: 1_000,
            exp: 1_000 + 86_400,
        };
        let forged_b64 = b64e_json(&forged).unwrap();
        let tampered = format!("{}.{}.{}", parts[0], forged_b64, parts[2]);

        assert!(matches!(
            signer.verify(&tampered, 1_001),
            Err(TokenError::InvalidSignature)
        ));
    }

    #[test]
    fn test_algorithm_substitution_rejected() {
        let signer = signer();
        let token = signer.issue(1, None, None, 1_000).unwrap();
        let parts: Vec<&str> = token.split('.').collect();

        let none_header = b64e_json(&TokenHeader {
            alg: "none".to_string(),
            typ: "JWT".to_string(),
        })
        .unwrap();
        let unsigned = format!("{}.{}.", none_header, parts[1]);
        assert!(matches!(
            signer.verify(&unsigned, 1_001),
            Err(TokenError::UnsupportedAlg(alg)) if alg == "none"
        ));

        let hs512_header = b64e_json(&TokenHeader {
            alg: "HS512".to_string(),
            typ: "JWT".to_string(),
        })
        .unwrap();
        let swapped = format!("{}.{}.{}", hs512_header, parts[1], parts[2]);
        assert!(matches!(
            signer.verify(&swapped, 1_001),
            Err(TokenError::UnsupportedAlg(_))
        ));
    }

    #[test]
    fn test_malformed() {
        let signer = signer();
        assert!(matches!(signer.verify("", 0), Err(TokenError::Format)));
        assert!(matches!(signer.verify("a.b", 0), Err(TokenError::Format)));
        assert!(matches!(signer.verify("a.b.c.d", 0), Err(TokenError::Format)));
        assert!(matches!(signer.verify("!!.b.c", 0), Err(TokenError::Base64)));
    }
}
