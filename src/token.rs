// 🔑 Admin Tokens - HMAC-SHA256 signed bearer tokens for the admin proxy
//
// Format: base64url(JSON claims) "." base64url(HMAC-SHA256(secret, first segment))
// Both segments are unpadded. `exp` is a unix timestamp in seconds.

use crate::context::{AdminRole, RequestContext};
use crate::error::{AdminError, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Shortest accepted signing secret, in bytes
pub const MIN_SECRET_LEN: usize = 32;

/// Longest accepted token lifetime (one year)
const MAX_TTL_SECS: i64 = 365 * 24 * 3600;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminClaims {
    pub admin_id: String,
    pub role: AdminRole,
    #[serde(default)]
    pub division_id: Option<String>,
    #[serde(default)]
    pub additional_division_ids: Vec<String>,
    #[serde(default)]
    pub access_all_divisions: bool,
    pub iat: i64,
    pub exp: i64,
}

impl AdminClaims {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.exp <= now.timestamp()
    }

    pub fn into_context(self, token: &str) -> RequestContext {
        RequestContext {
            role: self.role,
            division_id: self.division_id,
            additional_division_ids: self.additional_division_ids,
            access_all_divisions: self.access_all_divisions,
            token: Some(token.to_string()),
        }
    }
}

#[derive(Clone)]
pub struct AdminTokenSigner {
    secret: Vec<u8>,
    ttl: Duration,
}

impl std::fmt::Debug for AdminTokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminTokenSigner")
            .field("secret", &"<redacted>")
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl AdminTokenSigner {
    pub fn new(secret: &[u8], ttl_secs: u64) -> Result<Self> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(AdminError::Config(format!(
                "token secret must be at least {} bytes",
                MIN_SECRET_LEN
            )));
        }

        Ok(AdminTokenSigner {
            secret: secret.to_vec(),
            ttl: Duration::seconds(i64::try_from(ttl_secs).unwrap_or(MAX_TTL_SECS).min(MAX_TTL_SECS)),
        })
    }

    fn mac(&self) -> Result<HmacSha256> {
        HmacSha256::new_from_slice(&self.secret).map_err(|e| AdminError::Config(e.to_string()))
    }

    /// Sign a token for `ctx`, valid from `now` for the configured TTL
    pub fn issue(&self, admin_id: &str, ctx: &RequestContext, now: DateTime<Utc>) -> Result<String> {
        let claims = AdminClaims {
            admin_id: admin_id.to_string(),
            role: ctx.role,
            division_id: ctx.division_id.clone(),
            additional_division_ids: ctx.additional_division_ids.clone(),
            access_all_divisions: ctx.access_all_divisions,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        self.sign(&claims)
    }

    pub fn sign(&self, claims: &AdminClaims) -> Result<String> {
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims)?);

        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(format!("{}.{}", payload, signature))
    }

    /// Check signature and expiry. Errors are always `Unauthorized`.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<AdminClaims> {
        let invalid = || AdminError::Unauthorized("Invalid admin token".to_string());

        let (payload, signature) = token.trim().split_once('.').ok_or_else(invalid)?;
        let signature = URL_SAFE_NO_PAD.decode(signature).map_err(|_| invalid())?;

        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature).map_err(|_| invalid())?;

        let bytes = URL_SAFE_NO_PAD.decode(payload).map_err(|_| invalid())?;
        let claims: AdminClaims = serde_json::from_slice(&bytes).map_err(|_| invalid())?;

        if claims.is_expired_at(now) {
            return Err(AdminError::Unauthorized("Admin token expired".to_string()));
        }

        Ok(claims)
    }

    /// Header value → caller context; a missing header is rejected
    pub fn authenticate(&self, header: Option<&str>, now: DateTime<Utc>) -> Result<RequestContext> {
        let token = header
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AdminError::Unauthorized("Missing admin token".to_string()))?;

        Ok(self.verify(token, now)?.into_context(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";

    fn signer() -> AdminTokenSigner {
        AdminTokenSigner::new(SECRET, 3600).unwrap()
    }

    #[test]
    fn test_round_trip() {
        let now = Utc::now();
        let ctx = RequestContext::division_admin("d1").with_additional_divisions(["d2"]);
        let token = signer().issue("adm1", &ctx, now).unwrap();

        let claims = signer().verify(&token, now).unwrap();
        assert_eq!(claims.admin_id, "adm1");
        assert_eq!(claims.division_id.as_deref(), Some("d1"));
        assert_eq!(claims.exp - claims.iat, 3600);

        let restored = signer().authenticate(Some(&token), now).unwrap();
        assert_eq!(restored.additional_division_ids, vec!["d2".to_string()]);
        assert_eq!(restored.token.as_deref(), Some(token.as_str()));
    }

    #[test]
    fn test_forged_payload_rejected() {
        let now = Utc::now();
        let token = signer().issue("adm1", &RequestContext::division_admin("d1"), now).unwrap();
        let (_, signature) = token.split_once('.').unwrap();

        let forged_claims = AdminClaims {
            admin_id: "adm1".into(),
            role: AdminRole::SuperAdmin,
            division_id: None,
            additional_division_ids: vec![],
            access_all_divisions: true,
            iat: now.timestamp(),
            exp: now.timestamp() + 3600,
        };
        let forged_payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged_claims).unwrap());
        let forged = format!("{}.{}", forged_payload, signature);

        let err = signer().verify(&forged, now).unwrap_err();
        assert_eq!(err.to_string(), "Invalid admin token");
    }

    #[test]
    fn test_other_secret_rejected() {
        let now = Utc::now();
        let other = AdminTokenSigner::new(b"ffffffffffffffffffffffffffffffff", 3600).unwrap();
        let token = other.issue("adm1", &RequestContext::super_admin(), now).unwrap();
        assert!(signer().verify(&token, now).is_err());
    }

    #[test]
    fn test_expired_token() {
        let issued = Utc::now();
        let token = signer().issue("adm1", &RequestContext::super_admin(), issued).unwrap();
        let later = issued + Duration::seconds(3601);

        let err = signer().verify(&token, later).unwrap_err();
        assert_eq!(err.to_string(), "Admin token expired");
        assert_eq!(err.status_code(), 401);
    }

    #[test]
    fn test_malformed_and_missing() {
        let now = Utc::now();
        assert!(signer().verify("not-a-token", now).is_err());
        assert!(signer().verify("abc.!!!", now).is_err());

        let err = signer().authenticate(None, now).unwrap_err();
        assert_eq!(err.to_string(), "Missing admin token");
        assert!(signer().authenticate(Some("  "), now).is_err());
    }

    #[test]
    fn test_short_secret_rejected() {
        assert!(matches!(
            AdminTokenSigner::new(b"short", 60),
            Err(AdminError::Config(_))
        ));
    }
}
