use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use uuid::Uuid;

use crate::auth::claims::Claims;
use crate::auth::{AuthError, AuthResult};

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct TokenEnvelope {
    #[serde(flatten)]
    claims: Claims,
    iat: i64,
    exp: i64,
    jti: String,
}

#[derive(Debug, Clone)]
pub struct SignedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Signs and verifies compact HS256 tokens. The codec holds no keys; callers
/// pass the secret for the token kind they expect.
#[derive(Debug, Clone)]
pub struct TokenCodec {
    algorithm: Algorithm,
    validation: Validation,
}

impl Default for TokenCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenCodec {
    pub fn new() -> Self {
        let algorithm = Algorithm::HS256;
        let mut validation = Validation::new(algorithm);
        // Expiry is checked against our own clock in `verify_at`.
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.required_spec_claims = HashSet::from(["exp".to_string()]);

        Self {
            algorithm,
            validation,
        }
    }

    pub fn issue(&self, claims: &Claims, secret: &str, lifetime: Duration) -> AuthResult<SignedToken> {
        self.issue_at(claims, secret, lifetime, Utc::now())
    }

    pub fn issue_at(
        &self,
        claims: &Claims,
        secret: &str,
        lifetime: Duration,
        now: DateTime<Utc>,
    ) -> AuthResult<SignedToken> {
        let expires_at = now
            .checked_add_signed(lifetime)
            .ok_or_else(|| AuthError::Config("token lifetime overflows the clock".into()))?;
        let envelope = TokenEnvelope {
            claims: claims.clone(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        let token = encode(
            &Header::new(self.algorithm),
            &envelope,
            &EncodingKey::from_secret(secret.as_bytes()),
        )?;

        Ok(SignedToken { token, expires_at })
    }

    /// Every failure, whether signature, shape, payload or expiry, is reported
    /// as [`AuthError::InvalidToken`].
    pub fn verify(&self, token: &str, secret: &str) -> AuthResult<Claims> {
        self.verify_at(token, secret, Utc::now())
    }

    pub fn verify_at(&self, token: &str, secret: &str, now: DateTime<Utc>) -> AuthResult<Claims> {
        let data = decode::<TokenEnvelope>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &self.validation,
        )
        .map_err(|err| {
            log::debug!("token rejected: {}", err);
            AuthError::InvalidToken
        })?;

        if now.timestamp() >= data.claims.exp {
            log::debug!("token rejected: expired");
            return Err(AuthError::InvalidToken);
        }

        Ok(data.claims.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::claims::Role;
    use crate::auth::config::TokenKind;
    use crate::test_support::auth_config;

    fn doctor_claims() -> Claims {
        Claims::new("doc@x.com", Role::Doctor).expect("claims")
    }

    #[test]
    fn verifies_payload_until_expiry() {
        let codec = TokenCodec::new();
        let now = Utc::now();
        let issued = codec
            .issue_at(&doctor_claims(), "secret-a", Duration::seconds(60), now)
            .expect("issue");

        let claims = codec
            .verify_at(&issued.token, "secret-a", now + Duration::seconds(59))
            .expect("verify before expiry");
        assert_eq!(claims, doctor_claims());
        assert_eq!(issued.expires_at.timestamp(), (now + Duration::seconds(60)).timestamp());

        let at_expiry = codec.verify_at(&issued.token, "secret-a", now + Duration::seconds(60));
        assert!(matches!(at_expiry, Err(AuthError::InvalidToken)));

        let after_expiry = codec.verify_at(&issued.token, "secret-a", now + Duration::hours(1));
        assert!(matches!(after_expiry, Err(AuthError::InvalidToken)));
    }

    #[test]
    fn keeps_optional_user_id() {
        let codec = TokenCodec::new();
        let claims = doctor_claims().with_user_id("42");
        let issued = codec
            .issue(&claims, "secret-a", Duration::minutes(5))
            .expect("issue");
        let verified = codec.verify(&issued.token, "secret-a").expect("verify");
        assert_eq!(verified.user_id(), Some("42"));
    }

    #[test]
    fn lifetime_past_the_clock_range_is_an_error() {
        let codec = TokenCodec::new();
        let huge = Duration::try_seconds(1_000_000_000_000_000).expect("representable duration");
        assert!(matches!(
            codec.issue(&doctor_claims(), "secret-a", huge),
            Err(AuthError::Config(_))
        ));
    }

    #[test]
    fn keeps_password_fingerprint() {
        let codec = TokenCodec::new();
        let claims = doctor_claims().with_password_fingerprint("fp-1");
        let issued = codec
            .issue(&claims, "secret-a", Duration::minutes(5))
            .expect("issue");
        let verified = codec.verify(&issued.token, "secret-a").expect("verify");
        assert_eq!(verified.password_fingerprint(), Some("fp-1"));
    }

    #[test]
    fn token_never_verifies_under_another_kinds_secret() {
        let codec = TokenCodec::new();
        let config = auth_config();

        for minted in TokenKind::ALL {
            let issued = codec
                .issue(&doctor_claims(), config.secret(minted), config.ttl(minted))
                .expect("issue");
            for expected in TokenKind::ALL {
                let result = codec.verify(&issued.token, config.secret(expected));
                if minted == expected {
                    assert!(result.is_ok(), "{:?} should verify", minted);
                } else {
                    assert!(
                        matches!(result, Err(AuthError::InvalidToken)),
                        "{:?} token verified under {:?} secret",
                        minted,
                        expected
                    );
                }
            }
        }
    }

    #[test]
    fn rejects_garbage_and_tampered_tokens() {
        let codec = TokenCodec::new();
        assert!(matches!(
            codec.verify("not-a-token", "secret-a"),
            Err(AuthError::InvalidToken)
        ));

        let issued = codec
            .issue(&doctor_claims(), "secret-a", Duration::minutes(5))
            .expect("issue");
        let mut parts: Vec<&str> = issued.token.split('.').collect();
        let forged_payload = {
            use base64::Engine as _;
            base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(
                br#"{"email":"admin@x.com","role":"ADMIN","iat":0,"exp":9999999999,"jti":"x"}"#,
            )
        };
        parts[1] = &forged_payload;
        let forged = parts.join(".");
        assert!(matches!(
            codec.verify(&forged, "secret-a"),
            Err(AuthError::InvalidToken)
        ));
    }
}
