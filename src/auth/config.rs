use chrono::Duration;

use crate::auth::{AuthError, AuthResult};

/// Purpose a token was minted for. Each kind is signed with its own secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Access,
    Refresh,
    Reset,
}

impl TokenKind {
    pub const ALL: [TokenKind; 3] = [TokenKind::Access, TokenKind::Refresh, TokenKind::Reset];

    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
            TokenKind::Reset => "reset",
        }
    }
}

/// Upper bound for any token lifetime: ten years.
pub const MAX_TOKEN_TTL_SECS: i64 = 10 * 365 * 24 * 60 * 60;

/// Authentication configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub reset_secret: String,
    pub access_token_ttl_secs: i64,
    pub refresh_token_ttl_secs: i64,
    pub reset_token_ttl_secs: i64,
    pub reset_password_link: String,
    pub access_cookie_name: String,
    pub refresh_cookie_name: String,
    pub cookie_domain: Option<String>,
    pub cookie_secure: bool,
    pub mail_relay_url: Option<String>,
    pub mail_from: String,
}

impl AuthConfig {
    pub fn from_env() -> AuthResult<Self> {
        let config = Self {
            access_secret: required_secret("CARE_JWT_ACCESS_SECRET")?,
            refresh_secret: required_secret("CARE_JWT_REFRESH_SECRET")?,
            reset_secret: required_secret("CARE_JWT_RESET_SECRET")?,
            access_token_ttl_secs: env_i64("CARE_ACCESS_TOKEN_TTL_SECS", 60 * 60),
            refresh_token_ttl_secs: env_i64("CARE_REFRESH_TOKEN_TTL_SECS", 90 * 24 * 60 * 60),
            reset_token_ttl_secs: env_i64("CARE_RESET_TOKEN_TTL_SECS", 15 * 60),
            reset_password_link: std::env::var("CARE_RESET_PASSWORD_LINK")
                .unwrap_or_else(|_| "http://localhost:3000/reset-password".into()),
            access_cookie_name: std::env::var("CARE_ACCESS_COOKIE_NAME")
                .unwrap_or_else(|_| "accessToken".into()),
            refresh_cookie_name: std::env::var("CARE_REFRESH_COOKIE_NAME")
                .unwrap_or_else(|_| "refreshToken".into()),
            cookie_domain: std::env::var("CARE_COOKIE_DOMAIN").ok(),
            cookie_secure: std::env::var("CARE_COOKIE_SECURE")
                .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "on"))
                .unwrap_or(true),
            mail_relay_url: std::env::var("CARE_MAIL_RELAY_URL")
                .ok()
                .filter(|url| !url.trim().is_empty()),
            mail_from: std::env::var("CARE_MAIL_FROM")
                .unwrap_or_else(|_| "no-reply@localhost".into()),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations where two token kinds would share a key or a
    /// lifetime falls outside `1..=MAX_TOKEN_TTL_SECS`.
    pub fn validate(&self) -> AuthResult<()> {
        for kind in TokenKind::ALL {
            if self.secret(kind).is_empty() {
                return Err(AuthError::Config(format!(
                    "{} token secret must not be empty",
                    kind.as_str()
                )));
            }
            let secs = self.ttl_secs(kind);
            if !(1..=MAX_TOKEN_TTL_SECS).contains(&secs) {
                return Err(AuthError::Config(format!(
                    "{} token lifetime must be between 1 and {} seconds, got {}",
                    kind.as_str(),
                    MAX_TOKEN_TTL_SECS,
                    secs
                )));
            }
        }

        let secrets = [&self.access_secret, &self.refresh_secret, &self.reset_secret];
        for (i, a) in secrets.iter().enumerate() {
            if secrets[i + 1..].iter().any(|b| a == b) {
                return Err(AuthError::Config(
                    "access, refresh and reset secrets must be distinct".into(),
                ));
            }
        }

        Ok(())
    }

    pub fn secret(&self, kind: TokenKind) -> &str {
        match kind {
            TokenKind::Access => &self.access_secret,
            TokenKind::Refresh => &self.refresh_secret,
            TokenKind::Reset => &self.reset_secret,
        }
    }

    /// Lifetime for `kind`, clamped to `0..=MAX_TOKEN_TTL_SECS`.
    pub fn ttl(&self, kind: TokenKind) -> Duration {
        let secs = self.ttl_secs(kind).clamp(0, MAX_TOKEN_TTL_SECS);
        Duration::try_seconds(secs).unwrap_or_else(Duration::zero)
    }

    fn ttl_secs(&self, kind: TokenKind) -> i64 {
        match kind {
            TokenKind::Access => self.access_token_ttl_secs,
            TokenKind::Refresh => self.refresh_token_ttl_secs,
            TokenKind::Reset => self.reset_token_ttl_secs,
        }
    }
}

fn required_secret(key: &str) -> AuthResult<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.is_empty())
        .ok_or_else(|| AuthError::Config(format!("{key} is required")))
}

fn env_i64(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse::<i64>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::auth_config as make_test_config;

    #[test]
    fn selects_secret_and_lifetime_per_kind() {
        let config = make_test_config();
        assert_eq!(config.secret(TokenKind::Refresh), "test-refresh-secret");
        assert_eq!(config.ttl(TokenKind::Reset), Duration::minutes(15));
        assert_eq!(config.ttl(TokenKind::Access), Duration::hours(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_shared_secrets() {
        let mut config = make_test_config();
        config.reset_secret = config.access_secret.clone();
        assert!(matches!(config.validate(), Err(AuthError::Config(_))));
    }

    #[test]
    fn rejects_empty_secret_and_non_positive_ttl() {
        let mut config = make_test_config();
        config.refresh_secret.clear();
        assert!(matches!(config.validate(), Err(AuthError::Config(_))));

        let mut config = make_test_config();
        config.reset_token_ttl_secs = 0;
        assert!(matches!(config.validate(), Err(AuthError::Config(_))));
    }

    #[test]
    fn rejects_lifetimes_beyond_the_upper_bound() {
        let mut config = make_test_config();
        config.access_token_ttl_secs = i64::MAX;
        assert!(matches!(config.validate(), Err(AuthError::Config(_))));

        let mut config = make_test_config();
        config.refresh_token_ttl_secs = 1_000_000_000_000_000;
        assert!(matches!(config.validate(), Err(AuthError::Config(_))));

        let mut config = make_test_config();
        config.refresh_token_ttl_secs = MAX_TOKEN_TTL_SECS;
        assert!(config.validate().is_ok());
        assert_eq!(config.ttl(TokenKind::Refresh), Duration::days(3650));
    }

    #[test]
    fn ttl_never_panics_on_unchecked_values() {
        let mut config = make_test_config();
        config.access_token_ttl_secs = i64::MAX;
        config.reset_token_ttl_secs = i64::MIN;
        assert_eq!(config.ttl(TokenKind::Access), Duration::days(3650));
        assert_eq!(config.ttl(TokenKind::Reset), Duration::zero());
    }
}
