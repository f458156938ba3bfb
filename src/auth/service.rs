//! Login, token refresh and password flows.
//!
//! The service keeps no state between calls. Each flow checks every
//! precondition before the single password write it may perform.

use std::sync::Arc;

use reqwest::Url;

use crate::auth::claims::{Claims, Identity};
use crate::auth::config::{AuthConfig, TokenKind};
use crate::auth::directory::{Directory, UserProfile, UserRecord};
use crate::auth::jwt::{SignedToken, TokenCodec};
use crate::auth::notifier::Notifier;
use crate::auth::passwords::{PasswordService, hash_fingerprint, validate_new_password};
use crate::auth::{AuthError, AuthResult};

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: SignedToken,
    pub refresh_token: SignedToken,
    pub need_password_change: bool,
}

/// Entry path of a reset-password request, resolved once from the request
/// shape and then dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetPasswordRequest {
    /// Caller followed an emailed link carrying a reset token.
    TokenPath { token: String },
    /// Caller is signed in with a provisioned password that must be replaced.
    AuthenticatedNeedsChangePath { identity: Identity },
    Invalid,
}

impl ResetPasswordRequest {
    /// A reset token always wins over a session identity.
    pub fn from_parts(token: Option<&str>, identity: Option<Identity>) -> Self {
        match (token.map(str::trim).filter(|t| !t.is_empty()), identity) {
            (Some(token), _) => ResetPasswordRequest::TokenPath {
                token: token.to_string(),
            },
            (None, Some(identity)) => ResetPasswordRequest::AuthenticatedNeedsChangePath { identity },
            (None, None) => ResetPasswordRequest::Invalid,
        }
    }
}

#[derive(Clone)]
pub struct AuthService {
    config: Arc<AuthConfig>,
    codec: TokenCodec,
    passwords: PasswordService,
    directory: Arc<dyn Directory>,
    notifier: Arc<dyn Notifier>,
}

impl AuthService {
    pub fn new(
        config: Arc<AuthConfig>,
        passwords: PasswordService,
        directory: Arc<dyn Directory>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            codec: TokenCodec::new(),
            passwords,
            directory,
            notifier,
        }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub fn issue(&self, kind: TokenKind, claims: &Claims) -> AuthResult<SignedToken> {
        self.codec
            .issue(claims, self.config.secret(kind), self.config.ttl(kind))
    }

    pub fn verify(&self, kind: TokenKind, token: &str) -> AuthResult<Claims> {
        self.codec.verify(token, self.config.secret(kind))
    }

    pub async fn login(&self, email: &str, password: &str) -> AuthResult<TokenPair> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(AuthError::bad_request("email and password are required"));
        }

        let user = self.directory.find_active_user_by_email(email).await?;

        if !self
            .passwords
            .verify_password_async(password, &user.password_hash)
            .await?
        {
            log::info!("login rejected for {}: password mismatch", user.email);
            return Err(AuthError::Unauthorized);
        }

        let pair = self.issue_pair(&user)?;
        log::info!("login succeeded for {} ({})", user.email, user.role);
        Ok(pair)
    }

    pub async fn refresh(&self, refresh_token: &str) -> AuthResult<TokenPair> {
        let claims = self
            .verify(TokenKind::Refresh, refresh_token)
            .map_err(|_| AuthError::Unauthorized)?;

        let user = self
            .directory
            .find_active_user_by_email(claims.email())
            .await?;

        log::debug!("rotated tokens for {}", user.email);
        self.issue_pair(&user)
    }

    pub async fn change_password(
        &self,
        identity: &Identity,
        old_password: &str,
        new_password: &str,
    ) -> AuthResult<()> {
        let user = self
            .directory
            .find_active_user_by_email(&identity.email)
            .await?;

        if !self
            .passwords
            .verify_password_async(old_password, &user.password_hash)
            .await?
        {
            return Err(AuthError::Unauthorized);
        }

        validate_new_password(new_password)?;
        self.store_password(&user.email, new_password).await?;
        log::info!("password changed for {}", user.email);
        Ok(())
    }

    /// Mint a reset token and email the reset link. The token stays valid
    /// until it expires even when delivery fails.
    pub async fn forgot_password(&self, email: &str) -> AuthResult<()> {
        let email = email.trim();
        if email.is_empty() {
            return Err(AuthError::bad_request("email is required"));
        }

        let user = self.directory.find_active_user_by_email(email).await?;
        let claims = Claims::new(&user.email, user.role)?
            .with_user_id(user.id.clone())
            .with_password_fingerprint(hash_fingerprint(&user.password_hash));
        let reset = self.issue(TokenKind::Reset, &claims)?;

        let link = self.reset_link(&user.email, &reset.token)?;
        let html = reset_email_html(&link, self.config.reset_token_ttl_secs);

        self.notifier
            .send_email(&user.email, "Reset your password", &html)
            .await
            .map_err(|err| match err {
                AuthError::Delivery(_) => err,
                other => AuthError::Delivery(other.to_string()),
            })?;

        log::info!("password reset link sent to {}", user.email);
        Ok(())
    }

    pub async fn reset_password(
        &self,
        request: ResetPasswordRequest,
        email: Option<&str>,
        password: &str,
    ) -> AuthResult<()> {
        let user_email = match request {
            ResetPasswordRequest::Invalid => {
                return Err(AuthError::bad_request(
                    "a reset token or an authenticated session is required",
                ));
            }
            ResetPasswordRequest::TokenPath { token } => {
                let claims = self
                    .verify(TokenKind::Reset, &token)
                    .map_err(|_| AuthError::Forbidden)?;

                if let Some(email) = email.map(str::trim).filter(|e| !e.is_empty()) {
                    if !email.eq_ignore_ascii_case(claims.email()) {
                        log::warn!("reset token for {} presented with another email", claims.email());
                        return Err(AuthError::Forbidden);
                    }
                }

                let user = self
                    .directory
                    .find_active_user_by_email(claims.email())
                    .await?;

                // A reset token is spent once the password it was minted against changes.
                let current = hash_fingerprint(&user.password_hash);
                if claims.password_fingerprint() != Some(current.as_str()) {
                    log::warn!("stale reset token presented for {}", user.email);
                    return Err(AuthError::Forbidden);
                }
                user.email
            }
            ResetPasswordRequest::AuthenticatedNeedsChangePath { identity } => {
                let user = self
                    .directory
                    .find_active_user_by_email(&identity.email)
                    .await?;

                if !user.need_password_change {
                    return Err(AuthError::bad_request(
                        "password reset without a reset token is only allowed for accounts that must change a provisioned password",
                    ));
                }
                user.email
            }
        };

        validate_new_password(password)?;
        self.store_password(&user_email, password).await?;
        log::info!("password reset for {}", user_email);
        Ok(())
    }

    pub async fn get_me(&self, access_token: &str) -> AuthResult<UserProfile> {
        let claims = self
            .verify(TokenKind::Access, access_token)
            .map_err(|_| AuthError::Unauthorized)?;

        self.directory
            .find_active_profile_by_email(claims.email())
            .await
    }

    fn issue_pair(&self, user: &UserRecord) -> AuthResult<TokenPair> {
        let claims = Claims::new(&user.email, user.role)?;
        Ok(TokenPair {
            access_token: self.issue(TokenKind::Access, &claims)?,
            refresh_token: self.issue(TokenKind::Refresh, &claims)?,
            need_password_change: user.need_password_change,
        })
    }

    async fn store_password(&self, email: &str, password: &str) -> AuthResult<()> {
        let hash = self.passwords.hash_password_async(password).await?;
        self.directory.update_password(email, &hash, true).await
    }

    fn reset_link(&self, email: &str, token: &str) -> AuthResult<String> {
        Url::parse_with_params(
            &self.config.reset_password_link,
            &[("email", email), ("token", token)],
        )
        .map(String::from)
        .map_err(|err| AuthError::Config(format!("invalid reset password link: {err}")))
    }
}

fn reset_email_html(link: &str, ttl_secs: i64) -> String {
    let minutes = (ttl_secs / 60).max(1);
    let link = escape_html(link);
    format!(
        r#"<div>
    <p>Dear user,</p>
    <p>We received a request to reset your password. The link below expires in {minutes} minutes.</p>
    <p><a href="{link}"><button>Reset Password</button></a></p>
    <p>If you did not request this, you can ignore this email.</p>
</div>"#
    )
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
