//! Authentication and authorization: configuration, token codec, account
//! and email gateways, the auth flows, Rocket request guards, and HTTP route
//! handlers.

use std::sync::Arc;

pub mod claims;
pub mod config;
pub mod directory;
pub mod error;
pub mod guards;
pub mod jwt;
pub mod notifier;
pub mod passwords;
pub mod pg_directory;
pub mod responses;
pub mod routes;
pub mod service;

pub use claims::{Claims, Identity, Role};
pub use config::{AuthConfig, TokenKind};
pub use directory::{Directory, InMemoryDirectory};
pub use error::{AuthError, AuthResult};
pub use guards::{AdminOnly, AnyRole, AuthUser, Authorized, RoleSet};
pub use jwt::TokenCodec;
pub use notifier::{HttpNotifier, LogNotifier, Notifier};
pub use passwords::PasswordService;
pub use pg_directory::PgDirectory;
pub use service::{AuthService, ResetPasswordRequest};

#[derive(Clone)]
pub struct AuthState {
    pub config: Arc<AuthConfig>,
    pub service: Arc<AuthService>,
}

impl AuthState {
    pub fn new(
        config: AuthConfig,
        password_service: PasswordService,
        directory: Arc<dyn Directory>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let config = Arc::new(config);
        let service = AuthService::new(config.clone(), password_service, directory, notifier);
        Self {
            config,
            service: Arc::new(service),
        }
    }
}

/// Pick the notifier the configuration asks for.
pub fn notifier_from_config(config: &AuthConfig) -> AuthResult<Arc<dyn Notifier>> {
    match &config.mail_relay_url {
        Some(url) => {
            let http = reqwest::Client::builder()
                .build()
                .map_err(|err| AuthError::Config(format!("failed to build mail client: {err}")))?;
            log::info!("sending auth emails through relay at {}", url);
            Ok(Arc::new(HttpNotifier::new(url.clone(), config.mail_from.clone(), http)))
        }
        None => {
            log::warn!("CARE_MAIL_RELAY_URL not set; auth emails will only be logged");
            Ok(Arc::new(LogNotifier))
        }
    }
}
