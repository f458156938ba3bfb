#[macro_use]
extern crate rocket;

pub mod auth;
pub mod db;
pub mod models;
pub mod request_logger;
pub mod routes;

use crate::auth::{AuthConfig, AuthState, PasswordService, PgDirectory, notifier_from_config};
use crate::db::CareDb;
use crate::request_logger::RequestLogger;
use env_logger::Env;
use rocket::fairing::AdHoc;
use rocket::http::Method;
use rocket::{Build, Catcher, Rocket};
use rocket_cors::{AllowedOrigins, CorsOptions};
use rocket_db_pools::Database;
use rocket_okapi::{
    openapi_get_routes,
    rapidoc::{GeneralConfig, HideShowConfig, RapiDocConfig, make_rapidoc},
    settings::UrlObject,
    swagger_ui::{SwaggerUIConfig, make_swagger_ui},
};
use std::sync::{Arc, Once};

static LOGGER: Once = Once::new();

fn init_logger() {
    LOGGER.call_once(|| {
        env_logger::Builder::from_env(
            Env::default().default_filter_or("info,rocket::server=warn,rocket::request=warn"),
        )
        .init();
    });
}

/// JSON catchers for guard and routing failures.
pub fn catchers() -> Vec<Catcher> {
    catchers![
        routes::catchers::bad_request,
        routes::catchers::unauthorized,
        routes::catchers::forbidden,
        routes::catchers::not_found,
        routes::catchers::unprocessable,
        routes::catchers::internal_error,
    ]
}

pub fn rocket() -> Rocket<Build> {
    init_logger();

    let cors = CorsOptions::default()
        .allowed_origins(AllowedOrigins::all())
        .allowed_methods(
            vec![Method::Get, Method::Post, Method::Put, Method::Delete, Method::Patch]
                .into_iter()
                .map(From::from)
                .collect(),
        )
        .allow_credentials(true)
        .to_cors()
        .expect("Error creating CORS");

    rocket::build()
        .attach(RequestLogger)
        .attach(CareDb::init())
        .attach(cors)
        .attach(AdHoc::try_on_ignite(
            "Run Migrations",
            |rocket| async move {
                match CareDb::fetch(&rocket) {
                    Some(db) => match db::run_migrations(db).await {
                        Ok(()) => Ok(rocket),
                        Err(e) => {
                            log::error!("database migrations failed: {}", e);
                            Err(rocket)
                        }
                    },
                    None => {
                        log::error!("database pool not available for migrations");
                        Err(rocket)
                    }
                }
            },
        ))
        .attach(AdHoc::try_on_ignite(
            "Auth Configuration",
            |rocket| async move {
                let config = match AuthConfig::from_env() {
                    Ok(config) => config,
                    Err(err) => {
                        log::error!("failed to load auth configuration: {}", err);
                        return Err(rocket);
                    }
                };

                let pool = match CareDb::fetch(&rocket) {
                    Some(db) => (**db).clone(),
                    None => {
                        log::error!("database pool not available for auth directory");
                        return Err(rocket);
                    }
                };

                let password_service = match PasswordService::new() {
                    Ok(service) => service,
                    Err(err) => {
                        log::error!("failed to initialize password hashing: {}", err);
                        return Err(rocket);
                    }
                };

                let notifier = match notifier_from_config(&config) {
                    Ok(notifier) => notifier,
                    Err(err) => {
                        log::error!("failed to initialize notifier: {}", err);
                        return Err(rocket);
                    }
                };

                let state = AuthState::new(
                    config,
                    password_service,
                    Arc::new(PgDirectory::new(pool)),
                    notifier,
                );
                Ok(rocket.manage(state))
            },
        ))
        .mount(
            "/api/v1",
            openapi_get_routes![
                routes::health::health_check,
                auth::routes::login,
                auth::routes::refresh_token,
                auth::routes::change_password,
                auth::routes::forgot_password,
                auth::routes::reset_password,
                auth::routes::me,
                auth::routes::logout,
            ],
        )
        .mount(
            "/api/docs/swagger/",
            make_swagger_ui(&SwaggerUIConfig {
                url: "../../v1/openapi.json".to_owned(),
                ..Default::default()
            }),
        )
        .mount(
            "/api/docs/rapidoc/",
            make_rapidoc(&RapiDocConfig {
                general: GeneralConfig {
                    spec_urls: vec![UrlObject::new("Healthcare API", "../../v1/openapi.json")],
                    ..Default::default()
                },
                hide_show: HideShowConfig {
                    allow_spec_url_load: false,
                    allow_spec_file_load: false,
                    ..Default::default()
                },
                ..Default::default()
            }),
        )
        .register("/", catchers())
}

#[cfg_attr(not(test), allow(dead_code))]
pub mod test_support {
    use std::sync::Arc;

    use parking_lot::Mutex;
    use rocket::config::LogLevel;
    use rocket::figment::Figment;
    use rocket::local::asynchronous::Client as AsyncClient;
    use rocket::local::blocking::Client;
    use rocket::{Build, Rocket, Route};

    use crate::auth::{
        AuthConfig, AuthError, AuthResult, AuthState, InMemoryDirectory, Notifier, PasswordService,
    };

    /// Configuration with distinct fixed secrets and the default lifetimes.
    pub fn auth_config() -> AuthConfig {
        AuthConfig {
            access_secret: "test-access-secret".into(),
            refresh_secret: "test-refresh-secret".into(),
            reset_secret: "test-reset-secret".into(),
            access_token_ttl_secs: 3600,
            refresh_token_ttl_secs: 90 * 24 * 60 * 60,
            reset_token_ttl_secs: 900,
            reset_password_link: "https://care.test/reset-password".into(),
            access_cookie_name: "accessToken".into(),
            refresh_cookie_name: "refreshToken".into(),
            cookie_domain: None,
            cookie_secure: false,
            mail_relay_url: None,
            mail_from: "no-reply@care.test".into(),
        }
    }

    /// Argon2 hash of `password`, for seeding directories.
    pub fn hash(password: &str) -> String {
        PasswordService::new()
            .and_then(|service| service.hash_password(password))
            .expect("password hash")
    }

    #[derive(Debug, Clone)]
    pub struct SentEmail {
        pub to: String,
        pub subject: String,
        pub html: String,
    }

    /// Notifier that keeps every message for later assertions.
    #[derive(Debug, Default)]
    pub struct RecordingNotifier {
        sent: Mutex<Vec<SentEmail>>,
    }

    impl RecordingNotifier {
        pub fn sent(&self) -> Vec<SentEmail> {
            self.sent.lock().clone()
        }

        /// Value of the `token` query parameter in the most recent email.
        pub fn last_reset_token(&self) -> Option<String> {
            let sent = self.sent.lock();
            let html = &sent.last()?.html;
            let start = html.find("token=")? + "token=".len();
            let rest = &html[start..];
            let end = rest.find(|c: char| c == '"' || c == '&').unwrap_or(rest.len());
            Some(rest[..end].to_string())
        }
    }

    #[rocket::async_trait]
    impl Notifier for RecordingNotifier {
        async fn send_email(&self, to: &str, subject: &str, html: &str) -> AuthResult<()> {
            self.sent.lock().push(SentEmail {
                to: to.to_string(),
                subject: subject.to_string(),
                html: html.to_string(),
            });
            Ok(())
        }
    }

    /// Notifier whose relay is always down.
    #[derive(Debug, Default)]
    pub struct FailingNotifier;

    #[rocket::async_trait]
    impl Notifier for FailingNotifier {
        async fn send_email(&self, _to: &str, _subject: &str, _html: &str) -> AuthResult<()> {
            Err(AuthError::Delivery("relay unavailable".into()))
        }
    }

    pub use database::{TestDatabase, TestDatabaseError};

    pub mod database {
        use log::LevelFilter;
        use rocket_db_pools::sqlx::postgres::{PgConnectOptions, PgPoolOptions};
        use rocket_db_pools::sqlx::{self, ConnectOptions, PgPool};
        use thiserror::Error;
        use uuid::Uuid;

        #[derive(Debug, Error)]
        pub enum TestDatabaseError {
            #[error("TEST_DATABASE_URL not set")]
            MissingUrl,
            #[error("database error: {0}")]
            Sqlx(#[from] sqlx::Error),
        }

        /// Throwaway database created next to the one `TEST_DATABASE_URL`
        /// points at, migrated on creation and dropped by [`TestDatabase::close`].
        pub struct TestDatabase {
            pool: Option<PgPool>,
            admin_options: PgConnectOptions,
            database_name: String,
        }

        impl TestDatabase {
            pub async fn new_from_env() -> Result<Self, TestDatabaseError> {
                let url = std::env::var("TEST_DATABASE_URL")
                    .ok()
                    .filter(|url| !url.trim().is_empty())
                    .ok_or(TestDatabaseError::MissingUrl)?;
                Self::new(&url).await
            }

            pub async fn new(url: &str) -> Result<Self, TestDatabaseError> {
                let base_options: PgConnectOptions = url.parse()?;
                let base_options = base_options.log_statements(LevelFilter::Off);
                let admin_options = base_options.clone();

                let admin_pool = PgPoolOptions::new()
                    .max_connections(1)
                    .connect_with(admin_options.clone())
                    .await?;
                let database_name = format!("care_test_{}", Uuid::new_v4().simple());
                sqlx::query(&format!("CREATE DATABASE \"{database_name}\" TEMPLATE template0"))
                    .execute(&admin_pool)
                    .await?;
                admin_pool.close().await;

                let pool = PgPoolOptions::new()
                    .max_connections(5)
                    .connect_with(base_options.database(&database_name))
                    .await?;
                crate::db::run_migrations(&pool).await?;

                Ok(Self {
                    pool: Some(pool),
                    admin_options,
                    database_name,
                })
            }

            pub fn pool(&self) -> &PgPool {
                self.pool.as_ref().expect("test database pool is available")
            }

            pub fn pool_clone(&self) -> PgPool {
                self.pool().clone()
            }

            /// Close pool connections and drop the database.
            pub async fn close(mut self) -> Result<(), TestDatabaseError> {
                if let Some(pool) = self.pool.take() {
                    pool.close().await;
                }

                let admin_pool = PgPoolOptions::new()
                    .max_connections(1)
                    .connect_with(self.admin_options.clone())
                    .await?;
                sqlx::query(&format!(
                    "DROP DATABASE IF EXISTS \"{}\" WITH (FORCE)",
                    self.database_name
                ))
                .execute(&admin_pool)
                .await?;
                admin_pool.close().await;
                Ok(())
            }
        }
    }

    /// Builder for Rocket instances backed by an in-memory directory.
    pub struct TestRocketBuilder {
        figment: Figment,
        mounts: Vec<(String, Vec<Route>)>,
        config: AuthConfig,
        directory: Arc<InMemoryDirectory>,
        notifier: Arc<RecordingNotifier>,
    }

    impl Default for TestRocketBuilder {
        fn default() -> Self {
            Self::new()
        }
    }

    impl TestRocketBuilder {
        /// Start a builder with sensible defaults: random port, logging disabled.
        pub fn new() -> Self {
            let figment = rocket::Config::figment()
                .merge(("port", 0))
                .merge(("log_level", LogLevel::Off))
                .merge(("cli_colors", false));

            Self {
                figment,
                mounts: Vec::new(),
                config: auth_config(),
                directory: Arc::new(InMemoryDirectory::new()),
                notifier: Arc::new(RecordingNotifier::default()),
            }
        }

        /// Mount routes under `/api/v1`.
        pub fn mount_api_routes(mut self, routes: Vec<Route>) -> Self {
            self.mounts.push(("/api/v1".to_string(), routes));
            self
        }

        pub fn with_config(mut self, edit: impl FnOnce(&mut AuthConfig)) -> Self {
            edit(&mut self.config);
            self
        }

        pub fn directory(&self) -> Arc<InMemoryDirectory> {
            self.directory.clone()
        }

        pub fn notifier(&self) -> Arc<RecordingNotifier> {
            self.notifier.clone()
        }

        /// Finish building the Rocket instance.
        pub fn build(self) -> Rocket<Build> {
            let password_service = PasswordService::new().expect("password service");
            let state = AuthState::new(
                self.config,
                password_service,
                self.directory,
                self.notifier,
            );

            let mut rocket = rocket::custom(self.figment)
                .manage(state)
                .register("/", crate::catchers());

            for (base, routes) in self.mounts {
                rocket = rocket.mount(base, routes);
            }

            rocket
        }

        pub fn blocking_client(self) -> Client {
            Client::tracked(self.build()).expect("valid Rocket instance")
        }

        pub async fn async_client(self) -> AsyncClient {
            AsyncClient::tracked(self.build())
                .await
                .expect("valid Rocket instance")
        }
    }
}
