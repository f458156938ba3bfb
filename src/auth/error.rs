use rocket::http::Status;
use thiserror::Error;

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("user not found")]
    NotFound,
    #[error("you are not authorized")]
    Unauthorized,
    #[error("forbidden")]
    Forbidden,
    #[error("{0}")]
    BadRequest(String),
    #[error("email delivery failed: {0}")]
    Delivery(String),
    #[error("invalid token")]
    InvalidToken,
    #[error("configuration error: {0}")]
    Config(String),
    #[error("database error: {0}")]
    Database(#[from] rocket_db_pools::sqlx::Error),
    #[error("jwt error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("argon2 parameter error: {0}")]
    Argon2(String),
    #[error("password hashing error: {0}")]
    PasswordHash(String),
    #[error("unexpected error: {0}")]
    Other(String),
}

impl AuthError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        AuthError::BadRequest(message.into())
    }

    pub fn status(&self) -> Status {
        match self {
            AuthError::NotFound => Status::NotFound,
            AuthError::Unauthorized | AuthError::InvalidToken => Status::Unauthorized,
            AuthError::Forbidden => Status::Forbidden,
            AuthError::BadRequest(_) => Status::BadRequest,
            AuthError::Delivery(_) => Status::BadGateway,
            AuthError::Config(_)
            | AuthError::Database(_)
            | AuthError::Jwt(_)
            | AuthError::Argon2(_)
            | AuthError::PasswordHash(_)
            | AuthError::Other(_) => Status::InternalServerError,
        }
    }

    /// Message safe to hand back to a caller. Infrastructure failures are
    /// collapsed to a generic string.
    pub fn public_message(&self) -> String {
        if self.status() == Status::InternalServerError {
            "internal server error".to_string()
        } else {
            self.to_string()
        }
    }
}

impl From<argon2::Error> for AuthError {
    fn from(err: argon2::Error) -> Self {
        AuthError::Argon2(err.to_string())
    }
}

impl From<argon2::password_hash::Error> for AuthError {
    fn from(err: argon2::password_hash::Error) -> Self {
        AuthError::PasswordHash(err.to_string())
    }
}
