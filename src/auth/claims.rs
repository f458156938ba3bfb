//! Typed token payloads.
//!
//! Every token this service mints carries a [`Claims`] payload. Claims are
//! validated when constructed and again when deserialized out of a verified
//! token, so a malformed payload never gets past the codec.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::auth::{AuthError, AuthResult};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    SuperAdmin,
    Admin,
    Doctor,
    Patient,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "SUPER_ADMIN",
            Role::Admin => "ADMIN",
            Role::Doctor => "DOCTOR",
            Role::Patient => "PATIENT",
        }
    }
}

impl FromStr for Role {
    type Err = AuthError;

    fn from_str(role: &str) -> Result<Self, Self::Err> {
        match role {
            "SUPER_ADMIN" => Ok(Role::SuperAdmin),
            "ADMIN" => Ok(Role::Admin),
            "DOCTOR" => Ok(Role::Doctor),
            "PATIENT" => Ok(Role::Patient),
            other => Err(AuthError::Other(format!("unknown role '{other}'"))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload embedded in access, refresh and reset tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawClaims")]
pub struct Claims {
    email: String,
    role: Role,
    #[serde(rename = "userId", skip_serializing_if = "Option::is_none")]
    user_id: Option<String>,
    /// Digest of the password hash a reset token was minted against.
    #[serde(rename = "pwd", skip_serializing_if = "Option::is_none")]
    password_fingerprint: Option<String>,
}

impl Claims {
    pub fn new(email: &str, role: Role) -> AuthResult<Self> {
        let email = email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(AuthError::InvalidToken);
        }
        Ok(Self {
            email: email.to_string(),
            role,
            user_id: None,
            password_fingerprint: None,
        })
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_password_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.password_fingerprint = Some(fingerprint.into());
        self
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn password_fingerprint(&self) -> Option<&str> {
        self.password_fingerprint.as_deref()
    }

    pub fn identity(&self) -> Identity {
        Identity {
            email: self.email.clone(),
            role: self.role,
        }
    }
}

#[derive(Deserialize)]
struct RawClaims {
    email: String,
    role: Role,
    #[serde(rename = "userId", default)]
    user_id: Option<String>,
    #[serde(rename = "pwd", default)]
    password_fingerprint: Option<String>,
}

impl TryFrom<RawClaims> for Claims {
    type Error = AuthError;

    fn try_from(raw: RawClaims) -> Result<Self, Self::Error> {
        let mut claims = Claims::new(&raw.email, raw.role)?;
        if let Some(id) = raw.user_id.filter(|id| !id.is_empty()) {
            claims = claims.with_user_id(id);
        }
        if let Some(fingerprint) = raw.password_fingerprint.filter(|f| !f.is_empty()) {
            claims = claims.with_password_fingerprint(fingerprint);
        }
        Ok(claims)
    }
}

/// The authenticated principal attached to a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Identity {
    pub email: String,
    pub role: Role,
}

impl From<Claims> for Identity {
    fn from(claims: Claims) -> Self {
        Identity {
            email: claims.email,
            role: claims.role,
        }
    }
}
