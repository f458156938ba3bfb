use argon2::{
    Algorithm, Argon2, ParamsBuilder, PasswordHash, PasswordHasher, PasswordVerifier, Version,
    password_hash::SaltString,
};
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::auth::{AuthError, AuthResult};

const SALT_LEN: usize = 16;
pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Clone)]
pub struct PasswordService {
    argon2: Argon2<'static>,
}

impl PasswordService {
    pub fn new() -> AuthResult<Self> {
        let mut builder = ParamsBuilder::new();
        builder.m_cost(19 * 1024); // 19 MiB
        builder.t_cost(2);
        builder.p_cost(1);
        let params = builder.build().map_err(AuthError::from)?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    pub fn hash_password(&self, password: &str) -> AuthResult<String> {
        let mut salt_bytes = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt_bytes);
        let salt = SaltString::encode_b64(&salt_bytes)?;
        Ok(self
            .argon2
            .hash_password(password.as_bytes(), &salt)?
            .to_string())
    }

    /// `Ok(false)` means the password did not match; `Err` means the stored
    /// hash could not be used at all.
    pub fn verify_password(&self, password: &str, encoded: &str) -> AuthResult<bool> {
        let parsed = PasswordHash::new(encoded)?;
        match self.argon2.verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(err) => Err(AuthError::from(err)),
        }
    }

    /// Hash on the blocking pool so request workers are not held up by Argon2.
    pub async fn hash_password_async(&self, password: &str) -> AuthResult<String> {
        let service = self.clone();
        let password = password.to_string();
        tokio::task::spawn_blocking(move || service.hash_password(&password))
            .await
            .map_err(|err| AuthError::Other(format!("hashing task failed: {err}")))?
    }

    pub async fn verify_password_async(&self, password: &str, encoded: &str) -> AuthResult<bool> {
        let service = self.clone();
        let password = password.to_string();
        let encoded = encoded.to_string();
        tokio::task::spawn_blocking(move || service.verify_password(&password, &encoded))
            .await
            .map_err(|err| AuthError::Other(format!("verification task failed: {err}")))?
    }
}

/// Short digest of a stored password hash. Any password write changes it,
/// since every hash carries a fresh salt.
pub fn hash_fingerprint(encoded: &str) -> String {
    let digest = Sha256::digest(encoded.as_bytes());
    URL_SAFE_NO_PAD.encode(&digest[..16])
}

/// Shape check applied to every password a user chooses.
pub fn validate_new_password(password: &str) -> AuthResult<()> {
    if password.trim().is_empty() {
        return Err(AuthError::bad_request("password is required"));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::bad_request(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}
