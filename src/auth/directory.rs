//! Gateway to the system of record for user accounts.
//!
//! The auth flows only ever talk to accounts through [`Directory`]. The
//! Postgres adapter lives in [`crate::auth::pg_directory`]; the in-memory
//! adapter here backs development setups and tests.

use std::str::FromStr;

use dashmap::DashMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::claims::Role;
use crate::auth::{AuthError, AuthResult};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserStatus {
    Active,
    Blocked,
    Deleted,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "ACTIVE",
            UserStatus::Blocked => "BLOCKED",
            UserStatus::Deleted => "DELETED",
        }
    }
}

impl FromStr for UserStatus {
    type Err = AuthError;

    fn from_str(status: &str) -> Result<Self, Self::Err> {
        match status {
            "ACTIVE" => Ok(UserStatus::Active),
            "BLOCKED" => Ok(UserStatus::Blocked),
            "DELETED" => Ok(UserStatus::Deleted),
            other => Err(AuthError::Other(format!("unknown user status '{other}'"))),
        }
    }
}

/// Credential-bearing view of an account.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub status: UserStatus,
    pub need_password_change: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MemberProfile {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_photo: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DoctorProfile {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_photo: Option<String>,
    pub registration_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub designation: Option<String>,
    pub appointment_fee: i32,
}

/// Role-specific sub-profile attached to an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoleProfile {
    Admin(MemberProfile),
    Doctor(DoctorProfile),
    Patient(MemberProfile),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub role: Role,
    pub status: UserStatus,
    pub need_password_change: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<RoleProfile>,
}

#[rocket::async_trait]
pub trait Directory: Send + Sync {
    /// Fails with [`AuthError::NotFound`] when no ACTIVE account has `email`.
    async fn find_active_user_by_email(&self, email: &str) -> AuthResult<UserRecord>;

    /// Full profile including the role-specific sub-profile.
    async fn find_active_profile_by_email(&self, email: &str) -> AuthResult<UserProfile>;

    async fn update_password(
        &self,
        email: &str,
        password_hash: &str,
        clear_needs_change: bool,
    ) -> AuthResult<()>;
}

#[derive(Debug, Clone)]
struct StoredAccount {
    record: UserRecord,
    profile: Option<RoleProfile>,
}

/// Process-local directory keyed by lowercased email.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    accounts: DashMap<String, StoredAccount>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: UserRecord, profile: Option<RoleProfile>) {
        self.accounts
            .insert(normalize(&record.email), StoredAccount { record, profile });
    }

    /// Insert an account with a fresh id and return that id.
    pub fn insert_user(
        &self,
        email: &str,
        password_hash: &str,
        role: Role,
        status: UserStatus,
        need_password_change: bool,
    ) -> String {
        let id = Uuid::new_v4().to_string();
        self.insert(
            UserRecord {
                id: id.clone(),
                email: email.to_string(),
                password_hash: password_hash.to_string(),
                role,
                status,
                need_password_change,
            },
            None,
        );
        id
    }

    pub fn set_profile(&self, email: &str, profile: RoleProfile) -> bool {
        match self.accounts.get_mut(&normalize(email)) {
            Some(mut account) => {
                account.profile = Some(profile);
                true
            }
            None => false,
        }
    }

    pub fn set_status(&self, email: &str, status: UserStatus) -> bool {
        match self.accounts.get_mut(&normalize(email)) {
            Some(mut account) => {
                account.record.status = status;
                true
            }
            None => false,
        }
    }

    /// Snapshot of an account regardless of status.
    pub fn get(&self, email: &str) -> Option<UserRecord> {
        self.accounts
            .get(&normalize(email))
            .map(|account| account.record.clone())
    }

    fn active(&self, email: &str) -> AuthResult<StoredAccount> {
        self.accounts
            .get(&normalize(email))
            .filter(|account| account.record.status == UserStatus::Active)
            .map(|account| account.clone())
            .ok_or(AuthError::NotFound)
    }
}

#[rocket::async_trait]
impl Directory for InMemoryDirectory {
    async fn find_active_user_by_email(&self, email: &str) -> AuthResult<UserRecord> {
        self.active(email).map(|account| account.record)
    }

    async fn find_active_profile_by_email(&self, email: &str) -> AuthResult<UserProfile> {
        let account = self.active(email)?;
        Ok(UserProfile {
            id: account.record.id,
            email: account.record.email,
            role: account.record.role,
            status: account.record.status,
            need_password_change: account.record.need_password_change,
            profile: account.profile,
        })
    }

    async fn update_password(
        &self,
        email: &str,
        password_hash: &str,
        clear_needs_change: bool,
    ) -> AuthResult<()> {
        let mut account = self
            .accounts
            .get_mut(&normalize(email))
            .ok_or(AuthError::NotFound)?;
        account.record.password_hash = password_hash.to_string();
        if clear_needs_change {
            account.record.need_password_change = false;
        }
        Ok(())
    }
}

fn normalize(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn only_active_accounts_are_visible() {
        let directory = InMemoryDirectory::new();
        directory.insert_user("Doc@X.com", "hash", Role::Doctor, UserStatus::Active, false);
        directory.insert_user("gone@x.com", "hash", Role::Patient, UserStatus::Deleted, false);

        let found = directory
            .find_active_user_by_email("doc@x.com")
            .await
            .expect("active doctor");
        assert_eq!(found.role, Role::Doctor);

        assert!(matches!(
            directory.find_active_user_by_email("gone@x.com").await,
            Err(AuthError::NotFound)
        ));
        assert!(matches!(
            directory.find_active_user_by_email("nobody@x.com").await,
            Err(AuthError::NotFound)
        ));
    }

    #[tokio::test]
    async fn update_password_clears_flag_only_when_asked() {
        let directory = InMemoryDirectory::new();
        directory.insert_user("a@x.com", "old", Role::Admin, UserStatus::Active, true);

        directory
            .update_password("a@x.com", "new", false)
            .await
            .expect("update");
        let record = directory.get("a@x.com").expect("record");
        assert_eq!(record.password_hash, "new");
        assert!(record.need_password_change);

        directory
            .update_password("a@x.com", "newer", true)
            .await
            .expect("update");
        assert!(!directory.get("a@x.com").expect("record").need_password_change);
    }

    #[tokio::test]
    async fn profile_carries_role_specific_details() {
        let directory = InMemoryDirectory::new();
        let id = directory.insert_user("doc@x.com", "hash", Role::Doctor, UserStatus::Active, false);
        directory.set_profile(
            "doc@x.com",
            RoleProfile::Doctor(DoctorProfile {
                id: "d-1".into(),
                name: "Dr. Rahman".into(),
                email: "doc@x.com".into(),
                contact_number: None,
                profile_photo: None,
                registration_number: "REG-1".into(),
                designation: Some("Cardiologist".into()),
                appointment_fee: 500,
            }),
        );

        let profile = directory
            .find_active_profile_by_email("doc@x.com")
            .await
            .expect("profile");
        assert_eq!(profile.id, id);
        let json = serde_json::to_value(&profile).expect("serialize");
        assert_eq!(json["profile"]["kind"], "DOCTOR");
        assert_eq!(json["profile"]["registrationNumber"], "REG-1");
        assert_eq!(json["needPasswordChange"], false);
    }
}
