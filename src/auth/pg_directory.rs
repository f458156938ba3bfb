use rocket_db_pools::sqlx::{self, PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::auth::claims::Role;
use crate::auth::directory::{
    Directory, DoctorProfile, MemberProfile, RoleProfile, UserProfile, UserRecord, UserStatus,
};
use crate::auth::{AuthError, AuthResult};

/// [`Directory`] backed by the `users`/`admins`/`doctors`/`patients` tables.
#[derive(Debug, Clone)]
pub struct PgDirectory {
    pool: PgPool,
}

impl PgDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_active_row(&self, email: &str) -> AuthResult<PgRow> {
        sqlx::query(
            r#"
            SELECT id, email, password, role, status, need_password_change
            FROM users
            WHERE lower(email) = lower($1) AND status = 'ACTIVE'
            "#,
        )
        .bind(email.trim())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AuthError::NotFound)
    }

    async fn fetch_role_profile(&self, role: Role, email: &str) -> AuthResult<Option<RoleProfile>> {
        let profile = match role {
            Role::SuperAdmin | Role::Admin => sqlx::query(
                "SELECT id, name, email, contact_number, profile_photo FROM admins WHERE email = $1 AND is_deleted = false",
            )
            .bind(email)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| member_from_row(&row))
            .transpose()?
            .map(RoleProfile::Admin),
            Role::Doctor => sqlx::query(
                r#"
                SELECT id, name, email, contact_number, profile_photo,
                       registration_number, designation, appointment_fee
                FROM doctors
                WHERE email = $1 AND is_deleted = false
                "#,
            )
            .bind(email)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| doctor_from_row(&row))
            .transpose()?
            .map(RoleProfile::Doctor),
            Role::Patient => sqlx::query(
                "SELECT id, name, email, contact_number, profile_photo FROM patients WHERE email = $1 AND is_deleted = false",
            )
            .bind(email)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| member_from_row(&row))
            .transpose()?
            .map(RoleProfile::Patient),
        };

        Ok(profile)
    }
}

#[rocket::async_trait]
impl Directory for PgDirectory {
    async fn find_active_user_by_email(&self, email: &str) -> AuthResult<UserRecord> {
        let row = self.fetch_active_row(email).await?;
        record_from_row(&row)
    }

    async fn find_active_profile_by_email(&self, email: &str) -> AuthResult<UserProfile> {
        let record = self.find_active_user_by_email(email).await?;
        let profile = self.fetch_role_profile(record.role, &record.email).await?;

        Ok(UserProfile {
            id: record.id,
            email: record.email,
            role: record.role,
            status: record.status,
            need_password_change: record.need_password_change,
            profile,
        })
    }

    async fn update_password(
        &self,
        email: &str,
        password_hash: &str,
        clear_needs_change: bool,
    ) -> AuthResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET password = $1,
                need_password_change = CASE WHEN $2 THEN false ELSE need_password_change END,
                updated_at = now()
            WHERE lower(email) = lower($3)
            "#,
        )
        .bind(password_hash)
        .bind(clear_needs_change)
        .bind(email.trim())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AuthError::NotFound);
        }
        Ok(())
    }
}

fn record_from_row(row: &PgRow) -> AuthResult<UserRecord> {
    let id: Uuid = row.try_get("id")?;
    let role: String = row.try_get("role")?;
    let status: String = row.try_get("status")?;

    Ok(UserRecord {
        id: id.to_string(),
        email: row.try_get("email")?,
        password_hash: row.try_get("password")?,
        role: role.parse()?,
        status: status.parse::<UserStatus>()?,
        need_password_change: row.try_get("need_password_change")?,
    })
}

fn member_from_row(row: &PgRow) -> AuthResult<MemberProfile> {
    let id: Uuid = row.try_get("id")?;
    Ok(MemberProfile {
        id: id.to_string(),
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        contact_number: row.try_get("contact_number")?,
        profile_photo: row.try_get("profile_photo")?,
    })
}

fn doctor_from_row(row: &PgRow) -> AuthResult<DoctorProfile> {
    let id: Uuid = row.try_get("id")?;
    Ok(DoctorProfile {
        id: id.to_string(),
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        contact_number: row.try_get("contact_number")?,
        profile_photo: row.try_get("profile_photo")?,
        registration_number: row.try_get("registration_number")?,
        designation: row.try_get("designation")?,
        appointment_fee: row.try_get("appointment_fee")?,
    })
}
