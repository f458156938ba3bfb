use std::io::{self, Write};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use clap::Parser;
use rand::RngCore;
use sqlx::postgres::PgPoolOptions;

use healthcare_api::auth::Role;
use healthcare_api::auth::passwords::{PasswordService, validate_new_password};

#[derive(Parser, Debug)]
#[command(
    name = "provision_user",
    about = "Provision an admin or doctor account that must change its password on first login"
)]
struct Args {
    /// Email address for the account (case insensitive).
    #[arg(long)]
    email: String,

    /// Display name stored on the role profile.
    #[arg(long)]
    name: String,

    /// Role to assign (`admin` or `doctor`).
    #[arg(long, default_value = "doctor")]
    role: String,

    /// Temporary password. A random one is generated and printed when omitted.
    #[arg(long)]
    password: Option<String>,

    /// Registration number, required for doctors.
    #[arg(long)]
    registration_number: Option<String>,

    #[arg(long)]
    contact_number: Option<String>,
}

fn temporary_password() -> String {
    let mut bytes = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let args = Args::parse();
    let email = args.email.trim().to_lowercase();

    if !email.contains('@') {
        writeln!(io::stderr(), "error: email must contain '@'")?;
        std::process::exit(1);
    }

    let role = match args.role.trim().to_uppercase().parse::<Role>() {
        Ok(role @ (Role::Admin | Role::Doctor)) => role,
        _ => {
            writeln!(
                io::stderr(),
                "error: unsupported role '{}'. Use 'admin' or 'doctor'.",
                args.role
            )?;
            std::process::exit(1);
        }
    };

    let registration_number = match (role, args.registration_number.as_deref()) {
        (Role::Doctor, None) => {
            writeln!(io::stderr(), "error: doctors need --registration-number")?;
            std::process::exit(1);
        }
        (_, number) => number.map(str::to_string),
    };

    let generated = args.password.is_none();
    let password = args.password.unwrap_or_else(temporary_password);
    if let Err(err) = validate_new_password(&password) {
        writeln!(io::stderr(), "error: {err}")?;
        std::process::exit(1);
    }

    let database_url = std::env::var("DATABASE_URL")?;
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    let mut tx = pool.begin().await?;

    let existing =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE lower(email) = lower($1)")
            .bind(&email)
            .fetch_one(&mut *tx)
            .await?;

    if existing > 0 {
        writeln!(
            io::stderr(),
            "error: a user with email '{email}' already exists."
        )?;
        std::process::exit(1);
    }

    let password_service = PasswordService::new()
        .map_err(|err| io::Error::other(format!("argon2 init failed: {err}")))?;
    let password_hash = password_service
        .hash_password(&password)
        .map_err(|err| io::Error::other(format!("password hash failed: {err}")))?;

    let user_id: uuid::Uuid = sqlx::query_scalar(
        "INSERT INTO users (email, password, role, need_password_change) \
         VALUES ($1, $2, $3, true) RETURNING id",
    )
    .bind(&email)
    .bind(password_hash)
    .bind(role.as_str())
    .fetch_one(&mut *tx)
    .await?;

    match role {
        Role::Doctor => {
            sqlx::query(
                "INSERT INTO doctors (name, email, contact_number, registration_number) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(&args.name)
            .bind(&email)
            .bind(args.contact_number.as_ref())
            .bind(registration_number.unwrap_or_default())
            .execute(&mut *tx)
            .await?;
        }
        _ => {
            sqlx::query("INSERT INTO admins (name, email, contact_number) VALUES ($1, $2, $3)")
                .bind(&args.name)
                .bind(&email)
                .bind(args.contact_number.as_ref())
                .execute(&mut *tx)
                .await?;
        }
    }

    tx.commit().await?;

    println!("Provisioned {role} '{email}' with id {user_id}");
    if generated {
        println!("Temporary password: {password}");
    }
    Ok(())
}
