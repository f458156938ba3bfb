use std::sync::Arc;

use healthcare_api::auth::directory::{DoctorProfile, RoleProfile, UserProfile, UserStatus};
use healthcare_api::auth::responses::{AuthErrorResponse, TokenResponse};
use healthcare_api::auth::routes::{
    change_password, forgot_password, login, logout, me, refresh_token, reset_password,
};
use healthcare_api::auth::{AdminOnly, Authorized, InMemoryDirectory, Role};
use healthcare_api::models::ApiResponse;
use healthcare_api::test_support::{RecordingNotifier, TestRocketBuilder, hash};
use rocket::http::{Header, Status};
use rocket::local::blocking::Client;
use rocket::{get, routes};
use serde_json::json;

#[get("/admin/ping")]
fn admin_ping(_admin: Authorized<AdminOnly>) -> &'static str {
    "pong"
}

struct Harness {
    client: Client,
    directory: Arc<InMemoryDirectory>,
    notifier: Arc<RecordingNotifier>,
}

fn harness() -> Harness {
    let builder = TestRocketBuilder::new().mount_api_routes(routes![
        login,
        refresh_token,
        change_password,
        forgot_password,
        reset_password,
        me,
        logout,
        admin_ping,
    ]);
    let directory = builder.directory();
    let notifier = builder.notifier();
    Harness {
        client: builder.blocking_client(),
        directory,
        notifier,
    }
}

fn seed_doctor(directory: &InMemoryDirectory, need_password_change: bool) -> String {
    let id = directory.insert_user(
        "doc@x.com",
        &hash("secret1"),
        Role::Doctor,
        UserStatus::Active,
        need_password_change,
    );
    directory.set_profile(
        "doc@x.com",
        RoleProfile::Doctor(DoctorProfile {
            id: "doctor-1".into(),
            name: "Dr. Rahman".into(),
            email: "doc@x.com".into(),
            contact_number: None,
            profile_photo: None,
            registration_number: "REG-001".into(),
            designation: Some("Cardiologist".into()),
            appointment_fee: 500,
        }),
    );
    id
}

fn login_as(client: &Client, email: &str, password: &str) -> Status {
    client
        .post("/api/v1/auth/login")
        .json(&json!({ "email": email, "password": password }))
        .dispatch()
        .status()
}

#[test]
fn login_sets_cookies_and_me_returns_profile() {
    let h = harness();
    let id = seed_doctor(&h.directory, false);

    let response = h
        .client
        .post("/api/v1/auth/login")
        .json(&json!({ "email": "doc@x.com", "password": "secret1" }))
        .dispatch();
    assert_eq!(response.status(), Status::Ok);
    assert!(response.cookies().get("accessToken").is_some());
    assert!(response.cookies().get("refreshToken").is_some());

    let payload: ApiResponse<TokenResponse> = response.into_json().expect("token payload");
    assert!(payload.success);
    assert!(!payload.data.need_password_change);

    let response = h.client.get("/api/v1/auth/me").dispatch();
    assert_eq!(response.status(), Status::Ok);
    let payload: ApiResponse<UserProfile> = response.into_json().expect("profile payload");
    assert_eq!(payload.data.id, id);
    assert_eq!(payload.data.role, Role::Doctor);
    match payload.data.profile {
        Some(RoleProfile::Doctor(doctor)) => assert_eq!(doctor.registration_number, "REG-001"),
        other => panic!("expected doctor profile, got {other:?}"),
    }
}

#[test]
fn login_failures_map_to_status_codes() {
    let h = harness();
    seed_doctor(&h.directory, false);

    let response = h
        .client
        .post("/api/v1/auth/login")
        .json(&json!({ "email": "doc@x.com", "password": "wrong-password" }))
        .dispatch();
    assert_eq!(response.status(), Status::Unauthorized);
    let body: AuthErrorResponse = response.into_json().expect("error body");
    assert!(!body.success);
    assert_eq!(body.status, 401);

    assert_eq!(login_as(&h.client, "nobody@x.com", "secret1"), Status::NotFound);

    h.directory.set_status("doc@x.com", UserStatus::Blocked);
    assert_eq!(login_as(&h.client, "doc@x.com", "secret1"), Status::NotFound);
}

#[test]
fn me_without_session_is_unauthorized() {
    let h = harness();
    let response = h.client.get("/api/v1/auth/me").dispatch();
    assert_eq!(response.status(), Status::Unauthorized);
}

#[test]
fn refresh_reissues_tokens_from_cookie() {
    let h = harness();
    seed_doctor(&h.directory, false);

    let response = h.client.post("/api/v1/auth/refresh-token").dispatch();
    assert_eq!(response.status(), Status::Unauthorized);

    assert_eq!(login_as(&h.client, "doc@x.com", "secret1"), Status::Ok);
    let response = h.client.post("/api/v1/auth/refresh-token").dispatch();
    assert_eq!(response.status(), Status::Ok);
    assert!(response.cookies().get("accessToken").is_some());

    h.directory.set_status("doc@x.com", UserStatus::Deleted);
    let response = h.client.post("/api/v1/auth/refresh-token").dispatch();
    assert_eq!(response.status(), Status::NotFound);
}

#[test]
fn change_password_requires_session_and_old_password() {
    let h = harness();
    seed_doctor(&h.directory, true);

    let response = h
        .client
        .post("/api/v1/auth/change-password")
        .json(&json!({ "oldPassword": "secret1", "newPassword": "fresh-pass" }))
        .dispatch();
    assert_eq!(response.status(), Status::Unauthorized);

    assert_eq!(login_as(&h.client, "doc@x.com", "secret1"), Status::Ok);

    let response = h
        .client
        .post("/api/v1/auth/change-password")
        .json(&json!({ "oldPassword": "not-it", "newPassword": "fresh-pass" }))
        .dispatch();
    assert_eq!(response.status(), Status::Unauthorized);

    let response = h
        .client
        .post("/api/v1/auth/change-password")
        .json(&json!({ "oldPassword": "secret1", "newPassword": "fresh-pass" }))
        .dispatch();
    assert_eq!(response.status(), Status::Ok);

    let record = h.directory.get("doc@x.com").expect("account");
    assert!(!record.need_password_change);
    assert_eq!(login_as(&h.client, "doc@x.com", "secret1"), Status::Unauthorized);
    assert_eq!(login_as(&h.client, "doc@x.com", "fresh-pass"), Status::Ok);
}

#[test]
fn forgot_then_reset_with_header_token() {
    let h = harness();
    seed_doctor(&h.directory, false);

    let response = h
        .client
        .post("/api/v1/auth/forgot-password")
        .json(&json!({ "email": "doc@x.com" }))
        .dispatch();
    assert_eq!(response.status(), Status::Ok);

    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "doc@x.com");
    let token = h.notifier.last_reset_token().expect("reset token in email");

    let response = h
        .client
        .post("/api/v1/auth/reset-password")
        .header(Header::new("Authorization", token.clone()))
        .json(&json!({ "email": "someone@x.com", "password": "reset-pass" }))
        .dispatch();
    assert_eq!(response.status(), Status::Forbidden);

    let response = h
        .client
        .post("/api/v1/auth/reset-password")
        .header(Header::new("Authorization", format!("Bearer {token}")))
        .json(&json!({ "email": "doc@x.com", "password": "reset-pass" }))
        .dispatch();
    assert_eq!(response.status(), Status::Ok);

    let response = h
        .client
        .post("/api/v1/auth/reset-password")
        .header(Header::new("Authorization", token))
        .json(&json!({ "password": "again-pass" }))
        .dispatch();
    assert_eq!(response.status(), Status::Forbidden);

    assert_eq!(login_as(&h.client, "doc@x.com", "reset-pass"), Status::Ok);
}

#[test]
fn forgot_password_for_unknown_email_is_not_found() {
    let h = harness();
    let response = h
        .client
        .post("/api/v1/auth/forgot-password")
        .json(&json!({ "email": "ghost@x.com" }))
        .dispatch();
    assert_eq!(response.status(), Status::NotFound);
    assert!(h.notifier.sent().is_empty());
}

#[test]
fn reset_rejects_tokens_of_other_kinds() {
    let h = harness();
    seed_doctor(&h.directory, false);
    let response = h
        .client
        .post("/api/v1/auth/login")
        .json(&json!({ "email": "doc@x.com", "password": "secret1" }))
        .dispatch();
    let access = response
        .cookies()
        .get("accessToken")
        .map(|cookie| cookie.value().to_string())
        .expect("access cookie");

    let response = h
        .client
        .post("/api/v1/auth/reset-password")
        .header(Header::new("Authorization", access))
        .json(&json!({ "email": "doc@x.com", "password": "reset-pass" }))
        .dispatch();
    assert_eq!(response.status(), Status::Forbidden);
}

#[test]
fn reset_without_token_or_session_is_bad_request() {
    let h = harness();
    let response = h
        .client
        .post("/api/v1/auth/reset-password")
        .json(&json!({ "password": "reset-pass" }))
        .dispatch();
    assert_eq!(response.status(), Status::BadRequest);
}

#[test]
fn reset_through_session_requires_pending_change() {
    let h = harness();
    seed_doctor(&h.directory, true);

    let response = h
        .client
        .post("/api/v1/auth/login")
        .json(&json!({ "email": "doc@x.com", "password": "secret1" }))
        .dispatch();
    let payload: ApiResponse<TokenResponse> = response.into_json().expect("token payload");
    assert!(payload.data.need_password_change);

    let response = h
        .client
        .post("/api/v1/auth/reset-password")
        .json(&json!({ "password": "first-pass" }))
        .dispatch();
    assert_eq!(response.status(), Status::Ok);
    assert!(!h.directory.get("doc@x.com").expect("account").need_password_change);

    let response = h
        .client
        .post("/api/v1/auth/reset-password")
        .json(&json!({ "password": "second-pass" }))
        .dispatch();
    assert_eq!(response.status(), Status::BadRequest);
}

#[test]
fn role_guard_rejects_other_roles() {
    let h = harness();
    seed_doctor(&h.directory, false);
    h.directory.insert_user(
        "admin@x.com",
        &hash("secret1"),
        Role::Admin,
        UserStatus::Active,
        false,
    );

    assert_eq!(h.client.get("/api/v1/admin/ping").dispatch().status(), Status::Unauthorized);

    assert_eq!(login_as(&h.client, "doc@x.com", "secret1"), Status::Ok);
    assert_eq!(h.client.get("/api/v1/admin/ping").dispatch().status(), Status::Unauthorized);

    assert_eq!(login_as(&h.client, "admin@x.com", "secret1"), Status::Ok);
    let response = h.client.get("/api/v1/admin/ping").dispatch();
    assert_eq!(response.status(), Status::Ok);
    assert_eq!(response.into_string().as_deref(), Some("pong"));
}

#[test]
fn logout_clears_session() {
    let h = harness();
    seed_doctor(&h.directory, false);
    assert_eq!(login_as(&h.client, "doc@x.com", "secret1"), Status::Ok);
    assert_eq!(h.client.get("/api/v1/auth/me").dispatch().status(), Status::Ok);

    assert_eq!(h.client.post("/api/v1/auth/logout").dispatch().status(), Status::NoContent);
    assert_eq!(h.client.get("/api/v1/auth/me").dispatch().status(), Status::Unauthorized);
}
