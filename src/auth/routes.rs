use rocket::http::{Cookie, CookieJar, SameSite, Status};
use rocket::request::{FromRequest, Outcome, Request};
use rocket::response::status;
use rocket::serde::json::Json;
use rocket::{State, get, post};
use rocket_okapi::openapi;
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::request::{OpenApiFromRequest, RequestHeaderInput};
use time::Duration as TimeDuration;

use crate::auth::config::AuthConfig;
use crate::auth::directory::UserProfile;
use crate::auth::guards::{AuthUser, access_token_from_request};
use crate::auth::responses::{
    AuthErrorResponse, ChangePasswordRequest, ForgotPasswordRequest, LoginRequest,
    ResetPasswordBody, TokenResponse,
};
use crate::auth::service::{ResetPasswordRequest, TokenPair};
use crate::auth::{AuthError, AuthState};
use crate::models::ApiResponse;

type AuthRouteResult<T> = Result<Json<ApiResponse<T>>, status::Custom<Json<AuthErrorResponse>>>;

#[openapi(tag = "Auth")]
#[post("/auth/login", data = "<payload>")]
pub async fn login(
    state: &State<AuthState>,
    cookies: &CookieJar<'_>,
    payload: Json<LoginRequest>,
) -> AuthRouteResult<TokenResponse> {
    let pair = state
        .service
        .login(&payload.email, &payload.password)
        .await
        .map_err(respond_error)?;

    set_token_cookies(cookies, &state.config, &pair);
    Ok(Json(ApiResponse::ok("Logged in successfully", token_response(&pair))))
}

#[openapi(tag = "Auth")]
#[post("/auth/refresh-token")]
pub async fn refresh_token(
    state: &State<AuthState>,
    cookies: &CookieJar<'_>,
) -> AuthRouteResult<TokenResponse> {
    let refresh = match cookies.get(&state.config.refresh_cookie_name) {
        Some(cookie) => cookie.value().to_string(),
        None => return Err(respond_error(AuthError::Unauthorized)),
    };

    let pair = state
        .service
        .refresh(&refresh)
        .await
        .map_err(respond_error)?;

    set_token_cookies(cookies, &state.config, &pair);
    Ok(Json(ApiResponse::ok(
        "Access token generated successfully",
        token_response(&pair),
    )))
}

#[openapi(tag = "Auth")]
#[post("/auth/change-password", data = "<payload>")]
pub async fn change_password(
    state: &State<AuthState>,
    user: AuthUser,
    payload: Json<ChangePasswordRequest>,
) -> AuthRouteResult<()> {
    state
        .service
        .change_password(&user.identity, &payload.old_password, &payload.new_password)
        .await
        .map_err(respond_error)?;

    Ok(Json(ApiResponse::ok("Password changed successfully", ())))
}

#[openapi(tag = "Auth")]
#[post("/auth/forgot-password", data = "<payload>")]
pub async fn forgot_password(
    state: &State<AuthState>,
    payload: Json<ForgotPasswordRequest>,
) -> AuthRouteResult<()> {
    state
        .service
        .forgot_password(&payload.email)
        .await
        .map_err(respond_error)?;

    Ok(Json(ApiResponse::ok("Check your email for the reset link", ())))
}

#[openapi(tag = "Auth")]
#[post("/auth/reset-password", data = "<payload>")]
pub async fn reset_password(
    state: &State<AuthState>,
    entry: ResetEntry,
    payload: Json<ResetPasswordBody>,
) -> AuthRouteResult<()> {
    let ResetPasswordBody { email, password } = payload.into_inner();
    state
        .service
        .reset_password(entry.0, email.as_deref(), &password)
        .await
        .map_err(respond_error)?;

    Ok(Json(ApiResponse::ok("Password reset successfully", ())))
}

#[openapi(tag = "Auth")]
#[get("/auth/me")]
pub async fn me(state: &State<AuthState>, cookies: &CookieJar<'_>) -> AuthRouteResult<UserProfile> {
    let token = match cookies.get(&state.config.access_cookie_name) {
        Some(cookie) => cookie.value().to_string(),
        None => return Err(respond_error(AuthError::Unauthorized)),
    };

    let profile = state.service.get_me(&token).await.map_err(respond_error)?;
    Ok(Json(ApiResponse::ok("User retrieved successfully", profile)))
}

#[openapi(tag = "Auth")]
#[post("/auth/logout")]
pub async fn logout(state: &State<AuthState>, cookies: &CookieJar<'_>) -> status::NoContent {
    clear_token_cookies(cookies, &state.config);
    status::NoContent
}

/// How a reset-password request entered: an `Authorization` header carrying a
/// reset token, or else an access cookie that must pass the session guard.
#[derive(Debug)]
pub struct ResetEntry(pub ResetPasswordRequest);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ResetEntry {
    type Error = AuthError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        if let Some(token) = reset_token_from_header(request) {
            return Outcome::Success(ResetEntry(ResetPasswordRequest::from_parts(
                Some(token),
                None,
            )));
        }

        let state = match request.guard::<&State<AuthState>>().await {
            Outcome::Success(state) => state,
            _ => {
                let err = AuthError::Config("AuthState missing from state".into());
                return Outcome::Error((err.status(), err));
            }
        };

        if access_token_from_request(request, &state.config.access_cookie_name).is_none() {
            return Outcome::Success(ResetEntry(ResetPasswordRequest::Invalid));
        }

        match request.guard::<AuthUser>().await {
            Outcome::Success(user) => Outcome::Success(ResetEntry(ResetPasswordRequest::from_parts(
                None,
                Some(user.into_identity()),
            ))),
            Outcome::Error(err) => Outcome::Error(err),
            Outcome::Forward(_) => Outcome::Error((Status::Unauthorized, AuthError::Unauthorized)),
        }
    }
}

impl<'r> OpenApiFromRequest<'r> for ResetEntry {
    fn from_request_input(
        _generator: &mut OpenApiGenerator,
        _name: String,
        _required: bool,
    ) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(RequestHeaderInput::None)
    }
}

/// Reset links hand the token back either raw or with a `Bearer` scheme.
fn reset_token_from_header<'a>(request: &'a Request<'_>) -> Option<&'a str> {
    let header = request.headers().get_one("Authorization")?.trim();
    let token = match header.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("Bearer") => token.trim(),
        _ => header,
    };
    (!token.is_empty()).then_some(token)
}

fn token_response(pair: &TokenPair) -> TokenResponse {
    TokenResponse {
        need_password_change: pair.need_password_change,
        access_token_expires_at: pair.access_token.expires_at,
        refresh_token_expires_at: pair.refresh_token.expires_at,
    }
}

pub(crate) fn respond_error(err: AuthError) -> status::Custom<Json<AuthErrorResponse>> {
    let status = err.status();
    if status == Status::InternalServerError {
        log::error!("auth request failed: {}", err);
    } else {
        log::debug!("auth request rejected: {}", err);
    }

    status::Custom(
        status,
        Json(AuthErrorResponse {
            success: false,
            status: status.code,
            message: err.public_message(),
        }),
    )
}

fn set_token_cookies(cookies: &CookieJar<'_>, config: &AuthConfig, pair: &TokenPair) {
    for (name, token, ttl_secs) in [
        (
            &config.access_cookie_name,
            &pair.access_token.token,
            config.access_token_ttl_secs,
        ),
        (
            &config.refresh_cookie_name,
            &pair.refresh_token.token,
            config.refresh_token_ttl_secs,
        ),
    ] {
        let mut cookie = Cookie::build((name.clone(), token.clone()))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(config.cookie_secure)
            .max_age(TimeDuration::seconds(ttl_secs))
            .build();

        if let Some(domain) = &config.cookie_domain {
            cookie.set_domain(domain.clone());
        }

        cookies.add(cookie);
    }
}

fn clear_token_cookies(cookies: &CookieJar<'_>, config: &AuthConfig) {
    for name in [&config.access_cookie_name, &config.refresh_cookie_name] {
        let mut cookie = Cookie::build((name.clone(), String::new()))
            .path("/")
            .removal()
            .build();

        if let Some(domain) = &config.cookie_domain {
            cookie.set_domain(domain.clone());
        }
        cookies.add(cookie);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_body_hides_internal_details() {
        let response = respond_error(AuthError::Other("pool exhausted".into()));
        assert_eq!(response.0, Status::InternalServerError);
        assert_eq!(response.1.message, "internal server error");
        assert!(!response.1.success);

        let response = respond_error(AuthError::Forbidden);
        assert_eq!(response.0, Status::Forbidden);
        assert_eq!(response.1.status, 403);
    }
}
