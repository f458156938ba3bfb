use std::marker::PhantomData;

use rocket::Request;
use rocket::State;
use rocket::request::{FromRequest, Outcome};
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::request::{OpenApiFromRequest, RequestHeaderInput};

use crate::auth::claims::{Identity, Role};
use crate::auth::config::TokenKind;
use crate::auth::jwt::TokenCodec;
use crate::auth::{AuthError, AuthResult, AuthState};

/// Compile-time set of roles a route accepts. An empty set admits any
/// authenticated caller.
pub trait RoleSet: Send + Sync + 'static {
    const ROLES: &'static [Role];
}

#[derive(Debug, Clone, Copy)]
pub struct AnyRole;
impl RoleSet for AnyRole {
    const ROLES: &'static [Role] = &[];
}

#[derive(Debug, Clone, Copy)]
pub struct AdminOnly;
impl RoleSet for AdminOnly {
    const ROLES: &'static [Role] = &[Role::SuperAdmin, Role::Admin];
}

#[derive(Debug, Clone, Copy)]
pub struct DoctorOnly;
impl RoleSet for DoctorOnly {
    const ROLES: &'static [Role] = &[Role::Doctor];
}

#[derive(Debug, Clone, Copy)]
pub struct PatientOnly;
impl RoleSet for PatientOnly {
    const ROLES: &'static [Role] = &[Role::Patient];
}

#[derive(Debug, Clone, Copy)]
pub struct PatientOrDoctor;
impl RoleSet for PatientOrDoctor {
    const ROLES: &'static [Role] = &[Role::Patient, Role::Doctor];
}

#[derive(Debug, Clone, Copy)]
pub struct AdminOrDoctor;
impl RoleSet for AdminOrDoctor {
    const ROLES: &'static [Role] = &[Role::SuperAdmin, Role::Admin, Role::Doctor];
}

/// Request guard: verified access token whose role is in `R`.
#[derive(Debug, Clone)]
pub struct Authorized<R: RoleSet = AnyRole> {
    pub identity: Identity,
    _roles: PhantomData<fn() -> R>,
}

pub type AuthUser = Authorized<AnyRole>;

impl<R: RoleSet> Authorized<R> {
    pub fn into_identity(self) -> Identity {
        self.identity
    }
}

/// Identity resolved for the current request, if any guard verified one.
#[derive(Debug, Clone, Default)]
pub struct RequestIdentity(pub Option<Identity>);

#[rocket::async_trait]
impl<'r, R: RoleSet> FromRequest<'r> for Authorized<R> {
    type Error = AuthError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let state = match request.guard::<&State<AuthState>>().await {
            Outcome::Success(state) => state,
            _ => {
                let err = AuthError::Config("AuthState missing from state".into());
                return Outcome::Error((err.status(), err));
            }
        };

        let token = access_token_from_request(request, &state.config.access_cookie_name);
        let identity = match authenticate(
            token,
            state.service.codec(),
            state.config.secret(TokenKind::Access),
        ) {
            Ok(identity) => identity,
            Err(err) => return Outcome::Error((err.status(), err)),
        };

        request.local_cache(|| RequestIdentity(Some(identity.clone())));

        match require_role(&identity, R::ROLES) {
            Ok(()) => Outcome::Success(Authorized {
                identity,
                _roles: PhantomData,
            }),
            Err(err) => {
                log::debug!("{} ({}) denied: role not permitted", identity.email, identity.role);
                Outcome::Error((err.status(), err))
            }
        }
    }
}

impl<'r, R: RoleSet> OpenApiFromRequest<'r> for Authorized<R> {
    fn from_request_input(
        _generator: &mut OpenApiGenerator,
        _name: String,
        _required: bool,
    ) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(RequestHeaderInput::None)
    }
}

pub fn access_token_from_request<'a>(request: &'a Request<'_>, cookie_name: &str) -> Option<&'a str> {
    request
        .cookies()
        .get(cookie_name)
        .map(|cookie| cookie.value())
        .filter(|value| !value.is_empty())
}

/// Verify an access token. Missing, malformed and expired tokens all come
/// back as [`AuthError::Unauthorized`].
pub fn authenticate(token: Option<&str>, codec: &TokenCodec, secret: &str) -> AuthResult<Identity> {
    let token = token.ok_or(AuthError::Unauthorized)?;
    let claims = codec
        .verify(token, secret)
        .map_err(|_| AuthError::Unauthorized)?;
    Ok(claims.identity())
}

pub fn require_role(identity: &Identity, roles: &[Role]) -> AuthResult<()> {
    if roles.is_empty() || roles.contains(&identity.role) {
        Ok(())
    } else {
        Err(AuthError::Unauthorized)
    }
}

pub fn authorize(
    token: Option<&str>,
    codec: &TokenCodec,
    secret: &str,
    roles: &[Role],
) -> AuthResult<Identity> {
    let identity = authenticate(token, codec, secret)?;
    require_role(&identity, roles)?;
    Ok(identity)
}
