//! JSON bodies for requests rejected before a handler ran, such as a guard
//! refusing a missing or invalid access token.

use rocket::Request;
use rocket::http::Status;
use rocket::serde::json::Json;

use crate::auth::responses::AuthErrorResponse;

fn body(status: Status, message: &str) -> Json<AuthErrorResponse> {
    Json(AuthErrorResponse {
        success: false,
        status: status.code,
        message: message.to_string(),
    })
}

#[catch(400)]
pub fn bad_request(_: &Request) -> Json<AuthErrorResponse> {
    body(Status::BadRequest, "bad request")
}

#[catch(401)]
pub fn unauthorized(_: &Request) -> Json<AuthErrorResponse> {
    body(Status::Unauthorized, "you are not authorized")
}

#[catch(403)]
pub fn forbidden(_: &Request) -> Json<AuthErrorResponse> {
    body(Status::Forbidden, "forbidden")
}

#[catch(404)]
pub fn not_found(_: &Request) -> Json<AuthErrorResponse> {
    body(Status::NotFound, "not found")
}

#[catch(422)]
pub fn unprocessable(_: &Request) -> Json<AuthErrorResponse> {
    body(Status::UnprocessableEntity, "request body is malformed")
}

#[catch(500)]
pub fn internal_error(_: &Request) -> Json<AuthErrorResponse> {
    body(Status::InternalServerError, "internal server error")
}
