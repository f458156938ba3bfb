use rocket::fairing::{Fairing, Info, Kind};
use rocket::http::Status;
use rocket::{Data, Request, Response};
use std::time::Instant;

use crate::auth::guards::RequestIdentity;

/// Fairing to log one line per HTTP request with timing.
///
/// Only the path is logged; query strings may carry reset tokens.
pub struct RequestLogger;

#[rocket::async_trait]
impl Fairing for RequestLogger {
    fn info(&self) -> Info {
        Info {
            name: "Request Logger",
            kind: Kind::Request | Kind::Response,
        }
    }

    async fn on_request(&self, request: &mut Request<'_>, _: &mut Data<'_>) {
        request.local_cache(Instant::now);
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
        let elapsed_ms = request.local_cache(Instant::now).elapsed().as_secs_f64() * 1000.0;
        let status = response.status();
        let line = request_line(request, status, elapsed_ms);

        if status.code >= 400 && request.uri().path().as_str().contains("/auth/") {
            log::warn!("{}", line);
        } else {
            log::info!("{}", line);
        }
    }
}

fn request_line(request: &Request<'_>, status: Status, elapsed_ms: f64) -> String {
    let caller = request
        .local_cache(RequestIdentity::default)
        .0
        .as_ref()
        .map(|identity| identity.role.as_str())
        .unwrap_or("anonymous");

    format!(
        "{} {} -> {} [{}] ({:.2}ms)",
        request.method(),
        request.uri().path(),
        status.code,
        caller,
        elapsed_ms
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestRocketBuilder;

    #[test]
    fn log_line_omits_query_string() {
        let client = TestRocketBuilder::new().blocking_client();
        let request = client.get("/api/v1/auth/reset-password?email=p%40x.com&token=secret-token");

        let line = request_line(&request, Status::Forbidden, 1.5);
        assert_eq!(line, "GET /api/v1/auth/reset-password -> 403 [anonymous] (1.50ms)");
        assert!(!line.contains("secret-token"));
    }
}
