//! The error pipeline: what happens to an error returned by a stage of the handler chain.

use crate::handler::BoxError;
use crate::request::RequestContext;
use crate::response::ResponseState;
use http::StatusCode;
use serde_json::{Value, json};
use tracing::{debug, error};

/// Turns an error raised inside the handler chain into the final response.
///
/// The response state is handed over as the failing stage left it, so a status set right
/// before the error was raised is still visible here.
pub trait ErrorHandler: Send + Sync {
    fn handle(&self, error: BoxError, req: &RequestContext, resp: &mut ResponseState);
}

/// Writes `{"name", "message", "code"}` as JSON.
///
/// The status already set on the response is kept when it is an error status, otherwise
/// the response becomes a 500.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonErrorHandler;

impl ErrorHandler for JsonErrorHandler {
    fn handle(&self, error: BoxError, req: &RequestContext, resp: &mut ResponseState) {
        let status = resp.status();
        if !status.is_client_error() && !status.is_server_error() {
            resp.set_status(StatusCode::INTERNAL_SERVER_ERROR);
        }

        log_error(req, resp.status(), error.as_ref());
        write_error(resp, &error_body(resp.status(), &error.to_string()));
    }
}

/// the JSON shape used for error responses
pub fn error_body(status: StatusCode, message: &str) -> Value {
    json!({
        "name": status.canonical_reason().unwrap_or("Unknown").replace(' ', ""),
        "message": message,
        "code": status.as_u16(),
    })
}

/// Writes `body` as the JSON error payload, dropping any payload still pending
pub fn write_error(resp: &mut ResponseState, body: &Value) {
    resp.set_data(None);
    if let Err(e) = resp.json(body) {
        error!(cause = %e, "serialize error body failed");
        resp.finish(());
    }
}

pub(crate) fn log_error(req: &RequestContext, status: StatusCode, error: &(dyn std::error::Error + Send + Sync)) {
    if status.is_server_error() {
        error!(method = %req.method(), path = req.uri().path(), status = status.as_u16(), cause = %error, "request failed");
    } else {
        debug!(method = %req.method(), path = req.uri().path(), status = status.as_u16(), cause = %error, "request rejected");
    }
}

#[cfg(test)]
mod tests {
    use super::{ErrorHandler, JsonErrorHandler, error_body};
    use crate::{RequestContext, ResponseState};
    use bytes::Bytes;
    use http::{Request, StatusCode};
    use serde_json::{Value, json};
    use std::io;

    fn request() -> RequestContext {
        RequestContext::from(Request::builder().uri("/todos").body(Bytes::new()).unwrap())
    }

    #[test]
    fn test_error_body_shape() {
        assert_eq!(
            error_body(StatusCode::NOT_FOUND, "Page not found"),
            json!({"name": "NotFound", "message": "Page not found", "code": 404})
        );
        assert_eq!(error_body(StatusCode::METHOD_NOT_ALLOWED, "nope")["name"], "MethodNotAllowed");
    }

    #[test]
    fn test_keeps_error_status_already_set() {
        let mut resp = ResponseState::default();
        resp.set_status(StatusCode::METHOD_NOT_ALLOWED);

        JsonErrorHandler.handle(Box::new(io::Error::other("not here")), &request(), &mut resp);

        let response = resp.into_response();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        let body: Value = serde_json::from_slice(response.body().bytes().unwrap()).unwrap();
        assert_eq!(body["message"], "not here");
    }

    #[test]
    fn test_success_status_becomes_500() {
        let mut resp = ResponseState::default();
        resp.set_data(Some(json!({"stale": true})));

        JsonErrorHandler.handle(Box::new(io::Error::other("boom")), &request(), &mut resp);

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(resp.data().is_none());
        assert!(resp.is_finished());
    }
}
