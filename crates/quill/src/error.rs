//! Error types of the service layer.
//!
//! [`ServiceError`] is the taxonomy services use to fail a call; each [`ErrorKind`] maps to a
//! fixed HTTP status. [`AppError`] covers registration and lifecycle failures of the
//! [`Application`](crate::Application) itself.

use http::StatusCode;
use quill_web::error::{ErrorHandler, write_error};
use quill_web::extract::ExtractError;
use quill_web::router::RouterError;
use quill_web::{BoxError, RequestContext, ResponseState, ServerBuildError, ServerError};
use serde_json::{Map, Value};
use std::fmt;
use std::io;
use thiserror::Error;
use tracing::{debug, error};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    BadRequest,
    NotAuthenticated,
    PaymentError,
    Forbidden,
    NotFound,
    MethodNotAllowed,
    NotAcceptable,
    Timeout,
    Conflict,
    Unprocessable,
    GeneralError,
    NotImplemented,
    Unavailable,
}

impl ErrorKind {
    pub fn status(self) -> StatusCode {
        match self {
            Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::NotAuthenticated => StatusCode::UNAUTHORIZED,
            Self::PaymentError => StatusCode::PAYMENT_REQUIRED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::NotAcceptable => StatusCode::NOT_ACCEPTABLE,
            Self::Timeout => StatusCode::REQUEST_TIMEOUT,
            Self::Conflict => StatusCode::CONFLICT,
            Self::Unprocessable => StatusCode::UNPROCESSABLE_ENTITY,
            Self::GeneralError => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotImplemented => StatusCode::NOT_IMPLEMENTED,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::BadRequest => "BadRequest",
            Self::NotAuthenticated => "NotAuthenticated",
            Self::PaymentError => "PaymentError",
            Self::Forbidden => "Forbidden",
            Self::NotFound => "NotFound",
            Self::MethodNotAllowed => "MethodNotAllowed",
            Self::NotAcceptable => "NotAcceptable",
            Self::Timeout => "Timeout",
            Self::Conflict => "Conflict",
            Self::Unprocessable => "Unprocessable",
            Self::GeneralError => "GeneralError",
            Self::NotImplemented => "NotImplemented",
            Self::Unavailable => "Unavailable",
        }
    }

    /// the kebab-case form sent as `className`
    pub fn class_name(self) -> &'static str {
        match self {
            Self::BadRequest => "bad-request",
            Self::NotAuthenticated => "not-authenticated",
            Self::PaymentError => "payment-error",
            Self::Forbidden => "forbidden",
            Self::NotFound => "not-found",
            Self::MethodNotAllowed => "method-not-allowed",
            Self::NotAcceptable => "not-acceptable",
            Self::Timeout => "timeout",
            Self::Conflict => "conflict",
            Self::Unprocessable => "unprocessable",
            Self::GeneralError => "general-error",
            Self::NotImplemented => "not-implemented",
            Self::Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A named failure raised by a service or by the REST layer on its behalf
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind}: {message}")]
pub struct ServiceError {
    kind: ErrorKind,
    message: String,
    data: Option<Value>,
}

macro_rules! service_error_ctor {
    ($fn_name:ident, $kind:ident) => {
        pub fn $fn_name(message: impl Into<String>) -> Self {
            Self::new(ErrorKind::$kind, message)
        }
    };
}

impl ServiceError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), data: None }
    }

    service_error_ctor!(bad_request, BadRequest);
    service_error_ctor!(not_authenticated, NotAuthenticated);
    service_error_ctor!(forbidden, Forbidden);
    service_error_ctor!(not_found, NotFound);
    service_error_ctor!(method_not_allowed, MethodNotAllowed);
    service_error_ctor!(not_acceptable, NotAcceptable);
    service_error_ctor!(conflict, Conflict);
    service_error_ctor!(unprocessable, Unprocessable);
    service_error_ctor!(general, GeneralError);
    service_error_ctor!(not_implemented, NotImplemented);
    service_error_ctor!(unavailable, Unavailable);

    /// attaches extra detail sent back to the client as `data`
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    pub fn status(&self) -> StatusCode {
        self.kind.status()
    }

    /// The JSON payload sent for this error
    pub fn to_json(&self) -> Value {
        let mut body = Map::new();
        body.insert("name".into(), self.kind.name().into());
        body.insert("message".into(), self.message.clone().into());
        body.insert("code".into(), self.status().as_u16().into());
        body.insert("className".into(), self.kind.class_name().into());
        if let Some(data) = &self.data {
            body.insert("data".into(), data.clone());
        }
        Value::Object(body)
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("can not register service `{path}` after setup has been called")]
    SetupAlreadyCompleted { path: String },

    #[error("`{path}` exposes none of the service methods")]
    NotAService { path: String },

    #[error("the router has already been built")]
    RouterFrozen,

    #[error("invalid route: {0}")]
    Route(#[from] RouterError),

    #[error("build server error: {0}")]
    ServerBuild(#[from] ServerBuildError),

    #[error("server error: {0}")]
    Server(#[from] ServerError),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// The error pipeline installed by every [`Application`](crate::Application).
///
/// A [`ServiceError`] answers with its own status and payload. A body or query that could not
/// be decoded is a 400. Any other error keeps an error status already set on the response,
/// or becomes a 500 `GeneralError`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ServiceErrorHandler;

impl ErrorHandler for ServiceErrorHandler {
    fn handle(&self, error: BoxError, req: &RequestContext, resp: &mut ResponseState) {
        let service_error = match error.downcast::<ServiceError>() {
            Ok(service_error) => *service_error,
            Err(error) => {
                if let Some(extract_error) = error.downcast_ref::<ExtractError>() {
                    ServiceError::bad_request(extract_error.to_string())
                } else {
                    let status = resp.status();
                    let kind = if status.is_client_error() || status.is_server_error() {
                        kind_for_status(status)
                    } else {
                        ErrorKind::GeneralError
                    };
                    ServiceError::new(kind, error.to_string())
                }
            }
        };

        let status = service_error.status();
        if status.is_server_error() {
            error!(method = %req.method(), path = req.uri().path(), cause = %service_error, "service call failed");
        } else {
            debug!(method = %req.method(), path = req.uri().path(), cause = %service_error, "service call rejected");
        }

        resp.set_status(status);
        write_error(resp, &service_error.to_json());
    }
}

fn kind_for_status(status: StatusCode) -> ErrorKind {
    match status {
        StatusCode::BAD_REQUEST => ErrorKind::BadRequest,
        StatusCode::UNAUTHORIZED => ErrorKind::NotAuthenticated,
        StatusCode::PAYMENT_REQUIRED => ErrorKind::PaymentError,
        StatusCode::FORBIDDEN => ErrorKind::Forbidden,
        StatusCode::NOT_FOUND => ErrorKind::NotFound,
        StatusCode::METHOD_NOT_ALLOWED => ErrorKind::MethodNotAllowed,
        StatusCode::NOT_ACCEPTABLE => ErrorKind::NotAcceptable,
        StatusCode::REQUEST_TIMEOUT => ErrorKind::Timeout,
        StatusCode::CONFLICT => ErrorKind::Conflict,
        StatusCode::UNPROCESSABLE_ENTITY => ErrorKind::Unprocessable,
        StatusCode::NOT_IMPLEMENTED => ErrorKind::NotImplemented,
        StatusCode::SERVICE_UNAVAILABLE => ErrorKind::Unavailable,
        status if status.is_client_error() => ErrorKind::BadRequest,
        _ => ErrorKind::GeneralError,
    }
}
