use crate::error::ServiceError;
use crate::service::{BoundService, Params, ServiceCall, ServiceMethod};
use async_trait::async_trait;
use http::StatusCode;
use quill_web::extract::{ExtractError, body_value, query_map};
use quill_web::{Flow, HandlerResult, RequestContext, RequestHandler, ResponseState};
use serde_json::{Map, Value};
use std::fmt;
use std::num::FpCategory;
use std::sync::Arc;
use tracing::trace;

/// the path parameter update and patch receive as their id
pub const ID_PARAM: &str = "id";

/// Answers one HTTP verb by calling one method of a service.
///
/// On success the result is left in the response as pending data and the chain continues, so
/// a later handler can serialize it.
pub struct MethodWrapper {
    method: ServiceMethod,
    service: Arc<BoundService>,
}

impl MethodWrapper {
    pub fn new(method: ServiceMethod, service: Arc<BoundService>) -> Self {
        Self { method, service }
    }
}

impl fmt::Debug for MethodWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodWrapper").field("method", &self.method).finish_non_exhaustive()
    }
}

#[async_trait]
impl RequestHandler for MethodWrapper {
    async fn invoke(&self, req: &mut RequestContext, resp: &mut ResponseState) -> HandlerResult {
        if !self.service.supports(self.method) {
            resp.set_status(StatusCode::METHOD_NOT_ALLOWED);
            return Err(ServiceError::method_not_allowed(format!(
                "Method `{}` is not supported by this endpoint.",
                self.method
            ))
            .into());
        }

        let call = service_call(self.method, req)?;
        trace!(method = %self.method, path = req.uri().path(), "calling service");

        let data = self.service.call(self.method, call).await?;
        finalize(self.method, data, resp);
        Ok(Flow::Next)
    }
}

/// Extracts the arguments of `method` from the request
pub fn service_call(method: ServiceMethod, req: &RequestContext) -> Result<ServiceCall, ExtractError> {
    let (id, data) = match method {
        ServiceMethod::Get | ServiceMethod::Remove => (None, Value::Null),
        ServiceMethod::Create => (None, body_value(req)?),
        ServiceMethod::Update | ServiceMethod::Patch => {
            (req.path_params().get(ID_PARAM).map(str::to_owned), body_value(req)?)
        }
    };
    Ok(ServiceCall { id, data, params: build_params(req)? })
}

/// Collects the params of a service call.
///
/// The query goes under `query`, then every path parameter but `id` and every entry of the
/// request's context bag is added at the top level, later entries replacing earlier ones.
pub fn build_params(req: &RequestContext) -> Result<Params, ExtractError> {
    let mut params = Map::new();
    params.insert("query".to_owned(), Value::Object(query_map(req)?));

    for (name, value) in req.path_params().iter().filter(|(name, _)| *name != ID_PARAM) {
        params.insert(name.to_owned(), Value::String(value.to_owned()));
    }

    if let Some(context) = req.context() {
        for (key, value) in context {
            params.insert(key.clone(), value.clone());
        }
    }

    Ok(Params::from(params))
}

/// Sets the status for a successful call and leaves `data` pending on the response.
///
/// - no data, or a falsy one, is a 204
/// - a `create` is a 201
/// - a truthy `response` field is dropped, its `status` overriding the status
/// - a non-empty `errors` array turns a plain 200 into a 400
pub fn finalize(method: ServiceMethod, data: Option<Value>, resp: &mut ResponseState) {
    let mut data = data.unwrap_or(Value::Null);

    if is_falsy(&data) {
        resp.set_status(StatusCode::NO_CONTENT);
    } else if method == ServiceMethod::Create {
        resp.set_status(StatusCode::CREATED);
    }

    if let Some(object) = data.as_object_mut() {
        if object.get("response").is_some_and(|response| !is_falsy(response)) {
            let status = object
                .shift_remove("response")
                .as_ref()
                .and_then(|response| response.get("status"))
                .and_then(Value::as_u64)
                .and_then(|status| u16::try_from(status).ok())
                .and_then(|status| StatusCode::from_u16(status).ok());
            if let Some(status) = status {
                resp.set_status(status);
            }
        }

        let has_errors = object.get("errors").and_then(Value::as_array).is_some_and(|errors| !errors.is_empty());
        if has_errors && resp.status() == StatusCode::OK {
            resp.set_status(StatusCode::BAD_REQUEST);
        }
    }

    resp.set_data(Some(data));
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(value) => !value,
        Value::Number(number) => number.as_f64().is_some_and(|number| number.classify() == FpCategory::Zero),
        Value::String(value) => value.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}
