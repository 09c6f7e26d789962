//! Request body and query string extraction.
//!
//! Both extractors produce loosely typed [`serde_json`] values, which is what the
//! service layer hands to services. The body is decoded according to its content type:
//! url-encoded forms through `serde_urlencoded`, everything else as JSON. Query strings
//! go through `serde_qs`, so bracketed keys such as `filter[done]=true` become nested
//! objects.

use crate::RequestContext;
use http::HeaderMap;
use http::header::CONTENT_TYPE;
use http::StatusCode;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("invalid json body: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid form body: {0}")]
    Form(#[from] serde_urlencoded::de::Error),

    #[error("invalid query string: {0}")]
    Query(#[from] serde_qs::Error),
}

impl ExtractError {
    /// every extraction failure is the client's fault
    pub fn status(&self) -> StatusCode {
        StatusCode::BAD_REQUEST
    }
}

/// Decodes the collected request body, an empty body becomes [`Value::Null`]
pub fn body_value(req: &RequestContext) -> Result<Value, ExtractError> {
    let body = req.body();
    if body.is_empty() {
        return Ok(Value::Null);
    }

    if is_form(req.headers()) {
        let pairs = serde_urlencoded::from_bytes::<Vec<(String, String)>>(body)?;
        return Ok(Value::Object(pairs.into_iter().map(|(key, value)| (key, Value::String(value))).collect()));
    }

    Ok(serde_json::from_slice(body)?)
}

/// Decodes the query string into an object, an absent query becomes an empty object
pub fn query_map(req: &RequestContext) -> Result<Map<String, Value>, ExtractError> {
    match req.uri().query() {
        None | Some("") => Ok(Map::new()),
        Some(query) => Ok(serde_qs::from_str::<Map<String, Value>>(query)?),
    }
}

fn is_form(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<mime::Mime>().ok())
        .is_some_and(|mime| mime.type_() == mime::APPLICATION && mime.subtype() == mime::WWW_FORM_URLENCODED)
}
