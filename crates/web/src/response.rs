use crate::body::ResponseBody;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue, Response, StatusCode};
use serde_json::Value;

/// The response pending for one request.
///
/// Stages of the handler chain set the status and stash a payload in [`ResponseState::data`];
/// a later stage serializes that payload and [`finish`](ResponseState::finish)es the body.
#[derive(Debug)]
pub struct ResponseState {
    status: StatusCode,
    headers: HeaderMap,
    data: Option<Value>,
    body: Option<ResponseBody>,
}

impl Default for ResponseState {
    fn default() -> Self {
        Self { status: StatusCode::OK, headers: HeaderMap::new(), data: None, body: None }
    }
}

impl ResponseState {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// the payload waiting to be serialized
    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    pub fn set_data(&mut self, data: Option<Value>) {
        self.data = data;
    }

    pub fn take_data(&mut self) -> Option<Value> {
        self.data.take()
    }

    pub fn finish(&mut self, body: impl Into<ResponseBody>) {
        self.body = Some(body.into());
    }

    pub fn is_finished(&self) -> bool {
        self.body.is_some()
    }

    /// Serializes `value` as the response body with an `application/json` content type
    pub fn json(&mut self, value: &Value) -> Result<(), serde_json::Error> {
        let bytes = serde_json::to_vec(value)?;
        self.headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.finish(bytes);
        Ok(())
    }

    pub fn into_response(self) -> Response<ResponseBody> {
        let mut response = Response::new(self.body.unwrap_or_default());
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}
