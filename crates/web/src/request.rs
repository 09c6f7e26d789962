//! Request handling module that provides access to HTTP request information and path parameters.
//!
//! This module contains the core types for working with HTTP requests in the web framework:
//! - `RequestContext`: Provides access to request headers, the collected body, path parameters
//!   and the request-scoped context bag
//! - `PathParams`: Handles URL path parameters extracted from request paths

use bytes::Bytes;
use http::request::Parts;
use http::{Extensions, HeaderMap, Method, Request, Uri, Version};
use matchit::Params;
use serde_json::{Map, Value};

/// Represents one inbound request as it travels through the handler chain.
///
/// The body is collected before dispatch, so every stage can read it. The context bag is
/// absent until some middleware calls [`RequestContext::init_context`]; afterwards other
/// stages may inject values into it.
#[derive(Debug)]
pub struct RequestContext {
    parts: Parts,
    body: Bytes,
    path_params: PathParams,
    context: Option<Map<String, Value>>,
}

impl RequestContext {
    /// Creates a new RequestContext from the request head and its collected body
    pub fn new(parts: Parts, body: Bytes) -> Self {
        Self { parts, body, path_params: PathParams::empty(), context: None }
    }

    /// Returns the HTTP method of the request
    pub fn method(&self) -> &Method {
        &self.parts.method
    }

    /// Returns the URI of the request
    pub fn uri(&self) -> &Uri {
        &self.parts.uri
    }

    /// Returns the HTTP version of the request
    pub fn version(&self) -> Version {
        self.parts.version
    }

    /// Returns the HTTP headers of the request
    pub fn headers(&self) -> &HeaderMap {
        &self.parts.headers
    }

    /// Returns the typed extensions attached to the request
    pub fn extensions(&self) -> &Extensions {
        &self.parts.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.parts.extensions
    }

    /// Returns the collected request body
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Returns a reference to the path parameters of the layer currently handling the request
    pub fn path_params(&self) -> &PathParams {
        &self.path_params
    }

    /// Replaces the path parameters, the router does this before running each layer
    pub fn set_path_params(&mut self, path_params: PathParams) {
        self.path_params = path_params;
    }

    /// Attaches an empty context bag, replacing any previous one
    pub fn init_context(&mut self) {
        self.context = Some(Map::new());
    }

    pub fn context(&self) -> Option<&Map<String, Value>> {
        self.context.as_ref()
    }

    pub fn context_mut(&mut self) -> Option<&mut Map<String, Value>> {
        self.context.as_mut()
    }
}

impl From<Request<Bytes>> for RequestContext {
    fn from(request: Request<Bytes>) -> Self {
        let (parts, body) = request.into_parts();
        Self::new(parts, body)
    }
}

/// Represents path parameters extracted from the URL path of an HTTP request.
///
/// Path parameters are named segments in the URL path that can be extracted and accessed
/// by name. For example, in the path "/users/{id}", "id" is a path parameter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams {
    inner: Vec<(String, String)>,
}

impl PathParams {
    /// Creates an empty PathParams instance with no parameters
    #[inline]
    pub fn empty() -> Self {
        Self { inner: Vec::new() }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Gets the value of a path parameter by its name
    /// Returns None if the parameter doesn't exist
    pub fn get(&self, key: impl AsRef<str>) -> Option<&str> {
        let key = key.as_ref();
        self.inner.iter().find(|(name, _)| name == key).map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(name, value)| (name.as_str(), value.as_str()))
    }
}

impl From<Params<'_, '_>> for PathParams {
    fn from(params: Params<'_, '_>) -> Self {
        Self { inner: params.iter().map(|(name, value)| (name.to_owned(), value.to_owned())).collect() }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for PathParams {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self { inner: iter.into_iter().map(|(name, value)| (name.into(), value.into())).collect() }
    }
}
