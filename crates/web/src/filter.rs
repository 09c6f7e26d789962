//! Predicates deciding whether a route item answers a request.

use crate::RequestContext;
use http::{HeaderName, HeaderValue, Method};

pub trait Filter: Send + Sync {
    fn check(&self, req: &RequestContext) -> bool;
}

impl<F> Filter for F
where
    F: Fn(&RequestContext) -> bool + Send + Sync,
{
    fn check(&self, req: &RequestContext) -> bool {
        self(req)
    }
}

/// Passes when every filter pushed into it passes, so an empty one passes everything
#[derive(Default)]
pub struct AllFilter {
    filters: Vec<Box<dyn Filter>>,
}

impl AllFilter {
    pub fn push<F: Filter + 'static>(&mut self, filter: F) -> &mut Self {
        self.filters.push(Box::new(filter));
        self
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

impl std::fmt::Debug for AllFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AllFilter").field("filters", &self.filters.len()).finish()
    }
}

impl Filter for AllFilter {
    fn check(&self, req: &RequestContext) -> bool {
        self.filters.iter().all(|filter| filter.check(req))
    }
}

#[derive(Debug, Clone)]
pub struct MethodFilter(Method);

impl Filter for MethodFilter {
    fn check(&self, req: &RequestContext) -> bool {
        self.0 == *req.method()
    }
}

#[inline]
pub fn method(method: Method) -> MethodFilter {
    MethodFilter(method)
}

/// Passes when the request carries `name` with exactly `value`
#[derive(Debug, Clone)]
pub struct HeaderFilter {
    name: HeaderName,
    value: HeaderValue,
}

impl Filter for HeaderFilter {
    fn check(&self, req: &RequestContext) -> bool {
        req.headers().get(&self.name).is_some_and(|value| *value == self.value)
    }
}

#[inline]
pub fn header(name: HeaderName, value: HeaderValue) -> HeaderFilter {
    HeaderFilter { name, value }
}
