use crate::request::RequestContext;
use crate::response::ResponseState;
use async_trait::async_trait;
use std::error::Error;
use std::sync::Arc;

pub type BoxError = Box<dyn Error + Send + Sync>;

/// What the chain does after a stage returns successfully
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// pass control to the next matching stage
    Next,
    /// the response is complete, stop walking the chain
    Halt,
}

pub type HandlerResult = Result<Flow, BoxError>;

/// One stage of the handler chain.
///
/// Returning an error skips the remaining stages and hands the error, together with the
/// response state as it was left, to the router's [`ErrorHandler`](crate::ErrorHandler).
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn invoke(&self, req: &mut RequestContext, resp: &mut ResponseState) -> HandlerResult;
}

#[async_trait]
impl<T: RequestHandler + ?Sized> RequestHandler for Arc<T> {
    async fn invoke(&self, req: &mut RequestContext, resp: &mut ResponseState) -> HandlerResult {
        (**self).invoke(req, resp).await
    }
}

#[async_trait]
impl<T: RequestHandler + ?Sized> RequestHandler for Box<T> {
    async fn invoke(&self, req: &mut RequestContext, resp: &mut ResponseState) -> HandlerResult {
        (**self).invoke(req, resp).await
    }
}

/// a holder for a synchronous closure used as a [`RequestHandler`]
#[derive(Debug, Clone, Copy)]
pub struct FnHandler<F> {
    f: F,
}

pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: Fn(&mut RequestContext, &mut ResponseState) -> HandlerResult + Send + Sync,
{
    FnHandler { f }
}

#[async_trait]
impl<F> RequestHandler for FnHandler<F>
where
    F: Fn(&mut RequestContext, &mut ResponseState) -> HandlerResult + Send + Sync,
{
    async fn invoke(&self, req: &mut RequestContext, resp: &mut ResponseState) -> HandlerResult {
        (self.f)(req, resp)
    }
}
