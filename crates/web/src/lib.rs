//! The transport layer underneath quill.
//!
//! This crate provides the HTTP primitives the service layer is built on:
//!
//! - [`RequestContext`] and [`ResponseState`]: one inbound request and the response pending for it
//! - [`RequestHandler`]: a stage of the handler chain, returning [`Flow`] to continue or halt
//! - [`router::RouterBuilder`]: method-filtered routes and prefix mounts kept in registration order
//! - [`Server`]: a tokio accept loop serving a frozen [`Router`] over HTTP/1.1
//!
//! # Example
//!
//! ```no_run
//! use quill_web::router::get;
//! use quill_web::{handler_fn, Flow, Router, Server};
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut builder = Router::builder();
//!     builder.route(
//!         "/",
//!         get(handler_fn(|_req, resp| {
//!             resp.finish("hello world");
//!             Ok(Flow::Halt)
//!         })),
//!     );
//!
//!     let handle = Server::builder()
//!         .router(builder.build().unwrap())
//!         .address("127.0.0.1:8080")
//!         .build()
//!         .unwrap()
//!         .bind()
//!         .await
//!         .unwrap();
//!
//!     handle.wait().await.unwrap();
//! }
//! ```

mod body;
mod handler;
mod request;
mod response;
mod server;

pub mod error;
pub mod extract;
pub mod filter;
pub mod router;

pub use body::ResponseBody;
pub use error::{ErrorHandler, JsonErrorHandler};
pub use handler::{BoxError, Flow, FnHandler, HandlerResult, RequestHandler, handler_fn};
pub use request::{PathParams, RequestContext};
pub use response::ResponseState;
pub use router::Router;
pub use server::{DEFAULT_MAX_BODY_SIZE, Server, ServerBuildError, ServerBuilder, ServerError, ServerHandle};
