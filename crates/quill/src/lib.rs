//! A convention layer turning CRUD-like services into HTTP endpoints.
//!
//! Services implement [`Service`] and are registered on an [`Application`] under a path.
//! Registration runs each service through the mixin pipeline ([`mixin`]) and then through
//! every provider; the [`rest`] provider routes the HTTP verbs of `/{path}` to the service's
//! methods.
//!
//! # Example
//!
//! ```no_run
//! use async_trait::async_trait;
//! use quill::rest::rest;
//! use quill::{Application, MethodSet, Params, Service, ServiceMethod, ServiceResult};
//! use serde_json::{Value, json};
//!
//! struct Todos;
//!
//! #[async_trait]
//! impl Service for Todos {
//!     fn methods(&self) -> MethodSet {
//!         MethodSet::empty().with(ServiceMethod::Get).with(ServiceMethod::Create)
//!     }
//!
//!     async fn get(&self, _params: Params) -> ServiceResult {
//!         Ok(Some(json!([{"text": "write docs"}])))
//!     }
//!
//!     async fn create(&self, data: Value, _params: Params) -> ServiceResult {
//!         Ok(Some(data))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     quill::logging::init(tracing::Level::INFO)?;
//!
//!     let mut app = Application::new();
//!     app.configure(rest())?;
//!     app.add_service("todos", Todos)?;
//!     app.configure_router_use()?;
//!
//!     let handle = app.listen("127.0.0.1:3030").await?;
//!     handle.wait().await?;
//!     Ok(())
//! }
//! ```

mod application;
mod error;
mod node;
mod provider;
mod service;

pub mod config;
pub mod logging;
pub mod mixin;
pub mod rest;

pub use application::{Application, DeferredMount, Mountable, Plugin};
pub use config::AppConfig;
pub use error::{AppError, ErrorKind, ServiceError, ServiceErrorHandler};
pub use node::{ServiceNode, normalize_path};
pub use provider::{Provider, ServiceOptions};
pub use service::{
    BoundService, MethodFn, MethodFuture, MethodSet, Params, Service, ServiceBuilder, ServiceCall, ServiceMethod,
    ServiceResult,
};
