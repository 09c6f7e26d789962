use crate::error::{error_body, write_error};
use crate::router::Router;
use crate::{ResponseBody, ResponseState};
use http::{Request, Response, StatusCode};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// the default limit for a collected request body: 2 MiB
pub const DEFAULT_MAX_BODY_SIZE: usize = 2 * 1024 * 1024;

/// how long the accept loop pauses after a failed accept, e.g. when out of file descriptors
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug)]
enum Binding {
    Address(Vec<SocketAddr>),
    Listener(TcpListener),
}

pub struct ServerBuilder {
    router: Option<Router>,
    binding: Option<io::Result<Binding>>,
    max_body_size: usize,
}

impl ServerBuilder {
    fn new() -> Self {
        Self { router: None, binding: None, max_body_size: DEFAULT_MAX_BODY_SIZE }
    }

    pub fn address<A: ToSocketAddrs>(mut self, address: A) -> Self {
        self.binding = Some(address.to_socket_addrs().map(|addrs| Binding::Address(addrs.collect())));
        self
    }

    /// serve on an already bound listener instead of an address
    pub fn listener(mut self, listener: TcpListener) -> Self {
        self.binding = Some(Ok(Binding::Listener(listener)));
        self
    }

    pub fn router(mut self, router: Router) -> Self {
        self.router = Some(router);
        self
    }

    pub fn max_body_size(mut self, max_body_size: usize) -> Self {
        self.max_body_size = max_body_size;
        self
    }

    pub fn build(self) -> Result<Server, ServerBuildError> {
        let router = self.router.ok_or(ServerBuildError::MissingRouter)?;
        let binding = self.binding.ok_or(ServerBuildError::MissingAddress)?.map_err(ServerBuildError::InvalidAddress)?;
        Ok(Server { router, binding, max_body_size: self.max_body_size })
    }
}

impl std::fmt::Debug for ServerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerBuilder").field("max_body_size", &self.max_body_size).finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct Server {
    router: Router,
    binding: Binding,
    max_body_size: usize,
}

#[derive(Error, Debug)]
pub enum ServerBuildError {
    #[error("router must be set")]
    MissingRouter,
    #[error("address must be set")]
    MissingAddress,
    #[error("invalid address: {0}")]
    InvalidAddress(#[source] io::Error),
}

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("bind server error: {0}")]
    Bind(#[source] io::Error),
    #[error("server task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// A running server.
///
/// Dropping the handle leaves the server running; call [`ServerHandle::shutdown`] to stop
/// accepting connections.
#[derive(Debug)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// stops accepting new connections, connections already accepted run to completion
    pub fn shutdown(&self) {
        if self.shutdown.send(()).is_err() {
            debug!(local_addr = %self.local_addr, "server already stopped");
        }
    }

    pub async fn wait(self) -> Result<(), ServerError> {
        self.task.await?;
        Ok(())
    }

    pub async fn stop(self) -> Result<(), ServerError> {
        self.shutdown();
        self.wait().await
    }
}

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Binds the listener and spawns the accept loop
    pub async fn bind(self) -> Result<ServerHandle, ServerError> {
        let Server { router, binding, max_body_size } = self;

        let tcp_listener = match binding {
            Binding::Listener(listener) => listener,
            Binding::Address(address) => TcpListener::bind(address.as_slice()).await.map_err(ServerError::Bind)?,
        };
        let local_addr = tcp_listener.local_addr().map_err(ServerError::Bind)?;
        info!(%local_addr, "start listening");

        let (shutdown, shutdown_rx) = broadcast::channel(1);
        let service = Arc::new(HttpService { router, max_body_size });
        let task = tokio::spawn(accept_loop(tcp_listener, service, shutdown_rx));

        Ok(ServerHandle { local_addr, shutdown, task })
    }

    /// Binds and serves until the accept loop ends
    pub async fn start(self) -> Result<(), ServerError> {
        self.bind().await?.wait().await
    }
}

struct HttpService {
    router: Router,
    max_body_size: usize,
}

impl HttpService {
    async fn call(&self, request: Request<Incoming>) -> Response<ResponseBody> {
        let (parts, body) = request.into_parts();

        match Limited::new(body, self.max_body_size).collect().await {
            Ok(collected) => self.router.dispatch(Request::from_parts(parts, collected.to_bytes())).await,
            Err(e) => {
                let status = if e.downcast_ref::<LengthLimitError>().is_some() {
                    StatusCode::PAYLOAD_TOO_LARGE
                } else {
                    StatusCode::BAD_REQUEST
                };
                warn!(cause = %e, path = parts.uri.path(), "read request body error");

                let mut resp = ResponseState::default();
                resp.set_status(status);
                write_error(&mut resp, &error_body(status, &e.to_string()));
                resp.into_response()
            }
        }
    }
}

async fn back_off_after_accept_error(e: &io::Error) {
    warn!(cause = %e, backoff = ?ACCEPT_ERROR_BACKOFF, "failed to accept");
    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
}

async fn accept_loop(tcp_listener: TcpListener, service: Arc<HttpService>, mut shutdown: broadcast::Receiver<()>) {
    loop {
        let (tcp_stream, remote_addr) = tokio::select! {
            _ = shutdown.recv() => {
                info!("stop listening");
                return;
            }
            accepted = tcp_listener.accept() => match accepted {
                Ok(stream_and_addr) => stream_and_addr,
                Err(e) => {
                    back_off_after_accept_error(&e).await;
                    continue;
                }
            },
        };

        let service = Arc::clone(&service);

        tokio::spawn(async move {
            let handler = service_fn(move |request: Request<Incoming>| {
                let service = Arc::clone(&service);
                async move { Ok::<_, Infallible>(service.call(request).await) }
            });

            match http1::Builder::new().serve_connection(TokioIo::new(tcp_stream), handler).await {
                Ok(()) => {
                    debug!(%remote_addr, "finished process, connection shutdown");
                }
                Err(e) => {
                    error!(%remote_addr, cause = %e, "service has error, connection shutdown");
                }
            }
        });
    }
}
