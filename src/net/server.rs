//! Core HTTP server implementation.
//!
//! This module implements the low-level HTTP server runtime.
//! It is responsible only for networking concerns such as:
//! - accepting TCP connections,
//! - reading raw bytes from the network,
//! - writing raw bytes back to the client.
//!
//! Request parsing is delegated to [`http::parser`](crate::http::parser)
//! and response generation to a [`Handler`], usually the server's
//! [`ServeMux`].
//!
//! ## Connection lifecycle
//!
//! Every accepted connection is owned by its own task, which walks through
//! [`ConnState`]:
//!
//! 1. `Accepted`: the task takes exclusive ownership of the stream
//! 2. `Reading`: bytes are fed to the parser until a request is complete
//! 3. `Dispatching`: the handler runs on the blocking pool, panics caught
//! 4. `Writing`: the encoded response is written back
//! 5. `Closed`: the stream is dropped, whatever the exit path
//!
//! With keep-alive the task loops back to `Reading` for the next request,
//! one request at a time. A malformed request, an I/O failure or a panicking
//! handler ends only the connection it happened on.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use async_std::net::{TcpListener, TcpStream, ToSocketAddrs};
use async_std::prelude::*;
use async_std::task;
use thiserror::Error;
use tracing::Instrument;

use crate::config::ServerConfig;
use crate::handler::{Handler, ServeMux};
use crate::http::parser::{ParseError, RequestLimits, RequestParser};
use crate::http::request::HttpRequest;
use crate::http::response::{HttpResponse, ResponseHeader};
use crate::http::{HttpMethod, HttpVersion};

const ACCEPT_BACKOFF_START: Duration = Duration::from_millis(5);
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind listener: {0}")]
    Bind(#[source] io::Error),
    #[error("listener error: {0}")]
    Io(#[from] io::Error),
}

/// Stages a connection task goes through, reported to the hook installed
/// with [`Server::on_conn_state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Accepted,
    Reading,
    Dispatching,
    Writing,
    Closed,
}

impl fmt::Display for ConnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnState::Accepted => "accepted",
            ConnState::Reading => "reading",
            ConnState::Dispatching => "dispatching",
            ConnState::Writing => "writing",
            ConnState::Closed => "closed",
        };
        f.write_str(s)
    }
}

pub type ConnStateHook = Arc<dyn Fn(SocketAddr, ConnState) + Send + Sync>;

/// Errors that end a connection task. They are logged by the task and
/// never reach the listener loop.
#[derive(Debug, Error)]
enum ConnError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("peer closed the connection mid-request")]
    ClosedMidRequest,
    #[error("malformed request: {0}")]
    Malformed(#[from] ParseError),
    #[error("handler panicked: {0}")]
    HandlerPanic(String),
}

/// Server context: configuration, the default [`ServeMux`] and the
/// optional connection state hook. Cheap to share between the listener
/// loop and its connection tasks.
pub struct Server {
    config: Arc<ServerConfig>,
    mux: Arc<ServeMux>,
    conn_state: Option<ConnStateHook>,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config: Arc::new(config),
            mux: Arc::new(ServeMux::new()),
            conn_state: None,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The default router, used whenever no explicit handler is given.
    pub fn mux(&self) -> &Arc<ServeMux> {
        &self.mux
    }

    /// Installs a callback invoked on every connection state transition.
    pub fn on_conn_state<F>(mut self, hook: F) -> Self
    where
        F: Fn(SocketAddr, ConnState) + Send + Sync + 'static,
    {
        self.conn_state = Some(Arc::new(hook));
        self
    }

    /// Binds the configured address and port and serves the default router.
    pub async fn run(&self) -> Result<(), ServerError> {
        self.listen_and_serve((self.config.address, self.config.port), None)
            .await
    }

    /// Binds `addr` and serves `handler`, or the default router when `None`.
    /// Only returns if binding fails.
    pub async fn listen_and_serve<A: ToSocketAddrs>(
        &self,
        addr: A,
        handler: Option<Arc<dyn Handler>>,
    ) -> Result<(), ServerError> {
        let listener = TcpListener::bind(addr).await.map_err(ServerError::Bind)?;
        self.serve(listener, handler).await
    }

    /// Runs the accept loop on an already bound listener.
    ///
    /// Connections are accepted one at a time and each is handed to its own
    /// task. Accept failures are retried with a growing delay instead of
    /// ending the loop.
    pub async fn serve(
        &self,
        listener: TcpListener,
        handler: Option<Arc<dyn Handler>>,
    ) -> Result<(), ServerError> {
        let handler = handler.unwrap_or_else(|| self.mux.clone() as Arc<dyn Handler>);
        let local = listener.local_addr()?;
        tracing::info!(%local, "listening");

        let mut backoff: Option<Duration> = None;
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    backoff = None;
                    let conn = Connection {
                        stream,
                        handler: handler.clone(),
                        config: self.config.clone(),
                        tracker: StateTracker {
                            peer,
                            hook: self.conn_state.clone(),
                        },
                    };
                    let span = tracing::info_span!("conn", %peer);
                    task::spawn(conn.run().instrument(span));
                }
                Err(err) => {
                    let delay = backoff
                        .map(|d| (d * 2).min(ACCEPT_BACKOFF_MAX))
                        .unwrap_or(ACCEPT_BACKOFF_START);
                    tracing::warn!(%err, ?delay, "accept failed, retrying");
                    task::sleep(delay).await;
                    backoff = Some(delay);
                }
            }
        }
    }
}

/// Reports state transitions; reports `Closed` when dropped so every exit
/// path of a connection task is covered.
struct StateTracker {
    peer: SocketAddr,
    hook: Option<ConnStateHook>,
}

impl StateTracker {
    fn set(&self, state: ConnState) {
        tracing::trace!(%state, "connection state");
        if let Some(hook) = &self.hook {
            hook(self.peer, state);
        }
    }
}

impl Drop for StateTracker {
    fn drop(&mut self) {
        self.set(ConnState::Closed);
    }
}

/// One accepted connection. Field order matters: the stream is dropped,
/// closing the socket, before the tracker reports `Closed`.
struct Connection {
    stream: TcpStream,
    handler: Arc<dyn Handler>,
    config: Arc<ServerConfig>,
    tracker: StateTracker,
}

impl Connection {
    async fn run(mut self) {
        self.tracker.set(ConnState::Accepted);

        match self.serve_requests().await {
            Ok(()) => tracing::debug!("connection finished"),
            Err(ConnError::Malformed(err)) => {
                tracing::warn!(%err, "dropping connection after malformed request")
            }
            Err(err @ ConnError::HandlerPanic(_)) => {
                tracing::error!(%err, "aborting connection")
            }
            Err(err) => tracing::debug!(%err, "connection ended"),
        }
    }

    /// Serves requests strictly one after another until the peer goes away
    /// or either side opts out of keep-alive.
    async fn serve_requests(&mut self) -> Result<(), ConnError> {
        let mut parser = RequestParser::new(RequestLimits::from(&*self.config));
        let mut buffer = vec![0; self.config.buffer_size.max(1)];

        loop {
            self.tracker.set(ConnState::Reading);
            let req = match self.read_request(&mut parser, &mut buffer).await? {
                Some(req) => req,
                None => return Ok(()),
            };

            self.tracker.set(ConnState::Dispatching);
            let version = req.http_version;
            let head_only = req.method == HttpMethod::Head;
            let (req, mut res) = self.dispatch(req).await?;

            let keep_alive =
                self.config.keep_alive && req.wants_keep_alive() && !res.closes_connection();
            if !keep_alive && version == HttpVersion::V1_1 {
                res.set_header(ResponseHeader::Connection, "close");
            } else if keep_alive && version == HttpVersion::V1_0 {
                res.set_header(ResponseHeader::Connection, "keep-alive");
            }

            self.tracker.set(ConnState::Writing);
            let wire = res.encode(version, &self.config.server_name, head_only);
            with_timeout(self.config.write_timeout, self.stream.write_all(&wire)).await?;

            tracing::debug!(method = %req.method, path = %req.path, status = res.status.code(), "request served");
            if !keep_alive {
                return Ok(());
            }
        }
    }

    /// Reads until the parser yields a request. `Ok(None)` means the peer
    /// closed the connection cleanly between requests.
    async fn read_request(
        &mut self,
        parser: &mut RequestParser,
        buffer: &mut [u8],
    ) -> Result<Option<HttpRequest>, ConnError> {
        loop {
            // Leftover bytes from a previous read may already hold a request
            if let Some(req) = parser.parse()? {
                return Ok(Some(req));
            }

            let read = with_timeout(self.config.read_timeout, self.stream.read(buffer)).await;
            match read {
                Ok(0) if parser.is_idle() => return Ok(None),
                Ok(0) => return Err(ConnError::ClosedMidRequest),
                Ok(n) => parser.feed(&buffer[..n]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Runs the handler on the blocking pool so a slow handler never holds
    /// up the executor. A panic is caught there and reported as an error.
    async fn dispatch(&self, req: HttpRequest) -> Result<(HttpRequest, HttpResponse), ConnError> {
        let handler = self.handler.clone();
        task::spawn_blocking(move || {
            let mut res = HttpResponse::new();
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler.serve(&mut res, &req)));
            outcome.map(|()| (req, res))
        })
        .await
        .map_err(|payload| ConnError::HandlerPanic(panic_message(&*payload)))
    }
}

/// Applies `limit` to an I/O future; a zero duration disables the limit.
async fn with_timeout<F, T>(limit: Duration, fut: F) -> io::Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    if limit.is_zero() {
        fut.await
    } else {
        async_std::io::timeout(limit, fut).await
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
