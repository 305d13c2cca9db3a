//! TCP front end: accepts connections and feeds every request on them to
//! [`Router::dispatch`].
//!
//! On shutdown the listener is dropped first, so no new connection is
//! accepted, and [`Server::serve`] returns once every open connection has
//! finished its in-flight requests.

use std::convert::Infallible;
use std::future::Future;
use std::net::{AddrParseError, SocketAddr};

use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::router::Router;

/// Why the server could not start.
///
/// Request-level failures never surface here; the pipeline answers them.
#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    #[error("invalid socket address `{addr}`: {source}")]
    Addr {
        addr: String,
        #[source]
        source: AddrParseError,
    },
    #[error("cannot listen: {0}")]
    Io(#[from] std::io::Error),
}

/// The HTTP server. HTTP/1.1 and HTTP/2 are both accepted.
pub struct Server {
    addr: String,
}

impl Server {
    /// Configures the server to listen on `addr` (`host:port`). The address is
    /// validated when the server starts.
    ///
    /// ```rust
    /// use jsonrest::Server;
    /// let server = Server::bind("0.0.0.0:3000");
    /// ```
    pub fn bind(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }

    /// Serves `router` until SIGTERM or Ctrl-C, then drains open connections.
    pub async fn serve(self, router: Router) -> Result<(), ServeError> {
        self.serve_with_shutdown(router, shutdown_signal()).await
    }

    /// Serves `router` until `signal` resolves, then drains open connections.
    pub async fn serve_with_shutdown<F>(self, router: Router, signal: F) -> Result<(), ServeError>
    where
        F: Future<Output = ()>,
    {
        let addr: SocketAddr = self
            .addr
            .parse()
            .map_err(|source| ServeError::Addr { addr: self.addr.clone(), source })?;
        let listener = TcpListener::bind(addr).await?;
        let local = listener.local_addr()?;
        info!(addr = %local, "jsonrest listening");

        let mut connections = JoinSet::new();
        tokio::pin!(signal);

        loop {
            let (stream, peer) = tokio::select! {
                biased;
                () = &mut signal => break,
                Some(_) = connections.join_next(), if !connections.is_empty() => continue,
                accepted = listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!("accept failed: {e}");
                        continue;
                    }
                },
            };
            connections.spawn(serve_connection(router.clone(), stream, peer));
        }

        drop(listener);
        info!(open = connections.len(), "shutting down, draining connections");
        while connections.join_next().await.is_some() {}
        info!("jsonrest stopped");
        Ok(())
    }
}

async fn serve_connection(router: Router, stream: TcpStream, peer: SocketAddr) {
    let service = service_fn(move |req| {
        let router = router.clone();
        async move { Ok::<_, Infallible>(router.dispatch(req).await) }
    });

    let conn = ConnBuilder::new(TokioExecutor::new());
    if let Err(e) = conn.serve_connection(TokioIo::new(stream), service).await {
        debug!(%peer, "connection closed with error: {e}");
    }
}

/// SIGTERM or SIGINT on Unix, Ctrl-C elsewhere. A handler that cannot be
/// installed is logged and never fires.
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("cannot listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("cannot listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = interrupt => info!("received Ctrl-C"),
        () = terminate => info!("received SIGTERM"),
    }
}
