//! Per-request log event.

use std::time::Instant;

use http::StatusCode;
use tracing::{info, warn};

use crate::handler::Endpoint;
use crate::request::Request;

use super::from_fn;

/// Logs every request once it has been handled: method, matched route,
/// status and latency. Failures are logged at `WARN` with the error.
///
/// Register it on the root group so it wraps everything:
///
/// ```rust
/// use jsonrest::{middleware, Router};
///
/// let router = Router::new();
/// router.use_middleware(middleware::trace());
/// ```
pub fn trace() -> impl Fn(Endpoint) -> Endpoint + Send + Sync + 'static {
    from_fn(|req: Request, next: Endpoint| async move {
        let start = Instant::now();
        let result = next.call(req.clone()).await;
        let latency = start.elapsed();

        match &result {
            Ok(reply) => info!(
                method = %req.method(),
                route = req.route(),
                status = reply.status_code().as_u16(),
                ?latency,
                "request handled"
            ),
            Err(err) => warn!(
                method = %req.method(),
                route = req.route(),
                status = err.status_code().unwrap_or(StatusCode::INTERNAL_SERVER_ERROR).as_u16(),
                error = %err,
                ?latency,
                "request failed"
            ),
        }

        result
    })
}
