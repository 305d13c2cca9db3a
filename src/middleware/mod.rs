//! Middleware: functions that wrap an [`Endpoint`] to add behavior before
//! and after it runs.
//!
//! A middleware takes the next endpoint and returns a new one. Layers nest
//! like function calls: a group with `[m1, m2, m3]` around endpoint `e`
//! runs `m1(m2(m3(e)))`, so on the way in the order is m1 → m2 → m3 → e and
//! on the way out e → m3 → m2 → m1. Parent groups wrap their children, so
//! the root's middleware always sees the request first and the reply last.
//!
//! A layer short-circuits by returning an `Err` (or an `Ok`) without calling
//! `next`:
//!
//! ```rust
//! use jsonrest::{middleware, Endpoint, Error, HttpError, Request, Router};
//!
//! let router = Router::new();
//! router.use_middleware(middleware::from_fn(|req: Request, next: Endpoint| async move {
//!     if req.header("x-api-key").is_none() {
//!         return Err(HttpError::unauthorized("missing api key").into());
//!     }
//!     next.call(req).await
//! }));
//! ```
//!
//! Built-in middleware:
//! - [`trace`]: one log event per request with method, route, status, latency

use std::future::Future;
use std::sync::Arc;

use crate::error::Error;
use crate::handler::Endpoint;
use crate::reply::Reply;
use crate::request::Request;

mod trace;

pub use trace::trace;

/// A shared middleware function.
pub type Middleware = Arc<dyn Fn(Endpoint) -> Endpoint + Send + Sync>;

/// Builds a middleware from an async function that receives the request and
/// the next endpoint.
pub fn from_fn<F, Fut>(f: F) -> impl Fn(Endpoint) -> Endpoint + Send + Sync + 'static
where
    F: Fn(Request, Endpoint) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<Reply, Error>> + Send + 'static,
{
    move |next: Endpoint| {
        let f = f.clone();
        Endpoint::new(move |req: Request| f(req, next.clone()))
    }
}

/// Wraps `endpoint` in `chain`, outermost layer first: `[a, b]` gives `a(b(endpoint))`.
pub(crate) fn wrap(chain: &[Middleware], endpoint: Endpoint) -> Endpoint {
    chain.iter().rev().fold(endpoint, |inner, layer| layer(inner))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    type Log = Arc<Mutex<Vec<String>>>;

    fn recorder(log: &Log, name: &'static str) -> Middleware {
        let log = Arc::clone(log);
        Arc::new(from_fn(move |req: Request, next: Endpoint| {
            let log = Arc::clone(&log);
            async move {
                log.lock().unwrap().push(format!("{name} in"));
                let result = next.call(req).await;
                log.lock().unwrap().push(format!("{name} out"));
                result
            }
        }))
    }

    fn endpoint(log: &Log) -> Endpoint {
        let log = Arc::clone(log);
        Endpoint::new(move |_req: Request| {
            let log = Arc::clone(&log);
            async move {
                log.lock().unwrap().push("handler".to_owned());
                Ok::<_, Error>(())
            }
        })
    }

    fn request() -> Request {
        Request::for_testing(
            http::Request::get("/").body("").unwrap(),
            Vec::<(String, String)>::new(),
            "/",
        )
    }

    #[tokio::test]
    async fn earlier_middleware_wraps_outer() {
        let log = Log::default();
        let chain = [recorder(&log, "m1"), recorder(&log, "m2"), recorder(&log, "m3")];
        wrap(&chain, endpoint(&log)).call(request()).await.unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            ["m1 in", "m2 in", "m3 in", "handler", "m3 out", "m2 out", "m1 out"],
        );
    }

    #[tokio::test]
    async fn empty_chain_is_identity() {
        let log = Log::default();
        wrap(&[], endpoint(&log)).call(request()).await.unwrap();
        assert_eq!(*log.lock().unwrap(), ["handler"]);
    }

    #[tokio::test]
    async fn short_circuit_skips_inner_layers() {
        let log = Log::default();
        let deny: Middleware = Arc::new(from_fn(|_req: Request, _next: Endpoint| async move {
            Err::<Reply, _>(Error::msg("denied"))
        }));
        let chain = [recorder(&log, "outer"), deny, recorder(&log, "inner")];
        let err = wrap(&chain, endpoint(&log)).call(request()).await.err().expect("expected short-circuit error");
        assert_eq!(err.to_string(), "denied");
        assert_eq!(*log.lock().unwrap(), ["outer in", "outer out"]);
    }
}
