//! Endpoint trait and type erasure.
//!
//! # How async endpoints are stored
//!
//! The path table needs to hold endpoints of *different* types in a single
//! `HashMap<Method, Tree>`, and middleware needs to take one endpoint and
//! hand back another. Both work on the same erased value, [`Endpoint`]:
//!
//! ```text
//! async fn hello(req: Request) -> Result<Json<T>, Error> { … }   ← user writes this
//!        ↓ router.get("/", hello)
//! hello.into_endpoint()                                          ← Handler blanket impl
//!        ↓
//! Endpoint(Arc::new(FnEndpoint(hello)))                          ← heap-allocated wrapper
//!        ↓  wrapped by middleware at dispatch time: m1(m2(endpoint))
//! endpoint.call(req)                                             ← one vtable dispatch per layer
//!        ↓
//! Box::pin(async { hello(req).await.map(IntoReply::into_reply) }) ← BoxFuture
//! ```
//!
//! Cloning an [`Endpoint`] is one atomic increment.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::Error;
use crate::reply::{IntoReply, Reply};
use crate::request::Request;
use crate::response::{IntoResponse, Response};

/// A heap-allocated, type-erased future.
///
/// `Send + 'static` let tokio move the future across worker threads.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

// ── Endpoint ──────────────────────────────────────────────────────────────────

trait ErasedEndpoint: Send + Sync {
    fn call(&self, req: Request) -> BoxFuture<Result<Reply, Error>>;
}

struct FnEndpoint<F>(F);

impl<F, Fut, R> ErasedEndpoint for FnEndpoint<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = Result<R, Error>> + Send + 'static,
    R: IntoReply,
{
    fn call(&self, req: Request) -> BoxFuture<Result<Reply, Error>> {
        let fut = (self.0)(req);
        Box::pin(async move { fut.await.map(IntoReply::into_reply) })
    }
}

/// A type-erased endpoint: `Request -> Future<Result<Reply, Error>>`.
///
/// This is the value middleware receives and returns. Build one from any
/// async function or closure with [`Endpoint::new`]:
///
/// ```rust
/// use jsonrest::{Endpoint, Error, Json, Request};
/// use serde_json::{json, Value};
///
/// async fn ping(_req: Request) -> Result<Json<Value>, Error> {
///     Ok(Json(json!({"pong": true})))
/// }
///
/// let endpoint = Endpoint::new(ping);
/// ```
#[derive(Clone)]
pub struct Endpoint(Arc<dyn ErasedEndpoint>);

impl Endpoint {
    pub fn new<F, Fut, R>(f: F) -> Self
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, Error>> + Send + 'static,
        R: IntoReply,
    {
        Self(Arc::new(FnEndpoint(f)))
    }

    /// Runs the endpoint (and every layer wrapped around it).
    pub fn call(&self, req: Request) -> BoxFuture<Result<Reply, Error>> {
        self.0.call(req)
    }
}

// ── Public Handler trait ──────────────────────────────────────────────────────

/// Implemented for every valid endpoint function.
///
/// You never implement this yourself. It is automatically satisfied for any
/// `async fn` (or closure returning a future) with the signature:
///
/// ```text
/// async fn name(req: Request) -> Result<impl IntoReply, Error>
/// ```
///
/// The trait is **sealed**: only the blanket impl below can satisfy it.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_endpoint(self) -> Endpoint;
}

mod private {
    pub trait Sealed {}
}

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, Error>> + Send + 'static,
    R: IntoReply,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, Error>> + Send + 'static,
    R: IntoReply,
{
    fn into_endpoint(self) -> Endpoint {
        Endpoint::new(self)
    }
}

// ── Raw handlers ──────────────────────────────────────────────────────────────

/// A handler that writes its own response, bypassing middleware, error
/// translation and JSON encoding. Used for custom not-found handling.
#[derive(Clone)]
pub struct RawHandler(Arc<dyn Fn(Request) -> BoxFuture<Response> + Send + Sync>);

impl RawHandler {
    pub fn new<F, Fut, R>(f: F) -> Self
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoResponse,
    {
        Self(Arc::new(move |req: Request| -> BoxFuture<Response> {
            let fut = f(req);
            Box::pin(async move { fut.await.into_response() })
        }))
    }

    pub(crate) fn call(&self, req: Request) -> BoxFuture<Response> {
        (self.0)(req)
    }
}
