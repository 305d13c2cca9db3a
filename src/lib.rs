//! # jsonrest
//!
//! A small framework for JSON REST services.
//!
//! Endpoints return `Result<impl IntoReply, Error>`. Everything between the
//! socket and the endpoint is the framework's job:
//!
//! - Radix-tree routing with nested groups via [`matchit`]
//! - Middleware resolved per group at dispatch time
//! - One error envelope for every failure: `{"error": {"code", "message"}}`
//! - Panic recovery: a panicking endpoint is logged and answered with `500`
//! - JSON encoding with optional indentation and gzip
//! - Graceful shutdown: SIGTERM / Ctrl-C drains in-flight requests
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use jsonrest::{Error, HttpError, Json, Request, Router, Server, StatusCode, middleware};
//! use serde_json::{Value, json};
//!
//! #[tokio::main]
//! async fn main() {
//!     let app = Router::new();
//!     app.use_middleware(middleware::trace());
//!     app.get("/users/{id}", get_user)
//!        .post("/users", create_user);
//!
//!     Server::bind("0.0.0.0:3000").serve(app).await.unwrap();
//! }
//!
//! async fn get_user(req: Request) -> Result<Json<Value>, Error> {
//!     match req.param("id") {
//!         Some("42") => Ok(Json(json!({"id": 42, "name": "Alice"}))),
//!         _ => Err(HttpError::not_found("no such user").into()),
//!     }
//! }
//!
//! async fn create_user(req: Request) -> Result<(StatusCode, Value), Error> {
//!     let user: Value = req.bind_body()?;
//!     Ok((StatusCode::CREATED, user))
//! }
//! ```

mod compression;
mod error;
mod handler;
mod pipeline;
mod reply;
mod request;
mod response;
mod router;
mod server;

pub mod middleware;

pub use error::{Error, ErrorResponse, HttpError};
pub use handler::{BoxFuture, Endpoint, Handler, RawHandler};
pub use http::{Method, StatusCode};
pub use middleware::Middleware;
pub use reply::{IntoReply, Json, M, Reply};
pub use request::{FormFile, Request};
pub use response::{IntoResponse, JSON_CONTENT_TYPE, Response, ResponseBuilder};
pub use router::{DEFAULT_MAX_BODY_SIZE, RouteOption, Router};
pub use server::{ServeError, Server};
