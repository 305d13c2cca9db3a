//! Per-request glue: match, build the request, wrap the endpoint in its
//! group chain, run it behind the panic boundary, translate, encode.

use std::any::Any;
use std::backtrace::Backtrace;
use std::error::Error as StdError;
use std::panic::AssertUnwindSafe;

use bytes::Bytes;
use futures_util::FutureExt;
use http::{HeaderMap, StatusCode};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use tracing::error;

use crate::compression;
use crate::error::{BoxError, Error, HttpError, translate};
use crate::handler::Endpoint;
use crate::middleware::{self, Middleware};
use crate::reply::Reply;
use crate::request::Request;
use crate::response::{self, Response};
use crate::router::{Config, Resolution, Router};

impl Router {
    /// Handles one request from start to finish.
    ///
    /// Always produces exactly one response: unmatched routes, endpoint
    /// errors and panics included. Gzip is negotiated here when this router
    /// was configured with [`RouteOption::compression`](crate::RouteOption::compression).
    pub async fn dispatch<B>(&self, req: http::Request<B>) -> http::Response<Full<Bytes>>
    where
        B: Body,
        B::Error: Into<Box<dyn StdError + Send + Sync>>,
    {
        let compression = self.config().compression;
        let accepts_gzip = compression::accepts_gzip(req.headers());

        let res = self.respond(req).await;
        let res = match compression {
            Some(level) => compression::negotiate(res, accepts_gzip, level),
            None => res,
        };
        res.into_inner()
    }

    async fn respond<B>(&self, req: http::Request<B>) -> Response
    where
        B: Body,
        B::Error: Into<Box<dyn StdError + Send + Sync>>,
    {
        let (head, body) = req.into_parts();

        match self.resolve(&head.method, head.uri.path()) {
            Resolution::Matched { endpoint, chain, config, params, pattern } => {
                let body = match read_body(body, config.max_body_size).await {
                    Ok(body) => body,
                    Err(err) => return finish(Err(err.into()), HeaderMap::new(), &config),
                };
                let req = Request::new(head, body, params, pattern);
                run(req, endpoint, &chain, &config).await
            }
            // The body of an unmatched request is never read.
            Resolution::Missing { config } => {
                let req = Request::new(head, Bytes::new(), Vec::new(), "".into());
                match &config.not_found {
                    Some(handler) => handler.call(req).await,
                    None => run(req, Endpoint::new(not_found), &[], &config).await,
                }
            }
        }
    }
}

/// Buffers the request body, refusing anything over `limit` bytes with
/// `413 payload_too_large`.
async fn read_body<B>(body: B, limit: usize) -> Result<Bytes, HttpError>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.is::<LengthLimitError>() => Err(HttpError::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            "payload_too_large",
            format!("request body exceeds {limit} bytes"),
        )
        .wrap(e)),
        Err(e) => Err(HttpError::bad_request("cannot read request body").wrap(e)),
    }
}

async fn not_found(_req: Request) -> Result<Reply, Error> {
    Err(HttpError::not_found("url not found").into())
}

/// Wraps and runs the endpoint. A panic anywhere in the chain is logged and
/// answered with the unknown error; it never reaches the connection task.
async fn run(req: Request, endpoint: Endpoint, chain: &[Middleware], config: &Config) -> Response {
    let guarded = AssertUnwindSafe(async {
        middleware::wrap(chain, endpoint).call(req.clone()).await
    });

    match guarded.catch_unwind().await {
        Ok(result) => finish(result, req.take_response_headers(), config),
        Err(panic) => {
            error!(
                method = %req.method(),
                uri = %req.uri(),
                route = req.route(),
                panic = panic_message(&*panic),
                "panic serving request\n{}",
                Backtrace::force_capture()
            );
            response::write_json(
                StatusCode::INTERNAL_SERVER_ERROR,
                Some(&HttpError::unknown()),
                req.take_response_headers(),
                config.indent,
            )
        }
    }
}

fn finish(result: Result<Reply, Error>, headers: HeaderMap, config: &Config) -> Response {
    match result {
        Ok(reply) => response::write_json(reply.status_code(), reply.body(), headers, config.indent),
        Err(err) => {
            let rendered = translate(err, config.dump_errors);
            response::write_json(rendered.status_code(), Some(rendered.as_json()), headers, config.indent)
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        *msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "Box<dyn Any>"
    }
}
