//! Outgoing HTTP response type, the [`IntoResponse`] conversion trait, and
//! the JSON encoder every pipeline response goes through.
//!
//! Endpoints never build a [`Response`]: they return a [`Reply`](crate::Reply)
//! or an [`Error`](crate::Error) and the encoder does the rest. `Response` is
//! for raw handlers, such as a custom not-found handler.

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use http::StatusCode;
use http_body_util::Full;
use tracing::error;

use crate::error::HttpError;
use crate::reply::JsonBody;

/// `Content-Type` of every pipeline response.
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

// ── Response ─────────────────────────────────────────────────────────────────

/// An outgoing HTTP response.
///
/// # Shortcuts (200 OK, no custom headers needed)
///
/// ```rust
/// use jsonrest::{Response, StatusCode};
///
/// Response::json(br#"{"id":1}"#.to_vec());
/// Response::text("hello");
/// Response::status(StatusCode::NO_CONTENT);
/// ```
///
/// # Builder (custom status or headers)
///
/// ```rust
/// use jsonrest::{Response, StatusCode};
/// use http::header::{HeaderValue, LOCATION};
///
/// Response::builder()
///     .status(StatusCode::CREATED)
///     .header(LOCATION, HeaderValue::from_static("/users/42"))
///     .json(br#"{"id":42}"#.to_vec());
/// ```
#[derive(Debug)]
pub struct Response {
    pub(crate) status: StatusCode,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
}

impl Response {
    /// `200 OK` with an already-encoded JSON body.
    pub fn json(body: impl Into<Bytes>) -> Self {
        Self::builder().json(body)
    }

    /// `200 OK`, `text/plain; charset=utf-8`.
    pub fn text(body: impl Into<String>) -> Self {
        Self::builder().text(body)
    }

    /// Response with no body.
    pub fn status(code: StatusCode) -> Self {
        Self { status: code, headers: HeaderMap::new(), body: Bytes::new() }
    }

    /// Builder for responses that need a custom status or extra headers.
    pub fn builder() -> ResponseBuilder {
        ResponseBuilder { headers: HeaderMap::new(), status: StatusCode::OK }
    }

    pub fn status_code(&self) -> StatusCode { self.status }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &Bytes { &self.body }

    pub(crate) fn into_inner(self) -> http::Response<Full<Bytes>> {
        let mut res = http::Response::new(Full::new(self.body));
        *res.status_mut() = self.status;
        *res.headers_mut() = self.headers;
        res
    }
}

// ── ResponseBuilder ───────────────────────────────────────────────────────────

/// Fluent builder for [`Response`].
///
/// Obtain via [`Response::builder()`]. Defaults to `200 OK`.
/// Terminated by a typed body method.
#[derive(Debug)]
pub struct ResponseBuilder {
    headers: HeaderMap,
    status: StatusCode,
}

impl ResponseBuilder {
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code;
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Terminate with an encoded JSON body (`application/json; charset=utf-8`).
    pub fn json(self, body: impl Into<Bytes>) -> Response {
        self.finish(JSON_CONTENT_TYPE, body.into())
    }

    /// Terminate with a plain-text body (`text/plain; charset=utf-8`).
    pub fn text(self, body: impl Into<String>) -> Response {
        self.finish("text/plain; charset=utf-8", Bytes::from(body.into()))
    }

    /// Terminate with no body.
    pub fn no_body(self) -> Response {
        Response { body: Bytes::new(), headers: self.headers, status: self.status }
    }

    fn finish(mut self, content_type: &'static str, body: Bytes) -> Response {
        self.headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        Response { body, headers: self.headers, status: self.status }
    }
}

// ── IntoResponse ──────────────────────────────────────────────────────────────

/// Conversion into an HTTP [`Response`], for raw handlers.
pub trait IntoResponse {
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response { self }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> Response { Response::text(self) }
}

impl IntoResponse for String {
    fn into_response(self) -> Response { Response::text(self) }
}

/// Return a status directly from a raw handler: `StatusCode::NOT_FOUND`
impl IntoResponse for StatusCode {
    fn into_response(self) -> Response { Response::status(self) }
}

// ── JSON encoder ──────────────────────────────────────────────────────────────

/// Encodes `body` as the JSON document of a `status` response.
///
/// `headers` are the ones the endpoint set; `Content-Type` always ends up
/// JSON. Encoding happens into a buffer, so a body that fails to serialize
/// is replaced by the unknown-error envelope before anything is sent.
/// `None` writes status and headers with an empty body.
pub(crate) fn write_json(
    status: StatusCode,
    body: Option<&dyn JsonBody>,
    mut headers: HeaderMap,
    indent: bool,
) -> Response {
    let (status, body) = match body.map(|body| encode(body, indent)) {
        None => (status, Bytes::new()),
        Some(Ok(bytes)) => (status, bytes),
        Some(Err(e)) => {
            error!(%status, "failed to encode response body: {e}");
            let fallback = encode(&HttpError::unknown(), indent).unwrap_or_default();
            (StatusCode::INTERNAL_SERVER_ERROR, fallback)
        }
    };
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
    Response { status, headers, body }
}

/// One JSON document followed by a newline.
fn encode(body: &dyn JsonBody, indent: bool) -> serde_json::Result<Bytes> {
    let mut buf = Vec::with_capacity(128);
    body.write_json(&mut buf, indent)?;
    buf.push(b'\n');
    Ok(Bytes::from(buf))
}
