//! Incoming request, as seen by endpoints and middleware.

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use futures_util::future::ready;
use futures_util::stream::once;
use http::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use http::request::Parts;
use http::{Extensions, Method, Uri};
use multer::{Constraints, Multipart, SizeLimit};
use serde::de::DeserializeOwned;

use crate::error::HttpError;

/// The per-request context handed to every middleware layer and endpoint.
///
/// Cloning is cheap: all clones share the same request, the same scratch
/// values and the same pending response headers. A `Request` lives for one
/// request only.
#[derive(Clone)]
pub struct Request {
    inner: Arc<Inner>,
}

struct Inner {
    head: Parts,
    body: Bytes,
    params: Vec<(String, String)>,
    route: Arc<str>,
    meta: RwLock<Extensions>,
    response_headers: Mutex<HeaderMap>,
}

/// A file received in a `multipart/form-data` body.
#[derive(Clone, Debug)]
pub struct FormFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl Request {
    pub(crate) fn new(head: Parts, body: Bytes, params: Vec<(String, String)>, route: Arc<str>) -> Self {
        Self {
            inner: Arc::new(Inner {
                head,
                body,
                params,
                route,
                meta: RwLock::new(Extensions::new()),
                response_headers: Mutex::new(HeaderMap::new()),
            }),
        }
    }

    /// Builds a request outside the router, for unit-testing endpoints.
    ///
    /// ```rust
    /// use jsonrest::Request;
    ///
    /// let req = Request::for_testing(
    ///     http::Request::get("/users/42").body("").unwrap(),
    ///     [("id", "42")],
    ///     "/users/{id}",
    /// );
    /// assert_eq!(req.param("id"), Some("42"));
    /// ```
    pub fn for_testing<B, K, V>(
        req: http::Request<B>,
        params: impl IntoIterator<Item = (K, V)>,
        route: &str,
    ) -> Self
    where
        B: Into<Bytes>,
        K: Into<String>,
        V: Into<String>,
    {
        let (head, body) = req.into_parts();
        let params = params.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        Self::new(head, body.into(), params, Arc::from(route))
    }

    pub fn method(&self) -> &Method { &self.inner.head.method }
    pub fn uri(&self) -> &Uri { &self.inner.head.uri }
    pub fn headers(&self) -> &HeaderMap { &self.inner.head.headers }
    pub fn head(&self) -> &Parts { &self.inner.head }
    pub fn body(&self) -> &Bytes { &self.inner.body }

    /// The pattern the request matched, e.g. `/users/{id}`. Empty when no
    /// route matched.
    pub fn route(&self) -> &str { &self.inner.route }

    /// Header lookup. `None` when missing or not visible ASCII.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.inner.head.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.inner.params.iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// All path parameters, in pattern order.
    pub fn params(&self) -> &[(String, String)] { &self.inner.params }

    /// First value of a query-string parameter, percent-decoded.
    pub fn query(&self, name: &str) -> Option<String> {
        let query = self.inner.head.uri.query()?;
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }

    /// Deserializes the JSON body.
    ///
    /// Fails with `400 bad_request` and a message describing the problem.
    pub fn bind_body<T: DeserializeOwned>(&self) -> Result<T, HttpError> {
        serde_json::from_slice(&self.inner.body).map_err(|e| {
            HttpError::bad_request(format!("malformed or unexpected json: {e}")).wrap(e)
        })
    }

    /// Returns the first file uploaded under the form field `name`.
    ///
    /// The whole multipart body may not exceed `max_size` bytes. A body that
    /// cannot be parsed, or that carries no such file, fails with
    /// `400 bad_request`.
    pub async fn form_file(&self, name: &str, max_size: u64) -> Result<FormFile, HttpError> {
        let content_type = self.header(CONTENT_TYPE.as_str()).unwrap_or_default();
        let boundary = multer::parse_boundary(content_type).map_err(parse_failure)?;

        let body = self.inner.body.clone();
        let stream = once(ready(Ok::<_, std::io::Error>(body)));
        let constraints = Constraints::new().size_limit(SizeLimit::new().whole_stream(max_size));
        let mut multipart = Multipart::with_constraints(stream, boundary, constraints);

        while let Some(field) = multipart.next_field().await.map_err(parse_failure)? {
            if field.name() != Some(name) {
                continue;
            }
            let Some(file_name) = field.file_name().map(str::to_owned) else {
                continue;
            };
            let content_type = field.content_type().map(ToString::to_string);
            let data = field.bytes().await.map_err(parse_failure)?;
            return Ok(FormFile { file_name, content_type, data });
        }

        Err(HttpError::bad_request(format!("no such file: {name}")))
    }

    /// Credentials of an `Authorization: Basic …` header.
    pub fn basic_auth(&self) -> Option<(String, String)> {
        let value = self.inner.head.headers.get(AUTHORIZATION)?.to_str().ok()?;
        let (scheme, encoded) = value.split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("basic") {
            return None;
        }
        let decoded = STANDARD.decode(encoded.trim()).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (username, password) = decoded.split_once(':')?;
        Some((username.to_owned(), password.to_owned()))
    }

    /// Returns the scratch value of type `T`, if one was [`set`](Self::set).
    ///
    /// The type is the key: wrap values in a newtype to keep them apart.
    pub fn get<T: Clone + Send + Sync + 'static>(&self) -> Option<T> {
        self.inner.meta.read().unwrap_or_else(PoisonError::into_inner).get::<T>().cloned()
    }

    /// Stores a scratch value, replacing any previous value of type `T`.
    /// Visible to every layer that runs afterwards.
    pub fn set<T: Clone + Send + Sync + 'static>(&self, value: T) {
        self.inner.meta.write().unwrap_or_else(PoisonError::into_inner).insert(value);
    }

    /// Sets a header on the eventual response, replacing any previous value.
    pub fn set_response_header(&self, name: HeaderName, value: HeaderValue) {
        self.response_headers().insert(name, value);
    }

    pub(crate) fn take_response_headers(&self) -> HeaderMap {
        std::mem::take(&mut *self.response_headers())
    }

    fn response_headers(&self) -> std::sync::MutexGuard<'_, HeaderMap> {
        self.inner.response_headers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn parse_failure(e: multer::Error) -> HttpError {
    HttpError::bad_request("cannot parse multipart form").wrap(e)
}
