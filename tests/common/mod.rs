#![allow(dead_code)]

use bytes::Bytes;
use futures_util::stream::{Iter, iter};
use http::header::HeaderName;
use http::{HeaderMap, Method, StatusCode};
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::Frame;
use jsonrest::Router;
use serde_json::Value;

/// What a client would have received.
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn text(&self) -> &str {
        std::str::from_utf8(&self.body).unwrap()
    }

    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(|v| v.to_str().unwrap())
    }
}

pub async fn send<B>(router: &Router, req: http::Request<B>) -> TestResponse
where
    B: hyper::body::Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let res = router.dispatch(req).await;
    let (head, body) = res.into_parts();
    let body = body.collect().await.unwrap().to_bytes();
    TestResponse { status: head.status, headers: head.headers, body }
}

pub async fn get(router: &Router, uri: &str) -> TestResponse {
    call(router, Method::GET, uri, &[], Bytes::new()).await
}

pub async fn call(
    router: &Router,
    method: Method,
    uri: &str,
    headers: &[(&str, &str)],
    body: impl Into<Bytes>,
) -> TestResponse {
    let mut builder = http::Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(HeaderName::from_bytes(name.as_bytes()).unwrap(), *value);
    }
    send(router, builder.body(Full::new(body.into())).unwrap()).await
}

/// A request body whose first read fails, as when the client resets the
/// connection mid-upload.
pub fn broken_body() -> StreamBody<Iter<std::vec::IntoIter<Result<Frame<Bytes>, std::io::Error>>>> {
    StreamBody::new(iter(vec![Err(std::io::Error::other("connection reset"))]))
}

pub fn hello() -> Value {
    serde_json::json!({"message": "Hello World"})
}

pub const COMPACT_HELLO: &str = "{\"message\":\"Hello World\"}\n";
pub const INDENTED_HELLO: &str = "{\n  \"message\": \"Hello World\"\n}\n";
