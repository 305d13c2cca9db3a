//! Successful endpoint results and the [`IntoReply`] conversion trait.
//!
//! An endpoint returns `Ok(value)` where `value` is anything that converts
//! into a [`Reply`]: a [`Json`] wrapper, a `serde_json::Value`, an [`M`] map,
//! `()` for an empty body, or a `(StatusCode, value)` pair for a custom status.
//! The body is serialized later, by the encoder of the route's group, so the
//! group decides the indentation.

use http::StatusCode;
use serde::Serialize;

/// A JSON object, for replies that don't deserve their own struct.
///
/// ```rust
/// use jsonrest::M;
/// use serde_json::json;
///
/// let mut body = M::new();
/// body.insert("message".into(), json!("Hello World"));
/// ```
pub type M = serde_json::Map<String, serde_json::Value>;

/// Type-erased serializable body. Implemented for every `Serialize` type.
pub(crate) trait JsonBody: Send + Sync {
    fn write_json(&self, buf: &mut Vec<u8>, indent: bool) -> serde_json::Result<()>;
}

impl<T: Serialize + Send + Sync + ?Sized> JsonBody for T {
    fn write_json(&self, buf: &mut Vec<u8>, indent: bool) -> serde_json::Result<()> {
        if indent {
            serde_json::to_writer_pretty(buf, self)
        } else {
            serde_json::to_writer(buf, self)
        }
    }
}

// ── Reply ─────────────────────────────────────────────────────────────────────

/// A successful result: a status (default `200 OK`) and an optional body.
///
/// ```rust
/// use jsonrest::{Reply, StatusCode};
/// use serde_json::json;
///
/// Reply::json(json!({"id": 1}));                               // 200, body
/// Reply::with_status(StatusCode::CREATED, json!({"id": 2}));   // 201, body
/// Reply::status(StatusCode::NO_CONTENT);                       // 204, no body
/// ```
pub struct Reply {
    status: StatusCode,
    body: Option<Box<dyn JsonBody>>,
}

impl Reply {
    /// `200 OK` with `body` serialized as JSON.
    pub fn json<T: Serialize + Send + Sync + 'static>(body: T) -> Self {
        Self::with_status(StatusCode::OK, body)
    }

    /// A custom success status with a body.
    pub fn with_status<T: Serialize + Send + Sync + 'static>(status: StatusCode, body: T) -> Self {
        Self { status, body: Some(Box::new(body)) }
    }

    /// A status with no body. Headers are still written.
    pub fn status(status: StatusCode) -> Self {
        Self { status, body: None }
    }

    /// `200 OK` with no body.
    pub fn empty() -> Self {
        Self::status(StatusCode::OK)
    }

    pub fn status_code(&self) -> StatusCode {
        self.status
    }

    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    pub(crate) fn body(&self) -> Option<&dyn JsonBody> {
        self.body.as_deref()
    }
}

// ── Json ──────────────────────────────────────────────────────────────────────

/// Serializes the wrapped value as the response body with `200 OK`.
///
/// ```rust
/// use jsonrest::{Error, Json, Request};
/// use serde::Serialize;
///
/// #[derive(Serialize)]
/// struct User { id: u64, name: String }
///
/// async fn get_user(_req: Request) -> Result<Json<User>, Error> {
///     Ok(Json(User { id: 1, name: "alice".into() }))
/// }
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Json<T>(pub T);

// ── IntoReply ─────────────────────────────────────────────────────────────────

/// Conversion into a [`Reply`]. Implement it to return your own types.
pub trait IntoReply {
    fn into_reply(self) -> Reply;
}

impl IntoReply for Reply {
    fn into_reply(self) -> Reply { self }
}

impl IntoReply for () {
    fn into_reply(self) -> Reply { Reply::empty() }
}

impl<T: Serialize + Send + Sync + 'static> IntoReply for Json<T> {
    fn into_reply(self) -> Reply { Reply::json(self.0) }
}

impl IntoReply for serde_json::Value {
    fn into_reply(self) -> Reply { Reply::json(self) }
}

impl IntoReply for M {
    fn into_reply(self) -> Reply { Reply::json(self) }
}

/// `None` replies `200 OK` with an empty body.
impl<T: IntoReply> IntoReply for Option<T> {
    fn into_reply(self) -> Reply {
        self.map_or_else(Reply::empty, IntoReply::into_reply)
    }
}

/// Overrides the status of any reply: `Ok((StatusCode::CREATED, Json(user)))`.
impl<T: IntoReply> IntoReply for (StatusCode, T) {
    fn into_reply(self) -> Reply {
        let (status, inner) = self;
        Reply { status, ..inner.into_reply() }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn encode(reply: &Reply, indent: bool) -> Option<String> {
        reply.body().map(|body| {
            let mut buf = Vec::new();
            body.write_json(&mut buf, indent).unwrap();
            String::from_utf8(buf).unwrap()
        })
    }

    #[test]
    fn json_defaults_to_ok() {
        let reply = Json(json!({"message": "Hello World"})).into_reply();
        assert_eq!(reply.status_code(), StatusCode::OK);
        assert_eq!(encode(&reply, false).unwrap(), r#"{"message":"Hello World"}"#);
    }

    #[test]
    fn indent_uses_two_spaces() {
        let reply = Reply::json(json!({"message": "Hello World"}));
        assert_eq!(encode(&reply, true).unwrap(), "{\n  \"message\": \"Hello World\"\n}");
    }

    #[test]
    fn unit_and_none_have_no_body() {
        assert!(!().into_reply().has_body());
        assert!(!None::<Json<u8>>.into_reply().has_body());
    }

    #[test]
    fn status_tuple_overrides_status_and_keeps_body() {
        let reply = (StatusCode::CREATED, Json(json!({"data": "byebye"}))).into_reply();
        assert_eq!(reply.status_code(), StatusCode::CREATED);
        assert_eq!(encode(&reply, false).unwrap(), r#"{"data":"byebye"}"#);
    }

    #[test]
    fn bare_status_has_no_body() {
        let reply = Reply::status(StatusCode::NO_CONTENT);
        assert_eq!(reply.status_code(), StatusCode::NO_CONTENT);
        assert!(encode(&reply, true).is_none());
    }
}
