//! Structured errors and the error-to-response translation policy.
//!
//! Endpoints fail with [`Error`]. Whatever they fail with, the client sees one
//! of two things:
//!
//! - a **self-describing** error: anything implementing [`ErrorResponse`]
//!   ([`HttpError`] included) is written verbatim with its own status code and
//!   its own serialization;
//! - the generic unknown error (`500`, code `unknown_error`) for everything
//!   else. Internal details never leak unless the route group was configured
//!   with [`RouteOption::DumpErrors`](crate::RouteOption::DumpErrors).

use std::error::Error as StdError;
use std::fmt;

use http::StatusCode;
use serde::{Serialize, Serializer};

use crate::reply::JsonBody;

pub(crate) type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// An error that knows which HTTP status it should be answered with.
///
/// This is the extension point for custom error shapes. Implement it together
/// with [`Serialize`] and hand the value to [`Error::response`]; the pipeline
/// writes your serialization as the response body, untouched.
///
/// [`Error::response`] is the only way in. Converting such a value with `?`
/// or `.into()` goes through the blanket `From` impl, which recognizes
/// [`HttpError`] alone: anything else becomes an internal error and the
/// client gets `500 unknown_error`.
///
/// ```rust
/// use jsonrest::{Error, ErrorResponse, StatusCode};
/// use serde::Serialize;
///
/// #[derive(Debug, Serialize)]
/// struct Teapot { message: String }
///
/// impl std::fmt::Display for Teapot {
///     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
///         f.write_str(&self.message)
///     }
/// }
///
/// impl std::error::Error for Teapot {}
///
/// impl ErrorResponse for Teapot {
///     fn status_code(&self) -> StatusCode { StatusCode::IM_A_TEAPOT }
/// }
///
/// let err = Error::response(Teapot { message: "short and stout".into() });
/// assert_eq!(err.status_code(), Some(StatusCode::IM_A_TEAPOT));
/// ```
pub trait ErrorResponse: StdError + Send + Sync + 'static {
    fn status_code(&self) -> StatusCode;
}

// ── HttpError ─────────────────────────────────────────────────────────────────

/// The standard error rendered to clients.
///
/// Serializes as:
///
/// ```json
/// {"error": {"code": "not_found", "message": "customer not found"}}
/// ```
///
/// `details` is included only when non-empty.
#[derive(Debug)]
pub struct HttpError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
    /// Debug-only lines. Filled by the pipeline when internal errors are dumped.
    pub details: Vec<String>,
    cause: Option<BoxError>,
}

impl HttpError {
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            details: Vec::new(),
            cause: None,
        }
    }

    /// `400 Bad Request`, code `bad_request`.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }

    /// `401 Unauthorized`, code `unauthorized`.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", message)
    }

    /// `404 Not Found`, code `not_found`.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    /// `422 Unprocessable Entity`, code `unprocessable_entity`.
    pub fn unprocessable_entity(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, "unprocessable_entity", message)
    }

    /// The fallback for every error that does not describe itself.
    pub fn unknown() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "unknown_error",
            "an unknown error occurred",
        )
    }

    /// Attaches the underlying cause. Exposed through [`StdError::source`],
    /// never serialized.
    pub fn wrap(mut self, cause: impl Into<BoxError>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    pub fn with_details(mut self, details: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.details = details.into_iter().map(Into::into).collect();
        self
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl StdError for HttpError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause.as_deref().map(|cause| cause as &(dyn StdError + 'static))
    }
}

impl ErrorResponse for HttpError {
    fn status_code(&self) -> StatusCode {
        self.status
    }
}

impl Serialize for HttpError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Body<'a> {
            code: &'a str,
            message: &'a str,
            #[serde(skip_serializing_if = "no_details")]
            details: &'a [String],
        }

        #[derive(Serialize)]
        struct Envelope<'a> {
            error: Body<'a>,
        }

        Envelope {
            error: Body {
                code: &self.code,
                message: &self.message,
                details: &self.details,
            },
        }
        .serialize(serializer)
    }
}

fn no_details(details: &&[String]) -> bool {
    details.is_empty()
}

// ── Error ─────────────────────────────────────────────────────────────────────

/// The error type returned by endpoints and middleware.
///
/// Any `std::error::Error + Send + Sync + 'static` converts into it, so `?`
/// works on I/O, parse and database errors alike. Such errors are *internal*:
/// the client sees the generic unknown error. An [`HttpError`] converted the
/// same way is recognized and keeps its status and body.
pub struct Error {
    repr: Repr,
}

enum Repr {
    Response(Box<dyn Renderable>),
    Internal(BoxError),
}

/// An error response the encoder can write: status plus a JSON body.
pub(crate) trait Renderable: ErrorResponse + JsonBody {
    fn as_json(&self) -> &dyn JsonBody;
    fn as_std(&self) -> &(dyn StdError + Send + Sync + 'static);
}

impl<T: ErrorResponse + JsonBody> Renderable for T {
    fn as_json(&self) -> &dyn JsonBody {
        self
    }

    fn as_std(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self
    }
}

impl Error {
    /// Returns a self-describing error: written with `err.status_code()` and
    /// `err`'s own serialization, whatever shape that has.
    pub fn response<E: ErrorResponse + Serialize>(err: E) -> Self {
        Self { repr: Repr::Response(Box::new(err)) }
    }

    /// An internal error carrying only a message.
    pub fn msg(message: impl fmt::Display) -> Self {
        Self { repr: Repr::Internal(Box::new(Message(message.to_string()))) }
    }

    /// The status the client will see, or `None` for an internal error
    /// (which is answered with `500`).
    pub fn status_code(&self) -> Option<StatusCode> {
        match &self.repr {
            Repr::Response(err) => Some(err.status_code()),
            Repr::Internal(_) => None,
        }
    }

    pub fn is_internal(&self) -> bool {
        matches!(self.repr, Repr::Internal(_))
    }

    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        match &self.repr {
            Repr::Response(err) => err.as_std().downcast_ref(),
            Repr::Internal(err) => err.downcast_ref(),
        }
    }
}

/// Wraps any error. [`HttpError`] keeps its status and body; every other
/// type, including ones implementing [`ErrorResponse`], is internal. Use
/// [`Error::response`] for those.
impl<E> From<E> for Error
where
    E: StdError + Send + Sync + 'static,
{
    fn from(err: E) -> Self {
        let boxed: BoxError = Box::new(err);
        match boxed.downcast::<HttpError>() {
            Ok(http) => Self { repr: Repr::Response(http) },
            Err(other) => Self { repr: Repr::Internal(other) },
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            Repr::Response(err) => fmt::Debug::fmt(err.as_std(), f),
            Repr::Internal(err) => fmt::Debug::fmt(err, f),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            Repr::Response(err) => fmt::Display::fmt(err.as_std(), f),
            Repr::Internal(err) => fmt::Display::fmt(err, f),
        }
    }
}

struct Message(String);

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl StdError for Message {}

// ── Translation ───────────────────────────────────────────────────────────────

/// Coerces `err` into something the encoder can write. Never fails.
pub(crate) fn translate(err: Error, dump_internal: bool) -> Box<dyn Renderable> {
    match err.repr {
        Repr::Response(rendered) => rendered,
        Repr::Internal(inner) => {
            let mut unknown = HttpError::unknown();
            if dump_internal {
                unknown.details = dump_error(&*inner);
            }
            Box::new(unknown.wrap(inner))
        }
    }
}

/// One line per entry: the error itself, then every cause in its chain.
fn dump_error(err: &(dyn StdError + 'static)) -> Vec<String> {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        text.push_str("\ncaused by: ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text.replace('\t', "  ").split('\n').map(str::to_owned).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(err: &dyn Renderable) -> String {
        let mut buf = Vec::new();
        err.as_json().write_json(&mut buf, false).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn http_error_serializes_without_empty_details() {
        let err = HttpError::not_found("customer not found");
        assert_eq!(
            serde_json::to_string(&err).unwrap(),
            r#"{"error":{"code":"not_found","message":"customer not found"}}"#,
        );
    }

    #[test]
    fn http_error_serializes_details_when_present() {
        let err = HttpError::bad_request("nope").with_details(["a", "b"]);
        assert_eq!(
            serde_json::to_string(&err).unwrap(),
            r#"{"error":{"code":"bad_request","message":"nope","details":["a","b"]}}"#,
        );
    }

    #[test]
    fn wrapped_cause_is_a_source_but_not_serialized() {
        let io = std::io::Error::other("disk on fire");
        let err = HttpError::bad_request("cannot read").wrap(io);
        assert_eq!(err.source().unwrap().to_string(), "disk on fire");
        assert!(!serde_json::to_string(&err).unwrap().contains("disk"));
    }

    #[test]
    fn http_error_keeps_its_status_through_question_mark() {
        fn lookup() -> Result<u32, HttpError> {
            Err(HttpError::new(StatusCode::NOT_FOUND, "customer_not_found", "customer not found"))
        }
        fn fails() -> Result<u32, Error> {
            Ok(lookup()?)
        }
        let err = fails().unwrap_err();
        assert_eq!(err.status_code(), Some(StatusCode::NOT_FOUND));
        assert!(err.downcast_ref::<HttpError>().is_some());
    }

    #[test]
    fn foreign_errors_are_internal() {
        let err = Error::from(std::io::Error::other("boom"));
        assert!(err.is_internal());
        assert_eq!(err.status_code(), None);
    }

    #[test]
    fn translate_hides_internal_errors() {
        let rendered = translate(Error::msg("missing id"), false);
        assert_eq!(rendered.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            render(&*rendered),
            r#"{"error":{"code":"unknown_error","message":"an unknown error occurred"}}"#,
        );
    }

    #[test]
    fn translate_dumps_internal_errors_on_request() {
        let rendered = translate(Error::msg("foo error occurred"), true);
        assert_eq!(
            render(&*rendered),
            r#"{"error":{"code":"unknown_error","message":"an unknown error occurred","details":["foo error occurred"]}}"#,
        );
    }

    #[test]
    fn dump_splits_lines_and_expands_tabs() {
        let err = HttpError::bad_request("outer").wrap(Message("first\n\tsecond".into()));
        assert_eq!(
            dump_error(&err),
            vec!["bad_request: outer", "caused by: first", "  second"],
        );
    }

    #[test]
    fn translate_passes_self_describing_errors_through() {
        let rendered = translate(HttpError::unauthorized("who are you").into(), true);
        assert_eq!(rendered.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            render(&*rendered),
            r#"{"error":{"code":"unauthorized","message":"who are you"}}"#,
        );
    }

    #[derive(Debug, Serialize)]
    struct Teapot;

    impl fmt::Display for Teapot {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("teapot")
        }
    }

    impl StdError for Teapot {}

    impl ErrorResponse for Teapot {
        fn status_code(&self) -> StatusCode {
            StatusCode::IM_A_TEAPOT
        }
    }

    #[test]
    fn only_response_passes_custom_errors_through() {
        let converted: Error = Teapot.into();
        assert!(converted.is_internal());
        assert_eq!(converted.status_code(), None);

        let explicit = Error::response(Teapot);
        assert!(!explicit.is_internal());
        assert_eq!(explicit.status_code(), Some(StatusCode::IM_A_TEAPOT));
        assert!(explicit.downcast_ref::<Teapot>().is_some());
    }
}
