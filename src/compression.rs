//! Gzip negotiation for outgoing responses.
//!
//! Runs outside the pipeline, on the final response: a custom not-found
//! response is compressed the same way as an endpoint's. Compression changes
//! the bytes on the wire, never the JSON they decode to.

use std::io::Write;

use bytes::Bytes;
use flate2::Compression;
use flate2::write::GzEncoder;
use http::HeaderMap;
use http::header::{ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_LENGTH, HeaderValue, VARY};
use tracing::warn;

use crate::response::Response;

/// Bodies shorter than this are sent as-is: the gzip framing would cost more
/// than it saves.
pub(crate) const MIN_SIZE: usize = 1400;

/// Whether the request's `Accept-Encoding` accepts gzip with a non-zero
/// q-value. An explicit `gzip` entry wins over `*`.
pub(crate) fn accepts_gzip(headers: &HeaderMap) -> bool {
    let mut gzip = None;
    let mut any = None;
    let codings = headers
        .get_all(ACCEPT_ENCODING)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(parse_coding);
    for (coding, quality) in codings {
        if coding.eq_ignore_ascii_case("gzip") {
            gzip = Some(quality);
        } else if coding == "*" {
            any = Some(quality);
        }
    }
    gzip.or(any).is_some_and(|quality| quality > 0.0)
}

/// Parses one entry such as `gzip` or `gzip;q=0.8`.
fn parse_coding(entry: &str) -> Option<(&str, f32)> {
    let mut parts = entry.split(';');
    let coding = parts.next()?.trim();
    if coding.is_empty() {
        return None;
    }
    let quality = parts
        .find_map(|param| param.trim().strip_prefix("q="))
        .map_or(1.0, |q| q.trim().parse().unwrap_or(0.0));
    Some((coding, quality))
}

/// Applies gzip to `res` when the client accepts it and the body is worth it.
pub(crate) fn negotiate(mut res: Response, accepts_gzip: bool, level: Compression) -> Response {
    res.headers.append(VARY, HeaderValue::from_static("accept-encoding"));

    if !accepts_gzip || res.body.len() < MIN_SIZE || res.headers.contains_key(CONTENT_ENCODING) {
        return res;
    }

    match gzip(&res.body, level) {
        Ok(compressed) => {
            res.headers.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
            res.headers.remove(CONTENT_LENGTH);
            res.body = compressed;
        }
        Err(e) => warn!("gzip failed, sending uncompressed: {e}"),
    }
    res
}

fn gzip(body: &[u8], level: Compression) -> std::io::Result<Bytes> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(body.len() / 2), level);
    encoder.write_all(body)?;
    Ok(Bytes::from(encoder.finish()?))
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use flate2::read::GzDecoder;
    use http::StatusCode;

    use super::*;

    fn headers(accept: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static(accept));
        headers
    }

    fn response(body: Vec<u8>) -> Response {
        Response::builder().status(StatusCode::OK).json(body)
    }

    #[test]
    fn negotiation_honours_q_values() {
        assert!(accepts_gzip(&headers("gzip")));
        assert!(accepts_gzip(&headers("deflate, GZIP;q=0.5")));
        assert!(!accepts_gzip(&headers("gzip;q=0")));
        assert!(!accepts_gzip(&headers("br, deflate")));
        assert!(!accepts_gzip(&HeaderMap::new()));
    }

    #[test]
    fn wildcard_accepts_gzip_unless_refused() {
        assert!(accepts_gzip(&headers("*")));
        assert!(accepts_gzip(&headers("br, *;q=0.1")));
        assert!(!accepts_gzip(&headers("*;q=0")));
        assert!(!accepts_gzip(&headers("*, gzip;q=0")));
        assert!(accepts_gzip(&headers("*;q=0, gzip")));
    }

    #[test]
    fn large_bodies_round_trip() {
        let body = format!("{{\"message\":\"{}\"}}\n", "H".repeat(MIN_SIZE)).into_bytes();
        let res = negotiate(response(body.clone()), true, Compression::default());
        assert_eq!(res.headers[CONTENT_ENCODING], "gzip");
        assert_eq!(res.headers[VARY], "accept-encoding");

        let mut decoded = Vec::new();
        GzDecoder::new(&res.body[..]).read_to_end(&mut decoded).unwrap();
        assert_eq!(decoded, body);
    }

    #[test]
    fn small_bodies_are_left_alone() {
        let res = negotiate(response(b"{}\n".to_vec()), true, Compression::default());
        assert!(!res.headers.contains_key(CONTENT_ENCODING));
        assert_eq!(&res.body[..], b"{}\n");
    }

    #[test]
    fn refused_gzip_is_left_alone() {
        let body = "x".repeat(MIN_SIZE * 2).into_bytes();
        let res = negotiate(response(body.clone()), false, Compression::best());
        assert!(!res.headers.contains_key(CONTENT_ENCODING));
        assert_eq!(&res.body[..], &body[..]);
    }
}
