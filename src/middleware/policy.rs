//! Level selection and skip predicates.

use std::sync::Arc;

use http::StatusCode;
use tracing::Level;

use super::fields::Value;
use crate::request::RequestHead;
use crate::response::ResponseWriter;

/// Decides whether to skip a logging or capture step for a request.
pub type Predicate = Arc<dyn Fn(&RequestHead, &ResponseWriter) -> bool + Send + Sync>;

/// Picks the level of an access entry.
pub type LevelFn = Arc<dyn Fn(&RequestHead, &ResponseWriter) -> Level + Send + Sync>;

/// Default level policy:
///
/// | status | level |
/// |---|---|
/// | 500–511 | `ERROR` |
/// | 400–451, except 401 | `WARN` |
/// | anything else | `INFO` |
///
/// 401 stays at `INFO`.
pub fn level_for_status(status: StatusCode) -> Level {
    match status.as_u16() {
        500..=511 => Level::ERROR,
        401 => Level::INFO,
        400..=451 => Level::WARN,
        _ => Level::INFO,
    }
}

pub(crate) fn never(_: &RequestHead, _: &ResponseWriter) -> bool {
    false
}

pub(crate) fn status_level(_: &RequestHead, res: &ResponseWriter) -> Level {
    level_for_status(res.status())
}

/// `true` for `multipart/form-data` or `multipart/mixed` with a boundary.
/// Such bodies are never captured.
pub fn is_multipart(req: &RequestHead) -> bool {
    let Some(content_type) = req.header("content-type") else {
        return false;
    };
    let mut parts = content_type.split(';');
    let media = parts.next().unwrap_or("").trim();
    let multipart = media.eq_ignore_ascii_case("multipart/form-data")
        || media.eq_ignore_ascii_case("multipart/mixed");
    multipart
        && parts.any(|p| {
            p.split_once('=')
                .is_some_and(|(name, _)| name.trim().eq_ignore_ascii_case("boundary"))
        })
}

/// A captured body as a log value: text when it is UTF-8, the exact bytes
/// otherwise. At or over `limit` bytes (when `limit` is nonzero) the body is
/// replaced by `marker`, never cut short.
pub fn body_value(body: &[u8], limit: usize, marker: &'static str) -> Value {
    if limit > 0 && body.len() >= limit {
        return Value::Str(marker.to_owned());
    }
    match std::str::from_utf8(body) {
        Ok(text) => Value::Str(text.to_owned()),
        Err(_) => Value::Bytes(body.to_vec()),
    }
}
