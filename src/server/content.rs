use std::{
    io::SeekFrom,
    time::{SystemTime, UNIX_EPOCH},
};

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures::{stream, Stream, TryStreamExt};
use time::{
    format_description::BorrowedFormatItem, macros::format_description, OffsetDateTime,
    PrimitiveDateTime,
};
use tokio::time::Instant;
use tracing::error;

use crate::{file, model};

const CHUNK_SIZE: usize = 64 * 1024;
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";
const HTTP_DATE: &[BorrowedFormatItem<'static>] = format_description!(
    "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
);

/// Inclusive byte range.
#[derive(Debug, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct RangeNotSatisfiable;

/// Parses a `Range` header against an object of `size` bytes. Multi-range
/// requests yield `None` and are answered with the whole object.
pub fn parse_range(range: &str, size: u64) -> Result<Option<ByteRange>, RangeNotSatisfiable> {
    let ranges = range
        .trim()
        .strip_prefix("bytes=")
        .ok_or(RangeNotSatisfiable)?
        .trim();

    if ranges.contains(',') {
        return Ok(None);
    }

    if size == 0 {
        return Err(RangeNotSatisfiable);
    }

    if let Some(suffix) = ranges.strip_prefix('-') {
        // bytes=-N, the last N bytes
        let n: u64 = suffix.trim().parse().map_err(|_| RangeNotSatisfiable)?;
        if n == 0 {
            return Err(RangeNotSatisfiable);
        }

        let n = n.min(size);
        return Ok(Some(ByteRange {
            start: size - n,
            end: size - 1,
        }));
    }

    let (start, end) = ranges.split_once('-').ok_or(RangeNotSatisfiable)?;
    let start: u64 = start.trim().parse().map_err(|_| RangeNotSatisfiable)?;
    if start >= size {
        return Err(RangeNotSatisfiable);
    }

    let end = if end.trim().is_empty() {
        size - 1
    } else {
        let end: u64 = end.trim().parse().map_err(|_| RangeNotSatisfiable)?;
        if end < start {
            return Err(RangeNotSatisfiable);
        }
        end.min(size - 1)
    };

    Ok(Some(ByteRange { start, end }))
}

pub fn format_http_date(t: SystemTime) -> Option<String> {
    OffsetDateTime::from(t).format(HTTP_DATE).ok()
}

pub fn parse_http_date(value: &str) -> Option<SystemTime> {
    let dt = PrimitiveDateTime::parse(value.trim(), HTTP_DATE).ok()?;
    Some(dt.assume_utc().into())
}

/// Compares at second precision, the resolution of HTTP dates.
pub fn is_not_modified(headers: &HeaderMap, modified_time: Option<SystemTime>) -> bool {
    let Some(modified_time) = modified_time else {
        return false;
    };

    let Some(since) = headers
        .get(header::IF_MODIFIED_SINCE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_http_date)
    else {
        return false;
    };

    match (
        modified_time.duration_since(UNIX_EPOCH),
        since.duration_since(UNIX_EPOCH),
    ) {
        (Ok(modified), Ok(since)) => modified.as_secs() <= since.as_secs(),
        _ => false,
    }
}

pub fn content_type_for(name: &str) -> &'static str {
    let ext = match name.rsplit_once('.') {
        Some((_, ext)) => ext.to_ascii_lowercase(),
        None => return DEFAULT_CONTENT_TYPE,
    };

    match ext.as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "text/javascript; charset=utf-8",
        "json" => "application/json",
        "txt" => "text/plain; charset=utf-8",
        "xml" => "text/xml; charset=utf-8",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "avif" => "image/avif",
        "ico" => "image/vnd.microsoft.icon",
        "pdf" => "application/pdf",
        "wasm" => "application/wasm",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "mp4" => "video/mp4",
        _ => DEFAULT_CONTENT_TYPE,
    }
}

/// Streams the object behind `file`, honouring `Range` and `If-Modified-Since`.
/// The body stream fails once `deadline` passes.
pub async fn serve_content(
    mut file: file::File,
    info: model::fs::FileInfo,
    method: &Method,
    headers: &HeaderMap,
    deadline: Instant,
) -> Response {
    let last_modified = info
        .modified_time
        .and_then(format_http_date)
        .and_then(|lm| HeaderValue::from_str(&lm).ok());

    if is_not_modified(headers, info.modified_time) {
        file.close();
        let mut res = StatusCode::NOT_MODIFIED.into_response();
        if let Some(lm) = last_modified {
            res.headers_mut().insert(header::LAST_MODIFIED, lm);
        }
        return res;
    }

    let range = match headers.get(header::RANGE).and_then(|v| v.to_str().ok()) {
        None => None,
        Some(value) => match parse_range(value, info.size) {
            Ok(range) => range,
            Err(RangeNotSatisfiable) => {
                file.close();
                return (
                    StatusCode::RANGE_NOT_SATISFIABLE,
                    [(header::CONTENT_RANGE, format!("bytes */{}", info.size))],
                    "416 requested range not satisfiable\n",
                )
                    .into_response();
            }
        },
    };

    let (status, start, length) = match &range {
        Some(r) => (StatusCode::PARTIAL_CONTENT, r.start, r.len()),
        None => (StatusCode::OK, 0, info.size),
    };

    if start > 0 {
        if let Err(err) = file.seek(SeekFrom::Start(start)) {
            return super::error_response(&err);
        }
    }

    let content_type = info
        .content_type
        .as_deref()
        .filter(|ct| !ct.is_empty())
        .and_then(|ct| HeaderValue::from_str(ct).ok())
        .unwrap_or_else(|| HeaderValue::from_static(content_type_for(&info.name)));

    let body = if method == Method::HEAD {
        file.close();
        Body::empty()
    } else {
        Body::from_stream(body_stream(file, length, deadline))
    };

    let mut res = Response::new(body);
    *res.status_mut() = status;

    let h = res.headers_mut();
    h.insert(header::CONTENT_TYPE, content_type);
    h.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    h.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    if let Some(lm) = last_modified {
        h.insert(header::LAST_MODIFIED, lm);
    }
    if let Some(etag) = info.etag.as_deref().and_then(|e| HeaderValue::from_str(e).ok()) {
        h.insert(header::ETAG, etag);
    }
    if let Some(r) = &range {
        if let Ok(cr) = HeaderValue::from_str(&format!("bytes {}-{}/{}", r.start, r.end, info.size)) {
            h.insert(header::CONTENT_RANGE, cr);
        }
    }

    res
}

fn body_stream(
    file: file::File,
    length: u64,
    deadline: Instant,
) -> impl Stream<Item = Result<Bytes, model::fs::FSError>> + Send + 'static {
    stream::try_unfold((file, length), move |(mut file, remaining)| async move {
        if remaining == 0 {
            file.close();
            return Ok::<_, model::fs::FSError>(None);
        }

        if Instant::now() >= deadline {
            return Err(model::fs::FSError::from(timed_out()));
        }

        let size = usize::try_from(remaining)
            .unwrap_or(usize::MAX)
            .min(CHUNK_SIZE);
        let mut buf = vec![0u8; size];

        let n = tokio::time::timeout_at(deadline, file.read(&mut buf))
            .await
            .map_err(|_| timed_out())??;
        if n == 0 {
            file.close();
            return Ok(None);
        }

        buf.truncate(n);
        Ok(Some((Bytes::from(buf), (file, remaining - n as u64))))
    })
    .inspect_err(|err| error!(error_message=%err, error_group="read_object"))
}

fn timed_out() -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::TimedOut, "response body deadline exceeded")
}
