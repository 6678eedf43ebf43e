use std::{sync::Arc, time::Duration};

use axum::{
    extract::State,
    http::{header, request::Parts, HeaderMap, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Router,
};
use percent_encoding::percent_decode_str;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::{AllowHeaders, AllowOrigin, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{debug, error, info, span, Instrument, Level};

use crate::{fs, model, util};

mod content;
mod listing;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(55);
const INDEX_PAGE: &str = "index.html";

pub type SharedFileSystem = Arc<dyn fs::FileSystem>;

pub fn router(fs: SharedFileSystem, allowed_origins: Vec<String>) -> Router {
    Router::new()
        .fallback(serve)
        .with_state(fs)
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(cors_layer(allowed_origins))
        .layer(TraceLayer::new_for_http())
}

pub async fn run(
    fs: SharedFileSystem,
    address: &str,
    allowed_origins: Vec<String>,
) -> Result<(), model::fs::FSError> {
    let listener = tokio::net::TcpListener::bind(address).await?;
    info!(address = address, "listening");

    axum::serve(listener, router(fs, allowed_origins)).await?;
    Ok(())
}

async fn serve(
    State(fs): State<SharedFileSystem>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let span = span!(Level::INFO, "serve", context = "serve", method = %method, path = %uri.path());
    serve_path(fs, method, uri, headers).instrument(span).await
}

async fn serve_path(fs: SharedFileSystem, method: Method, uri: Uri, headers: HeaderMap) -> Response {
    if method != Method::GET && method != Method::HEAD {
        return (
            StatusCode::METHOD_NOT_ALLOWED,
            [(header::ALLOW, "GET, HEAD")],
            "405 method not allowed\n",
        )
            .into_response();
    }

    // TimeoutLayer only bounds the time to the response head
    let deadline = Instant::now() + REQUEST_TIMEOUT;

    let raw_path = uri.path();
    let upath = match percent_decode_str(raw_path).decode_utf8() {
        Ok(upath) => upath.into_owned(),
        Err(err) => {
            debug!(error_message = %err, "request path is not valid UTF-8");
            return (StatusCode::BAD_REQUEST, "400 bad request\n").into_response();
        }
    };

    if upath.ends_with(&format!("{}{}", util::path::SEPARATOR, INDEX_PAGE)) {
        return local_redirect("./", &uri);
    }

    let name = util::path::clean(&upath);
    let cancel = CancellationToken::new();

    let mut file = match fs.open(&name, &cancel).await {
        Ok(file) => file,
        Err(err) => return error_response(&err),
    };

    let info = match file.stat() {
        Ok(info) => info,
        Err(err) => {
            file.close();
            return error_response(&err);
        }
    };

    let is_dir = file.is_dir();
    let trailing_slash = raw_path.ends_with(util::path::SEPARATOR);
    if is_dir && !trailing_slash {
        file.close();
        return local_redirect(&format!("{}/", util::path::base(raw_path)), &uri);
    }
    if !is_dir && trailing_slash {
        file.close();
        return local_redirect(&format!("../{}", util::path::base(raw_path)), &uri);
    }

    if !is_dir {
        return content::serve_content(file, info, &method, &headers, deadline).await;
    }

    let index = format!("{}/{}", name.trim_end_matches(util::path::SEPARATOR), INDEX_PAGE);
    match fs.open(&index, &cancel).await {
        Ok(mut index_file) => match index_file.stat() {
            Ok(index_info) if !index_info.is_dir => {
                file.close();
                return content::serve_content(index_file, index_info, &method, &headers, deadline)
                    .await;
            }
            _ => index_file.close(),
        },
        Err(err) => debug!(error_message = %err, "no index document"),
    }

    listing::dir_list(file, &method).await
}

/// Redirects relative to the request path, keeping the query string.
fn local_redirect(target: &str, uri: &Uri) -> Response {
    let location = match uri.query() {
        Some(query) if !query.is_empty() => format!("{}?{}", target, query),
        _ => target.to_string(),
    };

    (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, location)]).into_response()
}

fn error_response(err: &model::fs::FSError) -> Response {
    if err.is_not_found() {
        return (StatusCode::NOT_FOUND, "404 page not found\n").into_response();
    }

    error!(error_message = %err, error_group = "serve");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "500 Internal Server Error\n",
    )
        .into_response()
}

fn cors_layer(allowed_origins: Vec<String>) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            move |origin: &HeaderValue, _parts: &Parts| {
                origin
                    .to_str()
                    .map_or(false, |origin| origin_allowed(&allowed_origins, origin))
            },
        ))
        .allow_methods([
            Method::GET,
            Method::PUT,
            Method::HEAD,
            Method::POST,
            Method::DELETE,
            Method::OPTIONS,
            Method::PATCH,
        ])
        .allow_headers(AllowHeaders::mirror_request())
        .expose_headers([
            header::ACCEPT_RANGES,
            header::CONTENT_LENGTH,
            header::CONTENT_RANGE,
            header::CONTENT_TYPE,
            header::ETAG,
            header::LAST_MODIFIED,
        ])
        .allow_credentials(true)
}

/// An empty pattern list allows every origin.
pub fn origin_allowed(patterns: &[String], origin: &str) -> bool {
    patterns.is_empty()
        || patterns
            .iter()
            .any(|pattern| util::wildcard::matches(pattern, origin))
}
