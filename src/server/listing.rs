use axum::{
    body::Body,
    http::{header, HeaderValue, Method},
    response::{IntoResponse, Response},
};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::{file, model};

/// Bytes escaped in listing hrefs; path punctuation stays readable.
const HREF: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b',')
    .remove(b'/')
    .remove(b':')
    .remove(b';')
    .remove(b'=')
    .remove(b'@');

/// Renders every child of the directory behind `file` as an HTML index.
pub async fn dir_list(mut file: file::File, method: &Method) -> Response {
    let entries = file.read_dir(0).await;
    file.close();

    let entries = match entries {
        Ok(entries) => entries,
        Err(err) => return super::error_response(&err),
    };

    let body = if method == Method::HEAD {
        Body::empty()
    } else {
        Body::from(render(entries))
    };

    let mut res = body.into_response();
    res.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    res
}

pub fn render(mut entries: Vec<model::fs::FileInfo>) -> String {
    entries.sort_by(|a, b| a.name.cmp(&b.name));

    let mut out = String::from("<!doctype html>\n<meta name=\"viewport\" content=\"width=device-width\">\n<pre>\n");
    for entry in entries {
        let mut name = entry.name;
        if entry.is_dir {
            name.push('/');
        }

        let mut href = utf8_percent_encode(&name, HREF).to_string();
        // a colon before the first slash would read as a URL scheme
        if name.split('/').next().map_or(false, |first| first.contains(':')) {
            href = format!("./{}", href);
        }

        out.push_str(&format!("<a href=\"{}\">{}</a>\n", escape_html(&href), escape_html(&name)));
    }
    out.push_str("</pre>\n");

    out
}

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }

    out
}
