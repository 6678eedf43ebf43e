use std::sync::Arc;

use futures::{future::BoxFuture, FutureExt, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, span, warn, Instrument, Level};

use crate::{adapters, file, model, util};

pub const INDEX_DOCUMENTS: [&str; 2] = ["index.html", "index.htm"];
/// Global error page, always looked up at the bucket root.
pub const NOT_FOUND_DOCUMENT: &str = "404.html";
pub const BLOCKED_TOKEN: &str = "soap";

/// Open-a-path contract consumed by the HTTP layer.
pub trait FileSystem: Send + Sync {
    fn open<'a>(
        &'a self,
        name: &'a str,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<file::File, model::fs::FSError>>;
}

/// Serves the keys found under `bucket_path` in `bucket` as a directory tree.
pub struct ObjectFS {
    pub client: Arc<dyn adapters::ObjectStore>,
    pub bucket: String,
    pub bucket_path: String,
}

impl ObjectFS {
    pub fn new(client: Arc<dyn adapters::ObjectStore>, bucket: &str, bucket_path: &str) -> Self {
        Self {
            client,
            bucket: bucket.to_string(),
            bucket_path: util::path::join(bucket_path, "/"),
        }
    }

    async fn open_path(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<file::File, model::fs::FSError> {
        let request_path = util::path::clean(name);
        let name = util::path::join(&self.bucket_path, &request_path);
        info!(path = %name, "called");

        if cancel.is_cancelled() {
            return Err(model::fs::FSError::Cancelled);
        }

        let is_root = name == self.bucket_path;

        // only the part below the bucket path is filtered
        if !is_root && is_blocked(&request_path) {
            info!(path = %name, "blocked path");
            return Err(model::fs::FSError::NotFound(name));
        }

        if is_root || self.probe_dir(&name, cancel).await? {
            let dir = file::Directory::new(
                self.client.clone(),
                &self.bucket,
                &name,
                cancel.child_token(),
            );
            debug!(prefix = %dir.prefix(), "opened directory");
            return Ok(file::File::Directory(dir));
        }

        let key = name.trim_start_matches(util::path::SEPARATOR);
        let object = self.resolve_object(key, cancel).await?;
        debug!(key = %object.key(), "opened object");

        Ok(file::File::Object(object))
    }

    /// A path is a directory when at least one key lives under `name/`. The
    /// listing is cancelled as soon as the answer is known.
    async fn probe_dir(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<bool, model::fs::FSError> {
        let prefix = format!(
            "{}{}",
            name.trim_matches(util::path::SEPARATOR),
            util::path::SEPARATOR
        );

        let probe = cancel.child_token();
        let _guard = probe.clone().drop_guard();

        let mut listing = self.client.list_objects(
            &self.bucket,
            model::object::ListOptions::probe(&prefix),
            probe.clone(),
        );
        let first = listing.next().await;
        probe.cancel();
        drop(listing);

        match first {
            Some(Ok(entry)) => {
                debug!(prefix = %prefix, key = %entry.key, "directory found");
                Ok(true)
            }
            None => Ok(false),
            Some(Err(err)) if err.is_not_found() => Ok(false),
            Some(Err(err)) => {
                error!(error_message=%err, error_group="list_objects", prefix = %prefix);
                Err(err)
            }
        }
    }

    /// Walks the candidate keys in order and returns the first one that both
    /// fetches and stats.
    async fn resolve_object(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<file::Object, model::fs::FSError> {
        for key in candidates(name) {
            if cancel.is_cancelled() {
                return Err(model::fs::FSError::Cancelled);
            }

            let token = cancel.child_token();
            let body = match self
                .client
                .get_object(&self.bucket, &key, token.clone())
                .await
            {
                Err(err) => {
                    info!(error_message=%err, error_group="get_object", key = %key, "error fetching object");
                    continue;
                }
                Ok(body) => body,
            };

            match body.stat().await {
                Ok(info) => return Ok(file::Object::new(body, info, token)),
                Err(err) if err.is_not_found() => continue,
                Err(err) => {
                    warn!(error_message=%err, error_group="head_object", key = %key, "error stat'ing object");
                    continue;
                }
            }
        }

        Err(model::fs::FSError::NotFound(name.to_string()))
    }
}

impl FileSystem for ObjectFS {
    fn open<'a>(
        &'a self,
        name: &'a str,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<file::File, model::fs::FSError>> {
        let span = span!(Level::INFO, "open", context = "open", request_path = %name);
        self.open_path(name, cancel).instrument(span).boxed()
    }
}

pub fn is_blocked(name: &str) -> bool {
    name.trim().to_lowercase().contains(BLOCKED_TOKEN)
}

/// Ordered fallback keys for `name`; the last one does not depend on `name`.
pub fn candidates(name: &str) -> Vec<String> {
    let mut keys = vec![name.to_string()];
    for index in INDEX_DOCUMENTS {
        keys.push(format!("{}{}{}", name, util::path::SEPARATOR, index));
    }
    keys.push(NOT_FOUND_DOCUMENT.to_string());

    keys
}
