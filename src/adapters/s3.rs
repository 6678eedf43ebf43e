use std::time::{Duration, SystemTime};

use aws_sdk_s3::{error::DisplayErrorContext, primitives::DateTime};
use futures::{future::BoxFuture, stream, FutureExt, StreamExt};
use tokio::sync::{mpsc, OnceCell};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{span, Instrument, Level};

use crate::{adapters, model};

const LIST_BUFFER: usize = 16;
const DELIMITER: &str = "/";

impl adapters::ObjectStore for aws_sdk_s3::Client {
    fn list_objects(
        &self,
        bucket: &str,
        options: model::object::ListOptions,
        cancel: CancellationToken,
    ) -> adapters::EntryStream {
        let (tx, rx) = mpsc::channel(LIST_BUFFER);
        let span = span!(
            Level::INFO,
            "list_objects",
            context = "list_objects",
            prefix = %options.prefix
        );

        tokio::spawn(
            produce_listing(self.clone(), bucket.to_string(), options, cancel, tx).instrument(span),
        );

        ReceiverStream::new(rx).boxed()
    }

    fn get_object(
        &self,
        bucket: &str,
        key: &str,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, Result<Box<dyn adapters::ObjectBody>, model::fs::FSError>> {
        let object = S3Object {
            client: self.clone(),
            bucket: bucket.to_string(),
            key: key.to_string(),
            cancel,
            info: OnceCell::new(),
        };

        async move { Ok(Box::new(object) as Box<dyn adapters::ObjectBody>) }.boxed()
    }
}

async fn produce_listing(
    client: aws_sdk_s3::Client,
    bucket: String,
    options: model::object::ListOptions,
    cancel: CancellationToken,
    tx: mpsc::Sender<Result<model::object::ObjectEntry, model::fs::FSError>>,
) {
    let mut remaining = options.max_keys;
    let mut continuation_token: Option<String> = None;

    loop {
        let mut req = client
            .list_objects_v2()
            .bucket(&bucket)
            .prefix(&options.prefix);

        if let Some(max) = remaining {
            req = req.max_keys(i32::try_from(max).unwrap_or(i32::MAX));
        }

        if !options.recursive {
            req = req.delimiter(DELIMITER);
        }

        if let Some(tok) = continuation_token.take() {
            req = req.continuation_token(tok);
        }

        let lo = tokio::select! {
            _ = cancel.cancelled() => return,
            res = req.send() => match res {
                Err(err) => {
                    let no_bucket = err
                        .as_service_error()
                        .map_or(false, |svc_err| svc_err.is_no_such_bucket());
                    let err = if no_bucket {
                        model::fs::FSError::NotFound(bucket.clone())
                    } else {
                        model::fs::FSError::remote(format!(
                            "failed to list_objects at: {}, {}",
                            options.prefix,
                            DisplayErrorContext(&err)
                        ))
                    };

                    emit(&tx, &cancel, Err(err)).await;
                    return;
                }
                Ok(lo) => lo,
            },
        };

        let prefixes = lo
            .common_prefixes()
            .iter()
            .filter_map(|p| p.prefix())
            .map(|key| model::object::ObjectEntry {
                key: key.to_string(),
                size: 0,
                modified_time: None,
                is_prefix: true,
            });

        let objects = lo.contents().iter().map(|o| model::object::ObjectEntry {
            key: o.key().unwrap_or("").to_string(),
            size: o.size().and_then(|s| u64::try_from(s).ok()).unwrap_or(0),
            modified_time: to_system_time(o.last_modified()),
            is_prefix: false,
        });

        for entry in prefixes.chain(objects) {
            if remaining == Some(0) {
                return;
            }

            if !emit(&tx, &cancel, Ok(entry)).await {
                return;
            }

            if let Some(r) = remaining.as_mut() {
                *r -= 1;
            }
        }

        if remaining == Some(0) {
            return;
        }

        continuation_token = lo.next_continuation_token().map(|tok| tok.to_string());
        if continuation_token.is_none() {
            break;
        }
    }
}

/// Returns false once the subscriber is gone or the listing was cancelled.
async fn emit(
    tx: &mpsc::Sender<Result<model::object::ObjectEntry, model::fs::FSError>>,
    cancel: &CancellationToken,
    item: Result<model::object::ObjectEntry, model::fs::FSError>,
) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        res = tx.send(item) => res.is_ok(),
    }
}

struct S3Object {
    client: aws_sdk_s3::Client,
    bucket: String,
    key: String,
    cancel: CancellationToken,
    info: OnceCell<model::object::ObjectInfo>,
}

impl S3Object {
    async fn head_object(&self) -> Result<model::object::ObjectInfo, model::fs::FSError> {
        let req = self.client.head_object().bucket(&self.bucket).key(&self.key);

        let ho = tokio::select! {
            _ = self.cancel.cancelled() => return Err(model::fs::FSError::Cancelled),
            res = req.send() => match res {
                Err(err) => {
                    if let Some(svc_err) = err.as_service_error() {
                        if svc_err.is_not_found() {
                            return Err(model::fs::FSError::NotFound(self.key.clone()));
                        }
                    }

                    return Err(model::fs::FSError::remote(format!(
                        "failed to head_object: {}, {}",
                        self.key,
                        DisplayErrorContext(&err)
                    )));
                }
                Ok(ho) => ho,
            },
        };

        Ok(model::object::ObjectInfo {
            key: self.key.clone(),
            size: ho
                .content_length()
                .and_then(|len| u64::try_from(len).ok())
                .unwrap_or(0),
            modified_time: to_system_time(ho.last_modified()),
            content_type: ho.content_type().map(|ct| ct.to_string()),
            etag: ho.e_tag().map(|etag| etag.to_string()),
        })
    }
}

impl adapters::ObjectBody for S3Object {
    fn key(&self) -> &str {
        &self.key
    }

    fn stat(&self) -> BoxFuture<'_, Result<model::object::ObjectInfo, model::fs::FSError>> {
        async move {
            let info = self.info.get_or_try_init(|| self.head_object()).await?;
            Ok(info.clone())
        }
        .boxed()
    }

    fn read_from(
        &self,
        offset: u64,
    ) -> BoxFuture<'_, Result<adapters::BodyStream, model::fs::FSError>> {
        async move {
            let req = self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(&self.key)
                .range(format!("bytes={}-", offset));

            let o = tokio::select! {
                _ = self.cancel.cancelled() => return Err(model::fs::FSError::Cancelled),
                res = req.send() => match res {
                    Err(err) => {
                        if let Some(svc_err) = err.as_service_error() {
                            if svc_err.is_no_such_key() {
                                return Err(model::fs::FSError::NotFound(self.key.clone()));
                            }
                        }

                        return Err(model::fs::FSError::remote(format!(
                            "failed to get_object: {}, {}",
                            self.key,
                            DisplayErrorContext(&err)
                        )));
                    }
                    Ok(o) => o,
                },
            };

            let key = self.key.clone();
            let body = stream::unfold(o.body, move |mut body| {
                let key = key.clone();
                async move {
                    match body.next().await {
                        None => None,
                        Some(Ok(bytes)) => Some((Ok(bytes), body)),
                        Some(Err(err)) => Some((
                            Err(model::fs::FSError::remote(format!(
                                "failed to read body: {}, {}",
                                key, err
                            ))),
                            body,
                        )),
                    }
                }
            });

            Ok(body.take_until(self.cancel.clone().cancelled_owned()).boxed())
        }
        .boxed()
    }
}

fn to_system_time(dt: Option<&DateTime>) -> Option<SystemTime> {
    let dt = dt?;
    let secs = u64::try_from(dt.secs()).ok()?;

    Some(SystemTime::UNIX_EPOCH + Duration::new(secs, dt.subsec_nanos()))
}
