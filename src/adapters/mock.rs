use std::{
    collections::{BTreeMap, BTreeSet, HashSet},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::{Duration, SystemTime},
};

use bytes::Bytes;
use futures::{future::BoxFuture, stream, FutureExt, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::{adapters, model};

pub fn mock_modified_time() -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000)
}

#[derive(Clone)]
struct MockObject {
    data: Bytes,
    content_type: Option<String>,
}

#[derive(Clone, Copy)]
enum ListFailure {
    NotFound,
    Remote,
}

/// In-memory store that records every call made against it.
#[derive(Default)]
pub struct MockStore {
    objects: BTreeMap<String, MockObject>,
    fetch_failures: HashSet<String>,
    stat_failures: HashSet<String>,
    list_failure: Option<ListFailure>,
    unbounded_listing: bool,
    chunk_size: usize,
    pub list_calls: AtomicUsize,
    pub get_calls: AtomicUsize,
    pub stat_calls: Arc<AtomicUsize>,
    pub fetched: Mutex<Vec<String>>,
    pub reads: Arc<Mutex<Vec<(String, u64)>>>,
    pub list_tokens: Mutex<Vec<CancellationToken>>,
    pub enumerated_after_cancel: Arc<AtomicBool>,
}

impl MockStore {
    pub fn new() -> Self {
        Self {
            chunk_size: 4,
            ..Default::default()
        }
    }

    pub fn with_object(self, key: &str, data: &[u8]) -> Self {
        self.with_typed_object(key, data, None)
    }

    pub fn with_typed_object(mut self, key: &str, data: &[u8], content_type: Option<&str>) -> Self {
        self.objects.insert(
            key.to_string(),
            MockObject {
                data: Bytes::copy_from_slice(data),
                content_type: content_type.map(|ct| ct.to_string()),
            },
        );
        self
    }

    pub fn with_fetch_failure(mut self, key: &str) -> Self {
        self.fetch_failures.insert(key.to_string());
        self
    }

    pub fn with_stat_failure(mut self, key: &str) -> Self {
        self.stat_failures.insert(key.to_string());
        self
    }

    pub fn with_list_not_found(mut self) -> Self {
        self.list_failure = Some(ListFailure::NotFound);
        self
    }

    pub fn with_list_failure(mut self) -> Self {
        self.list_failure = Some(ListFailure::Remote);
        self
    }

    /// Ignores `max_keys`, so a caller has to cancel to stop the listing.
    pub fn with_unbounded_listing(mut self) -> Self {
        self.unbounded_listing = true;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn remote_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
            + self.get_calls.load(Ordering::SeqCst)
            + self.stat_calls.load(Ordering::SeqCst)
    }

    pub fn fetched_keys(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }

    fn entries(&self, options: &model::object::ListOptions) -> Vec<model::object::ObjectEntry> {
        let mut entries = Vec::new();
        let mut seen_prefixes = BTreeSet::new();

        for (key, object) in self.objects.range(options.prefix.clone()..) {
            if !key.starts_with(&options.prefix) {
                break;
            }

            let rest = &key[options.prefix.len()..];
            if !options.recursive {
                if let Some(pos) = rest.find('/') {
                    let prefix = format!("{}{}", options.prefix, &rest[..=pos]);
                    if seen_prefixes.insert(prefix.clone()) {
                        entries.push(model::object::ObjectEntry {
                            key: prefix,
                            size: 0,
                            modified_time: None,
                            is_prefix: true,
                        });
                    }
                    continue;
                }
            }

            entries.push(model::object::ObjectEntry {
                key: key.clone(),
                size: object.data.len() as u64,
                modified_time: Some(mock_modified_time()),
                is_prefix: false,
            });
        }

        if let Some(max) = options.max_keys {
            if !self.unbounded_listing {
                entries.truncate(max);
            }
        }

        entries
    }
}

impl adapters::ObjectStore for MockStore {
    fn list_objects(
        &self,
        _bucket: &str,
        options: model::object::ListOptions,
        cancel: CancellationToken,
    ) -> adapters::EntryStream {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.list_tokens.lock().unwrap().push(cancel.clone());

        match self.list_failure {
            Some(ListFailure::NotFound) => {
                return stream::once(async {
                    Err(model::fs::FSError::NotFound("bucket".to_string()))
                })
                .boxed();
            }
            Some(ListFailure::Remote) => {
                return stream::once(async { Err(model::fs::FSError::remote("access denied")) })
                    .boxed();
            }
            None => (),
        }

        let violated = self.enumerated_after_cancel.clone();
        stream::iter(self.entries(&options))
            .map(move |entry| {
                if cancel.is_cancelled() {
                    violated.store(true, Ordering::SeqCst);
                    return Err(model::fs::FSError::remote("enumerated after cancellation"));
                }
                Ok(entry)
            })
            .boxed()
    }

    fn get_object(
        &self,
        _bucket: &str,
        key: &str,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, Result<Box<dyn adapters::ObjectBody>, model::fs::FSError>> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.fetched.lock().unwrap().push(key.to_string());

        let res: Result<Box<dyn adapters::ObjectBody>, model::fs::FSError> =
            if self.fetch_failures.contains(key) {
                Err(model::fs::FSError::remote(format!("connection reset: {}", key)))
            } else {
                Ok(Box::new(MockBody {
                    key: key.to_string(),
                    object: self.objects.get(key).cloned(),
                    stat_failure: self.stat_failures.contains(key),
                    chunk_size: self.chunk_size,
                    stat_calls: self.stat_calls.clone(),
                    reads: self.reads.clone(),
                    cancel,
                }))
            };

        async move { res }.boxed()
    }
}

struct MockBody {
    key: String,
    object: Option<MockObject>,
    stat_failure: bool,
    chunk_size: usize,
    stat_calls: Arc<AtomicUsize>,
    reads: Arc<Mutex<Vec<(String, u64)>>>,
    cancel: CancellationToken,
}

impl adapters::ObjectBody for MockBody {
    fn key(&self) -> &str {
        &self.key
    }

    fn stat(&self) -> BoxFuture<'_, Result<model::object::ObjectInfo, model::fs::FSError>> {
        self.stat_calls.fetch_add(1, Ordering::SeqCst);

        async move {
            if self.cancel.is_cancelled() {
                return Err(model::fs::FSError::Cancelled);
            }

            if self.stat_failure {
                return Err(model::fs::FSError::remote(format!("throttled: {}", self.key)));
            }

            let object = self
                .object
                .as_ref()
                .ok_or_else(|| model::fs::FSError::NotFound(self.key.clone()))?;

            Ok(model::object::ObjectInfo {
                key: self.key.clone(),
                size: object.data.len() as u64,
                modified_time: Some(mock_modified_time()),
                content_type: object.content_type.clone(),
                etag: Some(format!("\"{}-{}\"", self.key, object.data.len())),
            })
        }
        .boxed()
    }

    fn read_from(
        &self,
        offset: u64,
    ) -> BoxFuture<'_, Result<adapters::BodyStream, model::fs::FSError>> {
        self.reads.lock().unwrap().push((self.key.clone(), offset));

        async move {
            if self.cancel.is_cancelled() {
                return Err(model::fs::FSError::Cancelled);
            }

            let data = self
                .object
                .as_ref()
                .map(|o| o.data.clone())
                .ok_or_else(|| model::fs::FSError::NotFound(self.key.clone()))?;

            let start = usize::try_from(offset).unwrap_or(usize::MAX).min(data.len());
            let chunks: Vec<Result<Bytes, model::fs::FSError>> = (start..data.len())
                .step_by(self.chunk_size)
                .map(|i| Ok(data.slice(i..(i + self.chunk_size).min(data.len()))))
                .collect();

            Ok(stream::iter(chunks)
                .take_until(self.cancel.clone().cancelled_owned())
                .boxed())
        }
        .boxed()
    }
}
