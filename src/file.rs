use std::{io::SeekFrom, sync::Arc};

use bytes::Bytes;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{adapters, model, util};

/// Per-request handle returned by the filesystem. Exactly one variant is
/// active; operations that do not apply to it fail with `Unsupported`.
pub enum File {
    Directory(Directory),
    Object(Object),
}

impl File {
    pub fn is_dir(&self) -> bool {
        matches!(self, File::Directory(_))
    }

    pub fn stat(&self) -> Result<model::fs::FileInfo, model::fs::FSError> {
        match self {
            File::Directory(dir) => dir.stat(),
            File::Object(obj) => obj.stat(),
        }
    }

    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, model::fs::FSError> {
        match self {
            File::Directory(dir) => dir.unsupported("read"),
            File::Object(obj) => obj.read(buf).await,
        }
    }

    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64, model::fs::FSError> {
        match self {
            File::Directory(dir) => dir.unsupported("seek"),
            File::Object(obj) => obj.seek(pos),
        }
    }

    /// Returns up to `count` entries, or every remaining one when `count` is 0.
    /// An exhausted listing yields an empty vector.
    pub async fn read_dir(
        &mut self,
        count: usize,
    ) -> Result<Vec<model::fs::FileInfo>, model::fs::FSError> {
        match self {
            File::Directory(dir) => dir.read_dir(count).await,
            File::Object(obj) => obj.unsupported("read_dir"),
        }
    }

    /// Releases remote resources. Calling it again is a no-op.
    pub fn close(&mut self) {
        match self {
            File::Directory(dir) => dir.close(),
            File::Object(obj) => obj.close(),
        }
    }
}

pub struct Directory {
    client: Arc<dyn adapters::ObjectStore>,
    bucket: String,
    prefix: String,
    cancel: CancellationToken,
    listing: Option<adapters::EntryStream>,
    exhausted: bool,
    closed: bool,
}

impl Directory {
    pub fn new(
        client: Arc<dyn adapters::ObjectStore>,
        bucket: &str,
        prefix: &str,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client,
            bucket: bucket.to_string(),
            prefix: prefix.trim_matches(util::path::SEPARATOR).to_string(),
            cancel,
            listing: None,
            exhausted: false,
            closed: false,
        }
    }

    /// Key prefix without surrounding separators; empty at the bucket root.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn unsupported<T>(&self, operation: &'static str) -> Result<T, model::fs::FSError> {
        if self.closed {
            return Err(model::fs::FSError::Closed);
        }

        Err(model::fs::FSError::Unsupported {
            operation,
            kind: "directory",
        })
    }

    fn stat(&self) -> Result<model::fs::FileInfo, model::fs::FSError> {
        if self.closed {
            return Err(model::fs::FSError::Closed);
        }

        Ok(model::fs::FileInfo::directory(util::path::base(
            &self.prefix,
        )))
    }

    fn listing_prefix(&self) -> String {
        if self.prefix.is_empty() {
            String::new()
        } else {
            format!("{}{}", self.prefix, util::path::SEPARATOR)
        }
    }

    async fn read_dir(
        &mut self,
        count: usize,
    ) -> Result<Vec<model::fs::FileInfo>, model::fs::FSError> {
        if self.closed {
            return Err(model::fs::FSError::Closed);
        }

        if self.exhausted {
            return Ok(Vec::new());
        }

        let listing_prefix = self.listing_prefix();
        let listing = self.listing.get_or_insert_with(|| {
            debug!(prefix = %listing_prefix, "starting listing");
            self.client.list_objects(
                &self.bucket,
                model::object::ListOptions::children(&listing_prefix),
                self.cancel.child_token(),
            )
        });

        let mut entries = Vec::new();
        let mut failure = None;
        while count == 0 || entries.len() < count {
            match listing.next().await {
                None => {
                    self.exhausted = true;
                    break;
                }
                Some(Err(err)) => {
                    failure = Some(err);
                    break;
                }
                Some(Ok(entry)) => {
                    if let Some(info) = entry_info(&listing_prefix, entry) {
                        entries.push(info);
                    }
                }
            }
        }

        if self.exhausted || failure.is_some() {
            self.listing = None;
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(entries),
        }
    }

    fn close(&mut self) {
        self.closed = true;
        self.listing = None;
        self.cancel.cancel();
    }
}

impl Drop for Directory {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Turns a listing entry into a child record, skipping the placeholder key
/// that names the directory itself.
fn entry_info(
    listing_prefix: &str,
    entry: model::object::ObjectEntry,
) -> Option<model::fs::FileInfo> {
    let name = entry
        .key
        .strip_prefix(listing_prefix)?
        .trim_end_matches(util::path::SEPARATOR);
    if name.is_empty() {
        return None;
    }

    let is_dir = entry.is_prefix || entry.key.ends_with(util::path::SEPARATOR);

    Some(model::fs::FileInfo {
        name: name.to_string(),
        size: if is_dir { 0 } else { entry.size },
        modified_time: entry.modified_time,
        is_dir,
        content_type: None,
        etag: None,
    })
}

struct Reader {
    stream: adapters::BodyStream,
    pending: Bytes,
    /// Object offset the next byte of `pending` (or of `stream`) belongs to.
    offset: u64,
}

pub struct Object {
    body: Box<dyn adapters::ObjectBody>,
    info: model::object::ObjectInfo,
    position: u64,
    reader: Option<Reader>,
    cancel: CancellationToken,
    closed: bool,
}

impl Object {
    pub fn new(
        body: Box<dyn adapters::ObjectBody>,
        info: model::object::ObjectInfo,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            body,
            info,
            position: 0,
            reader: None,
            cancel,
            closed: false,
        }
    }

    pub fn key(&self) -> &str {
        self.body.key()
    }

    fn unsupported<T>(&self, operation: &'static str) -> Result<T, model::fs::FSError> {
        if self.closed {
            return Err(model::fs::FSError::Closed);
        }

        Err(model::fs::FSError::Unsupported {
            operation,
            kind: "object",
        })
    }

    fn stat(&self) -> Result<model::fs::FileInfo, model::fs::FSError> {
        if self.closed {
            return Err(model::fs::FSError::Closed);
        }

        Ok(model::fs::FileInfo {
            name: util::path::base(&self.info.key).to_string(),
            size: self.info.size,
            modified_time: self.info.modified_time,
            is_dir: false,
            content_type: self.info.content_type.clone(),
            etag: self.info.etag.clone(),
        })
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, model::fs::FSError> {
        if self.closed {
            return Err(model::fs::FSError::Closed);
        }

        if buf.is_empty() || self.position >= self.info.size {
            return Ok(0);
        }

        let mut reader = match self.reader.take() {
            Some(reader) if reader.offset == self.position => reader,
            _ => {
                debug!(key = %self.body.key(), offset = self.position, "opening body stream");
                Reader {
                    stream: self.body.read_from(self.position).await?,
                    pending: Bytes::new(),
                    offset: self.position,
                }
            }
        };

        while reader.pending.is_empty() {
            match reader.stream.next().await {
                None => return Ok(0),
                Some(Err(err)) => return Err(err),
                Some(Ok(chunk)) => reader.pending = chunk,
            }
        }

        let n = buf.len().min(reader.pending.len());
        buf[..n].copy_from_slice(&reader.pending.split_to(n));
        reader.offset += n as u64;
        self.position += n as u64;
        self.reader = Some(reader);

        Ok(n)
    }

    /// Moves the cursor. Positions past the end are allowed and read as EOF.
    fn seek(&mut self, pos: SeekFrom) -> Result<u64, model::fs::FSError> {
        if self.closed {
            return Err(model::fs::FSError::Closed);
        }

        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
            SeekFrom::End(delta) => self.info.size.checked_add_signed(delta),
        }
        .ok_or(model::fs::FSError::InvalidSeek)?;

        self.position = target;
        Ok(target)
    }

    fn close(&mut self) {
        self.closed = true;
        self.reader = None;
        self.cancel.cancel();
    }
}

impl Drop for Object {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
