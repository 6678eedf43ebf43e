use bytes::Bytes;
use futures::{future::BoxFuture, stream::BoxStream};
use tokio_util::sync::CancellationToken;

use crate::model;

#[cfg(test)]
pub mod mock;
pub mod s3;

pub type EntryStream = BoxStream<'static, Result<model::object::ObjectEntry, model::fs::FSError>>;
pub type BodyStream = BoxStream<'static, Result<Bytes, model::fs::FSError>>;

/// Remote store capability consumed by the filesystem adapter. Implementations
/// are shared across requests, so every call carries its own cancellation token.
pub trait ObjectStore: Send + Sync {
    /// Starts a listing subscription. The stream ends early once `cancel` fires.
    fn list_objects(
        &self,
        bucket: &str,
        options: model::object::ListOptions,
        cancel: CancellationToken,
    ) -> EntryStream;

    /// Returns a lazy handle on `key`; existence is only checked by `stat`.
    fn get_object(
        &self,
        bucket: &str,
        key: &str,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, Result<Box<dyn ObjectBody>, model::fs::FSError>>;
}

pub trait ObjectBody: Send + Sync {
    fn key(&self) -> &str;

    fn stat(&self) -> BoxFuture<'_, Result<model::object::ObjectInfo, model::fs::FSError>>;

    /// Opens a byte stream running from `offset` to the end of the object.
    fn read_from(&self, offset: u64) -> BoxFuture<'_, Result<BodyStream, model::fs::FSError>>;
}
