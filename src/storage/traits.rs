//! Common repository contract shared by all entity repositories.

use async_trait::async_trait;

use crate::error::Result;

/// Read/delete operations every repository provides. Entity-specific
/// finders and write operations live on the concrete repositories since
/// their signatures differ (e.g. supervisor creation takes a password).
#[async_trait]
pub trait Repository<T>: Send + Sync {
    async fn get_by_id(&self, id: i64) -> Result<Option<T>>;

    async fn get_all(&self) -> Result<Vec<T>>;

    /// A window of rows in the repository's natural order.
    async fn get_paged(&self, offset: i64, limit: i64) -> Result<Vec<T>>;

    async fn get_count(&self) -> Result<i64>;

    async fn exists(&self, id: i64) -> Result<bool>;

    /// Returns false when no such row exists. Domain rules may refuse the
    /// deletion with an invalid-operation error instead.
    async fn delete(&self, id: i64) -> Result<bool>;
}
