//! Abstract data-store interface
//!
//! The registration store persists through this seam. The contract is a
//! namespaced key-value store with optimistic concurrency: every read
//! returns a CAS token, and every write presents one. A write with CAS 0 is
//! an insert and succeeds only if no live record exists; any other CAS must
//! match the stored version or the write fails with
//! [`Contention`](crate::error::RegistrarError::Contention).
//!
//! There is no delete operation. The backing store is not assumed to
//! support CAS-on-delete, so callers delete by writing an empty value with
//! a near-zero TTL and letting the store prune it.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

mod memory;

pub use memory::MemoryStore;

/// A stored value plus the CAS token to present on the next write.
#[derive(Debug, Clone)]
pub struct StoreRecord {
    pub value: Bytes,
    pub cas: u64,
}

/// Namespaced key-value store with compare-and-swap writes and TTLs.
#[async_trait]
pub trait Store: Send + Sync {
    /// Reads a record. `Ok(None)` means not found; `Err` means the store
    /// itself failed and the caller should treat the condition as
    /// transient.
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<StoreRecord>>;

    /// Writes a record with the given TTL.
    ///
    /// `cas == 0` inserts and fails with `Contention` if a live record
    /// already exists; otherwise the write succeeds only if `cas` matches
    /// the stored version. A missing or expired record under a nonzero CAS
    /// is also `Contention`: the caller's re-read will observe the truth.
    async fn set(
        &self,
        namespace: &str,
        key: &str,
        value: Bytes,
        cas: u64,
        ttl: Duration,
    ) -> Result<()>;
}
