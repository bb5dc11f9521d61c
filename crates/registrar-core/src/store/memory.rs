//! In-memory store implementation
//!
//! Backs every test in the workspace and single-node deployments. Honors
//! the full [`Store`] contract: CAS tokens advance on every successful
//! write, and expired entries behave exactly like absent ones.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::trace;

use crate::error::{RegistrarError, Result};
use crate::store::{Store, StoreRecord};

struct StoredEntry {
    value: Bytes,
    cas: u64,
    expires_at: Instant,
}

impl StoredEntry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// DashMap-backed [`Store`].
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, StoredEntry>,
    next_cas: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    fn storage_key(namespace: &str, key: &str) -> String {
        // NUL cannot appear in either part, so the compound key is
        // unambiguous.
        format!("{namespace}\u{0}{key}")
    }

    fn allocate_cas(&self) -> u64 {
        self.next_cas.fetch_add(1, Ordering::Relaxed) + 1
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<StoreRecord>> {
        let compound = Self::storage_key(namespace, key);
        if let Some(entry) = self.entries.get(&compound) {
            if !entry.is_expired() {
                return Ok(Some(StoreRecord {
                    value: entry.value.clone(),
                    cas: entry.cas,
                }));
            }
        } else {
            return Ok(None);
        }

        // The entry exists but its TTL has lapsed; drop it outside the read
        // guard so the shard lock is not held across the removal.
        let _ = self.entries.remove_if(&compound, |_, e| e.is_expired());
        Ok(None)
    }

    async fn set(
        &self,
        namespace: &str,
        key: &str,
        value: Bytes,
        cas: u64,
        ttl: Duration,
    ) -> Result<()> {
        let compound = Self::storage_key(namespace, key);
        let expires_at = Instant::now() + ttl;

        match self.entries.entry(compound) {
            Entry::Occupied(mut occupied) => {
                let live = !occupied.get().is_expired();
                let matches = live && occupied.get().cas == cas;
                let insert_over_dead = !live && cas == 0;
                if !matches && !insert_over_dead {
                    trace!(namespace, key, cas, "contended set");
                    return Err(RegistrarError::Contention);
                }
                occupied.insert(StoredEntry {
                    value,
                    cas: self.allocate_cas(),
                    expires_at,
                });
            }
            Entry::Vacant(vacant) => {
                if cas != 0 {
                    trace!(namespace, key, cas, "set against missing record");
                    return Err(RegistrarError::Contention);
                }
                vacant.insert(StoredEntry {
                    value,
                    cas: self.allocate_cas(),
                    expires_at,
                });
            }
        }
        Ok(())
    }
}
