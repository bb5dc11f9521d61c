//! Registration store
//!
//! The read and write paths for per-AoR registration data, layered over the
//! abstract [`Store`]. Reads stamp the CAS token onto the returned record;
//! writes sweep expired bindings, derive the record TTL from the latest
//! surviving expiry, and present the CAS token back to the store.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::debug;

use crate::aor::AoR;
use crate::codec::{deserialize_aor, serialize_aor};
use crate::error::{RegistrarError, Result};
use crate::store::Store;

/// Data-store namespace for registration records.
const REG_NAMESPACE: &str = "reg";

/// Registration data access, keyed by canonicalized AoR URI.
///
/// The store is stateless; all serialization between concurrent writers
/// happens through the CAS tokens carried on each [`AoR`].
pub struct RegistrationStore {
    store: Arc<dyn Store>,
}

impl RegistrationStore {
    pub fn new(store: Arc<dyn Store>) -> Self {
        RegistrationStore { store }
    }

    /// Retrieves the registration data for an address of record, creating
    /// an empty record if the store has none.
    ///
    /// A store failure propagates as an error; callers must treat it as
    /// transient rather than as an empty registration.
    pub async fn get_aor_data(&self, aor_id: &str) -> Result<AoR> {
        debug!(aor = aor_id, "get AoR data");

        match self.store.get(REG_NAMESPACE, aor_id).await? {
            Some(record) => {
                let mut aor = deserialize_aor(&record.value)?;
                aor.cas = record.cas;
                debug!(aor = aor_id, cas = aor.cas(), bindings = aor.len(), "store returned record");
                Ok(aor)
            }
            None => {
                debug!(aor = aor_id, "store returned not found, creating empty record");
                Ok(AoR::new())
            }
        }
    }

    /// Writes the registration data for an address of record.
    ///
    /// Bindings whose expiry has passed are removed before the write. The
    /// record TTL is the distance from now to the latest surviving expiry;
    /// a record left with no bindings gets a near-zero TTL so the store
    /// prunes it, since the store offers no CAS-on-delete.
    ///
    /// Fails with [`RegistrarError::Contention`] if another writer got in
    /// since this record was read; re-read, re-apply the mutation, retry.
    pub async fn set_aor_data(&self, aor_id: &str, aor: &mut AoR) -> Result<()> {
        let now = Utc::now().timestamp();
        let max_expires = expire_bindings(aor, now);
        let ttl = Duration::from_secs((max_expires - now) as u64);

        debug!(
            aor = aor_id,
            cas = aor.cas(),
            bindings = aor.len(),
            ttl_secs = ttl.as_secs(),
            "set AoR data"
        );

        let data = serialize_aor(aor);
        self.store
            .set(REG_NAMESPACE, aor_id, data, aor.cas(), ttl)
            .await
    }

    /// Removes every binding for an address of record, driving the CAS loop
    /// itself for up to `max_attempts` rounds.
    ///
    /// This is the store side of bulk de-registration; an empty record is
    /// written with a near-zero TTL and pruned by the store.
    pub async fn deregister_aor(&self, aor_id: &str, max_attempts: usize) -> Result<()> {
        for attempt in 0..max_attempts {
            let mut aor = self.get_aor_data(aor_id).await?;
            if aor.is_empty() && aor.cas() == 0 {
                // Nothing stored; nothing to clear.
                return Ok(());
            }
            aor.clear();
            match self.set_aor_data(aor_id, &mut aor).await {
                Ok(()) => return Ok(()),
                Err(RegistrarError::Contention) => {
                    debug!(aor = aor_id, attempt, "deregistration lost CAS race, retrying");
                }
                Err(other) => return Err(other),
            }
        }
        Err(RegistrarError::RetriesExhausted(max_attempts))
    }
}

/// Removes expired bindings and returns the latest expiry among the
/// survivors, or `now` when none survive.
fn expire_bindings(aor: &mut AoR, now: i64) -> i64 {
    let mut max_expires = now;
    aor.retain_bindings(|_, binding| {
        let expires = i64::from(binding.expires);
        if expires <= now {
            false
        } else {
            max_expires = max_expires.max(expires);
            true
        }
    });
    max_expires
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expire_bindings_keeps_only_live_entries() {
        let now = 1_000_000i64;
        let mut aor = AoR::new();
        aor.get_binding("dead").expires = (now - 1) as i32;
        aor.get_binding("borderline").expires = now as i32;
        aor.get_binding("live").expires = (now + 60) as i32;

        let max_expires = expire_bindings(&mut aor, now);

        assert_eq!(max_expires, now + 60);
        assert_eq!(aor.len(), 1);
        assert!(aor.binding("live").is_some());
    }

    #[test]
    fn expire_bindings_on_empty_record_yields_now() {
        let now = 1_000_000i64;
        let mut aor = AoR::new();
        assert_eq!(expire_bindings(&mut aor, now), now);
    }
}
