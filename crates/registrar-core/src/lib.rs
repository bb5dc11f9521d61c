//! # Trellis Registrar Core
//!
//! The registration store for the edge node: the mapping from each address
//! of record (AoR) to the set of contact bindings its devices have
//! registered, persisted through an abstract compare-and-swap key-value
//! store.
//!
//! ## Concurrency model
//!
//! The store itself is stateless; writers never take a lock around a
//! registration. Instead every read returns a CAS token and every write
//! presents it back. Two writers racing on one AoR resolve through the
//! read-modify-write loop: the loser's write fails with
//! [`RegistrarError::Contention`], it re-reads (observing the winner's
//! mutation), re-applies its own, and retries. How many times to retry is
//! the caller's policy.
//!
//! ## Expiry
//!
//! Bindings carry absolute wall-clock expiry times. The write path sweeps
//! expired bindings before serializing, and the record's store TTL is the
//! distance to the latest surviving expiry, so the backing store prunes
//! records that no device refreshes. An AoR whose last binding has expired
//! is written with a near-zero TTL rather than deleted, because the backing
//! store is not assumed to support CAS-on-delete.
//!
//! ## Organization
//!
//! - [`store`] - the [`Store`](store::Store) trait (get/set with CAS and
//!   TTL) and the in-memory [`MemoryStore`](store::MemoryStore)
//! - [`aor`] - the [`AoR`]/[`Binding`] data model
//! - [`codec`] - the binary record format
//! - [`reg_store`] - the [`RegistrationStore`] built on the pieces above

pub mod aor;
pub mod codec;
pub mod error;
pub mod reg_store;
pub mod store;

pub use aor::{AoR, Binding};
pub use error::{RegistrarError, Result};
pub use reg_store::RegistrationStore;
pub use store::{MemoryStore, Store, StoreRecord};
