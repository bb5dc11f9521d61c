//! # Trellis Application Server Core
//!
//! The application-service layer of the edge node. When an initial filter
//! criterion routes a SIP transaction through a named service, this crate
//! owns everything between the transport's server transaction and the
//! service's business logic: target forking, response consolidation per
//! RFC 3261 Section 16.7, upstream cancellation, and the per-dialog
//! stickiness that routes later in-dialog requests back to the same
//! service.
//!
//! ## Shape of a service
//!
//! A service is two objects. The [`AppServer`] is the long-lived factory
//! registered by name in the [`ServiceRegistry`]; it is offered each
//! matching request and may decline. The [`ServiceTransaction`] it returns
//! handles one transaction through four entry points
//! (`on_initial_request`, `on_in_dialog_request`, `on_response`,
//! `on_cancel`). Every entry point receives the [`ServiceContext`]
//! capability as a parameter - cloning requests, adding targets, rejecting,
//! sending responses, and dialog operations all go through it, so services
//! need no base class and hold no transport state.
//!
//! ## Threading contract
//!
//! A [`ServiceTransactionContext`] is never entered by two threads at once;
//! the transport's transaction layer serializes event delivery per
//! transaction. The context therefore takes no locks of its own.

pub mod context;
pub mod dialog;
pub mod error;
pub mod registry;
pub mod service;
pub mod transaction;

pub use context::{Fork, ForkState, Phase, ServiceContext};
pub use dialog::{default_dialog_id, DialogBindings};
pub use error::{AppServerError, Result};
pub use registry::{ServiceCounters, ServiceRegistry, ServiceRegistryBuilder};
pub use service::{AppServer, ServiceTransaction};
pub use transaction::{ServiceTransactionContext, TransactionSink};
