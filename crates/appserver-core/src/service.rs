//! Service plug-in contract
//!
//! The two traits a service implements. [`AppServer`] is the factory
//! registered at startup; [`ServiceTransaction`] is the per-transaction
//! handler it manufactures. The capability object every entry point
//! receives is [`ServiceContext`](crate::context::ServiceContext).

use async_trait::async_trait;

use trellis_sip_core::{Request, Response, StatusCode};

use crate::context::ServiceContext;

/// A named application service.
///
/// Instantiated during system initialization and registered with the
/// [`ServiceRegistry`](crate::registry::ServiceRegistry). Offered a
/// transaction when an initial filter criterion names
/// `<service_name>.<home-domain>`, or when a request arrives for a dialog
/// the service previously joined with
/// [`ServiceContext::add_to_dialog`](crate::context::ServiceContext::add_to_dialog).
pub trait AppServer: Send + Sync {
    /// The (lowercase) service name this server registered under.
    fn service_name(&self) -> &str;

    /// Offers this service the given request.
    ///
    /// Returns `None` to decline, in which case the request continues down
    /// the chain untouched, or the handler for this transaction.
    /// `dialog_id` is empty for out-of-dialog requests.
    fn get_transaction(
        &self,
        req: &Request,
        dialog_id: &str,
    ) -> Option<Box<dyn ServiceTransaction>>;
}

/// Per-transaction service logic.
///
/// One instance handles exactly one server transaction and is dropped when
/// it terminates. Entry points are serialized: the transport's transaction
/// layer never delivers two events to the same transaction concurrently.
#[async_trait]
pub trait ServiceTransaction: Send {
    /// Called exactly once, with the initial (dialog-initiating or
    /// out-of-dialog) request.
    ///
    /// On return, unless [`ServiceContext::reject`] was called, the request
    /// is forwarded to every target added with
    /// [`ServiceContext::add_target`], or to its existing Request-URI if no
    /// targets were added.
    async fn on_initial_request(&mut self, ctx: &mut ServiceContext, req: &Request);

    /// Called with a request that matched this service's dialog id.
    ///
    /// The common implementation forwards the request through unchanged by
    /// adding no targets; the same post-return forwarding rules as
    /// [`Self::on_initial_request`] apply.
    async fn on_in_dialog_request(&mut self, ctx: &mut ServiceContext, req: &Request);

    /// Called for every downstream response, including the synthetic 408
    /// generated when a fork hits a transport error or transaction timeout.
    ///
    /// Return `true` to forward the response upstream (subject to
    /// consolidation across forks), `false` to swallow it. If `false` is
    /// returned and new targets have been added, the original request is
    /// forked to them.
    async fn on_response(
        &mut self,
        ctx: &mut ServiceContext,
        rsp: &Response,
        fork_id: usize,
    ) -> bool;

    /// Called when the upstream transaction is cancelled: `status` is 487
    /// for a received CANCEL, 408 for an inbound transport failure or
    /// timeout. On return, the remaining downstream forks are cancelled
    /// automatically.
    async fn on_cancel(&mut self, ctx: &mut ServiceContext, status: StatusCode);
}
