//! Transaction driver
//!
//! [`ServiceTransactionContext`] binds a service's per-transaction handler
//! to its [`ServiceContext`] and drives the state machine from the events
//! the transport delivers: the initial request, each downstream response,
//! and upstream cancellation. Emission back to the network goes through
//! the [`TransactionSink`] seam, which the SIP transport layer implements.
//!
//! ## State machine
//!
//! `INITIAL -> TERMINATED` on rejection; `INITIAL -> FORKED` when the
//! initial-request callback returns (an implicit fork of the original
//! Request-URI is created if the service added none); `FORKED ->
//! CANCELLING` on upstream cancel; `FORKED | CANCELLING -> TERMINATED` once
//! consolidation completes or the forks are cancelled.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use trellis_infra_common::trail::{self, marker};
use trellis_infra_common::TrailId;
use trellis_sip_core::builder::response_for;
use trellis_sip_core::{Request, Response, StatusCode, Uri};

use crate::context::{ForkState, Phase, ServiceContext};
use crate::error::Result;
use crate::registry::ServiceCounters;
use crate::service::ServiceTransaction;

/// The transport-facing seam the application-server layer emits through.
#[async_trait]
pub trait TransactionSink: Send + Sync {
    /// Sends a fork's request to its downstream target.
    async fn forward_request(
        &self,
        fork_id: usize,
        target: Uri,
        request: Request,
        trail: TrailId,
    ) -> Result<()>;

    /// Sends a response upstream on the server transaction.
    async fn send_upstream(&self, response: Response, trail: TrailId) -> Result<()>;

    /// Issues a CANCEL on a downstream fork.
    async fn cancel_fork(&self, fork_id: usize, trail: TrailId) -> Result<()>;
}

/// Drives one server transaction through one service.
///
/// Created when a request is routed to a service that accepted it;
/// destroyed when the transaction reaches [`Phase::Terminated`]. Never
/// entered by two threads at once (the transport's transaction layer
/// serializes per-transaction events).
pub struct ServiceTransactionContext {
    handler: Box<dyn ServiceTransaction>,
    ctx: ServiceContext,
}

impl ServiceTransactionContext {
    pub fn new(
        handler: Box<dyn ServiceTransaction>,
        service_name: impl Into<String>,
        request: Request,
        dialog_id: impl Into<String>,
        trail: TrailId,
        sink: Arc<dyn TransactionSink>,
        counters: Arc<ServiceCounters>,
    ) -> Self {
        ServiceTransactionContext {
            handler,
            ctx: ServiceContext::new(
                service_name.into(),
                request,
                dialog_id.into(),
                trail,
                sink,
                counters,
            ),
        }
    }

    /// The phase the underlying transaction is in.
    pub fn phase(&self) -> Phase {
        self.ctx.phase()
    }

    /// Read access to the transaction state, mainly for the routing layer
    /// and tests.
    pub fn context(&self) -> &ServiceContext {
        &self.ctx
    }

    /// The dialog binding this transaction established, if the service
    /// joined the dialog: `(dialog_id, service_name)` for the routing layer
    /// to remember.
    pub fn dialog_binding(&self) -> Option<(String, String)> {
        if self.ctx.dialog_joined() {
            Some((
                self.ctx.dialog_id().to_string(),
                self.ctx.service_name().to_string(),
            ))
        } else {
            None
        }
    }

    /// Delivers the initial request to the service and applies the
    /// post-return forwarding rules.
    pub async fn process_initial_request(&mut self) -> Result<()> {
        self.ctx.counters().requests.increment();
        trail::event(self.ctx.trail(), marker::AS_INVOKED);

        let req = self.ctx.original();
        self.handler.on_initial_request(&mut self.ctx, &req).await;

        self.after_request_callback().await
    }

    /// Delivers an in-dialog request to the service. The context is fresh
    /// for each in-dialog request, so the original request it carries is
    /// the in-dialog request itself; the same post-return forwarding rules
    /// as for the initial request apply.
    pub async fn process_in_dialog_request(&mut self) -> Result<()> {
        self.ctx.counters().requests.increment();
        trail::event(self.ctx.trail(), marker::AS_INVOKED);

        let req = self.ctx.original();
        self.handler.on_in_dialog_request(&mut self.ctx, &req).await;

        self.after_request_callback().await
    }

    async fn after_request_callback(&mut self) -> Result<()> {
        if let Some((status, reason)) = self.ctx.take_rejection() {
            debug!(
                service = self.ctx.service_name(),
                %status,
                "request rejected by service"
            );
            let mut rsp = response_for(self.ctx.original_request(), status);
            rsp.reason = reason;
            self.ctx.emit_upstream(rsp).await?;
            // Phase is already Terminated; nothing goes downstream.
            return Ok(());
        }

        // The service may have answered the transaction itself with a final
        // response; in that case nothing is forwarded either.
        if self.phase() == Phase::Terminated {
            return Ok(());
        }

        if !self.ctx.has_forks() {
            // No targets added: forward to the existing Request-URI as a
            // single implicit fork.
            let uri = self.ctx.original_request().uri.clone();
            self.ctx.add_target(uri, None);
        }

        self.ctx.dispatch_pending().await?;
        self.ctx.set_phase(Phase::Forked);
        Ok(())
    }

    /// Delivers a downstream response (possibly the synthetic 408 for a
    /// failed fork) and runs consolidation.
    pub async fn process_response(&mut self, rsp: Response, fork_id: usize) -> Result<()> {
        if self.phase() == Phase::Terminated {
            debug!(fork = fork_id, "response after termination dropped");
            return Ok(());
        }
        let Some(fork) = self.ctx.fork_mut(fork_id) else {
            warn!(fork = fork_id, "response for unknown fork dropped");
            return Ok(());
        };

        if rsp.status.is_provisional() {
            if fork.state == ForkState::Calling {
                fork.state = ForkState::Proceeding;
            }
        } else {
            fork.final_status = Some(rsp.status);
            if fork.state != ForkState::Cancelled {
                fork.state = ForkState::Completed;
            }
        }

        self.ctx.counters().responses.increment();
        let forward = self.handler.on_response(&mut self.ctx, &rsp, fork_id).await;

        if forward {
            // Targets added while releasing the response never fork; the
            // recursion contract is tied to swallowing it.
            self.ctx.discard_pending_targets();
            self.ctx.consolidate_response(rsp, fork_id).await?;
        } else if self.ctx.has_undispatched_forks() {
            debug!(
                service = self.ctx.service_name(),
                "response swallowed; forking to newly added targets"
            );
            self.ctx.dispatch_pending().await?;
        }

        self.ctx.maybe_complete().await
    }

    /// Handles upstream cancellation: 487 for a received CANCEL, 408 for an
    /// inbound transport failure. After the service's `on_cancel` returns,
    /// the remaining forks are cancelled; a received CANCEL additionally
    /// answers the upstream transaction with a single 487.
    pub async fn process_cancel(&mut self, status: StatusCode) -> Result<()> {
        if !matches!(self.phase(), Phase::Initial | Phase::Forked) {
            debug!(phase = ?self.phase(), "cancel ignored in this phase");
            return Ok(());
        }
        self.ctx.set_phase(Phase::Cancelling);
        trail::event(self.ctx.trail(), marker::UPSTREAM_CANCEL);

        self.handler.on_cancel(&mut self.ctx, status).await;

        self.ctx.cancel_outstanding_forks().await?;

        if status == StatusCode::RequestTerminated && !self.ctx.final_forwarded() {
            let rsp = response_for(self.ctx.original_request(), StatusCode::RequestTerminated);
            self.ctx.emit_upstream(rsp).await?;
        }

        self.ctx.set_phase(Phase::Terminated);
        Ok(())
    }
}
