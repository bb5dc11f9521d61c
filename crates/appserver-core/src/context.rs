//! Service transaction state and the capability handed to services
//!
//! [`ServiceContext`] is the parameter every
//! [`ServiceTransaction`](crate::service::ServiceTransaction) entry point
//! receives. It carries
//! the outward contract - dialog operations, request cloning, forking,
//! rejection, response sending, the trail id - and owns the per-transaction
//! state those operations manipulate: the fork table, the consolidation
//! slot, and the phase.
//!
//! No locking happens here. The transport's transaction layer guarantees a
//! context is entered by one thread at a time.

use std::sync::Arc;

use tracing::{debug, warn};

use trellis_infra_common::trail::{self, marker};
use trellis_infra_common::TrailId;
use trellis_sip_core::builder::response_for;
use trellis_sip_core::{Method, Request, Response, StatusCode, Uri};

use crate::dialog::default_dialog_id;
use crate::error::Result;
use crate::registry::ServiceCounters;
use crate::transaction::TransactionSink;

/// Where a transaction is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Freshly created; the initial-request callback is running or about
    /// to run.
    Initial,
    /// Targets dispatched; awaiting downstream responses.
    Forked,
    /// Upstream cancel received; forks are being cancelled.
    Cancelling,
    /// A final response went upstream (or the request was rejected);
    /// nothing further will happen.
    Terminated,
}

/// The life of one downstream leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForkState {
    /// Created; request sent (or about to be sent) to the target.
    Calling,
    /// A provisional response has arrived.
    Proceeding,
    /// A final response has arrived.
    Completed,
    /// Cancelled before any final response.
    Cancelled,
}

/// One downstream leg of a forked request.
#[derive(Debug)]
pub struct Fork {
    pub id: usize,
    pub target: Uri,
    pub request: Request,
    pub state: ForkState,
    /// Highest provisional code already forwarded upstream on this fork.
    forwarded_provisional: Option<u16>,
    /// The final status this fork reported, once it has.
    pub final_status: Option<StatusCode>,
    /// Whether the request has actually been handed to the transport yet.
    dispatched: bool,
}

/// The capability a service uses to drive its transaction.
pub struct ServiceContext {
    service_name: String,
    trail: TrailId,
    original: Arc<Request>,
    dialog_id: String,
    dialog_joined: bool,
    phase: Phase,
    forks: Vec<Fork>,
    rejection: Option<(StatusCode, Option<String>)>,
    best_response: Option<Response>,
    final_forwarded: bool,
    sink: Arc<dyn TransactionSink>,
    counters: Arc<ServiceCounters>,
}

impl ServiceContext {
    pub(crate) fn new(
        service_name: String,
        original: Request,
        dialog_id: String,
        trail: TrailId,
        sink: Arc<dyn TransactionSink>,
        counters: Arc<ServiceCounters>,
    ) -> Self {
        ServiceContext {
            service_name,
            trail,
            original: Arc::new(original),
            dialog_id,
            dialog_joined: false,
            phase: Phase::Initial,
            forks: Vec::new(),
            rejection: None,
            best_response: None,
            final_forwarded: false,
            sink,
            counters,
        }
    }

    // ---- Outward contract -------------------------------------------------

    /// Joins this service to the underlying dialog.
    ///
    /// A later in-dialog request carrying the same dialog id is routed back
    /// to a fresh transaction of this service. With no explicit id, a
    /// default is derived from the request's Call-ID and From/To tags.
    /// Only meaningful while handling the initial request.
    pub fn add_to_dialog(&mut self, dialog_id: Option<&str>) {
        if self.phase != Phase::Initial {
            warn!(
                service = %self.service_name,
                "add_to_dialog ignored outside initial-request handling"
            );
            return;
        }
        self.dialog_id = match dialog_id {
            Some(id) => id.to_string(),
            None => default_dialog_id(&self.original),
        };
        self.dialog_joined = true;
    }

    /// The dialog id attached to this transaction, empty if none.
    pub fn dialog_id(&self) -> &str {
        &self.dialog_id
    }

    /// Deep-copies a request so forks can be mutated independently.
    pub fn clone_request(&self, req: &Request) -> Request {
        req.clone()
    }

    /// The request that created this transaction.
    pub fn original_request(&self) -> &Request {
        &self.original
    }

    /// Adds a downstream target, returning its fork id.
    ///
    /// The fork carries `req` if given, else the original request. Ids are
    /// assigned in creation order and never reused. Returns `None` (and
    /// does nothing) once the transaction is cancelling or terminated.
    pub fn add_target(&mut self, target: Uri, req: Option<Request>) -> Option<usize> {
        if !matches!(self.phase, Phase::Initial | Phase::Forked) {
            warn!(
                service = %self.service_name,
                phase = ?self.phase,
                "add_target ignored in this phase"
            );
            return None;
        }
        let id = self.forks.len();
        let request = req.unwrap_or_else(|| (*self.original).clone());
        trail::event_with(self.trail, marker::FORK_CREATED, &target.to_string());
        debug!(service = %self.service_name, fork = id, target = %target, "target added");
        self.forks.push(Fork {
            id,
            target,
            request,
            state: ForkState::Calling,
            forwarded_provisional: None,
            final_status: None,
            dispatched: false,
        });
        Some(id)
    }

    /// Rejects the original request.
    ///
    /// Only valid while handling the initial request; any later rejection
    /// must be expressed by sending a final response. The response goes
    /// upstream when the initial-request callback returns, and nothing is
    /// forwarded downstream.
    pub fn reject(&mut self, status: StatusCode, reason: Option<&str>) {
        if self.phase != Phase::Initial {
            warn!(service = %self.service_name, "reject ignored outside initial-request handling");
            return;
        }
        if !status.is_final() {
            warn!(service = %self.service_name, %status, "reject requires a final status code");
            return;
        }
        self.rejection = Some((status, reason.map(str::to_string)));
        self.phase = Phase::Terminated;
    }

    /// Sends a provisional or final response upstream.
    ///
    /// Sending a final response on a forked INVITE cancels every fork that
    /// has not yet produced a final response of its own.
    pub async fn send_response(&mut self, rsp: Response) -> Result<()> {
        let is_final = rsp.status.is_final();
        self.emit_upstream(rsp).await?;
        if is_final {
            self.final_forwarded = true;
            if self.original.method == Method::Invite {
                self.cancel_outstanding_forks().await?;
            }
            self.phase = Phase::Terminated;
        }
        Ok(())
    }

    /// The trail id for any events related to this service invocation.
    pub fn trail(&self) -> TrailId {
        self.trail
    }

    /// The phase this transaction is in.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The forks created so far, in id order.
    pub fn forks(&self) -> &[Fork] {
        &self.forks
    }

    // ---- Driver-side state management ------------------------------------

    pub(crate) fn service_name(&self) -> &str {
        &self.service_name
    }

    pub(crate) fn counters(&self) -> &ServiceCounters {
        &self.counters
    }

    pub(crate) fn original(&self) -> Arc<Request> {
        Arc::clone(&self.original)
    }

    pub(crate) fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
    }

    pub(crate) fn take_rejection(&mut self) -> Option<(StatusCode, Option<String>)> {
        self.rejection.take()
    }

    pub(crate) fn dialog_joined(&self) -> bool {
        self.dialog_joined
    }

    pub(crate) fn has_forks(&self) -> bool {
        !self.forks.is_empty()
    }

    pub(crate) fn has_undispatched_forks(&self) -> bool {
        self.forks
            .iter()
            .any(|f| !f.dispatched && f.state == ForkState::Calling)
    }

    pub(crate) fn fork_mut(&mut self, fork_id: usize) -> Option<&mut Fork> {
        self.forks.get_mut(fork_id)
    }

    pub(crate) fn final_forwarded(&self) -> bool {
        self.final_forwarded
    }

    /// Hands every not-yet-dispatched fork to the transport.
    pub(crate) async fn dispatch_pending(&mut self) -> Result<()> {
        let sink = Arc::clone(&self.sink);
        for fork in &mut self.forks {
            if !fork.dispatched && fork.state == ForkState::Calling {
                fork.dispatched = true;
                sink.forward_request(fork.id, fork.target.clone(), fork.request.clone(), self.trail)
                    .await?;
            }
        }
        Ok(())
    }

    /// Drops targets that were added without releasing the triggering
    /// response; forking only happens when `on_response` returns false.
    pub(crate) fn discard_pending_targets(&mut self) {
        for fork in &mut self.forks {
            if !fork.dispatched && fork.state == ForkState::Calling {
                warn!(
                    service = %self.service_name,
                    fork = fork.id,
                    "target added while forwarding the response; discarding"
                );
                fork.state = ForkState::Cancelled;
            }
        }
    }

    /// Cancels every fork still awaiting a final response.
    pub(crate) async fn cancel_outstanding_forks(&mut self) -> Result<()> {
        let sink = Arc::clone(&self.sink);
        for fork in &mut self.forks {
            match fork.state {
                ForkState::Calling | ForkState::Proceeding => {
                    if fork.dispatched {
                        sink.cancel_fork(fork.id, self.trail).await?;
                    }
                    fork.state = ForkState::Cancelled;
                }
                ForkState::Completed | ForkState::Cancelled => {}
            }
        }
        Ok(())
    }

    /// Applies the RFC 3261 Section 16.7 consolidation rules to a response
    /// the service released for forwarding.
    pub(crate) async fn consolidate_response(
        &mut self,
        rsp: Response,
        fork_id: usize,
    ) -> Result<()> {
        let status = rsp.status;

        if status.is_provisional() {
            // 100 Trying is hop-by-hop and never forwarded.
            if status.as_u16() == 100 {
                return Ok(());
            }
            let code = status.as_u16();
            let forward = {
                let Some(fork) = self.forks.get_mut(fork_id) else {
                    return Ok(());
                };
                let forward = fork.forwarded_provisional.map_or(true, |prev| code > prev);
                if forward {
                    fork.forwarded_provisional = Some(code);
                }
                forward
            };
            if forward {
                self.emit_upstream(rsp).await?;
            }
            return Ok(());
        }

        if status.is_success() {
            // 2xx responses go upstream immediately; outstanding forks stay
            // live so their own finals (and the ACKs behind them) resolve.
            self.final_forwarded = true;
            self.emit_upstream(rsp).await?;
            return Ok(());
        }

        self.update_best_response(rsp);
        Ok(())
    }

    fn update_best_response(&mut self, rsp: Response) {
        let better = match &self.best_response {
            None => true,
            Some(best) => {
                let (new_rank, new_code) = (class_rank(rsp.status), rsp.status.as_u16());
                let (best_rank, best_code) = (class_rank(best.status), best.status.as_u16());
                // Strict comparisons: ties keep the first arrival.
                new_rank < best_rank || (new_rank == best_rank && new_code < best_code)
            }
        };
        if better {
            self.best_response = Some(rsp);
        }
    }

    /// Closes the transaction once every fork has reached a terminal state,
    /// forwarding the best consolidated response if no final has gone
    /// upstream yet.
    pub(crate) async fn maybe_complete(&mut self) -> Result<()> {
        if self.phase == Phase::Terminated || self.forks.is_empty() {
            return Ok(());
        }
        let all_done = self
            .forks
            .iter()
            .all(|f| matches!(f.state, ForkState::Completed | ForkState::Cancelled));
        if !all_done {
            return Ok(());
        }

        if !self.final_forwarded {
            let rsp = match self.best_response.take() {
                Some(best) => best,
                None => {
                    // Every final was swallowed and nothing replaced them;
                    // the upstream transaction still has to terminate.
                    let status = if self.phase == Phase::Cancelling {
                        StatusCode::RequestTerminated
                    } else {
                        StatusCode::RequestTimeout
                    };
                    response_for(&self.original, status)
                }
            };
            self.final_forwarded = true;
            self.emit_upstream(rsp).await?;
        }
        self.phase = Phase::Terminated;
        Ok(())
    }

    pub(crate) async fn emit_upstream(&self, rsp: Response) -> Result<()> {
        trail::event(self.trail, marker::RESPONSE_FORWARDED);
        let sink = Arc::clone(&self.sink);
        sink.send_upstream(rsp, self.trail).await
    }
}

/// Best-response priority of a status class; lower ranks win. Per RFC 3261
/// Section 16.7 a 6xx is decisive, then 2xx, then redirects, then the
/// client and server errors.
fn class_rank(status: StatusCode) -> u8 {
    match status.class() {
        6 => 0,
        2 => 1,
        3 => 2,
        4 => 3,
        5 => 4,
        _ => 5,
    }
}
