//! Service transaction state machine tests
//!
//! Drives [`ServiceTransactionContext`] through forking, consolidation,
//! cancellation and recursion scenarios against a recording transport sink.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use trellis_appserver_core::{
    Phase, ServiceContext, ServiceCounters, ServiceTransaction, ServiceTransactionContext,
    TransactionSink,
};
use trellis_infra_common::TrailId;
use trellis_sip_core::builder::{response_for, RequestBuilder};
use trellis_sip_core::{HeaderName, Method, Request, Response, StatusCode, Uri};

#[derive(Debug, Clone, PartialEq)]
enum SinkAction {
    Forward { fork_id: usize, target: String },
    Upstream { status: u16 },
    Cancel { fork_id: usize },
}

#[derive(Default)]
struct RecordingSink {
    actions: Mutex<Vec<SinkAction>>,
}

impl RecordingSink {
    fn actions(&self) -> Vec<SinkAction> {
        self.actions.lock().unwrap().clone()
    }

    fn upstream_statuses(&self) -> Vec<u16> {
        self.actions()
            .into_iter()
            .filter_map(|a| match a {
                SinkAction::Upstream { status } => Some(status),
                _ => None,
            })
            .collect()
    }

    fn cancelled_forks(&self) -> Vec<usize> {
        self.actions()
            .into_iter()
            .filter_map(|a| match a {
                SinkAction::Cancel { fork_id } => Some(fork_id),
                _ => None,
            })
            .collect()
    }

    fn forwarded_forks(&self) -> Vec<usize> {
        self.actions()
            .into_iter()
            .filter_map(|a| match a {
                SinkAction::Forward { fork_id, .. } => Some(fork_id),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl TransactionSink for RecordingSink {
    async fn forward_request(
        &self,
        fork_id: usize,
        target: Uri,
        _request: Request,
        _trail: TrailId,
    ) -> trellis_appserver_core::Result<()> {
        self.actions.lock().unwrap().push(SinkAction::Forward {
            fork_id,
            target: target.to_string(),
        });
        Ok(())
    }

    async fn send_upstream(
        &self,
        response: Response,
        _trail: TrailId,
    ) -> trellis_appserver_core::Result<()> {
        self.actions.lock().unwrap().push(SinkAction::Upstream {
            status: response.status.as_u16(),
        });
        Ok(())
    }

    async fn cancel_fork(
        &self,
        fork_id: usize,
        _trail: TrailId,
    ) -> trellis_appserver_core::Result<()> {
        self.actions
            .lock()
            .unwrap()
            .push(SinkAction::Cancel { fork_id });
        Ok(())
    }
}

fn invite() -> Request {
    RequestBuilder::new(Method::Invite, "sip:bob@example.com".parse().unwrap())
        .via("edge.example.com")
        .header(HeaderName::From, "<sip:alice@example.com>;tag=from1")
        .header(HeaderName::To, "<sip:bob@example.com>")
        .header(HeaderName::CallId, "call-1@edge.example.com")
        .header(HeaderName::CSeq, "1 INVITE")
        .build()
}

fn target(n: u32) -> Uri {
    format!("sip:line{n}@device{n}.example.com").parse().unwrap()
}

fn transaction(
    handler: impl ServiceTransaction + 'static,
    sink: &Arc<RecordingSink>,
) -> ServiceTransactionContext {
    ServiceTransactionContext::new(
        Box::new(handler),
        "mmtel",
        invite(),
        "",
        TrailId::next(),
        Arc::clone(sink) as Arc<dyn TransactionSink>,
        Arc::new(ServiceCounters::default()),
    )
}

fn response_to(req: &Request, status: StatusCode) -> Response {
    response_for(req, status)
}

/// Adds a fixed set of targets on the initial request and forwards every
/// response.
struct FanOut {
    targets: Vec<Uri>,
}

#[async_trait]
impl ServiceTransaction for FanOut {
    async fn on_initial_request(&mut self, ctx: &mut ServiceContext, _req: &Request) {
        for target in self.targets.drain(..) {
            ctx.add_target(target, None);
        }
    }

    async fn on_in_dialog_request(&mut self, _ctx: &mut ServiceContext, _req: &Request) {}

    async fn on_response(
        &mut self,
        _ctx: &mut ServiceContext,
        _rsp: &Response,
        _fork_id: usize,
    ) -> bool {
        true
    }

    async fn on_cancel(&mut self, _ctx: &mut ServiceContext, _status: StatusCode) {}
}

#[tokio::test]
async fn no_targets_means_one_implicit_fork_of_the_request_uri() {
    let sink = Arc::new(RecordingSink::default());
    let mut tsx = transaction(FanOut { targets: vec![] }, &sink);

    tsx.process_initial_request().await.unwrap();

    assert_eq!(tsx.phase(), Phase::Forked);
    assert_eq!(
        sink.actions(),
        vec![SinkAction::Forward {
            fork_id: 0,
            target: "sip:bob@example.com".to_string(),
        }]
    );
}

#[tokio::test]
async fn fork_ids_are_a_contiguous_prefix_of_the_naturals() {
    let sink = Arc::new(RecordingSink::default());
    let mut tsx = transaction(
        FanOut {
            targets: vec![target(1), target(2), target(3)],
        },
        &sink,
    );

    tsx.process_initial_request().await.unwrap();

    assert_eq!(sink.forwarded_forks(), vec![0, 1, 2]);
    let ids: Vec<usize> = tsx.context().forks().iter().map(|f| f.id).collect();
    assert_eq!(ids, vec![0, 1, 2]);
}

/// Rejects everything with 404.
struct RejectAll;

#[async_trait]
impl ServiceTransaction for RejectAll {
    async fn on_initial_request(&mut self, ctx: &mut ServiceContext, _req: &Request) {
        ctx.reject(StatusCode::NotFound, Some("No Such User"));
        // Targets added after reject are discarded with a warning.
        ctx.add_target(target(9), None);
    }

    async fn on_in_dialog_request(&mut self, _ctx: &mut ServiceContext, _req: &Request) {}

    async fn on_response(
        &mut self,
        _ctx: &mut ServiceContext,
        _rsp: &Response,
        _fork_id: usize,
    ) -> bool {
        true
    }

    async fn on_cancel(&mut self, _ctx: &mut ServiceContext, _status: StatusCode) {}
}

#[tokio::test]
async fn reject_sends_exactly_one_response_and_nothing_downstream() {
    let sink = Arc::new(RecordingSink::default());
    let mut tsx = transaction(RejectAll, &sink);

    tsx.process_initial_request().await.unwrap();

    assert_eq!(tsx.phase(), Phase::Terminated);
    assert_eq!(sink.upstream_statuses(), vec![404]);
    assert!(sink.forwarded_forks().is_empty());
}

#[tokio::test]
async fn best_response_wins_when_all_forks_have_answered() {
    let sink = Arc::new(RecordingSink::default());
    let mut tsx = transaction(
        FanOut {
            targets: vec![target(1), target(2)],
        },
        &sink,
    );
    tsx.process_initial_request().await.unwrap();
    let original = invite();

    // First final arrives; consolidation holds it while fork 1 is live.
    tsx.process_response(response_to(&original, StatusCode::BusyHere), 0)
        .await
        .unwrap();
    assert!(sink.upstream_statuses().is_empty());
    assert_eq!(tsx.phase(), Phase::Forked);

    // Second final completes the fork set; the lowest code in the shared
    // 4xx class goes upstream.
    tsx.process_response(response_to(&original, StatusCode::TemporarilyUnavailable), 1)
        .await
        .unwrap();
    assert_eq!(sink.upstream_statuses(), vec![480]);
    assert_eq!(tsx.phase(), Phase::Terminated);

    // Finals received plus forks cancelled covers every fork created.
    let forks = tsx.context().forks();
    let finals = forks.iter().filter(|f| f.final_status.is_some()).count();
    assert_eq!(finals, forks.len());
}

#[tokio::test]
async fn six_hundreds_beat_everything_and_ties_keep_the_first_arrival() {
    let sink = Arc::new(RecordingSink::default());
    let mut tsx = transaction(
        FanOut {
            targets: vec![target(1), target(2), target(3)],
        },
        &sink,
    );
    tsx.process_initial_request().await.unwrap();
    let original = invite();

    tsx.process_response(response_to(&original, StatusCode::NotFound), 0)
        .await
        .unwrap();
    tsx.process_response(response_to(&original, StatusCode::BusyEverywhere), 1)
        .await
        .unwrap();
    tsx.process_response(response_to(&original, StatusCode::InternalServerError), 2)
        .await
        .unwrap();

    assert_eq!(sink.upstream_statuses(), vec![600]);
    assert_eq!(tsx.phase(), Phase::Terminated);
}

#[tokio::test]
async fn provisional_responses_dedup_per_fork_by_strictly_greater_code() {
    let sink = Arc::new(RecordingSink::default());
    let mut tsx = transaction(
        FanOut {
            targets: vec![target(1)],
        },
        &sink,
    );
    tsx.process_initial_request().await.unwrap();
    let original = invite();

    // 100 Trying is hop-by-hop and never forwarded.
    tsx.process_response(response_to(&original, StatusCode::Trying), 0)
        .await
        .unwrap();
    // First 180 forwards.
    tsx.process_response(response_to(&original, StatusCode::Ringing), 0)
        .await
        .unwrap();
    // A repeat 180 is suppressed.
    tsx.process_response(response_to(&original, StatusCode::Ringing), 0)
        .await
        .unwrap();
    // 183 is strictly greater, so it forwards.
    tsx.process_response(response_to(&original, StatusCode::SessionProgress), 0)
        .await
        .unwrap();

    assert_eq!(sink.upstream_statuses(), vec![180, 183]);
}

#[tokio::test]
async fn two_hundreds_forward_immediately_while_other_forks_stay_live() {
    let sink = Arc::new(RecordingSink::default());
    let mut tsx = transaction(
        FanOut {
            targets: vec![target(1), target(2)],
        },
        &sink,
    );
    tsx.process_initial_request().await.unwrap();
    let original = invite();

    tsx.process_response(response_to(&original, StatusCode::Ok), 0)
        .await
        .unwrap();
    // The 2xx went straight upstream, but fork 1 has not answered, so the
    // transaction is still alive for its final (and the ACK behind it).
    assert_eq!(sink.upstream_statuses(), vec![200]);
    assert_eq!(tsx.phase(), Phase::Forked);
    assert!(sink.cancelled_forks().is_empty());

    tsx.process_response(response_to(&original, StatusCode::BusyHere), 1)
        .await
        .unwrap();
    // The late 486 is absorbed; the 200 already answered upstream.
    assert_eq!(sink.upstream_statuses(), vec![200]);
    assert_eq!(tsx.phase(), Phase::Terminated);
}

#[tokio::test]
async fn synthetic_408_counts_as_a_final_for_consolidation() {
    let sink = Arc::new(RecordingSink::default());
    let mut tsx = transaction(
        FanOut {
            targets: vec![target(1), target(2)],
        },
        &sink,
    );
    tsx.process_initial_request().await.unwrap();
    let original = invite();

    tsx.process_response(response_to(&original, StatusCode::BusyHere), 0)
        .await
        .unwrap();
    // Fork 1 timed out; the transport synthesized a 408.
    tsx.process_response(response_to(&original, StatusCode::RequestTimeout), 1)
        .await
        .unwrap();

    // The 408 closed its fork like any other final; both finals are 4xx,
    // so the numerically lowest code goes upstream.
    assert_eq!(sink.upstream_statuses(), vec![408]);
    assert_eq!(tsx.phase(), Phase::Terminated);
}

struct CancelObserver {
    observed: Arc<Mutex<Option<u16>>>,
}

#[async_trait]
impl ServiceTransaction for CancelObserver {
    async fn on_initial_request(&mut self, ctx: &mut ServiceContext, _req: &Request) {
        ctx.add_target(target(1), None);
        ctx.add_target(target(2), None);
        ctx.add_target(target(3), None);
    }

    async fn on_in_dialog_request(&mut self, _ctx: &mut ServiceContext, _req: &Request) {}

    async fn on_response(
        &mut self,
        _ctx: &mut ServiceContext,
        _rsp: &Response,
        _fork_id: usize,
    ) -> bool {
        true
    }

    async fn on_cancel(&mut self, _ctx: &mut ServiceContext, status: StatusCode) {
        *self.observed.lock().unwrap() = Some(status.as_u16());
    }
}

#[tokio::test]
async fn upstream_cancel_fires_on_cancel_then_cancels_every_fork() {
    let sink = Arc::new(RecordingSink::default());
    let observed = Arc::new(Mutex::new(None));
    let mut tsx = transaction(
        CancelObserver {
            observed: Arc::clone(&observed),
        },
        &sink,
    );
    tsx.process_initial_request().await.unwrap();

    tsx.process_cancel(StatusCode::RequestTerminated).await.unwrap();

    assert_eq!(*observed.lock().unwrap(), Some(487));
    assert_eq!(sink.cancelled_forks(), vec![0, 1, 2]);
    // Upstream sees 487 exactly once.
    assert_eq!(sink.upstream_statuses(), vec![487]);
    assert_eq!(tsx.phase(), Phase::Terminated);

    // Finals received (0) plus forks cancelled (3) covers the 3 created.
    let cancelled = tsx
        .context()
        .forks()
        .iter()
        .filter(|f| f.state == trellis_appserver_core::ForkState::Cancelled)
        .count();
    assert_eq!(cancelled, 3);
}

#[tokio::test]
async fn transport_failure_cancel_does_not_answer_upstream() {
    let sink = Arc::new(RecordingSink::default());
    let observed = Arc::new(Mutex::new(None));
    let mut tsx = transaction(
        CancelObserver {
            observed: Arc::clone(&observed),
        },
        &sink,
    );
    tsx.process_initial_request().await.unwrap();

    tsx.process_cancel(StatusCode::RequestTimeout).await.unwrap();

    assert_eq!(*observed.lock().unwrap(), Some(408));
    assert_eq!(sink.cancelled_forks(), vec![0, 1, 2]);
    // The inbound transport is gone; there is nobody to answer.
    assert!(sink.upstream_statuses().is_empty());
    assert_eq!(tsx.phase(), Phase::Terminated);
}

/// Tries one target; when it fails, swallows the response and retargets.
struct SequentialHunt {
    retargeted: bool,
}

#[async_trait]
impl ServiceTransaction for SequentialHunt {
    async fn on_initial_request(&mut self, ctx: &mut ServiceContext, _req: &Request) {
        ctx.add_target(target(1), None);
    }

    async fn on_in_dialog_request(&mut self, _ctx: &mut ServiceContext, _req: &Request) {}

    async fn on_response(
        &mut self,
        ctx: &mut ServiceContext,
        rsp: &Response,
        _fork_id: usize,
    ) -> bool {
        if rsp.status.is_final() && !rsp.status.is_success() && !self.retargeted {
            self.retargeted = true;
            ctx.add_target(target(2), None);
            return false;
        }
        true
    }

    async fn on_cancel(&mut self, _ctx: &mut ServiceContext, _status: StatusCode) {}
}

#[tokio::test]
async fn swallowed_response_with_new_targets_forks_recursively() {
    let sink = Arc::new(RecordingSink::default());
    let mut tsx = transaction(SequentialHunt { retargeted: false }, &sink);
    tsx.process_initial_request().await.unwrap();
    let original = invite();

    // First leg fails; the service swallows the 486 and retargets.
    tsx.process_response(response_to(&original, StatusCode::BusyHere), 0)
        .await
        .unwrap();
    assert_eq!(sink.forwarded_forks(), vec![0, 1]);
    assert!(sink.upstream_statuses().is_empty());
    assert_eq!(tsx.phase(), Phase::Forked);

    // Second leg answers and the 200 goes upstream.
    tsx.process_response(response_to(&original, StatusCode::Ok), 1)
        .await
        .unwrap();
    assert_eq!(sink.upstream_statuses(), vec![200]);
    assert_eq!(tsx.phase(), Phase::Terminated);
}

/// Swallows every response without ever adding a replacement target.
struct SwallowAll;

#[async_trait]
impl ServiceTransaction for SwallowAll {
    async fn on_initial_request(&mut self, _ctx: &mut ServiceContext, _req: &Request) {}

    async fn on_in_dialog_request(&mut self, _ctx: &mut ServiceContext, _req: &Request) {}

    async fn on_response(
        &mut self,
        _ctx: &mut ServiceContext,
        _rsp: &Response,
        _fork_id: usize,
    ) -> bool {
        false
    }

    async fn on_cancel(&mut self, _ctx: &mut ServiceContext, _status: StatusCode) {}
}

#[tokio::test]
async fn swallowing_every_final_still_terminates_the_upstream_transaction() {
    let sink = Arc::new(RecordingSink::default());
    let mut tsx = transaction(SwallowAll, &sink);
    tsx.process_initial_request().await.unwrap();
    let original = invite();

    tsx.process_response(response_to(&original, StatusCode::BusyHere), 0)
        .await
        .unwrap();

    // The service dropped the only final and offered nothing else; the
    // upstream transaction is closed with a 408.
    assert_eq!(sink.upstream_statuses(), vec![408]);
    assert_eq!(tsx.phase(), Phase::Terminated);
}

/// Answers upstream itself as soon as a fork starts ringing.
struct EagerAnswer;

#[async_trait]
impl ServiceTransaction for EagerAnswer {
    async fn on_initial_request(&mut self, ctx: &mut ServiceContext, _req: &Request) {
        ctx.add_target(target(1), None);
        ctx.add_target(target(2), None);
    }

    async fn on_in_dialog_request(&mut self, _ctx: &mut ServiceContext, _req: &Request) {}

    async fn on_response(
        &mut self,
        ctx: &mut ServiceContext,
        rsp: &Response,
        _fork_id: usize,
    ) -> bool {
        if rsp.status.is_provisional() {
            let answer = response_for(ctx.original_request(), StatusCode::Ok);
            ctx.send_response(answer).await.unwrap();
            return false;
        }
        true
    }

    async fn on_cancel(&mut self, _ctx: &mut ServiceContext, _status: StatusCode) {}
}

#[tokio::test]
async fn final_sent_by_the_service_cancels_outstanding_forks() {
    let sink = Arc::new(RecordingSink::default());
    let mut tsx = transaction(EagerAnswer, &sink);
    tsx.process_initial_request().await.unwrap();
    let original = invite();

    tsx.process_response(response_to(&original, StatusCode::Ringing), 0)
        .await
        .unwrap();

    assert_eq!(sink.upstream_statuses(), vec![200]);
    assert_eq!(sink.cancelled_forks(), vec![0, 1]);
    assert_eq!(tsx.phase(), Phase::Terminated);

    // Anything late is dropped without further upstream traffic.
    tsx.process_response(response_to(&original, StatusCode::BusyHere), 1)
        .await
        .unwrap();
    assert_eq!(sink.upstream_statuses(), vec![200]);
}

/// Joins the dialog on the initial request.
struct DialogJoiner;

#[async_trait]
impl ServiceTransaction for DialogJoiner {
    async fn on_initial_request(&mut self, ctx: &mut ServiceContext, _req: &Request) {
        ctx.add_to_dialog(None);
    }

    async fn on_in_dialog_request(&mut self, _ctx: &mut ServiceContext, _req: &Request) {}

    async fn on_response(
        &mut self,
        _ctx: &mut ServiceContext,
        _rsp: &Response,
        _fork_id: usize,
    ) -> bool {
        true
    }

    async fn on_cancel(&mut self, _ctx: &mut ServiceContext, _status: StatusCode) {}
}

#[tokio::test]
async fn joining_a_dialog_exposes_the_binding_for_the_routing_layer() {
    let sink = Arc::new(RecordingSink::default());
    let mut tsx = transaction(DialogJoiner, &sink);

    assert!(tsx.dialog_binding().is_none());
    tsx.process_initial_request().await.unwrap();

    let (dialog_id, service) = tsx.dialog_binding().unwrap();
    // Default id is Call-ID plus From/To tags; the To tag is absent on an
    // initial request.
    assert_eq!(dialog_id, "call-1@edge.example.com;from1;");
    assert_eq!(service, "mmtel");
}
