//! Dispatcher worker-pool tests
//!
//! Exercises the receive hook, panic recovery, callback interleaving and
//! latency accounting against scripted processors.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use trellis_dispatch_core::{
    Callback, DispatchError, Dispatcher, DispatcherConfig, MessageProcessor, RxMessage,
    StatelessResponder,
};
use trellis_infra_common::{NullLoadMonitor, TrailId};
use trellis_sip_core::builder::RequestBuilder;
use trellis_sip_core::{HeaderAccess, HeaderName, Message, Method, Response};

/// Records processed Call-IDs; panics on any Call-ID starting with "boom".
#[derive(Default)]
struct ScriptedProcessor {
    log: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl MessageProcessor for ScriptedProcessor {
    async fn process(&self, rx: RxMessage) -> Result<(), DispatchError> {
        let call_id = rx.message.call_id().unwrap_or("<none>").to_string();
        if call_id.starts_with("boom") {
            panic!("deliberate test panic");
        }
        self.log.lock().unwrap().push(format!("msg:{call_id}"));
        Ok(())
    }
}

/// Records every stateless response sent.
#[derive(Default)]
struct RecordingResponder {
    responses: Mutex<Vec<(u16, Option<String>)>>,
}

impl RecordingResponder {
    fn sent(&self) -> Vec<(u16, Option<String>)> {
        self.responses.lock().unwrap().clone()
    }
}

#[async_trait]
impl StatelessResponder for RecordingResponder {
    async fn respond(&self, response: Response, _trail: TrailId) -> Result<(), DispatchError> {
        let retry_after = response
            .header(&HeaderName::RetryAfter)
            .map(|h| h.value.clone());
        self.responses
            .lock()
            .unwrap()
            .push((response.status.as_u16(), retry_after));
        Ok(())
    }
}

fn rx_request(method: Method, call_id: &str) -> RxMessage {
    let request = RequestBuilder::new(method.clone(), "sip:bob@example.com".parse().unwrap())
        .via("client.example.com")
        .header(HeaderName::From, "<sip:alice@example.com>;tag=f")
        .header(HeaderName::To, "<sip:bob@example.com>")
        .header(HeaderName::CallId, call_id)
        .header(HeaderName::CSeq, format!("1 {method}"))
        .build();
    RxMessage::new(Message::Request(request), TrailId::next())
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached within timeout");
}

fn dispatcher(
    workers: usize,
    log: Arc<Mutex<Vec<String>>>,
    responder: Arc<RecordingResponder>,
) -> Dispatcher {
    Dispatcher::new(
        DispatcherConfig {
            workers,
            ..DispatcherConfig::default()
        },
        Arc::new(ScriptedProcessor { log }),
        responder,
        Arc::new(NullLoadMonitor),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn a_panicking_message_yields_500_and_the_peer_worker_continues() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let responder = Arc::new(RecordingResponder::default());
    let dispatcher = dispatcher(2, Arc::clone(&log), Arc::clone(&responder));
    dispatcher.start();

    assert!(dispatcher.on_rx_message(&rx_request(Method::Invite, "boom-1@host")));
    assert!(dispatcher.on_rx_message(&rx_request(Method::Invite, "ok-1@host")));

    wait_until(|| {
        responder.sent().len() == 1 && log.lock().unwrap().contains(&"msg:ok-1@host".to_string())
    })
    .await;

    // The crash produced a 500 with Retry-After: 600, sent statelessly.
    assert_eq!(responder.sent(), vec![(500, Some("600".to_string()))]);

    // The pool is still alive and drains further work.
    assert!(dispatcher.on_rx_message(&rx_request(Method::Invite, "ok-2@host")));
    wait_until(|| log.lock().unwrap().contains(&"msg:ok-2@host".to_string())).await;

    dispatcher.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn a_panicking_ack_gets_no_response() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let responder = Arc::new(RecordingResponder::default());
    let dispatcher = dispatcher(2, Arc::clone(&log), Arc::clone(&responder));
    dispatcher.start();

    assert!(dispatcher.on_rx_message(&rx_request(Method::Ack, "boom-ack@host")));
    assert!(dispatcher.on_rx_message(&rx_request(Method::Invite, "ok-1@host")));

    wait_until(|| log.lock().unwrap().contains(&"msg:ok-1@host".to_string())).await;

    // ACKs never receive responses, even on a crash.
    assert!(responder.sent().is_empty());

    dispatcher.shutdown().await;
}

#[tokio::test]
async fn callbacks_interleave_fifo_with_messages_on_one_worker() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let responder = Arc::new(RecordingResponder::default());
    let dispatcher = dispatcher(1, Arc::clone(&log), responder);

    // Queue everything before starting the (single) worker so the ordering
    // observation is deterministic.
    dispatcher.on_rx_message(&rx_request(Method::Invite, "a@host"));
    let cb_log = Arc::clone(&log);
    dispatcher.add_callback(Box::new(move || {
        cb_log.lock().unwrap().push("cb:1".to_string());
    }) as Callback);
    dispatcher.on_rx_message(&rx_request(Method::Invite, "b@host"));

    dispatcher.start();
    wait_until(|| log.lock().unwrap().len() == 3).await;

    assert_eq!(
        *log.lock().unwrap(),
        vec!["msg:a@host", "cb:1", "msg:b@host"]
    );

    dispatcher.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn latency_and_queue_depth_are_accounted() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let responder = Arc::new(RecordingResponder::default());
    let dispatcher = dispatcher(2, Arc::clone(&log), responder);
    dispatcher.start();

    for n in 0..5 {
        dispatcher.on_rx_message(&rx_request(Method::Invite, &format!("m{n}@host")));
    }

    // One latency sample per handled message, one depth sample per enqueue.
    wait_until(|| dispatcher.latency_stats().count == 5).await;
    let depth = dispatcher.queue_depth_stats();
    assert_eq!(depth.count, 5);

    dispatcher.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_joins_workers_and_rejects_later_work() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let responder = Arc::new(RecordingResponder::default());
    let dispatcher = dispatcher(2, Arc::clone(&log), responder);
    dispatcher.start();

    dispatcher.on_rx_message(&rx_request(Method::Invite, "pre@host"));
    wait_until(|| log.lock().unwrap().len() == 1).await;

    dispatcher.shutdown().await;

    // The hook still absorbs, but nothing is queued or processed.
    assert!(dispatcher.on_rx_message(&rx_request(Method::Invite, "post@host")));
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(dispatcher.queue_len(), 0);
    assert_eq!(*log.lock().unwrap(), vec!["msg:pre@host"]);
}
