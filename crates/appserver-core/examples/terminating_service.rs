//! A minimal terminating application service.
//!
//! Looks up the callee's registered bindings and forks the INVITE to every
//! contact; rejects with 480 when nobody is registered. Run with:
//!
//! ```sh
//! cargo run --example terminating_service
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use trellis_appserver_core::{
    AppServer, ServiceContext, ServiceCounters, ServiceRegistryBuilder, ServiceTransaction,
    ServiceTransactionContext, TransactionSink,
};
use trellis_infra_common::TrailId;
use trellis_registrar_core::{MemoryStore, RegistrationStore};
use trellis_sip_core::builder::RequestBuilder;
use trellis_sip_core::{HeaderName, Method, Request, Response, StatusCode, Uri};

struct TerminatingService {
    reg_store: Arc<RegistrationStore>,
}

impl AppServer for TerminatingService {
    fn service_name(&self) -> &str {
        "term"
    }

    fn get_transaction(
        &self,
        _req: &Request,
        _dialog_id: &str,
    ) -> Option<Box<dyn ServiceTransaction>> {
        Some(Box::new(TerminatingTransaction {
            reg_store: Arc::clone(&self.reg_store),
        }))
    }
}

struct TerminatingTransaction {
    reg_store: Arc<RegistrationStore>,
}

#[async_trait]
impl ServiceTransaction for TerminatingTransaction {
    async fn on_initial_request(&mut self, ctx: &mut ServiceContext, req: &Request) {
        let aor_id = req.uri.canonical();
        match self.reg_store.get_aor_data(&aor_id).await {
            Ok(aor) if !aor.is_empty() => {
                for (_, binding) in aor.bindings() {
                    if let Ok(target) = binding.uri.parse::<Uri>() {
                        ctx.add_target(target, None);
                    }
                }
            }
            Ok(_) => ctx.reject(StatusCode::TemporarilyUnavailable, None),
            Err(_) => ctx.reject(StatusCode::ServiceUnavailable, None),
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

/// Prints every emission instead of handing it to a transport.
struct PrintSink;

#[async_trait]
impl TransactionSink for PrintSink {
    async fn forward_request(
        &self,
        fork_id: usize,
        target: Uri,
        request: Request,
        _trail: TrailId,
    ) -> trellis_appserver_core::Result<()> {
        println!("fork {fork_id}: {} -> {target}", request.method);
        Ok(())
    }

    async fn send_upstream(
        &self,
        response: Response,
        _trail: TrailId,
    ) -> trellis_appserver_core::Result<()> {
        println!("upstream: {} {}", response.status, response.reason_phrase());
        Ok(())
    }

    async fn cancel_fork(
        &self,
        fork_id: usize,
        _trail: TrailId,
    ) -> trellis_appserver_core::Result<()> {
        println!("cancel fork {fork_id}");
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    // Register two contacts for bob.
    let reg_store = Arc::new(RegistrationStore::new(Arc::new(MemoryStore::new())));
    let now = Utc::now().timestamp();
    let mut aor = reg_store.get_aor_data("sip:bob@example.com").await.unwrap();
    let desk = aor.get_binding("urn:uuid:desk;reg-id=1");
    desk.uri = "sip:bob@192.0.2.10:5060".to_string();
    desk.expires = (now + 3600) as i32;
    let mobile = aor.get_binding("urn:uuid:mobile;reg-id=1");
    mobile.uri = "sip:bob@198.51.100.20:5060".to_string();
    mobile.expires = (now + 3600) as i32;
    reg_store.set_aor_data("sip:bob@example.com", &mut aor).await.unwrap();

    // Register the service and route an INVITE through it.
    let registry = ServiceRegistryBuilder::new("example.com")
        .register(Arc::new(TerminatingService {
            reg_store: Arc::clone(&reg_store),
        }))
        .build();

    let invite = RequestBuilder::new(Method::Invite, "sip:bob@example.com".parse().unwrap())
        .via("edge.example.com")
        .header(HeaderName::From, "<sip:alice@example.com>;tag=a1")
        .header(HeaderName::To, "<sip:bob@example.com>")
        .header(HeaderName::CallId, "demo-call@edge.example.com")
        .header(HeaderName::CSeq, "1 INVITE")
        .build();

    let server = registry
        .resolve_ifc_host("term.example.com")
        .expect("service registered");
    let handler = server
        .get_transaction(&invite, "")
        .expect("service accepted");
    let counters = registry.counters("term").expect("counters registered");

    let mut tsx = ServiceTransactionContext::new(
        handler,
        server.service_name().to_string(),
        invite,
        "",
        TrailId::next(),
        Arc::new(PrintSink),
        counters,
    );
    tsx.process_initial_request().await.unwrap();
}
