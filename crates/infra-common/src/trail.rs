//! Trail ids and trail events
//!
//! Every inbound message is tagged with a [`TrailId`] that follows it
//! through the dispatcher, the application-server layer, and any responses,
//! so an external analysis system can stitch one call's events back
//! together across components. Trail events are emitted through `tracing`
//! under the `trellis::trail` target; the forwarder that ships them off-box
//! subscribes to that target and is not this crate's concern.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

static NEXT_TRAIL: AtomicU64 = AtomicU64::new(1);

/// A correlation id for one unit of inbound work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrailId(u64);

impl TrailId {
    /// Allocates the next trail id. Ids are process-unique and never zero.
    pub fn next() -> TrailId {
        TrailId(NEXT_TRAIL.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TrailId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Well-known trail event markers.
pub mod marker {
    /// Message entered the dispatch receive hook.
    pub const BEGIN_DISPATCH: &str = "begin_dispatch";
    /// Worker finished with a message.
    pub const DISPATCH_COMPLETE: &str = "dispatch_complete";
    /// Worker panicked while processing a message.
    pub const WORKER_FAILURE: &str = "worker_failure";
    /// Application server was invoked for a request.
    pub const AS_INVOKED: &str = "as_invoked";
    /// Application server declined a request.
    pub const AS_DECLINED: &str = "as_declined";
    /// A fork was created for a downstream target.
    pub const FORK_CREATED: &str = "fork_created";
    /// A response was forwarded upstream.
    pub const RESPONSE_FORWARDED: &str = "response_forwarded";
    /// The upstream transaction was cancelled.
    pub const UPSTREAM_CANCEL: &str = "upstream_cancel";
}

/// Emits a trail event.
pub fn event(trail: TrailId, marker: &str) {
    tracing::debug!(target: "trellis::trail", trail = trail.as_u64(), marker, "trail event");
}

/// Emits a trail event with free-form detail.
pub fn event_with(trail: TrailId, marker: &str, detail: &str) {
    tracing::debug!(
        target: "trellis::trail",
        trail = trail.as_u64(),
        marker,
        detail,
        "trail event"
    );
}
