//! Dialog stickiness
//!
//! A service that calls `add_to_dialog` expects later requests in the same
//! dialog to come back to it. [`DialogBindings`] is the table the routing
//! layer consults: dialog id to service name, written when a transaction
//! that joined its dialog terminates, and cleared when the dialog ends.

use dashmap::DashMap;
use tracing::debug;

use trellis_sip_core::{HeaderAccess, Request};

/// Derives the default dialog id from a request: Call-ID plus the From and
/// To tags, which together identify the dialog per RFC 3261 Section 12.
pub fn default_dialog_id(req: &Request) -> String {
    let call_id = req.call_id().unwrap_or_default();
    let from_tag = req.from_tag().unwrap_or_default();
    let to_tag = req.to_tag().unwrap_or_default();
    format!("{call_id};{from_tag};{to_tag}")
}

/// Concurrent dialog-id to service-name table.
#[derive(Debug, Default)]
pub struct DialogBindings {
    bindings: DashMap<String, String>,
}

impl DialogBindings {
    pub fn new() -> Self {
        DialogBindings::default()
    }

    /// Remembers that `service` joined the dialog.
    pub fn bind(&self, dialog_id: impl Into<String>, service: impl Into<String>) {
        let dialog_id = dialog_id.into();
        let service = service.into();
        debug!(dialog = %dialog_id, service = %service, "dialog bound to service");
        self.bindings.insert(dialog_id, service);
    }

    /// The service bound to a dialog, if any.
    pub fn lookup(&self, dialog_id: &str) -> Option<String> {
        self.bindings.get(dialog_id).map(|entry| entry.value().clone())
    }

    /// Forgets a dialog, typically when it terminates.
    pub fn unbind(&self, dialog_id: &str) {
        self.bindings.remove(dialog_id);
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
