use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::TransportError;
use crate::message::JsonRpcErrorObject;

pub type WaiterResult = Result<Value, JsonRpcErrorObject>;

/// The `id -> waiter` table from §4.A/§9: a concurrent map with the waiter
/// represented as a one-shot channel. The transport read loop owns the
/// sender half (delivered via `resolve`/`fail_all`); the caller that issued
/// the request owns the receiver.
pub struct WaiterTable {
    next_id: AtomicU64,
    pending: DashMap<u64, oneshot::Sender<WaiterResult>>,
}

impl Default for WaiterTable {
    fn default() -> Self {
        Self::new()
    }
}

impl WaiterTable {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            pending: DashMap::new(),
        }
    }

    /// Allocate a strictly increasing request id and register its waiter.
    pub fn register(&self) -> (u64, oneshot::Receiver<WaiterResult>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);
        (id, rx)
    }

    pub fn cancel(&self, id: u64) {
        self.pending.remove(&id);
    }

    /// Deliver a response to its waiter. No-op if the waiter already went
    /// away (request cancelled locally, or a duplicate/late response).
    pub fn resolve(&self, id: u64, outcome: WaiterResult) {
        if let Some((_, tx)) = self.pending.remove(&id) {
            let _ = tx.send(outcome);
        }
    }

    /// Drain every pending waiter with a connection-closed error. Called on
    /// subprocess exit / stream closure per §4.A failure semantics.
    pub fn fail_all(&self, reason: &str) {
        let ids: Vec<u64> = self.pending.iter().map(|e| *e.key()).collect();
        for id in ids {
            if let Some((_, tx)) = self.pending.remove(&id) {
                let _ = tx.send(Err(JsonRpcErrorObject {
                    code: crate::message::INTERNAL_ERROR_CODE,
                    message: format!("connection closed: {reason}"),
                    data: None,
                }));
            }
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

pub fn into_transport_error(id: u64, outcome: WaiterResult) -> Result<Value, TransportError> {
    outcome.map_err(|e| TransportError::Remote {
        code: e.code,
        message: if e.message.is_empty() {
            format!("request {id} failed")
        } else {
            e.message
        },
    })
}
