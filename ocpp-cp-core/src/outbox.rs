//! Pending-call ledger
//!
//! Correlates the id of every outbound CALL with the call itself until the
//! matching CALLRESULT or CALLERROR arrives. One ledger belongs to one
//! connection; the send path and the receive path both go through it, so
//! every operation runs under a single lock and never awaits.

use std::collections::{HashMap, HashSet, VecDeque};

use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

use crate::ocpp::Call;

/// Number of settled ids remembered for telling late duplicates apart from
/// ids that were never issued
const SETTLED_HISTORY: usize = 256;

/// Ledger invariant violations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OutboxError {
    #[error("call id {0} is already pending")]
    DuplicateCallId(String),
}

#[derive(Debug, Default)]
struct Ledger {
    pending: HashMap<String, Call>,
    settled: VecDeque<String>,
    settled_index: HashSet<String>,
}

impl Ledger {
    fn remember(&mut self, id: String) {
        if !self.settled_index.insert(id.clone()) {
            return;
        }
        self.settled.push_back(id);
        if self.settled.len() > SETTLED_HISTORY {
            if let Some(oldest) = self.settled.pop_front() {
                self.settled_index.remove(&oldest);
            }
        }
    }

    fn remove(&mut self, id: &str) -> Option<Call> {
        let call = self.pending.remove(id)?;
        self.remember(call.message_id.clone());
        Some(call)
    }
}

/// Pending outbound calls keyed by message id
#[derive(Debug, Default)]
pub struct Outbox {
    inner: Mutex<Ledger>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a call before it is transmitted
    pub fn enqueue(&self, call: Call) -> Result<(), OutboxError> {
        let mut ledger = self.inner.lock();
        if ledger.pending.contains_key(&call.message_id) {
            return Err(OutboxError::DuplicateCallId(call.message_id));
        }
        debug!("Outbox: tracking {} ({})", call.message_id, call.action);
        ledger.pending.insert(call.message_id.clone(), call);
        Ok(())
    }

    /// Remove and return the call a CALLRESULT answers.
    ///
    /// Only one caller can ever get `Some` for a given id.
    pub fn take_by_id(&self, id: &str) -> Option<Call> {
        self.inner.lock().remove(id)
    }

    /// Remove the call a CALLERROR terminates, if it is still tracked
    pub fn settle(&self, id: &str) -> Option<Call> {
        self.inner.lock().remove(id)
    }

    /// Drop a call whose send was aborted before transmission
    pub(crate) fn discard(&self, id: &str) -> Option<Call> {
        self.inner.lock().pending.remove(id)
    }

    /// Read-only view of a pending call
    pub fn get(&self, id: &str) -> Option<Call> {
        self.inner.lock().pending.get(id).cloned()
    }

    /// Whether the id is pending or was settled recently
    pub fn was_issued(&self, id: &str) -> bool {
        let ledger = self.inner.lock();
        ledger.pending.contains_key(id) || ledger.settled_index.contains(id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().pending.is_empty()
    }

    /// Forget every pending call, returning how many were dropped
    pub fn clear(&self) -> usize {
        let mut ledger = self.inner.lock();
        let dropped = ledger.pending.len();
        let ids: Vec<String> = ledger.pending.drain().map(|(id, _)| id).collect();
        for id in ids {
            ledger.remember(id);
        }
        dropped
    }
}
