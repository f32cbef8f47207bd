//! Local operation store.
//!
//! The queue is the durability boundary of a device: every local change is
//! appended here before anything touches the network, and an entry is only
//! purged after a sync pass has handed it to the server. Entries are keyed by
//! operation id; status transitions on unknown ids are silently ignored
//! because a missing id means it was already swept.

use crate::{error::Result, Error, OpStatus, Operation, OperationId};
use serde::{Deserialize, Serialize};

/// Durable keyed collection of operations, indexed by status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationQueue {
    /// Entries in insertion order
    entries: Vec<Operation>,
}

impl OperationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an operation with status `pending`.
    pub fn enqueue(&mut self, mut op: Operation) -> Result<&Operation> {
        if self.position(&op.id).is_some() {
            return Err(Error::DuplicateOperation(op.id));
        }
        op.status = OpStatus::Pending;
        self.entries.push(op);
        // just pushed
        Ok(&self.entries[self.entries.len() - 1])
    }

    /// All pending operations.
    pub fn pending_operations(&self) -> Vec<Operation> {
        self.with_status(OpStatus::Pending).cloned().collect()
    }

    /// Iterate operations in a given status.
    pub fn with_status(&self, status: OpStatus) -> impl Iterator<Item = &Operation> {
        self.entries.iter().filter(move |op| op.status == status)
    }

    pub fn count_by_status(&self, status: OpStatus) -> usize {
        self.with_status(status).count()
    }

    pub fn pending_count(&self) -> usize {
        self.count_by_status(OpStatus::Pending)
    }

    pub fn get(&self, id: &str) -> Option<&Operation> {
        self.position(id).map(|i| &self.entries[i])
    }

    /// Mark an operation completed. No-op if the id is unknown.
    pub fn mark_completed(&mut self, id: &str) {
        self.set_status(id, OpStatus::Completed);
    }

    /// Mark an operation failed. No-op if the id is unknown.
    pub fn mark_failed(&mut self, id: &str) {
        self.set_status(id, OpStatus::Failed);
    }

    /// Purge completed entries, returning how many were removed.
    pub fn clear_completed(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|op| op.status != OpStatus::Completed);
        before - self.entries.len()
    }

    /// Wipe the queue. Only used for full-resync recovery.
    pub fn clear_all(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &OperationId> {
        self.entries.iter().map(|op| &op.id)
    }

    fn set_status(&mut self, id: &str, status: OpStatus) {
        if let Some(i) = self.position(id) {
            self.entries[i].status = status;
        }
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.entries.iter().position(|op| op.id == id)
    }
}
