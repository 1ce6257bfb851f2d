//! Operation queue
//!
//! FIFO queue of pending operations with the at-most-one-per-item
//! guarantee: an item with an operation queued or in flight rejects further
//! enqueues until the current one completes. Expired operations (24 h TTL)
//! are dropped on dequeue and handed back for permanent-failure recording.

use std::collections::{HashSet, VecDeque};

use tracing::{debug, warn};

use driftsync_core::domain::{ItemId, SyncOperation};

/// FIFO operation queue enforcing one live operation per item
#[derive(Debug, Default)]
pub struct TransferQueue {
    queue: VecDeque<SyncOperation>,
    queued_items: HashSet<ItemId>,
    in_flight: HashSet<ItemId>,
    expired: Vec<SyncOperation>,
}

impl TransferQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues an operation unless its item already has one pending
    ///
    /// Returns false when the operation was rejected as a duplicate.
    pub fn enqueue(&mut self, op: SyncOperation) -> bool {
        let item_id = *op.item_id();
        if self.queued_items.contains(&item_id) || self.in_flight.contains(&item_id) {
            debug!(item_id = %item_id, kind = %op.kind(), "operation rejected, item already busy");
            return false;
        }
        self.queued_items.insert(item_id);
        self.queue.push_back(op);
        true
    }

    /// Pops the oldest live operation and marks its item in flight
    ///
    /// Expired operations encountered on the way are dropped and collected
    /// for the caller to record via [`take_expired`](Self::take_expired).
    pub fn next(&mut self) -> Option<SyncOperation> {
        while let Some(op) = self.queue.pop_front() {
            self.queued_items.remove(op.item_id());
            if op.is_expired() {
                warn!(item_id = %op.item_id(), kind = %op.kind(), "dropping expired operation");
                self.expired.push(op);
                continue;
            }
            self.in_flight.insert(*op.item_id());
            return Some(op);
        }
        None
    }

    /// Puts a dequeued operation back at the front (admission deferred)
    ///
    /// The item stays reserved so nothing else can slip in ahead of it.
    pub fn requeue_front(&mut self, op: SyncOperation) {
        self.in_flight.remove(op.item_id());
        self.queued_items.insert(*op.item_id());
        self.queue.push_front(op);
    }

    /// Releases the in-flight reservation after the operation finished
    pub fn complete(&mut self, item_id: &ItemId) {
        self.in_flight.remove(item_id);
    }

    /// Operations dropped for exceeding their TTL since the last call
    pub fn take_expired(&mut self) -> Vec<SyncOperation> {
        std::mem::take(&mut self.expired)
    }

    pub fn is_in_flight(&self, item_id: &ItemId) -> bool {
        self.in_flight.contains(item_id)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftsync_core::domain::OperationKind;

    fn op(item_id: ItemId) -> SyncOperation {
        SyncOperation::new(item_id, OperationKind::Upload, 100)
    }

    #[test]
    fn test_fifo_order() {
        let mut queue = TransferQueue::new();
        let a = ItemId::new();
        let b = ItemId::new();
        assert!(queue.enqueue(op(a)));
        assert!(queue.enqueue(op(b)));

        assert_eq!(queue.next().unwrap().item_id(), &a);
        assert_eq!(queue.next().unwrap().item_id(), &b);
        assert!(queue.next().is_none());
    }

    #[test]
    fn test_duplicate_item_rejected_while_queued() {
        let mut queue = TransferQueue::new();
        let a = ItemId::new();
        assert!(queue.enqueue(op(a)));
        assert!(!queue.enqueue(op(a)));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_duplicate_item_rejected_while_in_flight() {
        let mut queue = TransferQueue::new();
        let a = ItemId::new();
        queue.enqueue(op(a));
        let running = queue.next().unwrap();
        assert!(queue.is_in_flight(running.item_id()));

        assert!(!queue.enqueue(op(a)));

        queue.complete(&a);
        assert!(queue.enqueue(op(a)));
    }

    #[test]
    fn test_requeue_front_keeps_reservation_and_order() {
        let mut queue = TransferQueue::new();
        let a = ItemId::new();
        let b = ItemId::new();
        queue.enqueue(op(a));
        queue.enqueue(op(b));

        let first = queue.next().unwrap();
        queue.requeue_front(first);
        assert!(!queue.enqueue(op(a)));

        // The deferred operation comes out first again.
        assert_eq!(queue.next().unwrap().item_id(), &a);
    }

    #[test]
    fn test_in_flight_count() {
        let mut queue = TransferQueue::new();
        let a = ItemId::new();
        let b = ItemId::new();
        queue.enqueue(op(a));
        queue.enqueue(op(b));
        queue.next();
        queue.next();
        assert_eq!(queue.in_flight_count(), 2);
        queue.complete(&a);
        assert_eq!(queue.in_flight_count(), 1);
    }
}
