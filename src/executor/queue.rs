//! Deferred work queue for writes that could not reach the durable store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Mutex;
use uuid::Uuid;

/// A queued unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem<P> {
    /// Unique identifier.
    pub id: String,
    /// The deferred work.
    pub payload: P,
    /// Higher runs first.
    pub priority: i32,
    /// When the item was first enqueued.
    pub created_at: DateTime<Utc>,
    /// How many times the item was handed out and returned unfinished.
    pub retry_count: u32,
}

impl<P> QueueItem<P> {
    fn new(payload: P, priority: i32) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            payload,
            priority,
            created_at: Utc::now(),
            retry_count: 0,
        }
    }
}

/// Heap entry. `seq` breaks ties between items created in the same instant.
#[derive(Debug)]
struct Queued<P> {
    seq: u64,
    item: QueueItem<P>,
}

impl<P> PartialEq for Queued<P> {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl<P> Eq for Queued<P> {}

impl<P> PartialOrd for Queued<P> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<P> Ord for Queued<P> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: higher priority first, then older items, then insertion order.
        self.item
            .priority
            .cmp(&other.item.priority)
            .then_with(|| other.item.created_at.cmp(&self.item.created_at))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Debug)]
struct Inner<P> {
    pending: BinaryHeap<Queued<P>>,
    in_flight: HashMap<String, QueueItem<P>>,
}

/// A priority queue with acknowledgement and a retry ceiling.
///
/// Items handed out by [`dequeue`](Self::dequeue) stay in flight until they
/// are acknowledged with [`ack`](Self::ack) or returned with
/// [`nack`](Self::nack). [`checkout`](Self::checkout) hands out a guard that
/// puts the item back if it is dropped unresolved. [`reap`](Self::reap) drops
/// pending items that have reached the retry ceiling.
#[derive(Debug)]
pub struct DeferredQueue<P> {
    inner: Mutex<Inner<P>>,
    max_retries: u32,
    seq: AtomicU64,
}

impl<P: Clone> DeferredQueue<P> {
    /// Creates an empty queue whose items are reaped after `max_retries` returns.
    pub fn new(max_retries: u32) -> Self {
        Self {
            inner: Mutex::new(Inner {
                pending: BinaryHeap::new(),
                in_flight: HashMap::new(),
            }),
            max_retries: max_retries.max(1),
            seq: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner<P>> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn push(&self, inner: &mut Inner<P>, item: QueueItem<P>) {
        let seq = self.seq.fetch_add(1, AtomicOrdering::Relaxed);
        inner.pending.push(Queued { seq, item });
    }

    /// Returns the retry ceiling.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Adds work to the queue and returns its id.
    pub fn enqueue(&self, payload: P, priority: i32) -> String {
        let item = QueueItem::new(payload, priority);
        let id = item.id.clone();
        let mut inner = self.lock();
        self.push(&mut inner, item);
        id
    }

    /// Takes the highest-priority pending item and marks it in flight.
    pub fn dequeue(&self) -> Option<QueueItem<P>> {
        let mut inner = self.lock();
        let Queued { item, .. } = inner.pending.pop()?;
        inner.in_flight.insert(item.id.clone(), item.clone());
        Some(item)
    }

    /// Like [`dequeue`](Self::dequeue), but the item goes back to pending
    /// unless the returned guard is acked or nacked.
    pub fn checkout(&self) -> Option<Checkout<'_, P>> {
        let item = self.dequeue()?;
        Some(Checkout {
            queue: self,
            item,
            resolved: false,
        })
    }

    // Returns an in-flight item to pending without counting a retry.
    fn release(&self, id: &str) -> bool {
        let mut inner = self.lock();
        match inner.in_flight.remove(id) {
            Some(item) => {
                self.push(&mut inner, item);
                true
            }
            None => false,
        }
    }

    /// Completes an in-flight item. Returns `false` for unknown ids.
    pub fn ack(&self, id: &str) -> bool {
        self.lock().in_flight.remove(id).is_some()
    }

    /// Returns an in-flight item to the queue with its retry count bumped.
    ///
    /// Returns `false` for unknown ids.
    pub fn nack(&self, id: &str) -> bool {
        let mut inner = self.lock();
        match inner.in_flight.remove(id) {
            Some(mut item) => {
                item.retry_count += 1;
                self.push(&mut inner, item);
                true
            }
            None => false,
        }
    }

    /// Removes and returns pending items that reached the retry ceiling.
    pub fn reap(&self) -> Vec<QueueItem<P>> {
        let mut inner = self.lock();
        let (dead, live): (Vec<_>, Vec<_>) = std::mem::take(&mut inner.pending)
            .into_iter()
            .partition(|queued| queued.item.retry_count >= self.max_retries);
        inner.pending = live.into_iter().collect();
        dead.into_iter().map(|queued| queued.item).collect()
    }

    /// Returns the number of pending items.
    pub fn len(&self) -> usize {
        self.lock().pending.len()
    }

    /// Returns `true` if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.lock().pending.is_empty()
    }

    /// Returns the number of items handed out and not yet acknowledged.
    pub fn in_flight_count(&self) -> usize {
        self.lock().in_flight.len()
    }

    /// Returns pending plus in-flight items.
    pub fn outstanding(&self) -> usize {
        let inner = self.lock();
        inner.pending.len() + inner.in_flight.len()
    }
}

/// An in-flight item that returns to the queue when dropped unresolved.
#[derive(Debug)]
pub struct Checkout<'a, P: Clone> {
    queue: &'a DeferredQueue<P>,
    item: QueueItem<P>,
    resolved: bool,
}

impl<P: Clone> Checkout<'_, P> {
    /// The checked-out item.
    pub fn item(&self) -> &QueueItem<P> {
        &self.item
    }

    /// Completes the item.
    pub fn ack(mut self) {
        self.resolved = true;
        self.queue.ack(&self.item.id);
    }

    /// Returns the item with its retry count bumped.
    pub fn nack(mut self) {
        self.resolved = true;
        self.queue.nack(&self.item.id);
    }
}

impl<P: Clone> Drop for Checkout<'_, P> {
    fn drop(&mut self) {
        if !self.resolved && self.queue.release(&self.item.id) {
            tracing::debug!(id = %self.item.id, "Returned unresolved item to the queue");
        }
    }
}

impl<P: Clone> Default for DeferredQueue<P> {
    fn default() -> Self {
        Self::new(5)
    }
}
