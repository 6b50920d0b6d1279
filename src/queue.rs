//! Bounded FIFO connecting the capture thread to the detection loop.
//!
//! Built on a `crossbeam_channel::bounded` channel plus a shutdown channel whose sender is
//! dropped by `close`:
//! - `push` blocks while the queue is full (or evicts the oldest item under
//!   `OverflowPolicy::DropOldest`) and hands the item back once the queue is closed.
//! - `pop` blocks while the queue is empty and returns `None` once it is closed and drained.
//! - `close` is idempotent and wakes every waiter.
//!
//! The first item pushed is never evicted: until the consumer has taken it, a drop-oldest
//! queue waits like a blocking one. The detection loop's reference frame is that item.

use crossbeam_channel::{bounded, select, Receiver, Select, Sender, TryRecvError, TrySendError};
use serde::Deserialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

/// Default queue capacity in frames.
pub const DEFAULT_QUEUE_CAPACITY: usize = 128;

/// What `push` does when the queue is at capacity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Wait for the consumer to make room.
    #[default]
    Block,
    /// Evict the oldest queued item and enqueue the new one.
    DropOldest,
}

/// Returned by `push` on a closed queue. Carries the rejected item back to the caller.
pub struct Closed<T>(pub T);

impl<T> Closed<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Debug for Closed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Closed(..)")
    }
}

impl<T> fmt::Display for Closed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("queue is closed")
    }
}

pub struct BoundedQueue<T> {
    items_tx: Sender<T>,
    items_rx: Receiver<T>,
    // Never sent on. Dropping the sender disconnects `shutdown_rx`, which wakes every select.
    shutdown_tx: Mutex<Option<Sender<()>>>,
    shutdown_rx: Receiver<()>,
    closed: AtomicBool,
    first_taken: AtomicBool,
    dropped: AtomicU64,
    capacity: usize,
    policy: OverflowPolicy,
}

impl<T> BoundedQueue<T> {
    /// Create a queue holding at most `capacity` items (a capacity of zero is raised to one).
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        let capacity = capacity.max(1);
        let (items_tx, items_rx) = bounded(capacity);
        let (shutdown_tx, shutdown_rx) = bounded(0);
        Self {
            items_tx,
            items_rx,
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            shutdown_rx,
            closed: AtomicBool::new(false),
            first_taken: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
            capacity,
            policy,
        }
    }

    /// Enqueue an item, waiting for room under `OverflowPolicy::Block`.
    pub fn push(&self, item: T) -> Result<(), Closed<T>> {
        if self.is_closed() {
            return Err(Closed(item));
        }
        if self.policy == OverflowPolicy::DropOldest && self.first_taken.load(Ordering::SeqCst) {
            return self.push_evicting(item);
        }
        self.push_waiting(item)
    }

    fn push_waiting(&self, item: T) -> Result<(), Closed<T>> {
        let mut sel = Select::new();
        let send = sel.send(&self.items_tx);
        let shutdown = sel.recv(&self.shutdown_rx);
        let oper = sel.select();
        if oper.index() == shutdown {
            let _ = oper.recv(&self.shutdown_rx);
            return Err(Closed(item));
        }
        debug_assert_eq!(oper.index(), send);
        oper.send(&self.items_tx, item)
            .map_err(|err| Closed(err.into_inner()))
    }

    fn push_evicting(&self, mut item: T) -> Result<(), Closed<T>> {
        loop {
            match self.items_tx.try_send(item) {
                Ok(()) => return Ok(()),
                Err(TrySendError::Disconnected(back)) => return Err(Closed(back)),
                Err(TrySendError::Full(back)) => {
                    item = back;
                    if self.items_rx.try_recv().is_ok() {
                        self.dropped.fetch_add(1, Ordering::SeqCst);
                    }
                    if self.is_closed() {
                        return Err(Closed(item));
                    }
                }
            }
        }
    }

    /// Dequeue the oldest item, waiting while the queue is empty and open.
    ///
    /// Returns `None` once the queue is closed and every queued item has been taken.
    pub fn pop(&self) -> Option<T> {
        loop {
            match self.items_rx.try_recv() {
                Ok(item) => return Some(self.taken(item)),
                Err(TryRecvError::Disconnected) => return None,
                Err(TryRecvError::Empty) => {}
            }
            if self.is_closed() {
                // A push racing `close` may still have landed.
                return self.items_rx.try_recv().ok().map(|item| self.taken(item));
            }
            select! {
                recv(self.items_rx) -> item => {
                    if let Ok(item) = item {
                        return Some(self.taken(item));
                    }
                },
                recv(self.shutdown_rx) -> _ => {},
            }
        }
    }

    fn taken(&self, item: T) -> T {
        self.first_taken.store(true, Ordering::SeqCst);
        item
    }

    /// Stop accepting items. Queued items stay available to `pop`.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shutdown_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.items_rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items_rx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// Items evicted under `OverflowPolicy::DropOldest`.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::SeqCst)
    }
}
