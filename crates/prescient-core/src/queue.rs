//! Prefetch Priority Queue
//!
//! Ordered work queue of pending prefetch requests. Items are kept sorted
//! non-increasing by priority; equal priorities keep their enqueue order.

use std::collections::VecDeque;

use tokio::time::Instant;

use crate::patterns::Context;

/// A pending prefetch request
#[derive(Debug, Clone, PartialEq)]
pub struct QueueItem {
    /// Query to execute
    pub query: String,
    /// Priority (prediction probability)
    pub priority: f64,
    /// Context the prediction was made in
    pub context: Context,
    /// When the item was enqueued
    pub timestamp: Instant,
}

impl QueueItem {
    /// Create a queue item stamped with the current time
    pub fn new(query: impl Into<String>, priority: f64, context: Context) -> Self {
        Self {
            query: query.into(),
            priority,
            context,
            timestamp: Instant::now(),
        }
    }
}

/// Priority queue with first-fit insertion
#[derive(Debug, Default)]
pub struct PriorityQueue {
    items: VecDeque<QueueItem>,
}

impl PriorityQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert before the first item with a strictly lower priority
    pub fn enqueue(&mut self, item: QueueItem) {
        match self.items.iter().position(|i| i.priority < item.priority) {
            Some(idx) => self.items.insert(idx, item),
            None => self.items.push_back(item),
        }
    }

    /// Remove and return the highest-priority item
    pub fn dequeue(&mut self) -> Option<QueueItem> {
        self.items.pop_front()
    }

    /// Head of the queue without removing it
    pub fn peek(&self) -> Option<&QueueItem> {
        self.items.front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether a request for `query` is already waiting
    pub fn contains(&self, query: &str) -> bool {
        self.items.iter().any(|i| i.query == query)
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}
