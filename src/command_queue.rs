//! Shared priority queue feeding the actuator link.
//!
//! Ordered by `(priority, sequence)`: numerically lower priorities first,
//! FIFO within a priority. Any number of producers, one consumer.

use crate::command::{Axis, MotionCommand};
use log::debug;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

#[derive(Debug, PartialEq, Eq)]
struct Queued(MotionCommand);

impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.0.priority, self.0.sequence).cmp(&(other.0.priority, other.0.sequence))
    }
}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Default)]
struct Inner {
    heap: BinaryHeap<Reverse<Queued>>,
    next_sequence: u64,
}

/// Unbounded priority queue of motion commands
#[derive(Debug, Default)]
pub struct CommandQueue {
    inner: Mutex<Inner>,
    available: Condvar,
}

impl CommandQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a command and return its sequence number
    pub fn push(&self, priority: u8, axis: Axis, angle: i32) -> u64 {
        let sequence = {
            let mut inner = self.lock();
            let sequence = inner.next_sequence;
            inner.next_sequence += 1;
            inner.heap.push(Reverse(Queued(MotionCommand {
                priority,
                axis,
                angle,
                sequence,
            })));
            sequence
        };
        self.available.notify_one();
        sequence
    }

    /// Remove the most urgent command without waiting
    pub fn try_pop(&self) -> Option<MotionCommand> {
        self.lock().heap.pop().map(|Reverse(Queued(cmd))| cmd)
    }

    /// Remove the most urgent command, waiting up to `timeout` for one to arrive
    pub fn pop_timeout(&self, timeout: Duration) -> Option<MotionCommand> {
        let guard = self.lock();
        let (mut guard, _) = self
            .available
            .wait_timeout_while(guard, timeout, |inner| inner.heap.is_empty())
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.heap.pop().map(|Reverse(Queued(cmd))| cmd)
    }

    /// Discard every pending command.
    ///
    /// Returns the watermark: every command enqueued afterwards has a sequence
    /// number greater than or equal to it.
    pub fn clear(&self) -> u64 {
        let mut inner = self.lock();
        let dropped = inner.heap.len();
        inner.heap.clear();
        if dropped > 0 {
            debug!("Command queue reset, {dropped} pending commands discarded");
        }
        inner.next_sequence
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().heap.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pending commands in service order, without removing them
    #[must_use]
    pub fn snapshot(&self) -> Vec<MotionCommand> {
        let inner = self.lock();
        let mut pending: Vec<MotionCommand> = inner.heap.iter().map(|Reverse(Queued(cmd))| *cmd).collect();
        pending.sort_by_key(|cmd| (cmd.priority, cmd.sequence));
        pending
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // The heap stays structurally valid even if a holder panicked
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
