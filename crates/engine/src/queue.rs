//! Bounded multi-producer/multi-consumer queue for stage hand-off
//!
//! Every stage boundary in the pipeline is one of these. End-of-stream is an
//! ordinary element (`WorkUnit::EndOfStream`) so consumers are forced by the
//! type system to handle termination; the queue itself never interprets it.

use crate::error::QueueDisconnected;
use crossbeam_channel::{Receiver, Sender};

/// Element flowing through a stage queue
#[derive(Debug)]
pub enum WorkUnit<T> {
    Work(T),
    EndOfStream,
}

/// Blocking bounded FIFO. Pops observe pushes in program order from a single
/// producer; producers are not ordered against each other.
pub struct WorkQueue<T> {
    tx: Sender<WorkUnit<T>>,
    rx: Receiver<WorkUnit<T>>,
}

impl<T> Clone for WorkQueue<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            rx: self.rx.clone(),
        }
    }
}

impl<T> WorkQueue<T> {
    /// Create a queue holding at most `capacity` elements; `push` blocks when full
    #[must_use]
    pub fn bounded(capacity: usize) -> Self {
        let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
        Self { tx, rx }
    }

    pub fn push(&self, unit: WorkUnit<T>) -> Result<(), QueueDisconnected> {
        self.tx.send(unit).map_err(|_| QueueDisconnected)
    }

    pub fn pop(&self) -> Result<WorkUnit<T>, QueueDisconnected> {
        self.rx.recv().map_err(|_| QueueDisconnected)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
