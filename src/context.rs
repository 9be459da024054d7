//! Per-parallel-region shared state: the two bounded queues, the thread-accounting sets, and
//! the cooperative teardown flag.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, SendTimeoutError, Sender, TryRecvError, TrySendError};
use parking_lot::Mutex;

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::stream::BoxStream;

/// A worker identifier minted by the engine, not the OS thread id. The engine needs an id to
/// hand to a worker before its `JoinHandle` exists (the announced-fork path below), which rules
/// out using `std::thread::ThreadId`.
pub type WorkerId = u64;

fn next_worker_id() -> WorkerId {
    static NEXT: AtomicU64 = AtomicU64::new(0);
    NEXT.fetch_add(1, Ordering::Relaxed)
}

/// Tagged union of events a worker reports to the puller through the output queue.
pub enum ChildEvent<T> {
    /// Worker produced a value, has more to do.
    Yield(T),
    /// Worker produced its final value and is exiting.
    Done(WorkerId, T),
    /// Worker exited producing nothing (or failed).
    Stop(WorkerId, Option<EngineError>),
    /// A worker was just forked from within another worker (the announced-fork path).
    Create(WorkerId),
}

#[derive(Default)]
struct ThreadSets {
    running: HashSet<WorkerId>,
    done: HashSet<WorkerId>,
}

/// The symmetric set-cancellation operation used for creation/completion accounting: if `tid`
/// is already recorded in `set_a`, cancel it out and report whether both sets are now empty;
/// otherwise record it in `set_b` and report not-drained. This makes `Create` and `Done`/`Stop`
/// commute regardless of arrival order.
fn account(tid: WorkerId, set_a: &mut HashSet<WorkerId>, set_b: &mut HashSet<WorkerId>) -> bool {
    if set_a.remove(&tid) {
        set_a.is_empty() && set_b.is_empty()
    } else {
        set_b.insert(tid);
        false
    }
}

/// Per-parallel-region shared state. Created on first `alt` entry with no active context,
/// shared by all workers and the puller in that region, discarded when the region drains.
pub struct Context<T: Send + 'static> {
    pub(crate) output_tx: Sender<ChildEvent<T>>,
    pub(crate) output_rx: Receiver<ChildEvent<T>>,
    pub(crate) work_tx: Sender<BoxStream<T>>,
    pub(crate) work_rx: Receiver<BoxStream<T>>,
    threads: Mutex<ThreadSets>,
    cancelled: AtomicBool,
    handles: Mutex<Vec<JoinHandle<()>>>,
    pub(crate) config: EngineConfig,
}

impl<T: Send + 'static> Context<T> {
    pub fn new(config: EngineConfig) -> Arc<Self> {
        let (output_tx, output_rx) = crossbeam_channel::bounded(config.queue_capacity);
        let (work_tx, work_rx) = crossbeam_channel::bounded(config.queue_capacity);
        Arc::new(Self {
            output_tx,
            output_rx,
            work_tx,
            work_rx,
            threads: Mutex::new(ThreadSets::default()),
            cancelled: AtomicBool::new(false),
            handles: Mutex::new(Vec::new()),
            config,
        })
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Account a `Create(tid)` event: `set_a = done`, `set_b = running`.
    pub(crate) fn account_create(&self, tid: WorkerId) -> bool {
        let mut sets = self.threads.lock();
        account(tid, &mut sets.done, &mut sets.running)
    }

    /// Account a `Done`/`Stop` event: `set_a = running`, `set_b = done`.
    pub(crate) fn account_complete(&self, tid: WorkerId) -> bool {
        let mut sets = self.threads.lock();
        account(tid, &mut sets.running, &mut sets.done)
    }

    /// Direct-insert fork: the caller (the puller, forking the initial worker or a
    /// demand-driven peer) inserts `tid` into `running` *before* spawning, because the puller
    /// and the freshly spawned worker race on the output queue — relying on a `Create` event
    /// here could let the puller observe the worker's `Done` before its creation.
    pub(crate) fn fork_worker_direct(self: &Arc<Self>) -> EngineResult<WorkerId> {
        let id = next_worker_id();
        self.threads.lock().running.insert(id);
        self.spawn_worker(id, false)?;
        Ok(id)
    }

    /// Announced fork: used when a worker itself forks a peer to drain a full work queue. The
    /// new thread emits `Create(tid)` as its first action, which serializes the create event
    /// with that worker's own subsequent yields on the same output-queue sender.
    pub(crate) fn fork_worker_announced(self: &Arc<Self>) -> EngineResult<WorkerId> {
        let id = next_worker_id();
        self.spawn_worker(id, true)?;
        Ok(id)
    }

    fn spawn_worker(self: &Arc<Self>, id: WorkerId, announce: bool) -> EngineResult<()> {
        let ctx = Arc::clone(self);
        let handle = thread::Builder::new()
            .name(format!("stream-worker-{id}"))
            .spawn(move || crate::worker::run(ctx, id, announce))
            .map_err(EngineError::SpawnFailed)?;
        self.handles.lock().push(handle);
        Ok(())
    }

    /// Enqueue a pending sub-producer. If the work queue is full, fork a worker (announced) to
    /// start draining it first — without this, every worker could block on a full queue with
    /// nothing left to drain it under right-biased `alt` composition.
    pub(crate) fn enqueue_work(self: &Arc<Self>, item: BoxStream<T>) -> EngineResult<()> {
        match self.work_tx.try_send(item) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(item)) => {
                self.fork_worker_announced()?;
                self.work_tx
                    .send(item)
                    .map_err(|_| EngineError::DrainInvariant("work queue closed".into()))
            }
            Err(TrySendError::Disconnected(_)) => {
                Err(EngineError::DrainInvariant("work queue closed".into()))
            }
        }
    }

    pub(crate) fn try_peek_work_nonempty(&self) -> bool {
        !self.work_rx.is_empty()
    }

    /// Invariant C2: the region is drained only when both thread sets are empty *and* the work
    /// queue is empty. `account_create`/`account_complete` alone only speak to the thread sets —
    /// a worker can empty `running` by emitting its terminal event while a freshly enqueued item
    /// still sits un-dequeued on the work queue with nobody left to pick it up. When that happens
    /// here, the region is not actually drained: fork a worker to take the orphaned work instead
    /// of reporting drained and dropping it.
    pub(crate) fn drained_after(self: &Arc<Self>, sets_drained: bool) -> bool {
        if !sets_drained {
            return false;
        }
        if self.try_peek_work_nonempty() {
            let _ = self.fork_worker_direct();
            false
        } else {
            true
        }
    }

    /// Send one event to the output queue without blocking indefinitely on a full queue.
    ///
    /// A plain blocking `send` only observes `cancelled` *after* it returns, so a worker stuck
    /// behind a full output queue during exception teardown would never see the flag and
    /// `teardown`'s `join` would wait on it forever. This polls `cancelled` between bounded
    /// `send_timeout` attempts so a cancelled worker abandons a full queue instead of blocking.
    /// Returns `false` if cancellation was observed or the receiver disconnected, meaning the
    /// event was not delivered and the caller should stop producing further events.
    pub(crate) fn send_output(&self, event: ChildEvent<T>) -> bool {
        let mut pending = event;
        loop {
            if self.is_cancelled() {
                return false;
            }
            match self.output_tx.send_timeout(pending, self.config.poll_interval) {
                Ok(()) => return true,
                Err(SendTimeoutError::Timeout(returned)) => pending = returned,
                Err(SendTimeoutError::Disconnected(_)) => return false,
            }
        }
    }

    pub(crate) fn try_recv_output(&self) -> Result<ChildEvent<T>, TryRecvError> {
        self.output_rx.try_recv()
    }

    pub(crate) fn recv_output_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<ChildEvent<T>, crossbeam_channel::RecvTimeoutError> {
        self.output_rx.recv_timeout(timeout)
    }

    /// Set the cooperative-cancellation flag and join every live worker thread. This is the
    /// Rust realization of "kill every thread in the running set": there is no supported
    /// mechanism to asynchronously kill a `std::thread`, so workers instead poll `cancelled`
    /// at each step of a value-producing chain and exit promptly once it is observed.
    pub(crate) fn teardown(&self) {
        self.cancelled.store(true, Ordering::Release);
        let handles: Vec<_> = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_is_symmetric_under_either_arrival_order() {
        let mut done = HashSet::new();
        let mut running = HashSet::new();

        // Create arrives before Done/Stop: first records into running, not yet drained.
        assert!(!account(1, &mut done, &mut running));
        assert!(running.contains(&1));
        // Matching completion cancels it back out; both sets now empty -> drained.
        assert!(account(1, &mut running, &mut done));

        // Done/Stop arrives before its Create: first records into done, not yet drained.
        done.clear();
        running.clear();
        assert!(!account(2, &mut running, &mut done));
        assert!(done.contains(&2));
        // The belated Create cancels it back out; drained.
        assert!(account(2, &mut done, &mut running));
    }
}
