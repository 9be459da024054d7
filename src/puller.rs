//! The consumer side: a `Stream` that reads the output queue, reconstructs the downstream
//! sequence, performs thread accounting, and propagates worker exceptions.

use std::sync::Arc;

use crossbeam_channel::{RecvTimeoutError, TryRecvError};
use tracing::{debug, trace};

use crate::context::{ChildEvent, Context};
use crate::error::EngineResult;
use crate::stream::{BoxStream, ContextSlot, Step, Stream};

/// The puller bound to one parallel region's [`Context`].
pub(crate) struct Puller<T: Send + 'static> {
    ctx: Arc<Context<T>>,
}

impl<T: Send + 'static> Puller<T> {
    pub(crate) fn new(ctx: Arc<Context<T>>) -> BoxStream<T> {
        Box::new(Self { ctx })
    }
}

impl<T: Send + 'static> Stream for Puller<T> {
    type Item = T;

    fn step(self: Box<Self>, ctx_slot: &mut ContextSlot<T>) -> EngineResult<Step<T>> {
        pull_once(self.ctx, ctx_slot)
    }
}

pub(crate) fn pull_once<T: Send + 'static>(
    ctx: Arc<Context<T>>,
    ctx_slot: &mut ContextSlot<T>,
) -> EngineResult<Step<T>> {
    *ctx_slot = Some(Arc::clone(&ctx));

    loop {
        match ctx.try_recv_output() {
            Ok(event) => return dispatch(ctx, event, ctx_slot),
            Err(TryRecvError::Disconnected) => return Ok(Step::Done),
            Err(TryRecvError::Empty) => {
                // Demand-driven spawn heuristic: the output queue is empty but the work queue
                // is not, meaning the consumer is outrunning the producers. This can over-commit
                // under high initial latency; that is a known, documented limitation, not a bug.
                if ctx.try_peek_work_nonempty() {
                    debug!("output queue empty, work queue non-empty: forking a worker");
                    let _ = ctx.fork_worker_direct();
                }

                std::thread::sleep(ctx.config.backoff);

                match ctx.recv_output_timeout(ctx.config.poll_interval) {
                    Ok(event) => return dispatch(ctx, event, ctx_slot),
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => return Ok(Step::Done),
                }
            }
        }
    }
}

fn dispatch<T: Send + 'static>(
    ctx: Arc<Context<T>>,
    event: ChildEvent<T>,
    ctx_slot: &mut ContextSlot<T>,
) -> EngineResult<Step<T>> {
    match event {
        ChildEvent::Yield(value) => {
            trace!("puller: Yield");
            Ok(Step::Yield(value, Some(Puller::new(ctx))))
        }
        ChildEvent::Done(tid, value) => {
            trace!(worker = tid, "puller: Done");
            let sets_drained = ctx.account_complete(tid);
            if ctx.drained_after(sets_drained) {
                Ok(Step::Yield(value, None))
            } else {
                Ok(Step::Yield(value, Some(Puller::new(ctx))))
            }
        }
        ChildEvent::Stop(tid, None) => {
            trace!(worker = tid, "puller: Stop (no value)");
            let sets_drained = ctx.account_complete(tid);
            if ctx.drained_after(sets_drained) {
                Ok(Step::Done)
            } else {
                pull_once(ctx, ctx_slot)
            }
        }
        ChildEvent::Stop(tid, Some(exc)) => {
            debug!(worker = tid, error = %exc, "puller: Stop with exception, tearing down region");
            ctx.teardown();
            Err(exc)
        }
        ChildEvent::Create(tid) => {
            trace!(worker = tid, "puller: Create");
            let sets_drained = ctx.account_create(tid);
            // No value to report here either way; `drained_after` still forks a rescue worker
            // if a belated Create cancelled the sets empty while work is still queued.
            let _ = ctx.drained_after(sets_drained);
            pull_once(ctx, ctx_slot)
        }
    }
}
