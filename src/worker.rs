//! The push side: an OS thread that drains the work queue and emits events to the output
//! queue, forking peers on demand.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::context::{ChildEvent, Context, WorkerId};
use crate::error::EngineError;
use crate::stream::{BoxStream, ContextSlot, Step};

/// Outcome of running one dequeued item to its natural conclusion.
enum ItemOutcome {
    /// The item bottomed out in a bare `Step::Done` with no preceding yield (an immediately
    /// empty producer, or a tail that turned out to be empty). The worker goes back to step 1
    /// and tries to dequeue another item without emitting an event for this one.
    Continue,
    /// The worker emitted its terminal event (`Done` or `Stop`) for this item and the thread is
    /// exiting.
    Exit,
}

/// Entry point run on the spawned thread. `announce` distinguishes the two fork paths from
/// `Context`: when true, this worker's first action is to emit `Create(id)` so the event's
/// position in the output queue orders it before this worker's own subsequent output; when
/// false, the caller already inserted `id` into the running set before spawning.
pub(crate) fn run<T: Send + 'static>(ctx: Arc<Context<T>>, id: WorkerId, announce: bool) {
    if announce && !ctx.send_output(ChildEvent::Create(id)) {
        return;
    }

    loop {
        // Step 1: dequeue one Stream. Non-blocking — an empty queue ends this worker, it does
        // not wait around for more work to arrive.
        let item = match ctx.work_rx.try_recv() {
            Ok(item) => item,
            Err(_) => {
                let _ = ctx.send_output(ChildEvent::Stop(id, None));
                return;
            }
        };

        match run_item(&ctx, id, item) {
            ItemOutcome::Continue => continue,
            ItemOutcome::Exit => return,
        }
    }
}

/// Step 2: run one dequeued Stream with the stop continuation being "go back to step 1" and the
/// yield continuation emitting `Yield` for every value but the last, and `Done` for the last.
fn run_item<T: Send + 'static>(
    ctx: &Arc<Context<T>>,
    id: WorkerId,
    mut current: BoxStream<T>,
) -> ItemOutcome {
    loop {
        let mut slot: ContextSlot<T> = Some(Arc::clone(ctx));
        let stepped = catch_unwind(AssertUnwindSafe(|| current.step(&mut slot)));

        match stepped {
            Err(panic) => {
                let _ = ctx.send_output(ChildEvent::Stop(id, Some(EngineError::from_panic(panic))));
                return ItemOutcome::Exit;
            }
            Ok(Err(exc)) => {
                let _ = ctx.send_output(ChildEvent::Stop(id, Some(exc)));
                return ItemOutcome::Exit;
            }
            Ok(Ok(Step::Done)) => return ItemOutcome::Continue,
            Ok(Ok(Step::Yield(value, None))) => {
                let _ = ctx.send_output(ChildEvent::Done(id, value));
                return ItemOutcome::Exit;
            }
            Ok(Ok(Step::Yield(value, Some(tail)))) => {
                if !ctx.send_output(ChildEvent::Yield(value)) {
                    return ItemOutcome::Exit;
                }
                if ctx.is_cancelled() {
                    return ItemOutcome::Exit;
                }
                current = tail;
            }
        }
    }
}
