//! The three algebraic combinators over `Stream`: `append` (monoid), `bind` (monad), and `alt`
//! (opportunistic-parallel alternative).

use std::sync::Arc;

use tracing::trace;

use crate::config::EngineConfig;
use crate::context::Context;
use crate::error::EngineResult;
use crate::puller::Puller;
use crate::stream::{BoxStream, ContextSlot, Step, Stream};

/// Sequential concatenation. Identity element is [`crate::stream::empty`].
pub struct Append<T> {
    left: BoxStream<T>,
    right: BoxStream<T>,
}

impl<T: Send + 'static> Stream for Append<T> {
    type Item = T;

    fn step(self: Box<Self>, ctx: &mut ContextSlot<T>) -> EngineResult<Step<T>> {
        let Append { left, right } = *self;
        match left.step(ctx)? {
            Step::Done => right.step(ctx),
            Step::Yield(value, None) => Ok(Step::Yield(value, Some(right))),
            Step::Yield(value, Some(tail)) => {
                Ok(Step::Yield(value, Some(append(tail, right))))
            }
        }
    }
}

/// `left` followed by `right`, in order. See [`Append`].
pub fn append<T: Send + 'static>(left: BoxStream<T>, right: BoxStream<T>) -> BoxStream<T> {
    Box::new(Append { left, right })
}

/// Sequential bind: run `source` to completion, flat-mapping each value through `f`.
///
/// Crossing this boundary clears the ambient context, so `f`'s result starts in serial
/// (non-parallel) mode regardless of what context `source` was running under. A `bind` nested
/// inside an active `alt` region therefore drops back to direct execution for its `f`
/// continuations; it does not inherit the enclosing parallelism.
pub struct Bind<T, U, F> {
    source: BoxStream<T>,
    f: Arc<F>,
    _marker: std::marker::PhantomData<fn() -> U>,
}

impl<T, U, F> Stream for Bind<T, U, F>
where
    T: Send + 'static,
    U: Send + 'static,
    F: Fn(T) -> BoxStream<U> + Send + Sync + 'static,
{
    type Item = U;

    fn step(self: Box<Self>, ctx: &mut ContextSlot<U>) -> EngineResult<Step<U>> {
        let Bind { source, f, _marker } = *self;

        // The source runs under whatever context it was built in; its own steps do not share
        // `ctx` (the slots have different item types). We drive it with a scratch slot.
        let mut source_ctx: ContextSlot<T> = None;
        match source.step(&mut source_ctx)? {
            Step::Done => {
                *ctx = None;
                Ok(Step::Done)
            }
            Step::Yield(value, None) => {
                *ctx = None;
                f(value).step(ctx)
            }
            Step::Yield(value, Some(tail)) => {
                *ctx = None;
                let rest = bind(tail, Arc::clone(&f));
                append(f(value), rest).step(ctx)
            }
        }
    }
}

/// Flat-map `source` through `f`, running each continuation in serial mode. See [`Bind`].
pub fn bind<T, U, F>(source: BoxStream<T>, f: Arc<F>) -> BoxStream<U>
where
    T: Send + 'static,
    U: Send + 'static,
    F: Fn(T) -> BoxStream<U> + Send + Sync + 'static,
{
    Box::new(Bind {
        source,
        f,
        _marker: std::marker::PhantomData,
    })
}

/// Opportunistic-parallel alternation: run `left` and `right` as independent producers, racing
/// their values into one interleaved sequence. If no [`Context`] is active, a fresh one is
/// created for this region; if one is already active (a nested `alt` inside an outer `alt`'s
/// continuation), both sides are instead enqueued onto it directly and this step yields `Done`
/// so the worker currently stepping it returns to its own dequeue loop and picks one of them up,
/// rather than spawning a second reader of the output queue.
///
/// Right-biased associativity is assumed: nested `alt(a, alt(b, c))` shares one region across
/// all three; `alt(alt(a, b), c)` does not flatten and creates two regions. This asymmetry is
/// inherent to the scheme, not a bug.
pub struct Alt<T> {
    left: BoxStream<T>,
    right: BoxStream<T>,
    config: EngineConfig,
}

impl<T: Send + 'static> Stream for Alt<T> {
    type Item = T;

    fn step(self: Box<Self>, ctx: &mut ContextSlot<T>) -> EngineResult<Step<T>> {
        let Alt {
            left,
            right,
            config,
        } = *self;

        match ctx.take() {
            Some(active) => {
                trace!("alt: reusing active context, enqueueing both sides and yielding to the dequeue loop");
                active.enqueue_work(left)?;
                active.enqueue_work(right)?;
                *ctx = Some(active);
                // This step runs inside a worker's `run_item` (the only place a `Stream` is
                // ever stepped with an already-active context). Both operands are now sitting
                // on the work queue; `Step::Done` hands control straight back to that worker's
                // own dequeue loop (worker.rs) to pick them up. Wrapping a `Puller` here instead
                // would turn this worker into a second reader of the *output* queue, which never
                // emits its own `Done`/`Stop` and so never leaves `running` — the region could
                // never drain.
                Ok(Step::Done)
            }
            None => {
                trace!("alt: no active context, opening a new parallel region");
                let region = Context::new(config);
                region.enqueue_work(left)?;
                region.enqueue_work(right)?;
                region.fork_worker_direct()?;
                *ctx = Some(Arc::clone(&region));
                Puller::<T>::new(region).step(ctx)
            }
        }
    }
}

/// Opportunistic-parallel alternation of `left` and `right`. See [`Alt`].
pub fn alt<T: Send + 'static>(left: BoxStream<T>, right: BoxStream<T>) -> BoxStream<T> {
    Box::new(Alt {
        left,
        right,
        config: EngineConfig::default(),
    })
}

/// As [`alt`], but with an explicit [`EngineConfig`] for the region created when none is active.
pub fn alt_with_config<T: Send + 'static>(
    left: BoxStream<T>,
    right: BoxStream<T>,
    config: EngineConfig,
) -> BoxStream<T> {
    Box::new(Alt {
        left,
        right,
        config,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineResult;
    use crate::pull;
    use crate::stream::{empty, single};

    #[test]
    fn append_concatenates_in_order() {
        let values: Vec<_> = pull(append(Box::new(single(1)), Box::new(single(2))))
            .collect::<EngineResult<_>>()
            .unwrap();
        assert_eq!(values, vec![1, 2]);
    }

    #[test]
    fn append_with_empty_is_identity() {
        let left: Vec<_> = pull(append(Box::new(empty::<i32>()), Box::new(single(5))))
            .collect::<EngineResult<_>>()
            .unwrap();
        assert_eq!(left, vec![5]);

        let right: Vec<_> = pull(append(Box::new(single(5)), Box::new(empty::<i32>())))
            .collect::<EngineResult<_>>()
            .unwrap();
        assert_eq!(right, vec![5]);
    }

    #[test]
    fn bind_flat_maps_each_value() {
        let f = Arc::new(|v: i32| -> BoxStream<i32> {
            Box::new(Append {
                left: Box::new(single(v)),
                right: Box::new(single(v * 10)),
            })
        });
        let source: BoxStream<i32> =
            Box::new(Append {
                left: Box::new(single(1)),
                right: Box::new(single(2)),
            });
        let values: Vec<_> = pull(bind(source, f)).collect::<EngineResult<_>>().unwrap();
        assert_eq!(values, vec![1, 10, 2, 20]);
    }

    #[test]
    fn alt_yields_all_values_from_both_sides() {
        let mut values: Vec<_> = pull(alt(Box::new(single(1)), Box::new(single(2))))
            .collect::<EngineResult<_>>()
            .unwrap();
        values.sort_unstable();
        assert_eq!(values, vec![1, 2]);
    }
}
