//! The `Stream` abstraction: a lazy, possibly-infinite producer of values under a
//! per-parallel-region [`Context`](crate::context::Context).
//!
//! A continuation-passing step collapses into a single returned [`Step`]: re-continuation
//! becomes ordinary control flow over the boxed tail instead of a pair of callbacks.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::context::Context;
use crate::error::EngineResult;

/// Per-pull ambient context handle. `None` outside any parallel region, or immediately after
/// crossing a [`crate::combinators::bind`] boundary, which always resets it.
pub type ContextSlot<T> = Option<Arc<Context<T>>>;

/// A boxed, type-erased [`Stream`] of `T`.
pub type BoxStream<T> = Box<dyn Stream<Item = T>>;

/// One step of a lazy sequence.
pub enum Step<T> {
    /// No more values. Corresponds to invoking the *stop* continuation.
    Done,
    /// A value, plus an optional thunk for the rest. `None` means this was genuinely the last
    /// value — collapsing this to `Some(empty())` would be observably correct but gives up
    /// worker-exit-on-completion (see the worker push loop) and fold performance.
    Yield(T, Option<BoxStream<T>>),
}

/// A producer of a lazy sequence of `Item` values, driven one step at a time.
///
/// `step` consumes `self` because each `Stream` value represents the *remaining* work; what
/// comes after is returned as the tail inside [`Step::Yield`], not retained on `self`.
pub trait Stream: Send {
    type Item: Send + 'static;

    fn step(self: Box<Self>, ctx: &mut ContextSlot<Self::Item>) -> EngineResult<Step<Self::Item>>;
}

/// The zero-element stream. Identity of [`crate::combinators::append`].
pub struct Empty<T>(PhantomData<fn() -> T>);

impl<T: Send + 'static> Stream for Empty<T> {
    type Item = T;

    fn step(self: Box<Self>, _ctx: &mut ContextSlot<T>) -> EngineResult<Step<T>> {
        Ok(Step::Done)
    }
}

/// A single-element stream.
pub struct Single<T>(T);

impl<T: Send + 'static> Stream for Single<T> {
    type Item = T;

    fn step(self: Box<Self>, _ctx: &mut ContextSlot<T>) -> EngineResult<Step<T>> {
        Ok(Step::Yield(self.0, None))
    }
}

/// Runs one effect and yields its result. The ambient effect capability collapses here to a
/// plain `FnOnce` returning a [`EngineResult`]: blocking I/O and throwing are just what the
/// closure does; thread spawn and exception delivery are the engine's concern, not the lifted
/// effect's.
pub struct Lift<T, F> {
    effect: F,
    _marker: PhantomData<fn() -> T>,
}

impl<T, F> Stream for Lift<T, F>
where
    T: Send + 'static,
    F: FnOnce() -> EngineResult<T> + Send + 'static,
{
    type Item = T;

    fn step(self: Box<Self>, _ctx: &mut ContextSlot<T>) -> EngineResult<Step<T>> {
        let value = (self.effect)()?;
        Ok(Step::Yield(value, None))
    }
}

/// Zero-element stream. See [`Empty`].
pub fn empty<T: Send + 'static>() -> Empty<T> {
    Empty(PhantomData)
}

/// One-element stream. See [`Single`].
pub fn single<T: Send + 'static>(value: T) -> Single<T> {
    Single(value)
}

/// Run one effect and yield its result. See [`Lift`].
pub fn lift<T, F>(effect: F) -> Lift<T, F>
where
    T: Send + 'static,
    F: FnOnce() -> EngineResult<T> + Send + 'static,
{
    Lift {
        effect,
        _marker: PhantomData,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pull;

    #[test]
    fn empty_yields_nothing() {
        let values: Vec<_> = pull(empty::<i32>()).collect::<EngineResult<_>>().unwrap();
        assert_eq!(values, Vec::<i32>::new());
    }

    #[test]
    fn single_yields_one_value() {
        let values: Vec<_> = pull(single(7)).collect::<EngineResult<_>>().unwrap();
        assert_eq!(values, vec![7]);
    }

    #[test]
    fn lift_runs_the_effect_exactly_once() {
        let values: Vec<_> = pull(lift(|| Ok(42))).collect::<EngineResult<_>>().unwrap();
        assert_eq!(values, vec![42]);
    }
}
