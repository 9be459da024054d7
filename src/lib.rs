//! A composable concurrent list transformer: a lazily-stepped [`Stream`] with three algebraic
//! combinators — [`append`], [`bind`], and [`alt`] — the last of which runs its two arguments as
//! independent producers racing their values into one interleaved output.
//!
//! `alt` opens a bounded-capacity parallel region backed by OS threads on first use and tears it
//! down once drained or once an error surfaces from any participant. Everything outside an `alt`
//! runs directly on the calling thread; there is no implicit parallelism.

#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod combinators;
mod config;
mod context;
mod error;
mod observability;
mod puller;
mod stream;
mod worker;

pub use combinators::{alt, alt_with_config, append, bind};
pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use observability::init_tracing;
pub use stream::{empty, lift, single, BoxStream, ContextSlot, Step, Stream};

/// Drive a [`Stream`] to completion on the calling thread, yielding each value in order.
///
/// This is the only supported entry point for consuming a `Stream`: there is no way to observe
/// a `Step` without going through a [`ContextSlot`], and `Pull` owns the one outside any `alt`.
pub fn pull<S>(stream: S) -> Pull<S::Item>
where
    S: Stream + 'static,
{
    Pull {
        current: Some(Box::new(stream)),
        ctx: None,
        done: false,
    }
}

/// Iterator returned by [`pull`]. Yields `Ok(value)` for each produced value and stops (after
/// yielding one final `Err`) the first time any participant in an active region reports an
/// exception.
pub struct Pull<T> {
    current: Option<BoxStream<T>>,
    ctx: ContextSlot<T>,
    done: bool,
}

impl<T: Send + 'static> Iterator for Pull<T> {
    type Item = EngineResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let current = self.current.take()?;
        match current.step(&mut self.ctx) {
            Ok(Step::Done) => {
                self.done = true;
                None
            }
            Ok(Step::Yield(value, tail)) => {
                self.current = tail;
                if self.current.is_none() {
                    self.done = true;
                }
                Some(Ok(value))
            }
            Err(exc) => {
                self.done = true;
                Some(Err(exc))
            }
        }
    }
}
