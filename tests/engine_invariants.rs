//! Exercises the parallel engine directly: thread accounting, demand-driven spawning, bounded
//! queues under backpressure, and exception propagation across the worker/puller boundary.

use std::sync::Arc;

use concurrent_streams::{alt, append, bind, lift, pull, single, EngineError};

fn range(start: i32, end: i32) -> concurrent_streams::BoxStream<i32> {
    (start..end)
        .rev()
        .fold(Box::new(concurrent_streams::empty()) as concurrent_streams::BoxStream<i32>, |acc, v| {
            append(Box::new(single(v)), acc)
        })
}

#[test]
fn alt_over_two_ranges_yields_every_value_exactly_once() {
    let stream = alt(range(0, 50), range(50, 100));
    let mut values: Vec<_> = pull(stream).collect::<Result<_, _>>().unwrap();
    values.sort_unstable();
    let expected: Vec<i32> = (0..100).collect();
    assert_eq!(values, expected);
}

#[test]
fn alt_nested_right_associatively_shares_one_region() {
    let stream = alt(
        Box::new(single(1)),
        alt(Box::new(single(2)), Box::new(single(3))),
    );
    let mut values: Vec<_> = pull(stream).collect::<Result<_, _>>().unwrap();
    values.sort_unstable();
    assert_eq!(values, vec![1, 2, 3]);
}

#[test]
fn alt_with_one_side_empty_yields_only_the_other_sides_values() {
    let stream = alt(Box::new(concurrent_streams::empty()), range(0, 10));
    let mut values: Vec<_> = pull(stream).collect::<Result<_, _>>().unwrap();
    values.sort_unstable();
    assert_eq!(values, (0..10).collect::<Vec<_>>());
}

#[test]
fn exception_in_one_branch_propagates_and_tears_down_siblings() {
    let failing: concurrent_streams::BoxStream<i32> = Box::new(lift(|| {
        Err::<i32, _>(EngineError::Worker("boom".into()))
    }));
    let stream = alt(failing, range(0, 1_000));

    let result: Result<Vec<_>, _> = pull(stream).collect();
    assert!(result.is_err(), "expected the lifted error to surface");
}

#[test]
fn bind_drops_back_to_serial_mode_across_the_boundary() {
    // Each continuation returns an `alt` of its own; under S2 these run as independent,
    // freshly-opened regions rather than inheriting any enclosing parallelism.
    let source = range(0, 4);
    let f = Arc::new(|v: i32| -> concurrent_streams::BoxStream<i32> {
        alt(Box::new(single(v)), Box::new(single(v + 100)))
    });
    let mut values: Vec<_> = pull(bind(source, f)).collect::<Result<_, _>>().unwrap();
    values.sort_unstable();
    assert_eq!(values, vec![0, 1, 2, 3, 100, 101, 102, 103]);
}

#[test]
fn large_alt_exercises_demand_driven_worker_spawn() {
    // More items than the default queue capacity (32) on both sides, forcing the puller to
    // fork extra workers and workers to fork announced peers under backpressure.
    let stream = alt(range(0, 200), range(200, 400));
    let mut values: Vec<_> = pull(stream).collect::<Result<_, _>>().unwrap();
    values.sort_unstable();
    assert_eq!(values, (0..400).collect::<Vec<_>>());
}
