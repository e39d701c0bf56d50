//! End-to-end combinator scenarios driven by timers

use async_runtime::{all_settled, any, join_all, race, Promise, PromiseState, SettledOutcome};
use core_types::{ErrorKind, Value};
use integration_tests::Harness;

/// Promise settled by a timer after `delay` milliseconds.
fn after(h: &Harness, delay: u64, outcome: Result<Value, Value>) -> Promise {
    let deferred = h.event_loop.create_deferred();
    let resolver = deferred.resolver.clone();
    h.event_loop.set_timeout(delay, move || {
        match outcome {
            Ok(value) => resolver.resolve(value),
            Err(reason) => resolver.reject(reason),
        }
        Ok(())
    });
    deferred.promise
}

#[test]
fn join_all_rejects_as_soon_as_one_input_rejects() {
    let h = Harness::new();
    let a = after(&h, 100, Ok(Value::from("A")));
    let b = after(&h, 10, Err(Value::from("B failed")));
    let c = after(&h, 200, Ok(Value::from("C")));

    let all = join_all(&h.event_loop, vec![a, b, c.clone()]);
    let _ = all.catch(|r| Ok(r));

    assert_eq!(
        h.event_loop.run_until_settled(&all).unwrap(),
        PromiseState::Rejected(Value::from("B failed"))
    );
    assert_eq!(h.event_loop.now(), 10);

    // The other inputs keep running; their results are discarded.
    h.event_loop.run_until_idle().unwrap();
    assert_eq!(c.state(), PromiseState::Fulfilled(Value::from("C")));
    assert_eq!(all.state(), PromiseState::Rejected(Value::from("B failed")));
}

#[test]
fn all_settled_mixed_outcomes_in_input_order() {
    let h = Harness::new();
    let a = after(&h, 20, Ok(Value::Smi(1)));
    let b = after(&h, 10, Err(Value::from("e")));

    let settled = all_settled(&h.event_loop, vec![a, b]);
    let state = h.event_loop.run_until_settled(&settled).unwrap();
    assert_eq!(
        state,
        PromiseState::Fulfilled(Value::Array(vec![
            Value::object([("status", Value::from("fulfilled")), ("value", Value::Smi(1))]),
            Value::object([("status", Value::from("rejected")), ("reason", Value::from("e"))]),
        ]))
    );

    let PromiseState::Fulfilled(Value::Array(records)) = state else {
        unreachable!();
    };
    assert_eq!(
        SettledOutcome::from_value(&records[1]),
        Some(SettledOutcome::Rejected(Value::from("e")))
    );
    assert!(h.sink.unhandled_rejections().is_empty());
}

#[test]
fn race_takes_the_strictly_earlier_outcome() {
    let h = Harness::new();
    let a = after(&h, 5, Err(Value::from("A")));
    let b = after(&h, 6, Ok(Value::from("B")));

    let winner = race(&h.event_loop, vec![a, b]);
    let _ = winner.catch(|r| Ok(r));
    h.event_loop.run_until_idle().unwrap();
    assert_eq!(winner.state(), PromiseState::Rejected(Value::from("A")));
}

#[test]
fn race_tie_within_one_task_goes_to_first_settled() {
    let h = Harness::new();
    let a = h.event_loop.create_deferred();
    let b = h.event_loop.create_deferred();
    let winner = race(&h.event_loop, vec![a.promise.clone(), b.promise.clone()]);

    let (ra, rb) = (a.resolver.clone(), b.resolver.clone());
    h.event_loop.set_timeout(1, move || {
        rb.resolve(Value::from("b"));
        ra.resolve(Value::from("a"));
        Ok(())
    });
    h.event_loop.run_until_idle().unwrap();
    assert_eq!(winner.state(), PromiseState::Fulfilled(Value::from("b")));
}

#[test]
fn any_waits_past_rejections() {
    let h = Harness::new();
    let first = any(
        &h.event_loop,
        vec![
            after(&h, 1, Err(Value::from("x"))),
            after(&h, 3, Ok(Value::from("slow but fine"))),
            after(&h, 2, Err(Value::from("y"))),
        ],
    );
    assert_eq!(
        h.event_loop.run_until_settled(&first).unwrap(),
        PromiseState::Fulfilled(Value::from("slow but fine"))
    );
}

#[test]
fn any_of_all_rejections_is_aggregate_in_input_order() {
    let h = Harness::new();
    let first = any(
        &h.event_loop,
        vec![
            after(&h, 30, Err(Value::from("first input"))),
            after(&h, 10, Err(Value::from("second input"))),
        ],
    );
    let _ = first.catch(|r| Ok(r));

    let state = h.event_loop.run_until_settled(&first).unwrap();
    let PromiseState::Rejected(Value::Error(err)) = state else {
        panic!("expected aggregate rejection, got {:?}", state);
    };
    assert_eq!(err.kind, ErrorKind::AggregateError);
    assert_eq!(
        err.errors,
        vec![Value::from("first input"), Value::from("second input")]
    );
}

#[test]
fn empty_inputs() {
    let h = Harness::new();
    let all = join_all(&h.event_loop, Vec::<Value>::new());
    let settled = all_settled(&h.event_loop, Vec::<Value>::new());
    let never = race(&h.event_loop, Vec::<Value>::new());
    let none = any(&h.event_loop, Vec::<Value>::new());

    // Immediate: no turn of the loop needed.
    assert_eq!(all.state(), PromiseState::Fulfilled(Value::Array(vec![])));
    assert_eq!(settled.state(), PromiseState::Fulfilled(Value::Array(vec![])));
    assert!(none.state().is_rejected());

    h.event_loop.run_until_idle().unwrap();
    assert!(never.is_pending());
    // Nobody handled the empty aggregate.
    assert_eq!(h.sink.unhandled_rejections().len(), 1);
}

#[test]
fn combinators_compose() {
    let h = Harness::new();
    let pairs = join_all(
        &h.event_loop,
        vec![
            race(
                &h.event_loop,
                vec![after(&h, 4, Ok(Value::Smi(1))), after(&h, 8, Ok(Value::Smi(2)))],
            ),
            any(
                &h.event_loop,
                vec![after(&h, 1, Err(Value::Null)), after(&h, 2, Ok(Value::Smi(3)))],
            ),
        ],
    );
    assert_eq!(
        h.event_loop.run_until_settled(&pairs).unwrap(),
        PromiseState::Fulfilled(Value::Array(vec![Value::Smi(1), Value::Smi(3)]))
    );
}
