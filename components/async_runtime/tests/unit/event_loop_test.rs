//! Unit tests for EventLoop

use async_runtime::{
    CollectingSink, ErrorReport, EventLoop, MicroTask, RuntimeConfig, RuntimeError, Task,
    VirtualClock,
};
use core_types::{ErrorKind, Value};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

type Log = Rc<RefCell<Vec<&'static str>>>;

fn push(log: &Log, entry: &'static str) -> impl FnOnce() -> core_types::Completion<()> {
    let log = log.clone();
    move || {
        log.borrow_mut().push(entry);
        Ok(())
    }
}

#[test]
fn new_event_loop_has_empty_task_queue() {
    let event_loop = EventLoop::new();
    assert!(event_loop.is_task_queue_empty());
}

#[test]
fn new_event_loop_has_empty_microtask_queue() {
    let event_loop = EventLoop::new();
    assert!(event_loop.is_microtask_queue_empty());
    assert!(!event_loop.has_pending_work());
}

#[test]
fn schedule_macrotask_adds_to_task_queue() {
    let event_loop = EventLoop::new();
    event_loop.schedule_macrotask(Task::new(|| Ok(())), 0);
    assert_eq!(event_loop.pending_macrotasks(), 1);
    assert_eq!(event_loop.next_due(), Some(0));
}

#[test]
fn enqueue_microtask_adds_to_microtask_queue() {
    let event_loop = EventLoop::new();
    event_loop.enqueue_microtask(MicroTask::new(|| Ok(())));
    assert!(!event_loop.is_microtask_queue_empty());
}

#[test]
fn tasks_with_equal_due_time_run_fifo() {
    let event_loop = EventLoop::new();
    let log = Log::default();
    event_loop.schedule_macrotask(Task::new(push(&log, "first")), 5);
    event_loop.schedule_macrotask(Task::new(push(&log, "second")), 5);
    event_loop.run_until_idle().unwrap();
    assert_eq!(*log.borrow(), vec!["first", "second"]);
}

#[test]
fn earlier_due_time_runs_first() {
    let event_loop = EventLoop::new();
    let log = Log::default();
    event_loop.schedule_macrotask(Task::new(push(&log, "late")), 20);
    event_loop.schedule_macrotask(Task::new(push(&log, "early")), 10);
    event_loop.run_until_idle().unwrap();
    assert_eq!(*log.borrow(), vec!["early", "late"]);
    assert_eq!(event_loop.now(), 20);
}

#[test]
fn microtask_queue_fifo_order() {
    let event_loop = EventLoop::new();
    let log = Log::default();
    event_loop.enqueue_microtask(MicroTask::new(push(&log, "a")));
    event_loop.enqueue_microtask(MicroTask::new(push(&log, "b")));
    assert_eq!(event_loop.drain_microtasks().unwrap(), 2);
    assert_eq!(*log.borrow(), vec!["a", "b"]);
}

#[test]
fn microtasks_enqueued_by_a_task_run_before_the_next_task() {
    let event_loop = EventLoop::new();
    let log = Log::default();

    let inner_loop = event_loop.clone();
    let inner_log = log.clone();
    event_loop.schedule_macrotask(
        Task::new(move || {
            inner_log.borrow_mut().push("task 1");
            inner_loop.enqueue_microtask(MicroTask::new(push(&inner_log, "microtask")));
            Ok(())
        }),
        0,
    );
    event_loop.schedule_macrotask(Task::new(push(&log, "task 2")), 0);

    event_loop.run_until_idle().unwrap();
    assert_eq!(*log.borrow(), vec!["task 1", "microtask", "task 2"]);
}

#[test]
fn run_once_reports_the_turn() {
    let event_loop = EventLoop::new();
    event_loop.enqueue_microtask(MicroTask::new(|| Ok(())));
    event_loop.schedule_macrotask(Task::new(|| Ok(())), 3);

    let turn = event_loop.run_once().unwrap();
    assert_eq!(turn.microtasks_run, 1);
    assert!(turn.macrotask.is_some());
    assert!(turn.clock_advanced);

    let idle = event_loop.run_once().unwrap();
    assert_eq!(idle.macrotask, None);
    assert_eq!(idle.microtasks_run, 0);
}

#[test]
fn shared_virtual_clock_controls_time() {
    let clock = Rc::new(VirtualClock::starting_at(100));
    let event_loop = EventLoop::builder().clock(clock.clone()).build();
    event_loop.schedule_macrotask(Task::new(|| Ok(())), 50);
    assert_eq!(event_loop.next_due(), Some(150));

    clock.advance_by(60);
    let turn = event_loop.run_once().unwrap();
    assert!(!turn.clock_advanced);
    assert_eq!(event_loop.now(), 160);
}

#[test]
fn failing_task_does_not_stop_the_loop() {
    let sink = CollectingSink::new();
    let event_loop = EventLoop::builder().sink(sink.clone()).build();
    let log = Log::default();
    event_loop.schedule_macrotask(Task::named("broken", || Err(Value::from("nope"))), 0);
    event_loop.schedule_macrotask(Task::new(push(&log, "after")), 0);

    let stats = event_loop.run_until_idle().unwrap();
    assert_eq!(*log.borrow(), vec!["after"]);
    assert_eq!(stats.job_errors, 1);
    assert!(matches!(
        sink.reports().as_slice(),
        [ErrorReport::JobError { name: Some(name), error, .. }]
            if name == "broken" && *error == Value::from("nope")
    ));
}

#[test]
fn panicking_microtask_is_reported_as_internal_error() {
    let sink = CollectingSink::new();
    let event_loop = EventLoop::builder().sink(sink.clone()).build();
    event_loop.enqueue_microtask(MicroTask::new(|| panic!("exploded")));
    event_loop.run_until_idle().unwrap();

    let errors = sink.job_errors();
    assert_eq!(errors.len(), 1);
    let err = errors[0].as_error().unwrap();
    assert_eq!(err.kind, ErrorKind::InternalError);
    assert!(err.message.contains("exploded"));
}

#[test]
fn cancel_prevents_task_from_running() {
    let event_loop = EventLoop::new();
    let ran = Rc::new(Cell::new(false));
    let r = ran.clone();
    let handle = event_loop.set_timeout(10, move || {
        r.set(true);
        Ok(())
    });

    assert!(event_loop.cancel(handle));
    assert!(!event_loop.cancel(handle));
    let stats = event_loop.run_until_idle().unwrap();
    assert!(!ran.get());
    assert_eq!(stats.cancelled, 1);
}

#[test]
fn task_can_cancel_a_later_task() {
    let event_loop = EventLoop::new();
    let ran = Rc::new(Cell::new(false));
    let r = ran.clone();
    let later = event_loop.set_timeout(20, move || {
        r.set(true);
        Ok(())
    });
    let inner = event_loop.clone();
    event_loop.set_timeout(10, move || {
        inner.cancel(later);
        Ok(())
    });

    event_loop.run_until_idle().unwrap();
    assert!(!ran.get());
}

#[test]
fn interval_repeats_until_cancelled() {
    let event_loop = EventLoop::new();
    let ticks = Rc::new(Cell::new(0));
    let t = ticks.clone();
    let handle = event_loop.set_interval(5, move || {
        t.set(t.get() + 1);
        Ok(())
    });

    while ticks.get() < 3 {
        event_loop.run_once().unwrap();
    }
    assert_eq!(event_loop.now(), 15);
    assert!(event_loop.cancel(handle));
    event_loop.run_until_idle().unwrap();
    assert_eq!(ticks.get(), 3);
}

#[test]
fn run_from_inside_a_job_is_rejected() {
    let event_loop = EventLoop::new();
    let observed = Rc::new(RefCell::new(None));
    let inner = event_loop.clone();
    let o = observed.clone();
    event_loop.enqueue_microtask(MicroTask::new(move || {
        *o.borrow_mut() = Some(inner.run_until_idle().is_err());
        Ok(())
    }));
    event_loop.run_until_idle().unwrap();
    assert_eq!(*observed.borrow(), Some(true));
}

#[test]
fn microtask_budget_aborts_runaway_drain() {
    let event_loop = EventLoop::builder()
        .config(RuntimeConfig::default().with_microtask_budget(Some(10)))
        .build();

    fn forever(event_loop: EventLoop) -> MicroTask {
        MicroTask::new(move || {
            event_loop.enqueue_microtask(forever(event_loop.clone()));
            Ok(())
        })
    }
    event_loop.enqueue_microtask(forever(event_loop.clone()));

    let err = event_loop.drain_microtasks().unwrap_err();
    assert!(matches!(err, RuntimeError::MicrotaskBudgetExhausted { budget: 10 }));
    assert!(!event_loop.is_microtask_queue_empty());
}

#[test]
fn shutdown_discards_and_refuses_work() {
    let event_loop = EventLoop::new();
    event_loop.schedule_macrotask(Task::new(|| Ok(())), 0);
    event_loop.enqueue_microtask(MicroTask::new(|| Ok(())));

    event_loop.shutdown();
    assert!(event_loop.is_shut_down());
    assert!(!event_loop.has_pending_work());

    event_loop.enqueue_microtask(MicroTask::new(|| Ok(())));
    event_loop.schedule_macrotask(Task::new(|| Ok(())), 0);
    assert!(!event_loop.has_pending_work());
    assert_eq!(event_loop.stats().discarded, 2);
}
