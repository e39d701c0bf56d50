//! Unit tests for the Thenable capability

use core_types::{Completion, SettleFn, Thenable, Value};
use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

struct Ready(Value);

impl Thenable for Ready {
    fn subscribe(&self, on_fulfilled: SettleFn, _on_rejected: SettleFn) -> Completion<()> {
        on_fulfilled(self.0.clone());
        Ok(())
    }

    fn into_any(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}

#[test]
fn thenable_values_expose_capability() {
    let value = Value::Thenable(Rc::new(Ready(Value::Smi(1))));
    assert!(value.as_thenable().is_some());
    assert!(Value::Smi(1).as_thenable().is_none());
}

#[test]
fn thenable_subscribe_delivers_outcome() {
    let seen = Rc::new(RefCell::new(None));
    let sink = seen.clone();
    let thenable = Ready(Value::from("done"));
    thenable
        .subscribe(
            Box::new(move |v| *sink.borrow_mut() = Some(v)),
            Box::new(|_| panic!("not rejected")),
        )
        .unwrap();
    assert_eq!(*seen.borrow(), Some(Value::from("done")));
}

#[test]
fn thenables_compare_by_identity() {
    let shared: Rc<dyn Thenable> = Rc::new(Ready(Value::Smi(1)));
    let a = Value::Thenable(shared.clone());
    let b = Value::Thenable(shared);
    let c = Value::Thenable(Rc::new(Ready(Value::Smi(1))));
    assert_eq!(a, b);
    assert_ne!(a, c);
}

#[test]
fn into_any_downcasts_to_concrete_type() {
    let shared: Rc<dyn Thenable> = Rc::new(Ready(Value::Smi(5)));
    let any = shared.into_any();
    let ready = any.downcast::<Ready>().ok().unwrap();
    assert_eq!(ready.0, Value::Smi(5));
}
