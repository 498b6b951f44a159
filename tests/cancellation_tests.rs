use std::cell::RefCell;
use std::rc::Rc;

use lazymat_core::config::EngineConfig;
use lazymat_core::leaf::from_vec;
use lazymat_core::materializer::{ListMaterializer, Status};
use lazymat_core::{Error, Result};
use lazymat_exec::Runtime;
use lazymat_operators::{concat, flat_map, from_iter, map, sliding};

fn rt() -> Runtime {
    Runtime::new(EngineConfig::default()).unwrap()
}

type Slot<T> = Rc<RefCell<Option<Result<T>>>>;

fn slot<T: 'static>() -> (Slot<T>, Box<dyn FnOnce(Result<T>)>) {
    let slot: Slot<T> = Rc::new(RefCell::new(None));
    let sink = Rc::clone(&slot);
    (slot, Box::new(move |outcome| *sink.borrow_mut() = Some(outcome)))
}

#[test]
fn test_cancel_fails_pending_waiters_with_the_cause() {
    let rt = rt();
    let ctx = rt.context();
    let source = from_iter(ctx, 0..10);
    let list = map(ctx, source.clone(), |e: i32| e + 1);
    let (size, size_cb) = slot::<usize>();
    let (all, all_cb) = slot::<Rc<Vec<i32>>>();
    list.materialize_size(size_cb);
    list.materialize_elements(all_cb);
    assert!(size.borrow().is_none());

    let cause = rt.cancel(&list, "user abort");
    assert_eq!(cause, Error::cancelled("user abort"));
    assert_eq!(*size.borrow(), Some(Err(cause.clone())));
    assert_eq!(*all.borrow(), Some(Err(cause.clone())));
    assert_eq!(list.status(), Status::Cancelled);
    assert_eq!(source.status(), Status::Cancelled);
    assert!(list.is_cancelled());
}

#[test]
fn test_first_cancel_cause_wins() {
    let rt = rt();
    let ctx = rt.context();
    let list = concat(ctx, from_iter(ctx, 0..3), from_iter(ctx, 3..6));
    let first = rt.cancel(&list, "first");
    let second = rt.cancel(&list, "second");
    assert_eq!(second, first);
    let err = rt.element(&list, 0).unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(err.core(), Some(&Error::cancelled("first")));
}

#[test]
fn test_cancellation_overrides_late_answers() {
    let rt = rt();
    let ctx = rt.context();
    let list = flat_map(ctx, from_iter(ctx, 0..5), |n: i32| from_vec(vec![n]));
    let (element, element_cb) = slot::<lazymat_core::callback::Indexed<i32>>();
    list.materialize_element(3, element_cb);
    ctx.token().cancel("deadline");
    rt.run_until_idle();
    assert_eq!(
        *element.borrow(),
        Some(Err(Error::cancelled("deadline")))
    );
    assert!(rt.size(&list).unwrap_err().is_cancelled());
}

#[test]
fn test_cancel_after_success_keeps_the_snapshot() {
    let rt = rt();
    let ctx = rt.context();
    let list = sliding(ctx, from_vec(vec![1, 2, 3]), 2, 1);
    let before = rt.elements(&list).unwrap();
    assert_eq!(list.status(), Status::Succeeded);
    rt.cancel(&list, "too late");
    assert_eq!(list.status(), Status::Succeeded);
    assert_eq!(rt.elements(&list).unwrap(), before);
}
