use std::cell::{Cell, RefCell};
use std::rc::Rc;

use lazymat_core::callback::{IndexedCallback, IndexedPredicate, ValueCallback};
use lazymat_core::config::EngineConfig;
use lazymat_core::context::Context;
use lazymat_core::leaf::{failed, from_vec, single};
use lazymat_core::materializer::{ListMaterializer, Materializer, Status};
use lazymat_core::state::StatefulMaterializer;
use lazymat_core::weight::Weight;
use lazymat_core::{Error, Result};
use lazymat_exec::Runtime;
use lazymat_operators::{concat, filter, from_iter, insert, map, remove, remove_first_where, slice};

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
fn test_operator_settles_into_snapshot_after_full_read() {
    let rt = rt();
    let ctx = rt.context();
    let list = filter(ctx, from_iter(ctx, 0..6), |e: &i32| e % 2 == 0);
    assert_eq!(list.status(), Status::Running);
    assert_eq!(rt.elements(&list).unwrap(), vec![0, 2, 4]);
    assert_eq!(list.status(), Status::Succeeded);
    assert_eq!(list.known_size(), Some(3));
    assert!(list.is_done());
}

#[test]
fn test_concurrent_full_reads_share_one_snapshot() {
    let rt = rt();
    let ctx = rt.context();
    let list = concat(ctx, from_iter(ctx, vec![1, 2]), from_vec(vec![3]));
    let (first, first_cb) = slot::<Rc<Vec<i32>>>();
    let (second, second_cb) = slot::<Rc<Vec<i32>>>();
    list.materialize_elements(first_cb);
    list.materialize_elements(second_cb);
    assert!(first.borrow().is_none());
    rt.run_until_idle();
    let first = first.borrow_mut().take().unwrap().unwrap();
    let second = second.borrow_mut().take().unwrap().unwrap();
    assert_eq!(*first, vec![1, 2, 3]);
    assert!(Rc::ptr_eq(&first, &second));
}

#[test]
fn test_zero_effect_edit_becomes_the_upstream() {
    let rt = rt();
    let ctx = rt.context();
    let upstream = from_iter(ctx, vec![1, 2]);
    let list = remove(ctx, upstream.clone(), 5, 9);
    assert_eq!(rt.size(&list).unwrap(), 2);
    assert_eq!(list.known_size(), upstream.known_size());
    assert_eq!(list.status(), upstream.status());

    let unchanged = insert(ctx, from_vec(vec![1]), 0, from_vec(Vec::new()));
    assert_eq!(unchanged.known_size(), Some(1));
    assert_eq!(unchanged.status(), Status::Succeeded);
}

#[test]
fn test_known_size_never_regresses() {
    let rt = rt();
    let ctx = rt.context();
    let list = map(ctx, from_iter(ctx, 0..4), |e: i32| e + 1);
    assert_eq!(list.known_size(), None);
    assert_eq!(rt.element(&list, 1).unwrap(), Some(2));
    assert_eq!(list.known_size(), None);
    assert_eq!(rt.size(&list).unwrap(), 4);
    assert_eq!(list.known_size(), Some(4));
    assert_eq!(rt.element(&list, 3).unwrap(), Some(4));
    assert_eq!(list.known_size(), Some(4));
}

#[test]
fn test_failed_state_replays_its_error() {
    let rt = rt();
    let list: Materializer<i32> = failed(Error::upstream("offline"));
    for _ in 0..2 {
        assert_eq!(
            rt.element(&list, 0).unwrap_err().core(),
            Some(&Error::upstream("offline"))
        );
    }
    assert!(list.is_failed());
    assert!(!list.is_cancelled());
}

#[test]
fn test_terminal_state_is_never_replaced() {
    let list: Materializer<i32> = StatefulMaterializer::build("fixed", |holder| {
        assert!(holder.materializer().is_none());
        single(1)
    });
    assert_eq!(list.status(), Status::Succeeded);
    list.materialize_cancel(&Error::cancelled("late"));
    assert_eq!(list.status(), Status::Succeeded);
}

/// Delegates to `inner` and counts how often a full read or a traversal is
/// started on it.
struct Counting {
    inner: Materializer<i32>,
    reads: Rc<Cell<usize>>,
    traversals: Rc<Cell<usize>>,
}

impl ListMaterializer<i32> for Counting {
    fn known_size(&self) -> Option<usize> {
        self.inner.known_size()
    }

    fn status(&self) -> Status {
        self.inner.status()
    }

    fn materialize_cancel(&self, cause: &Error) {
        self.inner.materialize_cancel(cause)
    }

    fn materialize_element(&self, index: usize, callback: IndexedCallback<i32>) {
        self.inner.materialize_element(index, callback)
    }

    fn materialize_elements(&self, callback: ValueCallback<Rc<Vec<i32>>>) {
        self.reads.set(self.reads.get() + 1);
        self.inner.materialize_elements(callback)
    }

    fn materialize_next_while(&self, index: usize, predicate: Box<dyn IndexedPredicate<i32>>) {
        self.traversals.set(self.traversals.get() + 1);
        self.inner.materialize_next_while(index, predicate)
    }

    fn materialize_prev_while(&self, index: usize, predicate: Box<dyn IndexedPredicate<i32>>) {
        self.traversals.set(self.traversals.get() + 1);
        self.inner.materialize_prev_while(index, predicate)
    }

    fn materialize_size(&self, callback: ValueCallback<usize>) {
        self.inner.materialize_size(callback)
    }

    fn weight_element(&self) -> Weight {
        self.inner.weight_element()
    }

    fn weight_elements(&self) -> Weight {
        self.inner.weight_elements()
    }

    fn weight_next_while(&self) -> Weight {
        self.inner.weight_next_while()
    }

    fn weight_prev_while(&self) -> Weight {
        self.inner.weight_prev_while()
    }

    fn weight_size(&self) -> Weight {
        self.inner.weight_size()
    }
}

type Build = fn(&Context, Materializer<i32>) -> Materializer<i32>;

#[test]
fn test_concurrent_full_reads_start_one_upstream_read() {
    let cases: [(&str, Build, Vec<i32>, (usize, usize)); 5] = [
        ("map", |ctx, up| map(ctx, up, |e: i32| e * 10), vec![0, 10, 20, 30, 40, 50], (1, 0)),
        ("filter", |ctx, up| filter(ctx, up, |e: &i32| e % 2 == 1), vec![1, 3, 5], (0, 1)),
        ("slice", |ctx, up| slice(ctx, up, 1, 4), vec![1, 2, 3], (0, 1)),
        ("concat", |ctx, up| concat(ctx, up, from_vec(vec![9])), vec![0, 1, 2, 3, 4, 5, 9], (1, 0)),
        (
            "remove_first_where",
            |ctx, up| remove_first_where(ctx, up, |e: &i32| *e == 2),
            vec![0, 1, 3, 4, 5],
            (1, 1),
        ),
    ];
    for (name, build, expected, starts) in cases {
        let rt = rt();
        let ctx = rt.context();
        let reads = Rc::new(Cell::new(0));
        let traversals = Rc::new(Cell::new(0));
        let upstream: Materializer<i32> = Rc::new(Counting {
            inner: from_iter(ctx, 0..6),
            reads: Rc::clone(&reads),
            traversals: Rc::clone(&traversals),
        });
        let list = build(ctx, upstream);
        let (first, first_cb) = slot::<Rc<Vec<i32>>>();
        let (second, second_cb) = slot::<Rc<Vec<i32>>>();
        list.materialize_elements(first_cb);
        list.materialize_elements(second_cb);
        rt.run_until_idle();
        let first = first.borrow_mut().take().unwrap().unwrap();
        let second = second.borrow_mut().take().unwrap().unwrap();
        assert_eq!(*first, expected, "{name}");
        assert!(Rc::ptr_eq(&first, &second), "{name}");
        assert_eq!((reads.get(), traversals.get()), starts, "{name}");
    }
}
