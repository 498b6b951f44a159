use std::cell::Cell;
use std::rc::Rc;

use lazymat_core::config::EngineConfig;
use lazymat_core::leaf::from_vec;
use lazymat_core::materializer::Status;
use lazymat_core::Error;
use lazymat_exec::Runtime;
use lazymat_operators::{filter, from_iter, map, try_filter, try_map};

fn rt() -> Runtime {
    Runtime::new(EngineConfig::default()).unwrap()
}

#[test]
fn test_filter_reindexes_kept_elements() {
    let rt = rt();
    let list = filter(rt.context(), from_vec((0..10).collect()), |e: &i32| e % 3 == 0);
    assert_eq!(rt.element(&list, 0).unwrap(), Some(0));
    assert_eq!(rt.element(&list, 2).unwrap(), Some(6));
    assert_eq!(rt.element(&list, 4).unwrap(), None);
    assert_eq!(rt.size(&list).unwrap(), 4);
    assert_eq!(rt.elements(&list).unwrap(), vec![0, 3, 6, 9]);
}

#[test]
fn test_filter_tests_each_upstream_element_once() {
    let rt = rt();
    let calls = Rc::new(Cell::new(0));
    let counter = Rc::clone(&calls);
    let list = filter(rt.context(), from_vec((0..20).collect()), move |e: &i32| {
        counter.set(counter.get() + 1);
        e % 2 == 1
    });
    assert_eq!(rt.element(&list, 3).unwrap(), Some(7));
    assert_eq!(calls.get(), 8);
    assert_eq!(rt.element(&list, 1).unwrap(), Some(3));
    assert_eq!(calls.get(), 8);
    assert_eq!(rt.size(&list).unwrap(), 10);
    assert_eq!(calls.get(), 20);
    let all = rt.collect_next_while(&list, 0, |_, _| true).unwrap();
    assert_eq!(all.items.len(), 10);
    assert_eq!(all.size, Some(10));
    let backward = rt.collect_prev_while(&list, 9, |_, e| *e > 13).unwrap();
    assert_eq!(backward.items, vec![(9, 19), (8, 17), (7, 15)]);
    assert_eq!(calls.get(), 20);
}

#[test]
fn test_filter_over_lazy_source() {
    let rt = rt();
    let ctx = rt.context();
    let list = filter(ctx, from_iter(ctx, 1..=6), |e: &i32| *e > 3);
    assert_eq!(list.known_size(), None);
    let forward = rt.collect_next_while(&list, 1, |_, _| true).unwrap();
    assert_eq!(forward.items, vec![(1, 5), (2, 6)]);
    assert_eq!(forward.size, Some(3));
    assert_eq!(list.known_size(), Some(3));
}

#[test]
fn test_filter_error_fails_the_operator() {
    let rt = rt();
    let list = try_filter(rt.context(), from_vec(vec![1, 2, 3]), |e: &i32| {
        if *e == 2 {
            Err(Error::upstream("bad element"))
        } else {
            Ok(true)
        }
    });
    assert_eq!(rt.element(&list, 0).unwrap(), Some(1));
    let err = rt.element(&list, 1).unwrap_err();
    assert_eq!(err.core(), Some(&Error::upstream("bad element")));
    assert_eq!(list.status(), Status::Failed);
    assert!(rt.size(&list).is_err());
}

#[test]
fn test_map_transforms_each_index_once() {
    let rt = rt();
    let calls = Rc::new(Cell::new(0));
    let counter = Rc::clone(&calls);
    let list = map(rt.context(), from_vec(vec![1, 2, 3]), move |e: i32| {
        counter.set(counter.get() + 1);
        format!("#{e}")
    });
    assert_eq!(list.known_size(), Some(3));
    assert_eq!(rt.element(&list, 1).unwrap(), Some("#2".to_string()));
    assert_eq!(rt.element(&list, 1).unwrap(), Some("#2".to_string()));
    assert_eq!(calls.get(), 1);
    assert_eq!(
        rt.elements(&list).unwrap(),
        vec!["#1".to_string(), "#2".to_string(), "#3".to_string()]
    );
    assert_eq!(calls.get(), 3);
    assert_eq!(list.status(), Status::Succeeded);
    assert!(rt.contains(&list, "#3".to_string()).unwrap());
}

#[test]
fn test_map_traversals_pass_indices_through() {
    let rt = rt();
    let ctx = rt.context();
    let list = map(ctx, from_iter(ctx, 0..5), |e: i32| e * 10);
    let backward = rt.collect_prev_while(&list, 3, |_, _| true).unwrap();
    assert_eq!(backward.items, vec![(3, 30), (2, 20), (1, 10), (0, 0)]);
    assert_eq!(backward.size, Some(5));
}

#[test]
fn test_map_error_is_fail_fast() {
    let rt = rt();
    let calls = Rc::new(Cell::new(0));
    let counter = Rc::clone(&calls);
    let list = try_map(rt.context(), from_vec(vec![1, 0, 2]), move |e: i32| {
        counter.set(counter.get() + 1);
        if e == 0 {
            Err(Error::upstream("division by zero"))
        } else {
            Ok(10 / e)
        }
    });
    let err = rt.elements(&list).unwrap_err();
    assert_eq!(err.core(), Some(&Error::upstream("division by zero")));
    assert_eq!(list.status(), Status::Failed);
    let seen = calls.get();
    assert!(rt.element(&list, 2).is_err());
    assert_eq!(calls.get(), seen);
}
