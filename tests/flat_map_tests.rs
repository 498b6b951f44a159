use std::cell::Cell;
use std::rc::Rc;

use lazymat_core::config::EngineConfig;
use lazymat_core::leaf::{empty, from_vec};
use lazymat_core::materializer::Status;
use lazymat_core::Error;
use lazymat_exec::Runtime;
use lazymat_operators::{flat_map, from_iter, try_flat_map, try_from_iter};

fn rt() -> Runtime {
    Runtime::new(EngineConfig::default()).unwrap()
}

#[test]
fn test_flat_map_concatenates_expansions() {
    let rt = rt();
    let list = flat_map(rt.context(), from_vec(vec![1, 2, 3]), |n: i32| {
        from_vec(vec![n; n as usize])
    });
    assert_eq!(list.known_size(), None);
    assert_eq!(rt.element(&list, 0).unwrap(), Some(1));
    assert_eq!(rt.element(&list, 3).unwrap(), Some(3));
    assert_eq!(rt.element(&list, 6).unwrap(), None);
    assert_eq!(rt.size(&list).unwrap(), 6);
    assert_eq!(rt.elements(&list).unwrap(), vec![1, 2, 2, 3, 3, 3]);
    assert_eq!(list.status(), Status::Succeeded);
}

#[test]
fn test_flat_map_skips_empty_expansions() {
    let rt = rt();
    let list = flat_map(rt.context(), from_vec(vec![0, 2, 0, 1]), |n: i32| {
        if n == 0 {
            empty()
        } else {
            from_vec((0..n).collect())
        }
    });
    assert_eq!(rt.elements(&list).unwrap(), vec![0, 1, 0]);
}

#[test]
fn test_flat_map_pulls_only_what_is_asked() {
    let rt = rt();
    let expanded = Rc::new(Cell::new(0));
    let counter = Rc::clone(&expanded);
    let ctx = rt.context();
    let list = flat_map(ctx, from_iter(ctx, 0..1000), move |n: i32| {
        counter.set(counter.get() + 1);
        from_vec(vec![n, n])
    });
    assert_eq!(rt.element(&list, 4).unwrap(), Some(2));
    assert_eq!(expanded.get(), 3);
    let forward = rt.collect_next_while(&list, 5, |i, _| i < 8).unwrap();
    assert_eq!(forward.items, vec![(5, 2), (6, 3), (7, 3)]);
    assert!(expanded.get() <= 5);
}

#[test]
fn test_flat_map_over_lazy_expansions() {
    let rt = rt();
    let ctx = rt.context().clone();
    let inner_ctx = ctx.clone();
    let list = flat_map(&ctx, from_vec(vec!["ab", "", "cde"]), move |s: &str| {
        from_iter(&inner_ctx, s.chars().collect::<Vec<_>>())
    });
    assert_eq!(rt.elements(&list).unwrap(), vec!['a', 'b', 'c', 'd', 'e']);
    let backward = rt.collect_prev_while(&list, 3, |_, _| true).unwrap();
    assert_eq!(
        backward.items,
        vec![(3, 'd'), (2, 'c'), (1, 'b'), (0, 'a')]
    );
    assert_eq!(backward.size, Some(5));
}

#[test]
fn test_flat_map_expansion_error_fails_every_waiter() {
    let rt = rt();
    let list = try_flat_map(rt.context(), from_vec(vec![1, -1, 2]), |n: i32| {
        if n < 0 {
            Err(Error::upstream("negative"))
        } else {
            Ok(from_vec(vec![n]))
        }
    });
    assert_eq!(rt.element(&list, 0).unwrap(), Some(1));
    let err = rt.element(&list, 1).unwrap_err();
    assert_eq!(err.core(), Some(&Error::upstream("negative")));
    assert_eq!(list.status(), Status::Failed);
    assert_eq!(
        rt.size(&list).unwrap_err().core(),
        Some(&Error::upstream("negative"))
    );
}

#[test]
fn test_lazy_source_discovers_size_by_exhaustion() {
    let rt = rt();
    let ctx = rt.context();
    let list = from_iter(ctx, vec![3, 1, 4, 1, 5]);
    assert_eq!(list.known_size(), None);
    assert_eq!(rt.element(&list, 2).unwrap(), Some(4));
    assert_eq!(list.known_size(), None);
    assert!(rt.has_element(&list, 4).unwrap());
    assert!(!rt.has_element(&list, 5).unwrap());
    assert_eq!(list.known_size(), Some(5));
    assert_eq!(list.status(), Status::Succeeded);

    let none = from_iter(ctx, Vec::<i32>::new());
    assert!(rt.is_empty(&none).unwrap());

    let broken = try_from_iter(ctx, vec![Ok(1), Err(Error::upstream("eof"))]);
    assert_eq!(
        rt.elements(&broken).unwrap_err().core(),
        Some(&Error::upstream("eof"))
    );
    assert_eq!(broken.status(), Status::Failed);
}
