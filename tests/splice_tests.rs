use std::rc::Rc;

use lazymat_core::callback::{Indexed, IndexedCallback, IndexedPredicate, ValueCallback};
use lazymat_core::config::EngineConfig;
use lazymat_core::index::MAX_INDEX;
use lazymat_core::leaf::{empty, from_vec};
use lazymat_core::materializer::{ListMaterializer, Materializer, Status};
use lazymat_core::weight::Weight;
use lazymat_core::Error;
use lazymat_exec::Runtime;
use lazymat_operators::{
    append, concat, concat_all, from_iter, insert, insert_at, prepend_one, remove, remove_at,
    replace, replace_at,
};

fn rt() -> Runtime {
    Runtime::new(EngineConfig::default()).unwrap()
}

fn lazy(rt: &Runtime, values: Vec<i32>) -> Materializer<i32> {
    from_iter(rt.context(), values)
}

/// A list of `MAX_INDEX` zeros that stores nothing.
struct Zeros;

impl ListMaterializer<i32> for Zeros {
    fn known_size(&self) -> Option<usize> {
        Some(MAX_INDEX)
    }

    fn status(&self) -> Status {
        Status::Running
    }

    fn materialize_cancel(&self, _cause: &Error) {}

    fn materialize_element(&self, index: usize, callback: IndexedCallback<i32>) {
        if index < MAX_INDEX {
            callback(Ok(Indexed::Element { index, element: 0 }))
        } else {
            callback(Ok(Indexed::End { size: MAX_INDEX }))
        }
    }

    fn materialize_elements(&self, callback: ValueCallback<Rc<Vec<i32>>>) {
        callback(Err(Error::Unsupported("zeros cannot be collected".into())))
    }

    fn materialize_next_while(&self, _index: usize, predicate: Box<dyn IndexedPredicate<i32>>) {
        predicate.error(Error::Unsupported("zeros cannot be traversed".into()))
    }

    fn materialize_prev_while(&self, _index: usize, predicate: Box<dyn IndexedPredicate<i32>>) {
        predicate.error(Error::Unsupported("zeros cannot be traversed".into()))
    }

    fn materialize_size(&self, callback: ValueCallback<usize>) {
        callback(Ok(MAX_INDEX))
    }

    fn weight_element(&self) -> Weight {
        Weight::ONE
    }

    fn weight_elements(&self) -> Weight {
        Weight::MAX
    }

    fn weight_next_while(&self) -> Weight {
        Weight::MAX
    }

    fn weight_prev_while(&self) -> Weight {
        Weight::MAX
    }

    fn weight_size(&self) -> Weight {
        Weight::ONE
    }
}

#[test]
fn test_concat_of_arrays() {
    let rt = rt();
    let ctx = rt.context();
    let list = concat(ctx, from_vec(vec![1, 2]), from_vec(vec![3, 4, 5]));
    assert_eq!(list.known_size(), Some(5));
    assert_eq!(rt.element(&list, 0).unwrap(), Some(1));
    assert_eq!(rt.element(&list, 2).unwrap(), Some(3));
    assert_eq!(rt.element(&list, 4).unwrap(), Some(5));
    assert_eq!(rt.element(&list, 5).unwrap(), None);
    assert_eq!(rt.elements(&list).unwrap(), vec![1, 2, 3, 4, 5]);
}

#[test]
fn test_concat_with_empty_head_is_the_tail() {
    let rt = rt();
    let tail = from_vec(vec![7, 8]);
    let list = concat(rt.context(), empty(), tail.clone());
    assert!(std::rc::Rc::ptr_eq(&list, &tail));
}

#[test]
fn test_concat_of_lazy_lists_resolves_sizes_on_demand() {
    let rt = rt();
    let ctx = rt.context();
    let list = concat(ctx, lazy(&rt, vec![1, 2, 3]), lazy(&rt, vec![4, 5]));
    assert_eq!(list.known_size(), None);
    assert_eq!(rt.element(&list, 3).unwrap(), Some(4));
    assert_eq!(rt.size(&list).unwrap(), 5);
    assert_eq!(list.known_size(), Some(5));
}

#[test]
fn test_concat_all_and_single_element_helpers() {
    let rt = rt();
    let ctx = rt.context();
    let list = concat_all(
        ctx,
        vec![from_vec(vec![1]), from_vec(vec![]), from_vec(vec![2, 3])],
    );
    let list = append(ctx, list, 4);
    let list = prepend_one(ctx, list, 0);
    assert_eq!(rt.elements(&list).unwrap(), vec![0, 1, 2, 3, 4]);

    let none: Materializer<i32> = concat_all(ctx, Vec::new());
    assert_eq!(rt.size(&none).unwrap(), 0);
}

#[test]
fn test_insert_positions_clamp_and_count_from_end() {
    let rt = rt();
    let ctx = rt.context();
    let base = || from_vec(vec![10, 20, 30]);

    let front = insert_at(ctx, base(), 0, 5);
    assert_eq!(rt.elements(&front).unwrap(), vec![5, 10, 20, 30]);

    let middle = insert(ctx, base(), 2, from_vec(vec![21, 22]));
    assert_eq!(rt.elements(&middle).unwrap(), vec![10, 20, 21, 22, 30]);

    let past_end = insert_at(ctx, base(), 99, 40);
    assert_eq!(rt.elements(&past_end).unwrap(), vec![10, 20, 30, 40]);

    let before_last = insert_at(ctx, base(), -1, 25);
    assert_eq!(rt.elements(&before_last).unwrap(), vec![10, 20, 25, 30]);
}

#[test]
fn test_insert_into_lazy_list_answers_elements_without_full_size() {
    let rt = rt();
    let ctx = rt.context();
    let list = insert_at(ctx, lazy(&rt, (0..100).collect()), 2, -1);
    assert_eq!(rt.element(&list, 1).unwrap(), Some(1));
    assert_eq!(rt.element(&list, 2).unwrap(), Some(-1));
    assert_eq!(rt.element(&list, 3).unwrap(), Some(2));
    assert_eq!(list.known_size(), None);
    assert_eq!(rt.size(&list).unwrap(), 101);
}

#[test]
fn test_remove_ranges() {
    let rt = rt();
    let ctx = rt.context();
    let base = || from_vec(vec![0, 1, 2, 3, 4, 5]);

    let middle = remove(ctx, base(), 1, 3);
    assert_eq!(rt.elements(&middle).unwrap(), vec![0, 3, 4, 5]);
    assert_eq!(rt.size(&middle).unwrap(), 4);

    let tail = remove(ctx, base(), -2, i64::MAX);
    assert_eq!(rt.elements(&tail).unwrap(), vec![0, 1, 2, 3]);

    let last = remove_at(ctx, base(), -1);
    assert_eq!(rt.elements(&last).unwrap(), vec![0, 1, 2, 3, 4]);

    let inverted = remove(ctx, base(), 4, 2);
    assert_eq!(rt.elements(&inverted).unwrap(), vec![0, 1, 2, 3, 4, 5]);
}

#[test]
fn test_remove_past_end_behaves_like_upstream() {
    let rt = rt();
    let ctx = rt.context();
    let list = remove(ctx, lazy(&rt, vec![1, 2, 3]), 10, 20);
    assert_eq!(rt.size(&list).unwrap(), 3);
    assert_eq!(rt.elements(&list).unwrap(), vec![1, 2, 3]);
    assert_eq!(list.status(), Status::Succeeded);
}

#[test]
fn test_replace_ranges_and_single_positions() {
    let rt = rt();
    let ctx = rt.context();
    let base = || from_vec(vec!['a', 'b', 'c', 'd']);

    let range = replace(ctx, base(), 1, 3, from_vec(vec!['x', 'y', 'z']));
    assert_eq!(rt.elements(&range).unwrap(), vec!['a', 'x', 'y', 'z', 'd']);
    assert_eq!(rt.element(&range, 4).unwrap(), Some('d'));

    let one = replace_at(ctx, base(), 2, 'C');
    assert_eq!(rt.elements(&one).unwrap(), vec!['a', 'b', 'C', 'd']);

    let last = replace_at(ctx, base(), -1, 'D');
    assert_eq!(rt.elements(&last).unwrap(), vec!['a', 'b', 'c', 'D']);

    let appended = replace_at(ctx, base(), 10, 'e');
    assert_eq!(rt.elements(&appended).unwrap(), vec!['a', 'b', 'c', 'd', 'e']);
}

#[test]
fn test_edit_traversals_cross_segments() {
    let rt = rt();
    let ctx = rt.context();
    let list = replace(
        ctx,
        lazy(&rt, vec![0, 1, 2, 3, 4]),
        1,
        3,
        lazy(&rt, vec![10, 11, 12]),
    );
    let forward = rt.collect_next_while(&list, 0, |_, _| true).unwrap();
    assert_eq!(
        forward.items,
        vec![(0, 0), (1, 10), (2, 11), (3, 12), (4, 3), (5, 4)]
    );
    assert_eq!(forward.size, Some(6));

    let from_middle = rt.collect_next_while(&list, 2, |_, e| *e != 3).unwrap();
    assert_eq!(from_middle.items, vec![(2, 11), (3, 12)]);
    assert_eq!(from_middle.size, None);

    let backward = rt.collect_prev_while(&list, 100, |_, _| true).unwrap();
    assert_eq!(
        backward.items,
        vec![(5, 4), (4, 3), (3, 12), (2, 11), (1, 10), (0, 0)]
    );
    assert_eq!(backward.size, Some(6));
}

#[test]
fn test_negative_bounds_resolve_size_first() {
    let rt = rt();
    let ctx = rt.context();
    let list = insert_at(ctx, lazy(&rt, vec![1, 2, 3, 4]), -2, 0);
    assert_eq!(rt.element(&list, 2).unwrap(), Some(0));
    assert_eq!(rt.elements(&list).unwrap(), vec![1, 2, 0, 3, 4]);
}

#[test]
fn test_upstream_failure_is_forwarded() {
    let rt = rt();
    let ctx = rt.context();
    let failing = lazymat_operators::try_from_iter(
        ctx,
        vec![Ok(1), Err(lazymat_core::Error::upstream("disk gone"))],
    );
    let list = append(ctx, failing, 9);
    assert_eq!(rt.element(&list, 0).unwrap(), Some(1));
    let err = rt.element(&list, 1).unwrap_err();
    assert_eq!(err.core(), Some(&lazymat_core::Error::upstream("disk gone")));
    let again = rt.size(&list).unwrap_err();
    assert_eq!(again.core(), Some(&lazymat_core::Error::upstream("disk gone")));
}

#[test]
fn test_concat_past_max_index_fails_with_overflow() {
    let rt = rt();
    let ctx = rt.context();
    let list = concat(ctx, Rc::new(Zeros), Rc::new(Zeros));
    assert_eq!(list.known_size(), None);
    assert_eq!(rt.element(&list, 5).unwrap(), Some(0));
    assert_eq!(
        rt.size(&list).unwrap_err().core(),
        Some(&Error::Overflow("sum 4294967294 exceeds 2147483647".into()))
    );

    let grown = append(ctx, Rc::new(Zeros), 1);
    assert_eq!(
        rt.size(&grown).unwrap_err().core(),
        Some(&Error::Overflow("sum 2147483648 exceeds 2147483647".into()))
    );
    assert_eq!(rt.element(&grown, MAX_INDEX - 1).unwrap(), Some(0));
}
