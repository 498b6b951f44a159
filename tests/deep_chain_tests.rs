use lazymat_core::config::EngineConfig;
use lazymat_core::leaf::from_vec;
use lazymat_core::materializer::Materializer;
use lazymat_exec::Runtime;
use lazymat_operators::{concat, concat_all, from_iter, map, skip};

fn rt() -> Runtime {
    Runtime::new(EngineConfig::default()).unwrap()
}

#[test]
fn test_deep_concat_all_answers_element_queries() {
    let rt = rt();
    let n = 10_000;
    let list = concat_all(rt.context(), (0..n).map(|i| from_vec(vec![i])));
    assert_eq!(list.known_size(), Some(n as usize));
    assert_eq!(rt.element(&list, n as usize - 1).unwrap(), Some(n - 1));
    assert_eq!(rt.element(&list, 0).unwrap(), Some(0));
    assert_eq!(rt.element(&list, 5_000).unwrap(), Some(5_000));
    assert_eq!(rt.element(&list, n as usize).unwrap(), None);
    assert_eq!(rt.size(&list).unwrap(), n as usize);
}

#[test]
fn test_deep_concat_of_lazy_parts_resolves_without_known_sizes() {
    let rt = rt();
    let ctx = rt.context();
    let n = 2_000;
    let mut list: Materializer<i32> = from_iter(ctx, vec![0]);
    for i in 1..n {
        list = concat(ctx, list, from_iter(ctx, vec![i]));
    }
    assert_eq!(list.known_size(), None);
    assert_eq!(rt.element(&list, 0).unwrap(), Some(0));
    assert_eq!(rt.element(&list, n as usize - 1).unwrap(), Some(n - 1));
    assert_eq!(rt.size(&list).unwrap(), n as usize);
    assert_eq!(rt.elements(&list).unwrap(), (0..n).collect::<Vec<_>>());
}

#[test]
fn test_deep_map_chain_answers_element_and_size() {
    let rt = rt();
    let ctx = rt.context();
    let mut list: Materializer<i64> = from_iter(ctx, 0..10);
    for _ in 0..5_000 {
        list = map(ctx, list, |e: i64| e + 1);
    }
    assert_eq!(rt.element(&list, 3).unwrap(), Some(5_003));
    assert_eq!(rt.size(&list).unwrap(), 10);
}

#[test]
fn test_deep_slice_chain_answers_element_queries() {
    let rt = rt();
    let ctx = rt.context();
    let mut list: Materializer<i32> = from_iter(ctx, 0..5_000);
    for _ in 0..3_000 {
        list = skip(ctx, list, 1);
    }
    assert_eq!(rt.element(&list, 0).unwrap(), Some(3_000));
    assert_eq!(rt.element(&list, 1_999).unwrap(), Some(4_999));
    assert_eq!(rt.element(&list, 2_000).unwrap(), None);
    assert_eq!(rt.size(&list).unwrap(), 2_000);
}

#[test]
fn test_inline_weight_only_changes_task_count() {
    let run = |inline_weight| {
        let rt = Runtime::new(EngineConfig {
            inline_weight,
            ..EngineConfig::default()
        })
        .unwrap();
        let list = concat_all(rt.context(), (0..300).map(|i| from_vec(vec![i, -i])));
        let answers: Vec<_> = [0, 1, 299, 598, 599, 600]
            .into_iter()
            .map(|index| rt.element(&list, index).unwrap())
            .collect();
        (answers, rt.stats().tasks_run)
    };
    let (deferred, deferred_tasks) = run(4);
    let (inline, inline_tasks) = run(u32::MAX);
    assert_eq!(deferred, inline);
    assert_eq!(deferred[5], None);
    assert_eq!(inline_tasks, 0);
    assert!(deferred_tasks > 0);
}
