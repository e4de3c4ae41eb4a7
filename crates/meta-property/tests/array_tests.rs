//! Integration tests for array properties, element binds and change diffs.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use meta_property::logging::targets;
use meta_property::{
    ArrayChangedHandler, ArrayChanges, Property, PropertyError, PropertyGraph, SharedPropertyGraph,
    SnapshotBind,
};
use parking_lot::Mutex;

fn setup() {
    let filter = format!("{}=debug,{}=trace", targets::GRAPH, targets::ARRAY);
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_test_writer()
        .try_init();
}

fn count_changes<T>(graph: &mut PropertyGraph, property: &Property<T>) -> Arc<AtomicUsize> {
    let count = Arc::new(AtomicUsize::new(0));
    let counter = count.clone();
    graph
        .on_changed(property, move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    count
}

fn capture_changes(
    graph: &mut PropertyGraph,
    array: &Property<Vec<i32>>,
) -> (ArrayChangedHandler<i32>, Arc<Mutex<Vec<ArrayChanges<i32>>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let handler =
        ArrayChangedHandler::subscribe(graph, array, move |changes| sink.lock().push(changes.clone()))
            .unwrap();
    (handler, seen)
}

#[test]
fn test_change_sequence_reports_diffs() {
    setup();
    let mut graph = PropertyGraph::new();
    let arr = graph.construct_array_property("arr", vec![1, 2, 3]);
    let (mut handler, seen) = capture_changes(&mut graph, &arr);

    graph.set_value(&arr, vec![1, 2]).unwrap();
    {
        let seen = seen.lock();
        let last = seen.last().unwrap();
        assert_eq!(last.indexes_removed, vec![2]);
        assert!(last.values_added.is_empty());
        assert!(last.position_changed.is_empty());
    }

    graph.set_value(&arr, vec![1, 2, 3, 4]).unwrap();
    {
        let seen = seen.lock();
        let last = seen.last().unwrap();
        assert!(last.indexes_removed.is_empty());
        assert_eq!(last.values_added, vec![(3, 2), (4, 3)]);
    }

    graph.set_value(&arr, vec![1, 5, 6, 4]).unwrap();
    {
        let seen = seen.lock();
        let last = seen.last().unwrap();
        assert_eq!(last.indexes_removed, vec![1, 2]);
        assert_eq!(last.values_added, vec![(5, 1), (6, 2)]);
        assert!(last.position_changed.is_empty());
    }
    assert_eq!(seen.lock().len(), 3);

    assert!(handler.unsubscribe(&mut graph));
    assert!(!handler.is_subscribed());
    graph.set_value(&arr, vec![9]).unwrap();
    assert_eq!(seen.lock().len(), 3);
    assert!(!handler.unsubscribe(&mut graph));
}

#[test]
fn test_changes_replay_onto_old_array() {
    setup();
    let mut graph = PropertyGraph::new();
    let arr = graph.construct_array_property("arr", vec![3, 1, 4, 1, 5]);
    let (_handler, seen) = capture_changes(&mut graph, &arr);

    let old = graph.get_value(&arr).unwrap();
    let new = vec![1, 5, 9, 3, 1];
    graph.set_value(&arr, new.clone()).unwrap();

    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].apply(&old).unwrap(), new);
}

#[test]
fn test_duplicate_values_move() {
    setup();
    let mut graph = PropertyGraph::new();
    let arr = graph.construct_array_property("arr", vec![0, 1, 0]);
    let (_handler, seen) = capture_changes(&mut graph, &arr);

    graph.set_value(&arr, vec![0, 0, 1]).unwrap();
    let seen = seen.lock();
    assert!(seen[0].indexes_removed.is_empty());
    assert!(seen[0].values_added.is_empty());
    assert_eq!(seen[0].position_changed, vec![(1, 2)]);
}

#[test]
fn test_equal_write_reports_nothing() {
    setup();
    let mut graph = PropertyGraph::new();
    let arr = graph.construct_array_property("arr", vec![1, 2]);
    let (_handler, seen) = capture_changes(&mut graph, &arr);

    graph.set_value(&arr, vec![1, 2]).unwrap();
    assert!(seen.lock().is_empty());
}

#[test]
fn test_element_edits_report_diffs() {
    setup();
    let mut graph = PropertyGraph::new();
    let arr = graph.construct_array_property("arr", vec![10, 20]);
    let (_handler, seen) = capture_changes(&mut graph, &arr);

    graph.array_insert(&arr, 1, 15).unwrap();
    graph.array_push(&arr, 30).unwrap();
    assert_eq!(graph.array_remove(&arr, 0).unwrap(), 10);
    assert_eq!(graph.get_value(&arr).unwrap(), vec![15, 20, 30]);
    assert_eq!(graph.array_len(&arr).unwrap(), 3);

    let seen = seen.lock();
    assert_eq!(seen.len(), 3);
    assert_eq!(seen[0].values_added, vec![(15, 1)]);
    assert_eq!(seen[1].values_added, vec![(30, 3)]);
    assert_eq!(seen[2].indexes_removed, vec![0]);
}

#[test]
fn test_item_bind_writes_into_array() {
    setup();
    let mut graph = PropertyGraph::new();
    let arr = graph.construct_array_property("arr", vec![1, 2, 3]);
    let p = graph.construct_property("p", 0_i32);
    graph.bind_array_item(&p, &arr, 1).unwrap();
    assert_eq!(graph.get_value(&p).unwrap(), 2);

    let array_changes = count_changes(&mut graph, &arr);
    let item_changes = count_changes(&mut graph, &p);

    graph.set_value(&p, 4).unwrap();
    assert_eq!(graph.get_value(&arr).unwrap(), vec![1, 4, 3]);
    assert_eq!(graph.get_value(&p).unwrap(), 4);
    assert_eq!(array_changes.load(Ordering::SeqCst), 1);
    assert_eq!(item_changes.load(Ordering::SeqCst), 1);

    graph.array_set(&arr, 1, 7).unwrap();
    assert_eq!(graph.get_value(&p).unwrap(), 7);
    assert_eq!(array_changes.load(Ordering::SeqCst), 2);
    assert_eq!(item_changes.load(Ordering::SeqCst), 2);

    // Elements other than the bound one do not disturb it.
    graph.array_set(&arr, 0, 5).unwrap();
    assert_eq!(item_changes.load(Ordering::SeqCst), 2);
}

#[test]
fn test_item_bind_survives_snapshot() {
    setup();
    let mut graph = PropertyGraph::new();
    let arr = graph.construct_array_property("arr", vec![1, 2, 3]);
    let p = graph.construct_property("p", 0_i32);
    graph.bind_array_item(&p, &arr, 1).unwrap();

    let snapshot = graph.snapshot(&p).unwrap();
    assert_eq!(snapshot.value, None);
    assert_eq!(
        snapshot.bind,
        Some(SnapshotBind::ArrayItem {
            array: arr.id(),
            index: 1,
        })
    );

    graph.reset(&p).unwrap();
    assert_eq!(graph.get_value(&p).unwrap(), 0);
    graph.restore(&p, &snapshot).unwrap();
    assert_eq!(graph.get_value(&p).unwrap(), 2);

    graph.array_set(&arr, 1, 9).unwrap();
    assert_eq!(graph.get_value(&p).unwrap(), 9);
    graph.set_value(&p, 4).unwrap();
    assert_eq!(graph.get_value(&arr).unwrap(), vec![1, 4, 3]);
}

#[test]
fn test_item_bind_past_end_falls_back() {
    setup();
    let mut graph = PropertyGraph::new();
    let arr = graph.construct_array_property("arr", vec![0]);
    let p = graph.construct_property("p", -1_i32);
    graph.bind_array_item(&p, &arr, 2).unwrap();
    assert_eq!(graph.get_value(&p).unwrap(), -1);

    graph.array_push(&arr, 1).unwrap();
    assert_eq!(graph.get_value(&p).unwrap(), -1);
    graph.array_push(&arr, 2).unwrap();
    assert_eq!(graph.get_value(&p).unwrap(), 2);

    graph.array_remove(&arr, 0).unwrap();
    assert_eq!(graph.get_value(&p).unwrap(), -1);
}

#[test]
fn test_item_bind_rejects_mismatched_kind() {
    setup();
    let mut graph = PropertyGraph::new();
    let arr = graph.construct_array_property("names", vec![String::from("a")]);
    let p = graph.construct_property("p", 0_i32);

    assert!(matches!(
        graph.bind_array_item(&p, &arr, 0),
        Err(PropertyError::IncompatibleTypes { .. })
    ));
    assert!(graph.values(&p, false).unwrap().is_empty());
}

#[test]
fn test_hashed_handler_reports_large_edits() {
    setup();
    let mut graph = PropertyGraph::new();
    let initial: Vec<i32> = (0..10_000).map(|n| n % 100).collect();
    let arr = graph.construct_array_property("arr", initial.clone());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let mut handler = ArrayChangedHandler::subscribe_hashed(&mut graph, &arr, move |changes| {
        sink.lock().push(changes.clone())
    })
    .unwrap();

    let mut next = initial.clone();
    next.reverse();
    next.remove(0);
    graph.set_value(&arr, next.clone()).unwrap();
    {
        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].indexes_removed.len(), 1);
        assert!(seen[0].values_added.is_empty());
        assert_eq!(seen[0].apply(&initial).unwrap(), next);
    }

    assert!(handler.unsubscribe(&mut graph));
    graph.array_push(&arr, 1).unwrap();
    assert_eq!(seen.lock().len(), 1);
}

#[test]
fn test_shared_graph_across_threads() {
    setup();
    let mut graph = PropertyGraph::new();
    let arr = graph.construct_array_property("arr", Vec::<u64>::new());
    let first = graph.construct_property("first", 0_u64);
    graph.bind_array_item(&first, &arr, 0).unwrap();
    let shared = SharedPropertyGraph::new(graph);

    let workers: Vec<_> = (0..4_u64)
        .map(|n| {
            let shared = shared.clone();
            std::thread::spawn(move || {
                shared.with_write(|graph| graph.array_push(&arr, n).unwrap());
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let graph = shared.read();
    assert_eq!(graph.array_len(&arr).unwrap(), 4);
    let mut items = graph.get_value(&arr).unwrap();
    items.sort_unstable();
    assert_eq!(items, vec![0, 1, 2, 3]);
    assert_eq!(graph.get_value(&first).unwrap(), graph.array_get(&arr, 0).unwrap());
}
