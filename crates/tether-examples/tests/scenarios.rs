use std::sync::{Mutex as StdMutex, MutexGuard, OnceLock};
use std::time::Duration;

use tether::{AsyncResource, FutureExt as _};
use tether_examples::scenarios;
use tether_types::{GraphSnapshot, SequenceId, SequenceKind, SequenceSnapshot};

fn test_guard() -> MutexGuard<'static, ()> {
    static GUARD: OnceLock<StdMutex<()>> = OnceLock::new();
    GUARD
        .get_or_init(|| StdMutex::new(()))
        .lock()
        .expect("test guard mutex poisoned")
}

fn node(graph: &GraphSnapshot, id: SequenceId) -> &SequenceSnapshot {
    graph
        .node(id)
        .unwrap_or_else(|| panic!("node #{id} should be in the graph"))
}

fn awaited_kinds(graph: &GraphSnapshot) -> Vec<SequenceKind> {
    let mut kinds = Vec::new();
    let mut next = Some(graph.root);
    while let Some(id) = next {
        let snapshot = node(graph, id);
        kinds.push(snapshot.kind);
        next = snapshot.awaited;
    }
    kinds
}

#[tokio::test(flavor = "current_thread")]
async fn tracker_is_installed_at_startup() {
    let _guard = test_guard();
    assert!(tether::installed().is_some());
}

#[tokio::test(flavor = "current_thread")]
async fn io_chain_links_timers_through_the_first_await() {
    let _guard = test_guard();
    let graph = scenarios::io_chain::run().await.expect("scenario should succeed");

    let last_await = node(&graph, graph.root);
    assert_eq!(last_await.kind, SequenceKind::Await);
    assert_eq!(last_await.owner.as_deref(), Some("fetch.profile"));

    let second_timer = node(&graph, last_await.awaited.expect("await has a target"));
    assert_eq!(second_timer.kind, SequenceKind::Io);
    assert!(second_timer.end_ns.is_some(), "fired timer is serviced");

    let first_await = last_await.previous.expect("await began after the first one");
    assert_eq!(second_timer.previous, Some(first_await));
    let first_await = node(&graph, first_await);
    assert_eq!(first_await.kind, SequenceKind::Await);

    let task = node(&graph, first_await.awaited.expect("first await has a target"));
    assert_eq!(task.kind, SequenceKind::Io);
    assert!(task.previous.is_none());
}

#[tokio::test(flavor = "current_thread")]
async fn await_chain_alternates_awaits_and_promises() {
    let _guard = test_guard();
    let graph = scenarios::await_chain::run().await.expect("scenario should succeed");

    assert_eq!(
        awaited_kinds(&graph),
        vec![
            SequenceKind::Await,
            SequenceKind::Promise,
            SequenceKind::Await,
            SequenceKind::Promise,
            SequenceKind::Await,
            SequenceKind::Io,
        ]
    );
    assert!(graph.nodes.iter().all(|node| node.end_ns.is_some()));
}

#[tokio::test(flavor = "current_thread")]
async fn cross_context_settle_splits_the_consumers_await() {
    let _guard = test_guard();
    let tracker = tether::installed().expect("tracker installed at startup");
    let spliced_before = tracker.stats().spliced;

    let graph = scenarios::cross_context_settle::run().await.expect("scenario should succeed");
    assert!(tracker.stats().spliced > spliced_before);

    let live = node(&graph, graph.root);
    assert_eq!(live.kind, SequenceKind::Await);
    assert_eq!(live.owner.as_deref(), Some("consumer"));

    let settler = node(&graph, live.awaited.expect("settler recorded"));
    assert_eq!(settler.owner.as_deref(), Some("producer"));

    let first_leg = node(&graph, live.previous.expect("first leg chained in"));
    assert_eq!(first_leg.kind, SequenceKind::Await);
    assert_eq!(first_leg.owner.as_deref(), Some("consumer"));
    assert_eq!(first_leg.end_ns, Some(live.start_ns));

    let deferred = node(&graph, first_leg.awaited.expect("first leg keeps the deferred value"));
    assert_eq!(deferred.kind, SequenceKind::Promise);
    assert_eq!(deferred.awaited, Some(settler.id));

    let consumer = node(&graph, first_leg.previous.expect("await began inside the consumer"));
    assert_eq!(consumer.kind, SequenceKind::Io);
    // Spawned from the root context, which has no owner.
    assert!(consumer.owner.is_none());
}

#[tokio::test(flavor = "current_thread")]
async fn awaiting_an_already_settled_deferred_settles_in_its_own_context() {
    let _guard = test_guard();
    let tracker = tether::installed().expect("tracker installed at startup");
    let spliced_before = tracker.stats().spliced;

    let reader = tether::spawn("late.reader", async {
        let (value, settle) = tether::deferred::<u8>();
        assert!(settle.settle(9).is_ok(), "deferred is still alive");
        let deferred = tether::sequence_of(&value).expect("deferred has a node");

        let waiting = tether::await_on(value);
        let point = tether::sequence_of(&waiting).expect("await point has a node");
        let got = waiting.await.expect("value was sent before the await");
        (got, deferred, point, tether::current_sequence())
    });
    let (got, deferred, point, resumed_in) = reader.await.expect("reader task should not panic");

    assert_eq!(got, 9);
    assert_eq!(tracker.stats().spliced, spliced_before);
    assert_eq!(deferred.kind(), SequenceKind::Promise);

    assert_eq!(point.kind(), SequenceKind::Await);
    assert_eq!(point.owner().map(|owner| owner.name().to_owned()).as_deref(), Some("late.reader"));
    assert!(point.end().is_some());
    let awaited = point.awaited().expect("await keeps what it chained on");
    assert!(awaited.ptr_eq(&deferred));
    let began_in = point.previous().expect("await began inside the reader task");
    assert_eq!(began_in.kind(), SequenceKind::Io);

    let resumed_in = resumed_in.expect("code after the await runs in its context");
    assert!(resumed_in.ptr_eq(&point));
}

#[tokio::test(flavor = "current_thread")]
async fn tracked_future_is_queryable_until_dropped() {
    let _guard = test_guard();
    let answer = async { 40 + 2 }.tracked();

    let sequence = tether::sequence_of(&answer).expect("tracked future has a node");
    assert_eq!(sequence.kind(), SequenceKind::UnresolvedPromise);
    assert!(sequence.promise().is_some());

    assert_eq!(answer.await, 42);
    assert_eq!(sequence.kind(), SequenceKind::Promise);
    assert!(sequence.end().is_some());
}

#[tokio::test(flavor = "current_thread")]
async fn interval_is_serviced_on_every_tick() {
    let _guard = test_guard();
    let mut ticks = tether::interval(Duration::from_millis(1));
    let sequence = tether::sequence_of(&ticks).expect("interval has a node");
    assert!(sequence.end().is_none());

    ticks.tick().await;
    let first = sequence.end().expect("first tick services the timer");
    ticks.tick().await;
    let second = sequence.end().expect("second tick services the timer");
    assert!(second > first);
    assert_eq!(sequence.kind(), SequenceKind::Io);
}

#[tokio::test(flavor = "current_thread")]
async fn truncating_at_root_detaches_later_work() {
    let _guard = test_guard();
    let bootstrap = tether::spawn("bootstrap", async {
        let before = tether::current_sequence().is_some();
        tether::truncate_at_root();
        let after = tether::current_sequence().is_some();

        let render = tether::spawn("render", async { tether::current_sequence() });
        let render_sequence = render.await.expect("render task should not panic");
        (before, after, render_sequence)
    });

    let (before, after, render_sequence) = bootstrap.await.expect("bootstrap task should not panic");
    assert!(before);
    assert!(!after);
    // Started from a forgotten context, so it opens a sequence of its own.
    let render_sequence = render_sequence.expect("render task is tracked on its own");
    assert_eq!(render_sequence.kind(), SequenceKind::Io);
    assert!(render_sequence.previous().is_none());
    assert!(render_sequence.awaited().is_none());
}

#[tokio::test(flavor = "current_thread")]
async fn join_handles_can_be_awaited_as_resources() {
    let _guard = test_guard();
    let worker = tether::spawn("worker", async { 5_u8 });
    let worker_id = worker.async_id();
    let value = tether::await_on(worker).await.expect("worker should not panic");
    assert_eq!(value, 5);
    assert!(worker_id.get() > tether::ROOT_ASYNC_ID.get());
}
