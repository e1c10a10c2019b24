//! Integration tests for store-backed streams.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use streambase_rust::{
    ActivityTracker, Document, FieldValue, Fields, InMemoryRemoteStore, LiveStreamThread,
    PayloadFormat, QueryBuilder, Record, RecordingObserver, RemoteStore, Stream, StreamState,
};

fn scored(score: i64) -> Fields {
    let mut fields = Fields::new();
    fields.insert("score".into(), FieldValue::from(score));
    fields
}

fn keys(records: &[Document]) -> Vec<&str> {
    records.iter().filter_map(|r| r.key()).collect()
}

/// Poll `check` until it holds or a second passes.
fn eventually(check: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(1);
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    check()
}

#[test]
fn leaderboard_tracks_top_scores() {
    let store = InMemoryRemoteStore::new().with_payload_format(PayloadFormat::Bitcode);
    for (key, score) in [("ann", 10), ("bob", 40), ("cat", 30), ("dan", 20)] {
        store.set(key, scored(score)).unwrap();
    }

    let query = QueryBuilder::new()
        .ordered_by_child("score")
        .descending()
        .limit(2)
        .build()
        .unwrap();
    let mut stream: Stream<Document> =
        Stream::live(query, Arc::new(store.clone())).with_batch_delay(None);
    stream.load().unwrap();
    assert_eq!(keys(stream.items()), vec!["bob", "cat"]);
    assert!(stream.has_more());

    store.set("ann", scored(50)).unwrap();
    stream.pump(0).unwrap();
    assert_eq!(keys(stream.items()), vec!["ann", "bob"]);

    store.remove("ann").unwrap();
    stream.pump(0).unwrap();
    assert_eq!(keys(stream.items()), vec!["bob", "cat"]);
    assert_eq!(stream[1].get("score"), Some(&FieldValue::from(30)));
}

#[test]
fn range_query_honors_descending_limit() {
    let store = InMemoryRemoteStore::new();
    for key in ["a", "b", "c", "d", "e"] {
        store.set(key, Fields::new()).unwrap();
    }
    let query = QueryBuilder::new().descending().limit(2).build().unwrap();

    let snapshot = store.query(&query.range_query()).unwrap();
    assert_eq!(keys(&snapshot.records), vec!["c", "d", "e"]);
    assert!(snapshot.has_more);
}

#[test]
fn background_thread_applies_changes() {
    let store = InMemoryRemoteStore::new();
    store.set("a", Fields::new()).unwrap();

    let observer = RecordingObserver::new();
    let query = QueryBuilder::new().build().unwrap();
    let stream: Stream<Document> = Stream::live(query, Arc::new(store.clone()))
        .with_batch_delay(Some(Duration::from_millis(20)))
        .with_observer(observer.clone());
    let worker = LiveStreamThread::spawn(stream, Duration::from_millis(5));

    assert!(eventually(|| observer.len() == 1));
    store.set("b", Fields::new()).unwrap();
    store.set("c", Fields::new()).unwrap();
    assert!(eventually(|| observer
        .last_window()
        .map_or(false, |w| w.len() == 3)));

    let (stream, stats) = worker.stop();
    let stream = stream.unwrap();
    assert_eq!(keys(stream.items()), vec!["a", "b", "c"]);
    assert_eq!(stream.state(), StreamState::Synced);
    assert_eq!(stats.events_applied, 2);
    assert_eq!(stats.events_dropped, 0);
    assert!(stats.batches_flushed >= 2);
    assert!(stats.polls > 0);
}

#[test]
fn background_thread_recovers_from_outage() {
    let store = InMemoryRemoteStore::new();
    let observer = RecordingObserver::new();
    let stream: Stream<Document> =
        Stream::live(QueryBuilder::new().build().unwrap(), Arc::new(store.clone()))
            .with_batch_delay(None)
            .with_observer(observer.clone());
    let worker = LiveStreamThread::spawn(stream, Duration::from_millis(5));

    assert!(eventually(|| observer.len() == 1));
    store.disconnect();
    assert!(eventually(|| observer.interruptions().len() == 1));

    store.set("a", Fields::new()).unwrap();
    store.reconnect();
    assert!(eventually(|| observer
        .last_window()
        .map_or(false, |w| w.len() == 1)));

    let (stream, stats) = worker.stop();
    assert_eq!(stream.unwrap().state(), StreamState::Synced);
    assert_eq!(stats.interruptions, 1);
    assert_eq!(observer.interruptions().len(), 1);
}

#[test]
fn shared_tracker_spans_streams() {
    let edges = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&edges);
    let tracker = ActivityTracker::new(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let store = InMemoryRemoteStore::new();
    store.set("a", Fields::new()).unwrap();
    let mut first: Stream<Document> =
        Stream::live(QueryBuilder::new().build().unwrap(), Arc::new(store.clone()))
            .with_activity(tracker.clone());
    let mut second: Stream<Document> =
        Stream::live(QueryBuilder::new().limit(1).build().unwrap(), Arc::new(store))
            .with_activity(tracker.clone());

    {
        let _outer = tracker.begin();
        first.load().unwrap();
        second.load().unwrap();
    }

    assert_eq!(edges.load(Ordering::SeqCst), 2);
    assert!(!tracker.is_active());
}
