//! Integration tests for windowed transcripts of typed records.

mod message;

use std::sync::Arc;

use message::Message;
use streambase_rust::{
    Document, EditOp, InMemoryRemoteStore, Notification, QueryBuilder, Record, RecordingObserver,
    Stream,
};

fn keys<R: Record>(records: &[R]) -> Vec<String> {
    records
        .iter()
        .filter_map(|r| r.key().map(String::from))
        .collect()
}

/// Small deterministic generator so failures replay.
struct Lcg(u64);

impl Lcg {
    fn below(&mut self, n: u64) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.0 >> 33) % n
    }
}

#[test]
fn newest_first_transcript_shows_latest_page() {
    let query = QueryBuilder::new()
        .ordered_by_child("sent_at")
        .descending()
        .limit(3)
        .build()
        .unwrap();
    let observer = RecordingObserver::new();
    let mut stream = Stream::transient(query).with_observer(observer.clone());

    stream
        .add(vec![
            Message::new("m1", "ann", "hi", 10),
            Message::new("m2", "bob", "hello", 20),
            Message::new("m3", "ann", "how are you?", 30),
            Message::new("m4", "bob", "fine", 40),
            Message::new("m5", "ann", "good", 50),
        ])
        .unwrap();

    assert_eq!(keys(stream.items()), vec!["m5", "m4", "m3"]);
    assert!(stream.has_more());
    assert_eq!(stream[0].text(), Some("good"));

    stream.add([Message::new("m6", "bob", "bye", 60)]).unwrap();
    assert_eq!(keys(stream.items()), vec!["m6", "m5", "m4"]);

    let script = observer.scripts().pop().unwrap();
    assert_eq!(script.counts().inserted, 1);
    assert_eq!(script.counts().removed, 1);
    assert!(matches!(script.ops()[0], EditOp::Remove { index: 2 }));
}

#[test]
fn drafts_without_keys_are_ignored() {
    let observer = RecordingObserver::new();
    let mut stream: Stream<Message> =
        Stream::transient(QueryBuilder::new().build().unwrap()).with_observer(observer.clone());

    stream
        .add([Message::draft("ann", "typing..."), Message::new("m1", "ann", "sent", 1)])
        .unwrap();

    assert_eq!(keys(stream.items()), vec!["m1"]);
    assert_eq!(observer.scripts()[0].len(), 1);
}

#[test]
fn missing_sort_fields_come_first() {
    let query = QueryBuilder::new()
        .ordered_by_child("username")
        .build()
        .unwrap();
    let mut stream = Stream::transient(query);

    let mut anonymous = Message::draft("x", "no author");
    anonymous.set_key(Some("k-anon".into()));
    let mut fields = anonymous.fields();
    fields.remove("username");
    anonymous.apply_fields(Some(&fields));

    stream
        .add([
            Message::new("k1", "zed", "z", 1),
            anonymous,
            Message::new("k2", "amy", "a", 2),
        ])
        .unwrap();

    assert_eq!(keys(stream.items()), vec!["k-anon", "k2", "k1"]);
    assert_eq!(stream[0].username(), None);
}

#[test]
fn typed_records_sync_from_store() {
    let store = InMemoryRemoteStore::new();
    store
        .set("m1", Message::new("m1", "ann", "first", 1).fields())
        .unwrap();

    let query = QueryBuilder::new().ordered_by_child("sent_at").build().unwrap();
    let mut stream: Stream<Message> =
        Stream::live(query, Arc::new(store.clone())).with_batch_delay(None);
    stream.load().unwrap();

    store
        .set("m2", Message::new("m2", "bob", "second", 2).fields())
        .unwrap();
    store
        .set("m1", Message::new("m1", "ann", "edited", 3).fields())
        .unwrap();
    stream.pump(0).unwrap();
    stream.pump(0).unwrap();

    assert_eq!(keys(stream.items()), vec!["m2", "m1"]);
    assert_eq!(stream[1].text(), Some("edited"));
    assert_eq!(stream[1].sent_at(), Some(3));
    assert_eq!(stream[0].username(), Some("bob"));
}

#[test]
fn scripts_replay_onto_the_previous_window() {
    let query = QueryBuilder::new()
        .ordered_by_child("rank")
        .limit(5)
        .build()
        .unwrap();
    let observer = RecordingObserver::new();
    let mut stream = Stream::transient(query).with_observer(observer.clone());
    let mut rng = Lcg(7);

    let doc = |rng: &mut Lcg| {
        let key = format!("k{:02}", rng.below(12));
        Document::new(key).with_field("rank", rng.below(8) as i64)
    };

    for _ in 0..300 {
        match rng.below(5) {
            0 | 1 => stream.add([doc(&mut rng)]).unwrap(),
            2 => {
                let key = format!("k{:02}", rng.below(12));
                stream.remove_keys([key.as_str()]).unwrap();
            }
            3 => stream.update(doc(&mut rng)).unwrap(),
            _ => {
                let k = rng.below(8);
                let batch: Vec<_> = (0..k).map(|_| doc(&mut rng)).collect();
                stream
                    .batch(|b| {
                        for d in batch {
                            if rng.below(3) == 0 {
                                b.remove(&d);
                            } else {
                                b.add(d);
                            }
                        }
                    })
                    .unwrap();
            }
        }
    }

    let mut shadow: Vec<Document> = Vec::new();
    let mut delivered = 0;
    for notification in observer.notifications() {
        if let Notification::Diff { script, window } = notification {
            script.apply(&mut shadow).unwrap();
            assert_eq!(shadow, window);
            assert!(window.len() <= 5);
            delivered += 1;
        }
    }
    assert_eq!(delivered, 300);
    assert_eq!(shadow, stream.items());
}
