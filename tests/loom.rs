#![allow(missing_docs)]
#![cfg(feature = "loom")]

use ctc::{
    store::{Completion, StoreError, TopicState, TopicStore},
    types::{Request, Value},
};
use loom::{sync::Arc, thread};

fn request(arg: &str) -> Request {
    Request::new("Fibonacci", [arg])
}

#[test]
fn loom_unsubscribe_races_completion() {
    loom::model(|| {
        // A computation finishes while the poller unsubscribes its topic.
        // Whatever the interleaving, the topic must stay gone.
        let store = Arc::new(TopicStore::new());
        let ticket = store.insert_pending(1, request("7")).unwrap();

        let worker = {
            let store = store.clone();
            thread::spawn(move || store.complete(ticket, Ok(Value::Integer(8))))
        };
        let removed = store.remove(1);
        let completion = worker.join().unwrap();

        let removed = removed.expect("topic was live before the remove");
        match completion {
            Completion::Applied => assert_eq!(removed.state, TopicState::Ready(Value::Integer(8))),
            Completion::Discarded => assert_eq!(removed.state, TopicState::Pending),
        }
        assert!(store.get(1).is_none());
        assert!(store.snapshot().is_empty());
    });
}

#[test]
fn loom_stale_completion_races_resubscribe() {
    loom::model(|| {
        // Topic 1 is unsubscribed and subscribed again while the computation
        // of the first instance is still finishing.
        let store = Arc::new(TopicStore::new());
        let stale = store.insert_pending(1, request("7")).unwrap();

        let worker = {
            let store = store.clone();
            thread::spawn(move || {
                let _ = store.complete(stale, Ok(Value::Integer(8)));
            })
        };
        store.remove(1);
        let fresh = store.insert_pending(1, request("8")).unwrap();
        worker.join().unwrap();

        let topic = store.get(1).unwrap();
        assert_eq!(topic.generation, fresh.generation);
        assert_eq!(topic.request, request("8"));
        assert_eq!(topic.state, TopicState::Pending);
        assert_eq!(store.complete(fresh, Ok(Value::Integer(13))), Completion::Applied);
    });
}

#[test]
fn loom_distinct_inserts_do_not_interfere() {
    loom::model(|| {
        let store = Arc::new(TopicStore::new());

        let worker = {
            let store = store.clone();
            thread::spawn(move || store.insert_pending(2, request("2")).unwrap())
        };
        let first = store.insert_pending(1, request("1")).unwrap();
        let second = worker.join().unwrap();

        assert_ne!(first.generation, second.generation);
        assert_eq!(store.len(), 2);
        assert_eq!(
            store.insert_pending(1, request("9")),
            Err(StoreError::AlreadySubscribed { id: 1 })
        );
    });
}

#[test]
fn loom_completion_applies_exactly_once() {
    loom::model(|| {
        let store = Arc::new(TopicStore::new());
        let ticket = store.insert_pending(1, request("7")).unwrap();

        let worker = {
            let store = store.clone();
            thread::spawn(move || store.complete(ticket, Ok(Value::Integer(1))))
        };
        let local = store.complete(ticket, Err("failed".into()));
        let remote = worker.join().unwrap();

        let applied = [local, remote]
            .into_iter()
            .filter(|completion| *completion == Completion::Applied)
            .count();
        assert_eq!(applied, 1);

        let expected = if local == Completion::Applied {
            TopicState::Failed("failed".into())
        } else {
            TopicState::Ready(Value::Integer(1))
        };
        assert_eq!(store.get(1).unwrap().state, expected);
    });
}
