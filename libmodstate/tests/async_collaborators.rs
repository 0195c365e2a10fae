//! Outside collaborators feeding events back into a store from async tasks

use libmodstate::notify::StoreEvent;
use libmodstate::{build, compose, Event, LocalState, ModuleDecl, Store};
use serde_json::{json, Value};

fn fetch_update(state: &LocalState, event: &Event) -> Option<LocalState> {
    let mut next = state.clone();
    match event.label()? {
        "FETCH" => next.ui["isLoading"] = json!(true),
        "FETCH_SUCCESS" => {
            next.ui["isLoading"] = json!(false);
            next.data["profile"] = event.payload.clone();
        }
        _ => return None,
    }
    Some(next)
}

fn store() -> Store {
    let app = ModuleDecl::app().child(
        ModuleDecl::new("user")
            .emits("FETCH")
            .emits("FETCH_SUCCESS")
            .update(fetch_update),
    );
    Store::new(compose(build(app).unwrap()))
}

#[tokio::test]
async fn test_follow_up_event_from_spawned_task() {
    let mut store = store();
    let handle = store.handle();

    store.dispatch("USER/FETCH", Value::Null);
    assert_eq!(store.state().child("USER").unwrap().ui()["isLoading"], json!(true));

    let fetcher = tokio::spawn(async move {
        handle
            .dispatch("USER/FETCH_SUCCESS", json!({"name": "ada"}))
            .unwrap();
    });
    fetcher.await.unwrap();

    assert_eq!(store.pending(), 1);
    assert_eq!(store.run_pending(), 1);

    let user = store.state();
    let user = user.child("USER").unwrap();
    assert_eq!(user.ui()["isLoading"], json!(false));
    assert_eq!(user.data()["profile"], json!({"name": "ada"}));
}

#[tokio::test]
async fn test_async_subscriber_sees_events_in_order() {
    let mut store = store();
    let mut events = store.events();

    store.dispatch("USER/FETCH", Value::Null);
    store.dispatch("NONEXISTENT/EVENT", Value::Null);
    store.dispatch("USER/FETCH_SUCCESS", json!({}));

    let mut seen = Vec::new();
    for _ in 0..3 {
        seen.push(events.recv().await.unwrap());
    }

    assert_eq!(
        seen,
        vec![
            StoreEvent::Applied {
                event_id: "USER/FETCH".to_string(),
                owner: "USER".to_string(),
                changed: vec!["USER".to_string()],
            },
            StoreEvent::Unhandled {
                event_id: "NONEXISTENT/EVENT".to_string(),
            },
            StoreEvent::Applied {
                event_id: "USER/FETCH_SUCCESS".to_string(),
                owner: "USER".to_string(),
                changed: vec!["USER".to_string()],
            },
        ]
    );
}

#[tokio::test]
async fn test_queued_events_apply_before_direct_dispatch() {
    let mut store = store();
    let handle = store.handle();

    let sender = tokio::spawn(async move {
        handle.dispatch("USER/FETCH", Value::Null).unwrap();
        handle.dispatch("USER/FETCH_SUCCESS", json!({"n": 1})).unwrap();
    });
    sender.await.unwrap();

    // FETCH then FETCH_SUCCESS from the queue, then this FETCH
    store.dispatch("USER/FETCH", Value::Null);

    let state = store.state();
    let user = state.child("USER").unwrap();
    assert_eq!(user.ui()["isLoading"], json!(true));
    assert_eq!(user.data()["profile"], json!({"n": 1}));
    assert_eq!(store.pending(), 0);
}
