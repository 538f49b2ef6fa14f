use std::sync::mpsc;
use std::sync::{Arc, Mutex};

use super::*;

#[test]
fn handlers_run_in_registration_order() {
    let seen = Arc::new(Mutex::new(Vec::<String>::new()));
    let mut emitter = EventEmitter::<u32>::new();

    let a = seen.clone();
    emitter.subscribe(move |v| a.lock().unwrap().push(format!("a{v}")));
    let b = seen.clone();
    emitter.subscribe(move |v| b.lock().unwrap().push(format!("b{v}")));

    emitter.emit(&1);
    emitter.emit(&2);
    assert_eq!(*seen.lock().unwrap(), vec!["a1", "b1", "a2", "b2"]);
}

#[test]
fn unsubscribe_removes_only_that_handler() {
    let count = Arc::new(Mutex::new(0u32));
    let mut emitter = EventEmitter::<()>::new();

    let c1 = count.clone();
    let first = emitter.subscribe(move |_| *c1.lock().unwrap() += 1);
    let c2 = count.clone();
    emitter.subscribe(move |_| *c2.lock().unwrap() += 10);

    assert!(emitter.unsubscribe(first));
    assert!(!emitter.unsubscribe(first));
    emitter.emit(&());
    assert_eq!(*count.lock().unwrap(), 10);
    assert_eq!(emitter.len(), 1);
}

#[test]
fn clear_drops_everything() {
    let mut emitter = EventEmitter::<u8>::new();
    emitter.subscribe(|_| {});
    emitter.subscribe(|_| {});
    emitter.clear();
    assert!(emitter.is_empty());
    emitter.emit(&0);
}

#[test]
fn forward_to_channel_clones_events() {
    let (tx, rx) = mpsc::channel();
    let mut emitter = EventEmitter::<String>::new();
    emitter.forward_to(tx);

    emitter.emit(&"hello".to_string());
    emitter.emit(&"world".to_string());
    let got: Vec<String> = rx.try_iter().collect();
    assert_eq!(got, vec!["hello", "world"]);

    drop(rx);
    // Disconnected receivers must not panic the emitter.
    emitter.emit(&"late".to_string());
}
