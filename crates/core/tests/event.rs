//! Tests for the event bus.

use parking_lot::Mutex;
use quill_core::{Event, EventBus};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
enum Ping {
    A(u32),
    B,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum PingKind {
    A,
    B,
}

impl Event for Ping {
    type Kind = PingKind;

    fn kind(&self) -> PingKind {
        match self {
            Ping::A(_) => PingKind::A,
            Ping::B => PingKind::B,
        }
    }
}

fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> Box<dyn Fn(&Ping) + Send + Sync>) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = log.clone();
    let make = move |tag: &str| -> Box<dyn Fn(&Ping) + Send + Sync> {
        let sink = sink.clone();
        let tag = tag.to_owned();
        Box::new(move |event: &Ping| sink.lock().push(format!("{tag}:{event:?}")))
    };
    (log, make)
}

#[test]
fn routes_by_kind() {
    let bus: EventBus<Ping> = EventBus::new();
    let (log, make) = recorder();
    let a = make("a");
    bus.subscribe(PingKind::A, move |e| a(e));

    bus.emit(&Ping::B);
    bus.emit(&Ping::A(1));
    assert_eq!(*log.lock(), vec!["a:A(1)"]);
}

#[test]
fn handlers_run_in_subscription_order() {
    let bus: EventBus<Ping> = EventBus::new();
    let (log, make) = recorder();
    let (first, second) = (make("first"), make("second"));
    bus.subscribe(PingKind::A, move |e| first(e));
    bus.subscribe(PingKind::A, move |e| second(e));

    bus.emit(&Ping::A(1));
    bus.emit(&Ping::A(2));
    assert_eq!(
        *log.lock(),
        vec!["first:A(1)", "second:A(1)", "first:A(2)", "second:A(2)"]
    );
}

#[test]
fn unsubscribe_stops_delivery() {
    let bus: EventBus<Ping> = EventBus::new();
    let (log, make) = recorder();
    let a = make("a");
    let sub = bus.subscribe(PingKind::A, move |e| a(e));

    assert!(bus.unsubscribe(&sub));
    assert!(!bus.unsubscribe(&sub));
    bus.emit(&Ping::A(1));
    assert!(log.lock().is_empty());
    assert_eq!(bus.listener_count(PingKind::A), 0);
}

#[test]
fn subscribe_many_shares_handler() {
    let bus: EventBus<Ping> = EventBus::new();
    let (log, make) = recorder();
    let all = make("all");
    let subs = bus.subscribe_many(&[PingKind::A, PingKind::B], move |e| all(e));
    assert_eq!(subs.len(), 2);

    bus.emit(&Ping::B);
    bus.emit(&Ping::A(7));
    assert_eq!(*log.lock(), vec!["all:B", "all:A(7)"]);
}

#[test]
fn handler_may_unsubscribe_itself() {
    let bus: Arc<EventBus<Ping>> = Arc::new(EventBus::new());
    let slot = Arc::new(Mutex::new(None));
    let hits = Arc::new(Mutex::new(0));

    let (bus2, slot2, hits2) = (bus.clone(), slot.clone(), hits.clone());
    let sub = bus.subscribe(PingKind::B, move |_| {
        *hits2.lock() += 1;
        if let Some(sub) = slot2.lock().take() {
            bus2.unsubscribe(&sub);
        }
    });
    *slot.lock() = Some(sub);

    bus.emit(&Ping::B);
    bus.emit(&Ping::B);
    assert_eq!(*hits.lock(), 1);
}

#[test]
fn clear_drops_everything() {
    let bus: EventBus<Ping> = EventBus::new();
    bus.subscribe(PingKind::A, |_| {});
    bus.subscribe(PingKind::B, |_| {});
    bus.clear();
    assert_eq!(bus.listener_count(PingKind::A), 0);
    assert_eq!(bus.listener_count(PingKind::B), 0);
}
