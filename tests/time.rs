mod common;

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use common::ms;
use futures_reactive::{
    publisher::{Deferred, Record},
    testing::{TestSubscriber, VirtualTimeScheduler},
    Completion, PassthroughSubject, Publisher, PublisherExt, StreamError, Subject,
};

#[test]
fn debounce_emits_after_each_quiet_window() {
    common::init_logging();
    let scheduler = VirtualTimeScheduler::new();
    let input = PassthroughSubject::<u32, StreamError>::new();
    let (subscriber, monitor) = TestSubscriber::unbounded();
    input
        .clone()
        .debounce(ms(100), scheduler.clone())
        .receive(subscriber);

    for (at, item) in [(0, 1), (40, 2), (90, 3), (200, 4)] {
        scheduler.advance_to(ms(at));
        input.send(item);
    }
    assert_eq!(monitor.items(), vec![3]);
    scheduler.advance_to(ms(299));
    assert_eq!(monitor.items(), vec![3]);
    scheduler.advance_to(ms(300));
    assert_eq!(monitor.items(), vec![3, 4]);
}

#[test]
fn timeout_fails_a_silent_stream() {
    let scheduler = VirtualTimeScheduler::new();
    let input = PassthroughSubject::<u32, StreamError>::new();
    let (subscriber, monitor) = TestSubscriber::unbounded();
    input
        .clone()
        .timeout(ms(50), scheduler.clone())
        .receive(subscriber);

    scheduler.advance_to(ms(40));
    input.send(1);
    scheduler.advance_to(ms(89));
    assert_eq!(monitor.completion(), None);
    scheduler.advance_to(ms(90));

    assert_eq!(monitor.items(), vec![1]);
    assert_eq!(
        monitor.completion(),
        Some(Completion::Failed(StreamError::TimeoutExceeded))
    );
    assert_eq!(input.subscriber_count(), 0);
}

#[test]
fn retry_resubscribes_up_to_the_budget() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();
    let source = Deferred::new(move || {
        let attempt = counter.fetch_add(1, Ordering::SeqCst) as u32;
        Record::new(vec![attempt + 1], Completion::Failed("boom"))
    });
    let (subscriber, monitor) = TestSubscriber::unbounded();
    source.retry(2).receive(subscriber);

    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert_eq!(monitor.items(), vec![1, 2, 3]);
    assert_eq!(monitor.completion(), Some(Completion::Failed("boom")));
}

#[test]
fn receive_on_moves_delivery_onto_the_scheduler() {
    let scheduler = VirtualTimeScheduler::new();
    let (subscriber, monitor) = TestSubscriber::unbounded();
    Record::<u32, StreamError>::new(vec![1, 2], Completion::Finished)
        .receive_on(scheduler.clone())
        .receive(subscriber);
    assert!(monitor.items().is_empty());
    scheduler.run();
    assert_eq!(monitor.items(), vec![1, 2]);
    assert_eq!(monitor.completion(), Some(Completion::Finished));
}
