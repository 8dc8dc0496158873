mod common;

use futures_reactive::{
    combinator::Merge,
    publisher::Sequence,
    testing::TestSubscriber,
    Completion, PassthroughSubject, Publisher, PublisherExt, Subject,
};

#[test]
fn merge_finishes_only_when_every_upstream_finished() {
    common::init_logging();
    let first = PassthroughSubject::<u32, u8>::new();
    let second = PassthroughSubject::<u32, u8>::new();
    let (subscriber, monitor) = TestSubscriber::unbounded();
    Merge::new([first.clone().any(), second.clone().any()]).receive(subscriber);

    first.send(1);
    second.send(2);
    first.send_completion(Completion::Finished);
    assert_eq!(monitor.completion(), None);
    second.send(3);
    second.send_completion(Completion::Finished);

    assert_eq!(monitor.items(), vec![1, 2, 3]);
    assert_eq!(monitor.completion(), Some(Completion::Finished));
}

#[test]
fn merge_fails_fast_and_cancels_the_rest() {
    let first = PassthroughSubject::<u32, u8>::new();
    let second = PassthroughSubject::<u32, u8>::new();
    let third = PassthroughSubject::<u32, u8>::new();
    let (subscriber, monitor) = TestSubscriber::unbounded();
    Merge::new([
        first.clone().any(),
        second.clone().any(),
        third.clone().any(),
    ])
    .receive(subscriber);

    first.send(1);
    second.send_completion(Completion::Failed(9));

    assert_eq!(monitor.items(), vec![1]);
    assert_eq!(monitor.completion(), Some(Completion::Failed(9)));
    assert_eq!(first.subscriber_count(), 0);
    assert_eq!(third.subscriber_count(), 0);
}

#[test]
fn zip_stops_when_the_shorter_side_runs_out() {
    let (subscriber, monitor) = TestSubscriber::unbounded();
    Sequence::new(vec![1, 2, 3])
        .zip(Sequence::new(vec!["a", "b"]))
        .receive(subscriber);
    assert_eq!(monitor.items(), vec![(1, "a"), (2, "b")]);
    assert_eq!(monitor.completion(), Some(Completion::Finished));
}

#[test]
fn combine_latest_pairs_the_latest_values_once() {
    let numbers = PassthroughSubject::<u32>::new();
    let letters = PassthroughSubject::<&'static str>::new();
    let (subscriber, monitor) = TestSubscriber::unbounded();
    numbers
        .clone()
        .combine_latest(letters.clone())
        .receive(subscriber);

    numbers.send(1);
    numbers.send(2);
    letters.send("x");
    numbers.send_completion(Completion::Finished);

    assert_eq!(monitor.items(), vec![(2, "x")]);
    assert_eq!(monitor.completion(), None);
    letters.send_completion(Completion::Finished);
    assert_eq!(monitor.completion(), Some(Completion::Finished));
}
