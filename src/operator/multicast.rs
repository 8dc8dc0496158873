use crate::{
    subject::{Subject, SubjectSubscriber},
    AnyCancellable, Publisher, Subscriber,
};

/// Shares one upstream subscription between every subscriber of a subject.
///
/// Subscribers attach to the subject; upstream is only subscribed when
/// [`connect`](Multicast::connect) is called, and as often as it is called.
pub struct Multicast<U, S> {
    upstream: U,
    subject: S,
}

impl<U, S> Multicast<U, S>
where
    U: Publisher,
    S: Subject<Output = U::Output, Failure = U::Failure> + Clone,
{
    pub(crate) fn new(upstream: U, subject: S) -> Self {
        Self { upstream, subject }
    }

    /// Subscribes the subject to upstream. Dropping the handle disconnects it.
    pub fn connect(&self) -> AnyCancellable {
        log::debug!("connecting multicast upstream");
        let (subscriber, cancellable) = SubjectSubscriber::new(self.subject.clone());
        self.upstream.receive(subscriber);
        cancellable
    }
}

impl<U, S> Publisher for Multicast<U, S>
where
    U: Publisher,
    S: Subject<Output = U::Output, Failure = U::Failure> + Clone,
{
    type Output = U::Output;
    type Failure = U::Failure;

    fn receive<R>(&self, subscriber: R)
    where
        R: Subscriber<Input = U::Output, Failure = U::Failure>,
    {
        self.subject.receive(subscriber)
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        publisher::Sequence,
        testing::TestSubscriber,
        Completion, Demand, Never, PassthroughSubject, Publisher, PublisherExt,
    };

    #[test]
    fn one_upstream_run_reaches_every_subscriber() {
        let shared = Sequence::new(vec![1, 2, 3])
            .map(|n| n * 100)
            .multicast(PassthroughSubject::new());

        let (first, first_monitor) = TestSubscriber::<i32, Never>::unbounded();
        let (second, second_monitor) = TestSubscriber::<i32, Never>::new(Demand::max(1));
        shared.receive(first);
        shared.receive(second);
        assert_eq!(first_monitor.items(), Vec::<i32>::new());

        let _connection = shared.connect();
        assert_eq!(first_monitor.items(), vec![100, 200, 300]);
        assert_eq!(second_monitor.items(), vec![100]);
        assert_eq!(first_monitor.completion(), Some(Completion::Finished));
        assert_eq!(second_monitor.completion(), Some(Completion::Finished));
    }
}
