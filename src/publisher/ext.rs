use std::{num::NonZeroUsize, time::Duration};

use crate::{
    codec::{Decode, Decoder, Encode, Encoder},
    combinator::{CombineLatest, Merge, Zip},
    operator::{
        AssertNoFailure, Catch, Chunks, Collect, Filter, FilterMap, Map, MapError, Multicast,
        ReceiveOn, Reduce, Retry, Scan, SetFailureType, Skip, SubscribeOn, Take, TryMap,
    },
    scheduler::Scheduler,
    subject::{Subject, SubjectSubscriber},
    time::{Debounce, Delay, MeasureInterval, Throttle, Timeout},
    AnyCancellable, AnyPublisher, Completion, Never, Publisher, Sink, StreamError, Values,
};

/// Operator chaining for every [`Publisher`].
///
/// Each method wraps `self` in a new publisher; nothing is subscribed until a terminal
/// such as [`sink`](PublisherExt::sink) or [`into_stream`](PublisherExt::into_stream)
/// attaches at the end of the chain.
pub trait PublisherExt: Publisher + Sized {
    /// Erases the publisher's type.
    fn any(self) -> AnyPublisher<Self::Output, Self::Failure> {
        AnyPublisher::new(self)
    }

    fn map<F, T>(self, transform: F) -> Map<Self, F>
    where
        F: Fn(Self::Output) -> T + Send + Sync + 'static,
        T: Send + 'static,
    {
        Map::new(self, transform)
    }

    fn try_map<F, T>(self, transform: F) -> TryMap<Self, F>
    where
        F: Fn(Self::Output) -> Result<T, Self::Failure> + Send + Sync + 'static,
        T: Send + 'static,
    {
        TryMap::new(self, transform)
    }

    fn filter<P>(self, predicate: P) -> Filter<Self, P>
    where
        P: Fn(&Self::Output) -> bool + Send + Sync + 'static,
    {
        Filter::new(self, predicate)
    }

    fn filter_map<F, T>(self, transform: F) -> FilterMap<Self, F>
    where
        F: Fn(Self::Output) -> Option<T> + Send + Sync + 'static,
        T: Send + 'static,
    {
        FilterMap::new(self, transform)
    }

    fn scan<A, F>(self, initial: A, accumulate: F) -> Scan<Self, A, F>
    where
        A: Clone + Send + Sync + 'static,
        F: Fn(&A, Self::Output) -> A + Send + Sync + 'static,
    {
        Scan::new(self, initial, accumulate)
    }

    fn take(self, count: u64) -> Take<Self> {
        Take::new(self, count)
    }

    fn skip(self, count: u64) -> Skip<Self> {
        Skip::new(self, count)
    }

    /// Folds the whole stream into a single value emitted on `Finished`.
    fn reduce<A, F>(self, initial: A, accumulate: F) -> Reduce<Self, A, F>
    where
        A: Clone + Send + Sync + 'static,
        F: Fn(A, Self::Output) -> A + Send + Sync + 'static,
    {
        Reduce::new(self, initial, accumulate)
    }

    fn collect(self) -> Collect<Self> {
        Collect::new(self)
    }

    /// Groups items into vectors of `size`.
    fn chunks(self, size: NonZeroUsize) -> Chunks<Self> {
        Chunks::new(self, size)
    }

    fn merge<P>(self, other: P) -> Merge<Self::Output, Self::Failure>
    where
        P: Publisher<Output = Self::Output, Failure = Self::Failure>,
    {
        Merge::new([self.any(), other.any()])
    }

    fn zip<P>(self, other: P) -> Zip<Self, P>
    where
        P: Publisher<Failure = Self::Failure>,
    {
        Zip::new(self, other)
    }

    fn combine_latest<P>(self, other: P) -> CombineLatest<Self, P>
    where
        P: Publisher<Failure = Self::Failure>,
        Self::Output: Clone,
        P::Output: Clone,
    {
        CombineLatest::new(self, other)
    }

    fn debounce<C>(self, window: Duration, scheduler: C) -> Debounce<Self, C>
    where
        C: Scheduler,
        Self::Failure: From<StreamError>,
    {
        Debounce::new(self, window, scheduler)
    }

    fn throttle<C>(self, interval: Duration, scheduler: C, emit_first: bool) -> Throttle<Self, C>
    where
        C: Scheduler,
        Self::Failure: From<StreamError>,
    {
        Throttle::new(self, interval, scheduler, emit_first)
    }

    fn delay<C>(self, interval: Duration, scheduler: C) -> Delay<Self, C>
    where
        C: Scheduler,
        Self::Failure: From<StreamError>,
    {
        Delay::new(self, interval, scheduler)
    }

    /// Fails with [`StreamError::TimeoutExceeded`] when upstream stays silent for
    /// `interval`.
    fn timeout<C>(self, interval: Duration, scheduler: C) -> Timeout<Self, C>
    where
        C: Scheduler,
        Self::Failure: From<StreamError>,
    {
        Timeout::new(self, interval, scheduler)
    }

    fn measure_interval<C: Scheduler>(self, scheduler: C) -> MeasureInterval<Self, C> {
        MeasureInterval::new(self, scheduler)
    }

    fn receive_on<C>(self, scheduler: C) -> ReceiveOn<Self, C>
    where
        C: Scheduler,
        Self::Failure: From<StreamError>,
    {
        ReceiveOn::new(self, scheduler)
    }

    fn subscribe_on<C>(self, scheduler: C) -> SubscribeOn<Self, C>
    where
        C: Scheduler,
        Self::Failure: From<StreamError>,
    {
        SubscribeOn::new(self, scheduler)
    }

    /// Resubscribes after a failure, at most `attempts` times.
    fn retry(self, attempts: u64) -> Retry<Self> {
        Retry::new(self, attempts)
    }

    /// Replaces a failed stream with the publisher `handler` builds from the failure.
    fn catch<H, P>(self, handler: H) -> Catch<Self, H>
    where
        H: Fn(Self::Failure) -> P + Send + Sync + 'static,
        P: Publisher<Output = Self::Output>,
    {
        Catch::new(self, handler)
    }

    fn map_error<F, E>(self, transform: F) -> MapError<Self, F>
    where
        F: Fn(Self::Failure) -> E + Send + Sync + 'static,
        E: Send + 'static,
    {
        MapError::new(self, transform)
    }

    fn set_failure_type<E>(self) -> SetFailureType<Self, E>
    where
        Self: Publisher<Failure = Never>,
        E: Send + 'static,
    {
        SetFailureType::new(self)
    }

    /// Panics if the stream fails.
    fn assert_no_failure(self) -> AssertNoFailure<Self>
    where
        Self::Failure: std::fmt::Debug,
    {
        AssertNoFailure::new(self)
    }

    fn decode<D, T>(self, decoder: D) -> Decode<Self, D, T>
    where
        D: Decoder<T>,
        Self::Output: AsRef<[u8]>,
        Self::Failure: From<D::Error>,
        T: Send + 'static,
    {
        Decode::new(self, decoder)
    }

    fn encode<C>(self, encoder: C) -> Encode<Self, C>
    where
        C: Encoder<Self::Output>,
        Self::Failure: From<C::Error>,
    {
        Encode::new(self, encoder)
    }

    /// Subscribes with unbounded demand, handing items and the completion to closures.
    /// Dropping the returned handle cancels the subscription.
    fn sink<C, V>(&self, on_completion: C, on_value: V) -> AnyCancellable
    where
        C: FnOnce(Completion<Self::Failure>) + Send + 'static,
        V: FnMut(Self::Output) + Send + 'static,
    {
        let (sink, cancellable) = Sink::new(on_completion, on_value);
        self.receive(sink);
        cancellable
    }

    /// Feeds every item and the completion into `subject`.
    fn subscribe_subject<S>(&self, subject: S) -> AnyCancellable
    where
        S: Subject<Output = Self::Output, Failure = Self::Failure>,
    {
        let (subscriber, cancellable) = SubjectSubscriber::new(subject);
        self.receive(subscriber);
        cancellable
    }

    /// Shares this publisher through `subject` once connected.
    fn multicast<S>(self, subject: S) -> Multicast<Self, S>
    where
        S: Subject<Output = Self::Output, Failure = Self::Failure> + Clone,
    {
        Multicast::new(self, subject)
    }

    /// Subscribes and exposes the items as a `futures::Stream`.
    fn into_stream(self) -> Values<Self::Output, Self::Failure> {
        Values::new(&self)
    }
}

impl<P: Publisher> PublisherExt for P {}
