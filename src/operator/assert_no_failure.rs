use std::{fmt::Debug, marker::PhantomData};

use super::transform::{self, Step, Transform};
use crate::{
    error::{fatal, ContractViolation},
    Completion, Never, Publisher, Subscriber,
};

/// Declares that a stream never fails. A failure reaching this operator is a bug and
/// aborts instead of travelling downstream.
pub struct AssertNoFailure<U> {
    upstream: U,
}

impl<U> AssertNoFailure<U> {
    pub(crate) fn new(upstream: U) -> Self {
        Self { upstream }
    }
}

impl<U> Publisher for AssertNoFailure<U>
where
    U: Publisher,
    U::Failure: Debug,
{
    type Output = U::Output;
    type Failure = Never;

    fn receive<S>(&self, subscriber: S)
    where
        S: Subscriber<Input = U::Output, Failure = Never>,
    {
        transform::attach(&self.upstream, AssertStep(PhantomData), subscriber)
    }
}

struct AssertStep<I, E>(PhantomData<fn(I) -> E>);

impl<I, E> Transform for AssertStep<I, E>
where
    I: Send + 'static,
    E: Debug + Send + 'static,
{
    type Input = I;
    type Output = I;
    type UpstreamFailure = E;
    type Failure = Never;

    fn transform(&mut self, input: I) -> Step<I, Never> {
        Step::Emit(input)
    }

    fn complete(&mut self, completion: Completion<E>) -> Completion<Never> {
        match completion {
            Completion::Finished => Completion::Finished,
            Completion::Failed(failure) => {
                fatal(ContractViolation::UnexpectedFailure(format!("{failure:?}")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        publisher::{Fail, Sequence},
        testing::TestSubscriber,
        Completion, Never, Publisher, PublisherExt,
    };

    #[test]
    fn finished_streams_pass_through() {
        let (subscriber, monitor) = TestSubscriber::<u8, Never>::unbounded();
        Sequence::<_, String>::with_failure_type(vec![1u8, 2])
            .assert_no_failure()
            .receive(subscriber);
        assert_eq!(monitor.items(), vec![1, 2]);
        assert_eq!(monitor.completion(), Some(Completion::Finished));
    }

    #[test]
    #[should_panic(expected = "asserted to never fail")]
    fn a_failure_is_fatal() {
        let (subscriber, _monitor) = TestSubscriber::<u8, Never>::unbounded();
        Fail::<u8, _>::new("boom").assert_no_failure().receive(subscriber);
    }
}
