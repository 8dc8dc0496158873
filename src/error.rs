use thiserror::Error;

/// Ordinary stream failures raised by the crate's own operators.
///
/// These travel downstream as `Completion::Failed` like any other failure, so they can be
/// recovered with `catch`, `retry` or `map_error`. Operators that raise them require the
/// stream's failure type to implement `From<StreamError>`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    #[error("no item or completion arrived before the timeout")]
    TimeoutExceeded,

    #[error("scheduler unavailable: {0}")]
    SchedulerUnavailable(#[from] SchedulerError),
}

/// Failures reported by a [`Scheduler`](crate::scheduler::Scheduler).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("scheduler is not accepting work")]
    Unavailable,
}

/// Errors returned when feeding a subject through its `futures::Sink` interface.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubjectError {
    #[error("subject already completed")]
    Closed,
}

/// Breaches of the publisher/subscriber contract.
///
/// These are programming errors, not stream failures: they are never delivered as data
/// and always abort through [`fatal`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContractViolation {
    #[error("item delivered without outstanding demand")]
    DemandViolation,

    #[error("item delivered after termination")]
    ItemAfterTermination,

    #[error("termination delivered twice")]
    DoubleTermination,

    #[error("failure reached a stream asserted to never fail: {0}")]
    UnexpectedFailure(String),
}

#[track_caller]
pub(crate) fn fatal(violation: ContractViolation) -> ! {
    log::error!("reactive contract violated: {}", violation);
    panic!("reactive contract violated: {violation}")
}
