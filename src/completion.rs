/// The one-time end-of-stream signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Completion<F> {
    /// The publisher finished normally.
    Finished,
    /// The publisher stopped because of a failure.
    Failed(F),
}

impl<F> Completion<F> {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Finished)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    pub fn failure(&self) -> Option<&F> {
        match self {
            Self::Finished => None,
            Self::Failed(failure) => Some(failure),
        }
    }

    /// Transforms the failure value; `Finished` passes through.
    pub fn map_failure<G>(self, transform: impl FnOnce(F) -> G) -> Completion<G> {
        match self {
            Self::Finished => Completion::Finished,
            Self::Failed(failure) => Completion::Failed(transform(failure)),
        }
    }

    pub fn into_result(self) -> Result<(), F> {
        match self {
            Self::Finished => Ok(()),
            Self::Failed(failure) => Err(failure),
        }
    }
}

impl<F> From<Result<(), F>> for Completion<F> {
    fn from(result: Result<(), F>) -> Self {
        match result {
            Ok(()) => Self::Finished,
            Err(failure) => Self::Failed(failure),
        }
    }
}
