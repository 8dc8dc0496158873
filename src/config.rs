use crate::Demand;

/// Upstream demand policy of the multi-upstream combinators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Prefetch {
    /// Request everything up front; the combinator buffers what downstream has not
    /// asked for yet.
    #[default]
    Unbounded,
    /// Keep at most `n` requested-but-unreleased items per upstream, asking for one more
    /// each time an item from that upstream is released downstream.
    Window(u64),
}

impl Prefetch {
    pub(crate) fn initial(self) -> Demand {
        match self {
            Self::Unbounded => Demand::Unbounded,
            Self::Window(n) => Demand::max(n.max(1)),
        }
    }

    /// Demand to ask for after one item was consumed.
    pub(crate) fn replenish(self) -> Demand {
        match self {
            Self::Unbounded => Demand::none(),
            Self::Window(_) => Demand::max(1),
        }
    }
}
