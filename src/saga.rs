//! Saga: a stateless mapping from action results (events) to follow-up
//! actions (commands).

use crate::sum::Sum;

/// Decides which actions follow from an action result.
pub type ReactFunction<'a, AR, A> = Box<dyn Fn(&AR) -> Vec<A> + Send + Sync + 'a>;

/// A pure reaction function.
///
/// # Type Parameters
///
/// * `AR` - Action result, usually an event.
/// * `A` - Action, usually a command.
///
/// # Contract
///
/// - [`react`](Saga::react) must be deterministic and carry no state
///   between invocations.
/// - Returning an empty vector ends the reaction chain for that input.
pub struct Saga<'a, AR, A> {
    react: ReactFunction<'a, AR, A>,
}

impl<'a, AR: 'a, A: 'a> Saga<'a, AR, A> {
    /// Build a saga from its reaction function.
    pub fn new(react: impl Fn(&AR) -> Vec<A> + Send + Sync + 'a) -> Self {
        Self {
            react: Box::new(react),
        }
    }

    /// A saga that reacts to nothing.
    ///
    /// Identity element for both [`combine`](Saga::combine) (up to
    /// relabelling) and [`merge`](Saga::merge).
    pub fn empty() -> Self {
        Saga::new(|_| Vec::new())
    }

    /// Compute the actions that follow from `action_result`.
    pub fn react(&self, action_result: &AR) -> Vec<A> {
        (self.react)(action_result)
    }

    /// Adapt the saga to react to action results of another type.
    pub fn map_action_result<AR2: 'a>(
        self,
        f: impl Fn(&AR2) -> AR + Send + Sync + 'a,
    ) -> Saga<'a, AR2, A> {
        let react = self.react;
        Saga {
            react: Box::new(move |action_result: &AR2| react(&f(action_result))),
        }
    }

    /// Translate every produced action.
    pub fn map_action<A2: 'a>(self, f: impl Fn(A) -> A2 + Send + Sync + 'a) -> Saga<'a, AR, A2> {
        let react = self.react;
        Saga {
            react: Box::new(move |action_result: &AR| {
                react(action_result).into_iter().map(&f).collect()
            }),
        }
    }

    /// Merge two independent sagas into one over tagged inputs and outputs.
    ///
    /// A `Sum::Left` action result is routed to `self` and its actions are
    /// tagged `Sum::Left`; symmetrically for `Sum::Right`.
    pub fn combine<AR2: 'a, A2: 'a>(
        self,
        other: Saga<'a, AR2, A2>,
    ) -> Saga<'a, Sum<AR, AR2>, Sum<A, A2>> {
        let (react_l, react_r) = (self.react, other.react);
        Saga {
            react: Box::new(move |action_result: &Sum<AR, AR2>| match action_result {
                Sum::Left(ar) => react_l(ar).into_iter().map(Sum::Left).collect(),
                Sum::Right(ar) => react_r(ar).into_iter().map(Sum::Right).collect(),
            }),
        }
    }

    /// Run two sagas over the same input and concatenate their actions,
    /// `self` first.
    pub fn merge(self, other: Saga<'a, AR, A>) -> Saga<'a, AR, A> {
        let (first, second) = (self.react, other.react);
        Saga {
            react: Box::new(move |action_result: &AR| {
                let mut actions = first(action_result);
                actions.extend(second(action_result));
                actions
            }),
        }
    }
}
