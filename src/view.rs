//! View: a decision-free projection that folds events into a read model.

use std::sync::Arc;

use crate::decider::{EvolveFunction, InitialStateFunction};
use crate::sum::Sum;

/// A pure event-handling algorithm producing denormalized state.
///
/// Structurally the state-and-event half of a [`Decider`](crate::Decider):
/// it folds events but never decides. Views over different event types can
/// be combined into one projection over the tagged union of their events.
///
/// # Contract
///
/// - `evolve` must be total and deterministic.
pub struct View<'a, S, E> {
    evolve: EvolveFunction<'a, S, E>,
    initial_state: InitialStateFunction<'a, S>,
}

impl<'a, S: 'a, E: 'a> View<'a, S, E> {
    /// Build a view from its fold function and initial state.
    pub fn new(
        evolve: impl Fn(&S, &E) -> S + Send + Sync + 'a,
        initial_state: impl Fn() -> S + Send + Sync + 'a,
    ) -> Self {
        Self {
            evolve: Box::new(evolve),
            initial_state: Box::new(initial_state),
        }
    }

    /// Fold a single event into `state`.
    pub fn evolve(&self, state: &S, event: &E) -> S {
        (self.evolve)(state, event)
    }

    /// The state of a projection that has seen no events.
    pub fn initial_state(&self) -> S {
        (self.initial_state)()
    }

    /// Left fold of `events` over `state`, in order.
    pub fn evolve_all<'e>(&self, state: S, events: impl IntoIterator<Item = &'e E>) -> S
    where
        E: 'e,
    {
        events
            .into_iter()
            .fold(state, |state, event| self.evolve(&state, event))
    }

    /// Fold `events` into `current`, or into the initial state when the
    /// projection has not been persisted yet.
    pub fn compute_new_state(&self, current: Option<S>, events: &[E]) -> S {
        let state = current.unwrap_or_else(|| self.initial_state());
        self.evolve_all(state, events)
    }

    /// Adapt the view to consume events of another type.
    pub fn map_event<E2: 'a>(self, f: impl Fn(&E2) -> E + Send + Sync + 'a) -> View<'a, S, E2> {
        let evolve = self.evolve;
        View {
            evolve: Box::new(move |state: &S, event: &E2| evolve(state, &f(event))),
            initial_state: self.initial_state,
        }
    }

    /// Adapt the view to another state type.
    ///
    /// `into` reads this view's state out of the caller's state; `from`
    /// builds the caller's state back from it.
    pub fn map_state<S2: 'a>(
        self,
        into: impl Fn(&S2) -> S + Send + Sync + 'a,
        from: impl Fn(&S) -> S2 + Send + Sync + 'a,
    ) -> View<'a, S2, E> {
        let from = Arc::new(from);
        let evolve_from = Arc::clone(&from);
        let evolve = self.evolve;
        let initial_state = self.initial_state;
        View {
            evolve: Box::new(move |state: &S2, event: &E| {
                evolve_from(&evolve(&into(state), event))
            }),
            initial_state: Box::new(move || from(&initial_state())),
        }
    }

    /// Merge two independent views into one.
    ///
    /// Events tagged `Sum::Left` evolve the first half of the paired state,
    /// `Sum::Right` events the second half.
    pub fn combine<S2: 'a, E2: 'a>(self, other: View<'a, S2, E2>) -> View<'a, (S, S2), Sum<E, E2>>
    where
        S: Clone,
        S2: Clone,
    {
        let (evolve_l, initial_l) = (self.evolve, self.initial_state);
        let (evolve_r, initial_r) = (other.evolve, other.initial_state);
        View {
            evolve: Box::new(move |state: &(S, S2), event: &Sum<E, E2>| match event {
                Sum::Left(event) => (evolve_l(&state.0, event), state.1.clone()),
                Sum::Right(event) => (state.0.clone(), evolve_r(&state.1, event)),
            }),
            initial_state: Box::new(move || (initial_l(), initial_r())),
        }
    }
}

impl<'a, E: 'a> View<'a, (), E> {
    /// A view that ignores every event.
    pub fn empty() -> Self {
        View::new(|_, _| (), || ())
    }
}
