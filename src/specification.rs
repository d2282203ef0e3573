//! Given/when/then helpers for testing pure machines.
//!
//! The `then*` methods panic with a readable message on mismatch, so they
//! are meant for test code.
//!
//! ```
//! use eventfold_decider::{Decider, DeciderSpecification};
//!
//! #[derive(Debug, PartialEq)]
//! struct Deposited(u32);
//!
//! let account: Decider<u32, u32, Deposited> = Decider::new(
//!     |amount, _balance| Ok(vec![Deposited(*amount)]),
//!     |balance, Deposited(amount)| balance + amount,
//!     || 0,
//! );
//!
//! DeciderSpecification::new(&account)
//!     .given([Deposited(5)])
//!     .when(3)
//!     .then([Deposited(3)]);
//!
//! DeciderSpecification::new(&account)
//!     .given_state(5)
//!     .when(3)
//!     .then_state(8);
//! ```

use std::fmt::Debug;

use crate::decider::Decider;
use crate::saga::Saga;
use crate::view::View;

enum Given<S, E> {
    Events(Vec<E>),
    State(S),
}

/// Scenario for a [`Decider`]: prior events or prior state, then a command.
pub struct DeciderSpecification<'d, 'a, C, S, E, Err> {
    decider: &'d Decider<'a, C, S, E, Err>,
    given: Given<S, E>,
    command: Option<C>,
}

impl<'d, 'a, C, S, E, Err> DeciderSpecification<'d, 'a, C, S, E, Err>
where
    C: 'a,
    S: 'a,
    E: 'a,
    Err: 'a,
{
    /// Start a scenario with an empty history.
    pub fn new(decider: &'d Decider<'a, C, S, E, Err>) -> Self {
        Self {
            decider,
            given: Given::Events(Vec::new()),
            command: None,
        }
    }

    /// Event-sourced history the command is decided against.
    pub fn given(mut self, events: impl IntoIterator<Item = E>) -> Self {
        self.given = Given::Events(events.into_iter().collect());
        self
    }

    /// Stored state the command is decided against.
    pub fn given_state(mut self, state: S) -> Self {
        self.given = Given::State(state);
        self
    }

    /// The command under test.
    pub fn when(mut self, command: C) -> Self {
        self.command = Some(command);
        self
    }

    /// Assert the command decides exactly `expected`.
    #[track_caller]
    pub fn then(self, expected: impl IntoIterator<Item = E>)
    where
        E: PartialEq + Debug,
        Err: Debug,
    {
        let (_, decided) = self.run();
        let expected: Vec<E> = expected.into_iter().collect();
        match decided {
            Ok(events) => assert_eq!(events, expected, "decided events differ"),
            Err(err) => panic!("expected events {expected:?}, but the command failed: {err:?}"),
        }
    }

    /// Assert the state after applying the decided events.
    #[track_caller]
    pub fn then_state(self, expected: S)
    where
        S: PartialEq + Debug,
        Err: Debug,
    {
        let decider = self.decider;
        let (state, decided) = self.run();
        match decided {
            Ok(events) => assert_eq!(
                decider.evolve_all(state, &events),
                expected,
                "resulting state differs"
            ),
            Err(err) => panic!("expected state {expected:?}, but the command failed: {err:?}"),
        }
    }

    /// Assert the command is rejected with `expected`.
    #[track_caller]
    pub fn then_error(self, expected: Err)
    where
        E: Debug,
        Err: PartialEq + Debug,
    {
        let (_, decided) = self.run();
        match decided {
            Ok(events) => panic!("expected error {expected:?}, but the command decided {events:?}"),
            Err(err) => assert_eq!(err, expected, "rejection differs"),
        }
    }

    #[track_caller]
    fn run(self) -> (S, Result<Vec<E>, Err>) {
        let Some(command) = self.command else {
            panic!("no command to decide: call `when` before `then`");
        };
        let state = match self.given {
            Given::Events(events) => self
                .decider
                .evolve_all(self.decider.initial_state(), &events),
            Given::State(state) => state,
        };
        let decided = self.decider.decide(&command, &state);
        (state, decided)
    }
}

/// Scenario for a [`View`]: events folded from the initial state.
pub struct ViewSpecification<'v, 'a, S, E> {
    view: &'v View<'a, S, E>,
    events: Vec<E>,
}

impl<'v, 'a, S: 'a, E: 'a> ViewSpecification<'v, 'a, S, E> {
    /// Start a scenario with no events.
    pub fn new(view: &'v View<'a, S, E>) -> Self {
        Self {
            view,
            events: Vec::new(),
        }
    }

    /// Events folded, in order, from the view's initial state.
    pub fn given(mut self, events: impl IntoIterator<Item = E>) -> Self {
        self.events = events.into_iter().collect();
        self
    }

    /// Assert the projected state.
    #[track_caller]
    pub fn then(self, expected: S)
    where
        S: PartialEq + Debug,
    {
        let state = self.view.compute_new_state(None, &self.events);
        assert_eq!(state, expected, "projected state differs");
    }
}

/// Scenario for a [`Saga`]: one action result and the actions it derives.
pub struct SagaSpecification<'g, 'a, AR, A> {
    saga: &'g Saga<'a, AR, A>,
    action_result: Option<AR>,
}

impl<'g, 'a, AR: 'a, A: 'a> SagaSpecification<'g, 'a, AR, A> {
    /// Start a scenario for `saga`.
    pub fn new(saga: &'g Saga<'a, AR, A>) -> Self {
        Self {
            saga,
            action_result: None,
        }
    }

    /// The action result the saga reacts to.
    pub fn when(mut self, action_result: AR) -> Self {
        self.action_result = Some(action_result);
        self
    }

    /// Assert the derived actions, in order.
    #[track_caller]
    pub fn then(self, expected: impl IntoIterator<Item = A>)
    where
        A: PartialEq + Debug,
    {
        let Some(action_result) = self.action_result else {
            panic!("no action result to react to: call `when` before `then`");
        };
        let expected: Vec<A> = expected.into_iter().collect();
        assert_eq!(
            self.saga.react(&action_result),
            expected,
            "derived actions differ"
        );
    }
}
