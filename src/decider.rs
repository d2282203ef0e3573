//! Decider: the pure command-handling and event-folding state machine.

use std::convert::Infallible;
use std::sync::Arc;

use crate::sum::Sum;

/// Decides which events a command produces against a state.
pub type DecideFunction<'a, C, S, E, Err> =
    Box<dyn Fn(&C, &S) -> Result<Vec<E>, Err> + Send + Sync + 'a>;
/// Folds one event into a state.
pub type EvolveFunction<'a, S, E> = Box<dyn Fn(&S, &E) -> S + Send + Sync + 'a>;
/// Produces the state of an entity that has no history yet.
pub type InitialStateFunction<'a, S> = Box<dyn Fn() -> S + Send + Sync + 'a>;
/// Reports whether a state refuses the given command.
///
/// The command is passed along so a combined decider can consult only the
/// half the command is routed to.
pub type TerminalFunction<'a, C, S> = Box<dyn Fn(&C, &S) -> bool + Send + Sync + 'a>;

/// A pure decision-making state machine.
///
/// A decider is a value description of behaviour: it is built once,
/// typically at process start, and reused for every command. Only state and
/// event values flow through it.
///
/// # Type Parameters
///
/// * `C` - Command: the intent to change the state.
/// * `S` - State: what the decision is taken against.
/// * `E` - Event: the fact produced by a decision.
/// * `Err` - Domain rejection returned by `decide`. Defaults to
///   [`Infallible`] for deciders that never reject.
///
/// # Contract
///
/// - `decide` must be a pure function of the command and the state.
/// - `evolve` must be total and deterministic: folding the same events from
///   the same state always yields the same state.
/// - `is_terminal` defaults to "never terminal". The engines refuse to call
///   `decide` when the state is terminal for the command at hand.
pub struct Decider<'a, C, S, E, Err = Infallible> {
    decide: DecideFunction<'a, C, S, E, Err>,
    evolve: EvolveFunction<'a, S, E>,
    initial_state: InitialStateFunction<'a, S>,
    is_terminal: TerminalFunction<'a, C, S>,
}

impl<'a, C: 'a, S: 'a, E: 'a, Err: 'a> Decider<'a, C, S, E, Err> {
    /// Build a decider from its three behaviour functions.
    ///
    /// The resulting decider is never terminal; see
    /// [`with_terminal`](Decider::with_terminal).
    pub fn new(
        decide: impl Fn(&C, &S) -> Result<Vec<E>, Err> + Send + Sync + 'a,
        evolve: impl Fn(&S, &E) -> S + Send + Sync + 'a,
        initial_state: impl Fn() -> S + Send + Sync + 'a,
    ) -> Self {
        Self {
            decide: Box::new(decide),
            evolve: Box::new(evolve),
            initial_state: Box::new(initial_state),
            is_terminal: Box::new(|_: &C, _: &S| false),
        }
    }

    /// Replace the terminal predicate.
    ///
    /// Once `is_terminal` holds for a state, every command against that
    /// state is refused by the engines.
    pub fn with_terminal(mut self, is_terminal: impl Fn(&S) -> bool + Send + Sync + 'a) -> Self {
        self.is_terminal = Box::new(move |_: &C, state: &S| is_terminal(state));
        self
    }

    /// Run the decision function.
    ///
    /// This does not consult the terminal predicate; engines do that before
    /// calling it.
    pub fn decide(&self, command: &C, state: &S) -> Result<Vec<E>, Err> {
        (self.decide)(command, state)
    }

    /// Fold a single event into `state`.
    pub fn evolve(&self, state: &S, event: &E) -> S {
        (self.evolve)(state, event)
    }

    /// The state of an entity with no history.
    pub fn initial_state(&self) -> S {
        (self.initial_state)()
    }

    /// Whether `state` refuses `command`.
    ///
    /// For a single decider this ignores the command. A combined decider
    /// answers for the half `command` is routed to.
    pub fn is_terminal(&self, command: &C, state: &S) -> bool {
        (self.is_terminal)(command, state)
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

    /// Event-sourced computation: rebuild the state from `prior_events`
    /// starting at the initial state, then decide `command` against it.
    pub fn compute_new_events(&self, prior_events: &[E], command: &C) -> Result<Vec<E>, Err> {
        let state = self.evolve_all(self.initial_state(), prior_events);
        self.decide(command, &state)
    }

    /// State-stored computation: decide `command` against `current` (or the
    /// initial state) and fold the produced events back into it.
    pub fn compute_new_state(&self, current: Option<S>, command: &C) -> Result<S, Err> {
        let state = current.unwrap_or_else(|| self.initial_state());
        let events = self.decide(command, &state)?;
        Ok(self.evolve_all(state, &events))
    }

    /// Adapt the decider to accept commands of another type.
    ///
    /// `f` translates the caller's command into this decider's command.
    pub fn map_command<C2: 'a>(
        self,
        f: impl Fn(&C2) -> C + Send + Sync + 'a,
    ) -> Decider<'a, C2, S, E, Err> {
        let f = Arc::new(f);
        let decide_f = Arc::clone(&f);
        let decide = self.decide;
        let is_terminal = self.is_terminal;
        Decider {
            decide: Box::new(move |command: &C2, state: &S| decide(&decide_f(command), state)),
            evolve: self.evolve,
            initial_state: self.initial_state,
            is_terminal: Box::new(move |command: &C2, state: &S| is_terminal(&f(command), state)),
        }
    }

    /// Adapt the decider to another event type.
    ///
    /// `into` converts incoming events before folding; `from` converts the
    /// events produced by `decide`.
    pub fn map_event<E2: 'a>(
        self,
        into: impl Fn(&E2) -> E + Send + Sync + 'a,
        from: impl Fn(&E) -> E2 + Send + Sync + 'a,
    ) -> Decider<'a, C, S, E2, Err> {
        let decide = self.decide;
        let evolve = self.evolve;
        Decider {
            decide: Box::new(move |command: &C, state: &S| {
                decide(command, state).map(|events| events.iter().map(&from).collect())
            }),
            evolve: Box::new(move |state: &S, event: &E2| evolve(state, &into(event))),
            initial_state: self.initial_state,
            is_terminal: self.is_terminal,
        }
    }

    /// Adapt the decider to another state type.
    ///
    /// `into` reads this decider's state out of the caller's state; `from`
    /// builds the caller's state back from it.
    pub fn map_state<S2: 'a>(
        self,
        into: impl Fn(&S2) -> S + Send + Sync + 'a,
        from: impl Fn(&S) -> S2 + Send + Sync + 'a,
    ) -> Decider<'a, C, S2, E, Err> {
        let into = Arc::new(into);
        let from = Arc::new(from);
        let decide = self.decide;
        let evolve = self.evolve;
        let initial_state = self.initial_state;
        let is_terminal = self.is_terminal;

        let decide_into = Arc::clone(&into);
        let evolve_into = Arc::clone(&into);
        let evolve_from = Arc::clone(&from);
        Decider {
            decide: Box::new(move |command: &C, state: &S2| {
                decide(command, &decide_into(state))
            }),
            evolve: Box::new(move |state: &S2, event: &E| {
                evolve_from(&evolve(&evolve_into(state), event))
            }),
            initial_state: Box::new(move || from(&initial_state())),
            is_terminal: Box::new(move |command: &C, state: &S2| {
                is_terminal(command, &into(state))
            }),
        }
    }

    /// Translate the domain rejection type.
    pub fn map_error<Err2: 'a>(
        self,
        f: impl Fn(Err) -> Err2 + Send + Sync + 'a,
    ) -> Decider<'a, C, S, E, Err2> {
        let decide = self.decide;
        Decider {
            decide: Box::new(move |command: &C, state: &S| decide(command, state).map_err(&f)),
            evolve: self.evolve,
            initial_state: self.initial_state,
            is_terminal: self.is_terminal,
        }
    }

    /// Merge two independent deciders into one.
    ///
    /// The combined decider routes `Sum::Left` commands to `self` and
    /// `Sum::Right` commands to `other`, tags the produced events with the
    /// same side, and keeps both states side by side. An event only evolves
    /// the half of the state it is tagged for.
    ///
    /// A command is refused only when the half it is routed to is terminal.
    /// The other half keeps accepting its own commands.
    pub fn combine<C2: 'a, S2: 'a, E2: 'a>(
        self,
        other: Decider<'a, C2, S2, E2, Err>,
    ) -> Decider<'a, Sum<C, C2>, (S, S2), Sum<E, E2>, Err>
    where
        S: Clone,
        S2: Clone,
    {
        let (decide_l, evolve_l, initial_l, terminal_l) =
            (self.decide, self.evolve, self.initial_state, self.is_terminal);
        let (decide_r, evolve_r, initial_r, terminal_r) = (
            other.decide,
            other.evolve,
            other.initial_state,
            other.is_terminal,
        );

        Decider {
            decide: Box::new(move |command: &Sum<C, C2>, state: &(S, S2)| match command {
                Sum::Left(command) => decide_l(command, &state.0)
                    .map(|events| events.into_iter().map(Sum::Left).collect()),
                Sum::Right(command) => decide_r(command, &state.1)
                    .map(|events| events.into_iter().map(Sum::Right).collect()),
            }),
            evolve: Box::new(move |state: &(S, S2), event: &Sum<E, E2>| match event {
                Sum::Left(event) => (evolve_l(&state.0, event), state.1.clone()),
                Sum::Right(event) => (state.0.clone(), evolve_r(&state.1, event)),
            }),
            initial_state: Box::new(move || (initial_l(), initial_r())),
            is_terminal: Box::new(move |command: &Sum<C, C2>, state: &(S, S2)| match command {
                Sum::Left(command) => terminal_l(command, &state.0),
                Sum::Right(command) => terminal_r(command, &state.1),
            }),
        }
    }
}

impl<'a, C: 'a, E: 'a, Err: 'a> Decider<'a, C, (), E, Err> {
    /// A decider that never produces events and carries no state.
    ///
    /// Identity element for [`combine`](Decider::combine), up to relabelling.
    pub fn empty() -> Self {
        Decider::new(|_, _| Ok(Vec::new()), |_, _| (), || ())
    }
}
