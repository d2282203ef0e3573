//! Aggregates: engines that run a [`Decider`] against a repository.
//!
//! Two persistence flavors are provided. Event-sourced aggregates persist
//! events and rebuild state by folding them; state-stored aggregates persist
//! the state itself. Each flavor comes in a plain, a locking (optimistic
//! concurrency) and an orchestrating (saga feedback) shape.

mod event_sourced;
mod orchestrate;
mod state_stored;

pub use event_sourced::{
    EventSourcedAggregate, EventSourcedLockingAggregate, EventSourcedLockingOrchestratingAggregate,
    EventSourcedOrchestratingAggregate,
};
pub use state_stored::{
    StateStoredAggregate, StateStoredDeduplicatingAggregate, StateStoredLockingAggregate,
    StateStoredLockingOrchestratingAggregate, StateStoredOrchestratingAggregate,
};

use crate::decider::Decider;
use crate::error::Error;

/// Decide `command` against `state`, refusing it when `state` is terminal
/// for that command.
fn decide_checked<'a, C, S, E, Err>(
    decider: &Decider<'a, C, S, E, Err>,
    command: &C,
    state: &S,
) -> Result<Vec<E>, Error<C>>
where
    C: Clone + 'a,
    S: 'a,
    E: 'a,
    Err: std::error::Error + Send + Sync + 'static,
{
    if decider.is_terminal(command, state) {
        return Err(Error::TerminalStateReached {
            input: command.clone(),
        });
    }
    decider
        .decide(command, state)
        .map_err(|source| Error::calculation(command.clone(), source))
}
