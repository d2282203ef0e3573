//! Composable deciders, views and sagas, and the engines that run them
//! against repositories.
//!
//! The pure core is three machines built from plain functions:
//!
//! - [`Decider`] turns a command and the current state into events and folds
//!   events into state.
//! - [`View`] folds events into a read model.
//! - [`Saga`] maps an action result (usually an event) to follow-up actions
//!   (usually commands).
//!
//! Machines of the same kind combine into one machine over [`Sum`] inputs,
//! so several bounded contexts can be handled as a single unit.
//!
//! The engines wire a machine to a repository port: load, compute, save.
//! Aggregates come event-sourced or state-stored; every flavor has a plain,
//! a locking and an orchestrating shape in which the aggregate's own events
//! are fed back through a saga. Repository implementations live outside
//! this crate.

mod aggregate;
mod batch;
mod config;
mod decider;
mod error;
mod materialized_view;
mod repository;
mod saga;
mod saga_manager;
mod specification;
mod sum;
mod version;
mod view;

#[cfg(test)]
mod test_fixtures;

pub use aggregate::{
    EventSourcedAggregate, EventSourcedLockingAggregate, EventSourcedLockingOrchestratingAggregate,
    EventSourcedOrchestratingAggregate, StateStoredAggregate, StateStoredDeduplicatingAggregate,
    StateStoredLockingAggregate, StateStoredLockingOrchestratingAggregate,
    StateStoredOrchestratingAggregate,
};
pub use config::OrchestrationConfig;
pub use decider::{DecideFunction, Decider, EvolveFunction, InitialStateFunction, TerminalFunction};
pub use error::{BoxError, Error, RepositoryError};
pub use materialized_view::{
    DeduplicatingMaterializedView, LockingMaterializedView, MaterializedView,
};
pub use repository::{
    ActionPublisher, DeduplicatingStateRepository, EventRepository, LatestVersionProvider,
    LockingEventRepository, LockingStateRepository, StateRepository,
};
pub use saga::{ReactFunction, Saga};
pub use saga_manager::SagaManager;
pub use specification::{DeciderSpecification, SagaSpecification, ViewSpecification};
pub use sum::Sum;
pub use version::{ExpectedVersion, SequenceNumber, Version};
pub use view::View;
