//! Repository and publisher ports.
//!
//! The engines call these traits but never implement them: concrete storage
//! backends live outside this crate. Every method may fail; failures are
//! reported as [`RepositoryError`] and converted by the engines into typed
//! [`Error`](crate::Error) values.
//!
//! Implementations own their concurrency discipline. The locking and
//! deduplicating variants must perform their check and the write as one
//! atomic step, typically by holding a lock or a database transaction
//! around [`ExpectedVersion::check`] / [`SequenceNumber::check`] and the
//! write.

use std::future::Future;

use crate::error::RepositoryError;
use crate::version::{ExpectedVersion, SequenceNumber, Version};

/// Event store for event-sourced aggregates without concurrency control.
pub trait EventRepository<C, E> {
    /// Load the events of the stream `command` addresses, oldest first.
    fn fetch_events(&self, command: &C)
    -> impl Future<Output = Result<Vec<E>, RepositoryError>> + Send;

    /// Append `events` and return them as persisted.
    fn save(&self, events: &[E]) -> impl Future<Output = Result<Vec<E>, RepositoryError>> + Send;
}

/// Event store with optimistic locking.
pub trait LockingEventRepository<C, E> {
    /// Load the events of the stream `command` addresses, each paired with
    /// the stream version it produced, oldest first.
    fn fetch_events(
        &self,
        command: &C,
    ) -> impl Future<Output = Result<Vec<(E, Version)>, RepositoryError>> + Send;

    /// Append `events` if the stream is still at `expected`.
    ///
    /// Each appended event advances the stream version by one.
    ///
    /// # Errors
    ///
    /// Must return [`RepositoryError::VersionMismatch`] without writing
    /// anything if the stream moved past `expected`.
    fn save(
        &self,
        events: &[E],
        expected: ExpectedVersion,
    ) -> impl Future<Output = Result<Vec<(E, Version)>, RepositoryError>> + Send;
}

/// State store keyed by the inbound command or event.
pub trait StateRepository<I, S> {
    /// Load the state `input` addresses, `None` if nothing was saved yet.
    fn fetch_state(&self, input: &I)
    -> impl Future<Output = Result<Option<S>, RepositoryError>> + Send;

    /// Overwrite the stored state and return it as persisted.
    fn save(&self, state: &S) -> impl Future<Output = Result<S, RepositoryError>> + Send;
}

/// State store with optimistic locking.
pub trait LockingStateRepository<I, S> {
    /// Load the state `input` addresses together with its version.
    fn fetch_state(
        &self,
        input: &I,
    ) -> impl Future<Output = Result<Option<(S, Version)>, RepositoryError>> + Send;

    /// Overwrite the stored state if it is still at `expected`, returning
    /// the new version.
    ///
    /// # Errors
    ///
    /// Must return [`RepositoryError::VersionMismatch`] without writing if
    /// the state moved past `expected`.
    fn save(
        &self,
        state: &S,
        expected: ExpectedVersion,
    ) -> impl Future<Output = Result<(S, Version), RepositoryError>> + Send;
}

/// State store that records the sequence number of the last applied input.
pub trait DeduplicatingStateRepository<I, S> {
    /// Load the state `input` addresses with the sequence number of the last
    /// input applied to it.
    fn fetch_state(
        &self,
        input: &I,
    ) -> impl Future<Output = Result<Option<(S, SequenceNumber)>, RepositoryError>> + Send;

    /// Store `state` as the result of applying the input numbered `sequence`.
    ///
    /// # Errors
    ///
    /// Must return [`RepositoryError::SequenceMismatch`] without writing if
    /// `sequence` does not directly follow the stored sequence number.
    fn save(
        &self,
        state: &S,
        sequence: SequenceNumber,
    ) -> impl Future<Output = Result<(S, SequenceNumber), RepositoryError>> + Send;
}

/// Sink for actions produced by a saga.
pub trait ActionPublisher<A> {
    /// Publish `actions` in order and return them as published.
    fn publish(
        &self,
        actions: &[A],
    ) -> impl Future<Output = Result<Vec<A>, RepositoryError>> + Send;
}

/// Supplies the expected version for the first write of a locking
/// orchestration.
///
/// Returning `None` falls back to the version read by the initiating fetch.
pub type LatestVersionProvider<'a, C> =
    Box<dyn Fn(&C) -> Option<ExpectedVersion> + Send + Sync + 'a>;
