//! Materialized views: engines that fold events into a stored read model.

use tokio_stream::Stream;
use tracing::{debug, instrument};

use crate::batch;
use crate::error::{BoxError, Error, fetch_failed, store_failed};
use crate::repository::{DeduplicatingStateRepository, LockingStateRepository, StateRepository};
use crate::version::{ExpectedVersion, SequenceNumber, Version};
use crate::view::View;

/// Read model updated one event at a time, without concurrency control.
pub struct MaterializedView<'a, S, E, R> {
    repository: R,
    view: View<'a, S, E>,
}

impl<'a, S, E, R> MaterializedView<'a, S, E, R>
where
    R: StateRepository<E, S>,
    S: 'a,
    E: Clone + 'a,
{
    /// Create a materialized view that folds events with `view`.
    pub fn new(repository: R, view: View<'a, S, E>) -> Self {
        Self { repository, view }
    }

    /// The repository holding the read model.
    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Fold `event` into the state it addresses and save the result.
    ///
    /// # Errors
    ///
    /// [`Error::FetchFailed`] or [`Error::StoreFailed`], carrying `event`.
    #[instrument(name = "handle", level = "debug", skip_all, fields(view = "plain"))]
    pub async fn handle(&self, event: &E) -> Result<S, Error<E>> {
        let current = self
            .repository
            .fetch_state(event)
            .await
            .map_err(fetch_failed(event))?;
        let new_state = self.view.compute_new_state(current, std::slice::from_ref(event));
        let saved = self
            .repository
            .save(&new_state)
            .await
            .map_err(store_failed(event))?;
        debug!("view state saved");
        Ok(saved)
    }

    /// Handle every event of `events` in order, one result per item.
    ///
    /// An `Err` item from the stream is reported as
    /// [`Error::PublishingFailed`] without an input.
    pub async fn handle_all(
        &self,
        events: impl Stream<Item = Result<E, BoxError>>,
    ) -> Vec<Result<S, Error<E>>> {
        batch::handle_each(events, |event| async move { self.handle(&event).await }).await
    }
}

/// Read model with optimistic locking on its stored state.
pub struct LockingMaterializedView<'a, S, E, R> {
    repository: R,
    view: View<'a, S, E>,
}

impl<'a, S, E, R> LockingMaterializedView<'a, S, E, R>
where
    R: LockingStateRepository<E, S>,
    S: 'a,
    E: Clone + 'a,
{
    /// Create a locking materialized view over `repository`.
    pub fn new(repository: R, view: View<'a, S, E>) -> Self {
        Self { repository, view }
    }

    /// The underlying repository.
    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Fold `event` in and save, expecting the version fetched.
    ///
    /// # Errors
    ///
    /// [`Error::FetchFailed`] or [`Error::StoreFailed`], carrying `event`.
    /// A concurrent update makes [`Error::is_version_conflict`] hold.
    #[instrument(name = "handle", level = "debug", skip_all, fields(view = "locking"))]
    pub async fn handle(&self, event: &E) -> Result<(S, Version), Error<E>> {
        let current = self
            .repository
            .fetch_state(event)
            .await
            .map_err(fetch_failed(event))?;
        let (state, version) = match current {
            Some((state, version)) => (state, Some(version)),
            None => (self.view.initial_state(), None),
        };
        let new_state = self.view.evolve(&state, event);
        let expected = ExpectedVersion::from_current(version);
        let saved = self
            .repository
            .save(&new_state, expected)
            .await
            .map_err(store_failed(event))?;
        debug!(%expected, version = %saved.1, "view state saved");
        Ok(saved)
    }

    /// Handle every event of `events` in order.
    pub async fn handle_all(
        &self,
        events: impl Stream<Item = Result<E, BoxError>>,
    ) -> Vec<Result<(S, Version), Error<E>>> {
        batch::handle_each(events, |event| async move { self.handle(&event).await }).await
    }
}

/// Read model that applies each delivered event at most once.
///
/// Events arrive numbered by their producer. An event whose number does not
/// directly follow the last applied one fails with [`Error::StoreFailed`]
/// ([`Error::is_duplicate`]); the view is not evolved and nothing is saved.
pub struct DeduplicatingMaterializedView<'a, S, E, R> {
    repository: R,
    view: View<'a, S, E>,
}

impl<'a, S, E, R> DeduplicatingMaterializedView<'a, S, E, R>
where
    R: DeduplicatingStateRepository<E, S>,
    S: 'a,
    E: Clone + 'a,
{
    /// Create a deduplicating materialized view over `repository`.
    pub fn new(repository: R, view: View<'a, S, E>) -> Self {
        Self { repository, view }
    }

    /// The underlying repository.
    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Fold `event`, delivered as number `sequence`, into the read model.
    ///
    /// # Errors
    ///
    /// [`Error::StoreFailed`] with [`Error::is_duplicate`] when `sequence`
    /// does not directly follow the last applied number. Otherwise
    /// [`Error::FetchFailed`] or [`Error::StoreFailed`] from the repository.
    #[instrument(
        name = "handle",
        level = "debug",
        skip_all,
        fields(view = "deduplicating", %sequence)
    )]
    pub async fn handle(
        &self,
        event: &E,
        sequence: SequenceNumber,
    ) -> Result<(S, SequenceNumber), Error<E>> {
        let current = self
            .repository
            .fetch_state(event)
            .await
            .map_err(fetch_failed(event))?;
        let (state, last) = match current {
            Some((state, last)) => (state, Some(last)),
            None => (self.view.initial_state(), None),
        };
        if let Err(source) = sequence.check(last) {
            debug!(last = last.map(SequenceNumber::get), "event skipped as duplicate");
            return Err(Error::StoreFailed {
                input: event.clone(),
                source,
            });
        }
        let new_state = self.view.evolve(&state, event);
        let saved = self
            .repository
            .save(&new_state, sequence)
            .await
            .map_err(store_failed(event))?;
        debug!("view state saved");
        Ok(saved)
    }

    /// Handle every `(event, sequence)` delivery in order.
    pub async fn handle_all(
        &self,
        events: impl Stream<Item = Result<(E, SequenceNumber), BoxError>>,
    ) -> Vec<Result<(S, SequenceNumber), Error<E>>> {
        batch::handle_each(events, |(event, sequence): (E, SequenceNumber)| async move {
            self.handle(&event, sequence).await
        })
        .await
    }
}
