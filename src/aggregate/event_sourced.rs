//! Event-sourced aggregates: state is never stored, only rebuilt by folding
//! the events fetched for each command.

use tokio_stream::Stream;
use tracing::{debug, instrument};

use super::orchestrate::Cascade;
use super::decide_checked;
use crate::batch;
use crate::config::OrchestrationConfig;
use crate::decider::Decider;
use crate::error::{BoxError, Error, fetch_failed, store_failed};
use crate::repository::{EventRepository, LatestVersionProvider, LockingEventRepository};
use crate::saga::Saga;
use crate::version::{ExpectedVersion, Version};

/// One fetch -> fold -> decide -> save step without concurrency control.
///
/// A command that decides no events writes nothing.
async fn execute<'a, C, S, E, Err, R>(
    repository: &R,
    decider: &Decider<'a, C, S, E, Err>,
    command: &C,
) -> Result<Vec<E>, Error<C>>
where
    R: EventRepository<C, E>,
    C: Clone + 'a,
    S: 'a,
    E: 'a,
    Err: std::error::Error + Send + Sync + 'static,
{
    let history = repository
        .fetch_events(command)
        .await
        .map_err(fetch_failed(command))?;
    let state = decider.evolve_all(decider.initial_state(), &history);
    let new_events = decide_checked(decider, command, &state)?;
    if new_events.is_empty() {
        debug!(history = history.len(), "command decided no events");
        return Ok(new_events);
    }
    let saved = repository
        .save(&new_events)
        .await
        .map_err(store_failed(command))?;
    debug!(history = history.len(), saved = saved.len(), "events saved");
    Ok(saved)
}

/// One step with optimistic locking.
///
/// The save expects the stream at the version of the last fetched event
/// unless `expected` overrides it.
async fn execute_locking<'a, C, S, E, Err, R>(
    repository: &R,
    decider: &Decider<'a, C, S, E, Err>,
    command: &C,
    expected: Option<ExpectedVersion>,
) -> Result<Vec<(E, Version)>, Error<C>>
where
    R: LockingEventRepository<C, E>,
    C: Clone + 'a,
    S: 'a,
    E: 'a,
    Err: std::error::Error + Send + Sync + 'static,
{
    let history = repository
        .fetch_events(command)
        .await
        .map_err(fetch_failed(command))?;
    let current = history.last().map(|(_, version)| *version);
    let state = decider.evolve_all(
        decider.initial_state(),
        history.iter().map(|(event, _)| event),
    );
    let new_events = decide_checked(decider, command, &state)?;
    if new_events.is_empty() {
        debug!(history = history.len(), "command decided no events");
        return Ok(Vec::new());
    }
    let expected = expected.unwrap_or_else(|| ExpectedVersion::from_current(current));
    let saved = repository
        .save(&new_events, expected)
        .await
        .map_err(store_failed(command))?;
    debug!(
        %expected,
        saved = saved.len(),
        version = saved.last().map(|(_, v)| v.get()),
        "events saved"
    );
    Ok(saved)
}

/// Event-sourced aggregate without concurrency control.
///
/// Suitable when the repository serializes writers per stream on its own,
/// or when lost updates are acceptable.
pub struct EventSourcedAggregate<'a, C, S, E, Err, R> {
    repository: R,
    decider: Decider<'a, C, S, E, Err>,
}

impl<'a, C, S, E, Err, R> EventSourcedAggregate<'a, C, S, E, Err, R>
where
    R: EventRepository<C, E>,
    C: Clone + 'a,
    S: 'a,
    E: 'a,
    Err: std::error::Error + Send + Sync + 'static,
{
    /// Create an aggregate that runs `decider` against `repository`.
    pub fn new(repository: R, decider: Decider<'a, C, S, E, Err>) -> Self {
        Self {
            repository,
            decider,
        }
    }

    /// The repository this aggregate reads from and writes to.
    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Handle one command and return the newly persisted events.
    ///
    /// # Errors
    ///
    /// [`Error::FetchFailed`], [`Error::TerminalStateReached`],
    /// [`Error::CalculationFailed`] or [`Error::StoreFailed`], each carrying
    /// `command`. Nothing is written unless the save itself succeeds.
    #[instrument(name = "handle", level = "debug", skip_all, fields(aggregate = "event_sourced"))]
    pub async fn handle(&self, command: &C) -> Result<Vec<E>, Error<C>> {
        execute(&self.repository, &self.decider, command).await
    }

    /// Handle every command of `commands` in order, one result per item.
    ///
    /// A failing command does not stop the batch. An `Err` item from the
    /// stream is reported as [`Error::PublishingFailed`] without an input.
    pub async fn handle_all(
        &self,
        commands: impl Stream<Item = Result<C, BoxError>>,
    ) -> Vec<Result<Vec<E>, Error<C>>> {
        batch::handle_each(commands, |command| async move { self.handle(&command).await }).await
    }
}

/// Event-sourced aggregate with optimistic locking.
///
/// The save is conditional on the stream version observed at fetch time. A
/// concurrent writer makes the save fail with a version conflict
/// ([`Error::is_version_conflict`]); the aggregate never retries.
pub struct EventSourcedLockingAggregate<'a, C, S, E, Err, R> {
    repository: R,
    decider: Decider<'a, C, S, E, Err>,
}

impl<'a, C, S, E, Err, R> EventSourcedLockingAggregate<'a, C, S, E, Err, R>
where
    R: LockingEventRepository<C, E>,
    C: Clone + 'a,
    S: 'a,
    E: 'a,
    Err: std::error::Error + Send + Sync + 'static,
{
    /// Create a locking aggregate over `repository`.
    pub fn new(repository: R, decider: Decider<'a, C, S, E, Err>) -> Self {
        Self {
            repository,
            decider,
        }
    }

    /// The underlying repository.
    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Handle one command and return the new events with their versions.
    ///
    /// The save expects the version of the last fetched event, or no stream
    /// at all when nothing was fetched.
    ///
    /// # Errors
    ///
    /// As [`EventSourcedAggregate::handle`]. A concurrent writer surfaces as
    /// [`Error::StoreFailed`] for which [`Error::is_version_conflict`] holds.
    #[instrument(
        name = "handle",
        level = "debug",
        skip_all,
        fields(aggregate = "event_sourced_locking")
    )]
    pub async fn handle(&self, command: &C) -> Result<Vec<(E, Version)>, Error<C>> {
        execute_locking(&self.repository, &self.decider, command, None).await
    }

    /// Handle every command of `commands` in order, one result per item.
    pub async fn handle_all(
        &self,
        commands: impl Stream<Item = Result<C, BoxError>>,
    ) -> Vec<Result<Vec<(E, Version)>, Error<C>>> {
        batch::handle_each(commands, |command| async move { self.handle(&command).await }).await
    }
}

/// Event-sourced aggregate that feeds its own events back through a saga.
///
/// Every event produced is handed to the saga; each command the saga derives
/// is handled by this same aggregate, fetching afresh so it observes the
/// events already saved. Commands run depth-first, left to right, and every
/// step persists before the next one starts. The first failure aborts the
/// cascade: steps already saved stay saved.
///
/// A saga whose commands lead back to the events that triggered them never
/// terminates unless [`OrchestrationConfig::max_depth`] is set.
pub struct EventSourcedOrchestratingAggregate<'a, C, S, E, Err, R> {
    repository: R,
    decider: Decider<'a, C, S, E, Err>,
    saga: Saga<'a, E, C>,
    config: OrchestrationConfig,
}

impl<'a, C, S, E, Err, R> EventSourcedOrchestratingAggregate<'a, C, S, E, Err, R>
where
    R: EventRepository<C, E>,
    C: Clone + 'a,
    S: 'a,
    E: 'a,
    Err: std::error::Error + Send + Sync + 'static,
{
    /// Create an orchestrating aggregate with an unbounded cascade.
    ///
    /// `saga` reacts to every event saved and its commands are fed back into
    /// `decider`.
    pub fn new(repository: R, decider: Decider<'a, C, S, E, Err>, saga: Saga<'a, E, C>) -> Self {
        Self {
            repository,
            decider,
            saga,
            config: OrchestrationConfig::default(),
        }
    }

    /// Replace the orchestration settings, e.g. to bound the cascade depth.
    pub fn with_config(mut self, config: OrchestrationConfig) -> Self {
        self.config = config;
        self
    }

    /// The repository every step of the cascade reads from and writes to.
    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Handle `command` and the whole cascade it triggers.
    ///
    /// Returns every event saved along the way, in depth-first order.
    ///
    /// # Errors
    ///
    /// The first failing step's error, carrying that step's command, or
    /// [`Error::DepthLimitExceeded`].
    #[instrument(
        name = "handle",
        level = "debug",
        skip_all,
        fields(aggregate = "event_sourced_orchestrating")
    )]
    pub async fn handle(&self, command: &C) -> Result<Vec<E>, Error<C>> {
        let mut cascade = Cascade::new(command.clone(), &self.config);
        while let Some(next) = cascade.next_command(|event| self.saga.react(event)) {
            let (command, depth) = next?;
            let saved = execute(&self.repository, &self.decider, &command).await?;
            cascade.push_outputs(saved, depth);
        }
        let events = cascade.finish();
        debug!(events = events.len(), "orchestration finished");
        Ok(events)
    }

    /// Handle each command of `commands` with its own cascade, in order.
    pub async fn handle_all(
        &self,
        commands: impl Stream<Item = Result<C, BoxError>>,
    ) -> Vec<Result<Vec<E>, Error<C>>> {
        batch::handle_each(commands, |command| async move { self.handle(&command).await }).await
    }
}

/// Orchestrating event-sourced aggregate with optimistic locking.
///
/// Each step's save expects the version that step fetched. A
/// [`LatestVersionProvider`], if configured, supplies the expected version of
/// the initiating command's save instead; saga-derived steps always use the
/// fetched version.
pub struct EventSourcedLockingOrchestratingAggregate<'a, C, S, E, Err, R> {
    repository: R,
    decider: Decider<'a, C, S, E, Err>,
    saga: Saga<'a, E, C>,
    config: OrchestrationConfig,
    latest_version: Option<LatestVersionProvider<'a, C>>,
}

impl<'a, C, S, E, Err, R> EventSourcedLockingOrchestratingAggregate<'a, C, S, E, Err, R>
where
    R: LockingEventRepository<C, E>,
    C: Clone + 'a,
    S: 'a,
    E: 'a,
    Err: std::error::Error + Send + Sync + 'static,
{
    /// Create a locking orchestrating aggregate.
    ///
    /// Without a [`LatestVersionProvider`] every step expects the version it
    /// fetched.
    pub fn new(repository: R, decider: Decider<'a, C, S, E, Err>, saga: Saga<'a, E, C>) -> Self {
        Self {
            repository,
            decider,
            saga,
            config: OrchestrationConfig::default(),
            latest_version: None,
        }
    }

    /// Replace the orchestration settings.
    pub fn with_config(mut self, config: OrchestrationConfig) -> Self {
        self.config = config;
        self
    }

    /// Take the initiating command's expected version from `provider`.
    ///
    /// Returning `None` falls back to the fetched version.
    pub fn with_latest_version_provider(
        mut self,
        provider: impl Fn(&C) -> Option<ExpectedVersion> + Send + Sync + 'a,
    ) -> Self {
        self.latest_version = Some(Box::new(provider));
        self
    }

    /// The underlying repository.
    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Handle `command` and its cascade, returning every saved event with
    /// the version it was stored at.
    ///
    /// # Errors
    ///
    /// The first failing step's error, carrying that step's command, or
    /// [`Error::DepthLimitExceeded`]. A version conflict on any step aborts
    /// the cascade; earlier steps stay saved.
    #[instrument(
        name = "handle",
        level = "debug",
        skip_all,
        fields(aggregate = "event_sourced_locking_orchestrating")
    )]
    pub async fn handle(&self, command: &C) -> Result<Vec<(E, Version)>, Error<C>> {
        let mut cascade = Cascade::new(command.clone(), &self.config);
        while let Some(next) =
            cascade.next_command(|saved: &(E, Version)| self.saga.react(&saved.0))
        {
            let (command, depth) = next?;
            let expected = match (&self.latest_version, depth) {
                (Some(provider), 0) => provider(&command),
                _ => None,
            };
            let saved =
                execute_locking(&self.repository, &self.decider, &command, expected).await?;
            cascade.push_outputs(saved, depth);
        }
        let events = cascade.finish();
        debug!(events = events.len(), "orchestration finished");
        Ok(events)
    }

    /// Handle each command of `commands` with its own cascade, in order.
    pub async fn handle_all(
        &self,
        commands: impl Stream<Item = Result<C, BoxError>>,
    ) -> Vec<Result<Vec<(E, Version)>, Error<C>>> {
        batch::handle_each(commands, |command| async move { self.handle(&command).await }).await
    }
}
