//! State-stored aggregates: the current state is persisted directly and
//! events exist only transiently, to compute the next state.

use tokio_stream::Stream;
use tracing::{debug, instrument, trace};

use super::orchestrate::Cascade;
use super::decide_checked;
use crate::batch;
use crate::config::OrchestrationConfig;
use crate::decider::Decider;
use crate::error::{BoxError, Error, fetch_failed, store_failed};
use crate::repository::{
    DeduplicatingStateRepository, LatestVersionProvider, LockingStateRepository, StateRepository,
};
use crate::saga::Saga;
use crate::version::{ExpectedVersion, SequenceNumber, Version};

/// Decide and evolve in one go.
fn compute<'a, C, S, E, Err>(
    decider: &Decider<'a, C, S, E, Err>,
    command: &C,
    state: S,
) -> Result<S, Error<C>>
where
    C: Clone + 'a,
    S: 'a,
    E: 'a,
    Err: std::error::Error + Send + Sync + 'static,
{
    let events = decide_checked(decider, command, &state)?;
    trace!(events = events.len(), "command decided");
    Ok(decider.evolve_all(state, &events))
}

/// Run a whole saga cascade against `state`, in memory.
///
/// Every derived command is decided against the state already evolved by
/// the steps before it.
fn run_cascade<'a, C, S, E, Err>(
    decider: &Decider<'a, C, S, E, Err>,
    saga: &Saga<'a, E, C>,
    config: &OrchestrationConfig,
    command: &C,
    mut state: S,
) -> Result<S, Error<C>>
where
    C: Clone + 'a,
    S: 'a,
    E: 'a,
    Err: std::error::Error + Send + Sync + 'static,
{
    let mut cascade = Cascade::new(command.clone(), config);
    while let Some(next) = cascade.next_command(|event| saga.react(event)) {
        let (command, depth) = next?;
        let events = decide_checked(decider, &command, &state)?;
        state = decider.evolve_all(state, &events);
        cascade.push_outputs(events, depth);
    }
    trace!(events = cascade.finish().len(), "cascade finished");
    Ok(state)
}

/// State-stored aggregate without concurrency control.
///
/// The new state is saved even when the command decided no events.
pub struct StateStoredAggregate<'a, C, S, E, Err, R> {
    repository: R,
    decider: Decider<'a, C, S, E, Err>,
}

impl<'a, C, S, E, Err, R> StateStoredAggregate<'a, C, S, E, Err, R>
where
    R: StateRepository<C, S>,
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

    /// The repository holding the current state.
    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Handle one command and return the state as persisted.
    ///
    /// A missing stored state starts from the decider's initial state.
    ///
    /// # Errors
    ///
    /// [`Error::FetchFailed`], [`Error::TerminalStateReached`],
    /// [`Error::CalculationFailed`] or [`Error::StoreFailed`], each carrying
    /// `command`. The stored state is untouched unless the save succeeds.
    #[instrument(name = "handle", level = "debug", skip_all, fields(aggregate = "state_stored"))]
    pub async fn handle(&self, command: &C) -> Result<S, Error<C>> {
        let current = self
            .repository
            .fetch_state(command)
            .await
            .map_err(fetch_failed(command))?;
        let state = current.unwrap_or_else(|| self.decider.initial_state());
        let new_state = compute(&self.decider, command, state)?;
        let saved = self
            .repository
            .save(&new_state)
            .await
            .map_err(store_failed(command))?;
        debug!("state saved");
        Ok(saved)
    }

    /// Handle every command of `commands` in order, one result per item.
    ///
    /// An `Err` item from the stream is reported as
    /// [`Error::PublishingFailed`] without an input, and the batch goes on.
    pub async fn handle_all(
        &self,
        commands: impl Stream<Item = Result<C, BoxError>>,
    ) -> Vec<Result<S, Error<C>>> {
        batch::handle_each(commands, |command| async move { self.handle(&command).await }).await
    }
}

/// State-stored aggregate with optimistic locking.
pub struct StateStoredLockingAggregate<'a, C, S, E, Err, R> {
    repository: R,
    decider: Decider<'a, C, S, E, Err>,
}

impl<'a, C, S, E, Err, R> StateStoredLockingAggregate<'a, C, S, E, Err, R>
where
    R: LockingStateRepository<C, S>,
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

    /// Handle one command; the save expects the version fetched.
    ///
    /// # Errors
    ///
    /// As [`StateStoredAggregate::handle`]. A concurrent writer surfaces as
    /// [`Error::StoreFailed`] for which [`Error::is_version_conflict`] holds.
    #[instrument(
        name = "handle",
        level = "debug",
        skip_all,
        fields(aggregate = "state_stored_locking")
    )]
    pub async fn handle(&self, command: &C) -> Result<(S, Version), Error<C>> {
        let (state, current) = fetch_locking(&self.repository, &self.decider, command).await?;
        let new_state = compute(&self.decider, command, state)?;
        let expected = ExpectedVersion::from_current(current);
        save_locking(&self.repository, command, &new_state, expected).await
    }

    /// Handle every command of `commands` in order.
    pub async fn handle_all(
        &self,
        commands: impl Stream<Item = Result<C, BoxError>>,
    ) -> Vec<Result<(S, Version), Error<C>>> {
        batch::handle_each(commands, |command| async move { self.handle(&command).await }).await
    }
}

async fn fetch_locking<'a, C, S, E, Err, R>(
    repository: &R,
    decider: &Decider<'a, C, S, E, Err>,
    command: &C,
) -> Result<(S, Option<Version>), Error<C>>
where
    R: LockingStateRepository<C, S>,
    C: Clone + 'a,
    S: 'a,
    E: 'a,
    Err: 'a,
{
    let current = repository
        .fetch_state(command)
        .await
        .map_err(fetch_failed(command))?;
    Ok(match current {
        Some((state, version)) => (state, Some(version)),
        None => (decider.initial_state(), None),
    })
}

async fn save_locking<C, S, R>(
    repository: &R,
    command: &C,
    state: &S,
    expected: ExpectedVersion,
) -> Result<(S, Version), Error<C>>
where
    R: LockingStateRepository<C, S>,
    C: Clone,
{
    let saved = repository
        .save(state, expected)
        .await
        .map_err(store_failed(command))?;
    debug!(%expected, version = %saved.1, "state saved");
    Ok(saved)
}

/// State-stored aggregate that applies each command at most once.
///
/// Every command arrives with a [`SequenceNumber`] assigned by its producer.
/// A command whose number does not directly follow the last applied one is
/// rejected with [`Error::StoreFailed`] ([`Error::is_duplicate`]) before it
/// is decided, so replays leave the stored state untouched.
pub struct StateStoredDeduplicatingAggregate<'a, C, S, E, Err, R> {
    repository: R,
    decider: Decider<'a, C, S, E, Err>,
}

impl<'a, C, S, E, Err, R> StateStoredDeduplicatingAggregate<'a, C, S, E, Err, R>
where
    R: DeduplicatingStateRepository<C, S>,
    C: Clone + 'a,
    S: 'a,
    E: 'a,
    Err: std::error::Error + Send + Sync + 'static,
{
    /// Create a deduplicating aggregate over `repository`.
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

    /// Handle `command`, delivered as number `sequence`.
    ///
    /// # Errors
    ///
    /// [`Error::StoreFailed`] with [`Error::is_duplicate`] when `sequence`
    /// does not directly follow the last applied number; otherwise as
    /// [`StateStoredAggregate::handle`].
    #[instrument(
        name = "handle",
        level = "debug",
        skip_all,
        fields(aggregate = "state_stored_deduplicating", %sequence)
    )]
    pub async fn handle(
        &self,
        command: &C,
        sequence: SequenceNumber,
    ) -> Result<(S, SequenceNumber), Error<C>> {
        let current = self
            .repository
            .fetch_state(command)
            .await
            .map_err(fetch_failed(command))?;
        let (state, last) = match current {
            Some((state, last)) => (state, Some(last)),
            None => (self.decider.initial_state(), None),
        };
        if let Err(source) = sequence.check(last) {
            debug!(last = last.map(SequenceNumber::get), "command skipped as duplicate");
            return Err(Error::StoreFailed {
                input: command.clone(),
                source,
            });
        }
        let new_state = compute(&self.decider, command, state)?;
        let saved = self
            .repository
            .save(&new_state, sequence)
            .await
            .map_err(store_failed(command))?;
        debug!("state saved");
        Ok(saved)
    }

    /// Handle every `(command, sequence)` delivery in order.
    pub async fn handle_all(
        &self,
        commands: impl Stream<Item = Result<(C, SequenceNumber), BoxError>>,
    ) -> Vec<Result<(S, SequenceNumber), Error<C>>> {
        batch::handle_each(commands, |(command, sequence): (C, SequenceNumber)| async move {
            self.handle(&command, sequence).await
        })
        .await
    }
}

/// State-stored aggregate that runs saga-derived commands before saving.
///
/// The whole cascade is computed in memory against the initiating command's
/// state and the result is saved once. A failing step therefore leaves the
/// stored state untouched.
pub struct StateStoredOrchestratingAggregate<'a, C, S, E, Err, R> {
    repository: R,
    decider: Decider<'a, C, S, E, Err>,
    saga: Saga<'a, E, C>,
    config: OrchestrationConfig,
}

impl<'a, C, S, E, Err, R> StateStoredOrchestratingAggregate<'a, C, S, E, Err, R>
where
    R: StateRepository<C, S>,
    C: Clone + 'a,
    S: 'a,
    E: 'a,
    Err: std::error::Error + Send + Sync + 'static,
{
    /// Create an orchestrating aggregate with an unbounded cascade.
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

    /// The repository holding the current state.
    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Handle `command` and its whole cascade, then save the resulting
    /// state once.
    ///
    /// # Errors
    ///
    /// The first failing step's error, carrying that step's command, or
    /// [`Error::DepthLimitExceeded`]. Nothing is saved on failure.
    #[instrument(
        name = "handle",
        level = "debug",
        skip_all,
        fields(aggregate = "state_stored_orchestrating")
    )]
    pub async fn handle(&self, command: &C) -> Result<S, Error<C>> {
        let current = self
            .repository
            .fetch_state(command)
            .await
            .map_err(fetch_failed(command))?;
        let state = current.unwrap_or_else(|| self.decider.initial_state());
        let new_state = run_cascade(&self.decider, &self.saga, &self.config, command, state)?;
        let saved = self
            .repository
            .save(&new_state)
            .await
            .map_err(store_failed(command))?;
        debug!("state saved");
        Ok(saved)
    }

    /// Handle each command of `commands` with its own cascade, in order.
    pub async fn handle_all(
        &self,
        commands: impl Stream<Item = Result<C, BoxError>>,
    ) -> Vec<Result<S, Error<C>>> {
        batch::handle_each(commands, |command| async move { self.handle(&command).await }).await
    }
}

/// Orchestrating state-stored aggregate with optimistic locking.
///
/// The single save expects the fetched version, or the version a
/// [`LatestVersionProvider`] returns for the initiating command.
pub struct StateStoredLockingOrchestratingAggregate<'a, C, S, E, Err, R> {
    repository: R,
    decider: Decider<'a, C, S, E, Err>,
    saga: Saga<'a, E, C>,
    config: OrchestrationConfig,
    latest_version: Option<LatestVersionProvider<'a, C>>,
}

impl<'a, C, S, E, Err, R> StateStoredLockingOrchestratingAggregate<'a, C, S, E, Err, R>
where
    R: LockingStateRepository<C, S>,
    C: Clone + 'a,
    S: 'a,
    E: 'a,
    Err: std::error::Error + Send + Sync + 'static,
{
    /// Create a locking orchestrating aggregate.
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

    /// Take the expected version of the single save from `provider`.
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

    /// Handle `command` and its cascade with one conditional save.
    ///
    /// # Errors
    ///
    /// As [`StateStoredOrchestratingAggregate::handle`], plus a version
    /// conflict ([`Error::is_version_conflict`]) on the final save.
    #[instrument(
        name = "handle",
        level = "debug",
        skip_all,
        fields(aggregate = "state_stored_locking_orchestrating")
    )]
    pub async fn handle(&self, command: &C) -> Result<(S, Version), Error<C>> {
        let (state, current) = fetch_locking(&self.repository, &self.decider, command).await?;
        let new_state = run_cascade(&self.decider, &self.saga, &self.config, command, state)?;
        let expected = self
            .latest_version
            .as_ref()
            .and_then(|provider| provider(command))
            .unwrap_or_else(|| ExpectedVersion::from_current(current));
        save_locking(&self.repository, command, &new_state, expected).await
    }

    /// Handle each command of `commands` with its own cascade, in order.
    pub async fn handle_all(
        &self,
        commands: impl Stream<Item = Result<C, BoxError>>,
    ) -> Vec<Result<(S, Version), Error<C>>> {
        batch::handle_each(commands, |command| async move { self.handle(&command).await }).await
    }
}
