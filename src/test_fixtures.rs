//! Even/odd number domain and in-memory repository doubles shared by the
//! unit tests.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Mutex;

use crate::decider::Decider;
use crate::error::RepositoryError;
use crate::repository::{
    ActionPublisher, DeduplicatingStateRepository, EventRepository, LockingEventRepository,
    LockingStateRepository, StateRepository,
};
use crate::saga::Saga;
use crate::sum::Sum;
use crate::version::{ExpectedVersion, SequenceNumber, Version};
use crate::view::View;

const LIMIT: i64 = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum EvenNumberCommand {
    Add(i64),
    Subtract(i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum EvenNumberEvent {
    Added(i64),
    Subtracted(i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum OddNumberCommand {
    Add(i64),
    Subtract(i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum OddNumberEvent {
    Added(i64),
    Subtracted(i64),
}

/// Running total kept by both the even and the odd machines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct NumberState {
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub(crate) enum NumberError {
    #[error("{0} is not an even number")]
    NotEven(i64),
    #[error("{0} is not an odd number")]
    NotOdd(i64),
    #[error("{0} exceeds the limit of 1000")]
    TooLarge(i64),
    #[error("result {0} would be negative")]
    Negative(i64),
}

pub(crate) type NumberCommand = Sum<EvenNumberCommand, OddNumberCommand>;
pub(crate) type NumberEvent = Sum<EvenNumberEvent, OddNumberEvent>;
pub(crate) type NumberPair = (NumberState, NumberState);

fn validate(n: i64, parity_ok: bool, parity_err: NumberError) -> Result<(), NumberError> {
    if n > LIMIT {
        return Err(NumberError::TooLarge(n));
    }
    if !parity_ok {
        return Err(parity_err);
    }
    Ok(())
}

pub(crate) fn even_number_decider()
-> Decider<'static, EvenNumberCommand, NumberState, EvenNumberEvent, NumberError> {
    Decider::new(
        |command, state: &NumberState| match command {
            EvenNumberCommand::Add(n) => {
                validate(*n, n % 2 == 0, NumberError::NotEven(*n))?;
                Ok(vec![EvenNumberEvent::Added(*n)])
            }
            EvenNumberCommand::Subtract(n) => {
                validate(*n, n % 2 == 0, NumberError::NotEven(*n))?;
                if state.value - n < 0 {
                    return Err(NumberError::Negative(state.value - n));
                }
                Ok(vec![EvenNumberEvent::Subtracted(*n)])
            }
        },
        |state, event| match event {
            EvenNumberEvent::Added(n) => NumberState {
                value: state.value + n,
            },
            EvenNumberEvent::Subtracted(n) => NumberState {
                value: state.value - n,
            },
        },
        NumberState::default,
    )
}

pub(crate) fn odd_number_decider()
-> Decider<'static, OddNumberCommand, NumberState, OddNumberEvent, NumberError> {
    Decider::new(
        |command, state: &NumberState| match command {
            OddNumberCommand::Add(n) => {
                validate(*n, n % 2 != 0, NumberError::NotOdd(*n))?;
                Ok(vec![OddNumberEvent::Added(*n)])
            }
            OddNumberCommand::Subtract(n) => {
                validate(*n, n % 2 != 0, NumberError::NotOdd(*n))?;
                if state.value - n < 0 {
                    return Err(NumberError::Negative(state.value - n));
                }
                Ok(vec![OddNumberEvent::Subtracted(*n)])
            }
        },
        |state, event| match event {
            OddNumberEvent::Added(n) => NumberState {
                value: state.value + n,
            },
            OddNumberEvent::Subtracted(n) => NumberState {
                value: state.value - n,
            },
        },
        NumberState::default,
    )
}

pub(crate) fn number_decider()
-> Decider<'static, NumberCommand, NumberPair, NumberEvent, NumberError> {
    even_number_decider().combine(odd_number_decider())
}

pub(crate) fn even_number_view() -> View<'static, NumberState, EvenNumberEvent> {
    View::new(
        |state, event| match event {
            EvenNumberEvent::Added(n) => NumberState {
                value: state.value + n,
            },
            EvenNumberEvent::Subtracted(n) => NumberState {
                value: state.value - n,
            },
        },
        NumberState::default,
    )
}

pub(crate) fn odd_number_view() -> View<'static, NumberState, OddNumberEvent> {
    View::new(
        |state, event| match event {
            OddNumberEvent::Added(n) => NumberState {
                value: state.value + n,
            },
            OddNumberEvent::Subtracted(n) => NumberState {
                value: state.value - n,
            },
        },
        NumberState::default,
    )
}

/// Adding an even number `n > 0` triggers adding the odd number `n - 1`.
pub(crate) fn even_to_odd_saga() -> Saga<'static, EvenNumberEvent, OddNumberCommand> {
    Saga::new(|event| match event {
        EvenNumberEvent::Added(n) if *n > 0 => vec![OddNumberCommand::Add(n - 1)],
        _ => Vec::new(),
    })
}

/// Adding an odd number `n > 1` triggers adding the even number `n - 1`.
pub(crate) fn odd_to_even_saga() -> Saga<'static, OddNumberEvent, EvenNumberCommand> {
    Saga::new(|event| match event {
        OddNumberEvent::Added(n) if *n > 1 => vec![EvenNumberCommand::Add(n - 1)],
        _ => Vec::new(),
    })
}

/// Even additions trigger odd additions; odd events trigger nothing.
pub(crate) fn even_to_odd_number_saga() -> Saga<'static, NumberEvent, NumberCommand> {
    even_to_odd_saga()
        .combine(Saga::<OddNumberEvent, EvenNumberCommand>::empty())
        .map_action(Sum::swap)
}

/// Both directions: 4 -> 3 -> 2 -> 1.
pub(crate) fn ping_pong_saga() -> Saga<'static, NumberEvent, NumberCommand> {
    even_to_odd_saga()
        .combine(odd_to_even_saga())
        .map_action(Sum::swap)
}

/// Switches that make a double fail on demand.
#[derive(Debug, Default)]
pub(crate) struct Failures {
    fetch: AtomicBool,
    save: AtomicBool,
}

impl Failures {
    pub(crate) fn fail_fetch(&self) {
        self.fetch.store(true, Ordering::SeqCst);
    }

    pub(crate) fn fail_save(&self) {
        self.save.store(true, Ordering::SeqCst);
    }

    fn check_fetch(&self) -> Result<(), RepositoryError> {
        if self.fetch.load(Ordering::SeqCst) {
            return Err(std::io::Error::other("fetch unavailable").into());
        }
        Ok(())
    }

    fn check_save(&self) -> Result<(), RepositoryError> {
        if self.save.load(Ordering::SeqCst) {
            return Err(RepositoryError::Backend("save unavailable".into()));
        }
        Ok(())
    }
}

/// Single-stream event log without concurrency control.
#[derive(Debug, Default)]
pub(crate) struct InMemoryEventLog<E> {
    events: Mutex<Vec<E>>,
    pub failures: Failures,
}

impl<E: Clone> InMemoryEventLog<E> {
    pub(crate) fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            failures: Failures::default(),
        }
    }

    pub(crate) async fn events(&self) -> Vec<E> {
        self.events.lock().await.clone()
    }
}

impl<C: Sync, E: Clone + Send + Sync> EventRepository<C, E> for InMemoryEventLog<E> {
    async fn fetch_events(&self, _command: &C) -> Result<Vec<E>, RepositoryError> {
        self.failures.check_fetch()?;
        Ok(self.events.lock().await.clone())
    }

    async fn save(&self, events: &[E]) -> Result<Vec<E>, RepositoryError> {
        self.failures.check_save()?;
        self.events.lock().await.extend_from_slice(events);
        Ok(events.to_vec())
    }
}

/// Single-stream event log with optimistic locking.
///
/// `fetch_events` yields to the scheduler before returning so that two
/// concurrent handlers both read before either writes.
#[derive(Debug, Default)]
pub(crate) struct InMemoryVersionedLog<E> {
    events: Mutex<Vec<(E, Version)>>,
    pub failures: Failures,
}

impl<E: Clone> InMemoryVersionedLog<E> {
    pub(crate) fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            failures: Failures::default(),
        }
    }

    pub(crate) async fn events(&self) -> Vec<(E, Version)> {
        self.events.lock().await.clone()
    }
}

impl<C: Sync, E: Clone + Send + Sync> LockingEventRepository<C, E> for InMemoryVersionedLog<E> {
    async fn fetch_events(&self, _command: &C) -> Result<Vec<(E, Version)>, RepositoryError> {
        self.failures.check_fetch()?;
        let events = self.events.lock().await.clone();
        tokio::task::yield_now().await;
        Ok(events)
    }

    async fn save(
        &self,
        events: &[E],
        expected: ExpectedVersion,
    ) -> Result<Vec<(E, Version)>, RepositoryError> {
        self.failures.check_save()?;
        let mut stored = self.events.lock().await;
        let mut current = stored.last().map(|(_, v)| *v);
        expected.check(current)?;

        let mut saved = Vec::with_capacity(events.len());
        for event in events {
            let version = Version::after(current);
            saved.push((event.clone(), version));
            current = Some(version);
        }
        stored.extend(saved.iter().cloned());
        Ok(saved)
    }
}

/// Single-slot state store without concurrency control.
#[derive(Debug, Default)]
pub(crate) struct InMemoryStateStore<S> {
    state: Mutex<Option<S>>,
    pub failures: Failures,
    saves: std::sync::atomic::AtomicUsize,
}

impl<S: Clone> InMemoryStateStore<S> {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(None),
            failures: Failures::default(),
            saves: Default::default(),
        }
    }

    pub(crate) async fn state(&self) -> Option<S> {
        self.state.lock().await.clone()
    }

    pub(crate) fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl<I: Sync, S: Clone + Send + Sync> StateRepository<I, S> for InMemoryStateStore<S> {
    async fn fetch_state(&self, _input: &I) -> Result<Option<S>, RepositoryError> {
        self.failures.check_fetch()?;
        Ok(self.state.lock().await.clone())
    }

    async fn save(&self, state: &S) -> Result<S, RepositoryError> {
        self.failures.check_save()?;
        *self.state.lock().await = Some(state.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(state.clone())
    }
}

/// Single-slot state store with optimistic locking.
#[derive(Debug, Default)]
pub(crate) struct InMemoryLockingStateStore<S> {
    state: Mutex<Option<(S, Version)>>,
    pub failures: Failures,
}

impl<S: Clone> InMemoryLockingStateStore<S> {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(None),
            failures: Failures::default(),
        }
    }

    pub(crate) async fn state(&self) -> Option<(S, Version)> {
        self.state.lock().await.clone()
    }
}

impl<I: Sync, S: Clone + Send + Sync> LockingStateRepository<I, S>
    for InMemoryLockingStateStore<S>
{
    async fn fetch_state(&self, _input: &I) -> Result<Option<(S, Version)>, RepositoryError> {
        self.failures.check_fetch()?;
        let state = self.state.lock().await.clone();
        tokio::task::yield_now().await;
        Ok(state)
    }

    async fn save(
        &self,
        state: &S,
        expected: ExpectedVersion,
    ) -> Result<(S, Version), RepositoryError> {
        self.failures.check_save()?;
        let mut stored = self.state.lock().await;
        let current = stored.as_ref().map(|(_, v)| *v);
        expected.check(current)?;
        let saved = (state.clone(), Version::after(current));
        *stored = Some(saved.clone());
        Ok(saved)
    }
}

/// Single-slot state store remembering the last applied sequence number.
#[derive(Debug, Default)]
pub(crate) struct InMemoryDeduplicatingStateStore<S> {
    state: Mutex<Option<(S, SequenceNumber)>>,
    pub failures: Failures,
}

impl<S: Clone> InMemoryDeduplicatingStateStore<S> {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(None),
            failures: Failures::default(),
        }
    }

    pub(crate) async fn state(&self) -> Option<(S, SequenceNumber)> {
        self.state.lock().await.clone()
    }
}

impl<I: Sync, S: Clone + Send + Sync> DeduplicatingStateRepository<I, S>
    for InMemoryDeduplicatingStateStore<S>
{
    async fn fetch_state(
        &self,
        _input: &I,
    ) -> Result<Option<(S, SequenceNumber)>, RepositoryError> {
        self.failures.check_fetch()?;
        Ok(self.state.lock().await.clone())
    }

    async fn save(
        &self,
        state: &S,
        sequence: SequenceNumber,
    ) -> Result<(S, SequenceNumber), RepositoryError> {
        self.failures.check_save()?;
        let mut stored = self.state.lock().await;
        sequence.check(stored.as_ref().map(|(_, s)| *s))?;
        let saved = (state.clone(), sequence);
        *stored = Some(saved.clone());
        Ok(saved)
    }
}

/// Publisher that records every published action.
#[derive(Debug, Default)]
pub(crate) struct RecordingPublisher<A> {
    published: Mutex<Vec<A>>,
    pub failures: Failures,
}

impl<A: Clone> RecordingPublisher<A> {
    pub(crate) fn new() -> Self {
        Self {
            published: Mutex::new(Vec::new()),
            failures: Failures::default(),
        }
    }

    pub(crate) async fn published(&self) -> Vec<A> {
        self.published.lock().await.clone()
    }
}

impl<A: Clone + Send + Sync> ActionPublisher<A> for RecordingPublisher<A> {
    async fn publish(&self, actions: &[A]) -> Result<Vec<A>, RepositoryError> {
        self.failures.check_save()?;
        self.published.lock().await.extend_from_slice(actions);
        Ok(actions.to_vec())
    }
}
