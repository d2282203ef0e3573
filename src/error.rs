//! Crate-level error types for repository access and engine execution.

use crate::version::{ExpectedVersion, SequenceNumber, Version};

/// Type-erased error from a domain rejection, a repository backend or a
/// publisher.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error returned by repository and publisher implementations.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// Optimistic lock conflict.
    ///
    /// Another writer advanced the stream or state after it was read, so
    /// the save was refused and nothing was written.
    #[error(
        "optimistic lock conflict: expected {expected}, found {}",
        current_label(.actual)
    )]
    VersionMismatch {
        /// The version the writer read before deciding.
        expected: ExpectedVersion,
        /// The version persisted at write time.
        actual: Option<Version>,
    },

    /// Deduplication conflict.
    ///
    /// The inbound sequence number does not directly follow the last one
    /// applied: either a re-delivery or a gap.
    #[error("deduplication conflict: expected sequence {expected}, got {actual}")]
    SequenceMismatch {
        /// The sequence number that would have been accepted.
        expected: SequenceNumber,
        /// The sequence number supplied by the caller.
        actual: SequenceNumber,
    },

    /// Disk I/O failure in a storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other backend failure (connection loss, serialization, ...).
    #[error("backend error: {0}")]
    Backend(#[from] BoxError),
}

fn current_label(actual: &Option<Version>) -> String {
    match actual {
        Some(version) => version.to_string(),
        None => "no stream".to_owned(),
    }
}

/// Error returned by every engine operation.
///
/// Generic over `I`, the inbound value (command, event or action result)
/// whose pipeline failed. For orchestrated flows this is the command of the
/// step that failed, which may be a saga-derived command rather than the one
/// the caller submitted.
#[derive(Debug, thiserror::Error)]
pub enum Error<I> {
    /// Prior state or events could not be read.
    #[error("failed to fetch prior state: {source}")]
    FetchFailed {
        /// The input being handled.
        input: I,
        /// The repository failure.
        #[source]
        source: RepositoryError,
    },

    /// The decision function rejected the input.
    #[error("failed to compute new state: {source}")]
    CalculationFailed {
        /// The input being handled.
        input: I,
        /// The domain rejection.
        #[source]
        source: BoxError,
    },

    /// The save was rejected, including lock and deduplication conflicts.
    #[error("failed to store result: {source}")]
    StoreFailed {
        /// The input being handled.
        input: I,
        /// The repository failure.
        #[source]
        source: RepositoryError,
    },

    /// A decision was attempted against a terminal state.
    #[error("state is terminal, no further commands are accepted")]
    TerminalStateReached {
        /// The rejected input.
        input: I,
    },

    /// The upstream batch could not be iterated, or produced actions could
    /// not be published.
    #[error("failed to publish: {source}")]
    PublishingFailed {
        /// The input being handled, if the failure is attributable to one.
        input: Option<I>,
        /// The upstream or publisher failure.
        #[source]
        source: BoxError,
    },

    /// Saga recursion went deeper than the configured limit.
    ///
    /// Only raised when [`OrchestrationConfig::max_depth`](crate::OrchestrationConfig::max_depth)
    /// is set.
    #[error("orchestration depth limit exceeded at depth {depth}")]
    DepthLimitExceeded {
        /// The saga-derived command that would have exceeded the limit.
        input: I,
        /// Depth of that command (the initiating command is at depth 0).
        depth: usize,
    },
}

impl<I> Error<I> {
    /// The input whose pipeline failed, if known.
    pub fn input(&self) -> Option<&I> {
        match self {
            Error::FetchFailed { input, .. }
            | Error::CalculationFailed { input, .. }
            | Error::StoreFailed { input, .. }
            | Error::TerminalStateReached { input }
            | Error::DepthLimitExceeded { input, .. } => Some(input),
            Error::PublishingFailed { input, .. } => input.as_ref(),
        }
    }

    /// Whether the save lost an optimistic-locking race.
    ///
    /// The caller may re-fetch, re-decide and retry; the engines never retry
    /// on their own.
    pub fn is_version_conflict(&self) -> bool {
        matches!(
            self,
            Error::StoreFailed {
                source: RepositoryError::VersionMismatch { .. },
                ..
            }
        )
    }

    /// Whether the save was rejected as a duplicate or out-of-order delivery.
    pub fn is_duplicate(&self) -> bool {
        matches!(
            self,
            Error::StoreFailed {
                source: RepositoryError::SequenceMismatch { .. },
                ..
            }
        )
    }

    pub(crate) fn calculation(input: I, source: impl Into<BoxError>) -> Self {
        Error::CalculationFailed {
            input,
            source: source.into(),
        }
    }
}

/// Adapter for `map_err`: a fetch failure while handling `input`.
pub(crate) fn fetch_failed<I: Clone>(input: &I) -> impl FnOnce(RepositoryError) -> Error<I> + '_ {
    move |source| Error::FetchFailed {
        input: input.clone(),
        source,
    }
}

/// Adapter for `map_err`: a save failure while handling `input`.
pub(crate) fn store_failed<I: Clone>(input: &I) -> impl FnOnce(RepositoryError) -> Error<I> + '_ {
    move |source| Error::StoreFailed {
        input: input.clone(),
        source,
    }
}
