//! Version and sequence tokens for optimistic locking and deduplication.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::RepositoryError;

/// Monotonically increasing version of a persisted stream or state.
///
/// The first write produces [`Version::FIRST`]; every later write produces
/// the [`next`](Version::next) version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version(u64);

impl Version {
    /// Version assigned by the first write.
    pub const FIRST: Version = Version(1);

    /// Wrap a raw version number.
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw version number.
    pub fn get(self) -> u64 {
        self.0
    }

    /// The version assigned by the write following this one.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// The version assigned to a write that follows `current`.
    pub fn after(current: Option<Version>) -> Self {
        current.map_or(Self::FIRST, Version::next)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// The version a writer read before deciding, checked again at write time.
///
/// Mirrors the optimistic-concurrency contract: a save carrying an
/// `ExpectedVersion` must fail if another writer advanced the stream in the
/// meantime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpectedVersion {
    /// Nothing has been persisted yet (first write).
    NoStream,
    /// The stream or state must be at exactly this version.
    Exact(Version),
}

impl ExpectedVersion {
    /// The expectation matching what a fetch returned.
    pub fn from_current(current: Option<Version>) -> Self {
        current.map_or(Self::NoStream, Self::Exact)
    }

    /// Compare the expectation against the version currently persisted.
    ///
    /// Repository implementations call this inside their atomic section.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::VersionMismatch`] if `actual` differs from
    /// the expectation.
    pub fn check(self, actual: Option<Version>) -> Result<(), RepositoryError> {
        match (self, actual) {
            (Self::NoStream, None) => Ok(()),
            (Self::Exact(expected), Some(actual)) if expected == actual => Ok(()),
            _ => Err(RepositoryError::VersionMismatch {
                expected: self,
                actual,
            }),
        }
    }
}

impl fmt::Display for ExpectedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoStream => f.write_str("no stream"),
            Self::Exact(version) => version.fmt(f),
        }
    }
}

/// Caller-assigned position of an inbound command or event in its upstream
/// delivery sequence.
///
/// Used to reject re-delivery from at-least-once sources: an input is only
/// applied if its sequence number directly follows the last applied one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SequenceNumber(u64);

impl SequenceNumber {
    /// Sequence number of the first input ever applied.
    pub const FIRST: SequenceNumber = SequenceNumber(1);

    /// Wrap a raw sequence number.
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw sequence number.
    pub fn get(self) -> u64 {
        self.0
    }

    /// The sequence number that must follow `last` (or [`FIRST`](Self::FIRST)).
    pub fn successor_of(last: Option<SequenceNumber>) -> Self {
        last.map_or(Self::FIRST, |last| Self(last.0 + 1))
    }

    /// Whether `self` is exactly the successor of `last`.
    pub fn follows(self, last: Option<SequenceNumber>) -> bool {
        self == Self::successor_of(last)
    }

    /// Check that `self` directly follows `last`.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::SequenceMismatch`] otherwise.
    pub fn check(self, last: Option<SequenceNumber>) -> Result<(), RepositoryError> {
        if self.follows(last) {
            Ok(())
        } else {
            Err(RepositoryError::SequenceMismatch {
                expected: Self::successor_of(last),
                actual: self,
            })
        }
    }
}

impl fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn versions_increase_by_one() {
        assert_eq!(Version::after(None), Version::FIRST);
        assert_eq!(Version::after(Some(Version::new(4))), Version::new(5));
        assert!(Version::FIRST < Version::FIRST.next());
    }

    #[test]
    fn expected_version_accepts_matching_state() {
        assert!(ExpectedVersion::NoStream.check(None).is_ok());
        assert!(
            ExpectedVersion::Exact(Version::new(3))
                .check(Some(Version::new(3)))
                .is_ok()
        );
        assert_eq!(
            ExpectedVersion::from_current(Some(Version::FIRST)),
            ExpectedVersion::Exact(Version::FIRST)
        );
    }

    #[test]
    fn expected_version_rejects_concurrent_write() {
        let err = ExpectedVersion::Exact(Version::new(3))
            .check(Some(Version::new(4)))
            .unwrap_err();
        assert!(
            matches!(
                err,
                RepositoryError::VersionMismatch {
                    expected: ExpectedVersion::Exact(_),
                    actual: Some(_),
                }
            ),
            "expected VersionMismatch, got: {err}"
        );
        assert_eq!(
            err.to_string(),
            "optimistic lock conflict: expected v3, found v4"
        );

        let err = ExpectedVersion::NoStream
            .check(Some(Version::FIRST))
            .unwrap_err();
        assert!(matches!(err, RepositoryError::VersionMismatch { .. }));
    }

    #[test]
    fn sequence_numbers_must_be_contiguous() {
        assert!(SequenceNumber::FIRST.follows(None));
        assert!(SequenceNumber::new(3).follows(Some(SequenceNumber::new(2))));
        assert!(!SequenceNumber::new(2).follows(Some(SequenceNumber::new(2))));
        assert!(!SequenceNumber::new(5).follows(Some(SequenceNumber::new(2))));

        let err = SequenceNumber::new(2)
            .check(Some(SequenceNumber::new(2)))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "deduplication conflict: expected sequence #3, got #2"
        );
    }
}
