//! Two-variant tagged union used to route commands, events and actions
//! between combined machines.

use serde::{Deserialize, Serialize};

/// Either a value for the left machine or a value for the right machine.
///
/// Combining two deciders `X` and `Y` produces a decider whose commands are
/// `Sum<X::Command, Y::Command>` and whose events are
/// `Sum<X::Event, Y::Event>`. Matching is always exhaustive, so a value can
/// never belong to neither side.
///
/// Serialized adjacently tagged (`{"side": "Left", "value": ...}`) so that
/// repositories persisting combined events keep the side explicit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "side", content = "value")]
pub enum Sum<L, R> {
    /// Value addressed to the left machine.
    Left(L),
    /// Value addressed to the right machine.
    Right(R),
}

impl<L, R> Sum<L, R> {
    /// Returns the left value, if any.
    pub fn left(&self) -> Option<&L> {
        match self {
            Sum::Left(l) => Some(l),
            Sum::Right(_) => None,
        }
    }

    /// Returns the right value, if any.
    pub fn right(&self) -> Option<&R> {
        match self {
            Sum::Left(_) => None,
            Sum::Right(r) => Some(r),
        }
    }

    /// Exchange the two sides.
    pub fn swap(self) -> Sum<R, L> {
        match self {
            Sum::Left(l) => Sum::Right(l),
            Sum::Right(r) => Sum::Left(r),
        }
    }

    /// Transform the left value, leaving a right value untouched.
    pub fn map_left<L2>(self, f: impl FnOnce(L) -> L2) -> Sum<L2, R> {
        match self {
            Sum::Left(l) => Sum::Left(f(l)),
            Sum::Right(r) => Sum::Right(r),
        }
    }

    /// Transform the right value, leaving a left value untouched.
    pub fn map_right<R2>(self, f: impl FnOnce(R) -> R2) -> Sum<L, R2> {
        match self {
            Sum::Left(l) => Sum::Left(l),
            Sum::Right(r) => Sum::Right(f(r)),
        }
    }
}

impl<A, B, C> Sum<A, Sum<B, C>> {
    /// Re-associate `A + (B + C)` as `(A + B) + C`.
    ///
    /// Together with [`Sum::assoc_right`] this is the isomorphism under which
    /// `x.combine(y.combine(z))` and `x.combine(y).combine(z)` are equivalent.
    pub fn assoc_left(self) -> Sum<Sum<A, B>, C> {
        match self {
            Sum::Left(a) => Sum::Left(Sum::Left(a)),
            Sum::Right(Sum::Left(b)) => Sum::Left(Sum::Right(b)),
            Sum::Right(Sum::Right(c)) => Sum::Right(c),
        }
    }
}

impl<A, B, C> Sum<Sum<A, B>, C> {
    /// Re-associate `(A + B) + C` as `A + (B + C)`.
    pub fn assoc_right(self) -> Sum<A, Sum<B, C>> {
        match self {
            Sum::Left(Sum::Left(a)) => Sum::Left(a),
            Sum::Left(Sum::Right(b)) => Sum::Right(Sum::Left(b)),
            Sum::Right(c) => Sum::Right(Sum::Right(c)),
        }
    }
}
