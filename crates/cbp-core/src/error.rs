// SPDX-License-Identifier: AGPL-3.0-or-later
// Part of CompactBilinear — Licensed under AGPL-3.0-or-later.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type PoolResult<T> = Result<T, PoolError>;

/// Errors emitted by sketch construction and the pooling transform.
///
/// Every variant is a precondition violation: it is raised synchronously,
/// before any output is materialised, and is fatal to that single call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// Malformed construction parameters: mismatched spec lengths,
    /// out-of-range bucket indices, non-`±1` signs, or non-positive dims.
    #[error("invalid argument `{argument}`: {reason}")]
    InvalidArgument {
        argument: &'static str,
        reason: String,
    },
    /// Forward or backward inputs whose dimensions disagree with the
    /// construction-time contract or with each other.
    #[error("shape mismatch for `{label}`: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        label: &'static str,
        expected: Vec<usize>,
        got: Vec<usize>,
    },
}

impl PoolError {
    pub(crate) fn invalid(argument: &'static str, reason: impl Into<String>) -> Self {
        PoolError::InvalidArgument {
            argument,
            reason: reason.into(),
        }
    }
}
