//! Error taxonomy for the reconciliation/layout/render/encode pipeline.
//!
//! Errors fall into three classes:
//! - fatal structural errors that abort the current frame ([`CoreError`]),
//! - the single recoverable encoder limit, [`BuildError::TooLarge`],
//! - swallowed user-code errors, which never materialize as a typed value at
//!   all — they are caught and discarded at the call boundary instead (see
//!   [`crate::instance::registry`] and [`crate::router`]).

use thiserror::Error;

//--------------------------------------------------------------------------------------------------
// Fatal structural errors
//--------------------------------------------------------------------------------------------------

/// Fatal errors that abort the current frame without partial output.
///
/// The shadow framebuffer is left unchanged when any of these surface; the
/// caller should treat the frame as not-yet-committed and may retry on the
/// next tick once the offending state is fixed.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoreError {
    /// Two sibling VNodes in the same parent carried the same slot id.
    #[error(
        "duplicate key {key:?} under parent instance {parent}: children {first_index} and {second_index} collide"
    )]
    DuplicateKey {
        /// Instance id of the parent whose children collided.
        parent: u64,
        /// The offending key (or `i:<index>` slot id for unkeyed children).
        key: String,
        /// Index of the first colliding child.
        first_index: usize,
        /// Index of the second colliding child.
        second_index: usize,
    },

    /// A hook ran in a different order than in the prior successful render.
    #[error("hook order mismatch for instance {instance}: expected {expected:?} at slot {slot}, got {actual:?}")]
    HookOrderMismatch {
        /// Instance whose render violated hook ordering.
        instance: u64,
        /// Hook slot index at which the mismatch was detected.
        slot: usize,
        /// Hook kind recorded on the previous successful render.
        expected: &'static str,
        /// Hook kind encountered on this render.
        actual: &'static str,
    },

    /// A render used more hooks than the previously committed render.
    #[error("hook count mismatch for instance {instance}: expected {expected}, got at least {actual}")]
    HookCountMismatch {
        /// Instance whose render violated the hook-count invariant.
        instance: u64,
        /// Hook count fixed by the first successful render.
        expected: usize,
        /// Hook count observed so far on this render.
        actual: usize,
    },

    /// A widget's props failed validation (e.g. a slider with `min > max`).
    #[error("invalid props on instance {instance} ({kind}): {reason}")]
    InvalidProps {
        /// Instance whose props failed validation.
        instance: u64,
        /// VNode kind name, for diagnostics.
        kind: &'static str,
        /// Human-readable validation failure.
        reason: String,
    },
}

//--------------------------------------------------------------------------------------------------
// Recoverable encoder errors
//--------------------------------------------------------------------------------------------------

/// Errors raised by the [`crate::drawlist::DrawlistBuilder`].
///
/// `BadParams` is a fatal, frame-aborting error. `TooLarge` is
/// the sole *recoverable* error: the builder remains in the error state
/// until [`crate::drawlist::DrawlistBuilder::reset`] is called, and the
/// renderer may retry at a smaller viewport or with smaller caps.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BuildError {
    /// A method argument was out of range or an enum code was unrecognized,
    /// or a command was used at a builder version that does not support it.
    #[error("bad params: {0}")]
    BadParams(String),

    /// Building would exceed one of the builder's configured capacity caps.
    #[error("drawlist exceeds cap {cap}: {size} > {limit}")]
    TooLarge {
        /// Name of the exceeded cap (`maxDrawlistBytes`, `maxCmdCount`, ...).
        cap: &'static str,
        /// The size that would have been produced.
        size: usize,
        /// The configured limit.
        limit: usize,
    },
}

/// Result type threaded through the incremental renderer's per-frame work.
pub type CoreResult<T> = Result<T, CoreError>;

/// Result type threaded through drawlist builder operations.
pub type BuildResult<T> = Result<T, BuildError>;
