//! Runtime-wide configuration.
//!
//! A plain `Default`-able config struct a host constructs and passes in.
//! Derives `serde::{Serialize, Deserialize}` so a host can load these values
//! from its own config file rather than hand-building defaults in code.

use serde::{Deserialize, Serialize};

use crate::drawlist::BuilderCaps;

/// Top-level configuration for one runtime instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Drawlist wire format version (1–5).
    pub drawlist_version: u32,

    /// Capacity caps passed to the [`crate::drawlist::DrawlistBuilder`].
    pub builder_caps: BuilderCaps,

    /// Debounce window, in milliseconds, within which rapid typing groups
    /// into a single undo entry.
    pub undo_debounce_ms: u64,

    /// Debounce window, in milliseconds, for async input validators.
    pub validator_debounce_ms: u64,

    /// Maximum number of buffered lines for the tail helper used by
    /// log-console widgets before the oldest lines are dropped.
    pub tail_max_buffer: usize,

    /// Reconnect delay, in milliseconds, for event-source hooks.
    pub event_source_reconnect_delay_ms: u64,

    /// Whether the param-validation pass is enabled on the drawlist builder.
    pub validate_builder_params: bool,

    /// Whether the drawlist builder reuses a single growing output buffer
    /// across frames rather than allocating fresh each `build()`.
    pub reuse_output_buffer: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            drawlist_version: 5,
            builder_caps: BuilderCaps::default(),
            undo_debounce_ms: 400,
            validator_debounce_ms: 250,
            tail_max_buffer: 4096,
            event_source_reconnect_delay_ms: 1000,
            validate_builder_params: true,
            reuse_output_buffer: false,
        }
    }
}
