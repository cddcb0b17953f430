//! # fluxterm
//!
//! Reconciliation, layout, and drawlist-encoding core for a terminal UI
//! framework. This crate owns the single-threaded pipeline that turns a tree
//! of declarative [`vnode::VNode`]s into an encoded drawlist frame plus a
//! routed focus/input model — it does not own a terminal, a rendering
//! backend, or any concrete widget's visual appearance. Those are the job of
//! a host application built against the [`backend::Backend`] trait.
//!
//! ## Pipeline
//!
//! Each frame runs the same nine-module pipeline:
//!
//! 1. [`reconcile`] diffs a freshly built [`vnode::VNode`] tree against the
//!    previously committed one, by slot id (keyed or positional).
//! 2. [`instance`] holds per-widget hook state (`state`, `ref`, `effect`,
//!    `memo`, `callback`) across renders and runs the post-commit effect
//!    flush.
//! 3. [`commit`] applies the reconcile output, producing a
//!    [`commit::CommittedTree`] of [`commit::RuntimeNode`]s.
//! 4. [`layout`] computes opaque `(x, y, w, h)` geometry for every committed
//!    node via a pluggable [`layout::LayoutEngine`] ([`layout::FlexLayout`]
//!    ships as the one concrete implementation).
//! 5. [`metadata`] walks the committed tree once to collect the focus graph:
//!    focusable ids, zones, traps, and per-widget routing metadata.
//! 6. [`render`] diffs the committed+laid-out tree against a shadow
//!    framebuffer and emits [`drawlist::Command`]s for the damaged region
//!    (or the whole frame, in full mode).
//! 7. [`drawlist`] encodes those commands into the versioned binary wire
//!    format a renderer-side consumer parses back with [`drawlist::parse`].
//! 8. [`router`] dispatches backend input events against the current focus
//!    model and the committed tree's widget callbacks.
//! 9. [`backend`] is the trait boundary a host implements to actually read
//!    input and write bytes; this crate never performs I/O itself.
//!
//! [`error`] holds the three-class error taxonomy threaded through steps
//! 1–7; [`config`] holds the `serde`-deserializable runtime configuration;
//! [`style`] holds the plain value types (`Color`, `CellStyle`, ...) shared
//! by `vnode`, `render`, and `drawlist`.

pub mod backend;
pub mod commit;
pub mod config;
pub mod drawlist;
pub mod error;
pub mod instance;
pub mod layout;
pub mod metadata;
pub mod reconcile;
pub mod render;
pub mod router;
pub mod style;
pub mod tail;
mod utils;
pub mod vnode;

pub mod prelude;

pub use commit::{CommitReport, CommittedTree, Runtime, RuntimeNode};
pub use error::{BuildError, BuildResult, CoreError, CoreResult};
pub use router::EventRouter;
pub use vnode::{VNode, VNodeKind};
