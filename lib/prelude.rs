//! Convenience re-exports of the types most host applications need.
//!
//! ```rust
//! use fluxterm::prelude::*;
//! ```

pub use crate::backend::{
    Backend, Caps, Diagnostic, DiagnosticSeverity, Event, EventBatch, Key, KeyAction, Modifiers,
    MouseButton, MouseButtons, MouseEventKind,
};
pub use crate::commit::{CommitReport, CommittedTree, Runtime, RuntimeNode};
pub use crate::config::RuntimeConfig;
pub use crate::drawlist::{BuilderCaps, Command, CursorState, Drawlist, DrawlistBuilder};
pub use crate::error::{BuildError, BuildResult, CoreError, CoreResult};
pub use crate::instance::InstanceId;
pub use crate::layout::{FlexLayout, LayoutEngine, LayoutMap, LayoutRect};
pub use crate::metadata::{MetadataBundle, MetadataCollector};
pub use crate::router::focus::FocusModel;
pub use crate::router::input_editor::{EditOp, EditResult, EditorState};
pub use crate::router::{EventRouter, RoutedAction};
pub use crate::style::{CellStyle, Color, Dimension, Direction, Overflow, Spacing, TextStyle};
pub use crate::tail::{Reconnect, TailBuffer, TailSource, TailSourceFactory};
pub use crate::vnode::{VNode, VNodeKind, VNodeKindTag};
