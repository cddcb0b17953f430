//! Hook state variants.
//!
//! Each slot in a composite instance's `hooks` vector is one of: a `state`
//! cell, a `ref` cell, an `effect` record, a `memo` record, or a `callback`
//! record. Dependency arrays need identity-equality across renders without
//! the registry knowing each hook's concrete type up front, so deps are
//! boxed behind [`AnyDeps`] — a small object-safe extension of `Any` that
//! knows how to compare itself against another boxed value of the same
//! concrete type. This is the same arena-of-opaque-slots approach used one
//! level up for the committed instance tree, applied here to per-instance
//! hook storage.

use std::any::Any;
use std::fmt;

/// Cleanup callback returned by an effect's setup function.
pub type Cleanup = Box<dyn FnOnce()>;

/// Effect setup callback: returns an optional cleanup to run before the
/// next effect invocation (or on unmount).
pub type EffectFn = Box<dyn FnOnce() -> Option<Cleanup>>;

/// Object-safe dependency comparison: two boxed deps are equal only if they
/// carry the same concrete type and that type's `PartialEq` agrees.
pub trait AnyDeps {
    fn as_any(&self) -> &dyn Any;
    fn deps_eq(&self, other: &dyn AnyDeps) -> bool;
}

impl<T: PartialEq + 'static> AnyDeps for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn deps_eq(&self, other: &dyn AnyDeps) -> bool {
        other.as_any().downcast_ref::<T>().is_some_and(|o| self == o)
    }
}

/// A boxed dependency array (or `None` for "always re-run").
pub type Deps = Option<Box<dyn AnyDeps>>;

/// Compares two dependency snapshots per spec's "element-wise identity-equal
/// to the previous `deps`" rule: `None` is only equal to `None`.
pub fn deps_equal(a: &Deps, b: &Deps) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.deps_eq(b.as_ref()),
        _ => false,
    }
}

/// One hook slot's persistent state.
pub enum HookSlot {
    State(Box<dyn Any>),
    Ref(Box<dyn Any>),
    Effect(EffectSlot),
    Memo(MemoSlot),
    Callback(CallbackSlot),
}

impl HookSlot {
    /// Short kind name used in [`crate::error::CoreError::HookOrderMismatch`].
    pub fn kind_name(&self) -> &'static str {
        match self {
            HookSlot::State(_) => "state",
            HookSlot::Ref(_) => "ref",
            HookSlot::Effect(_) => "effect",
            HookSlot::Memo(_) => "memo",
            HookSlot::Callback(_) => "callback",
        }
    }
}

impl fmt::Debug for HookSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind_name())
    }
}

/// An `effect` hook's persistent bookkeeping.
pub struct EffectSlot {
    /// Dependency snapshot from the last time the effect's setup ran.
    pub deps: Deps,
    /// Cleanup returned by the currently-installed effect, if any.
    pub cleanup: Option<Cleanup>,
    /// Setup queued for the post-commit flush, if this render scheduled one.
    pub next: Option<EffectFn>,
    /// True between scheduling and the post-commit flush actually running.
    pub pending: bool,
}

impl Default for EffectSlot {
    fn default() -> Self {
        Self { deps: None, cleanup: None, next: None, pending: false }
    }
}

/// A `memo` hook's persistent bookkeeping.
pub struct MemoSlot {
    pub deps: Deps,
    pub value: Box<dyn Any>,
}

/// A `callback` hook's persistent bookkeeping.
pub struct CallbackSlot {
    pub deps: Deps,
    pub value: Box<dyn Any>,
}
