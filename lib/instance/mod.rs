//! Per-widget state storage, hook ordering, and the effect/cleanup
//! lifecycle (spec §4.2).

mod hooks;
mod registry;

pub use hooks::{deps_equal, AnyDeps, Cleanup, Deps, EffectFn};
pub use registry::{
    InstanceAlreadyExists, InstanceId, InstanceIdAllocator, InstanceRegistry, PendingEffect,
    RefHandle, RenderCursor, StateSetter,
};
