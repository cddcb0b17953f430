//! Instance registry: per-widget state storage, hook ordering, and the
//! effect/cleanup lifecycle.
//!
//! An arena of instance records indexed by `InstanceId`, in the same
//! arena-behind-`RefCell` style as the render tree's own focus/hover
//! bookkeeping (looked up by identity rather than owned pointers). Unlike
//! that tree, hook state must be reachable from closures captured *during*
//! a render and invoked long after it (a `useState` setter fired from a
//! button's `on_press`), so the registry is meant to be held behind an `Rc`
//! by its owner and cloned into those closures.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use thiserror::Error;

use crate::error::CoreError;
use crate::instance::hooks::{deps_equal, CallbackSlot, Cleanup, Deps, EffectFn, EffectSlot, HookSlot, MemoSlot};

/// Stable identifier for a runtime instance, allocated by the instance-id
/// allocator and never reused within a session.
pub type InstanceId = u64;

/// Allocates monotonically increasing, never-reused instance ids.
#[derive(Debug, Default)]
pub struct InstanceIdAllocator {
    next: u64,
}

impl InstanceIdAllocator {
    pub fn new() -> Self {
        Self { next: 0 }
    }

    pub fn alloc(&mut self) -> InstanceId {
        let id = self.next;
        self.next += 1;
        id
    }
}

/// Internal invariant violation: the instance-id allocator handed out an id
/// that the registry already holds state for.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("instance {0} already exists in the registry")]
pub struct InstanceAlreadyExists(pub InstanceId);

/// Per-instance composite-widget state.
pub struct CompositeState {
    pub hooks: Vec<HookSlot>,
    pub generation: u64,
    pub needs_render: bool,
    pending_cleanups: Vec<Cleanup>,
    pending_effects: Vec<(usize, EffectFn)>,
    expected_hook_count: Option<usize>,
    app_state_selections: Vec<Box<dyn Any>>,
    /// Render-local cursor; reset by `begin_render`.
    cursor: usize,
}

impl CompositeState {
    fn new() -> Self {
        Self {
            hooks: Vec::new(),
            generation: 0,
            needs_render: true,
            pending_cleanups: Vec::new(),
            pending_effects: Vec::new(),
            expected_hook_count: None,
            app_state_selections: Vec::new(),
            cursor: 0,
        }
    }
}

/// A queued effect ready for the post-commit flush: which hook slot it came
/// from (so its returned cleanup can be written back) and the setup to run.
pub struct PendingEffect {
    pub instance: InstanceId,
    pub slot: usize,
    pub run: EffectFn,
}

/// Owns every composite instance's hook state. Held behind an `Rc` by the
/// runtime so hook closures (state setters) can capture a handle back into
/// it.
pub struct InstanceRegistry {
    states: RefCell<HashMap<InstanceId, CompositeState>>,
}

impl InstanceRegistry {
    pub fn new() -> Rc<Self> {
        Rc::new(Self { states: RefCell::new(HashMap::new()) })
    }

    /// Creates fresh state for `id`. Fails if `id` already has state — this
    /// can only happen if the instance-id allocator handed out a live id
    /// twice, which is an allocator bug, not a user-reachable condition.
    pub fn create(&self, id: InstanceId) -> Result<(), InstanceAlreadyExists> {
        let mut states = self.states.borrow_mut();
        if states.contains_key(&id) {
            return Err(InstanceAlreadyExists(id));
        }
        states.insert(id, CompositeState::new());
        Ok(())
    }

    pub fn contains(&self, id: InstanceId) -> bool {
        self.states.borrow().contains_key(&id)
    }

    /// Runs pending cleanups in insertion order (swallowing errors per spec
    /// §7), bumps the generation to invalidate stale closures, and deletes
    /// the instance's state.
    pub fn delete(&self, id: InstanceId) {
        let removed = self.states.borrow_mut().remove(&id);
        if let Some(mut state) = removed {
            for cleanup in state.pending_cleanups.drain(..) {
                let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(cleanup));
            }
            // Reverse hook-declaration order cleanup for still-installed effects.
            for hook in state.hooks.iter_mut().rev() {
                if let HookSlot::Effect(effect) = hook {
                    if let Some(cleanup) = effect.cleanup.take() {
                        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(cleanup));
                    }
                }
            }
        }
    }

    /// Marks an instance dirty, requesting a re-render.
    pub fn invalidate(&self, id: InstanceId) {
        if let Some(state) = self.states.borrow_mut().get_mut(&id) {
            state.needs_render = true;
        }
    }

    pub fn needs_render(&self, id: InstanceId) -> bool {
        self.states.borrow().get(&id).map(|s| s.needs_render).unwrap_or(false)
    }

    pub fn generation(&self, id: InstanceId) -> Option<u64> {
        self.states.borrow().get(&id).map(|s| s.generation)
    }

    pub fn increment_generation(&self, id: InstanceId) {
        if let Some(state) = self.states.borrow_mut().get_mut(&id) {
            state.generation += 1;
        }
    }

    pub fn set_app_state_selections(&self, id: InstanceId, snapshots: Vec<Box<dyn Any>>) {
        if let Some(state) = self.states.borrow_mut().get_mut(&id) {
            state.app_state_selections = snapshots;
        }
    }

    /// Begins a render pass for `id`, resetting the hook cursor and
    /// per-render pending queues. Takes an
    /// explicit `&Rc<Self>` (rather than an `Rc<Self>` method receiver,
    /// which stable Rust does not support for references-to-`Rc`) so the
    /// returned cursor's hooks can clone a owning handle back into the
    /// registry for state-setter closures.
    pub fn begin_render<'a>(registry: &'a Rc<Self>, id: InstanceId) -> RenderCursor<'a> {
        {
            let mut states = registry.states.borrow_mut();
            let state = states.entry(id).or_insert_with(CompositeState::new);
            state.cursor = 0;
            state.needs_render = false;
            state.pending_cleanups.clear();
            state.pending_effects.clear();
        }
        RenderCursor { registry, instance: id }
    }

    fn with_state<R>(&self, id: InstanceId, f: impl FnOnce(&mut CompositeState) -> R) -> R {
        let mut states = self.states.borrow_mut();
        let state = states.entry(id).or_insert_with(CompositeState::new);
        f(state)
    }
}

impl Default for InstanceRegistry {
    fn default() -> Self {
        Self { states: RefCell::new(HashMap::new()) }
    }
}

//--------------------------------------------------------------------------------------------------
// Render cursor / hook API
//--------------------------------------------------------------------------------------------------

/// Scope for one render of one composite instance. Dropped (via
/// [`RenderCursor::end_render`]) at the end of the render function, at
/// which point the hook-count invariant is enforced.
pub struct RenderCursor<'a> {
    registry: &'a Rc<InstanceRegistry>,
    instance: InstanceId,
}

impl<'a> RenderCursor<'a> {
    fn next_slot(&self) -> usize {
        self.registry.states.borrow().get(&self.instance).map(|s| s.cursor).unwrap_or(0)
    }

    fn advance(&self) {
        if let Some(state) = self.registry.states.borrow_mut().get_mut(&self.instance) {
            state.cursor += 1;
        }
    }

    /// Checks that slot `idx` either doesn't exist yet (first encounter) or
    /// was previously the expected kind, raising `HookOrderMismatch`
    /// otherwise.
    fn check_order(&self, idx: usize, expected: &'static str) -> Result<bool, CoreError> {
        let states = self.registry.states.borrow();
        let state = states.get(&self.instance).expect("begin_render initializes state");
        match state.hooks.get(idx) {
            None => Ok(true), // first encounter
            Some(slot) => {
                let actual = slot.kind_name();
                if actual == expected {
                    Ok(false)
                } else {
                    Err(CoreError::HookOrderMismatch {
                        instance: self.instance,
                        slot: idx,
                        expected: actual,
                        actual: expected,
                    })
                }
            }
        }
    }

    /// `useState<T>`. Allocates on first encounter; returns the stored
    /// value and a stale-generation-aware setter thereafter.
    pub fn use_state<T>(&self, initial: impl FnOnce() -> T) -> Result<(T, StateSetter<T>), CoreError>
    where
        T: Clone + PartialEq + 'static,
    {
        let idx = self.next_slot();
        let first = self.check_order(idx, "state")?;
        if first {
            let mut states = self.registry.states.borrow_mut();
            let state = states.get_mut(&self.instance).unwrap();
            state.hooks.push(HookSlot::State(Box::new(initial())));
        }
        self.advance();
        let value = {
            let states = self.registry.states.borrow();
            let state = states.get(&self.instance).unwrap();
            match &state.hooks[idx] {
                HookSlot::State(v) => v.downcast_ref::<T>().expect("hook type stable across renders").clone(),
                _ => unreachable!("checked above"),
            }
        };
        let setter = StateSetter {
            registry: self.registry.clone(),
            instance: self.instance,
            slot: idx,
            generation: self.registry.generation(self.instance).unwrap_or(0),
            _marker: std::marker::PhantomData,
        };
        Ok((value, setter))
    }

    /// `useRef<T>`. Stable mutable cell across renders.
    pub fn use_ref<T: 'static>(&self, initial: impl FnOnce() -> T) -> Result<RefHandle<T>, CoreError> {
        let idx = self.next_slot();
        let first = self.check_order(idx, "ref")?;
        if first {
            let mut states = self.registry.states.borrow_mut();
            let state = states.get_mut(&self.instance).unwrap();
            state.hooks.push(HookSlot::Ref(Box::new(initial())));
        }
        self.advance();
        Ok(RefHandle { registry: self.registry.clone(), instance: self.instance, slot: idx, _marker: std::marker::PhantomData })
    }

    /// `useEffect(effect, deps?)`.
    pub fn use_effect(
        &self,
        effect: impl FnOnce() -> Option<Cleanup> + 'static,
        deps: Deps,
    ) -> Result<(), CoreError> {
        let idx = self.next_slot();
        let first = self.check_order(idx, "effect")?;
        let mut states = self.registry.states.borrow_mut();
        let state = states.get_mut(&self.instance).unwrap();
        if first {
            state.hooks.push(HookSlot::Effect(EffectSlot::default()));
        }
        let slot_idx = idx;
        let should_schedule = first || {
            let HookSlot::Effect(e) = &state.hooks[slot_idx] else { unreachable!() };
            !deps_equal(&e.deps, &deps) || e.pending
        };
        if should_schedule {
            let HookSlot::Effect(e) = &mut state.hooks[slot_idx] else { unreachable!() };
            if let Some(cleanup) = e.cleanup.take() {
                state.pending_cleanups.push(cleanup);
            }
            let HookSlot::Effect(e) = &mut state.hooks[slot_idx] else { unreachable!() };
            e.deps = deps;
            e.pending = true;
            let boxed: EffectFn = Box::new(effect);
            state.pending_effects.push((slot_idx, boxed));
        }
        drop(states);
        self.advance();
        Ok(())
    }

    /// `useMemo(factory, deps?)`.
    pub fn use_memo<T: Clone + 'static>(&self, factory: impl FnOnce() -> T, deps: Deps) -> Result<T, CoreError> {
        let idx = self.next_slot();
        let first = self.check_order(idx, "memo")?;
        let mut states = self.registry.states.borrow_mut();
        let state = states.get_mut(&self.instance).unwrap();
        if first {
            let value = factory();
            state.hooks.push(HookSlot::Memo(MemoSlot { deps, value: Box::new(value) }));
        } else {
            let HookSlot::Memo(m) = &state.hooks[idx] else { unreachable!() };
            if !deps_equal(&m.deps, &deps) {
                let value = factory();
                let HookSlot::Memo(m) = &mut state.hooks[idx] else { unreachable!() };
                m.deps = deps;
                m.value = Box::new(value);
            }
        }
        let HookSlot::Memo(m) = &state.hooks[idx] else { unreachable!() };
        let value = m.value.downcast_ref::<T>().expect("hook type stable across renders").clone();
        drop(states);
        self.advance();
        Ok(value)
    }

    /// `useCallback(fn, deps?)`.
    pub fn use_callback<F: Clone + 'static>(&self, f: F, deps: Deps) -> Result<F, CoreError> {
        let idx = self.next_slot();
        let first = self.check_order(idx, "callback")?;
        let mut states = self.registry.states.borrow_mut();
        let state = states.get_mut(&self.instance).unwrap();
        if first {
            state.hooks.push(HookSlot::Callback(CallbackSlot { deps, value: Box::new(f.clone()) }));
        } else {
            let HookSlot::Callback(c) = &state.hooks[idx] else { unreachable!() };
            if !deps_equal(&c.deps, &deps) {
                let HookSlot::Callback(c) = &mut state.hooks[idx] else { unreachable!() };
                c.deps = deps;
                c.value = Box::new(f.clone());
            }
        }
        let HookSlot::Callback(c) = &state.hooks[idx] else { unreachable!() };
        let value = c.value.downcast_ref::<F>().expect("hook type stable across renders").clone();
        drop(states);
        self.advance();
        Ok(value)
    }

    /// `endRender`. Enforces the hook-count invariant and returns the
    /// effects queued this render for the post-commit flush.
    pub fn end_render(self) -> Result<Vec<PendingEffect>, CoreError> {
        let mut states = self.registry.states.borrow_mut();
        let state = states.get_mut(&self.instance).unwrap();
        let used = state.cursor;
        match state.expected_hook_count {
            None => state.expected_hook_count = Some(used),
            Some(expected) if expected != used => {
                return Err(CoreError::HookCountMismatch { instance: self.instance, expected, actual: used });
            }
            Some(_) => {}
        }
        let effects = std::mem::take(&mut state.pending_effects);
        Ok(effects
            .into_iter()
            .map(|(slot, run)| PendingEffect { instance: self.instance, slot, run })
            .collect())
    }

    pub fn pending_cleanups(&self) -> Vec<Cleanup> {
        if let Some(state) = self.registry.states.borrow_mut().get_mut(&self.instance) {
            std::mem::take(&mut state.pending_cleanups)
        } else {
            Vec::new()
        }
    }
}

/// Handle returned by `useState`; captures its instance, slot, and the
/// generation observed at capture time so stale closures become no-ops
/// (Design Notes §9, "Generations prevent stale closures").
pub struct StateSetter<T> {
    registry: Rc<InstanceRegistry>,
    instance: InstanceId,
    slot: usize,
    generation: u64,
    _marker: std::marker::PhantomData<T>,
}

impl<T: Clone + PartialEq + 'static> StateSetter<T> {
    /// Sets the state to `value` via a transformer over the current value.
    /// No-ops if the instance has since been destroyed and recreated (its
    /// generation moved on) or deleted entirely.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let current_gen = self.registry.generation(self.instance);
        if current_gen != Some(self.generation) {
            return;
        }
        let changed = {
            let mut states = self.registry.states.borrow_mut();
            let Some(state) = states.get_mut(&self.instance) else { return };
            let HookSlot::State(slot) = &mut state.hooks[self.slot] else {
                panic!("state hook slot type changed between renders")
            };
            let old = slot.downcast_ref::<T>().expect("hook type stable across renders").clone();
            let new = f(&old);
            let changed = new != old;
            *slot = Box::new(new);
            changed
        };
        if changed {
            self.registry.invalidate(self.instance);
        }
    }

    /// Sets the state directly.
    pub fn set(&self, value: T) {
        self.update(|_| value.clone());
    }
}

impl<T> Clone for StateSetter<T> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            instance: self.instance,
            slot: self.slot,
            generation: self.generation,
            _marker: std::marker::PhantomData,
        }
    }
}

/// Handle returned by `useRef`; grants mutable access scoped to a closure
/// so the borrow never outlives a single registry access.
pub struct RefHandle<T> {
    registry: Rc<InstanceRegistry>,
    instance: InstanceId,
    slot: usize,
    _marker: std::marker::PhantomData<T>,
}

impl<T: 'static> RefHandle<T> {
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut states = self.registry.states.borrow_mut();
        let state = states.get_mut(&self.instance).expect("ref hook used after instance deleted");
        let HookSlot::Ref(slot) = &mut state.hooks[self.slot] else {
            panic!("ref hook slot type changed between renders")
        };
        f(slot.downcast_mut::<T>().expect("hook type stable across renders"))
    }
}

impl<T> Clone for RefHandle<T> {
    fn clone(&self) -> Self {
        Self { registry: self.registry.clone(), instance: self.instance, slot: self.slot, _marker: std::marker::PhantomData }
    }
}

//--------------------------------------------------------------------------------------------------
// Post-commit flush & garbage collection
//--------------------------------------------------------------------------------------------------

impl InstanceRegistry {
    /// Runs all queued cleanups (insertion order, errors swallowed) then
    /// all pending effects, recording each returned cleanup and clearing
    /// `pending` (spec §4.2 "Post-commit flush").
    pub fn flush(&self, cleanups: Vec<Cleanup>, effects: Vec<PendingEffect>) {
        for cleanup in cleanups {
            let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(cleanup));
        }
        for pending in effects {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(pending.run));
            let cleanup = result.unwrap_or(None);
            let mut states = self.states.borrow_mut();
            if let Some(state) = states.get_mut(&pending.instance) {
                if let Some(HookSlot::Effect(e)) = state.hooks.get_mut(pending.slot) {
                    e.cleanup = cleanup;
                    e.pending = e.deps.is_none();
                }
            }
        }
    }

    /// Post-commit garbage collection: deletes every registry entry whose
    /// id is absent from `mounted`.
    pub fn collect_garbage(&self, mounted: &std::collections::HashSet<InstanceId>) {
        let stale: Vec<InstanceId> = self
            .states
            .borrow()
            .keys()
            .filter(|id| !mounted.contains(id))
            .copied()
            .collect();
        for id in stale {
            self.delete(id);
        }
    }
}
