//! Event routing: the focus model, keyboard/mouse dispatch, and per-widget
//! local state (spec §4.7 "Event Router").
//!
//! The router sits downstream of a commit: each frame, the host calls
//! [`EventRouter::sync`] once with the freshly collected
//! [`MetadataBundle`], then [`EventRouter::dispatch`] once per backend
//! [`Event`]. Dispatch never touches the committed tree's instances
//! directly except through the callbacks already recorded on each
//! widget's props (`on_press`, `on_change`, ...); the router's own state
//! is purely the ephemeral, per-widget bookkeeping no `VNode` carries:
//! caret positions, scroll offsets, highlighted dropdown rows, and so on.

pub mod focus;
pub mod input_editor;

use std::collections::HashMap;

use base64::Engine;

use crate::backend::{Backend, Event, Key, KeyAction, Modifiers};
use crate::commit::CommittedTree;
use crate::metadata::MetadataBundle;
use crate::vnode::{VNodeKind, ZoneNavigation};
use focus::FocusModel;
use input_editor::{EditOp, EditorState};

/// An action the router carried out this dispatch, reported back to the
/// caller mainly for tests and diagnostics — the actual side effect (a
/// state update in the host) already happened via the widget's callback.
#[derive(Debug, Clone, PartialEq)]
pub enum RoutedAction {
    FocusChanged { id: Option<String> },
    Press { id: String },
    ValueChanged { id: String },
    Selected { id: String, index: usize },
    Toggled { id: String, checked: bool },
    Scrolled { id: String, top: u16 },
    Expanded { id: String, node: String, expanded: bool },
    Closed { id: String },
    Copy { id: String },
    Cut { id: String },
}

/// Per-input caret/selection/undo state, keyed by widget id.
#[derive(Default)]
struct EditorSession {
    state: EditorState,
    last_committed_value: String,
    undo: Vec<(String, EditorState)>,
    redo: Vec<(String, EditorState)>,
    last_edit_at: Option<u64>,
}

/// Minimum gap, in the backend's `time_ms` clock, between two edits before
/// they're grouped into the same undo entry. Plain typing collapses into
/// one undo step; pauses (or a paste) start a new one.
const UNDO_DEBOUNCE_MS: u64 = 400;

struct ListSession {
    focused_row: usize,
    scroll_top: u16,
    selected: std::collections::HashSet<usize>,
    visible_rows: usize,
}

const DEFAULT_VISIBLE_ROWS: usize = 10;

/// Rows scrolled per wheel notch (spec §4.7 "Mouse wheel scrolls by a fixed
/// amount"), independent of `visible_rows`/page size.
const WHEEL_SCROLL_ROWS: i32 = 3;

impl Default for ListSession {
    fn default() -> Self {
        Self { focused_row: 0, scroll_top: 0, selected: Default::default(), visible_rows: DEFAULT_VISIBLE_ROWS }
    }
}

impl ListSession {
    fn page(&self) -> usize {
        self.visible_rows.max(1)
    }
}

#[derive(Default)]
struct TreeSession {
    focused_id: Option<String>,
}

/// Flattened, visibility-respecting view of a tree widget, used for
/// up/down/home/end navigation and for finding a node's parent.
struct FlatNode<'a> {
    id: &'a str,
    has_children: bool,
    expanded: bool,
    parent: Option<&'a str>,
}

fn flatten_tree<'a>(roots: &'a [crate::vnode::TreeNodeSpec], out: &mut Vec<FlatNode<'a>>, parent: Option<&'a str>) {
    for node in roots {
        out.push(FlatNode { id: &node.id, has_children: node.has_children, expanded: node.expanded, parent });
        if node.expanded {
            flatten_tree(&node.children, out, Some(&node.id));
        }
    }
}

/// Owns all cross-frame router state: the focus model plus one local
/// session map per routable widget kind.
#[derive(Default)]
pub struct EventRouter {
    pub focus: FocusModel,
    editors: HashMap<String, EditorSession>,
    lists: HashMap<String, ListSession>,
    trees: HashMap<String, TreeSession>,
    dropdowns: HashMap<String, usize>,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports how many rows of a list/table widget are visible, used for
    /// Page Up/Down and scroll-into-view math. The host calls this after
    /// layout, once per widget per frame; widgets never reported default
    /// to [`DEFAULT_VISIBLE_ROWS`].
    pub fn set_visible_rows(&mut self, widget_id: &str, rows: usize) {
        self.lists.entry(widget_id.to_string()).or_default().visible_rows = rows;
    }

    /// Reconciles trap activation and prunes local state for widgets that
    /// dropped out of the committed tree (spec §4.7 "Routing rebuild GC").
    /// Must be called once per frame, before any `dispatch` for that
    /// frame's events.
    pub fn sync(&mut self, meta: &MetadataBundle) {
        if let Some(target) = self.focus.sync(meta) {
            self.focus.current = target;
        }
        self.editors.retain(|id, _| meta.input_meta.contains_key(id));
        self.lists.retain(|id, _| meta.widget_instance.contains_key(id));
        self.trees.retain(|id, _| meta.widget_instance.contains_key(id));
        self.dropdowns.retain(|id, _| meta.widget_instance.contains_key(id));
    }

    /// Routes one backend event against the currently committed tree.
    /// Returns the actions taken, if any; an empty vec is a normal,
    /// expected outcome (most events aren't routable, e.g. a `Resize`).
    pub fn dispatch(&mut self, event: &Event, tree: &CommittedTree, meta: &MetadataBundle, backend: &mut dyn Backend) -> Vec<RoutedAction> {
        match event {
            Event::Key { time_ms, key, mods, action } => {
                if *action == KeyAction::Up {
                    return Vec::new();
                }
                self.dispatch_key(*time_ms, *key, *mods, tree, meta, backend)
            }
            Event::Text { time_ms, codepoint } => self.dispatch_text(*time_ms, *codepoint, meta, backend),
            Event::Paste { time_ms, text } => self.dispatch_paste(*time_ms, text, meta, backend),
            Event::Mouse { kind: crate::backend::MouseEventKind::Wheel, wheel_y, .. } => self.dispatch_wheel(*wheel_y, tree, meta),
            _ => Vec::new(),
        }
    }

    /// Mouse wheel: scrolls the focused `virtualList`/`table` by a fixed
    /// amount (spec §4.7 "VirtualList/Table scroll"). Hit-testing a wheel
    /// event against the pointer's `(x, y)` would require layout records
    /// the router doesn't own (spec §4.4 treats layout as an opaque,
    /// per-frame-only collaborator), so the scroll target is whichever
    /// scrollable widget currently holds focus.
    fn dispatch_wheel(&mut self, wheel_y: i32, tree: &CommittedTree, meta: &MetadataBundle) -> Vec<RoutedAction> {
        if wheel_y == 0 {
            return Vec::new();
        }
        let Some(id) = self.focus.current.clone() else { return Vec::new() };
        let Some(&instance) = meta.widget_instance.get(&id) else { return Vec::new() };
        let Some(node) = tree.node(instance) else { return Vec::new() };
        let delta = if wheel_y > 0 { -WHEEL_SCROLL_ROWS } else { WHEEL_SCROLL_ROWS };
        match &node.vnode.kind {
            VNodeKind::VirtualList(p) => self.scroll_by(&id, p.item_count, delta, p.on_scroll.as_deref()),
            VNodeKind::Table(p) => self.scroll_by(&id, p.row_count, delta, p.on_scroll.as_deref()),
            _ => Vec::new(),
        }
    }

    /// Shared scroll-offset arithmetic for wheel-driven scrolling: clamps
    /// `scroll_top` into `[0, count.saturating_sub(visible_rows)]` and fires
    /// `on_scroll` exactly as the key-driven paths in [`Self::route_list`]
    /// do.
    fn scroll_by(&mut self, id: &str, count: usize, delta: i32, on_scroll: Option<&dyn Fn(u16, (usize, usize))>) -> Vec<RoutedAction> {
        if count == 0 {
            return Vec::new();
        }
        let session = self.lists.entry(id.to_string()).or_default();
        let visible = session.page();
        let max_top = count.saturating_sub(visible) as i32;
        let next_top = (session.scroll_top as i32 + delta).clamp(0, max_top.max(0));
        if next_top as u16 == session.scroll_top {
            return Vec::new();
        }
        session.scroll_top = next_top as u16;
        session.focused_row = session.focused_row.clamp(session.scroll_top as usize, (session.scroll_top as usize + visible.saturating_sub(1)).min(count - 1));
        if let Some(cb) = on_scroll {
            let top = session.scroll_top;
            let range = (top as usize, (top as usize + visible).min(count));
            let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| cb(top, range)));
        }
        vec![RoutedAction::Scrolled { id: id.to_string(), top: session.scroll_top }]
    }

    fn dispatch_key(&mut self, time_ms: u64, key: Key, mods: Modifiers, tree: &CommittedTree, meta: &MetadataBundle, backend: &mut dyn Backend) -> Vec<RoutedAction> {
        if key == Key::Tab {
            let forward = !mods.contains(Modifiers::SHIFT);
            let target = self.focus.tab_target(meta, forward);
            self.focus.set_focus(target.clone(), meta);
            return vec![RoutedAction::FocusChanged { id: target }];
        }

        let Some(id) = self.focus.current.clone() else {
            return Vec::new();
        };
        let Some(&instance) = meta.widget_instance.get(&id) else {
            return Vec::new();
        };
        let Some(node) = tree.node(instance) else {
            return Vec::new();
        };

        let widget_actions = match &node.vnode.kind {
            VNodeKind::Input(_) => self.route_input_key(time_ms, key, mods, &id, meta, backend),
            VNodeKind::Button(p) => route_press(key, &id, p.on_press.as_deref()),
            VNodeKind::Link(p) => {
                if p.disabled {
                    Vec::new()
                } else {
                    route_press(key, &id, p.on_press.as_deref())
                }
            }
            VNodeKind::Checkbox(p) => route_checkbox(key, &id, p),
            VNodeKind::RadioGroup(p) => self.route_options(key, &id, &p.options, p.selected, p.on_change.as_deref()),
            VNodeKind::Select(p) => self.route_options(key, &id, &p.options, p.selected, p.on_change.as_deref()),
            VNodeKind::Slider(p) => route_slider(key, &id, p),
            VNodeKind::VirtualList(p) => self.route_list(key, mods, &id, p.item_count, p.on_select.as_deref(), p.on_scroll.as_deref(), false),
            VNodeKind::Table(p) => self.route_list(key, mods, &id, p.row_count, p.on_select.as_deref(), p.on_scroll.as_deref(), p.multi_select),
            VNodeKind::Tree(p) => self.route_tree(key, &id, p),
            VNodeKind::Dropdown(p) => self.route_dropdown(key, &id, p),
            _ => Vec::new(),
        };
        if !widget_actions.is_empty() {
            return widget_actions;
        }

        // Arrow keys the focused widget itself didn't consume fall back to
        // the active zone's own navigation (spec §4.7 "Zones may be linear
        // or grid"), so plain buttons/links inside a zone can be driven by
        // arrows in addition to Tab.
        if let Some(target) = self.zone_arrow_target(key, meta) {
            self.focus.set_focus(Some(target.clone()), meta);
            return vec![RoutedAction::FocusChanged { id: Some(target) }];
        }
        widget_actions
    }

    fn zone_arrow_target(&self, key: Key, meta: &MetadataBundle) -> Option<String> {
        let zone_id = self.focus.active_zone.as_ref()?;
        let zone = meta.zones.get(zone_id)?;
        match zone.navigation {
            ZoneNavigation::NoneNav => None,
            ZoneNavigation::Linear => match key {
                Key::Down | Key::Right => focus::linear_step(&zone.focusable_ids, self.focus.current.as_deref(), true, zone.wrap_around),
                Key::Up | Key::Left => focus::linear_step(&zone.focusable_ids, self.focus.current.as_deref(), false, zone.wrap_around),
                _ => None,
            },
            ZoneNavigation::Grid => {
                let cols = zone.columns.max(1) as i32;
                match key {
                    Key::Down => focus::grid_step(&zone.focusable_ids, self.focus.current.as_deref(), cols, zone.wrap_around),
                    Key::Up => focus::grid_step(&zone.focusable_ids, self.focus.current.as_deref(), -cols, zone.wrap_around),
                    Key::Right => focus::grid_step(&zone.focusable_ids, self.focus.current.as_deref(), 1, zone.wrap_around),
                    Key::Left => focus::grid_step(&zone.focusable_ids, self.focus.current.as_deref(), -1, zone.wrap_around),
                    _ => None,
                }
            }
        }
    }

    fn dispatch_text(&mut self, time_ms: u64, codepoint: char, meta: &MetadataBundle, backend: &mut dyn Backend) -> Vec<RoutedAction> {
        let Some(id) = self.focus.current.clone() else { return Vec::new() };
        let Some(input) = meta.input_meta.get(&id) else { return Vec::new() };
        if input.disabled {
            return Vec::new();
        }
        if codepoint == '\n' || codepoint == '\r' {
            return Vec::new();
        }
        self.apply_edit(&id, input, EditOp::InsertText(codepoint.to_string()), time_ms, backend)
    }

    fn dispatch_paste(&mut self, time_ms: u64, text: &str, meta: &MetadataBundle, backend: &mut dyn Backend) -> Vec<RoutedAction> {
        let Some(id) = self.focus.current.clone() else { return Vec::new() };
        let Some(input) = meta.input_meta.get(&id) else { return Vec::new() };
        if input.disabled {
            return Vec::new();
        }
        self.apply_edit(&id, input, EditOp::Paste(text.to_string()), time_ms, backend)
    }

    fn route_input_key(&mut self, time_ms: u64, key: Key, mods: Modifiers, id: &str, meta: &MetadataBundle, backend: &mut dyn Backend) -> Vec<RoutedAction> {
        let Some(input) = meta.input_meta.get(id) else { return Vec::new() };
        if input.disabled {
            return Vec::new();
        }
        let ctrl = mods.contains(Modifiers::CTRL);
        let shift = mods.contains(Modifiers::SHIFT);

        if ctrl {
            match key {
                Key::Char('z') => return self.undo(id, input),
                Key::Char('y') => return self.redo(id, input),
                Key::Char('a') => return self.apply_edit(id, input, EditOp::SelectAll, time_ms, backend),
                Key::Char('c') => return self.copy_or_cut(id, input, time_ms, backend, false),
                Key::Char('x') => return self.copy_or_cut(id, input, time_ms, backend, true),
                _ => {}
            }
        }

        let op = match key {
            Key::Enter if input.multiline => EditOp::InsertText("\n".to_string()),
            Key::Enter => {
                if let Some(cb) = &input.on_submit {
                    let cb = cb.clone();
                    let value = input.value.clone();
                    let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || cb(&value)));
                }
                return vec![RoutedAction::Press { id: id.to_string() }];
            }
            Key::Backspace => EditOp::Backspace,
            Key::Delete => EditOp::Delete,
            Key::Left if ctrl => EditOp::MoveWordLeft { select: shift },
            Key::Left => EditOp::MoveLeft { select: shift },
            Key::Right if ctrl => EditOp::MoveWordRight { select: shift },
            Key::Right => EditOp::MoveRight { select: shift },
            Key::Home => EditOp::MoveHome { select: shift },
            Key::End => EditOp::MoveEnd { select: shift },
            _ => return Vec::new(),
        };
        self.apply_edit(id, input, op, time_ms, backend)
    }

    /// Ctrl+C / Ctrl+X: copies (or cuts) the current selection, or the
    /// whole value if nothing is selected, as an OSC 52 escape through the
    /// backend's raw-write hook (spec §4.7 "Inputs").
    fn copy_or_cut(&mut self, id: &str, input: &crate::metadata::InputMeta, time_ms: u64, backend: &mut dyn Backend, cut: bool) -> Vec<RoutedAction> {
        let op = if cut { EditOp::Cut } else { EditOp::Copy };
        let mut actions = self.apply_edit(id, input, op, time_ms, backend);
        actions.push(if cut { RoutedAction::Cut { id: id.to_string() } } else { RoutedAction::Copy { id: id.to_string() } });
        actions
    }

    fn undo(&mut self, id: &str, input: &crate::metadata::InputMeta) -> Vec<RoutedAction> {
        let session = self.editors.entry(id.to_string()).or_default();
        let Some((value, state)) = session.undo.pop() else { return Vec::new() };
        session.redo.push((session.last_committed_value.clone(), session.state));
        session.last_committed_value = value.clone();
        session.state = state;
        if let Some(cb) = &input.on_input {
            let cb = cb.clone();
            let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || cb(&value)));
        }
        vec![RoutedAction::ValueChanged { id: id.to_string() }]
    }

    fn redo(&mut self, id: &str, input: &crate::metadata::InputMeta) -> Vec<RoutedAction> {
        let session = self.editors.entry(id.to_string()).or_default();
        let Some((value, state)) = session.redo.pop() else { return Vec::new() };
        session.undo.push((session.last_committed_value.clone(), session.state));
        session.last_committed_value = value.clone();
        session.state = state;
        if let Some(cb) = &input.on_input {
            let cb = cb.clone();
            let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || cb(&value)));
        }
        vec![RoutedAction::ValueChanged { id: id.to_string() }]
    }
}

fn route_press(key: Key, id: &str, on_press: Option<&dyn Fn()>) -> Vec<RoutedAction> {
    if !matches!(key, Key::Enter | Key::Char(' ')) {
        return Vec::new();
    }
    if let Some(cb) = on_press {
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| cb()));
    }
    vec![RoutedAction::Press { id: id.to_string() }]
}

fn route_checkbox(key: Key, id: &str, p: &crate::vnode::CheckboxProps) -> Vec<RoutedAction> {
    if p.disabled || !matches!(key, Key::Enter | Key::Char(' ')) {
        return Vec::new();
    }
    let next = !p.checked;
    if let Some(cb) = &p.on_change {
        let cb = cb.clone();
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| cb(next)));
    }
    vec![RoutedAction::Toggled { id: id.to_string(), checked: next }]
}

fn route_slider(key: Key, id: &str, p: &crate::vnode::SliderProps) -> Vec<RoutedAction> {
    if p.disabled || p.read_only {
        return Vec::new();
    }
    let delta = match key {
        Key::Left | Key::Down => -p.step,
        Key::Right | Key::Up => p.step,
        Key::PageDown => -p.step * 10.0,
        Key::PageUp => p.step * 10.0,
        Key::Home => f64::NEG_INFINITY,
        Key::End => f64::INFINITY,
        _ => return Vec::new(),
    };
    let next = if delta == f64::NEG_INFINITY {
        p.min
    } else if delta == f64::INFINITY {
        p.max
    } else {
        (p.value + delta).clamp(p.min, p.max)
    };
    if next == p.value {
        return Vec::new();
    }
    if let Some(cb) = &p.on_change {
        let cb = cb.clone();
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| cb(next)));
    }
    vec![RoutedAction::ValueChanged { id: id.to_string() }]
}

impl EventRouter {
    fn route_options(&mut self, key: Key, id: &str, options: &[crate::vnode::SelectOption], selected: Option<usize>, on_change: Option<&dyn Fn(usize)>) -> Vec<RoutedAction> {
        if options.is_empty() {
            return Vec::new();
        }
        let forward = match key {
            Key::Down | Key::Right => true,
            Key::Up | Key::Left => false,
            _ => return Vec::new(),
        };
        let start = selected.unwrap_or(0);
        let mut idx = start;
        for _ in 0..options.len() {
            idx = if forward { (idx + 1) % options.len() } else { (idx + options.len() - 1) % options.len() };
            if !options[idx].disabled {
                break;
            }
        }
        if options[idx].disabled || Some(idx) == selected {
            return Vec::new();
        }
        if let Some(cb) = on_change {
            let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| cb(idx)));
        }
        vec![RoutedAction::Selected { id: id.to_string(), index: idx }]
    }

    fn route_list(
        &mut self,
        key: Key,
        mods: Modifiers,
        id: &str,
        count: usize,
        on_select: Option<&dyn Fn(usize)>,
        on_scroll: Option<&dyn Fn(u16, (usize, usize))>,
        multi_select: bool,
    ) -> Vec<RoutedAction> {
        if count == 0 {
            return Vec::new();
        }
        let session = self.lists.entry(id.to_string()).or_default();
        session.focused_row = session.focused_row.min(count - 1);
        let page = session.page();
        let mut actions = Vec::new();

        match key {
            Key::Up => session.focused_row = session.focused_row.saturating_sub(1),
            Key::Down => session.focused_row = (session.focused_row + 1).min(count - 1),
            Key::PageUp => session.focused_row = session.focused_row.saturating_sub(page),
            Key::PageDown => session.focused_row = (session.focused_row + page).min(count - 1),
            Key::Home => session.focused_row = 0,
            Key::End => session.focused_row = count - 1,
            Key::Enter => {
                if let Some(cb) = on_select {
                    let row = session.focused_row;
                    let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| cb(row)));
                }
                actions.push(RoutedAction::Selected { id: id.to_string(), index: session.focused_row });
                return actions;
            }
            Key::Char(' ') if multi_select => {
                let row = session.focused_row;
                if !session.selected.remove(&row) {
                    session.selected.insert(row);
                }
                actions.push(RoutedAction::Toggled { id: id.to_string(), checked: session.selected.contains(&row) });
                return actions;
            }
            Key::Char('a') if multi_select && mods.contains(Modifiers::CTRL) => {
                session.selected = (0..count).collect();
                actions.push(RoutedAction::Selected { id: id.to_string(), index: count - 1 });
                return actions;
            }
            _ => return Vec::new(),
        }

        let visible = session.page();
        if session.focused_row < session.scroll_top as usize {
            session.scroll_top = session.focused_row as u16;
        } else if session.focused_row >= session.scroll_top as usize + visible {
            session.scroll_top = (session.focused_row + 1 - visible) as u16;
        }
        if let Some(cb) = on_scroll {
            let top = session.scroll_top;
            let range = (top as usize, (top as usize + visible).min(count));
            let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| cb(top, range)));
        }
        actions.push(RoutedAction::Scrolled { id: id.to_string(), top: session.scroll_top });
        actions
    }

    fn route_tree(&mut self, key: Key, id: &str, p: &crate::vnode::TreeProps) -> Vec<RoutedAction> {
        let mut flat = Vec::new();
        flatten_tree(&p.roots, &mut flat, None);
        if flat.is_empty() {
            return Vec::new();
        }
        let session = self.trees.entry(id.to_string()).or_default();
        let cur = session
            .focused_id
            .as_deref()
            .and_then(|cur| flat.iter().position(|n| n.id == cur))
            .unwrap_or(0);

        match key {
            Key::Up => {
                let idx = cur.saturating_sub(1);
                session.focused_id = Some(flat[idx].id.to_string());
                Vec::new()
            }
            Key::Down => {
                let idx = (cur + 1).min(flat.len() - 1);
                session.focused_id = Some(flat[idx].id.to_string());
                Vec::new()
            }
            Key::Home => {
                session.focused_id = Some(flat[0].id.to_string());
                Vec::new()
            }
            Key::End => {
                session.focused_id = Some(flat[flat.len() - 1].id.to_string());
                Vec::new()
            }
            Key::Right => {
                let node = &flat[cur];
                if node.has_children && !node.expanded {
                    let node_id = node.id.to_string();
                    if let Some(cb) = &p.on_toggle {
                        let cb = cb.clone();
                        let nid = node_id.clone();
                        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| cb(nid, true)));
                    }
                    if let Some(load) = &p.load_children {
                        let load = load.clone();
                        let nid = node_id.clone();
                        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| load(nid)));
                    }
                    vec![RoutedAction::Expanded { id: id.to_string(), node: node_id, expanded: true }]
                } else if node.expanded && cur + 1 < flat.len() {
                    session.focused_id = Some(flat[cur + 1].id.to_string());
                    Vec::new()
                } else {
                    Vec::new()
                }
            }
            Key::Left => {
                let node = &flat[cur];
                if node.expanded && node.has_children {
                    let node_id = node.id.to_string();
                    if let Some(cb) = &p.on_toggle {
                        let cb = cb.clone();
                        let nid = node_id.clone();
                        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| cb(nid, false)));
                    }
                    vec![RoutedAction::Expanded { id: id.to_string(), node: node_id, expanded: false }]
                } else if let Some(parent) = node.parent {
                    session.focused_id = Some(parent.to_string());
                    Vec::new()
                } else {
                    Vec::new()
                }
            }
            Key::Enter | Key::Char(' ') => {
                let node = &flat[cur];
                if !node.has_children {
                    return Vec::new();
                }
                let node_id = node.id.to_string();
                let expanded = !node.expanded;
                if let Some(cb) = &p.on_toggle {
                    let cb = cb.clone();
                    let nid = node_id.clone();
                    let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| cb(nid, expanded)));
                }
                if expanded {
                    if let Some(load) = &p.load_children {
                        let load = load.clone();
                        let nid = node_id.clone();
                        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| load(nid)));
                    }
                }
                vec![RoutedAction::Expanded { id: id.to_string(), node: node_id, expanded }]
            }
            _ => Vec::new(),
        }
    }

    fn route_dropdown(&mut self, key: Key, id: &str, p: &crate::vnode::DropdownProps) -> Vec<RoutedAction> {
        if !p.open {
            return Vec::new();
        }
        let selectable: Vec<usize> = p.items.iter().enumerate().filter(|(_, i)| !i.disabled && !i.divider).map(|(i, _)| i).collect();
        if key == Key::Escape {
            if let Some(cb) = &p.on_close {
                let cb = cb.clone();
                let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| cb()));
            }
            return vec![RoutedAction::Closed { id: id.to_string() }];
        }
        if selectable.is_empty() {
            return Vec::new();
        }
        let highlighted = self.dropdowns.entry(id.to_string()).or_insert_with(|| selectable[0]);
        match key {
            Key::Down => {
                let pos = selectable.iter().position(|&i| i == *highlighted).unwrap_or(0);
                *highlighted = selectable[(pos + 1) % selectable.len()];
                Vec::new()
            }
            Key::Up => {
                let pos = selectable.iter().position(|&i| i == *highlighted).unwrap_or(0);
                *highlighted = selectable[(pos + selectable.len() - 1) % selectable.len()];
                Vec::new()
            }
            Key::Enter | Key::Char(' ') => {
                let index = *highlighted;
                if let Some(cb) = &p.on_select {
                    let cb = cb.clone();
                    let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| cb(index)));
                }
                if let Some(cb) = &p.on_close {
                    let cb = cb.clone();
                    let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| cb()));
                }
                vec![RoutedAction::Selected { id: id.to_string(), index }, RoutedAction::Closed { id: id.to_string() }]
            }
            _ => Vec::new(),
        }
    }

    /// Runs one edit op against an input's committed value, grouping undo
    /// history by [`UNDO_DEBOUNCE_MS`] and resetting the session's
    /// tracked value if the host changed `value` out from under it.
    fn apply_edit(&mut self, id: &str, input: &crate::metadata::InputMeta, op: EditOp, time_ms: u64, backend: &mut dyn Backend) -> Vec<RoutedAction> {
        use unicode_segmentation::UnicodeSegmentation;

        let session = self.editors.entry(id.to_string()).or_default();
        if session.last_committed_value != input.value {
            let len = input.value.graphemes(true).count();
            session.state = EditorState { cursor: len, selection_anchor: None };
            session.undo.clear();
            session.redo.clear();
            session.last_committed_value = input.value.clone();
        }

        let is_fresh_group = session.last_edit_at.map_or(true, |t| time_ms.saturating_sub(t) > UNDO_DEBOUNCE_MS);
        if matches!(op, EditOp::InsertText(_) | EditOp::Backspace | EditOp::Delete | EditOp::Paste(_) | EditOp::Cut) && is_fresh_group {
            session.undo.push((session.last_committed_value.clone(), session.state));
            session.redo.clear();
        }
        session.last_edit_at = Some(time_ms);

        let result = input_editor::apply(&input.value, session.state, op, input.multiline);
        session.state = result.state;
        let mut actions = Vec::new();
        if result.changed {
            session.last_committed_value = result.value.clone();
            if let Some(cb) = &input.on_input {
                let cb = cb.clone();
                let value = result.value.clone();
                let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || cb(&value)));
            }
            actions.push(RoutedAction::ValueChanged { id: id.to_string() });
        }
        if let Some(clip) = result.clipboard {
            osc52_copy(backend, &clip);
        }
        actions
    }
}

fn osc52_copy(backend: &mut dyn Backend, text: &str) {
    let encoded = base64::engine::general_purpose::STANDARD.encode(text.as_bytes());
    let sequence = format!("\x1b]52;c;{encoded}\x07");
    let _ = backend.raw_write(sequence.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commit::Runtime;
    use crate::vnode::{BoxProps, ButtonProps, VNode, VNodeKind};
    use std::cell::Cell;
    use std::rc::Rc;

    fn button(id: &str, on_press: Rc<dyn Fn()>) -> VNode {
        VNode::new(VNodeKind::Button(ButtonProps { id: id.to_string(), on_press: Some(on_press), ..Default::default() }))
    }

    #[test]
    fn tab_tab_enter_presses_second_button() {
        let pressed = Rc::new(Cell::new(None));
        let pressed2 = pressed.clone();
        let mut rt = Runtime::new();
        rt.commit(
            VNode::new(VNodeKind::Row(BoxProps::default())).with_children(vec![
                button("a", Rc::new(|| {})),
                button("b", Rc::new(move || pressed2.set(Some("b")))),
            ]),
        )
        .unwrap();
        let bundle = crate::metadata::MetadataCollector::new().collect(rt.tree());

        let mut router = EventRouter::new();
        router.sync(&bundle);
        let mut backend = NullBackend;

        router.dispatch(&Event::Key { time_ms: 0, key: Key::Tab, mods: Modifiers::empty(), action: KeyAction::Down }, rt.tree(), &bundle, &mut backend);
        assert_eq!(router.focus.current.as_deref(), Some("a"));
        router.dispatch(&Event::Key { time_ms: 1, key: Key::Tab, mods: Modifiers::empty(), action: KeyAction::Down }, rt.tree(), &bundle, &mut backend);
        assert_eq!(router.focus.current.as_deref(), Some("b"));
        let actions = router.dispatch(&Event::Key { time_ms: 2, key: Key::Enter, mods: Modifiers::empty(), action: KeyAction::Down }, rt.tree(), &bundle, &mut backend);
        assert_eq!(actions, vec![RoutedAction::Press { id: "b".to_string() }]);
        assert_eq!(pressed.get(), Some("b"));
    }

    struct NullBackend;
    impl Backend for NullBackend {
        fn start(&mut self) -> std::io::Result<()> {
            Ok(())
        }
        fn stop(&mut self) -> std::io::Result<()> {
            Ok(())
        }
        fn dispose(&mut self) {}
        fn request_frame(&mut self, _bytes: &[u8]) -> std::io::Result<()> {
            Ok(())
        }
        fn poll_events(&mut self) -> crate::backend::EventBatch {
            crate::backend::EventBatch::default()
        }
        fn post_user_event(&mut self, _bytes: Vec<u8>) {}
        fn caps(&self) -> crate::backend::Caps {
            crate::backend::Caps::full(1)
        }
    }
}
