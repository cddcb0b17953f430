//! Widget metadata collector: one depth-first preorder walk
//! of the committed runtime tree producing the focus graph's raw inputs —
//! focusable ids, an enabled map, a button "pressable" set, input metadata,
//! and the open focus-zone/-trap containers with their locally-attributed
//! focusable ids.
//!
//! The collector keeps its maps/sets/vectors as long-lived fields and
//! `.clear()`s them at the start of each `collect` call rather than
//! allocating fresh ones, the pooling idiom already present in the
//! teacher's render tree (`lib/render_tree/tree.rs` reuses its node arena
//! across frames rather than rebuilding it). The returned [`MetadataBundle`]
//! borrows from those fields, so it really is "freshly frozen" each frame
//! without a single additional allocation in the steady state.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::commit::CommittedTree;
use crate::instance::InstanceId;
use crate::vnode::{VNodeKind, ZoneNavigation};

/// Metadata recorded for one `input`/`textarea` widget.
pub struct InputMeta {
    pub instance_id: InstanceId,
    pub value: String,
    pub disabled: bool,
    pub multiline: bool,
    pub on_input: Option<Rc<dyn Fn(&str)>>,
    pub on_blur: Option<Rc<dyn Fn()>>,
    pub on_submit: Option<Rc<dyn Fn(&str)>>,
}

/// Metadata recorded for one `focusZone`, or a synthetic zone describing a
/// `toastContainer`'s action row.
pub struct ZoneMeta {
    pub navigation: ZoneNavigation,
    pub columns: usize,
    pub wrap_around: bool,
    pub focusable_ids: Vec<String>,
    pub on_enter: Option<Rc<dyn Fn()>>,
    pub on_exit: Option<Rc<dyn Fn()>>,
}

/// Metadata recorded for one `focusTrap`.
pub struct TrapMeta {
    pub active: bool,
    pub return_focus_to: Option<String>,
    pub initial_focus: Option<String>,
    pub focusable_ids: Vec<String>,
}

/// Which kind of container is innermost-open during traversal, used to
/// attribute a freshly discovered focusable id to the right container.
enum OpenFrame {
    Zone(String),
    Trap(String),
}

/// A frame's focus-routing inputs, borrowed from the collector's pooled
/// storage — valid until the next `collect` call.
pub struct MetadataBundle<'a> {
    pub focusable_ids: &'a [String],
    pub enabled: &'a HashMap<String, bool>,
    pub pressable: &'a HashSet<String>,
    pub input_meta: &'a HashMap<String, InputMeta>,
    pub zones: &'a HashMap<String, ZoneMeta>,
    pub traps: &'a HashMap<String, TrapMeta>,
    /// Committed instance backing each id-bearing interactive widget, so a
    /// caller holding only a widget id (the router's focus model) can look
    /// up its current props/callbacks in the committed tree without this
    /// bundle having to clone every widget kind's callbacks itself the way
    /// [`InputMeta`] does.
    pub widget_instance: &'a HashMap<String, InstanceId>,
    pub has_routing_widgets: bool,
}

/// Pooled traversal state, reused across frames instead of reallocated.
#[derive(Default)]
pub struct MetadataCollector {
    focusable_ids: Vec<String>,
    enabled: HashMap<String, bool>,
    pressable: HashSet<String>,
    input_meta: HashMap<String, InputMeta>,
    zones: HashMap<String, ZoneMeta>,
    traps: HashMap<String, TrapMeta>,
    widget_instance: HashMap<String, InstanceId>,
    has_routing_widgets: bool,
    open: Vec<OpenFrame>,
}

impl MetadataCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs one preorder traversal of `tree`'s committed instances,
    /// repopulating the pooled collections, and returns a borrowed view.
    pub fn collect(&mut self, tree: &CommittedTree) -> MetadataBundle<'_> {
        self.focusable_ids.clear();
        self.enabled.clear();
        self.pressable.clear();
        self.input_meta.clear();
        self.zones.clear();
        self.traps.clear();
        self.widget_instance.clear();
        self.has_routing_widgets = false;
        self.open.clear();

        if let Some(root) = tree.root() {
            self.visit(tree, root);
        }

        MetadataBundle {
            focusable_ids: &self.focusable_ids,
            enabled: &self.enabled,
            pressable: &self.pressable,
            input_meta: &self.input_meta,
            zones: &self.zones,
            traps: &self.traps,
            widget_instance: &self.widget_instance,
            has_routing_widgets: self.has_routing_widgets,
        }
    }

    fn visit(&mut self, tree: &CommittedTree, id: InstanceId) {
        let Some(node) = tree.node(id) else { return };
        let vnode = &node.vnode;
        if vnode.kind_tag().is_routing_affecting() {
            self.has_routing_widgets = true;
        }

        let mut opened_container = false;

        match &vnode.kind {
            VNodeKind::Button(p) => {
                if !p.id.is_empty() {
                    self.pressable.insert(p.id.clone());
                    self.register_enabled(&p.id, p.disabled, id);
                }
            }
            VNodeKind::Input(p) => {
                if !p.id.is_empty() {
                    self.register_enabled(&p.id, p.disabled, id);
                    self.input_meta.insert(
                        p.id.clone(),
                        InputMeta {
                            instance_id: id,
                            value: p.value.clone(),
                            disabled: p.disabled,
                            multiline: p.multiline,
                            on_input: p.on_input.clone(),
                            on_blur: p.on_blur.clone(),
                            on_submit: p.on_submit.clone(),
                        },
                    );
                }
            }
            VNodeKind::Slider(p) => {
                if !p.id.is_empty() {
                    let enabled = !p.disabled;
                    self.enabled.insert(p.id.clone(), enabled);
                    self.widget_instance.insert(p.id.clone(), id);
                    if enabled && !p.read_only {
                        self.push_focusable(p.id.clone());
                    }
                }
            }
            VNodeKind::Select(p) => self.register_enabled(&p.id, p.disabled, id),
            VNodeKind::Checkbox(p) => self.register_enabled(&p.id, p.disabled, id),
            VNodeKind::RadioGroup(p) => self.register_enabled(&p.id, p.disabled, id),
            VNodeKind::Link(p) => self.register_enabled(&p.id, p.disabled, id),
            VNodeKind::VirtualList(p) => self.register_enabled(&p.id, p.disabled, id),
            VNodeKind::Table(p) => self.register_enabled(&p.id, p.disabled, id),
            VNodeKind::Tree(p) => self.register_enabled(&p.id, p.disabled, id),
            VNodeKind::Dropdown(p) => self.register_enabled(&p.id, p.disabled, id),
            VNodeKind::Modal(p) => {
                // Modal widgets are enabled only while open; they carry no
                // `disabled` prop of their own.
                if !p.id.is_empty() {
                    self.enabled.insert(p.id.clone(), p.open);
                    self.widget_instance.insert(p.id.clone(), id);
                }
            }
            VNodeKind::ToastContainer(p) => {
                // A toast's actions are rendered as ordinary focusable
                // children carrying their own ids/callbacks (`action_ids`
                // just names which ones the widget declared); the
                // container itself contributes no focusable id of its
                // own, only a synthetic zone scoping whichever of those
                // children actually register themselves below, the same
                // attribution the FocusZone arm relies on.
                if !p.id.is_empty() {
                    self.zones.insert(
                        p.id.clone(),
                        ZoneMeta {
                            navigation: ZoneNavigation::Linear,
                            columns: 0,
                            wrap_around: true,
                            focusable_ids: Vec::new(),
                            on_enter: None,
                            on_exit: None,
                        },
                    );
                    self.open.push(OpenFrame::Zone(p.id.clone()));
                    opened_container = true;
                }
            }
            VNodeKind::FocusZone(p) => {
                if !p.id.is_empty() {
                    self.zones.insert(
                        p.id.clone(),
                        ZoneMeta {
                            navigation: p.navigation,
                            columns: p.columns,
                            wrap_around: p.wrap_around,
                            focusable_ids: Vec::new(),
                            on_enter: p.on_enter.clone(),
                            on_exit: p.on_exit.clone(),
                        },
                    );
                    self.open.push(OpenFrame::Zone(p.id.clone()));
                    opened_container = true;
                }
            }
            VNodeKind::FocusTrap(p) => {
                if !p.id.is_empty() {
                    self.traps.insert(
                        p.id.clone(),
                        TrapMeta {
                            active: p.active,
                            return_focus_to: p.return_focus_to.clone(),
                            initial_focus: p.initial_focus.clone(),
                            focusable_ids: Vec::new(),
                        },
                    );
                    self.open.push(OpenFrame::Trap(p.id.clone()));
                    opened_container = true;
                }
            }
            _ => {}
        }

        for &child in &node.children {
            self.visit(tree, child);
        }

        if opened_container {
            self.open.pop();
        }
    }

    /// Registers an interactive widget's enabled state and, if enabled,
    /// appends it to the focusable-id lists when enabled. `instance_id` is
    /// recorded in [`MetadataBundle::widget_instance`] regardless of
    /// enabled state, so a caller holding only the widget id (the router's
    /// focus model) can still look up its committed instance to read
    /// current props or invoke callbacks.
    fn register_enabled(&mut self, id: &str, disabled: bool, instance_id: InstanceId) {
        if id.is_empty() {
            return;
        }
        let enabled = !disabled;
        self.enabled.insert(id.to_string(), enabled);
        self.widget_instance.insert(id.to_string(), instance_id);
        if enabled {
            self.push_focusable(id.to_string());
        }
    }

    /// Appends `id` to the flat preorder list and to the innermost open
    /// zone/trap's local list, if any.
    fn push_focusable(&mut self, id: String) {
        if let Some(frame) = self.open.last() {
            match frame {
                OpenFrame::Zone(zid) => {
                    if let Some(z) = self.zones.get_mut(zid) {
                        z.focusable_ids.push(id.clone());
                    }
                }
                OpenFrame::Trap(tid) => {
                    if let Some(t) = self.traps.get_mut(tid) {
                        t.focusable_ids.push(id.clone());
                    }
                }
            }
        }
        self.focusable_ids.push(id);
    }
}

/// Cheap existence check used by the drawlist renderer's routing-metadata
/// gate (spec §4.5 "the renderer may skip the metadata-collector pass"):
/// an early-exiting preorder scan that stops at the first routing-affecting
/// kind, rather than building the full bundle [`MetadataCollector::collect`]
/// would.
pub fn tree_has_routing_widgets(tree: &CommittedTree) -> bool {
    fn visit(tree: &CommittedTree, id: InstanceId) -> bool {
        let Some(node) = tree.node(id) else { return false };
        if node.vnode.kind_tag().is_routing_affecting() {
            return true;
        }
        node.children.iter().any(|&c| visit(tree, c))
    }
    tree.root().map(|root| visit(tree, root)).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commit::Runtime;
    use crate::vnode::{
        BoxProps, ButtonProps, FocusZoneProps, InputProps, VNode, VNodeKind,
    };

    fn button(id: &str) -> VNode {
        VNode::new(VNodeKind::Button(ButtonProps { id: id.to_string(), ..Default::default() }))
    }

    #[test]
    fn collects_preorder_focusable_ids_and_pressable_set() {
        let mut rt = Runtime::new();
        rt.commit(VNode::new(VNodeKind::Row(BoxProps::default())).with_children(vec![button("a"), button("b")]))
            .unwrap();

        let mut collector = MetadataCollector::new();
        let bundle = collector.collect(rt.tree());
        assert_eq!(bundle.focusable_ids, &["a".to_string(), "b".to_string()]);
        assert!(bundle.pressable.contains("a"));
        assert!(bundle.pressable.contains("b"));
        assert!(bundle.has_routing_widgets);
    }

    #[test]
    fn disabled_button_is_not_focusable_but_stays_pressable() {
        let mut rt = Runtime::new();
        rt.commit(button("x")).unwrap();
        // Re-commit as disabled.
        rt.commit(VNode::new(VNodeKind::Button(ButtonProps {
            id: "x".to_string(),
            disabled: true,
            ..Default::default()
        })))
        .unwrap();

        let mut collector = MetadataCollector::new();
        let bundle = collector.collect(rt.tree());
        assert!(bundle.focusable_ids.is_empty());
        assert!(bundle.pressable.contains("x"));
        assert_eq!(bundle.enabled.get("x"), Some(&false));
    }

    #[test]
    fn zone_attributes_only_its_own_focusable_ids() {
        let mut rt = Runtime::new();
        let zone = VNode::new(VNodeKind::FocusZone(FocusZoneProps { id: "z".to_string(), ..Default::default() }))
            .with_children(vec![button("inner")]);
        let root = VNode::new(VNodeKind::Row(BoxProps::default())).with_children(vec![button("outer"), zone]);
        rt.commit(root).unwrap();

        let mut collector = MetadataCollector::new();
        let bundle = collector.collect(rt.tree());
        assert_eq!(bundle.focusable_ids, &["outer".to_string(), "inner".to_string()]);
        let z = bundle.zones.get("z").unwrap();
        assert_eq!(z.focusable_ids, vec!["inner".to_string()]);
    }

    #[test]
    fn input_meta_carries_value_and_disabled() {
        let mut rt = Runtime::new();
        rt.commit(VNode::new(VNodeKind::Input(InputProps {
            id: "q".to_string(),
            value: "hello".to_string(),
            ..Default::default()
        })))
        .unwrap();

        let mut collector = MetadataCollector::new();
        let bundle = collector.collect(rt.tree());
        let meta = bundle.input_meta.get("q").unwrap();
        assert_eq!(meta.value, "hello");
        assert!(!meta.disabled);
    }

    #[test]
    fn routing_scan_short_circuits_on_plain_text_tree() {
        let mut rt = Runtime::new();
        rt.commit(VNode::new(VNodeKind::Row(BoxProps::default())).with_children(vec![VNode::new(VNodeKind::Text(
            crate::vnode::TextProps { content: "hi".to_string(), ..Default::default() },
        ))]))
        .unwrap();
        assert!(!tree_has_routing_widgets(rt.tree()));

        rt.commit(VNode::new(VNodeKind::Row(BoxProps::default())).with_children(vec![button("a")])).unwrap();
        assert!(tree_has_routing_widgets(rt.tree()));
    }
}
