//! The virtual node (VNode) data model (spec §3 "Data model").
//!
//! `VNode` is a closed tagged union, `match`/`switch`-dispatched per §9
//! Design Notes ("Polymorphism": "a discriminant plus per-kind payload
//! structs ... no open inheritance required"). Grounded in the teacher's
//! own three-way split (`VNode::Div`/`Text`/`RichText` in `lib/vdom.rs`,
//! `lib/node/div.rs`), generalized here to the full closed kind set §3
//! names: structural, textual, interactive, collection, modal, focus, and
//! ornamental.
//!
//! Callback props follow the teacher's `EventCallbacks` idiom
//! (`lib/node/div.rs`): `Rc<dyn Fn(..)>` handles, cheaply cloned, compared
//! only by kind/identity during reconciliation rather than structurally —
//! hence `VNode` derives `Clone` but not `PartialEq`; compatibility is
//! decided explicitly by [`VNode::kind_tag`] and [`VNode::composite`].

use std::fmt;
use std::rc::Rc;

use crate::instance::RenderCursor;
use crate::style::{Color, Dimension, Direction, Overflow, Spacing, TextStyle};

//--------------------------------------------------------------------------------------------------
// Node
//--------------------------------------------------------------------------------------------------

/// A user-defined composite widget: turns its captured props and the hook
/// state exposed by `cursor` into a VNode subtree. Grounded in the
/// teacher's `Component` (view/update) split, minus the `#[derive(Component)]`
/// macro sugar — `rxtui-macros` is not part of this crate's dependency stack.
pub trait Composite {
    /// Stable identifier for the concrete component type, used by the
    /// reconciler's compatibility check (spec §4.1) rather than the
    /// instance id, which identifies a specific mounted occurrence.
    fn component_id(&self) -> &'static str;

    /// Produces this render's VNode subtree, using `cursor` for hooks.
    fn render(&self, cursor: &RenderCursor) -> VNode;
}

/// A composite-widget marker identifying the user-defined component that
/// produced this subtree (spec §3, §4.1 "if either is a composite widget,
/// the composite widget keys must match exactly").
#[derive(Clone)]
pub struct CompositeMarker {
    /// Stable identifier for the component type (not the instance).
    pub component_id: String,
    /// The component itself, invoked by `commit` when this subtree needs
    /// (re-)expanding.
    pub composite: Rc<dyn Composite>,
}

impl fmt::Debug for CompositeMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeMarker").field("component_id", &self.component_id).finish()
    }
}

impl PartialEq for CompositeMarker {
    fn eq(&self, other: &Self) -> bool {
        self.component_id == other.component_id
    }
}

impl Eq for CompositeMarker {}

/// Immutable virtual-node value produced by one render (spec §3).
#[derive(Clone)]
pub struct VNode {
    pub kind: VNodeKind,
    pub children: Vec<VNode>,
    /// User-supplied key used for keyed reconciliation (spec §4.1).
    pub key: Option<String>,
    /// Present when this node is the root of a composite-widget instance.
    pub composite: Option<CompositeMarker>,
}

impl VNode {
    pub fn new(kind: VNodeKind) -> Self {
        Self { kind, children: Vec::new(), key: None, composite: None }
    }

    pub fn with_children(mut self, children: Vec<VNode>) -> Self {
        self.children = children;
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_composite(mut self, composite: Rc<dyn Composite>) -> Self {
        let component_id = composite.component_id().to_string();
        self.composite = Some(CompositeMarker { component_id, composite });
        self
    }

    /// A cheap, `PartialEq`-free tag used by the reconciler's compatibility
    /// check ("same `kind`", spec §4.1).
    pub fn kind_tag(&self) -> VNodeKindTag {
        self.kind.tag()
    }
}

//--------------------------------------------------------------------------------------------------
// Kind taxonomy
//--------------------------------------------------------------------------------------------------

/// Fieldless discriminant mirroring [`VNodeKind`], used where only the tag
/// (not the payload) needs to be compared or stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VNodeKindTag {
    Row,
    Column,
    Container,
    Spacer,
    Layers,
    Text,
    RichText,
    Button,
    Input,
    Slider,
    Select,
    Checkbox,
    RadioGroup,
    Link,
    VirtualList,
    Table,
    Tree,
    Modal,
    Dropdown,
    Layer,
    ToastContainer,
    FocusZone,
    FocusTrap,
    Icon,
    Chart,
    Progress,
    Canvas,
    Image,
}

impl VNodeKindTag {
    /// Whether this kind requires router/metadata-collector engagement
    /// (spec §4.3 `hasRoutingWidgets`, §4.5 "routing-metadata gating").
    pub fn is_routing_affecting(self) -> bool {
        matches!(
            self,
            VNodeKindTag::Button
                | VNodeKindTag::Input
                | VNodeKindTag::Slider
                | VNodeKindTag::Select
                | VNodeKindTag::Checkbox
                | VNodeKindTag::RadioGroup
                | VNodeKindTag::Link
                | VNodeKindTag::VirtualList
                | VNodeKindTag::Table
                | VNodeKindTag::Tree
                | VNodeKindTag::Modal
                | VNodeKindTag::Dropdown
                | VNodeKindTag::ToastContainer
                | VNodeKindTag::FocusZone
                | VNodeKindTag::FocusTrap
        )
    }
}

/// The closed VNode kind taxonomy (spec §3): structural, textual,
/// interactive, collection, modal, focus, and ornamental, each carrying its
/// own payload struct.
#[derive(Clone)]
pub enum VNodeKind {
    // Structural
    Row(BoxProps),
    Column(BoxProps),
    Container(BoxProps),
    Spacer(SpacerProps),
    Layers(BoxProps),
    // Textual
    Text(TextProps),
    RichText(RichTextProps),
    // Interactive
    Button(ButtonProps),
    Input(InputProps),
    Slider(SliderProps),
    Select(SelectProps),
    Checkbox(CheckboxProps),
    RadioGroup(RadioGroupProps),
    Link(LinkProps),
    // Collection
    VirtualList(VirtualListProps),
    Table(TableProps),
    Tree(TreeProps),
    // Modal
    Modal(ModalProps),
    Dropdown(DropdownProps),
    Layer(BoxProps),
    ToastContainer(ToastContainerProps),
    // Focus
    FocusZone(FocusZoneProps),
    FocusTrap(FocusTrapProps),
    // Ornamental
    Icon(IconProps),
    Chart(ChartProps),
    Progress(ProgressProps),
    Canvas(CanvasProps),
    Image(ImageProps),
}

impl VNodeKind {
    pub fn tag(&self) -> VNodeKindTag {
        match self {
            VNodeKind::Row(_) => VNodeKindTag::Row,
            VNodeKind::Column(_) => VNodeKindTag::Column,
            VNodeKind::Container(_) => VNodeKindTag::Container,
            VNodeKind::Spacer(_) => VNodeKindTag::Spacer,
            VNodeKind::Layers(_) => VNodeKindTag::Layers,
            VNodeKind::Text(_) => VNodeKindTag::Text,
            VNodeKind::RichText(_) => VNodeKindTag::RichText,
            VNodeKind::Button(_) => VNodeKindTag::Button,
            VNodeKind::Input(_) => VNodeKindTag::Input,
            VNodeKind::Slider(_) => VNodeKindTag::Slider,
            VNodeKind::Select(_) => VNodeKindTag::Select,
            VNodeKind::Checkbox(_) => VNodeKindTag::Checkbox,
            VNodeKind::RadioGroup(_) => VNodeKindTag::RadioGroup,
            VNodeKind::Link(_) => VNodeKindTag::Link,
            VNodeKind::VirtualList(_) => VNodeKindTag::VirtualList,
            VNodeKind::Table(_) => VNodeKindTag::Table,
            VNodeKind::Tree(_) => VNodeKindTag::Tree,
            VNodeKind::Modal(_) => VNodeKindTag::Modal,
            VNodeKind::Dropdown(_) => VNodeKindTag::Dropdown,
            VNodeKind::Layer(_) => VNodeKindTag::Layer,
            VNodeKind::ToastContainer(_) => VNodeKindTag::ToastContainer,
            VNodeKind::FocusZone(_) => VNodeKindTag::FocusZone,
            VNodeKind::FocusTrap(_) => VNodeKindTag::FocusTrap,
            VNodeKind::Icon(_) => VNodeKindTag::Icon,
            VNodeKind::Chart(_) => VNodeKindTag::Chart,
            VNodeKind::Progress(_) => VNodeKindTag::Progress,
            VNodeKind::Canvas(_) => VNodeKindTag::Canvas,
            VNodeKind::Image(_) => VNodeKindTag::Image,
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Shared layout style
//--------------------------------------------------------------------------------------------------

/// Layout-relevant style shared by every structural/interactive container.
#[derive(Debug, Clone, Default)]
pub struct LayoutStyle {
    pub width: Option<Dimension>,
    pub height: Option<Dimension>,
    pub padding: Spacing,
    pub margin: Spacing,
    pub gap: u16,
    pub overflow: Overflow,
}

//--------------------------------------------------------------------------------------------------
// Structural payloads
//--------------------------------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct BoxProps {
    pub id: Option<String>,
    pub style: LayoutStyle,
    /// Explicit direction override; `row`/`column` ignore this and fix
    /// their own axis, `box`/`layers` honor it (default vertical).
    pub direction: Option<Direction>,
    pub background: Option<Color>,
    pub disabled: bool,
    pub on_click: Option<Rc<dyn Fn()>>,
}

#[derive(Clone, Default)]
pub struct SpacerProps {
    /// Fixed size along the parent's main axis; `None` means "grow to fill
    /// remaining space", matching an `Auto`-dimensioned sibling.
    pub size: Option<u16>,
}

//--------------------------------------------------------------------------------------------------
// Textual payloads
//--------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextWrap {
    #[default]
    None,
    Character,
    Word,
}

#[derive(Clone, Default)]
pub struct TextProps {
    pub content: String,
    pub style: Option<TextStyle>,
    pub wrap: TextWrap,
}

#[derive(Clone, Default)]
pub struct TextSpan {
    pub content: String,
    pub style: Option<TextStyle>,
}

#[derive(Clone, Default)]
pub struct RichTextProps {
    pub spans: Vec<TextSpan>,
    pub wrap: TextWrap,
}

//--------------------------------------------------------------------------------------------------
// Interactive payloads
//--------------------------------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct ButtonProps {
    pub id: String,
    pub label: String,
    pub disabled: bool,
    pub style: LayoutStyle,
    pub on_press: Option<Rc<dyn Fn()>>,
}

#[derive(Clone)]
pub struct InputProps {
    pub id: String,
    pub value: String,
    pub placeholder: Option<String>,
    pub disabled: bool,
    pub multiline: bool,
    pub style: LayoutStyle,
    pub on_input: Option<Rc<dyn Fn(&str)>>,
    pub on_blur: Option<Rc<dyn Fn()>>,
    pub on_submit: Option<Rc<dyn Fn(&str)>>,
}

impl Default for InputProps {
    fn default() -> Self {
        Self {
            id: String::new(),
            value: String::new(),
            placeholder: None,
            disabled: false,
            multiline: false,
            style: LayoutStyle::default(),
            on_input: None,
            on_blur: None,
            on_submit: None,
        }
    }
}

#[derive(Clone)]
pub struct SliderProps {
    pub id: String,
    pub value: f64,
    pub min: f64,
    pub max: f64,
    pub step: f64,
    pub disabled: bool,
    pub read_only: bool,
    pub on_change: Option<Rc<dyn Fn(f64)>>,
}

impl Default for SliderProps {
    fn default() -> Self {
        Self {
            id: String::new(),
            value: 0.0,
            min: 0.0,
            max: 1.0,
            step: 0.01,
            disabled: false,
            read_only: false,
            on_change: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
    pub disabled: bool,
}

#[derive(Clone, Default)]
pub struct SelectProps {
    pub id: String,
    pub options: Vec<SelectOption>,
    pub selected: Option<usize>,
    pub disabled: bool,
    pub on_change: Option<Rc<dyn Fn(usize)>>,
}

#[derive(Clone, Default)]
pub struct CheckboxProps {
    pub id: String,
    pub checked: bool,
    pub disabled: bool,
    pub on_change: Option<Rc<dyn Fn(bool)>>,
}

#[derive(Clone, Default)]
pub struct RadioGroupProps {
    pub id: String,
    pub options: Vec<SelectOption>,
    pub selected: Option<usize>,
    pub disabled: bool,
    pub on_change: Option<Rc<dyn Fn(usize)>>,
}

#[derive(Clone, Default)]
pub struct LinkProps {
    pub id: String,
    pub label: String,
    pub uri: Option<String>,
    pub disabled: bool,
    pub on_press: Option<Rc<dyn Fn()>>,
}

//--------------------------------------------------------------------------------------------------
// Collection payloads
//--------------------------------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct VirtualListProps {
    pub id: String,
    pub item_count: usize,
    pub item_height: u16,
    pub disabled: bool,
    pub on_select: Option<Rc<dyn Fn(usize)>>,
    pub on_scroll: Option<Rc<dyn Fn(u16, (usize, usize))>>,
}

#[derive(Debug, Clone, Default)]
pub struct TableColumn {
    pub title: String,
    pub width: Option<u16>,
}

#[derive(Clone, Default)]
pub struct TableProps {
    pub id: String,
    pub columns: Vec<TableColumn>,
    pub row_count: usize,
    pub row_height: u16,
    pub disabled: bool,
    pub multi_select: bool,
    pub on_select: Option<Rc<dyn Fn(usize)>>,
    pub on_scroll: Option<Rc<dyn Fn(u16, (usize, usize))>>,
}

#[derive(Clone, Default)]
pub struct TreeNodeSpec {
    pub id: String,
    pub label: String,
    pub expanded: bool,
    pub has_children: bool,
    pub children: Vec<TreeNodeSpec>,
}

#[derive(Clone, Default)]
pub struct TreeProps {
    pub id: String,
    pub roots: Vec<TreeNodeSpec>,
    pub disabled: bool,
    #[allow(clippy::type_complexity)]
    pub load_children: Option<Rc<dyn Fn(String) -> Vec<TreeNodeSpec>>>,
    pub on_toggle: Option<Rc<dyn Fn(String, bool)>>,
}

//--------------------------------------------------------------------------------------------------
// Modal payloads
//--------------------------------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct ModalProps {
    pub id: String,
    pub open: bool,
    pub style: LayoutStyle,
}

#[derive(Debug, Clone, Default)]
pub struct DropdownItem {
    pub label: String,
    pub value: String,
    pub disabled: bool,
    pub divider: bool,
}

#[derive(Clone, Default)]
pub struct DropdownProps {
    pub id: String,
    pub open: bool,
    pub items: Vec<DropdownItem>,
    pub selected: Option<usize>,
    pub disabled: bool,
    pub on_select: Option<Rc<dyn Fn(usize)>>,
    pub on_close: Option<Rc<dyn Fn()>>,
}

#[derive(Clone, Default)]
pub struct ToastContainerProps {
    pub id: String,
    pub action_ids: Vec<String>,
}

//--------------------------------------------------------------------------------------------------
// Focus payloads
//--------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ZoneNavigation {
    #[default]
    Linear,
    Grid,
    NoneNav,
}

#[derive(Clone, Default)]
pub struct FocusZoneProps {
    pub id: String,
    pub navigation: ZoneNavigation,
    pub columns: usize,
    pub wrap_around: bool,
    pub on_enter: Option<Rc<dyn Fn()>>,
    pub on_exit: Option<Rc<dyn Fn()>>,
}

#[derive(Clone, Default)]
pub struct FocusTrapProps {
    pub id: String,
    pub active: bool,
    pub return_focus_to: Option<String>,
    pub initial_focus: Option<String>,
}

//--------------------------------------------------------------------------------------------------
// Ornamental payloads
//--------------------------------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct IconProps {
    pub glyph: String,
    pub color: Option<Color>,
}

#[derive(Clone, Default)]
pub struct ChartProps {
    pub series: Vec<f64>,
    pub color: Option<Color>,
}

#[derive(Clone, Default)]
pub struct ProgressProps {
    pub value: f64,
    pub color: Option<Color>,
}

/// Opaque canvas payload; the drawlist renderer passes the blob through
/// without interpreting pixels (spec §1 Non-goals).
#[derive(Clone, Default)]
pub struct CanvasProps {
    pub blitter: crate::style::Blitter,
    pub cols: u16,
    pub rows: u16,
    pub px_width: Option<u16>,
    pub px_height: Option<u16>,
    pub bytes: Rc<Vec<u8>>,
}

#[derive(Clone, Default)]
pub struct ImageProps {
    pub format: crate::style::ImageFormat,
    pub protocol: crate::style::ImageProtocol,
    pub fit: crate::style::ImageFit,
    pub z_layer: i8,
    pub image_id: Option<u32>,
    pub px_width: Option<u16>,
    pub px_height: Option<u16>,
    pub bytes: Rc<Vec<u8>>,
}

