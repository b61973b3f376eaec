use std::collections::HashMap;

use crate::bundle::ElementTag;

use super::property::{Edges, Property, Value};

/// Element lifecycle. Transitions are one-directional except the
/// Mounted ⇄ Updating cycle driven by property application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Created,
    Mounting,
    Mounted,
    Updating,
    Unmounting,
    Unmounted,
    Destroyed,
}

impl Phase {
    /// Phases in which the node may still be mutated.
    pub fn is_mutable(self) -> bool {
        matches!(self, Self::Created | Self::Mounting | Self::Mounted | Self::Updating)
    }
}

/// Stable handle into the element arena. The generation detects handles
/// that outlive their slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

/// Solved layout geometry in cell units.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LayoutBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub padding: Edges,
    pub margin: Edges,
}

/// Style resolved from properties ahead of painting.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ComputedStyle {
    pub background: Option<u32>,
    pub foreground: Option<u32>,
    pub border_color: Option<u32>,
    pub border_width: f32,
    pub opacity: f32,
}

/// A live tree node. Children are owned through the child id array; the
/// parent link is a back-reference only.
#[derive(Debug)]
pub struct Element {
    pub(crate) doc_id: u32,
    pub(crate) tag: ElementTag,
    pub(crate) string_id: Option<String>,
    pub(crate) parent: Option<ElementId>,
    pub(crate) children: Vec<ElementId>,
    pub(crate) properties: HashMap<String, Property>,
    pub(crate) style: ComputedStyle,
    pub(crate) layout: LayoutBox,
    pub(crate) phase: Phase,
    pub(crate) visible: bool,
    pub(crate) enabled: bool,
    pub(crate) needs_layout: bool,
    pub(crate) needs_render: bool,
    /// Some descendant needs layout; the pass recurses but this node's own
    /// size is reusable.
    pub(crate) descendant_dirty: bool,
}

impl Element {
    pub(crate) fn new(doc_id: u32, tag: ElementTag, parent: Option<ElementId>) -> Self {
        Self {
            doc_id,
            tag,
            string_id: None,
            parent,
            children: Vec::new(),
            properties: HashMap::new(),
            style: ComputedStyle {
                opacity: 1.0,
                ..ComputedStyle::default()
            },
            layout: LayoutBox::default(),
            phase: Phase::Created,
            visible: true,
            enabled: true,
            needs_layout: true,
            needs_render: true,
            descendant_dirty: false,
        }
    }

    pub fn doc_id(&self) -> u32 {
        self.doc_id
    }

    pub fn tag(&self) -> ElementTag {
        self.tag
    }

    pub fn string_id(&self) -> Option<&str> {
        self.string_id.as_deref()
    }

    pub fn parent(&self) -> Option<ElementId> {
        self.parent
    }

    pub fn children(&self) -> &[ElementId] {
        &self.children
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn needs_layout(&self) -> bool {
        self.needs_layout
    }

    pub fn needs_render(&self) -> bool {
        self.needs_render
    }

    pub fn layout(&self) -> LayoutBox {
        self.layout
    }

    pub fn style(&self) -> ComputedStyle {
        self.style
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.get(name)
    }

    pub fn property_value(&self, name: &str) -> Option<&Value> {
        self.properties.get(name).map(|p| &p.value)
    }

    pub fn float_property(&self, name: &str) -> Option<f32> {
        self.property_value(name).and_then(Value::as_f32)
    }

    /// A node with an explicit size on an axis does not depend on its
    /// children for that axis; layout invalidation stops at the first
    /// ancestor that is fixed on both.
    pub fn depends_on_children(&self) -> bool {
        self.tag.is_container()
            && (self.float_property("width").is_none() || self.float_property("height").is_none())
    }
}
