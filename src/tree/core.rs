use std::collections::HashMap;

use serde_json::json;

use crate::bundle::{
    Bundle, ElementRecord, ElementTag, PropertyRecord, PropertyValue as WireValue,
};
use crate::diag::{LogLevel, Logger, event_with_fields, json_kv, json_str};
use crate::error::{ElementError, EncodeError, PropertyError, RuntimeError};
use crate::state::StateStore;

use super::element::{Element, ElementId, Phase};
use super::property::{
    Binding, Edges, Property, Value, ValueKind, affects_layout, check_value, coerce_state_value,
    parse_color, property_kind,
};

struct Slot {
    generation: u32,
    node: Option<Element>,
}

/// The live UI document: a generational arena of elements plus the id
/// indexes used for lookups and reference resolution.
pub struct ElementTree {
    slots: Vec<Slot>,
    free: Vec<u32>,
    by_doc_id: HashMap<u32, ElementId>,
    by_string_id: HashMap<String, ElementId>,
    next_doc_id: u32,
    max_elements: usize,
    live: usize,
    logger: Option<Logger>,
}

impl Default for ElementTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ElementTree {
    pub fn new() -> Self {
        Self::with_limit(65_536)
    }

    pub fn with_limit(max_elements: usize) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            by_doc_id: HashMap::new(),
            by_string_id: HashMap::new(),
            next_doc_id: 1,
            max_elements,
            live: 0,
            logger: None,
        }
    }

    pub fn set_logger(&mut self, logger: Option<Logger>) {
        self.logger = logger;
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn element(&self, id: ElementId) -> Option<&Element> {
        self.slots.get(id.index as usize).and_then(|slot| {
            if slot.generation == id.generation {
                slot.node.as_ref()
            } else {
                None
            }
        })
    }

    pub(crate) fn node_mut(&mut self, id: ElementId) -> Option<&mut Element> {
        self.slots.get_mut(id.index as usize).and_then(|slot| {
            if slot.generation == id.generation {
                slot.node.as_mut()
            } else {
                None
            }
        })
    }

    /// Create a node under `parent` (or a new root). The node starts in
    /// `Created` and participates in layout once mounted.
    pub fn create(
        &mut self,
        tag: ElementTag,
        parent: Option<ElementId>,
    ) -> Result<ElementId, ElementError> {
        let doc_id = self.next_doc_id;
        let id = self.create_with_doc_id(doc_id, tag, parent)?;
        Ok(id)
    }

    pub(crate) fn create_with_doc_id(
        &mut self,
        doc_id: u32,
        tag: ElementTag,
        parent: Option<ElementId>,
    ) -> Result<ElementId, ElementError> {
        if self.live >= self.max_elements {
            return Err(ElementError::TreeFull(self.max_elements));
        }
        if let Some(pid) = parent {
            let node = self.element(pid).ok_or(ElementError::InvalidHandle)?;
            if !node.phase().is_mutable() {
                return Err(ElementError::InvalidPhase(node.phase()));
            }
        }

        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    node: None,
                });
                (self.slots.len() - 1) as u32
            }
        };
        let generation = self.slots[index as usize].generation;
        let id = ElementId { index, generation };

        self.slots[index as usize].node = Some(Element::new(doc_id, tag, parent));
        self.live += 1;
        self.by_doc_id.insert(doc_id, id);
        self.next_doc_id = self.next_doc_id.max(doc_id + 1);

        if let Some(pid) = parent {
            if let Some(parent_node) = self.node_mut(pid) {
                parent_node.children.push(id);
            }
            self.invalidate_layout(pid);
        }
        Ok(id)
    }

    /// Drive `Created → Mounting → Mounted` over the subtree. Mounting an
    /// already mounted subtree is a no-op.
    pub fn mount(&mut self, id: ElementId) -> Result<usize, ElementError> {
        let node = self.element(id).ok_or(ElementError::InvalidHandle)?;
        match node.phase() {
            Phase::Created => {}
            Phase::Mounted => return Ok(0),
            other => return Err(ElementError::InvalidPhase(other)),
        }

        self.node_mut(id).expect("checked above").phase = Phase::Mounting;
        let children = self.element(id).expect("checked above").children.to_vec();
        let mut mounted = 1;
        for child in children {
            mounted += self.mount(child)?;
        }
        self.node_mut(id).expect("checked above").phase = Phase::Mounted;
        Ok(mounted)
    }

    /// Recursive depth-first teardown: every descendant passes through
    /// `Unmounting → Unmounted → Destroyed` before the node itself, and the
    /// parent's child array drops the id. Returns the number of nodes
    /// destroyed.
    pub fn destroy(&mut self, id: ElementId) -> Result<usize, ElementError> {
        let parent = self.element(id).ok_or(ElementError::InvalidHandle)?.parent;

        if let Some(pid) = parent {
            if let Some(parent_node) = self.node_mut(pid) {
                parent_node.children.retain(|c| *c != id);
            }
            self.invalidate_layout(pid);
        }

        Ok(self.destroy_subtree(id))
    }

    fn destroy_subtree(&mut self, id: ElementId) -> usize {
        let Some(node) = self.node_mut(id) else {
            return 0;
        };
        node.phase = Phase::Unmounting;
        let children = std::mem::take(&mut node.children);

        let mut count = 0;
        for child in children {
            count += self.destroy_subtree(child);
        }

        let node = self.node_mut(id).expect("slot still occupied");
        node.phase = Phase::Unmounted;
        node.phase = Phase::Destroyed;
        let doc_id = node.doc_id;
        let string_id = node.string_id.take();

        self.by_doc_id.remove(&doc_id);
        if let Some(string_id) = string_id {
            self.by_string_id.remove(&string_id);
        }
        let slot = &mut self.slots[id.index as usize];
        slot.node = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;
        count + 1
    }

    pub fn find_by_id(&self, string_id: &str) -> Option<ElementId> {
        self.by_string_id.get(string_id).copied()
    }

    pub fn find_by_doc_id(&self, doc_id: u32) -> Option<ElementId> {
        self.by_doc_id.get(&doc_id).copied()
    }

    /// Apply a property. Unknown names and kind mismatches are typed,
    /// non-fatal errors; the tree is left untouched. A mounted node cycles
    /// through `Updating` for the duration of the mutation.
    pub fn set_property(
        &mut self,
        id: ElementId,
        name: &str,
        value: Value,
    ) -> Result<(), RuntimeError> {
        let node = self.element(id).ok_or(ElementError::InvalidHandle)?;
        let phase = node.phase();
        if !phase.is_mutable() {
            return Err(ElementError::InvalidPhase(phase).into());
        }
        check_value(name, &value).map_err(RuntimeError::Property)?;
        let value = self.canonicalize(name, value)?;

        if phase == Phase::Mounted {
            self.node_mut(id).expect("live node").phase = Phase::Updating;
        }

        self.apply_side_effects(id, name, &value);
        let node = self.node_mut(id).expect("live node");
        match node.properties.get_mut(name) {
            Some(existing) => existing.value = value,
            None => {
                node.properties
                    .insert(name.to_string(), Property::fixed(value));
            }
        }

        self.invalidate_render(id);
        if affects_layout(name) {
            self.invalidate_layout(id);
        }

        let node = self.node_mut(id).expect("live node");
        if node.phase == Phase::Updating {
            node.phase = Phase::Mounted;
        }
        Ok(())
    }

    /// Attach a state binding without evaluating it; evaluation is deferred
    /// to the next reconcile pass so a binding costs one evaluation per
    /// frame, not one per mutation.
    pub fn bind_property(
        &mut self,
        id: ElementId,
        name: &str,
        path: impl Into<String>,
    ) -> Result<(), RuntimeError> {
        let node = self.element(id).ok_or(ElementError::InvalidHandle)?;
        if !node.phase().is_mutable() {
            return Err(ElementError::InvalidPhase(node.phase()).into());
        }
        let kind =
            property_kind(name).ok_or_else(|| PropertyError::Unknown(name.to_string()))?;
        let path = path.into();

        let node = self.node_mut(id).expect("live node");
        match node.properties.get_mut(name) {
            Some(existing) => {
                existing.binding = Some(Binding { path, last: None });
            }
            None => {
                let initial = default_value(kind);
                node.properties
                    .insert(name.to_string(), Property::bound(path, initial));
            }
        }
        Ok(())
    }

    pub fn get_property(&self, id: ElementId, name: &str) -> Option<Value> {
        self.element(id)?.property_value(name).cloned()
    }

    /// Mark a node for layout, then walk upward marking every auto-sized
    /// ancestor. The walk stops flagging at the first fixed-size ancestor
    /// (its box cannot change), but keeps recording `descendant_dirty` to
    /// the root so the layout pass knows where to recurse.
    pub fn invalidate_layout(&mut self, id: ElementId) {
        let Some(node) = self.node_mut(id) else {
            return;
        };
        node.needs_layout = true;
        let mut parent = node.parent;
        let mut flagging = true;

        while let Some(pid) = parent {
            let Some(p) = self.node_mut(pid) else {
                break;
            };
            if flagging && p.depends_on_children() {
                p.needs_layout = true;
            } else {
                flagging = false;
            }
            p.descendant_dirty = true;
            parent = p.parent;
        }
    }

    pub fn invalidate_render(&mut self, id: ElementId) {
        if let Some(node) = self.node_mut(id) {
            node.needs_render = true;
        }
    }

    pub fn has_layout_dirt(&self) -> bool {
        self.iter_live()
            .any(|(_, node)| node.needs_layout || node.descendant_dirty)
    }

    pub fn has_render_dirt(&self) -> bool {
        self.iter_live().any(|(_, node)| node.needs_render)
    }

    pub fn roots(&self) -> Vec<ElementId> {
        self.iter_live()
            .filter(|(_, node)| node.parent.is_none())
            .map(|(id, _)| id)
            .collect()
    }

    /// Handles from `id` up to its root, target first.
    pub fn path_to_root(&self, id: ElementId) -> Vec<ElementId> {
        let mut path = Vec::new();
        let mut current = Some(id);
        while let Some(cid) = current {
            let Some(node) = self.element(cid) else { break };
            path.push(cid);
            current = node.parent;
        }
        path
    }

    pub fn iter_live(&self) -> impl Iterator<Item = (ElementId, &Element)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.node.as_ref().map(|node| {
                (
                    ElementId {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    node,
                )
            })
        })
    }

    /// Re-evaluate bindings touched by the changed state paths, setting
    /// dirty flags where the evaluated value actually differs. Returns the
    /// number of bindings applied.
    pub fn reconcile_bindings(&mut self, state: &StateStore, changed: &[String]) -> usize {
        if changed.is_empty() {
            return 0;
        }
        let ids: Vec<ElementId> = self.iter_live().map(|(id, _)| id).collect();
        let mut applied = 0;

        for id in ids {
            let touched: Vec<(String, String)> = {
                let Some(node) = self.element(id) else { continue };
                node.properties
                    .iter()
                    .filter_map(|(name, property)| {
                        property.binding.as_ref().and_then(|binding| {
                            if changed.iter().any(|c| paths_overlap(&binding.path, c)) {
                                Some((name.clone(), binding.path.clone()))
                            } else {
                                None
                            }
                        })
                    })
                    .collect()
            };

            for (name, path) in touched {
                let Some(state_value) = state.get(&path) else {
                    self.log(
                        LogLevel::Warn,
                        "binding_path_unresolved",
                        [json_str("path", path.clone()), json_str("property", name)],
                    );
                    continue;
                };
                let Some(kind) = property_kind(&name) else {
                    continue;
                };
                let Some(new_value) = coerce_state_value(&state_value, kind) else {
                    self.log(
                        LogLevel::Warn,
                        "binding_value_incoercible",
                        [json_str("path", path), json_str("property", name)],
                    );
                    continue;
                };

                let node = self.node_mut(id).expect("live node");
                let property = node.properties.get_mut(&name).expect("binding present");
                let binding = property.binding.as_mut().expect("binding present");
                if binding.last.as_ref() == Some(&new_value) {
                    continue;
                }
                binding.last = Some(new_value.clone());
                property.value = new_value.clone();

                self.apply_side_effects(id, &name, &new_value);
                self.invalidate_render(id);
                if affects_layout(&name) {
                    self.invalidate_layout(id);
                }
                applied += 1;
            }
        }
        applied
    }

    /// Build a live tree from a decoded bundle. Record order is not
    /// significant: nodes are created first, links and properties resolve in
    /// a second pass. Property failures are logged and skipped; the rest of
    /// the document loads.
    pub fn from_bundle(
        bundle: &Bundle,
        max_elements: usize,
        logger: Option<Logger>,
    ) -> Result<Self, RuntimeError> {
        let mut tree = Self::with_limit(max_elements);
        tree.logger = logger;

        for record in &bundle.elements {
            tree.create_with_doc_id(record.id, record.tag, None)?;
        }

        for record in &bundle.elements {
            let id = tree.find_by_doc_id(record.id).expect("created above");

            if record.parent_id != 0 {
                let parent = tree.find_by_doc_id(record.parent_id).expect("validated");
                tree.node_mut(id).expect("live node").parent = Some(parent);
            }
            let children: Vec<ElementId> = record
                .children
                .iter()
                .filter_map(|child| tree.find_by_doc_id(*child))
                .collect();
            tree.node_mut(id).expect("live node").children = children;

            if let Some(name_index) = record.name {
                if let Some(name) = bundle.string(name_index) {
                    tree.node_mut(id).expect("live node").string_id = Some(name.to_string());
                    tree.by_string_id.insert(name.to_string(), id);
                }
            }

            for property in &record.properties {
                tree.apply_record_property(id, record.id, bundle, property);
            }
        }
        Ok(tree)
    }

    fn apply_record_property(
        &mut self,
        id: ElementId,
        doc_id: u32,
        bundle: &Bundle,
        record: &PropertyRecord,
    ) {
        let Some(name) = bundle.string(record.name).map(str::to_string) else {
            return;
        };

        if let WireValue::Expression(path_index) = record.value {
            let Some(path) = bundle.string(path_index).map(str::to_string) else {
                return;
            };
            if let Err(err) = self.bind_property(id, &name, path) {
                self.log_property_skip(doc_id, &name, &err);
            }
            return;
        }

        let value = match &record.value {
            WireValue::Str(index) => {
                let Some(s) = bundle.string(*index) else { return };
                Value::Str(s.to_string())
            }
            WireValue::Int(v) => Value::Int(*v),
            WireValue::Float(v) => Value::Float(*v),
            WireValue::Bool(v) => Value::Bool(*v),
            WireValue::Color(v) => Value::Color(*v),
            WireValue::Size { width, height } => Value::Size {
                width: *width,
                height: *height,
            },
            WireValue::Position { x, y } => Value::Position { x: *x, y: *y },
            WireValue::Margin(edges) => Value::Margin(Edges::from(*edges)),
            WireValue::Padding(edges) => Value::Padding(Edges::from(*edges)),
            WireValue::Reference(v) => Value::Reference(*v),
            WireValue::Function(index) => {
                let Some(s) = bundle.string(*index) else { return };
                Value::Function(s.to_string())
            }
            WireValue::Expression(_) => unreachable!("handled above"),
        };

        if let Err(err) = self.set_property(id, &name, value) {
            self.log_property_skip(doc_id, &name, &err);
        }
    }

    /// Serialize the live document back into a bundle for persistence.
    pub fn snapshot(&self) -> Result<Bundle, EncodeError> {
        let mut bundle = Bundle::new();
        let mut ids: Vec<(u32, ElementId)> = self
            .iter_live()
            .map(|(id, node)| (node.doc_id, id))
            .collect();
        ids.sort_by_key(|(doc_id, _)| *doc_id);

        for (doc_id, id) in ids {
            let node = self.element(id).expect("live node");
            let name = match node.string_id() {
                Some(string_id) => Some(bundle.add_string(string_id)?),
                None => None,
            };

            let mut names: Vec<&String> = node.properties.keys().collect();
            names.sort();
            let mut properties = Vec::with_capacity(names.len());
            for prop_name in names {
                let property = &node.properties[prop_name];
                let name_index = bundle.add_string(prop_name)?;
                let value = match &property.binding {
                    Some(binding) => WireValue::Expression(bundle.add_string(&binding.path)?),
                    None => match &property.value {
                        Value::Str(s) => WireValue::Str(bundle.add_string(s)?),
                        Value::Int(v) => WireValue::Int(*v),
                        Value::Float(v) => WireValue::Float(*v),
                        Value::Bool(v) => WireValue::Bool(*v),
                        Value::Color(v) => WireValue::Color(*v),
                        Value::Size { width, height } => WireValue::Size {
                            width: *width,
                            height: *height,
                        },
                        Value::Position { x, y } => WireValue::Position { x: *x, y: *y },
                        Value::Margin(edges) => WireValue::Margin((*edges).into()),
                        Value::Padding(edges) => WireValue::Padding((*edges).into()),
                        Value::Reference(v) => WireValue::Reference(*v),
                        Value::Function(s) => WireValue::Function(bundle.add_string(s)?),
                    },
                };
                properties.push(PropertyRecord {
                    name: name_index,
                    value,
                });
            }

            let parent_id = node
                .parent
                .and_then(|pid| self.element(pid))
                .map(|p| p.doc_id)
                .unwrap_or(0);
            let children = node
                .children
                .iter()
                .filter_map(|cid| self.element(*cid))
                .map(|c| c.doc_id)
                .collect();

            bundle.add_element(ElementRecord {
                id: doc_id,
                tag: node.tag(),
                name,
                parent_id,
                properties,
                children,
            });
        }
        Ok(bundle)
    }

    fn canonicalize(&self, name: &str, value: Value) -> Result<Value, RuntimeError> {
        match (property_kind(name), value) {
            (Some(ValueKind::Color), Value::Str(raw)) => match parse_color(&raw) {
                Ok(color) => Ok(Value::Color(color)),
                Err(err) => {
                    self.log(
                        LogLevel::Warn,
                        "color_parse_failed",
                        [json_str("property", name), json_str("detail", err.to_string())],
                    );
                    Err(PropertyError::TypeMismatch {
                        name: name.to_string(),
                        expected: "color",
                        got: "string",
                    }
                    .into())
                }
            },
            (Some(ValueKind::Function), Value::Str(raw)) => Ok(Value::Function(raw)),
            (_, value) => Ok(value),
        }
    }

    fn apply_side_effects(&mut self, id: ElementId, name: &str, value: &Value) {
        if name == "id" {
            if let Value::Str(string_id) = value {
                let node = self.node_mut(id).expect("live node");
                let old = node.string_id.replace(string_id.clone());
                if let Some(old) = old {
                    self.by_string_id.remove(&old);
                }
                self.by_string_id.insert(string_id.clone(), id);
            }
            return;
        }

        let Some(node) = self.node_mut(id) else { return };
        match (name, value) {
            ("visible", Value::Bool(v)) => node.visible = *v,
            ("enabled", Value::Bool(v)) => node.enabled = *v,
            ("background", Value::Color(c)) => node.style.background = Some(*c),
            ("foreground", Value::Color(c)) => node.style.foreground = Some(*c),
            ("border_color", Value::Color(c)) => node.style.border_color = Some(*c),
            ("border_width", v) => {
                if let Some(w) = v.as_f32() {
                    node.style.border_width = w;
                }
            }
            ("opacity", v) => {
                if let Some(o) = v.as_f32() {
                    node.style.opacity = o.clamp(0.0, 1.0);
                }
            }
            ("margin", Value::Margin(edges)) => node.layout.margin = *edges,
            ("padding", Value::Padding(edges)) => node.layout.padding = *edges,
            _ => {}
        }
    }

    fn log_property_skip(&self, doc_id: u32, name: &str, err: &RuntimeError) {
        self.log(
            LogLevel::Warn,
            "property_skipped",
            [
                json_kv("element", json!(doc_id)),
                json_str("property", name),
                json_str("detail", err.to_string()),
            ],
        );
    }

    fn log(
        &self,
        level: LogLevel,
        message: &str,
        fields: impl IntoIterator<Item = (String, serde_json::Value)>,
    ) {
        if let Some(logger) = self.logger.as_ref() {
            let _ = logger.log_event(event_with_fields(level, "trellis::tree", message, fields));
        }
    }
}

/// A binding re-evaluates when the changed path equals it, replaced one of
/// its ancestors, or touched one of its descendants.
fn paths_overlap(binding: &str, changed: &str) -> bool {
    if binding == changed {
        return true;
    }
    binding
        .strip_prefix(changed)
        .is_some_and(|rest| rest.starts_with('.'))
        || changed
            .strip_prefix(binding)
            .is_some_and(|rest| rest.starts_with('.'))
}

fn default_value(kind: ValueKind) -> Value {
    match kind {
        ValueKind::Str => Value::Str(String::new()),
        ValueKind::Number => Value::Float(0.0),
        ValueKind::Bool => Value::Bool(false),
        ValueKind::Color => Value::Color(0),
        ValueKind::Size => Value::Size {
            width: 0.0,
            height: 0.0,
        },
        ValueKind::Position => Value::Position { x: 0.0, y: 0.0 },
        ValueKind::Margin => Value::Margin(Edges::default()),
        ValueKind::Padding => Value::Padding(Edges::default()),
        ValueKind::Reference => Value::Reference(0),
        ValueKind::Function => Value::Function(String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ElementError;

    fn clear_dirt(tree: &mut ElementTree) {
        let ids: Vec<ElementId> = tree.iter_live().map(|(id, _)| id).collect();
        for id in ids {
            let node = tree.node_mut(id).unwrap();
            node.needs_layout = false;
            node.needs_render = false;
            node.descendant_dirty = false;
        }
    }

    #[test]
    fn create_and_mount_lifecycle() {
        let mut tree = ElementTree::new();
        let root = tree.create(ElementTag::Container, None).unwrap();
        let child = tree.create(ElementTag::Text, Some(root)).unwrap();

        assert_eq!(tree.element(root).unwrap().phase(), Phase::Created);
        let mounted = tree.mount(root).unwrap();
        assert_eq!(mounted, 2);
        assert_eq!(tree.element(child).unwrap().phase(), Phase::Mounted);
        assert_eq!(tree.mount(root).unwrap(), 0);
    }

    #[test]
    fn destroy_counts_every_descendant() {
        let mut tree = ElementTree::new();
        let root = tree.create(ElementTag::Container, None).unwrap();
        let branch = tree.create(ElementTag::Column, Some(root)).unwrap();
        for _ in 0..3 {
            tree.create(ElementTag::Text, Some(branch)).unwrap();
        }
        tree.mount(root).unwrap();

        let destroyed = tree.destroy(branch).unwrap();
        assert_eq!(destroyed, 4); // branch + 3 leaves
        assert!(tree.element(branch).is_none());
        assert!(tree.element(root).unwrap().children().is_empty());
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn stale_handles_are_rejected() {
        let mut tree = ElementTree::new();
        let root = tree.create(ElementTag::Container, None).unwrap();
        let child = tree.create(ElementTag::Text, Some(root)).unwrap();
        tree.destroy(child).unwrap();

        assert!(tree.element(child).is_none());
        assert!(matches!(
            tree.destroy(child).unwrap_err(),
            ElementError::InvalidHandle
        ));
        let err = tree
            .set_property(child, "text", Value::Str("x".into()))
            .unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Element(ElementError::InvalidHandle)
        ));

        // The freed slot is reused under a fresh generation; the old handle
        // stays dead.
        let replacement = tree.create(ElementTag::Text, Some(root)).unwrap();
        assert!(tree.element(child).is_none());
        assert!(tree.element(replacement).is_some());
    }

    #[test]
    fn layout_invalidation_stops_at_fixed_ancestor() {
        let mut tree = ElementTree::new();
        let root = tree.create(ElementTag::Container, None).unwrap();
        tree.set_property(root, "width", Value::Float(100.0)).unwrap();
        tree.set_property(root, "height", Value::Float(50.0)).unwrap();

        let auto_container = tree.create(ElementTag::Row, Some(root)).unwrap();
        let child = tree.create(ElementTag::Text, Some(auto_container)).unwrap();
        let fixed_sibling = tree.create(ElementTag::Container, Some(root)).unwrap();
        tree.set_property(fixed_sibling, "width", Value::Float(10.0))
            .unwrap();
        tree.set_property(fixed_sibling, "height", Value::Float(10.0))
            .unwrap();
        tree.mount(root).unwrap();
        clear_dirt(&mut tree);

        tree.set_property(child, "width", Value::Float(42.0)).unwrap();

        assert!(tree.element(child).unwrap().needs_layout());
        assert!(tree.element(auto_container).unwrap().needs_layout());
        // Root is fixed on both axes: its own box cannot change.
        assert!(!tree.element(root).unwrap().needs_layout());
        assert!(!tree.element(fixed_sibling).unwrap().needs_layout());
        // But the pass still knows to recurse through the root.
        assert!(tree.element(root).unwrap().descendant_dirty);
    }

    #[test]
    fn property_errors_are_typed_and_non_destructive() {
        let mut tree = ElementTree::new();
        let root = tree.create(ElementTag::Container, None).unwrap();

        let err = tree
            .set_property(root, "no_such_prop", Value::Int(1))
            .unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Property(PropertyError::Unknown(_))
        ));

        let err = tree
            .set_property(root, "visible", Value::Int(1))
            .unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Property(PropertyError::TypeMismatch { .. })
        ));
        assert!(tree.element(root).unwrap().is_visible());
    }

    #[test]
    fn mounted_node_cycles_through_updating_and_back() {
        let mut tree = ElementTree::new();
        let root = tree.create(ElementTag::Container, None).unwrap();
        tree.mount(root).unwrap();
        tree.set_property(root, "width", Value::Float(5.0)).unwrap();
        assert_eq!(tree.element(root).unwrap().phase(), Phase::Mounted);
    }

    #[test]
    fn string_id_index_tracks_property() {
        let mut tree = ElementTree::new();
        let root = tree.create(ElementTag::Container, None).unwrap();
        tree.set_property(root, "id", Value::Str("app".into())).unwrap();
        assert_eq!(tree.find_by_id("app"), Some(root));

        tree.set_property(root, "id", Value::Str("shell".into())).unwrap();
        assert_eq!(tree.find_by_id("app"), None);
        assert_eq!(tree.find_by_id("shell"), Some(root));

        tree.destroy(root).unwrap();
        assert_eq!(tree.find_by_id("shell"), None);
    }

    #[test]
    fn color_strings_are_canonicalized_or_rejected() {
        let mut tree = ElementTree::new();
        let root = tree.create(ElementTag::Container, None).unwrap();
        tree.set_property(root, "background", Value::Str("#336699".into()))
            .unwrap();
        assert_eq!(
            tree.get_property(root, "background"),
            Some(Value::Color(0x336699FF))
        );

        // The truncated 7-digit form is rejected, not silently transparent.
        let err = tree
            .set_property(root, "background", Value::Str("#0000000".into()))
            .unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Property(PropertyError::TypeMismatch { .. })
        ));
        assert_eq!(
            tree.get_property(root, "background"),
            Some(Value::Color(0x336699FF))
        );
    }

    #[test]
    fn bundle_materialization_links_and_binds() {
        let mut bundle = Bundle::new();
        let width = bundle.add_string("width").unwrap();
        let text_prop = bundle.add_string("text").unwrap();
        let path = bundle.add_string("user.name").unwrap();
        let root_name = bundle.add_string("shell").unwrap();
        bundle.add_element(ElementRecord {
            id: 1,
            tag: ElementTag::Column,
            name: Some(root_name),
            parent_id: 0,
            properties: vec![PropertyRecord {
                name: width,
                value: WireValue::Float(80.0),
            }],
            children: vec![2],
        });
        bundle.add_element(ElementRecord {
            id: 2,
            tag: ElementTag::Text,
            name: None,
            parent_id: 1,
            properties: vec![PropertyRecord {
                name: text_prop,
                value: WireValue::Expression(path),
            }],
            children: Vec::new(),
        });
        bundle.validate().unwrap();

        let tree = ElementTree::from_bundle(&bundle, 100, None).unwrap();
        let root = tree.find_by_id("shell").unwrap();
        assert_eq!(tree.element(root).unwrap().children().len(), 1);

        let text = tree.find_by_doc_id(2).unwrap();
        let property = tree.element(text).unwrap().property("text").unwrap();
        let binding = property.binding.as_ref().unwrap();
        assert_eq!(binding.path, "user.name");
        assert_eq!(binding.last, None);
    }

    #[test]
    fn snapshot_round_trips_through_materialize() {
        let mut tree = ElementTree::new();
        let root = tree.create(ElementTag::Container, None).unwrap();
        tree.set_property(root, "id", Value::Str("app".into())).unwrap();
        tree.set_property(root, "width", Value::Float(100.0)).unwrap();
        let child = tree.create(ElementTag::Text, Some(root)).unwrap();
        tree.set_property(child, "text", Value::Str("hello".into()))
            .unwrap();
        tree.bind_property(child, "visible", "ui.show_greeting").unwrap();

        let bundle = tree.snapshot().unwrap();
        bundle.validate().unwrap();
        let restored = ElementTree::from_bundle(&bundle, 100, None).unwrap();

        let restored_root = restored.find_by_id("app").unwrap();
        assert_eq!(
            restored.get_property(restored_root, "width"),
            Some(Value::Float(100.0))
        );
        let restored_child = restored.element(restored_root).unwrap().children()[0];
        assert_eq!(
            restored.get_property(restored_child, "text"),
            Some(Value::Str("hello".into()))
        );
        let binding = restored
            .element(restored_child)
            .unwrap()
            .property("visible")
            .unwrap()
            .binding
            .clone()
            .unwrap();
        assert_eq!(binding.path, "ui.show_greeting");
    }

    #[test]
    fn paths_overlap_in_both_directions() {
        assert!(paths_overlap("user.name", "user.name"));
        assert!(paths_overlap("user.name", "user"));
        assert!(paths_overlap("user", "user.name"));
        assert!(!paths_overlap("user.name", "username"));
        assert!(!paths_overlap("username", "user"));
    }
}
