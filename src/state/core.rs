use std::cell::{Cell, RefCell};

use crate::error::StateError;

/// Plain state data. Object entries keep insertion order so observer
/// notification and serialization stay deterministic.
#[derive(Debug, Clone, PartialEq)]
pub enum StateValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<StateValue>),
    Object(Vec<(String, StateValue)>),
}

impl From<&str> for StateValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for StateValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<i64> for StateValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for StateValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for StateValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

type ObserverFn = Box<dyn FnMut(&StateValue)>;

/// One node of the value tree. Children are owned by their parent and are
/// destroyed with it; observers ride on the node, not the value.
struct StateNode {
    value: NodeValue,
    observers: Vec<(u64, ObserverFn)>,
}

enum NodeValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<StateNode>),
    Object(Vec<(String, StateNode)>),
}

impl StateNode {
    fn leaf(value: NodeValue) -> Self {
        Self {
            value,
            observers: Vec::new(),
        }
    }

    fn from_value(value: StateValue) -> Self {
        let value = match value {
            StateValue::Null => NodeValue::Null,
            StateValue::Bool(v) => NodeValue::Bool(v),
            StateValue::Int(v) => NodeValue::Int(v),
            StateValue::Float(v) => NodeValue::Float(v),
            StateValue::String(v) => NodeValue::String(v),
            StateValue::Array(items) => {
                NodeValue::Array(items.into_iter().map(StateNode::from_value).collect())
            }
            StateValue::Object(entries) => NodeValue::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, StateNode::from_value(v)))
                    .collect(),
            ),
        };
        Self::leaf(value)
    }

    fn to_value(&self) -> StateValue {
        match &self.value {
            NodeValue::Null => StateValue::Null,
            NodeValue::Bool(v) => StateValue::Bool(*v),
            NodeValue::Int(v) => StateValue::Int(*v),
            NodeValue::Float(v) => StateValue::Float(*v),
            NodeValue::String(v) => StateValue::String(v.clone()),
            NodeValue::Array(items) => {
                StateValue::Array(items.iter().map(StateNode::to_value).collect())
            }
            NodeValue::Object(entries) => StateValue::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_value()))
                    .collect(),
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(usize),
}

fn parse_path(path: &str) -> Result<Vec<Segment>, StateError> {
    if path.is_empty() {
        return Err(StateError::InvalidPath(path.to_string()));
    }
    let mut segments = Vec::new();
    for part in path.split('.') {
        if part.is_empty() {
            return Err(StateError::InvalidPath(path.to_string()));
        }
        match part.parse::<usize>() {
            Ok(index) => segments.push(Segment::Index(index)),
            Err(_) => segments.push(Segment::Key(part.to_string())),
        }
    }
    Ok(segments)
}

/// Handle returned by [`StateStore::observe`]; pass it back to
/// [`StateStore::unobserve`] to drop the callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObserverHandle {
    path: String,
    id: u64,
}

/// The reactive store. Confined to the driver thread: interior mutability
/// is `RefCell`/`Cell`, and the raw observer boxes keep the type `!Send`.
pub struct StateStore {
    root: RefCell<StateNode>,
    notify_depth: Cell<u32>,
    next_observer: Cell<u64>,
    changed: RefCell<Vec<String>>,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore {
    pub fn new() -> Self {
        Self {
            root: RefCell::new(StateNode::leaf(NodeValue::Object(Vec::new()))),
            notify_depth: Cell::new(0),
            next_observer: Cell::new(1),
            changed: RefCell::new(Vec::new()),
        }
    }

    /// Replace the value at `path`. The full path must already exist;
    /// intermediates are never created implicitly (use [`define`] for
    /// that). Observers on the node run synchronously, in registration
    /// order, before `set` returns.
    ///
    /// [`define`]: StateStore::define
    pub fn set(&self, path: &str, value: impl Into<StateValue>) -> Result<(), StateError> {
        if self.notify_depth.get() > 0 {
            return Err(StateError::ReentrantWrite);
        }
        let value = value.into();
        let segments = parse_path(path)?;

        let observers = {
            let mut root = self.root.borrow_mut();
            let node = resolve_mut(&mut root, &segments, path)?;
            node.value = StateNode::from_value(value.clone()).value;
            std::mem::take(&mut node.observers)
        };

        self.changed.borrow_mut().push(path.to_string());
        self.notify(path, &segments, observers, &value);
        Ok(())
    }

    /// Explicit auto-vivification: create missing object intermediates
    /// along `path`, then set the leaf. Array segments must already exist.
    pub fn define(&self, path: &str, value: impl Into<StateValue>) -> Result<(), StateError> {
        if self.notify_depth.get() > 0 {
            return Err(StateError::ReentrantWrite);
        }
        let value = value.into();
        let segments = parse_path(path)?;

        let observers = {
            let mut root = self.root.borrow_mut();
            let node = vivify_mut(&mut root, &segments, path)?;
            node.value = StateNode::from_value(value.clone()).value;
            std::mem::take(&mut node.observers)
        };

        self.changed.borrow_mut().push(path.to_string());
        self.notify(path, &segments, observers, &value);
        Ok(())
    }

    pub fn get(&self, path: &str) -> Option<StateValue> {
        let segments = parse_path(path).ok()?;
        let root = self.root.borrow();
        resolve(&root, &segments).map(StateNode::to_value)
    }

    /// Register a change callback on the node at `path`. The node must
    /// exist. Registration during notification is allowed.
    pub fn observe(
        &self,
        path: &str,
        callback: impl FnMut(&StateValue) + 'static,
    ) -> Result<ObserverHandle, StateError> {
        let segments = parse_path(path)?;
        let id = self.next_observer.get();
        self.next_observer.set(id + 1);

        let mut root = self.root.borrow_mut();
        let node = resolve_mut(&mut root, &segments, path)?;
        node.observers.push((id, Box::new(callback)));
        Ok(ObserverHandle {
            path: path.to_string(),
            id,
        })
    }

    /// Drop an observer. Returns false if the node or observer is already
    /// gone (its subtree may have been replaced).
    pub fn unobserve(&self, handle: &ObserverHandle) -> bool {
        let Ok(segments) = parse_path(&handle.path) else {
            return false;
        };
        let mut root = self.root.borrow_mut();
        let Ok(node) = resolve_mut(&mut root, &segments, &handle.path) else {
            return false;
        };
        let before = node.observers.len();
        node.observers.retain(|(id, _)| *id != handle.id);
        node.observers.len() != before
    }

    /// Paths written since the last call, in write order, deduplicated.
    /// The runtime's reconcile step drains this once per frame.
    pub fn take_changed(&self) -> Vec<String> {
        let mut raw = self.changed.borrow_mut();
        let mut seen = std::collections::HashSet::new();
        raw.drain(..)
            .filter(|path| seen.insert(path.clone()))
            .collect()
    }

    pub fn has_changes(&self) -> bool {
        !self.changed.borrow().is_empty()
    }

    fn notify(
        &self,
        path: &str,
        segments: &[Segment],
        mut observers: Vec<(u64, ObserverFn)>,
        value: &StateValue,
    ) {
        if observers.is_empty() {
            return;
        }
        self.notify_depth.set(self.notify_depth.get() + 1);
        for (_, callback) in observers.iter_mut() {
            callback(value);
        }
        self.notify_depth.set(self.notify_depth.get() - 1);

        // Put the taken list back, keeping any observers registered during
        // notification behind the existing ones.
        let mut root = self.root.borrow_mut();
        if let Ok(node) = resolve_mut(&mut root, segments, path) {
            let fresh = std::mem::take(&mut node.observers);
            observers.extend(fresh);
            node.observers = observers;
        }
    }
}

fn resolve<'a>(root: &'a StateNode, segments: &[Segment]) -> Option<&'a StateNode> {
    let mut current = root;
    for segment in segments {
        current = match (&current.value, segment) {
            (NodeValue::Object(entries), Segment::Key(key)) => {
                entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)?
            }
            (NodeValue::Array(items), Segment::Index(index)) => items.get(*index)?,
            _ => return None,
        };
    }
    Some(current)
}

fn resolve_mut<'a>(
    root: &'a mut StateNode,
    segments: &[Segment],
    path: &str,
) -> Result<&'a mut StateNode, StateError> {
    let mut current = root;
    for segment in segments {
        current = match (&mut current.value, segment) {
            (NodeValue::Object(entries), Segment::Key(key)) => entries
                .iter_mut()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v)
                .ok_or_else(|| StateError::PathNotFound(path.to_string()))?,
            (NodeValue::Array(items), Segment::Index(index)) => items
                .get_mut(*index)
                .ok_or_else(|| StateError::IndexOutOfRange {
                    path: path.to_string(),
                    index: *index,
                })?,
            (_, Segment::Key(_)) | (_, Segment::Index(_)) => {
                return Err(StateError::NotAContainer(path.to_string()));
            }
        };
    }
    Ok(current)
}

fn vivify_mut<'a>(
    root: &'a mut StateNode,
    segments: &[Segment],
    path: &str,
) -> Result<&'a mut StateNode, StateError> {
    let mut current = root;
    for segment in segments {
        match segment {
            Segment::Key(key) => {
                if matches!(current.value, NodeValue::Null) {
                    current.value = NodeValue::Object(Vec::new());
                }
                let NodeValue::Object(entries) = &mut current.value else {
                    return Err(StateError::NotAContainer(path.to_string()));
                };
                let position = entries.iter().position(|(k, _)| k == key);
                let index = match position {
                    Some(index) => index,
                    None => {
                        entries.push((key.clone(), StateNode::leaf(NodeValue::Null)));
                        entries.len() - 1
                    }
                };
                current = &mut entries[index].1;
            }
            Segment::Index(index) => {
                let NodeValue::Array(items) = &mut current.value else {
                    return Err(StateError::NotAContainer(path.to_string()));
                };
                current = items
                    .get_mut(*index)
                    .ok_or_else(|| StateError::IndexOutOfRange {
                        path: path.to_string(),
                        index: *index,
                    })?;
            }
        }
    }
    Ok(current)
}
