use crate::bundle::ElementTag;
use crate::tree::{ElementId, ElementTree, Value};

/// Draw intents, emitted in paint order: parent before children, siblings
/// in child-array order. The runtime decides *when* to draw; backends
/// decide *how*.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Rect {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        color: u32,
    },
    Text {
        x: f32,
        y: f32,
        content: String,
        color: u32,
    },
    Image {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        src: String,
    },
    BeginContainer {
        id: u32,
    },
    EndContainer,
    PushClip {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    },
    PopClip,
    Widget {
        id: u32,
        kind: &'static str,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        label: Option<String>,
        enabled: bool,
    },
}

/// Backend capability set. One implementation per target.
pub trait Renderer {
    fn begin_frame(&mut self);
    fn execute(&mut self, commands: &[DrawCommand]);
    fn end_frame(&mut self);
    fn resize(&mut self, width: f32, height: f32) {
        let _ = (width, height);
    }
}

/// Test/bench backend that records every frame it executes.
#[derive(Debug, Default)]
pub struct CollectRenderer {
    pub frames: Vec<Vec<DrawCommand>>,
    current: Vec<DrawCommand>,
    in_frame: bool,
}

impl CollectRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_frame(&self) -> Option<&[DrawCommand]> {
        self.frames.last().map(|f| f.as_slice())
    }
}

impl Renderer for CollectRenderer {
    fn begin_frame(&mut self) {
        self.current.clear();
        self.in_frame = true;
    }

    fn execute(&mut self, commands: &[DrawCommand]) {
        self.current.extend_from_slice(commands);
    }

    fn end_frame(&mut self) {
        self.in_frame = false;
        self.frames.push(std::mem::take(&mut self.current));
    }
}

const DEFAULT_FOREGROUND: u32 = 0xFFFF_FFFF;

/// Walk the tree in paint order and emit commands for every subtree
/// containing a repaint-marked node. `needs_render` is cleared as emitted.
pub fn emit_draw_commands(tree: &mut ElementTree) -> Vec<DrawCommand> {
    let mut commands = Vec::new();
    for root in tree.roots() {
        emit_node(tree, root, &mut commands, false);
    }
    commands
}

fn emit_node(
    tree: &mut ElementTree,
    id: ElementId,
    out: &mut Vec<DrawCommand>,
    ancestor_dirty: bool,
) {
    let Some(node) = tree.element(id) else { return };
    if !node.is_visible() {
        // An invisible subtree paints nothing; its dirt is consumed so it
        // does not re-trigger frames.
        clear_render_flags(tree, id);
        return;
    }

    let dirty = ancestor_dirty || node.needs_render();
    let children: Vec<ElementId> = node.children().to_vec();

    if dirty {
        emit_element(tree, id, out);
    }
    let is_container = tree
        .element(id)
        .map(|n| n.tag().is_container())
        .unwrap_or(false);

    for child in children {
        emit_node(tree, child, out, dirty);
    }

    if dirty && is_container {
        out.push(DrawCommand::PopClip);
        out.push(DrawCommand::EndContainer);
    }

    if let Some(node) = tree.node_mut(id) {
        node.needs_render = false;
    }
}

fn emit_element(tree: &ElementTree, id: ElementId, out: &mut Vec<DrawCommand>) {
    let Some(node) = tree.element(id) else { return };
    let layout = node.layout();
    let style = node.style();

    match node.tag() {
        tag if tag.is_container() => {
            out.push(DrawCommand::BeginContainer { id: node.doc_id() });
            if let Some(color) = style.background {
                out.push(DrawCommand::Rect {
                    x: layout.x,
                    y: layout.y,
                    width: layout.width,
                    height: layout.height,
                    color,
                });
            }
            out.push(DrawCommand::PushClip {
                x: layout.x,
                y: layout.y,
                width: layout.width,
                height: layout.height,
            });
        }
        ElementTag::Text => {
            let content = match node.property_value("text") {
                Some(Value::Str(text)) => text.clone(),
                _ => String::new(),
            };
            out.push(DrawCommand::Text {
                x: layout.x,
                y: layout.y,
                content,
                color: style.foreground.unwrap_or(DEFAULT_FOREGROUND),
            });
        }
        ElementTag::Image => {
            let src = match node.property_value("src") {
                Some(Value::Str(src)) => src.clone(),
                _ => String::new(),
            };
            out.push(DrawCommand::Image {
                x: layout.x,
                y: layout.y,
                width: layout.width,
                height: layout.height,
                src,
            });
        }
        tag => {
            let label = node.property_value("text").and_then(|v| match v {
                Value::Str(s) => Some(s.clone()),
                _ => None,
            });
            out.push(DrawCommand::Widget {
                id: node.doc_id(),
                kind: tag.name(),
                x: layout.x,
                y: layout.y,
                width: layout.width,
                height: layout.height,
                label,
                enabled: node.is_enabled(),
            });
        }
    }
}

fn clear_render_flags(tree: &mut ElementTree, id: ElementId) {
    let Some(node) = tree.node_mut(id) else { return };
    node.needs_render = false;
    let children = node.children.clone();
    for child in children {
        clear_render_flags(tree, child);
    }
}
