use crate::bundle::ElementTag;
use crate::tree::{ElementId, ElementTree, Value};

use super::text::measure_text;

/// Run the layout pass over every root. Only subtrees carrying dirt (or
/// repositioned by a dirty ancestor) are recomputed; clean, unmoved
/// subtrees return their cached boxes without recursing. Clears
/// `needs_layout` and the descendant marker as it goes.
pub fn compute_layout(tree: &mut ElementTree, viewport: (f32, f32)) {
    for root in tree.roots() {
        solve(tree, root, 0.0, 0.0, viewport.0, viewport.1);
    }
}

fn solve(
    tree: &mut ElementTree,
    id: ElementId,
    x: f32,
    y: f32,
    avail_w: f32,
    avail_h: f32,
) -> (f32, f32) {
    let Some(node) = tree.element(id) else {
        return (0.0, 0.0);
    };

    let moved = node.layout.x != x || node.layout.y != y;
    if !node.needs_layout && !node.descendant_dirty && !moved {
        return (node.layout.width, node.layout.height);
    }

    if !node.is_visible() {
        // Collapsed: takes no space, children keep their stale boxes until
        // the node is shown again (which re-marks layout).
        let node = tree.node_mut(id).expect("live node");
        node.layout.x = x;
        node.layout.y = y;
        node.layout.width = 0.0;
        node.layout.height = 0.0;
        node.needs_layout = false;
        node.descendant_dirty = false;
        return (0.0, 0.0);
    }

    let tag = node.tag();
    let fixed_w = node.float_property("width");
    let fixed_h = node.float_property("height");
    let padding = node.layout.padding;
    let children: Vec<ElementId> = node.children.clone();

    let inner_x = x + padding.left;
    let inner_y = y + padding.top;
    let inner_w = (fixed_w.unwrap_or(avail_w) - padding.horizontal()).max(0.0);
    let inner_h = (fixed_h.unwrap_or(avail_h) - padding.vertical()).max(0.0);

    let (content_w, content_h) = match tag {
        ElementTag::Row => {
            let mut cursor = inner_x;
            let mut tallest = 0.0f32;
            for child in &children {
                let margin = child_margin(tree, *child);
                let (cw, ch) = solve(
                    tree,
                    *child,
                    cursor + margin.left,
                    inner_y + margin.top,
                    inner_w,
                    inner_h,
                );
                cursor += margin.left + cw + margin.right;
                tallest = tallest.max(ch + margin.vertical());
            }
            (cursor - inner_x, tallest)
        }
        ElementTag::Column | ElementTag::List => {
            let mut cursor = inner_y;
            let mut widest = 0.0f32;
            for child in &children {
                let margin = child_margin(tree, *child);
                let (cw, ch) = solve(
                    tree,
                    *child,
                    inner_x + margin.left,
                    cursor + margin.top,
                    inner_w,
                    inner_h,
                );
                cursor += margin.top + ch + margin.bottom;
                widest = widest.max(cw + margin.horizontal());
            }
            (widest, cursor - inner_y)
        }
        // Custom tags with children behave like a stack so their subtrees
        // still resolve and settle their dirty flags.
        _ if !children.is_empty() => {
            let mut widest = 0.0f32;
            let mut tallest = 0.0f32;
            for child in &children {
                let margin = child_margin(tree, *child);
                let (cw, ch) = solve(
                    tree,
                    *child,
                    inner_x + margin.left,
                    inner_y + margin.top,
                    inner_w,
                    inner_h,
                );
                widest = widest.max(cw + margin.horizontal());
                tallest = tallest.max(ch + margin.vertical());
            }
            (widest, tallest)
        }
        _ => measure_leaf(tree, id),
    };

    let width = fixed_w.unwrap_or(content_w + padding.horizontal());
    let height = fixed_h.unwrap_or(content_h + padding.vertical());

    let node = tree.node_mut(id).expect("live node");
    node.layout.x = x;
    node.layout.y = y;
    node.layout.width = width;
    node.layout.height = height;
    node.needs_layout = false;
    node.descendant_dirty = false;
    (width, height)
}

fn child_margin(tree: &ElementTree, id: ElementId) -> crate::tree::Edges {
    tree.element(id).map(|n| n.layout.margin).unwrap_or_default()
}

fn measure_leaf(tree: &ElementTree, id: ElementId) -> (f32, f32) {
    let Some(node) = tree.element(id) else {
        return (0.0, 0.0);
    };
    match node.property_value("text") {
        Some(Value::Str(text)) => {
            let (w, h) = measure_text(text);
            // Interactive leaves reserve a cell either side of their label.
            match node.tag() {
                ElementTag::Button | ElementTag::Input => (w + 2.0, h.max(1.0)),
                _ => (w, h),
            }
        }
        _ => match node.tag() {
            ElementTag::Checkbox => (1.0, 1.0),
            ElementTag::Input | ElementTag::Button => (2.0, 1.0),
            _ => (0.0, 0.0),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Edges;

    fn build_row() -> (ElementTree, ElementId, ElementId, ElementId) {
        let mut tree = ElementTree::new();
        let root = tree.create(ElementTag::Row, None).unwrap();
        let a = tree.create(ElementTag::Text, Some(root)).unwrap();
        let b = tree.create(ElementTag::Text, Some(root)).unwrap();
        tree.set_property(a, "text", Value::Str("abc".into())).unwrap();
        tree.set_property(b, "text", Value::Str("defgh".into())).unwrap();
        tree.mount(root).unwrap();
        (tree, root, a, b)
    }

    #[test]
    fn row_places_children_left_to_right() {
        let (mut tree, root, a, b) = build_row();
        compute_layout(&mut tree, (80.0, 24.0));

        let la = tree.element(a).unwrap().layout();
        let lb = tree.element(b).unwrap().layout();
        assert_eq!(la.x, 0.0);
        assert_eq!(la.width, 3.0);
        assert_eq!(lb.x, 3.0);
        assert_eq!(lb.width, 5.0);

        // Auto row derives its size from its children.
        let lr = tree.element(root).unwrap().layout();
        assert_eq!(lr.width, 8.0);
        assert_eq!(lr.height, 1.0);
        assert!(!tree.element(root).unwrap().needs_layout());
    }

    #[test]
    fn fixed_size_overrides_content() {
        let (mut tree, root, _a, _b) = build_row();
        tree.set_property(root, "width", Value::Float(40.0)).unwrap();
        tree.set_property(root, "height", Value::Float(3.0)).unwrap();
        compute_layout(&mut tree, (80.0, 24.0));

        let lr = tree.element(root).unwrap().layout();
        assert_eq!((lr.width, lr.height), (40.0, 3.0));
    }

    #[test]
    fn padding_offsets_children_and_grows_auto_size() {
        let mut tree = ElementTree::new();
        let root = tree.create(ElementTag::Column, None).unwrap();
        tree.set_property(root, "padding", Value::Padding(Edges::uniform(2.0)))
            .unwrap();
        let child = tree.create(ElementTag::Text, Some(root)).unwrap();
        tree.set_property(child, "text", Value::Str("hi".into())).unwrap();
        tree.mount(root).unwrap();

        compute_layout(&mut tree, (80.0, 24.0));
        let lc = tree.element(child).unwrap().layout();
        assert_eq!((lc.x, lc.y), (2.0, 2.0));
        let lr = tree.element(root).unwrap().layout();
        assert_eq!((lr.width, lr.height), (6.0, 5.0));
    }

    #[test]
    fn margins_separate_siblings() {
        let mut tree = ElementTree::new();
        let root = tree.create(ElementTag::Column, None).unwrap();
        let a = tree.create(ElementTag::Text, Some(root)).unwrap();
        let b = tree.create(ElementTag::Text, Some(root)).unwrap();
        tree.set_property(a, "text", Value::Str("a".into())).unwrap();
        tree.set_property(
            a,
            "margin",
            Value::Margin(Edges {
                top: 0.0,
                right: 0.0,
                bottom: 2.0,
                left: 0.0,
            }),
        )
        .unwrap();
        tree.set_property(b, "text", Value::Str("b".into())).unwrap();
        tree.mount(root).unwrap();

        compute_layout(&mut tree, (80.0, 24.0));
        assert_eq!(tree.element(a).unwrap().layout().y, 0.0);
        assert_eq!(tree.element(b).unwrap().layout().y, 3.0);
        assert_eq!(tree.element(root).unwrap().layout().height, 4.0);
    }

    #[test]
    fn clean_subtrees_keep_cached_boxes() {
        let (mut tree, root, a, b) = build_row();
        compute_layout(&mut tree, (80.0, 24.0));

        // Only `b` changes; `a` is clean and unmoved.
        tree.set_property(b, "text", Value::Str("defghij".into())).unwrap();
        compute_layout(&mut tree, (80.0, 24.0));

        assert_eq!(tree.element(a).unwrap().layout().width, 3.0);
        assert_eq!(tree.element(b).unwrap().layout().width, 7.0);
        assert_eq!(tree.element(root).unwrap().layout().width, 10.0);
        assert!(!tree.element(root).unwrap().needs_layout());
        assert!(!tree.element(b).unwrap().needs_layout());
    }

    #[test]
    fn invisible_nodes_collapse() {
        let (mut tree, root, a, _b) = build_row();
        tree.set_property(a, "visible", Value::Bool(false)).unwrap();
        compute_layout(&mut tree, (80.0, 24.0));

        assert_eq!(tree.element(a).unwrap().layout().width, 0.0);
        assert_eq!(tree.element(root).unwrap().layout().width, 5.0);
    }
}
