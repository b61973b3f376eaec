use std::str::FromStr;
use std::time::Instant;

use crate::error::{QueueFull, ShortcutParseError};
use crate::state::StateStore;
use crate::tree::{ElementId, ElementTree};

use super::queue::EventQueue;
use super::types::{Event, EventPayload, EventType, KeyCode, KeyEvent, Modifiers};

/// Which traversal phase a listener participates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchPhase {
    /// Root-to-target, fired before any bubble listener.
    Capture,
    /// Target-to-root.
    Bubble,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShortcutId(u64);

/// Mutable surface handed to handlers; listeners mutate the tree and read
/// state through it rather than capturing aliased references.
pub struct EventContext<'a> {
    pub tree: &'a mut ElementTree,
    pub state: &'a StateStore,
}

type Handler = Box<dyn FnMut(&mut EventContext<'_>, &mut Event)>;

struct Listener {
    id: ListenerId,
    event_type: EventType,
    element: Option<ElementId>,
    phase: DispatchPhase,
    handler: Handler,
}

struct Shortcut {
    id: ShortcutId,
    combo: KeyCombo,
    handler: Handler,
}

/// A parsed key combination (`"Ctrl+Shift+S"`). Matching is exact-set
/// equality over the modifier state captured at key-down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyCombo {
    pub code: KeyCode,
    pub modifiers: Modifiers,
}

impl KeyCombo {
    pub fn new(code: KeyCode, modifiers: Modifiers) -> Self {
        let code = match code {
            KeyCode::Char(c) => KeyCode::Char(c.to_ascii_lowercase()),
            other => other,
        };
        Self { code, modifiers }
    }

    pub fn matches(&self, key: &KeyEvent) -> bool {
        if self.modifiers != key.modifiers {
            return false;
        }
        match (self.code, key.code) {
            (KeyCode::Char(a), KeyCode::Char(b)) => a == b.to_ascii_lowercase(),
            (a, b) => a == b,
        }
    }
}

impl FromStr for KeyCombo {
    type Err = ShortcutParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = input.split('+').map(str::trim).collect();
        let (key_token, modifier_tokens) = parts.split_last().ok_or(ShortcutParseError::Empty)?;
        if key_token.is_empty() {
            return Err(ShortcutParseError::Empty);
        }

        let mut modifiers = Modifiers::NONE;
        for token in modifier_tokens {
            let flag = match token.to_ascii_lowercase().as_str() {
                "ctrl" | "control" => &mut modifiers.ctrl,
                "shift" => &mut modifiers.shift,
                "alt" | "option" => &mut modifiers.alt,
                "meta" | "cmd" | "super" | "win" => &mut modifiers.meta,
                _ => return Err(ShortcutParseError::UnknownKey(token.to_string())),
            };
            if *flag {
                return Err(ShortcutParseError::DuplicateModifier(token.to_string()));
            }
            *flag = true;
        }

        let code = parse_key_token(key_token)?;
        Ok(Self::new(code, modifiers))
    }
}

fn parse_key_token(token: &str) -> Result<KeyCode, ShortcutParseError> {
    let lower = token.to_ascii_lowercase();
    if let Some(rest) = lower.strip_prefix('f') {
        if let Ok(n) = rest.parse::<u8>() {
            if (1..=24).contains(&n) {
                return Ok(KeyCode::F(n));
            }
        }
    }
    let mut chars = token.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        return Ok(KeyCode::Char(c.to_ascii_lowercase()));
    }
    Ok(match lower.as_str() {
        "enter" | "return" => KeyCode::Enter,
        "esc" | "escape" => KeyCode::Escape,
        "tab" => KeyCode::Tab,
        "space" => KeyCode::Char(' '),
        "backspace" => KeyCode::Backspace,
        "delete" | "del" => KeyCode::Delete,
        "insert" => KeyCode::Insert,
        "home" => KeyCode::Home,
        "end" => KeyCode::End,
        "pageup" => KeyCode::PageUp,
        "pagedown" => KeyCode::PageDown,
        "left" => KeyCode::Left,
        "right" => KeyCode::Right,
        "up" => KeyCode::Up,
        "down" => KeyCode::Down,
        _ => return Err(ShortcutParseError::UnknownKey(token.to_string())),
    })
}

/// The event pipeline: a bounded queue, per-type listeners with an
/// explicit capture/bubble phase, and global key shortcuts.
pub struct EventDispatcher {
    queue: EventQueue,
    listeners: Vec<Listener>,
    shortcuts: Vec<Shortcut>,
    next_id: u64,
    epoch: Instant,
}

impl EventDispatcher {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            queue: EventQueue::new(queue_capacity),
            listeners: Vec::new(),
            shortcuts: Vec::new(),
            next_id: 1,
            epoch: Instant::now(),
        }
    }

    /// Queue an event for the next `process_all`. The timestamp is stamped
    /// here so queue order and time order agree.
    pub fn push(&mut self, mut event: Event) -> Result<(), QueueFull> {
        event.timestamp_ms = self.epoch.elapsed().as_millis() as u64;
        self.queue.push(event)
    }

    pub fn poll(&mut self) -> Option<Event> {
        self.queue.poll()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Register a listener. `element: None` makes it global: it observes
    /// every event of the type ahead of the capture walk. Handler context
    /// lives in the closure.
    pub fn add_listener(
        &mut self,
        event_type: EventType,
        element: Option<ElementId>,
        phase: DispatchPhase,
        handler: impl FnMut(&mut EventContext<'_>, &mut Event) + 'static,
    ) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push(Listener {
            id,
            event_type,
            element,
            phase,
            handler: Box::new(handler),
        });
        id
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|l| l.id != id);
        self.listeners.len() != before
    }

    /// Drop every listener owned by an element; called when the element is
    /// torn down.
    pub fn remove_listeners_for(&mut self, element: ElementId) -> usize {
        let before = self.listeners.len();
        self.listeners.retain(|l| l.element != Some(element));
        before - self.listeners.len()
    }

    pub fn register_shortcut(
        &mut self,
        combo: KeyCombo,
        handler: impl FnMut(&mut EventContext<'_>, &mut Event) + 'static,
    ) -> ShortcutId {
        let id = ShortcutId(self.next_id);
        self.next_id += 1;
        self.shortcuts.push(Shortcut {
            id,
            combo,
            handler: Box::new(handler),
        });
        id
    }

    pub fn remove_shortcut(&mut self, id: ShortcutId) -> bool {
        let before = self.shortcuts.len();
        self.shortcuts.retain(|s| s.id != id);
        self.shortcuts.len() != before
    }

    /// Drain the queue in FIFO order, dispatching each event through both
    /// phases before the next is dequeued. Returns the number of events
    /// dispatched.
    pub fn process_all(&mut self, tree: &mut ElementTree, state: &StateStore) -> usize {
        let mut dispatched = 0;
        while let Some(event) = self.queue.poll() {
            self.dispatch(event, tree, state);
            dispatched += 1;
        }
        dispatched
    }

    /// Dispatch one event to completion: shortcuts (key-down only), global
    /// listeners, then capture root→target and bubble target→root. Any
    /// listener marking the event handled halts the remaining walk.
    pub fn dispatch(
        &mut self,
        mut event: Event,
        tree: &mut ElementTree,
        state: &StateStore,
    ) -> bool {
        let event_type = event.event_type();

        if event_type == EventType::KeyDown {
            if let EventPayload::Key(key) = &event.payload {
                let key = *key;
                self.fire_shortcuts(&key, tree, state, &mut event);
                if event.handled {
                    return true;
                }
            }
        }

        self.fire_matching(None, DispatchPhase::Capture, event_type, tree, state, &mut event);
        if event.handled {
            return true;
        }

        if let Some(target) = event.target {
            let mut path = tree.path_to_root(target);
            path.reverse(); // root first

            for element in &path {
                self.fire_matching(
                    Some(*element),
                    DispatchPhase::Capture,
                    event_type,
                    tree,
                    state,
                    &mut event,
                );
                if event.handled {
                    return true;
                }
            }
            for element in path.iter().rev() {
                self.fire_matching(
                    Some(*element),
                    DispatchPhase::Bubble,
                    event_type,
                    tree,
                    state,
                    &mut event,
                );
                if event.handled {
                    return true;
                }
            }
        }
        event.handled
    }

    fn fire_shortcuts(
        &mut self,
        key: &KeyEvent,
        tree: &mut ElementTree,
        state: &StateStore,
        event: &mut Event,
    ) {
        for i in 0..self.shortcuts.len() {
            if !self.shortcuts[i].combo.matches(key) {
                continue;
            }
            let mut ctx = EventContext {
                tree: &mut *tree,
                state,
            };
            (self.shortcuts[i].handler)(&mut ctx, event);
            if event.handled {
                break;
            }
        }
    }

    fn fire_matching(
        &mut self,
        element: Option<ElementId>,
        phase: DispatchPhase,
        event_type: EventType,
        tree: &mut ElementTree,
        state: &StateStore,
        event: &mut Event,
    ) {
        for i in 0..self.listeners.len() {
            {
                let listener = &self.listeners[i];
                let matches = listener.event_type == event_type
                    && listener.element == element
                    && (element.is_none() || listener.phase == phase);
                if !matches {
                    continue;
                }
            }
            let mut ctx = EventContext {
                tree: &mut *tree,
                state,
            };
            (self.listeners[i].handler)(&mut ctx, event);
            if event.handled {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::ElementTag;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn fixture() -> (ElementTree, StateStore, ElementId, ElementId, ElementId) {
        let mut tree = ElementTree::new();
        let root = tree.create(ElementTag::Container, None).unwrap();
        let middle = tree.create(ElementTag::Column, Some(root)).unwrap();
        let leaf = tree.create(ElementTag::Button, Some(middle)).unwrap();
        tree.mount(root).unwrap();
        (tree, StateStore::new(), root, middle, leaf)
    }

    #[test]
    fn capture_fires_root_first_then_bubble_target_first() {
        let (mut tree, state, root, middle, leaf) = fixture();
        let mut dispatcher = EventDispatcher::new(8);
        let order: Rc<RefCell<Vec<&'static str>>> = Rc::default();

        for (element, phase, label) in [
            (leaf, DispatchPhase::Bubble, "leaf-bubble"),
            (root, DispatchPhase::Capture, "root-capture"),
            (middle, DispatchPhase::Bubble, "middle-bubble"),
            (middle, DispatchPhase::Capture, "middle-capture"),
            (root, DispatchPhase::Bubble, "root-bubble"),
        ] {
            let log = Rc::clone(&order);
            dispatcher.add_listener(EventType::Click, Some(element), phase, move |_, _| {
                log.borrow_mut().push(label);
            });
        }

        dispatcher.dispatch(Event::click(leaf, 0.0, 0.0), &mut tree, &state);
        assert_eq!(
            order.borrow().as_slice(),
            &[
                "root-capture",
                "middle-capture",
                "leaf-bubble",
                "middle-bubble",
                "root-bubble",
            ]
        );
    }

    #[test]
    fn handled_in_capture_suppresses_bubble() {
        let (mut tree, state, root, _middle, leaf) = fixture();
        let mut dispatcher = EventDispatcher::new(8);
        let order: Rc<RefCell<Vec<&'static str>>> = Rc::default();

        let log = Rc::clone(&order);
        dispatcher.add_listener(
            EventType::Click,
            Some(root),
            DispatchPhase::Capture,
            move |_, event| {
                log.borrow_mut().push("capture");
                event.mark_handled();
            },
        );
        let log = Rc::clone(&order);
        dispatcher.add_listener(
            EventType::Click,
            Some(root),
            DispatchPhase::Bubble,
            move |_, _| {
                log.borrow_mut().push("bubble");
            },
        );

        let handled = dispatcher.dispatch(Event::click(leaf, 0.0, 0.0), &mut tree, &state);
        assert!(handled);
        assert_eq!(order.borrow().as_slice(), &["capture"]);
    }

    #[test]
    fn global_listener_runs_before_capture_walk() {
        let (mut tree, state, root, _middle, leaf) = fixture();
        let mut dispatcher = EventDispatcher::new(8);
        let order: Rc<RefCell<Vec<&'static str>>> = Rc::default();

        let log = Rc::clone(&order);
        dispatcher.add_listener(
            EventType::Click,
            Some(root),
            DispatchPhase::Capture,
            move |_, _| log.borrow_mut().push("root"),
        );
        let log = Rc::clone(&order);
        dispatcher.add_listener(EventType::Click, None, DispatchPhase::Capture, move |_, _| {
            log.borrow_mut().push("global")
        });

        dispatcher.dispatch(Event::click(leaf, 0.0, 0.0), &mut tree, &state);
        assert_eq!(order.borrow().as_slice(), &["global", "root"]);
    }

    #[test]
    fn listeners_can_mutate_tree_and_read_state() {
        let (mut tree, state, _root, _middle, leaf) = fixture();
        state.define("ui.label", "pressed").unwrap();
        let mut dispatcher = EventDispatcher::new(8);

        dispatcher.add_listener(
            EventType::Click,
            Some(leaf),
            DispatchPhase::Bubble,
            move |ctx, event| {
                let label = match ctx.state.get("ui.label") {
                    Some(crate::state::StateValue::String(s)) => s,
                    _ => "?".to_string(),
                };
                let target = event.target.unwrap();
                ctx.tree
                    .set_property(target, "text", crate::tree::Value::Str(label))
                    .unwrap();
                event.mark_handled();
            },
        );

        dispatcher.dispatch(Event::click(leaf, 0.0, 0.0), &mut tree, &state);
        assert_eq!(
            tree.get_property(leaf, "text"),
            Some(crate::tree::Value::Str("pressed".into()))
        );
    }

    #[test]
    fn process_all_drains_fifo_completely() {
        let (mut tree, state, _root, _middle, leaf) = fixture();
        let mut dispatcher = EventDispatcher::new(8);
        let seen: Rc<RefCell<Vec<u64>>> = Rc::default();

        let log = Rc::clone(&seen);
        dispatcher.add_listener(
            EventType::Click,
            Some(leaf),
            DispatchPhase::Bubble,
            move |_, event| log.borrow_mut().push(event.timestamp_ms),
        );

        for _ in 0..3 {
            dispatcher.push(Event::click(leaf, 0.0, 0.0)).unwrap();
        }
        let dispatched = dispatcher.process_all(&mut tree, &state);
        assert_eq!(dispatched, 3);
        assert_eq!(seen.borrow().len(), 3);
        assert!(seen.borrow().windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(dispatcher.queue_len(), 0);
    }

    #[test]
    fn combo_parsing_and_exact_matching() {
        let combo: KeyCombo = "Ctrl+S".parse().unwrap();
        assert_eq!(combo.code, KeyCode::Char('s'));
        assert!(combo.modifiers.ctrl);

        let plain = KeyEvent {
            kind: super::super::types::KeyKind::Down,
            code: KeyCode::Char('s'),
            modifiers: Modifiers::CTRL,
        };
        assert!(combo.matches(&plain));

        let with_shift = KeyEvent {
            modifiers: Modifiers {
                ctrl: true,
                shift: true,
                ..Modifiers::NONE
            },
            ..plain
        };
        assert!(!combo.matches(&with_shift), "subset match is forbidden");

        assert!(matches!(
            "Ctrl+".parse::<KeyCombo>(),
            Err(ShortcutParseError::Empty)
        ));
        assert!(matches!(
            "Ctrl+Ctrl+S".parse::<KeyCombo>(),
            Err(ShortcutParseError::DuplicateModifier(_))
        ));
        assert!(matches!(
            "Hyper+S".parse::<KeyCombo>(),
            Err(ShortcutParseError::UnknownKey(_))
        ));

        let fkey: KeyCombo = "Alt+F4".parse().unwrap();
        assert_eq!(fkey.code, KeyCode::F(4));
        assert!(fkey.modifiers.alt);
    }

    #[test]
    fn handled_shortcut_suppresses_tree_dispatch() {
        let (mut tree, state, _root, _middle, leaf) = fixture();
        let mut dispatcher = EventDispatcher::new(8);
        let order: Rc<RefCell<Vec<&'static str>>> = Rc::default();

        let log = Rc::clone(&order);
        dispatcher.register_shortcut("Ctrl+S".parse().unwrap(), move |_, event| {
            log.borrow_mut().push("shortcut");
            event.mark_handled();
        });
        let log = Rc::clone(&order);
        dispatcher.add_listener(
            EventType::KeyDown,
            Some(leaf),
            DispatchPhase::Bubble,
            move |_, _| log.borrow_mut().push("listener"),
        );

        let event = Event::key_down(KeyCode::Char('s'), Modifiers::CTRL).with_target(leaf);
        dispatcher.dispatch(event, &mut tree, &state);
        assert_eq!(order.borrow().as_slice(), &["shortcut"]);

        // Unmatched modifiers fall through to the tree walk.
        let order2 = Rc::clone(&order);
        order2.borrow_mut().clear();
        let event = Event::key_down(
            KeyCode::Char('s'),
            Modifiers {
                ctrl: true,
                shift: true,
                ..Modifiers::NONE
            },
        )
        .with_target(leaf);
        dispatcher.dispatch(event, &mut tree, &state);
        assert_eq!(order.borrow().as_slice(), &["listener"]);
    }

    #[test]
    fn removed_listener_no_longer_fires() {
        let (mut tree, state, _root, _middle, leaf) = fixture();
        let mut dispatcher = EventDispatcher::new(8);
        let calls = Rc::new(RefCell::new(0u32));

        let probe = Rc::clone(&calls);
        let id = dispatcher.add_listener(
            EventType::Click,
            Some(leaf),
            DispatchPhase::Bubble,
            move |_, _| *probe.borrow_mut() += 1,
        );

        dispatcher.dispatch(Event::click(leaf, 0.0, 0.0), &mut tree, &state);
        assert!(dispatcher.remove_listener(id));
        assert!(!dispatcher.remove_listener(id));
        dispatcher.dispatch(Event::click(leaf, 0.0, 0.0), &mut tree, &state);
        assert_eq!(*calls.borrow(), 1);
    }
}
