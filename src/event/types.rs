use crate::tree::ElementId;

/// Exact modifier state captured at key-down time. Shortcut matching is
/// set equality, not subset: Ctrl+S does not fire Ctrl+Shift+S handlers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Modifiers {
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
    pub meta: bool,
}

impl Modifiers {
    pub const NONE: Self = Self {
        ctrl: false,
        shift: false,
        alt: false,
        meta: false,
    };

    pub const CTRL: Self = Self {
        ctrl: true,
        shift: false,
        alt: false,
        meta: false,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCode {
    Char(char),
    Enter,
    Escape,
    Tab,
    Backspace,
    Delete,
    Insert,
    Home,
    End,
    PageUp,
    PageDown,
    Left,
    Right,
    Up,
    Down,
    F(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Down,
    Up,
    Press,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyEvent {
    pub kind: KeyKind,
    pub code: KeyCode,
    pub modifiers: Modifiers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseKind {
    Down,
    Up,
    Move,
    Enter,
    Leave,
    Click,
    DoubleClick,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MouseEvent {
    pub kind: MouseKind,
    pub x: f32,
    pub y: f32,
    pub button: Option<MouseButton>,
    pub modifiers: Modifiers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchPhase {
    Start,
    Move,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TouchEvent {
    pub phase: TouchPhase,
    pub x: f32,
    pub y: f32,
    pub id: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WindowEvent {
    Resized { width: f32, height: f32 },
    FocusGained,
    FocusLost,
    CloseRequested,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidgetKind {
    Change,
    Input,
    Submit,
    Focus,
    Blur,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WidgetEvent {
    pub kind: WidgetKind,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CustomEvent {
    pub name: String,
    pub detail: serde_json::Value,
}

/// Category-specific payloads behind one tagged union.
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    Window(WindowEvent),
    Mouse(MouseEvent),
    Key(KeyEvent),
    Touch(TouchEvent),
    Widget(WidgetEvent),
    Custom(CustomEvent),
}

/// Registration discriminant: which payloads a listener receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    WindowResize,
    WindowFocus,
    WindowBlur,
    WindowClose,
    MouseDown,
    MouseUp,
    MouseMove,
    MouseEnter,
    MouseLeave,
    Click,
    DoubleClick,
    KeyDown,
    KeyUp,
    KeyPress,
    TouchStart,
    TouchMove,
    TouchEnd,
    Change,
    Input,
    Submit,
    Focus,
    Blur,
    Custom,
}

/// An event moving through the dispatcher. `handled` stops further
/// dispatch; `default_prevented` is advisory for the embedder.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub payload: EventPayload,
    pub target: Option<ElementId>,
    /// Milliseconds since the dispatcher started; monotonic.
    pub timestamp_ms: u64,
    pub handled: bool,
    pub default_prevented: bool,
}

impl Event {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            payload,
            target: None,
            timestamp_ms: 0,
            handled: false,
            default_prevented: false,
        }
    }

    pub fn with_target(mut self, target: ElementId) -> Self {
        self.target = Some(target);
        self
    }

    pub fn mark_handled(&mut self) {
        self.handled = true;
    }

    pub fn prevent_default(&mut self) {
        self.default_prevented = true;
    }

    pub fn event_type(&self) -> EventType {
        match &self.payload {
            EventPayload::Window(WindowEvent::Resized { .. }) => EventType::WindowResize,
            EventPayload::Window(WindowEvent::FocusGained) => EventType::WindowFocus,
            EventPayload::Window(WindowEvent::FocusLost) => EventType::WindowBlur,
            EventPayload::Window(WindowEvent::CloseRequested) => EventType::WindowClose,
            EventPayload::Mouse(mouse) => match mouse.kind {
                MouseKind::Down => EventType::MouseDown,
                MouseKind::Up => EventType::MouseUp,
                MouseKind::Move => EventType::MouseMove,
                MouseKind::Enter => EventType::MouseEnter,
                MouseKind::Leave => EventType::MouseLeave,
                MouseKind::Click => EventType::Click,
                MouseKind::DoubleClick => EventType::DoubleClick,
            },
            EventPayload::Key(key) => match key.kind {
                KeyKind::Down => EventType::KeyDown,
                KeyKind::Up => EventType::KeyUp,
                KeyKind::Press => EventType::KeyPress,
            },
            EventPayload::Touch(touch) => match touch.phase {
                TouchPhase::Start => EventType::TouchStart,
                TouchPhase::Move => EventType::TouchMove,
                TouchPhase::End => EventType::TouchEnd,
            },
            EventPayload::Widget(widget) => match widget.kind {
                WidgetKind::Change => EventType::Change,
                WidgetKind::Input => EventType::Input,
                WidgetKind::Submit => EventType::Submit,
                WidgetKind::Focus => EventType::Focus,
                WidgetKind::Blur => EventType::Blur,
            },
            EventPayload::Custom(_) => EventType::Custom,
        }
    }

    /// Convenience constructor for the common click-at-target case.
    pub fn click(target: ElementId, x: f32, y: f32) -> Self {
        Self::new(EventPayload::Mouse(MouseEvent {
            kind: MouseKind::Click,
            x,
            y,
            button: Some(MouseButton::Left),
            modifiers: Modifiers::NONE,
        }))
        .with_target(target)
    }

    pub fn key_down(code: KeyCode, modifiers: Modifiers) -> Self {
        Self::new(EventPayload::Key(KeyEvent {
            kind: KeyKind::Down,
            code,
            modifiers,
        }))
    }
}
