//! Event module orchestrator.
//!
//! Bounded event queue, two-phase (capture/bubble) dispatch, global key
//! shortcuts, and the terminal input adapter.

mod dispatch;
mod input;
mod queue;
mod types;

pub use dispatch::{
    DispatchPhase, EventContext, EventDispatcher, KeyCombo, ListenerId, ShortcutId,
};
pub use input::map_input;
pub use queue::EventQueue;
pub use types::{
    CustomEvent, Event, EventPayload, EventType, KeyCode, KeyEvent, KeyKind, Modifiers,
    MouseButton, MouseEvent, MouseKind, TouchEvent, TouchPhase, WidgetEvent, WidgetKind,
    WindowEvent,
};
