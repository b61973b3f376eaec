use crossterm::event::{
    Event as TermEvent, KeyCode as TermKeyCode, KeyEventKind, KeyModifiers, MouseButton as
    TermMouseButton, MouseEventKind,
};

use super::types::{
    Event, EventPayload, KeyCode, KeyEvent, KeyKind, Modifiers, MouseButton, MouseEvent,
    MouseKind, WidgetEvent, WidgetKind, WindowEvent,
};

/// Map a terminal input event onto a runtime event. Events the runtime has
/// no use for (e.g. scroll on a build without scrollable widgets) map to
/// `None` and are dropped at the adapter, not deep in dispatch.
pub fn map_input(event: TermEvent) -> Option<Event> {
    match event {
        TermEvent::Key(key) => {
            let kind = match key.kind {
                KeyEventKind::Press | KeyEventKind::Repeat => KeyKind::Down,
                KeyEventKind::Release => KeyKind::Up,
            };
            let code = map_key_code(key.code)?;
            Some(Event::new(EventPayload::Key(KeyEvent {
                kind,
                code,
                modifiers: map_modifiers(key.modifiers),
            })))
        }
        TermEvent::Mouse(mouse) => {
            let (kind, button) = match mouse.kind {
                MouseEventKind::Down(button) => (MouseKind::Down, map_button(button)),
                MouseEventKind::Up(button) => (MouseKind::Up, map_button(button)),
                MouseEventKind::Drag(button) => (MouseKind::Move, map_button(button)),
                MouseEventKind::Moved => (MouseKind::Move, None),
                MouseEventKind::ScrollDown
                | MouseEventKind::ScrollUp
                | MouseEventKind::ScrollLeft
                | MouseEventKind::ScrollRight => return None,
            };
            Some(Event::new(EventPayload::Mouse(MouseEvent {
                kind,
                x: mouse.column as f32,
                y: mouse.row as f32,
                button,
                modifiers: map_modifiers(mouse.modifiers),
            })))
        }
        TermEvent::Resize(width, height) => {
            Some(Event::new(EventPayload::Window(WindowEvent::Resized {
                width: width as f32,
                height: height as f32,
            })))
        }
        TermEvent::FocusGained => Some(Event::new(EventPayload::Window(WindowEvent::FocusGained))),
        TermEvent::FocusLost => Some(Event::new(EventPayload::Window(WindowEvent::FocusLost))),
        TermEvent::Paste(data) => Some(Event::new(EventPayload::Widget(WidgetEvent {
            kind: WidgetKind::Input,
            detail: Some(data),
        }))),
    }
}

fn map_key_code(code: TermKeyCode) -> Option<KeyCode> {
    Some(match code {
        TermKeyCode::Char(c) => KeyCode::Char(c),
        TermKeyCode::Enter => KeyCode::Enter,
        TermKeyCode::Esc => KeyCode::Escape,
        TermKeyCode::Tab => KeyCode::Tab,
        TermKeyCode::Backspace => KeyCode::Backspace,
        TermKeyCode::Delete => KeyCode::Delete,
        TermKeyCode::Insert => KeyCode::Insert,
        TermKeyCode::Home => KeyCode::Home,
        TermKeyCode::End => KeyCode::End,
        TermKeyCode::PageUp => KeyCode::PageUp,
        TermKeyCode::PageDown => KeyCode::PageDown,
        TermKeyCode::Left => KeyCode::Left,
        TermKeyCode::Right => KeyCode::Right,
        TermKeyCode::Up => KeyCode::Up,
        TermKeyCode::Down => KeyCode::Down,
        TermKeyCode::F(n) => KeyCode::F(n),
        _ => return None,
    })
}

fn map_modifiers(modifiers: KeyModifiers) -> Modifiers {
    Modifiers {
        ctrl: modifiers.contains(KeyModifiers::CONTROL),
        shift: modifiers.contains(KeyModifiers::SHIFT),
        alt: modifiers.contains(KeyModifiers::ALT),
        meta: modifiers.contains(KeyModifiers::SUPER),
    }
}

fn map_button(button: TermMouseButton) -> Option<MouseButton> {
    Some(match button {
        TermMouseButton::Left => MouseButton::Left,
        TermMouseButton::Right => MouseButton::Right,
        TermMouseButton::Middle => MouseButton::Middle,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyEvent as TermKeyEvent;

    #[test]
    fn key_press_maps_to_key_down() {
        let term = TermEvent::Key(TermKeyEvent::new(
            TermKeyCode::Char('s'),
            KeyModifiers::CONTROL,
        ));
        let event = map_input(term).unwrap();
        match event.payload {
            EventPayload::Key(key) => {
                assert_eq!(key.kind, KeyKind::Down);
                assert_eq!(key.code, KeyCode::Char('s'));
                assert!(key.modifiers.ctrl);
                assert!(!key.modifiers.shift);
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn resize_maps_to_window_event() {
        let event = map_input(TermEvent::Resize(120, 40)).unwrap();
        assert!(matches!(
            event.payload,
            EventPayload::Window(WindowEvent::Resized { width, height })
                if width == 120.0 && height == 40.0
        ));
    }

    #[test]
    fn scroll_is_dropped_at_the_adapter() {
        let term = TermEvent::Mouse(crossterm::event::MouseEvent {
            kind: MouseEventKind::ScrollUp,
            column: 0,
            row: 0,
            modifiers: KeyModifiers::NONE,
        });
        assert!(map_input(term).is_none());
    }
}
