use std::collections::VecDeque;

use crate::error::QueueFull;

use super::types::Event;

/// Bounded FIFO event queue. A push on a full queue is rejected — nothing
/// already queued is ever displaced — so backpressure is the caller's
/// decision, not a silent drop.
pub struct EventQueue {
    buffer: VecDeque<Event>,
    capacity: usize,
}

impl EventQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, event: Event) -> Result<(), QueueFull> {
        if self.buffer.len() >= self.capacity {
            return Err(QueueFull {
                capacity: self.capacity,
            });
        }
        self.buffer.push_back(event);
        Ok(())
    }

    pub fn poll(&mut self) -> Option<Event> {
        self.buffer.pop_front()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::types::{EventPayload, WindowEvent};

    fn resize(width: f32) -> Event {
        Event::new(EventPayload::Window(WindowEvent::Resized {
            width,
            height: 10.0,
        }))
    }

    #[test]
    fn fifo_order_is_preserved() {
        let mut queue = EventQueue::new(4);
        for i in 0..3 {
            queue.push(resize(i as f32)).unwrap();
        }
        for i in 0..3 {
            let event = queue.poll().unwrap();
            match event.payload {
                EventPayload::Window(WindowEvent::Resized { width, .. }) => {
                    assert_eq!(width, i as f32);
                }
                other => panic!("unexpected payload {other:?}"),
            }
        }
        assert!(queue.poll().is_none());
    }

    #[test]
    fn full_queue_rejects_newest() {
        let mut queue = EventQueue::new(2);
        queue.push(resize(1.0)).unwrap();
        queue.push(resize(2.0)).unwrap();
        let err = queue.push(resize(3.0)).unwrap_err();
        assert_eq!(err.capacity, 2);
        assert_eq!(queue.len(), 2);

        // The earlier events are intact.
        assert!(matches!(
            queue.poll().unwrap().payload,
            EventPayload::Window(WindowEvent::Resized { width, .. }) if width == 1.0
        ));
    }
}
