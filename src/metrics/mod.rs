use crate::diag::{LogEvent, LogFields, LogLevel};
use serde_json::json;
use std::time::Duration;

/// Per-frame counters accumulated by the runtime driver.
#[derive(Debug, Default, Clone)]
pub struct FrameMetrics {
    frames: u64,
    events: u64,
    state_writes: u64,
    bindings_reconciled: u64,
    layout_passes: u64,
    draw_commands: u64,
}

impl FrameMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_frame(&mut self) {
        self.frames = self.frames.saturating_add(1);
    }

    pub fn record_events(&mut self, count: usize) {
        self.events = self.events.saturating_add(count as u64);
    }

    pub fn record_state_write(&mut self) {
        self.state_writes = self.state_writes.saturating_add(1);
    }

    pub fn record_bindings(&mut self, count: usize) {
        if count > 0 {
            self.bindings_reconciled = self.bindings_reconciled.saturating_add(count as u64);
        }
    }

    pub fn record_layout_pass(&mut self) {
        self.layout_passes = self.layout_passes.saturating_add(1);
    }

    pub fn record_draw_commands(&mut self, count: usize) {
        self.draw_commands = self.draw_commands.saturating_add(count as u64);
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn snapshot(&self, uptime: Duration) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_ms: uptime.as_millis() as u64,
            frames: self.frames,
            events: self.events,
            state_writes: self.state_writes,
            bindings_reconciled: self.bindings_reconciled,
            layout_passes: self.layout_passes,
            draw_commands: self.draw_commands,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub uptime_ms: u64,
    pub frames: u64,
    pub events: u64,
    pub state_writes: u64,
    pub bindings_reconciled: u64,
    pub layout_passes: u64,
    pub draw_commands: u64,
}

impl MetricsSnapshot {
    pub fn to_log_event(&self, target: &str) -> LogEvent {
        LogEvent::with_fields(
            LogLevel::Info,
            target.to_string(),
            "frame_metrics".to_string(),
            self.as_fields(),
        )
    }

    pub fn as_fields(&self) -> LogFields {
        let mut map = LogFields::new();
        map.insert("uptime_ms".to_string(), json!(self.uptime_ms));
        map.insert("frames".to_string(), json!(self.frames));
        map.insert("events".to_string(), json!(self.events));
        map.insert("state_writes".to_string(), json!(self.state_writes));
        map.insert(
            "bindings_reconciled".to_string(),
            json!(self.bindings_reconciled),
        );
        map.insert("layout_passes".to_string(), json!(self.layout_passes));
        map.insert("draw_commands".to_string(), json!(self.draw_commands));
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let mut metrics = FrameMetrics::new();
        metrics.record_frame();
        metrics.record_events(3);
        metrics.record_bindings(2);
        metrics.record_bindings(0);
        metrics.record_draw_commands(7);

        let snap = metrics.snapshot(Duration::from_millis(1500));
        assert_eq!(snap.frames, 1);
        assert_eq!(snap.events, 3);
        assert_eq!(snap.bindings_reconciled, 2);
        assert_eq!(snap.draw_commands, 7);
        assert_eq!(snap.uptime_ms, 1500);
    }

    #[test]
    fn snapshot_becomes_log_event() {
        let metrics = FrameMetrics::new();
        let event = metrics
            .snapshot(Duration::from_secs(1))
            .to_log_event("trellis::runtime.metrics");
        assert_eq!(event.message, "frame_metrics");
        assert_eq!(event.fields.get("frames"), Some(&json!(0)));
    }
}
