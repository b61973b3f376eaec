//! Runtime driver: owns the element tree, state store, event dispatcher,
//! and block allocator, and turns them over once per frame.
//!
//! Per-frame ordering is fixed: queued events dispatch fully, then changed
//! state reconciles against property bindings, then layout runs for dirty
//! nodes, and finally `render` emits draw intents for dirty subtrees. The
//! phases never reorder, so handlers observe settled layout and layout
//! never runs on pre-event property values.

use std::marker::PhantomData;
use std::time::Instant;

use serde_json::json;

use crate::alloc::{AllocConfig, BlockAllocator};
use crate::bundle::{self, Bundle, DecodeOptions};
use crate::diag::{LogLevel, Logger, event_with_fields, json_kv};
use crate::error::{EncodeError, Result, RuntimeError, StateError};
use crate::event::{Event, EventDispatcher};
use crate::layout::compute_layout;
use crate::metrics::FrameMetrics;
use crate::render::{Renderer, emit_draw_commands};
use crate::state::{ObserverHandle, StateStore, StateValue};
use crate::tree::{ElementId, ElementTree};

/// Execution mode. Development decodes permissively and logs at Debug;
/// production is strict and quiet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RuntimeMode {
    #[default]
    Production,
    Development,
    Debug,
}

/// Runtime configuration knobs.
#[derive(Clone)]
pub struct RuntimeConfig {
    pub mode: RuntimeMode,
    pub decode: DecodeOptions,
    pub queue_capacity: usize,
    pub max_elements: usize,
    pub viewport: (f32, f32),
    pub logger: Option<Logger>,
    pub alloc: AllocConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            mode: RuntimeMode::Production,
            decode: DecodeOptions::default(),
            queue_capacity: 256,
            max_elements: 65_536,
            viewport: (80.0, 24.0),
            logger: None,
            alloc: AllocConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Permissive decode, verbose logging.
    pub fn development() -> Self {
        Self {
            mode: RuntimeMode::Development,
            decode: DecodeOptions::permissive(),
            ..Self::default()
        }
    }

    pub fn production() -> Self {
        Self::default()
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.decode.logger = Some(logger.clone());
        self.logger = Some(logger);
        self
    }
}

/// The runtime instance. Confined to its driver thread by construction:
/// the marker below keeps it `!Send`/`!Sync`, so the single-writer rule on
/// the tree, state, and queue is enforced at compile time.
pub struct Runtime {
    config: RuntimeConfig,
    allocator: BlockAllocator,
    tree: ElementTree,
    state: StateStore,
    dispatcher: EventDispatcher,
    metrics: FrameMetrics,
    running: bool,
    started_at: Option<Instant>,
    _driver_thread: PhantomData<*const ()>,
}

impl Runtime {
    pub fn new(config: RuntimeConfig) -> Self {
        let mut tree = ElementTree::with_limit(config.max_elements);
        tree.set_logger(config.logger.clone());
        Self {
            allocator: BlockAllocator::new(config.alloc.clone()),
            tree,
            state: StateStore::new(),
            dispatcher: EventDispatcher::new(config.queue_capacity),
            metrics: FrameMetrics::new(),
            running: false,
            started_at: None,
            config,
            _driver_thread: PhantomData,
        }
    }

    /// Decode a bundle and materialize it as the live document, replacing
    /// any previous one. The whole load is rejected on any decode error;
    /// a partially corrupt bundle never reaches the tree.
    pub fn load_binary(&mut self, bytes: &[u8]) -> Result<()> {
        let bundle = bundle::decode(bytes, &self.config.decode)?;
        self.install_bundle(&bundle)
    }

    /// Read a bundle from disk, staging the bytes through the block
    /// allocator so file loads account in the same memory statistics as
    /// the rest of the runtime.
    pub fn load_file(&mut self, path: impl AsRef<std::path::Path>) -> Result<()> {
        let raw = std::fs::read(path.as_ref())?;
        let block = self
            .allocator
            .alloc_labeled(raw.len(), 0, "bundle_file")
            .map_err(RuntimeError::Alloc)?;
        self.allocator
            .bytes_mut(block)
            .map_err(RuntimeError::Alloc)?
            .copy_from_slice(&raw);
        drop(raw);

        let result = {
            let bytes = self.allocator.bytes(block).map_err(RuntimeError::Alloc)?;
            bundle::decode(bytes, &self.config.decode)
        };
        self.allocator.free(block).map_err(RuntimeError::Alloc)?;
        let bundle = result?;
        self.install_bundle(&bundle)
    }

    fn install_bundle(&mut self, bundle: &Bundle) -> Result<()> {
        let mut tree =
            ElementTree::from_bundle(bundle, self.config.max_elements, self.config.logger.clone())?;
        for root in tree.roots() {
            tree.mount(root)?;
        }
        self.tree = tree;
        self.log(
            LogLevel::Info,
            "document_loaded",
            [
                json_kv("elements", json!(self.tree.len())),
                json_kv("strings", json!(bundle.strings.len())),
            ],
        );
        Ok(())
    }

    /// Serialize the live document for persistence.
    pub fn snapshot(&self) -> std::result::Result<Bundle, EncodeError> {
        self.tree.snapshot()
    }

    pub fn start(&mut self) {
        if self.running {
            return;
        }
        self.running = true;
        self.started_at = Some(Instant::now());
        self.log(
            LogLevel::Info,
            "runtime_started",
            [json_kv("elements", json!(self.tree.len()))],
        );
    }

    /// Stop the runtime. In-flight work is never truncated mid-node: each
    /// event dispatch and each node's layout/paint is atomic, so the tree
    /// is left fully-mutated-or-not per node.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;
        let uptime_ms = self
            .started_at
            .map(|at| at.elapsed().as_millis() as u64)
            .unwrap_or(0);
        self.emit_metrics();
        let leaked = self.allocator.live_blocks();
        if leaked > 0 {
            self.log(
                LogLevel::Fatal,
                "allocation_leaks_detected",
                [json_kv("live_blocks", json!(leaked))],
            );
        }
        self.log(
            LogLevel::Info,
            "runtime_stopped",
            [json_kv("uptime_ms", json!(uptime_ms))],
        );
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Queue an input event. A full queue rejects the event; the caller
    /// decides whether to retry or drop.
    pub fn handle_event(&mut self, event: Event) -> bool {
        match self.dispatcher.push(event) {
            Ok(()) => true,
            Err(err) => {
                self.log(
                    LogLevel::Warn,
                    "event_rejected",
                    [json_kv("capacity", json!(err.capacity))],
                );
                false
            }
        }
    }

    /// One update step: events, reconcile, layout — in that order, always.
    /// Returns true if any phase did work.
    pub fn update(&mut self, _delta_seconds: f64) -> bool {
        if !self.running {
            return false;
        }

        let events = self
            .dispatcher
            .process_all(&mut self.tree, &self.state);
        self.metrics.record_events(events);

        let changed = self.state.take_changed();
        let reconciled = self.tree.reconcile_bindings(&self.state, &changed);
        self.metrics.record_bindings(reconciled);

        let laid_out = self.tree.has_layout_dirt();
        if laid_out {
            compute_layout(&mut self.tree, self.config.viewport);
            self.metrics.record_layout_pass();
        }

        let worked = events > 0 || reconciled > 0 || laid_out;
        if worked && self.config.mode != RuntimeMode::Production {
            self.log(
                LogLevel::Debug,
                "frame_updated",
                [
                    json_kv("events", json!(events)),
                    json_kv("bindings", json!(reconciled)),
                    json_kv("layout", json!(laid_out)),
                ],
            );
        }
        worked
    }

    /// Emit draw intents for dirty subtrees. Returns false when nothing
    /// needed repainting (the backend was not touched).
    pub fn render(&mut self, renderer: &mut dyn Renderer) -> bool {
        if !self.running || !self.tree.has_render_dirt() {
            return false;
        }
        renderer.begin_frame();
        let commands = emit_draw_commands(&mut self.tree);
        renderer.execute(&commands);
        renderer.end_frame();

        self.metrics.record_frame();
        self.metrics.record_draw_commands(commands.len());
        true
    }

    // ---- runtime-scoped variables used by reactive bindings ----

    pub fn variable(&self, path: &str) -> Option<StateValue> {
        self.state.get(path)
    }

    pub fn set_variable(
        &mut self,
        path: &str,
        value: impl Into<StateValue>,
    ) -> std::result::Result<(), StateError> {
        self.metrics.record_state_write();
        self.state.set(path, value)
    }

    /// Create the path if missing (explicit auto-vivification).
    pub fn define_variable(
        &mut self,
        path: &str,
        value: impl Into<StateValue>,
    ) -> std::result::Result<(), StateError> {
        self.metrics.record_state_write();
        self.state.define(path, value)
    }

    pub fn observe_variable(
        &self,
        path: &str,
        callback: impl FnMut(&StateValue) + 'static,
    ) -> std::result::Result<ObserverHandle, StateError> {
        self.state.observe(path, callback)
    }

    pub fn unobserve_variable(&self, handle: &ObserverHandle) -> bool {
        self.state.unobserve(handle)
    }

    // ---- component access ----

    pub fn tree(&self) -> &ElementTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut ElementTree {
        &mut self.tree
    }

    pub fn state(&self) -> &StateStore {
        &self.state
    }

    pub fn dispatcher_mut(&mut self) -> &mut EventDispatcher {
        &mut self.dispatcher
    }

    pub fn allocator_mut(&mut self) -> &mut BlockAllocator {
        &mut self.allocator
    }

    pub fn root(&self) -> Option<ElementId> {
        self.tree.roots().into_iter().next()
    }

    pub fn metrics(&self) -> &FrameMetrics {
        &self.metrics
    }

    fn emit_metrics(&self) {
        let Some(logger) = self.config.logger.as_ref() else {
            return;
        };
        let uptime = self
            .started_at
            .map(|at| at.elapsed())
            .unwrap_or_default();
        let event = self
            .metrics
            .snapshot(uptime)
            .to_log_event("trellis::runtime.metrics");
        let _ = logger.log_event(event);
    }

    fn log(
        &self,
        level: LogLevel,
        message: &str,
        fields: impl IntoIterator<Item = (String, serde_json::Value)>,
    ) {
        if let Some(logger) = self.config.logger.as_ref() {
            let _ =
                logger.log_event(event_with_fields(level, "trellis::runtime", message, fields));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::{ElementRecord, ElementTag, PropertyRecord, PropertyValue};
    use crate::diag::BufferSink;
    use crate::event::{DispatchPhase, EventType};
    use crate::render::{CollectRenderer, DrawCommand};
    use crate::tree::Value;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn greeting_bundle() -> Vec<u8> {
        let mut bundle = Bundle::new();
        let width = bundle.add_string("width").unwrap();
        let height = bundle.add_string("height").unwrap();
        let text = bundle.add_string("text").unwrap();
        let path = bundle.add_string("user.name").unwrap();
        let shell = bundle.add_string("shell").unwrap();

        bundle.add_element(ElementRecord {
            id: 1,
            tag: ElementTag::Column,
            name: Some(shell),
            parent_id: 0,
            properties: vec![
                PropertyRecord {
                    name: width,
                    value: PropertyValue::Float(80.0),
                },
                PropertyRecord {
                    name: height,
                    value: PropertyValue::Float(24.0),
                },
            ],
            children: vec![2],
        });
        bundle.add_element(ElementRecord {
            id: 2,
            tag: ElementTag::Text,
            name: None,
            parent_id: 1,
            properties: vec![PropertyRecord {
                name: text,
                value: PropertyValue::Expression(path),
            }],
            children: Vec::new(),
        });
        bundle::encode(&bundle).unwrap()
    }

    fn loaded_runtime() -> Runtime {
        let mut runtime = Runtime::new(RuntimeConfig::default());
        runtime.load_binary(&greeting_bundle()).unwrap();
        runtime.define_variable("user.name", "nobody").unwrap();
        runtime.start();
        runtime.update(0.0);
        runtime.render(&mut CollectRenderer::new());
        runtime
    }

    #[test]
    fn load_mounts_the_document() {
        let runtime = loaded_runtime();
        let root = runtime.root().unwrap();
        let tree = runtime.tree();
        assert_eq!(tree.len(), 2);
        assert_eq!(tree.find_by_id("shell"), Some(root));
        assert_eq!(
            tree.element(root).unwrap().phase(),
            crate::tree::Phase::Mounted
        );
    }

    #[test]
    fn observer_fires_once_and_binding_dirties_after_reconcile() {
        let mut runtime = loaded_runtime();
        let calls = Rc::new(RefCell::new(Vec::new()));
        let probe = Rc::clone(&calls);
        runtime
            .observe_variable("user.name", move |value| {
                if let StateValue::String(s) = value {
                    probe.borrow_mut().push(s.clone());
                }
            })
            .unwrap();

        runtime.set_variable("user.name", "Alice").unwrap();
        assert_eq!(calls.borrow().as_slice(), &["Alice".to_string()]);

        // The bound property has not evaluated yet; reconcile happens in
        // update, once per frame.
        let text = runtime.tree().find_by_doc_id(2).unwrap();
        assert_ne!(
            runtime.tree().get_property(text, "text"),
            Some(Value::Str("Alice".into()))
        );

        assert!(runtime.update(0.016));
        assert_eq!(
            runtime.tree().get_property(text, "text"),
            Some(Value::Str("Alice".into()))
        );
        assert!(runtime.tree().element(text).unwrap().needs_render());

        // Rendering picks the change up and clears the flag.
        let mut renderer = CollectRenderer::new();
        assert!(runtime.render(&mut renderer));
        assert!(
            renderer
                .last_frame()
                .unwrap()
                .iter()
                .any(|c| matches!(c, DrawCommand::Text { content, .. } if content == "Alice"))
        );
        assert!(!runtime.render(&mut CollectRenderer::new()));
    }

    #[test]
    fn binding_skips_identical_values() {
        let mut runtime = loaded_runtime();
        runtime.set_variable("user.name", "same").unwrap();
        assert!(runtime.update(0.0));
        runtime.render(&mut CollectRenderer::new());

        // Same value again: the write notifies observers but the binding's
        // last-evaluated value short-circuits the re-apply.
        runtime.set_variable("user.name", "same").unwrap();
        runtime.update(0.0);
        assert!(!runtime.render(&mut CollectRenderer::new()));
    }

    #[test]
    fn events_dispatch_before_reconcile_and_layout() {
        let mut runtime = loaded_runtime();
        let text = runtime.tree().find_by_doc_id(2).unwrap();

        // A click listener writes state; the same update() must reconcile
        // that write into the bound property before layout runs.
        runtime.dispatcher_mut().add_listener(
            EventType::Click,
            Some(text),
            DispatchPhase::Bubble,
            |ctx, event| {
                ctx.state.set("user.name", "clicked").unwrap();
                event.mark_handled();
            },
        );

        assert!(runtime.handle_event(Event::click(text, 0.0, 0.0)));
        assert!(runtime.update(0.016));
        assert_eq!(
            runtime.tree().get_property(text, "text"),
            Some(Value::Str("clicked".into()))
        );
        // Layout ran on the post-event value.
        assert_eq!(
            runtime.tree().element(text).unwrap().layout().width,
            "clicked".len() as f32
        );
    }

    #[test]
    fn full_queue_rejects_and_logs() {
        let sink = BufferSink::new();
        let config = RuntimeConfig {
            queue_capacity: 1,
            ..RuntimeConfig::default()
        }
        .with_logger(Logger::new(sink.clone()));
        let mut runtime = Runtime::new(config);
        runtime.load_binary(&greeting_bundle()).unwrap();
        runtime.start();

        let target = runtime.tree().find_by_doc_id(2).unwrap();
        assert!(runtime.handle_event(Event::click(target, 0.0, 0.0)));
        assert!(!runtime.handle_event(Event::click(target, 0.0, 0.0)));
        assert!(sink.messages().contains(&"event_rejected".to_string()));
    }

    #[test]
    fn update_is_a_no_op_until_started() {
        let mut runtime = Runtime::new(RuntimeConfig::default());
        runtime.load_binary(&greeting_bundle()).unwrap();
        assert!(!runtime.update(0.0));
        runtime.start();
        assert!(runtime.update(0.0)); // initial layout pass
        runtime.stop();
        assert!(!runtime.update(0.0));
    }

    #[test]
    fn snapshot_preserves_bindings_for_persistence() {
        let runtime = loaded_runtime();
        let bundle = runtime.snapshot().unwrap();
        let restored = ElementTree::from_bundle(&bundle, 100, None).unwrap();
        let text = restored.find_by_doc_id(2).unwrap();
        let binding = restored
            .element(text)
            .unwrap()
            .property("text")
            .unwrap()
            .binding
            .clone()
            .unwrap();
        assert_eq!(binding.path, "user.name");
    }

    #[test]
    fn corrupt_bundle_never_replaces_the_document() {
        let mut runtime = loaded_runtime();
        let mut corrupt = greeting_bundle();
        let last = corrupt.len() - 1;
        corrupt[last] ^= 0xFF;
        assert!(runtime.load_binary(&corrupt).is_err());
        assert_eq!(runtime.tree().len(), 2);
    }

    #[test]
    fn load_file_stages_through_the_allocator() {
        let path = std::env::temp_dir().join("trellis_load_file_test.trb");
        std::fs::write(&path, greeting_bundle()).unwrap();

        let mut runtime = Runtime::new(RuntimeConfig::default());
        runtime.load_file(&path).unwrap();
        assert_eq!(runtime.tree().len(), 2);
        let stats = runtime.allocator_mut().stats();
        assert_eq!(stats.alloc_count, 1);
        assert_eq!(stats.free_count, 1);
        assert_eq!(stats.live_blocks, 0);

        std::fs::remove_file(&path).ok();
    }
}
