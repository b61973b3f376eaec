//! Runtime core for portable binary UI documents.
//!
//! A bundle (header + deduplicated string table + flat element records)
//! decodes into an element tree; the runtime driver dispatches input
//! through a capture/bubble pipeline, reconciles state-bound properties,
//! lays out dirty subtrees, and hands ordered draw intents to a renderer
//! backend. A pooled block allocator backs the churny allocations and
//! catches double frees and leaks.
//!
//! The modules follow the same orchestrator pattern throughout: a
//! directory module re-exporting from private implementation files.

pub mod alloc;
pub mod bundle;
pub mod diag;
pub mod error;
pub mod event;
pub mod layout;
pub mod metrics;
pub mod render;
pub mod runtime;
pub mod state;
pub mod tree;

pub use alloc::{AllocConfig, BlockAllocator, BlockRef, MemoryStats, SharedAllocator};
pub use bundle::{
    Bundle, CompressionKind, DecodeOptions, DecodePolicy, ElementRecord, ElementTag, decode,
    encode,
};
pub use diag::{BufferSink, FileSink, LogEvent, LogFields, LogLevel, LogSink, Logger};
pub use error::{
    AllocError, DecodeError, ElementError, EncodeError, PropertyError, QueueFull, Result,
    RuntimeError, ShortcutParseError, StateError,
};
pub use event::{
    DispatchPhase, Event, EventContext, EventDispatcher, EventPayload, EventType, KeyCode,
    KeyCombo, Modifiers, map_input,
};
pub use layout::{compute_layout, display_width};
pub use metrics::{FrameMetrics, MetricsSnapshot};
pub use render::{CollectRenderer, DrawCommand, Renderer};
pub use runtime::{Runtime, RuntimeConfig, RuntimeMode};
pub use state::{ObserverHandle, StateStore, StateValue};
pub use tree::{
    ComputedStyle, Edges, Element, ElementId, ElementTree, LayoutBox, Phase, Property, Value,
    parse_color,
};
