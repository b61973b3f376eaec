//! Render module orchestrator.
//!
//! The fixed draw-intent vocabulary handed to renderer backends, the
//! backend trait, and the paint-order emission walk over the element tree.

mod core;

pub use core::{CollectRenderer, DrawCommand, Renderer, emit_draw_commands};
