//! Error module orchestrator.
//!
//! Public error enums live in the private `types` module; downstream code
//! imports them from here (or from the crate root re-exports).

mod types;

pub use types::{
    AllocError, DecodeError, ElementError, EncodeError, PropertyError, QueueFull, Result,
    RuntimeError, ShortcutParseError, StateError,
};
