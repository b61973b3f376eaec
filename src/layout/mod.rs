//! Layout module orchestrator.
//!
//! Box-model solve over dirty subtrees of the element tree, plus the
//! display-cell text measurement it depends on.

mod core;
mod text;

pub use core::compute_layout;
pub use text::{display_width, measure_text};
