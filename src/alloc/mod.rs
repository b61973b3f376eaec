//! Block allocator module orchestrator.
//!
//! Fixed-size pooled allocation for the element/property/state churn pattern,
//! with individually tracked large blocks, liveness checks, and statistics.

mod core;

pub use core::{AllocConfig, BlockAllocator, BlockRef, MemoryStats, SharedAllocator};
