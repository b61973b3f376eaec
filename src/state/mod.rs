//! Reactive state store module orchestrator.
//!
//! A keyed value tree with per-node observer lists. Writes notify observers
//! synchronously in registration order and record the changed path for the
//! frame's reconcile step; writes issued from inside a notification are
//! rejected rather than queued.

mod core;

pub use core::{ObserverHandle, StateStore, StateValue};
