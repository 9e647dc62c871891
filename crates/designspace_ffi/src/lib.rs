//! Flutter-facing bindings for the design-space project store.

pub mod api;
