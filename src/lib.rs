// Client-side telemetry sync engine: connection supervision, bounded stores
// and the split-pane layout tree.
pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod presentation;
