// Domain layer - Core business entities
pub mod panel;
pub mod telemetry;
