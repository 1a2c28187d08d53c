// Infrastructure layer - External dependencies and adapters
pub mod config;
pub mod protocol;
pub mod websocket_transport;
