// Application layer - Stores, session routing and the connection lifecycle
pub mod connection_manager;
pub mod fallback;
pub mod series_catalog;
pub mod session;
pub mod snapshot_store;
pub mod time_series_store;
pub mod transport;
