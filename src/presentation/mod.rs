// Presentation layer - What the rendering side reads
pub mod app_state;
pub mod chart_view;
