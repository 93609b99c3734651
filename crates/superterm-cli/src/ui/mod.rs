pub mod app;
pub mod line_editor;
pub mod spinner;
