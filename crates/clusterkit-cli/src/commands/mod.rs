//! CLI commands

pub mod apply;
pub mod export;
pub mod list;
pub mod render;
