pub mod config;
pub mod keymap;
pub mod platform;
