//! SoundBox - soundboard that plays clips to a monitor and a virtual mic
//!
//! This library exports core modules for testing and the binary.

/// Shell state and command handling
pub mod app;
/// Dual-device audio playback
pub mod audio;
/// Clip folder scanning
pub mod catalog;
/// Paths and persisted settings
pub mod config;
/// Global key chord listener
pub mod input;
/// Clip → key combination store
pub mod keybinds;
/// macOS permission checks
pub mod permissions;
/// Command parsing and stdin reader
pub mod shell;
/// Tracing setup and crash log
pub mod telemetry;
/// Release check
pub mod update;
