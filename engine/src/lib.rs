//! Control-panel engine for a four-channel playback device.
//!
//! The device runs a small web server on its own access point. This crate
//! talks to it over HTTP (`device`), keeps the operator's working state
//! (`panel`) and exposes that state to a browser UI as a local JSON API
//! (`api`).

pub mod api;
pub mod config;
pub mod device;
pub mod error;
pub mod frequency;
pub mod panel;
pub mod registry;
pub mod reorder;
pub mod storage;
pub mod upload;
pub mod workflow;

#[cfg(test)]
mod testing;

pub use device::{DeviceApi, HttpDevice};
pub use error::{DeviceError, PanelError, PanelResult};
pub use panel::Panel;
