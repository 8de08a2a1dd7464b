//! nwm-bridge
//!
//! Mirrors the window tree of a native window manager (NWM) into a host
//! view hierarchy: stacking, visibility, rendering surfaces, input routing,
//! clipboard and startup commands.

pub mod bridge;
pub mod clipboard;
pub mod compositor;
pub mod config;
pub mod errors;
pub mod input;
pub mod ipc;
pub mod nwm;
pub mod shared;
pub mod wm;

pub use bridge::{Bridge, BridgeHandle, BridgeTask};
pub use config::Config;
pub use errors::{BridgeError, Result};
