//! Types shared by the tree, the stacking code and the host adapter

pub mod window_state;

pub use window_state::{PositionFlags, StyleFlags, SurfaceHandle, SurfaceKind};
