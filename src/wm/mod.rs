//! Window Tree Module
//!
//! The mirrored window tree and everything attached to its nodes: stacking,
//! surface bindings, icons, input devices and the startup gate.

pub mod device;
pub mod icons;
pub mod node;
pub mod stacking;
pub mod startup;
pub mod surface;
pub mod tree;

pub use node::{NodeKind, WindowNode};
pub use stacking::ZOrder;
pub use tree::{PositionUpdate, WindowTree};
