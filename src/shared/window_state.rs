//! Shared window state between the tree and the host adapter
//!
//! Style and position flags as sent by the native window manager, the two
//! surface kinds every window carries, and the layout helpers used when
//! placing host views.

use bitflags::bitflags;
use nwm_bridge_ipc::Rect;

bitflags! {
    /// Window style bits the bridge cares about
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct StyleFlags: u32 {
        const VISIBLE  = 0x1000_0000;
        const MINIMIZE = 0x2000_0000;
        const CHILD    = 0x4000_0000;
        const POPUP    = 0x8000_0000;
    }
}

bitflags! {
    /// Flags accompanying a position change
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PositionFlags: u32 {
        const NO_SIZE       = 0x0001;
        const NO_MOVE       = 0x0002;
        const NO_ZORDER     = 0x0004;
        const NO_ACTIVATE   = 0x0010;
        const SHOW_WINDOW   = 0x0040;
        const HIDE_WINDOW   = 0x0080;
    }
}

impl StyleFlags {
    /// Keep only the bits we track; everything else the NWM sends is noise here.
    pub fn from_style(style: u32) -> Self {
        Self::from_bits_truncate(style)
    }
}

impl PositionFlags {
    pub fn from_raw(flags: u32) -> Self {
        Self::from_bits_truncate(flags)
    }
}

/// Which of the two per-window rendering targets an event is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceKind {
    /// Full window extent, including any non-client area
    Whole,
    /// Interior content area
    Client,
}

impl SurfaceKind {
    pub fn from_client_flag(is_client: bool) -> Self {
        if is_client { Self::Client } else { Self::Whole }
    }

    pub fn is_client(self) -> bool {
        matches!(self, Self::Client)
    }
}

/// Opaque handle to a host rendering backing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceHandle(pub u64);

/// Layout wrapper making sure a view is never empty.
///
/// The host only allocates backing storage for views with a footprint, so a
/// degenerate rect is widened to two pixels on each axis.
pub fn padded_layout(rect: Rect) -> Rect {
    let mut out = rect;
    if out.right <= out.left + 1 {
        out.right = out.left + 2;
    }
    if out.bottom <= out.top + 1 {
        out.bottom = out.top + 2;
    }
    out
}

/// Client area expressed relative to the visible rect's origin
pub fn client_layout(client_rect: Rect, visible_rect: Rect) -> Rect {
    client_rect.offset(-visible_rect.left, -visible_rect.top)
}

/// Off-screen placement for a hidden top-level window.
///
/// While the whole surface is still pending, one pixel stays on-screen so the
/// host has something to bind the backing to.
pub fn offscreen_layout(visible_rect: Rect, keep_one_pixel: bool) -> Rect {
    let left = visible_rect.left - visible_rect.right;
    let top = visible_rect.top - visible_rect.bottom;
    if keep_one_pixel {
        padded_layout(Rect::new(left + 1, top + 1, 1, 1))
    } else {
        Rect::new(left, top, 0, 0)
    }
}
