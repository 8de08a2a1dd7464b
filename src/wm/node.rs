use nwm_bridge_ipc::{Rect, WindowId};

use crate::shared::window_state::{client_layout, StyleFlags};
use crate::wm::icons::IconData;
use crate::wm::surface::SurfaceSlots;

/// What kind of window a node mirrors.
///
/// Positioning, surface placement and title handling dispatch on this tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// The synthetic desktop window backing the desktop container
    Desktop,
    /// Parentless window hosted directly in the desktop container
    TopLevel { topmost: bool },
    /// Window living inside its parent's client container (or detached,
    /// for the message-only window)
    Child,
}

/// Mirrored window state
#[derive(Debug)]
pub struct WindowNode {
    /// Handle assigned by the NWM
    pub id: WindowId,

    pub kind: NodeKind,

    /// Owning top-level window (0 if none)
    pub owner: WindowId,

    pub style: StyleFlags,

    /// Per-window DPI scale
    pub scale: f32,

    /// Creating process, informational only
    pub pid: u32,

    pub window_rect: Rect,
    pub client_rect: Rect,
    pub visible_rect: Rect,

    pub parent: Option<WindowId>,

    /// Child ids, back to front
    pub children: Vec<WindowId>,

    pub title: Option<String>,
    pub icon: Option<IconData>,

    pub surfaces: SurfaceSlots,

    /// Set once the window starts accelerated rendering; never cleared
    pub accelerated: bool,
}

impl WindowNode {
    pub fn new(id: WindowId, kind: NodeKind, parent: Option<WindowId>, scale: f32) -> Self {
        Self {
            id,
            kind,
            owner: 0,
            style: StyleFlags::empty(),
            scale,
            pid: 0,
            window_rect: Rect::default(),
            client_rect: Rect::default(),
            visible_rect: Rect::default(),
            parent,
            children: Vec::new(),
            title: None,
            icon: None,
            surfaces: SurfaceSlots::default(),
            accelerated: false,
        }
    }

    /// The desktop is always shown; everything else follows its style bits.
    pub fn visible(&self) -> bool {
        matches!(self.kind, NodeKind::Desktop) || self.style.contains(StyleFlags::VISIBLE)
    }

    pub fn minimized(&self) -> bool {
        self.style.contains(StyleFlags::MINIMIZE)
    }

    pub fn is_top_level(&self) -> bool {
        matches!(self.kind, NodeKind::TopLevel { .. })
    }

    pub fn topmost(&self) -> bool {
        matches!(self.kind, NodeKind::TopLevel { topmost: true })
    }

    pub fn set_topmost(&mut self, value: bool) {
        if let NodeKind::TopLevel { topmost } = &mut self.kind {
            *topmost = value;
        }
    }

    /// Shown and not minimized: the windows the desktop container orders
    pub fn stacked_visible(&self) -> bool {
        self.visible() && !self.minimized()
    }

    /// Layout of the client container inside the whole container
    pub fn client_layout(&self) -> Rect {
        client_layout(self.client_rect, self.visible_rect)
    }

    /// Eligible to drive the activity title
    pub fn title_candidate(&self) -> bool {
        self.is_top_level() && self.owner == 0 && self.visible() && self.title.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visibility_follows_style_except_desktop() {
        let mut node = WindowNode::new(0x30, NodeKind::TopLevel { topmost: false }, None, 1.0);
        assert!(!node.visible());

        node.style = StyleFlags::VISIBLE | StyleFlags::MINIMIZE;
        assert!(node.visible());
        assert!(!node.stacked_visible());

        let desktop = WindowNode::new(0x20, NodeKind::Desktop, None, 1.0);
        assert!(desktop.visible());
    }

    #[test]
    fn test_topmost_only_applies_to_top_levels() {
        let mut child = WindowNode::new(0x31, NodeKind::Child, Some(0x30), 1.0);
        child.set_topmost(true);
        assert!(!child.topmost());

        let mut top = WindowNode::new(0x30, NodeKind::TopLevel { topmost: false }, None, 1.0);
        top.set_topmost(true);
        assert!(top.topmost());
    }
}
