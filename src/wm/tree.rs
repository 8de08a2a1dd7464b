//! Window tree
//!
//! Owns every mirrored [`WindowNode`], keyed by the NWM's window id, plus the
//! top-level stacking order. Parent and child links are plain ids into the
//! map. All host side effects go through the [`HostViews`] passed in by the
//! caller, and surface notifications through the caller's [`NativeWm`].

use std::collections::HashMap;

use nwm_bridge_ipc::codes::{HWND_MESSAGE, SC_RESTORE};
use nwm_bridge_ipc::{Rect, WindowId};
use tracing::{debug, info};

use crate::compositor::{ActivityTitle, Container, HostViews};
use crate::errors::{BridgeError, Result};
use crate::nwm::NativeWm;
use crate::shared::window_state::{offscreen_layout, padded_layout};
use crate::shared::{PositionFlags, StyleFlags, SurfaceHandle, SurfaceKind};
use crate::wm::icons::IconData;
use crate::wm::node::{NodeKind, WindowNode};
use crate::wm::stacking::{self, StackingManager, ZOrder};
use crate::wm::surface::BindOutcome;

/// Footprint given to a fresh client content view so the host allocates a backing
const CLIENT_KICKOFF_LAYOUT: Rect = Rect::new(0, 0, 1, 1);

/// One position change as reported by the NWM
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionUpdate {
    pub flags: PositionFlags,
    pub insert_after: u32,
    pub owner: WindowId,
    pub style: StyleFlags,
    pub window_rect: Rect,
    pub client_rect: Rect,
    pub visible_rect: Rect,
}

impl PositionUpdate {
    fn reorders(&self) -> bool {
        !self.flags.contains(PositionFlags::NO_ZORDER)
    }
}

#[derive(Debug)]
pub struct WindowTree {
    nodes: HashMap<WindowId, WindowNode>,

    stacking: StackingManager,

    desktop: Option<WindowId>,

    /// Host pixels per NWM unit
    dpi_scale: f32,

    /// Last title pushed to the host
    activity_title: Option<ActivityTitle>,
}

impl WindowTree {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            stacking: StackingManager::new(),
            desktop: None,
            dpi_scale: 1.0,
            activity_title: None,
        }
    }

    pub fn lookup(&self, id: WindowId) -> Option<&WindowNode> {
        self.nodes.get(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &WindowNode> {
        self.nodes.values()
    }

    /// Top-level windows, back to front
    pub fn stacking_order(&self) -> &[WindowId] {
        self.stacking.order()
    }

    pub fn desktop(&self) -> Option<WindowId> {
        self.desktop
    }

    pub fn dpi_scale(&self) -> f32 {
        self.dpi_scale
    }

    pub fn set_dpi_scale(&mut self, scale: f32) {
        self.dpi_scale = scale;
    }

    /// Register the desktop window. Its view is the desktop container's background.
    pub fn create_desktop(&mut self, id: WindowId) -> Result<()> {
        if self.desktop.is_some() {
            return Err(BridgeError::DesktopAlreadyCreated);
        }
        if self.nodes.contains_key(&id) {
            return Err(BridgeError::AlreadyExists(id));
        }
        info!("create desktop {:08x}", id);
        self.nodes.insert(id, WindowNode::new(id, NodeKind::Desktop, None, 1.0));
        self.desktop = Some(id);
        Ok(())
    }

    /// Mirror a newly created window.
    ///
    /// Windows without a parent become top-level windows at the back of the
    /// normal band; the message-only window and everything with a parent
    /// become children. Calling this again for a live id with `accelerated`
    /// set only starts accelerated rendering.
    pub fn create(
        &mut self,
        host: &mut dyn HostViews,
        id: WindowId,
        parent: WindowId,
        scale: f32,
        accelerated: bool,
        pid: u32,
    ) -> Result<()> {
        if id == 0 {
            return Err(BridgeError::InvalidTopology {
                id,
                parent,
                reason: "window id 0 is reserved",
            });
        }
        if self.nodes.contains_key(&id) {
            if accelerated {
                return self.start_accelerated(host, id);
            }
            return Err(BridgeError::AlreadyExists(id));
        }

        info!("create hwnd {:08x} parent {:08x}", id, parent);

        if parent == 0 && id != HWND_MESSAGE {
            let mut node = WindowNode::new(id, NodeKind::TopLevel { topmost: false }, None, scale);
            node.pid = pid;
            self.nodes.insert(id, node);
            self.stacking.add_window(id);
            self.host_top_level(host, id);
        } else {
            let parent = (parent != 0).then_some(parent);
            if let Some(parent) = parent {
                let parent_node = self
                    .nodes
                    .get_mut(&parent)
                    .ok_or(BridgeError::UnknownParent { id, parent })?;
                parent_node.children.push(id);
            }
            let mut node = WindowNode::new(id, NodeKind::Child, parent, scale);
            node.pid = pid;
            self.nodes.insert(id, node);
            self.ensure_containers(host, id);
        }

        if accelerated {
            self.start_accelerated(host, id)?;
        }
        Ok(())
    }

    /// Switch a window to accelerated rendering, creating its client content view
    pub fn start_accelerated(&mut self, host: &mut dyn HostViews, id: WindowId) -> Result<()> {
        let node = self.nodes.get_mut(&id).ok_or(BridgeError::UnknownWindow(id))?;
        info!("start accelerated rendering hwnd {:08x}", id);
        node.accelerated = true;
        Self::create_client_content(host, id);
        Ok(())
    }

    fn create_client_content(host: &mut dyn HostViews, id: WindowId) {
        if !host.has_containers(id) {
            return;
        }
        host.create_content(id, SurfaceKind::Client);
        // the correct layout is restored once the backing shows up
        host.layout(id, SurfaceKind::Client, CLIENT_KICKOFF_LAYOUT);
    }

    /// Containers, whole content view and desktop slot for a top-level window
    fn host_top_level(&self, host: &mut dyn HostViews, id: WindowId) {
        let Some(node) = self.nodes.get(&id) else {
            return;
        };
        host.create_containers(id);
        host.create_content(id, SurfaceKind::Whole);
        host.set_focusable(id, node.visible());
        host.insert(Container::Desktop, id, 0);
        self.place_top_level(host, id);
        host.layout(id, SurfaceKind::Client, padded_layout(node.client_layout()));
    }

    /// Create a window's containers, parents first, attaching it if visible
    fn ensure_containers(&self, host: &mut dyn HostViews, id: WindowId) {
        if host.has_containers(id) {
            return;
        }
        let Some(node) = self.nodes.get(&id) else {
            return;
        };
        if let Some(parent) = node.parent {
            self.ensure_containers(host, parent);
        }

        host.create_containers(id);
        host.layout(id, SurfaceKind::Client, padded_layout(node.client_layout()));
        if node.parent.is_some() {
            host.layout(id, SurfaceKind::Whole, padded_layout(node.visible_rect));
            if node.visible() {
                stacking::attach_child_view(&self.nodes, host, id);
            }
        }
    }

    /// Whole container placement for a top-level window.
    ///
    /// Hidden windows are parked off-screen; while the whole backing is still
    /// pending one pixel stays on-screen.
    fn place_top_level(&self, host: &mut dyn HostViews, id: WindowId) {
        let Some(node) = self.nodes.get(&id) else {
            return;
        };
        let rect = if node.visible() {
            node.visible_rect
        } else {
            offscreen_layout(node.visible_rect, !node.surfaces.whole.is_bound())
        };
        host.layout(id, SurfaceKind::Whole, rect);
    }

    /// Tear down a window and everything below it. Unknown ids are ignored.
    pub fn destroy(&mut self, host: &mut dyn HostViews, nwm: &mut dyn NativeWm, id: WindowId) -> Result<()> {
        let Some(node) = self.nodes.get(&id) else {
            debug!("destroy: hwnd {:08x} already gone", id);
            return Ok(());
        };
        for child in node.children.clone().into_iter().rev() {
            self.destroy(host, nwm, child)?;
        }

        let Some(mut node) = self.nodes.remove(&id) else {
            return Ok(());
        };
        info!("destroy hwnd {:08x}", id);

        match node.kind {
            NodeKind::TopLevel { .. } => {
                self.stacking.remove_window(id);
                host.remove(Container::Desktop, id);
            }
            NodeKind::Child => {
                if let Some(parent) = node.parent {
                    if let Some(parent_node) = self.nodes.get_mut(&parent) {
                        parent_node.children.retain(|&w| w != id);
                    }
                    host.remove(Container::Client(parent), id);
                }
            }
            NodeKind::Desktop => self.desktop = None,
        }

        for kind in node.surfaces.release_all() {
            nwm.surface_changed(id, None, kind.is_client());
        }
        host.destroy_containers(id);

        if node.is_top_level() {
            self.refresh_title(host);
        }
        Ok(())
    }

    /// `candidate` sits somewhere below `ancestor`
    fn is_descendant(&self, candidate: WindowId, ancestor: WindowId) -> bool {
        let mut current = candidate;
        while let Some(parent) = self.nodes.get(&current).and_then(|n| n.parent) {
            if parent == ancestor {
                return true;
            }
            current = parent;
        }
        false
    }

    /// Move a window under a new parent (0 makes it top-level)
    pub fn reparent(
        &mut self,
        host: &mut dyn HostViews,
        nwm: &mut dyn NativeWm,
        id: WindowId,
        new_parent: WindowId,
        scale: f32,
    ) -> Result<()> {
        let node = self.nodes.get(&id).ok_or(BridgeError::UnknownTarget(id))?;
        let old_parent = node.parent;
        let was_top_level = node.is_top_level();

        if node.kind == NodeKind::Desktop {
            return Err(BridgeError::InvalidTopology {
                id,
                parent: new_parent,
                reason: "the desktop window cannot be reparented",
            });
        }
        if new_parent != 0 {
            if new_parent == id {
                return Err(BridgeError::InvalidTopology {
                    id,
                    parent: new_parent,
                    reason: "a window cannot be its own parent",
                });
            }
            if !self.nodes.contains_key(&new_parent) {
                return Err(BridgeError::UnknownTarget(new_parent));
            }
            if self.is_descendant(new_parent, id) {
                return Err(BridgeError::InvalidTopology {
                    id,
                    parent: new_parent,
                    reason: "the new parent is a descendant",
                });
            }
        }

        info!(
            "set parent hwnd {:08x} parent {:08x} -> {:08x}",
            id,
            old_parent.unwrap_or(0),
            new_parent
        );

        if new_parent == 0 {
            if old_parent.is_some() {
                self.child_to_top_level(host, nwm, id);
            }
        } else if was_top_level {
            self.top_level_to_child(host, nwm, id, new_parent);
        } else if old_parent != Some(new_parent) {
            self.move_child(host, id, new_parent);
        }

        self.set_scale_recursive(id, scale);
        Ok(())
    }

    /// Drop both containers, releasing the backings they held
    fn discard_views(&mut self, host: &mut dyn HostViews, nwm: &mut dyn NativeWm, id: WindowId) {
        if let Some(node) = self.nodes.get_mut(&id) {
            for kind in node.surfaces.release_all() {
                nwm.surface_changed(id, None, kind.is_client());
            }
        }
        host.destroy_containers(id);
    }

    /// Re-attach the visible children of a window whose containers were rebuilt
    fn reattach_children(&self, host: &mut dyn HostViews, id: WindowId) {
        let Some(node) = self.nodes.get(&id) else {
            return;
        };
        for &child in &node.children {
            if self.nodes.get(&child).is_some_and(WindowNode::visible) {
                stacking::attach_child_view(&self.nodes, host, child);
            }
        }
    }

    fn top_level_to_child(
        &mut self,
        host: &mut dyn HostViews,
        nwm: &mut dyn NativeWm,
        id: WindowId,
        new_parent: WindowId,
    ) {
        self.stacking.remove_window(id);
        host.remove(Container::Desktop, id);
        self.discard_views(host, nwm, id);

        if let Some(node) = self.nodes.get_mut(&id) {
            node.kind = NodeKind::Child;
            node.parent = Some(new_parent);
        }
        if let Some(parent_node) = self.nodes.get_mut(&new_parent) {
            parent_node.children.push(id);
        }

        self.ensure_containers(host, id);
        if self.nodes.get(&id).is_some_and(|n| n.accelerated) {
            Self::create_client_content(host, id);
        }
        self.reattach_children(host, id);

        self.stacking.sync_desktop(&self.nodes, host);
        self.refresh_title(host);
    }

    fn child_to_top_level(&mut self, host: &mut dyn HostViews, nwm: &mut dyn NativeWm, id: WindowId) {
        stacking::detach_child_view(&self.nodes, host, id);
        let old_parent = self.nodes.get(&id).and_then(|n| n.parent);
        if let Some(parent_node) = old_parent.and_then(|p| self.nodes.get_mut(&p)) {
            parent_node.children.retain(|&w| w != id);
        }
        self.discard_views(host, nwm, id);

        if let Some(node) = self.nodes.get_mut(&id) {
            node.kind = NodeKind::TopLevel { topmost: false };
            node.parent = None;
        }
        self.stacking.add_window(id);
        self.host_top_level(host, id);
        if self.nodes.get(&id).is_some_and(|n| n.accelerated) {
            Self::create_client_content(host, id);
        }
        self.reattach_children(host, id);

        self.stacking.sync_desktop(&self.nodes, host);
        self.refresh_title(host);
    }

    /// Child to a different parent; the window keeps its own containers
    fn move_child(&mut self, host: &mut dyn HostViews, id: WindowId, new_parent: WindowId) {
        let Some(node) = self.nodes.get(&id) else {
            return;
        };
        let visible = node.visible();
        let old_parent = node.parent;

        if visible {
            stacking::detach_child_view(&self.nodes, host, id);
        }
        if let Some(parent_node) = old_parent.and_then(|p| self.nodes.get_mut(&p)) {
            parent_node.children.retain(|&w| w != id);
        }
        if let Some(node) = self.nodes.get_mut(&id) {
            node.parent = Some(new_parent);
        }
        if let Some(parent_node) = self.nodes.get_mut(&new_parent) {
            parent_node.children.push(id);
        }

        self.ensure_containers(host, new_parent);
        if !host.has_containers(id) {
            self.ensure_containers(host, id);
            return;
        }
        if let Some(node) = self.nodes.get(&id) {
            host.layout(id, SurfaceKind::Whole, padded_layout(node.visible_rect));
        }
        if visible {
            stacking::attach_child_view(&self.nodes, host, id);
        }
    }

    fn set_scale_recursive(&mut self, id: WindowId, scale: f32) {
        let mut pending = vec![id];
        while let Some(current) = pending.pop() {
            if let Some(node) = self.nodes.get_mut(&current) {
                node.scale = scale;
                pending.extend(node.children.iter().copied());
            }
        }
    }

    /// Apply a position, style and stacking change
    pub fn apply_position(&mut self, host: &mut dyn HostViews, id: WindowId, update: PositionUpdate) -> Result<()> {
        let kind = self.nodes.get(&id).ok_or(BridgeError::UnknownWindow(id))?.kind;
        let order = ZOrder::from_insert_after(update.insert_after);
        if update.reorders() && order == ZOrder::After(id) {
            return Err(BridgeError::SelfReference(id));
        }

        debug!(
            "pos changed hwnd {:08x} after {:08x} owner {:08x} style {:08x} win {} client {} visible {} flags {:08x}",
            id,
            update.insert_after,
            update.owner,
            update.style.bits(),
            update.window_rect,
            update.client_rect,
            update.visible_rect,
            update.flags.bits()
        );

        match kind {
            NodeKind::Desktop => {
                if let Some(node) = self.nodes.get_mut(&id) {
                    Self::store_position(node, &update);
                }
                Ok(())
            }
            NodeKind::TopLevel { .. } => self.position_top_level(host, id, order, &update),
            NodeKind::Child => self.position_child(host, id, order, &update),
        }
    }

    /// Record the new geometry; returns (was visible, was minimized)
    fn store_position(node: &mut WindowNode, update: &PositionUpdate) -> (bool, bool) {
        let before = (node.visible(), node.minimized());
        node.window_rect = update.window_rect;
        node.client_rect = update.client_rect;
        node.visible_rect = update.visible_rect;
        node.style = update.style;
        node.owner = update.owner;
        before
    }

    fn position_top_level(
        &mut self,
        host: &mut dyn HostViews,
        id: WindowId,
        order: ZOrder,
        update: &PositionUpdate,
    ) -> Result<()> {
        let Some(node) = self.nodes.get_mut(&id) else {
            return Err(BridgeError::UnknownWindow(id));
        };
        let (was_visible, was_minimized) = Self::store_position(node, update);
        let visible = node.visible();
        let minimized_changed = was_minimized != node.minimized();
        let client = node.client_layout();
        let show = !was_visible && visible;
        let hide = was_visible && !visible;

        self.place_top_level(host, id);
        if show {
            host.set_focusable(id, true);
        } else if hide {
            host.set_focusable(id, false);
        }
        host.layout(id, SurfaceKind::Client, padded_layout(client));

        if update.reorders() {
            self.stacking.restack(&mut self.nodes, id, order)?;
        }
        if update.reorders() || show || hide || minimized_changed {
            self.stacking.sync_desktop(&self.nodes, host);
        }
        self.refresh_title(host);
        Ok(())
    }

    fn position_child(
        &mut self,
        host: &mut dyn HostViews,
        id: WindowId,
        order: ZOrder,
        update: &PositionUpdate,
    ) -> Result<()> {
        let Some(node) = self.nodes.get_mut(&id) else {
            return Err(BridgeError::UnknownWindow(id));
        };
        let (was_visible, _) = Self::store_position(node, update);
        let visible = node.visible();
        let parent = node.parent;
        let visible_rect = node.visible_rect;
        let client = node.client_layout();

        if update.reorders() && parent.is_some() {
            stacking::restack_child(&mut self.nodes, id, order)?;
        }

        if !host.has_containers(id) {
            return Ok(());
        }
        if let Some(parent) = parent {
            host.layout(id, SurfaceKind::Whole, padded_layout(visible_rect));
            if !was_visible && visible {
                stacking::attach_child_view(&self.nodes, host, id);
            } else if was_visible && !visible {
                stacking::detach_child_view(&self.nodes, host, id);
            } else if visible && update.reorders() {
                stacking::sync_child_views(&self.nodes, host, parent);
            }
        }
        host.layout(id, SurfaceKind::Client, padded_layout(client));
        Ok(())
    }

    /// Returns whether the focused window is a top-level one
    pub fn focus(&mut self, host: &mut dyn HostViews, id: WindowId) -> Result<bool> {
        let node = self.nodes.get(&id).ok_or(BridgeError::UnknownWindow(id))?;
        info!("focus hwnd {:08x}", id);
        if !node.is_top_level() {
            return Ok(false);
        }
        host.set_focusable(id, true);
        self.refresh_title(host);
        Ok(true)
    }

    pub fn set_text(&mut self, host: &mut dyn HostViews, id: WindowId, text: String) -> Result<()> {
        let node = self.nodes.get_mut(&id).ok_or(BridgeError::UnknownWindow(id))?;
        info!("set text hwnd {:08x} '{}'", id, text);
        node.title = Some(text);
        if node.is_top_level() {
            self.refresh_title(host);
        }
        Ok(())
    }

    pub fn set_icon(&mut self, host: &mut dyn HostViews, id: WindowId, icon: Option<IconData>) -> Result<()> {
        let node = self.nodes.get_mut(&id).ok_or(BridgeError::UnknownWindow(id))?;
        debug!("set icon hwnd {:08x}", id);
        node.icon = icon;
        if node.is_top_level() {
            self.refresh_title(host);
        }
        Ok(())
    }

    /// Push the title of the front-most eligible top-level window, if it changed
    fn refresh_title(&mut self, host: &mut dyn HostViews) {
        let title = self
            .stacking
            .order()
            .iter()
            .rev()
            .filter_map(|w| self.nodes.get(w))
            .find(|node| node.title_candidate())
            .and_then(|node| {
                node.title.clone().map(|text| ActivityTitle {
                    text,
                    icon: node.icon.clone(),
                })
            });

        if title != self.activity_title {
            host.set_activity_title(title.as_ref());
            self.activity_title = title;
        }
    }

    /// The host allocated (or resized) the backing of a content view
    pub fn surface_available(
        &mut self,
        host: &mut dyn HostViews,
        nwm: &mut dyn NativeWm,
        id: WindowId,
        kind: SurfaceKind,
        handle: SurfaceHandle,
    ) -> Result<()> {
        let node = self.nodes.get_mut(&id).ok_or(BridgeError::UnknownWindow(id))?;
        debug!("surface available hwnd {:08x} {:?} {:?}", id, kind, handle);

        if kind == SurfaceKind::Whole && node.is_top_level() && !node.visible() && !node.surfaces.whole.is_bound() {
            debug!("hwnd {:08x} not visible, moving offscreen", id);
            host.layout(id, SurfaceKind::Whole, offscreen_layout(node.visible_rect, false));
        }

        let outcome = node.surfaces.get_mut(kind).bind(handle);
        if outcome == BindOutcome::New && kind == SurfaceKind::Client {
            // first time shown, set the correct position
            host.layout(id, SurfaceKind::Client, padded_layout(node.client_layout()));
        }

        nwm.surface_changed(id, Some(handle), kind.is_client());
        Ok(())
    }

    /// The host dropped a backing
    pub fn surface_destroyed(&mut self, nwm: &mut dyn NativeWm, id: WindowId, kind: SurfaceKind) -> Result<()> {
        let node = self.nodes.get_mut(&id).ok_or(BridgeError::UnknownWindow(id))?;
        debug!("surface destroyed hwnd {:08x} {:?}", id, kind);
        if node.surfaces.get_mut(kind).release().is_some() {
            nwm.surface_changed(id, None, kind.is_client());
        }
        Ok(())
    }

    /// A content view became visible (or invisible) on the host
    pub fn view_visibility_changed(
        &mut self,
        nwm: &mut dyn NativeWm,
        id: WindowId,
        kind: SurfaceKind,
        visible: bool,
    ) -> Result<()> {
        let node = self.nodes.get(&id).ok_or(BridgeError::UnknownWindow(id))?;
        debug!("hwnd {:08x} {:?} view visibility {}", id, kind, visible);
        if visible {
            if let Some(handle) = node.surfaces.get(kind).handle() {
                nwm.surface_changed(id, Some(handle), kind.is_client());
            }
        }
        Ok(())
    }

    /// The hosting activity came to the foreground
    pub fn activity_started(&mut self, host: &mut dyn HostViews, nwm: &mut dyn NativeWm) {
        for &id in self.stacking.order() {
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            if node.minimized() {
                nwm.syscommand(id, SC_RESTORE);
            }
            host.set_shown(id, true);
        }
    }

    /// The hosting activity went to the background; bindings are kept
    pub fn activity_stopped(&mut self, host: &mut dyn HostViews) {
        for &id in self.stacking.order() {
            host.set_shown(id, false);
        }
    }

    /// Check the structural invariants against the host. Test support.
    #[cfg(test)]
    pub(crate) fn check_invariants(&self, host: &dyn HostViews) -> std::result::Result<(), String> {
        for node in self.nodes.values() {
            if let Some(parent) = node.parent {
                let parent_node = self
                    .nodes
                    .get(&parent)
                    .ok_or(format!("{:08x}: parent {:08x} missing", node.id, parent))?;
                let count = parent_node.children.iter().filter(|&&c| c == node.id).count();
                if count != 1 {
                    return Err(format!("{:08x} listed {} times under {:08x}", node.id, count, parent));
                }
            }
            for child in &node.children {
                let child_node = self
                    .nodes
                    .get(child)
                    .ok_or(format!("{:08x}: child {:08x} missing", node.id, child))?;
                if child_node.parent != Some(node.id) {
                    return Err(format!("{:08x} does not point back at {:08x}", child, node.id));
                }
            }
            if host.has_containers(node.id) {
                let visible: Vec<WindowId> = node
                    .children
                    .iter()
                    .copied()
                    .filter(|c| self.nodes.get(c).is_some_and(WindowNode::visible))
                    .collect();
                let attached = host.children(Container::Client(node.id));
                if visible != attached {
                    return Err(format!(
                        "{:08x}: visible children {:?} but host has {:?}",
                        node.id, visible, attached
                    ));
                }
            }
        }

        let mut top_levels: Vec<WindowId> =
            self.nodes.values().filter(|n| n.is_top_level()).map(|n| n.id).collect();
        let mut listed = self.stacking.order().to_vec();
        top_levels.sort_unstable();
        listed.sort_unstable();
        if top_levels != listed {
            return Err(format!("stacking list {:?} vs top-levels {:?}", listed, top_levels));
        }
        let bands: Vec<bool> = self.stacking.order().iter().map(|w| self.nodes[w].topmost()).collect();
        if bands.windows(2).any(|pair| pair[0] && !pair[1]) {
            return Err(format!("topmost band not contiguous: {:?}", self.stacking.order()));
        }

        let stacked = |w: &WindowId| self.nodes.get(w).is_some_and(WindowNode::stacked_visible);
        let wanted: Vec<WindowId> = self.stacking.order().iter().copied().filter(stacked).collect();
        let shown: Vec<WindowId> = host.children(Container::Desktop).into_iter().filter(stacked).collect();
        if wanted != shown {
            return Err(format!("desktop order {:?} but stacking order {:?}", shown, wanted));
        }
        Ok(())
    }
}

impl Default for WindowTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::SceneHost;
    use crate::nwm::RecordingNwm;
    use nwm_bridge_ipc::codes::{HWND_BOTTOM, HWND_TOP, HWND_TOPMOST};
    use nwm_bridge_ipc::NwmCall;

    struct Fixture {
        tree: WindowTree,
        host: SceneHost,
        nwm: RecordingNwm,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                tree: WindowTree::new(),
                host: SceneHost::default(),
                nwm: RecordingNwm::new(),
            }
        }

        fn create(&mut self, id: WindowId, parent: WindowId) {
            self.tree.create(&mut self.host, id, parent, 1.0, false, 100).unwrap();
        }

        fn position(&mut self, id: WindowId, insert_after: u32, visible: bool, flags: PositionFlags) {
            let update = PositionUpdate {
                flags,
                insert_after,
                owner: 0,
                style: if visible { StyleFlags::VISIBLE } else { StyleFlags::empty() },
                window_rect: Rect::new(10, 10, 110, 90),
                client_rect: Rect::new(12, 30, 108, 88),
                visible_rect: Rect::new(10, 10, 110, 90),
            };
            self.tree.apply_position(&mut self.host, id, update).unwrap();
        }

        fn show(&mut self, id: WindowId, insert_after: u32) {
            self.position(id, insert_after, true, PositionFlags::empty());
        }

        fn hide(&mut self, id: WindowId) {
            self.position(id, HWND_TOP, false, PositionFlags::NO_ZORDER);
        }

        fn destroy(&mut self, id: WindowId) {
            self.tree.destroy(&mut self.host, &mut self.nwm, id).unwrap();
        }

        fn reparent(&mut self, id: WindowId, parent: WindowId) -> Result<()> {
            self.tree.reparent(&mut self.host, &mut self.nwm, id, parent, 1.0)
        }

        fn assert_tree_consistent(&self) {
            if let Err(msg) = self.tree.check_invariants(&self.host) {
                panic!("tree inconsistent: {}", msg);
            }
        }
    }

    #[test]
    fn test_child_ordering_scenario() {
        let mut fx = Fixture::new();
        fx.create(10, 0);
        fx.show(10, HWND_TOP);
        fx.create(11, 10);
        fx.show(11, HWND_TOP);

        fx.create(20, 10);
        fx.show(20, HWND_TOP);
        fx.show(11, HWND_TOP);
        fx.create(21, 10);
        fx.show(21, HWND_TOP);
        fx.show(11, HWND_TOP);
        assert_eq!(fx.tree.lookup(10).unwrap().children.last(), Some(&11));
        fx.destroy(20);
        fx.destroy(21);
        fx.assert_tree_consistent();

        fx.create(12, 10);
        fx.show(12, HWND_TOP);
        fx.hide(11);
        assert_eq!(fx.host.children(Container::Client(10)), vec![12]);

        fx.show(11, 12);
        assert_eq!(fx.host.children(Container::Client(10)), vec![12, 11]);
        assert_eq!(fx.tree.lookup(10).unwrap().children, vec![12, 11]);
        fx.assert_tree_consistent();
    }

    #[test]
    fn test_new_window_goes_behind_topmost() {
        let mut fx = Fixture::new();
        fx.create(0x30, 0);
        fx.show(0x30, HWND_TOPMOST);
        fx.create(0x31, 0);

        assert_eq!(fx.tree.stacking_order(), &[0x31, 0x30]);
        assert!(fx.tree.lookup(0x30).unwrap().topmost());

        fx.show(0x31, HWND_TOP);
        assert_eq!(fx.tree.stacking_order(), &[0x31, 0x30]);
        assert_eq!(fx.host.children(Container::Desktop), vec![0x31, 0x30]);
        fx.assert_tree_consistent();
    }

    #[test]
    fn test_show_without_reorder_takes_stacking_slot() {
        let mut fx = Fixture::new();
        fx.create(1, 0);
        fx.create(2, 0);
        fx.show(2, HWND_TOP);
        assert_eq!(fx.tree.stacking_order(), &[1, 2]);
        assert_eq!(fx.host.children(Container::Desktop), vec![2, 1]);

        fx.position(1, HWND_TOP, true, PositionFlags::NO_ZORDER);
        assert_eq!(fx.tree.stacking_order(), &[1, 2]);
        assert_eq!(fx.host.children(Container::Desktop), vec![1, 2]);
        fx.assert_tree_consistent();
    }

    #[test]
    fn test_hidden_children_are_detached() {
        let mut fx = Fixture::new();
        fx.create(1, 0);
        for id in [2, 3, 4] {
            fx.create(id, 1);
            fx.show(id, HWND_TOP);
        }
        fx.hide(3);
        assert_eq!(fx.host.children(Container::Client(1)), vec![2, 4]);

        // reorder while hidden, then show without a reorder
        fx.position(3, HWND_BOTTOM, false, PositionFlags::empty());
        fx.position(3, HWND_TOP, true, PositionFlags::NO_ZORDER);
        assert_eq!(fx.host.children(Container::Client(1)), vec![3, 2, 4]);
        fx.assert_tree_consistent();
    }

    #[test]
    fn test_destroy_is_idempotent_and_recursive() {
        let mut fx = Fixture::new();
        fx.create(1, 0);
        fx.create(2, 1);
        fx.create(3, 2);
        fx.tree
            .surface_available(&mut fx.host, &mut fx.nwm, 3, SurfaceKind::Client, SurfaceHandle(9))
            .unwrap();
        fx.nwm.drain();

        fx.destroy(1);
        assert!(fx.tree.is_empty());
        assert!(fx.tree.stacking_order().is_empty());
        assert!(!fx.host.has_containers(3));
        assert_eq!(
            fx.nwm.drain(),
            vec![NwmCall::SurfaceChanged { window_id: 3, surface: None, client: true }]
        );

        fx.destroy(1);
        fx.destroy(3);
        assert!(fx.nwm.calls().is_empty());
        fx.assert_tree_consistent();
    }

    #[test]
    fn test_create_errors() {
        let mut fx = Fixture::new();
        fx.create(1, 0);
        assert_eq!(
            fx.tree.create(&mut fx.host, 1, 0, 1.0, false, 0),
            Err(BridgeError::AlreadyExists(1))
        );
        assert_eq!(
            fx.tree.create(&mut fx.host, 5, 0x77, 1.0, false, 0),
            Err(BridgeError::UnknownParent { id: 5, parent: 0x77 })
        );
        assert!(fx.tree.lookup(5).is_none());

        // a second create with the accelerated flag starts accelerated rendering
        fx.tree.create(&mut fx.host, 1, 0, 1.0, true, 0).unwrap();
        assert!(fx.tree.lookup(1).unwrap().accelerated);
        let win = fx.host.window(1).unwrap();
        assert!(win.client_content);
        assert_eq!(win.client_layout, Rect::new(0, 0, 1, 1));
    }

    #[test]
    fn test_message_window_is_detached() {
        let mut fx = Fixture::new();
        fx.create(HWND_MESSAGE, 0);
        let node = fx.tree.lookup(HWND_MESSAGE).unwrap();
        assert_eq!(node.kind, NodeKind::Child);
        assert!(node.parent.is_none());
        assert!(fx.tree.stacking_order().is_empty());
        assert!(fx.host.children(Container::Desktop).is_empty());
    }

    #[test]
    fn test_hidden_top_level_placement() {
        let mut fx = Fixture::new();
        fx.create(1, 0);
        fx.position(1, HWND_TOP, false, PositionFlags::empty());
        // no backing yet: one pixel stays on-screen
        assert_eq!(fx.host.window(1).unwrap().whole_layout, Rect::new(-99, -79, 1, 1));

        fx.show(1, HWND_TOP);
        assert_eq!(fx.host.window(1).unwrap().whole_layout, Rect::new(10, 10, 110, 90));
        assert!(fx.host.window(1).unwrap().focusable);

        fx.tree
            .surface_available(&mut fx.host, &mut fx.nwm, 1, SurfaceKind::Whole, SurfaceHandle(1))
            .unwrap();
        fx.hide(1);
        assert_eq!(fx.host.window(1).unwrap().whole_layout, Rect::new(-100, -80, 0, 0));
        assert!(!fx.host.window(1).unwrap().focusable);
    }

    #[test]
    fn test_surface_survives_hide() {
        let mut fx = Fixture::new();
        fx.create(1, 0);
        fx.show(1, HWND_TOP);
        fx.tree
            .surface_available(&mut fx.host, &mut fx.nwm, 1, SurfaceKind::Whole, SurfaceHandle(5))
            .unwrap();
        fx.hide(1);
        fx.position(1, HWND_TOP, true, PositionFlags::SHOW_WINDOW | PositionFlags::NO_ZORDER);
        fx.hide(1);

        let node = fx.tree.lookup(1).unwrap();
        assert_eq!(node.surfaces.whole.handle(), Some(SurfaceHandle(5)));

        fx.tree.surface_destroyed(&mut fx.nwm, 1, SurfaceKind::Whole).unwrap();
        assert!(!fx.tree.lookup(1).unwrap().surfaces.whole.is_bound());
        assert_eq!(
            fx.nwm.calls().last(),
            Some(&NwmCall::SurfaceChanged { window_id: 1, surface: None, client: false })
        );
    }

    #[test]
    fn test_backing_for_hidden_window_moves_it_offscreen() {
        let mut fx = Fixture::new();
        fx.create(1, 0);
        fx.position(1, HWND_TOP, false, PositionFlags::empty());
        fx.tree
            .surface_available(&mut fx.host, &mut fx.nwm, 1, SurfaceKind::Whole, SurfaceHandle(3))
            .unwrap();
        assert_eq!(fx.host.window(1).unwrap().whole_layout, Rect::new(-100, -80, 0, 0));
        assert_eq!(
            fx.nwm.calls(),
            vec![NwmCall::SurfaceChanged { window_id: 1, surface: Some(3), client: false }]
        );
    }

    #[test]
    fn test_first_client_backing_restores_layout() {
        let mut fx = Fixture::new();
        fx.create(1, 0);
        fx.show(1, HWND_TOP);
        fx.tree.start_accelerated(&mut fx.host, 1).unwrap();
        assert_eq!(fx.host.window(1).unwrap().client_layout, Rect::new(0, 0, 1, 1));

        fx.tree
            .surface_available(&mut fx.host, &mut fx.nwm, 1, SurfaceKind::Client, SurfaceHandle(8))
            .unwrap();
        assert_eq!(fx.host.window(1).unwrap().client_layout, Rect::new(2, 20, 98, 78));

        // a resize reports the same backing again and re-notifies
        fx.tree
            .surface_available(&mut fx.host, &mut fx.nwm, 1, SurfaceKind::Client, SurfaceHandle(8))
            .unwrap();
        assert_eq!(fx.nwm.calls().len(), 2);

        fx.tree.view_visibility_changed(&mut fx.nwm, 1, SurfaceKind::Client, true).unwrap();
        fx.tree.view_visibility_changed(&mut fx.nwm, 1, SurfaceKind::Whole, true).unwrap();
        assert_eq!(fx.nwm.calls().len(), 3);
    }

    #[test]
    fn test_reparent_top_level_to_child_and_back() {
        let mut fx = Fixture::new();
        fx.create(1, 0);
        fx.show(1, HWND_TOP);
        fx.create(2, 0);
        fx.show(2, HWND_TOP);
        fx.create(3, 2);
        fx.show(3, HWND_TOP);
        fx.tree
            .surface_available(&mut fx.host, &mut fx.nwm, 2, SurfaceKind::Whole, SurfaceHandle(4))
            .unwrap();
        fx.nwm.drain();

        fx.reparent(2, 1).unwrap();
        let node = fx.tree.lookup(2).unwrap();
        assert_eq!(node.kind, NodeKind::Child);
        assert!(!node.surfaces.whole.is_bound());
        assert_eq!(fx.tree.stacking_order(), &[1]);
        assert_eq!(fx.host.children(Container::Client(1)), vec![2]);
        assert_eq!(fx.host.children(Container::Client(2)), vec![3]);
        assert_eq!(
            fx.nwm.drain(),
            vec![NwmCall::SurfaceChanged { window_id: 2, surface: None, client: false }]
        );
        fx.assert_tree_consistent();

        fx.reparent(2, 0).unwrap();
        assert!(fx.tree.lookup(2).unwrap().is_top_level());
        assert!(fx.host.window(2).unwrap().whole_content);
        assert!(fx.host.children(Container::Client(1)).is_empty());
        assert_eq!(fx.host.children(Container::Client(2)), vec![3]);
        fx.assert_tree_consistent();
    }

    #[test]
    fn test_reparent_child_between_parents() {
        let mut fx = Fixture::new();
        fx.create(1, 0);
        fx.create(2, 0);
        fx.create(3, 1);
        fx.show(3, HWND_TOP);
        fx.create(4, 3);
        fx.show(4, HWND_TOP);

        fx.tree.reparent(&mut fx.host, &mut fx.nwm, 3, 2, 2.0).unwrap();
        assert!(fx.tree.lookup(1).unwrap().children.is_empty());
        assert_eq!(fx.tree.lookup(2).unwrap().children, vec![3]);
        assert_eq!(fx.host.children(Container::Client(2)), vec![3]);
        assert_eq!(fx.host.children(Container::Client(3)), vec![4]);
        assert_eq!(fx.tree.lookup(4).unwrap().scale, 2.0);
        fx.assert_tree_consistent();
    }

    #[test]
    fn test_reparent_rejects_bad_topology() {
        let mut fx = Fixture::new();
        fx.create(1, 0);
        fx.create(2, 1);
        fx.create(3, 2);

        assert!(matches!(fx.reparent(1, 3), Err(BridgeError::InvalidTopology { .. })));
        assert!(matches!(fx.reparent(2, 2), Err(BridgeError::InvalidTopology { .. })));
        assert_eq!(fx.reparent(9, 1), Err(BridgeError::UnknownTarget(9)));
        assert_eq!(fx.reparent(2, 9), Err(BridgeError::UnknownTarget(9)));
        assert_eq!(fx.tree.lookup(3).unwrap().parent, Some(2));
        fx.assert_tree_consistent();
    }

    #[test]
    fn test_position_errors_leave_state_alone() {
        let mut fx = Fixture::new();
        fx.create(1, 0);
        fx.create(2, 1);
        fx.show(2, HWND_TOP);

        let update = PositionUpdate {
            flags: PositionFlags::empty(),
            insert_after: 2,
            owner: 0,
            style: StyleFlags::empty(),
            window_rect: Rect::default(),
            client_rect: Rect::default(),
            visible_rect: Rect::default(),
        };
        assert_eq!(
            fx.tree.apply_position(&mut fx.host, 2, update),
            Err(BridgeError::SelfReference(2))
        );
        assert!(fx.tree.lookup(2).unwrap().visible());
        assert_eq!(
            fx.tree.apply_position(&mut fx.host, 7, update),
            Err(BridgeError::UnknownWindow(7))
        );
    }

    #[test]
    fn test_activity_title_tracks_front_window() {
        let mut fx = Fixture::new();
        fx.create(1, 0);
        fx.create(2, 0);
        fx.tree.set_text(&mut fx.host, 1, "Notepad".into()).unwrap();
        fx.tree.set_text(&mut fx.host, 2, "Calc".into()).unwrap();
        assert!(fx.host.title().is_none());

        fx.show(1, HWND_TOP);
        fx.show(2, HWND_TOP);
        assert_eq!(fx.host.title().map(|t| t.text.as_str()), Some("Calc"));

        let updates = fx.host.title_updates();
        fx.show(2, HWND_TOP);
        assert_eq!(fx.host.title_updates(), updates);

        fx.destroy(2);
        assert_eq!(fx.host.title().map(|t| t.text.as_str()), Some("Notepad"));
    }

    #[test]
    fn test_activity_start_restores_minimized() {
        let mut fx = Fixture::new();
        fx.create(1, 0);
        let update = PositionUpdate {
            flags: PositionFlags::empty(),
            insert_after: HWND_TOP,
            owner: 0,
            style: StyleFlags::VISIBLE | StyleFlags::MINIMIZE,
            window_rect: Rect::default(),
            client_rect: Rect::default(),
            visible_rect: Rect::default(),
        };
        fx.tree.apply_position(&mut fx.host, 1, update).unwrap();

        fx.tree.activity_stopped(&mut fx.host);
        assert!(!fx.host.window(1).unwrap().shown);

        fx.tree.activity_started(&mut fx.host, &mut fx.nwm);
        assert!(fx.host.window(1).unwrap().shown);
        assert_eq!(fx.nwm.calls(), vec![NwmCall::SysCommand { window_id: 1, command: SC_RESTORE }]);
    }
}
