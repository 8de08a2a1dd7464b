//! Stacking Module
//!
//! Z-order of mirrored windows. Top-level windows share one global list;
//! child windows are ordered within their parent's `children`. Both are kept
//! back to front (index 0 is the back) and are the authoritative order; the
//! host containers are brought in line with them after every change.

use std::collections::HashMap;

use nwm_bridge_ipc::codes::{HWND_BOTTOM, HWND_NOTOPMOST, HWND_TOP, HWND_TOPMOST};
use nwm_bridge_ipc::WindowId;
use tracing::{debug, warn};

use crate::compositor::{Container, HostViews};
use crate::errors::{BridgeError, Result};
use crate::wm::node::WindowNode;

/// Stacking directive carried by a position change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZOrder {
    Top,
    Bottom,
    TopMost,
    NoTopMost,
    /// Directly in front of the referenced window
    After(WindowId),
}

impl ZOrder {
    pub fn from_insert_after(insert_after: u32) -> Self {
        match insert_after {
            HWND_TOP => Self::Top,
            HWND_BOTTOM => Self::Bottom,
            HWND_TOPMOST => Self::TopMost,
            HWND_NOTOPMOST => Self::NoTopMost,
            id => Self::After(id),
        }
    }
}

/// Stacking manager for top-level windows
#[derive(Debug)]
pub struct StackingManager {
    /// Stacking order (back to front); topmost windows form the front suffix
    stacking_order: Vec<WindowId>,
}

impl StackingManager {
    /// Create a new stacking manager
    pub fn new() -> Self {
        Self {
            stacking_order: Vec::new(),
        }
    }

    /// Get stacking order (back to front)
    pub fn order(&self) -> &[WindowId] {
        &self.stacking_order
    }

    pub fn contains(&self, window: WindowId) -> bool {
        self.stacking_order.contains(&window)
    }

    /// New top-level windows start at the back of the normal band
    pub fn add_window(&mut self, window: WindowId) {
        if !self.contains(window) {
            self.stacking_order.insert(0, window);
        }
    }

    /// Remove window from stacking order
    pub fn remove_window(&mut self, window: WindowId) {
        self.stacking_order.retain(|&w| w != window);
    }

    /// First index of the topmost band
    fn band_boundary(&self, nodes: &HashMap<WindowId, WindowNode>) -> usize {
        self.stacking_order
            .iter()
            .position(|w| nodes.get(w).is_some_and(WindowNode::topmost))
            .unwrap_or(self.stacking_order.len())
    }

    /// Apply a directive to a top-level window
    pub fn restack(
        &mut self,
        nodes: &mut HashMap<WindowId, WindowNode>,
        window: WindowId,
        order: ZOrder,
    ) -> Result<()> {
        if order == ZOrder::After(window) {
            return Err(BridgeError::SelfReference(window));
        }
        let topmost = nodes
            .get(&window)
            .map(WindowNode::topmost)
            .ok_or(BridgeError::UnknownWindow(window))?;

        // an unresolvable reference degrades to Bottom
        let order = match order {
            ZOrder::After(prev) if !self.contains(prev) => {
                debug!("Stack reference {:08x} not a top-level window, using bottom", prev);
                ZOrder::Bottom
            }
            other => other,
        };

        match order {
            ZOrder::Bottom => {
                set_topmost(nodes, window, false);
                self.remove_window(window);
                self.stacking_order.insert(0, window);
            }
            ZOrder::Top => {
                if !topmost {
                    self.remove_window(window);
                    let boundary = self.band_boundary(nodes);
                    self.stacking_order.insert(boundary, window);
                }
            }
            ZOrder::TopMost => {
                set_topmost(nodes, window, true);
                self.remove_window(window);
                self.stacking_order.push(window);
            }
            ZOrder::NoTopMost => {
                if topmost {
                    set_topmost(nodes, window, false);
                    self.remove_window(window);
                    let boundary = self.band_boundary(nodes);
                    self.stacking_order.insert(boundary, window);
                }
            }
            ZOrder::After(prev) => {
                self.remove_window(window);
                let boundary = self.band_boundary(nodes);
                let wanted = self
                    .stacking_order
                    .iter()
                    .position(|&w| w == prev)
                    .map_or(0, |pos| pos + 1);
                // stay inside our own band
                let index = if topmost { wanted.max(boundary) } else { wanted.min(boundary) };
                self.stacking_order.insert(index, window);
            }
        }

        self.log_order(nodes);
        Ok(())
    }

    /// Bring the desktop container in line with the stacking order.
    ///
    /// Hidden and minimized windows are skipped. The host order is walked
    /// back to front; once it stops matching, every remaining window is
    /// brought to the front in order.
    pub fn sync_desktop(&self, nodes: &HashMap<WindowId, WindowNode>, host: &mut dyn HostViews) {
        let wanted: Vec<WindowId> = self
            .stacking_order
            .iter()
            .copied()
            .filter(|w| nodes.get(w).is_some_and(WindowNode::stacked_visible))
            .collect();

        let mut matched = 0;
        for view in host.children(Container::Desktop) {
            if matched == wanted.len() {
                break;
            }
            if view == wanted[matched] {
                matched += 1;
            }
        }

        for &window in &wanted[matched..] {
            host.bring_to_front(Container::Desktop, window);
        }
    }

    fn log_order(&self, nodes: &HashMap<WindowId, WindowNode>) {
        let mut line = String::from("z-order:");
        for window in self.stacking_order.iter().rev() {
            line.push_str(&format!(" {:08x}", window));
            if let Some(node) = nodes.get(window) {
                if !node.visible() {
                    line.push_str(" (hidden)");
                }
                if node.minimized() {
                    line.push_str(" (minimized)");
                }
                if node.topmost() {
                    line.push_str(" (topmost)");
                }
            }
        }
        debug!("{}", line);
    }
}

impl Default for StackingManager {
    fn default() -> Self {
        Self::new()
    }
}

fn set_topmost(nodes: &mut HashMap<WindowId, WindowNode>, window: WindowId, value: bool) {
    if let Some(node) = nodes.get_mut(&window) {
        node.set_topmost(value);
    }
}

/// Apply a directive to a child window within its parent's sequence
pub fn restack_child(
    nodes: &mut HashMap<WindowId, WindowNode>,
    window: WindowId,
    order: ZOrder,
) -> Result<()> {
    if order == ZOrder::After(window) {
        return Err(BridgeError::SelfReference(window));
    }
    let parent = nodes
        .get(&window)
        .ok_or(BridgeError::UnknownWindow(window))?
        .parent;
    let Some(parent) = parent else {
        return Ok(());
    };
    let Some(parent_node) = nodes.get_mut(&parent) else {
        warn!("Parent {:08x} of {:08x} is gone", parent, window);
        return Ok(());
    };

    let siblings = &mut parent_node.children;
    siblings.retain(|&w| w != window);
    let index = match order {
        ZOrder::Bottom => 0,
        ZOrder::Top | ZOrder::TopMost | ZOrder::NoTopMost => siblings.len(),
        ZOrder::After(prev) => siblings.iter().position(|&w| w == prev).map_or(0, |pos| pos + 1),
    };
    siblings.insert(index, window);
    let siblings = siblings.clone();

    let mut line = format!("new z-order in parent {:08x}:", parent);
    for child in &siblings {
        let visible = nodes.get(child).is_some_and(WindowNode::visible);
        line.push_str(&if visible { format!(" {:08x}", child) } else { format!(" ({:08x})", child) });
    }
    debug!("{}", line);
    Ok(())
}

/// Attach a child's view to its parent's client container at its rank among
/// the siblings already attached.
pub fn attach_child_view(
    nodes: &HashMap<WindowId, WindowNode>,
    host: &mut dyn HostViews,
    window: WindowId,
) {
    let Some(parent) = nodes.get(&window).and_then(|node| node.parent) else {
        return;
    };
    let Some(parent_node) = nodes.get(&parent) else {
        return;
    };

    let container = Container::Client(parent);
    let attached = host.children(container);
    let rank = parent_node
        .children
        .iter()
        .take_while(|&&w| w != window)
        .filter(|w| attached.contains(*w))
        .count();
    host.insert(container, window, rank);

    log_container(host, parent, "after adding");
}

pub fn detach_child_view(
    nodes: &HashMap<WindowId, WindowNode>,
    host: &mut dyn HostViews,
    window: WindowId,
) {
    if let Some(parent) = nodes.get(&window).and_then(|node| node.parent) {
        host.remove(Container::Client(parent), window);
    }
}

/// Bring a parent's client container in line with its visible children
pub fn sync_child_views(
    nodes: &HashMap<WindowId, WindowNode>,
    host: &mut dyn HostViews,
    parent: WindowId,
) {
    let Some(parent_node) = nodes.get(&parent) else {
        return;
    };
    let wanted: Vec<WindowId> = parent_node
        .children
        .iter()
        .copied()
        .filter(|w| nodes.get(w).is_some_and(WindowNode::visible))
        .collect();

    let container = Container::Client(parent);
    let attached = host.children(container);
    let common = wanted
        .iter()
        .zip(attached.iter())
        .take_while(|(a, b)| a == b)
        .count();

    for &window in &wanted[common..] {
        host.bring_to_front(container, window);
    }

    log_container(host, parent, "synced");
}

fn log_container(host: &dyn HostViews, parent: WindowId, what: &str) {
    let views: Vec<String> = host
        .children(Container::Client(parent))
        .iter()
        .map(|w| format!("{:08x}", w))
        .collect();
    debug!("{} views z-order in parent {:08x}: {}", what, parent, views.join(" "));
}
