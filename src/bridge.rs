//! Bridge session
//!
//! [`Bridge`] owns everything one bridged session needs: the window tree,
//! input routing, the clipboard mirror, the startup gate, the host and the
//! NWM call sink. Every event is turned into a [`BridgeTask`] and applied on
//! the single task that runs [`Bridge::run`]; [`BridgeHandle`] is the
//! cross-thread way in.

use std::fs;
use std::sync::Arc;

use nwm_bridge_ipc::codes::{HWND_MESSAGE, NO_WINDOW};
use nwm_bridge_ipc::{CommandEnv, HostEvent, NwmCall, NwmEvent, ShellCommand, WindowId};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

use crate::clipboard::{ClipboardMirror, ClipboardReader};
use crate::compositor::Host;
use crate::config::Config;
use crate::errors::Result;
use crate::input::{EventRouter, ImeRelay};
use crate::nwm::NativeWm;
use crate::shared::{PositionFlags, StyleFlags, SurfaceHandle, SurfaceKind};
use crate::wm::device::{enumerate_gamepads, InputDeviceInfo, InputSource};
use crate::wm::icons::{CursorImage, IconData};
use crate::wm::startup::{StartupGate, Submitted};
use crate::wm::tree::{PositionUpdate, WindowTree};

/// Marker left in the prefix once first-run commands were issued
const FIRST_RUN_MARKER: &str = ".nwm-bridge-initialized";

/// Work for the bridge task
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeTask {
    Nwm(NwmEvent),
    Shell(ShellCommand),
    Host(HostEvent),
    Shutdown,
}

/// Cloneable, thread-safe way into a running bridge
#[derive(Debug, Clone)]
pub struct BridgeHandle {
    tx: UnboundedSender<BridgeTask>,
    gate: Arc<StartupGate>,
    clipboard: ClipboardReader,
}

impl BridgeHandle {
    /// Post a task; returns false once the bridge is gone
    pub fn post(&self, task: BridgeTask) -> bool {
        self.tx.send(task).is_ok()
    }

    pub fn nwm(&self, event: NwmEvent) -> bool {
        self.post(BridgeTask::Nwm(event))
    }

    pub fn host(&self, event: HostEvent) -> bool {
        self.post(BridgeTask::Host(event))
    }

    pub fn shutdown(&self) -> bool {
        self.post(BridgeTask::Shutdown)
    }

    /// Command requests go straight to the startup gate
    pub fn run_command_line(&self, cmdline: String, env: Option<CommandEnv>) -> Submitted {
        self.gate.submit_line(cmdline, env)
    }

    pub fn run_command_array(&self, args: Vec<String>, env: Option<CommandEnv>) -> Submitted {
        self.gate.submit_array(args, env)
    }

    /// Clipboard text for the NWM, readable from any thread
    pub fn clipboard_text(&self, flags: u32) -> String {
        self.clipboard.text(flags)
    }
}

/// Bridge
pub struct Bridge<H: Host> {
    tree: WindowTree,
    router: EventRouter,
    ime: ImeRelay,
    host: H,
    nwm: Box<dyn NativeWm>,
    gate: Arc<StartupGate>,
    clipboard: ClipboardMirror,
    config: Config,
}

impl<H: Host> Bridge<H> {
    /// `commands` receives forwarded startup commands
    pub fn new(config: Config, host: H, nwm: Box<dyn NativeWm>, commands: UnboundedSender<NwmCall>) -> Self {
        Self {
            tree: WindowTree::new(),
            router: EventRouter::with_wheel(config.input.wheel_step, config.input.horizontal_scroll_flag),
            ime: ImeRelay::new(),
            host,
            nwm,
            gate: Arc::new(StartupGate::new(commands)),
            clipboard: ClipboardMirror::new(config.clipboard.provider_authority.as_deref()),
            config,
        }
    }

    /// A handle plus the receiver to pass to [`Bridge::run`]
    pub fn channel(&self) -> (BridgeHandle, UnboundedReceiver<BridgeTask>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = BridgeHandle {
            tx,
            gate: Arc::clone(&self.gate),
            clipboard: self.clipboard.reader(),
        };
        (handle, rx)
    }

    pub fn tree(&self) -> &WindowTree {
        &self.tree
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn gate(&self) -> &StartupGate {
        &self.gate
    }

    /// Apply tasks until shutdown or until every handle is dropped
    pub async fn run(&mut self, mut rx: UnboundedReceiver<BridgeTask>) {
        info!("Bridge running");
        while let Some(task) = rx.recv().await {
            if !self.dispatch(task) {
                break;
            }
        }
        info!("Bridge stopped");
    }

    /// Apply one task; returns false on shutdown or once the desktop is closed
    pub fn dispatch(&mut self, task: BridgeTask) -> bool {
        let result = match task {
            BridgeTask::Nwm(event) => self.handle_nwm(event),
            BridgeTask::Shell(command) => return self.handle_shell(command),
            BridgeTask::Host(event) => self.handle_host(event),
            BridgeTask::Shutdown => return false,
        };

        if let Err(e) = result {
            if e.is_unknown_reference() {
                debug!("Dropped event: {}", e);
            } else {
                warn!("Dropped event: {}", e);
            }
        }
        true
    }

    fn handle_nwm(&mut self, event: NwmEvent) -> Result<()> {
        match event {
            NwmEvent::CreateDesktop { window_id, scaling } => self.create_desktop(window_id, scaling),
            NwmEvent::CreateWindow {
                window_id,
                accelerated,
                parent,
                scale,
                pid,
            } => self.tree.create(&mut self.host, window_id, parent, scale, accelerated, pid),
            NwmEvent::DestroyWindow { window_id } => {
                self.router.forget(window_id);
                self.tree.destroy(&mut self.host, self.nwm.as_mut(), window_id)
            }
            NwmEvent::SetParent {
                window_id,
                parent,
                scale,
                pid,
            } => {
                self.tree
                    .reparent(&mut self.host, self.nwm.as_mut(), window_id, parent, scale)?;
                debug!("hwnd {:08x} now owned by pid {}", window_id, pid);
                Ok(())
            }
            NwmEvent::SetPosition {
                window_id,
                flags,
                insert_after,
                owner,
                style,
                window_rect,
                client_rect,
                visible_rect,
            } => {
                let update = PositionUpdate {
                    flags: PositionFlags::from_raw(flags),
                    insert_after,
                    owner,
                    style: StyleFlags::from_style(style),
                    window_rect,
                    client_rect,
                    visible_rect,
                };
                self.tree.apply_position(&mut self.host, window_id, update)
            }
            NwmEvent::SetFocus { window_id } => {
                if self.tree.focus(&mut self.host, window_id)? {
                    enumerate_gamepads(&self.host.input_devices(), self.nwm.as_mut());
                }
                Ok(())
            }
            NwmEvent::SetText { window_id, text } => self.tree.set_text(&mut self.host, window_id, text),
            NwmEvent::SetIcon {
                window_id,
                width,
                height,
                pixels,
            } => {
                let icon = pixels
                    .map(|pixels| IconData::for_window(window_id, width, height, pixels))
                    .transpose()?;
                self.tree.set_icon(&mut self.host, window_id, icon)
            }
            NwmEvent::SetCursor { cursor } => {
                let cursor = CursorImage::try_from(cursor)?;
                self.host.set_cursor(&cursor);
                Ok(())
            }
            NwmEvent::CloseWindow { window_id } => {
                self.close_window(window_id);
                Ok(())
            }
            NwmEvent::PollClipboard => {
                self.clipboard.poll(&self.host, self.nwm.as_mut());
                Ok(())
            }
            NwmEvent::SetClipboard { text } => {
                self.clipboard.set(&mut self.host, text);
                Ok(())
            }
        }
    }

    /// Returns false once the desktop is closed
    fn handle_shell(&mut self, command: ShellCommand) -> bool {
        match command {
            ShellCommand::RunCommandLine { cmdline, env } => {
                self.gate.submit_line(cmdline, env);
            }
            ShellCommand::RunCommandArray { args, env } => {
                self.gate.submit_array(args, env);
            }
            ShellCommand::CloseDesktop => {
                info!("Closing desktop");
                self.host.finish();
                return false;
            }
        }
        true
    }

    fn handle_host(&mut self, event: HostEvent) -> Result<()> {
        match event {
            HostEvent::SurfaceAvailable {
                window_id,
                client,
                surface,
            } => self.tree.surface_available(
                &mut self.host,
                self.nwm.as_mut(),
                window_id,
                SurfaceKind::from_client_flag(client),
                SurfaceHandle(surface),
            ),
            HostEvent::SurfaceDestroyed { window_id, client } => {
                self.tree
                    .surface_destroyed(self.nwm.as_mut(), window_id, SurfaceKind::from_client_flag(client))
            }
            HostEvent::ViewVisibility {
                window_id,
                client,
                visible,
            } => self.tree.view_visibility_changed(
                self.nwm.as_mut(),
                window_id,
                SurfaceKind::from_client_flag(client),
                visible,
            ),
            HostEvent::DesktopResized { width, height } => {
                self.desktop_resized(width, height);
                Ok(())
            }
            HostEvent::Motion(sample) => {
                let handled = self.router.motion(&self.tree, self.nwm.as_mut(), &sample);
                debug!("motion on {:08x} handled: {}", sample.window_id, handled);
                Ok(())
            }
            HostEvent::Key(sample) => {
                let handled = self.router.key(self.nwm.as_mut(), &sample);
                debug!("key on {:08x} handled: {}", sample.window_id, handled);
                Ok(())
            }
            HostEvent::ImeCompose { text, cursor } => {
                self.ime.compose(self.nwm.as_mut(), &text, cursor);
                Ok(())
            }
            HostEvent::ImeCommit {
                text,
                cursor,
                key_events,
            } => {
                self.ime.commit(
                    &mut self.router,
                    self.nwm.as_mut(),
                    &text,
                    cursor,
                    key_events.as_deref(),
                );
                Ok(())
            }
            HostEvent::ImeFinish => {
                self.ime.finish(self.nwm.as_mut());
                Ok(())
            }
            HostEvent::ClearMetaKeyStates { states } => {
                self.ime.clear_meta_key_states(self.nwm.as_mut(), states);
                Ok(())
            }
            HostEvent::ActivityStarted => {
                self.tree.activity_started(&mut self.host, self.nwm.as_mut());
                Ok(())
            }
            HostEvent::ActivityStopped => {
                self.tree.activity_stopped(&mut self.host);
                Ok(())
            }
            HostEvent::DeviceAdded {
                device_id,
                source,
                descriptor,
            } => {
                self.host.add_input_device(InputDeviceInfo::new(
                    device_id,
                    InputSource::from_raw(source),
                    descriptor,
                ));
                Ok(())
            }
            HostEvent::ClipboardChanged { clip } => {
                self.host.set_primary_clip(clip);
                self.clipboard.poll(&self.host, self.nwm.as_mut());
                Ok(())
            }
        }
    }

    fn create_desktop(&mut self, window_id: WindowId, scaling: u32) -> Result<()> {
        info!(
            "create desktop '{}' {:08x} scale {}",
            self.config.startup.desktop_name, window_id, scaling
        );
        if self.tree.lookup(HWND_MESSAGE).is_none() {
            self.tree.create(&mut self.host, HWND_MESSAGE, 0, 1.0, false, 0)?;
        }
        self.tree.create_desktop(window_id)?;

        let startup_dpi = self.config.display.startup_dpi;
        let (dpi_scale, dpi) = match scaling {
            0 => (1.0, startup_dpi),
            1 => (startup_dpi as f32 / 96.0, 96),
            other => (other as f32 / 96.0, 96),
        };
        info!("dpi scale {} reported dpi {}", dpi_scale, dpi);
        self.tree.set_dpi_scale(dpi_scale);
        self.nwm.config_changed(dpi);

        self.gate.mark_ready();
        self.run_first_run_commands();
        Ok(())
    }

    /// Best-effort: failures are logged and startup carries on
    fn run_first_run_commands(&mut self) {
        let Some(prefix) = self.config.startup.prefix.as_ref() else {
            return;
        };
        let marker = prefix.join(FIRST_RUN_MARKER);
        if marker.exists() {
            return;
        }

        info!("First run in {:?}", prefix);
        for args in &self.config.startup.first_run_commands {
            if self.gate.submit_array(args.clone(), None) == Submitted::Dropped {
                warn!("Skipping empty first-run command");
            }
        }
        if let Err(e) = fs::create_dir_all(prefix).and_then(|_| fs::write(&marker, b"")) {
            warn!("Failed to write first-run marker {:?}: {}", marker, e);
        }
    }

    /// `width` and `height` are host pixels
    fn desktop_resized(&mut self, width: i32, height: i32) {
        let scale = self.tree.dpi_scale();
        info!("desktop size {}x{} scale {}", width, height, scale);
        self.host.layout_desktop(width, height);
        self.nwm
            .desktop_changed((width as f32 / scale) as i32, (height as f32 / scale) as i32);
    }

    fn close_window(&mut self, window_id: WindowId) {
        info!("close_window {:08x}", window_id);
        if window_id != NO_WINDOW {
            self.nwm.window_close(window_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::{Container, HostViews, SceneHost};
    use crate::nwm::RecordingNwm;
    use nwm_bridge_ipc::codes::{HWND_TOP, HWND_TOPMOST};
    use nwm_bridge_ipc::{CursorSpec, MotionAction, MotionSample, Rect};

    fn bridge_with(config: Config) -> (Bridge<SceneHost>, RecordingNwm, UnboundedReceiver<NwmCall>) {
        let recorder = RecordingNwm::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let host = SceneHost::new(config.display.reserve_front_view);
        let bridge = Bridge::new(config, host, Box::new(recorder.clone()), tx);
        (bridge, recorder, rx)
    }

    fn create(id: WindowId, parent: WindowId) -> BridgeTask {
        BridgeTask::Nwm(NwmEvent::CreateWindow {
            window_id: id,
            accelerated: false,
            parent,
            scale: 1.0,
            pid: 7,
        })
    }

    fn show(id: WindowId, insert_after: u32) -> BridgeTask {
        let rect = Rect::new(0, 0, 640, 480);
        BridgeTask::Nwm(NwmEvent::SetPosition {
            window_id: id,
            flags: 0,
            insert_after,
            owner: 0,
            style: StyleFlags::VISIBLE.bits(),
            window_rect: rect,
            client_rect: rect,
            visible_rect: rect,
        })
    }

    #[test]
    fn test_desktop_scaling_modes() {
        for (scaling, scale, dpi) in [(0, 1.0, 160), (1, 160.0 / 96.0, 96), (192, 2.0, 96)] {
            let (mut bridge, recorder, _rx) = bridge_with(Config::default());
            bridge.dispatch(BridgeTask::Nwm(NwmEvent::CreateDesktop { window_id: 0x20, scaling }));
            assert_eq!(bridge.tree().dpi_scale(), scale);
            assert_eq!(recorder.calls(), vec![NwmCall::ConfigChanged { dpi }]);
            assert!(bridge.tree().lookup(HWND_MESSAGE).is_some());
            assert!(bridge.gate().is_ready());
        }
    }

    #[test]
    fn test_desktop_resize_reports_scaled_size() {
        let (mut bridge, recorder, _rx) = bridge_with(Config::default());
        bridge.dispatch(BridgeTask::Nwm(NwmEvent::CreateDesktop { window_id: 0x20, scaling: 192 }));
        recorder.drain();

        bridge.dispatch(BridgeTask::Host(HostEvent::DesktopResized { width: 1921, height: 1080 }));
        assert_eq!(bridge.host().desktop_size(), (1921, 1080));
        assert_eq!(recorder.calls(), vec![NwmCall::DesktopChanged { width: 960, height: 540 }]);
    }

    #[test]
    fn test_queued_commands_flush_on_desktop() {
        let (mut bridge, _recorder, mut rx) = bridge_with(Config::default());
        let (handle, _tasks) = bridge.channel();

        handle.run_command_line("notepad".into(), None);
        bridge.dispatch(BridgeTask::Shell(ShellCommand::RunCommandArray {
            args: vec!["winecfg".into()],
            env: None,
        }));
        assert!(rx.try_recv().is_err());

        bridge.dispatch(BridgeTask::Nwm(NwmEvent::CreateDesktop { window_id: 0x20, scaling: 0 }));
        assert_eq!(
            rx.try_recv().ok(),
            Some(NwmCall::RunCommandLine { cmdline: "notepad".into(), env: None })
        );
        assert_eq!(
            rx.try_recv().ok(),
            Some(NwmCall::RunCommandArray { args: vec!["winecfg".into()], env: None })
        );
        assert_eq!(handle.run_command_line("regedit".into(), None), Submitted::Forwarded);
    }

    #[test]
    fn test_first_run_commands_only_once() {
        let prefix = std::env::temp_dir().join(format!("nwm-bridge-prefix-{}", std::process::id()));
        let _ = fs::remove_dir_all(&prefix);
        let mut config = Config::default();
        config.startup.prefix = Some(prefix.clone());
        config.startup.first_run_commands = vec![vec!["wineboot".into(), "-u".into()]];

        let (mut bridge, _recorder, mut rx) = bridge_with(config.clone());
        bridge.dispatch(BridgeTask::Nwm(NwmEvent::CreateDesktop { window_id: 0x20, scaling: 0 }));
        assert_eq!(
            rx.try_recv().ok(),
            Some(NwmCall::RunCommandArray { args: vec!["wineboot".into(), "-u".into()], env: None })
        );

        let (mut bridge, _recorder, mut rx) = bridge_with(config);
        bridge.dispatch(BridgeTask::Nwm(NwmEvent::CreateDesktop { window_id: 0x20, scaling: 0 }));
        assert!(rx.try_recv().is_err());
        let _ = fs::remove_dir_all(&prefix);
    }

    #[test]
    fn test_errors_do_not_stop_dispatch() {
        let (mut bridge, _recorder, _rx) = bridge_with(Config::default());
        assert!(bridge.dispatch(BridgeTask::Nwm(NwmEvent::DestroyWindow { window_id: 0x99 })));
        assert!(bridge.dispatch(show(0x99, HWND_TOP)));
        assert!(bridge.dispatch(BridgeTask::Nwm(NwmEvent::SetIcon {
            window_id: 0x99,
            width: 4,
            height: 4,
            pixels: Some(vec![0; 3]),
        })));
        assert!(bridge.dispatch(create(0x30, 0)));
        assert!(bridge.tree().lookup(0x30).is_some());
        assert!(!bridge.dispatch(BridgeTask::Shutdown));
    }

    #[test]
    fn test_focus_enumerates_gamepads() {
        let (mut bridge, recorder, _rx) = bridge_with(Config::default());
        bridge.dispatch(BridgeTask::Host(HostEvent::DeviceAdded {
            device_id: 5,
            source: InputSource::GAMEPAD.bits(),
            descriptor: "pad".into(),
        }));
        bridge.dispatch(create(0x30, 0));
        bridge.dispatch(create(0x31, 0x30));

        bridge.dispatch(BridgeTask::Nwm(NwmEvent::SetFocus { window_id: 0x31 }));
        assert!(recorder.calls().is_empty());

        bridge.dispatch(BridgeTask::Nwm(NwmEvent::SetFocus { window_id: 0x30 }));
        assert_eq!(
            recorder.calls(),
            vec![
                NwmCall::GamepadCount { count: 1 },
                NwmCall::GamepadData { index: 0, device_id: 5, name: "pad".into() },
            ]
        );
    }

    #[test]
    fn test_close_cursor_and_close_desktop() {
        let (mut bridge, recorder, _rx) = bridge_with(Config::default());
        bridge.dispatch(BridgeTask::Nwm(NwmEvent::CloseWindow { window_id: 0 }));
        bridge.dispatch(BridgeTask::Nwm(NwmEvent::CloseWindow { window_id: 0x30 }));
        assert_eq!(recorder.calls(), vec![NwmCall::WindowClose { window_id: 0x30 }]);

        bridge.dispatch(BridgeTask::Nwm(NwmEvent::SetCursor { cursor: CursorSpec::System { id: 1000 } }));
        assert_eq!(bridge.host().cursor(), Some(&CursorImage::System(1000)));

        assert!(!bridge.dispatch(BridgeTask::Shell(ShellCommand::CloseDesktop)));
        assert!(bridge.host().finished());
    }

    #[test]
    fn test_destroy_drops_gesture() {
        let (mut bridge, _recorder, _rx) = bridge_with(Config::default());
        bridge.dispatch(create(0x30, 0));
        bridge.dispatch(show(0x30, HWND_TOP));
        bridge.dispatch(BridgeTask::Host(HostEvent::Motion(MotionSample {
            window_id: 0x30,
            source: InputSource::MOUSE.bits(),
            action: MotionAction::Down.code(),
            ..MotionSample::default()
        })));
        assert!(bridge.router.gesture_active(0x30));

        bridge.dispatch(BridgeTask::Nwm(NwmEvent::DestroyWindow { window_id: 0x30 }));
        assert!(!bridge.router.gesture_active(0x30));
    }

    #[test]
    fn test_clipboard_change_is_polled() {
        let (mut bridge, recorder, _rx) = bridge_with(Config::default());
        let (handle, _tasks) = bridge.channel();

        bridge.dispatch(BridgeTask::Nwm(NwmEvent::SetClipboard { text: "copied".into() }));
        bridge.dispatch(BridgeTask::Nwm(NwmEvent::PollClipboard));
        assert_eq!(handle.clipboard_text(0x2), "copied");

        bridge.dispatch(BridgeTask::Host(HostEvent::ClipboardChanged { clip: None }));
        assert_eq!(handle.clipboard_text(0x2), "");
        assert_eq!(
            recorder.calls().last(),
            Some(&NwmCall::ClipdataUpdate { flags: 0, mime_types: None })
        );
    }

    #[tokio::test]
    async fn test_handle_drives_the_bridge() {
        let (mut bridge, recorder, _rx) = bridge_with(Config::default());
        let (handle, tasks) = bridge.channel();

        let poster = handle.clone();
        std::thread::spawn(move || {
            poster.post(create(0x30, 0));
            poster.post(show(0x30, HWND_TOPMOST));
            poster.post(create(0x31, 0));
            poster.post(show(0x31, HWND_TOP));
            poster.host(HostEvent::SurfaceAvailable { window_id: 0x31, client: false, surface: 77 });
            poster.shutdown();
        })
        .join()
        .unwrap();

        bridge.run(tasks).await;

        assert_eq!(bridge.tree().stacking_order(), &[0x31, 0x30]);
        assert_eq!(bridge.host().children(Container::Desktop), vec![0x31, 0x30]);
        assert_eq!(
            recorder.calls(),
            vec![NwmCall::SurfaceChanged { window_id: 0x31, surface: Some(77), client: false }]
        );
        bridge.tree().check_invariants(bridge.host()).unwrap();
        // the receiver went away with run()
        assert!(!handle.nwm(NwmEvent::PollClipboard));
    }
}
