//! IPC server connecting peers to the bridge
//!
//! Peers send length-prefixed [`InboundMessage`]s; every [`NwmCall`] the
//! bridge makes is broadcast back to all connected peers.

use std::path::{Path, PathBuf};

use anyhow::Result;
use nwm_bridge_ipc::{FramedMessage, InboundMessage, NwmCall, ShellCommand};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::bridge::{BridgeHandle, BridgeTask};

/// Calls buffered per peer before it starts lagging
const CALL_BACKLOG: usize = 256;

/// IPC server
pub struct IpcServer {
    socket_path: PathBuf,
    call_tx: broadcast::Sender<NwmCall>,
}

impl IpcServer {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        let (call_tx, _) = broadcast::channel(CALL_BACKLOG);
        Self {
            socket_path: socket_path.into(),
            call_tx,
        }
    }

    /// Bind the socket and spawn the acceptor and the call forwarder
    pub async fn start(self, bridge: BridgeHandle, mut calls: mpsc::UnboundedReceiver<NwmCall>) -> Result<IpcHandle> {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }
        if let Some(parent) = self.socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;
        info!("IPC server listening on {:?}", self.socket_path);

        let call_tx = self.call_tx.clone();
        tokio::spawn(async move {
            while let Some(call) = calls.recv().await {
                // no peers connected is fine
                let _ = call_tx.send(call);
            }
            debug!("Call forwarder ended");
        });

        let call_tx = self.call_tx.clone();
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, _)) => {
                        info!("Peer connected");
                        let call_rx = call_tx.subscribe();
                        tokio::spawn(handle_client(stream, call_rx, bridge.clone()));
                    }
                    Err(e) => {
                        error!("Accept error: {}", e);
                    }
                }
            }
        });

        Ok(IpcHandle {
            socket_path: self.socket_path,
        })
    }
}

/// Handle for a running IPC server
pub struct IpcHandle {
    socket_path: PathBuf,
}

impl IpcHandle {
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Remove the socket file
    pub fn shutdown(&self) {
        if let Err(e) = std::fs::remove_file(&self.socket_path) {
            debug!("Failed to remove socket {:?}: {}", self.socket_path, e);
        }
    }
}

/// Hand one inbound message to the bridge; returns false once it is gone.
///
/// Command requests go straight through the startup gate so they keep
/// their arrival order even while the bridge task is busy.
pub fn route(bridge: &BridgeHandle, message: InboundMessage) -> bool {
    match message {
        InboundMessage::Nwm(event) => bridge.nwm(event),
        InboundMessage::Host(event) => bridge.host(event),
        InboundMessage::Shell(ShellCommand::RunCommandLine { cmdline, env }) => {
            bridge.run_command_line(cmdline, env);
            true
        }
        InboundMessage::Shell(ShellCommand::RunCommandArray { args, env }) => {
            bridge.run_command_array(args, env);
            true
        }
        InboundMessage::Shell(command) => bridge.post(BridgeTask::Shell(command)),
    }
}

async fn handle_client(stream: UnixStream, mut call_rx: broadcast::Receiver<NwmCall>, bridge: BridgeHandle) {
    let (mut reader, mut writer) = stream.into_split();

    // peer -> bridge
    let mut reader_task = tokio::spawn(async move {
        let mut len_buf = [0u8; 4];
        loop {
            if reader.read_exact(&mut len_buf).await.is_err() {
                break;
            }
            let len = match FramedMessage::payload_len(len_buf) {
                Ok(len) => len,
                Err(e) => {
                    warn!("Dropping peer: {}", e);
                    break;
                }
            };

            let mut msg_buf = vec![0u8; len];
            if reader.read_exact(&mut msg_buf).await.is_err() {
                break;
            }

            match FramedMessage::decode_inbound(&msg_buf) {
                Ok(message) => {
                    debug!("Received: {:?}", message);
                    if !route(&bridge, message) {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Failed to decode message: {}", e);
                }
            }
        }
        debug!("Reader task ended");
    });

    // bridge -> peer
    let mut writer_task = tokio::spawn(async move {
        loop {
            match call_rx.recv().await {
                Ok(call) => match FramedMessage::new(&call) {
                    Ok(msg) => {
                        if writer.write_all(&msg.encode()).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Failed to encode call: {}", e);
                    }
                },
                Err(broadcast::error::RecvError::Closed) => break,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Peer lagged, {} calls lost", n);
                }
            }
        }
        debug!("Writer task ended");
    });

    // whichever side ends first takes the other down with it
    tokio::select! {
        _ = &mut reader_task => {
            writer_task.abort();
            let _ = writer_task.await;
        }
        _ = &mut writer_task => {
            reader_task.abort();
            let _ = reader_task.await;
        }
    }

    info!("Peer disconnected");
}
