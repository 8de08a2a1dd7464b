//! Startup Module
//!
//! Holds back command requests until the desktop window exists, then
//! forwards them in arrival order.

use std::collections::VecDeque;
use nwm_bridge_ipc::{CommandEnv, NwmCall};
use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

/// A pending command request
#[derive(Debug, Clone, PartialEq)]
pub enum CommandRequest {
    Line { cmdline: String, env: Option<CommandEnv> },
    Array { args: Vec<String>, env: Option<CommandEnv> },
}

impl CommandRequest {
    fn is_empty(&self) -> bool {
        match self {
            Self::Line { cmdline, .. } => cmdline.trim().is_empty(),
            Self::Array { args, .. } => args.is_empty(),
        }
    }

    fn into_call(self) -> NwmCall {
        match self {
            Self::Line { cmdline, env } => NwmCall::RunCommandLine { cmdline, env },
            Self::Array { args, env } => NwmCall::RunCommandArray { args, env },
        }
    }
}

#[derive(Debug, Default)]
struct GateState {
    ready: bool,

    /// Arrival counter shared by both queues
    seq: u64,

    lines: VecDeque<(u64, CommandRequest)>,
    arrays: VecDeque<(u64, CommandRequest)>,
}

/// Outcome of submitting a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submitted {
    Forwarded,
    Queued,
    Dropped,
}

/// Startup gate
#[derive(Debug)]
pub struct StartupGate {
    state: Mutex<GateState>,
    tx: UnboundedSender<NwmCall>,
}

impl StartupGate {
    pub fn new(tx: UnboundedSender<NwmCall>) -> Self {
        Self {
            state: Mutex::new(GateState::default()),
            tx,
        }
    }

    fn post(&self, request: CommandRequest) {
        if self.tx.send(request.into_call()).is_err() {
            warn!("NWM channel closed, dropping command");
        }
    }

    /// Forward `request` now, or queue it until the desktop is ready
    pub fn submit(&self, request: CommandRequest) -> Submitted {
        if request.is_empty() {
            warn!("Ignoring empty command request");
            return Submitted::Dropped;
        }

        let mut state = self.state.lock();
        if state.ready {
            drop(state);
            debug!("Running {:?}", request);
            self.post(request);
            return Submitted::Forwarded;
        }

        state.seq += 1;
        let entry = (state.seq, request);
        debug!("Desktop not ready, queueing {:?}", entry.1);
        match entry.1 {
            CommandRequest::Line { .. } => state.lines.push_back(entry),
            CommandRequest::Array { .. } => state.arrays.push_back(entry),
        }
        Submitted::Queued
    }

    pub fn submit_line(&self, cmdline: String, env: Option<CommandEnv>) -> Submitted {
        self.submit(CommandRequest::Line { cmdline, env })
    }

    pub fn submit_array(&self, args: Vec<String>, env: Option<CommandEnv>) -> Submitted {
        self.submit(CommandRequest::Array { args, env })
    }

    pub fn is_ready(&self) -> bool {
        self.state.lock().ready
    }

    /// Open the gate and flush the queues in arrival order.
    ///
    /// Only the first call has any effect; returns how many requests were flushed.
    pub fn mark_ready(&self) -> usize {
        let mut state = self.state.lock();
        if state.ready {
            return 0;
        }
        state.ready = true;

        let mut lines = std::mem::take(&mut state.lines);
        let mut arrays = std::mem::take(&mut state.arrays);
        let mut flushed = 0;
        loop {
            let take_line = match (lines.front(), arrays.front()) {
                (Some((a, _)), Some((b, _))) => a < b,
                (Some(_), None) => true,
                (None, Some(_)) => false,
                (None, None) => break,
            };
            let next = if take_line { lines.pop_front() } else { arrays.pop_front() };
            if let Some((_, request)) = next {
                self.post(request);
                flushed += 1;
            }
        }

        info!("Desktop ready, flushed {} queued command(s)", flushed);
        flushed
    }
}
