use log::{debug, error, info, warn};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use rustc_hash::FxHashMap;

use crate::config::{Edge, EdgeDetect, LineConfig};
use crate::dispatch::LineRole;
use crate::error::AppError;

/// A line under watch. The OS handle lives in the backend, keyed by offset.
#[derive(Debug, Clone)]
pub struct WatchedLine {
    config: LineConfig,
    last_value: Option<u8>,
}

impl WatchedLine {
    pub fn new(config: LineConfig) -> Self {
        Self {
            config,
            last_value: None,
        }
    }

    pub fn config(&self) -> &LineConfig {
        &self.config
    }

    pub fn name(&self) -> &'static str {
        self.config.name
    }

    pub fn shadow(&self) -> &'static str {
        self.config.shadow
    }

    pub fn offset(&self) -> u32 {
        self.config.offset
    }

    pub fn edge(&self) -> EdgeDetect {
        self.config.edge
    }

    pub fn role(&self) -> LineRole {
        self.config.role
    }

    pub fn last_value(&self) -> Option<u8> {
        self.last_value
    }
}

impl From<&LineConfig> for WatchedLine {
    fn from(config: &LineConfig) -> Self {
        Self::new(*config)
    }
}

/// A transition as reported by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeEvent {
    pub offset: u32,
    pub edge: Edge,
    pub timestamp_ms: u64,
}

/// A transition resolved to its line, handed to the event handler.
#[derive(Debug, Clone, Copy)]
pub struct ChangeEvent<'a> {
    pub line: &'a WatchedLine,
    pub value: u8,
    pub timestamp_ms: u64,
}

pub trait GpioBackend: Send + Sync {
    /// Subscribes every line with its edge mode. All or nothing.
    fn open(&self, lines: &[WatchedLine]) -> Result<(), AppError>;
    /// Blocks until at least one transition is reported or `timeout` elapses.
    /// `None` waits forever. A timeout yields an empty batch.
    fn wait(&self, timeout: Option<Duration>) -> Result<Vec<EdgeEvent>, AppError>;
    fn close(&self);
}

pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &ChangeEvent<'_>) -> Result<(), AppError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    Uninitialized,
    Open,
    Waiting,
    Dispatching,
    Closing,
    Closed,
}

/// Single-threaded wait/dispatch loop over a fixed set of lines.
pub struct Dispatcher<B: GpioBackend, H: EventHandler> {
    backend: Arc<B>,
    handler: H,
    lines: Vec<WatchedLine>,
    by_offset: FxHashMap<u32, usize>,
    state: DispatcherState,
    stop: Arc<AtomicBool>,
}

impl<B: GpioBackend, H: EventHandler> Dispatcher<B, H> {
    pub fn new(backend: Arc<B>, lines: Vec<WatchedLine>, handler: H) -> Self {
        let by_offset = lines
            .iter()
            .enumerate()
            .map(|(idx, line)| (line.offset(), idx))
            .collect();

        Self {
            backend,
            handler,
            lines,
            by_offset,
            state: DispatcherState::Uninitialized,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn state(&self) -> DispatcherState {
        self.state
    }

    pub fn lines(&self) -> &[WatchedLine] {
        &self.lines
    }

    pub fn line(&self, name: &str) -> Option<&WatchedLine> {
        self.lines.iter().find(|line| line.name() == name)
    }

    /// Flag that ends [`Dispatcher::run`] once the current wait returns.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    pub fn open(&mut self) -> Result<(), AppError> {
        if self.state != DispatcherState::Uninitialized {
            return Err(AppError::InvalidState(format!(
                "dispatcher cannot open from {:?}",
                self.state
            )));
        }

        self.backend.open(&self.lines).map_err(|e| match e {
            AppError::OpenFailed(_) => e,
            other => AppError::OpenFailed(other.to_string()),
        })?;

        for line in &self.lines {
            debug!(
                "watching {} ({}) on line {} for {:?} edges",
                line.name(),
                line.shadow(),
                line.offset(),
                line.edge()
            );
        }
        self.state = DispatcherState::Open;
        Ok(())
    }

    /// Waits once and dispatches every reported transition in report order.
    pub fn poll_once(&mut self, timeout: Option<Duration>) -> Result<usize, AppError> {
        match self.state {
            DispatcherState::Open | DispatcherState::Waiting => {}
            state => {
                return Err(AppError::InvalidState(format!(
                    "dispatcher cannot wait from {state:?}"
                )));
            }
        }

        self.state = DispatcherState::Waiting;
        let events = self.backend.wait(timeout)?;

        let mut dispatched = 0;
        for event in events {
            let Some(&idx) = self.by_offset.get(&event.offset) else {
                warn!("edge event for unwatched line {}", event.offset);
                continue;
            };

            self.state = DispatcherState::Dispatching;
            let value = event.edge.level();
            self.lines[idx].last_value = Some(value);
            self.dispatch(idx, value, event.timestamp_ms);
            dispatched += 1;
        }
        self.state = DispatcherState::Waiting;

        Ok(dispatched)
    }

    /// Polls until stopped. Failed waits are logged and retried; only a
    /// dispatcher or backend that is not open ends the loop with an error.
    pub fn run(&mut self, timeout: Option<Duration>) -> Result<(), AppError> {
        info!("monitoring {} GPIO lines", self.lines.len());
        while !self.stop.load(Ordering::Relaxed) {
            match self.poll_once(timeout) {
                Ok(_) => {}
                Err(e @ AppError::InvalidState(_)) => return Err(e),
                Err(e) => {
                    warn!("wait for edge events failed, still watching: {e}");
                    self.state = DispatcherState::Waiting;
                    thread::yield_now();
                }
            }
        }
        Ok(())
    }

    pub fn close(&mut self) {
        if matches!(
            self.state,
            DispatcherState::Uninitialized | DispatcherState::Closed
        ) {
            self.state = DispatcherState::Closed;
            return;
        }

        self.state = DispatcherState::Closing;
        self.backend.close();
        self.state = DispatcherState::Closed;
    }

    fn dispatch(&self, idx: usize, value: u8, timestamp_ms: u64) {
        let line = &self.lines[idx];
        let event = ChangeEvent {
            line,
            value,
            timestamp_ms,
        };

        let failure = match panic::catch_unwind(AssertUnwindSafe(|| self.handler.handle(&event))) {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e.to_string(),
            Err(payload) => panic_message(payload.as_ref()),
        };

        let err = AppError::DispatchHandlerFailure(format!("{}={value}: {failure}", line.name()));
        error!("{err}");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "handler panicked".to_string()
    }
}
