use std::collections::VecDeque;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::{Condvar, Mutex};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::config::{Edge, EdgeDetect};
use crate::error::AppError;
use crate::gpio::{EdgeEvent, GpioBackend, WatchedLine};

/// In-memory backend. Transitions are injected with [`MockGpioBackend::trigger`]
/// and delivered by `wait` the way the kernel would: one batch per wake-up,
/// only for subscribed lines and only for matching edges.
#[derive(Default)]
pub struct MockGpioBackend {
    state: Mutex<MockState>,
    ready: Condvar,
}

#[derive(Default)]
struct MockState {
    lines: FxHashMap<u32, EdgeDetect>,
    pending: VecDeque<Vec<EdgeEvent>>,
    fail_open: FxHashSet<u32>,
    wait_failures: VecDeque<String>,
    open_calls: usize,
    closed: bool,
}

impl MockGpioBackend {
    /// Makes `open` fail when `offset` is among the requested lines.
    pub fn fail_open_on(&self, offset: u32) {
        self.state.lock().fail_open.insert(offset);
    }

    /// Makes the next `wait` fail with a GPIO error before anything is reported.
    pub fn fail_next_wait(&self, reason: &str) {
        self.state.lock().wait_failures.push_back(reason.to_string());
        self.ready.notify_all();
    }

    pub fn trigger(&self, offset: u32, edge: Edge) {
        self.trigger_batch(&[(offset, edge)]);
    }

    /// Queues transitions that a single `wait` reports together.
    pub fn trigger_batch(&self, edges: &[(u32, Edge)]) {
        let mut state = self.state.lock();
        let batch: Vec<EdgeEvent> = edges
            .iter()
            .filter(|(offset, edge)| {
                state
                    .lines
                    .get(offset)
                    .is_some_and(|mode| mode.matches(*edge))
            })
            .map(|&(offset, edge)| EdgeEvent {
                offset,
                edge,
                timestamp_ms: epoch_millis(),
            })
            .collect();

        if !batch.is_empty() {
            state.pending.push_back(batch);
            self.ready.notify_all();
        }
    }

    pub fn subscribed(&self) -> Vec<(u32, EdgeDetect)> {
        let mut lines: Vec<_> = self
            .state
            .lock()
            .lines
            .iter()
            .map(|(offset, edge)| (*offset, *edge))
            .collect();
        lines.sort_by_key(|(offset, _)| *offset);
        lines
    }

    pub fn open_calls(&self) -> usize {
        self.state.lock().open_calls
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

impl GpioBackend for MockGpioBackend {
    fn open(&self, lines: &[WatchedLine]) -> Result<(), AppError> {
        let mut state = self.state.lock();
        state.open_calls += 1;

        if let Some(line) = lines.iter().find(|l| state.fail_open.contains(&l.offset())) {
            return Err(AppError::OpenFailed(format!(
                "{} on line {}",
                line.name(),
                line.offset()
            )));
        }

        state.lines = lines.iter().map(|l| (l.offset(), l.edge())).collect();
        state.closed = false;
        Ok(())
    }

    fn wait(&self, timeout: Option<Duration>) -> Result<Vec<EdgeEvent>, AppError> {
        let mut state = self.state.lock();
        if state.lines.is_empty() || state.closed {
            return Err(AppError::InvalidState("no lines requested".into()));
        }
        if let Some(reason) = state.wait_failures.pop_front() {
            return Err(AppError::Gpio(format!("wait edge events: {reason}")));
        }

        match timeout {
            Some(timeout) => {
                if state.pending.is_empty() {
                    let _ = self.ready.wait_for(&mut state, timeout);
                }
            }
            None => {
                while state.pending.is_empty() {
                    self.ready.wait(&mut state);
                }
            }
        }

        Ok(state.pending.pop_front().unwrap_or_default())
    }

    fn close(&self) {
        let mut state = self.state.lock();
        state.lines.clear();
        state.pending.clear();
        state.closed = true;
    }
}

fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
