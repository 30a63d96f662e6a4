use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;

use crate::platform::{LogSink, Severity};

/// Emits log lines after a delay without ever blocking the caller.
///
/// Each scheduled message is a detached task on the given runtime. Tasks are
/// never joined or cancelled by the caller. A message is emitted exactly
/// once: when its delay elapses, or immediately if there is no runtime to run
/// it on or the runtime drops the task first.
#[derive(Clone)]
pub struct DeferredLogger {
    sink: Arc<dyn LogSink>,
    handle: Option<Handle>,
}

impl DeferredLogger {
    pub fn new(sink: Arc<dyn LogSink>, handle: Handle) -> Self {
        Self {
            sink,
            handle: Some(handle),
        }
    }

    /// Logger that emits everything synchronously.
    pub fn immediate(sink: Arc<dyn LogSink>) -> Self {
        Self { sink, handle: None }
    }

    pub fn sink(&self) -> &Arc<dyn LogSink> {
        &self.sink
    }

    pub fn schedule(&self, delay: Duration, severity: Severity, message: String) {
        let pending = PendingLog {
            sink: self.sink.clone(),
            severity,
            message: Some(message),
        };

        match &self.handle {
            Some(handle) if !delay.is_zero() => {
                let _ = handle.spawn(async move {
                    tokio::time::sleep(delay).await;
                    pending.fire();
                });
            }
            _ => pending.fire(),
        }
    }
}

struct PendingLog {
    sink: Arc<dyn LogSink>,
    severity: Severity,
    message: Option<String>,
}

impl PendingLog {
    fn fire(mut self) {
        self.emit();
    }

    fn emit(&mut self) {
        if let Some(message) = self.message.take() {
            self.sink.emit(self.severity, &message);
        }
    }
}

impl Drop for PendingLog {
    fn drop(&mut self) {
        self.emit();
    }
}
