use log::{debug, info, warn};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::runtime::{Builder, Runtime};

use crate::config::{DAEMON_NAME, DaemonConfig};
use crate::deferred::DeferredLogger;
use crate::device::SysfsGpio;
use crate::dispatch::{LineDispatch, LineRole};
use crate::error::AppError;
use crate::gpio::{Dispatcher, GpioBackend, WatchedLine};
use crate::platform::{LogSink, Platform, Severity};
use crate::slot::SlotTable;

/// Exclusive advisory lock on the PID file, held until dropped.
#[derive(Debug)]
pub struct PidLock {
    _file: File,
    path: PathBuf,
}

impl PidLock {
    /// Never blocks: a lock held elsewhere yields `LockContention`.
    pub fn acquire<P: AsRef<Path>>(path: P) -> Result<Self, AppError> {
        let path = path.as_ref();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .mode(0o666)
            .open(path)
            .map_err(|e| AppError::Lock(format!("open {}: {e}", path.display())))?;

        // SAFETY: the descriptor is owned by `file` and stays open for the call.
        let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if rc != 0 {
            let err = io::Error::last_os_error();
            return Err(if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
                AppError::LockContention(path.display().to_string())
            } else {
                AppError::Lock(format!("flock {}: {err}", path.display()))
            });
        }

        file.set_len(0)
            .and_then(|_| writeln!(file, "{}", std::process::id()))
            .map_err(|e| AppError::Lock(format!("write pid to {}: {e}", path.display())))?;

        Ok(Self {
            _file: file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

pub struct Daemon<B: GpioBackend, P: Platform> {
    config: DaemonConfig,
    backend: Arc<B>,
    platform: Arc<P>,
    sink: Arc<dyn LogSink>,
    sysfs: SysfsGpio,
    slots: SlotTable,
}

impl<B: GpioBackend, P: Platform> Daemon<B, P> {
    pub fn new(
        config: DaemonConfig,
        backend: Arc<B>,
        platform: Arc<P>,
        sink: Arc<dyn LogSink>,
    ) -> Self {
        let sysfs = SysfsGpio::new(config.sysfs_root.clone());
        let slots = SlotTable::new(config.slot_count);
        Self {
            config,
            backend,
            platform,
            sink,
            sysfs,
            slots,
        }
    }

    pub fn slots(&self) -> &SlotTable {
        &self.slots
    }

    /// Takes the instance lock, then brings pin state in line before any
    /// edge is watched. Nothing touches GPIO state if the lock is taken.
    pub fn startup(&self) -> Result<PidLock, AppError> {
        let lock = match PidLock::acquire(&self.config.pid_file) {
            Ok(lock) => lock,
            Err(AppError::LockContention(path)) => {
                self.sink.emit(
                    Severity::Error,
                    &format!("Another {DAEMON_NAME} instance is running..."),
                );
                return Err(AppError::LockContention(path));
            }
            Err(e) => return Err(e),
        };

        self.sink
            .emit(Severity::Info, &format!("{DAEMON_NAME}: daemon started"));

        self.initial_sync();
        self.default_check();
        Ok(lock)
    }

    /// Copies each mirrored line's level onto its target pin.
    pub fn initial_sync(&self) -> usize {
        let mut synced = 0;
        for line in self.config.lines {
            let LineRole::Mirror { target } = line.role else {
                continue;
            };

            let value = match self.sysfs.read(line.offset) {
                Ok(value) => value,
                Err(e) => {
                    debug!("initial sync of {} skipped: {e}", line.name);
                    continue;
                }
            };
            match self.sysfs.write(target, value) {
                Ok(()) => synced += 1,
                Err(e) => debug!("initial sync of {} to pin {target}: {e}", line.name),
            }
        }
        synced
    }

    /// Reports pins whose current level differs from the expected default.
    pub fn default_check(&self) -> usize {
        let mut mismatched = 0;
        for check in self.config.default_checks {
            match self.sysfs.read(check.pin) {
                Ok(value) if value != check.expected => {
                    self.sink.emit(Severity::Critical, check.message);
                    mismatched += 1;
                }
                Ok(_) => {}
                Err(e) => debug!("default check of {} skipped: {e}", check.name),
            }
        }
        mismatched
    }

    pub fn dispatcher(&self, logger: DeferredLogger) -> Dispatcher<B, LineDispatch<P>> {
        let lines = self.config.lines.iter().map(WatchedLine::from).collect();
        let handler = LineDispatch::new(
            self.platform.clone(),
            logger,
            self.sysfs.clone(),
            self.config.slot_count,
        );
        Dispatcher::new(self.backend.clone(), lines, handler)
    }

    /// Startup followed by the event loop; returns only on error or stop.
    pub fn run(self) -> Result<(), AppError> {
        let _lock = self.startup()?;

        let runtime = match deferred_log_runtime() {
            Ok(runtime) => Some(runtime),
            Err(e) => {
                warn!("deferred logging unavailable, logging inline: {e}");
                None
            }
        };
        let logger = match &runtime {
            Some(runtime) => DeferredLogger::new(self.sink.clone(), runtime.handle().clone()),
            None => DeferredLogger::immediate(self.sink.clone()),
        };

        let mut dispatcher = self.dispatcher(logger);
        dispatcher.open()?;
        info!("{DAEMON_NAME}: watching {} lines", dispatcher.lines().len());

        let result = dispatcher.run(None);
        dispatcher.close();
        result
    }
}

fn deferred_log_runtime() -> io::Result<Runtime> {
    Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("deferred-log")
        .enable_time()
        .build()
}
