use log::{debug, error, info, warn};
use std::fs;
use std::path::PathBuf;
use std::process::Command;

use crate::config::DAEMON_NAME;
use crate::error::AppError;

pub const HAND_SW_KEY: &str = "spb_hand_sw";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Critical,
    Error,
    Info,
}

/// Destination of operator-facing messages.
pub trait LogSink: Send + Sync {
    fn emit(&self, severity: Severity, message: &str);
}

/// Forwards to the `log` facade under the daemon's target.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogFacade;

impl LogSink for LogFacade {
    fn emit(&self, severity: Severity, message: &str) {
        match severity {
            Severity::Critical | Severity::Error => error!(target: DAEMON_NAME, "{message}"),
            Severity::Info => info!(target: DAEMON_NAME, "{message}"),
        }
    }
}

/// Which compute slot, or the BMC itself, owns the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandSwitch {
    Slot(u8),
    Bmc,
}

impl HandSwitch {
    /// Anything outside `1..=slots` reads as the BMC position.
    pub fn from_raw(raw: u8, slots: u8) -> Self {
        if (1..=slots).contains(&raw) {
            HandSwitch::Slot(raw)
        } else {
            HandSwitch::Bmc
        }
    }

    pub fn raw(self, slots: u8) -> u8 {
        match self {
            HandSwitch::Slot(slot) => slot,
            HandSwitch::Bmc => slots.saturating_add(1),
        }
    }

    /// BMC, Slot1 .. SlotN, then back to BMC.
    pub fn next(self, slots: u8) -> Self {
        match self {
            HandSwitch::Bmc if slots == 0 => HandSwitch::Bmc,
            HandSwitch::Bmc => HandSwitch::Slot(1),
            HandSwitch::Slot(slot) if slot < slots => HandSwitch::Slot(slot + 1),
            HandSwitch::Slot(_) => HandSwitch::Bmc,
        }
    }
}

/// Board services the dispatcher reaches out to.
pub trait Platform: Send + Sync {
    /// Raw hand-switch position as reported by the platform.
    fn hand_switch(&self) -> Result<u8, AppError>;
    fn kv_set(&self, key: &str, value: &str) -> Result<(), AppError>;
    /// Runs a shell command to completion; the exit status is not acted on.
    fn run_command(&self, command: &str);
}

pub struct BmcPlatform {
    kv_root: PathBuf,
}

impl BmcPlatform {
    pub fn new<P: Into<PathBuf>>(kv_root: P) -> Self {
        Self {
            kv_root: kv_root.into(),
        }
    }

    fn kv_get(&self, key: &str) -> Result<String, AppError> {
        let path = self.kv_root.join(key);
        fs::read_to_string(&path)
            .map_err(|e| AppError::Platform(format!("kv get {}: {e}", path.display())))
    }
}

impl Platform for BmcPlatform {
    fn hand_switch(&self) -> Result<u8, AppError> {
        let value = self.kv_get(HAND_SW_KEY)?;
        value
            .trim()
            .parse::<u8>()
            .map_err(|e| AppError::Platform(format!("invalid {HAND_SW_KEY} value {value:?}: {e}")))
    }

    fn kv_set(&self, key: &str, value: &str) -> Result<(), AppError> {
        fs::create_dir_all(&self.kv_root).map_err(|e| {
            AppError::Platform(format!("kv root {}: {e}", self.kv_root.display()))
        })?;
        let path = self.kv_root.join(key);
        fs::write(&path, value)
            .map_err(|e| AppError::Platform(format!("kv set {}: {e}", path.display())))
    }

    fn run_command(&self, command: &str) {
        match Command::new("sh").arg("-c").arg(command).status() {
            Ok(status) => debug!("`{command}` exited with {status}"),
            Err(e) => warn!("failed to run `{command}`: {e}"),
        }
    }
}
