use log::debug;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::AppError;

pub const SYSFS_GPIO_ROOT: &str = "/sys/class/gpio";

/// Reads the first integer token from a device file.
pub fn read_value<P: AsRef<Path>>(path: P) -> Result<i32, AppError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|e| {
        debug!("failed to open device {}", path.display());
        AppError::DeviceUnavailable(format!("{}: {e}", path.display()))
    })?;

    contents
        .split_whitespace()
        .next()
        .and_then(|token| token.parse::<i32>().ok())
        .ok_or_else(|| {
            debug!("failed to read device {}", path.display());
            AppError::DeviceUnreadable(path.display().to_string())
        })
}

/// Writes `value` as a literal token. Repeating a write is harmless.
pub fn write_value<P: AsRef<Path>>(path: P, value: i32) -> Result<(), AppError> {
    let path = path.as_ref();
    let mut file = fs::OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(path)
        .map_err(|e| {
            debug!("failed to open device for write {}", path.display());
            AppError::DeviceUnavailable(format!("{}: {e}", path.display()))
        })?;

    file.write_all(value.to_string().as_bytes()).map_err(|e| {
        debug!("failed to write device {}", path.display());
        AppError::DeviceUnreadable(format!("{}: {e}", path.display()))
    })
}

/// Value files of the legacy sysfs GPIO interface, addressed by pin number.
#[derive(Debug, Clone)]
pub struct SysfsGpio {
    root: PathBuf,
}

impl SysfsGpio {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn value_path(&self, pin: u32) -> PathBuf {
        self.root.join(format!("gpio{pin}")).join("value")
    }

    pub fn read(&self, pin: u32) -> Result<i32, AppError> {
        read_value(self.value_path(pin))
    }

    /// Drives `pin` to 1 for any non-zero level, 0 otherwise.
    pub fn write(&self, pin: u32, level: i32) -> Result<(), AppError> {
        write_value(self.value_path(pin), i32::from(level != 0))
    }
}

impl Default for SysfsGpio {
    fn default() -> Self {
        Self::new(SYSFS_GPIO_ROOT)
    }
}
