#![allow(dead_code)]

use std::fs;
use std::path::Path;

use gpiointrd::platform::HAND_SW_KEY;
use gpiointrd::{AppError, LogSink, Platform, Severity};
use parking_lot::Mutex;

#[derive(Default)]
pub struct RecordingSink {
    records: Mutex<Vec<(Severity, String)>>,
}

impl RecordingSink {
    pub fn records(&self) -> Vec<(Severity, String)> {
        self.records.lock().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.records.lock().iter().map(|(_, m)| m.clone()).collect()
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.records
            .lock()
            .iter()
            .filter(|(s, _)| *s == severity)
            .count()
    }
}

impl LogSink for RecordingSink {
    fn emit(&self, severity: Severity, message: &str) {
        self.records.lock().push((severity, message.to_string()));
    }
}

/// Platform double: the hand switch reads back whatever was last stored.
#[derive(Default)]
pub struct RecordingPlatform {
    pub hand_switch: Mutex<Option<u8>>,
    pub kv: Mutex<Vec<(String, String)>>,
    pub commands: Mutex<Vec<String>>,
    pub fail_kv: bool,
}

impl RecordingPlatform {
    pub fn with_hand_switch(raw: u8) -> Self {
        Self {
            hand_switch: Mutex::new(Some(raw)),
            ..Default::default()
        }
    }

    pub fn kv_writes(&self) -> Vec<(String, String)> {
        self.kv.lock().clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }
}

impl Platform for RecordingPlatform {
    fn hand_switch(&self) -> Result<u8, AppError> {
        let current = *self.hand_switch.lock();
        current.ok_or_else(|| AppError::Platform("hand switch unavailable".into()))
    }

    fn kv_set(&self, key: &str, value: &str) -> Result<(), AppError> {
        if self.fail_kv {
            return Err(AppError::Platform("kv store read-only".into()));
        }
        if key == HAND_SW_KEY {
            *self.hand_switch.lock() = value.parse().ok();
        }
        self.kv.lock().push((key.to_string(), value.to_string()));
        Ok(())
    }

    fn run_command(&self, command: &str) {
        self.commands.lock().push(command.to_string());
    }
}

/// Lays out `<root>/gpio<pin>/value` files the way sysfs exposes them.
pub fn sysfs_pins(root: &Path, pins: &[(u32, &str)]) {
    for (pin, value) in pins {
        let dir = root.join(format!("gpio{pin}"));
        fs::create_dir_all(&dir).expect("create gpio dir");
        fs::write(dir.join("value"), value).expect("write gpio value");
    }
}

pub fn pin_value(root: &Path, pin: u32) -> String {
    fs::read_to_string(root.join(format!("gpio{pin}")).join("value"))
        .expect("read gpio value")
        .trim()
        .to_string()
}
