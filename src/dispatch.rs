use log::debug;
use std::sync::Arc;
use std::time::Duration;

use crate::deferred::DeferredLogger;
use crate::device::SysfsGpio;
use crate::error::AppError;
use crate::gpio::{ChangeEvent, EventHandler, WatchedLine};
use crate::platform::{HAND_SW_KEY, HandSwitch, Platform, Severity};

pub const FAN_FAILSAFE_CMD: &str = "sv stop fscd ; /usr/local/bin/fan-util --set 100";
pub const FAN_RESTORE_CMD: &str = "/etc/init.d/setup-fan.sh ; sv start fscd";

/// What a watched line is wired to, and therefore how its edges are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineRole {
    /// Sled latch; high means the sled is pulled out.
    FanLatch,
    /// Console select button, cycles the hand switch on press.
    UartSelect,
    /// Buffered signal whose level is copied onto `target`.
    Mirror { target: u32 },
    /// Active-low signal that is only logged.
    Monitor,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Log {
        severity: Severity,
        message: String,
        delay: Duration,
    },
    Remediate {
        message: &'static str,
        command: &'static str,
    },
    Propagate {
        pin: u32,
        value: u8,
    },
    AdvanceHandSwitch,
    Ignore,
}

pub fn decide(line: &WatchedLine, value: u8) -> Action {
    match (line.role(), value) {
        (LineRole::FanLatch, 1) => Action::Remediate {
            message: "ASSERT: SLED is not seated",
            command: FAN_FAILSAFE_CMD,
        },
        (LineRole::FanLatch, _) => Action::Remediate {
            message: "DEASSERT: SLED is seated",
            command: FAN_RESTORE_CMD,
        },
        (LineRole::UartSelect, 0) => Action::AdvanceHandSwitch,
        (LineRole::UartSelect, _) => Action::Ignore,
        (LineRole::Mirror { target }, value) => Action::Propagate {
            pin: target,
            value: u8::from(value != 0),
        },
        (LineRole::Monitor, value) => Action::Log {
            severity: Severity::Critical,
            message: transition_message(line, value),
            delay: line.config().log_delay,
        },
    }
}

/// `ASSERT:GPIOH4 - RST_BMC_PERST_L` style message; lines are active low.
pub fn transition_message(line: &WatchedLine, value: u8) -> String {
    format!(
        "{}:{} - {}",
        if value != 0 { "DEASSERT" } else { "ASSERT" },
        line.shadow(),
        line.name()
    )
}

/// Carries out [`decide`] against the board.
pub struct LineDispatch<P: Platform> {
    platform: Arc<P>,
    logger: DeferredLogger,
    sysfs: SysfsGpio,
    slot_count: u8,
}

impl<P: Platform> LineDispatch<P> {
    pub fn new(platform: Arc<P>, logger: DeferredLogger, sysfs: SysfsGpio, slot_count: u8) -> Self {
        Self {
            platform,
            logger,
            sysfs,
            slot_count,
        }
    }

    fn advance_hand_switch(&self) -> Result<(), AppError> {
        let current = match self.platform.hand_switch() {
            Ok(raw) => HandSwitch::from_raw(raw, self.slot_count),
            Err(e) => {
                debug!("hand switch unavailable, assuming BMC: {e}");
                HandSwitch::Bmc
            }
        };

        let location = current.next(self.slot_count).raw(self.slot_count).to_string();
        self.platform.kv_set(HAND_SW_KEY, &location)?;
        self.logger.sink().emit(
            Severity::Info,
            &format!("change hand_sw location to FRU {location} by button"),
        );
        Ok(())
    }
}

impl<P: Platform> EventHandler for LineDispatch<P> {
    fn handle(&self, event: &ChangeEvent<'_>) -> Result<(), AppError> {
        match decide(event.line, event.value) {
            Action::Log {
                severity,
                message,
                delay,
            } => self.logger.schedule(delay, severity, message),
            Action::Remediate { message, command } => {
                self.logger.sink().emit(Severity::Critical, message);
                self.platform.run_command(command);
            }
            Action::Propagate { pin, value } => {
                if let Err(e) = self.sysfs.write(pin, i32::from(value)) {
                    debug!("propagate {} to pin {pin}: {e}", event.line.name());
                }
            }
            Action::AdvanceHandSwitch => self.advance_hand_switch()?,
            Action::Ignore => debug!(
                "ignoring {} transition to {} on {}",
                event.line.name(),
                event.value,
                event.line.shadow()
            ),
        }
        Ok(())
    }
}
