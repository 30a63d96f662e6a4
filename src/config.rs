use std::path::PathBuf;
use std::time::Duration;

use crate::device::SYSFS_GPIO_ROOT;
use crate::dispatch::LineRole;

pub const DAEMON_NAME: &str = "gpiointrd";
pub const PID_FILE: &str = "/var/run/gpiointrd.pid";
pub const GPIO_CHIP: &str = "/dev/gpiochip0";
pub const KV_CACHE_ROOT: &str = "/tmp/cache_store";
pub const MAX_NUM_SLOTS: u8 = 1;

/// Edge modes a line can be subscribed with.
#[derive(Debug, Hash, Clone, Copy, PartialEq, Eq)]
pub enum EdgeDetect {
    Rising,
    Falling,
    Both,
}

impl EdgeDetect {
    pub fn matches(self, observed: Edge) -> bool {
        match self {
            EdgeDetect::Rising => observed == Edge::Rising,
            EdgeDetect::Falling => observed == Edge::Falling,
            EdgeDetect::Both => true,
        }
    }
}

/// An observed transition.
#[derive(Debug, Hash, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Rising,
    Falling,
}

impl Edge {
    /// Logical level the line settled on after this transition.
    pub fn level(self) -> u8 {
        match self {
            Edge::Rising => 1,
            Edge::Falling => 0,
        }
    }
}

/// Maps an ASPEED pin name such as `GPIOM6` or `GPIOAA0` to its line number.
pub const fn try_gpio_num(name: &str) -> Option<u32> {
    let b = name.as_bytes();
    let len = b.len();
    if len < 6 || len > 7 {
        return None;
    }
    if !(b[0] == b'G' && b[1] == b'P' && b[2] == b'I' && b[3] == b'O') {
        return None;
    }

    let bit = b[len - 1];
    if bit < b'0' || bit > b'7' {
        return None;
    }

    let group = if len == 6 {
        if !b[4].is_ascii_uppercase() {
            return None;
        }
        (b[4] - b'A') as u32
    } else {
        if !b[4].is_ascii_uppercase() || !b[5].is_ascii_uppercase() {
            return None;
        }
        (b[4] - b'A' + 1) as u32 * 26 + (b[5] - b'A') as u32
    };

    Some(group * 8 + (bit - b'0') as u32)
}

/// Const-context variant of [`try_gpio_num`]; an invalid name fails the build.
pub const fn gpio_num(name: &str) -> u32 {
    match try_gpio_num(name) {
        Some(num) => num,
        None => panic!("invalid GPIO name"),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineConfig {
    pub shadow: &'static str,
    pub name: &'static str,
    pub offset: u32,
    pub edge: EdgeDetect,
    pub role: LineRole,
    pub log_delay: Duration,
}

impl LineConfig {
    pub const fn new(
        shadow: &'static str,
        name: &'static str,
        edge: EdgeDetect,
        role: LineRole,
    ) -> Self {
        Self {
            shadow,
            name,
            offset: gpio_num(shadow),
            edge,
            role,
            log_delay: Duration::ZERO,
        }
    }

    /// Holds transition logs back until the signal had time to settle.
    pub const fn with_log_delay(self, log_delay: Duration) -> Self {
        Self { log_delay, ..self }
    }
}

/// Expected power-on level of a pin, checked once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultCheck {
    pub expected: i32,
    pub name: &'static str,
    pub pin: u32,
    pub message: &'static str,
}

pub const WATCHED_LINES: &[LineConfig] = &[
    LineConfig::new(
        "GPIOM6",
        "FM_CB_SLP3_BUF_N",
        EdgeDetect::Both,
        LineRole::Mirror {
            target: gpio_num("GPIOM5"),
        },
    ),
    LineConfig::new(
        "GPIOH4",
        "RST_BMC_PERST_L",
        EdgeDetect::Both,
        LineRole::Monitor,
    ),
];

pub const DEFAULT_CHECKS: &[DefaultCheck] = &[];

// Sled latch, slot ejector/presence and console button wiring; not routed on
// the current board revision, so neither table is part of the default
// configuration.
pub const LATCH_LINES: &[LineConfig] = &[
    LineConfig::new(
        "GPIOH5",
        "GPIO_FAN_LATCH_DETECT",
        EdgeDetect::Both,
        LineRole::FanLatch,
    ),
    LineConfig::new(
        "GPIOP0",
        "GPIO_SLOT1_EJECTOR_LATCH_DETECT_N",
        EdgeDetect::Both,
        LineRole::Monitor,
    ),
    LineConfig::new(
        "GPIOZ0",
        "GPIO_SLOT1_PRSNT_B_N",
        EdgeDetect::Both,
        LineRole::Monitor,
    ),
    LineConfig::new(
        "GPIOAA0",
        "GPIO_SLOT1_PRSNT_N",
        EdgeDetect::Both,
        LineRole::Monitor,
    ),
    LineConfig::new(
        "GPIOO3",
        "GPIO_UART_SEL",
        EdgeDetect::Falling,
        LineRole::UartSelect,
    ),
];

pub const LATCH_DEFAULT_CHECKS: &[DefaultCheck] = &[
    DefaultCheck {
        expected: 0,
        name: "GPIO_FAN_LATCH_DETECT",
        pin: gpio_num("GPIOH5"),
        message: "ASSERT: SLED is not seated",
    },
    DefaultCheck {
        expected: 0,
        name: "GPIO_SLOT1_EJECTOR_LATCH_DETECT_N",
        pin: gpio_num("GPIOP0"),
        message: "GPIO_SLOT1_EJECTOR_LATCH_DETECT_N is \"1\" and SLOT_12v is ON",
    },
];

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub pid_file: PathBuf,
    pub chip: PathBuf,
    pub sysfs_root: PathBuf,
    pub kv_root: PathBuf,
    pub slot_count: u8,
    pub lines: &'static [LineConfig],
    pub default_checks: &'static [DefaultCheck],
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            pid_file: PathBuf::from(PID_FILE),
            chip: PathBuf::from(GPIO_CHIP),
            sysfs_root: PathBuf::from(SYSFS_GPIO_ROOT),
            kv_root: PathBuf::from(KV_CACHE_ROOT),
            slot_count: MAX_NUM_SLOTS,
            lines: WATCHED_LINES,
            default_checks: DEFAULT_CHECKS,
        }
    }
}
