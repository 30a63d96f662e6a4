mod common;

use std::sync::Arc;
use std::time::Duration;

use gpiointrd::config::{LATCH_LINES, WATCHED_LINES};
use gpiointrd::device::SysfsGpio;
use gpiointrd::dispatch::{FAN_FAILSAFE_CMD, FAN_RESTORE_CMD, decide};
use gpiointrd::platform::HAND_SW_KEY;
use gpiointrd::{
    Action, AppError, ChangeEvent, DeferredLogger, EdgeDetect, EventHandler, HandSwitch,
    LineConfig, LineDispatch, LineRole, Severity, WatchedLine,
};

use common::{RecordingPlatform, RecordingSink, pin_value, sysfs_pins};

fn line(name: &str) -> WatchedLine {
    WATCHED_LINES
        .iter()
        .chain(LATCH_LINES)
        .find(|l| l.name == name)
        .map(WatchedLine::from)
        .expect("line in table")
}

fn event(line: &WatchedLine, value: u8) -> ChangeEvent<'_> {
    ChangeEvent {
        line,
        value,
        timestamp_ms: 0,
    }
}

struct Fixture {
    sysfs_dir: tempfile::TempDir,
    platform: Arc<RecordingPlatform>,
    sink: Arc<RecordingSink>,
    dispatch: LineDispatch<RecordingPlatform>,
}

fn fixture(platform: RecordingPlatform, slots: u8) -> Fixture {
    let sysfs_dir = tempfile::tempdir().unwrap();
    sysfs_pins(sysfs_dir.path(), &[(101, "0"), (102, "0")]);
    let platform = Arc::new(platform);
    let sink = Arc::new(RecordingSink::default());
    let dispatch = LineDispatch::new(
        platform.clone(),
        DeferredLogger::immediate(sink.clone()),
        SysfsGpio::new(sysfs_dir.path()),
        slots,
    );
    Fixture {
        sysfs_dir,
        platform,
        sink,
        dispatch,
    }
}

#[test]
fn decision_table_covers_every_role() {
    let fan = line("GPIO_FAN_LATCH_DETECT");
    assert_eq!(
        decide(&fan, 1),
        Action::Remediate {
            message: "ASSERT: SLED is not seated",
            command: FAN_FAILSAFE_CMD,
        }
    );
    assert_eq!(
        decide(&fan, 0),
        Action::Remediate {
            message: "DEASSERT: SLED is seated",
            command: FAN_RESTORE_CMD,
        }
    );

    let uart = line("GPIO_UART_SEL");
    assert_eq!(decide(&uart, 0), Action::AdvanceHandSwitch);
    assert_eq!(decide(&uart, 1), Action::Ignore);

    let sleep = line("FM_CB_SLP3_BUF_N");
    assert_eq!(decide(&sleep, 1), Action::Propagate { pin: 101, value: 1 });
    assert_eq!(decide(&sleep, 0), Action::Propagate { pin: 101, value: 0 });

    let reset = line("RST_BMC_PERST_L");
    assert_eq!(
        decide(&reset, 1),
        Action::Log {
            severity: Severity::Critical,
            message: "DEASSERT:GPIOH4 - RST_BMC_PERST_L".to_string(),
            delay: Duration::ZERO,
        }
    );
    assert_eq!(
        decide(&reset, 0),
        Action::Log {
            severity: Severity::Critical,
            message: "ASSERT:GPIOH4 - RST_BMC_PERST_L".to_string(),
            delay: Duration::ZERO,
        }
    );

    let ejector = line("GPIO_SLOT1_EJECTOR_LATCH_DETECT_N");
    assert_eq!(
        decide(&ejector, 1),
        Action::Log {
            severity: Severity::Critical,
            message: "DEASSERT:GPIOP0 - GPIO_SLOT1_EJECTOR_LATCH_DETECT_N".to_string(),
            delay: Duration::ZERO,
        }
    );
}

#[test]
fn hand_switch_cycles_back_to_start() {
    let slots = 4;
    let order: Vec<HandSwitch> = std::iter::successors(Some(HandSwitch::Bmc), |s| {
        Some(s.next(slots))
    })
    .take(6)
    .collect();

    assert_eq!(
        order,
        vec![
            HandSwitch::Bmc,
            HandSwitch::Slot(1),
            HandSwitch::Slot(2),
            HandSwitch::Slot(3),
            HandSwitch::Slot(4),
            HandSwitch::Bmc,
        ]
    );
    assert_eq!(HandSwitch::Slot(4).next(slots), HandSwitch::Bmc);
    assert_eq!(HandSwitch::Bmc.raw(slots), 5);
    assert_eq!(HandSwitch::from_raw(5, slots), HandSwitch::Bmc);
    assert_eq!(HandSwitch::from_raw(0, slots), HandSwitch::Bmc);
    assert_eq!(HandSwitch::from_raw(3, slots), HandSwitch::Slot(3));
}

#[test]
fn bmc_position_saturates_at_full_slot_range() {
    assert_eq!(HandSwitch::Bmc.raw(u8::MAX), u8::MAX);
    assert_eq!(HandSwitch::Slot(u8::MAX).next(u8::MAX), HandSwitch::Bmc);
}

#[test]
fn sleep_signal_is_mirrored_onto_dependent_pin() {
    let fx = fixture(RecordingPlatform::default(), 1);
    let sleep = line("FM_CB_SLP3_BUF_N");

    for value in [1, 1, 0, 0, 1] {
        fx.dispatch.handle(&event(&sleep, value)).unwrap();
        assert_eq!(pin_value(fx.sysfs_dir.path(), 101), value.to_string());
    }
    assert!(fx.sink.records().is_empty());
    assert!(fx.platform.commands().is_empty());
}

#[test]
fn reset_assert_logs_once_without_side_effects() {
    let fx = fixture(RecordingPlatform::default(), 1);
    let reset = line("RST_BMC_PERST_L");

    fx.dispatch.handle(&event(&reset, 0)).unwrap();

    assert_eq!(
        fx.sink.records(),
        vec![(
            Severity::Critical,
            "ASSERT:GPIOH4 - RST_BMC_PERST_L".to_string()
        )]
    );
    assert!(fx.platform.kv_writes().is_empty());
    assert!(fx.platform.commands().is_empty());
    assert_eq!(pin_value(fx.sysfs_dir.path(), 101), "0");
}

#[test]
fn delayed_monitor_line_logs_once_after_its_delay() {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_time()
        .build()
        .unwrap();
    let sysfs_dir = tempfile::tempdir().unwrap();
    let sink = Arc::new(RecordingSink::default());
    let dispatch = LineDispatch::new(
        Arc::new(RecordingPlatform::default()),
        DeferredLogger::new(sink.clone(), rt.handle().clone()),
        SysfsGpio::new(sysfs_dir.path()),
        1,
    );
    let reset = WatchedLine::new(
        LineConfig::new(
            "GPIOH4",
            "RST_BMC_PERST_L",
            EdgeDetect::Both,
            LineRole::Monitor,
        )
        .with_log_delay(Duration::from_millis(50)),
    );

    dispatch.handle(&event(&reset, 0)).unwrap();
    assert!(sink.records().is_empty());

    std::thread::sleep(Duration::from_millis(300));
    assert_eq!(
        sink.records(),
        vec![(
            Severity::Critical,
            "ASSERT:GPIOH4 - RST_BMC_PERST_L".to_string()
        )]
    );
}

#[test]
fn fan_latch_runs_remediation_commands() {
    let fx = fixture(RecordingPlatform::default(), 1);
    let fan = line("GPIO_FAN_LATCH_DETECT");

    fx.dispatch.handle(&event(&fan, 1)).unwrap();
    fx.dispatch.handle(&event(&fan, 0)).unwrap();

    assert_eq!(
        fx.platform.commands(),
        vec![FAN_FAILSAFE_CMD.to_string(), FAN_RESTORE_CMD.to_string()]
    );
    assert_eq!(
        fx.sink.messages(),
        vec!["ASSERT: SLED is not seated", "DEASSERT: SLED is seated"]
    );
    assert_eq!(fx.sink.count(Severity::Critical), 2);
}

#[test]
fn uart_button_advances_and_persists_hand_switch() {
    let fx = fixture(RecordingPlatform::with_hand_switch(2), 4);
    let uart = line("GPIO_UART_SEL");

    fx.dispatch.handle(&event(&uart, 0)).unwrap();

    assert_eq!(
        fx.platform.kv_writes(),
        vec![(HAND_SW_KEY.to_string(), "3".to_string())]
    );
    assert_eq!(
        fx.sink.records(),
        vec![(
            Severity::Info,
            "change hand_sw location to FRU 3 by button".to_string()
        )]
    );
}

#[test]
fn uart_button_presses_wrap_back_to_original_selection() {
    let fx = fixture(RecordingPlatform::with_hand_switch(4), 4);
    let uart = line("GPIO_UART_SEL");

    for _ in 0..5 {
        fx.dispatch.handle(&event(&uart, 0)).unwrap();
    }

    let stored: Vec<String> = fx.platform.kv_writes().into_iter().map(|(_, v)| v).collect();
    assert_eq!(stored, vec!["5", "1", "2", "3", "4"]);
}

#[test]
fn unknown_hand_switch_defaults_to_bmc() {
    let fx = fixture(RecordingPlatform::default(), 4);
    let uart = line("GPIO_UART_SEL");

    fx.dispatch.handle(&event(&uart, 0)).unwrap();
    fx.dispatch.handle(&event(&uart, 1)).unwrap();

    assert_eq!(
        fx.platform.kv_writes(),
        vec![(HAND_SW_KEY.to_string(), "1".to_string())]
    );
}

#[test]
fn hand_switch_store_failure_is_reported_to_dispatcher() {
    let platform = RecordingPlatform {
        fail_kv: true,
        ..RecordingPlatform::with_hand_switch(1)
    };
    let fx = fixture(platform, 4);
    let uart = line("GPIO_UART_SEL");

    let err = fx.dispatch.handle(&event(&uart, 0)).unwrap_err();

    assert!(matches!(err, AppError::Platform(_)));
    assert!(fx.sink.records().is_empty());
}

#[test]
fn missing_dependent_pin_is_ignored() {
    let fx = fixture(RecordingPlatform::default(), 1);
    let orphan = WatchedLine::new(LineConfig::new(
        "GPIOM6",
        "FM_CB_SLP3_BUF_N",
        EdgeDetect::Both,
        LineRole::Mirror { target: 7 },
    ));

    fx.dispatch.handle(&event(&orphan, 1)).unwrap();

    assert!(fx.sink.records().is_empty());
}
