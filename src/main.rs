use log::error;
use std::process::ExitCode;

#[cfg(any(feature = "hardware-gpio", feature = "mock-gpio"))]
use gpiointrd::{AppError, BmcPlatform, Daemon, DaemonConfig, LogFacade};
#[cfg(any(feature = "hardware-gpio", feature = "mock-gpio"))]
use std::sync::Arc;

#[cfg(feature = "hardware-gpio")]
use gpiointrd::LibgpiodBackend;
#[cfg(all(feature = "mock-gpio", not(feature = "hardware-gpio")))]
use gpiointrd::MockGpioBackend;

fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

#[cfg(any(feature = "hardware-gpio", feature = "mock-gpio"))]
fn main() -> ExitCode {
    init_logger();

    let config = DaemonConfig::default();

    let backend = {
        #[cfg(feature = "hardware-gpio")]
        {
            match LibgpiodBackend::new(config.chip.clone()) {
                Ok(backend) => Arc::new(backend),
                Err(e) => {
                    error!("Failed to init libgpiod backend: {e}");
                    return ExitCode::FAILURE;
                }
            }
        }
        #[cfg(all(feature = "mock-gpio", not(feature = "hardware-gpio")))]
        {
            Arc::new(MockGpioBackend::default())
        }
    };

    let platform = Arc::new(BmcPlatform::new(config.kv_root.clone()));
    let daemon = Daemon::new(config, backend, platform, Arc::new(LogFacade));

    match daemon.run() {
        Ok(()) => ExitCode::SUCCESS,
        // already reported through the log sink
        Err(AppError::LockContention(_)) => ExitCode::FAILURE,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(not(any(feature = "hardware-gpio", feature = "mock-gpio")))]
fn main() -> ExitCode {
    init_logger();
    error!("built without a GPIO backend, enable `hardware-gpio` or `mock-gpio`");
    ExitCode::FAILURE
}
