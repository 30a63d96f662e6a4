pub mod backend;
pub mod config;
pub mod daemon;
pub mod deferred;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod gpio;
pub mod platform;
pub mod slot;

pub use config::{DaemonConfig, DefaultCheck, Edge, EdgeDetect, LineConfig, gpio_num};
pub use daemon::{Daemon, PidLock};
pub use deferred::DeferredLogger;
pub use dispatch::{Action, LineDispatch, LineRole};
pub use error::AppError;
pub use gpio::{
    ChangeEvent, Dispatcher, DispatcherState, EdgeEvent, EventHandler, GpioBackend, WatchedLine,
};
pub use platform::{BmcPlatform, HandSwitch, LogFacade, LogSink, Platform, Severity};

#[cfg(feature = "hardware-gpio")]
pub use backend::LibgpiodBackend;
pub use backend::MockGpioBackend;
