//! Edge-notification sources for the dispatcher.

#[cfg(feature = "hardware-gpio")]
mod libgpiod;
mod mock;

#[cfg(feature = "hardware-gpio")]
pub use self::libgpiod::LibgpiodBackend;
pub use self::mock::MockGpioBackend;
