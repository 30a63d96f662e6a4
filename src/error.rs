use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Failed to open line: {0}")]
    OpenFailed(String),
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("Device unreadable: {0}")]
    DeviceUnreadable(String),
    #[error("Another instance holds the lock on {0}")]
    LockContention(String),
    #[error("Dispatch handler failure: {0}")]
    DispatchHandlerFailure(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Platform error: {0}")]
    Platform(String),
    #[error("GPIO error: {0}")]
    Gpio(String),
    #[error("Lock error: {0}")]
    Lock(String),
}
