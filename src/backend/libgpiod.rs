use std::path::PathBuf;
use std::time::Duration;

use libgpiod::{chip::Chip, line, line::EventClock, request};
use log::{info, warn};
use parking_lot::Mutex;

use crate::config::{Edge, EdgeDetect};
use crate::error::AppError;
use crate::gpio::{EdgeEvent, GpioBackend, WatchedLine};

const LIBGPIOD_BACKEND_EVENT_BUFFER_CAPACITY: usize = 64;

/// Character-device backend. All watched lines share one request on one
/// chip, so a single wait covers every line.
pub struct LibgpiodBackend {
    chip: PathBuf,
    request: Mutex<Option<request::Request>>,
    buffer: Mutex<request::Buffer>,
}

impl LibgpiodBackend {
    pub fn new<P: Into<PathBuf>>(chip: P) -> Result<Self, AppError> {
        let buffer = request::Buffer::new(LIBGPIOD_BACKEND_EVENT_BUFFER_CAPACITY)
            .map_err(|e| AppError::Gpio(format!("event buffer: {e}")))?;
        Ok(Self {
            chip: chip.into(),
            request: Mutex::new(None),
            buffer: Mutex::new(buffer),
        })
    }

    fn open_chip(&self) -> Result<Chip, AppError> {
        Chip::open(&self.chip)
            .map_err(|e| AppError::OpenFailed(format!("open chip {}: {e}", self.chip.display())))
    }

    fn make_line_settings(edge: EdgeDetect) -> Result<line::Settings, AppError> {
        let mut ls = line::Settings::new()
            .map_err(|e| AppError::OpenFailed(format!("libgpiod settings: {e}")))?;

        ls.set_direction(line::Direction::Input)
            .map_err(|e| AppError::OpenFailed(format!("set direction: {e}")))?;
        ls.set_edge_detection(Some(match edge {
            EdgeDetect::Rising => line::Edge::Rising,
            EdgeDetect::Falling => line::Edge::Falling,
            EdgeDetect::Both => line::Edge::Both,
        }))
        .map_err(|e| AppError::OpenFailed(format!("set edge detection: {e}")))?;
        ls.set_event_clock(EventClock::Realtime)
            .map_err(|e| AppError::OpenFailed(format!("set event clock: {e}")))?;

        Ok(ls)
    }

    fn make_line_config(lines: &[WatchedLine]) -> Result<line::Config, AppError> {
        let mut cfg =
            line::Config::new().map_err(|e| AppError::OpenFailed(format!("line config: {e}")))?;
        for l in lines {
            let settings = Self::make_line_settings(l.edge())?;
            cfg.add_line_settings(&[l.offset()], settings).map_err(|e| {
                AppError::OpenFailed(format!("line config for {}: {e}", l.name()))
            })?;
        }
        Ok(cfg)
    }

    fn request_lines(chip: &Chip, line_cfg: &line::Config) -> Result<request::Request, AppError> {
        let mut req_cfg = request::Config::new()
            .map_err(|e| AppError::OpenFailed(format!("request config: {e}")))?;
        req_cfg
            .set_consumer(env!("CARGO_PKG_NAME"))
            .map_err(|e| AppError::OpenFailed(format!("request consumer: {e}")))?;
        chip.request_lines(Some(&req_cfg), line_cfg)
            .map_err(|e| AppError::OpenFailed(format!("request lines: {e}")))
    }
}

impl GpioBackend for LibgpiodBackend {
    fn open(&self, lines: &[WatchedLine]) -> Result<(), AppError> {
        let chip = self.open_chip()?;
        let line_cfg = Self::make_line_config(lines)?;
        let request = Self::request_lines(&chip, &line_cfg)?;

        info!(
            "requested {} lines on {}",
            lines.len(),
            self.chip.display()
        );
        *self.request.lock() = Some(request);
        Ok(())
    }

    fn wait(&self, timeout: Option<Duration>) -> Result<Vec<EdgeEvent>, AppError> {
        let guard = self.request.lock();
        let req = guard
            .as_ref()
            .ok_or_else(|| AppError::InvalidState("lines not requested".into()))?;

        let has_event = req
            .wait_edge_events(timeout)
            .map_err(|e| AppError::Gpio(format!("wait edge events: {e}")))?;
        if !has_event {
            return Ok(Vec::new());
        }

        let mut buffer = self.buffer.lock();
        let events = req
            .read_edge_events(&mut buffer)
            .map_err(|e| AppError::Gpio(format!("read edge events: {e}")))?;

        let mut batch = Vec::new();
        for evt in events {
            let evt = match evt {
                Ok(e) => e,
                Err(e) => {
                    warn!("malformed edge event: {e}");
                    continue;
                }
            };
            let edge = match evt.event_type() {
                Ok(line::EdgeKind::Rising) => Edge::Rising,
                Ok(line::EdgeKind::Falling) => Edge::Falling,
                Err(_) => continue,
            };

            batch.push(EdgeEvent {
                offset: evt.line_offset(),
                edge,
                timestamp_ms: evt.timestamp().as_millis() as u64,
            });
        }
        Ok(batch)
    }

    fn close(&self) {
        self.request.lock().take();
    }
}
