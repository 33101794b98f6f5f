use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossterm::event::{self, Event as CtEvent, KeyEvent};
use log::debug;

use crate::inference::{AnalysisOutcome, InferenceError};
use crate::measurement::MeasurementUpdate;

/// Unified event type consumed by the UI thread. Worker messages carry the
/// generation of the wizard session that started them.
#[derive(Clone, Debug)]
pub enum AppEvent {
    Key(KeyEvent),
    Resize,
    Tick,
    Measurement {
        session: u64,
        update: MeasurementUpdate,
    },
    Analysis {
        session: u64,
        result: Result<AnalysisOutcome, InferenceError>,
    },
}

/// Source of events for the runner
pub trait EventSource: Send + 'static {
    /// Block for up to `timeout` waiting for an event.
    fn recv_timeout(&self, timeout: Duration) -> Result<AppEvent, RecvTimeoutError>;
}

/// Receiving end of the application event queue. Terminal input and worker
/// threads post onto the matching `Sender`.
pub struct ChannelEventSource {
    rx: Receiver<AppEvent>,
}

impl ChannelEventSource {
    pub fn new(rx: Receiver<AppEvent>) -> Self {
        Self { rx }
    }
}

impl EventSource for ChannelEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<AppEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

pub fn event_channel() -> (Sender<AppEvent>, ChannelEventSource) {
    let (tx, rx) = mpsc::channel();
    (tx, ChannelEventSource::new(rx))
}

/// Forward crossterm key and resize events onto the queue until either side
/// goes away.
pub fn spawn_terminal_reader(tx: Sender<AppEvent>) -> JoinHandle<()> {
    thread::spawn(move || loop {
        let evt = match event::read() {
            Ok(CtEvent::Key(key)) => AppEvent::Key(key),
            Ok(CtEvent::Resize(_, _)) => AppEvent::Resize,
            Ok(_) => continue,
            Err(err) => {
                debug!("terminal reader stopped: {err}");
                break;
            }
        };
        if tx.send(evt).is_err() {
            break;
        }
    })
}

/// Configurable ticker interface
pub trait Ticker: Send + Sync + 'static {
    fn interval(&self) -> Duration;
}

/// Fixed interval ticker
#[derive(Clone, Copy, Debug)]
pub struct FixedTicker {
    interval: Duration,
}

impl FixedTicker {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Ticker for FixedTicker {
    fn interval(&self) -> Duration {
        self.interval
    }
}

/// Runner that advances the application one event/tick at a time
pub struct Runner<E: EventSource, T: Ticker> {
    event_source: E,
    ticker: T,
}

impl<E: EventSource, T: Ticker> Runner<E, T> {
    pub fn new(event_source: E, ticker: T) -> Self {
        Self {
            event_source,
            ticker,
        }
    }

    /// Blocks up to tick interval and returns the next event, or Tick on timeout
    pub fn step(&self) -> AppEvent {
        match self.event_source.recv_timeout(self.ticker.interval()) {
            Ok(ev) => ev,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => AppEvent::Tick,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement::MeasurementKind;

    #[test]
    fn step_returns_tick_on_timeout() {
        let (_tx, source) = event_channel();
        let runner = Runner::new(source, FixedTicker::new(Duration::from_millis(1)));

        match runner.step() {
            AppEvent::Tick => {}
            other => panic!("expected Tick on timeout, got {other:?}"),
        }
    }

    #[test]
    fn step_passes_through_worker_messages() {
        let (tx, source) = event_channel();
        tx.send(AppEvent::Measurement {
            session: 4,
            update: MeasurementUpdate::Started(MeasurementKind::Pulse),
        })
        .unwrap();
        let runner = Runner::new(source, FixedTicker::new(Duration::from_millis(10)));

        match runner.step() {
            AppEvent::Measurement { session: 4, update } => {
                assert_eq!(update, MeasurementUpdate::Started(MeasurementKind::Pulse))
            }
            other => panic!("expected measurement message, got {other:?}"),
        }
    }

    #[test]
    fn disconnected_source_ticks() {
        let (tx, source) = event_channel();
        drop(tx);
        let runner = Runner::new(source, FixedTicker::new(Duration::from_millis(1)));
        assert!(matches!(runner.step(), AppEvent::Tick));
    }
}
