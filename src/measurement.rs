//! Measurement orchestration: runs one sensor read at a time on a worker
//! thread and reports progress and the outcome through a notifier.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Local};
use log::{error, info, warn};
use thiserror::Error;

use crate::sensors::beat::RUN_DURATION;
use crate::sensors::{Provenance, SensorError, VitalSensors};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
pub enum MeasurementKind {
    Temperature,
    Pulse,
}

impl MeasurementKind {
    pub fn unit(&self) -> &'static str {
        match self {
            MeasurementKind::Temperature => "°C",
            MeasurementKind::Pulse => "bpm",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeasurementResult {
    pub kind: MeasurementKind,
    pub value: f64,
    pub provenance: Provenance,
    pub completed_at: DateTime<Local>,
}

impl MeasurementResult {
    /// Value formatted at the unit's resolution.
    pub fn display_value(&self) -> String {
        match self.kind {
            MeasurementKind::Temperature => format!("{:.1}", self.value),
            MeasurementKind::Pulse => format!("{:.0}", self.value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MeasurementError {
    #[error("a measurement is already in progress")]
    Busy,
    #[error("{kind} sensor failed: {source}")]
    Sensor {
        kind: MeasurementKind,
        #[source]
        source: SensorError,
    },
    #[error("could not start measurement worker: {0}")]
    Worker(String),
}

/// Messages emitted by a measurement run, in order: `Started`, zero or more
/// `Progress`, then exactly one of `Completed` or `Failed`.
#[derive(Debug, Clone, PartialEq)]
pub enum MeasurementUpdate {
    Started(MeasurementKind),
    Progress { kind: MeasurementKind, percent: u8 },
    Completed(MeasurementResult),
    Failed { kind: MeasurementKind, error: MeasurementError },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeasurementTiming {
    pub temperature_steps: u32,
    pub temperature_step: Duration,
    pub pulse_duration: Duration,
    pub pulse_ticks: u32,
    pub pulse_tick: Duration,
}

impl Default for MeasurementTiming {
    fn default() -> Self {
        Self {
            temperature_steps: 20,
            temperature_step: Duration::from_millis(80),
            pulse_duration: RUN_DURATION,
            pulse_ticks: 20,
            pulse_tick: Duration::from_millis(500),
        }
    }
}

type Notify = Arc<dyn Fn(MeasurementUpdate) + Send + Sync>;

/// Clears the shared busy flag when the run ends, however it ends.
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct MeasurementOrchestrator {
    sensors: Arc<Mutex<Box<dyn VitalSensors>>>,
    busy: Arc<AtomicBool>,
    timing: MeasurementTiming,
}

impl MeasurementOrchestrator {
    pub fn new(sensors: Box<dyn VitalSensors>, timing: MeasurementTiming) -> Self {
        Self {
            sensors: Arc::new(Mutex::new(sensors)),
            busy: Arc::new(AtomicBool::new(false)),
            timing,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    pub fn hardware_connected(&self) -> bool {
        lock_sensors(&self.sensors).hardware_connected()
    }

    /// Start a measurement on a worker thread.
    ///
    /// Fails with [`MeasurementError::Busy`] while any run, of either kind,
    /// is in flight. The busy flag is released before the final update is
    /// delivered, so a caller reacting to it may start the next run.
    pub fn start<F>(
        &self,
        kind: MeasurementKind,
        notify: F,
    ) -> Result<JoinHandle<()>, MeasurementError>
    where
        F: Fn(MeasurementUpdate) + Send + Sync + 'static,
    {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("rejected {kind} measurement: busy");
            return Err(MeasurementError::Busy);
        }
        let guard = BusyGuard(Arc::clone(&self.busy));
        let notify: Notify = Arc::new(notify);
        let sensors = Arc::clone(&self.sensors);
        let timing = self.timing;

        thread::Builder::new()
            .name(format!("measure-{kind}").to_lowercase())
            .spawn(move || {
                notify(MeasurementUpdate::Started(kind));
                let run = panic::catch_unwind(AssertUnwindSafe(|| match kind {
                    MeasurementKind::Temperature => measure_temperature(&sensors, &timing, &notify),
                    MeasurementKind::Pulse => measure_pulse(&sensors, &timing, &notify),
                }));
                let outcome = run.unwrap_or_else(|_| {
                    Err(MeasurementError::Worker(format!("{kind} measurement panicked")))
                });
                drop(guard);
                match outcome {
                    Ok(result) => {
                        info!(
                            "{kind} measured: {} {} ({})",
                            result.display_value(),
                            kind.unit(),
                            result.provenance
                        );
                        notify(MeasurementUpdate::Completed(result));
                    }
                    Err(error) => {
                        error!("{kind} measurement failed: {error}");
                        notify(MeasurementUpdate::Failed { kind, error });
                    }
                }
            })
            .map_err(|e| MeasurementError::Worker(e.to_string()))
    }
}

/// A panicked run poisons the handle; later runs take it over.
fn lock_sensors(sensors: &Mutex<Box<dyn VitalSensors>>) -> MutexGuard<'_, Box<dyn VitalSensors>> {
    sensors.lock().unwrap_or_else(|poisoned| {
        warn!("recovering sensor handle after a panicked run");
        PoisonError::into_inner(poisoned)
    })
}

fn percent(step: u32, total: u32) -> u8 {
    if total == 0 {
        100
    } else {
        ((step.min(total) * 100) / total) as u8
    }
}

fn measure_temperature(
    sensors: &Mutex<Box<dyn VitalSensors>>,
    timing: &MeasurementTiming,
    notify: &Notify,
) -> Result<MeasurementResult, MeasurementError> {
    let kind = MeasurementKind::Temperature;
    // The progress animation runs ahead of the read; the probe answers
    // immediately.
    for step in 1..=timing.temperature_steps {
        thread::sleep(timing.temperature_step);
        notify(MeasurementUpdate::Progress {
            kind,
            percent: percent(step, timing.temperature_steps),
        });
    }

    let reading = lock_sensors(sensors)
        .read_temperature()
        .map_err(|source| MeasurementError::Sensor { kind, source })?;

    Ok(MeasurementResult {
        kind,
        value: reading.value,
        provenance: reading.provenance,
        completed_at: Local::now(),
    })
}

fn measure_pulse(
    sensors: &Mutex<Box<dyn VitalSensors>>,
    timing: &MeasurementTiming,
    notify: &Notify,
) -> Result<MeasurementResult, MeasurementError> {
    let kind = MeasurementKind::Pulse;
    let measuring = Arc::new(AtomicBool::new(true));

    let ticker = {
        let measuring = Arc::clone(&measuring);
        let notify = Arc::clone(notify);
        let ticks = timing.pulse_ticks;
        let tick = timing.pulse_tick;
        thread::spawn(move || {
            for step in 1..=ticks {
                if !measuring.load(Ordering::SeqCst) {
                    break;
                }
                notify(MeasurementUpdate::Progress {
                    kind,
                    percent: percent(step, ticks),
                });
                thread::sleep(tick);
            }
        })
    };

    let reading = panic::catch_unwind(AssertUnwindSafe(|| {
        lock_sensors(sensors).read_pulse(timing.pulse_duration)
    }));

    // Stop the ticker before anything else is reported, even after a panic.
    measuring.store(false, Ordering::SeqCst);
    if ticker.join().is_err() {
        warn!("pulse progress ticker panicked");
    }

    let reading = match reading {
        Ok(reading) => reading.map_err(|source| MeasurementError::Sensor { kind, source })?,
        Err(payload) => panic::resume_unwind(payload),
    };
    Ok(MeasurementResult {
        kind,
        value: reading.value as f64,
        provenance: reading.provenance,
        completed_at: Local::now(),
    })
}

/// UI-side view of one metric.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum MeasurementState {
    #[default]
    Idle,
    Running {
        percent: u8,
    },
    Done(MeasurementResult),
    Failed(String),
}

/// Per-metric state for the measurements step, updated on the UI thread.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeasurementPanel {
    pub temperature: MeasurementState,
    pub pulse: MeasurementState,
}

impl MeasurementPanel {
    pub fn state(&self, kind: MeasurementKind) -> &MeasurementState {
        match kind {
            MeasurementKind::Temperature => &self.temperature,
            MeasurementKind::Pulse => &self.pulse,
        }
    }

    fn state_mut(&mut self, kind: MeasurementKind) -> &mut MeasurementState {
        match kind {
            MeasurementKind::Temperature => &mut self.temperature,
            MeasurementKind::Pulse => &mut self.pulse,
        }
    }

    pub fn apply(&mut self, update: &MeasurementUpdate) {
        match update {
            MeasurementUpdate::Started(kind) => {
                *self.state_mut(*kind) = MeasurementState::Running { percent: 0 };
            }
            MeasurementUpdate::Progress { kind, percent } => {
                *self.state_mut(*kind) = MeasurementState::Running { percent: *percent };
            }
            MeasurementUpdate::Completed(result) => {
                *self.state_mut(result.kind) = MeasurementState::Done(*result);
            }
            MeasurementUpdate::Failed { kind, error } => {
                *self.state_mut(*kind) = MeasurementState::Failed(error.to_string());
            }
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
