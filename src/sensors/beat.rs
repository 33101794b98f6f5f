//! Threshold-crossing heartbeat detection over a photoplethysmographic signal.
//!
//! The detector is fed [`RawSample`]s in arrival order. A beat is declared on
//! every rising crossing of the threshold; the time since the previous beat
//! becomes an inter-beat interval when it lies in the plausible human band.
//! The most recent valid intervals are averaged into a BPM estimate.

use std::collections::VecDeque;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use rand::Rng;

use super::{AnalogChannel, SensorError};
use crate::util::mean;

/// Default crossing level on the 16-bit sample scale.
pub const DEFAULT_THRESHOLD: u16 = 53_000;
/// Shortest accepted inter-beat interval (240 BPM).
pub const MIN_INTERVAL_SECS: f64 = 0.25;
/// Longest accepted inter-beat interval (40 BPM).
pub const MAX_INTERVAL_SECS: f64 = 1.5;
/// Number of intervals averaged into the estimate.
pub const WINDOW_CAPACITY: usize = 10;
pub const SAMPLE_INTERVAL: Duration = Duration::from_millis(20);
pub const RUN_DURATION: Duration = Duration::from_secs(10);

/// Range of the low-confidence estimate used when no beat pair was accepted.
const FALLBACK_BPM: std::ops::RangeInclusive<u32> = 65..=85;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawSample {
    pub value: u16,
    /// Time since the start of the run.
    pub at: Duration,
}

/// A rising crossing, with the interval to the previous crossing when one exists.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeatEvent {
    pub at: Duration,
    pub interval: Option<f64>,
    pub accepted: bool,
}

/// FIFO of the most recent valid inter-beat intervals, in seconds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntervalWindow {
    intervals: VecDeque<f64>,
}

impl IntervalWindow {
    pub fn new() -> Self {
        Self {
            intervals: VecDeque::with_capacity(WINDOW_CAPACITY + 1),
        }
    }

    pub fn push(&mut self, interval: f64) {
        self.intervals.push_back(interval);
        if self.intervals.len() > WINDOW_CAPACITY {
            self.intervals.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn as_vec(&self) -> Vec<f64> {
        self.intervals.iter().copied().collect()
    }

    pub fn mean(&self) -> Option<f64> {
        mean(&self.as_vec())
    }
}

pub fn interval_in_band(interval: f64) -> bool {
    (MIN_INTERVAL_SECS..=MAX_INTERVAL_SECS).contains(&interval)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PulseConfidence {
    /// Averaged over this many detected intervals.
    Measured { intervals: usize },
    /// No interval survived the filter; the value is a placeholder.
    LowConfidence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PulseEstimate {
    pub bpm: u32,
    pub confidence: PulseConfidence,
    /// Sampling stopped on a read fault before the planned duration.
    pub cut_short: bool,
}

impl PulseEstimate {
    pub fn is_measured(&self) -> bool {
        matches!(self.confidence, PulseConfidence::Measured { .. })
    }
}

#[derive(Debug, Clone)]
pub struct BeatDetector {
    threshold: u16,
    above_threshold: bool,
    last_beat: Option<Duration>,
    window: IntervalWindow,
    crossings: usize,
}

impl BeatDetector {
    pub fn new(threshold: u16) -> Self {
        Self {
            threshold,
            above_threshold: false,
            last_beat: None,
            window: IntervalWindow::new(),
            crossings: 0,
        }
    }

    /// Feed one sample. Returns the beat when the sample is a rising edge.
    pub fn on_sample(&mut self, sample: RawSample) -> Option<BeatEvent> {
        if sample.value > self.threshold && !self.above_threshold {
            self.above_threshold = true;
            self.crossings += 1;

            let interval = self
                .last_beat
                .map(|prev| sample.at.saturating_sub(prev).as_secs_f64());
            let accepted = interval.is_some_and(interval_in_band);
            if let (true, Some(ibi)) = (accepted, interval) {
                self.window.push(ibi);
            }
            // A rejected interval still moves the baseline forward.
            self.last_beat = Some(sample.at);

            return Some(BeatEvent {
                at: sample.at,
                interval,
                accepted,
            });
        }

        if sample.value < self.threshold && self.above_threshold {
            self.above_threshold = false;
        }
        None
    }

    pub fn window(&self) -> &IntervalWindow {
        &self.window
    }

    pub fn crossings(&self) -> usize {
        self.crossings
    }

    /// Derive the estimate from the intervals seen so far.
    pub fn finish<R: Rng>(&self, rng: &mut R) -> PulseEstimate {
        match self.window.mean() {
            Some(avg) if avg > 0.0 => PulseEstimate {
                bpm: (60.0 / avg).round() as u32,
                confidence: PulseConfidence::Measured {
                    intervals: self.window.len(),
                },
                cut_short: false,
            },
            _ => PulseEstimate {
                bpm: rng.gen_range(FALLBACK_BPM),
                confidence: PulseConfidence::LowConfidence,
                cut_short: false,
            },
        }
    }
}

impl Default for BeatDetector {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingPlan {
    pub threshold: u16,
    pub sample_interval: Duration,
    pub duration: Duration,
}

impl Default for SamplingPlan {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            sample_interval: SAMPLE_INTERVAL,
            duration: RUN_DURATION,
        }
    }
}

/// Poll `channel` for the planned duration and derive a pulse estimate.
///
/// A read fault ends sampling early; the estimate is then derived from
/// whatever intervals were collected before the fault.
pub fn sample_pulse<C, R>(channel: &mut C, plan: SamplingPlan, rng: &mut R) -> PulseEstimate
where
    C: AnalogChannel + ?Sized,
    R: Rng,
{
    let mut detector = BeatDetector::new(plan.threshold);
    let mut cut_short = false;
    let started = Instant::now();
    info!(
        "pulse sampling for {:.1}s every {}ms",
        plan.duration.as_secs_f64(),
        plan.sample_interval.as_millis()
    );

    while started.elapsed() < plan.duration {
        match channel.read() {
            Ok(value) => {
                let sample = RawSample {
                    value,
                    at: started.elapsed(),
                };
                if let Some(beat) = detector.on_sample(sample) {
                    debug!(
                        "beat at {:?} interval={:?} accepted={}",
                        beat.at, beat.interval, beat.accepted
                    );
                }
            }
            Err(err) => {
                warn!("pulse channel read failed, ending run early: {err}");
                cut_short = true;
                break;
            }
        }
        thread::sleep(plan.sample_interval);
    }

    let estimate = PulseEstimate {
        cut_short,
        ..detector.finish(rng)
    };
    match estimate.confidence {
        PulseConfidence::Measured { intervals } => {
            info!("pulse measured: {} BPM over {} intervals", estimate.bpm, intervals)
        }
        PulseConfidence::LowConfidence => warn!(
            "no usable beats after {} crossings, using estimate {} BPM",
            detector.crossings(),
            estimate.bpm
        ),
    }
    estimate
}

/// Expand a reading from a `bits`-wide converter to the 16-bit sample scale.
pub fn scale_to_u16(raw: u32, bits: u8) -> u16 {
    match bits {
        0 => 0,
        b if b >= 16 => raw.min(u16::MAX as u32) as u16,
        b => {
            let max = (1u32 << b) - 1;
            (raw.min(max) << (16 - b)) as u16
        }
    }
}
