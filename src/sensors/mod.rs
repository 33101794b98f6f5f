//! Vital-sign sensors: hardware handles, fallbacks and provenance tagging.

pub mod beat;
pub mod channel;

use std::fmt;
use std::thread;
use std::time::Duration;

use log::{info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Config;
use crate::util::round_tenths;
use beat::{sample_pulse, PulseConfidence, SamplingPlan};
use channel::{SysfsAnalogChannel, SysfsTemperatureProbe};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SensorError {
    #[error("sensor is not connected")]
    NotConnected,
    #[error("sensor read failed: {0}")]
    Read(String),
    #[error("sensor returned an unreadable value: {0:?}")]
    Parse(String),
    #[error("sensor handle unavailable: {0}")]
    Unavailable(String),
}

/// An analog input sampled on the 16-bit scale.
pub trait AnalogChannel: Send {
    fn read(&mut self) -> Result<u16, SensorError>;
}

/// A temperature sensor exposing its raw object-temperature register.
pub trait TemperatureProbe: Send {
    fn read_raw(&mut self) -> Result<u16, SensorError>;
}

/// Convert an MLX90614-style register value (0.02 K per LSB) to Celsius.
pub fn raw_to_celsius(raw: u16) -> f64 {
    raw as f64 * 0.02 - 273.15
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FallbackReason {
    /// No sensor was found at start-up.
    NoHardware,
    /// The sensor is present but the read failed.
    ReadFault,
    /// The pulse run finished without a usable pair of beats.
    NoBeats,
}

/// Where a reading came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Provenance {
    Sensor,
    Simulated(FallbackReason),
}

impl Provenance {
    pub fn is_simulated(&self) -> bool {
        matches!(self, Provenance::Simulated(_))
    }

    /// Stable label used in the database and summaries.
    pub fn label(&self) -> &'static str {
        match self {
            Provenance::Sensor => "sensor",
            Provenance::Simulated(FallbackReason::NoHardware) => "simulated",
            Provenance::Simulated(FallbackReason::ReadFault) => "simulated (read fault)",
            Provenance::Simulated(FallbackReason::NoBeats) => "estimated (no beats detected)",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading<T> {
    pub value: T,
    pub provenance: Provenance,
}

/// The sensor collaborator used by the measurement orchestrator.
pub trait VitalSensors: Send {
    fn read_temperature(&mut self) -> Result<Reading<f64>, SensorError>;
    fn read_pulse(&mut self, duration: Duration) -> Result<Reading<u32>, SensorError>;
    /// Whether every sensor was found at start-up.
    fn hardware_connected(&self) -> bool;
}

/// Owns the hardware handles. Reads never fail: faults are absorbed into
/// simulated values tagged with the reason.
pub struct SensorManager {
    pulse: Option<Box<dyn AnalogChannel>>,
    temperature: Option<Box<dyn TemperatureProbe>>,
    plan: SamplingPlan,
    rng: StdRng,
}

impl SensorManager {
    pub fn new(
        pulse: Option<Box<dyn AnalogChannel>>,
        temperature: Option<Box<dyn TemperatureProbe>>,
        plan: SamplingPlan,
    ) -> Self {
        Self {
            pulse,
            temperature,
            plan,
            rng: StdRng::from_entropy(),
        }
    }

    /// A manager with no hardware at all.
    pub fn simulated() -> Self {
        Self::new(None, None, SamplingPlan::default())
    }

    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    /// Open and test-read the sensors named in the config. A sensor that
    /// cannot be read is left out and its values are simulated.
    pub fn from_config(config: &Config) -> Self {
        let plan = SamplingPlan {
            threshold: config.pulse_threshold,
            ..SamplingPlan::default()
        };
        if config.simulate_sensors {
            info!("sensor simulation forced by configuration");
            return Self::new(None, None, plan);
        }

        let pulse = config.pulse_channel.as_ref().and_then(|path| {
            let mut channel = SysfsAnalogChannel::new(path, config.adc_bits);
            match channel.read() {
                Ok(_) => {
                    info!("pulse channel ready at {}", path.display());
                    Some(Box::new(channel) as Box<dyn AnalogChannel>)
                }
                Err(err) => {
                    warn!("pulse channel {} unavailable: {err}", path.display());
                    None
                }
            }
        });

        let temperature = config.temperature_channel.as_ref().and_then(|path| {
            let mut probe = SysfsTemperatureProbe::new(path);
            match probe.read_raw() {
                Ok(_) => {
                    info!("temperature probe ready at {}", path.display());
                    Some(Box::new(probe) as Box<dyn TemperatureProbe>)
                }
                Err(err) => {
                    warn!("temperature probe {} unavailable: {err}", path.display());
                    None
                }
            }
        });

        Self::new(pulse, temperature, plan)
    }

    pub fn has_pulse_sensor(&self) -> bool {
        self.pulse.is_some()
    }

    pub fn has_temperature_sensor(&self) -> bool {
        self.temperature.is_some()
    }
}

impl VitalSensors for SensorManager {
    fn read_temperature(&mut self) -> Result<Reading<f64>, SensorError> {
        let Some(probe) = self.temperature.as_mut() else {
            return Ok(Reading {
                value: round_tenths(self.rng.gen_range(35.8..=37.8)),
                provenance: Provenance::Simulated(FallbackReason::NoHardware),
            });
        };

        match probe.read_raw() {
            Ok(raw) => Ok(Reading {
                value: round_tenths(raw_to_celsius(raw)),
                provenance: Provenance::Sensor,
            }),
            Err(err) => {
                warn!("temperature read failed, using simulated value: {err}");
                Ok(Reading {
                    value: round_tenths(self.rng.gen_range(36.0..=37.5)),
                    provenance: Provenance::Simulated(FallbackReason::ReadFault),
                })
            }
        }
    }

    fn read_pulse(&mut self, duration: Duration) -> Result<Reading<u32>, SensorError> {
        let Some(channel) = self.pulse.as_mut() else {
            thread::sleep(duration.mul_f64(0.15));
            return Ok(Reading {
                value: self.rng.gen_range(60..=100),
                provenance: Provenance::Simulated(FallbackReason::NoHardware),
            });
        };

        let plan = SamplingPlan {
            duration,
            ..self.plan
        };
        let estimate = sample_pulse(channel.as_mut(), plan, &mut self.rng);
        let provenance = match (estimate.confidence, estimate.cut_short) {
            (PulseConfidence::Measured { .. }, _) => Provenance::Sensor,
            (PulseConfidence::LowConfidence, true) => {
                Provenance::Simulated(FallbackReason::ReadFault)
            }
            (PulseConfidence::LowConfidence, false) => {
                Provenance::Simulated(FallbackReason::NoBeats)
            }
        };
        Ok(Reading {
            value: estimate.bpm,
            provenance,
        })
    }

    fn hardware_connected(&self) -> bool {
        self.pulse.is_some() && self.temperature.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedProbe(Result<u16, SensorError>);

    impl TemperatureProbe for FixedProbe {
        fn read_raw(&mut self) -> Result<u16, SensorError> {
            self.0.clone()
        }
    }

    struct FlatChannel;

    impl AnalogChannel for FlatChannel {
        fn read(&mut self) -> Result<u16, SensorError> {
            Ok(1_000)
        }
    }

    fn seeded(manager: SensorManager) -> SensorManager {
        manager.with_rng(StdRng::seed_from_u64(11))
    }

    #[test]
    fn test_raw_to_celsius() {
        // 0x3AF7 = 15095 -> 301.9 K -> 28.75 C
        assert!((raw_to_celsius(15_095) - 28.75).abs() < 1e-9);
        assert!((raw_to_celsius(0) + 273.15).abs() < 1e-9);
    }

    #[test]
    fn test_temperature_from_probe_is_sensor_tagged() {
        // 310.15 K = 37.0 C
        let mut manager = seeded(SensorManager::new(
            None,
            Some(Box::new(FixedProbe(Ok(15_508)))),
            SamplingPlan::default(),
        ));
        let reading = manager.read_temperature().unwrap();
        assert_eq!(reading.provenance, Provenance::Sensor);
        assert_eq!(reading.value, 37.0);
    }

    #[test]
    fn test_temperature_fault_falls_back_with_reason() {
        let mut manager = seeded(SensorManager::new(
            None,
            Some(Box::new(FixedProbe(Err(SensorError::Read("nack".into()))))),
            SamplingPlan::default(),
        ));
        let reading = manager.read_temperature().unwrap();
        assert_eq!(
            reading.provenance,
            Provenance::Simulated(FallbackReason::ReadFault)
        );
        assert!((36.0..=37.5).contains(&reading.value));
    }

    #[test]
    fn test_temperature_without_hardware_is_simulated() {
        let mut manager = seeded(SensorManager::simulated());
        let reading = manager.read_temperature().unwrap();
        assert!(reading.provenance.is_simulated());
        assert!((35.8..=37.8).contains(&reading.value));
        assert!(!manager.hardware_connected());
    }

    #[test]
    fn test_pulse_without_hardware_is_simulated() {
        let mut manager = seeded(SensorManager::simulated());
        let reading = manager.read_pulse(Duration::from_millis(20)).unwrap();
        assert_eq!(
            reading.provenance,
            Provenance::Simulated(FallbackReason::NoHardware)
        );
        assert!((60..=100).contains(&reading.value));
    }

    #[test]
    fn test_flat_signal_is_flagged_low_confidence() {
        let plan = SamplingPlan {
            sample_interval: Duration::from_millis(1),
            ..SamplingPlan::default()
        };
        let mut manager = seeded(SensorManager::new(Some(Box::new(FlatChannel)), None, plan));
        let reading = manager.read_pulse(Duration::from_millis(30)).unwrap();
        assert_eq!(reading.provenance, Provenance::Simulated(FallbackReason::NoBeats));
        assert!((65..=85).contains(&reading.value));
    }

    struct BrokenChannel;

    impl AnalogChannel for BrokenChannel {
        fn read(&mut self) -> Result<u16, SensorError> {
            Err(SensorError::Read("spi timeout".into()))
        }
    }

    #[test]
    fn test_pulse_read_fault_is_tagged_as_fault() {
        let plan = SamplingPlan {
            sample_interval: Duration::from_millis(1),
            ..SamplingPlan::default()
        };
        let mut manager = seeded(SensorManager::new(Some(Box::new(BrokenChannel)), None, plan));
        let reading = manager.read_pulse(Duration::from_secs(5)).unwrap();
        assert_eq!(
            reading.provenance,
            Provenance::Simulated(FallbackReason::ReadFault)
        );
        assert!((65..=85).contains(&reading.value));
    }

    #[test]
    fn test_provenance_labels_are_distinct() {
        let labels = [
            Provenance::Sensor.label(),
            Provenance::Simulated(FallbackReason::NoHardware).label(),
            Provenance::Simulated(FallbackReason::ReadFault).label(),
            Provenance::Simulated(FallbackReason::NoBeats).label(),
        ];
        for (i, a) in labels.iter().enumerate() {
            for b in labels.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }
}
