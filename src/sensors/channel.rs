//! File-backed sensor handles for Linux IIO/sysfs attributes.
//!
//! An MCP3008 bound to the `mcp320x` driver exposes each input as
//! `in_voltageN_raw`; an MLX90614 bound to the `mlx90614` driver exposes the
//! object register as `in_temp_object_raw`.

use std::fs;
use std::path::{Path, PathBuf};

use super::beat::scale_to_u16;
use super::{AnalogChannel, SensorError, TemperatureProbe};

fn read_integer(path: &Path) -> Result<u32, SensorError> {
    let text = fs::read_to_string(path)
        .map_err(|e| SensorError::Read(format!("{}: {e}", path.display())))?;
    let trimmed = text.trim();
    trimmed
        .parse::<u32>()
        .map_err(|_| SensorError::Parse(trimmed.to_string()))
}

#[derive(Debug, Clone)]
pub struct SysfsAnalogChannel {
    path: PathBuf,
    bits: u8,
}

impl SysfsAnalogChannel {
    pub fn new<P: AsRef<Path>>(path: P, bits: u8) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            bits,
        }
    }
}

impl AnalogChannel for SysfsAnalogChannel {
    fn read(&mut self) -> Result<u16, SensorError> {
        read_integer(&self.path).map(|raw| scale_to_u16(raw, self.bits))
    }
}

#[derive(Debug, Clone)]
pub struct SysfsTemperatureProbe {
    path: PathBuf,
}

impl SysfsTemperatureProbe {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl TemperatureProbe for SysfsTemperatureProbe {
    fn read_raw(&mut self) -> Result<u16, SensorError> {
        let raw = read_integer(&self.path)?;
        u16::try_from(raw).map_err(|_| SensorError::Parse(raw.to_string()))
    }
}
