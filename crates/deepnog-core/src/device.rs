//! Compute device selection.

use std::fmt;
use std::str::FromStr;

use candle_core::Device;

use crate::error::{DeepnogError, Result};

/// Device requested by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceRequest {
    /// GPU when available, otherwise CPU.
    #[default]
    Auto,
    Cpu,
    Gpu,
}

impl DeviceRequest {
    /// Resolve to a concrete device. Fails when a GPU is requested but
    /// cannot be used.
    pub fn resolve(self) -> Result<Device> {
        match self {
            DeviceRequest::Auto => Ok(Device::cuda_if_available(0).unwrap_or(Device::Cpu)),
            DeviceRequest::Cpu => Ok(Device::Cpu),
            DeviceRequest::Gpu => Device::new_cuda(0).map_err(|e| DeepnogError::DeviceUnavailable {
                requested: self.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

impl FromStr for DeviceRequest {
    type Err = DeepnogError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(DeviceRequest::Auto),
            "cpu" => Ok(DeviceRequest::Cpu),
            "gpu" | "cuda" => Ok(DeviceRequest::Gpu),
            _ => Err(DeepnogError::DeviceUnavailable {
                requested: s.to_string(),
                reason: "expected one of auto, cpu, gpu".into(),
            }),
        }
    }
}

impl fmt::Display for DeviceRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeviceRequest::Auto => "auto",
            DeviceRequest::Cpu => "cpu",
            DeviceRequest::Gpu => "gpu",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_requests() {
        assert_eq!("auto".parse::<DeviceRequest>().unwrap(), DeviceRequest::Auto);
        assert_eq!("CPU".parse::<DeviceRequest>().unwrap(), DeviceRequest::Cpu);
        assert_eq!("gpu".parse::<DeviceRequest>().unwrap(), DeviceRequest::Gpu);
        assert!("tpu".parse::<DeviceRequest>().is_err());
    }

    #[test]
    fn test_cpu_always_resolves() {
        assert!(DeviceRequest::Cpu.resolve().unwrap().is_cpu());
        assert!(DeviceRequest::Auto.resolve().is_ok());
    }
}
