//! Thermal sensor probe.
//!
//! Temperature comes from the first readable file in an ordered candidate
//! list. Candidates default to:
//! - `/sys/class/thermal/thermal_zone*/temp`
//! - `/sys/class/hwmon/hwmon*/temp1_input`
//!
//! Both report millidegrees Celsius.

use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// How many numbered zones/devices the default candidate list covers.
const MAX_SENSOR_INDEX: usize = 10;

/// Temperature reading plus whether any sensor answered.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ThermalSample {
    pub celsius: f32,
    pub available: bool,
}

/// Default ordered candidate list under `sys_root`.
pub fn default_thermal_candidates(sys_root: &Path) -> Vec<PathBuf> {
    let thermal = sys_root.join("class").join("thermal");
    let hwmon = sys_root.join("class").join("hwmon");

    let zones = (0..MAX_SENSOR_INDEX)
        .map(|i| thermal.join(format!("thermal_zone{}", i)).join("temp"));
    let devices = (0..MAX_SENSOR_INDEX)
        .map(|i| hwmon.join(format!("hwmon{}", i)).join("temp1_input"));
    zones.chain(devices).collect()
}

/// Parses a millidegree reading into Celsius.
pub fn parse_millidegrees(content: &str) -> Option<f32> {
    let millidegrees = content.trim().parse::<i64>().ok()?;
    Some(millidegrees as f32 / 1000.0)
}

/// Probes the candidates in order; the first that parses wins.
///
/// Availability is decided fresh on every call since sensors come and go.
pub fn read_thermal(candidates: &[PathBuf]) -> ThermalSample {
    for path in candidates {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => continue,
        };
        match parse_millidegrees(&content) {
            Some(celsius) => {
                trace!("Temperature {:.1}°C from {}", celsius, path.display());
                return ThermalSample {
                    celsius,
                    available: true,
                };
            }
            None => debug!("Unparseable temperature in {}", path.display()),
        }
    }
    ThermalSample::default()
}
