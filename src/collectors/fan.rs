//! Fan sensor probe.
//!
//! Walks `/sys/class/hwmon/hwmon*` in numeric order and, inside each device,
//! `fan1_input`..`fan8_input`. The first readable speed wins and the search
//! stops. Optional siblings refine the reading:
//! - `fanN_enable` (0/1) decides whether the fan counts as active
//! - `pwmN` (0-255) gives the drive level
//!
//! When no hwmon fan exists, ThinkPad's `/proc/acpi/ibm/fan` is consulted.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::trace;

const MAX_FAN_INDEX: u32 = 8;
const PWM_MAX: u32 = 255;
/// ThinkPad firmware levels run 0..=7.
const ACPI_LEVEL_MAX: u32 = 7;

/// Fan reading plus whether any fan answered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanSample {
    pub speed_rpm: u32,
    /// Drive level as a percentage, when the hardware reports one.
    pub level_percent: Option<u8>,
    pub active: bool,
    pub available: bool,
}

fn read_u32(path: &Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

fn pwm_to_percent(pwm: u32) -> u8 {
    (pwm.min(PWM_MAX) * 100 / PWM_MAX) as u8
}

/// `hwmonN` directories sorted by N.
fn hwmon_dirs(sys_root: &Path) -> Vec<PathBuf> {
    let base = sys_root.join("class").join("hwmon");
    let Ok(entries) = fs::read_dir(&base) else {
        return Vec::new();
    };

    let mut dirs: Vec<(u32, PathBuf)> = entries
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name();
            let index = name.to_str()?.strip_prefix("hwmon")?.parse::<u32>().ok()?;
            Some((index, entry.path()))
        })
        .collect();
    dirs.sort_by_key(|(index, _)| *index);
    dirs.into_iter().map(|(_, path)| path).collect()
}

fn read_hwmon_fan(dir: &Path, index: u32) -> Option<FanSample> {
    let speed_rpm = read_u32(&dir.join(format!("fan{}_input", index)))?;
    let enabled = read_u32(&dir.join(format!("fan{}_enable", index)));
    let level_percent = read_u32(&dir.join(format!("pwm{}", index))).map(pwm_to_percent);

    Some(FanSample {
        speed_rpm,
        level_percent,
        active: enabled.map_or(speed_rpm > 0, |e| e != 0),
        available: true,
    })
}

/// Parses the ThinkPad ACPI fan file (`status:`, `speed:`, `level:` lines).
pub fn parse_acpi_fan(content: &str) -> Option<FanSample> {
    let mut speed: Option<u32> = None;
    let mut enabled: Option<bool> = None;
    let mut level_percent: Option<u8> = None;

    for line in content.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "speed" => speed = value.parse().ok(),
            "status" => enabled = Some(value == "enabled"),
            "level" => {
                level_percent = match value {
                    "full-speed" | "disengaged" => Some(100),
                    "auto" => None,
                    n => n
                        .parse::<u32>()
                        .ok()
                        .map(|l| (l.min(ACPI_LEVEL_MAX) * 100 / ACPI_LEVEL_MAX) as u8),
                }
            }
            _ => {}
        }
    }

    let speed_rpm = speed?;
    Some(FanSample {
        speed_rpm,
        level_percent,
        active: enabled.unwrap_or(speed_rpm > 0),
        available: true,
    })
}

/// Finds the first readable fan. Unavailable when nothing answers.
pub fn read_fan(sys_root: &Path, proc_root: &Path) -> FanSample {
    for dir in hwmon_dirs(sys_root) {
        for index in 1..=MAX_FAN_INDEX {
            if let Some(sample) = read_hwmon_fan(&dir, index) {
                trace!("Fan {} rpm from {}/fan{}", sample.speed_rpm, dir.display(), index);
                return sample;
            }
        }
    }

    let acpi = proc_root.join("acpi").join("ibm").join("fan");
    if let Some(sample) = fs::read_to_string(&acpi)
        .ok()
        .and_then(|c| parse_acpi_fan(&c))
    {
        return sample;
    }

    FanSample::default()
}
