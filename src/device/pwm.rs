//! Buzzer on a Linux sysfs PWM channel (`/sys/class/pwm/pwmchipN/pwmM`)

use super::ToneDevice;
use crate::error::{Error, Result};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Default PWM chip directory
pub const DEFAULT_CHIP_DIR: &str = "/sys/class/pwm/pwmchip0";

/// Environment variable naming the buzzer channel
pub const BUZZER_ENV: &str = "WB_PWM_BUZZER";

/// Frequency used for pitches outside the MIDI range
pub const FALLBACK_FREQUENCY: u32 = 440;

/// Approximate frequencies (Hz) of MIDI notes 0..=127
#[rustfmt::skip]
static FREQUENCIES: [u32; 128] = [
    8, 9, 9, 10, 10, 11, 12, 12, 13, 14, 15, 15, 16, 17, 18, 19,
    21, 22, 23, 24, 26, 28, 29, 31, 33, 35, 37, 39, 41, 44, 46, 49,
    52, 55, 58, 62, 65, 69, 73, 78, 82, 87, 92, 98, 104, 110, 117, 123,
    131, 139, 147, 156, 165, 175, 185, 196, 208, 220, 233, 247, 262, 277, 294, 311,
    330, 349, 370, 392, 415, 440, 466, 494, 523, 554, 587, 622, 659, 698, 740, 784,
    831, 880, 932, 988, 1047, 1109, 1175, 1245, 1319, 1397, 1480, 1568, 1661, 1760, 1865, 1976,
    2093, 2217, 2349, 2489, 2637, 2794, 2960, 3136, 3322, 3520, 3729, 3951, 4186, 4435, 4699, 4978,
    5274, 5588, 5920, 6272, 6645, 7040, 7459, 7902, 8372, 8870, 9397, 9956, 10548, 11175, 11840, 12544,
];

/// Frequency in Hz for a MIDI note number
pub fn frequency(pitch: u8) -> u32 {
    FREQUENCIES
        .get(pitch as usize)
        .copied()
        .unwrap_or(FALLBACK_FREQUENCY)
}

/// One writable sysfs attribute
#[derive(Debug)]
struct Attribute {
    path: PathBuf,
    file: File,
}

impl Attribute {
    fn open(path: PathBuf) -> Result<Self> {
        match OpenOptions::new().write(true).open(&path) {
            Ok(file) => Ok(Self { path, file }),
            Err(source) => Err(Error::Device { path, source }),
        }
    }

    /// Write `value` and a newline in a single write
    fn set(&mut self, value: u64) -> Result<()> {
        let text = format!("{}\n", value);
        self.file
            .write_all(text.as_bytes())
            .map_err(|source| Error::Device {
                path: self.path.clone(),
                source,
            })
    }
}

/// PWM buzzer
#[derive(Debug)]
pub struct PwmBuzzer {
    channel: u32,
    enable: Attribute,
    period: Attribute,
    duty_cycle: Attribute,
    /// Velocity scaling in percent
    volume_percent: u32,
}

impl PwmBuzzer {
    /// Open channel `channel` of the chip at `chip_dir`, exporting it first
    /// if its directory does not exist yet
    pub fn open(chip_dir: &Path, channel: u32, volume_percent: u32) -> Result<Self> {
        let channel_dir = chip_dir.join(format!("pwm{}", channel));
        let enable_path = channel_dir.join("enable");

        if !enable_path.exists() {
            let export = chip_dir.join("export");
            if !export.exists() {
                return Err(Error::NoDevice(format!(
                    "no PWM export file {}",
                    export.display()
                )));
            }
            tracing::info!("exporting PWM channel {} via {}", channel, export.display());
            Attribute::open(export)?.set(channel as u64)?;
            if !enable_path.exists() {
                return Err(Error::NoDevice(format!(
                    "PWM channel {} did not appear at {}",
                    channel,
                    channel_dir.display()
                )));
            }
        }

        let buzzer = Self {
            channel,
            enable: Attribute::open(enable_path)?,
            period: Attribute::open(channel_dir.join("period"))?,
            duty_cycle: Attribute::open(channel_dir.join("duty_cycle"))?,
            volume_percent,
        };
        tracing::debug!("using PWM channel {} at {}", channel, channel_dir.display());
        Ok(buzzer)
    }

    pub fn channel(&self) -> u32 {
        self.channel
    }
}

impl ToneDevice for PwmBuzzer {
    fn name(&self) -> &'static str {
        "pwm"
    }

    fn play(&mut self, pitch: u8, velocity: u8, duration_us: u64) -> Result<()> {
        let freq = frequency(pitch) as u64;
        let velocity = (velocity as u64 * self.volume_percent as u64 / 100).min(127);
        let volume = velocity * 100 / 127;
        let period = 1_000_000_000 / freq;

        tracing::debug!(
            "playing {}Hz, volume {}, {} ms",
            freq,
            volume,
            duration_us / 1000
        );

        self.period.set(period)?;
        self.duty_cycle.set(period * volume / 200)?;
        self.enable.set(1)
    }

    fn mute(&mut self) -> Result<()> {
        self.enable.set(0)
    }
}

impl Drop for PwmBuzzer {
    fn drop(&mut self) {
        if let Err(e) = self.mute() {
            tracing::warn!("failed to mute PWM channel {}: {}", self.channel, e);
        }
    }
}
