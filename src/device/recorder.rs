//! In-memory device for dry runs and tests

use super::ToneDevice;
use crate::error::Result;
use crate::melody::Signal;
use serde::Serialize;

/// One call received by a [`Recorder`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "call", rename_all = "lowercase")]
pub enum DeviceCall {
    Play {
        pitch: u8,
        velocity: u8,
        duration_us: u64,
    },
    Mute,
    Signal { signal: Signal },
}

/// Device that only records what it is asked to do
#[derive(Debug, Default)]
pub struct Recorder {
    pub calls: Vec<DeviceCall>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pitches of all `Play` calls, in order
    pub fn pitches(&self) -> Vec<u8> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                DeviceCall::Play { pitch, .. } => Some(*pitch),
                _ => None,
            })
            .collect()
    }
}

impl ToneDevice for Recorder {
    fn name(&self) -> &'static str {
        "recorder"
    }

    fn play(&mut self, pitch: u8, velocity: u8, duration_us: u64) -> Result<()> {
        tracing::debug!(
            "play note {}, velocity {}, {} us",
            pitch,
            velocity,
            duration_us
        );
        self.calls.push(DeviceCall::Play {
            pitch,
            velocity,
            duration_us,
        });
        Ok(())
    }

    fn mute(&mut self) -> Result<()> {
        self.calls.push(DeviceCall::Mute);
        Ok(())
    }

    fn signal(&mut self, signal: Signal) -> Result<()> {
        self.calls.push(DeviceCall::Signal { signal });
        Ok(())
    }
}
