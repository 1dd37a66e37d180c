//! Tone output devices

pub mod pwm;
pub mod recorder;

use crate::error::Result;
use crate::melody::Signal;

pub use pwm::PwmBuzzer;
pub use recorder::{DeviceCall, Recorder};

/// Monophonic tone generator driven by the player
pub trait ToneDevice {
    /// Device name for diagnostics
    fn name(&self) -> &'static str;

    /// Start sounding `pitch` (MIDI note number) for `duration_us`.
    ///
    /// The call does not block; the player paces itself.
    fn play(&mut self, pitch: u8, velocity: u8, duration_us: u64) -> Result<()>;

    /// Silence the output
    fn mute(&mut self) -> Result<()>;

    /// LED / vibration / backlight directive from the melody body
    fn signal(&mut self, signal: Signal) -> Result<()> {
        tracing::debug!("{} ignores {:?}", self.name(), signal);
        Ok(())
    }
}

impl<D: ToneDevice + ?Sized> ToneDevice for &mut D {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn play(&mut self, pitch: u8, velocity: u8, duration_us: u64) -> Result<()> {
        (**self).play(pitch, velocity, duration_us)
    }

    fn mute(&mut self) -> Result<()> {
        (**self).mute()
    }

    fn signal(&mut self, signal: Signal) -> Result<()> {
        (**self).signal(signal)
    }
}

impl<D: ToneDevice + ?Sized> ToneDevice for Box<D> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn play(&mut self, pitch: u8, velocity: u8, duration_us: u64) -> Result<()> {
        (**self).play(pitch, velocity, duration_us)
    }

    fn mute(&mut self) -> Result<()> {
        (**self).mute()
    }

    fn signal(&mut self, signal: Signal) -> Result<()> {
        (**self).signal(signal)
    }
}
