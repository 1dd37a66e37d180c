//! Play-to-completion loop driving a tone device

use crate::device::ToneDevice;
use crate::error::Result;
use crate::melody::note::ticks_to_micros;
use crate::melody::{Event, Mode, Session};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// What a playback run did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PlaybackSummary {
    pub notes: usize,
    pub rests: usize,
    /// Melody time covered, in 256ths of a millisecond
    pub elapsed_ticks: i64,
    /// Stopped early by the interrupt flag
    pub interrupted: bool,
}

impl PlaybackSummary {
    pub fn elapsed_ms(&self) -> i64 {
        self.elapsed_ticks / 256
    }
}

/// Feeds session events to a [`ToneDevice`]
pub struct Player<D: ToneDevice> {
    device: D,
    realtime: bool,
    interrupt: Option<Arc<AtomicBool>>,
}

impl<D: ToneDevice> Player<D> {
    /// Real-time player without an interrupt flag
    pub fn new(device: D) -> Self {
        Self {
            device,
            realtime: true,
            interrupt: None,
        }
    }

    /// Sleep for event durations (disable for dry runs)
    pub fn realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }

    /// Stop as soon as `flag` is raised
    pub fn interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(flag);
        self
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn into_device(self) -> D {
        self.device
    }

    fn interrupted(&self) -> bool {
        self.interrupt
            .as_ref()
            .map(|flag| flag.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    fn pause(&self, ticks: i64) {
        if self.realtime && ticks > 0 {
            thread::sleep(Duration::from_micros(ticks_to_micros(ticks)));
        }
    }

    /// Poll `session` in [`Mode::Play`] until the melody is done.
    ///
    /// The device is muted before returning, on success or interrupt.
    pub fn play(&mut self, session: &mut Session) -> Result<PlaybackSummary> {
        let mut summary = PlaybackSummary::default();
        tracing::info!("playing '{}' on {}", session.name(), self.device.name());

        loop {
            if self.interrupted() {
                tracing::info!("playback interrupted");
                summary.interrupted = true;
                break;
            }

            let event = session.next_event(Mode::Play)?;
            for signal in session.take_signals() {
                self.device.signal(signal)?;
            }

            match event {
                Event::Note(note) => {
                    summary.notes += 1;
                    summary.elapsed_ticks = note.time + note.length() as i64;
                    self.device.play(
                        note.pitch,
                        note.velocity,
                        ticks_to_micros(note.duration as i64),
                    )?;
                    self.pause(note.duration as i64);
                    self.device.mute()?;
                    self.pause(note.rest as i64);
                }
                Event::Rest { time, duration } => {
                    summary.rests += 1;
                    summary.elapsed_ticks = time + duration as i64;
                    self.pause(duration as i64);
                }
                Event::Done => break,
            }
        }

        self.device.mute()?;
        session.poll_state();
        tracing::info!(
            "finished: {} notes, {} rests, {} ms",
            summary.notes,
            summary.rests,
            summary.elapsed_ms()
        );
        Ok(summary)
    }
}
