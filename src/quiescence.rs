//! Detects when exiftool has stopped producing output.
//!
//! Some exiftool builds (notably `exiftool(-k).exe`) wait for a keypress after
//! finishing. The invoker feeds output counts into a [`QuiescenceTracker`] on
//! every tick and releases the process once it reports [`Quiescence::Quiet`].

use std::thread;
use std::time::Duration;

use crate::config::QuiescenceSettings;

pub trait Clock: Send + Sync {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quiescence {
    /// Waiting out the initial grace period.
    Starting,
    Streaming { quiet_ticks: u32 },
    Quiet,
}

#[derive(Debug, Clone)]
pub struct QuiescenceTracker {
    settings: QuiescenceSettings,
    state: Quiescence,
    last_seen: u64,
}

impl QuiescenceTracker {
    pub fn new(settings: QuiescenceSettings) -> Self {
        Self {
            settings,
            state: Quiescence::Starting,
            last_seen: 0,
        }
    }

    pub fn state(&self) -> Quiescence {
        self.state
    }

    /// How long the caller should sleep before the next call to [`observe`].
    ///
    /// [`observe`]: QuiescenceTracker::observe
    pub fn next_wait(&self) -> Duration {
        match self.state {
            Quiescence::Starting => self.settings.grace,
            _ => self.settings.tick,
        }
    }

    /// Records the total number of output chunks seen so far.
    ///
    /// A grace period without any output already counts as one quiet tick.
    pub fn observe(&mut self, total_chunks: u64) -> Quiescence {
        self.state = match self.state {
            Quiescence::Quiet => Quiescence::Quiet,
            Quiescence::Starting => self.after_tick(total_chunks, 0),
            Quiescence::Streaming { quiet_ticks } => self.after_tick(total_chunks, quiet_ticks),
        };
        self.state
    }

    fn after_tick(&mut self, total_chunks: u64, quiet_ticks: u32) -> Quiescence {
        if total_chunks != self.last_seen {
            self.last_seen = total_chunks;
            return Quiescence::Streaming { quiet_ticks: 0 };
        }
        if quiet_ticks + 1 >= self.settings.quiet_ticks {
            Quiescence::Quiet
        } else {
            Quiescence::Streaming {
                quiet_ticks: quiet_ticks + 1,
            }
        }
    }
}
