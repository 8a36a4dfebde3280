//! Typewriter pacing for the active session.
//!
//! One drain chain per session, enforced structurally by the buffer's
//! `draining` flag: a chain starts only through `kick`, ticks only through
//! `on_tick`, and the scheduler holds at most one armed deadline. Background
//! sessions accumulate committed text but are never ticked.

use std::time::Duration;

use tokio::time::Instant;

use crate::session::{PendingBuffer, RevealProgress};

pub const DEFAULT_REVEAL_TICK: Duration = Duration::from_millis(15);
pub const DEFAULT_REVEAL_STEP_CHARS: usize = 1;

#[derive(Debug)]
pub struct RevealScheduler {
    tick: Duration,
    step_chars: usize,
    deadline: Option<Instant>,
}

impl RevealScheduler {
    pub fn new(tick: Duration, step_chars: usize) -> Self {
        Self {
            tick,
            step_chars: step_chars.max(1),
            deadline: None,
        }
    }

    /// Next tick deadline, armed if and only if a drain chain is running.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Starts a drain chain for the active session's buffer if none is
    /// running and there is queued text. A chunk arriving mid-chain keeps the
    /// existing deadline; it never restarts the chain.
    pub fn kick(&mut self, buffer: &mut PendingBuffer) {
        if buffer.begin_drain() {
            self.deadline = Some(Instant::now() + self.tick);
        }
    }

    /// Stops ticking without discarding unrevealed content, e.g. when the
    /// session is switched away or its stream terminated.
    pub fn pause(&mut self, buffer: Option<&mut PendingBuffer>) {
        if let Some(buffer) = buffer {
            buffer.pause_drain();
        }
        self.deadline = None;
    }

    /// Advances the chain by one tick. Disarms when the queue is drained or
    /// the buffer disappeared underneath the armed deadline.
    pub fn on_tick(&mut self, buffer: Option<&mut PendingBuffer>) {
        let Some(buffer) = buffer else {
            self.deadline = None;
            return;
        };

        match buffer.reveal_step(self.step_chars) {
            RevealProgress::Advanced => {
                self.deadline = Some(Instant::now() + self.tick);
            }
            RevealProgress::Drained => {
                self.deadline = None;
            }
        }
    }
}
