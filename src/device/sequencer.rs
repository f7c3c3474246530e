//! Display sequencer state machine.
//!
//! ```text
//! Idle --60s--> Dissolving --done--> PostDissolvePause --1s--> Thinking
//!   ^                                                             |
//!   +--2s-- Done <--all revealed-- Typewriter <-------10s---------+
//! ```
//!
//! A new live message restarts the cycle at `Dissolving` from any state.
//! Each [`DisplaySequencer::tick`] does a bounded slice of work and returns.

use super::dissolve::Dissolve;
use super::palette::Palette;
use super::render::{self, Surface};
use rand::Rng;
use std::fmt;
use std::time::{Duration, Instant};

/// Sequencer phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SequencerState {
    Idle,
    Dissolving,
    PostDissolvePause,
    Thinking,
    Typewriter,
    Done,
}

impl fmt::Display for SequencerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Dissolving => "dissolving",
            Self::PostDissolvePause => "post-dissolve-pause",
            Self::Thinking => "thinking",
            Self::Typewriter => "typewriter",
            Self::Done => "done",
        };
        f.write_str(label)
    }
}

/// Phase durations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequencerTiming {
    pub idle: Duration,
    pub dissolve: Duration,
    pub pause: Duration,
    pub thinking: Duration,
    pub reveal_char: Duration,
    pub done: Duration,
    pub cursor_blink: Duration,
    pub block_size: u16,
}

impl Default for SequencerTiming {
    fn default() -> Self {
        Self {
            idle: Duration::from_secs(60),
            dissolve: Duration::from_millis(1_500),
            pause: Duration::from_millis(1_000),
            thinking: Duration::from_millis(10_000),
            reveal_char: Duration::from_millis(30),
            done: Duration::from_millis(2_000),
            cursor_blink: Duration::from_millis(500),
            block_size: 4,
        }
    }
}

/// Drives the phases against a [`Surface`].
#[derive(Debug, Clone)]
pub struct DisplaySequencer {
    timing: SequencerTiming,
    state: SequencerState,
    entered_at: Instant,
    dissolve: Option<Dissolve>,
    palette: Palette,
    lines: Vec<String>,
    revealed: usize,
    last_reveal: Option<Instant>,
}

impl DisplaySequencer {
    pub fn new(timing: SequencerTiming, palette: Palette, now: Instant) -> Self {
        Self {
            timing,
            state: SequencerState::Idle,
            entered_at: now,
            dissolve: None,
            palette,
            lines: Vec::new(),
            revealed: 0,
            last_reveal: None,
        }
    }

    pub fn state(&self) -> SequencerState {
        self.state
    }

    pub fn timing(&self) -> &SequencerTiming {
        &self.timing
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    /// Characters drawn so far by the current reveal.
    pub fn revealed(&self) -> usize {
        self.revealed
    }

    /// Restarts at `Dissolving`, discarding whatever phase was running.
    pub fn interrupt(&mut self, now: Instant) {
        self.enter(SequencerState::Dissolving, now);
    }

    /// Advances by one slice. `text` is what the next reveal shows.
    ///
    /// Returns the state entered, if this tick changed state.
    pub fn tick<S: Surface + ?Sized, R: Rng>(
        &mut self,
        now: Instant,
        surface: &mut S,
        rng: &mut R,
        text: &str,
    ) -> Option<SequencerState> {
        let elapsed = now.saturating_duration_since(self.entered_at);

        match self.state {
            SequencerState::Idle => {
                if elapsed >= self.timing.idle {
                    return Some(self.enter(SequencerState::Dissolving, now));
                }
            }
            SequencerState::Dissolving => {
                let block_size = self.timing.block_size;
                let duration = self.timing.dissolve;
                let dissolve = self
                    .dissolve
                    .get_or_insert_with(|| Dissolve::new(&*surface, block_size, duration, rng, now));
                if dissolve.step(surface, now) {
                    return Some(self.enter(SequencerState::PostDissolvePause, now));
                }
            }
            SequencerState::PostDissolvePause => {
                if elapsed >= self.timing.pause {
                    return Some(self.enter(SequencerState::Thinking, now));
                }
            }
            SequencerState::Thinking => {
                if elapsed >= self.timing.thinking {
                    surface.clear();
                    self.palette = Palette::random(rng);
                    self.lines = render::layout_lines(text, surface.columns());
                    return Some(self.enter(SequencerState::Typewriter, now));
                }
                render::render_thinking(surface, self.cursor_on(elapsed));
            }
            SequencerState::Typewriter => {
                let due = self
                    .last_reveal
                    .is_none_or(|last| now.saturating_duration_since(last) >= self.timing.reveal_char);
                if due {
                    self.last_reveal = Some(now);
                    if self.revealed >= render::visible_chars(&self.lines) {
                        return Some(self.enter(SequencerState::Done, now));
                    }
                    self.revealed += 1;
                    render::draw_wrapped_gradient(
                        surface,
                        &self.lines,
                        &self.palette,
                        Some(self.revealed),
                    );
                }
            }
            SequencerState::Done => {
                if elapsed >= self.timing.done {
                    return Some(self.enter(SequencerState::Idle, now));
                }
            }
        }
        None
    }

    fn cursor_on(&self, elapsed: Duration) -> bool {
        let period = self.timing.cursor_blink.as_millis().max(1);
        (elapsed.as_millis() / period) % 2 == 0
    }

    fn enter(&mut self, next: SequencerState, now: Instant) -> SequencerState {
        tracing::debug!(from = %self.state, to = %next, "sequencer transition");
        self.state = next;
        self.entered_at = now;
        self.dissolve = None;
        if next == SequencerState::Typewriter {
            self.revealed = 0;
            self.last_reveal = None;
        }
        next
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::device::render::FrameBuffer;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    struct Rig {
        seq: DisplaySequencer,
        fb: FrameBuffer,
        rng: StdRng,
        now: Instant,
    }

    impl Rig {
        fn new() -> Self {
            let now = Instant::now();
            Self {
                seq: DisplaySequencer::new(SequencerTiming::default(), Palette::default(), now),
                fb: FrameBuffer::new(128, 64),
                rng: StdRng::seed_from_u64(5),
                now,
            }
        }

        fn tick_at(&mut self, offset: Duration, text: &str) -> Option<SequencerState> {
            self.now += offset;
            self.seq.tick(self.now, &mut self.fb, &mut self.rng, text)
        }

        /// Ticks every `step` until `state` is entered or `limit` elapses.
        fn run_until(&mut self, state: SequencerState, step: Duration, limit: Duration, text: &str) {
            let mut waited = Duration::ZERO;
            while self.seq.state() != state {
                assert!(waited <= limit, "never reached {state}, stuck in {}", self.seq.state());
                self.tick_at(step, text);
                waited += step;
            }
        }
    }

    #[test]
    fn idle_dwell_starts_dissolve() {
        let mut rig = Rig::new();
        assert_eq!(rig.tick_at(ms(59_999), "hi"), None);
        assert_eq!(rig.tick_at(ms(1), "hi"), Some(SequencerState::Dissolving));
    }

    #[test]
    fn full_cycle_reveals_text_and_returns_to_idle() {
        let mut rig = Rig::new();
        let text = "Kettles sing of rain.";
        rig.tick_at(ms(60_000), text);

        rig.run_until(SequencerState::PostDissolvePause, ms(5), ms(1_600), text);
        assert!(rig.fb.is_blank());

        rig.run_until(SequencerState::Thinking, ms(5), ms(1_100), text);
        rig.tick_at(ms(5), text);
        assert_eq!(rig.fb.text_rows(), vec!["thinking_"]);
        rig.tick_at(ms(500), text);
        assert_eq!(rig.fb.text_rows(), vec!["thinking"]);

        rig.run_until(SequencerState::Typewriter, ms(5), ms(10_100), text);
        assert!(rig.fb.is_blank());

        rig.tick_at(ms(5), text);
        assert_eq!(rig.fb.text_rows(), vec!["K"]);
        rig.tick_at(ms(10), text);
        assert_eq!(rig.seq.revealed(), 1);
        rig.tick_at(ms(30), text);
        assert_eq!(rig.fb.text_rows(), vec!["Ke"]);

        rig.run_until(SequencerState::Done, ms(30), ms(2_000), text);
        assert_eq!(rig.fb.text_rows(), vec!["Kettles sing of rain."]);

        rig.run_until(SequencerState::Idle, ms(5), ms(2_100), text);
        assert_eq!(rig.fb.text_rows(), vec!["Kettles sing of rain."]);
    }

    #[test]
    fn interrupt_mid_typewriter_discards_progress() {
        let mut rig = Rig::new();
        let text = "Moths circle the porch light.";
        rig.tick_at(ms(60_000), text);
        rig.run_until(SequencerState::Typewriter, ms(10), ms(13_000), text);
        for _ in 0..5 {
            rig.tick_at(ms(30), text);
        }
        assert!(rig.seq.revealed() > 0);

        rig.seq.interrupt(rig.now);
        assert_eq!(rig.seq.state(), SequencerState::Dissolving);
        rig.tick_at(ms(1), "new text");
        assert_eq!(rig.seq.state(), SequencerState::Dissolving);

        rig.run_until(SequencerState::Typewriter, ms(10), ms(13_000), "new text");
        assert_eq!(rig.seq.revealed(), 0);
        rig.tick_at(ms(1), "new text");
        assert_eq!(rig.fb.text_rows(), vec!["n"]);
    }

    #[test]
    fn typewriter_palette_is_regenerated() {
        let mut rig = Rig::new();
        let before = *rig.seq.palette();
        rig.tick_at(ms(60_000), "x");
        rig.run_until(SequencerState::Typewriter, ms(10), ms(13_000), "x");
        assert_ne!(rig.seq.palette(), &before);
    }

    #[test]
    fn state_labels() {
        assert_eq!(SequencerState::PostDissolvePause.to_string(), "post-dissolve-pause");
        assert_eq!(SequencerState::Typewriter.to_string(), "typewriter");
    }
}
