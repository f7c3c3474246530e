//! Panel side: ingestion, sequencing and drawing.
//!
//! [`DeviceContext`] owns every piece of mutable panel state. Drivers (HTTP,
//! serial, radio) never touch it directly; they send [`InboundChunk`]s over a
//! channel and [`run`] feeds them in between sequencer ticks.

pub mod canned;
pub mod dissolve;
pub mod http;
pub mod ingest;
pub mod palette;
pub mod render;
pub mod sequencer;

pub use canned::CannedCatalog;
pub use ingest::{InboundChannel, IngestionMerger, LiveMessage};
pub use palette::Palette;
pub use render::{FrameBuffer, Surface};
pub use sequencer::{DisplaySequencer, SequencerState, SequencerTiming};

use rand::Rng;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Bytes received on one inbound channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundChunk {
    pub channel: InboundChannel,
    pub bytes: Vec<u8>,
}

impl InboundChunk {
    pub fn new(channel: InboundChannel, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            channel,
            bytes: bytes.into(),
        }
    }
}

/// The most recent live message and whether it is still being shown.
#[derive(Debug, Clone, Default)]
pub struct LiveState {
    text: String,
    has_live: bool,
    pending: bool,
}

impl LiveState {
    /// Replaces the live text and raises the new-text signal. A signal not
    /// yet consumed is simply overwritten.
    pub fn publish(&mut self, message: LiveMessage) {
        self.text = message.text;
        self.has_live = true;
        self.pending = true;
    }

    /// Consumes the new-text signal.
    pub fn take_signal(&mut self) -> bool {
        std::mem::take(&mut self.pending)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn has_live(&self) -> bool {
        self.has_live
    }

    fn release(&mut self) {
        self.has_live = false;
    }
}

/// All panel state, advanced one step per loop iteration.
#[derive(Debug)]
pub struct DeviceContext<S, R> {
    merger: IngestionMerger,
    live: LiveState,
    sequencer: DisplaySequencer,
    catalog: CannedCatalog,
    surface: S,
    rng: R,
}

impl<S: Surface, R: Rng> DeviceContext<S, R> {
    /// Picks a random canned entry and draws it in full.
    pub fn new(surface: S, rng: R, timing: SequencerTiming, now: Instant) -> Self {
        Self::with_catalog(surface, rng, timing, CannedCatalog::builtin(), now)
    }

    pub fn with_catalog(
        mut surface: S,
        mut rng: R,
        timing: SequencerTiming,
        catalog: CannedCatalog,
        now: Instant,
    ) -> Self {
        let catalog = catalog.with_random_start(&mut rng);
        let palette = Palette::random(&mut rng);
        let lines = render::layout_lines(catalog.current(), surface.columns());
        render::draw_wrapped_gradient(&mut surface, &lines, &palette, None);

        Self {
            merger: IngestionMerger::new(),
            live: LiveState::default(),
            sequencer: DisplaySequencer::new(timing, palette, now),
            catalog,
            surface,
            rng,
        }
    }

    /// Hands inbound bytes to the channel's accumulator.
    pub fn push(&mut self, channel: InboundChannel, bytes: &[u8]) {
        self.merger.push(channel, bytes);
    }

    /// One loop iteration: publish at most one completed message, honour the
    /// new-text signal, then tick the sequencer.
    ///
    /// Returns the state entered, if any.
    pub fn step(&mut self, now: Instant) -> Option<SequencerState> {
        if let Some(message) = self.merger.poll() {
            self.live.publish(message);
        }
        let mut entered = None;
        if self.live.take_signal() {
            self.sequencer.interrupt(now);
            entered = Some(SequencerState::Dissolving);
        }

        let text = if self.live.has_live() {
            self.live.text()
        } else {
            self.catalog.current()
        };
        let ticked = self
            .sequencer
            .tick(now, &mut self.surface, &mut self.rng, text);
        if ticked.is_some() {
            entered = ticked;
        }

        if entered == Some(SequencerState::Idle) {
            self.catalog.pick_next(&mut self.rng);
            self.live.release();
        }
        entered
    }

    pub fn state(&self) -> SequencerState {
        self.sequencer.state()
    }

    pub fn live(&self) -> &LiveState {
        &self.live
    }

    pub fn catalog(&self) -> &CannedCatalog {
        &self.catalog
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }
}

/// Runs the panel loop until `cancel` fires or every sender is dropped.
///
/// `on_transition` sees each state entered together with the surface as it
/// stands after that step.
pub async fn run<S, R, F>(
    mut ctx: DeviceContext<S, R>,
    mut inbound: mpsc::Receiver<InboundChunk>,
    tick: Duration,
    cancel: CancellationToken,
    mut on_transition: F,
) -> DeviceContext<S, R>
where
    S: Surface,
    R: Rng,
    F: FnMut(SequencerState, &S),
{
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::info!("panel loop cancelled");
                break;
            }
            // Ticks before input so a busy sender cannot stall the sequencer.
            _ = interval.tick() => {
                if let Some(state) = ctx.step(Instant::now()) {
                    on_transition(state, &ctx.surface);
                }
            }
            chunk = inbound.recv() => {
                match chunk {
                    Some(chunk) => ctx.push(chunk.channel, &chunk.bytes),
                    None => {
                        tracing::info!("all inbound channels closed");
                        break;
                    }
                }
            }
        }
    }
    ctx
}
