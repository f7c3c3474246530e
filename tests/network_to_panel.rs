//! Host-to-panel delivery over HTTP.
//!
//! A network transport posts a formatted payload to a running panel
//! endpoint; the panel loop pre-empts its idle dwell, runs the sequence
//! with short timings and ends up showing the delivered lines.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use marquee::Transport;
use marquee::device::http::InboundServer;
use marquee::device::{self, DeviceContext, FrameBuffer, InboundChunk, SequencerState, SequencerTiming};
use marquee::format_response;
use marquee::transport::NetworkTransport;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn quick_timing() -> SequencerTiming {
    SequencerTiming {
        idle: Duration::from_secs(600),
        dissolve: Duration::from_millis(40),
        pause: Duration::from_millis(10),
        thinking: Duration::from_millis(30),
        reveal_char: Duration::from_millis(1),
        done: Duration::from_millis(20),
        cursor_blink: Duration::from_millis(10),
        block_size: 8,
    }
}

#[tokio::test]
async fn posted_payload_is_revealed_on_panel() {
    let (tx, rx) = mpsc::channel::<InboundChunk>(16);
    let server = InboundServer::start("127.0.0.1:0", tx).await.unwrap();

    let ctx = DeviceContext::new(
        FrameBuffer::new(128, 64),
        StdRng::seed_from_u64(42),
        quick_timing(),
        Instant::now(),
    );

    let cancel = CancellationToken::new();
    let transitions = Arc::new(Mutex::new(Vec::new()));
    let shown = Arc::new(Mutex::new(Vec::new()));

    let panel = tokio::spawn({
        let cancel = cancel.clone();
        let transitions = Arc::clone(&transitions);
        let shown = Arc::clone(&shown);
        async move {
            device::run(ctx, rx, Duration::from_millis(1), cancel.clone(), |state, fb: &FrameBuffer| {
                transitions.lock().unwrap().push(state);
                if state == SequencerState::Done {
                    *shown.lock().unwrap() = fb.text_rows();
                    cancel.cancel();
                }
            })
            .await
        }
    });

    let transport = NetworkTransport::new(server.url(), 5);
    let payload = format_response("Moths circle the porch light. Again.", 28, 6, 19);
    let receipt = transport.deliver(&payload).await.unwrap();
    assert_eq!(receipt.bytes, "Moths circle the porch light.\n".len());

    let ctx = tokio::time::timeout(Duration::from_secs(10), panel)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(
        transitions.lock().unwrap().as_slice(),
        [
            SequencerState::Dissolving,
            SequencerState::PostDissolvePause,
            SequencerState::Thinking,
            SequencerState::Typewriter,
            SequencerState::Done,
        ]
    );
    assert_eq!(
        shown.lock().unwrap().as_slice(),
        ["Moths circle the porch", "light."]
    );
    assert!(ctx.live().has_live());
    assert_eq!(ctx.live().text(), "Moths circle the porch light.");
}
