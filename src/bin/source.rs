//! LHDC Source Application
//!
//! Negotiates against a configured peer capability, then streams a test
//! tone through the LHDC session on the 20 ms tick, handing packets to a
//! logging sink.

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lhdc_source::{
    audio::{create_shared_buffer, FeedingParams, PcmReader, ToneSource},
    codec::{cie, FixedRateEngine, LhdcCodec},
    config::SourceConfig,
    transport::{HeapBufferPool, TransportBuffer},
    SourceSession, StreamIo,
};

/// PCM chunks buffered between the tone thread and the tick
const PCM_RING_CAPACITY: usize = 32;

/// Log statistics every this many ticks
const STATS_INTERVAL_TICKS: u64 = 250;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting LHDC source");

    let config = match std::env::args().nth(1) {
        Some(path) => SourceConfig::load(&path).with_context(|| format!("loading {path}"))?,
        None => match SourceConfig::default_path().filter(|p| p.exists()) {
            Some(path) => SourceConfig::load(&path).with_context(|| format!("loading {}", path.display()))?,
            None => SourceConfig::default(),
        },
    };

    let codec = Arc::new(LhdcCodec::new().with_content_protection(config.content_protection));
    let (local, protection) = codec.init_codec_config()?;
    tracing::info!("Advertising {} capability {:02X?}", codec.name(), local);
    if let Some(cp) = protection {
        tracing::info!("Content protection SCMS-T {:02X?}", cp);
    }

    // Negotiate against the configured peer
    let peer_info = config.peer.to_codec_info()?;
    cie::dump_codec_info(&peer_info);
    let (resolved, ota) = codec.set_user_config(config.user_config()?, config.audio_config()?, &peer_info, true)?;
    let (Some(rate), Some(depth), Some(mode)) = (resolved.sample_rate(), resolved.bit_depth(), resolved.channel_mode())
    else {
        anyhow::bail!("negotiation produced an incomplete configuration");
    };
    tracing::info!(
        "Negotiated {}Hz / {} bit / {:?}, element {:02X?}",
        rate.hz(),
        depth.bits(),
        mode,
        ota
    );

    // Tone producer
    let params = FeedingParams::new(rate.hz(), depth.bits(), mode.channel_count());
    let ring = create_shared_buffer(PCM_RING_CAPACITY);
    let running = Arc::new(AtomicBool::new(true));
    let producer = {
        let ring = ring.clone();
        let running = running.clone();
        let mut tone = ToneSource::new(params, config.tone_hz);
        let chunk_frames = (params.sample_rate / 100) as usize;
        thread::spawn(move || {
            while running.load(Ordering::Relaxed) {
                while !ring.is_full() {
                    ring.push(tone.next_chunk(chunk_frames));
                }
                thread::sleep(Duration::from_millis(5));
            }
        })
    };

    // Logging sink
    let packets = Arc::new(AtomicU64::new(0));
    let bytes_sent = Arc::new(AtomicU64::new(0));
    let sink = {
        let packets = packets.clone();
        let bytes_sent = bytes_sent.clone();
        move |buf: TransportBuffer, frames: u8| {
            packets.fetch_add(1, Ordering::Relaxed);
            bytes_sent.fetch_add(buf.len() as u64, Ordering::Relaxed);
            tracing::trace!(
                "packet metadata {:04X} ts {} frames {} len {}",
                buf.metadata,
                buf.timestamp,
                frames,
                buf.len()
            );
            true
        }
    };

    let mut session = SourceSession::new(Box::new(FixedRateEngine::new()), codec);
    session.init(
        config.peer_params(),
        StreamIo {
            source: Box::new(PcmReader::new(ring.clone())),
            sink: Box::new(sink),
            pool: Box::new(HeapBufferPool::new()),
        },
    )?;
    session.set_transmit_queue_length(config.tx_queue_length);

    let deadline = (config.run_seconds > 0).then(|| Duration::from_secs(config.run_seconds));
    let mut ticker = tokio::time::interval(Duration::from_millis(session.encoder_interval_ms()));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    tracing::info!("Starting main loop - press Ctrl+C to stop");
    let start = Instant::now();
    let mut ticks: u64 = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                session.send_frames(start.elapsed().as_micros() as u64);
                ticks += 1;

                // Periodic stats logging
                if ticks % STATS_INTERVAL_TICKS == 0 {
                    let stats = session.stats();
                    tracing::info!(
                        "Stats: {} packets sent, {:.1} KB sent, {} dropped, {} underflows",
                        packets.load(Ordering::Relaxed),
                        bytes_sent.load(Ordering::Relaxed) as f64 / 1024.0,
                        stats.dropped_packets,
                        stats.underflows
                    );
                }

                if deadline.is_some_and(|d| start.elapsed() >= d) {
                    break;
                }
            }
            _ = &mut ctrl_c => {
                tracing::info!("Interrupted");
                break;
            }
        }
    }

    running.store(false, Ordering::Relaxed);
    if producer.join().is_err() {
        tracing::warn!("tone producer panicked");
    }

    let report = session.report();
    println!("{report}");
    println!("{}", serde_json::to_string_pretty(&report)?);
    tracing::info!(
        "PCM ring: {} overflows, {} underruns",
        ring.overflow_count(),
        ring.underrun_count()
    );

    session.cleanup();
    Ok(())
}
