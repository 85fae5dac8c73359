//! # Decoder Session Example
//!
//! Streams a synthetic sine wave through a [`BufferedInputStream`], decodes
//! it with the built-in PCM plugin and consumes the chunks on the main
//! thread. A live stream is not seekable, so the seek request is rejected.
//!
//! Run with: `cargo run --example decode_demo --package core-decoder`

use anyhow::{Context, Result};
use core_decoder::{
    BufferedInputStream, DecoderConfig, DecoderController, PluginRegistry, SeekTarget,
    SessionOptions,
};
use core_runtime::events::{EventBus, EventStream};
use core_runtime::logging::{init_logging, LogLevel, LoggingConfig};
use std::thread;
use std::time::Duration;

const SAMPLE_RATE: u32 = 44100;
const SECONDS: u32 = 4;

/// Interleaved stereo S16LE sine wave.
fn sine_wave(frequency: f64) -> Vec<u8> {
    let frames = SAMPLE_RATE * SECONDS;
    let mut bytes = Vec::with_capacity(frames as usize * 4);
    for i in 0..frames {
        let t = i as f64 / SAMPLE_RATE as f64;
        let sample = ((2.0 * std::f64::consts::PI * frequency * t).sin() * 0.3 * i16::MAX as f64) as i16;
        for _ in 0..2 {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
    }
    bytes
}

fn main() -> Result<()> {
    init_logging(LoggingConfig::default().with_level(LogLevel::Debug))
        .context("failed to initialize logging")?;

    let uri = "http://localhost/stream.raw";
    let registry = PluginRegistry::with_builtin();
    let plugin = registry
        .find_for_uri(uri)
        .context("no plugin for stream")?;

    // a producer thread plays the part of the network
    let (input, feeder) = BufferedInputStream::new(uri);
    let producer = thread::spawn(move || {
        for block in sine_wave(440.0).chunks(16 * 1024) {
            feeder.push(block);
            thread::sleep(Duration::from_millis(5));
        }
        feeder.finish();
    });

    let bus = EventBus::new(64);
    let mut events = EventStream::new(bus.subscribe());

    let config = DecoderConfig::low_latency();
    let mut controller = DecoderController::new(config)?.with_event_bus(bus);
    controller.start(plugin, Box::new(input), SessionOptions::new())?;

    let ready = controller.wait_ready(Some(Duration::from_secs(5)))?;
    println!("Decoding {} (seekable: {})", ready.format, ready.seekable);

    match controller.seek(SeekTarget::Time(Duration::from_secs(2))) {
        Ok(()) => println!("Seeked to 2s"),
        Err(e) => println!("Seek rejected: {e}"),
    }

    let mut chunks = 0usize;
    let mut bytes = 0usize;
    while let Some(chunk) = controller.wait_chunk(Some(Duration::from_secs(5))) {
        chunks += 1;
        bytes += chunk.data.len();
        if chunks % 64 == 0 {
            println!("  {:>6.2}s  {} chunks", chunk.time.as_secs_f64(), chunks);
        }
    }

    let outcome = controller.join()?;
    println!("Session ended: {outcome:?} ({chunks} chunks, {bytes} bytes)");

    while let Some(Ok(event)) = events.try_recv() {
        println!("  event: {}", event.description());
    }

    producer
        .join()
        .map_err(|_| anyhow::anyhow!("producer thread panicked"))?;
    Ok(())
}
