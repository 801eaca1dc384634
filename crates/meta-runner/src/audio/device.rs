//! cpal output device with a sample-counting clock.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};
use ringbuf::{
    HeapRb,
    traits::{Consumer, Observer, Producer, Split},
};

use super::AudioSink;

/// Silence queued ahead of the first unit so the callback does not underrun
/// while the first frames are being emulated, in seconds.
const LEAD_IN: f64 = 0.066;

/// Where one unit lands in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Placement {
    /// Silence pushed ahead of the unit.
    gap: usize,
    /// Frames pushed in total, silence included.
    pushed: usize,
    /// Frames that did not fit.
    dropped: usize,
    /// Device frame at which the next pushed sample will play.
    cursor: u64,
}

/// Place `len` samples meant to start at `start_frame`, given the queue's
/// write cursor, the frames already played and the free space in the ring.
///
/// A start past the queued end is reached with silence. A drained ring
/// plays whatever is pushed next immediately. Anything beyond `free` is
/// dropped.
fn place(write_cursor: u64, played: u64, start_frame: u64, len: usize, free: usize) -> Placement {
    let cursor = write_cursor.max(played);
    let gap = usize::try_from(start_frame.saturating_sub(cursor)).unwrap_or(usize::MAX);
    let wanted = gap.saturating_add(len);
    let pushed = wanted.min(free);
    Placement {
        gap,
        pushed,
        dropped: wanted - pushed,
        cursor: cursor + pushed as u64,
    }
}

/// Output stream fed through a lock-free ring buffer.
///
/// The device clock is the number of frames the callback has written,
/// including silence written during underruns, so it advances in real time
/// whether or not the host keeps up.
pub struct CpalSink {
    _stream: Stream,
    producer: ringbuf::HeapProd<f32>,
    sample_rate: u32,
    played: Arc<AtomicU64>,
    /// Device frame at which the next pushed sample will play.
    write_cursor: u64,
}

impl CpalSink {
    /// Open the default output device, mono, at exactly `sample_rate`.
    ///
    /// Returns `None` if there is no device or it refuses the rate.
    #[must_use]
    pub fn open(sample_rate: u32) -> Option<Self> {
        let host = cpal::default_host();
        let device = host.default_output_device()?;

        let config = StreamConfig {
            channels: 1,
            sample_rate: SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        // One second of headroom against tick jitter
        let ring = HeapRb::<f32>::new(sample_rate as usize);
        let (mut producer, mut consumer) = ring.split();

        let lead_in = (LEAD_IN * f64::from(sample_rate)) as u64;
        for _ in 0..lead_in {
            let _ = producer.try_push(0.0);
        }

        let played = Arc::new(AtomicU64::new(0));
        let clock = Arc::clone(&played);

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    for sample in data.iter_mut() {
                        // Underrun plays silence; the clock keeps running
                        *sample = consumer.try_pop().unwrap_or(0.0);
                    }
                    clock.fetch_add(data.len() as u64, Ordering::Relaxed);
                },
                |err| log::error!("Audio stream error: {err}"),
                None,
            )
            .map_err(|e| log::debug!("Cannot open audio stream at {sample_rate} Hz: {e}"))
            .ok()?;

        stream
            .play()
            .map_err(|e| log::debug!("Cannot start audio stream: {e}"))
            .ok()?;

        Some(Self {
            _stream: stream,
            producer,
            sample_rate,
            played,
            write_cursor: lead_in,
        })
    }
}

impl AudioSink for CpalSink {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn current_time(&self) -> f64 {
        self.played.load(Ordering::Relaxed) as f64 / f64::from(self.sample_rate)
    }

    fn schedule(&mut self, samples: &[f32], start: f64) {
        let start_frame = (start * f64::from(self.sample_rate)).round() as u64;
        let placement = place(
            self.write_cursor,
            self.played.load(Ordering::Relaxed),
            start_frame,
            samples.len(),
            self.producer.vacant_len(),
        );

        let silence = std::iter::repeat_n(0.0, placement.gap);
        let unit = silence.chain(samples.iter().copied()).take(placement.pushed);
        self.producer.push_iter(unit);
        if placement.dropped > 0 {
            log::warn!("Audio queue full, dropped {} samples", placement.dropped);
        }

        self.write_cursor = placement.cursor;
    }
}
