//! Live audio capture using cpal
//! Streams fixed-size mono frames from the default input device into the
//! analysis pipeline.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Sample, SampleFormat};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use thiserror::Error;

use crate::events::AudioFrame;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no input device available")]
    NoInputDevice,

    #[error("failed to get default input config: {0}")]
    Config(String),

    #[error("failed to build input stream: {0}")]
    Stream(String),

    #[error("capture already in progress")]
    AlreadyRunning,
}

/// Number of samples per frame delivered to the extractor. Matches the
/// dispatcher block size the detectors are tuned for.
pub const DEFAULT_FRAME_SIZE: usize = 1024;

/// Thread-safe capture handle. The cpal stream lives on a dedicated thread
/// because it is not `Send`; this handle only carries shared state.
pub struct AudioCapture {
    frame_size: usize,
    pending: Arc<Mutex<Vec<f32>>>,
    level: Arc<Mutex<f32>>,
    is_running: Arc<AtomicBool>,
    stop_signal: Arc<AtomicBool>,
}

impl AudioCapture {
    pub fn new(frame_size: usize) -> Self {
        AudioCapture {
            frame_size: frame_size.max(64),
            pending: Arc::new(Mutex::new(Vec::new())),
            level: Arc::new(Mutex::new(0.0)),
            is_running: Arc::new(AtomicBool::new(false)),
            stop_signal: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start capturing from the default input device, delivering frames to
    /// `frames_out` until [`stop`](Self::stop) is called or the receiver
    /// disconnects. Frames are dropped (with a warning) if the receiver
    /// falls behind.
    pub fn start(&self, frames_out: SyncSender<AudioFrame>) -> Result<(), CaptureError> {
        if self.is_running.swap(true, Ordering::SeqCst) {
            return Err(CaptureError::AlreadyRunning);
        }
        self.stop_signal.store(false, Ordering::SeqCst);
        self.pending.lock().unwrap().clear();

        let frame_size = self.frame_size;
        let pending = Arc::clone(&self.pending);
        let level = Arc::clone(&self.level);
        let is_running = Arc::clone(&self.is_running);
        let stop_signal = Arc::clone(&self.stop_signal);

        thread::Builder::new()
            .name("audio-capture".to_string())
            .spawn(move || {
                if let Err(e) = run_capture(
                    frame_size,
                    frames_out,
                    pending,
                    level,
                    Arc::clone(&stop_signal),
                ) {
                    log::error!("capture error: {e}");
                }
                is_running.store(false, Ordering::SeqCst);
            })
            .map_err(|e| CaptureError::Stream(e.to_string()))?;

        Ok(())
    }

    /// Signal the capture thread to stop. Returns once the thread has
    /// acknowledged (bounded wait).
    pub fn stop(&self) {
        self.stop_signal.store(true, Ordering::SeqCst);
        for _ in 0..50 {
            if !self.is_running.load(Ordering::SeqCst) {
                break;
            }
            thread::sleep(Duration::from_millis(20));
        }
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// Most recent frame RMS in [0.0, 1.0], for level meters.
    pub fn level(&self) -> f32 {
        *self.level.lock().unwrap()
    }
}

impl Default for AudioCapture {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_SIZE)
    }
}

/// Capture thread body: owns the cpal stream, drains the pending buffer
/// into frames every few milliseconds.
fn run_capture(
    frame_size: usize,
    frames_out: SyncSender<AudioFrame>,
    pending: Arc<Mutex<Vec<f32>>>,
    level: Arc<Mutex<f32>>,
    stop_signal: Arc<AtomicBool>,
) -> Result<(), CaptureError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or(CaptureError::NoInputDevice)?;
    let config = device
        .default_input_config()
        .map_err(|e| CaptureError::Config(e.to_string()))?;

    let sample_rate = config.sample_rate().0;
    let channels = config.channels() as usize;
    log::info!(
        "capturing from {} at {} Hz, {} channel(s)",
        device.name().unwrap_or_else(|_| "unknown".to_string()),
        sample_rate,
        channels
    );

    let err_fn = |err| log::error!("input stream error: {err}");

    let stream = match config.sample_format() {
        SampleFormat::F32 => {
            let pending = Arc::clone(&pending);
            device.build_input_stream(
                &config.into(),
                move |data: &[f32], _: &_| push_mono(&pending, data, channels),
                err_fn,
                None,
            )
        }
        SampleFormat::I16 => {
            let pending = Arc::clone(&pending);
            device.build_input_stream(
                &config.into(),
                move |data: &[i16], _: &_| {
                    let floats: Vec<f32> = data.iter().map(|&s| s.to_float_sample()).collect();
                    push_mono(&pending, &floats, channels);
                },
                err_fn,
                None,
            )
        }
        SampleFormat::U16 => {
            let pending = Arc::clone(&pending);
            device.build_input_stream(
                &config.into(),
                move |data: &[u16], _: &_| {
                    let floats: Vec<f32> = data.iter().map(|&s| s.to_float_sample()).collect();
                    push_mono(&pending, &floats, channels);
                },
                err_fn,
                None,
            )
        }
        other => {
            return Err(CaptureError::Config(format!(
                "unsupported sample format {other:?}"
            )))
        }
    }
    .map_err(|e| CaptureError::Stream(e.to_string()))?;

    stream
        .play()
        .map_err(|e| CaptureError::Stream(e.to_string()))?;

    let mut frames_sent: u64 = 0;
    while !stop_signal.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(10));
        if !drain_frames(
            frame_size,
            sample_rate,
            &frames_out,
            &pending,
            &level,
            &mut frames_sent,
        ) {
            // Receiver gone; nothing left to capture for.
            break;
        }
    }

    // Stream drops here, stopping the device callback.
    Ok(())
}

/// Mix interleaved input down to mono and append to the pending buffer.
fn push_mono(pending: &Mutex<Vec<f32>>, data: &[f32], channels: usize) {
    let mut pending = pending.lock().unwrap();
    if channels <= 1 {
        pending.extend_from_slice(data);
    } else {
        pending.extend(
            data.chunks(channels)
                .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32),
        );
    }
}

/// Slice full frames out of the pending buffer and send them on. Returns
/// false when the receiver has disconnected.
fn drain_frames(
    frame_size: usize,
    sample_rate: u32,
    frames_out: &SyncSender<AudioFrame>,
    pending: &Mutex<Vec<f32>>,
    level: &Mutex<f32>,
    frames_sent: &mut u64,
) -> bool {
    loop {
        let samples: Vec<f32> = {
            let mut pending = pending.lock().unwrap();
            if pending.len() < frame_size {
                return true;
            }
            pending.drain(..frame_size).collect()
        };

        *level.lock().unwrap() = crate::audio::features::rms(&samples);

        let timestamp_ms = *frames_sent as f64 * frame_size as f64 * 1000.0 / sample_rate as f64;
        let frame = AudioFrame::new(timestamp_ms, sample_rate, samples);
        *frames_sent += 1;

        match frames_out.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                log::warn!("analysis pipeline behind; dropping a captured frame");
            }
            Err(TrySendError::Disconnected(_)) => return false,
        }
    }
}
