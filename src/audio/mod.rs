// Audio layer
// WAV ingestion, live capture, pitch and onset detection

pub mod capture;
pub mod features;
pub mod ingest;
pub mod pitch;

pub use capture::{AudioCapture, CaptureError, DEFAULT_FRAME_SIZE};
pub use features::{apply_hann_window, rms, Onset, OnsetConfig, OnsetDetector};
pub use ingest::{encode_wav, ingest_wav, AudioData, AudioError};
pub use pitch::{PitchAlgorithm, PitchDetector, PitchEstimate};
