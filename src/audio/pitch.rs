// Pitch detection
// Two time-domain estimators over a single frame of mono samples:
// YIN (difference function + cumulative mean normalized difference) and
// MPM (McLeod's normalized square difference with key-maxima picking).
// MPM is the default.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Selectable pitch estimation algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PitchAlgorithm {
    Yin,
    Mpm,
}

impl Default for PitchAlgorithm {
    fn default() -> Self {
        PitchAlgorithm::Mpm
    }
}

impl PitchAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            PitchAlgorithm::Yin => "yin",
            PitchAlgorithm::Mpm => "mpm",
        }
    }
}

impl fmt::Display for PitchAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PitchAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "yin" => Ok(PitchAlgorithm::Yin),
            "mpm" => Ok(PitchAlgorithm::Mpm),
            other => Err(format!("unknown pitch algorithm: {other}")),
        }
    }
}

/// A single-frame pitch estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchEstimate {
    pub frequency_hz: f32,

    /// Periodicity clarity in [0.0, 1.0]. Noise scores low, a clean tone
    /// scores near 1; callers filter on this as a probability.
    pub clarity: f32,
}

/// YIN absolute threshold for the first acceptable dip.
const YIN_THRESHOLD: f32 = 0.15;

/// MPM: accept the first key maximum within this fraction of the highest.
const MPM_CUTOFF: f32 = 0.93;

#[derive(Debug, Clone)]
pub struct PitchDetector {
    algorithm: PitchAlgorithm,
    min_frequency: f32,
    max_frequency: f32,
}

impl PitchDetector {
    pub fn new(algorithm: PitchAlgorithm) -> Self {
        Self::with_range(algorithm, 55.0, 2000.0)
    }

    pub fn with_range(algorithm: PitchAlgorithm, min_frequency: f32, max_frequency: f32) -> Self {
        PitchDetector {
            algorithm,
            min_frequency,
            max_frequency,
        }
    }

    pub fn algorithm(&self) -> PitchAlgorithm {
        self.algorithm
    }

    /// Estimate the fundamental of one mono frame. Returns `None` when the
    /// frame has no detectable periodicity in the configured range.
    pub fn detect(&self, samples: &[f32], sample_rate: u32) -> Option<PitchEstimate> {
        if sample_rate == 0 || samples.len() < 4 {
            return None;
        }
        let sr = sample_rate as f32;
        let min_lag = (sr / self.max_frequency).ceil() as usize;
        let max_lag = ((sr / self.min_frequency).floor() as usize).min(samples.len() / 2);
        if min_lag == 0 || max_lag <= min_lag {
            return None;
        }

        let estimate = match self.algorithm {
            PitchAlgorithm::Yin => yin(samples, sr, min_lag, max_lag),
            PitchAlgorithm::Mpm => mpm(samples, sr, min_lag, max_lag),
        }?;

        if estimate.frequency_hz < self.min_frequency || estimate.frequency_hz > self.max_frequency
        {
            return None;
        }
        Some(estimate)
    }
}

impl Default for PitchDetector {
    fn default() -> Self {
        Self::new(PitchAlgorithm::default())
    }
}

fn yin(samples: &[f32], sample_rate: f32, min_lag: usize, max_lag: usize) -> Option<PitchEstimate> {
    let window = max_lag.min(samples.len() / 2);

    // Difference function
    let mut diff = vec![0.0f32; window + 1];
    for tau in 1..=window {
        let mut sum = 0.0;
        for j in 0..window {
            let d = samples[j] - samples[j + tau];
            sum += d * d;
        }
        diff[tau] = sum;
    }

    // Cumulative mean normalized difference
    let mut cmnd = vec![1.0f32; window + 1];
    let mut running_sum = 0.0;
    for tau in 1..=window {
        running_sum += diff[tau];
        if running_sum > 0.0 {
            cmnd[tau] = diff[tau] * tau as f32 / running_sum;
        }
    }

    // First dip below the absolute threshold, extended to its local minimum
    let upper = window.min(max_lag);
    let mut best_tau = 0usize;
    let mut best_val = 1.0f32;
    for tau in min_lag..=upper {
        if cmnd[tau] < YIN_THRESHOLD {
            let mut t = tau;
            while t + 1 <= upper && cmnd[t + 1] < cmnd[t] {
                t += 1;
            }
            best_tau = t;
            best_val = cmnd[t];
            break;
        }
    }

    // Fallback: global minimum of the normalized difference
    if best_tau == 0 {
        for tau in min_lag..=upper {
            if cmnd[tau] < best_val {
                best_val = cmnd[tau];
                best_tau = tau;
            }
        }
    }
    if best_tau == 0 {
        return None;
    }

    let tau_refined = parabolic_interpolation(&cmnd, best_tau);
    Some(PitchEstimate {
        frequency_hz: sample_rate / tau_refined,
        clarity: (1.0 - best_val).clamp(0.0, 1.0),
    })
}

fn mpm(samples: &[f32], sample_rate: f32, min_lag: usize, max_lag: usize) -> Option<PitchEstimate> {
    let n = samples.len();
    let max_tau = max_lag.min(n / 2);

    // Normalized square difference function:
    // nsdf[tau] = 2 * sum(x[j] x[j+tau]) / sum(x[j]^2 + x[j+tau]^2)
    let mut nsdf = vec![0.0f32; max_tau + 1];
    for tau in 1..=max_tau {
        let mut acf = 0.0f32;
        let mut norm = 0.0f32;
        for j in 0..n - tau {
            let a = samples[j];
            let b = samples[j + tau];
            acf += a * b;
            norm += a * a + b * b;
        }
        if norm > 0.0 {
            nsdf[tau] = 2.0 * acf / norm;
        }
    }

    // Key maxima: the highest point between each positive-going zero
    // crossing and the next crossing (or the end of the lag range).
    let mut maxima: Vec<(usize, f32)> = Vec::new();
    let mut in_positive = false;
    let mut peak_tau = 0usize;
    let mut peak_val = f32::MIN;
    for tau in min_lag..=max_tau {
        if nsdf[tau] > 0.0 && nsdf[tau - 1] <= 0.0 {
            in_positive = true;
            peak_tau = tau;
            peak_val = nsdf[tau];
        } else if in_positive && nsdf[tau] <= 0.0 {
            maxima.push((peak_tau, peak_val));
            in_positive = false;
        } else if in_positive && nsdf[tau] > peak_val {
            peak_tau = tau;
            peak_val = nsdf[tau];
        }
    }
    if in_positive {
        maxima.push((peak_tau, peak_val));
    }
    if maxima.is_empty() {
        return None;
    }

    let highest = maxima
        .iter()
        .map(|&(_, v)| v)
        .fold(f32::MIN, f32::max);
    if highest <= 0.0 {
        return None;
    }

    let &(chosen_tau, chosen_val) = maxima
        .iter()
        .find(|&&(_, v)| v >= MPM_CUTOFF * highest)
        .unwrap_or(&maxima[0]);

    let tau_refined = parabolic_interpolation(&nsdf, chosen_tau);
    Some(PitchEstimate {
        frequency_hz: sample_rate / tau_refined,
        clarity: chosen_val.clamp(0.0, 1.0),
    })
}

/// Refine a lag to sub-sample precision from its neighbors.
fn parabolic_interpolation(values: &[f32], tau: usize) -> f32 {
    if tau == 0 || tau + 1 >= values.len() {
        return tau as f32;
    }
    let alpha = values[tau - 1];
    let beta = values[tau];
    let gamma = values[tau + 1];
    let denom = alpha - 2.0 * beta + gamma;
    if denom.abs() < 1e-12 {
        return tau as f32;
    }
    tau as f32 + 0.5 * (alpha - gamma) / denom
}
