// LevelMonitor - normalized microphone level sampling
//
// Raw amplitude readings are normalized against the loudest reading seen so
// far in the process lifetime. The reference maximum starts at 0.1 and only
// grows; readings at or above full scale (1.0) never move it, so a single
// clipped spike cannot flatten every later reading.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};

/// Initial reference maximum for normalization
pub const INITIAL_MAX_AMPLITUDE: f32 = 0.1;

/// Default rolling window length (about 3 s at 10 samples/s)
pub const DEFAULT_LEVEL_WINDOW: usize = 30;

/// One normalized amplitude reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioLevelSample {
    /// Normalized amplitude in [0, 1]
    pub level: f32,
    /// Monotonic sequence number across the process lifetime
    pub sequence: u64,
}

/// Root-mean-square of a set of normalized levels; 0.0 when empty.
pub fn compute_rms<I>(levels: I) -> f32
where
    I: IntoIterator<Item = f32>,
{
    let mut sum = 0.0_f64;
    let mut count = 0_usize;
    for level in levels {
        sum += f64::from(level) * f64::from(level);
        count += 1;
    }
    if count == 0 {
        return 0.0;
    }
    (sum / count as f64).sqrt() as f32
}

/// Bounded window of the most recent samples, oldest evicted first.
#[derive(Debug, Clone)]
pub struct LevelWindow {
    samples: VecDeque<AudioLevelSample>,
    capacity: usize,
}

impl LevelWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, sample: AudioLevelSample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn rms(&self) -> f32 {
        compute_rms(self.samples.iter().map(|s| s.level))
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn latest(&self) -> Option<AudioLevelSample> {
        self.samples.back().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AudioLevelSample> {
        self.samples.iter()
    }
}

impl Default for LevelWindow {
    fn default() -> Self {
        Self::new(DEFAULT_LEVEL_WINDOW)
    }
}

/// Normalizes raw readings, publishes them, and tracks whether the latest
/// reading is below the microphone threshold.
///
/// The below-threshold flag is advisory; the authoritative silence decision
/// is the session RMS check at finalize.
pub struct LevelMonitor {
    max_amplitude: f32,
    next_sequence: u64,
    level_tx: broadcast::Sender<AudioLevelSample>,
    below_threshold_tx: watch::Sender<bool>,
}

impl LevelMonitor {
    pub fn new(
        level_tx: broadcast::Sender<AudioLevelSample>,
        below_threshold_tx: watch::Sender<bool>,
    ) -> Self {
        Self {
            max_amplitude: INITIAL_MAX_AMPLITUDE,
            next_sequence: 0,
            level_tx,
            below_threshold_tx,
        }
    }

    /// Current normalization reference.
    pub fn max_amplitude(&self) -> f32 {
        self.max_amplitude
    }

    /// Normalize a raw reading without publishing it.
    pub fn normalize(&mut self, raw: f32) -> f32 {
        let raw = if raw.is_finite() { raw.abs() } else { 0.0 };
        if raw > self.max_amplitude && raw < 1.0 {
            self.max_amplitude = raw;
        }
        (raw / self.max_amplitude).clamp(0.0, 1.0)
    }

    /// Normalize, publish, and refresh the below-threshold flag.
    pub fn observe(&mut self, raw: f32, microphone_threshold: f32) -> AudioLevelSample {
        let level = self.normalize(raw);
        let sample = AudioLevelSample {
            level,
            sequence: self.next_sequence,
        };
        self.next_sequence += 1;

        let below = level < microphone_threshold;
        self.below_threshold_tx.send_if_modified(|current| {
            if *current != below {
                *current = below;
                true
            } else {
                false
            }
        });

        // Broadcast without backlog: nobody listening is fine.
        let _ = self.level_tx.send(sample);
        sample
    }
}
