//! Per-frame audio analysis snapshot handed to components on every render.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Silence floor for all dB-valued fields.
pub const DB_FLOOR: f32 = -100.0;

/// Level measurements for a single channel.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChannelLevels {
    /// RMS level in dBFS.
    #[serde(default = "db_floor")]
    pub rms: f32,
    /// Sample peak in dBFS.
    #[serde(default = "db_floor")]
    pub peak: f32,
    /// Oversampled true peak in dBTP.
    #[serde(default = "db_floor")]
    pub true_peak: f32,
    /// RMS as a 0.0-1.0 linear value.
    #[serde(default)]
    pub rms_linear: f32,
    /// Peak as a 0.0-1.0 linear value.
    #[serde(default)]
    pub peak_linear: f32,
}

fn db_floor() -> f32 {
    DB_FLOOR
}

impl Default for ChannelLevels {
    fn default() -> Self {
        Self {
            rms: DB_FLOOR,
            peak: DB_FLOOR,
            true_peak: DB_FLOOR,
            rms_linear: 0.0,
            peak_linear: 0.0,
        }
    }
}

/// Snapshot of the host's audio analysis for one render frame.
///
/// All fields have serde defaults so a partial JSON payload (or none at
/// all) deserializes to a silent frame rather than failing the render.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AudioFrame {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: f32,
    #[serde(default = "default_channels")]
    pub num_channels: u32,
    #[serde(default)]
    pub is_playing: bool,
    /// Playback position in seconds.
    #[serde(default)]
    pub position: f64,
    /// Total duration in seconds; 0.0 when unknown (live input).
    #[serde(default)]
    pub duration: f64,
    /// Per-channel levels, index 0 = left.
    #[serde(default)]
    pub channels: Vec<ChannelLevels>,
    /// Magnitude spectrum in dB, `fft_size / 2 + 1` bins.
    #[serde(default)]
    pub spectrum: Vec<f32>,
    /// Magnitude spectrum as 0.0-1.0 linear values, same length.
    #[serde(default)]
    pub spectrum_linear: Vec<f32>,
    /// Mono waveform ring, most recent sample last.
    #[serde(default)]
    pub waveform: Vec<f32>,
    #[serde(default = "default_fft_size")]
    pub fft_size: u32,
    /// Stereo correlation, -1.0 to +1.0.
    #[serde(default)]
    pub correlation: f32,
    /// Stereo balance angle in degrees, -45 to +45.
    #[serde(default)]
    pub stereo_angle: f32,
    #[serde(default = "db_floor")]
    pub lufs_momentary: f32,
    #[serde(default = "db_floor")]
    pub lufs_short_term: f32,
    #[serde(default = "db_floor")]
    pub lufs_integrated: f32,
    #[serde(default)]
    pub loudness_range: f32,
    /// Detected tempo in BPM; 0.0 when undetected.
    #[serde(default)]
    pub bpm: f32,
    /// Position within the current beat, 0.0-1.0.
    #[serde(default)]
    pub beat_phase: f32,
}

fn default_sample_rate() -> f32 {
    44100.0
}

fn default_channels() -> u32 {
    2
}

fn default_fft_size() -> u32 {
    2048
}

impl Default for AudioFrame {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            num_channels: default_channels(),
            is_playing: false,
            position: 0.0,
            duration: 0.0,
            channels: vec![ChannelLevels::default(); 2],
            spectrum: Vec::new(),
            spectrum_linear: Vec::new(),
            waveform: Vec::new(),
            fft_size: default_fft_size(),
            correlation: 0.0,
            stereo_angle: 0.0,
            lufs_momentary: DB_FLOOR,
            lufs_short_term: DB_FLOOR,
            lufs_integrated: DB_FLOOR,
            loudness_range: 0.0,
            bpm: 0.0,
            beat_phase: 0.0,
        }
    }
}

impl AudioFrame {
    /// Build from an untyped JSON payload, tolerating missing or malformed
    /// input by falling back to a silent stereo frame.
    pub fn from_json(value: &Value) -> Self {
        let mut frame: AudioFrame =
            serde_json::from_value(value.clone()).unwrap_or_default();
        if frame.channels.is_empty() {
            frame.channels = vec![ChannelLevels::default(); 2];
        }
        frame
    }

    pub fn left(&self) -> ChannelLevels {
        self.channels.first().copied().unwrap_or_default()
    }

    pub fn right(&self) -> ChannelLevels {
        self.channels
            .get(1)
            .or_else(|| self.channels.first())
            .copied()
            .unwrap_or_default()
    }

    /// Average RMS across channels, in dBFS.
    pub fn mono_rms(&self) -> f32 {
        if self.channels.is_empty() {
            return DB_FLOOR;
        }
        self.channels.iter().map(|c| c.rms).sum::<f32>() / self.channels.len() as f32
    }

    /// Loudest sample peak across channels, in dBFS.
    pub fn mono_peak(&self) -> f32 {
        self.channels
            .iter()
            .map(|c| c.peak)
            .fold(DB_FLOOR, f32::max)
    }

    /// Spectrum bin index closest to `freq` Hz.
    pub fn freq_to_bin(&self, freq: f32) -> usize {
        if self.sample_rate <= 0.0 {
            return 0;
        }
        let bin = (freq * self.fft_size as f32 / self.sample_rate).round() as usize;
        bin.min(self.spectrum_linear.len().saturating_sub(1))
    }

    /// Linear magnitude at `freq` Hz, or 0.0 with no spectrum data.
    pub fn magnitude_at(&self, freq: f32) -> f32 {
        self.spectrum_linear
            .get(self.freq_to_bin(freq))
            .copied()
            .unwrap_or(0.0)
    }

    /// Mean linear magnitude over the `lo..hi` Hz band.
    pub fn band_magnitude(&self, lo: f32, hi: f32) -> f32 {
        if self.spectrum_linear.is_empty() {
            return 0.0;
        }
        let a = self.freq_to_bin(lo);
        let b = self.freq_to_bin(hi).max(a);
        let slice = &self.spectrum_linear[a..=b.min(self.spectrum_linear.len() - 1)];
        slice.iter().sum::<f32>() / slice.len() as f32
    }
}
