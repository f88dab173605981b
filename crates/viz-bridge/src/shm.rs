//! Shared-memory audio transport.
//!
//! The host's audio engine publishes one analysis frame at a time into a
//! named shared-memory region; this reader maps it and decodes frames on
//! demand. The writer never locks, so a read may observe a frame
//! mid-update. That is acceptable for visualization: every field is
//! fixed-width and bounds-checked, so a torn read yields at worst one
//! slightly inconsistent frame.
//!
//! Region layout (little-endian, fixed offsets):
//!
//! ```text
//!   0  u32  magic          "AMXM"
//!   4  u32  version
//!   8  u32  frame counter  (monotonically increasing)
//!  12  u32  total size
//!  16  f32  sample rate        20  u32  channel count
//!  24  u32  fft size           28  u32  waveform length
//!  32  u32  flags (bit 0 = playing)
//!  36  f32  position           40  f32  duration
//!  44  f32  correlation        48  f32  stereo angle
//!  52  f32  lufs momentary     56  f32  lufs short-term
//!  60  f32  lufs integrated    64  f32  loudness range
//!  68  f32  bpm                72  f32  beat phase
//!  76  channel block: 8 x 20 bytes
//!      (rms dB, peak dB, true peak dB, rms 0-1, peak 0-1 as f32)
//! 236  f32[fft/2 + 1]  linear spectrum
//!      f32[waveform length]  waveform
//! ```

use crate::error::ShmError;
use memmap2::Mmap;
use std::fs::File;
use std::path::Path;
use tracing::{debug, info, warn};
use viz_bridge_api::{AudioFrame, ChannelLevels, DB_FLOOR};

pub const SHM_MAGIC: u32 = 0x4D58_4D41;
pub const SHM_VERSION: u32 = 1;
pub const SHM_MAX_CHANNELS: usize = 8;
pub const SHM_CHANNEL_STRIDE: usize = 20;
pub const SHM_CHANNELS_OFFSET: usize = 76;
pub const SHM_SPECTRUM_OFFSET: usize = 236;
pub const DEFAULT_SHM_NAME: &str = "VizBridge_AudioSHM";

fn read_u32(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset + 4)?;
    bytes.try_into().ok().map(u32::from_le_bytes)
}

fn read_f32(data: &[u8], offset: usize) -> Option<f32> {
    read_u32(data, offset).map(f32::from_bits)
}

/// Decibels from a linear magnitude, floored for near-zero values.
fn to_db(linear: f32) -> f32 {
    if linear > 1e-10 {
        20.0 * linear.log10()
    } else {
        DB_FLOOR
    }
}

/// Maps the audio region and decodes [`AudioFrame`]s from it.
pub struct AudioShmReader {
    name: String,
    mmap: Option<Mmap>,
    last_frame: u32,
}

impl AudioShmReader {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mmap: None,
            last_frame: 0,
        }
    }

    /// Try to map the named region. Returns whether the transport is
    /// usable; failure is normal (engine not running yet) and leaves the
    /// reader in JSON-fallback mode.
    pub fn open(&mut self) -> bool {
        match self.try_open() {
            Ok(()) => {
                info!("Opened audio shared memory '{}'", self.name);
                true
            }
            Err(e) => {
                debug!(
                    "Audio shared memory '{}' unavailable ({e}); using JSON audio",
                    self.name
                );
                self.mmap = None;
                false
            }
        }
    }

    #[cfg(unix)]
    fn try_open(&mut self) -> Result<(), ShmError> {
        let path = Path::new("/dev/shm").join(&self.name);
        self.open_path(&path)
    }

    #[cfg(not(unix))]
    fn try_open(&mut self) -> Result<(), ShmError> {
        Err(ShmError::Unsupported)
    }

    /// Map an explicit file as the audio region.
    pub fn open_path(&mut self, path: &Path) -> Result<(), ShmError> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        Self::validate(&mmap)?;
        self.mmap = Some(mmap);
        Ok(())
    }

    fn validate(data: &[u8]) -> Result<(), ShmError> {
        if data.len() < SHM_CHANNELS_OFFSET {
            return Err(ShmError::TooSmall { len: data.len() });
        }
        let found = read_u32(data, 0).unwrap_or(0);
        if found != SHM_MAGIC {
            return Err(ShmError::BadMagic {
                found,
                expected: SHM_MAGIC,
            });
        }
        let version = read_u32(data, 4).unwrap_or(0);
        if version != SHM_VERSION {
            // Tolerated for forward compatibility.
            warn!(
                "Audio shared memory version {version} (expected {SHM_VERSION}); reading anyway"
            );
        }
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.mmap.is_some()
    }

    pub fn close(&mut self) {
        self.mmap = None;
    }

    /// Whether the writer has published a frame since the last `read()`.
    /// Reads always succeed regardless; a stale frame is not an error.
    pub fn has_new_frame(&self) -> bool {
        self.mmap
            .as_deref()
            .and_then(|d| read_u32(d, 8))
            .map_or(false, |counter| counter != self.last_frame)
    }

    /// Decode the current frame. `None` only when the region is unmapped
    /// or the header lies about sizes; callers fall back to JSON audio.
    pub fn read(&mut self) -> Option<AudioFrame> {
        let data = self.mmap.as_deref()?;

        let frame_counter = read_u32(data, 8)?;
        let sample_rate = read_f32(data, 16)?;
        let num_channels = read_u32(data, 20)?;
        let fft_size = read_u32(data, 24)?;
        let waveform_size = read_u32(data, 28)?;
        let flags = read_u32(data, 32)?;

        let channel_count = (num_channels as usize).min(SHM_MAX_CHANNELS);
        let mut channels = Vec::with_capacity(channel_count);
        for ch in 0..channel_count {
            let base = SHM_CHANNELS_OFFSET + ch * SHM_CHANNEL_STRIDE;
            // Channel levels are transported in dB already; only the
            // spectrum's dB form is derived at read time.
            channels.push(ChannelLevels {
                rms: read_f32(data, base)?,
                peak: read_f32(data, base + 4)?,
                true_peak: read_f32(data, base + 8)?,
                rms_linear: read_f32(data, base + 12)?,
                peak_linear: read_f32(data, base + 16)?,
            });
        }

        let spectrum_len = fft_size as usize / 2 + 1;
        let mut spectrum_linear = Vec::with_capacity(spectrum_len);
        for i in 0..spectrum_len {
            spectrum_linear.push(read_f32(data, SHM_SPECTRUM_OFFSET + i * 4)?);
        }
        let spectrum = spectrum_linear.iter().copied().map(to_db).collect();

        let waveform_offset = SHM_SPECTRUM_OFFSET + spectrum_len * 4;
        let mut waveform = Vec::with_capacity(waveform_size as usize);
        for i in 0..waveform_size as usize {
            waveform.push(read_f32(data, waveform_offset + i * 4)?);
        }

        self.last_frame = frame_counter;

        Some(AudioFrame {
            sample_rate,
            num_channels,
            is_playing: flags & 1 != 0,
            position: read_f32(data, 36)? as f64,
            duration: read_f32(data, 40)? as f64,
            channels,
            spectrum,
            spectrum_linear,
            waveform,
            fft_size,
            correlation: read_f32(data, 44)?,
            stereo_angle: read_f32(data, 48)?,
            lufs_momentary: read_f32(data, 52)?,
            lufs_short_term: read_f32(data, 56)?,
            lufs_integrated: read_f32(data, 60)?,
            loudness_range: read_f32(data, 64)?,
            bpm: read_f32(data, 68)?,
            beat_phase: read_f32(data, 72)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn put_u32(buf: &mut Vec<u8>, offset: usize, v: u32) {
        buf[offset..offset + 4].copy_from_slice(&v.to_le_bytes());
    }

    fn put_f32(buf: &mut Vec<u8>, offset: usize, v: f32) {
        put_u32(buf, offset, v.to_bits());
    }

    /// A minimal valid region: 2 channels, fft 8 (5 bins), 4 waveform samples.
    fn sample_region() -> Vec<u8> {
        let fft_size = 8u32;
        let spectrum_len = fft_size as usize / 2 + 1;
        let waveform_size = 4u32;
        let total = SHM_SPECTRUM_OFFSET + spectrum_len * 4 + waveform_size as usize * 4;
        let mut buf = vec![0u8; total];

        put_u32(&mut buf, 0, SHM_MAGIC);
        put_u32(&mut buf, 4, SHM_VERSION);
        put_u32(&mut buf, 8, 7); // frame counter
        put_u32(&mut buf, 12, total as u32);
        put_f32(&mut buf, 16, 48000.0);
        put_u32(&mut buf, 20, 2);
        put_u32(&mut buf, 24, fft_size);
        put_u32(&mut buf, 28, waveform_size);
        put_u32(&mut buf, 32, 1); // playing
        put_f32(&mut buf, 36, 12.5);
        put_f32(&mut buf, 68, 120.0);

        // Left channel: dB levels plus the 0-1 rms, as the writer sends them.
        put_f32(&mut buf, SHM_CHANNELS_OFFSET, -6.02);
        put_f32(&mut buf, SHM_CHANNELS_OFFSET + 4, -3.5);
        put_f32(&mut buf, SHM_CHANNELS_OFFSET + 8, -2.0);
        put_f32(&mut buf, SHM_CHANNELS_OFFSET + 12, 0.5);
        // Right channel: silence at the writer's dB floor.
        put_f32(&mut buf, SHM_CHANNELS_OFFSET + SHM_CHANNEL_STRIDE, DB_FLOOR);

        for i in 0..spectrum_len {
            put_f32(&mut buf, SHM_SPECTRUM_OFFSET + i * 4, 0.1 * (i + 1) as f32);
        }
        for i in 0..waveform_size as usize {
            put_f32(
                &mut buf,
                SHM_SPECTRUM_OFFSET + spectrum_len * 4 + i * 4,
                i as f32,
            );
        }
        buf
    }

    fn write_region(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn reads_a_full_frame() {
        let file = write_region(&sample_region());
        let mut reader = AudioShmReader::new("test");
        reader.open_path(file.path()).unwrap();

        assert!(reader.has_new_frame());
        let frame = reader.read().unwrap();
        assert_eq!(frame.sample_rate, 48000.0);
        assert_eq!(frame.num_channels, 2);
        assert!(frame.is_playing);
        assert_eq!(frame.position, 12.5);
        assert_eq!(frame.bpm, 120.0);

        assert_eq!(frame.channels.len(), 2);
        // dB fields pass through untouched, never re-derived.
        assert_eq!(frame.channels[0].rms, -6.02);
        assert_eq!(frame.channels[0].peak, -3.5);
        assert_eq!(frame.channels[0].true_peak, -2.0);
        assert_eq!(frame.channels[0].rms_linear, 0.5);
        assert_eq!(frame.channels[1].rms, DB_FLOOR);

        assert_eq!(frame.spectrum_linear.len(), 5);
        assert_eq!(frame.spectrum.len(), 5);
        assert!((frame.spectrum_linear[0] - 0.1).abs() < 1e-6);
        assert!((frame.spectrum[0] - -20.0).abs() < 0.01);
        assert_eq!(frame.waveform, vec![0.0, 1.0, 2.0, 3.0]);

        // Counter unchanged, so no new frame until the writer publishes.
        assert!(!reader.has_new_frame());
        assert!(reader.read().is_some());
    }

    #[test]
    fn refuses_bad_magic() {
        let mut region = sample_region();
        put_u32(&mut region, 0, 0xDEADBEEF);
        let file = write_region(&region);
        let mut reader = AudioShmReader::new("test");
        assert!(matches!(
            reader.open_path(file.path()),
            Err(ShmError::BadMagic { .. })
        ));
        assert!(!reader.is_open());
    }

    #[test]
    fn refuses_truncated_header() {
        let file = write_region(&[0u8; 16]);
        let mut reader = AudioShmReader::new("test");
        assert!(matches!(
            reader.open_path(file.path()),
            Err(ShmError::TooSmall { len: 16 })
        ));
    }

    #[test]
    fn tolerates_version_mismatch() {
        let mut region = sample_region();
        put_u32(&mut region, 4, 99);
        let file = write_region(&region);
        let mut reader = AudioShmReader::new("test");
        reader.open_path(file.path()).unwrap();
        assert!(reader.read().is_some());
    }

    #[test]
    fn clamps_channel_count_to_capacity() {
        let mut region = sample_region();
        put_u32(&mut region, 20, 64);
        let file = write_region(&region);
        let mut reader = AudioShmReader::new("test");
        reader.open_path(file.path()).unwrap();
        let frame = reader.read().unwrap();
        assert_eq!(frame.channels.len(), SHM_MAX_CHANNELS);
    }

    #[test]
    fn oversized_fft_fails_read_not_panic() {
        let mut region = sample_region();
        put_u32(&mut region, 24, 1 << 20);
        let file = write_region(&region);
        let mut reader = AudioShmReader::new("test");
        reader.open_path(file.path()).unwrap();
        assert!(reader.read().is_none());
    }

    #[test]
    fn missing_region_falls_back() {
        let mut reader = AudioShmReader::new("viz-bridge-test-does-not-exist");
        assert!(!reader.open());
        assert!(!reader.is_open());
        assert!(reader.read().is_none());
        assert!(!reader.has_new_frame());
    }
}
