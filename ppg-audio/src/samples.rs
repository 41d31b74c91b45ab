//! Sample bank loading.
//!
//! Directory convention, resolved with an env var override falling back to
//! a user-local directory under `dirs::data_dir()`:
//!
//! ```text
//! <root>/bank{0..3}/sample{0..7}.wav   32 per-channel samples
//! <root>/acquire.wav                   global acquire-acknowledgement cue
//! <root>/loop{0..31}.wav               16 latching + 16 momentary loops
//! ```
//!
//! All samples are mono; multichannel files are flattened to their first
//! channel. Empty files and files whose sample rate doesn't match the
//! first successfully loaded file are rejected with a warning; loading
//! continues with the remaining files.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use hound::WavReader;

pub const BANK_COUNT: usize = 4;
pub const SAMPLES_PER_BANK: usize = 8;
pub const LOOP_COUNT: usize = 32;

/// Env var overriding the sample root directory.
pub const SAMPLE_DIR_ENV: &str = "CORAZONN_SAMPLE_DIR";

/// Resolve the sample root directory: env override, else a user-local
/// directory under the platform data dir.
pub fn default_sample_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(SAMPLE_DIR_ENV) {
        return PathBuf::from(dir);
    }
    dirs::data_dir()
        .map(|d| d.join("corazonn").join("samples"))
        .unwrap_or_else(|| PathBuf::from("samples"))
}

/// One channel's worth of mono f32 samples, ready to play.
pub type SampleData = Arc<Vec<f32>>;

/// The full loaded sample set: per-channel banks, the acquire cue, and
/// ambient loops. Missing/unloadable entries resolve to an empty buffer
/// (silent, but never a missing voice).
pub struct SampleBank {
    banks: [[SampleData; SAMPLES_PER_BANK]; BANK_COUNT],
    acquire: SampleData,
    loops: [SampleData; LOOP_COUNT],
    sample_rate: u32,
}

impl SampleBank {
    pub fn bank_sample(&self, bank: u8, index: u8) -> SampleData {
        Arc::clone(&self.banks[(bank as usize) % BANK_COUNT][(index as usize) % SAMPLES_PER_BANK])
    }

    pub fn acquire_sample(&self) -> SampleData {
        Arc::clone(&self.acquire)
    }

    pub fn loop_sample(&self, id: u8) -> SampleData {
        Arc::clone(&self.loops[(id as usize) % LOOP_COUNT])
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Load every sample this engine needs from `root`, in the directory
    /// convention documented above. Never fails outright: unreadable or
    /// mismatched files fall back to silence and are logged.
    pub fn load(root: &Path) -> Self {
        let mut observed_rate: Option<u32> = None;
        let empty = || Arc::new(Vec::new());

        let mut load_one = |path: PathBuf| -> SampleData {
            match load_wav_mono(&path) {
                Ok((data, rate)) => {
                    if data.is_empty() {
                        log::warn!(target: "audio::samples", "{}: empty sample, skipping", path.display());
                        return empty();
                    }
                    match observed_rate {
                        None => observed_rate = Some(rate),
                        Some(expected) if expected != rate => {
                            log::warn!(
                                target: "audio::samples",
                                "{}: sample rate {} does not match engine rate {}, skipping",
                                path.display(),
                                rate,
                                expected
                            );
                            return empty();
                        }
                        _ => {}
                    }
                    Arc::new(data)
                }
                Err(e) => {
                    log::warn!(target: "audio::samples", "{}: {}, skipping", path.display(), e);
                    empty()
                }
            }
        };

        let mut banks: [[SampleData; SAMPLES_PER_BANK]; BANK_COUNT] = Default::default();
        for (b, bank) in banks.iter_mut().enumerate() {
            for (i, slot) in bank.iter_mut().enumerate() {
                let path = root.join(format!("bank{b}")).join(format!("sample{i}.wav"));
                *slot = load_one(path);
            }
        }

        let acquire = load_one(root.join("acquire.wav"));

        let loops: [SampleData; LOOP_COUNT] =
            std::array::from_fn(|i| load_one(root.join(format!("loop{i}.wav"))));

        Self {
            banks,
            acquire,
            loops,
            sample_rate: observed_rate.unwrap_or(44_100),
        }
    }
}

fn load_wav_mono(path: &Path) -> Result<(Vec<f32>, u32), String> {
    let mut reader = WavReader::open(path).map_err(|e| e.to_string())?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<Vec<f32>, _>>()
            .map_err(|e| e.to_string())?,
        hound::SampleFormat::Int => {
            let max = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max))
                .collect::<Result<Vec<f32>, _>>()
                .map_err(|e| e.to_string())?
        }
    };

    // Flatten to first channel.
    let mono: Vec<f32> = samples.into_iter().step_by(channels).collect();
    Ok((mono, spec.sample_rate))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(path: &Path, rate: u32, samples: &[i16]) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn missing_files_resolve_to_silence_not_failure() {
        let dir = tempfile::tempdir().unwrap();
        let bank = SampleBank::load(dir.path());
        assert!(bank.bank_sample(0, 0).is_empty());
        assert!(bank.acquire_sample().is_empty());
    }

    #[test]
    fn loads_a_present_sample_and_fixes_engine_rate() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("bank0")).unwrap();
        write_wav(&dir.path().join("bank0").join("sample0.wav"), 48_000, &[0, 16384, -16384]);

        let bank = SampleBank::load(dir.path());
        assert_eq!(bank.sample_rate(), 48_000);
        assert_eq!(bank.bank_sample(0, 0).len(), 3);
    }

    #[test]
    fn mismatched_sample_rate_is_rejected_others_still_load() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("bank0")).unwrap();
        write_wav(&dir.path().join("bank0").join("sample0.wav"), 44_100, &[1, 2, 3]);
        write_wav(&dir.path().join("bank0").join("sample1.wav"), 48_000, &[1, 2, 3]);

        let bank = SampleBank::load(dir.path());
        assert_eq!(bank.sample_rate(), 44_100);
        assert!(!bank.bank_sample(0, 0).is_empty());
        assert!(bank.bank_sample(0, 1).is_empty());
    }

    #[test]
    fn empty_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("bank0")).unwrap();
        write_wav(&dir.path().join("bank0").join("sample0.wav"), 44_100, &[]);
        let bank = SampleBank::load(dir.path());
        assert!(bank.bank_sample(0, 0).is_empty());
    }
}
