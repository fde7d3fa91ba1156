//! Audio playback and spectrum analysis system.
//!
//! Decodes the selected WAV file, plays it through the default output
//! device, and feeds the played samples to an FFT analysis thread that
//! publishes a magnitude spectrum normalized to [0, 1] for the visuals.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::f32::consts::PI;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::params::FftConfig;

/// Failures on the path from file selection to audible playback
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("failed to decode audio file: {0}")]
    Decode(#[from] hound::Error),

    #[error("unsupported WAV layout: {0}")]
    UnsupportedFormat(String),

    #[error("invalid analysis config: {0}")]
    InvalidConfig(String),

    #[error("no audio output device found")]
    NoDevice,

    #[error("failed to query audio output config: {0}")]
    DeviceConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to build audio stream: {0}")]
    Stream(#[from] cpal::BuildStreamError),

    #[error("failed to start playback: {0}")]
    Play(#[from] cpal::PlayStreamError),
}

/// Decoded PCM audio, folded to interleaved stereo in [-1, 1]
pub struct DecodedAudio {
    /// Interleaved stereo samples (L R L R ...)
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn frames(&self) -> usize {
        self.samples.len() / 2
    }

    pub fn duration_secs(&self) -> f32 {
        self.frames() as f32 / self.sample_rate as f32
    }
}

/// Decode a WAV file to interleaved stereo f32.
///
/// Mono input is duplicated to both channels; extra channels beyond the
/// first two are dropped.
pub fn decode_wav(path: &Path) -> Result<DecodedAudio, AudioError> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();

    if spec.channels == 0 {
        return Err(AudioError::UnsupportedFormat("zero channels".to_string()));
    }

    let raw: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
    };

    let channels = spec.channels as usize;
    let mut samples = Vec::with_capacity(raw.len() / channels * 2);
    for frame in raw.chunks_exact(channels) {
        let left = frame[0];
        let right = frame[channels.min(2) - 1];
        samples.push(left);
        samples.push(right);
    }

    Ok(DecodedAudio {
        samples,
        sample_rate: spec.sample_rate,
    })
}

/// Streaming FFT analyzer producing magnitudes normalized to [0, 1].
///
/// Linear magnitudes are smoothed across analysis frames, converted to
/// decibels, and mapped from [min_db, max_db] onto [0, 1].
pub struct SpectrumAnalyzer {
    config: FftConfig,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    scratch: Vec<Complex<f32>>,
    smoothed: Vec<f32>,
    spectrum: Vec<f32>,
}

impl SpectrumAnalyzer {
    pub fn new(config: FftConfig) -> Result<Self, AudioError> {
        config.validate().map_err(AudioError::InvalidConfig)?;

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(config.fft_size);
        let window = (0..config.fft_size)
            .map(|i| hann_window(i, config.fft_size))
            .collect();
        let len = config.spectrum_len();

        Ok(Self {
            fft,
            window,
            scratch: vec![Complex::new(0.0, 0.0); config.fft_size],
            smoothed: vec![0.0; len],
            spectrum: vec![0.0; len],
            config,
        })
    }

    /// Analyze one block of `fft_size` mono samples and return the
    /// updated normalized spectrum.
    pub fn process_block(&mut self, block: &[f32]) -> &[f32] {
        debug_assert_eq!(block.len(), self.config.fft_size);

        for (i, (&sample, &window)) in block.iter().zip(self.window.iter()).enumerate() {
            self.scratch[i] = Complex::new(sample * window, 0.0);
        }
        self.fft.process(&mut self.scratch);

        // Amplitude normalization for a one-sided spectrum
        let norm = 2.0 / self.config.fft_size as f32;
        let tau = self.config.smoothing_time_constant;
        let db_range = self.config.max_db - self.config.min_db;

        for i in 0..self.spectrum.len() {
            let magnitude = self.scratch[i].norm() * norm;
            self.smoothed[i] = tau * self.smoothed[i] + (1.0 - tau) * magnitude;

            let db = 20.0 * self.smoothed[i].max(1e-10).log10();
            self.spectrum[i] = ((db - self.config.min_db) / db_range).clamp(0.0, 1.0);
        }

        &self.spectrum
    }
}

/// Audio system managing playback and spectrum analysis
pub struct AudioSystem {
    /// Shared normalized spectrum (thread-safe)
    spectrum: Arc<Mutex<Vec<f32>>>,

    /// Set by the output callback once the last file frame has played
    finished: Arc<AtomicBool>,

    /// Audio output stream (kept alive)
    _stream: cpal::Stream,

    /// Analysis thread handle (detached, lives for the process)
    _analysis_thread: thread::JoinHandle<()>,

    duration_secs: f32,
}

impl AudioSystem {
    /// Decode `path`, start playback, and launch the analysis thread.
    ///
    /// Any failure (unreadable file, no output device, stream refusing
    /// to start) is returned before a single frame is rendered, so the
    /// caller can report it and skip the render loop entirely.
    pub fn start(path: &Path, mut fft_config: FftConfig) -> Result<Self, AudioError> {
        let decoded = decode_wav(path)?;
        fft_config.sample_rate_hz = decoded.sample_rate as usize;

        let analyzer = SpectrumAnalyzer::new(fft_config.clone())?;
        let duration_secs = decoded.duration_secs();

        // Shared state between audio callback and analysis thread
        let tap_buffer = Arc::new(Mutex::new(Vec::<f32>::new()));
        let spectrum = Arc::new(Mutex::new(vec![0.0f32; fft_config.spectrum_len()]));
        let finished = Arc::new(AtomicBool::new(false));

        // Setup audio output device
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(AudioError::NoDevice)?;
        let config = device.default_output_config()?;

        log::info!(
            "audio output: {} @ {} Hz",
            device.name().unwrap_or_else(|_| "unknown".to_string()),
            config.sample_rate().0
        );

        let out_channels = config.channels() as usize;
        // File and device rates may differ; the callback steps through
        // the file at this ratio with linear interpolation.
        let step = decoded.sample_rate as f64 / config.sample_rate().0 as f64;
        let tap_cap = fft_config.fft_size * 8;

        let samples = decoded.samples;
        let tap_for_callback = Arc::clone(&tap_buffer);
        let finished_cb = Arc::clone(&finished);
        let mut cursor = 0.0f64;

        let stream = device.build_output_stream(
            &config.into(),
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let mut tap = tap_for_callback.lock().unwrap();
                let total_frames = samples.len() / 2;

                for frame in data.chunks_mut(out_channels) {
                    let idx = cursor as usize;
                    let (left, right) = if idx + 1 < total_frames {
                        let t = (cursor - idx as f64) as f32;
                        let l = samples[idx * 2] * (1.0 - t) + samples[(idx + 1) * 2] * t;
                        let r = samples[idx * 2 + 1] * (1.0 - t) + samples[(idx + 1) * 2 + 1] * t;
                        (l, r)
                    } else {
                        // End of file: emit silence so the spectrum decays
                        finished_cb.store(true, Ordering::Relaxed);
                        (0.0, 0.0)
                    };

                    frame[0] = left;
                    if frame.len() > 1 {
                        frame[1] = right;
                    }
                    for extra in frame.iter_mut().skip(2) {
                        *extra = 0.0;
                    }

                    tap.push(0.5 * (left + right)); // Accumulate for analysis
                    cursor += step;
                }

                // Bound the tap buffer if the analyzer falls behind
                if tap.len() > tap_cap {
                    let excess = tap.len() - tap_cap;
                    tap.drain(0..excess);
                }
            },
            |err| log::error!("audio stream error: {}", err),
            None,
        )?;

        stream.play()?;

        let analysis_thread =
            spawn_analysis_thread(fft_config, analyzer, tap_buffer, Arc::clone(&spectrum));

        Ok(Self {
            spectrum,
            finished,
            _stream: stream,
            _analysis_thread: analysis_thread,
            duration_secs,
        })
    }

    /// Current normalized spectrum (thread-safe copy)
    pub fn spectrum(&self) -> Vec<f32> {
        self.spectrum.lock().unwrap().clone()
    }

    /// True once the last decoded frame has been played out
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Relaxed)
    }

    pub fn duration_secs(&self) -> f32 {
        self.duration_secs
    }
}

/// Spawn the spectrum analysis thread
fn spawn_analysis_thread(
    config: FftConfig,
    mut analyzer: SpectrumAnalyzer,
    tap_buffer: Arc<Mutex<Vec<f32>>>,
    spectrum: Arc<Mutex<Vec<f32>>>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut block = vec![0.0f32; config.fft_size];

        loop {
            thread::sleep(Duration::from_millis(config.update_interval_ms));

            let mut tap = tap_buffer.lock().unwrap();
            if tap.len() < config.fft_size {
                continue;
            }

            block.copy_from_slice(&tap[..config.fft_size]);
            // 50% overlap (drain half the buffer)
            tap.drain(0..config.fft_size / 2);
            drop(tap);

            let updated = analyzer.process_block(&block);
            spectrum.lock().unwrap().copy_from_slice(updated);
        }
    })
}

/// Hann window function for FFT analysis
fn hann_window(index: usize, size: usize) -> f32 {
    0.5 * (1.0 - ((2.0 * PI * index as f32) / (size as f32 - 1.0)).cos())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn analyzer_config() -> FftConfig {
        FftConfig {
            smoothing_time_constant: 0.0,
            ..Default::default()
        }
    }

    fn sine_block(freq_hz: f32, amplitude: f32, config: &FftConfig) -> Vec<f32> {
        (0..config.fft_size)
            .map(|i| {
                let t = i as f32 / config.sample_rate_hz as f32;
                amplitude * (2.0 * PI * freq_hz * t).sin()
            })
            .collect()
    }

    fn temp_wav_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("pulsefield_test_{}_{}.wav", tag, std::process::id()))
    }

    #[test]
    fn test_hann_window() {
        let size = 1024;

        // Hann window should be 0 at edges, 1 at center
        assert!((hann_window(0, size) - 0.0).abs() < 0.01);
        assert!((hann_window(size - 1, size) - 0.0).abs() < 0.01);
        assert!((hann_window(size / 2, size) - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_analyzer_sine_peaks_at_expected_bin() {
        let config = analyzer_config();
        let mut analyzer = SpectrumAnalyzer::new(config.clone()).unwrap();

        // 440 Hz at 44100 Hz / 1024 bins lands near bin 10
        let block = sine_block(440.0, 0.8, &config);
        let spectrum = analyzer.process_block(&block);

        let expected_bin = (440.0 * config.fft_size as f32 / config.sample_rate_hz as f32) as usize;
        assert!(spectrum[expected_bin] > 0.9);
        // Energy far from the tone stays near the floor
        assert!(spectrum[expected_bin + 300] < 0.2);
    }

    #[test]
    fn test_analyzer_silence_is_zero() {
        let config = analyzer_config();
        let mut analyzer = SpectrumAnalyzer::new(config.clone()).unwrap();
        let spectrum = analyzer.process_block(&vec![0.0; config.fft_size]);
        assert!(spectrum.iter().all(|&m| m == 0.0));
    }

    #[test]
    fn test_analyzer_is_deterministic_without_smoothing() {
        let config = analyzer_config();
        let block = sine_block(1000.0, 0.5, &config);

        let mut analyzer = SpectrumAnalyzer::new(config.clone()).unwrap();
        let first = analyzer.process_block(&block).to_vec();
        let second = analyzer.process_block(&block).to_vec();
        assert_eq!(first, second);
    }

    #[test]
    fn test_analyzer_rejects_bad_config() {
        let config = FftConfig {
            fft_size: 1000,
            ..Default::default()
        };
        assert!(matches!(
            SpectrumAnalyzer::new(config),
            Err(AudioError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_decode_wav_duplicates_mono_to_stereo() {
        let path = temp_wav_path("mono");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 22050,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for value in [0i16, 8192, -8192, 16384] {
            writer.write_sample(value).unwrap();
        }
        writer.finalize().unwrap();

        let decoded = decode_wav(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(decoded.sample_rate, 22050);
        assert_eq!(decoded.frames(), 4);
        // Mono fold-down duplicates each sample to both channels
        assert_eq!(decoded.samples[2], decoded.samples[3]);
        assert!((decoded.samples[2] - 0.25).abs() < 1e-3);
        assert!((decoded.duration_secs() - 4.0 / 22050.0).abs() < 1e-6);
    }

    #[test]
    fn test_decode_wav_missing_file_is_decode_error() {
        let result = decode_wav(Path::new("/nonexistent/pulsefield.wav"));
        assert!(matches!(result, Err(AudioError::Decode(_))));
    }

    #[test]
    fn test_playback_failure_reports_before_render_loop() {
        // A missing file must fail AudioSystem::start outright; the
        // caller never builds a window or starts the frame loop.
        let result = AudioSystem::start(
            Path::new("/nonexistent/pulsefield.wav"),
            FftConfig::default(),
        );
        assert!(result.is_err());
    }
}
