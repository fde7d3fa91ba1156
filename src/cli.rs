//! Command-line argument parsing.

use std::path::PathBuf;

use clap::Parser;

use crate::params::{CameraPreset, FixedCamera, OrbitCamera, RecordingConfig};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "Pulsefield")]
#[command(about = "Audio-reactive particle visualizer", long_about = None)]
pub struct Args {
    /// Audio file to visualize (WAV)
    #[arg(value_name = "AUDIO_FILE")]
    pub audio: PathBuf,

    /// Number of particles
    #[arg(long, value_name = "COUNT", default_value = "4096")]
    pub particles: usize,

    /// Radial displacement gain (higher = stronger reaction)
    #[arg(long, value_name = "GAIN", default_value = "2.0")]
    pub displacement: f32,

    /// Camera preset: fixed (default), orbit
    #[arg(long, value_name = "PRESET", default_value = "fixed")]
    pub camera_preset: String,

    /// Disable the bloom post-processing pass
    #[arg(long)]
    pub no_bloom: bool,

    /// Record frames to disk (duration in seconds)
    #[arg(long, value_name = "SECONDS")]
    pub record: Option<f32>,
}

impl Args {
    /// Parse camera preset from command-line arguments
    pub fn parse_camera_preset(&self) -> CameraPreset {
        match self.camera_preset.to_lowercase().as_str() {
            "fixed" => {
                println!("Camera: Fixed");
                CameraPreset::Fixed(FixedCamera::default())
            }
            "orbit" => {
                println!("Camera: Orbit");
                CameraPreset::Orbit(OrbitCamera::default())
            }
            other => {
                log::warn!("unknown camera preset '{}', using fixed", other);
                CameraPreset::Fixed(FixedCamera::default())
            }
        }
    }

    /// Create recording configuration if recording mode is enabled
    pub fn create_recording_config(&self) -> Option<RecordingConfig> {
        self.record.map(|duration| {
            let config = RecordingConfig::new(duration);

            // Create output directories
            std::fs::create_dir_all(config.frames_dir()).expect("Failed to create frames directory");

            config
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_preset_falls_back_to_fixed() {
        let args = Args::parse_from(["pulsefield", "track.wav", "--camera-preset", "wobble"]);
        assert!(matches!(args.parse_camera_preset(), CameraPreset::Fixed(_)));
    }

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["pulsefield", "track.wav"]);
        assert_eq!(args.particles, 4096);
        assert_eq!(args.displacement, 2.0);
        assert!(!args.no_bloom);
        assert!(args.record.is_none());
    }
}
