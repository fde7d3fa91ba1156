//! Parameter definitions with physical units and documented semantics.
//!
//! All tunables live here with:
//! - Physical units (meters, seconds, Hz, dB)
//! - Documented ranges and meanings
//! - Validation where a bad value would only surface deep in a thread

/// Particle field layout parameters
#[derive(Debug, Clone)]
pub struct ParticleField {
    /// Number of particles
    pub count: usize,

    /// Base radius of the pseudo-spherical distribution (meters)
    pub base_radius_m: f32,

    /// Radial jitter as a fraction of the base radius (0.0 = perfect shell)
    pub radius_jitter: f32,

    /// Billboard size of a single particle (meters)
    pub particle_size_m: f32,

    /// Seed for the particle distribution (same seed = same cloud)
    pub seed: u64,
}

impl Default for ParticleField {
    fn default() -> Self {
        Self {
            count: 4096,
            base_radius_m: 90.0,
            radius_jitter: 0.35,
            particle_size_m: 1.6,
            seed: 42,
        }
    }
}

/// Spectrum analysis configuration
#[derive(Debug, Clone)]
pub struct FftConfig {
    /// Audio sample rate (Hz); overridden by the decoded file's rate
    pub sample_rate_hz: usize,

    /// FFT window size (must be power of 2)
    pub fft_size: usize,

    /// Analysis update interval (milliseconds)
    pub update_interval_ms: u64,

    /// Exponential smoothing applied to linear magnitudes between
    /// analysis frames (0.0 = no smoothing, 0.99 = very slow)
    pub smoothing_time_constant: f32,

    /// Magnitude mapped to 0.0 (decibels full scale)
    pub min_db: f32,

    /// Magnitude mapped to 1.0 (decibels full scale)
    pub max_db: f32,
}

impl Default for FftConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 44100,
            fft_size: 1024,
            update_interval_ms: 16,
            smoothing_time_constant: 0.8,
            min_db: -100.0,
            max_db: -30.0,
        }
    }
}

impl FftConfig {
    /// Number of magnitude bins the analyzer publishes
    pub fn spectrum_len(&self) -> usize {
        self.fft_size / 2
    }

    /// Validate configuration (FFT size must be power of 2, etc.)
    pub fn validate(&self) -> Result<(), String> {
        if !self.fft_size.is_power_of_two() {
            return Err(format!(
                "FFT size must be power of 2, got {}",
                self.fft_size
            ));
        }
        if self.sample_rate_hz == 0 {
            return Err("Sample rate must be > 0".to_string());
        }
        if !(0.0..1.0).contains(&self.smoothing_time_constant) {
            return Err(format!(
                "Smoothing time constant must be in [0, 1), got {}",
                self.smoothing_time_constant
            ));
        }
        if self.min_db >= self.max_db {
            return Err(format!(
                "dB range must be increasing, got [{}, {}]",
                self.min_db, self.max_db
            ));
        }
        Ok(())
    }
}

/// Mapping from spectrum magnitudes to particle parameters
#[derive(Debug, Clone)]
pub struct DisplacementMapping {
    /// Scale factor: normalized magnitude → radial displacement
    /// Formula: displacement = 1.0 + magnitude * this_gain
    pub displacement_gain: f32,

    /// Scale factor: normalized magnitude → particle brightness boost
    /// Formula: brightness = base + magnitude * this_gain
    pub brightness_gain: f32,
}

impl Default for DisplacementMapping {
    fn default() -> Self {
        Self {
            displacement_gain: 2.0,
            brightness_gain: 1.2,
        }
    }
}

/// Fixed camera parameters (stationary view of the particle cloud)
#[derive(Debug, Clone)]
pub struct FixedCamera {
    /// Eye position (meters)
    pub position: [f32; 3],

    /// Look-at target (meters)
    pub target: [f32; 3],
}

impl Default for FixedCamera {
    fn default() -> Self {
        Self {
            position: [0.0, 40.0, 280.0],
            target: [0.0, 0.0, 0.0],
        }
    }
}

/// Orbit camera parameters (slow circle around the cloud)
#[derive(Debug, Clone)]
pub struct OrbitCamera {
    /// Orbit radius in the XZ plane (meters)
    pub radius_m: f32,

    /// Constant eye height (meters)
    pub height_m: f32,

    /// Angular speed (radians per second)
    pub angular_speed_rad_per_s: f32,
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self {
            radius_m: 280.0,
            height_m: 40.0,
            angular_speed_rad_per_s: 0.12,
        }
    }
}

/// Camera preset selection
#[derive(Debug, Clone)]
pub enum CameraPreset {
    /// Fixed preset: stationary view of the cloud
    Fixed(FixedCamera),

    /// Orbit preset: slow circular flight around the cloud
    Orbit(OrbitCamera),
}

impl Default for CameraPreset {
    fn default() -> Self {
        Self::Fixed(FixedCamera::default())
    }
}

/// Rendering configuration
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Window width (pixels)
    pub window_width: u32,

    /// Window height (pixels)
    pub window_height: u32,

    /// Field of view (degrees)
    pub fov_degrees: f32,

    /// Near clipping plane (meters)
    pub near_plane_m: f32,

    /// Far clipping plane (meters)
    pub far_plane_m: f32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            window_width: 1280,
            window_height: 720,
            fov_degrees: 60.0,
            near_plane_m: 0.1,
            far_plane_m: 2000.0,
        }
    }
}

impl RenderConfig {
    pub fn aspect_ratio(&self) -> f32 {
        self.window_width as f32 / self.window_height as f32
    }
}

/// Bloom post-processing configuration
#[derive(Debug, Clone)]
pub struct BloomConfig {
    /// Whether the bloom chain runs at all
    pub enabled: bool,

    /// Luminance above this contributes to bloom (linear HDR units)
    pub threshold: f32,

    /// Bloom contribution in the final composite (0.0 = scene only)
    pub strength: f32,
}

impl Default for BloomConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 0.55,
            strength: 0.85,
        }
    }
}

/// Recording mode configuration
#[derive(Debug, Clone)]
pub struct RecordingConfig {
    /// Duration to record (seconds)
    pub duration_secs: f32,

    /// Output directory for frames
    pub output_dir: String,

    /// Frame rate (FPS)
    pub fps: u32,
}

impl RecordingConfig {
    pub fn new(duration_secs: f32) -> Self {
        Self {
            duration_secs,
            output_dir: "recording".to_string(),
            fps: 60,
        }
    }

    /// Total number of frames to capture
    pub fn total_frames(&self) -> usize {
        (self.duration_secs * self.fps as f32).ceil() as usize
    }

    /// Frame directory path
    pub fn frames_dir(&self) -> String {
        format!("{}/frames", self.output_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fft_config_validate_accepts_default() {
        assert!(FftConfig::default().validate().is_ok());
    }

    #[test]
    fn test_fft_config_rejects_non_power_of_two() {
        let config = FftConfig {
            fft_size: 1000,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_fft_config_rejects_zero_sample_rate() {
        let config = FftConfig {
            sample_rate_hz: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_fft_config_rejects_inverted_db_range() {
        let config = FftConfig {
            min_db: -10.0,
            max_db: -90.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_spectrum_len_is_half_fft_size() {
        let config = FftConfig::default();
        assert_eq!(config.spectrum_len(), config.fft_size / 2);
    }

    #[test]
    fn test_recording_config_total_frames() {
        let config = RecordingConfig::new(2.5);
        assert_eq!(config.total_frames(), 150); // 2.5s * 60fps
        assert_eq!(config.frames_dir(), "recording/frames");
    }
}
