//! Pulsefield - an audio-reactive particle visualizer
//!
//! Plays a WAV file and drives a bloom-lit particle cloud whose radius
//! breathes with the frequency spectrum of the music.

use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use winit::{
    application::ApplicationHandler,
    event::*,
    event_loop::EventLoop,
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

use pulsefield::audio::AudioSystem;
use pulsefield::camera::CameraSystem;
use pulsefield::cli::Args;
use pulsefield::params::*;
use pulsefield::particles::ParticleCloud;
use pulsefield::rendering::{BackgroundUniforms, RenderSystem, SceneUniforms};

/// Main application state
struct App {
    // Window and rendering
    window: Option<Arc<Window>>,
    render_system: Option<RenderSystem>,

    // Simulation systems
    particles: ParticleCloud,
    camera: CameraSystem,
    audio: AudioSystem,

    // Configuration
    field: ParticleField,
    mapping: DisplacementMapping,
    render_config: RenderConfig,
    bloom_config: BloomConfig,
    recording: Option<RecordingConfig>,

    // Time tracking
    start_time: Instant,
    frame_num: usize,
    reported_finished: bool,
}

impl App {
    fn new(args: &Args, audio: AudioSystem) -> Self {
        let field = ParticleField {
            count: args.particles,
            ..Default::default()
        };
        let mapping = DisplacementMapping {
            displacement_gain: args.displacement,
            ..Default::default()
        };
        let bloom_config = BloomConfig {
            enabled: !args.no_bloom,
            ..Default::default()
        };
        let render_config = RenderConfig::default();
        let recording = args.create_recording_config();

        // Initialize systems
        let particles = ParticleCloud::new(&field, mapping.clone());
        let camera = CameraSystem::new(args.parse_camera_preset());

        Self {
            window: None,
            render_system: None,
            particles,
            camera,
            audio,
            field,
            mapping,
            render_config,
            bloom_config,
            recording,
            start_time: Instant::now(),
            frame_num: 0,
            reported_finished: false,
        }
    }
}

impl ApplicationHandler for App {
    fn about_to_wait(&mut self, _event_loop: &winit::event_loop::ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn resumed(&mut self, event_loop: &winit::event_loop::ActiveEventLoop) {
        if self.window.is_some() {
            return; // Already initialized
        }

        // Create window
        let window_attributes = Window::default_attributes()
            .with_title("Pulsefield - Audio-Reactive Particles")
            .with_inner_size(winit::dpi::LogicalSize::new(
                self.render_config.window_width,
                self.render_config.window_height,
            ));

        let window = Arc::new(event_loop.create_window(window_attributes).unwrap());

        // Initialize rendering system
        let render_system = pollster::block_on(RenderSystem::new(
            Arc::clone(&window),
            &self.particles.instances,
            self.bloom_config.clone(),
            self.recording.clone(),
        ))
        .unwrap();

        self.window = Some(window);
        self.render_system = Some(render_system);
    }

    fn window_event(
        &mut self,
        event_loop: &winit::event_loop::ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        state: ElementState::Pressed,
                        physical_key: PhysicalKey::Code(KeyCode::Escape),
                        ..
                    },
                ..
            } => event_loop.exit(),
            WindowEvent::Resized(size) => {
                self.render_config.window_width = size.width.max(1);
                self.render_config.window_height = size.height.max(1);
                if let Some(render_system) = &mut self.render_system {
                    render_system.resize(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => {
                self.render_frame();

                if let Some(ref recording) = self.recording {
                    if self.frame_num >= recording.total_frames() {
                        log::info!("recording finished after {} frames", self.frame_num);
                        event_loop.exit();
                    }
                }
            }
            _ => {}
        }
    }
}

impl App {
    /// Render a single frame
    fn render_frame(&mut self) {
        let Some(ref render_system) = self.render_system else {
            return;
        };

        // Get current time
        let time_s = self.start_time.elapsed().as_secs_f32();

        // Current spectrum drives the particle displacement
        let spectrum = self.audio.spectrum();
        self.particles.update(&spectrum);

        if self.audio.is_finished() && !self.reported_finished {
            self.reported_finished = true;
            log::info!("playback finished; cloud settles at rest");
        }

        // Overall level tints the background
        let level = if spectrum.is_empty() {
            0.0
        } else {
            spectrum.iter().sum::<f32>() / spectrum.len() as f32
        };

        // Update camera
        let (view_proj, _camera_pos) = self
            .camera
            .create_view_proj_matrix(time_s, &self.render_config);
        let (right, up) = self.camera.billboard_axes(time_s);

        // Upload per-frame particle data
        render_system.update_instances(&self.particles.instances);

        render_system.update_scene_uniforms(&SceneUniforms {
            view_proj: view_proj.to_cols_array_2d(),
            camera_right: [right.x, right.y, right.z, 0.0],
            camera_up: [up.x, up.y, up.z, 0.0],
            particle_size: self.field.particle_size_m,
            brightness_gain: self.mapping.brightness_gain,
            time: time_s,
            _padding: 0.0,
        });

        render_system.update_background_uniforms(&BackgroundUniforms {
            time: time_s,
            level,
            _padding: [0.0; 2],
        });

        // Render
        if let Err(e) = render_system.render(self.frame_num) {
            log::error!("render error: {:?}", e);
        }
        self.frame_num += 1;
    }
}

fn main() {
    env_logger::init();

    let args = Args::parse();

    println!("Pulsefield - audio-reactive particle visualizer");

    // Playback must be up before the render loop starts; a failure is
    // reported to the user and the loop never runs.
    let audio = match AudioSystem::start(&args.audio, FftConfig::default()) {
        Ok(audio) => audio,
        Err(e) => {
            eprintln!("Cannot play {}: {}", args.audio.display(), e);
            std::process::exit(1);
        }
    };

    log::info!(
        "playing {} ({:.1}s)",
        args.audio.display(),
        audio.duration_secs()
    );

    let mut app = App::new(&args, audio);

    println!("\nPulsefield is running!");
    println!("Press ESC to quit\n");

    let event_loop = EventLoop::new().unwrap();
    let _ = event_loop.run_app(&mut app);
}
