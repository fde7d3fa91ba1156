//! Particle cloud with spectrum-driven radial displacement.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::params::{DisplacementMapping, ParticleField};

/// Per-instance data for the particle pipeline (position + magnitude)
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct ParticleInstance {
    pub position: [f32; 3],
    pub intensity: f32,
}

/// Particle cloud: immutable initial positions plus the per-frame
/// instance buffer uploaded to the GPU.
pub struct ParticleCloud {
    /// Initial positions, sampled once (never mutated after `new`)
    initial: Vec<Vec3>,
    /// Current per-frame instance data
    pub instances: Vec<ParticleInstance>,
    mapping: DisplacementMapping,
}

impl ParticleCloud {
    /// Create a new cloud with positions sampled from a pseudo-spherical
    /// distribution (uniform directions, jittered shell radius).
    /// Deterministic for a given seed.
    pub fn new(field: &ParticleField, mapping: DisplacementMapping) -> Self {
        let mut rng = StdRng::seed_from_u64(field.seed);
        let mut initial = Vec::with_capacity(field.count);

        for _ in 0..field.count {
            // Uniform direction on the unit sphere
            let z: f32 = rng.gen_range(-1.0..=1.0);
            let phi: f32 = rng.gen_range(0.0..std::f32::consts::TAU);
            let ring = (1.0 - z * z).max(0.0).sqrt();
            let dir = Vec3::new(ring * phi.cos(), ring * phi.sin(), z);

            // Jittered shell radius
            let jitter = 1.0 + field.radius_jitter * rng.gen_range(-1.0..=1.0);
            initial.push(dir * field.base_radius_m * jitter);
        }

        Self::from_positions(initial, mapping)
    }

    /// Create a cloud from explicit initial positions
    pub fn from_positions(initial: Vec<Vec3>, mapping: DisplacementMapping) -> Self {
        let instances = initial
            .iter()
            .map(|p| ParticleInstance {
                position: p.to_array(),
                intensity: 0.0,
            })
            .collect();

        Self {
            initial,
            instances,
            mapping,
        }
    }

    pub fn count(&self) -> usize {
        self.initial.len()
    }

    /// Initial position of particle `i`
    pub fn initial_position(&self, i: usize) -> Vec3 {
        self.initial[i]
    }

    /// Apply the per-frame frequency-to-displacement mapping.
    ///
    /// Particle `i` reads bin `floor(i / N * len)` of the spectrum,
    /// whose magnitudes are normalized to [0, 1], and moves to
    /// `initial * (1 + magnitude * displacement_gain)`. Stateless: the
    /// same spectrum always produces the same positions.
    pub fn update(&mut self, spectrum: &[f32]) {
        let count = self.initial.len();
        for (i, (init, inst)) in self.initial.iter().zip(self.instances.iter_mut()).enumerate() {
            let magnitude = if spectrum.is_empty() {
                0.0
            } else {
                spectrum[i * spectrum.len() / count].clamp(0.0, 1.0)
            };

            let displacement = 1.0 + magnitude * self.mapping.displacement_gain;
            inst.position = (*init * displacement).to_array();
            inst.intensity = magnitude;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cloud(positions: Vec<Vec3>) -> ParticleCloud {
        ParticleCloud::from_positions(positions, DisplacementMapping::default())
    }

    #[test]
    fn test_cloud_creation_is_seed_deterministic() {
        let field = ParticleField::default();
        let a = ParticleCloud::new(&field, DisplacementMapping::default());
        let b = ParticleCloud::new(&field, DisplacementMapping::default());
        assert_eq!(a.count(), field.count);
        assert_eq!(a.instances, b.instances);

        let other = ParticleField {
            seed: 7,
            ..Default::default()
        };
        let c = ParticleCloud::new(&other, DisplacementMapping::default());
        assert_ne!(a.instances, c.instances);
    }

    #[test]
    fn test_displacement_is_at_least_one() {
        let field = ParticleField {
            count: 64,
            ..Default::default()
        };
        let mut cloud = ParticleCloud::new(&field, DisplacementMapping::default());
        let spectrum: Vec<f32> = (0..128).map(|i| (i % 5) as f32 / 4.0).collect();
        cloud.update(&spectrum);

        for i in 0..cloud.count() {
            let init = cloud.initial_position(i);
            let current = Vec3::from_array(cloud.instances[i].position);
            assert!(
                current.length() >= init.length() - 1e-4,
                "particle {} moved inward: |{}| < |{}|",
                i,
                current.length(),
                init.length()
            );
            // Positive scalar multiple: current stays on the initial ray
            assert!(current.dot(init) >= 0.0);
            assert!(init.cross(current).length() < 1e-3 * init.length() * current.length());
        }
    }

    #[test]
    fn test_origin_particle_never_moves() {
        let mut cloud = test_cloud(vec![Vec3::ZERO, Vec3::new(10.0, 0.0, 0.0)]);
        cloud.update(&[1.0, 1.0]);
        assert_eq!(cloud.instances[0].position, [0.0, 0.0, 0.0]);
        assert!(cloud.instances[1].position[0] > 10.0);
    }

    #[test]
    fn test_constant_spectrum_is_frame_stable() {
        let field = ParticleField {
            count: 32,
            ..Default::default()
        };
        let mut cloud = ParticleCloud::new(&field, DisplacementMapping::default());
        let spectrum = vec![0.5; 512];

        cloud.update(&spectrum);
        let first = cloud.instances.clone();
        cloud.update(&spectrum);
        assert_eq!(cloud.instances, first);
    }

    #[test]
    fn test_zero_spectrum_restores_initial_positions() {
        let mut cloud = test_cloud(vec![Vec3::new(1.0, 2.0, 3.0)]);
        cloud.update(&[1.0]);
        cloud.update(&[0.0]);
        assert_eq!(cloud.instances[0].position, [1.0, 2.0, 3.0]);
        assert_eq!(cloud.instances[0].intensity, 0.0);
    }

    #[test]
    fn test_empty_spectrum_leaves_cloud_at_rest() {
        let mut cloud = test_cloud(vec![Vec3::new(0.0, 5.0, 0.0)]);
        cloud.update(&[]);
        assert_eq!(cloud.instances[0].position, [0.0, 5.0, 0.0]);
    }

    #[test]
    fn test_bin_selection_stays_in_bounds() {
        // Spectrum shorter, equal, and longer than the particle count
        for len in [3usize, 7, 64] {
            let positions = (0..7).map(|i| Vec3::splat(i as f32)).collect();
            let mut cloud = test_cloud(positions);
            let spectrum = vec![1.0; len];
            cloud.update(&spectrum); // would panic on an out-of-range bin
            let last = cloud.count() - 1;
            assert!(cloud.instances[last].intensity == 1.0);
        }
    }
}
