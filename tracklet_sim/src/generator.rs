//! Seeded event generator.
//!
//! Produces displaced charged particles and noise hits, intersects the
//! particles with the barrel layers and disks, and quantizes every hit to
//! sector-local [`Stub`]s. All randomness comes from one `ChaCha8Rng`.

use std::f64::consts::TAU;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal, Uniform};
use serde::{Deserialize, Serialize};
use tracing::trace;

use tracklet_core::{LayerDisk, Settings, Stub};

use crate::error::SimError;

/// Curvature per unit 1/pT in the 3.8 T field (1/cm per 1/GeV).
const CURVATURE_PER_INV_PT: f64 = 0.01 * 0.3 * 3.8;

/// Generator parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Particles per event
    pub particles: usize,

    /// Number of jets the particles are grouped in (0 = isotropic)
    pub jets: usize,

    /// Angular spread of particles around a jet axis (rad, and in eta)
    pub jet_spread: f64,

    /// Minimum pT (GeV)
    pub pt_min: f64,

    /// Maximum pT (GeV)
    pub pt_max: f64,

    /// Transverse impact parameter spread (cm)
    pub d0_sigma: f64,

    /// Longitudinal vertex spread (cm)
    pub z0_sigma: f64,

    pub eta_max: f64,

    /// Random hits per layer/disk and side
    pub noise_per_layer: usize,

    /// Radial (barrel) and longitudinal (disk) sensor offset range in LSBs
    pub position_smear: i64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            particles: 1,
            jets: 0,
            jet_spread: 0.05,
            pt_min: 3.0,
            pt_max: 50.0,
            d0_sigma: 0.5,
            z0_sigma: 5.0,
            eta_max: 2.0,
            noise_per_layer: 0,
            position_smear: 8,
        }
    }
}

/// A generated charged particle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Particle {
    pub id: usize,
    /// Transverse momentum (GeV)
    pub pt: f64,
    pub charge: i8,
    /// Azimuth at the point of closest approach (rad, 0..2pi)
    pub phi0: f64,
    /// Signed transverse impact parameter (cm)
    pub d0: f64,
    /// Longitudinal vertex (cm)
    pub z0: f64,
    pub eta: f64,
}

impl Particle {
    /// Signed curvature (1/cm).
    pub fn rinv(&self) -> f64 {
        self.charge as f64 * CURVATURE_PER_INV_PT / self.pt
    }

    /// tan(lambda) = dz/dr.
    pub fn tan_lambda(&self) -> f64 {
        self.eta.sinh()
    }

    /// Azimuth where the particle crosses radius `r`, if it reaches it.
    pub fn phi_at(&self, r: f64) -> Option<f64> {
        let arg = self.rinv() * r / 2.0 + self.d0 / r;
        (arg.abs() < 1.0).then(|| (self.phi0 - arg.asin()).rem_euclid(TAU))
    }

    pub fn z_at(&self, r: f64) -> f64 {
        self.z0 + self.tan_lambda() * r
    }
}

/// A stub with its sector and generating particle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeneratedStub {
    pub sector: u32,
    pub stub: Stub,
    /// `None` for noise
    pub particle: Option<usize>,
}

/// One generated event.
#[derive(Debug, Clone)]
pub struct Event {
    pub index: u64,
    pub particles: Vec<Particle>,
    pub stubs: Vec<GeneratedStub>,
}

impl Event {
    /// Stubs of one sector, in generation order.
    pub fn sector_stubs(&self, sector: u32) -> impl Iterator<Item = &GeneratedStub> {
        self.stubs.iter().filter(move |s| s.sector == sector)
    }
}

/// Deterministic event source.
pub struct EventGenerator {
    config: GeneratorConfig,
    rng: ChaCha8Rng,
    next_event: u64,
}

impl EventGenerator {
    pub fn new(seed: u64, config: GeneratorConfig) -> Self {
        Self {
            config,
            rng: ChaCha8Rng::seed_from_u64(seed),
            next_event: 0,
        }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Generates the next event.
    pub fn generate(&mut self, settings: &Settings) -> Result<Event, SimError> {
        let particles = self.generate_particles()?;
        let mut stubs = Vec::new();

        for particle in &particles {
            for layer_disk in LayerDisk::ALL {
                if let Some((phi, stub)) = self.intersect(settings, particle, layer_disk)? {
                    push_sectors(settings, phi, stub, Some(particle.id), &mut stubs)?;
                }
            }
        }

        for layer_disk in LayerDisk::ALL {
            for _ in 0..self.config.noise_per_layer {
                let (phi, stub) = self.noise_stub(settings, layer_disk)?;
                push_sectors(settings, phi, stub, None, &mut stubs)?;
            }
        }

        let index = self.next_event;
        self.next_event += 1;
        trace!(event = index, particles = particles.len(), stubs = stubs.len(), "Generated event");
        Ok(Event {
            index,
            particles,
            stubs,
        })
    }

    fn generate_particles(&mut self) -> Result<Vec<Particle>, SimError> {
        let c = &self.config;
        if c.pt_min <= 0.0 || c.pt_max < c.pt_min || c.eta_max <= 0.0 {
            return Err(SimError::Config(format!(
                "invalid generator ranges: pt [{}, {}], eta {}",
                c.pt_min, c.pt_max, c.eta_max
            )));
        }
        let inv_pt = Uniform::new_inclusive(1.0 / c.pt_max, 1.0 / c.pt_min);
        let phi = Uniform::new(0.0, TAU);
        let eta = Uniform::new_inclusive(-c.eta_max, c.eta_max);
        let d0 = normal(c.d0_sigma)?;
        let z0 = normal(c.z0_sigma)?;
        let spread = normal(c.jet_spread)?;

        let axes: Vec<(f64, f64)> = (0..c.jets)
            .map(|_| (phi.sample(&mut self.rng), eta.sample(&mut self.rng) * 0.8))
            .collect();

        let mut particles = Vec::with_capacity(c.particles);
        for id in 0..c.particles {
            let (particle_phi, particle_eta) = if axes.is_empty() {
                (phi.sample(&mut self.rng), eta.sample(&mut self.rng))
            } else {
                let (axis_phi, axis_eta) = axes[id % axes.len()];
                (
                    (axis_phi + spread.sample(&mut self.rng)).rem_euclid(TAU),
                    (axis_eta + spread.sample(&mut self.rng)).clamp(-c.eta_max, c.eta_max),
                )
            };
            particles.push(Particle {
                id,
                pt: 1.0 / inv_pt.sample(&mut self.rng),
                charge: if self.rng.gen_bool(0.5) { 1 } else { -1 },
                phi0: particle_phi,
                d0: d0.sample(&mut self.rng),
                z0: z0.sample(&mut self.rng),
                eta: particle_eta,
            });
        }
        Ok(particles)
    }

    /// Global phi and quantized stub where `particle` crosses `layer_disk`.
    fn intersect(
        &mut self,
        settings: &Settings,
        particle: &Particle,
        layer_disk: LayerDisk,
    ) -> Result<Option<(f64, Stub)>, SimError> {
        let smear = self.config.position_smear;
        let offset = if smear > 0 {
            self.rng.gen_range(-smear..=smear)
        } else {
            0
        };

        if layer_disk.is_barrel() {
            let r_int = settings.barrel_radius_int(layer_disk) as i64 + offset;
            let r = r_int as f64 * settings.kr;
            let z = particle.z_at(r);
            if z.abs() >= settings.barrel_half_length {
                return Ok(None);
            }
            let Some(phi) = particle.phi_at(r) else {
                return Ok(None);
            };
            let z_int = (z / settings.kz).round() as i64;
            // Phi is filled in per sector
            let stub = Stub::barrel(settings, layer_disk, 0, offset, z_int)?;
            Ok(Some((phi, stub)))
        } else {
            let t = particle.tan_lambda();
            if t == 0.0 {
                return Ok(None);
            }
            let z_abs_int = settings.disk_z_int(layer_disk) as i64 + offset;
            let z = (z_abs_int as f64 * settings.kz).copysign(t);
            let r = (z - particle.z0) / t;
            if r < settings.disk_rmin || r > settings.disk_rmax {
                return Ok(None);
            }
            let Some(phi) = particle.phi_at(r) else {
                return Ok(None);
            };
            let r_int = (r / settings.kr).round() as i64;
            let stub = Stub::disk(settings, layer_disk, 0, r_int, offset, t < 0.0)?;
            Ok(Some((phi, stub)))
        }
    }

    fn noise_stub(&mut self, settings: &Settings, layer_disk: LayerDisk) -> Result<(f64, Stub), SimError> {
        let phi = self.rng.gen_range(0.0..TAU);
        let smear = self.config.position_smear.max(0);
        let offset = self.rng.gen_range(-smear..=smear);
        let stub = if layer_disk.is_barrel() {
            let zl = settings.zlength_int() as i64;
            let z = self.rng.gen_range(-zl + 1..zl);
            Stub::barrel(settings, layer_disk, 0, offset, z)?
        } else {
            let r = self
                .rng
                .gen_range(settings.disk_rmin_int() as i64..=settings.disk_rmax_int() as i64);
            let negative = self.rng.gen_bool(0.5);
            Stub::disk(settings, layer_disk, 0, r, offset, negative)?
        };
        Ok((phi, stub))
    }
}

fn normal(sigma: f64) -> Result<Normal<f64>, SimError> {
    Normal::new(0.0, sigma).map_err(|e| SimError::Config(format!("normal({}): {}", sigma, e)))
}

/// Copies `stub` into every sector whose overlapping phi range holds `phi`,
/// with the sector-local phi word.
fn push_sectors(
    settings: &Settings,
    phi: f64,
    stub: Stub,
    particle: Option<usize>,
    out: &mut Vec<GeneratedStub>,
) -> Result<(), SimError> {
    let kphi = settings.kphi();
    let nphi = 1i64 << settings.nbits_phi;
    for sector in 0..settings.n_sectors {
        let (origin, _) = settings.sector_phi_range(sector);
        let local = (phi - origin).rem_euclid(TAU);
        let phi_int = (local / kphi).floor() as i64;
        if phi_int >= nphi {
            continue;
        }
        let stub = with_phi(settings, &stub, phi_int)?;
        out.push(GeneratedStub {
            sector,
            stub,
            particle,
        });
    }
    Ok(())
}

fn with_phi(settings: &Settings, stub: &Stub, phi: i64) -> Result<Stub, SimError> {
    let layer_disk = stub.layer_disk();
    let stub = if layer_disk.is_barrel() {
        Stub::barrel(settings, layer_disk, phi, stub.r().value() as i64, stub.z().value() as i64)?
    } else {
        Stub::disk(
            settings,
            layer_disk,
            phi,
            stub.r().value() as i64,
            stub.z().value() as i64,
            stub.negative_z(),
        )?
    };
    Ok(stub)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::f64::consts::PI;

    #[test]
    fn test_same_seed_same_event() {
        let settings = Settings::default();
        let config = GeneratorConfig {
            particles: 5,
            noise_per_layer: 2,
            ..Default::default()
        };
        let mut a = EventGenerator::new(7, config.clone());
        let mut b = EventGenerator::new(7, config);
        let event_a = a.generate(&settings).unwrap();
        let event_b = b.generate(&settings).unwrap();
        assert_eq!(event_a.particles, event_b.particles);
        assert_eq!(event_a.stubs, event_b.stubs);
    }

    #[test]
    fn test_prompt_central_particle_hits_all_barrel_layers() {
        let settings = Settings::default();
        let particle = Particle {
            id: 0,
            pt: 10.0,
            charge: 1,
            phi0: 1.0,
            d0: 0.0,
            z0: 0.0,
            eta: 0.1,
        };
        let mut generator = EventGenerator::new(
            1,
            GeneratorConfig {
                position_smear: 0,
                ..Default::default()
            },
        );
        let barrel_hits = LayerDisk::ALL
            .into_iter()
            .filter(|ld| ld.is_barrel())
            .filter(|&ld| generator.intersect(&settings, &particle, ld).unwrap().is_some())
            .count();
        assert_eq!(barrel_hits, 6);
        let disk_hits = LayerDisk::ALL
            .into_iter()
            .filter(|ld| ld.is_disk())
            .filter(|&ld| generator.intersect(&settings, &particle, ld).unwrap().is_some())
            .count();
        assert_eq!(disk_hits, 0);
    }

    #[test]
    fn test_stubs_land_in_overlapping_sectors() {
        let settings = Settings::default();
        let stub = Stub::barrel(&settings, LayerDisk::L3, 0, 0, 0).unwrap();
        let mut out = Vec::new();
        // Just inside sector 1, within the overlap of sector 0
        let phi = settings.dphi_sector() + 0.01;
        push_sectors(&settings, phi, stub, None, &mut out).unwrap();
        let sectors: Vec<u32> = out.iter().map(|s| s.sector).collect();
        assert_eq!(sectors, vec![0, 1]);
    }

    #[test]
    fn test_phi_at_includes_curvature_and_displacement() {
        let particle = Particle {
            id: 0,
            pt: 2.0,
            charge: 1,
            phi0: PI,
            d0: 1.0,
            z0: 0.0,
            eta: 0.0,
        };
        let phi = particle.phi_at(50.0).unwrap();
        let expected = PI - (particle.rinv() * 25.0 + 0.02).asin();
        assert!((phi - expected).abs() < 1e-12);
        assert!(particle.phi_at(0.5).is_none());
    }

    proptest! {
        #[test]
        fn prop_generated_stubs_fit_their_words(seed in 0u64..1_000, d0_sigma in 0.0f64..5.0) {
            let settings = Settings::default();
            let mut generator = EventGenerator::new(seed, GeneratorConfig {
                particles: 8,
                d0_sigma,
                eta_max: 2.4,
                noise_per_layer: 1,
                ..Default::default()
            });
            let event = generator.generate(&settings).unwrap();
            for generated in &event.stubs {
                prop_assert!(generated.sector < settings.n_sectors);
                prop_assert!(generated.stub.matches_settings(&settings));
                prop_assert!(generated.particle.map_or(true, |p| p < 8));
            }
        }
    }
}
