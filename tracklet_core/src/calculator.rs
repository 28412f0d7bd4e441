//! Tracklet parameter calculation.
//!
//! The displaced calculator fits `phi(r) = phi0 + B*r + C/r` exactly through
//! the three stubs of a triplet and a straight r-z line through the first
//! two. All arithmetic is integer with explicit 64-bit products; `1/r` comes
//! from the inverse-radius LUT.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::TrackletError;
use crate::geometry::LayerDisk;
use crate::lut::TrackletLut;
use crate::settings::{PhiWindow, Settings, B_SHIFT, C_SHIFT, T_SHIFT};
use crate::stub::Stub;
use crate::tracklet::{ProjectionPoint, TrackletParams};
use crate::word::FixedWord;

/// Why a triplet did not become a tracklet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RejectReason {
    /// Zero determinant or zero radial separation
    Degenerate,
    /// A radius outside the inverse-radius table
    NoInverseRadius,
    Rinv,
    D0,
    Z0,
    T,
    /// phi0 outside the execute window
    Phi0,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            RejectReason::Degenerate => "degenerate geometry",
            RejectReason::NoInverseRadius => "no inverse radius",
            RejectReason::Rinv => "rinv out of range",
            RejectReason::D0 => "d0 out of range",
            RejectReason::Z0 => "z0 out of range",
            RejectReason::T => "t out of range",
            RejectReason::Phi0 => "phi0 outside window",
        };
        f.write_str(text)
    }
}

/// Outcome of a parameter calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Calculation {
    Accepted(TrackletParams),
    Rejected(RejectReason),
}

/// Computes tracklet parameters and projections from triplets.
pub trait ParameterCalculator {
    /// Fits a triplet `[inner, outer, third]`. Rejections are not errors;
    /// errors mean inconsistent settings.
    fn calculate(&self, stubs: [&Stub; 3], window: PhiWindow) -> Result<Calculation, TrackletError>;

    /// Intersection with a downstream layer/disk, or `None` outside its
    /// acceptance.
    fn project(
        &self,
        params: &TrackletParams,
        target: LayerDisk,
    ) -> Result<Option<ProjectionPoint>, TrackletError>;
}

/// Integer calculator for displaced seeds.
#[derive(Debug, Clone)]
pub struct DisplacedCalculator {
    settings: Arc<Settings>,
    inv_r: TrackletLut,
}

impl DisplacedCalculator {
    pub fn new(settings: Arc<Settings>) -> Result<Self, TrackletError> {
        let inv_r = TrackletLut::inverse_r(&settings)?;
        Ok(Self { settings, inv_r })
    }

    fn inverse_r(&self, r: i64) -> Result<Option<i64>, TrackletError> {
        if r < 0 {
            return Ok(None);
        }
        Ok(self.inv_r.lookup(r as u32)?.map(i64::from))
    }
}

impl ParameterCalculator for DisplacedCalculator {
    fn calculate(&self, stubs: [&Stub; 3], window: PhiWindow) -> Result<Calculation, TrackletError> {
        let s = &*self.settings;
        let r = stubs.map(|stub| stub.r_abs(s) as i64);
        let z = stubs.map(|stub| stub.z_abs(s) as i64);
        let p = stubs.map(|stub| stub.phi().value() as i64);

        let mut u = [0i64; 3];
        for (ui, &ri) in u.iter_mut().zip(&r) {
            match self.inverse_r(ri)? {
                Some(inv) => *ui = inv,
                None => return Ok(Calculation::Rejected(RejectReason::NoInverseRadius)),
            }
        }

        let (dr1, dr2) = (r[1] - r[0], r[2] - r[0]);
        let (du1, du2) = (u[1] - u[0], u[2] - u[0]);
        let (dp1, dp2) = (p[1] - p[0], p[2] - p[0]);

        let det = dr1 * du2 - dr2 * du1;
        if det == 0 || dr1 == 0 {
            return Ok(Calculation::Rejected(RejectReason::Degenerate));
        }

        let b = ((dp1 * du2 - dp2 * du1) << B_SHIFT) / det;
        let c = ((dr1 * dp2 - dr2 * dp1) << C_SHIFT) / det;
        let rinv = -2 * b;
        let d0 = -c;
        let phi0 = p[0] - ((b * r[0]) >> B_SHIFT) - ((c * u[0]) >> C_SHIFT);

        let t = ((z[1] - z[0]) << T_SHIFT) / dr1;
        let z0 = z[0] - ((t * r[0]) >> T_SHIFT);

        let rejection = if rinv.abs() > s.rinv_max_int() {
            Some(RejectReason::Rinv)
        } else if d0.abs() > s.d0_max_int() {
            Some(RejectReason::D0)
        } else if z0.abs() > s.z0_max_int() {
            Some(RejectReason::Z0)
        } else if t.abs() > s.t_max_int() {
            Some(RejectReason::T)
        } else if !window.contains(phi0) {
            Some(RejectReason::Phi0)
        } else {
            None
        };
        if let Some(reason) = rejection {
            return Ok(Calculation::Rejected(reason));
        }

        Ok(Calculation::Accepted(TrackletParams {
            rinv: FixedWord::signed(rinv, s.nbits_rinv)?,
            phi0: FixedWord::signed(phi0, s.nbits_phi0)?,
            d0: FixedWord::signed(d0, s.nbits_d0)?,
            z0: FixedWord::signed(z0, s.nbits_z0)?,
            t: FixedWord::signed(t, s.nbits_t)?,
        }))
    }

    fn project(
        &self,
        params: &TrackletParams,
        target: LayerDisk,
    ) -> Result<Option<ProjectionPoint>, TrackletError> {
        let s = &*self.settings;
        let b = -(params.rinv.value() as i64) / 2;
        let c = -(params.d0.value() as i64);
        let phi0 = params.phi0.value() as i64;
        let z0 = params.z0.value() as i64;
        let t = params.t.value() as i64;

        let (radius, rz) = if target.is_barrel() {
            let radius = s.barrel_radius_int(target) as i64;
            let z = z0 + ((t * radius) >> T_SHIFT);
            if z.abs() >= s.zlength_int() as i64 {
                return Ok(None);
            }
            (radius, FixedWord::signed(z, s.nbits_z_barrel)?)
        } else {
            if t == 0 {
                return Ok(None);
            }
            let disk_z = s.disk_z_int(target) as i64;
            let z_target = if t < 0 { -disk_z } else { disk_z };
            let radius = ((z_target - z0) << T_SHIFT) / t;
            if radius < s.disk_rmin_int() as i64 || radius > s.disk_rmax_int() as i64 {
                return Ok(None);
            }
            (radius, FixedWord::unsigned(radius, s.nbits_r_disk)?)
        };

        let Some(u) = self.inverse_r(radius)? else {
            return Ok(None);
        };
        let phi = phi0 + ((b * radius) >> B_SHIFT) + ((c * u) >> C_SHIFT);
        if phi < 0 || phi >> s.nbits_phi != 0 {
            return Ok(None);
        }

        Ok(Some(ProjectionPoint {
            target,
            phi: FixedWord::unsigned(phi, s.nbits_phi)?,
            rz,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calculator() -> (Arc<Settings>, DisplacedCalculator) {
        let settings = Arc::new(Settings::default());
        let calculator = DisplacedCalculator::new(settings.clone()).unwrap();
        (settings, calculator)
    }

    fn full_window(settings: &Settings) -> PhiWindow {
        PhiWindow {
            lo: 0,
            hi: (1 << settings.nbits_phi) - 1,
        }
    }

    fn l3l4l2_triplet(settings: &Settings) -> [Stub; 3] {
        [
            Stub::barrel(settings, LayerDisk::L3, 100, 0, 166).unwrap(),
            Stub::barrel(settings, LayerDisk::L4, 102, 0, 220).unwrap(),
            Stub::barrel(settings, LayerDisk::L2, 99, 0, 118).unwrap(),
        ]
    }

    #[test]
    fn test_three_point_fit() {
        let (settings, calculator) = calculator();
        let [a, b, c] = l3l4l2_triplet(&settings);
        let result = calculator
            .calculate([&a, &b, &c], full_window(&settings))
            .unwrap();
        let Calculation::Accepted(params) = result else {
            panic!("expected acceptance, got {:?}", result);
        };
        assert_eq!(params.rinv.value(), -46);
        assert_eq!(params.d0.value(), -1);
        assert_eq!(params.phi0.value(), 89);
        assert_eq!(params.t.value(), 104);
        assert_eq!(params.z0.value(), -3);
    }

    #[test]
    fn test_phi0_outside_window_rejected() {
        let (settings, calculator) = calculator();
        let [a, b, c] = l3l4l2_triplet(&settings);
        let window = PhiWindow { lo: 200, hi: 400 };
        assert_eq!(
            calculator.calculate([&a, &b, &c], window).unwrap(),
            Calculation::Rejected(RejectReason::Phi0)
        );
    }

    #[test]
    fn test_collinear_radii_are_degenerate() {
        let (settings, calculator) = calculator();
        let a = Stub::barrel(&settings, LayerDisk::L3, 100, 0, 166).unwrap();
        let b = Stub::barrel(&settings, LayerDisk::L3, 102, 0, 220).unwrap();
        let c = Stub::barrel(&settings, LayerDisk::L2, 99, 0, 118).unwrap();
        assert_eq!(
            calculator.calculate([&a, &b, &c], full_window(&settings)).unwrap(),
            Calculation::Rejected(RejectReason::Degenerate)
        );
    }

    #[test]
    fn test_steep_curvature_rejected() {
        let (settings, calculator) = calculator();
        let a = Stub::barrel(&settings, LayerDisk::L3, 4000, 0, 166).unwrap();
        let b = Stub::barrel(&settings, LayerDisk::L4, 5500, 0, 220).unwrap();
        let c = Stub::barrel(&settings, LayerDisk::L2, 2700, 0, 118).unwrap();
        assert!(matches!(
            calculator.calculate([&a, &b, &c], full_window(&settings)).unwrap(),
            Calculation::Rejected(RejectReason::Rinv | RejectReason::D0)
        ));
    }

    #[test]
    fn test_far_z0_rejected() {
        let (settings, calculator) = calculator();
        let a = Stub::barrel(&settings, LayerDisk::L3, 100, 0, 1000).unwrap();
        let b = Stub::barrel(&settings, LayerDisk::L4, 102, 0, 1100).unwrap();
        let c = Stub::barrel(&settings, LayerDisk::L2, 99, 0, 900).unwrap();
        assert_eq!(
            calculator.calculate([&a, &b, &c], full_window(&settings)).unwrap(),
            Calculation::Rejected(RejectReason::Z0)
        );
    }

    #[test]
    fn test_barrel_projection() {
        let (settings, calculator) = calculator();
        let [a, b, c] = l3l4l2_triplet(&settings);
        let Calculation::Accepted(params) = calculator
            .calculate([&a, &b, &c], full_window(&settings))
            .unwrap()
        else {
            panic!("expected acceptance");
        };
        let point = calculator.project(&params, LayerDisk::L5).unwrap().unwrap();
        assert_eq!(point.phi.value(), 104);
        assert_eq!(point.rz.value(), 257);
        // t = 104 never reaches the disks inside the disk radii
        assert!(calculator.project(&params, LayerDisk::D1).unwrap().is_none());
    }

    #[test]
    fn test_disk_projection_on_tracklet_side() {
        let (settings, calculator) = calculator();
        let params = TrackletParams {
            rinv: FixedWord::signed(0, settings.nbits_rinv).unwrap(),
            phi0: FixedWord::signed(5000, settings.nbits_phi0).unwrap(),
            d0: FixedWord::signed(0, settings.nbits_d0).unwrap(),
            z0: FixedWord::signed(0, settings.nbits_z0).unwrap(),
            t: FixedWord::signed(-2048, settings.nbits_t).unwrap(),
        };
        // |z| = 2099 at t = -2: r = 2099 * 1024 / 2048
        let point = calculator.project(&params, LayerDisk::D1).unwrap().unwrap();
        assert_eq!(point.rz.value(), 1049);
        assert_eq!(point.phi.value(), 5000);
        assert!(!point.rz.is_signed());
    }
}
