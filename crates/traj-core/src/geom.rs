//! Rigid-body superposition kernels.
//!
//! All kernels work in `f64` on coordinates centered at their geometric
//! center. Optimal rotations come from the SVD of the 3x3 covariance matrix
//! (Kabsch); when the optimal orthogonal matrix is a reflection the smallest
//! singular direction is flipped so the result is always a proper rotation.

use nalgebra::{Matrix3, Vector3};

use crate::error::{TrajError, TrajResult};

pub fn to_vectors(coords: &[[f32; 4]]) -> Vec<Vector3<f64>> {
    coords
        .iter()
        .map(|p| Vector3::new(p[0] as f64, p[1] as f64, p[2] as f64))
        .collect()
}

pub fn centroid(points: &[Vector3<f64>]) -> Vector3<f64> {
    let mut c = Vector3::new(0.0, 0.0, 0.0);
    if points.is_empty() {
        return c;
    }
    for p in points {
        c += p;
    }
    c / (points.len() as f64)
}

/// Coordinates translated to their centroid, with the cached sum of squared
/// norms needed by the closed-form Kabsch RMSD.
#[derive(Debug, Clone)]
pub struct CenteredCoords {
    pub points: Vec<Vector3<f64>>,
    pub center: Vector3<f64>,
    pub sum_sq: f64,
}

impl CenteredCoords {
    pub fn from_coords(coords: &[[f32; 4]]) -> Self {
        let mut points = to_vectors(coords);
        let center = centroid(&points);
        let mut sum_sq = 0.0f64;
        for p in points.iter_mut() {
            *p -= center;
            sum_sq += p.dot(p);
        }
        Self {
            points,
            center,
            sum_sq,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

fn covariance(mobile: &CenteredCoords, target: &CenteredCoords) -> Matrix3<f64> {
    let mut h = Matrix3::<f64>::zeros();
    for (px, py) in mobile.points.iter().zip(target.points.iter()) {
        h += px * py.transpose();
    }
    h
}

/// Minimized RMSD between two centered coordinate sets of equal length.
pub fn kabsch_rmsd_centered(a: &CenteredCoords, b: &CenteredCoords) -> f64 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let svd = covariance(a, b).svd(true, true);
    let mut sigma_sum = svd.singular_values[0] + svd.singular_values[1] + svd.singular_values[2];
    if let (Some(u), Some(v_t)) = (svd.u, svd.v_t) {
        let det = (v_t.transpose() * u.transpose()).determinant();
        if det < 0.0 {
            sigma_sum -= 2.0 * svd.singular_values[2];
        }
    }
    let n = a.len() as f64;
    let rmsd2 = (a.sum_sq + b.sum_sq - 2.0 * sigma_sum) / n;
    if rmsd2 <= 0.0 {
        0.0
    } else {
        rmsd2.sqrt()
    }
}

pub fn kabsch_rmsd(a: &[[f32; 4]], b: &[[f32; 4]]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }
    kabsch_rmsd_centered(&CenteredCoords::from_coords(a), &CenteredCoords::from_coords(b))
}

/// Coordinate RMSD without any superposition.
pub fn rmsd_nofit(a: &[[f32; 4]], b: &[[f32; 4]]) -> f64 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let mut sum = 0.0f64;
    for (p, q) in a.iter().zip(b.iter()) {
        let dx = p[0] as f64 - q[0] as f64;
        let dy = p[1] as f64 - q[1] as f64;
        let dz = p[2] as f64 - q[2] as f64;
        sum += dx * dx + dy * dy + dz * dz;
    }
    (sum / a.len() as f64).sqrt()
}

/// Rigid transform mapping a mobile structure onto a target.
#[derive(Debug, Clone, Copy)]
pub struct Superposition {
    pub rotation: Matrix3<f64>,
    pub mobile_center: Vector3<f64>,
    pub target_center: Vector3<f64>,
}

impl Superposition {
    pub fn identity() -> Self {
        Self {
            rotation: Matrix3::identity(),
            mobile_center: Vector3::zeros(),
            target_center: Vector3::zeros(),
        }
    }

    pub fn apply(&self, p: [f32; 4]) -> [f32; 4] {
        let x = Vector3::new(p[0] as f64, p[1] as f64, p[2] as f64);
        let y = self.rotation * (x - self.mobile_center) + self.target_center;
        [y[0] as f32, y[1] as f32, y[2] as f32, p[3]]
    }
}

/// Optimal rotation + translation taking `mobile` onto `target`.
pub fn superpose(mobile: &[[f32; 4]], target: &[[f32; 4]]) -> TrajResult<Superposition> {
    if mobile.len() != target.len() {
        return Err(TrajError::Mismatch(format!(
            "superposition size mismatch: mobile has {} atoms, target has {}",
            mobile.len(),
            target.len()
        )));
    }
    if mobile.is_empty() {
        return Ok(Superposition::identity());
    }
    let x = CenteredCoords::from_coords(mobile);
    let y = CenteredCoords::from_coords(target);
    let svd = covariance(&x, &y).svd(true, true);
    let (Some(u), Some(v_t)) = (svd.u, svd.v_t) else {
        return Err(TrajError::Unsupported("Kabsch SVD failed".into()));
    };
    let mut r = v_t.transpose() * u.transpose();
    if r.determinant() < 0.0 {
        let mut v_t_fix = v_t;
        v_t_fix[(2, 0)] *= -1.0;
        v_t_fix[(2, 1)] *= -1.0;
        v_t_fix[(2, 2)] *= -1.0;
        r = v_t_fix.transpose() * u.transpose();
    }
    Ok(Superposition {
        rotation: r,
        mobile_center: x.center,
        target_center: y.center,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tetra() -> Vec<[f32; 4]> {
        vec![
            [0.0, 0.0, 0.0, 1.0],
            [1.5, 0.0, 0.0, 1.0],
            [0.0, 2.0, 0.0, 1.0],
            [0.3, 0.4, 1.7, 1.0],
        ]
    }

    fn rotate_z(coords: &[[f32; 4]], angle: f64, shift: [f32; 3]) -> Vec<[f32; 4]> {
        let (s, c) = angle.sin_cos();
        coords
            .iter()
            .map(|p| {
                let x = p[0] as f64;
                let y = p[1] as f64;
                [
                    (c * x - s * y) as f32 + shift[0],
                    (s * x + c * y) as f32 + shift[1],
                    p[2] + shift[2],
                    p[3],
                ]
            })
            .collect()
    }

    #[test]
    fn kabsch_rmsd_is_zero_for_rigid_motion() {
        let a = tetra();
        let b = rotate_z(&a, 1.1, [4.0, -2.0, 7.5]);
        assert!(kabsch_rmsd(&a, &b) < 1e-5);
        assert!(rmsd_nofit(&a, &b) > 1.0);
    }

    #[test]
    fn kabsch_rmsd_does_not_fit_mirror_images() {
        let a = tetra();
        let mirrored: Vec<[f32; 4]> = a.iter().map(|p| [p[0], p[1], -p[2], p[3]]).collect();
        assert!(kabsch_rmsd(&a, &mirrored) > 1e-3);
        let r = superpose(&mirrored, &a).unwrap();
        assert!(r.rotation.determinant() > 0.0);
    }

    #[test]
    fn superpose_maps_mobile_onto_target() {
        let target = tetra();
        let mobile = rotate_z(&target, -0.7, [1.0, 2.0, 3.0]);
        let fit = superpose(&mobile, &target).unwrap();
        for (m, t) in mobile.iter().zip(target.iter()) {
            let moved = fit.apply(*m);
            for k in 0..3 {
                assert!((moved[k] - t[k]).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn rmsd_nofit_matches_hand_computed_value() {
        let a = vec![[0.0, 0.0, 0.0, 1.0], [1.0, 0.0, 0.0, 1.0]];
        let b = vec![[0.0, 0.0, 0.0, 1.0], [3.0, 0.0, 0.0, 1.0]];
        assert!((rmsd_nofit(&a, &b) - 2.0f64.sqrt()).abs() < 1e-12);
    }
}
