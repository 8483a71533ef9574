#![allow(dead_code)]

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use traj_core::FrameChunk;

/// Eight-atom compact reference shape.
pub fn shape_a() -> Vec<[f32; 4]> {
    vec![
        [0.0, 0.0, 0.0, 1.0],
        [1.5, 0.0, 0.0, 1.0],
        [1.5, 1.5, 0.0, 1.0],
        [0.0, 1.5, 0.0, 1.0],
        [0.0, 0.0, 1.5, 1.0],
        [1.5, 0.0, 1.5, 1.0],
        [1.5, 1.5, 1.5, 1.0],
        [0.0, 1.5, 1.5, 1.0],
    ]
}

/// Same atoms stretched into an extended chain; not a rigid motion of
/// [`shape_a`].
pub fn shape_b() -> Vec<[f32; 4]> {
    (0..8)
        .map(|i| {
            let t = i as f32;
            [1.4 * t, 0.6 * (t * 0.9).sin(), 0.2 * t, 1.0]
        })
        .collect()
}

pub fn jitter(coords: &[[f32; 4]], rng: &mut StdRng, amplitude: f32) -> Vec<[f32; 4]> {
    coords
        .iter()
        .map(|p| {
            [
                p[0] + rng.gen_range(-amplitude..amplitude),
                p[1] + rng.gen_range(-amplitude..amplitude),
                p[2] + rng.gen_range(-amplitude..amplitude),
                p[3],
            ]
        })
        .collect()
}

/// Rotation about z then x, followed by a translation.
pub fn move_rigidly(
    coords: &[[f32; 4]],
    angle_z: f64,
    angle_x: f64,
    shift: [f32; 3],
) -> Vec<[f32; 4]> {
    let (sz, cz) = angle_z.sin_cos();
    let (sx, cx) = angle_x.sin_cos();
    coords
        .iter()
        .map(|p| {
            let (x, y, z) = (p[0] as f64, p[1] as f64, p[2] as f64);
            let (x1, y1) = (cz * x - sz * y, sz * x + cz * y);
            let (y2, z2) = (cx * y1 - sx * z, sx * y1 + cx * z);
            [
                x1 as f32 + shift[0],
                y2 as f32 + shift[1],
                z2 as f32 + shift[2],
                p[3],
            ]
        })
        .collect()
}

/// Alternating frames from two conformational states. Returns the frames
/// and the state (0 or 1) each frame was drawn from.
pub fn two_blob_frames(
    n_frames: usize,
    seed: u64,
    rigid_motion: bool,
) -> (FrameChunk, Vec<usize>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let (a, b) = (shape_a(), shape_b());
    let mut frames = Vec::with_capacity(n_frames);
    let mut truth = Vec::with_capacity(n_frames);
    for i in 0..n_frames {
        let state = i % 2;
        let base = if state == 0 { &a } else { &b };
        let mut coords = jitter(base, &mut rng, 0.05);
        if rigid_motion {
            let angle_z = rng.gen_range(0.0..std::f64::consts::TAU);
            let angle_x = rng.gen_range(0.0..std::f64::consts::TAU);
            let shift = [
                rng.gen_range(-5.0..5.0),
                rng.gen_range(-5.0..5.0),
                rng.gen_range(-5.0..5.0),
            ];
            coords = move_rigidly(&coords, angle_z, angle_x, shift);
        }
        frames.push(coords);
        truth.push(state);
    }
    (FrameChunk::from_frames(&frames).expect("uniform frames"), truth)
}

/// True when `labels` induce the same partition as `truth`.
pub fn same_partition(labels: &[i32], truth: &[usize]) -> bool {
    labels.len() == truth.len()
        && (0..labels.len()).all(|i| {
            (0..labels.len()).all(|j| (labels[i] == labels[j]) == (truth[i] == truth[j]))
        })
}
