//! Maps an assignment over retained frames back onto every input frame.

use rayon::prelude::*;
use traj_core::{superpose, FrameSource, ResolvedMask};

use crate::algorithms::{medoid, members_by_cluster, Assignment, NOISE};
use crate::error::ClusterResult;
use crate::metric::FrameMetric;
use crate::pairwise::DistanceMatrix;
use crate::sieve::excluded_frames;

/// Per-frame labels for the whole input, with clusters renumbered by
/// decreasing population (ties: lowest first member frame).
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub labels: Vec<i32>,
    pub n_clusters: usize,
    /// Medoid of each cluster as an input frame index.
    pub centroids: Vec<usize>,
    /// Medoid of each cluster as a row of the distance matrix.
    pub local_centroids: Vec<usize>,
    pub sizes: Vec<usize>,
    /// Labels of the retained frames, in distance-matrix order.
    pub retained_labels: Vec<i32>,
}

/// Projects `assignment` (over `retained`, ascending input frame indices)
/// onto all `metric.n_frames()` frames.
///
/// Every excluded frame joins the cluster whose medoid is nearest, ties going
/// to the lower cluster id. With `noise_cutoff` set, an excluded frame farther
/// than the cutoff from every medoid is labelled noise instead.
pub fn project(
    assignment: &Assignment,
    distances: &DistanceMatrix,
    retained: &[usize],
    metric: &dyn FrameMetric,
    noise_cutoff: Option<f64>,
) -> Projection {
    let n_total = metric.n_frames();
    let k = assignment.n_clusters;
    let local_members = members_by_cluster(&assignment.labels, k);
    let local_medoids: Vec<usize> = local_members
        .iter()
        .map(|m| medoid(m, distances).unwrap_or_default())
        .collect();

    let mut labels = vec![NOISE; n_total];
    for (local, &frame) in retained.iter().enumerate() {
        labels[frame] = assignment.labels[local];
    }

    let medoid_frames: Vec<usize> = local_medoids.iter().map(|&m| retained[m]).collect();
    let excluded = excluded_frames(n_total, retained);
    let projected: Vec<i32> = excluded
        .par_iter()
        .map(|&frame| {
            let mut best = NOISE;
            let mut best_dist = f64::INFINITY;
            for (c, d) in metric.distances_to(frame, &medoid_frames).into_iter().enumerate() {
                if d < best_dist {
                    best_dist = d;
                    best = c as i32;
                }
            }
            match noise_cutoff {
                Some(eps) if best_dist > eps => NOISE,
                _ => best,
            }
        })
        .collect();
    for (&frame, &label) in excluded.iter().zip(projected.iter()) {
        labels[frame] = label;
    }

    let remap = population_order(&labels, k);
    let relabel = |l: i32| if l < 0 { NOISE } else { remap[l as usize] as i32 };
    for label in labels.iter_mut() {
        *label = relabel(*label);
    }
    let retained_labels: Vec<i32> = assignment.labels.iter().map(|&l| relabel(l)).collect();

    let mut local_centroids = vec![0usize; k];
    for (old, &m) in local_medoids.iter().enumerate() {
        local_centroids[remap[old]] = m;
    }
    let centroids = local_centroids.iter().map(|&m| retained[m]).collect();
    let mut sizes = vec![0usize; k];
    for &label in labels.iter() {
        if label >= 0 {
            sizes[label as usize] += 1;
        }
    }

    Projection {
        labels,
        n_clusters: k,
        centroids,
        local_centroids,
        sizes,
        retained_labels,
    }
}

/// `remap[old]` is the new id of cluster `old`.
fn population_order(labels: &[i32], k: usize) -> Vec<usize> {
    let mut sizes = vec![0usize; k];
    let mut first = vec![usize::MAX; k];
    for (frame, &label) in labels.iter().enumerate() {
        if label >= 0 {
            let c = label as usize;
            sizes[c] += 1;
            first[c] = first[c].min(frame);
        }
    }
    let mut order: Vec<usize> = (0..k).collect();
    order.sort_by(|&a, &b| sizes[b].cmp(&sizes[a]).then(first[a].cmp(&first[b])));
    let mut remap = vec![0usize; k];
    for (new, &old) in order.iter().enumerate() {
        remap[old] = new;
    }
    remap
}

/// Mean structure of each cluster over all atoms.
///
/// With `fit`, members are first superposed onto the cluster's centroid
/// frame using the masked atoms; otherwise raw coordinates are averaged.
pub fn average_structures(
    source: &dyn FrameSource,
    mask: &ResolvedMask,
    projection: &Projection,
    fit: bool,
) -> ClusterResult<Vec<Vec<[f32; 4]>>> {
    let n_atoms = source.n_atoms();
    let members = members_by_cluster(&projection.labels, projection.n_clusters);
    members
        .par_iter()
        .zip(projection.centroids.par_iter())
        .map(|(frames, &centroid)| -> ClusterResult<Vec<[f32; 4]>> {
            let target = mask.gather(source.frame(centroid));
            let mut sum = vec![[0.0f64; 3]; n_atoms];
            for &frame in frames {
                let coords = source.frame(frame);
                if fit {
                    let sup = superpose(&mask.gather(coords), &target)?;
                    for (acc, &p) in sum.iter_mut().zip(coords.iter()) {
                        let q = sup.apply(p);
                        acc[0] += q[0] as f64;
                        acc[1] += q[1] as f64;
                        acc[2] += q[2] as f64;
                    }
                } else {
                    for (acc, p) in sum.iter_mut().zip(coords.iter()) {
                        acc[0] += p[0] as f64;
                        acc[1] += p[1] as f64;
                        acc[2] += p[2] as f64;
                    }
                }
            }
            let inv = 1.0 / frames.len().max(1) as f64;
            let pad = source.frame(centroid);
            Ok(sum
                .iter()
                .zip(pad.iter())
                .map(|(acc, p)| {
                    [
                        (acc[0] * inv) as f32,
                        (acc[1] * inv) as f32,
                        (acc[2] * inv) as f32,
                        p[3],
                    ]
                })
                .collect())
        })
        .collect()
}
