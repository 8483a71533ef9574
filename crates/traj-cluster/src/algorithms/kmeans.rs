//! k-medoids style partitioning.
//!
//! Centroids are frame indices, never synthesized coordinates, so the
//! algorithm works for any pairwise metric.

use log::{debug, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;

use super::{
    check_cluster_count, check_frames, members_by_cluster, medoid, Assignment, ClusterAlgorithm,
};
use crate::config::{KmeansInit, KmeansParams};
use crate::error::ClusterResult;
use crate::pairwise::DistanceMatrix;
use crate::streaming::{KmeansIterationEvent, StreamEmitter};

impl ClusterAlgorithm for KmeansParams {
    fn name(&self) -> &'static str {
        "kmeans"
    }

    fn assign(
        &self,
        distances: &DistanceMatrix,
        emitter: &StreamEmitter,
    ) -> ClusterResult<Assignment> {
        let n = distances.n_frames();
        check_frames("kmeans", n)?;
        check_cluster_count("kmeans", self.n_clusters, n)?;
        if n == 1 {
            return Ok(Assignment::single(1));
        }
        let medoids = initial_medoids(distances, self.n_clusters, self.init);
        Ok(self.refine(distances, medoids, emitter))
    }
}

impl KmeansParams {
    /// Alternates assignment and medoid updates starting from `medoids`.
    ///
    /// Stops when no frame changes cluster or when the total cost improves
    /// by no more than `tol`; either counts as converged.
    fn refine(
        &self,
        distances: &DistanceMatrix,
        mut medoids: Vec<usize>,
        emitter: &StreamEmitter,
    ) -> Assignment {
        let n = distances.n_frames();
        let k = medoids.len();
        let max_iter = self.max_iter.max(1);
        let tol = self.tol.max(0.0);

        let mut labels = vec![-1i32; n];
        let mut iterations = 0usize;
        let mut converged = false;
        let mut settled = false;
        let mut prev_cost = f64::INFINITY;

        while iterations < max_iter {
            iterations += 1;
            let new_labels = nearest_labels(distances, &medoids);
            let changed = new_labels
                .iter()
                .zip(labels.iter())
                .filter(|(a, b)| a != b)
                .count();
            labels = new_labels;
            if changed == 0 {
                converged = true;
                settled = true;
                break;
            }

            reseed_empty(distances, &mut medoids, &mut labels);
            let members = members_by_cluster(&labels, k);
            medoids = members
                .par_iter()
                .zip(medoids.par_iter())
                .map(|(m, &old)| medoid(m, distances).unwrap_or(old))
                .collect();
            let cost = total_cost(distances, &labels, &medoids);
            emitter.emit_kmeans_iteration(&KmeansIterationEvent {
                iteration: iterations,
                max_iterations: max_iter,
                changed,
                cost,
            });
            debug!("kmeans iteration {iterations}: {changed} frames moved, cost {cost:.6}");
            if prev_cost - cost <= tol {
                converged = true;
                break;
            }
            prev_cost = cost;
        }

        if !settled {
            labels = nearest_labels(distances, &medoids);
        }
        if !converged {
            warn!(
                "kmeans did not converge within {max_iter} iterations; returning the last assignment"
            );
        }

        let (labels, n_clusters) = compact_labels(labels, k);
        if n_clusters < k {
            warn!("kmeans produced {n_clusters} non-empty clusters out of {k} requested");
        }
        Assignment {
            labels,
            n_clusters,
            iterations,
            converged,
        }
    }
}

fn initial_medoids(distances: &DistanceMatrix, k: usize, init: KmeansInit) -> Vec<usize> {
    let n = distances.n_frames();
    match init {
        KmeansInit::RandomPoint { seed } => {
            let mut order: Vec<usize> = (0..n).collect();
            let mut rng = StdRng::seed_from_u64(seed);
            order.shuffle(&mut rng);
            order.truncate(k);
            order
        }
        KmeansInit::Systematic => {
            let mut chosen = vec![0usize];
            let mut min_dist: Vec<f64> = (0..n).map(|i| distances.get(0, i)).collect();
            let mut is_chosen = vec![false; n];
            is_chosen[0] = true;
            while chosen.len() < k {
                let mut best = None;
                let mut best_dist = f64::NEG_INFINITY;
                for i in 0..n {
                    if !is_chosen[i] && min_dist[i] > best_dist {
                        best_dist = min_dist[i];
                        best = Some(i);
                    }
                }
                let Some(next) = best else { break };
                chosen.push(next);
                is_chosen[next] = true;
                for i in 0..n {
                    min_dist[i] = min_dist[i].min(distances.get(next, i));
                }
            }
            chosen
        }
    }
}

/// Nearest medoid for every frame; equal distances go to the lower cluster.
fn nearest_labels(distances: &DistanceMatrix, medoids: &[usize]) -> Vec<i32> {
    (0..distances.n_frames())
        .into_par_iter()
        .map(|i| {
            let mut best = 0usize;
            let mut best_dist = f64::INFINITY;
            for (c, &m) in medoids.iter().enumerate() {
                let d = distances.get(i, m);
                if d < best_dist {
                    best_dist = d;
                    best = c;
                }
            }
            best as i32
        })
        .collect()
}

/// Gives every empty cluster the frame farthest from its own medoid.
fn reseed_empty(distances: &DistanceMatrix, medoids: &mut [usize], labels: &mut [i32]) {
    let k = medoids.len();
    let mut counts = vec![0usize; k];
    for &label in labels.iter() {
        counts[label as usize] += 1;
    }
    for c in 0..k {
        if counts[c] > 0 {
            continue;
        }
        let mut best = None;
        let mut best_dist = 0.0f64;
        for (i, &label) in labels.iter().enumerate() {
            let owner = label as usize;
            if counts[owner] < 2 || medoids.contains(&i) {
                continue;
            }
            let d = distances.get(i, medoids[owner]);
            if d > best_dist {
                best_dist = d;
                best = Some(i);
            }
        }
        if let Some(frame) = best {
            counts[labels[frame] as usize] -= 1;
            labels[frame] = c as i32;
            counts[c] = 1;
            medoids[c] = frame;
        }
    }
}

fn total_cost(distances: &DistanceMatrix, labels: &[i32], medoids: &[usize]) -> f64 {
    labels
        .iter()
        .enumerate()
        .map(|(i, &label)| distances.get(i, medoids[label as usize]))
        .sum()
}

/// Drops empty clusters, keeping the relative order of the others.
fn compact_labels(labels: Vec<i32>, k: usize) -> (Vec<i32>, usize) {
    let mut counts = vec![0usize; k];
    for &label in labels.iter() {
        counts[label as usize] += 1;
    }
    let mut remap = vec![-1i32; k];
    let mut next = 0i32;
    for c in 0..k {
        if counts[c] > 0 {
            remap[c] = next;
            next += 1;
        }
    }
    let labels = labels.into_iter().map(|l| remap[l as usize]).collect();
    (labels, next as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::tests::line_matrix;

    fn two_groups() -> DistanceMatrix {
        line_matrix(&[0.0, 0.2, 0.1, 10.0, 10.3, 9.9, 0.05])
    }

    #[test]
    fn recovers_two_separated_groups() {
        let d = two_groups();
        let out = KmeansParams::new(2)
            .with_seed(42)
            .assign(&d, &StreamEmitter::disabled())
            .unwrap();
        assert_eq!(out.n_clusters, 2);
        assert!(out.converged);
        let a = out.labels[0];
        for &i in &[1, 2, 6] {
            assert_eq!(out.labels[i], a);
        }
        for &i in &[3, 4, 5] {
            assert_ne!(out.labels[i], a);
        }
    }

    #[test]
    fn k_one_puts_everything_together() {
        let d = two_groups();
        let out = KmeansParams::new(1)
            .assign(&d, &StreamEmitter::disabled())
            .unwrap();
        assert_eq!(out.n_clusters, 1);
        assert!(out.labels.iter().all(|&l| l == 0));
    }

    #[test]
    fn seeded_runs_are_identical() {
        let d = line_matrix(&[0.0, 1.0, 2.5, 3.0, 7.0, 7.5, 9.0, 12.0, 12.1]);
        let params = KmeansParams::new(3).with_seed(9);
        let a = params.assign(&d, &StreamEmitter::disabled()).unwrap();
        let b = params.assign(&d, &StreamEmitter::disabled()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn systematic_init_picks_spread_out_frames() {
        let d = line_matrix(&[0.0, 0.1, 5.0, 10.0]);
        assert_eq!(initial_medoids(&d, 3, KmeansInit::Systematic), vec![0, 3, 2]);
        let out = KmeansParams::new(3)
            .systematic()
            .assign(&d, &StreamEmitter::disabled())
            .unwrap();
        assert_eq!(out.labels, vec![0, 0, 2, 1]);
    }

    #[test]
    fn ties_go_to_the_lower_cluster() {
        let d = line_matrix(&[0.0, 1.0, 2.0]);
        assert_eq!(nearest_labels(&d, &[0, 2]), vec![0, 0, 1]);
        assert_eq!(nearest_labels(&d, &[2, 0]), vec![1, 0, 0]);
    }

    #[test]
    fn iteration_cap_reports_non_convergence() {
        let d = line_matrix(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
        let out = KmeansParams::new(2)
            .with_seed(3)
            .with_max_iter(1)
            .assign(&d, &StreamEmitter::disabled())
            .unwrap();
        assert_eq!(out.iterations, 1);
        assert!(!out.converged);
        assert_eq!(out.labels.len(), 8);
        assert!(out.labels.iter().all(|&l| l == 0 || l == 1));
    }

    #[test]
    fn duplicate_frames_never_leave_gaps_in_ids() {
        let d = line_matrix(&[1.0, 1.0, 1.0, 1.0]);
        let out = KmeansParams::new(3)
            .assign(&d, &StreamEmitter::disabled())
            .unwrap();
        assert!(out.n_clusters >= 1);
        for &l in &out.labels {
            assert!(l >= 0 && (l as usize) < out.n_clusters);
        }
    }

    #[test]
    fn cost_tolerance_stops_before_labels_settle() {
        let d = line_matrix(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]);
        let emitter = StreamEmitter::disabled();
        let exact = KmeansParams::new(2).refine(&d, vec![0, 1], &emitter);
        assert!(exact.converged);
        assert_eq!(exact.iterations, 4);
        assert_eq!(exact.labels, vec![0, 0, 0, 0, 1, 1, 1, 1, 1, 1]);

        // Cost falls 20 -> 14 on the second pass, within a tolerance of 10,
        // while frame 3 would still move on a third pass.
        let loose = KmeansParams {
            tol: 10.0,
            ..KmeansParams::new(2)
        }
        .refine(&d, vec![0, 1], &emitter);
        assert!(loose.converged);
        assert_eq!(loose.iterations, 2);
        assert_eq!(loose.labels, exact.labels);
    }

    #[test]
    fn empty_cluster_takes_the_farthest_frame() {
        let d = line_matrix(&[0.0, 0.0, 1.0, 5.0, 9.0]);
        // Frames 0 and 1 coincide, so cluster 1 starts empty.
        let mut medoids = vec![0, 1, 4];
        let mut labels = nearest_labels(&d, &medoids);
        assert_eq!(labels, vec![0, 0, 0, 2, 2]);
        reseed_empty(&d, &mut medoids, &mut labels);
        assert_eq!(medoids, vec![0, 3, 4]);
        assert_eq!(labels, vec![0, 0, 0, 1, 2]);

        let out = KmeansParams::new(3).refine(&d, vec![0, 1, 4], &StreamEmitter::disabled());
        assert_eq!(out.n_clusters, 3);
        assert_eq!(out.labels, vec![0, 0, 0, 1, 2]);
        assert!(out.converged);
    }

    #[test]
    fn compact_labels_renumbers_in_order() {
        let (labels, n) = compact_labels(vec![2, 0, 2], 3);
        assert_eq!(labels, vec![1, 0, 1]);
        assert_eq!(n, 2);
    }
}
