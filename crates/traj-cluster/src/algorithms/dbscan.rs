use std::collections::VecDeque;

use log::debug;

use super::{check_frames, Assignment, ClusterAlgorithm, NOISE};
use crate::config::DbscanParams;
use crate::error::ClusterResult;
use crate::pairwise::DistanceMatrix;
use crate::streaming::StreamEmitter;

const UNCLASSIFIED: i32 = -2;

impl ClusterAlgorithm for DbscanParams {
    fn name(&self) -> &'static str {
        "dbscan"
    }

    /// Density-based grouping. A frame is a core point when at least
    /// `min_neighbors` other frames lie within `eps`; clusters grow
    /// breadth-first from core points in ascending frame order, and frames
    /// reached by no core point are labelled [`NOISE`].
    fn assign(
        &self,
        distances: &DistanceMatrix,
        _emitter: &StreamEmitter,
    ) -> ClusterResult<Assignment> {
        let n = distances.n_frames();
        check_frames("dbscan", n)?;
        if n == 1 {
            return Ok(Assignment::single(1));
        }

        let mut labels = vec![UNCLASSIFIED; n];
        let mut visited = vec![false; n];
        let mut queued = vec![false; n];
        let mut cluster_id = 0i32;
        let mut neigh = Vec::new();
        let mut queue = VecDeque::new();

        for i in 0..n {
            if visited[i] {
                continue;
            }
            visited[i] = true;
            distances.neighbors_within(i, self.eps, &mut neigh);
            if neigh.len() < self.min_neighbors {
                labels[i] = NOISE;
                continue;
            }
            labels[i] = cluster_id;
            queued.iter_mut().for_each(|q| *q = false);
            queued[i] = true;
            queue.clear();
            for &p in neigh.iter() {
                queue.push_back(p);
                queued[p] = true;
            }
            while let Some(p) = queue.pop_front() {
                if !visited[p] {
                    visited[p] = true;
                    distances.neighbors_within(p, self.eps, &mut neigh);
                    if neigh.len() >= self.min_neighbors {
                        for &q in neigh.iter() {
                            if !queued[q] {
                                queue.push_back(q);
                                queued[q] = true;
                            }
                        }
                    }
                }
                if labels[p] == UNCLASSIFIED || labels[p] == NOISE {
                    labels[p] = cluster_id;
                }
            }
            cluster_id += 1;
        }

        let n_noise = labels.iter().filter(|&&l| l == NOISE).count();
        debug!("dbscan: {cluster_id} clusters, {n_noise} noise frames");
        Ok(Assignment {
            labels,
            n_clusters: cluster_id as usize,
            iterations: 0,
            converged: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::tests::line_matrix;

    fn run(points: &[f64], eps: f64, min_neighbors: usize) -> Assignment {
        DbscanParams { eps, min_neighbors }
            .assign(&line_matrix(points), &StreamEmitter::disabled())
            .unwrap()
    }

    #[test]
    fn dense_groups_and_an_outlier() {
        let out = run(&[0.0, 0.1, 0.2, 5.0, 5.1, 5.2, 50.0], 0.15, 1);
        assert_eq!(out.labels, vec![0, 0, 0, 1, 1, 1, NOISE]);
        assert_eq!(out.n_clusters, 2);
    }

    #[test]
    fn border_points_join_but_do_not_expand() {
        // Only 1 and 2 are core; 0 and 3 hang off them as border frames.
        let out = run(&[0.0, 0.5, 1.0, 1.5, 2.5], 0.6, 2);
        assert_eq!(out.labels, vec![0, 0, 0, 0, NOISE]);
    }

    #[test]
    fn all_noise_yields_zero_clusters() {
        let out = run(&[0.0, 10.0, 20.0], 1.0, 1);
        assert_eq!(out.labels, vec![NOISE; 3]);
        assert_eq!(out.n_clusters, 0);
    }

    #[test]
    fn noise_can_be_reclaimed_as_border() {
        // Frame 0 is visited first as noise, then reached from core frame 1.
        let out = run(&[0.0, 1.0, 1.5, 2.0], 1.0, 3);
        assert_eq!(out.labels, vec![0, 0, 0, 0]);
    }
}
